//! Deterministic synthetic row generation
//!
//! Rows are produced lazily, table by table in dependency order. Every value
//! in row `i` of a table is derived from the table seed and `i` alone: the
//! table's ChaCha stream is selected by the row index, so
//!
//! - the same schema, plan and seeds always yield the same rows,
//! - a table can be restarted at any row ([`DataGenerator::rows_from`]),
//! - a parent's key at any index is computable without materializing the
//!   parent, which is how foreign keys are sampled.
//!
//! Primary keys must come from a unique policy (`Sequential` or
//! `Prefixed`), so a parent's key space is exactly `key_at(0..rows)`. A
//! primary key that is also a foreign key (one-to-one child) takes the
//! parent's key at the same row index.

use querybench_core::{
    BenchError, ColumnDef, ColumnPolicy, ColumnType, FkSampling, GenerationPlan, Result, Row,
    SchemaError, SchemaSpec, SqlValue, TableDef, TablePlan,
};
use rand::Rng;
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;
use std::iter::FusedIterator;
use std::sync::Arc;
use tracing::{debug, info};

/// Default bounds for columns without an explicit policy
const DEFAULT_INT_MAX: i64 = 1_000_000;
const DEFAULT_REAL_MAX: f64 = 1_000.0;
const DEFAULT_TS_START: i64 = 1_600_000_000;
const DEFAULT_TS_END: i64 = 1_700_000_000;

/// How a table's primary key is derived from the row index
#[derive(Debug, Clone, PartialEq)]
enum KeyPolicy {
    Sequential { start: i64 },
    Prefixed { prefix: String, start: i64 },
}

/// The complete set of primary-key values a table emits
#[derive(Debug, Clone, PartialEq)]
pub struct KeySpace {
    table: String,
    rows: u64,
    policy: KeyPolicy,
}

impl KeySpace {
    /// Owning table
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Number of keys
    pub fn len(&self) -> u64 {
        self.rows
    }

    /// Whether the table has no rows
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Key emitted for row `index` (`index < len()`)
    pub fn key_at(&self, index: u64) -> SqlValue {
        match &self.policy {
            KeyPolicy::Sequential { start } => SqlValue::Integer(sequence_at(*start, index)),
            KeyPolicy::Prefixed { prefix, start } => {
                SqlValue::Text(format!("{}{}", prefix, sequence_at(*start, index)))
            }
        }
    }

    /// Whether `value` is one of this table's keys
    pub fn contains(&self, value: &SqlValue) -> bool {
        let n = match (&self.policy, value) {
            (KeyPolicy::Sequential { start }, SqlValue::Integer(v)) => v.checked_sub(*start),
            (KeyPolicy::Prefixed { prefix, start }, SqlValue::Text(s)) => s
                .strip_prefix(prefix.as_str())
                .and_then(|rest| rest.parse::<i64>().ok())
                .filter(|n| s.len() == prefix.len() + n.to_string().len())
                .and_then(|n| n.checked_sub(*start)),
            _ => None,
        };
        matches!(n, Some(offset) if offset >= 0 && (offset as u64) < self.rows)
    }
}

/// `start + index`; resolution rejects sequences that overflow within their rows
fn sequence_at(start: i64, index: u64) -> i64 {
    start.wrapping_add(index as i64)
}

#[derive(Debug, Clone)]
enum ValueGen {
    Sequential { start: i64 },
    UniformInt { min: i64, max: i64 },
    UniformReal { min: f64, max: f64 },
    Prefixed { prefix: String, start: i64 },
    OneOf(Vec<SqlValue>),
    Constant(SqlValue),
    Bool { true_ratio: f64 },
    Timestamp { start: i64, end: i64 },
    ForeignKey { parent: KeySpace, sampling: FkSampling },
}

impl ValueGen {
    fn generate(&self, index: u64, rng: &mut ChaCha8Rng) -> SqlValue {
        match self {
            ValueGen::Sequential { start } => SqlValue::Integer(sequence_at(*start, index)),
            ValueGen::UniformInt { min, max } => SqlValue::Integer(rng.gen_range(*min..=*max)),
            ValueGen::UniformReal { min, max } => {
                if min == max {
                    SqlValue::Real(*min)
                } else {
                    SqlValue::Real(rng.gen_range(*min..*max))
                }
            }
            ValueGen::Prefixed { prefix, start } => {
                SqlValue::Text(format!("{}{}", prefix, sequence_at(*start, index)))
            }
            ValueGen::OneOf(values) => values[rng.gen_range(0..values.len())].clone(),
            ValueGen::Constant(value) => value.clone(),
            ValueGen::Bool { true_ratio } => SqlValue::Bool(rng.gen_bool(*true_ratio)),
            ValueGen::Timestamp { start, end } => SqlValue::Integer(rng.gen_range(*start..=*end)),
            ValueGen::ForeignKey { parent, sampling } => {
                parent.key_at(sample_parent_index(sampling, parent.len(), index, rng))
            }
        }
    }
}

/// Pick a parent row index in `0..parent_rows` (`parent_rows > 0`)
fn sample_parent_index(sampling: &FkSampling, parent_rows: u64, index: u64, rng: &mut ChaCha8Rng) -> u64 {
    match sampling {
        FkSampling::Uniform => rng.gen_range(0..parent_rows),
        FkSampling::RoundRobin => index % parent_rows,
        FkSampling::Skewed {
            hot_fraction,
            hot_weight,
        } => {
            let hot = ((parent_rows as f64 * hot_fraction).ceil() as u64).clamp(1, parent_rows);
            if hot == parent_rows || rng.gen_bool(*hot_weight) {
                rng.gen_range(0..hot)
            } else {
                rng.gen_range(hot..parent_rows)
            }
        }
    }
}

#[derive(Debug, Clone)]
struct ColumnGen {
    gen: ValueGen,
    null_ratio: f64,
}

/// Resolved generator for one table
#[derive(Debug)]
struct TableGenerator {
    def: TableDef,
    rows: u64,
    keys: KeySpace,
    columns: Vec<ColumnGen>,
    base_rng: ChaCha8Rng,
}

impl TableGenerator {
    fn row(&self, index: u64) -> Row {
        let mut rng = self.base_rng.clone();
        rng.set_stream(index);
        self.columns
            .iter()
            .map(|col| {
                if col.null_ratio > 0.0 && rng.gen_bool(col.null_ratio) {
                    SqlValue::Null
                } else {
                    col.gen.generate(index, &mut rng)
                }
            })
            .collect()
    }
}

/// Lazy, finite, restartable row sequence for one table
///
/// Holds no rows; each `next()` derives the row from the seed and index.
#[derive(Debug, Clone)]
pub struct TableRows {
    table: Arc<TableGenerator>,
    next: u64,
    end: u64,
}

impl TableRows {
    /// Table being generated
    pub fn table(&self) -> &TableDef {
        &self.table.def
    }

    /// Index of the next row
    pub fn position(&self) -> u64 {
        self.next
    }
}

impl Iterator for TableRows {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        if self.next >= self.end {
            return None;
        }
        let row = self.table.row(self.next);
        self.next += 1;
        Some(row)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.end - self.next) as usize;
        (remaining, Some(remaining))
    }

    fn nth(&mut self, n: usize) -> Option<Row> {
        self.next = self.next.saturating_add(n as u64).min(self.end);
        self.next()
    }
}

impl ExactSizeIterator for TableRows {}

impl FusedIterator for TableRows {}

/// Generator for a whole schema
///
/// Construction validates the schema and plan and resolves every column
/// policy; afterwards generation cannot fail.
#[derive(Debug)]
pub struct DataGenerator {
    schema: SchemaSpec,
    tables: Vec<Arc<TableGenerator>>,
    index: HashMap<String, usize>,
}

impl DataGenerator {
    /// Validate `schema` and `plan` and resolve column policies.
    ///
    /// # Errors
    ///
    /// `BenchError::Schema` if the schema is malformed, a foreign key
    /// references an undefined table/column, the plan and schema disagree,
    /// a policy does not fit its column, or a child samples from a parent
    /// with zero planned rows.
    pub fn new(schema: &SchemaSpec, plan: &GenerationPlan) -> Result<Self> {
        schema.validate()?;

        for table_plan in &plan.tables {
            if schema.table(&table_plan.table).is_none() {
                return Err(SchemaError::PlanForUnknownTable(table_plan.table.clone()).into());
            }
        }

        let mut tables: Vec<Arc<TableGenerator>> = Vec::with_capacity(schema.tables.len());
        let mut index = HashMap::new();
        for def in &schema.tables {
            let table_plan = plan
                .get(&def.name)
                .ok_or_else(|| SchemaError::MissingPlan(def.name.clone()))?;
            let resolved = resolve_table(def, table_plan, &tables, &index)?;
            debug!(target: "querybench::gen", table = %def.name, rows = table_plan.rows, seed = table_plan.seed, "Table plan resolved");
            index.insert(def.name.clone(), tables.len());
            tables.push(Arc::new(resolved));
        }

        let total: u64 = tables.iter().map(|t| t.rows).sum();
        info!(target: "querybench::gen", tables = tables.len(), total_rows = total, "Generator ready");

        Ok(Self {
            schema: schema.clone(),
            tables,
            index,
        })
    }

    /// Schema being generated
    pub fn schema(&self) -> &SchemaSpec {
        &self.schema
    }

    /// Table definitions in dependency order
    pub fn tables(&self) -> impl Iterator<Item = &TableDef> {
        self.tables.iter().map(|t| &t.def)
    }

    /// Planned row count
    pub fn planned_rows(&self, table: &str) -> Option<u64> {
        self.lookup(table).map(|t| t.rows)
    }

    /// Primary-key space of `table`
    pub fn key_space(&self, table: &str) -> Option<&KeySpace> {
        self.lookup(table).map(|t| &t.keys)
    }

    /// Lazy rows of `table` from the first row
    pub fn rows(&self, table: &str) -> Option<TableRows> {
        self.rows_from(table, 0)
    }

    /// Lazy rows of `table` starting at row `offset`.
    ///
    /// Yields exactly what `rows(table).skip(offset)` would.
    pub fn rows_from(&self, table: &str, offset: u64) -> Option<TableRows> {
        let gen = self.lookup_arc(table)?;
        let end = gen.rows;
        Some(TableRows {
            table: gen,
            next: offset.min(end),
            end,
        })
    }

    /// Row `index` of `table`, if in range
    pub fn row_at(&self, table: &str, index: u64) -> Option<Row> {
        let gen = self.lookup(table)?;
        (index < gen.rows).then(|| gen.row(index))
    }

    /// Every table's rows, in dependency order
    pub fn stream(&self) -> impl Iterator<Item = TableRows> + '_ {
        self.tables.iter().map(|t| TableRows {
            table: Arc::clone(t),
            next: 0,
            end: t.rows,
        })
    }

    fn lookup(&self, table: &str) -> Option<&TableGenerator> {
        self.index.get(table).map(|&i| self.tables[i].as_ref())
    }

    fn lookup_arc(&self, table: &str) -> Option<Arc<TableGenerator>> {
        self.index.get(table).map(|&i| Arc::clone(&self.tables[i]))
    }
}

fn invalid(table: &TableDef, column: &ColumnDef, reason: impl Into<String>) -> BenchError {
    SchemaError::InvalidPolicy {
        table: table.name.clone(),
        column: column.name.clone(),
        reason: reason.into(),
    }
    .into()
}

fn resolve_table(
    def: &TableDef,
    plan: &TablePlan,
    resolved: &[Arc<TableGenerator>],
    index: &HashMap<String, usize>,
) -> Result<TableGenerator> {
    for name in plan.columns.keys() {
        if def.get_column(name).is_none() {
            return Err(SchemaError::UnknownColumn {
                table: def.name.clone(),
                column: name.clone(),
            }
            .into());
        }
    }

    let mut keys = None;
    let mut columns = Vec::with_capacity(def.columns.len());
    for column in &def.columns {
        let column_plan = plan.columns.get(&column.name);
        let null_ratio = column_plan.map(|p| p.null_ratio).unwrap_or(0.0);
        if !(0.0..=1.0).contains(&null_ratio) {
            return Err(invalid(def, column, "null_ratio must be within [0, 1]"));
        }
        if null_ratio > 0.0 && (!column.nullable || column.name == def.primary_key) {
            return Err(invalid(def, column, "null_ratio requires a nullable non-key column"));
        }

        let gen = if column.name == def.primary_key {
            let policy = column_plan.map(|p| &p.policy);
            let key = match def.foreign_key_for(&column.name) {
                Some(fk) => {
                    let parent = parent_keys(def, &fk.references, resolved, index)?;
                    resolve_shared_key(def, column, policy, &parent, plan.rows)?
                }
                None => resolve_key(def, column, policy)?,
            };
            let gen = match &key {
                KeyPolicy::Sequential { start } => ValueGen::Sequential { start: *start },
                KeyPolicy::Prefixed { prefix, start } => ValueGen::Prefixed {
                    prefix: prefix.clone(),
                    start: *start,
                },
            };
            keys = Some(KeySpace {
                table: def.name.clone(),
                rows: plan.rows,
                policy: key,
            });
            gen
        } else if let Some(fk) = def.foreign_key_for(&column.name) {
            let sampling = match column_plan.map(|p| &p.policy) {
                None => FkSampling::Uniform,
                Some(ColumnPolicy::ForeignKey { sampling }) => sampling.clone(),
                Some(_) => {
                    return Err(invalid(def, column, "foreign-key columns must use the foreign_key policy"))
                }
            };
            validate_sampling(def, column, &sampling)?;
            let parent = parent_keys(def, &fk.references, resolved, index)?;
            if parent.is_empty() && plan.rows > 0 {
                return Err(SchemaError::EmptyParent {
                    table: def.name.clone(),
                    parent: fk.references.clone(),
                }
                .into());
            }
            check_key_type(def, column, &parent)?;
            ValueGen::ForeignKey { parent, sampling }
        } else {
            match column_plan {
                Some(p) => resolve_value(def, column, &p.policy)?,
                None => default_value(column),
            }
        };

        if let ValueGen::Sequential { start } | ValueGen::Prefixed { start, .. } = &gen {
            check_sequence(def, column, *start, plan.rows)?;
        }
        columns.push(ColumnGen { gen, null_ratio });
    }

    let keys = keys.ok_or_else(|| SchemaError::UnknownColumn {
        table: def.name.clone(),
        column: def.primary_key.clone(),
    })?;

    Ok(TableGenerator {
        def: def.clone(),
        rows: plan.rows,
        keys,
        columns,
        base_rng: ChaCha8Rng::seed_from_u64(plan.seed),
    })
}

fn resolve_key(def: &TableDef, column: &ColumnDef, policy: Option<&ColumnPolicy>) -> Result<KeyPolicy> {
    match (policy, column.ty) {
        (None, ColumnType::Integer) => Ok(KeyPolicy::Sequential { start: 1 }),
        (None, ColumnType::Text) => Ok(KeyPolicy::Prefixed {
            prefix: format!("{}-", def.name),
            start: 1,
        }),
        (Some(ColumnPolicy::Sequential { start }), ColumnType::Integer) => {
            Ok(KeyPolicy::Sequential { start: *start })
        }
        (Some(ColumnPolicy::Prefixed { prefix, start }), ColumnType::Text) => Ok(KeyPolicy::Prefixed {
            prefix: prefix.clone(),
            start: *start,
        }),
        (Some(p), _) if !p.is_unique() => Err(invalid(
            def,
            column,
            "primary keys need a unique policy (sequential or prefixed)",
        )),
        _ => Err(invalid(
            def,
            column,
            format!("no unique key policy fits a {} primary key", column.ty),
        )),
    }
}

/// Key space of an already resolved parent table
fn parent_keys(
    def: &TableDef,
    references: &str,
    resolved: &[Arc<TableGenerator>],
    index: &HashMap<String, usize>,
) -> Result<KeySpace> {
    index
        .get(references)
        .map(|&i| resolved[i].keys.clone())
        .ok_or_else(|| {
            SchemaError::UnknownTable {
                table: def.name.clone(),
                referenced: references.to_string(),
            }
            .into()
        })
}

fn check_key_type(def: &TableDef, column: &ColumnDef, parent: &KeySpace) -> Result<()> {
    let key_type = match parent.policy {
        KeyPolicy::Sequential { .. } => ColumnType::Integer,
        KeyPolicy::Prefixed { .. } => ColumnType::Text,
    };
    if column.ty != key_type {
        return Err(invalid(
            def,
            column,
            format!("column type {} does not match parent key type {}", column.ty, key_type),
        ));
    }
    Ok(())
}

/// Key policy of a primary key that references `parent`.
///
/// Row `i` reuses the parent's key `i`, so keys stay unique and every one
/// exists in the parent as long as the child has no more rows than the parent.
fn resolve_shared_key(
    def: &TableDef,
    column: &ColumnDef,
    policy: Option<&ColumnPolicy>,
    parent: &KeySpace,
    rows: u64,
) -> Result<KeyPolicy> {
    if !matches!(policy, None | Some(ColumnPolicy::ForeignKey { .. })) {
        return Err(invalid(def, column, "foreign-key columns must use the foreign_key policy"));
    }
    check_key_type(def, column, parent)?;
    if rows > parent.len() {
        return Err(invalid(
            def,
            column,
            format!(
                "{} rows need distinct keys but parent '{}' has only {}",
                rows,
                parent.table(),
                parent.len()
            ),
        ));
    }
    Ok(parent.policy.clone())
}

/// Reject a sequence whose last value `start + rows - 1` does not fit in i64
fn check_sequence(def: &TableDef, column: &ColumnDef, start: i64, rows: u64) -> Result<()> {
    if rows == 0 {
        return Ok(());
    }
    let last = i64::try_from(rows - 1).ok().and_then(|n| start.checked_add(n));
    if last.is_none() {
        return Err(invalid(
            def,
            column,
            format!("sequence from {} overflows a 64-bit integer within {} rows", start, rows),
        ));
    }
    Ok(())
}

fn validate_sampling(def: &TableDef, column: &ColumnDef, sampling: &FkSampling) -> Result<()> {
    if let FkSampling::Skewed {
        hot_fraction,
        hot_weight,
    } = sampling
    {
        if !(*hot_fraction > 0.0 && *hot_fraction <= 1.0) {
            return Err(invalid(def, column, "hot_fraction must be within (0, 1]"));
        }
        if !(0.0..=1.0).contains(hot_weight) {
            return Err(invalid(def, column, "hot_weight must be within [0, 1]"));
        }
    }
    Ok(())
}

fn resolve_value(def: &TableDef, column: &ColumnDef, policy: &ColumnPolicy) -> Result<ValueGen> {
    let ty = column.ty;
    let gen = match policy {
        ColumnPolicy::Sequential { start } => {
            require(def, column, matches!(ty, ColumnType::Integer | ColumnType::Timestamp), "sequential")?;
            ValueGen::Sequential { start: *start }
        }
        ColumnPolicy::UniformInt { min, max } => {
            require(def, column, matches!(ty, ColumnType::Integer | ColumnType::Timestamp), "uniform_int")?;
            if min > max {
                return Err(invalid(def, column, "min must not exceed max"));
            }
            ValueGen::UniformInt { min: *min, max: *max }
        }
        ColumnPolicy::UniformReal { min, max } => {
            require(def, column, ty == ColumnType::Real, "uniform_real")?;
            if !(min.is_finite() && max.is_finite()) || min > max {
                return Err(invalid(def, column, "bounds must be finite with min <= max"));
            }
            ValueGen::UniformReal { min: *min, max: *max }
        }
        ColumnPolicy::Prefixed { prefix, start } => {
            require(def, column, ty == ColumnType::Text, "prefixed")?;
            ValueGen::Prefixed {
                prefix: prefix.clone(),
                start: *start,
            }
        }
        ColumnPolicy::OneOf { values } => {
            if values.is_empty() {
                return Err(invalid(def, column, "one_of needs at least one value"));
            }
            for value in values {
                require_value(def, column, value)?;
            }
            ValueGen::OneOf(values.clone())
        }
        ColumnPolicy::Constant { value } => {
            require_value(def, column, value)?;
            ValueGen::Constant(value.clone())
        }
        ColumnPolicy::Bool { true_ratio } => {
            require(def, column, ty == ColumnType::Boolean, "bool")?;
            if !(0.0..=1.0).contains(true_ratio) {
                return Err(invalid(def, column, "true_ratio must be within [0, 1]"));
            }
            ValueGen::Bool {
                true_ratio: *true_ratio,
            }
        }
        ColumnPolicy::Timestamp { start, end } => {
            require(def, column, matches!(ty, ColumnType::Timestamp | ColumnType::Integer), "timestamp")?;
            if start > end {
                return Err(invalid(def, column, "start must not exceed end"));
            }
            ValueGen::Timestamp {
                start: *start,
                end: *end,
            }
        }
        ColumnPolicy::ForeignKey { .. } => {
            return Err(invalid(def, column, "column has no foreign key to sample from"))
        }
    };
    Ok(gen)
}

fn require(def: &TableDef, column: &ColumnDef, ok: bool, policy: &str) -> Result<()> {
    if ok {
        Ok(())
    } else {
        Err(invalid(
            def,
            column,
            format!("{} policy cannot produce {} values", policy, column.ty),
        ))
    }
}

/// Fixed values must fit the column: integers widen to real and timestamp
/// columns, NULL needs a nullable column.
fn require_value(def: &TableDef, column: &ColumnDef, value: &SqlValue) -> Result<()> {
    let fits = match value {
        SqlValue::Null => column.nullable,
        SqlValue::Integer(_) => matches!(
            column.ty,
            ColumnType::Integer | ColumnType::Timestamp | ColumnType::Real
        ),
        SqlValue::Real(_) => column.ty == ColumnType::Real,
        SqlValue::Text(_) => column.ty == ColumnType::Text,
        SqlValue::Bool(_) => column.ty == ColumnType::Boolean,
    };
    if fits {
        Ok(())
    } else {
        Err(invalid(
            def,
            column,
            format!("value {} does not fit a {} column", value, column.ty),
        ))
    }
}

fn default_value(column: &ColumnDef) -> ValueGen {
    match column.ty {
        ColumnType::Integer => ValueGen::UniformInt {
            min: 0,
            max: DEFAULT_INT_MAX,
        },
        ColumnType::Real => ValueGen::UniformReal {
            min: 0.0,
            max: DEFAULT_REAL_MAX,
        },
        ColumnType::Text => ValueGen::Prefixed {
            prefix: format!("{}-", column.name),
            start: 1,
        },
        ColumnType::Boolean => ValueGen::Bool { true_ratio: 0.5 },
        ColumnType::Timestamp => ValueGen::Timestamp {
            start: DEFAULT_TS_START,
            end: DEFAULT_TS_END,
        },
    }
}
