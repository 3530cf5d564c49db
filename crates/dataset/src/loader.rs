//! Batched, retrying dataset loader
//!
//! Tables are loaded level by level (see [`SchemaSpec::dependency_levels`]):
//! a child table is never written before every parent has fully committed.
//! Within a level, tables are independent and may load concurrently on
//! separate connections when `parallel_table_load` is enabled.
//!
//! Each batch is one `bulk_insert` call, retried with exponential backoff up
//! to the configured limit. When a batch exhausts its retries the table is
//! reported failed with the rows already committed; earlier batches are not
//! rolled back. Tables that depend on a failed table are skipped.
//!
//! [`SchemaSpec::dependency_levels`]: querybench_core::SchemaSpec::dependency_levels

use crate::generator::DataGenerator;
use parking_lot::RwLock;
use querybench_core::{
    BenchError, Checkout, ConnectionFactory, EngineConnection, EngineError, HarnessConfig,
    LoadFailure, Result, RetryConfig, Row, SchemaSpec,
};
use serde::Serialize;
use std::collections::HashSet;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Loader settings
#[derive(Debug, Clone, PartialEq)]
pub struct LoadOptions {
    /// Rows per bulk insert
    pub batch_size: usize,
    /// Per-batch retry policy
    pub retry: RetryConfig,
    /// Load tables of the same dependency level concurrently
    pub parallel: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self::from(&HarnessConfig::default())
    }
}

impl From<&HarnessConfig> for LoadOptions {
    fn from(config: &HarnessConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            retry: config.retry.clone(),
            parallel: config.parallel_table_load,
        }
    }
}

/// Tables whose load has fully committed
///
/// Shared between loader threads; a table is recorded only after its last
/// batch commits.
#[derive(Debug, Default)]
pub struct LoadLedger {
    completed: RwLock<HashSet<String>>,
}

impl LoadLedger {
    /// Empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `table` has fully loaded
    pub fn is_complete(&self, table: &str) -> bool {
        self.completed.read().contains(table)
    }

    /// Record `table` as fully loaded
    pub fn mark_complete(&self, table: &str) {
        self.completed.write().insert(table.to_string());
    }

    /// Number of fully loaded tables
    pub fn len(&self) -> usize {
        self.completed.read().len()
    }

    /// Whether nothing has loaded yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Statistics for a fully loaded table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableLoadStats {
    /// Table name
    pub table: String,
    /// Rows committed
    pub rows: u64,
    /// Batches committed
    pub batches: u64,
    /// Batch retries across the whole table
    pub retries: usize,
    /// Wall-clock load time
    pub elapsed: Duration,
}

/// Final state of one table
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TableLoadStatus {
    /// Every planned row committed
    Loaded(TableLoadStats),
    /// A batch exhausted its retries
    Failed(LoadFailure),
    /// Not attempted because a parent did not load
    Skipped {
        /// Parent that failed or was itself skipped
        parent: String,
    },
}

/// Outcome of a table load within [`LoadReport`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableLoadOutcome {
    /// Table name
    pub table: String,
    /// What happened
    pub status: TableLoadStatus,
}

impl TableLoadOutcome {
    /// Rows committed, whatever the status
    pub fn rows_committed(&self) -> u64 {
        match &self.status {
            TableLoadStatus::Loaded(stats) => stats.rows,
            TableLoadStatus::Failed(failure) => failure.rows_committed,
            TableLoadStatus::Skipped { .. } => 0,
        }
    }

    /// Whether the table fully loaded
    pub fn is_loaded(&self) -> bool {
        matches!(self.status, TableLoadStatus::Loaded(_))
    }
}

/// Per-table results of a whole-dataset load, in dependency order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadReport {
    /// Outcomes, one per table
    pub tables: Vec<TableLoadOutcome>,
    /// Wall-clock time for the whole load
    pub elapsed: Duration,
}

impl LoadReport {
    /// Every table loaded
    pub fn is_success(&self) -> bool {
        self.tables.iter().all(TableLoadOutcome::is_loaded)
    }

    /// Outcome for `table`
    pub fn outcome(&self, table: &str) -> Option<&TableLoadOutcome> {
        self.tables.iter().find(|o| o.table == table)
    }

    /// Failures, in dependency order
    pub fn failures(&self) -> impl Iterator<Item = &LoadFailure> {
        self.tables.iter().filter_map(|o| match &o.status {
            TableLoadStatus::Failed(failure) => Some(failure),
            _ => None,
        })
    }

    /// Total rows committed
    pub fn total_rows(&self) -> u64 {
        self.tables.iter().map(TableLoadOutcome::rows_committed).sum()
    }
}

/// Writes generated datasets into an engine
#[derive(Debug, Clone, Default)]
pub struct DatasetLoader {
    options: LoadOptions,
}

impl DatasetLoader {
    /// Loader with the given options
    pub fn new(options: LoadOptions) -> Self {
        Self { options }
    }

    /// Loader configured from harness settings
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self::new(LoadOptions::from(config))
    }

    /// Current options
    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    /// Execute `CREATE TABLE` for every table, parents first
    pub fn create_schema(&self, conn: &mut dyn EngineConnection, schema: &SchemaSpec) -> Result<()> {
        for ddl in schema.create_table_sql() {
            debug!(target: "querybench::load", sql = %ddl, "Creating table");
            conn.execute(&ddl, &[], None)?;
        }
        Ok(())
    }

    /// Load one table in batches.
    ///
    /// # Errors
    ///
    /// - `OrderingViolation` if a parent is not yet in `ledger`; nothing is
    ///   written in that case
    /// - `LoadFailure` if a batch exhausts its retries
    pub fn load_table(
        &self,
        conn: &mut dyn EngineConnection,
        generator: &DataGenerator,
        table: &str,
        ledger: &LoadLedger,
    ) -> Result<TableLoadStats> {
        let mut rows = generator
            .rows(table)
            .ok_or_else(|| BenchError::config(format!("no generated table named '{}'", table)))?;
        let def = rows.table().clone();

        for parent in def.parents() {
            if !ledger.is_complete(parent) {
                return Err(BenchError::OrderingViolation {
                    table: def.name.clone(),
                    missing_parent: parent.to_string(),
                });
            }
        }

        let start = Instant::now();
        let batch_size = self.options.batch_size.max(1);
        let planned = rows.len();
        info!(target: "querybench::load", table = %def.name, rows = planned, batch_size, "Loading table");

        let mut batch: Vec<Row> = Vec::with_capacity(batch_size.min(planned));
        let mut committed = 0u64;
        let mut batch_index = 0u64;
        let mut retries = 0usize;
        loop {
            batch.clear();
            batch.extend(rows.by_ref().take(batch_size));
            if batch.is_empty() {
                break;
            }

            let mut attempt = 0usize;
            loop {
                match conn.bulk_insert(&def, &batch) {
                    Ok(n) => {
                        committed += n;
                        break;
                    }
                    Err(e) if e.is_retryable() && attempt < self.options.retry.max_retries => {
                        let delay = self.options.retry.calculate_delay(attempt);
                        warn!(target: "querybench::load", table = %def.name, batch = batch_index, attempt = attempt + 1, delay_ms = delay.as_millis() as u64, error = %e, "Batch failed, retrying");
                        thread::sleep(delay);
                        attempt += 1;
                        retries += 1;
                    }
                    Err(e) => {
                        warn!(target: "querybench::load", table = %def.name, batch = batch_index, rows_committed = committed, error = %e, "Batch failed, giving up");
                        return Err(LoadFailure {
                            table: def.name.clone(),
                            rows_committed: committed,
                            batch_index,
                            attempts: attempt + 1,
                            source: e,
                        }
                        .into());
                    }
                }
            }
            batch_index += 1;
        }

        ledger.mark_complete(&def.name);
        let elapsed = start.elapsed();
        info!(target: "querybench::load", table = %def.name, rows = committed, batches = batch_index, retries, elapsed_ms = elapsed.as_millis() as u64, "Table loaded");

        Ok(TableLoadStats {
            table: def.name,
            rows: committed,
            batches: batch_index,
            retries,
            elapsed,
        })
    }

    /// Load every table the generator produces, parents first.
    ///
    /// Each table uses its own connection checkout. Load failures are
    /// reported per table rather than returned; only ordering violations
    /// (which indicate a sequencing bug) abort the whole load.
    pub fn load_all(&self, factory: &dyn ConnectionFactory, generator: &DataGenerator) -> Result<LoadReport> {
        let start = Instant::now();
        let levels = generator.schema().dependency_levels()?;
        let ledger = LoadLedger::new();
        let mut unavailable: HashSet<String> = HashSet::new();
        let mut outcomes = Vec::new();

        for (depth, level) in levels.iter().enumerate() {
            let mut runnable = Vec::new();
            for def in level {
                match def.parents().into_iter().find(|p| unavailable.contains(*p)) {
                    Some(parent) => {
                        warn!(target: "querybench::load", table = %def.name, parent, "Skipping table, parent did not load");
                        unavailable.insert(def.name.clone());
                        outcomes.push(TableLoadOutcome {
                            table: def.name.clone(),
                            status: TableLoadStatus::Skipped {
                                parent: parent.to_string(),
                            },
                        });
                    }
                    None => runnable.push(def.name.as_str()),
                }
            }

            debug!(target: "querybench::load", level = depth, tables = runnable.len(), parallel = self.options.parallel, "Loading level");
            let results: Vec<(&str, Result<TableLoadStats>)> = if self.options.parallel && runnable.len() > 1 {
                thread::scope(|scope| {
                    let handles: Vec<_> = runnable
                        .iter()
                        .map(|&table| {
                            let ledger = &ledger;
                            (table, scope.spawn(move || self.checkout_and_load(factory, generator, table, ledger)))
                        })
                        .collect();
                    handles
                        .into_iter()
                        .map(|(table, handle)| {
                            let result = handle.join().unwrap_or_else(|_| {
                                Err(self.connect_failure(table, EngineError::other("loader thread panicked")))
                            });
                            (table, result)
                        })
                        .collect()
                })
            } else {
                runnable
                    .iter()
                    .map(|&table| (table, self.checkout_and_load(factory, generator, table, &ledger)))
                    .collect()
            };

            for (table, result) in results {
                let status = match result {
                    Ok(stats) => TableLoadStatus::Loaded(stats),
                    Err(BenchError::LoadFailure(failure)) => {
                        unavailable.insert(table.to_string());
                        TableLoadStatus::Failed(failure)
                    }
                    Err(other) => return Err(other),
                };
                outcomes.push(TableLoadOutcome {
                    table: table.to_string(),
                    status,
                });
            }
        }

        let report = LoadReport {
            tables: outcomes,
            elapsed: start.elapsed(),
        };
        info!(target: "querybench::load", tables = report.tables.len(), rows = report.total_rows(), success = report.is_success(), elapsed_ms = report.elapsed.as_millis() as u64, "Dataset load finished");
        Ok(report)
    }

    fn checkout_and_load(
        &self,
        factory: &dyn ConnectionFactory,
        generator: &DataGenerator,
        table: &str,
        ledger: &LoadLedger,
    ) -> Result<TableLoadStats> {
        let mut conn = Checkout::acquire(factory, format!("load {}", table))
            .map_err(|e| self.connect_failure(table, e))?;
        self.load_table(&mut *conn, generator, table, ledger)
    }

    fn connect_failure(&self, table: &str, source: EngineError) -> BenchError {
        LoadFailure {
            table: table.to_string(),
            rows_committed: 0,
            batch_index: 0,
            attempts: 1,
            source,
        }
        .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use querybench_core::testing::{EngineEvent, RecordingEngine, RecordingFactory};
    use querybench_core::{
        ColumnDef, ColumnType, ForeignKey, GenerationPlan, SchemaSpec, TableDef, TablePlan,
    };

    fn schema() -> SchemaSpec {
        SchemaSpec::new(vec![
            TableDef::new("customers", "id")
                .column(ColumnDef::new("id", ColumnType::Integer))
                .column(ColumnDef::new("name", ColumnType::Text)),
            TableDef::new("orders", "id")
                .column(ColumnDef::new("id", ColumnType::Integer))
                .column(ColumnDef::new("customer_id", ColumnType::Integer))
                .foreign_key(ForeignKey::new("customer_id", "customers")),
        ])
    }

    fn generator(customers: u64, orders: u64) -> DataGenerator {
        let plan = GenerationPlan::new()
            .table(TablePlan::new("customers", customers, 1))
            .table(TablePlan::new("orders", orders, 2));
        DataGenerator::new(&schema(), &plan).unwrap()
    }

    fn options(batch_size: usize, retries: usize) -> LoadOptions {
        LoadOptions {
            batch_size,
            retry: RetryConfig::new().with_max_retries(retries).with_base_delay_ms(1),
            parallel: false,
        }
    }

    #[test]
    fn test_load_table_batches() {
        let gen = generator(25, 0);
        let mut engine = RecordingEngine::new();
        let loader = DatasetLoader::new(options(10, 0));
        let ledger = LoadLedger::new();
        let stats = loader.load_table(&mut engine, &gen, "customers", &ledger).unwrap();
        assert_eq!(stats.rows, 25);
        assert_eq!(stats.batches, 3);
        assert!(ledger.is_complete("customers"));
        let sizes: Vec<u64> = engine
            .events()
            .into_iter()
            .filter_map(|e| match e {
                EngineEvent::Insert { rows, .. } => Some(rows),
                _ => None,
            })
            .collect();
        assert_eq!(sizes, vec![10, 10, 5]);
    }

    #[test]
    fn test_child_before_parent_is_ordering_violation() {
        let gen = generator(5, 5);
        let mut engine = RecordingEngine::new();
        let loader = DatasetLoader::new(options(10, 0));
        let err = loader
            .load_table(&mut engine, &gen, "orders", &LoadLedger::new())
            .unwrap_err();
        assert!(matches!(
            err,
            BenchError::OrderingViolation { ref table, ref missing_parent }
                if table == "orders" && missing_parent == "customers"
        ));
        assert_eq!(engine.row_count("orders"), 0);
    }

    #[test]
    fn test_transient_failures_retried() {
        let gen = generator(30, 0);
        let mut engine = RecordingEngine::new();
        engine.fail_next_inserts("customers", 2, EngineError::connection("reset"));
        let loader = DatasetLoader::new(options(10, 3));
        let stats = loader
            .load_table(&mut engine, &gen, "customers", &LoadLedger::new())
            .unwrap();
        assert_eq!(stats.rows, 30);
        assert_eq!(stats.retries, 2);
        assert_eq!(engine.row_count("customers"), 30);
    }

    #[test]
    fn test_exhausted_retries_report_committed_rows() {
        let gen = generator(30, 0);
        let mut engine = RecordingEngine::new();
        engine.fail_inserts_after("customers", 1, 2, EngineError::connection("reset"));
        let loader = DatasetLoader::new(options(10, 1));
        let ledger = LoadLedger::new();

        let err = loader
            .load_table(&mut engine, &gen, "customers", &ledger)
            .unwrap_err();
        match err {
            BenchError::LoadFailure(failure) => {
                assert_eq!(failure.table, "customers");
                assert_eq!(failure.rows_committed, 10);
                assert_eq!(failure.batch_index, 1);
                assert_eq!(failure.attempts, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
        // Committed batches are not rolled back.
        assert_eq!(engine.row_count("customers"), 10);
        assert!(!ledger.is_complete("customers"));
    }

    #[test]
    fn test_no_retry_fails_on_first_error() {
        let gen = generator(30, 0);
        let mut engine = RecordingEngine::new();
        engine.fail_inserts_after("customers", 2, 1, EngineError::constraint("duplicate key"));
        let loader = DatasetLoader::new(options(10, 0));
        let err = loader
            .load_table(&mut engine, &gen, "customers", &LoadLedger::new())
            .unwrap_err();
        assert!(matches!(
            err,
            BenchError::LoadFailure(ref f) if f.attempts == 1 && f.rows_committed == 20
        ));
    }

    #[test]
    fn test_syntax_errors_not_retried() {
        let gen = generator(5, 0);
        let mut engine = RecordingEngine::new();
        engine.fail_next_inserts(
            "customers",
            1,
            EngineError::new(querybench_core::EngineErrorKind::Syntax, "no such table"),
        );
        let loader = DatasetLoader::new(options(10, 3));
        let err = loader
            .load_table(&mut engine, &gen, "customers", &LoadLedger::new())
            .unwrap_err();
        assert!(matches!(err, BenchError::LoadFailure(ref f) if f.attempts == 1));
    }

    #[test]
    fn test_load_all_orders_parents_first() {
        let gen = generator(100, 500);
        let engine = RecordingEngine::new();
        let factory = RecordingFactory::new(engine.clone());
        let loader = DatasetLoader::new(options(64, 0));
        let report = loader.load_all(&factory, &gen).unwrap();
        assert!(report.is_success());
        assert_eq!(report.total_rows(), 600);
        assert_eq!(engine.insert_order(), vec!["customers", "orders"]);
        assert_eq!(engine.connections_opened(), engine.connections_closed());
    }

    #[test]
    fn test_failed_parent_skips_children() {
        let gen = generator(10, 10);
        let engine = RecordingEngine::new();
        engine.fail_next_inserts("customers", 5, EngineError::connection("down"));
        let factory = RecordingFactory::new(engine.clone());
        let loader = DatasetLoader::new(options(100, 1));
        let report = loader.load_all(&factory, &gen).unwrap();

        assert!(!report.is_success());
        assert!(matches!(
            report.outcome("customers").unwrap().status,
            TableLoadStatus::Failed(_)
        ));
        assert_eq!(
            report.outcome("orders").unwrap().status,
            TableLoadStatus::Skipped {
                parent: "customers".into()
            }
        );
        assert_eq!(engine.row_count("orders"), 0);
        assert_eq!(report.failures().count(), 1);
    }

    #[test]
    fn test_create_schema_runs_ddl_in_order() {
        let mut engine = RecordingEngine::new();
        DatasetLoader::default()
            .create_schema(&mut engine, &schema())
            .unwrap();
        let sql = engine.executed_sql();
        assert_eq!(sql.len(), 2);
        assert!(sql[0].contains("customers"));
        assert!(sql[1].contains("orders"));
    }

    #[test]
    fn test_options_from_config() {
        let config = HarnessConfig {
            batch_size: 500,
            parallel_table_load: true,
            ..Default::default()
        };
        let options = LoadOptions::from(&config);
        assert_eq!(options.batch_size, 500);
        assert!(options.parallel);
    }
}
