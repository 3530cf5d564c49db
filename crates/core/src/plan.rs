//! Generation plans: row counts, seeds and per-column value policies

use crate::value::SqlValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How a foreign-key column picks a parent key
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FkSampling {
    /// Uniform over the parent's key space
    #[default]
    Uniform,
    /// Cycle through parent keys in order (row i -> parent i mod n)
    RoundRobin,
    /// A hot prefix of the key space receives `hot_weight` of all picks
    Skewed {
        /// Fraction of parent keys that are hot, in (0, 1]
        hot_fraction: f64,
        /// Probability that a pick lands in the hot set, in [0, 1]
        hot_weight: f64,
    },
}

/// Value policy for one column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum ColumnPolicy {
    /// Monotonic counter per table: `start + row_index`
    Sequential {
        /// First value
        #[serde(default = "default_start")]
        start: i64,
    },
    /// Seeded uniform integer in `[min, max]`
    UniformInt {
        /// Lower bound (inclusive)
        min: i64,
        /// Upper bound (inclusive)
        max: i64,
    },
    /// Seeded uniform float in `[min, max)`
    UniformReal {
        /// Lower bound (inclusive)
        min: f64,
        /// Upper bound (exclusive)
        max: f64,
    },
    /// `prefix` followed by the row's sequence number (`start + row_index`)
    Prefixed {
        /// Text prefix
        prefix: String,
        /// First sequence number
        #[serde(default = "default_start")]
        start: i64,
    },
    /// Seeded pick from a fixed list
    OneOf {
        /// Candidate values
        values: Vec<SqlValue>,
    },
    /// The same value on every row
    Constant {
        /// Value to emit
        value: SqlValue,
    },
    /// Seeded boolean
    Bool {
        /// Probability of `true`
        #[serde(default = "default_true_ratio")]
        true_ratio: f64,
    },
    /// Seeded epoch-seconds timestamp in `[start, end]`
    Timestamp {
        /// Earliest timestamp (inclusive)
        start: i64,
        /// Latest timestamp (inclusive)
        end: i64,
    },
    /// Sample an existing parent key
    ForeignKey {
        /// Sampling policy
        #[serde(default)]
        sampling: FkSampling,
    },
}

fn default_start() -> i64 {
    1
}

fn default_true_ratio() -> f64 {
    0.5
}

impl ColumnPolicy {
    /// Whether the policy yields a distinct value for every row
    pub fn is_unique(&self) -> bool {
        matches!(
            self,
            ColumnPolicy::Sequential { .. } | ColumnPolicy::Prefixed { .. }
        )
    }
}

/// Policy for one column plus an optional NULL ratio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnPlan {
    /// Value policy
    #[serde(flatten)]
    pub policy: ColumnPolicy,
    /// Probability of emitting NULL (nullable, non-key columns only)
    #[serde(default)]
    pub null_ratio: f64,
}

impl From<ColumnPolicy> for ColumnPlan {
    fn from(policy: ColumnPolicy) -> Self {
        Self {
            policy,
            null_ratio: 0.0,
        }
    }
}

/// Row count, seed and column policies for one table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TablePlan {
    /// Table name
    pub table: String,
    /// Number of rows to generate
    pub rows: u64,
    /// Seed for this table's value stream
    pub seed: u64,
    /// Column policies; unlisted columns get a type-derived default
    #[serde(default)]
    pub columns: BTreeMap<String, ColumnPlan>,
}

impl TablePlan {
    /// Plan `rows` rows for `table` from `seed`
    pub fn new(table: impl Into<String>, rows: u64, seed: u64) -> Self {
        Self {
            table: table.into(),
            rows,
            seed,
            columns: BTreeMap::new(),
        }
    }

    /// Set a column policy
    pub fn column(mut self, name: impl Into<String>, plan: impl Into<ColumnPlan>) -> Self {
        self.columns.insert(name.into(), plan.into());
        self
    }
}

/// Generation plan across all tables
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationPlan {
    /// Per-table plans
    #[serde(rename = "table", default)]
    pub tables: Vec<TablePlan>,
}

impl GenerationPlan {
    /// Empty plan
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a table plan
    pub fn table(mut self, plan: TablePlan) -> Self {
        self.tables.retain(|t| t.table != plan.table);
        self.tables.push(plan);
        self
    }

    /// Plan for `table`
    pub fn get(&self, table: &str) -> Option<&TablePlan> {
        self.tables.iter().find(|t| t.table == table)
    }

    /// Planned row count for `table` (0 if unplanned)
    pub fn rows(&self, table: &str) -> u64 {
        self.get(table).map(|t| t.rows).unwrap_or(0)
    }
}
