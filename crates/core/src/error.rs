//! Error types for the benchmark harness
//!
//! This module defines the error taxonomy shared by every layer:
//! schema/plan errors, load sequencing and load failures, aborted
//! benchmark runs, aggregation on too few samples and registry misses.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use crate::sample::ExecutionSample;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias for harness operations
pub type Result<T> = std::result::Result<T, BenchError>;

/// Top-level harness error
#[derive(Debug, Error)]
pub enum BenchError {
    /// Malformed or cyclic schema, or a plan that cannot be honored.
    /// Fatal: raised before any I/O happens.
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// A child table was loaded before its parent finished loading
    #[error("Ordering violation: table '{table}' loaded before parent '{missing_parent}' completed")]
    OrderingViolation {
        /// Table whose load was attempted
        table: String,
        /// Parent table that had not completed
        missing_parent: String,
    },

    /// Bulk insert exhausted its retries
    #[error(transparent)]
    LoadFailure(#[from] LoadFailure),

    /// A variant's benchmark run failed part-way through
    #[error(transparent)]
    RunAborted(#[from] RunAborted),

    /// Aggregation attempted with fewer than two samples
    #[error("Insufficient samples for variant '{variant}': got {count}, need at least 2")]
    InsufficientSamples {
        /// Variant being summarized
        variant: String,
        /// Number of samples supplied
        count: usize,
    },

    /// Unknown variant name
    #[error("Variant not found: {name}")]
    NotFound {
        /// Requested name
        name: String,
    },

    /// Configuration could not be read, parsed or validated
    #[error("Configuration error: {0}")]
    Config(String),

    /// Engine error outside of load and run paths (schema setup, connect)
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
}

impl BenchError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        BenchError::Config(msg.into())
    }

    /// Create a not-found error
    pub fn not_found(name: impl Into<String>) -> Self {
        BenchError::NotFound { name: name.into() }
    }

    /// Errors that indicate a bug in configuration or sequencing.
    ///
    /// These are never retried.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BenchError::Schema(_) | BenchError::OrderingViolation { .. } | BenchError::Config(_)
        )
    }
}

/// Schema and generation-plan validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// Two tables share a name
    #[error("table '{0}' is defined more than once")]
    DuplicateTable(String),

    /// A table declares no columns
    #[error("table '{0}' has no columns")]
    EmptyTable(String),

    /// Column name repeated within a table
    #[error("column '{column}' is defined more than once in table '{table}'")]
    DuplicateColumn {
        /// Table name
        table: String,
        /// Repeated column
        column: String,
    },

    /// Referenced column does not exist
    #[error("table '{table}' has no column '{column}'")]
    UnknownColumn {
        /// Table name
        table: String,
        /// Missing column
        column: String,
    },

    /// Foreign key references a table that is not defined at all
    #[error("table '{table}' references undefined table '{referenced}'")]
    UnknownTable {
        /// Referencing table
        table: String,
        /// Missing table
        referenced: String,
    },

    /// Foreign key references a table defined at or after the referencing one
    #[error("table '{table}' references '{referenced}', which is not defined before it")]
    ForwardReference {
        /// Referencing table
        table: String,
        /// Table defined later (or the table itself)
        referenced: String,
    },

    /// Foreign key target column is not the parent's primary key
    #[error(
        "foreign key {table}.{column} must reference the primary key of '{referenced_table}', not '{referenced_column}'"
    )]
    NotPrimaryKey {
        /// Referencing table
        table: String,
        /// Referencing column
        column: String,
        /// Parent table
        referenced_table: String,
        /// Column named by the foreign key
        referenced_column: String,
    },

    /// Plan names a table the schema does not define
    #[error("generation plan names undefined table '{0}'")]
    PlanForUnknownTable(String),

    /// Table has no entry in the generation plan
    #[error("generation plan has no entry for table '{0}'")]
    MissingPlan(String),

    /// Parent has zero planned rows but a child must sample from it
    #[error("table '{table}' samples foreign keys from '{parent}', which has zero planned rows")]
    EmptyParent {
        /// Child table
        table: String,
        /// Parent table with no rows
        parent: String,
    },

    /// Column policy cannot be applied to the column
    #[error("invalid policy for {table}.{column}: {reason}")]
    InvalidPolicy {
        /// Table name
        table: String,
        /// Column name
        column: String,
        /// Why the policy was rejected
        reason: String,
    },
}

/// Category of an engine failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineErrorKind {
    /// Connection lost or could not be opened
    Connection,
    /// Constraint violation (unique, foreign key, not null)
    Constraint,
    /// Execution exceeded the per-execution timeout
    Timeout,
    /// SQL could not be parsed or prepared
    Syntax,
    /// Anything else the engine reports
    Other,
}

impl fmt::Display for EngineErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineErrorKind::Connection => "connection",
            EngineErrorKind::Constraint => "constraint",
            EngineErrorKind::Timeout => "timeout",
            EngineErrorKind::Syntax => "syntax",
            EngineErrorKind::Other => "other",
        };
        f.write_str(name)
    }
}

/// Opaque engine failure
///
/// The harness does not interpret engine errors beyond their kind.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind} error: {message}")]
pub struct EngineError {
    /// Failure category
    pub kind: EngineErrorKind,
    /// Engine-provided message
    pub message: String,
}

impl EngineError {
    /// Create a new engine error
    pub fn new(kind: EngineErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Connection failure
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::Connection, message)
    }

    /// Constraint violation
    pub fn constraint(message: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::Constraint, message)
    }

    /// Timeout
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::Timeout, message)
    }

    /// Unclassified failure
    pub fn other(message: impl Into<String>) -> Self {
        Self::new(EngineErrorKind::Other, message)
    }

    /// Whether this error ended because the execution deadline passed
    pub fn is_timeout(&self) -> bool {
        self.kind == EngineErrorKind::Timeout
    }

    /// Whether a bulk-load batch failing with this error may be retried.
    ///
    /// Syntax errors recur on every attempt.
    pub fn is_retryable(&self) -> bool {
        self.kind != EngineErrorKind::Syntax
    }
}

/// Result alias for engine calls
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// A table load that exhausted its batch retries
///
/// Rows from earlier batches stay committed; cleaning them up is the
/// caller's responsibility.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[error(
    "Load failure for table '{table}': batch {batch_index} failed after {attempts} attempts ({rows_committed} rows committed): {source}"
)]
pub struct LoadFailure {
    /// Table being loaded
    pub table: String,
    /// Rows committed by earlier batches
    pub rows_committed: u64,
    /// Zero-based index of the failing batch
    pub batch_index: u64,
    /// Attempts made for the failing batch
    pub attempts: usize,
    /// Last engine error
    #[source]
    pub source: EngineError,
}

/// Stage of a benchmark run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    /// Variant setup statements
    Setup,
    /// Discarded warm-up executions
    Warmup,
    /// Measured executions
    Measured,
    /// Variant teardown statements
    Teardown,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Setup => "setup",
            RunPhase::Warmup => "warm-up",
            RunPhase::Measured => "measured",
            RunPhase::Teardown => "teardown",
        };
        f.write_str(name)
    }
}

/// A variant run that failed part-way through
///
/// Carries every measured sample collected before the failure. The run is
/// never resumed; callers restart from scratch.
#[derive(Debug, Clone, PartialEq, Error)]
#[error(
    "Run aborted for variant '{variant}' at {phase} iteration {iteration} ({} samples collected): {source}",
    .samples.len()
)]
pub struct RunAborted {
    /// Variant being benchmarked
    pub variant: String,
    /// Phase in which the failure occurred
    pub phase: RunPhase,
    /// Zero-based raw iteration (warm-up and measured counted together)
    pub iteration: usize,
    /// Measured samples collected before the failure
    pub samples: Vec<ExecutionSample>,
    /// Engine error that ended the run
    #[source]
    pub source: EngineError,
}
