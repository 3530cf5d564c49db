//! Engine connection capability interface
//!
//! The harness never talks to a database directly. Any engine that can
//! execute parameterized SQL, bulk-insert rows and report per-execution
//! timing and I/O counters can be adapted behind [`EngineConnection`].
//!
//! Counters are requested per call and returned with each result; there are
//! no engine-wide statistics toggles, so concurrent benchmarks on separate
//! connections cannot interfere through shared flags.

use crate::error::EngineResult;
use crate::schema::TableDef;
use crate::value::{Row, SqlValue};
use std::ops::{Deref, DerefMut};
use std::time::Duration;
use tracing::debug;

/// Counters the engine reports for one execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineStats {
    /// Execution time measured by the engine
    pub engine_elapsed: Duration,
    /// CPU time, if the engine exposes it
    pub cpu_time: Option<Duration>,
    /// Logical reads
    pub logical_reads: u64,
    /// Physical reads
    pub physical_reads: u64,
}

/// What a statement produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecOutput {
    /// DML/DDL: rows affected
    Affected(u64),
    /// Query: rows returned (the rows themselves are drained and dropped)
    ResultSet {
        /// Rows returned
        rows: u64,
    },
}

impl ExecOutput {
    /// Rows affected or returned
    pub fn row_count(&self) -> u64 {
        match self {
            ExecOutput::Affected(n) => *n,
            ExecOutput::ResultSet { rows } => *rows,
        }
    }
}

/// Result of one `execute` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecOutcome {
    /// Rows affected or returned
    pub output: ExecOutput,
    /// Engine-reported counters
    pub stats: EngineStats,
}

/// A live connection to the engine under test
///
/// Errors are opaque to the harness beyond their
/// [`EngineErrorKind`](crate::error::EngineErrorKind).
pub trait EngineConnection: Send {
    /// Engine name for logs and reports
    fn engine_name(&self) -> &str;

    /// Execute one statement with positional parameters.
    ///
    /// `timeout` bounds the execution; an engine that hits it returns an
    /// error of kind `Timeout` and the connection should be abandoned.
    fn execute(
        &mut self,
        sql: &str,
        params: &[SqlValue],
        timeout: Option<Duration>,
    ) -> EngineResult<ExecOutcome>;

    /// Insert `rows` (values in `table`'s column order) as one atomic batch.
    ///
    /// Returns the number of rows written.
    fn bulk_insert(&mut self, table: &TableDef, rows: &[Row]) -> EngineResult<u64>;

    /// Release engine resources; called when a checkout ends
    fn close(&mut self) {}
}

/// Opens fresh connections
pub trait ConnectionFactory: Send + Sync {
    /// Open a new, unshared connection
    fn connect(&self) -> EngineResult<Box<dyn EngineConnection>>;
}

/// A connection checked out for one unit of work
///
/// Connections are never pooled across unrelated benchmarks: each checkout
/// opens a fresh connection and closes it on drop.
pub struct Checkout {
    conn: Box<dyn EngineConnection>,
    purpose: String,
}

impl Checkout {
    /// Open a connection for `purpose` (used in logs)
    pub fn acquire(factory: &dyn ConnectionFactory, purpose: impl Into<String>) -> EngineResult<Self> {
        let purpose = purpose.into();
        let conn = factory.connect()?;
        debug!(target: "querybench::conn", engine = conn.engine_name(), purpose = %purpose, "Connection acquired");
        Ok(Self { conn, purpose })
    }
}

impl Deref for Checkout {
    type Target = dyn EngineConnection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref()
    }
}

impl DerefMut for Checkout {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut()
    }
}

impl Drop for Checkout {
    fn drop(&mut self) {
        self.conn.close();
        debug!(target: "querybench::conn", purpose = %self.purpose, "Connection released");
    }
}

impl std::fmt::Debug for Checkout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Checkout")
            .field("engine", &self.conn.engine_name())
            .field("purpose", &self.purpose)
            .finish()
    }
}
