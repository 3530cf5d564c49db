//! Test doubles for the engine connection interface
//!
//! [`RecordingEngine`] is an in-memory engine that records every bulk insert
//! and execution, reports deterministic counters and fails on demand. Clones
//! share state, so a [`RecordingFactory`] can hand out many connections while
//! the test inspects one handle.
//!
//! # Example
//!
//! ```ignore
//! let engine = RecordingEngine::new();
//! engine.fail_next_inserts("orders", 2, EngineError::connection("reset"));
//! let factory = RecordingFactory::new(engine.clone());
//! // ... run the loader ...
//! assert_eq!(engine.rows("orders").len(), 5000);
//! ```

use crate::error::{EngineError, EngineResult};
use crate::schema::TableDef;
use crate::traits::{ConnectionFactory, EngineConnection, EngineStats, ExecOutcome, ExecOutput};
use crate::value::{Row, SqlValue};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// Something the engine was asked to do
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A committed bulk insert
    Insert {
        /// Target table
        table: String,
        /// Rows in the batch
        rows: u64,
    },
    /// A successful statement execution
    Execute {
        /// SQL text
        sql: String,
        /// Bound parameters
        params: Vec<SqlValue>,
    },
}

#[derive(Debug, Default)]
struct EngineState {
    tables: HashMap<String, Vec<Row>>,
    events: Vec<EngineEvent>,
    execute_calls: usize,
    insert_script: HashMap<String, VecDeque<Option<EngineError>>>,
    execute_failures: HashMap<usize, EngineError>,
    execute_delay: Duration,
    report_cpu: bool,
    opened: usize,
    closed: usize,
    active: usize,
    max_active: usize,
}

/// Scripted in-memory engine
#[derive(Debug, Clone, Default)]
pub struct RecordingEngine {
    state: Arc<Mutex<EngineState>>,
}

impl RecordingEngine {
    /// Empty engine
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` bulk inserts into `table` with `error`
    pub fn fail_next_inserts(&self, table: &str, times: usize, error: EngineError) {
        self.fail_inserts_after(table, 0, times, error);
    }

    /// Let `successes` bulk inserts into `table` through, then fail the
    /// following `times` with `error`
    pub fn fail_inserts_after(&self, table: &str, successes: usize, times: usize, error: EngineError) {
        let mut state = self.state.lock();
        let queue = state.insert_script.entry(table.to_string()).or_default();
        queue.extend(std::iter::repeat(None).take(successes));
        queue.extend(std::iter::repeat(Some(error)).take(times));
    }

    /// Fail the execute call with zero-based index `call` (counted across
    /// all connections)
    pub fn fail_execute_at(&self, call: usize, error: EngineError) {
        self.state.lock().execute_failures.insert(call, error);
    }

    /// Sleep this long inside every execute call
    pub fn set_execute_delay(&self, delay: Duration) {
        self.state.lock().execute_delay = delay;
    }

    /// Report CPU time (half the execute delay) with every execution
    pub fn report_cpu_time(&self, enabled: bool) {
        self.state.lock().report_cpu = enabled;
    }

    /// Rows committed to `table`
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.state.lock().tables.get(table).cloned().unwrap_or_default()
    }

    /// Number of rows committed to `table`
    pub fn row_count(&self, table: &str) -> usize {
        self.state.lock().tables.get(table).map(Vec::len).unwrap_or(0)
    }

    /// Every recorded event, in order
    pub fn events(&self) -> Vec<EngineEvent> {
        self.state.lock().events.clone()
    }

    /// Tables in the order their first batch was committed
    pub fn insert_order(&self) -> Vec<String> {
        let mut order: Vec<String> = Vec::new();
        for event in self.state.lock().events.iter() {
            if let EngineEvent::Insert { table, .. } = event {
                if !order.contains(table) {
                    order.push(table.clone());
                }
            }
        }
        order
    }

    /// SQL of every successful execution, in order
    pub fn executed_sql(&self) -> Vec<String> {
        self.state
            .lock()
            .events
            .iter()
            .filter_map(|e| match e {
                EngineEvent::Execute { sql, .. } => Some(sql.clone()),
                _ => None,
            })
            .collect()
    }

    /// Execute calls attempted so far (including failed ones)
    pub fn execute_calls(&self) -> usize {
        self.state.lock().execute_calls
    }

    /// Connections opened through a factory
    pub fn connections_opened(&self) -> usize {
        self.state.lock().opened
    }

    /// Connections closed
    pub fn connections_closed(&self) -> usize {
        self.state.lock().closed
    }

    /// Highest number of simultaneously open connections
    pub fn max_concurrent_connections(&self) -> usize {
        self.state.lock().max_active
    }

    fn opened(&self) {
        let mut state = self.state.lock();
        state.opened += 1;
        state.active += 1;
        state.max_active = state.max_active.max(state.active);
    }
}

impl EngineConnection for RecordingEngine {
    fn engine_name(&self) -> &str {
        "recording"
    }

    fn execute(
        &mut self,
        sql: &str,
        params: &[SqlValue],
        timeout: Option<Duration>,
    ) -> EngineResult<ExecOutcome> {
        let (call, delay, report_cpu, failure) = {
            let mut state = self.state.lock();
            let call = state.execute_calls;
            state.execute_calls += 1;
            let failure = state.execute_failures.remove(&call);
            (call, state.execute_delay, state.report_cpu, failure)
        };

        if let Some(error) = failure {
            return Err(error);
        }
        if let Some(limit) = timeout {
            if delay > limit {
                std::thread::sleep(limit);
                return Err(EngineError::timeout(format!(
                    "execution exceeded {}ms",
                    limit.as_millis()
                )));
            }
        }
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let is_query = sql.trim_start().to_ascii_uppercase().starts_with("SELECT");
        let output = if is_query {
            ExecOutput::ResultSet { rows: 1 }
        } else {
            ExecOutput::Affected(0)
        };

        self.state.lock().events.push(EngineEvent::Execute {
            sql: sql.to_string(),
            params: params.to_vec(),
        });

        let n = call as u64 + 1;
        Ok(ExecOutcome {
            output,
            stats: EngineStats {
                engine_elapsed: delay,
                cpu_time: report_cpu.then(|| delay / 2),
                logical_reads: n * 10,
                physical_reads: n,
            },
        })
    }

    fn bulk_insert(&mut self, table: &TableDef, rows: &[Row]) -> EngineResult<u64> {
        let mut state = self.state.lock();
        if let Some(Some(error)) = state
            .insert_script
            .get_mut(&table.name)
            .and_then(VecDeque::pop_front)
        {
            return Err(error);
        }
        state
            .tables
            .entry(table.name.clone())
            .or_default()
            .extend(rows.iter().cloned());
        state.events.push(EngineEvent::Insert {
            table: table.name.clone(),
            rows: rows.len() as u64,
        });
        Ok(rows.len() as u64)
    }

    fn close(&mut self) {
        let mut state = self.state.lock();
        state.closed += 1;
        state.active = state.active.saturating_sub(1);
    }
}

/// Factory handing out connections to a shared [`RecordingEngine`]
#[derive(Debug, Clone)]
pub struct RecordingFactory {
    engine: RecordingEngine,
}

impl RecordingFactory {
    /// Wrap an engine
    pub fn new(engine: RecordingEngine) -> Self {
        Self { engine }
    }

    /// The shared engine
    pub fn engine(&self) -> &RecordingEngine {
        &self.engine
    }
}

impl ConnectionFactory for RecordingFactory {
    fn connect(&self) -> EngineResult<Box<dyn EngineConnection>> {
        self.engine.opened();
        Ok(Box::new(self.engine.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDef, ColumnType};

    fn table() -> TableDef {
        TableDef::new("t", "id").column(ColumnDef::new("id", ColumnType::Integer))
    }

    #[test]
    fn test_records_inserts() {
        let mut engine = RecordingEngine::new();
        engine
            .bulk_insert(&table(), &[vec![SqlValue::Integer(1)], vec![SqlValue::Integer(2)]])
            .unwrap();
        assert_eq!(engine.row_count("t"), 2);
        assert_eq!(engine.insert_order(), vec!["t".to_string()]);
    }

    #[test]
    fn test_scripted_insert_failures() {
        let mut engine = RecordingEngine::new();
        engine.fail_next_inserts("t", 1, EngineError::connection("reset"));
        assert!(engine.bulk_insert(&table(), &[vec![SqlValue::Integer(1)]]).is_err());
        assert!(engine.bulk_insert(&table(), &[vec![SqlValue::Integer(1)]]).is_ok());
        assert_eq!(engine.row_count("t"), 1);
    }

    #[test]
    fn test_scripted_failure_after_successes() {
        let mut engine = RecordingEngine::new();
        engine.fail_inserts_after("t", 1, 1, EngineError::connection("reset"));
        assert!(engine.bulk_insert(&table(), &[vec![SqlValue::Integer(1)]]).is_ok());
        assert!(engine.bulk_insert(&table(), &[vec![SqlValue::Integer(2)]]).is_err());
        assert!(engine.bulk_insert(&table(), &[vec![SqlValue::Integer(3)]]).is_ok());
        assert_eq!(engine.row_count("t"), 2);
    }

    #[test]
    fn test_counters_distinct_per_call() {
        let mut engine = RecordingEngine::new();
        let a = engine.execute("SELECT 1", &[], None).unwrap();
        let b = engine.execute("SELECT 1", &[], None).unwrap();
        assert_eq!(a.stats.logical_reads, 10);
        assert_eq!(b.stats.logical_reads, 20);
        assert_eq!(a.output, ExecOutput::ResultSet { rows: 1 });
    }

    #[test]
    fn test_execute_failure_by_index() {
        let mut engine = RecordingEngine::new();
        engine.fail_execute_at(1, EngineError::other("boom"));
        assert!(engine.execute("SELECT 1", &[], None).is_ok());
        assert!(engine.execute("SELECT 1", &[], None).is_err());
        assert!(engine.execute("SELECT 1", &[], None).is_ok());
        assert_eq!(engine.execute_calls(), 3);
        assert_eq!(engine.executed_sql().len(), 2);
    }

    #[test]
    fn test_timeout() {
        let mut engine = RecordingEngine::new();
        engine.set_execute_delay(Duration::from_millis(50));
        let err = engine
            .execute("SELECT 1", &[], Some(Duration::from_millis(1)))
            .unwrap_err();
        assert!(err.is_timeout());
    }
}
