//! SQLite connections and the factory that opens them

use crate::convert::{engine_error, to_value};
use querybench_core::{
    ConnectionFactory, EngineConnection, EngineError, EngineResult, EngineStats, ExecOutcome,
    ExecOutput, Row, SqlValue, TableDef,
};
use rusqlite::{params_from_iter, Connection, StatementStatus, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// VM instructions between deadline checks
const PROGRESS_OPS: i32 = 1000;

/// How long a writer waits on another connection's lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

const DEFAULT_PRAGMAS: &[&str] = &[
    "foreign_keys = ON",
    "journal_mode = WAL",
    "synchronous = NORMAL",
];

/// One open SQLite database handle
pub struct SqliteConnection {
    conn: Option<Connection>,
    path: PathBuf,
}

impl SqliteConnection {
    /// Open `path` and apply the default pragmas
    pub fn open(path: impl AsRef<Path>) -> EngineResult<Self> {
        let pragmas: Vec<String> = DEFAULT_PRAGMAS.iter().map(|p| p.to_string()).collect();
        Self::open_with(path.as_ref(), &pragmas)
    }

    fn open_with(path: &Path, pragmas: &[String]) -> EngineResult<Self> {
        let conn = Connection::open(path).map_err(|e| engine_error("open", e))?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| engine_error("busy_timeout", e))?;
        let batch: String = pragmas.iter().map(|p| format!("PRAGMA {};\n", p)).collect();
        conn.execute_batch(&batch)
            .map_err(|e| engine_error("pragma", e))?;
        debug!(target: "querybench::conn", path = %path.display(), "SQLite connection opened");
        Ok(Self {
            conn: Some(conn),
            path: path.to_path_buf(),
        })
    }

    /// Database file this connection is bound to
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn conn(&mut self) -> EngineResult<&mut Connection> {
        self.conn
            .as_mut()
            .ok_or_else(|| EngineError::connection("SQLite connection already closed"))
    }
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("path", &self.path)
            .field("open", &self.conn.is_some())
            .finish()
    }
}

impl EngineConnection for SqliteConnection {
    fn engine_name(&self) -> &str {
        "sqlite"
    }

    fn execute(
        &mut self,
        sql: &str,
        params: &[SqlValue],
        timeout: Option<Duration>,
    ) -> EngineResult<ExecOutcome> {
        let conn = self.conn()?;
        match timeout {
            Some(limit) => {
                let deadline = Instant::now() + limit;
                conn.progress_handler(PROGRESS_OPS, Some(move || Instant::now() >= deadline));
            }
            None => conn.progress_handler(0, None::<fn() -> bool>),
        }

        let result = run_statement(conn, sql, params);
        conn.progress_handler(0, None::<fn() -> bool>);

        result.map_err(|err| match (err.is_timeout(), timeout) {
            (true, Some(limit)) => {
                EngineError::timeout(format!("execution exceeded {:?}: {}", limit, err.message))
            }
            _ => err,
        })
    }

    fn bulk_insert(&mut self, table: &TableDef, rows: &[Row]) -> EngineResult<u64> {
        let sql = insert_sql(table);
        let conn = self.conn()?;
        // Write lock at BEGIN; concurrent loaders queue on the busy timeout
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| engine_error("begin", e))?;
        {
            let mut stmt = tx
                .prepare_cached(&sql)
                .map_err(|e| engine_error("prepare", e))?;
            for row in rows {
                stmt.execute(params_from_iter(row.iter().map(to_value)))
                    .map_err(|e| engine_error("insert", e))?;
            }
        }
        tx.commit().map_err(|e| engine_error("commit", e))?;
        Ok(rows.len() as u64)
    }

    fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err((_, e)) = conn.close() {
                warn!(target: "querybench::conn", path = %self.path.display(), error = %e, "SQLite close failed");
            }
        }
    }
}

fn run_statement(conn: &Connection, sql: &str, params: &[SqlValue]) -> EngineResult<ExecOutcome> {
    let mut stmt = conn
        .prepare_cached(sql)
        .map_err(|e| engine_error("prepare", e))?;
    stmt.reset_status(StatementStatus::VmStep);
    stmt.reset_status(StatementStatus::FullscanStep);

    let values = params.iter().map(to_value);
    let start = Instant::now();
    let output = if stmt.column_count() > 0 {
        let mut rows = stmt
            .query(params_from_iter(values))
            .map_err(|e| engine_error("query", e))?;
        let mut count = 0u64;
        while rows.next().map_err(|e| engine_error("step", e))?.is_some() {
            count += 1;
        }
        ExecOutput::ResultSet { rows: count }
    } else {
        let affected = stmt
            .execute(params_from_iter(values))
            .map_err(|e| engine_error("execute", e))?;
        ExecOutput::Affected(affected as u64)
    };
    let engine_elapsed = start.elapsed();

    Ok(ExecOutcome {
        output,
        stats: EngineStats {
            engine_elapsed,
            cpu_time: None,
            logical_reads: stmt.get_status(StatementStatus::VmStep).max(0) as u64,
            physical_reads: stmt.get_status(StatementStatus::FullscanStep).max(0) as u64,
        },
    })
}

fn insert_sql(table: &TableDef) -> String {
    let columns = table.column_names();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table.name,
        columns.join(", "),
        placeholders.join(", ")
    )
}

/// Opens [`SqliteConnection`]s on one database file
#[derive(Debug, Clone)]
pub struct SqliteFactory {
    path: PathBuf,
    pragmas: Vec<String>,
}

impl SqliteFactory {
    /// Factory for the database at `path`; the file is created on first connect
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pragmas: DEFAULT_PRAGMAS.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// Add a pragma (without the `PRAGMA` keyword) applied on every connect
    pub fn with_pragma(mut self, pragma: impl Into<String>) -> Self {
        self.pragmas.push(pragma.into());
        self
    }

    /// Database file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConnectionFactory for SqliteFactory {
    fn connect(&self) -> EngineResult<Box<dyn EngineConnection>> {
        let conn = SqliteConnection::open_with(&self.path, &self.pragmas)?;
        Ok(Box::new(conn))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use querybench_core::{ColumnDef, ColumnType, EngineErrorKind, ForeignKey, SchemaSpec};
    use tempfile::TempDir;

    fn schema() -> SchemaSpec {
        SchemaSpec::new(vec![
            TableDef::new("customers", "id")
                .column(ColumnDef::new("id", ColumnType::Integer))
                .column(ColumnDef::new("name", ColumnType::Text)),
            TableDef::new("orders", "id")
                .column(ColumnDef::new("id", ColumnType::Integer))
                .column(ColumnDef::new("customer_id", ColumnType::Integer))
                .column(ColumnDef::new("paid", ColumnType::Boolean))
                .foreign_key(ForeignKey::new("customer_id", "customers")),
        ])
    }

    fn setup() -> (TempDir, SqliteConnection) {
        let dir = TempDir::new().unwrap();
        let mut conn = SqliteConnection::open(dir.path().join("bench.db")).unwrap();
        for ddl in schema().create_table_sql() {
            conn.execute(&ddl, &[], None).unwrap();
        }
        (dir, conn)
    }

    fn customers(n: i64) -> Vec<Row> {
        (1..=n)
            .map(|i| vec![SqlValue::Integer(i), SqlValue::Text(format!("c{}", i))])
            .collect()
    }

    fn count(conn: &mut SqliteConnection, table: &str) -> u64 {
        let sql = format!("SELECT * FROM {}", table);
        conn.execute(&sql, &[], None).unwrap().output.row_count()
    }

    #[test]
    fn test_bulk_insert_and_query() {
        let (_dir, mut conn) = setup();
        let schema = schema();
        let written = conn
            .bulk_insert(schema.table("customers").unwrap(), &customers(25))
            .unwrap();
        assert_eq!(written, 25);

        let outcome = conn
            .execute("SELECT * FROM customers WHERE id > ?1", &[SqlValue::Integer(20)], None)
            .unwrap();
        assert_eq!(outcome.output, ExecOutput::ResultSet { rows: 5 });
        assert!(outcome.stats.logical_reads > 0);
        assert_eq!(outcome.stats.cpu_time, None);
    }

    #[test]
    fn test_dml_reports_affected_rows() {
        let (_dir, mut conn) = setup();
        let schema = schema();
        conn.bulk_insert(schema.table("customers").unwrap(), &customers(10))
            .unwrap();
        let outcome = conn
            .execute(
                "UPDATE customers SET name = ?1 WHERE id <= ?2",
                &[SqlValue::Text("x".into()), SqlValue::Integer(4)],
                None,
            )
            .unwrap();
        assert_eq!(outcome.output, ExecOutput::Affected(4));
    }

    #[test]
    fn test_foreign_key_violation_rolls_back_batch() {
        let (_dir, mut conn) = setup();
        let schema = schema();
        conn.bulk_insert(schema.table("customers").unwrap(), &customers(2))
            .unwrap();

        let orders = vec![
            vec![SqlValue::Integer(1), SqlValue::Integer(1), SqlValue::Bool(true)],
            vec![SqlValue::Integer(2), SqlValue::Integer(99), SqlValue::Bool(false)],
        ];
        let err = conn
            .bulk_insert(schema.table("orders").unwrap(), &orders)
            .unwrap_err();
        assert_eq!(err.kind, EngineErrorKind::Constraint);
        assert_eq!(count(&mut conn, "orders"), 0);
    }

    #[test]
    fn test_syntax_error_kind() {
        let (_dir, mut conn) = setup();
        let err = conn.execute("SELEC * FROM customers", &[], None).unwrap_err();
        assert_eq!(err.kind, EngineErrorKind::Syntax);
        let err = conn.execute("SELECT * FROM missing", &[], None).unwrap_err();
        assert_eq!(err.kind, EngineErrorKind::Syntax);
    }

    #[test]
    fn test_timeout_interrupts_execution() {
        let (_dir, mut conn) = setup();
        let endless = "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c) \
                       SELECT COUNT(*) FROM c";
        let err = conn
            .execute(endless, &[], Some(Duration::from_millis(50)))
            .unwrap_err();
        assert!(err.is_timeout());

        // The handler is cleared afterwards
        let outcome = conn.execute("SELECT 1", &[], None).unwrap();
        assert_eq!(outcome.output.row_count(), 1);
    }

    #[test]
    fn test_closed_connection() {
        let (_dir, mut conn) = setup();
        conn.close();
        let err = conn.execute("SELECT 1", &[], None).unwrap_err();
        assert_eq!(err.kind, EngineErrorKind::Connection);
        conn.close();
    }

    #[test]
    fn test_factory_opens_independent_connections() {
        let dir = TempDir::new().unwrap();
        let factory = SqliteFactory::new(dir.path().join("shared.db")).with_pragma("cache_size = -2000");
        let mut a = factory.connect().unwrap();
        let mut b = factory.connect().unwrap();
        a.execute("CREATE TABLE t (id INTEGER PRIMARY KEY)", &[], None)
            .unwrap();
        a.execute("INSERT INTO t (id) VALUES (?1)", &[SqlValue::Integer(1)], None)
            .unwrap();
        let seen = b.execute("SELECT id FROM t", &[], None).unwrap();
        assert_eq!(seen.output.row_count(), 1);
        assert_eq!(b.engine_name(), "sqlite");
    }

    #[test]
    fn test_factory_reports_unopenable_path() {
        let dir = TempDir::new().unwrap();
        let factory = SqliteFactory::new(dir.path().join("missing").join("bench.db"));
        let err = factory.connect().err().expect("connect should fail");
        assert_eq!(err.kind, EngineErrorKind::Connection);
    }

    #[test]
    fn test_insert_sql() {
        let schema = schema();
        assert_eq!(
            insert_sql(schema.table("orders").unwrap()),
            "INSERT INTO orders (id, customer_id, paid) VALUES (?1, ?2, ?3)"
        );
    }
}
