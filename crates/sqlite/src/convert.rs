//! Value and error conversion between querybench and rusqlite

use querybench_core::{EngineError, EngineErrorKind, SqlValue};
use rusqlite::types::Value;
use rusqlite::ErrorCode;

pub(crate) fn to_value(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(v) => Value::Integer(*v),
        SqlValue::Real(v) => Value::Real(*v),
        SqlValue::Text(s) => Value::Text(s.clone()),
        SqlValue::Bool(b) => Value::Integer(i64::from(*b)),
    }
}

pub(crate) fn classify(err: &rusqlite::Error) -> EngineErrorKind {
    if let rusqlite::Error::InvalidParameterCount(..) | rusqlite::Error::InvalidParameterName(_) =
        err
    {
        return EngineErrorKind::Syntax;
    }
    match err.sqlite_error_code() {
        Some(ErrorCode::OperationInterrupted) => EngineErrorKind::Timeout,
        Some(ErrorCode::ConstraintViolation) => EngineErrorKind::Constraint,
        Some(
            ErrorCode::CannotOpen
            | ErrorCode::NotADatabase
            | ErrorCode::DatabaseBusy
            | ErrorCode::DatabaseLocked
            | ErrorCode::SystemIoFailure,
        ) => EngineErrorKind::Connection,
        // SQLITE_ERROR: parse failures, unknown tables and columns
        Some(ErrorCode::Unknown) => EngineErrorKind::Syntax,
        _ => EngineErrorKind::Other,
    }
}

pub(crate) fn engine_error(context: &str, err: rusqlite::Error) -> EngineError {
    EngineError::new(classify(&err), format!("SQLite {}: {}", context, err))
}
