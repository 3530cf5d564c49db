//! Core types and traits for querybench
//!
//! This crate defines the foundational types used throughout the harness:
//! - SchemaSpec / TableDef: tables, typed columns, primary and foreign keys
//! - GenerationPlan: row counts, seeds and per-column value policies
//! - QueryVariant / Params: named, parameterized queries and their bindings
//! - ExecutionSample / VariantSummary / ComparisonResult: measurement records
//! - EngineConnection / ConnectionFactory: the engine capability interface
//! - HarnessConfig / ExperimentFile: explicit configuration
//! - Error: the harness error taxonomy
//! - testing: an in-memory recording engine for tests (feature `testing`)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod plan;
pub mod retry;
pub mod sample;
pub mod schema;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod traits;
pub mod value;
pub mod variant;

pub use config::{ExperimentFile, HarnessConfig, TableEntry, VariantEntry};
pub use error::{
    BenchError, EngineError, EngineErrorKind, EngineResult, LoadFailure, Result, RunAborted,
    RunPhase, SchemaError,
};
pub use plan::{ColumnPlan, ColumnPolicy, FkSampling, GenerationPlan, TablePlan};
pub use retry::RetryConfig;
pub use sample::{ComparisonResult, ConfidenceNote, DistributionStats, ExecutionSample, VariantSummary};
pub use schema::{ColumnDef, ColumnType, ForeignKey, SchemaSpec, TableDef};
pub use traits::{Checkout, ConnectionFactory, EngineConnection, EngineStats, ExecOutcome, ExecOutput};
pub use value::{Row, SqlValue};
pub use variant::{placeholder_count, Params, QueryVariant, VariantTag};
