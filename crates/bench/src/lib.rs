//! Query variant benchmarking
//!
//! - [`registry`]: named query variants tagged baseline or candidate
//! - [`runner`]: warm-up plus measured executions on one connection
//! - [`aggregate`]: samples to mean/median/stddev summaries
//! - [`compare`]: baseline vs candidate improvement and confidence flag
//! - [`experiment`]: runs a whole registry and collects a structured report
//! - [`report`]: table, CSV and JSON rendering

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod aggregate;
pub mod compare;
pub mod experiment;
pub mod registry;
pub mod report;
pub mod runner;

pub use aggregate::{distribution, summarize};
pub use compare::{improvement, Comparator};
pub use experiment::{Experiment, ExperimentReport, VariantOutcome, VariantStatus};
pub use registry::VariantRegistry;
pub use report::{render, OutputFormat, ReportRow};
pub use runner::{BenchmarkRunner, RunOptions, RunRecord};
