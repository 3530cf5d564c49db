//! querybench - deterministic datasets and query-variant benchmarks for SQL engines
//!
//! querybench generates referentially consistent synthetic datasets from a
//! schema and a seeded plan, loads them into an engine in dependency order,
//! runs competing formulations of the same logical query, and reports whether
//! a candidate is measurably cheaper than its baseline.
//!
//! # Quick Start
//!
//! ```ignore
//! use querybench::{
//!     DataGenerator, DatasetLoader, Experiment, HarnessConfig, QueryVariant, SqliteFactory,
//!     VariantRegistry,
//! };
//!
//! let factory = SqliteFactory::new("bench.db");
//! let generator = DataGenerator::new(&schema, &plan)?;
//! let loader = DatasetLoader::from_config(&config);
//! loader.load_all(&factory, &generator)?;
//!
//! let mut registry = VariantRegistry::new();
//! registry.register(QueryVariant::baseline("scan", "SELECT COUNT(*) FROM orders"));
//! registry.register(QueryVariant::candidate("indexed", "SELECT COUNT(id) FROM orders"));
//! let report = Experiment::new(registry.into(), config).run(&factory);
//! ```
//!
//! # Architecture
//!
//! - `querybench-core`: data model, errors, configuration, engine traits
//! - `querybench-dataset`: generator and loader
//! - `querybench-bench`: registry, runner, aggregation, comparison, reports
//! - `querybench-sqlite`: SQLite reference adapter (feature `sqlite`)

pub use querybench_bench::*;
pub use querybench_core::*;
pub use querybench_dataset::*;

#[cfg(feature = "sqlite")]
pub use querybench_sqlite::{SqliteConnection, SqliteFactory};
