//! Synthetic datasets for query benchmarking
//!
//! - [`generator`]: seeded, restartable row streams that honor foreign keys
//! - [`loader`]: batched, retrying, dependency-ordered bulk load

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod generator;
pub mod loader;

pub use generator::{DataGenerator, KeySpace, TableRows};
pub use loader::{
    DatasetLoader, LoadLedger, LoadOptions, LoadReport, TableLoadOutcome, TableLoadStats,
    TableLoadStatus,
};
