//! SQLite reference adapter
//!
//! Implements [`EngineConnection`](querybench_core::EngineConnection) over
//! `rusqlite`. Each connection opens the database file itself; nothing is
//! shared between connections, so concurrent loads and runs only contend on
//! SQLite's own file locks.
//!
//! Counters:
//! - logical reads: virtual machine steps of the statement (`VmStep`)
//! - physical reads: rows stepped by full table scans (`FullscanStep`)
//! - CPU time: not exposed by SQLite, always `None`

#![warn(missing_docs)]
#![warn(clippy::all)]

mod connection;
mod convert;

pub use connection::{SqliteConnection, SqliteFactory};
