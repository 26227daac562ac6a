//! Typed in-memory columnar storage for memory-profiler snapshots.
//!
//! This crate is the physical side of the view engine in `memview-view`:
//! - [`Table`]: the row-indexed access contract every table (physical or derived) satisfies.
//! - [`ColumnarTable`]: one typed vector per column, writable cell by cell.
//! - [`Database`]: the named set of tables a view schema is built over.

#![forbid(unsafe_code)]

mod database;
mod table;
mod types;

pub use crate::database::Database;
pub use crate::table::{
    ColumnSchema, ColumnarTable, ColumnarTableBuilder, Table, TableError, TableResult,
};
pub use crate::types::{ColumnType, Value};
