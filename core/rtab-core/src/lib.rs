//! # rtab — Buffered Record Tables
//!
//! rtab stores fixed-schema record tables as chunked, typed binary datasets.
//! Rows are staged in a reusable buffer and move to and from storage in batches
//! sized from the row width, the expected row count and the compression level.
//!
//! ## Key features
//!
//! - **Typed rows**: scalar, multidimensional and fixed-length byte-string columns
//! - **Batched I/O**: contiguous reads for unit steps, per-field strided column reads
//! - **Pluggable storage**: [`MemoryStore`] for scratch tables, [`SledStore`] for persistent ones
//! - **Chunk filters**: zstd compression, byte shuffle and SHA-256 checksums
//! - **Result flavors**: native arrays, tuples, lists or Apache Arrow
//!
//! ## Quick start
//!
//! ```rust
//! use rtab_core::{ColumnSpec, ColumnType, MemoryStore, Schema, Selection, Table, TableOptions, Value};
//! use std::sync::Arc;
//!
//! # fn main() -> rtab_core::RtabResult<()> {
//! let schema = Schema::from_column_spec(vec![
//!     ("id", ColumnSpec::new(ColumnType::Int32)),
//!     ("name", ColumnSpec::bytes(8)),
//! ])?;
//! let mut table = Table::create(Arc::new(MemoryStore::new()), "people", schema, TableOptions::new())?;
//!
//! table.append(&[
//!     vec![Value::Int32(1), Value::from("ann")],
//!     vec![Value::Int32(2), Value::from("bob")],
//!     vec![Value::Int32(3), Value::from("cy")],
//! ])?;
//!
//! let tail = table.read_records(Selection::range(1, 3))?;
//! assert_eq!(tail.len(), 2);
//!
//! table.remove_rows(0, Some(1))?;
//! assert_eq!(table.nrows(), 2);
//! # Ok(())
//! # }
//! ```
//!
//! ### Declarative descriptions
//!
//! ```rust
//! use rtab_core::{Description, MemoryStore, Table, TableOptions};
//! use std::sync::Arc;
//!
//! #[derive(Description)]
//! struct Reading {
//!     sensor: [u8; 8],
//!     value: f64,
//!     #[rtab(default = -1)]
//!     flags: i32,
//! }
//!
//! # fn main() -> rtab_core::RtabResult<()> {
//! let mut table = Table::create(
//!     Arc::new(MemoryStore::new()),
//!     "readings",
//!     <Reading as rtab_core::schema::Description>::schema()?,
//!     TableOptions::new(),
//! )?;
//! table.append(&[Reading { sensor: *b"probe-01", value: 0.5, flags: 0 }])?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module structure
//!
//! - [`table`] — the table engine ([`Table`]): lifecycle, append, read, remove, copy
//! - [`schema`] — column specs, row formats and values
//! - [`buffer`] — batch planning and the record buffer
//! - [`storage`] — the [`RecordStore`] device contract and its backends
//! - [`flavor`] — result flavors and Arrow conversion
//! - [`range`] — start/stop/step normalization

extern crate self as rtab_core;

pub mod array;
pub mod buffer;
pub mod error;
pub mod flavor;
pub mod range;
pub mod schema;
pub mod storage;
pub mod table;

// Logging utilities
pub mod logging;

// Re-export commonly used types
pub use array::{ColumnArray, Record, RecordArray};
pub use error::{RtabError, RtabResult};
pub use flavor::{Flavor, ReadResult};
pub use range::Selection;
pub use schema::{ByteOrder, ColumnSpec, ColumnType, Description, IntoRow, Schema, Value};
pub use storage::{FilterConfig, MemoryStore, RecordStore, SledStore};
pub use table::{CopyOptions, Iteration, RowAppender, RowCursor, Table, TableOptions, TableState};

// Re-export derive macros
pub use rtab_derive::Description;
