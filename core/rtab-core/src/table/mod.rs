//! Table Module

pub mod constructors;
pub mod copy;
pub mod crud;
pub mod cursor;
pub mod engine;
pub mod types;

pub use cursor::{Iteration, RowAppender, RowCursor};
pub use engine::Table;
pub use types::{CopyOptions, DEFAULT_EXPECTED_ROWS, DEFAULT_SORT_WARN_ROWS, TableOptions, TableState};
