//! Table Types — lifecycle state and option builders

use crate::range::Selection;
use crate::schema::Schema;
use crate::storage::FilterConfig;
use std::fmt;

/// Default `expected_rows` used to size buffers for a new table.
pub const DEFAULT_EXPECTED_ROWS: u64 = 10_000;

/// Row count above which a sorted copy logs a memory warning.
pub const DEFAULT_SORT_WARN_ROWS: u64 = 10_000_000;

/// Table lifecycle.
///
/// ```text
/// New ──create──▶ Created ──┐
///                           ├──close──▶ Closed
/// (open) ───────▶ Opened ───┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableState {
    /// Schema set, no dataset yet
    New,
    /// Dataset created by this handle
    Created,
    /// Existing dataset opened
    Opened,
    /// Terminal; schema and buffers released
    Closed,
}

impl TableState {
    /// Whether a dataset is attached and usable.
    pub fn is_live(&self) -> bool {
        matches!(self, TableState::Created | TableState::Opened)
    }
}

impl fmt::Display for TableState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TableState::New => "new",
            TableState::Created => "created",
            TableState::Opened => "opened",
            TableState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Options for creating or opening a table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableOptions {
    pub title: String,
    pub filters: FilterConfig,
    /// Expected final row count; sizes the staging buffer and storage chunks
    pub expected_rows: u64,
    /// Sorted copies of more rows than this log a warning
    pub sort_warn_rows: u64,
    /// Sorted copies of more rows than this are refused
    pub sort_row_limit: Option<u64>,
    /// Overrides the planned rows per batch
    pub rows_per_batch: Option<usize>,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            title: String::new(),
            filters: FilterConfig::default(),
            expected_rows: DEFAULT_EXPECTED_ROWS,
            sort_warn_rows: DEFAULT_SORT_WARN_ROWS,
            sort_row_limit: None,
            rows_per_batch: None,
        }
    }
}

impl TableOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_filters(mut self, filters: FilterConfig) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_expected_rows(mut self, rows: u64) -> Self {
        self.expected_rows = rows;
        self
    }

    pub fn with_sort_warn_rows(mut self, rows: u64) -> Self {
        self.sort_warn_rows = rows;
        self
    }

    pub fn with_sort_row_limit(mut self, limit: u64) -> Self {
        self.sort_row_limit = Some(limit);
        self
    }

    /// Force the staging buffer capacity (at least one row).
    pub fn with_rows_per_batch(mut self, rows: usize) -> Self {
        self.rows_per_batch = Some(rows.max(1));
        self
    }
}

/// Options for [`crate::table::Table::copy`].
///
/// Title and filters default to the source table's.
#[derive(Debug, Clone, PartialEq)]
pub struct CopyOptions {
    pub selection: Selection,
    pub title: Option<String>,
    pub filters: Option<FilterConfig>,
    /// Destination schema; columns are matched to the source by name
    pub schema: Option<Schema>,
    pub copy_user_attrs: bool,
    /// Copy rows in ascending order of this column
    pub order_by: Option<String>,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            selection: Selection::all(),
            title: None,
            filters: None,
            schema: None,
            copy_user_attrs: true,
            order_by: None,
        }
    }
}

impl CopyOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_selection(mut self, selection: Selection) -> Self {
        self.selection = selection;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_filters(mut self, filters: FilterConfig) -> Self {
        self.filters = Some(filters);
        self
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_user_attrs(mut self, copy: bool) -> Self {
        self.copy_user_attrs = copy;
        self
    }

    pub fn ordered_by(mut self, column: impl Into<String>) -> Self {
        self.order_by = Some(column.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_options_defaults() {
        let opts = TableOptions::default();
        assert_eq!(opts.expected_rows, 10_000);
        assert_eq!(opts.sort_warn_rows, 10_000_000);
        assert_eq!(opts.sort_row_limit, None);
        assert_eq!(TableOptions::new().with_rows_per_batch(0).rows_per_batch, Some(1));
    }

    #[test]
    fn copy_options_copy_attrs_by_default() {
        let opts = CopyOptions::new().ordered_by("id");
        assert!(opts.copy_user_attrs);
        assert_eq!(opts.order_by.as_deref(), Some("id"));
    }

    #[test]
    fn live_states() {
        assert!(!TableState::New.is_live());
        assert!(TableState::Opened.is_live());
        assert!(!TableState::Closed.is_live());
        assert_eq!(TableState::Created.to_string(), "created");
    }
}
