//! Error types for the rtab table engine.
//!
//! All public APIs return `RtabResult<T>`; library code does not panic.

use thiserror::Error;

/// Unified error type for all table operations.
#[derive(Debug, Error)]
pub enum RtabError {
    /// Unsupported column type or shape while building a schema
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    /// Caller-supplied rows do not conform to the table's row format
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Column name is not part of the schema
    #[error("column '{column}' not found in table '{table}'")]
    UnknownColumn { column: String, table: String },

    /// Zero step or an out-of-range index
    #[error("invalid range: {0}")]
    InvalidRange(String),

    /// Requested output representation does not exist
    #[error("unsupported flavor: {0}")]
    UnsupportedFlavor(String),

    /// Ordering requested on a column without a total order
    #[error("cannot sort by column '{column}': {reason}")]
    UnsupportedSort { column: String, reason: String },

    /// Operation attempted after `close()`
    #[error("table '{0}' is closed")]
    TableClosed(String),

    /// Operation not valid in the table's current state
    #[error("invalid operation: {message}\nContext: {context}")]
    InvalidOperation { message: String, context: String },

    /// Dataset does not exist in the store
    #[error("dataset '{0}' not found")]
    DatasetNotFound(String),

    /// Dataset name already taken in the store
    #[error("dataset '{0}' already exists")]
    DatasetExists(String),

    /// Storage device failure (corruption, short read, bad handle, ...)
    #[error("storage error: {0}")]
    Storage(String),

    /// sled embedded database error
    #[error("sled error: {source}")]
    Sled {
        #[from]
        source: sled::Error,
    },

    /// Apache Arrow error (flavor conversion)
    #[error("arrow error: {source}")]
    Arrow {
        #[from]
        source: arrow::error::ArrowError,
    },

    /// Standard I/O error
    #[error("io error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Metadata serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl RtabError {
    /// Whether this error originated in the storage device rather than in the table core.
    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            RtabError::Storage(_)
                | RtabError::Sled { .. }
                | RtabError::Io { .. }
                | RtabError::Serialization(_)
        )
    }

    pub(crate) fn unknown_column(column: &str, table: &str) -> Self {
        RtabError::UnknownColumn {
            column: column.to_string(),
            table: table.to_string(),
        }
    }
}

/// Result type alias for all rtab operations.
pub type RtabResult<T> = Result<T, RtabError>;

impl From<serde_json::Error> for RtabError {
    fn from(err: serde_json::Error) -> Self {
        RtabError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_unknown_column() {
        let err = RtabError::unknown_column("price", "ticks");
        assert_eq!(err.to_string(), "column 'price' not found in table 'ticks'");
    }

    #[test]
    fn error_display_table_closed() {
        let err = RtabError::TableClosed("ticks".to_string());
        assert_eq!(err.to_string(), "table 'ticks' is closed");
    }

    #[test]
    fn error_display_unsupported_sort() {
        let err = RtabError::UnsupportedSort {
            column: "name".to_string(),
            reason: "byte strings have no numeric order".to_string(),
        };
        assert!(err.to_string().contains("cannot sort by column 'name'"));
        assert!(err.to_string().contains("byte strings"));
    }

    #[test]
    fn storage_failures_are_classified() {
        assert!(RtabError::Storage("checksum mismatch".into()).is_storage_failure());
        let io = std::io::Error::other("disk full");
        assert!(RtabError::from(io).is_storage_failure());
        assert!(!RtabError::InvalidRange("step cannot be zero".into()).is_storage_failure());
    }

    #[test]
    fn json_errors_become_serialization() {
        let err = serde_json::from_str::<u32>("not a number").unwrap_err();
        let err = RtabError::from(err);
        assert!(matches!(err, RtabError::Serialization(_)));
    }
}
