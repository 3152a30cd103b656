//! Table Constructors — factory methods for creating and opening tables

use crate::array::RecordArray;
use crate::error::{RtabError, RtabResult};
use crate::flavor::arrow::records_from_arrow;
use crate::schema::Schema;
use crate::storage::{DatasetSpec, RecordStore};
use crate::table::Table;
use crate::table::types::{TableOptions, TableState};
use arrow::record_batch::RecordBatch;
use std::sync::Arc;
use tracing::{info, instrument};

impl Table {
    /// Describe a table without touching storage (`New` state).
    ///
    /// Call [`Table::create_dataset`] to create it, or use [`Table::create`] to do both.
    pub fn new(
        store: Arc<dyn RecordStore>,
        name: impl Into<String>,
        schema: Schema,
        options: TableOptions,
    ) -> Self {
        Self::assemble(store, name.into(), schema, options, TableState::New)
    }

    /// Create a new, empty table.
    ///
    /// # Example
    ///
    /// ```rust
    /// use rtab_core::{ColumnSpec, ColumnType, MemoryStore, Schema, Table, TableOptions, Value};
    /// use std::sync::Arc;
    ///
    /// # fn main() -> rtab_core::RtabResult<()> {
    /// let schema = Schema::from_column_spec(vec![
    ///     ("id", ColumnSpec::new(ColumnType::Int32)),
    ///     ("name", ColumnSpec::bytes(8)),
    /// ])?;
    /// let mut table = Table::create(Arc::new(MemoryStore::new()), "people", schema, TableOptions::new())?;
    /// table.append(&[vec![Value::Int32(1), Value::from("ann")]])?;
    /// assert_eq!(table.nrows(), 1);
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip(store, name, schema, options), fields(name = %name.as_ref()))]
    pub fn create(
        store: Arc<dyn RecordStore>,
        name: impl AsRef<str>,
        schema: Schema,
        options: TableOptions,
    ) -> RtabResult<Self> {
        let mut table = Self::new(store, name.as_ref(), schema, options);
        table.create_dataset()?;
        Ok(table)
    }

    /// `New` → `Created`: create the dataset and write any initial rows.
    pub fn create_dataset(&mut self) -> RtabResult<()> {
        match self.state {
            TableState::New => {}
            TableState::Closed => return Err(RtabError::TableClosed(self.name.clone())),
            state => {
                return Err(RtabError::InvalidOperation {
                    message: format!("table '{}' is already {state}", self.name),
                    context: "Table::create_dataset".to_string(),
                });
            }
        }
        let schema = self.schema()?;
        let row_size = schema.row_size();
        let spec = DatasetSpec::from_schema(
            &self.name,
            schema,
            &self.options.title,
            self.options.filters,
            self.buffer_spec.chunk_rows,
        );
        let handle = self.store.create_dataset(&spec)?;
        self.handle = Some(handle);
        self.state = TableState::Created;
        self.set_nrows(0);
        info!(
            table = %self.name,
            row_size,
            rows_per_batch = self.buffer_spec.rows_per_batch,
            chunk_rows = self.buffer_spec.chunk_rows,
            "created table"
        );

        if let Some(initial) = self.initial.take() {
            self.append_records(&initial)?;
        }
        Ok(())
    }

    /// Open an existing table, rebuilding its schema from storage metadata.
    ///
    /// Title and filters come from the dataset; `options` only supplies the sort
    /// thresholds and an optional batch size override.
    #[instrument(skip(store, options))]
    pub fn open(
        store: Arc<dyn RecordStore>,
        name: &str,
        options: TableOptions,
    ) -> RtabResult<Self> {
        let handle = store.open_dataset(name)?;
        let info = store.dataset_info(handle)?;
        let schema = Schema::from_storage_metadata(&info)?;
        let options = TableOptions {
            title: info.title.clone(),
            filters: info.filters,
            expected_rows: info.nrows.max(1),
            ..options
        };
        let mut table = Self::assemble(store, name.to_string(), schema, options, TableState::Opened);
        table.buffer_spec.chunk_rows = info.chunk_rows;
        table.handle = Some(handle);
        table.set_nrows(info.nrows);
        info!(table = %name, nrows = info.nrows, "opened table");
        Ok(table)
    }

    /// Create a table whose schema and initial rows come from an in-memory batch.
    ///
    /// Strided views are packed before the rows are written.
    pub fn from_records(
        store: Arc<dyn RecordStore>,
        name: impl AsRef<str>,
        records: &RecordArray,
        options: TableOptions,
    ) -> RtabResult<Self> {
        let records = records.to_contiguous();
        let schema = Schema::from_existing_batch(&records)?;
        let options = TableOptions {
            expected_rows: options.expected_rows.max(records.len() as u64),
            ..options
        };
        let mut table = Self::new(store, name.as_ref(), schema, options);
        table.initial = Some(records);
        table.create_dataset()?;
        Ok(table)
    }

    /// Create a table from an Arrow `RecordBatch`.
    pub fn from_arrow(
        store: Arc<dyn RecordStore>,
        name: impl AsRef<str>,
        batch: &RecordBatch,
        options: TableOptions,
    ) -> RtabResult<Self> {
        let schema = Schema::from_arrow(&batch.schema())?;
        let records = records_from_arrow(batch, Arc::clone(schema.row_format()))?;
        Self::from_records(store, name, &records, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnSpec, ColumnType, Value};
    use crate::storage::MemoryStore;

    fn schema() -> Schema {
        Schema::from_column_spec(vec![
            ("id", ColumnSpec::new(ColumnType::Int32)),
            ("name", ColumnSpec::bytes(8)),
        ])
        .unwrap()
    }

    #[test]
    fn new_then_create() {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
        let mut table = Table::new(Arc::clone(&store), "t", schema(), TableOptions::new());
        assert_eq!(table.state(), TableState::New);
        assert!(matches!(
            table.append(&[vec![Value::Int32(1), Value::from("a")]]),
            Err(RtabError::InvalidOperation { .. })
        ));
        table.create_dataset().unwrap();
        assert_eq!(table.state(), TableState::Created);
        assert!(table.create_dataset().is_err());
        assert_eq!(store.dataset_names().unwrap(), vec!["t"]);
    }

    #[test]
    fn open_rebuilds_schema() {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
        let opts = TableOptions::new().with_title("people");
        let mut table = Table::create(Arc::clone(&store), "t", schema(), opts).unwrap();
        table
            .append(&[vec![Value::Int32(7), Value::from("g")]])
            .unwrap();

        let reopened = Table::open(store, "t", TableOptions::new()).unwrap();
        assert_eq!(reopened.state(), TableState::Opened);
        assert_eq!(reopened.nrows(), 1);
        assert_eq!(reopened.title(), "people");
        assert_eq!(reopened.schema().unwrap().row_format(), schema().row_format());
    }

    #[test]
    fn open_missing_dataset() {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
        assert!(matches!(
            Table::open(store, "nope", TableOptions::new()),
            Err(RtabError::DatasetNotFound(_))
        ));
    }

    #[test]
    fn from_records_packs_strided_views() {
        let rows: Vec<Vec<Value>> = (0..6)
            .map(|i| vec![Value::Int32(i), Value::from("x")])
            .collect();
        let records = RecordArray::from_rows(Arc::clone(schema().row_format()), &rows).unwrap();
        let view = records.step_by(2).unwrap();
        let table =
            Table::from_records(Arc::new(MemoryStore::new()), "t", &view, TableOptions::new())
                .unwrap();
        assert_eq!(table.nrows(), 3);
        let ids = table.column("id").unwrap().values();
        assert_eq!(ids, vec![Value::Int32(0), Value::Int32(2), Value::Int32(4)]);
    }
}
