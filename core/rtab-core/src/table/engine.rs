//! Table — the buffered record-table engine.

use crate::array::RecordArray;
use crate::buffer::{BufferSpec, RecordBuffer, plan};
use crate::error::{RtabError, RtabResult};
use crate::schema::{ByteOrder, ColumnType, Schema};
use crate::storage::{AppendSession, AttrValue, DatasetHandle, FilterConfig, RecordStore};
use crate::table::types::{TableOptions, TableState};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A fixed-schema table stored as a chunked dataset.
///
/// Rows move between callers and the store in batches of at most
/// [`BufferSpec::rows_per_batch`] rows. Rows staged through [`Table::row_writer`] live in
/// the staging buffer until it fills up or [`Table::flush`] is called; they are not
/// counted in [`Table::nrows`] and are lost if the table is closed first.
pub struct Table {
    pub(crate) name: String,
    pub(crate) store: Arc<dyn RecordStore>,
    pub(crate) state: TableState,
    /// Released on close
    pub(crate) schema: Option<Schema>,
    pub(crate) handle: Option<DatasetHandle>,
    /// Durable row count
    pub(crate) nrows: u64,
    pub(crate) shape: (u64,),
    pub(crate) options: TableOptions,
    pub(crate) buffer_spec: BufferSpec,
    /// Staging buffer, allocated on first use
    pub(crate) buffer: Option<RecordBuffer>,
    /// Rows written when the dataset is created
    pub(crate) initial: Option<RecordArray>,
}

impl Table {
    pub(crate) fn assemble(
        store: Arc<dyn RecordStore>,
        name: String,
        schema: Schema,
        options: TableOptions,
        state: TableState,
    ) -> Self {
        let mut buffer_spec = plan(
            schema.row_size(),
            options.expected_rows,
            options.filters.complevel(),
        );
        if let Some(rows) = options.rows_per_batch {
            let rows = rows.max(1);
            buffer_spec.rows_per_batch = rows;
            buffer_spec.chunk_rows = buffer_spec.chunk_rows.min(rows);
        }
        Self {
            name,
            store,
            state,
            schema: Some(schema),
            handle: None,
            nrows: 0,
            shape: (0,),
            options,
            buffer_spec,
            buffer: None,
            initial: None,
        }
    }

    /// Fail unless a dataset is attached; returns its handle.
    pub(crate) fn live_handle(&self) -> RtabResult<DatasetHandle> {
        match (self.state, self.handle) {
            (TableState::Closed, _) => Err(RtabError::TableClosed(self.name.clone())),
            (TableState::New, _) | (_, None) => Err(RtabError::InvalidOperation {
                message: format!("table '{}' has no dataset yet", self.name),
                context: "call create_dataset() first".to_string(),
            }),
            (_, Some(handle)) => Ok(handle),
        }
    }

    pub(crate) fn set_nrows(&mut self, nrows: u64) {
        self.nrows = nrows;
        self.shape = (nrows,);
    }

    /// Write the staged rows, if any, as one batch.
    pub(crate) fn save_buffered_rows(&mut self) -> RtabResult<usize> {
        let handle = self.live_handle()?;
        let Some(buffer) = self.buffer.as_mut() else {
            return Ok(0);
        };
        let unsaved = buffer.unsaved_rows();
        if unsaved == 0 {
            return Ok(0);
        }
        {
            let session = AppendSession::begin(self.store.as_ref(), handle)?;
            session.append(buffer.rows(unsaved), unsaved)?;
        }
        buffer.set_unsaved_rows(0)?;
        buffer.reset_to_defaults();
        self.set_nrows(self.nrows + unsaved as u64);
        debug!(table = %self.name, rows = unsaved, nrows = self.nrows, "saved buffered rows");
        Ok(unsaved)
    }

    /// Staging buffer, allocated with column defaults on first use.
    pub(crate) fn staging_buffer(&mut self) -> RtabResult<&mut RecordBuffer> {
        self.live_handle()?;
        if self.buffer.is_none() {
            let buffer = RecordBuffer::allocate(self.schema()?, self.buffer_spec.rows_per_batch, true)?;
            self.buffer = Some(buffer);
        }
        self.buffer.as_mut().ok_or_else(|| RtabError::InvalidOperation {
            message: "staging buffer unavailable".to_string(),
            context: "Table::staging_buffer".to_string(),
        })
    }

    // ════════════════════════════════════════════
    // Metadata
    // ════════════════════════════════════════════

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> TableState {
        self.state
    }

    pub fn schema(&self) -> RtabResult<&Schema> {
        self.schema
            .as_ref()
            .ok_or_else(|| RtabError::TableClosed(self.name.clone()))
    }

    /// Durable row count (staged rows excluded).
    pub fn nrows(&self) -> u64 {
        self.nrows
    }

    pub fn shape(&self) -> (u64,) {
        self.shape
    }

    /// Rows staged by a row writer and not yet saved.
    pub fn unsaved_rows(&self) -> usize {
        self.buffer.as_ref().map_or(0, RecordBuffer::unsaved_rows)
    }

    pub fn row_size(&self) -> RtabResult<usize> {
        Ok(self.schema()?.row_size())
    }

    pub fn byte_order(&self) -> RtabResult<ByteOrder> {
        Ok(self.schema()?.byte_order())
    }

    pub fn colnames(&self) -> RtabResult<Vec<String>> {
        Ok(self.schema()?.names())
    }

    /// Column types in position order.
    pub fn coltypes(&self) -> RtabResult<Vec<ColumnType>> {
        Ok(self.schema()?.columns().iter().map(|c| c.dtype).collect())
    }

    /// Cell shapes in position order (empty for scalars).
    pub fn colshapes(&self) -> RtabResult<Vec<Vec<usize>>> {
        Ok(self
            .schema()?
            .columns()
            .iter()
            .map(|c| c.shape.to_vec())
            .collect())
    }

    /// Element byte sizes in position order.
    pub fn colitemsizes(&self) -> RtabResult<Vec<usize>> {
        Ok(self
            .schema()?
            .columns()
            .iter()
            .map(|c| c.dtype.itemsize())
            .collect())
    }

    pub fn title(&self) -> &str {
        &self.options.title
    }

    pub fn filters(&self) -> FilterConfig {
        self.options.filters
    }

    pub fn buffer_spec(&self) -> BufferSpec {
        self.buffer_spec
    }

    pub fn options(&self) -> &TableOptions {
        &self.options
    }

    /// Multi-line summary: name, shape, description and byte order.
    pub fn describe(&self) -> RtabResult<String> {
        let schema = self.schema()?;
        Ok(format!(
            "{self}\n  description := {schema}\n  byteorder := {}\n  filters := {}",
            schema.byte_order(),
            self.options.filters
        ))
    }

    // ════════════════════════════════════════════
    // User attributes
    // ════════════════════════════════════════════

    pub fn set_attr(&self, name: &str, value: impl Into<AttrValue>) -> RtabResult<()> {
        let handle = self.live_handle()?;
        self.store.set_user_attr(handle, name, value.into())
    }

    pub fn attr(&self, name: &str) -> RtabResult<Option<AttrValue>> {
        let handle = self.live_handle()?;
        Ok(self.store.user_attrs(handle)?.remove(name))
    }

    pub fn attrs(&self) -> RtabResult<BTreeMap<String, AttrValue>> {
        let handle = self.live_handle()?;
        self.store.user_attrs(handle)
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{} (Table({},)) '{}'", self.name, self.shape.0, self.options.title)
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("nrows", &self.nrows)
            .field("buffer_spec", &self.buffer_spec)
            .field("unsaved_rows", &self.unsaved_rows())
            .finish()
    }
}
