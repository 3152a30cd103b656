//! Storage devices — chunked record datasets behind the [`RecordStore`] trait.
//!
//! The table engine depends only on this trait, never on a concrete device.
//!
//! | Device                     | Durability | Chunking / filters                    |
//! |----------------------------|------------|---------------------------------------|
//! | [`memory::MemoryStore`]    | process    | contiguous, unfiltered                |
//! | [`sled_store::SledStore`]  | disk       | `chunk_rows` chunks, shuffle/zstd/sha |

pub mod filters;
pub mod memory;
pub mod sled_store;

pub use filters::{CompressionAlgorithm, FilterConfig};
pub use memory::MemoryStore;
pub use sled_store::SledStore;

use crate::error::RtabResult;
use crate::schema::{RowFormat, Schema};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Value type of user-level dataset attributes.
pub type AttrValue = serde_json::Value;

/// Opaque reference to an open dataset inside one store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DatasetHandle(u64);

impl DatasetHandle {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for DatasetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Everything a store needs to create a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSpec {
    pub name: String,
    /// Row-format descriptor with its leading byte-order marker
    pub row_format: String,
    pub colnames: Vec<String>,
    pub title: String,
    pub filters: FilterConfig,
    /// Rows per storage chunk
    pub chunk_rows: usize,
}

impl DatasetSpec {
    pub fn from_schema(
        name: impl Into<String>,
        schema: &Schema,
        title: impl Into<String>,
        filters: FilterConfig,
        chunk_rows: usize,
    ) -> Self {
        Self {
            name: name.into(),
            row_format: schema.row_format().descriptor(),
            colnames: schema.names(),
            title: title.into(),
            filters,
            chunk_rows: chunk_rows.max(1),
        }
    }

    /// Layout encoded by `row_format`.
    pub fn format(&self) -> RtabResult<RowFormat> {
        RowFormat::from_descriptor(&self.row_format, &self.colnames)
    }
}

/// Dataset metadata reported on open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub name: String,
    pub nrows: u64,
    pub colnames: Vec<String>,
    pub row_size: usize,
    pub item_sizes: Vec<usize>,
    pub col_shapes: Vec<Vec<usize>>,
    pub col_types: Vec<String>,
    /// Raw descriptor, byte-order marker included
    pub row_format: String,
    pub title: String,
    pub filters: FilterConfig,
    pub chunk_rows: usize,
}

impl DatasetInfo {
    /// Metadata a store would report for `schema` holding `nrows` rows.
    pub fn describe(name: impl Into<String>, schema: &Schema, nrows: u64) -> Self {
        Self::from_format(
            name.into(),
            schema.row_format(),
            nrows,
            String::new(),
            FilterConfig::none(),
            1,
        )
    }

    /// Metadata for a dataset created from `spec`.
    pub fn from_spec(spec: &DatasetSpec, nrows: u64) -> RtabResult<Self> {
        let format = spec.format()?;
        Ok(Self::from_format(
            spec.name.clone(),
            &format,
            nrows,
            spec.title.clone(),
            spec.filters,
            spec.chunk_rows,
        ))
    }

    fn from_format(
        name: String,
        format: &RowFormat,
        nrows: u64,
        title: String,
        filters: FilterConfig,
        chunk_rows: usize,
    ) -> Self {
        let fields = format.fields();
        Self {
            name,
            nrows,
            colnames: format.names(),
            row_size: format.row_size(),
            item_sizes: fields.iter().map(|f| f.dtype.itemsize()).collect(),
            col_shapes: fields.iter().map(|f| f.shape.to_vec()).collect(),
            col_types: fields.iter().map(|f| f.dtype.type_name().to_string()).collect(),
            row_format: format.descriptor(),
            title,
            filters,
            chunk_rows,
        }
    }
}

/// Chunked record storage device.
///
/// # Contract
///
/// - Buffers are packed rows in the dataset's row format.
/// - `append_records` commits all `count` rows or none.
/// - `read_*` fail with a storage error when asked for rows past the end.
/// - `remove_rows` compacts later rows forward and returns how many were removed.
/// - Sessions are scoped: use [`AppendSession`] / [`ReadSession`], which release on drop.
/// - Implementations serialize their own internal access; callers may share a store.
pub trait RecordStore: Send + Sync {
    /// Create a dataset. Fails with `DatasetExists` if the name is taken.
    fn create_dataset(&self, spec: &DatasetSpec) -> RtabResult<DatasetHandle>;

    /// Open an existing dataset by name. Fails with `DatasetNotFound`.
    fn open_dataset(&self, name: &str) -> RtabResult<DatasetHandle>;

    /// Current metadata of an open dataset.
    fn dataset_info(&self, handle: DatasetHandle) -> RtabResult<DatasetInfo>;

    fn append_records(&self, handle: DatasetHandle, rows: &[u8], count: usize) -> RtabResult<()>;

    /// Fill `out` with `out.len() / row_size` rows starting at `start`.
    fn read_contiguous(&self, handle: DatasetHandle, out: &mut [u8], start: u64) -> RtabResult<()>;

    /// Fill `out` with the rows at `indices`, in the order given.
    fn read_by_index_set(
        &self,
        handle: DatasetHandle,
        out: &mut [u8],
        indices: &[u64],
    ) -> RtabResult<()>;

    /// Fill `out` with one field of every `step`-th row in `[start, stop)`, cells packed.
    fn read_column_by_name(
        &self,
        handle: DatasetHandle,
        out: &mut [u8],
        start: u64,
        stop: u64,
        step: u64,
        field: &str,
    ) -> RtabResult<()>;

    /// Remove up to `count` rows starting at `start`; returns the number removed.
    fn remove_rows(&self, handle: DatasetHandle, start: u64, count: u64) -> RtabResult<u64>;

    fn begin_append_session(&self, handle: DatasetHandle) -> RtabResult<()>;

    fn end_append_session(&self, handle: DatasetHandle) -> RtabResult<()>;

    fn begin_read_session(&self, handle: DatasetHandle) -> RtabResult<()>;

    fn end_read_session(&self, handle: DatasetHandle) -> RtabResult<()>;

    /// Persist buffered writes.
    fn flush(&self) -> RtabResult<()>;

    /// Names of all datasets, sorted.
    fn dataset_names(&self) -> RtabResult<Vec<String>>;

    /// Delete a dataset and its attributes. Returns whether it existed.
    fn drop_dataset(&self, name: &str) -> RtabResult<bool>;

    fn user_attrs(&self, handle: DatasetHandle) -> RtabResult<BTreeMap<String, AttrValue>>;

    fn set_user_attr(&self, handle: DatasetHandle, name: &str, value: AttrValue) -> RtabResult<()>;
}

/// Scoped append session; ended when dropped, on success and error paths alike.
pub struct AppendSession<'a> {
    store: &'a dyn RecordStore,
    handle: DatasetHandle,
}

impl<'a> AppendSession<'a> {
    pub fn begin(store: &'a dyn RecordStore, handle: DatasetHandle) -> RtabResult<Self> {
        store.begin_append_session(handle)?;
        Ok(Self { store, handle })
    }

    pub fn append(&self, rows: &[u8], count: usize) -> RtabResult<()> {
        self.store.append_records(self.handle, rows, count)
    }
}

impl Drop for AppendSession<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.store.end_append_session(self.handle) {
            tracing::warn!(handle = %self.handle, error = %e, "failed to end append session");
        }
    }
}

/// Scoped read session; ended when dropped.
pub struct ReadSession<'a> {
    store: &'a dyn RecordStore,
    handle: DatasetHandle,
}

impl<'a> ReadSession<'a> {
    pub fn begin(store: &'a dyn RecordStore, handle: DatasetHandle) -> RtabResult<Self> {
        store.begin_read_session(handle)?;
        Ok(Self { store, handle })
    }

    pub fn read_contiguous(&self, out: &mut [u8], start: u64) -> RtabResult<()> {
        self.store.read_contiguous(self.handle, out, start)
    }

    pub fn read_by_index_set(&self, out: &mut [u8], indices: &[u64]) -> RtabResult<()> {
        self.store.read_by_index_set(self.handle, out, indices)
    }

    pub fn read_column(
        &self,
        out: &mut [u8],
        start: u64,
        stop: u64,
        step: u64,
        field: &str,
    ) -> RtabResult<()> {
        self.store
            .read_column_by_name(self.handle, out, start, stop, step, field)
    }
}

impl Drop for ReadSession<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.store.end_read_session(self.handle) {
            tracing::warn!(handle = %self.handle, error = %e, "failed to end read session");
        }
    }
}

/// Validate a field request and copy one field of the selected rows out of packed data.
///
/// Shared by devices whose rows can be addressed as a flat byte slice.
pub(crate) fn gather_column(
    format: &RowFormat,
    mut rows: impl FnMut(u64) -> RtabResult<Vec<u8>>,
    out: &mut [u8],
    start: u64,
    stop: u64,
    step: u64,
    field: &str,
) -> RtabResult<()> {
    let layout = format
        .field(field)
        .ok_or_else(|| crate::error::RtabError::unknown_column(field, "<dataset>"))?;
    let mut cells = out.chunks_exact_mut(layout.size);
    for i in (start..stop).step_by(step.max(1) as usize) {
        let row = rows(i)?;
        let Some(cell) = cells.next() else {
            return Err(crate::error::RtabError::Storage(
                "column buffer is smaller than the requested range".to_string(),
            ));
        };
        cell.copy_from_slice(layout.slot(&row));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnSpec, ColumnType};

    fn schema() -> Schema {
        Schema::from_column_spec(vec![
            ("id", ColumnSpec::new(ColumnType::Int64)),
            ("tag", ColumnSpec::bytes(6)),
            ("xy", ColumnSpec::new(ColumnType::Float32).with_shape([2])),
        ])
        .unwrap()
    }

    #[test]
    fn info_from_spec_matches_describe() {
        let schema = schema();
        let spec = DatasetSpec::from_schema("d", &schema, "", FilterConfig::none(), 1);
        let info = DatasetInfo::from_spec(&spec, 7).unwrap();
        assert_eq!(info, DatasetInfo::describe("d", &schema, 7));
        assert_eq!(info.col_types, vec!["Int64", "Bytes", "Float32"]);
        assert_eq!(info.item_sizes, vec![8, 6, 4]);
        assert_eq!(info.col_shapes, vec![vec![], vec![], vec![2]]);
        assert_eq!(info.row_size, 8 + 6 + 8);
    }

    #[test]
    fn chunk_rows_is_at_least_one() {
        let spec = DatasetSpec::from_schema("d", &schema(), "t", FilterConfig::none(), 0);
        assert_eq!(spec.chunk_rows, 1);
    }

    #[test]
    fn sessions_end_on_drop() {
        let store = MemoryStore::new();
        let spec = DatasetSpec::from_schema("d", &schema(), "", FilterConfig::none(), 4);
        let handle = store.create_dataset(&spec).unwrap();
        {
            let _append = AppendSession::begin(&store, handle).unwrap();
            let _read = ReadSession::begin(&store, handle).unwrap();
            assert_eq!(store.active_sessions(handle), (true, true));
        }
        assert_eq!(store.active_sessions(handle), (false, false));
    }
}
