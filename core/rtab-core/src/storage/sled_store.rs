//! Durable chunked store on sled.
//!
//! Each dataset maps to its own sled `Tree` named `ds:<name>`:
//!
//! ```text
//! "meta"            → JSON { spec, nrows, attrs }
//! 'c' + u64 (BE)    → chunk i: rows [i * chunk_rows, (i + 1) * chunk_rows) through the filter pipeline
//! ```
//!
//! Every mutation (append, removal, attribute write) lands as one atomic sled batch
//! together with the updated metadata record.

use crate::error::{RtabError, RtabResult};
use crate::schema::RowFormat;
use crate::storage::{
    AttrValue, DatasetHandle, DatasetInfo, DatasetSpec, RecordStore, gather_column,
};
use ahash::AHashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

const TREE_PREFIX: &str = "ds:";
const META_KEY: &[u8] = b"meta";

fn chunk_key(index: u64) -> [u8; 9] {
    let mut key = [0u8; 9];
    key[0] = b'c';
    key[1..].copy_from_slice(&index.to_be_bytes());
    key
}

fn tree_name(dataset: &str) -> String {
    format!("{TREE_PREFIX}{dataset}")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredMeta {
    spec: DatasetSpec,
    nrows: u64,
    #[serde(default)]
    attrs: BTreeMap<String, AttrValue>,
}

struct OpenDataset {
    tree: sled::Tree,
    meta: StoredMeta,
    format: RowFormat,
    append_open: bool,
    read_open: bool,
}

impl OpenDataset {
    fn chunk_rows(&self) -> u64 {
        self.meta.spec.chunk_rows.max(1) as u64
    }

    fn load_chunk(&self, index: u64) -> RtabResult<Vec<u8>> {
        let raw = self.tree.get(chunk_key(index))?.ok_or_else(|| {
            RtabError::Storage(format!(
                "dataset '{}' is missing chunk {index}",
                self.meta.spec.name
            ))
        })?;
        self.meta
            .spec
            .filters
            .decode_chunk(&raw, self.format.row_size())
    }

    /// Packed rows `[from, to)`, decoding each chunk once.
    fn load_rows(&self, from: u64, to: u64) -> RtabResult<Vec<u8>> {
        if to > self.meta.nrows {
            return Err(RtabError::Storage(format!(
                "rows [{from}, {to}) past the end of '{}' ({} rows)",
                self.meta.spec.name, self.meta.nrows
            )));
        }
        let size = self.format.row_size();
        let cr = self.chunk_rows();
        let mut out = Vec::with_capacity(to.saturating_sub(from) as usize * size);
        let mut row = from;
        while row < to {
            let index = row / cr;
            let chunk_start = index * cr;
            let chunk = self.load_chunk(index)?;
            let upto = to.min(chunk_start + cr);
            let lo = (row - chunk_start) as usize * size;
            let hi = (upto - chunk_start) as usize * size;
            if hi > chunk.len() {
                return Err(RtabError::Storage(format!(
                    "chunk {index} of '{}' is truncated",
                    self.meta.spec.name
                )));
            }
            out.extend_from_slice(&chunk[lo..hi]);
            row = upto;
        }
        Ok(out)
    }

    /// Copy row `i` into `slot`, reusing the decoded chunk in `cached` when it holds `i`.
    fn copy_row(
        &self,
        i: u64,
        cached: &mut Option<(u64, Vec<u8>)>,
        slot: &mut [u8],
    ) -> RtabResult<()> {
        if i >= self.meta.nrows {
            return Err(RtabError::Storage(format!(
                "row {i} past the end of '{}' ({} rows)",
                self.meta.spec.name, self.meta.nrows
            )));
        }
        let size = self.format.row_size();
        let cr = self.chunk_rows();
        let index = i / cr;
        let chunk = match cached.take() {
            Some((ci, chunk)) if ci == index => chunk,
            _ => self.load_chunk(index)?,
        };
        let at = (i - index * cr) as usize * size;
        let Some(row) = chunk.get(at..at + size) else {
            return Err(RtabError::Storage(format!(
                "chunk {index} of '{}' is truncated",
                self.meta.spec.name
            )));
        };
        slot.copy_from_slice(row);
        *cached = Some((index, chunk));
        Ok(())
    }

    /// Encode `rows` as chunks starting at chunk `first` into `batch`.
    fn write_chunks(&self, batch: &mut sled::Batch, first: u64, rows: &[u8]) -> RtabResult<u64> {
        let size = self.format.row_size();
        let mut written = 0;
        for (i, chunk) in rows.chunks(self.chunk_rows() as usize * size).enumerate() {
            let encoded = self.meta.spec.filters.encode_chunk(chunk, size)?;
            batch.insert(chunk_key(first + i as u64).to_vec(), encoded);
            written += 1;
        }
        Ok(written)
    }

    /// Apply `batch` plus the updated metadata atomically, then adopt the metadata.
    fn commit(&mut self, mut batch: sled::Batch, meta: StoredMeta) -> RtabResult<()> {
        batch.insert(META_KEY, serde_json::to_vec(&meta)?);
        self.tree.apply_batch(batch)?;
        self.meta = meta;
        Ok(())
    }
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    names: AHashMap<String, DatasetHandle>,
    open: AHashMap<DatasetHandle, OpenDataset>,
}

impl Inner {
    fn get(&self, handle: DatasetHandle) -> RtabResult<&OpenDataset> {
        self.open
            .get(&handle)
            .ok_or_else(|| RtabError::Storage(format!("unknown dataset handle {handle}")))
    }

    fn get_mut(&mut self, handle: DatasetHandle) -> RtabResult<&mut OpenDataset> {
        self.open
            .get_mut(&handle)
            .ok_or_else(|| RtabError::Storage(format!("unknown dataset handle {handle}")))
    }

    fn register(&mut self, name: &str, dataset: OpenDataset) -> DatasetHandle {
        self.next_id += 1;
        let handle = DatasetHandle::new(self.next_id);
        self.names.insert(name.to_string(), handle);
        self.open.insert(handle, dataset);
        handle
    }
}

/// sled-backed persistent record store.
pub struct SledStore {
    db: sled::Db,
    inner: RwLock<Inner>,
}

impl SledStore {
    /// Open the store at the given directory path.
    pub fn open(path: impl AsRef<Path>) -> RtabResult<Self> {
        let db = sled::open(path.as_ref())?;
        Ok(Self::with_db(db))
    }

    /// Open a temporary store (for testing). Data is deleted on drop.
    pub fn open_temporary() -> RtabResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self::with_db(db))
    }

    fn with_db(db: sled::Db) -> Self {
        Self {
            db,
            inner: RwLock::new(Inner::default()),
        }
    }

    fn tree_exists(&self, dataset: &str) -> bool {
        let wanted = tree_name(dataset);
        self.db
            .tree_names()
            .iter()
            .any(|name| &name[..] == wanted.as_bytes())
    }
}

impl RecordStore for SledStore {
    fn create_dataset(&self, spec: &DatasetSpec) -> RtabResult<DatasetHandle> {
        let format = spec.format()?;
        let mut inner = self.inner.write();
        if inner.names.contains_key(&spec.name) || self.tree_exists(&spec.name) {
            return Err(RtabError::DatasetExists(spec.name.clone()));
        }
        let tree = self.db.open_tree(tree_name(&spec.name))?;
        let meta = StoredMeta {
            spec: spec.clone(),
            nrows: 0,
            attrs: BTreeMap::new(),
        };
        tree.insert(META_KEY, serde_json::to_vec(&meta)?)?;
        debug!(dataset = %spec.name, chunk_rows = spec.chunk_rows, filters = %spec.filters, "created dataset");
        Ok(inner.register(
            &spec.name,
            OpenDataset {
                tree,
                meta,
                format,
                append_open: false,
                read_open: false,
            },
        ))
    }

    fn open_dataset(&self, name: &str) -> RtabResult<DatasetHandle> {
        let mut inner = self.inner.write();
        if let Some(&handle) = inner.names.get(name) {
            return Ok(handle);
        }
        if !self.tree_exists(name) {
            return Err(RtabError::DatasetNotFound(name.to_string()));
        }
        let tree = self.db.open_tree(tree_name(name))?;
        let raw = tree.get(META_KEY)?.ok_or_else(|| {
            RtabError::Storage(format!("dataset '{name}' has no metadata record"))
        })?;
        let meta: StoredMeta = serde_json::from_slice(&raw)?;
        let format = meta.spec.format()?;
        debug!(dataset = %name, nrows = meta.nrows, "opened dataset");
        Ok(inner.register(
            name,
            OpenDataset {
                tree,
                meta,
                format,
                append_open: false,
                read_open: false,
            },
        ))
    }

    fn dataset_info(&self, handle: DatasetHandle) -> RtabResult<DatasetInfo> {
        let inner = self.inner.read();
        let ds = inner.get(handle)?;
        DatasetInfo::from_spec(&ds.meta.spec, ds.meta.nrows)
    }

    fn append_records(&self, handle: DatasetHandle, rows: &[u8], count: usize) -> RtabResult<()> {
        let mut inner = self.inner.write();
        let ds = inner.get_mut(handle)?;
        let size = ds.format.row_size();
        let bytes = count * size;
        if rows.len() < bytes {
            return Err(RtabError::Storage(format!(
                "append of {count} rows needs {bytes} bytes, got {}",
                rows.len()
            )));
        }
        if count == 0 {
            return Ok(());
        }

        let cr = ds.chunk_rows();
        let nrows = ds.meta.nrows;
        let tail_chunk = nrows / cr;
        // A partially filled last chunk is rewritten together with the new rows.
        let mut pending = ds.load_rows(tail_chunk * cr, nrows)?;
        pending.extend_from_slice(&rows[..bytes]);

        let mut batch = sled::Batch::default();
        let chunks = ds.write_chunks(&mut batch, tail_chunk, &pending)?;
        let mut meta = ds.meta.clone();
        meta.nrows += count as u64;
        ds.commit(batch, meta)?;
        debug!(dataset = %ds.meta.spec.name, rows = count, chunks, "appended records");
        Ok(())
    }

    fn read_contiguous(&self, handle: DatasetHandle, out: &mut [u8], start: u64) -> RtabResult<()> {
        let inner = self.inner.read();
        let ds = inner.get(handle)?;
        let count = (out.len() / ds.format.row_size().max(1)) as u64;
        let rows = ds.load_rows(start, start + count)?;
        out.copy_from_slice(&rows);
        Ok(())
    }

    fn read_by_index_set(
        &self,
        handle: DatasetHandle,
        out: &mut [u8],
        indices: &[u64],
    ) -> RtabResult<()> {
        let inner = self.inner.read();
        let ds = inner.get(handle)?;
        let size = ds.format.row_size();
        let mut cached = None;
        for (slot, &i) in out.chunks_exact_mut(size).zip(indices) {
            ds.copy_row(i, &mut cached, slot)?;
        }
        Ok(())
    }

    fn read_column_by_name(
        &self,
        handle: DatasetHandle,
        out: &mut [u8],
        start: u64,
        stop: u64,
        step: u64,
        field: &str,
    ) -> RtabResult<()> {
        let inner = self.inner.read();
        let ds = inner.get(handle)?;
        if start < stop && stop > ds.meta.nrows {
            return Err(RtabError::Storage(format!(
                "rows [{start}, {stop}) past the end of '{}' ({} rows)",
                ds.meta.spec.name, ds.meta.nrows
            )));
        }
        // Only the chunk holding the current row stays decoded.
        let mut cached = None;
        let mut row = vec![0u8; ds.format.row_size()];
        gather_column(
            &ds.format,
            |i| {
                ds.copy_row(i, &mut cached, &mut row)?;
                Ok(row.clone())
            },
            out,
            start,
            stop,
            step,
            field,
        )
    }

    fn remove_rows(&self, handle: DatasetHandle, start: u64, count: u64) -> RtabResult<u64> {
        let mut inner = self.inner.write();
        let ds = inner.get_mut(handle)?;
        let nrows = ds.meta.nrows;
        if start >= nrows || count == 0 {
            return Ok(0);
        }
        let removed = count.min(nrows - start);
        let size = ds.format.row_size();
        let cr = ds.chunk_rows();
        let first = start / cr;
        let chunk_start = first * cr;

        let mut rest = ds.load_rows(chunk_start, nrows)?;
        let lo = (start - chunk_start) as usize * size;
        rest.drain(lo..lo + removed as usize * size);

        let mut batch = sled::Batch::default();
        let written = ds.write_chunks(&mut batch, first, &rest)?;
        let old_chunks = nrows.div_ceil(cr);
        for stale in first + written..old_chunks {
            batch.remove(chunk_key(stale).to_vec());
        }
        let mut meta = ds.meta.clone();
        meta.nrows -= removed;
        ds.commit(batch, meta)?;
        debug!(dataset = %ds.meta.spec.name, start, removed, "removed rows");
        Ok(removed)
    }

    fn begin_append_session(&self, handle: DatasetHandle) -> RtabResult<()> {
        let mut inner = self.inner.write();
        let ds = inner.get_mut(handle)?;
        if std::mem::replace(&mut ds.append_open, true) {
            return Err(RtabError::InvalidOperation {
                message: format!("an append session on '{}' is already open", ds.meta.spec.name),
                context: "SledStore::begin_append_session".to_string(),
            });
        }
        Ok(())
    }

    fn end_append_session(&self, handle: DatasetHandle) -> RtabResult<()> {
        self.inner.write().get_mut(handle)?.append_open = false;
        Ok(())
    }

    fn begin_read_session(&self, handle: DatasetHandle) -> RtabResult<()> {
        let mut inner = self.inner.write();
        let ds = inner.get_mut(handle)?;
        if std::mem::replace(&mut ds.read_open, true) {
            return Err(RtabError::InvalidOperation {
                message: format!("a read session on '{}' is already open", ds.meta.spec.name),
                context: "SledStore::begin_read_session".to_string(),
            });
        }
        Ok(())
    }

    fn end_read_session(&self, handle: DatasetHandle) -> RtabResult<()> {
        self.inner.write().get_mut(handle)?.read_open = false;
        Ok(())
    }

    fn flush(&self) -> RtabResult<()> {
        self.db.flush()?;
        Ok(())
    }

    fn dataset_names(&self) -> RtabResult<Vec<String>> {
        let mut names: Vec<String> = self
            .db
            .tree_names()
            .into_iter()
            .filter_map(|name| {
                let s = String::from_utf8(name.to_vec()).ok()?;
                s.strip_prefix(TREE_PREFIX).map(str::to_string)
            })
            .collect();
        names.sort();
        Ok(names)
    }

    fn drop_dataset(&self, name: &str) -> RtabResult<bool> {
        let mut inner = self.inner.write();
        if let Some(handle) = inner.names.remove(name) {
            inner.open.remove(&handle);
        }
        Ok(self.db.drop_tree(tree_name(name))?)
    }

    fn user_attrs(&self, handle: DatasetHandle) -> RtabResult<BTreeMap<String, AttrValue>> {
        Ok(self.inner.read().get(handle)?.meta.attrs.clone())
    }

    fn set_user_attr(&self, handle: DatasetHandle, name: &str, value: AttrValue) -> RtabResult<()> {
        let mut inner = self.inner.write();
        let ds = inner.get_mut(handle)?;
        let mut meta = ds.meta.clone();
        meta.attrs.insert(name.to_string(), value);
        ds.commit(sled::Batch::default(), meta)
    }
}
