//! In-memory record store.
//!
//! Rows live in one contiguous `Vec<u8>` per dataset. Nothing is filtered or chunked,
//! which makes this device the reference for what the durable store must reproduce.

use crate::error::{RtabError, RtabResult};
use crate::storage::{
    AttrValue, DatasetHandle, DatasetInfo, DatasetSpec, RecordStore, gather_column,
};
use crate::schema::RowFormat;
use ahash::AHashMap;
use parking_lot::RwLock;
use std::collections::BTreeMap;

struct MemDataset {
    spec: DatasetSpec,
    format: RowFormat,
    data: Vec<u8>,
    nrows: u64,
    attrs: BTreeMap<String, AttrValue>,
    append_open: bool,
    read_open: bool,
}

impl MemDataset {
    fn check_span(&self, start: u64, count: u64) -> RtabResult<()> {
        if start.saturating_add(count) > self.nrows {
            return Err(RtabError::Storage(format!(
                "rows [{start}, {}) past the end of '{}' ({} rows)",
                start.saturating_add(count),
                self.spec.name,
                self.nrows
            )));
        }
        Ok(())
    }

    fn row(&self, i: u64) -> &[u8] {
        let size = self.format.row_size();
        let at = i as usize * size;
        &self.data[at..at + size]
    }
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    names: AHashMap<String, DatasetHandle>,
    datasets: AHashMap<DatasetHandle, MemDataset>,
}

impl Inner {
    fn get(&self, handle: DatasetHandle) -> RtabResult<&MemDataset> {
        self.datasets
            .get(&handle)
            .ok_or_else(|| RtabError::Storage(format!("unknown dataset handle {handle}")))
    }

    fn get_mut(&mut self, handle: DatasetHandle) -> RtabResult<&mut MemDataset> {
        self.datasets
            .get_mut(&handle)
            .ok_or_else(|| RtabError::Storage(format!("unknown dataset handle {handle}")))
    }
}

/// Process-local store.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(append_open, read_open)` for a dataset; both false for unknown handles.
    pub fn active_sessions(&self, handle: DatasetHandle) -> (bool, bool) {
        self.inner
            .read()
            .datasets
            .get(&handle)
            .map_or((false, false), |d| (d.append_open, d.read_open))
    }
}

impl RecordStore for MemoryStore {
    fn create_dataset(&self, spec: &DatasetSpec) -> RtabResult<DatasetHandle> {
        let format = spec.format()?;
        let mut inner = self.inner.write();
        if inner.names.contains_key(&spec.name) {
            return Err(RtabError::DatasetExists(spec.name.clone()));
        }
        inner.next_id += 1;
        let handle = DatasetHandle::new(inner.next_id);
        inner.names.insert(spec.name.clone(), handle);
        inner.datasets.insert(
            handle,
            MemDataset {
                spec: spec.clone(),
                format,
                data: Vec::new(),
                nrows: 0,
                attrs: BTreeMap::new(),
                append_open: false,
                read_open: false,
            },
        );
        Ok(handle)
    }

    fn open_dataset(&self, name: &str) -> RtabResult<DatasetHandle> {
        self.inner
            .read()
            .names
            .get(name)
            .copied()
            .ok_or_else(|| RtabError::DatasetNotFound(name.to_string()))
    }

    fn dataset_info(&self, handle: DatasetHandle) -> RtabResult<DatasetInfo> {
        let inner = self.inner.read();
        let ds = inner.get(handle)?;
        DatasetInfo::from_spec(&ds.spec, ds.nrows)
    }

    fn append_records(&self, handle: DatasetHandle, rows: &[u8], count: usize) -> RtabResult<()> {
        let mut inner = self.inner.write();
        let ds = inner.get_mut(handle)?;
        let bytes = count * ds.format.row_size();
        if rows.len() < bytes {
            return Err(RtabError::Storage(format!(
                "append of {count} rows needs {bytes} bytes, got {}",
                rows.len()
            )));
        }
        ds.data.extend_from_slice(&rows[..bytes]);
        ds.nrows += count as u64;
        Ok(())
    }

    fn read_contiguous(&self, handle: DatasetHandle, out: &mut [u8], start: u64) -> RtabResult<()> {
        let inner = self.inner.read();
        let ds = inner.get(handle)?;
        let size = ds.format.row_size();
        let count = (out.len() / size.max(1)) as u64;
        ds.check_span(start, count)?;
        let at = start as usize * size;
        out.copy_from_slice(&ds.data[at..at + out.len()]);
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
        for (slot, &i) in out.chunks_exact_mut(size).zip(indices) {
            ds.check_span(i, 1)?;
            slot.copy_from_slice(ds.row(i));
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
        if start < stop {
            ds.check_span(start, stop - start)?;
        }
        gather_column(
            &ds.format,
            |i| Ok(ds.row(i).to_vec()),
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
        if start >= ds.nrows {
            return Ok(0);
        }
        let removed = count.min(ds.nrows - start);
        let size = ds.format.row_size();
        let from = start as usize * size;
        ds.data.drain(from..from + removed as usize * size);
        ds.nrows -= removed;
        Ok(removed)
    }

    fn begin_append_session(&self, handle: DatasetHandle) -> RtabResult<()> {
        let mut inner = self.inner.write();
        let ds = inner.get_mut(handle)?;
        if std::mem::replace(&mut ds.append_open, true) {
            return Err(RtabError::InvalidOperation {
                message: format!("an append session on '{}' is already open", ds.spec.name),
                context: "MemoryStore::begin_append_session".to_string(),
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
                message: format!("a read session on '{}' is already open", ds.spec.name),
                context: "MemoryStore::begin_read_session".to_string(),
            });
        }
        Ok(())
    }

    fn end_read_session(&self, handle: DatasetHandle) -> RtabResult<()> {
        self.inner.write().get_mut(handle)?.read_open = false;
        Ok(())
    }

    fn flush(&self) -> RtabResult<()> {
        Ok(())
    }

    fn dataset_names(&self) -> RtabResult<Vec<String>> {
        let mut names: Vec<String> = self.inner.read().names.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn drop_dataset(&self, name: &str) -> RtabResult<bool> {
        let mut inner = self.inner.write();
        match inner.names.remove(name) {
            Some(handle) => {
                inner.datasets.remove(&handle);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn user_attrs(&self, handle: DatasetHandle) -> RtabResult<BTreeMap<String, AttrValue>> {
        Ok(self.inner.read().get(handle)?.attrs.clone())
    }

    fn set_user_attr(&self, handle: DatasetHandle, name: &str, value: AttrValue) -> RtabResult<()> {
        self.inner
            .write()
            .get_mut(handle)?
            .attrs
            .insert(name.to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnSpec, ColumnType, Schema};
    use crate::storage::FilterConfig;

    fn setup() -> (MemoryStore, DatasetHandle, usize) {
        let schema = Schema::from_column_spec(vec![
            ("a", ColumnSpec::new(ColumnType::UInt16)),
            ("b", ColumnSpec::new(ColumnType::UInt8)),
        ])
        .unwrap();
        let store = MemoryStore::new();
        let spec = DatasetSpec::from_schema("d", &schema, "", FilterConfig::none(), 8);
        let handle = store.create_dataset(&spec).unwrap();
        (store, handle, schema.row_size())
    }

    fn rows(n: u8) -> Vec<u8> {
        (0..n).flat_map(|i| [i, 0, i + 100]).collect()
    }

    #[test]
    fn append_then_read_back() {
        let (store, h, size) = setup();
        store.append_records(h, &rows(5), 5).unwrap();
        assert_eq!(store.dataset_info(h).unwrap().nrows, 5);
        let mut out = vec![0u8; 2 * size];
        store.read_contiguous(h, &mut out, 3).unwrap();
        assert_eq!(out, rows(5)[3 * size..].to_vec());
    }

    #[test]
    fn read_past_end_is_storage_failure() {
        let (store, h, size) = setup();
        store.append_records(h, &rows(2), 2).unwrap();
        let mut out = vec![0u8; 2 * size];
        assert!(store.read_contiguous(h, &mut out, 1).unwrap_err().is_storage_failure());
    }

    #[test]
    fn column_read_is_strided() {
        let (store, h, _) = setup();
        store.append_records(h, &rows(6), 6).unwrap();
        let mut out = vec![0u8; 3];
        store.read_column_by_name(h, &mut out, 0, 6, 2, "b").unwrap();
        assert_eq!(out, vec![100, 102, 104]);
    }

    #[test]
    fn remove_compacts_and_clips() {
        let (store, h, size) = setup();
        store.append_records(h, &rows(5), 5).unwrap();
        assert_eq!(store.remove_rows(h, 1, 2).unwrap(), 2);
        let mut out = vec![0u8; 3 * size];
        store.read_contiguous(h, &mut out, 0).unwrap();
        assert_eq!(out[size], 3);
        assert_eq!(store.remove_rows(h, 2, 100).unwrap(), 1);
        assert_eq!(store.remove_rows(h, 9, 1).unwrap(), 0);
    }

    #[test]
    fn duplicate_and_missing_names() {
        let (store, _, _) = setup();
        let schema = Schema::from_column_spec(vec![("x", ColumnSpec::new(ColumnType::Int8))]).unwrap();
        let spec = DatasetSpec::from_schema("d", &schema, "", FilterConfig::none(), 1);
        assert!(matches!(store.create_dataset(&spec), Err(RtabError::DatasetExists(_))));
        assert!(matches!(store.open_dataset("zz"), Err(RtabError::DatasetNotFound(_))));
        assert!(store.drop_dataset("d").unwrap());
        assert!(store.dataset_names().unwrap().is_empty());
    }

    #[test]
    fn double_append_session_is_rejected() {
        let (store, h, _) = setup();
        store.begin_append_session(h).unwrap();
        assert!(store.begin_append_session(h).is_err());
        store.end_append_session(h).unwrap();
        store.begin_append_session(h).unwrap();
    }

    #[test]
    fn attrs_round_trip() {
        let (store, h, _) = setup();
        store.set_user_attr(h, "units", AttrValue::from("m/s")).unwrap();
        assert_eq!(store.user_attrs(h).unwrap()["units"], AttrValue::from("m/s"));
    }
}
