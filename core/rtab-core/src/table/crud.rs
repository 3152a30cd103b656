//! Table CRUD Operations — append, read, remove, flush and close

use crate::array::{ColumnArray, RecordArray};
use crate::error::{RtabError, RtabResult};
use crate::flavor::{Flavor, ReadResult, convert};
use crate::range::{Selection, resolve_for_read, resolve_for_write};
use crate::schema::{IntoRow, Schema, Value};
use crate::storage::{AppendSession, DatasetHandle, ReadSession};
use crate::table::Table;
use crate::table::cursor::{Iteration, RowCursor};
use crate::table::types::TableState;
use std::sync::Arc;
use tracing::{debug, info, warn};

impl Table {
    // ════════════════════════════════════════════
    // CREATE Operations
    // ════════════════════════════════════════════

    /// Append rows of values as one batch.
    ///
    /// Every row is converted before anything is written, so a row that does not fit
    /// the row format fails the whole call with `SchemaMismatch` and leaves the table
    /// untouched. Rows staged by a row writer are saved first, keeping append order.
    pub fn append<R: IntoRow>(&mut self, rows: &[R]) -> RtabResult<u64> {
        self.live_handle()?;
        let format = Arc::clone(self.schema()?.row_format());
        let records = RecordArray::from_rows(format, rows)?;
        self.append_records(&records)
    }

    /// Append a record batch.
    ///
    /// Batches in another row format are re-encoded with fields matched by name.
    pub fn append_records(&mut self, records: &RecordArray) -> RtabResult<u64> {
        let handle = self.live_handle()?;
        let records = conform_records(records, self.schema()?, false)?;
        let n = records.len();
        if n == 0 {
            return Ok(0);
        }
        self.save_buffered_rows()?;

        let bytes = records.contiguous_bytes();
        {
            let session = AppendSession::begin(self.store.as_ref(), handle)?;
            session.append(&bytes, n)?;
        }
        self.set_nrows(self.nrows + n as u64);
        debug!(table = %self.name, rows = n, nrows = self.nrows, "appended batch");
        Ok(n as u64)
    }

    // ════════════════════════════════════════════
    // READ Operations
    // ════════════════════════════════════════════

    /// Iterate over the selected rows.
    ///
    /// Returns [`Iteration::Empty`] with a zero-row batch when the resolved range is
    /// empty, so callers can tell "no rows" apart without touching a cursor.
    pub fn iterate(&self, selection: Selection) -> RtabResult<Iteration<'_>> {
        let handle = self.live_handle()?;
        let range = selection.resolve_for_read(self.nrows)?;
        let format = Arc::clone(self.schema()?.row_format());
        if range.is_empty() {
            return Ok(Iteration::Empty(RecordArray::empty(format)));
        }
        Ok(Iteration::Cursor(RowCursor::new(self, handle, format, range)))
    }

    /// Read the selected rows (or one field of them) in the requested flavor.
    pub fn read(
        &self,
        selection: Selection,
        field: Option<&str>,
        flavor: Flavor,
    ) -> RtabResult<ReadResult> {
        let native = match field {
            Some(field) => ReadResult::Column(self.read_column(selection, field)?),
            None => ReadResult::Records(self.read_records(selection)?),
        };
        convert(native, flavor)
    }

    /// Whole rows of a selection.
    ///
    /// Unit steps are read with one contiguous device call; other steps go through
    /// the row cursor.
    pub fn read_records(&self, selection: Selection) -> RtabResult<RecordArray> {
        let handle = self.live_handle()?;
        let range = selection.resolve_for_read(self.nrows)?;
        let format = Arc::clone(self.schema()?.row_format());
        if range.is_empty() {
            return Ok(RecordArray::empty(format));
        }
        if range.step == 1 {
            let mut data = vec![0u8; range.len() as usize * format.row_size()];
            {
                let session = ReadSession::begin(self.store.as_ref(), handle)?;
                session.read_contiguous(&mut data, range.start)?;
            }
            return RecordArray::from_bytes(format, data);
        }
        RowCursor::new(self, handle, format, range).fill_records()
    }

    /// One field of a selection, read with a strided per-field device call.
    ///
    /// The result shape is `(n,)` for scalar columns and `(n,) + shape` otherwise.
    pub fn read_column(&self, selection: Selection, field: &str) -> RtabResult<ColumnArray> {
        let handle = self.live_handle()?;
        let schema = self.schema()?;
        if !schema.contains(field) {
            return Err(RtabError::unknown_column(field, &self.name));
        }
        let range = selection.resolve_for_read(self.nrows)?;
        let format = Arc::clone(schema.row_format());
        RowCursor::new(self, handle, format, range).fill_column(field)
    }

    /// Read an explicit set of rows, in the order given.
    pub fn read_coordinates(
        &self,
        coords: &[u64],
        field: Option<&str>,
        flavor: Flavor,
    ) -> RtabResult<ReadResult> {
        let handle = self.live_handle()?;
        let schema = self.schema()?;
        if let Some(field) = field
            && !schema.contains(field)
        {
            return Err(RtabError::unknown_column(field, &self.name));
        }
        let records = self.records_at(handle, coords)?;
        let native = match field {
            Some(field) => {
                let mut column = records.column(field)?;
                column.set_byte_order(schema.byte_order());
                ReadResult::Column(column)
            }
            None => ReadResult::Records(records),
        };
        convert(native, flavor)
    }

    /// Whole rows at `coords`, validated against `nrows`.
    pub(crate) fn records_at(
        &self,
        handle: DatasetHandle,
        coords: &[u64],
    ) -> RtabResult<RecordArray> {
        if let Some(&bad) = coords.iter().find(|&&c| c >= self.nrows) {
            return Err(RtabError::InvalidRange(format!(
                "coordinate {bad} out of range for {} rows",
                self.nrows
            )));
        }
        let format = Arc::clone(self.schema()?.row_format());
        let mut data = vec![0u8; coords.len() * format.row_size()];
        if !coords.is_empty() {
            let session = ReadSession::begin(self.store.as_ref(), handle)?;
            session.read_by_index_set(&mut data, coords)?;
        }
        RecordArray::from_bytes(format, data)
    }

    /// One row by index; negative indices count from the end.
    pub fn get_row(&self, index: i64) -> RtabResult<Vec<Value>> {
        self.live_handle()?;
        let range = resolve_for_write(self.nrows, Some(index), None, None)?;
        let past_front = index < 0 && index.unsigned_abs() > self.nrows;
        if past_front || range.start >= self.nrows {
            return Err(RtabError::InvalidRange(format!(
                "row index {index} out of range for {} rows",
                self.nrows
            )));
        }
        let start = range.start as i64;
        self.read_records(Selection::range(start, start + 1))?.row(0)
    }

    /// Rows `start..stop` every `step`, with slice semantics: bounds past the end are clipped.
    pub fn slice(
        &self,
        start: Option<i64>,
        stop: Option<i64>,
        step: Option<i64>,
    ) -> RtabResult<RecordArray> {
        self.live_handle()?;
        let range = resolve_for_write(self.nrows, start, stop, step)?;
        let stop = range.stop.min(self.nrows);
        let start = range.start.min(stop);
        self.read_records(Selection::new(
            Some(start as i64),
            Some(stop as i64),
            Some(range.step as i64),
        ))
    }

    /// A whole column.
    pub fn column(&self, name: &str) -> RtabResult<ColumnArray> {
        self.read_column(Selection::all(), name)
    }

    // ════════════════════════════════════════════
    // DELETE Operations
    // ════════════════════════════════════════════

    /// Remove rows `[start, stop)`; `stop` defaults to `start + 1` and is clipped to
    /// `nrows`. Returns how many rows were removed; an empty range removes nothing.
    ///
    /// Staged rows are saved first, so indices cover everything appended so far.
    pub fn remove_rows(&mut self, start: i64, stop: Option<i64>) -> RtabResult<u64> {
        let handle = self.live_handle()?;
        self.save_buffered_rows()?;
        let nrows = self.nrows;
        let stop = match stop {
            Some(stop) => stop,
            None => resolve_for_read(nrows, Some(start), None, None)?.start as i64 + 1,
        };
        let range = resolve_for_read(nrows, Some(start), Some(stop), None)?;
        if range.is_empty() {
            return Ok(0);
        }
        let removed = {
            let _session = AppendSession::begin(self.store.as_ref(), handle)?;
            self.store.remove_rows(handle, range.start, range.len())?
        };
        self.set_nrows(nrows - removed);
        debug!(table = %self.name, start = range.start, removed, nrows = self.nrows, "removed rows");
        Ok(removed)
    }

    // ════════════════════════════════════════════
    // Lifecycle
    // ════════════════════════════════════════════

    /// Save staged rows and flush the store. Calling it again writes nothing new.
    pub fn flush(&mut self) -> RtabResult<()> {
        match self.state {
            TableState::Closed => return Err(RtabError::TableClosed(self.name.clone())),
            TableState::New => return Ok(()),
            TableState::Created | TableState::Opened => {}
        }
        self.save_buffered_rows()?;
        self.store.flush()
    }

    /// Release the schema and buffers and move to `Closed`.
    ///
    /// Staged rows are NOT saved: call [`Table::flush`] first to keep them.
    pub fn close(&mut self) -> RtabResult<()> {
        if self.state == TableState::Closed {
            return Err(RtabError::TableClosed(self.name.clone()));
        }
        let lost = self.unsaved_rows();
        if lost > 0 {
            warn!(table = %self.name, rows = lost, "closing with unsaved staged rows; they are discarded");
        }
        self.buffer = None;
        self.initial = None;
        self.schema = None;
        self.handle = None;
        self.state = TableState::Closed;
        info!(table = %self.name, nrows = self.nrows, "closed table");
        Ok(())
    }
}

/// Re-encode `records` into `schema`'s row format, matching fields by name.
///
/// Columns absent from `records` take their default when `fill_missing` is set and
/// fail with `SchemaMismatch` otherwise.
pub(crate) fn conform_records(
    records: &RecordArray,
    schema: &Schema,
    fill_missing: bool,
) -> RtabResult<RecordArray> {
    let target = schema.row_format();
    if records.format().as_ref() == target.as_ref() {
        return Ok(records.clone());
    }
    let source = records.format();
    let mapping: Vec<Option<usize>> = schema
        .columns()
        .iter()
        .map(|c| source.field_index(&c.name))
        .collect();
    if !fill_missing
        && let Some((column, _)) = schema
            .columns()
            .iter()
            .zip(&mapping)
            .find(|(_, m)| m.is_none())
    {
        return Err(RtabError::SchemaMismatch(format!(
            "rows have no '{}' field",
            column.name
        )));
    }
    let rows: Vec<Vec<Value>> = records
        .to_rows()
        .into_iter()
        .map(|row| {
            schema
                .columns()
                .iter()
                .zip(&mapping)
                .map(|(column, m)| match m {
                    Some(i) => row[*i].clone(),
                    None => column.default.clone(),
                })
                .collect()
        })
        .collect();
    RecordArray::from_rows(Arc::clone(target), &rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ByteOrder, ColumnSpec, ColumnType};
    use crate::storage::{MemoryStore, RecordStore};
    use crate::table::TableOptions;

    fn schema() -> Schema {
        Schema::from_column_spec(vec![
            ("id", ColumnSpec::new(ColumnType::Int32)),
            ("name", ColumnSpec::bytes(8)),
        ])
        .unwrap()
    }

    fn row(id: i32, name: &str) -> Vec<Value> {
        vec![Value::Int32(id), Value::from(name)]
    }

    fn table() -> Table {
        let mut t = Table::create(
            Arc::new(MemoryStore::new()),
            "t",
            schema(),
            TableOptions::new(),
        )
        .unwrap();
        t.append(&[row(1, "aa"), row(2, "bb"), row(3, "cc")]).unwrap();
        t
    }

    #[test]
    fn scenario_append_read_remove() {
        let mut t = table();
        assert_eq!(t.nrows(), 3);
        let part = t.read_records(Selection::range(1, 3)).unwrap();
        assert_eq!(part.to_rows(), vec![row(2, "bb"), row(3, "cc")]);
        assert_eq!(t.remove_rows(0, Some(1)).unwrap(), 1);
        assert_eq!(t.nrows(), 2);
        assert_eq!(t.shape(), (2,));
        let all = t.read_records(Selection::all()).unwrap();
        assert_eq!(all.to_rows(), vec![row(2, "bb"), row(3, "cc")]);
    }

    #[test]
    fn empty_range_reads_zero_rows() {
        let t = table();
        let out = t.read(Selection::range(5, 2), None, Flavor::Native).unwrap();
        assert!(out.is_empty());
        assert!(matches!(t.iterate(Selection::range(2, 2)).unwrap(), Iteration::Empty(_)));
    }

    #[test]
    fn bad_rows_leave_table_untouched() {
        let mut t = table();
        let err = t
            .append(&[row(4, "dd"), vec![Value::from("x"), Value::from("y")]])
            .unwrap_err();
        assert!(matches!(err, RtabError::SchemaMismatch(_)));
        assert_eq!(t.nrows(), 3);
    }

    #[test]
    fn unknown_field_names_the_table() {
        let t = table();
        match t.read(Selection::all(), Some("price"), Flavor::Native).unwrap_err() {
            RtabError::UnknownColumn { column, table } => {
                assert_eq!(column, "price");
                assert_eq!(table, "t");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn remove_defaults_and_clipping() {
        let mut t = table();
        assert_eq!(t.remove_rows(-1, None).unwrap(), 1);
        assert_eq!(t.nrows(), 2);
        assert_eq!(t.remove_rows(1, Some(100)).unwrap(), 1);
        assert_eq!(t.remove_rows(5, None).unwrap(), 0);
        assert_eq!(t.read_records(Selection::all()).unwrap().to_rows(), vec![row(1, "aa")]);
    }

    #[test]
    fn get_row_and_slice() {
        let t = table();
        assert_eq!(t.get_row(-1).unwrap(), row(3, "cc"));
        assert!(matches!(t.get_row(3), Err(RtabError::InvalidRange(_))));
        assert!(matches!(t.get_row(-4), Err(RtabError::InvalidRange(_))));
        let s = t.slice(Some(0), Some(50), Some(2)).unwrap();
        assert_eq!(s.to_rows(), vec![row(1, "aa"), row(3, "cc")]);
    }

    #[test]
    fn coordinates_keep_order() {
        let t = table();
        let out = t
            .read_coordinates(&[2, 0], None, Flavor::Native)
            .unwrap()
            .into_records()
            .unwrap();
        assert_eq!(out.to_rows(), vec![row(3, "cc"), row(1, "aa")]);
        assert!(t.read_coordinates(&[3], None, Flavor::Native).is_err());
        let names = t
            .read_coordinates(&[1], Some("name"), Flavor::List)
            .unwrap()
            .into_values()
            .unwrap();
        assert_eq!(names, vec![Value::from("bb")]);
    }

    #[test]
    fn flush_is_idempotent_and_close_is_terminal() {
        let mut t = table();
        t.flush().unwrap();
        t.flush().unwrap();
        assert_eq!(t.nrows(), 3);
        t.close().unwrap();
        assert!(matches!(t.read_records(Selection::all()), Err(RtabError::TableClosed(_))));
        assert!(matches!(t.append(&[row(9, "z")]), Err(RtabError::TableClosed(_))));
        assert!(matches!(t.flush(), Err(RtabError::TableClosed(_))));
        assert!(matches!(t.close(), Err(RtabError::TableClosed(_))));
    }

    #[test]
    fn foreign_byte_order_batches_are_reencoded() {
        let mut t = table();
        let big = Schema::from_column_spec_with_order(
            vec![
                ("name", ColumnSpec::bytes(8)),
                ("id", ColumnSpec::new(ColumnType::Int32)),
            ],
            ByteOrder::Big,
        )
        .unwrap();
        let batch = RecordArray::from_rows(
            Arc::clone(big.row_format()),
            &[vec![Value::from("dd"), Value::Int32(4)]],
        )
        .unwrap();
        t.append_records(&batch).unwrap();
        assert_eq!(t.get_row(3).unwrap(), row(4, "dd"));
    }

    #[test]
    fn read_sessions_are_released() {
        let store = Arc::new(MemoryStore::new());
        let mut t = Table::create(
            Arc::clone(&store) as Arc<dyn RecordStore>,
            "t",
            schema(),
            TableOptions::new(),
        )
        .unwrap();
        t.append(&[row(1, "a")]).unwrap();
        let handle = store.open_dataset("t").unwrap();
        let _ = t.read_records(Selection::all()).unwrap();
        let _ = t.read_records(Selection::from_start(0).with_step(2)).unwrap();
        let _ = t.column("id").unwrap();
        assert_eq!(store.active_sessions(handle), (false, false));
    }
}
