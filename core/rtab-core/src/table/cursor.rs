//! Row cursors and the row writer.
//!
//! | Type | Borrows | Purpose |
//! |------|---------|---------|
//! | [`RowCursor`] | `&Table` | Batched iteration over a resolved range |
//! | [`Iteration`] | `&Table` | Cursor, or an empty batch for empty ranges |
//! | [`RowAppender`] | `&mut Table` | Field-by-field row staging |
//!
//! A cursor reads through its own window of at most `rows_per_batch` visited rows,
//! so iterating never disturbs rows staged for append.

use crate::array::{ColumnArray, Record, RecordArray};
use crate::error::{RtabError, RtabResult};
use crate::range::ResolvedRange;
use crate::schema::{RowFormat, Value};
use crate::storage::{DatasetHandle, ReadSession};
use crate::table::Table;
use std::sync::Arc;
use tracing::debug;

/// Iterator over the rows of a [`ResolvedRange`], in ascending order.
///
/// Storage is read one window at a time: contiguous reads for unit steps, index-set
/// reads otherwise. The first read error is yielded once and ends the iteration.
pub struct RowCursor<'t> {
    table: &'t Table,
    handle: DatasetHandle,
    format: Arc<RowFormat>,
    range: ResolvedRange,
    /// Next row to yield
    next: u64,
    remaining: u64,
    window: Vec<u8>,
    window_rows: usize,
    window_pos: usize,
    failed: bool,
}

impl<'t> RowCursor<'t> {
    pub(crate) fn new(
        table: &'t Table,
        handle: DatasetHandle,
        format: Arc<RowFormat>,
        range: ResolvedRange,
    ) -> Self {
        Self {
            table,
            handle,
            format,
            next: range.start,
            remaining: range.len(),
            range,
            window: Vec::new(),
            window_rows: 0,
            window_pos: 0,
            failed: false,
        }
    }

    /// The range this cursor walks.
    pub fn range(&self) -> ResolvedRange {
        self.range
    }

    /// Rows not yet yielded.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    fn load_window(&mut self) -> RtabResult<()> {
        let batch = self
            .remaining
            .min(self.table.buffer_spec.rows_per_batch.max(1) as u64) as usize;
        self.window.resize(batch * self.format.row_size(), 0);
        {
            let session = ReadSession::begin(self.table.store.as_ref(), self.handle)?;
            if self.range.step == 1 {
                session.read_contiguous(&mut self.window, self.next)?;
            } else {
                let indices: Vec<u64> = (0..batch as u64)
                    .map(|k| self.next + k * self.range.step)
                    .collect();
                session.read_by_index_set(&mut self.window, &indices)?;
            }
        }
        self.window_rows = batch;
        self.window_pos = 0;
        debug!(table = %self.table.name, first = self.next, rows = batch, "loaded cursor window");
        Ok(())
    }

    fn consume(&mut self, rows: usize) {
        self.window_pos += rows;
        self.next += rows as u64 * self.range.step;
        self.remaining -= rows as u64;
    }

    /// Collect the remaining rows into one batch.
    pub fn fill_records(mut self) -> RtabResult<RecordArray> {
        let row_size = self.format.row_size();
        let mut data = Vec::with_capacity(self.remaining as usize * row_size);
        let pending = self.window_rows - self.window_pos;
        data.extend_from_slice(&self.window[self.window_pos * row_size..self.window_rows * row_size]);
        self.consume(pending);
        while self.remaining > 0 {
            self.load_window()?;
            data.extend_from_slice(&self.window);
            self.consume(self.window_rows);
        }
        RecordArray::from_bytes(Arc::clone(&self.format), data)
    }

    /// Read one field of the remaining rows with a single strided read.
    ///
    /// The column is stamped with the table's byte order.
    pub fn fill_column(self, field: &str) -> RtabResult<ColumnArray> {
        let schema = self.table.schema()?;
        let column = schema
            .column(field)
            .ok_or_else(|| RtabError::unknown_column(field, &self.table.name))?;
        let n = self.remaining as usize;
        let mut out = ColumnArray::zeroed(
            field,
            column.dtype,
            column.shape.clone(),
            n,
            schema.byte_order(),
        );
        if n > 0 {
            let session = ReadSession::begin(self.table.store.as_ref(), self.handle)?;
            session.read_column(
                out.as_bytes_mut(),
                self.next,
                self.range.stop,
                self.range.step,
                field,
            )?;
        }
        Ok(out)
    }
}

impl Iterator for RowCursor<'_> {
    type Item = RtabResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 || self.failed {
            return None;
        }
        if self.window_pos == self.window_rows
            && let Err(e) = self.load_window()
        {
            self.failed = true;
            return Some(Err(e));
        }
        let row_size = self.format.row_size();
        let at = self.window_pos * row_size;
        let bytes = self.window[at..at + row_size].to_vec();
        let nrow = self.next;
        self.consume(1);
        Some(Ok(Record::new(nrow, Arc::clone(&self.format), bytes)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.failed {
            return (0, Some(0));
        }
        let n = self.remaining as usize;
        (n, Some(n))
    }
}

/// Result of [`Table::iterate`].
pub enum Iteration<'t> {
    Cursor(RowCursor<'t>),
    /// The range was empty; holds a zero-row batch in the table's format
    Empty(RecordArray),
}

impl Iteration<'_> {
    pub fn is_empty(&self) -> bool {
        match self {
            Iteration::Cursor(cursor) => cursor.remaining() == 0,
            Iteration::Empty(_) => true,
        }
    }

    /// Collect every remaining row.
    pub fn into_records(self) -> RtabResult<RecordArray> {
        match self {
            Iteration::Cursor(cursor) => cursor.fill_records(),
            Iteration::Empty(records) => Ok(records),
        }
    }
}

impl Iterator for Iteration<'_> {
    type Item = RtabResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Iteration::Cursor(cursor) => cursor.next(),
            Iteration::Empty(_) => None,
        }
    }
}

/// Stages one row at a time in the table's buffer.
///
/// Fields left unset keep their column default. The buffer is saved when it fills
/// up or when the table is flushed.
pub struct RowAppender<'t> {
    table: &'t mut Table,
}

impl RowAppender<'_> {
    /// Set a field of the row being built.
    ///
    /// A full buffer left behind by a failed save is saved again first.
    pub fn set(&mut self, column: &str, value: impl Into<Value>) -> RtabResult<&mut Self> {
        if !self.table.schema()?.contains(column) {
            return Err(RtabError::unknown_column(column, &self.table.name));
        }
        self.save_if_full()?;
        let buffer = self.table.staging_buffer()?;
        let row = buffer.unsaved_rows();
        buffer.set_field(row, column, &value.into())?;
        Ok(self)
    }

    /// Commit the row being built to the staging buffer.
    ///
    /// If the buffer fills up and saving it fails, the rows stay staged and the
    /// save is retried by the next `set`, `append` or [`Table::flush`].
    pub fn append(&mut self) -> RtabResult<()> {
        self.save_if_full()?;
        let buffer = self.table.staging_buffer()?;
        let staged = buffer.unsaved_rows() + 1;
        buffer.set_unsaved_rows(staged)?;
        self.save_if_full()
    }

    fn save_if_full(&mut self) -> RtabResult<()> {
        if self.table.staging_buffer()?.is_full() {
            self.table.save_buffered_rows()?;
        }
        Ok(())
    }

    /// Rows staged and not yet saved.
    pub fn pending(&self) -> usize {
        self.table.unsaved_rows()
    }
}

impl Table {
    /// Start staging rows field by field.
    pub fn row_writer(&mut self) -> RtabResult<RowAppender<'_>> {
        self.staging_buffer()?;
        Ok(RowAppender { table: self })
    }
}
