//! Record buffer — a reusable, contiguous block of schema-typed rows.
//!
//! The same type stages rows for append (the leading `unsaved_rows` slots are
//! populated and waiting for a flush) and receives rows read back from storage.

use crate::error::{RtabError, RtabResult};
use crate::schema::{RowFormat, Schema, Value};
use std::sync::Arc;

pub struct RecordBuffer {
    format: Arc<RowFormat>,
    data: Vec<u8>,
    capacity: usize,
    unsaved: usize,
    /// Encoded default row
    template: Vec<u8>,
}

impl RecordBuffer {
    /// Allocate `capacity` rows. With `init_defaults` every field of every row starts
    /// at its column default, otherwise the block is zeroed.
    pub fn allocate(schema: &Schema, capacity: usize, init_defaults: bool) -> RtabResult<Self> {
        let format = Arc::clone(schema.row_format());
        let template = schema.default_row_bytes()?;
        let mut buffer = Self {
            data: vec![0u8; format.row_size() * capacity],
            format,
            capacity,
            unsaved: 0,
            template,
        };
        if init_defaults {
            buffer.reset_to_defaults();
        }
        Ok(buffer)
    }

    /// Re-apply the column defaults to every row without reallocating.
    pub fn reset_to_defaults(&mut self) {
        let row_size = self.format.row_size();
        if row_size == 0 {
            return;
        }
        for row in self.data.chunks_exact_mut(row_size) {
            row.copy_from_slice(&self.template);
        }
    }

    pub fn format(&self) -> &Arc<RowFormat> {
        &self.format
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn unsaved_rows(&self) -> usize {
        self.unsaved
    }

    pub fn set_unsaved_rows(&mut self, n: usize) -> RtabResult<()> {
        if n > self.capacity {
            return Err(RtabError::InvalidOperation {
                message: format!("{n} unsaved rows exceed buffer capacity {}", self.capacity),
                context: "RecordBuffer::set_unsaved_rows".to_string(),
            });
        }
        self.unsaved = n;
        Ok(())
    }

    pub fn is_full(&self) -> bool {
        self.unsaved >= self.capacity
    }

    pub fn row(&self, i: usize) -> &[u8] {
        let size = self.format.row_size();
        &self.data[i * size..(i + 1) * size]
    }

    pub fn row_mut(&mut self, i: usize) -> &mut [u8] {
        let size = self.format.row_size();
        &mut self.data[i * size..(i + 1) * size]
    }

    /// The first `n` rows as one contiguous slice.
    pub fn rows(&self, n: usize) -> &[u8] {
        &self.data[..n * self.format.row_size()]
    }

    pub fn rows_mut(&mut self, n: usize) -> &mut [u8] {
        let size = self.format.row_size();
        &mut self.data[..n * size]
    }

    /// Write one field of row `i`.
    pub fn set_field(&mut self, i: usize, name: &str, value: &Value) -> RtabResult<()> {
        if i >= self.capacity {
            return Err(RtabError::InvalidOperation {
                message: format!("row {i} is outside a buffer of {} rows", self.capacity),
                context: "RecordBuffer::set_field".to_string(),
            });
        }
        let format = Arc::clone(&self.format);
        let field = format
            .field(name)
            .ok_or_else(|| RtabError::unknown_column(name, "<buffer>"))?;
        let order = format.byte_order();
        crate::schema::format::encode_cell(field, order, field.slot_mut(self.row_mut(i)), value)
    }

    /// Decode row `i` into values in position order.
    pub fn decode_row(&self, i: usize) -> Vec<Value> {
        self.format.decode_row(self.row(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnSpec, ColumnType};

    fn schema() -> Schema {
        Schema::from_column_spec(vec![
            ("id", ColumnSpec::new(ColumnType::Int32).with_default(-1)),
            ("name", ColumnSpec::bytes(4).with_default("n/a")),
        ])
        .unwrap()
    }

    #[test]
    fn allocate_with_defaults() {
        let buf = RecordBuffer::allocate(&schema(), 3, true).unwrap();
        for i in 0..3 {
            assert_eq!(buf.decode_row(i), vec![Value::Int32(-1), Value::from("n/a")]);
        }
        assert_eq!(buf.unsaved_rows(), 0);
    }

    #[test]
    fn allocate_without_defaults_is_zeroed() {
        let buf = RecordBuffer::allocate(&schema(), 2, false).unwrap();
        assert!(buf.rows(2).iter().all(|&b| b == 0));
    }

    #[test]
    fn reset_clears_stale_values() {
        let mut buf = RecordBuffer::allocate(&schema(), 2, true).unwrap();
        buf.set_field(0, "id", &Value::Int32(42)).unwrap();
        buf.set_field(1, "name", &Value::from("zz")).unwrap();
        buf.reset_to_defaults();
        assert_eq!(buf.decode_row(0)[0], Value::Int32(-1));
        assert_eq!(buf.decode_row(1)[1], Value::from("n/a"));
    }

    #[test]
    fn unsaved_rows_bounded_by_capacity() {
        let mut buf = RecordBuffer::allocate(&schema(), 2, true).unwrap();
        buf.set_unsaved_rows(2).unwrap();
        assert!(buf.is_full());
        assert!(buf.set_unsaved_rows(3).is_err());
    }

    #[test]
    fn set_field_past_capacity_is_rejected() {
        let mut buf = RecordBuffer::allocate(&schema(), 2, true).unwrap();
        let err = buf.set_field(2, "id", &Value::Int32(1)).unwrap_err();
        assert!(matches!(err, RtabError::InvalidOperation { .. }));
    }

    #[test]
    fn unknown_field_is_rejected() {
        let mut buf = RecordBuffer::allocate(&schema(), 1, true).unwrap();
        let err = buf.set_field(0, "price", &Value::Int32(1)).unwrap_err();
        assert!(matches!(err, RtabError::UnknownColumn { .. }));
    }
}
