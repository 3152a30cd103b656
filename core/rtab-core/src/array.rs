//! In-memory result containers.
//!
//! - [`RecordArray`] — rows in a table's row format (whole-row reads, append input)
//! - [`ColumnArray`] — one field across rows (column reads)
//! - [`Record`] — a single row handed out by the row cursor

use crate::error::{RtabError, RtabResult};
use crate::schema::format::{decode_cell, decode_shaped};
use crate::schema::{ByteOrder, ColumnType, IntoRow, RowFormat, Shape, Value};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// A batch of rows laid out in a row format.
///
/// Usually contiguous. A strided view (see [`RecordArray::step_by`]) shares the parent
/// bytes and has `stride > row_size`; storage only accepts contiguous batches, so such
/// views are copied with [`RecordArray::to_contiguous`] before they are written.
#[derive(Clone)]
pub struct RecordArray {
    format: Arc<RowFormat>,
    data: Arc<Vec<u8>>,
    offset: usize,
    stride: usize,
    len: usize,
}

impl RecordArray {
    /// Zero-row array of the given format.
    pub fn empty(format: Arc<RowFormat>) -> Self {
        let stride = format.row_size();
        Self {
            format,
            data: Arc::new(Vec::new()),
            offset: 0,
            stride,
            len: 0,
        }
    }

    /// Wrap packed row bytes.
    pub fn from_bytes(format: Arc<RowFormat>, data: Vec<u8>) -> RtabResult<Self> {
        let row_size = format.row_size();
        if row_size == 0 || data.len() % row_size != 0 {
            return Err(RtabError::SchemaMismatch(format!(
                "{} bytes is not a whole number of {row_size}-byte rows",
                data.len()
            )));
        }
        Ok(Self {
            len: data.len() / row_size,
            format,
            data: Arc::new(data),
            offset: 0,
            stride: row_size,
        })
    }

    /// Encode rows of values into a new contiguous array.
    pub fn from_rows<R: IntoRow>(format: Arc<RowFormat>, rows: &[R]) -> RtabResult<Self> {
        let row_size = format.row_size();
        let mut data = vec![0u8; row_size * rows.len()];
        for (i, row) in rows.iter().enumerate() {
            format
                .encode_row(&mut data[i * row_size..(i + 1) * row_size], &row.into_row())
                .map_err(|e| match e {
                    RtabError::SchemaMismatch(msg) => {
                        RtabError::SchemaMismatch(format!("row {i}: {msg}"))
                    }
                    other => other,
                })?;
        }
        Self::from_bytes(format, data)
    }

    pub fn format(&self) -> &Arc<RowFormat> {
        &self.format
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.format.byte_order()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn names(&self) -> Vec<String> {
        self.format.names()
    }

    /// Whether rows sit back to back from the start of the buffer.
    pub fn is_contiguous(&self) -> bool {
        self.len <= 1 || self.stride == self.format.row_size()
    }

    /// Packed copy of this array (cheap clone if already packed).
    pub fn to_contiguous(&self) -> Self {
        if self.is_contiguous() && self.offset == 0 {
            return self.clone();
        }
        let bytes = self.contiguous_bytes().into_owned();
        Self {
            len: self.len,
            format: Arc::clone(&self.format),
            data: Arc::new(bytes),
            offset: 0,
            stride: self.format.row_size(),
        }
    }

    /// Row bytes back to back, borrowing when possible.
    pub fn contiguous_bytes(&self) -> Cow<'_, [u8]> {
        let row_size = self.format.row_size();
        if self.is_contiguous() {
            let start = self.offset;
            return Cow::Borrowed(&self.data[start..start + self.len * row_size]);
        }
        let mut out = Vec::with_capacity(self.len * row_size);
        for i in 0..self.len {
            out.extend_from_slice(self.row_bytes(i));
        }
        Cow::Owned(out)
    }

    /// View of every `step`-th row, sharing the underlying bytes.
    pub fn step_by(&self, step: usize) -> RtabResult<Self> {
        if step == 0 {
            return Err(RtabError::InvalidRange("slice step cannot be zero".to_string()));
        }
        Ok(Self {
            format: Arc::clone(&self.format),
            data: Arc::clone(&self.data),
            offset: self.offset,
            stride: self.stride * step,
            len: self.len.div_ceil(step),
        })
    }

    pub fn row_bytes(&self, i: usize) -> &[u8] {
        let start = self.offset + i * self.stride;
        &self.data[start..start + self.format.row_size()]
    }

    /// Decoded row `i` in position order.
    pub fn row(&self, i: usize) -> RtabResult<Vec<Value>> {
        self.check_index(i)?;
        Ok(self.format.decode_row(self.row_bytes(i)))
    }

    /// One field of row `i`.
    pub fn get(&self, i: usize, name: &str) -> RtabResult<Value> {
        self.check_index(i)?;
        let field = self
            .format
            .field(name)
            .ok_or_else(|| RtabError::unknown_column(name, "<records>"))?;
        Ok(decode_cell(field, self.byte_order(), field.slot(self.row_bytes(i))))
    }

    /// All rows decoded.
    pub fn to_rows(&self) -> Vec<Vec<Value>> {
        (0..self.len)
            .map(|i| self.format.decode_row(self.row_bytes(i)))
            .collect()
    }

    /// Project one field across all rows.
    pub fn column(&self, name: &str) -> RtabResult<ColumnArray> {
        let field = self
            .format
            .field(name)
            .ok_or_else(|| RtabError::unknown_column(name, "<records>"))?;
        let mut data = Vec::with_capacity(self.len * field.size);
        for i in 0..self.len {
            data.extend_from_slice(field.slot(self.row_bytes(i)));
        }
        Ok(ColumnArray {
            name: field.name.clone(),
            dtype: field.dtype,
            cell_shape: field.shape.clone(),
            len: self.len,
            data,
            byte_order: self.byte_order(),
        })
    }

    fn check_index(&self, i: usize) -> RtabResult<()> {
        if i >= self.len {
            return Err(RtabError::InvalidRange(format!(
                "row {i} out of range for {} rows",
                self.len
            )));
        }
        Ok(())
    }
}

impl PartialEq for RecordArray {
    fn eq(&self, other: &Self) -> bool {
        self.format == other.format
            && self.len == other.len
            && (0..self.len).all(|i| self.row_bytes(i) == other.row_bytes(i))
    }
}

impl fmt::Debug for RecordArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordArray")
            .field("format", &self.format.descriptor())
            .field("names", &self.format.names())
            .field("len", &self.len)
            .field("contiguous", &self.is_contiguous())
            .finish()
    }
}

/// One field across a range of rows.
///
/// Elements are packed in the byte order recorded in `byte_order`, which is stamped
/// from the owning table after a read.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnArray {
    name: String,
    dtype: ColumnType,
    cell_shape: Shape,
    len: usize,
    data: Vec<u8>,
    byte_order: ByteOrder,
}

impl ColumnArray {
    /// Zero-filled column of `len` cells.
    pub fn zeroed(
        name: impl Into<String>,
        dtype: ColumnType,
        cell_shape: Shape,
        len: usize,
        byte_order: ByteOrder,
    ) -> Self {
        let cell = dtype.itemsize() * cell_shape.iter().product::<usize>();
        Self {
            name: name.into(),
            dtype,
            cell_shape,
            len,
            data: vec![0u8; cell * len],
            byte_order,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dtype(&self) -> ColumnType {
        self.dtype
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Shape of one cell (empty for scalar columns).
    pub fn cell_shape(&self) -> &[usize] {
        &self.cell_shape
    }

    /// Full result shape: `(n,)` for scalars, `(n,) + cell_shape` otherwise.
    pub fn shape(&self) -> Vec<usize> {
        let mut shape = Vec::with_capacity(1 + self.cell_shape.len());
        shape.push(self.len);
        shape.extend_from_slice(&self.cell_shape);
        shape
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn set_byte_order(&mut self, order: ByteOrder) {
        self.byte_order = order;
    }

    /// Bytes per cell.
    pub fn cell_size(&self) -> usize {
        self.dtype.itemsize() * self.cell_shape.iter().product::<usize>()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn cell_bytes(&self, i: usize) -> &[u8] {
        let size = self.cell_size();
        &self.data[i * size..(i + 1) * size]
    }

    pub fn get(&self, i: usize) -> RtabResult<Value> {
        if i >= self.len {
            return Err(RtabError::InvalidRange(format!(
                "cell {i} out of range for {} cells",
                self.len
            )));
        }
        Ok(decode_shaped(
            self.dtype,
            &self.cell_shape,
            self.byte_order,
            self.cell_bytes(i),
        ))
    }

    /// Every cell decoded.
    pub fn values(&self) -> Vec<Value> {
        (0..self.len)
            .map(|i| decode_shaped(self.dtype, &self.cell_shape, self.byte_order, self.cell_bytes(i)))
            .collect()
    }
}

/// One row produced by a [`crate::table::RowCursor`].
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    nrow: u64,
    format: Arc<RowFormat>,
    bytes: Vec<u8>,
}

impl Record {
    pub(crate) fn new(nrow: u64, format: Arc<RowFormat>, bytes: Vec<u8>) -> Self {
        Self { nrow, format, bytes }
    }

    /// Row number inside the table.
    pub fn nrow(&self) -> u64 {
        self.nrow
    }

    pub fn get(&self, name: &str) -> RtabResult<Value> {
        let field = self
            .format
            .field(name)
            .ok_or_else(|| RtabError::unknown_column(name, "<record>"))?;
        Ok(decode_cell(field, self.format.byte_order(), field.slot(&self.bytes)))
    }

    pub fn values(&self) -> Vec<Value> {
        self.format.decode_row(&self.bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnSpec, Schema};

    fn format() -> Arc<RowFormat> {
        let schema = Schema::from_column_spec(vec![
            ("id", ColumnSpec::new(ColumnType::Int32)),
            ("name", ColumnSpec::bytes(8)),
        ])
        .unwrap();
        Arc::clone(schema.row_format())
    }

    fn rows(n: i32) -> Vec<Vec<Value>> {
        (0..n)
            .map(|i| vec![Value::Int32(i), Value::from(format!("r{i}").as_str())])
            .collect()
    }

    #[test]
    fn from_rows_and_back() {
        let arr = RecordArray::from_rows(format(), &rows(3)).unwrap();
        assert_eq!(arr.len(), 3);
        assert_eq!(arr.to_rows(), rows(3));
        assert_eq!(arr.get(2, "name").unwrap(), Value::from("r2"));
    }

    #[test]
    fn mismatched_row_reports_index() {
        let bad = vec![vec![Value::Int32(1), Value::from("ok")], vec![Value::from("x"), Value::from("y")]];
        let err = RecordArray::from_rows(format(), &bad).unwrap_err();
        assert!(err.to_string().contains("row 1"));
    }

    #[test]
    fn strided_view_and_contiguous_copy() {
        let arr = RecordArray::from_rows(format(), &rows(5)).unwrap();
        let view = arr.step_by(2).unwrap();
        assert!(!view.is_contiguous());
        assert_eq!(view.len(), 3);
        let packed = view.to_contiguous();
        assert!(packed.is_contiguous());
        let ids: Vec<Value> = packed.to_rows().into_iter().map(|r| r[0].clone()).collect();
        assert_eq!(ids, vec![Value::Int32(0), Value::Int32(2), Value::Int32(4)]);
        assert_eq!(packed, view);
    }

    #[test]
    fn column_projection_shape() {
        let arr = RecordArray::from_rows(format(), &rows(4)).unwrap();
        let col = arr.column("id").unwrap();
        assert_eq!(col.shape(), vec![4]);
        assert_eq!(col.get(3).unwrap(), Value::Int32(3));
        assert!(arr.column("nope").is_err());
    }

    #[test]
    fn vector_column_shape() {
        let col = ColumnArray::zeroed("v", ColumnType::Float32, Shape::from_slice(&[2, 3]), 5, ByteOrder::Little);
        assert_eq!(col.shape(), vec![5, 2, 3]);
        assert_eq!(col.cell_size(), 24);
    }
}
