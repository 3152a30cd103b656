//! Arrow interop.
//!
//! | Column                  | Arrow                               |
//! |-------------------------|-------------------------------------|
//! | `Bool`                  | `BooleanArray`                      |
//! | numeric scalar          | `PrimitiveArray<T>`                 |
//! | `Bytes(n)`              | `FixedSizeBinaryArray(n)`           |
//! | shape `(d0, d1, ...)`   | `FixedSizeList(d0, FixedSizeList(d1, ...))` |
//!
//! Whole-row results become a `RecordBatch`; the reverse direction feeds
//! [`crate::table::Table::from_arrow`].

use crate::array::{ColumnArray, RecordArray};
use crate::error::{RtabError, RtabResult};
use crate::schema::{ByteOrder, Column, ColumnSpec, ColumnType, RowFormat, Schema, Shape};
use ::arrow::array::{
    Array, ArrayRef, AsArray, BooleanArray, FixedSizeBinaryArray, FixedSizeListArray,
    PrimitiveArray,
};
use ::arrow::buffer::Buffer;
use ::arrow::datatypes::{
    DataType, Field, Float32Type, Float64Type, Int8Type, Int16Type, Int32Type, Int64Type,
    Schema as ArrowSchema, UInt8Type, UInt16Type, UInt32Type, UInt64Type,
};
use ::arrow::record_batch::RecordBatch;
use rayon::prelude::*;
use std::sync::Arc;

/// Arrow element type of a column type.
pub fn arrow_type(dtype: ColumnType) -> DataType {
    match dtype {
        ColumnType::Bool => DataType::Boolean,
        ColumnType::Int8 => DataType::Int8,
        ColumnType::Int16 => DataType::Int16,
        ColumnType::Int32 => DataType::Int32,
        ColumnType::Int64 => DataType::Int64,
        ColumnType::UInt8 => DataType::UInt8,
        ColumnType::UInt16 => DataType::UInt16,
        ColumnType::UInt32 => DataType::UInt32,
        ColumnType::UInt64 => DataType::UInt64,
        ColumnType::Float32 => DataType::Float32,
        ColumnType::Float64 => DataType::Float64,
        ColumnType::Bytes(n) => DataType::FixedSizeBinary(n as i32),
    }
}

/// Arrow type of a whole cell, nesting one fixed-size list per dimension.
pub fn cell_type(dtype: ColumnType, shape: &[usize]) -> DataType {
    shape.iter().rev().fold(arrow_type(dtype), |inner, &dim| {
        DataType::FixedSizeList(Arc::new(Field::new("item", inner, false)), dim as i32)
    })
}

macro_rules! primitive_array {
    ($arrow:ty, $native:ty, $bytes:expr, $order:expr) => {{
        let values: Vec<$native> = $bytes
            .chunks_exact(std::mem::size_of::<$native>())
            .map(|c| {
                let mut raw = [0u8; std::mem::size_of::<$native>()];
                raw.copy_from_slice(c);
                match $order {
                    ByteOrder::Little => <$native>::from_le_bytes(raw),
                    ByteOrder::Big => <$native>::from_be_bytes(raw),
                }
            })
            .collect();
        Arc::new(PrimitiveArray::<$arrow>::from(values)) as ArrayRef
    }};
}

fn element_array(dtype: ColumnType, order: ByteOrder, bytes: &[u8]) -> RtabResult<ArrayRef> {
    Ok(match dtype {
        ColumnType::Bool => Arc::new(BooleanArray::from(
            bytes.iter().map(|&b| b != 0).collect::<Vec<bool>>(),
        )),
        ColumnType::Int8 => primitive_array!(Int8Type, i8, bytes, order),
        ColumnType::Int16 => primitive_array!(Int16Type, i16, bytes, order),
        ColumnType::Int32 => primitive_array!(Int32Type, i32, bytes, order),
        ColumnType::Int64 => primitive_array!(Int64Type, i64, bytes, order),
        ColumnType::UInt8 => Arc::new(PrimitiveArray::<UInt8Type>::from(bytes.to_vec())),
        ColumnType::UInt16 => primitive_array!(UInt16Type, u16, bytes, order),
        ColumnType::UInt32 => primitive_array!(UInt32Type, u32, bytes, order),
        ColumnType::UInt64 => primitive_array!(UInt64Type, u64, bytes, order),
        ColumnType::Float32 => primitive_array!(Float32Type, f32, bytes, order),
        ColumnType::Float64 => primitive_array!(Float64Type, f64, bytes, order),
        ColumnType::Bytes(n) => Arc::new(FixedSizeBinaryArray::try_new(
            n as i32,
            Buffer::from(bytes.to_vec()),
            None,
        )?),
    })
}

/// Convert one column into an Arrow array of `len()` cells.
pub fn column_to_arrow(column: &ColumnArray) -> RtabResult<ArrayRef> {
    let mut array = element_array(column.dtype(), column.byte_order(), column.as_bytes())?;
    for &dim in column.cell_shape().iter().rev() {
        let field = Arc::new(Field::new("item", array.data_type().clone(), false));
        array = Arc::new(FixedSizeListArray::try_new(field, dim as i32, array, None)?);
    }
    Ok(array)
}

/// Convert whole rows into a `RecordBatch`, one Arrow column per field.
pub fn records_to_arrow(records: &RecordArray) -> RtabResult<RecordBatch> {
    let format = records.format();
    let fields: Vec<Field> = format
        .fields()
        .iter()
        .map(|f| Field::new(f.name.as_str(), cell_type(f.dtype, &f.shape), false))
        .collect();
    let columns = format
        .fields()
        .par_iter()
        .map(|f| records.column(&f.name).and_then(|c| column_to_arrow(&c)))
        .collect::<RtabResult<Vec<ArrayRef>>>()?;
    Ok(RecordBatch::try_new(
        Arc::new(ArrowSchema::new(fields)),
        columns,
    )?)
}

/// Map an Arrow cell type back to `(element type, shape)`.
fn column_type(name: &str, data_type: &DataType) -> RtabResult<(ColumnType, Shape)> {
    let dtype = match data_type {
        DataType::Boolean => ColumnType::Bool,
        DataType::Int8 => ColumnType::Int8,
        DataType::Int16 => ColumnType::Int16,
        DataType::Int32 => ColumnType::Int32,
        DataType::Int64 => ColumnType::Int64,
        DataType::UInt8 => ColumnType::UInt8,
        DataType::UInt16 => ColumnType::UInt16,
        DataType::UInt32 => ColumnType::UInt32,
        DataType::UInt64 => ColumnType::UInt64,
        DataType::Float32 => ColumnType::Float32,
        DataType::Float64 => ColumnType::Float64,
        DataType::FixedSizeBinary(n) if *n > 0 => ColumnType::Bytes(*n as usize),
        DataType::FixedSizeList(child, dim) if *dim > 0 => {
            let (dtype, inner) = column_type(name, child.data_type())?;
            let mut shape = Shape::from_slice(&[*dim as usize]);
            shape.extend_from_slice(&inner);
            return Ok((dtype, shape));
        }
        other => {
            return Err(RtabError::InvalidSchema(format!(
                "column '{name}' has Arrow type {other} which has no fixed-width row layout"
            )));
        }
    };
    Ok((dtype, Shape::new()))
}

impl Schema {
    /// Infer a schema from an Arrow schema, native byte order, zero defaults.
    pub fn from_arrow(schema: &ArrowSchema) -> RtabResult<Self> {
        if schema.fields().is_empty() {
            return Err(RtabError::InvalidSchema(
                "a table needs at least one column".to_string(),
            ));
        }
        let columns = schema
            .fields()
            .iter()
            .map(|f| {
                let (dtype, shape) = column_type(f.name(), f.data_type())?;
                Ok((f.name().clone(), ColumnSpec::new(dtype).with_shape(shape)))
            })
            .collect::<RtabResult<Vec<_>>>()?;
        Schema::from_column_spec(columns)
    }
}

/// Element bytes of an Arrow array in native byte order, children flattened.
fn element_bytes(name: &str, array: &dyn Array, out: &mut Vec<u8>) -> RtabResult<()> {
    if array.null_count() > 0 {
        return Err(RtabError::SchemaMismatch(format!(
            "column '{name}' contains nulls, which fixed-width rows cannot hold"
        )));
    }
    match array.data_type() {
        DataType::Boolean => out.extend(array.as_boolean().values().iter().map(|b| b as u8)),
        DataType::FixedSizeBinary(_) => {
            let a = array.as_fixed_size_binary();
            for i in 0..a.len() {
                out.extend_from_slice(a.value(i));
            }
        }
        DataType::FixedSizeList(_, dim) => {
            let a = array.as_fixed_size_list();
            if !a.is_empty() {
                let child = a
                    .values()
                    .slice(a.value_offset(0) as usize, a.len() * *dim as usize);
                element_bytes(name, child.as_ref(), out)?;
            }
        }
        other => {
            let width = other.primitive_width().ok_or_else(|| {
                RtabError::InvalidSchema(format!("column '{name}' has unsupported type {other}"))
            })?;
            let data = array.to_data();
            let start = data.offset() * width;
            let buffer = data.buffers().first().ok_or_else(|| {
                RtabError::SchemaMismatch(format!("column '{name}' has no value buffer"))
            })?;
            out.extend_from_slice(&buffer.as_slice()[start..start + data.len() * width]);
        }
    }
    Ok(())
}

/// Pack a `RecordBatch` into rows of `format`.
pub(crate) fn records_from_arrow(
    batch: &RecordBatch,
    format: Arc<RowFormat>,
) -> RtabResult<RecordArray> {
    let rows = batch.num_rows();
    let row_size = format.row_size();
    let mut data = vec![0u8; rows * row_size];
    for field in format.fields() {
        let array = batch.column_by_name(&field.name).ok_or_else(|| {
            RtabError::SchemaMismatch(format!("batch has no column '{}'", field.name))
        })?;
        let mut cells = Vec::with_capacity(rows * field.size);
        element_bytes(&field.name, array.as_ref(), &mut cells)?;
        if cells.len() != rows * field.size {
            return Err(RtabError::SchemaMismatch(format!(
                "column '{}' packs to {} bytes, expected {}",
                field.name,
                cells.len(),
                rows * field.size
            )));
        }
        for (row, cell) in data.chunks_exact_mut(row_size).zip(cells.chunks_exact(field.size)) {
            field.slot_mut(row).copy_from_slice(cell);
        }
    }
    RecordArray::from_bytes(format, data)
}

impl Schema {
    /// The columns as non-nullable Arrow fields, in position order.
    pub fn to_arrow(&self) -> ArrowSchema {
        ArrowSchema::new(
            self.columns()
                .iter()
                .map(|c: &Column| Field::new(c.name.as_str(), cell_type(c.dtype, &c.shape), false))
                .collect::<Vec<Field>>(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Value;
    use ::arrow::array::{Float64Array, Int32Array};

    fn records() -> RecordArray {
        let schema = Schema::from_column_spec_with_order(
            vec![
                ("id", ColumnSpec::new(ColumnType::Int32)),
                ("name", ColumnSpec::bytes(4)),
                ("grid", ColumnSpec::new(ColumnType::Float64).with_shape([2, 2])),
                ("ok", ColumnSpec::new(ColumnType::Bool)),
            ],
            ByteOrder::Big,
        )
        .unwrap();
        let rows: Vec<Vec<Value>> = (0..3)
            .map(|i| {
                vec![
                    Value::Int32(i),
                    Value::from("ab"),
                    Value::Float64(i as f64),
                    Value::Bool(i % 2 == 0),
                ]
            })
            .collect();
        RecordArray::from_rows(Arc::clone(schema.row_format()), &rows).unwrap()
    }

    #[test]
    fn records_to_batch() {
        let batch = records_to_arrow(&records()).unwrap();
        assert_eq!(batch.num_rows(), 3);
        let ids = batch.column(0).as_any().downcast_ref::<Int32Array>().unwrap();
        assert_eq!(ids.values().to_vec(), vec![0, 1, 2]);
        let names = batch.column(1).as_fixed_size_binary();
        assert_eq!(names.value(2), b"ab\0\0");
        let grid = batch.column(2).as_fixed_size_list();
        assert_eq!(grid.value_length(), 2);
        let row = grid.value(1);
        let inner = row.as_fixed_size_list().value(0);
        let floats = inner.as_any().downcast_ref::<Float64Array>().unwrap();
        assert_eq!(floats.values().to_vec(), vec![1.0, 1.0]);
    }

    #[test]
    fn batch_round_trips_through_schema() {
        let batch = records_to_arrow(&records()).unwrap();
        let schema = Schema::from_arrow(&batch.schema()).unwrap();
        assert_eq!(schema.names(), vec!["id", "name", "grid", "ok"]);
        assert_eq!(schema.column("grid").unwrap().shape.as_slice(), &[2, 2]);
        let back = records_from_arrow(&batch, Arc::clone(schema.row_format())).unwrap();
        assert_eq!(back.to_rows(), records().to_rows());
    }

    #[test]
    fn sliced_batches_respect_offsets() {
        let batch = records_to_arrow(&records()).unwrap().slice(1, 2);
        let schema = Schema::from_arrow(&batch.schema()).unwrap();
        let back = records_from_arrow(&batch, Arc::clone(schema.row_format())).unwrap();
        assert_eq!(back.get(0, "id").unwrap(), Value::Int32(1));
        assert_eq!(back.get(1, "grid").unwrap(), Value::from(vec![vec![2.0f64, 2.0], vec![2.0, 2.0]]));
    }

    #[test]
    fn schema_to_arrow_matches_batches() {
        let records = records();
        let schema = Schema::from_existing_batch(&records).unwrap();
        let batch = records_to_arrow(&records).unwrap();
        assert_eq!(&schema.to_arrow(), batch.schema().as_ref());
    }

    #[test]
    fn variable_width_types_are_rejected() {
        let schema = ArrowSchema::new(vec![Field::new("s", DataType::Utf8, false)]);
        assert!(matches!(
            Schema::from_arrow(&schema),
            Err(RtabError::InvalidSchema(_))
        ));
    }
}
