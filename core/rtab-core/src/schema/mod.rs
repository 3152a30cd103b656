//! Schema — column descriptions and the row format derived from them.
//!
//! A [`Schema`] is built through exactly one of three constructors:
//!
//! - [`Schema::from_column_spec`] — explicit `name → ColumnSpec` list (new tables)
//! - [`Schema::from_existing_batch`] — inferred from an in-memory record batch
//! - [`Schema::from_storage_metadata`] — rebuilt from what the storage device reports on open
//!
//! Arrow batches are a fourth input path, see [`Schema::from_arrow`].

pub mod column;
pub mod describe;
pub mod format;
pub mod value;

pub use column::{ByteOrder, Column, ColumnSpec, ColumnType, Shape};
pub use describe::{ColumnDescribe, Description, IntoRow};
pub use format::{FieldLayout, RowFormat};
pub use value::Value;

use crate::array::RecordArray;
use crate::error::{RtabError, RtabResult};
use crate::storage::DatasetInfo;
use ahash::AHashSet;
use std::fmt;
use std::sync::Arc;

/// Immutable description of a table's columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    /// Columns sorted by position
    columns: Vec<Column>,
    format: Arc<RowFormat>,
}

impl Schema {
    /// Build a schema from explicit column specs, using the native byte order.
    ///
    /// Columns with an explicit `pos` keep it; the others fill the remaining slots in
    /// the order they were given.
    pub fn from_column_spec<I, S>(columns: I) -> RtabResult<Self>
    where
        I: IntoIterator<Item = (S, ColumnSpec)>,
        S: Into<String>,
    {
        Self::from_column_spec_with_order(columns, ByteOrder::native())
    }

    /// Same as [`Schema::from_column_spec`] with an explicit byte order.
    pub fn from_column_spec_with_order<I, S>(columns: I, byte_order: ByteOrder) -> RtabResult<Self>
    where
        I: IntoIterator<Item = (S, ColumnSpec)>,
        S: Into<String>,
    {
        let specs: Vec<(String, ColumnSpec)> =
            columns.into_iter().map(|(n, s)| (n.into(), s)).collect();
        if specs.is_empty() {
            return Err(RtabError::InvalidSchema(
                "a table needs at least one column".to_string(),
            ));
        }

        let mut seen = AHashSet::new();
        for (name, _) in &specs {
            if name.is_empty() {
                return Err(RtabError::InvalidSchema("empty column name".to_string()));
            }
            if !seen.insert(name.as_str()) {
                return Err(RtabError::InvalidSchema(format!(
                    "duplicate column name '{name}'"
                )));
            }
        }

        let positions = assign_positions(&specs)?;
        let mut resolved = Vec::with_capacity(specs.len());
        for ((name, spec), pos) in specs.into_iter().zip(positions) {
            if let ColumnType::Bytes(0) = spec.dtype {
                return Err(RtabError::InvalidSchema(format!(
                    "byte string column '{name}' needs a positive length"
                )));
            }
            let shape = column::normalize_shape(&name, &spec.shape)?;
            let default = spec.default.unwrap_or_else(|| spec.dtype.zero());
            let column = Column {
                name,
                dtype: spec.dtype,
                shape,
                pos,
                default,
            };
            check_default(&column, byte_order)?;
            resolved.push(column);
        }

        Ok(Self::assemble(resolved, byte_order))
    }

    /// Infer a schema from an existing record batch.
    ///
    /// Byte-string fields become `Bytes(length)` columns, everything else keeps its
    /// numeric type; positions follow the batch's field order and the byte order is
    /// taken from the batch. Defaults are zero.
    pub fn from_existing_batch(batch: &RecordArray) -> RtabResult<Self> {
        let format = batch.format();
        let columns = format
            .fields()
            .iter()
            .enumerate()
            .map(|(pos, field)| Column {
                name: field.name.clone(),
                dtype: field.dtype,
                shape: field.shape.clone(),
                pos,
                default: field.dtype.zero(),
            })
            .collect();
        Ok(Self::assemble(columns, format.byte_order()))
    }

    /// Rebuild a schema from metadata reported by the storage device.
    ///
    /// The leading byte-order marker is parsed off the raw descriptor before the field
    /// list is parsed, then every field is cross-checked against the per-column type,
    /// item size and shape the device reported.
    pub fn from_storage_metadata(info: &DatasetInfo) -> RtabResult<Self> {
        let (byte_order, body) = format::strip_byte_order(&info.row_format)?;
        let elements = format::parse_fields(body)?;
        let n = info.colnames.len();
        if elements.len() != n
            || info.col_types.len() != n
            || info.item_sizes.len() != n
            || info.col_shapes.len() != n
        {
            return Err(RtabError::InvalidSchema(format!(
                "dataset '{}' reports inconsistent column metadata ({} names, {} fields)",
                info.name,
                n,
                elements.len()
            )));
        }

        let mut columns = Vec::with_capacity(n);
        for (pos, (dtype, shape)) in elements.into_iter().enumerate() {
            let name = &info.colnames[pos];
            let reported = ColumnType::from_type_name(&info.col_types[pos], info.item_sizes[pos])?;
            let reported_shape = column::normalize_shape(name, &info.col_shapes[pos])?;
            if reported != dtype || reported_shape != shape {
                return Err(RtabError::InvalidSchema(format!(
                    "column '{name}' metadata ({reported}, {reported_shape:?}) disagrees with row format ({dtype}, {shape:?})"
                )));
            }
            columns.push(Column {
                name: name.clone(),
                dtype,
                shape,
                pos,
                default: dtype.zero(),
            });
        }

        let schema = Self::assemble(columns, byte_order);
        if schema.row_size() != info.row_size {
            return Err(RtabError::InvalidSchema(format!(
                "dataset '{}' reports {}-byte rows but its format packs to {} bytes",
                info.name,
                info.row_size,
                schema.row_size()
            )));
        }
        Ok(schema)
    }

    fn assemble(mut columns: Vec<Column>, byte_order: ByteOrder) -> Self {
        columns.sort_by_key(|c| c.pos);
        let format = RowFormat::new(
            byte_order,
            columns
                .iter()
                .map(|c| (c.name.clone(), c.dtype, c.shape.clone())),
        );
        Self {
            columns,
            format: Arc::new(format),
        }
    }

    /// Columns in position order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.format
            .field_index(name)
            .map(|i| &self.columns[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.format.field_index(name).is_some()
    }

    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.format.byte_order()
    }

    pub fn row_size(&self) -> usize {
        self.format.row_size()
    }

    pub fn row_format(&self) -> &Arc<RowFormat> {
        &self.format
    }

    /// One row made of every column's default, in position order.
    pub fn default_row(&self) -> Vec<Value> {
        self.columns.iter().map(|c| c.default.clone()).collect()
    }

    /// Encoded default row, the template used to reset staging buffers.
    pub fn default_row_bytes(&self) -> RtabResult<Vec<u8>> {
        let mut row = vec![0u8; self.row_size()];
        self.format.encode_row(&mut row, &self.default_row())?;
        Ok(row)
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, c) in self.columns.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "\"{}\": {}", c.name, c.dtype)?;
            if !c.is_scalar() {
                write!(f, "{:?}", c.shape.as_slice())?;
            }
            write!(f, "(dflt={}, pos={})", c.default, c.pos)?;
        }
        write!(f, "}}")
    }
}

fn assign_positions(specs: &[(String, ColumnSpec)]) -> RtabResult<Vec<usize>> {
    let n = specs.len();
    let mut taken = vec![false; n];
    for (name, spec) in specs {
        if let Some(pos) = spec.pos {
            if pos >= n {
                return Err(RtabError::InvalidSchema(format!(
                    "column '{name}' has position {pos} but the table only has {n} columns"
                )));
            }
            if std::mem::replace(&mut taken[pos], true) {
                return Err(RtabError::InvalidSchema(format!(
                    "position {pos} is used by more than one column"
                )));
            }
        }
    }
    let mut free = (0..n).filter(|&p| !taken[p]);
    Ok(specs
        .iter()
        .map(|(_, spec)| match spec.pos {
            Some(pos) => pos,
            None => free.next().unwrap_or_default(),
        })
        .collect())
}

fn check_default(column: &Column, byte_order: ByteOrder) -> RtabResult<()> {
    let field = FieldLayout {
        name: column.name.clone(),
        dtype: column.dtype,
        shape: column.shape.clone(),
        offset: 0,
        size: column.byte_size(),
    };
    let mut scratch = vec![0u8; field.size];
    format::encode_cell(&field, byte_order, &mut scratch, &column.default).map_err(|e| {
        RtabError::InvalidSchema(format!(
            "default for column '{}' does not fit its type: {e}",
            column.name
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> Vec<(&'static str, ColumnSpec)> {
        vec![
            ("id", ColumnSpec::new(ColumnType::Int32)),
            ("name", ColumnSpec::bytes(8).with_default("none")),
            ("pos", ColumnSpec::new(ColumnType::Float64).with_shape([3])),
        ]
    }

    #[test]
    fn positions_follow_declaration_order() {
        let schema = Schema::from_column_spec(spec()).unwrap();
        assert_eq!(schema.names(), vec!["id", "name", "pos"]);
        assert_eq!(schema.row_size(), 4 + 8 + 24);
        assert_eq!(schema.column("name").unwrap().pos, 1);
    }

    #[test]
    fn explicit_positions_are_respected() {
        let schema = Schema::from_column_spec(vec![
            ("a", ColumnSpec::new(ColumnType::Int8)),
            ("b", ColumnSpec::new(ColumnType::Int8).with_pos(0)),
            ("c", ColumnSpec::new(ColumnType::Int8)),
        ])
        .unwrap();
        assert_eq!(schema.names(), vec!["b", "a", "c"]);
        let mut positions: Vec<usize> = schema.columns().iter().map(|c| c.pos).collect();
        positions.sort();
        assert_eq!(positions, vec![0, 1, 2]);
    }

    #[test]
    fn duplicate_positions_are_rejected() {
        let err = Schema::from_column_spec(vec![
            ("a", ColumnSpec::new(ColumnType::Int8).with_pos(1)),
            ("b", ColumnSpec::new(ColumnType::Int8).with_pos(1)),
        ])
        .unwrap_err();
        assert!(matches!(err, RtabError::InvalidSchema(_)));
    }

    #[test]
    fn unrecognized_type_name_is_invalid_schema() {
        let err = ColumnSpec::parse("decimal128").unwrap_err();
        assert!(matches!(err, RtabError::InvalidSchema(_)));
    }

    #[test]
    fn bad_default_is_invalid_schema() {
        let err = Schema::from_column_spec(vec![(
            "tag",
            ColumnSpec::bytes(2).with_default("too long"),
        )])
        .unwrap_err();
        assert!(matches!(err, RtabError::InvalidSchema(_)));
    }

    #[test]
    fn storage_metadata_round_trip() {
        let schema = Schema::from_column_spec_with_order(spec(), ByteOrder::Big).unwrap();
        let info = DatasetInfo::describe("t", &schema, 5);
        assert!(info.row_format.starts_with('>'));
        let back = Schema::from_storage_metadata(&info).unwrap();
        assert_eq!(back.row_format(), schema.row_format());
        assert_eq!(back.byte_order(), ByteOrder::Big);
    }

    #[test]
    fn inconsistent_metadata_is_rejected() {
        let schema = Schema::from_column_spec(spec()).unwrap();
        let mut info = DatasetInfo::describe("t", &schema, 0);
        info.col_types[0] = "Float32".to_string();
        assert!(Schema::from_storage_metadata(&info).is_err());

        let mut info = DatasetInfo::describe("t", &schema, 0);
        info.row_size += 1;
        assert!(Schema::from_storage_metadata(&info).is_err());
    }

    #[test]
    fn default_row_bytes_encode_defaults() {
        let schema = Schema::from_column_spec(spec()).unwrap();
        let bytes = schema.default_row_bytes().unwrap();
        let values = schema.row_format().decode_row(&bytes);
        assert_eq!(values[1], Value::from("none"));
        assert_eq!(values[2], Value::from(vec![0.0f64, 0.0, 0.0]));
    }
}
