//! Output flavors — the in-memory representation a read result is handed back in.
//!
//! Conversion is a pure transform dispatched on [`Flavor`]; it never touches storage.

pub mod arrow;

use crate::array::{ColumnArray, RecordArray};
use crate::error::{RtabError, RtabResult};
use crate::schema::Value;
use ::arrow::array::ArrayRef;
use ::arrow::record_batch::RecordBatch;
use std::fmt;
use std::str::FromStr;

/// Requested result representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Flavor {
    /// [`RecordArray`] / [`ColumnArray`]
    #[default]
    Native,
    /// Rows as `Value::Tuple`, array cells as nested tuples
    Tuple,
    /// Rows as `Value::List`, array cells as nested lists
    List,
    /// Arrow `RecordBatch` (rows) or `ArrayRef` (column)
    Arrow,
}

impl FromStr for Flavor {
    type Err = RtabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "native" | "numarray" => Ok(Flavor::Native),
            "tuple" => Ok(Flavor::Tuple),
            "list" => Ok(Flavor::List),
            "arrow" => Ok(Flavor::Arrow),
            _ => Err(RtabError::UnsupportedFlavor(format!(
                "'{s}' (supported: native, numarray, tuple, list, arrow)"
            ))),
        }
    }
}

impl fmt::Display for Flavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Flavor::Native => "native",
            Flavor::Tuple => "tuple",
            Flavor::List => "list",
            Flavor::Arrow => "arrow",
        };
        f.write_str(name)
    }
}

/// Result of a table read in some flavor.
#[derive(Debug, Clone)]
pub enum ReadResult {
    Records(RecordArray),
    Column(ColumnArray),
    /// Tuple and list flavors
    Values(Vec<Value>),
    Batch(RecordBatch),
    Array(ArrayRef),
}

impl ReadResult {
    /// Number of rows (or cells) in the result.
    pub fn len(&self) -> usize {
        match self {
            ReadResult::Records(r) => r.len(),
            ReadResult::Column(c) => c.len(),
            ReadResult::Values(v) => v.len(),
            ReadResult::Batch(b) => b.num_rows(),
            ReadResult::Array(a) => a.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn flavor(&self) -> Flavor {
        match self {
            ReadResult::Records(_) | ReadResult::Column(_) => Flavor::Native,
            ReadResult::Values(v) => match v.first() {
                Some(Value::Tuple(_)) => Flavor::Tuple,
                _ => Flavor::List,
            },
            ReadResult::Batch(_) | ReadResult::Array(_) => Flavor::Arrow,
        }
    }

    pub fn into_records(self) -> Option<RecordArray> {
        match self {
            ReadResult::Records(r) => Some(r),
            _ => None,
        }
    }

    pub fn into_column(self) -> Option<ColumnArray> {
        match self {
            ReadResult::Column(c) => Some(c),
            _ => None,
        }
    }

    pub fn into_values(self) -> Option<Vec<Value>> {
        match self {
            ReadResult::Values(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_batch(self) -> Option<RecordBatch> {
        match self {
            ReadResult::Batch(b) => Some(b),
            _ => None,
        }
    }

    pub fn into_array(self) -> Option<ArrayRef> {
        match self {
            ReadResult::Array(a) => Some(a),
            _ => None,
        }
    }
}

/// Convert a native result into `flavor`.
pub fn convert(native: ReadResult, flavor: Flavor) -> RtabResult<ReadResult> {
    match (native, flavor) {
        (native, Flavor::Native) => Ok(native),
        (ReadResult::Records(r), Flavor::Tuple) => Ok(ReadResult::Values(
            r.to_rows()
                .into_iter()
                .map(|row| Value::Tuple(row.into_iter().map(tuplify).collect()))
                .collect(),
        )),
        (ReadResult::Records(r), Flavor::List) => Ok(ReadResult::Values(
            r.to_rows().into_iter().map(Value::List).collect(),
        )),
        (ReadResult::Column(c), Flavor::Tuple) => {
            Ok(ReadResult::Values(c.values().into_iter().map(tuplify).collect()))
        }
        (ReadResult::Column(c), Flavor::List) => Ok(ReadResult::Values(c.values())),
        (ReadResult::Records(r), Flavor::Arrow) => Ok(ReadResult::Batch(arrow::records_to_arrow(&r)?)),
        (ReadResult::Column(c), Flavor::Arrow) => Ok(ReadResult::Array(arrow::column_to_arrow(&c)?)),
        (other, flavor) => Err(RtabError::UnsupportedFlavor(format!(
            "cannot convert a {} result to {flavor}",
            other.flavor()
        ))),
    }
}

fn tuplify(value: Value) -> Value {
    match value {
        Value::List(items) => Value::Tuple(items.into_iter().map(tuplify).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnSpec, ColumnType, Schema};
    use std::sync::Arc;

    fn records() -> RecordArray {
        let schema = Schema::from_column_spec(vec![
            ("id", ColumnSpec::new(ColumnType::Int16)),
            ("v", ColumnSpec::new(ColumnType::UInt8).with_shape([2])),
        ])
        .unwrap();
        RecordArray::from_rows(
            Arc::clone(schema.row_format()),
            &[
                vec![Value::Int16(1), Value::from(vec![1u8, 2])],
                vec![Value::Int16(2), Value::from(vec![3u8, 4])],
            ],
        )
        .unwrap()
    }

    #[test]
    fn parse_flavor_names() {
        assert_eq!("numarray".parse::<Flavor>().unwrap(), Flavor::Native);
        assert_eq!("Tuple".parse::<Flavor>().unwrap(), Flavor::Tuple);
        let err = "Numeric".parse::<Flavor>().unwrap_err();
        assert!(matches!(err, RtabError::UnsupportedFlavor(_)));
    }

    #[test]
    fn tuple_flavor_nests_tuples() {
        let out = convert(ReadResult::Records(records()), Flavor::Tuple).unwrap();
        let rows = out.into_values().unwrap();
        assert_eq!(
            rows[1],
            Value::Tuple(vec![
                Value::Int16(2),
                Value::Tuple(vec![Value::UInt8(3), Value::UInt8(4)])
            ])
        );
    }

    #[test]
    fn list_flavor_of_column() {
        let col = records().column("id").unwrap();
        let out = convert(ReadResult::Column(col), Flavor::List).unwrap();
        assert_eq!(out.into_values().unwrap(), vec![Value::Int16(1), Value::Int16(2)]);
    }

    #[test]
    fn converted_results_cannot_be_reconverted() {
        let out = convert(ReadResult::Records(records()), Flavor::List).unwrap();
        assert!(matches!(
            convert(out, Flavor::Arrow),
            Err(RtabError::UnsupportedFlavor(_))
        ));
    }
}
