//! Declarative table descriptions.
//!
//! `#[derive(Description)]` (from `rtab-derive`) implements [`Description`] and
//! [`IntoRow`] for a struct by asking each field type for its [`ColumnDescribe`] impl.
//!
//! | Rust field type     | Column                         |
//! |---------------------|--------------------------------|
//! | `i32`, `f64`, `bool`, ... | scalar of that type      |
//! | `[u8; N]`           | byte string of length `N`      |
//! | `[T; N]`            | vector of `N` elements         |
//! | `[[T; M]; N]`       | `N x M` array                  |
//! | `[[u8; L]; N]`      | vector of `N` byte strings     |

use crate::error::RtabResult;
use crate::schema::{ColumnSpec, ColumnType, Schema, Value};

/// A type that describes a table layout.
pub trait Description {
    /// Column specs in declaration order.
    fn columns() -> Vec<(String, ColumnSpec)>;

    fn schema() -> RtabResult<Schema> {
        Schema::from_column_spec(Self::columns())
    }
}

/// A value that can be appended as one table row.
pub trait IntoRow {
    /// Field values in column position order.
    fn into_row(&self) -> Vec<Value>;
}

impl IntoRow for Vec<Value> {
    fn into_row(&self) -> Vec<Value> {
        self.clone()
    }
}

impl IntoRow for [Value] {
    fn into_row(&self) -> Vec<Value> {
        self.to_vec()
    }
}

impl<const N: usize> IntoRow for [Value; N] {
    fn into_row(&self) -> Vec<Value> {
        self.to_vec()
    }
}

/// Maps a Rust field type to a column.
pub trait ColumnDescribe {
    fn column_spec() -> ColumnSpec;

    fn to_value(&self) -> Value;
}

macro_rules! describe_primitive {
    ($($ty:ty => $dtype:ident),* $(,)?) => {
        $(
            impl ColumnDescribe for $ty {
                fn column_spec() -> ColumnSpec {
                    ColumnSpec::new(ColumnType::$dtype)
                }

                fn to_value(&self) -> Value {
                    Value::from(*self)
                }
            }

            impl<const N: usize> ColumnDescribe for [$ty; N] {
                fn column_spec() -> ColumnSpec {
                    ColumnSpec::new(ColumnType::$dtype).with_shape([N])
                }

                fn to_value(&self) -> Value {
                    Value::List(self.iter().map(|v| Value::from(*v)).collect())
                }
            }

            impl<const N: usize, const M: usize> ColumnDescribe for [[$ty; M]; N] {
                fn column_spec() -> ColumnSpec {
                    ColumnSpec::new(ColumnType::$dtype).with_shape([N, M])
                }

                fn to_value(&self) -> Value {
                    Value::List(
                        self.iter()
                            .map(|row| Value::List(row.iter().map(|v| Value::from(*v)).collect()))
                            .collect(),
                    )
                }
            }
        )*
    };
}

describe_primitive!(
    bool => Bool,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
);

impl ColumnDescribe for u8 {
    fn column_spec() -> ColumnSpec {
        ColumnSpec::new(ColumnType::UInt8)
    }

    fn to_value(&self) -> Value {
        Value::UInt8(*self)
    }
}

// [u8; N] is a byte string, not a vector of UInt8.
impl<const N: usize> ColumnDescribe for [u8; N] {
    fn column_spec() -> ColumnSpec {
        ColumnSpec::bytes(N)
    }

    fn to_value(&self) -> Value {
        Value::Bytes(self.to_vec())
    }
}

impl<const N: usize, const L: usize> ColumnDescribe for [[u8; L]; N] {
    fn column_spec() -> ColumnSpec {
        ColumnSpec::bytes(L).with_shape([N])
    }

    fn to_value(&self) -> Value {
        Value::List(self.iter().map(|s| Value::Bytes(s.to_vec())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_types_map_to_shapes() {
        assert_eq!(<[f64; 3]>::column_spec().shape.as_slice(), &[3]);
        assert_eq!(<[[i16; 2]; 4]>::column_spec().shape.as_slice(), &[4, 2]);
        assert_eq!(<[u8; 16]>::column_spec().dtype, ColumnType::Bytes(16));
        let names = <[[u8; 4]; 2]>::column_spec();
        assert_eq!(names.dtype, ColumnType::Bytes(4));
        assert_eq!(names.shape.as_slice(), &[2]);
    }

    #[test]
    fn values_follow_shape() {
        let grid = [[1i16, 2], [3, 4]];
        assert_eq!(
            grid.to_value(),
            Value::List(vec![Value::from(vec![1i16, 2]), Value::from(vec![3i16, 4])])
        );
        assert_eq!(b"ab\0\0".to_value(), Value::Bytes(b"ab\0\0".to_vec()));
    }
}
