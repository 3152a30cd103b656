//! Dynamically typed cell values.
//!
//! `Value` is what callers hand to `append`, what column defaults are made of, and what
//! the tuple/list flavors produce on the way out.

use crate::error::{RtabError, RtabResult};
use crate::schema::ColumnType;
use std::fmt;

/// A single cell, a fixed-shape array cell, or a whole row.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    /// Fixed-length byte string (trailing NULs are stripped on read)
    Bytes(Vec<u8>),
    /// Array cell or list-flavored result
    List(Vec<Value>),
    /// Row or tuple-flavored result
    Tuple(Vec<Value>),
}

macro_rules! impl_from_primitive {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from_primitive!(
    bool => Bool,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Bytes(v.as_bytes().to_vec())
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl Value {
    /// Human-readable kind, used in mismatch messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "Bool",
            Value::Int8(_) => "Int8",
            Value::Int16(_) => "Int16",
            Value::Int32(_) => "Int32",
            Value::Int64(_) => "Int64",
            Value::UInt8(_) => "UInt8",
            Value::UInt16(_) => "UInt16",
            Value::UInt32(_) => "UInt32",
            Value::UInt64(_) => "UInt64",
            Value::Float32(_) => "Float32",
            Value::Float64(_) => "Float64",
            Value::Bytes(_) => "Bytes",
            Value::List(_) => "List",
            Value::Tuple(_) => "Tuple",
        }
    }

    /// Integer view of a scalar, if it has one without loss.
    pub fn as_i128(&self) -> Option<i128> {
        match *self {
            Value::Bool(v) => Some(v as i128),
            Value::Int8(v) => Some(v as i128),
            Value::Int16(v) => Some(v as i128),
            Value::Int32(v) => Some(v as i128),
            Value::Int64(v) => Some(v as i128),
            Value::UInt8(v) => Some(v as i128),
            Value::UInt16(v) => Some(v as i128),
            Value::UInt32(v) => Some(v as i128),
            Value::UInt64(v) => Some(v as i128),
            Value::Float32(v) if v.fract() == 0.0 && v.is_finite() => Some(v as i128),
            Value::Float64(v) if v.fract() == 0.0 && v.is_finite() => Some(v as i128),
            _ => None,
        }
    }

    /// Floating point view of a numeric scalar.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Float32(v) => Some(v as f64),
            Value::Float64(v) => Some(v),
            Value::Bool(_) => None,
            _ => self.as_i128().map(|v| v as f64),
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Cast a scalar into the given element type.
    ///
    /// Integer targets accept any integral value in range; float targets accept any
    /// numeric value; byte strings must fit the column length and are NUL-padded.
    pub fn coerce(&self, dtype: ColumnType) -> RtabResult<Value> {
        let mismatch = || {
            RtabError::SchemaMismatch(format!(
                "cannot store {} value {:?} in a {} element",
                self.kind_name(),
                self,
                dtype
            ))
        };

        macro_rules! int_target {
            ($ty:ty, $variant:ident) => {{
                if matches!(self, Value::Bool(_)) {
                    return Err(mismatch());
                }
                let v = self.as_i128().ok_or_else(mismatch)?;
                <$ty>::try_from(v)
                    .map(Value::$variant)
                    .map_err(|_| mismatch())
            }};
        }

        match dtype {
            ColumnType::Bool => match self {
                Value::Bool(v) => Ok(Value::Bool(*v)),
                _ => Err(mismatch()),
            },
            ColumnType::Int8 => int_target!(i8, Int8),
            ColumnType::Int16 => int_target!(i16, Int16),
            ColumnType::Int32 => int_target!(i32, Int32),
            ColumnType::Int64 => int_target!(i64, Int64),
            ColumnType::UInt8 => int_target!(u8, UInt8),
            ColumnType::UInt16 => int_target!(u16, UInt16),
            ColumnType::UInt32 => int_target!(u32, UInt32),
            ColumnType::UInt64 => int_target!(u64, UInt64),
            ColumnType::Float32 => self
                .as_f64()
                .map(|v| Value::Float32(v as f32))
                .ok_or_else(mismatch),
            ColumnType::Float64 => self.as_f64().map(Value::Float64).ok_or_else(mismatch),
            ColumnType::Bytes(len) => match self {
                Value::Bytes(b) if b.len() <= len => Ok(Value::Bytes(b.clone())),
                _ => Err(mismatch()),
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int8(v) => write!(f, "{v}"),
            Value::Int16(v) => write!(f, "{v}"),
            Value::Int32(v) => write!(f, "{v}"),
            Value::Int64(v) => write!(f, "{v}"),
            Value::UInt8(v) => write!(f, "{v}"),
            Value::UInt16(v) => write!(f, "{v}"),
            Value::UInt32(v) => write!(f, "{v}"),
            Value::UInt64(v) => write!(f, "{v}"),
            Value::Float32(v) => write!(f, "{v}"),
            Value::Float64(v) => write!(f, "{v}"),
            Value::Bytes(b) => write!(f, "{:?}", String::from_utf8_lossy(b)),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_widen_and_narrow_in_range() {
        assert_eq!(Value::Int64(7).coerce(ColumnType::Int8).unwrap(), Value::Int8(7));
        assert_eq!(
            Value::UInt8(200).coerce(ColumnType::Int32).unwrap(),
            Value::Int32(200)
        );
        assert!(Value::Int32(300).coerce(ColumnType::UInt8).is_err());
        assert!(Value::Int32(-1).coerce(ColumnType::UInt64).is_err());
    }

    #[test]
    fn floats_accept_integers_but_not_the_reverse_with_fraction() {
        assert_eq!(
            Value::Int32(3).coerce(ColumnType::Float64).unwrap(),
            Value::Float64(3.0)
        );
        assert_eq!(
            Value::Float64(4.0).coerce(ColumnType::Int16).unwrap(),
            Value::Int16(4)
        );
        assert!(Value::Float64(4.5).coerce(ColumnType::Int16).is_err());
    }

    #[test]
    fn byte_strings_must_fit() {
        assert!(Value::from("abcd").coerce(ColumnType::Bytes(4)).is_ok());
        let err = Value::from("abcde").coerce(ColumnType::Bytes(4)).unwrap_err();
        assert!(matches!(err, RtabError::SchemaMismatch(_)));
    }

    #[test]
    fn bool_is_not_numeric() {
        assert!(Value::Bool(true).coerce(ColumnType::Int32).is_err());
        assert!(Value::Int32(1).coerce(ColumnType::Bool).is_err());
    }

    #[test]
    fn display_nested() {
        let v = Value::Tuple(vec![Value::Int32(1), Value::from("aa"), Value::from(vec![1.5f64, 2.0])]);
        assert_eq!(v.to_string(), "(1, \"aa\", [1.5, 2])");
    }
}
