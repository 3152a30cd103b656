//! Column descriptors — element types, shapes, byte order.

use crate::error::{RtabError, RtabResult};
use crate::schema::Value;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::str::FromStr;

/// Fixed shape of one cell. Empty means scalar.
pub type Shape = SmallVec<[usize; 4]>;

/// Element type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    /// Fixed-length byte string of the given length
    Bytes(usize),
}

impl ColumnType {
    /// Size in bytes of one element.
    pub fn itemsize(&self) -> usize {
        match self {
            ColumnType::Bool | ColumnType::Int8 | ColumnType::UInt8 => 1,
            ColumnType::Int16 | ColumnType::UInt16 => 2,
            ColumnType::Int32 | ColumnType::UInt32 | ColumnType::Float32 => 4,
            ColumnType::Int64 | ColumnType::UInt64 | ColumnType::Float64 => 8,
            ColumnType::Bytes(len) => *len,
        }
    }

    /// Single-character kind used in the row-format descriptor.
    pub fn kind_char(&self) -> char {
        match self {
            ColumnType::Bool => 'b',
            ColumnType::Int8 | ColumnType::Int16 | ColumnType::Int32 | ColumnType::Int64 => 'i',
            ColumnType::UInt8 | ColumnType::UInt16 | ColumnType::UInt32 | ColumnType::UInt64 => {
                'u'
            }
            ColumnType::Float32 | ColumnType::Float64 => 'f',
            ColumnType::Bytes(_) => 'a',
        }
    }

    /// Rebuild a type from a descriptor kind and element size.
    pub fn from_kind(kind: char, itemsize: usize) -> RtabResult<Self> {
        let dtype = match (kind, itemsize) {
            ('b', 1) => ColumnType::Bool,
            ('i', 1) => ColumnType::Int8,
            ('i', 2) => ColumnType::Int16,
            ('i', 4) => ColumnType::Int32,
            ('i', 8) => ColumnType::Int64,
            ('u', 1) => ColumnType::UInt8,
            ('u', 2) => ColumnType::UInt16,
            ('u', 4) => ColumnType::UInt32,
            ('u', 8) => ColumnType::UInt64,
            ('f', 4) => ColumnType::Float32,
            ('f', 8) => ColumnType::Float64,
            ('a', len) if len > 0 => ColumnType::Bytes(len),
            _ => {
                return Err(RtabError::InvalidSchema(format!(
                    "unsupported element '{kind}{itemsize}'"
                )));
            }
        };
        Ok(dtype)
    }

    /// Canonical type name as reported in dataset metadata.
    pub fn type_name(&self) -> &'static str {
        match self {
            ColumnType::Bool => "Bool",
            ColumnType::Int8 => "Int8",
            ColumnType::Int16 => "Int16",
            ColumnType::Int32 => "Int32",
            ColumnType::Int64 => "Int64",
            ColumnType::UInt8 => "UInt8",
            ColumnType::UInt16 => "UInt16",
            ColumnType::UInt32 => "UInt32",
            ColumnType::UInt64 => "UInt64",
            ColumnType::Float32 => "Float32",
            ColumnType::Float64 => "Float64",
            ColumnType::Bytes(_) => "Bytes",
        }
    }

    /// Rebuild from a metadata type name; byte strings need the item size.
    pub fn from_type_name(name: &str, itemsize: usize) -> RtabResult<Self> {
        match name {
            "Bytes" => ColumnType::from_kind('a', itemsize),
            other => other.parse(),
        }
    }

    pub fn is_bytes(&self) -> bool {
        matches!(self, ColumnType::Bytes(_))
    }

    /// Whether values of this type have a total numeric order.
    pub fn is_orderable(&self) -> bool {
        !matches!(self, ColumnType::Bytes(_))
    }

    /// All-zero value of this type, the default for columns without one.
    pub fn zero(&self) -> Value {
        match self {
            ColumnType::Bool => Value::Bool(false),
            ColumnType::Int8 => Value::Int8(0),
            ColumnType::Int16 => Value::Int16(0),
            ColumnType::Int32 => Value::Int32(0),
            ColumnType::Int64 => Value::Int64(0),
            ColumnType::UInt8 => Value::UInt8(0),
            ColumnType::UInt16 => Value::UInt16(0),
            ColumnType::UInt32 => Value::UInt32(0),
            ColumnType::UInt64 => Value::UInt64(0),
            ColumnType::Float32 => Value::Float32(0.0),
            ColumnType::Float64 => Value::Float64(0.0),
            ColumnType::Bytes(_) => Value::Bytes(Vec::new()),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Bytes(len) => write!(f, "Bytes({len})"),
            other => write!(f, "{}", other.type_name()),
        }
    }
}

impl FromStr for ColumnType {
    type Err = RtabError;

    /// Accepts canonical names (`Int32`), lower-case aliases (`int32`, `float`, `bool`)
    /// and sized byte strings (`bytes8`, `Bytes(8)`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let dtype = match lower.as_str() {
            "bool" | "boolean" => ColumnType::Bool,
            "int8" => ColumnType::Int8,
            "int16" => ColumnType::Int16,
            "int32" | "int" => ColumnType::Int32,
            "int64" => ColumnType::Int64,
            "uint8" => ColumnType::UInt8,
            "uint16" => ColumnType::UInt16,
            "uint32" => ColumnType::UInt32,
            "uint64" => ColumnType::UInt64,
            "float32" => ColumnType::Float32,
            "float64" | "float" | "double" => ColumnType::Float64,
            other => {
                let len = other
                    .strip_prefix("bytes(")
                    .and_then(|rest| rest.strip_suffix(')'))
                    .or_else(|| other.strip_prefix("bytes"))
                    .and_then(|digits| digits.parse::<usize>().ok());
                match len {
                    Some(len) if len > 0 => ColumnType::Bytes(len),
                    _ => {
                        return Err(RtabError::InvalidSchema(format!(
                            "unrecognized column type '{s}'"
                        )));
                    }
                }
            }
        };
        Ok(dtype)
    }
}

/// Byte order of every multi-byte element in a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        }
    }

    /// Descriptor marker (`<` or `>`).
    pub fn marker(&self) -> char {
        match self {
            ByteOrder::Little => '<',
            ByteOrder::Big => '>',
        }
    }

    /// Parse a descriptor marker; `=`, `@` and `|` mean native.
    pub fn from_marker(marker: char) -> Option<Self> {
        match marker {
            '<' => Some(ByteOrder::Little),
            '>' => Some(ByteOrder::Big),
            '=' | '@' | '|' => Some(ByteOrder::native()),
            _ => None,
        }
    }
}

impl fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ByteOrder::Little => write!(f, "little"),
            ByteOrder::Big => write!(f, "big"),
        }
    }
}

/// Declarative definition of one column, before positions are assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub dtype: ColumnType,
    pub shape: Shape,
    pub default: Option<Value>,
    pub pos: Option<usize>,
}

impl ColumnSpec {
    pub fn new(dtype: ColumnType) -> Self {
        Self {
            dtype,
            shape: Shape::new(),
            default: None,
            pos: None,
        }
    }

    /// Column spec from a type name such as `"int32"` or `"bytes8"`.
    pub fn parse(type_name: &str) -> RtabResult<Self> {
        Ok(Self::new(type_name.parse()?))
    }

    /// Fixed-length byte string column.
    pub fn bytes(length: usize) -> Self {
        Self::new(ColumnType::Bytes(length))
    }

    pub fn with_shape(mut self, shape: impl IntoIterator<Item = usize>) -> Self {
        self.shape = shape.into_iter().collect();
        self
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_pos(mut self, pos: usize) -> Self {
        self.pos = Some(pos);
        self
    }
}

/// A fully resolved column of a schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub dtype: ColumnType,
    pub shape: Shape,
    pub pos: usize,
    pub default: Value,
}

impl Column {
    /// Number of elements in one cell.
    pub fn elements(&self) -> usize {
        self.shape.iter().product()
    }

    /// Bytes occupied by one cell in a row.
    pub fn byte_size(&self) -> usize {
        self.dtype.itemsize() * self.elements()
    }

    pub fn is_scalar(&self) -> bool {
        self.shape.is_empty()
    }
}

/// Collapse the legacy "shape 1 means scalar" convention and reject empty dimensions.
pub(crate) fn normalize_shape(name: &str, shape: &[usize]) -> RtabResult<Shape> {
    if shape.iter().any(|&d| d == 0) {
        return Err(RtabError::InvalidSchema(format!(
            "column '{name}' has a zero-length dimension in shape {shape:?}"
        )));
    }
    if shape == [1] {
        return Ok(Shape::new());
    }
    Ok(shape.iter().copied().collect())
}
