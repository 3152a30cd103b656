//! Row format — the packed binary layout shared by every row of a table.
//!
//! Fields are laid out back to back in position order with no padding. Every
//! multi-byte element uses the table's single byte order.
//!
//! # Descriptor
//!
//! The format is persisted as a compact descriptor string: one leading byte-order
//! marker followed by comma-separated field tokens `[shape]<kind><itemsize>`.
//!
//! ```text
//! <i4,a8,3f8,(2,2)u2
//! │ │  │  │   └── 2x2 array of UInt16
//! │ │  │  └────── vector of three Float64
//! │ │  └───────── 8-byte string
//! │ └──────────── Int32 scalar
//! └────────────── little endian
//! ```

use crate::error::{RtabError, RtabResult};
use crate::schema::{ByteOrder, ColumnType, Shape, Value};
use ahash::AHashMap;

/// Placement of one field inside a row.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldLayout {
    pub name: String,
    pub dtype: ColumnType,
    pub shape: Shape,
    pub offset: usize,
    pub size: usize,
}

impl FieldLayout {
    pub fn elements(&self) -> usize {
        self.shape.iter().product()
    }

    /// Slice of `row` holding this field.
    pub fn slot<'a>(&self, row: &'a [u8]) -> &'a [u8] {
        &row[self.offset..self.offset + self.size]
    }

    pub fn slot_mut<'a>(&self, row: &'a mut [u8]) -> &'a mut [u8] {
        &mut row[self.offset..self.offset + self.size]
    }
}

/// Binary layout of a row.
#[derive(Debug, Clone)]
pub struct RowFormat {
    byte_order: ByteOrder,
    fields: Vec<FieldLayout>,
    row_size: usize,
    index: AHashMap<String, usize>,
}

impl PartialEq for RowFormat {
    fn eq(&self, other: &Self) -> bool {
        self.byte_order == other.byte_order && self.fields == other.fields
    }
}

impl RowFormat {
    /// Build a packed layout from `(name, type, shape)` triples in position order.
    pub fn new(
        byte_order: ByteOrder,
        fields: impl IntoIterator<Item = (String, ColumnType, Shape)>,
    ) -> Self {
        let mut offset = 0;
        let mut index = AHashMap::new();
        let fields: Vec<FieldLayout> = fields
            .into_iter()
            .enumerate()
            .map(|(i, (name, dtype, shape))| {
                let size = dtype.itemsize() * shape.iter().product::<usize>();
                index.insert(name.clone(), i);
                let layout = FieldLayout {
                    name,
                    dtype,
                    shape,
                    offset,
                    size,
                };
                offset += size;
                layout
            })
            .collect();
        Self {
            byte_order,
            fields,
            row_size: offset,
            index,
        }
    }

    /// Rebuild a layout from a stored descriptor and the column names reported alongside it.
    pub fn from_descriptor(descriptor: &str, names: &[String]) -> RtabResult<Self> {
        let (byte_order, elements) = parse_descriptor(descriptor)?;
        if elements.len() != names.len() {
            return Err(RtabError::InvalidSchema(format!(
                "descriptor '{descriptor}' has {} fields but {} column names were given",
                elements.len(),
                names.len()
            )));
        }
        Ok(Self::new(
            byte_order,
            names
                .iter()
                .cloned()
                .zip(elements)
                .map(|(name, (dtype, shape))| (name, dtype, shape)),
        ))
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn row_size(&self) -> usize {
        self.row_size
    }

    pub fn fields(&self) -> &[FieldLayout] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldLayout> {
        self.index.get(name).map(|&i| &self.fields[i])
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    /// Serialize to the descriptor string (byte-order marker first).
    pub fn descriptor(&self) -> String {
        let mut out = String::with_capacity(1 + self.fields.len() * 4);
        out.push(self.byte_order.marker());
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            match field.shape.len() {
                0 => {}
                1 => out.push_str(&field.shape[0].to_string()),
                _ => {
                    let dims: Vec<String> = field.shape.iter().map(|d| d.to_string()).collect();
                    out.push('(');
                    out.push_str(&dims.join(","));
                    out.push(')');
                }
            }
            out.push(field.dtype.kind_char());
            out.push_str(&field.dtype.itemsize().to_string());
        }
        out
    }

    /// Encode one row of values (position order) into `row`.
    pub fn encode_row(&self, row: &mut [u8], values: &[Value]) -> RtabResult<()> {
        if values.len() != self.fields.len() {
            return Err(RtabError::SchemaMismatch(format!(
                "expected {} fields per row, got {}",
                self.fields.len(),
                values.len()
            )));
        }
        for (field, value) in self.fields.iter().zip(values) {
            encode_cell(field, self.byte_order, field.slot_mut(row), value)
                .map_err(|e| mismatch_in(&field.name, e))?;
        }
        Ok(())
    }

    /// Decode one row into values in position order.
    pub fn decode_row(&self, row: &[u8]) -> Vec<Value> {
        self.fields
            .iter()
            .map(|field| decode_cell(field, self.byte_order, field.slot(row)))
            .collect()
    }
}

fn mismatch_in(field: &str, err: RtabError) -> RtabError {
    match err {
        RtabError::SchemaMismatch(msg) => RtabError::SchemaMismatch(format!("field '{field}': {msg}")),
        other => other,
    }
}

/// Split a descriptor into its byte order and the remaining field list.
pub fn strip_byte_order(descriptor: &str) -> RtabResult<(ByteOrder, &str)> {
    let mut chars = descriptor.chars();
    let marker = chars.next().ok_or_else(|| {
        RtabError::InvalidSchema("empty row-format descriptor".to_string())
    })?;
    let order = ByteOrder::from_marker(marker).ok_or_else(|| {
        RtabError::InvalidSchema(format!(
            "descriptor '{descriptor}' lacks a leading byte-order marker"
        ))
    })?;
    Ok((order, chars.as_str()))
}

/// Parse a full descriptor into its byte order and per-field `(type, shape)`.
pub fn parse_descriptor(descriptor: &str) -> RtabResult<(ByteOrder, Vec<(ColumnType, Shape)>)> {
    let (order, body) = strip_byte_order(descriptor)?;
    Ok((order, parse_fields(body)?))
}

/// Parse the field list of a descriptor whose byte-order marker was already removed.
pub fn parse_fields(body: &str) -> RtabResult<Vec<(ColumnType, Shape)>> {
    let invalid = |token: &str| {
        RtabError::InvalidSchema(format!("malformed descriptor field '{token}'"))
    };
    let mut fields = Vec::new();
    let mut rest = body;
    while !rest.is_empty() {
        // A parenthesized shape contains commas, so split manually.
        let (token, tail) = if rest.starts_with('(') {
            let close = rest.find(')').ok_or_else(|| invalid(rest))?;
            match rest[close..].find(',') {
                Some(comma) => (&rest[..close + comma], &rest[close + comma + 1..]),
                None => (rest, ""),
            }
        } else {
            match rest.find(',') {
                Some(comma) => (&rest[..comma], &rest[comma + 1..]),
                None => (rest, ""),
            }
        };
        fields.push(parse_token(token).map_err(|_| invalid(token))?);
        rest = tail;
    }
    Ok(fields)
}

fn parse_token(token: &str) -> RtabResult<(ColumnType, Shape)> {
    let bad = || RtabError::InvalidSchema(format!("malformed descriptor field '{token}'"));
    let (shape, element): (Shape, &str) = if let Some(inner) = token.strip_prefix('(') {
        let close = inner.find(')').ok_or_else(bad)?;
        let dims = inner[..close]
            .split(',')
            .map(|d| d.trim().parse::<usize>().map_err(|_| bad()))
            .collect::<RtabResult<Shape>>()?;
        (dims, &inner[close + 1..])
    } else {
        let digits = token.chars().take_while(|c| c.is_ascii_digit()).count();
        if digits == 0 {
            (Shape::new(), token)
        } else {
            let dim = token[..digits].parse::<usize>().map_err(|_| bad())?;
            (Shape::from_slice(&[dim]), &token[digits..])
        }
    };
    let mut chars = element.chars();
    let kind = chars.next().ok_or_else(bad)?;
    let itemsize = chars.as_str().parse::<usize>().map_err(|_| bad())?;
    let dtype = ColumnType::from_kind(kind, itemsize)?;
    if shape.iter().any(|&d| d == 0) {
        return Err(bad());
    }
    Ok((dtype, shape))
}

macro_rules! put_scalar {
    ($out:expr, $v:expr, $order:expr) => {{
        let bytes = match $order {
            ByteOrder::Little => $v.to_le_bytes(),
            ByteOrder::Big => $v.to_be_bytes(),
        };
        $out.copy_from_slice(&bytes);
    }};
}

macro_rules! get_scalar {
    ($ty:ty, $bytes:expr, $order:expr) => {{
        let mut raw = [0u8; std::mem::size_of::<$ty>()];
        raw.copy_from_slice($bytes);
        match $order {
            ByteOrder::Little => <$ty>::from_le_bytes(raw),
            ByteOrder::Big => <$ty>::from_be_bytes(raw),
        }
    }};
}

/// Encode a scalar element of `dtype` into `out` (exactly `itemsize` bytes).
pub(crate) fn encode_element(
    dtype: ColumnType,
    order: ByteOrder,
    out: &mut [u8],
    value: &Value,
) -> RtabResult<()> {
    match value.coerce(dtype)? {
        Value::Bool(v) => out[0] = v as u8,
        Value::Int8(v) => put_scalar!(out, v, order),
        Value::Int16(v) => put_scalar!(out, v, order),
        Value::Int32(v) => put_scalar!(out, v, order),
        Value::Int64(v) => put_scalar!(out, v, order),
        Value::UInt8(v) => out[0] = v,
        Value::UInt16(v) => put_scalar!(out, v, order),
        Value::UInt32(v) => put_scalar!(out, v, order),
        Value::UInt64(v) => put_scalar!(out, v, order),
        Value::Float32(v) => put_scalar!(out, v, order),
        Value::Float64(v) => put_scalar!(out, v, order),
        Value::Bytes(b) => {
            out[..b.len()].copy_from_slice(&b);
            out[b.len()..].fill(0);
        }
        other => {
            return Err(RtabError::SchemaMismatch(format!(
                "expected a scalar, got {}",
                other.kind_name()
            )));
        }
    }
    Ok(())
}

/// Decode one scalar element.
pub(crate) fn decode_element(dtype: ColumnType, order: ByteOrder, bytes: &[u8]) -> Value {
    match dtype {
        ColumnType::Bool => Value::Bool(bytes[0] != 0),
        ColumnType::Int8 => Value::Int8(bytes[0] as i8),
        ColumnType::Int16 => Value::Int16(get_scalar!(i16, bytes, order)),
        ColumnType::Int32 => Value::Int32(get_scalar!(i32, bytes, order)),
        ColumnType::Int64 => Value::Int64(get_scalar!(i64, bytes, order)),
        ColumnType::UInt8 => Value::UInt8(bytes[0]),
        ColumnType::UInt16 => Value::UInt16(get_scalar!(u16, bytes, order)),
        ColumnType::UInt32 => Value::UInt32(get_scalar!(u32, bytes, order)),
        ColumnType::UInt64 => Value::UInt64(get_scalar!(u64, bytes, order)),
        ColumnType::Float32 => Value::Float32(get_scalar!(f32, bytes, order)),
        ColumnType::Float64 => Value::Float64(get_scalar!(f64, bytes, order)),
        ColumnType::Bytes(_) => {
            let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
            Value::Bytes(bytes[..end].to_vec())
        }
    }
}

/// Encode a whole cell. Array cells take nested `List`s matching the shape, or a
/// scalar that is broadcast to every element.
pub(crate) fn encode_cell(
    field: &FieldLayout,
    order: ByteOrder,
    out: &mut [u8],
    value: &Value,
) -> RtabResult<()> {
    encode_shaped(field.dtype, &field.shape, order, out, value)
}

fn encode_shaped(
    dtype: ColumnType,
    shape: &[usize],
    order: ByteOrder,
    out: &mut [u8],
    value: &Value,
) -> RtabResult<()> {
    let Some((&outer, inner)) = shape.split_first() else {
        return encode_element(dtype, order, out, value);
    };
    let stride = dtype.itemsize() * inner.iter().product::<usize>();
    match value {
        Value::List(items) | Value::Tuple(items) => {
            if items.len() != outer {
                return Err(RtabError::SchemaMismatch(format!(
                    "expected {outer} elements, got {}",
                    items.len()
                )));
            }
            for (chunk, item) in out.chunks_exact_mut(stride).zip(items) {
                encode_shaped(dtype, inner, order, chunk, item)?;
            }
        }
        scalar => {
            for chunk in out.chunks_exact_mut(stride) {
                encode_shaped(dtype, inner, order, chunk, scalar)?;
            }
        }
    }
    Ok(())
}

/// Decode a whole cell; array cells come back as nested `List`s.
pub(crate) fn decode_cell(field: &FieldLayout, order: ByteOrder, bytes: &[u8]) -> Value {
    decode_shaped(field.dtype, &field.shape, order, bytes)
}

pub(crate) fn decode_shaped(
    dtype: ColumnType,
    shape: &[usize],
    order: ByteOrder,
    bytes: &[u8],
) -> Value {
    let Some((_, inner)) = shape.split_first() else {
        return decode_element(dtype, order, bytes);
    };
    let stride = dtype.itemsize() * inner.iter().product::<usize>();
    Value::List(
        bytes
            .chunks_exact(stride)
            .map(|chunk| decode_shaped(dtype, inner, order, chunk))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    fn sample() -> RowFormat {
        RowFormat::new(
            ByteOrder::Little,
            vec![
                ("id".to_string(), ColumnType::Int32, Shape::new()),
                ("name".to_string(), ColumnType::Bytes(8), Shape::new()),
                ("pos".to_string(), ColumnType::Float64, smallvec![3]),
                ("grid".to_string(), ColumnType::UInt16, smallvec![2, 2]),
            ],
        )
    }

    #[test]
    fn packed_offsets() {
        let fmt = sample();
        let offsets: Vec<usize> = fmt.fields().iter().map(|f| f.offset).collect();
        assert_eq!(offsets, vec![0, 4, 12, 36]);
        assert_eq!(fmt.row_size(), 44);
    }

    #[test]
    fn descriptor_round_trip() {
        let fmt = sample();
        assert_eq!(fmt.descriptor(), "<i4,a8,3f8,(2,2)u2");
        let back = RowFormat::from_descriptor(&fmt.descriptor(), &fmt.names()).unwrap();
        assert_eq!(back, fmt);
    }

    #[test]
    fn byte_order_is_stripped_before_fields() {
        let (order, body) = strip_byte_order(">i8,b1").unwrap();
        assert_eq!(order, ByteOrder::Big);
        assert_eq!(body, "i8,b1");
        assert!(strip_byte_order("i8").is_err());
    }

    #[test]
    fn malformed_descriptors_are_rejected() {
        assert!(parse_descriptor("<i3").is_err());
        assert!(parse_descriptor("<(2,2u2").is_err());
        assert!(parse_descriptor("<q8").is_err());
        assert!(RowFormat::from_descriptor("<i4,i4", &["a".to_string()]).is_err());
    }

    #[test]
    fn encode_decode_row() {
        let fmt = sample();
        let mut row = vec![0u8; fmt.row_size()];
        let values = vec![
            Value::Int32(-7),
            Value::from("alpha"),
            Value::from(vec![1.0f64, 2.5, -3.0]),
            Value::List(vec![
                Value::from(vec![1u16, 2]),
                Value::from(vec![3u16, 4]),
            ]),
        ];
        fmt.encode_row(&mut row, &values).unwrap();
        assert_eq!(fmt.decode_row(&row), values);
    }

    #[test]
    fn big_endian_layout() {
        let fmt = RowFormat::new(
            ByteOrder::Big,
            vec![("x".to_string(), ColumnType::UInt32, Shape::new())],
        );
        let mut row = vec![0u8; 4];
        fmt.encode_row(&mut row, &[Value::UInt32(0x01020304)]).unwrap();
        assert_eq!(row, vec![1, 2, 3, 4]);
    }

    #[test]
    fn scalar_broadcasts_into_array_cell() {
        let fmt = sample();
        let field = fmt.field("pos").unwrap().clone();
        let mut cell = vec![0u8; field.size];
        encode_cell(&field, ByteOrder::Little, &mut cell, &Value::Float64(9.0)).unwrap();
        assert_eq!(
            decode_cell(&field, ByteOrder::Little, &cell),
            Value::from(vec![9.0f64, 9.0, 9.0])
        );
    }

    #[test]
    fn wrong_arity_is_mismatch() {
        let fmt = sample();
        let mut row = vec![0u8; fmt.row_size()];
        let err = fmt.encode_row(&mut row, &[Value::Int32(1)]).unwrap_err();
        assert!(matches!(err, RtabError::SchemaMismatch(_)));
    }
}
