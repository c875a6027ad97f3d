//! Encoder for the armpack format. Tags are the MessagePack ones but every multi-byte field, lengths
//! included, is little-endian, floats are always written as `f32` and arrays of numbers are written as a
//! single element tag followed by the raw values:
//!
//! ```text
//! [1, 2, 3]        93 d2 01 00 00 00 02 00 00 00 03 00 00 00
//! [0.5, 1.0]       92 ca 00 00 00 3f 00 00 80 3f
//! ```

use byteorder::{LittleEndian, WriteBytesExt};
use std::{fmt, io, io::Write};

#[derive(Debug)]
pub enum PackError {
    /// A value that has no armpack representation, such as an enum variant carrying data.
    UnsupportedValueType(String),
    /// A string, binary, array or map with more than `u32::MAX` entries.
    ValueTooLarge { kind: &'static str, len: usize },
    Io(io::Error),
    Custom(String),
}

impl fmt::Display for PackError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PackError::UnsupportedValueType(what) => write!(f, "unsupported value type: {}", what),
            PackError::ValueTooLarge { kind, len } => write!(f, "{} of length {} is too large", kind, len),
            PackError::Io(e) => write!(f, "{}", e),
            PackError::Custom(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for PackError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PackError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for PackError {
    fn from(e: io::Error) -> Self {
        PackError::Io(e)
    }
}

impl serde::ser::Error for PackError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        PackError::Custom(msg.to_string())
    }
}

/// Fixed-width numeric buffers, written as one tag and a byte copy of their contents.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedArray {
    F32(Vec<f32>),
    I32(Vec<i32>),
    I16(Vec<i16>),
}

impl TypedArray {
    pub fn len(&self) -> usize {
        match self {
            TypedArray::F32(v) => v.len(),
            TypedArray::I32(v) => v.len(),
            TypedArray::I16(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    /// Integers above `i64::MAX`.
    UInt(u64),
    /// Written as `f32`.
    Float(f64),
    Str(String),
    Bin(Vec<u8>),
    Array(Vec<Value>),
    Typed(TypedArray),
    /// Entries are written in this order.
    Map(Vec<(Value, Value)>),
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v.into())
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

impl From<TypedArray> for Value {
    fn from(v: TypedArray) -> Self {
        Value::Typed(v)
    }
}

/// Length prefixes of one kind of container: the fix form, when there is one, and the 8, 16 and 32 bit
/// forms.
struct Header {
    kind: &'static str,
    fix: Option<(u8, usize)>,
    tag8: Option<u8>,
    tag16: u8,
    tag32: u8,
}

const STR: Header = Header {
    kind: "string",
    fix: Some((0xa0, 31)),
    tag8: Some(0xd9),
    tag16: 0xda,
    tag32: 0xdb,
};

const BIN: Header = Header {
    kind: "binary",
    fix: None,
    tag8: Some(0xc4),
    tag16: 0xc5,
    tag32: 0xc6,
};

const ARRAY: Header = Header {
    kind: "array",
    fix: Some((0x90, 15)),
    tag8: None,
    tag16: 0xdc,
    tag32: 0xdd,
};

const MAP: Header = Header {
    kind: "map",
    fix: Some((0x80, 15)),
    tag8: None,
    tag16: 0xde,
    tag32: 0xdf,
};

const F32_TAG: u8 = 0xca;
const I32_TAG: u8 = 0xd2;
const I16_TAG: u8 = 0xd1;

fn write_header<W: Write>(w: &mut W, header: &Header, len: usize) -> Result<(), PackError> {
    match header.fix {
        Some((base, max)) if len <= max => {
            w.write_u8(base | len as u8)?;
            return Ok(());
        }
        _ => {}
    }

    match header.tag8 {
        Some(tag) if len <= u8::MAX as usize => {
            w.write_u8(tag)?;
            w.write_u8(len as u8)?;
        }
        _ if len <= u16::MAX as usize => {
            w.write_u8(header.tag16)?;
            w.write_u16::<LittleEndian>(len as u16)?;
        }
        _ if len <= u32::MAX as usize => {
            w.write_u8(header.tag32)?;
            w.write_u32::<LittleEndian>(len as u32)?;
        }
        _ => {
            return Err(PackError::ValueTooLarge {
                kind: header.kind,
                len,
            })
        }
    }
    Ok(())
}

fn pack_uint<W: Write>(w: &mut W, v: u64) -> Result<(), PackError> {
    if v <= 0x7f {
        w.write_u8(v as u8)?;
    } else if v <= u8::MAX as u64 {
        w.write_u8(0xcc)?;
        w.write_u8(v as u8)?;
    } else if v <= u16::MAX as u64 {
        w.write_u8(0xcd)?;
        w.write_u16::<LittleEndian>(v as u16)?;
    } else if v <= u32::MAX as u64 {
        w.write_u8(0xce)?;
        w.write_u32::<LittleEndian>(v as u32)?;
    } else {
        w.write_u8(0xcf)?;
        w.write_u64::<LittleEndian>(v)?;
    }
    Ok(())
}

fn pack_int<W: Write>(w: &mut W, v: i64) -> Result<(), PackError> {
    if v >= 0 {
        return pack_uint(w, v as u64);
    }

    if v >= -32 {
        w.write_i8(v as i8)?;
    } else if v >= i8::MIN as i64 {
        w.write_u8(0xd0)?;
        w.write_i8(v as i8)?;
    } else if v >= i16::MIN as i64 {
        w.write_u8(0xd1)?;
        w.write_i16::<LittleEndian>(v as i16)?;
    } else if v >= i32::MIN as i64 {
        w.write_u8(0xd2)?;
        w.write_i32::<LittleEndian>(v as i32)?;
    } else {
        w.write_u8(0xd3)?;
        w.write_i64::<LittleEndian>(v)?;
    }
    Ok(())
}

fn as_i32(value: &Value) -> Option<i32> {
    match *value {
        Value::Int(i) if i >= i32::MIN as i64 && i <= i32::MAX as i64 => Some(i as i32),
        Value::UInt(u) if u <= i32::MAX as u64 => Some(u as i32),
        _ => None,
    }
}

/// How the elements of an array are written, decided once before writing.
enum ArrayLayout {
    Floats,
    Ints,
    Elements,
}

fn array_layout(items: &[Value]) -> ArrayLayout {
    if items.is_empty() {
        ArrayLayout::Elements
    } else if items.iter().all(|v| matches!(v, Value::Float(_))) {
        ArrayLayout::Floats
    } else if items.iter().all(|v| as_i32(v).is_some()) {
        ArrayLayout::Ints
    } else {
        ArrayLayout::Elements
    }
}

fn pack_array<W: Write>(w: &mut W, items: &[Value]) -> Result<(), PackError> {
    write_header(w, &ARRAY, items.len())?;

    match array_layout(items) {
        ArrayLayout::Floats => {
            w.write_u8(F32_TAG)?;
            for item in items {
                if let Value::Float(f) = item {
                    w.write_f32::<LittleEndian>(*f as f32)?;
                }
            }
        }
        ArrayLayout::Ints => {
            w.write_u8(I32_TAG)?;
            for i in items.iter().filter_map(as_i32) {
                w.write_i32::<LittleEndian>(i)?;
            }
        }
        ArrayLayout::Elements => {
            for item in items {
                pack(item, w)?;
            }
        }
    }
    Ok(())
}

fn pack_typed<W: Write>(w: &mut W, array: &TypedArray) -> Result<(), PackError> {
    write_header(w, &ARRAY, array.len())?;
    if array.is_empty() {
        return Ok(());
    }

    match array {
        TypedArray::F32(values) => {
            w.write_u8(F32_TAG)?;
            for &v in values {
                w.write_f32::<LittleEndian>(v)?;
            }
        }
        TypedArray::I32(values) => {
            w.write_u8(I32_TAG)?;
            for &v in values {
                w.write_i32::<LittleEndian>(v)?;
            }
        }
        TypedArray::I16(values) => {
            w.write_u8(I16_TAG)?;
            for &v in values {
                w.write_i16::<LittleEndian>(v)?;
            }
        }
    }
    Ok(())
}

/// Writes `value` to `w`. On error `w` may already hold part of the encoding; use `packb` to get all or
/// nothing.
pub fn pack<W: Write>(value: &Value, w: &mut W) -> Result<(), PackError> {
    match value {
        Value::Nil => w.write_u8(0xc0)?,
        Value::Bool(b) => w.write_u8(if *b { 0xc3 } else { 0xc2 })?,
        Value::Int(i) => pack_int(w, *i)?,
        Value::UInt(u) => pack_uint(w, *u)?,
        Value::Float(f) => {
            w.write_u8(F32_TAG)?;
            w.write_f32::<LittleEndian>(*f as f32)?;
        }
        Value::Str(s) => {
            write_header(w, &STR, s.len())?;
            w.write_all(s.as_bytes())?;
        }
        Value::Bin(bytes) => {
            write_header(w, &BIN, bytes.len())?;
            w.write_all(bytes)?;
        }
        Value::Array(items) => pack_array(w, items)?,
        Value::Typed(array) => pack_typed(w, array)?,
        Value::Map(entries) => {
            write_header(w, &MAP, entries.len())?;
            for (k, v) in entries {
                pack(k, w)?;
                pack(v, w)?;
            }
        }
    }
    Ok(())
}

/// Encodes `value` into a new buffer.
pub fn packb(value: &Value) -> Result<Vec<u8>, PackError> {
    let mut buffer = Vec::new();
    pack(value, &mut buffer)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(value: impl Into<Value>) -> Vec<u8> {
        packb(&value.into()).unwrap()
    }

    #[test]
    fn scalars() {
        assert_eq!(packb(&Value::Nil).unwrap(), vec![0xc0]);
        assert_eq!(bytes(true), vec![0xc3]);
        assert_eq!(bytes(false), vec![0xc2]);
        assert_eq!(bytes(5), vec![0x05]);
        assert_eq!(bytes(-1), vec![0xff]);
        assert_eq!(bytes(-32), vec![0xe0]);
        assert_eq!(bytes(-33), vec![0xd0, 0xdf]);
        assert_eq!(bytes(200), vec![0xcc, 200]);
        assert_eq!(bytes(0x1234), vec![0xcd, 0x34, 0x12]);
        assert_eq!(bytes(-300), vec![0xd1, 0xd4, 0xfe]);
        assert_eq!(bytes(0x1234_5678), vec![0xce, 0x78, 0x56, 0x34, 0x12]);
        assert_eq!(bytes(-70_000), vec![0xd2, 0x90, 0xee, 0xfe, 0xff]);
        assert_eq!(
            bytes(0x1_0000_0000i64),
            vec![0xcf, 0, 0, 0, 0, 1, 0, 0, 0]
        );
        assert_eq!(
            packb(&Value::UInt(u64::MAX)).unwrap(),
            vec![0xcf, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]
        );
        assert_eq!(bytes(i64::MIN)[0], 0xd3);
    }

    #[test]
    fn floats_are_single_precision() {
        assert_eq!(bytes(1.0f64), vec![0xca, 0x00, 0x00, 0x80, 0x3f]);
        assert_eq!(bytes(0.1f64).len(), 5);
        assert!(!bytes(std::f64::consts::PI).contains(&0xcb));
    }

    #[test]
    fn strings_and_binaries() {
        assert_eq!(bytes("abc"), vec![0xa3, b'a', b'b', b'c']);

        let long = "x".repeat(40);
        let encoded = bytes(long.as_str());
        assert_eq!(&encoded[..2], &[0xd9, 40]);
        assert_eq!(encoded.len(), 42);

        let longer = "x".repeat(300);
        assert_eq!(&bytes(longer)[..3], &[0xda, 0x2c, 0x01]);

        assert_eq!(packb(&Value::Bin(vec![1, 2])).unwrap(), vec![0xc4, 2, 1, 2]);
    }

    #[test]
    fn int_arrays_are_packed() {
        let encoded = bytes(vec![1, 2, 3, 4, 5]);
        assert_eq!(encoded.len(), 1 + 1 + 5 * 4);
        assert_eq!(&encoded[..2], &[0x95, 0xd2]);
        assert_eq!(&encoded[2..6], &[1, 0, 0, 0]);
        assert_eq!(&encoded[18..], &[5, 0, 0, 0]);
    }

    #[test]
    fn float_arrays_are_packed() {
        let encoded = bytes(vec![0.5f64, 1.0]);
        assert_eq!(encoded, vec![0x92, 0xca, 0, 0, 0, 0x3f, 0, 0, 0x80, 0x3f]);
    }

    #[test]
    fn other_arrays_are_element_wise() {
        assert_eq!(bytes(vec![true, false]), vec![0x92, 0xc3, 0xc2]);
        assert_eq!(packb(&Value::Array(vec![])).unwrap(), vec![0x90]);

        let mixed = Value::Array(vec![Value::Int(1), Value::from("a")]);
        assert_eq!(packb(&mixed).unwrap(), vec![0x92, 0x01, 0xa1, b'a']);

        let wide = Value::Array(vec![Value::Int(1), Value::Int(1 << 40)]);
        assert_eq!(packb(&wide).unwrap()[..2], [0x92, 0x01]);
    }

    #[test]
    fn long_arrays_use_sized_headers() {
        let encoded = bytes(vec![true; 16]);
        assert_eq!(&encoded[..3], &[0xdc, 16, 0]);
        assert_eq!(encoded.len(), 3 + 16);
    }

    #[test]
    fn typed_arrays() {
        let f = packb(&TypedArray::F32(vec![1.0]).into()).unwrap();
        assert_eq!(f, vec![0x91, 0xca, 0, 0, 0x80, 0x3f]);

        let i = packb(&TypedArray::I32(vec![-1, 2]).into()).unwrap();
        assert_eq!(i, vec![0x92, 0xd2, 0xff, 0xff, 0xff, 0xff, 2, 0, 0, 0]);

        let s = packb(&TypedArray::I16(vec![0x102]).into()).unwrap();
        assert_eq!(s, vec![0x91, 0xd1, 2, 1]);

        assert_eq!(packb(&TypedArray::I16(vec![]).into()).unwrap(), vec![0x90]);
    }

    #[test]
    fn maps_keep_their_order() {
        let map = Value::Map(vec![
            (Value::from("b"), Value::Int(1)),
            (Value::from("a"), Value::Nil),
        ]);
        assert_eq!(
            packb(&map).unwrap(),
            vec![0x82, 0xa1, b'b', 0x01, 0xa1, b'a', 0xc0]
        );
    }
}
