//! PDF object types and their serialization

use std::fmt;
use super::{Dictionary, Stream};

/// Identifier of an indirect object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId {
    /// Object number
    pub number: u32,
    /// Generation number
    pub generation: u16,
}

impl ObjectId {
    /// Create new object identifier
    pub const fn new(number: u32, generation: u16) -> Self {
        Self { number, generation }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} R", self.number, self.generation)
    }
}

/// PDF object types
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    /// Null object
    Null,
    /// Boolean value
    Boolean(bool),
    /// Integer value
    Integer(i64),
    /// Real value
    Real(f64),
    /// String value (literal or hexadecimal)
    String(Vec<u8>),
    /// Name object
    Name(String),
    /// Array object
    Array(Vec<Object>),
    /// Dictionary object
    Dictionary(Dictionary),
    /// Stream object
    Stream(Stream),
    /// Indirect reference
    Reference(ObjectId),
}

impl Object {
    /// Create a name object
    pub fn name(name: impl Into<String>) -> Self {
        Object::Name(name.into())
    }

    /// Create a string object from bytes or text
    pub fn string(value: impl AsRef<[u8]>) -> Self {
        Object::String(value.as_ref().to_vec())
    }

    /// Create a `[x0 y0 x1 y1]` rectangle array
    pub fn rectangle(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Object::Array(vec![
            Object::from(x0),
            Object::from(y0),
            Object::from(x1),
            Object::from(y1),
        ])
    }

    /// Name of the variant, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Null => "null",
            Object::Boolean(_) => "boolean",
            Object::Integer(_) => "integer",
            Object::Real(_) => "real",
            Object::String(_) => "string",
            Object::Name(_) => "name",
            Object::Array(_) => "array",
            Object::Dictionary(_) => "dictionary",
            Object::Stream(_) => "stream",
            Object::Reference(_) => "reference",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Object::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Object::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer value; reals with no fractional part are accepted too
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Object::Integer(i) => Some(*i),
            Object::Real(r) if r.fract() == 0.0 => Some(*r as i64),
            _ => None,
        }
    }

    /// Numeric value of an integer or real
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Object::Integer(i) => Some(*i as f64),
            Object::Real(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            Object::Name(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&[u8]> {
        match self {
            Object::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Object>> {
        match self {
            Object::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut Vec<Object>> {
        match self {
            Object::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Dictionary of a dictionary or stream object
    pub fn as_dict(&self) -> Option<&Dictionary> {
        match self {
            Object::Dictionary(d) => Some(d),
            Object::Stream(s) => Some(&s.dict),
            _ => None,
        }
    }

    pub fn as_dict_mut(&mut self) -> Option<&mut Dictionary> {
        match self {
            Object::Dictionary(d) => Some(d),
            Object::Stream(s) => Some(&mut s.dict),
            _ => None,
        }
    }

    pub fn as_stream(&self) -> Option<&Stream> {
        match self {
            Object::Stream(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_stream_mut(&mut self) -> Option<&mut Stream> {
        match self {
            Object::Stream(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<ObjectId> {
        match self {
            Object::Reference(id) => Some(*id),
            _ => None,
        }
    }

    /// Visit every reference contained in this object, depth first
    pub fn for_each_reference(&self, visit: &mut impl FnMut(ObjectId)) {
        match self {
            Object::Reference(id) => visit(*id),
            Object::Array(items) => {
                for item in items {
                    item.for_each_reference(visit);
                }
            }
            Object::Dictionary(dict) => dict.for_each_reference(visit),
            Object::Stream(stream) => stream.dict.for_each_reference(visit),
            _ => {}
        }
    }

    /// Replace every reference with the object returned by `map`
    pub fn remap_references(&mut self, map: &mut impl FnMut(ObjectId) -> Object) {
        match self {
            Object::Reference(id) => *self = map(*id),
            Object::Array(items) => {
                for item in items.iter_mut() {
                    item.remap_references(map);
                }
            }
            Object::Dictionary(dict) => dict.remap_references(map),
            Object::Stream(stream) => stream.dict.remap_references(map),
            _ => {}
        }
    }

    /// Apply `transform` to every string nested in this object
    pub(crate) fn try_for_each_string_mut<E>(
        &mut self,
        transform: &mut impl FnMut(&mut Vec<u8>) -> Result<(), E>,
    ) -> Result<(), E> {
        match self {
            Object::String(bytes) => transform(bytes),
            Object::Array(items) => items
                .iter_mut()
                .try_for_each(|item| item.try_for_each_string_mut(transform)),
            Object::Dictionary(dict) => dict
                .values_mut()
                .try_for_each(|value| value.try_for_each_string_mut(transform)),
            Object::Stream(stream) => stream
                .dict
                .values_mut()
                .try_for_each(|value| value.try_for_each_string_mut(transform)),
            _ => Ok(()),
        }
    }

    /// Write the object body in PDF syntax
    pub fn write_to(&self, output: &mut Vec<u8>) {
        match self {
            Object::Null => output.extend_from_slice(b"null"),
            Object::Boolean(b) => output.extend_from_slice(if *b { b"true" } else { b"false" }),
            Object::Integer(i) => output.extend_from_slice(i.to_string().as_bytes()),
            Object::Real(r) => output.extend_from_slice(format_real(*r).as_bytes()),
            Object::String(s) => write_string(output, s),
            Object::Name(n) => write_name(output, n),
            Object::Array(items) => {
                output.push(b'[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        output.push(b' ');
                    }
                    item.write_to(output);
                }
                output.push(b']');
            }
            Object::Dictionary(dict) => dict.write_to(output),
            Object::Stream(stream) => stream.write_to(output),
            Object::Reference(id) => output.extend_from_slice(id.to_string().as_bytes()),
        }
    }

    /// Serialize to a standalone byte vector
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut output = Vec::new();
        self.write_to(&mut output);
        output
    }
}

impl From<bool> for Object {
    fn from(value: bool) -> Self {
        Object::Boolean(value)
    }
}

impl From<i64> for Object {
    fn from(value: i64) -> Self {
        Object::Integer(value)
    }
}

impl From<i32> for Object {
    fn from(value: i32) -> Self {
        Object::Integer(value as i64)
    }
}

impl From<u32> for Object {
    fn from(value: u32) -> Self {
        Object::Integer(value as i64)
    }
}

impl From<usize> for Object {
    fn from(value: usize) -> Self {
        Object::Integer(value as i64)
    }
}

impl From<f64> for Object {
    /// Integral values become integers so they read back unchanged
    fn from(value: f64) -> Self {
        if value.fract() == 0.0 && value.abs() < 1e15 {
            Object::Integer(value as i64)
        } else {
            Object::Real(value)
        }
    }
}

impl From<ObjectId> for Object {
    fn from(id: ObjectId) -> Self {
        Object::Reference(id)
    }
}

impl From<Dictionary> for Object {
    fn from(dict: Dictionary) -> Self {
        Object::Dictionary(dict)
    }
}

impl From<Stream> for Object {
    fn from(stream: Stream) -> Self {
        Object::Stream(stream)
    }
}

impl From<Vec<Object>> for Object {
    fn from(items: Vec<Object>) -> Self {
        Object::Array(items)
    }
}

/// Format a real without exponent and with at most five decimals
pub(crate) fn format_real(value: f64) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    if value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{}", value as i64);
    }
    let formatted = format!("{:.5}", value);
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    match trimmed {
        "-0" | "" => "0".to_string(),
        other => other.to_string(),
    }
}

/// Literal syntax for printable text, hexadecimal for binary data
fn write_string(output: &mut Vec<u8>, data: &[u8]) {
    let is_printable = data
        .iter()
        .all(|&b| matches!(b, b'\n' | b'\r' | b'\t') || (0x20..=0x7E).contains(&b));

    if !is_printable {
        output.push(b'<');
        output.extend_from_slice(hex::encode_upper(data).as_bytes());
        output.push(b'>');
        return;
    }

    output.push(b'(');
    for &byte in data {
        match byte {
            b'(' => output.extend_from_slice(b"\\("),
            b')' => output.extend_from_slice(b"\\)"),
            b'\\' => output.extend_from_slice(b"\\\\"),
            b'\n' => output.extend_from_slice(b"\\n"),
            b'\r' => output.extend_from_slice(b"\\r"),
            b'\t' => output.extend_from_slice(b"\\t"),
            _ => output.push(byte),
        }
    }
    output.push(b')');
}

/// Names escape delimiters, whitespace and non-printable bytes as `#xx`
fn write_name(output: &mut Vec<u8>, name: &str) {
    output.push(b'/');
    for byte in name.bytes() {
        let regular = (0x21..=0x7E).contains(&byte)
            && !matches!(byte, b'#' | b'/' | b'%' | b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}');
        if regular {
            output.push(byte);
        } else {
            output.extend_from_slice(format!("#{:02X}", byte).as_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serialized(object: &Object) -> String {
        String::from_utf8(object.to_bytes()).unwrap()
    }

    #[test]
    fn test_scalar_serialization() {
        assert_eq!(serialized(&Object::Null), "null");
        assert_eq!(serialized(&Object::Boolean(true)), "true");
        assert_eq!(serialized(&Object::Integer(-42)), "-42");
        assert_eq!(serialized(&Object::Real(595.28)), "595.28");
        assert_eq!(serialized(&Object::Real(12.0)), "12");
        assert_eq!(serialized(&Object::Real(0.1 + 0.2)), "0.3");
        assert_eq!(serialized(&Object::Reference(ObjectId::new(12, 3))), "12 3 R");
    }

    #[test]
    fn test_string_serialization() {
        assert_eq!(serialized(&Object::string("a (b) \\c")), "(a \\(b\\) \\\\c)");
        assert_eq!(serialized(&Object::String(vec![0x00, 0xFF, 0x10])), "<00FF10>");
    }

    #[test]
    fn test_name_serialization() {
        assert_eq!(serialized(&Object::name("Type")), "/Type");
        assert_eq!(serialized(&Object::name("A B#")), "/A#20B#23");
    }

    #[test]
    fn test_array_serialization() {
        let rect = Object::rectangle(0.0, 0.0, 612.0, 792.0);
        assert_eq!(serialized(&rect), "[0 0 612 792]");
    }

    #[test]
    fn test_reference_remapping() {
        let mut dict = Dictionary::new();
        dict.set("Parent", ObjectId::new(1, 0));
        dict.set("Kids", vec![Object::from(ObjectId::new(2, 0)), Object::from(ObjectId::new(9, 0))]);
        let mut object = Object::Dictionary(dict);

        object.remap_references(&mut |id| {
            if id.number == 9 {
                Object::Null
            } else {
                Object::Reference(ObjectId::new(id.number + 100, 0))
            }
        });

        let mut seen = Vec::new();
        object.for_each_reference(&mut |id| seen.push(id.number));
        assert_eq!(seen, vec![101, 102]);
    }
}
