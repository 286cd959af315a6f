//! JSON codec.
//!
//! Primitives use two members per field. `name` holds the bare value and
//! `_name` holds an object with `id` and `extension`:
//!
//! ```json
//! { "code": "kg", "_code": { "extension": [ ... ] } }
//! ```
//!
//! Either member is written only when there is something to write. For
//! repeated primitives both members are arrays of the same length as the
//! field, padded with `null` where an element lacks the part. Complex values
//! are plain JSON objects under `name`.

use std::io;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::extension_data::{json_kind, ExtensionData};
use crate::field::FieldName;

/// A value that can be written as a field of an enclosing object.
pub trait SerializeField {
    fn serialize_field<M: SerializeMap>(&self, map: &mut M, name: &FieldName) -> std::result::Result<(), M::Error>;

    fn serialize_list_field<M: SerializeMap>(
        values: &[Self],
        map: &mut M,
        name: &FieldName,
    ) -> std::result::Result<(), M::Error>
    where
        Self: Sized + Serialize,
    {
        serialize_complex_list(map, name, values)
    }
}

/// The two halves of a primitive's dual representation. `Serialize`
/// writes the bare value, or `null` when absent.
pub trait PrimitiveJson: Serialize {
    fn has_value(&self) -> bool;

    fn is_extended(&self) -> bool;

    /// Writes the `_name` part, or `null` when not extended.
    fn serialize_extension<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>;
}

/// The `_name` object of a primitive: `{"id": ..., "extension": [...]}`, or
/// `null` for empty extension data.
pub struct PrimitiveExtension<'a>(pub &'a ExtensionData);

impl Serialize for PrimitiveExtension<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if self.0.is_empty() {
            return serializer.serialize_none();
        }
        let mut map = serializer.serialize_map(None)?;
        self.0.serialize_entries(&mut map)?;
        map.end()
    }
}

struct ExtensionPart<'a, T>(&'a T);

impl<T: PrimitiveJson> Serialize for ExtensionPart<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize_extension(serializer)
    }
}

pub fn serialize_primitive<M: SerializeMap, T: PrimitiveJson>(
    map: &mut M,
    name: &FieldName,
    value: &T,
) -> std::result::Result<(), M::Error> {
    if value.has_value() {
        map.serialize_entry(name.normal(), value)?;
    }
    if value.is_extended() {
        map.serialize_entry(name.extended(), &ExtensionPart(value))?;
    }
    Ok(())
}

pub fn serialize_primitive_list<M: SerializeMap, T: PrimitiveJson>(
    map: &mut M,
    name: &FieldName,
    values: &[T],
) -> std::result::Result<(), M::Error> {
    if values.iter().any(PrimitiveJson::has_value) {
        map.serialize_entry(name.normal(), values)?;
    }
    if values.iter().any(PrimitiveJson::is_extended) {
        let parts: Vec<ExtensionPart<'_, T>> = values.iter().map(ExtensionPart).collect();
        map.serialize_entry(name.extended(), &parts)?;
    }
    Ok(())
}

pub fn serialize_complex<M: SerializeMap, T: Serialize>(
    map: &mut M,
    name: &FieldName,
    value: &T,
) -> std::result::Result<(), M::Error> {
    map.serialize_entry(name.normal(), value)
}

pub fn serialize_complex_list<M: SerializeMap, T: Serialize>(
    map: &mut M,
    name: &FieldName,
    values: &[T],
) -> std::result::Result<(), M::Error> {
    if values.is_empty() {
        return Ok(());
    }
    map.serialize_entry(name.normal(), values)
}

/// A single field wrapped into its own JSON object.
///
/// ```
/// use ferrum_types::json::{self, Property};
/// use ferrum_types::Code;
///
/// let json = json::to_string(&Property::new("status", &Code::new("final"))).unwrap();
/// assert_eq!(json, r#"{"status":"final"}"#);
/// ```
pub struct Property<'a, T> {
    name: std::sync::Arc<FieldName>,
    value: &'a T,
}

impl<'a, T: SerializeField> Property<'a, T> {
    pub fn new(name: &str, value: &'a T) -> Self {
        Self {
            name: FieldName::of(name),
            value,
        }
    }
}

impl<T: SerializeField> Serialize for Property<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        self.value.serialize_field(&mut map, &self.name)?;
        map.end()
    }
}

/// A repeated field wrapped into its own JSON object.
pub struct PropertyList<'a, T> {
    name: std::sync::Arc<FieldName>,
    values: &'a [T],
}

impl<'a, T: SerializeField + Serialize> PropertyList<'a, T> {
    pub fn new(name: &str, values: &'a [T]) -> Self {
        Self {
            name: FieldName::of(name),
            values,
        }
    }
}

impl<T: SerializeField + Serialize> Serialize for PropertyList<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        T::serialize_list_field(self.values, &mut map, &self.name)?;
        map.end()
    }
}

/// A value that can be read back from a field of a JSON object.
pub trait DecodeField: Sized {
    /// Reads the field `name`, `None` when neither part is present.
    fn decode_field(object: &Map<String, Value>, name: &FieldName) -> Result<Option<Self>>;

    /// Reads a repeated field. Missing members read as empty.
    fn decode_list(object: &Map<String, Value>, name: &FieldName) -> Result<Vec<Self>>;
}

/// A complex type read from a JSON object.
pub trait ComplexType: Sized {
    const FHIR_TYPE: &'static str;

    fn from_json_object(object: &Map<String, Value>) -> Result<Self>;

    fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::Object(object) => Self::from_json_object(object),
            other => Err(Error::mismatch(Self::FHIR_TYPE, "", "object", json_kind(other))),
        }
    }

    fn from_json_str(s: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(s)?;
        Self::from_json(&value)
    }
}

pub(crate) fn decode_complex<T: ComplexType>(object: &Map<String, Value>, name: &FieldName) -> Result<Option<T>> {
    match object.get(name.normal()) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(members)) => T::from_json_object(members).map(Some),
        Some(other) => Err(Error::mismatch(T::FHIR_TYPE, name.normal(), "object", json_kind(other))),
    }
}

pub(crate) fn decode_complex_list<T: ComplexType>(object: &Map<String, Value>, name: &FieldName) -> Result<Vec<T>> {
    match object.get(name.normal()) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items.iter().map(T::from_json).collect(),
        Some(other) => Err(Error::mismatch(T::FHIR_TYPE, name.normal(), "array", json_kind(other))),
    }
}

/// Implements [`DecodeField`] for a [`ComplexType`].
macro_rules! decode_as_complex {
    ($ty:ty) => {
        impl $crate::json::DecodeField for $ty {
            fn decode_field(
                object: &::serde_json::Map<String, ::serde_json::Value>,
                name: &$crate::field::FieldName,
            ) -> $crate::error::Result<Option<Self>> {
                $crate::json::decode_complex(object, name)
            }

            fn decode_list(
                object: &::serde_json::Map<String, ::serde_json::Value>,
                name: &$crate::field::FieldName,
            ) -> $crate::error::Result<Vec<Self>> {
                $crate::json::decode_complex_list(object, name)
            }
        }
    };
}

pub(crate) use decode_as_complex;

pub fn to_string<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(Error::Sink)
}

/// Streams `value` into `writer`. Write failures surface as
/// [`Error::Sink`].
pub fn to_writer<W: io::Write, T: Serialize + ?Sized>(writer: W, value: &T) -> Result<()> {
    serde_json::to_writer(writer, value).map_err(Error::Sink)
}

pub fn to_value<T: Serialize + ?Sized>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(Error::Sink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Code, Extension};

    struct FailingWriter;

    impl io::Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_empty_primitive_writes_nothing() {
        let json = to_string(&Property::new("code", &Code::empty())).unwrap();
        assert_eq!(json, "{}");
    }

    #[test]
    fn test_extension_only_primitive() {
        let ext = Extension::new("http://a", Some(Code::new("x").into()));
        let code = Code::empty().with_extension_data(ExtensionData::with_extensions(vec![ext]));
        let json = to_string(&Property::new("code", &code)).unwrap();
        assert_eq!(
            json,
            r#"{"_code":{"extension":[{"url":"http://a","valueCode":"x"}]}}"#
        );
    }

    #[test]
    fn test_sink_failure_is_reported() {
        let err = to_writer(FailingWriter, &Property::new("code", &Code::new("kg"))).unwrap_err();
        assert!(matches!(err, Error::Sink(_)));
    }
}
