//! Generic primitive values.
//!
//! A primitive is extension data plus an optional scalar payload. The
//! concrete types in [`crate::types`] are instantiations of [`Primitive`]
//! with a [`PrimitiveKind`] that fixes the payload type, the type name, the
//! hash marker and the pooling policy.

use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::Arc;

use serde::ser::{Error as _, SerializeMap};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::base::{Base, References};
use crate::env::Environment;
use crate::error::{Error, Result};
use crate::extension_data::{json_kind, ExtensionData};
use crate::field::{Entries, FieldMap, FieldName, FieldValue, Key};
use crate::hash::{hash_decimal, hash_long, hash_string, HashInto, HashSink, HasherSink};
use crate::intern::{Interner, WeakInterner};
use crate::json::{DecodeField, PrimitiveExtension, PrimitiveJson, SerializeField};
use crate::mem::{arc_size, str_size};

/// Presence byte written before a payload's hash.
const HASH_KEY_VALUE: u8 = 2;

/// Scalar payload of a primitive.
pub trait Payload: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static {
    /// Name of the expected input, used in mismatch errors.
    const EXPECTED: &'static str;

    fn hash_into(&self, sink: &mut dyn HashSink);

    /// Heap bytes owned outside the primitive itself.
    fn heap_size(&self) -> usize;

    /// Length of the textual form.
    fn text_len(&self) -> usize;

    fn serialize_json<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>;

    fn from_json(value: &Value) -> Option<Self>;

    /// Converts a field value, handing it back on mismatch.
    fn from_field(value: FieldValue) -> std::result::Result<Self, FieldValue>;

    fn to_field(&self) -> FieldValue;

    fn to_xml_value(&self) -> Cow<'_, str>;
}

impl Payload for Arc<str> {
    const EXPECTED: &'static str = "string";

    fn hash_into(&self, sink: &mut dyn HashSink) {
        hash_string(sink, self);
    }

    fn heap_size(&self) -> usize {
        str_size(self)
    }

    fn text_len(&self) -> usize {
        self.chars().count()
    }

    fn serialize_json<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self)
    }

    fn from_json(value: &Value) -> Option<Self> {
        value.as_str().map(Arc::from)
    }

    fn from_field(value: FieldValue) -> std::result::Result<Self, FieldValue> {
        match value {
            FieldValue::String(s) => Ok(s),
            other => Err(other),
        }
    }

    fn to_field(&self) -> FieldValue {
        FieldValue::String(self.clone())
    }

    fn to_xml_value(&self) -> Cow<'_, str> {
        Cow::Borrowed(self)
    }
}

/// Decimal payload, kept as the exact text of its JSON number.
///
/// Equality and hashing work on that text, so `7.5` and `7.50` are
/// different values and neither precision nor exponent notation is lost.
/// [`DecimalValue::to_decimal`] gives the numeric value where it fits a
/// `rust_decimal::Decimal`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DecimalValue(Arc<str>);

impl DecimalValue {
    pub fn new(value: rust_decimal::Decimal) -> Self {
        Self::from(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric value, `None` beyond the range or precision of
    /// `rust_decimal`.
    pub fn to_decimal(&self) -> Option<rust_decimal::Decimal> {
        rust_decimal::Decimal::from_str_exact(&self.0)
            .or_else(|_| rust_decimal::Decimal::from_scientific(&self.0))
            .ok()
    }

    fn from_number(number: &serde_json::Number) -> Self {
        Self(Arc::from(number.to_string()))
    }

    fn to_number(&self) -> serde_json::Result<serde_json::Number> {
        serde_json::Number::from_str(&self.0)
    }
}

impl From<rust_decimal::Decimal> for DecimalValue {
    fn from(value: rust_decimal::Decimal) -> Self {
        Self(Arc::from(value.to_string()))
    }
}

impl From<i64> for DecimalValue {
    fn from(value: i64) -> Self {
        Self(Arc::from(value.to_string()))
    }
}

/// Accepts JSON number syntax.
impl FromStr for DecimalValue {
    type Err = serde_json::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        serde_json::Number::from_str(s).map(|n| Self::from_number(&n))
    }
}

impl fmt::Debug for DecimalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for DecimalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Payload for DecimalValue {
    const EXPECTED: &'static str = "decimal";

    fn hash_into(&self, sink: &mut dyn HashSink) {
        hash_decimal(sink, &self.0);
    }

    fn heap_size(&self) -> usize {
        str_size(&self.0)
    }

    fn text_len(&self) -> usize {
        self.0.len()
    }

    fn serialize_json<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        // a raw JSON number, written back as it was read
        self.to_number().map_err(S::Error::custom)?.serialize(serializer)
    }

    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => Some(Self::from_number(n)),
            _ => None,
        }
    }

    fn from_field(value: FieldValue) -> std::result::Result<Self, FieldValue> {
        match value {
            FieldValue::Decimal(d) => Ok(d),
            FieldValue::Integer(i) => Ok(Self::from(i)),
            other => Err(other),
        }
    }

    fn to_field(&self) -> FieldValue {
        FieldValue::Decimal(self.clone())
    }

    fn to_xml_value(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.0)
    }
}

impl Payload for i64 {
    const EXPECTED: &'static str = "integer";

    fn hash_into(&self, sink: &mut dyn HashSink) {
        hash_long(sink, *self);
    }

    fn heap_size(&self) -> usize {
        0
    }

    fn text_len(&self) -> usize {
        self.to_string().len()
    }

    fn serialize_json<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_i64(*self)
    }

    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    fn from_field(value: FieldValue) -> std::result::Result<Self, FieldValue> {
        match value {
            FieldValue::Integer(i) => Ok(i),
            other => Err(other),
        }
    }

    fn to_field(&self) -> FieldValue {
        FieldValue::Integer(*self)
    }

    fn to_xml_value(&self) -> Cow<'_, str> {
        Cow::Owned(self.to_string())
    }
}

/// Static description of a primitive type.
pub trait PrimitiveKind: Sized + Send + Sync + 'static {
    type Value: Payload;

    const FHIR_TYPE: &'static str;
    const HASH_MARKER: u8;

    /// Whether `assoc` on an undeclared key fails instead of returning an
    /// equal value.
    const REJECTS_UNKNOWN_KEYS: bool;

    /// Pooling policy on the payload. Extension data must be pooled too.
    fn internable(value: Option<&Self::Value>) -> bool;

    fn pool() -> &'static WeakInterner<PrimitiveData<Self>, PrimitiveData<Self>>;
}

/// Contents of a primitive, and its pool key.
pub struct PrimitiveData<K: PrimitiveKind> {
    ext: ExtensionData,
    value: Option<K::Value>,
}

impl<K: PrimitiveKind> Clone for PrimitiveData<K> {
    fn clone(&self) -> Self {
        Self {
            ext: self.ext.clone(),
            value: self.value.clone(),
        }
    }
}

impl<K: PrimitiveKind> PartialEq for PrimitiveData<K> {
    fn eq(&self, other: &Self) -> bool {
        self.ext == other.ext && self.value == other.value
    }
}

impl<K: PrimitiveKind> Eq for PrimitiveData<K> {}

impl<K: PrimitiveKind> Hash for PrimitiveData<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ext.hash(state);
        self.value.hash(state);
    }
}

/// Immutable primitive value of kind `K`.
pub struct Primitive<K: PrimitiveKind>(Arc<PrimitiveData<K>>);

impl<K: PrimitiveKind> Primitive<K> {
    /// A value without extensions.
    pub fn new(value: impl Into<K::Value>) -> Self {
        Self::from_parts(ExtensionData::empty(), Some(value.into()))
    }

    /// The value without payload and extensions.
    pub fn empty() -> Self {
        Self::from_parts(ExtensionData::empty(), None)
    }

    pub fn from_parts(ext: ExtensionData, value: Option<K::Value>) -> Self {
        let data = PrimitiveData { ext, value };
        if data.ext.is_interned() && K::internable(data.value.as_ref()) {
            Primitive(K::pool().intern(&data))
        } else {
            Primitive(Arc::new(data))
        }
    }

    pub fn value(&self) -> Option<&K::Value> {
        self.0.value.as_ref()
    }

    pub fn has_value(&self) -> bool {
        self.0.value.is_some()
    }

    /// Whether the value carries an id or extensions.
    pub fn is_extended(&self) -> bool {
        self.0.ext.is_not_empty()
    }

    pub fn id(&self) -> Option<&str> {
        self.0.ext.id()
    }

    pub fn extension(&self) -> &[crate::types::Extension] {
        self.0.ext.extension()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn with_value(&self, value: Option<K::Value>) -> Self {
        Self::from_parts(self.0.ext.clone(), value)
    }

    pub fn with_extension_data(&self, ext: ExtensionData) -> Self {
        Self::from_parts(ext, self.0.value.clone())
    }

    /// Builds the XML element for this value: its id and a `value`
    /// attribute.
    pub fn to_xml<E: Environment + ?Sized>(&self, env: &E) -> E::Node {
        match &self.0.value {
            Some(value) => {
                let text = value.to_xml_value();
                env.build_element(self.id(), &[("value", text.as_ref())])
            }
            None => env.build_element(self.id(), &[]),
        }
    }

    fn decode(object: &Map<String, Value>, name: &FieldName) -> Result<Option<Self>> {
        let value = object.get(name.normal()).filter(|v| !v.is_null());
        let extended = object.get(name.extended()).filter(|v| !v.is_null());
        if value.is_none() && extended.is_none() {
            return Ok(None);
        }
        Self::decode_parts(name.normal(), value, extended).map(Some)
    }

    fn decode_parts(key: &str, value: Option<&Value>, extended: Option<&Value>) -> Result<Self> {
        let value = value
            .map(|v| {
                K::Value::from_json(v)
                    .ok_or_else(|| Error::mismatch(K::FHIR_TYPE, key, K::Value::EXPECTED, json_kind(v)))
            })
            .transpose()?;
        let ext = match extended {
            None => ExtensionData::empty(),
            Some(Value::Object(members)) => ExtensionData::from_json_object(members, K::FHIR_TYPE)?,
            Some(other) => {
                return Err(Error::mismatch(K::FHIR_TYPE, format!("_{key}"), "object", json_kind(other)))
            }
        };
        Ok(Self::from_parts(ext, value))
    }
}

impl<K: PrimitiveKind<Value = Arc<str>>> Primitive<K> {
    pub fn as_str(&self) -> Option<&str> {
        self.0.value.as_deref()
    }
}

impl<K: PrimitiveKind<Value = DecimalValue>> Primitive<K> {
    pub fn decimal(&self) -> Option<rust_decimal::Decimal> {
        self.0.value.as_ref().and_then(DecimalValue::to_decimal)
    }
}

impl<K: PrimitiveKind> Clone for Primitive<K> {
    fn clone(&self) -> Self {
        Primitive(Arc::clone(&self.0))
    }
}

impl<K: PrimitiveKind> PartialEq for Primitive<K> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || *self.0 == *other.0
    }
}

impl<K: PrimitiveKind> Eq for Primitive<K> {}

impl<K: PrimitiveKind> Hash for Primitive<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hash_into(&mut HasherSink(state));
    }
}

impl<K: PrimitiveKind> fmt::Debug for Primitive<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct(K::FHIR_TYPE);
        if let Some(id) = self.id() {
            s.field("id", &id);
        }
        if !self.extension().is_empty() {
            s.field("extension", &self.extension());
        }
        s.field("value", &self.0.value).finish()
    }
}

impl<K: PrimitiveKind> HashInto for Primitive<K> {
    fn hash_into(&self, sink: &mut dyn HashSink) {
        sink.put_byte(K::HASH_MARKER);
        self.0.ext.hash_into(sink);
        if let Some(value) = &self.0.value {
            sink.put_byte(HASH_KEY_VALUE);
            value.hash_into(sink);
        }
    }
}

impl<K: PrimitiveKind> Base for Primitive<K> {
    fn create(map: &FieldMap) -> Result<Self> {
        let ext = ExtensionData::from_map(map, K::FHIR_TYPE)?;
        let value = map
            .get(&Key::Value)
            .cloned()
            .map(expect_payload::<K>)
            .transpose()?;
        Ok(Self::from_parts(ext, value))
    }

    fn fhir_type(&self) -> &str {
        K::FHIR_TYPE
    }

    fn extension_data(&self) -> &ExtensionData {
        &self.0.ext
    }

    fn get(&self, key: Key) -> Option<FieldValue> {
        match key {
            Key::FhirType => Some(FieldValue::Type(K::FHIR_TYPE)),
            Key::Value => self.0.value.as_ref().map(Payload::to_field),
            _ => self.0.ext.get(key),
        }
    }

    fn assoc(&self, key: Key, value: Option<FieldValue>) -> Result<Self> {
        if key == Key::Value {
            return Ok(self.with_value(value.map(expect_payload::<K>).transpose()?));
        }
        match self.0.ext.assoc(K::FHIR_TYPE, key, value)? {
            Some(ext) => Ok(self.with_extension_data(ext)),
            None if K::REJECTS_UNKNOWN_KEYS => Err(Error::unsupported(K::FHIR_TYPE, key)),
            None => Ok(self.clone()),
        }
    }

    fn entries(&self) -> Entries {
        let mut entries = Entries::new();
        self.0.ext.append_entries(&mut entries);
        if let Some(value) = &self.0.value {
            entries.push((Key::Value, value.to_field()));
        }
        entries
    }

    fn is_interned(&self) -> bool {
        self.0.ext.is_interned() && K::internable(self.0.value.as_ref())
    }

    fn references(&self) -> References {
        self.0.ext.primitive_references()
    }

    fn mem_size<E: Environment + ?Sized>(&self, env: &E) -> usize {
        if self.is_interned() {
            return 0;
        }
        arc_size::<PrimitiveData<K>>()
            + self.0.ext.mem_size(env)
            + self.0.value.as_ref().map_or(0, Payload::heap_size)
    }
}

fn expect_payload<K: PrimitiveKind>(value: FieldValue) -> Result<K::Value> {
    K::Value::from_field(value)
        .map_err(|other| Error::mismatch(K::FHIR_TYPE, "value", K::Value::EXPECTED, other.kind()))
}

/// Serializes the bare payload, `null` when absent.
impl<K: PrimitiveKind> Serialize for Primitive<K> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match &self.0.value {
            Some(value) => value.serialize_json(serializer),
            None => serializer.serialize_none(),
        }
    }
}

impl<K: PrimitiveKind> PrimitiveJson for Primitive<K> {
    fn has_value(&self) -> bool {
        Primitive::has_value(self)
    }

    fn is_extended(&self) -> bool {
        Primitive::is_extended(self)
    }

    fn serialize_extension<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        PrimitiveExtension(&self.0.ext).serialize(serializer)
    }
}

impl<K: PrimitiveKind> SerializeField for Primitive<K> {
    fn serialize_field<M: SerializeMap>(&self, map: &mut M, name: &FieldName) -> std::result::Result<(), M::Error> {
        crate::json::serialize_primitive(map, name, self)
    }

    fn serialize_list_field<M: SerializeMap>(
        values: &[Self],
        map: &mut M,
        name: &FieldName,
    ) -> std::result::Result<(), M::Error> {
        crate::json::serialize_primitive_list(map, name, values)
    }
}

impl<K: PrimitiveKind> DecodeField for Primitive<K> {
    fn decode_field(object: &Map<String, Value>, name: &FieldName) -> Result<Option<Self>> {
        Self::decode(object, name)
    }

    fn decode_list(object: &Map<String, Value>, name: &FieldName) -> Result<Vec<Self>> {
        let values = list_member(object, name.normal(), K::FHIR_TYPE)?;
        let extended = list_member(object, name.extended(), K::FHIR_TYPE)?;
        let len = values.len().max(extended.len());
        (0..len)
            .map(|i| {
                let value = values.get(i).filter(|v| !v.is_null());
                let ext = extended.get(i).filter(|v| !v.is_null());
                Self::decode_parts(name.normal(), value, ext)
            })
            .collect()
    }
}

fn list_member<'a>(object: &'a Map<String, Value>, key: &str, fhir_type: &'static str) -> Result<&'a [Value]> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(&[]),
        Some(Value::Array(items)) => Ok(items),
        Some(other) => Err(Error::mismatch(fhir_type, key, "array", json_kind(other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::BasicEnvironment;
    use crate::types::{Code, Decimal, Integer64, Markdown};

    #[test]
    fn test_decimal_scale_is_significant() {
        let a: DecimalValue = "7.5".parse().unwrap();
        let b: DecimalValue = "7.50".parse().unwrap();
        assert_ne!(a, b);
        assert_eq!(a, "7.5".parse().unwrap());
    }

    #[test]
    fn test_decimal_reads_json_text() {
        let v: Value = serde_json::from_str("7.50").unwrap();
        let d = DecimalValue::from_json(&v).unwrap();
        assert_eq!(d.to_string(), "7.50");
    }

    #[test]
    fn test_decimal_keeps_exact_text() {
        for text in ["0.12345678901234567890123456789012345", "1e32", "1.5e2"] {
            let v: Value = serde_json::from_str(text).unwrap();
            let d = DecimalValue::from_json(&v).unwrap();
            assert_eq!(d.as_str(), text);
        }
        let wide: DecimalValue = "1e32".parse().unwrap();
        assert_eq!(wide.to_decimal(), None);
        let short: DecimalValue = "1.5e2".parse().unwrap();
        assert_eq!(short.to_decimal(), Some(rust_decimal::Decimal::from(150)));
    }

    #[test]
    fn test_decimal_rejects_non_numbers() {
        assert!("seven".parse::<DecimalValue>().is_err());
        assert!("NaN".parse::<DecimalValue>().is_err());
    }

    #[test]
    fn test_integer64_reads_string_form() {
        assert_eq!(i64::from_json(&Value::from("9007199254740993")), Some(9007199254740993));
        assert_eq!(i64::from_json(&Value::from(true)), None);
    }

    #[test]
    fn test_code_hash_stream() {
        let code = Code::new("kg");
        let mut sink = Vec::new();
        code.hash_into(&mut sink);
        assert_eq!(sink, vec![13, 2, 1, b'k', b'g']);
    }

    #[test]
    fn test_absent_value_writes_no_presence_byte() {
        let mut sink = Vec::new();
        Code::empty().hash_into(&mut sink);
        assert_eq!(sink, vec![13]);
    }

    #[test]
    fn test_value_round_trip_through_assoc() {
        let code = Code::empty()
            .assoc(Key::Value, Some(FieldValue::from("mg")))
            .unwrap();
        assert_eq!(code.as_str(), Some("mg"));
        assert_eq!(code.get(Key::Value), Some(FieldValue::from("mg")));
        let cleared = code.assoc(Key::Value, None).unwrap();
        assert!(cleared.ptr_eq(&Code::empty()));
    }

    #[test]
    fn test_payload_mismatch() {
        let err = Integer64::empty()
            .assoc(Key::Value, Some(FieldValue::from("1")))
            .unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { fhir_type: "integer64", .. }));
    }

    #[test]
    fn test_xml_hook() {
        let node = Decimal::new(DecimalValue::from(3i64)).to_xml(&BasicEnvironment);
        assert_eq!(node.attribute("value"), Some("3"));
        assert_eq!(node.id, None);
    }

    #[test]
    fn test_interned_values_are_free() {
        assert_eq!(Code::new("kg").mem_size(&BasicEnvironment), 0);
        assert!(Markdown::new("# Title").mem_size(&BasicEnvironment) > 0);
    }
}
