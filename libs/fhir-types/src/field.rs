//! Field keys, field values and JSON field names.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use phf::phf_map;

use crate::base::Base;
use crate::intern::{Interner, StrongInterner};
use crate::primitive::DecimalValue;
use crate::types::{Element, Extension};

/// Opaque metadata attached to a value. Not part of equality or hashing.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Symbolic field key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    /// The value's FHIR type name. Read-only.
    FhirType,
    Id,
    Extension,
    Meta,
    Value,
    Url,
    Comparator,
    Unit,
    System,
    Code,
    Reference,
    Type,
    Display,
}

static KEYS: phf::Map<&'static str, Key> = phf_map! {
    "fhir/type" => Key::FhirType,
    "id" => Key::Id,
    "extension" => Key::Extension,
    "meta" => Key::Meta,
    "value" => Key::Value,
    "url" => Key::Url,
    "comparator" => Key::Comparator,
    "unit" => Key::Unit,
    "system" => Key::System,
    "code" => Key::Code,
    "reference" => Key::Reference,
    "type" => Key::Type,
    "display" => Key::Display,
};

impl Key {
    pub fn name(self) -> &'static str {
        match self {
            Key::FhirType => "fhir/type",
            Key::Id => "id",
            Key::Extension => "extension",
            Key::Meta => "meta",
            Key::Value => "value",
            Key::Url => "url",
            Key::Comparator => "comparator",
            Key::Unit => "unit",
            Key::System => "system",
            Key::Code => "code",
            Key::Reference => "reference",
            Key::Type => "type",
            Key::Display => "display",
        }
    }

    pub fn from_name(name: &str) -> Option<Key> {
        KEYS.get(name).copied()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Value stored under a [`Key`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// FHIR type name, answered for [`Key::FhirType`].
    Type(&'static str),
    String(Arc<str>),
    Decimal(DecimalValue),
    Integer(i64),
    Element(Element),
    Extensions(Arc<[Extension]>),
    Meta(Arc<Metadata>),
    Json(serde_json::Value),
}

impl FieldValue {
    /// Short name of the variant, used in mismatch errors. Elements answer
    /// with their type name.
    pub fn kind(&self) -> &str {
        match self {
            FieldValue::Type(_) => "type name",
            FieldValue::String(_) => "string",
            FieldValue::Decimal(_) => "decimal",
            FieldValue::Integer(_) => "integer",
            FieldValue::Element(e) => e.fhir_type(),
            FieldValue::Extensions(_) => "extension list",
            FieldValue::Meta(_) => "metadata",
            FieldValue::Json(_) => "json",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            FieldValue::Type(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            FieldValue::Element(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_extensions(&self) -> Option<&[Extension]> {
        match self {
            FieldValue::Extensions(e) => Some(e),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(Arc::from(value))
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(Arc::from(value))
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<DecimalValue> for FieldValue {
    fn from(value: DecimalValue) -> Self {
        FieldValue::Decimal(value)
    }
}

impl From<Element> for FieldValue {
    fn from(value: Element) -> Self {
        FieldValue::Element(value)
    }
}

impl From<Vec<Extension>> for FieldValue {
    fn from(value: Vec<Extension>) -> Self {
        FieldValue::Extensions(Arc::from(value))
    }
}

impl From<Metadata> for FieldValue {
    fn from(value: Metadata) -> Self {
        FieldValue::Meta(Arc::new(value))
    }
}

impl From<serde_json::Value> for FieldValue {
    fn from(value: serde_json::Value) -> Self {
        FieldValue::Json(value)
    }
}

/// Generic keyed input for `create`.
pub type FieldMap = BTreeMap<Key, FieldValue>;

/// Field entries in declaration order.
pub type Entries = Vec<(Key, FieldValue)>;

/// Pair of JSON member names for a field: `name` and `_name`.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct FieldName {
    normal: Box<str>,
    extended: Box<str>,
}

static FIELD_NAMES: Lazy<StrongInterner<String, FieldName>> =
    Lazy::new(|| StrongInterner::new(|name| FieldName::new(name)));

impl FieldName {
    fn new(name: &str) -> Self {
        Self {
            normal: name.into(),
            extended: format!("_{name}").into(),
        }
    }

    /// Interned pair for `name`.
    pub fn of(name: &str) -> Arc<FieldName> {
        FIELD_NAMES.intern(name)
    }

    pub fn normal(&self) -> &str {
        &self.normal
    }

    pub fn extended(&self) -> &str {
        &self.extended
    }
}

/// Field name interned once per call site.
macro_rules! field_name {
    ($name:literal) => {{
        static NAME: ::once_cell::sync::Lazy<::std::sync::Arc<$crate::field::FieldName>> =
            ::once_cell::sync::Lazy::new(|| $crate::field::FieldName::of($name));
        &**NAME
    }};
}

pub(crate) use field_name;
