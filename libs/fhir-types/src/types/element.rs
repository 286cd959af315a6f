//! The closed set of value types plus [`External`] for everything else.

use std::sync::Arc;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::base::{Base, References};
use crate::env::Environment;
use crate::error::{Error, Result};
use crate::extension_data::ExtensionData;
use crate::field::{Entries, FieldMap, FieldName, FieldValue, Key};
use crate::hash::{HashInto, HashSink};
use crate::json::{DecodeField, PrimitiveJson, SerializeField};
use crate::types::extension::Extension;
use crate::types::external::External;
use crate::types::primitives::{Code, Decimal, FhirString, Id, Integer64, Markdown, Oid, Uri, Xhtml};
use crate::types::quantity::{Age, Count, Distance, Duration, Quantity};
use crate::types::reference::Reference;

/// Any value, tagged with its type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Element {
    Integer64(Integer64),
    Decimal(Decimal),
    String(FhirString),
    Uri(Uri),
    Code(Code),
    Id(Id),
    Oid(Oid),
    Markdown(Markdown),
    Xhtml(Xhtml),
    Quantity(Quantity),
    Age(Age),
    Count(Count),
    Distance(Distance),
    Duration(Duration),
    Extension(Extension),
    Reference(Reference),
    External(External),
}

macro_rules! each_variant {
    ($element:expr, $v:ident => $body:expr) => {
        match $element {
            Element::Integer64($v) => $body,
            Element::Decimal($v) => $body,
            Element::String($v) => $body,
            Element::Uri($v) => $body,
            Element::Code($v) => $body,
            Element::Id($v) => $body,
            Element::Oid($v) => $body,
            Element::Markdown($v) => $body,
            Element::Xhtml($v) => $body,
            Element::Quantity($v) => $body,
            Element::Age($v) => $body,
            Element::Count($v) => $body,
            Element::Distance($v) => $body,
            Element::Duration($v) => $body,
            Element::Extension($v) => $body,
            Element::Reference($v) => $body,
            Element::External($v) => $body,
        }
    };
}

/// Like `each_variant!`, rewrapping a `Result` of the same variant.
macro_rules! map_variant {
    ($element:expr, $v:ident => $body:expr) => {
        match $element {
            Element::Integer64($v) => $body.map(Element::Integer64),
            Element::Decimal($v) => $body.map(Element::Decimal),
            Element::String($v) => $body.map(Element::String),
            Element::Uri($v) => $body.map(Element::Uri),
            Element::Code($v) => $body.map(Element::Code),
            Element::Id($v) => $body.map(Element::Id),
            Element::Oid($v) => $body.map(Element::Oid),
            Element::Markdown($v) => $body.map(Element::Markdown),
            Element::Xhtml($v) => $body.map(Element::Xhtml),
            Element::Quantity($v) => $body.map(Element::Quantity),
            Element::Age($v) => $body.map(Element::Age),
            Element::Count($v) => $body.map(Element::Count),
            Element::Distance($v) => $body.map(Element::Distance),
            Element::Duration($v) => $body.map(Element::Duration),
            Element::Extension($v) => $body.map(Element::Extension),
            Element::Reference($v) => $body.map(Element::Reference),
            Element::External($v) => $body.map(Element::External),
        }
    };
}

impl Element {
    /// The type name, including that of an external value.
    pub fn type_name(&self) -> &str {
        Base::fhir_type(self)
    }

    pub fn is_primitive(&self) -> bool {
        match self {
            Element::Integer64(_)
            | Element::Decimal(_)
            | Element::String(_)
            | Element::Uri(_)
            | Element::Code(_)
            | Element::Id(_)
            | Element::Oid(_)
            | Element::Markdown(_)
            | Element::Xhtml(_) => true,
            Element::External(v) => v.is_primitive(),
            _ => false,
        }
    }

    /// JSON member name of this value inside an extension, like `valueCode`.
    pub fn extension_value_field_name(&self) -> Arc<FieldName> {
        let mut chars = self.type_name().chars();
        match chars.next() {
            Some(first) => FieldName::of(&format!("value{}{}", first.to_ascii_uppercase(), chars.as_str())),
            None => FieldName::of("value"),
        }
    }

    /// Reads the `value[x]` member of an extension object. Unknown type
    /// suffixes become [`External`] values.
    pub fn decode_extension_value(object: &Map<String, Value>) -> Result<Option<Element>> {
        let suffix = object.keys().find_map(|key| {
            let key = key.strip_prefix('_').unwrap_or(key);
            key.strip_prefix("value").filter(|suffix| !suffix.is_empty())
        });
        let Some(suffix) = suffix else {
            return Ok(None);
        };
        let name = FieldName::of(&format!("value{suffix}"));
        let name = &*name;
        Ok(match suffix {
            "Integer64" => Integer64::decode_field(object, name)?.map(Element::Integer64),
            "Decimal" => Decimal::decode_field(object, name)?.map(Element::Decimal),
            "String" => FhirString::decode_field(object, name)?.map(Element::String),
            "Uri" => Uri::decode_field(object, name)?.map(Element::Uri),
            "Code" => Code::decode_field(object, name)?.map(Element::Code),
            "Id" => Id::decode_field(object, name)?.map(Element::Id),
            "Oid" => Oid::decode_field(object, name)?.map(Element::Oid),
            "Markdown" => Markdown::decode_field(object, name)?.map(Element::Markdown),
            "Xhtml" => Xhtml::decode_field(object, name)?.map(Element::Xhtml),
            "Quantity" => Quantity::decode_field(object, name)?.map(Element::Quantity),
            "Age" => Age::decode_field(object, name)?.map(Element::Age),
            "Count" => Count::decode_field(object, name)?.map(Element::Count),
            "Distance" => Distance::decode_field(object, name)?.map(Element::Distance),
            "Duration" => Duration::decode_field(object, name)?.map(Element::Duration),
            "Reference" => Reference::decode_field(object, name)?.map(Element::Reference),
            _ => decode_external(object, suffix, name),
        })
    }
}

fn decode_external(object: &Map<String, Value>, suffix: &str, name: &FieldName) -> Option<Element> {
    let value = object.get(name.normal()).filter(|v| !v.is_null());
    let extended = object.get(name.extended()).filter(|v| !v.is_null());
    match (value, extended) {
        (None, None) => None,
        (Some(value), _) if value.is_object() => Some(Element::External(External::new(suffix, value.clone()))),
        (value, extended) => {
            let mut chars = suffix.chars();
            let fhir_type: String = chars
                .next()
                .map(|first| first.to_ascii_lowercase())
                .into_iter()
                .chain(chars)
                .collect();
            Some(Element::External(External::with_extended(
                fhir_type,
                value.cloned().unwrap_or(Value::Null),
                extended.cloned(),
            )))
        }
    }
}

impl Base for Element {
    /// Builds the variant named by [`Key::FhirType`]. Names outside the
    /// catalog build an [`External`].
    fn create(map: &FieldMap) -> Result<Self> {
        let fhir_type = match map.get(&Key::FhirType) {
            Some(value) => match value.as_str() {
                Some(name) => name,
                None => return Err(Error::mismatch("Element", "fhir/type", "type name", value.kind())),
            },
            None => {
                return Err(Error::NullRequiredComponent {
                    fhir_type: "Element",
                    key: "fhir/type",
                })
            }
        };
        Ok(match fhir_type {
            "integer64" => Element::Integer64(Integer64::create(map)?),
            "decimal" => Element::Decimal(Decimal::create(map)?),
            "string" => Element::String(FhirString::create(map)?),
            "uri" => Element::Uri(Uri::create(map)?),
            "code" => Element::Code(Code::create(map)?),
            "id" => Element::Id(Id::create(map)?),
            "oid" => Element::Oid(Oid::create(map)?),
            "markdown" => Element::Markdown(Markdown::create(map)?),
            "xhtml" => Element::Xhtml(Xhtml::create(map)?),
            "Quantity" => Element::Quantity(Quantity::create(map)?),
            "Age" => Element::Age(Age::create(map)?),
            "Count" => Element::Count(Count::create(map)?),
            "Distance" => Element::Distance(Distance::create(map)?),
            "Duration" => Element::Duration(Duration::create(map)?),
            "Extension" => Element::Extension(Extension::create(map)?),
            "Reference" => Element::Reference(Reference::create(map)?),
            _ => Element::External(External::create(map)?),
        })
    }

    fn fhir_type(&self) -> &str {
        each_variant!(self, v => v.fhir_type())
    }

    fn extension_data(&self) -> &ExtensionData {
        each_variant!(self, v => v.extension_data())
    }

    fn get(&self, key: Key) -> Option<FieldValue> {
        each_variant!(self, v => v.get(key))
    }

    fn assoc(&self, key: Key, value: Option<FieldValue>) -> Result<Self> {
        map_variant!(self, v => v.assoc(key, value))
    }

    fn entries(&self) -> Entries {
        each_variant!(self, v => v.entries())
    }

    fn is_interned(&self) -> bool {
        each_variant!(self, v => v.is_interned())
    }

    fn references(&self) -> References {
        each_variant!(self, v => v.references())
    }

    fn mem_size<E: Environment + ?Sized>(&self, env: &E) -> usize {
        each_variant!(self, v => v.mem_size(env))
    }
}

impl HashInto for Element {
    fn hash_into(&self, sink: &mut dyn HashSink) {
        each_variant!(self, v => v.hash_into(sink))
    }
}

impl Serialize for Element {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        each_variant!(self, v => v.serialize(serializer))
    }
}

/// Complex values count as present and never extended.
impl PrimitiveJson for Element {
    fn has_value(&self) -> bool {
        match self {
            Element::Integer64(v) => v.has_value(),
            Element::Decimal(v) => v.has_value(),
            Element::String(v) => v.has_value(),
            Element::Uri(v) => v.has_value(),
            Element::Code(v) => v.has_value(),
            Element::Id(v) => v.has_value(),
            Element::Oid(v) => v.has_value(),
            Element::Markdown(v) => v.has_value(),
            Element::Xhtml(v) => v.has_value(),
            Element::External(v) => PrimitiveJson::has_value(v),
            _ => true,
        }
    }

    fn is_extended(&self) -> bool {
        match self {
            Element::Integer64(v) => v.is_extended(),
            Element::Decimal(v) => v.is_extended(),
            Element::String(v) => v.is_extended(),
            Element::Uri(v) => v.is_extended(),
            Element::Code(v) => v.is_extended(),
            Element::Id(v) => v.is_extended(),
            Element::Oid(v) => v.is_extended(),
            Element::Markdown(v) => v.is_extended(),
            Element::Xhtml(v) => v.is_extended(),
            Element::External(v) => PrimitiveJson::is_extended(v),
            _ => false,
        }
    }

    fn serialize_extension<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Element::Integer64(v) => v.serialize_extension(serializer),
            Element::Decimal(v) => v.serialize_extension(serializer),
            Element::String(v) => v.serialize_extension(serializer),
            Element::Uri(v) => v.serialize_extension(serializer),
            Element::Code(v) => v.serialize_extension(serializer),
            Element::Id(v) => v.serialize_extension(serializer),
            Element::Oid(v) => v.serialize_extension(serializer),
            Element::Markdown(v) => v.serialize_extension(serializer),
            Element::Xhtml(v) => v.serialize_extension(serializer),
            Element::External(v) => v.serialize_extension(serializer),
            _ => serializer.serialize_none(),
        }
    }
}

impl SerializeField for Element {
    fn serialize_field<M: SerializeMap>(&self, map: &mut M, name: &FieldName) -> std::result::Result<(), M::Error> {
        each_variant!(self, v => v.serialize_field(map, name))
    }

    /// Lists of primitives get the padded dual form, anything else is
    /// written as a plain array.
    fn serialize_list_field<M: SerializeMap>(
        values: &[Self],
        map: &mut M,
        name: &FieldName,
    ) -> std::result::Result<(), M::Error> {
        if values.iter().all(Element::is_primitive) {
            crate::json::serialize_primitive_list(map, name, values)
        } else {
            crate::json::serialize_complex_list(map, name, values)
        }
    }
}

macro_rules! element_from {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(
            impl From<$ty> for Element {
                fn from(value: $ty) -> Self {
                    Element::$variant(value)
                }
            }

            impl From<$ty> for FieldValue {
                fn from(value: $ty) -> Self {
                    FieldValue::Element(Element::$variant(value))
                }
            }
        )*
    };
}

element_from!(
    Integer64(Integer64),
    Decimal(Decimal),
    String(FhirString),
    Uri(Uri),
    Code(Code),
    Id(Id),
    Oid(Oid),
    Markdown(Markdown),
    Xhtml(Xhtml),
    Quantity(Quantity),
    Age(Age),
    Count(Count),
    Distance(Distance),
    Duration(Duration),
    Extension(Extension),
    Reference(Reference),
    External(External),
);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(members) => members,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_extension_value_field_names() {
        let code: Element = Code::new("a").into();
        assert_eq!(code.extension_value_field_name().normal(), "valueCode");
        let age: Element = Age::empty().into();
        assert_eq!(age.extension_value_field_name().extended(), "_valueAge");
        let boolean: Element = External::new("boolean", json!(true)).into();
        assert_eq!(boolean.extension_value_field_name().normal(), "valueBoolean");
    }

    #[test]
    fn test_create_dispatches_on_type() {
        let map = FieldMap::from([
            (Key::FhirType, FieldValue::from("code")),
            (Key::Value, FieldValue::from("kg")),
        ]);
        let element = Element::create(&map).unwrap();
        assert_eq!(element, Element::Code(Code::new("kg")));
        assert!(matches!(
            Element::create(&FieldMap::new()),
            Err(Error::NullRequiredComponent { key: "fhir/type", .. })
        ));
    }

    #[test]
    fn test_assoc_keeps_variant() {
        let element: Element = Code::new("kg").into();
        let updated = element.assoc(Key::Value, Some(FieldValue::from("mg"))).unwrap();
        assert_eq!(updated, Element::Code(Code::new("mg")));
        assert_eq!(updated.fhir_type(), "code");
    }

    #[test]
    fn test_decode_known_value() {
        let members = object(json!({"url": "u", "valueCode": "x"}));
        let value = Element::decode_extension_value(&members).unwrap();
        assert_eq!(value, Some(Element::Code(Code::new("x"))));
    }

    #[test]
    fn test_decode_extension_only_value() {
        let members = object(json!({"url": "u", "_valueId": {"id": "a"}}));
        let value = Element::decode_extension_value(&members).unwrap().unwrap();
        assert_eq!(value.fhir_type(), "id");
        assert!(!PrimitiveJson::has_value(&value));
        assert_eq!(value.extension_data().id(), Some("a"));
    }

    #[test]
    fn test_decode_unknown_value() {
        let members = object(json!({"url": "u", "valueBoolean": true}));
        let value = Element::decode_extension_value(&members).unwrap().unwrap();
        assert_eq!(value.type_name(), "boolean");
        assert!(value.is_primitive());

        let members = object(json!({"url": "u", "valueMoney": {"value": 1}}));
        let value = Element::decode_extension_value(&members).unwrap().unwrap();
        assert_eq!(value.type_name(), "Money");
        assert!(!value.is_primitive());
    }

    #[test]
    fn test_no_value_member() {
        let members = object(json!({"url": "u", "extension": []}));
        assert_eq!(Element::decode_extension_value(&members).unwrap(), None);
    }
}
