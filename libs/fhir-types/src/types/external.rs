//! Values of types outside this crate's catalog.
//!
//! An [`External`] carries such a value in its JSON form. Type-specific
//! knowledge, like the memory footprint, comes from the [`Environment`].

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::base::{Base, ReferenceTarget, References};
use crate::env::{foreign_size, Environment};
use crate::error::{Error, Result};
use crate::extension_data::ExtensionData;
use crate::field::{Entries, FieldMap, FieldName, FieldValue, Key};
use crate::hash::{hash_json, hash_string, marker, HashInto, HashSink, HasherSink};
use crate::json::{PrimitiveJson, SerializeField};
use crate::mem::{arc_size, str_size};
use crate::types::reference::parse_local_reference;

const FHIR_TYPE: &str = "External";

const HASH_KEY_EXTENDED: u8 = 1;

#[derive(PartialEq, Eq)]
struct Inner {
    fhir_type: Arc<str>,
    value: Value,
    extended: Option<Value>,
}

/// A value of type `fhir_type` held as JSON. Primitive types, whose names
/// start lowercase, may carry the `_name` part in `extended`.
#[derive(Clone)]
pub struct External(Arc<Inner>);

impl External {
    pub fn new(fhir_type: impl Into<Arc<str>>, value: Value) -> Self {
        Self::with_extended(fhir_type, value, None)
    }

    pub fn with_extended(fhir_type: impl Into<Arc<str>>, value: Value, extended: Option<Value>) -> Self {
        External(Arc::new(Inner {
            fhir_type: fhir_type.into(),
            value,
            extended: extended.filter(|e| !e.is_null()),
        }))
    }

    pub fn type_name(&self) -> &str {
        &self.0.fhir_type
    }

    pub fn value(&self) -> &Value {
        &self.0.value
    }

    pub fn extended(&self) -> Option<&Value> {
        self.0.extended.as_ref()
    }

    pub fn is_primitive(&self) -> bool {
        self.0
            .fhir_type
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_lowercase())
    }
}

fn collect_json_references(value: &Value, out: &mut Vec<ReferenceTarget>) {
    match value {
        Value::Object(members) => {
            if let Some(target) = members
                .get("reference")
                .and_then(Value::as_str)
                .and_then(parse_local_reference)
            {
                out.push(target);
            }
            for (key, member) in members {
                if key != "reference" {
                    collect_json_references(member, out);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_json_references(item, out);
            }
        }
        _ => {}
    }
}

impl Base for External {
    fn create(map: &FieldMap) -> Result<Self> {
        let fhir_type = match map.get(&Key::FhirType) {
            Some(FieldValue::String(name)) => name.clone(),
            Some(FieldValue::Type(name)) => Arc::from(*name),
            Some(other) => return Err(Error::mismatch(FHIR_TYPE, "fhir/type", "type name", other.kind())),
            None => {
                return Err(Error::NullRequiredComponent {
                    fhir_type: FHIR_TYPE,
                    key: "fhir/type",
                })
            }
        };
        let value = match map.get(&Key::Value) {
            Some(FieldValue::Json(value)) => value.clone(),
            Some(other) => return Err(Error::mismatch(FHIR_TYPE, "value", "json", other.kind())),
            None => Value::Null,
        };
        let extended = match map.get(&Key::Extension) {
            Some(FieldValue::Json(value)) => Some(value.clone()),
            Some(other) => return Err(Error::mismatch(FHIR_TYPE, "extension", "json", other.kind())),
            None => None,
        };
        Ok(Self::with_extended(fhir_type, value, extended))
    }

    fn fhir_type(&self) -> &str {
        self.type_name()
    }

    fn extension_data(&self) -> &ExtensionData {
        static EMPTY: once_cell::sync::Lazy<ExtensionData> = once_cell::sync::Lazy::new(ExtensionData::empty);
        &EMPTY
    }

    fn get(&self, key: Key) -> Option<FieldValue> {
        match key {
            Key::FhirType => Some(FieldValue::String(self.0.fhir_type.clone())),
            Key::Value if !self.0.value.is_null() => Some(FieldValue::Json(self.0.value.clone())),
            Key::Extension => self.0.extended.clone().map(FieldValue::Json),
            _ => None,
        }
    }

    /// Externals are read-only.
    fn assoc(&self, key: Key, _value: Option<FieldValue>) -> Result<Self> {
        Err(Error::unsupported(FHIR_TYPE, key))
    }

    fn entries(&self) -> Entries {
        let mut entries = vec![(Key::FhirType, FieldValue::String(self.0.fhir_type.clone()))];
        entries.extend(self.get(Key::Value).map(|v| (Key::Value, v)));
        entries.extend(self.get(Key::Extension).map(|v| (Key::Extension, v)));
        entries
    }

    fn is_interned(&self) -> bool {
        false
    }

    fn references(&self) -> References {
        let mut out = Vec::new();
        collect_json_references(&self.0.value, &mut out);
        if let Some(extended) = &self.0.extended {
            collect_json_references(extended, &mut out);
        }
        References::Collected(out)
    }

    fn mem_size<E: Environment + ?Sized>(&self, env: &E) -> usize {
        arc_size::<Inner>() + str_size(&self.0.fhir_type) + foreign_size(env, &self.0.fhir_type, &self.0.value)
    }
}

impl HashInto for External {
    fn hash_into(&self, sink: &mut dyn HashSink) {
        sink.put_byte(marker::MAP);
        hash_string(sink, &self.0.fhir_type);
        hash_json(sink, &self.0.value);
        if let Some(extended) = &self.0.extended {
            sink.put_byte(HASH_KEY_EXTENDED);
            hash_json(sink, extended);
        }
    }
}

impl PartialEq for External {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || *self.0 == *other.0
    }
}

impl Eq for External {}

impl Hash for External {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hash_into(&mut HasherSink(state));
    }
}

impl fmt::Debug for External {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("External")
            .field("fhir_type", &self.0.fhir_type)
            .field("value", &self.0.value)
            .field("extended", &self.0.extended)
            .finish()
    }
}

impl Serialize for External {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.value.serialize(serializer)
    }
}

impl PrimitiveJson for External {
    fn has_value(&self) -> bool {
        !self.0.value.is_null()
    }

    fn is_extended(&self) -> bool {
        self.0.extended.is_some()
    }

    fn serialize_extension<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match &self.0.extended {
            Some(extended) => extended.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }
}

impl SerializeField for External {
    fn serialize_field<M: SerializeMap>(&self, map: &mut M, name: &FieldName) -> std::result::Result<(), M::Error> {
        if self.is_primitive() {
            crate::json::serialize_primitive(map, name, self)
        } else if self.has_value() {
            crate::json::serialize_complex(map, name, self)
        } else {
            Ok(())
        }
    }

    fn serialize_list_field<M: SerializeMap>(
        values: &[Self],
        map: &mut M,
        name: &FieldName,
    ) -> std::result::Result<(), M::Error> {
        if values.iter().all(External::is_primitive) {
            crate::json::serialize_primitive_list(map, name, values)
        } else {
            crate::json::serialize_complex_list(map, name, values)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::BasicEnvironment;
    use serde_json::json;

    struct Fixed;

    impl Environment for Fixed {
        type Node = ();

        fn size_of(&self, fhir_type: &str, _value: &Value) -> Option<usize> {
            (fhir_type == "Money").then_some(100)
        }

        fn build_element(&self, _id: Option<&str>, _attributes: &[(&str, &str)]) {}
    }

    #[test]
    fn test_size_is_delegated() {
        let money = External::new("Money", json!({"value": 1, "currency": "EUR"}));
        let period = External::new("Period", json!({"start": "2020"}));
        let base = arc_size::<Inner>();
        assert_eq!(money.mem_size(&Fixed), base + str_size("Money") + 100);
        assert_eq!(period.mem_size(&Fixed), base + str_size("Period"));
        assert!(money.mem_size(&BasicEnvironment) > base);
    }

    #[test]
    fn test_read_only() {
        let money = External::new("Money", json!({"value": 1}));
        assert!(matches!(
            money.assoc(Key::Value, None),
            Err(Error::UnsupportedField { fhir_type: "External", key: "value" })
        ));
    }

    #[test]
    fn test_nested_references() {
        let annotation = External::new(
            "Annotation",
            json!({"authorReference": {"reference": "Practitioner/1"}, "text": "x"}),
        );
        assert_eq!(
            annotation.references().into_vec(),
            vec![ReferenceTarget::new("Practitioner", "1")]
        );
    }

    #[test]
    fn test_member_order_is_irrelevant_to_hash() {
        let a = External::new("Money", json!({"value": 1, "currency": "EUR"}));
        let b = External::new("Money", json!({"currency": "EUR", "value": 1}));
        assert_eq!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn test_type_name_is_answered_consistently() {
        let money = External::new("Money", json!({"value": 1}));
        assert_eq!(money.fhir_type(), "Money");
        assert_eq!(money.get(Key::FhirType), Some(FieldValue::from(money.fhir_type())));
    }

    #[test]
    fn test_primitive_list_writes_both_members() {
        let values = [
            External::new("boolean", json!(true)),
            External::with_extended("boolean", Value::Null, Some(json!({"id": "b1"}))),
        ];
        let text = crate::json::to_string(&crate::json::PropertyList::new("flag", &values)).unwrap();
        assert_eq!(text, r#"{"flag":[true,null],"_flag":[null,{"id":"b1"}]}"#);
    }
}
