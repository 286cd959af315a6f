//! Extension: a url plus a polymorphic `value[x]`.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use once_cell::sync::Lazy;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::base::{field_interned, field_mem_size, field_references, Base, References};
use crate::env::Environment;
use crate::error::{Error, Result};
use crate::extension_data::{json_kind, ExtensionData};
use crate::field::{Entries, FieldMap, FieldName, FieldValue, Key};
use crate::hash::{hash_string, marker, HashInto, HashSink, HasherSink};
use crate::intern::{Interner, WeakInterner};
use crate::json::{decode_as_complex, ComplexType, SerializeField};
use crate::mem::{arc_size, str_size};
use crate::types::element::Element;

const FHIR_TYPE: &str = "Extension";

const HASH_KEY_URL: u8 = 2;
const HASH_KEY_VALUE: u8 = 3;

/// Presence byte of a string payload.
const HASH_KEY_STRING_VALUE: u8 = 2;

#[derive(Clone)]
struct Inner {
    ext: ExtensionData,
    url: Arc<str>,
    value: Option<Element>,
}

impl Inner {
    fn is_interned(&self) -> bool {
        self.ext.is_interned() && field_interned(self.value.as_ref())
    }
}

impl PartialEq for Inner {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url && self.value == other.value && self.ext == other.ext
    }
}

impl Eq for Inner {}

impl Hash for Inner {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hash_into(&mut HasherSink(state));
    }
}

impl HashInto for Inner {
    fn hash_into(&self, sink: &mut dyn HashSink) {
        sink.put_byte(marker::EXTENSION);
        self.ext.hash_into(sink);
        // the url hashes like a `string` value without extensions
        sink.put_byte(HASH_KEY_URL);
        sink.put_byte(marker::STRING);
        sink.put_byte(HASH_KEY_STRING_VALUE);
        hash_string(sink, &self.url);
        if let Some(value) = &self.value {
            sink.put_byte(HASH_KEY_VALUE);
            value.hash_into(sink);
        }
    }
}

static POOL: Lazy<WeakInterner<Inner, Inner>> = Lazy::new(|| WeakInterner::new(Inner::clone));

/// Additional content defined by an implementation or profile.
#[derive(Clone)]
pub struct Extension(Arc<Inner>);

impl Extension {
    pub fn new(url: impl Into<Arc<str>>, value: Option<Element>) -> Self {
        Self::from_parts(ExtensionData::empty(), url.into(), value)
    }

    pub fn from_parts(ext: ExtensionData, url: Arc<str>, value: Option<Element>) -> Self {
        let inner = Inner { ext, url, value };
        if inner.is_interned() {
            Extension(POOL.intern(&inner))
        } else {
            Extension(Arc::new(inner))
        }
    }

    pub fn url(&self) -> &str {
        &self.0.url
    }

    pub fn value(&self) -> Option<&Element> {
        self.0.value.as_ref()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn update(&self, f: impl FnOnce(&mut Inner)) -> Self {
        let mut inner = (*self.0).clone();
        f(&mut inner);
        Self::from_parts(inner.ext, inner.url, inner.value)
    }
}

fn expect_url(value: Option<FieldValue>) -> Result<Arc<str>> {
    match value {
        None => Err(Error::NullRequiredComponent {
            fhir_type: FHIR_TYPE,
            key: "url",
        }),
        Some(FieldValue::String(url)) => Ok(url),
        Some(FieldValue::Element(Element::Uri(uri))) => match uri.as_str() {
            Some(url) => Ok(Arc::from(url)),
            None => Err(Error::NullRequiredComponent {
                fhir_type: FHIR_TYPE,
                key: "url",
            }),
        },
        Some(other) => Err(Error::mismatch(FHIR_TYPE, "url", "string", other.kind())),
    }
}

fn expect_value(value: FieldValue) -> Result<Element> {
    match value {
        FieldValue::Element(element) => Ok(element),
        other => Err(Error::mismatch(FHIR_TYPE, "value", "element", other.kind())),
    }
}

impl Base for Extension {
    fn create(map: &FieldMap) -> Result<Self> {
        let ext = ExtensionData::from_map(map, FHIR_TYPE)?;
        let url = expect_url(map.get(&Key::Url).cloned())?;
        let value = map.get(&Key::Value).cloned().map(expect_value).transpose()?;
        Ok(Self::from_parts(ext, url, value))
    }

    fn fhir_type(&self) -> &str {
        FHIR_TYPE
    }

    fn extension_data(&self) -> &ExtensionData {
        &self.0.ext
    }

    fn get(&self, key: Key) -> Option<FieldValue> {
        match key {
            Key::FhirType => Some(FieldValue::Type(FHIR_TYPE)),
            Key::Url => Some(FieldValue::String(self.0.url.clone())),
            Key::Value => self.0.value.clone().map(FieldValue::Element),
            _ => self.0.ext.get(key),
        }
    }

    fn assoc(&self, key: Key, value: Option<FieldValue>) -> Result<Self> {
        match key {
            Key::Url => {
                let url = expect_url(value)?;
                Ok(self.update(|inner| inner.url = url))
            }
            Key::Value => {
                let value = value.map(expect_value).transpose()?;
                Ok(self.update(|inner| inner.value = value))
            }
            _ => match self.0.ext.assoc(FHIR_TYPE, key, value)? {
                Some(ext) => Ok(self.update(|inner| inner.ext = ext)),
                None => Err(Error::unsupported(FHIR_TYPE, key)),
            },
        }
    }

    fn entries(&self) -> Entries {
        let mut entries = Entries::new();
        self.0.ext.append_entries(&mut entries);
        entries.push((Key::Url, FieldValue::String(self.0.url.clone())));
        if let Some(value) = &self.0.value {
            entries.push((Key::Value, FieldValue::Element(value.clone())));
        }
        entries
    }

    fn is_interned(&self) -> bool {
        self.0.is_interned()
    }

    fn references(&self) -> References {
        let mut out = Vec::new();
        field_references(self.0.value.as_ref(), &mut out);
        out.extend(self.0.ext.references());
        References::Collected(out)
    }

    fn mem_size<E: Environment + ?Sized>(&self, env: &E) -> usize {
        if self.is_interned() {
            return 0;
        }
        arc_size::<Inner>()
            + self.0.ext.mem_size(env)
            + str_size(&self.0.url)
            + field_mem_size(self.0.value.as_ref(), env)
    }
}

impl HashInto for Extension {
    fn hash_into(&self, sink: &mut dyn HashSink) {
        self.0.hash_into(sink);
    }
}

impl PartialEq for Extension {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || *self.0 == *other.0
    }
}

impl Eq for Extension {}

impl Hash for Extension {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl fmt::Debug for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extension")
            .field("extension_data", &self.0.ext)
            .field("url", &self.0.url)
            .field("value", &self.0.value)
            .finish()
    }
}

impl Serialize for Extension {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        self.0.ext.serialize_entries(&mut map)?;
        map.serialize_entry("url", &*self.0.url)?;
        if let Some(value) = &self.0.value {
            value.serialize_field(&mut map, &value.extension_value_field_name())?;
        }
        map.end()
    }
}

impl SerializeField for Extension {
    fn serialize_field<M: SerializeMap>(&self, map: &mut M, name: &FieldName) -> std::result::Result<(), M::Error> {
        crate::json::serialize_complex(map, name, self)
    }
}

impl ComplexType for Extension {
    const FHIR_TYPE: &'static str = FHIR_TYPE;

    fn from_json_object(object: &Map<String, Value>) -> Result<Self> {
        let ext = ExtensionData::from_json_object(object, FHIR_TYPE)?;
        let url = match object.get("url") {
            Some(Value::String(url)) => Arc::from(url.as_str()),
            None | Some(Value::Null) => {
                return Err(Error::NullRequiredComponent {
                    fhir_type: FHIR_TYPE,
                    key: "url",
                })
            }
            Some(other) => return Err(Error::mismatch(FHIR_TYPE, "url", "string", json_kind(other))),
        };
        let value = Element::decode_extension_value(object)?;
        Ok(Self::from_parts(ext, url, value))
    }
}

decode_as_complex!(Extension);
