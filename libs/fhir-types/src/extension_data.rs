//! The id, extensions and metadata every value carries.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use once_cell::sync::Lazy;
use serde::ser::SerializeMap;
use serde_json::{Map, Value};

use crate::base::{Base, ReferenceTarget, References};
use crate::env::Environment;
use crate::error::{Error, Result};
use crate::field::{Entries, FieldMap, FieldValue, Key, Metadata};
use crate::hash::{hash_list, hash_string, HashInto, HashSink, HasherSink};
use crate::intern::{Interner, WeakInterner};
use crate::json::ComplexType;
use crate::mem::{arc_size, slice_size, str_size};
use crate::types::Extension;

const HASH_KEY_ID: u8 = 0;
const HASH_KEY_EXTENSION: u8 = 1;

/// Id, extensions and metadata of a value.
///
/// Metadata is carried along but takes no part in equality, hashing or
/// serialization.
#[derive(Clone)]
pub struct ExtensionData(Arc<Inner>);

struct Inner {
    id: Option<Arc<str>>,
    extension: Arc<[Extension]>,
    meta: Option<Arc<Metadata>>,
}

static EMPTY: Lazy<ExtensionData> = Lazy::new(|| {
    ExtensionData(Arc::new(Inner {
        id: None,
        extension: Arc::from(Vec::new()),
        meta: None,
    }))
});

static POOL: Lazy<WeakInterner<Vec<Extension>, Inner>> = Lazy::new(|| {
    WeakInterner::new(|extension| Inner {
        id: None,
        extension: Arc::from(extension.as_slice()),
        meta: None,
    })
});

impl ExtensionData {
    /// The shared instance without id, extensions or metadata.
    pub fn empty() -> Self {
        EMPTY.clone()
    }

    pub fn new(
        id: Option<Arc<str>>,
        extension: Arc<[Extension]>,
        meta: Option<Arc<Metadata>>,
    ) -> Self {
        if id.is_none() && meta.is_none() {
            if extension.is_empty() {
                return Self::empty();
            }
            if extension.iter().all(Extension::is_interned) {
                return ExtensionData(POOL.intern(&extension[..]));
            }
        }
        ExtensionData(Arc::new(Inner {
            id,
            extension,
            meta,
        }))
    }

    pub fn with_extensions(extension: Vec<Extension>) -> Self {
        Self::new(None, Arc::from(extension), None)
    }

    /// Reads the `id`, `extension` and `meta` keys of `map`.
    pub fn from_map(map: &FieldMap, fhir_type: &'static str) -> Result<Self> {
        let id = match map.get(&Key::Id) {
            None => None,
            Some(v) => Some(expect_id(fhir_type, v)?),
        };
        let extension = match map.get(&Key::Extension) {
            None => Arc::from(Vec::new()),
            Some(v) => expect_extensions(fhir_type, v)?,
        };
        let meta = match map.get(&Key::Meta) {
            None => None,
            Some(v) => Some(expect_meta(fhir_type, v)?),
        };
        Ok(Self::new(id, extension, meta))
    }

    pub fn id(&self) -> Option<&str> {
        self.0.id.as_deref()
    }

    pub fn extension(&self) -> &[Extension] {
        &self.0.extension
    }

    pub fn meta(&self) -> Option<&Metadata> {
        self.0.meta.as_deref()
    }

    pub fn with_id(&self, id: Option<Arc<str>>) -> Self {
        Self::new(id, self.0.extension.clone(), self.0.meta.clone())
    }

    pub fn with_extension(&self, extension: Arc<[Extension]>) -> Self {
        Self::new(self.0.id.clone(), extension, self.0.meta.clone())
    }

    pub fn with_meta(&self, meta: Option<Arc<Metadata>>) -> Self {
        Self::new(self.0.id.clone(), self.0.extension.clone(), meta)
    }

    /// True without id and extensions. Metadata doesn't count.
    pub fn is_empty(&self) -> bool {
        self.0.id.is_none() && self.0.extension.is_empty()
    }

    pub fn is_not_empty(&self) -> bool {
        !self.is_empty()
    }

    /// True for the canonical empty instance only. Shared extension lists
    /// don't count, so values carrying extensions are never pooled.
    pub fn is_interned(&self) -> bool {
        self.0.id.is_none() && self.0.meta.is_none() && self.0.extension.is_empty()
    }

    /// Whether this instance came out of the extension list pool.
    fn is_shared(&self) -> bool {
        self.0.id.is_none()
            && self.0.meta.is_none()
            && self.0.extension.iter().all(Extension::is_interned)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn get(&self, key: Key) -> Option<FieldValue> {
        match key {
            Key::Id => self.0.id.clone().map(FieldValue::String),
            Key::Extension if !self.0.extension.is_empty() => {
                Some(FieldValue::Extensions(self.0.extension.clone()))
            }
            Key::Meta => self.0.meta.clone().map(FieldValue::Meta),
            _ => None,
        }
    }

    /// Sets one of `id`, `extension` or `meta`. `None` for any other key.
    pub(crate) fn assoc(
        &self,
        fhir_type: &'static str,
        key: Key,
        value: Option<FieldValue>,
    ) -> Result<Option<Self>> {
        let updated = match key {
            Key::Id => self.with_id(value.map(|v| expect_id(fhir_type, &v)).transpose()?),
            Key::Extension => self.with_extension(match value {
                None => Arc::from(Vec::new()),
                Some(v) => expect_extensions(fhir_type, &v)?,
            }),
            Key::Meta => self.with_meta(value.map(|v| expect_meta(fhir_type, &v)).transpose()?),
            _ => return Ok(None),
        };
        Ok(Some(updated))
    }

    pub(crate) fn append_entries(&self, entries: &mut Entries) {
        for key in [Key::Id, Key::Extension, Key::Meta] {
            if let Some(value) = self.get(key) {
                entries.push((key, value));
            }
        }
    }

    pub(crate) fn references(&self) -> Vec<ReferenceTarget> {
        let mut out = Vec::new();
        for extension in self.0.extension.iter() {
            extension.references().append_to(&mut out);
        }
        out
    }

    /// Collected extension references, or `NotApplicable` without extensions.
    pub(crate) fn primitive_references(&self) -> References {
        if self.0.extension.is_empty() {
            References::NotApplicable
        } else {
            References::Collected(self.references())
        }
    }

    pub fn mem_size<E: Environment + ?Sized>(&self, env: &E) -> usize {
        if self.is_shared() {
            return 0;
        }
        arc_size::<Inner>()
            + self.0.id.as_deref().map_or(0, str_size)
            + slice_size::<Extension>(self.0.extension.len())
            + self
                .0
                .extension
                .iter()
                .map(|e| e.mem_size(env))
                .sum::<usize>()
    }

    /// Writes `id` and `extension` as members of an enclosing object.
    pub fn serialize_entries<M: SerializeMap>(&self, map: &mut M) -> std::result::Result<(), M::Error> {
        if let Some(id) = self.id() {
            map.serialize_entry("id", id)?;
        }
        if !self.0.extension.is_empty() {
            map.serialize_entry("extension", &self.0.extension[..])?;
        }
        Ok(())
    }

    /// Reads `id` and `extension` members of a JSON object.
    pub fn from_json_object(object: &Map<String, Value>, fhir_type: &'static str) -> Result<Self> {
        let id = match object.get("id") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(Arc::from(s.as_str())),
            Some(other) => return Err(Error::mismatch(fhir_type, "id", "string", json_kind(other))),
        };
        let extension = match object.get("extension") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(Extension::from_json)
                .collect::<Result<Vec<_>>>()?,
            Some(other) => {
                return Err(Error::mismatch(fhir_type, "extension", "array", json_kind(other)))
            }
        };
        Ok(Self::new(id, Arc::from(extension), None))
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn expect_id(fhir_type: &'static str, value: &FieldValue) -> Result<Arc<str>> {
    match value {
        FieldValue::String(s) => Ok(s.clone()),
        other => Err(Error::mismatch(fhir_type, "id", "string", other.kind())),
    }
}

fn expect_extensions(fhir_type: &'static str, value: &FieldValue) -> Result<Arc<[Extension]>> {
    match value {
        FieldValue::Extensions(e) => Ok(e.clone()),
        other => Err(Error::mismatch(fhir_type, "extension", "extension list", other.kind())),
    }
}

fn expect_meta(fhir_type: &'static str, value: &FieldValue) -> Result<Arc<Metadata>> {
    match value {
        FieldValue::Meta(m) => Ok(m.clone()),
        FieldValue::Json(Value::Object(members)) => Ok(Arc::new(
            members.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        )),
        other => Err(Error::mismatch(fhir_type, "meta", "metadata", other.kind())),
    }
}

impl HashInto for ExtensionData {
    fn hash_into(&self, sink: &mut dyn HashSink) {
        if let Some(id) = self.id() {
            sink.put_byte(HASH_KEY_ID);
            hash_string(sink, id);
        }
        if !self.0.extension.is_empty() {
            sink.put_byte(HASH_KEY_EXTENSION);
            hash_list(sink, &self.0.extension[..]);
        }
    }
}

impl PartialEq for ExtensionData {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || (self.0.id == other.0.id && self.0.extension == other.0.extension)
    }
}

impl Eq for ExtensionData {}

impl Hash for ExtensionData {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hash_into(&mut HasherSink(state));
    }
}

impl PartialEq for Inner {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.extension == other.extension
    }
}

impl fmt::Debug for ExtensionData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionData")
            .field("id", &self.0.id)
            .field("extension", &self.0.extension)
            .finish()
    }
}

impl Default for ExtensionData {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Code, Element};

    fn ext(url: &str, code: &str) -> Extension {
        Extension::new(url, Some(Element::Code(Code::new(code))))
    }

    #[test]
    fn test_empty_is_canonical() {
        let a = ExtensionData::from_map(&FieldMap::new(), "code").unwrap();
        assert!(a.ptr_eq(&ExtensionData::empty()));
        assert!(a.is_empty());
        assert!(a.is_interned());
    }

    #[test]
    fn test_interned_extension_lists_are_shared() {
        let a = ExtensionData::with_extensions(vec![ext("http://a", "x")]);
        let b = ExtensionData::with_extensions(vec![ext("http://a", "x")]);
        assert!(a.ptr_eq(&b));
        assert!(!a.is_interned());
        assert_eq!(a.mem_size(&crate::env::BasicEnvironment), 0);
    }

    #[test]
    fn test_id_prevents_interning() {
        let a = ExtensionData::empty().with_id(Some(Arc::from("id-1")));
        assert!(!a.is_interned());
        assert!(a.is_not_empty());
        assert_eq!(a.id(), Some("id-1"));
    }

    #[test]
    fn test_meta_is_not_emptiness_or_equality() {
        let mut meta = Metadata::new();
        meta.insert("source".into(), Value::from("import"));
        let a = ExtensionData::empty().with_meta(Some(Arc::new(meta)));
        assert!(a.is_empty());
        assert!(!a.is_interned());
        assert_eq!(a, ExtensionData::empty());
        assert!(a.meta().is_some());
    }

    #[test]
    fn test_with_preserves_other_fields() {
        let a = ExtensionData::empty().with_id(Some(Arc::from("a")));
        let b = a.with_extension(Arc::from(vec![ext("http://a", "x")]));
        assert_eq!(b.id(), Some("a"));
        assert_eq!(b.extension().len(), 1);
    }

    #[test]
    fn test_hash_stream() {
        let a = ExtensionData::empty().with_id(Some(Arc::from("a")));
        let mut sink = Vec::new();
        a.hash_into(&mut sink);
        assert_eq!(sink, vec![0, 1, b'a']);

        let mut empty = Vec::new();
        ExtensionData::empty().hash_into(&mut empty);
        assert!(empty.is_empty());
    }

    #[test]
    fn test_from_map_rejects_wrong_id() {
        let mut map = FieldMap::new();
        map.insert(Key::Id, FieldValue::Integer(1));
        assert!(matches!(
            ExtensionData::from_map(&map, "code"),
            Err(Error::TypeMismatch { .. })
        ));
    }
}
