//! Reference from one resource to another.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::base::{field_mem_size, field_references, Base, ReferenceTarget, References};
use crate::env::Environment;
use crate::error::{Error, Result};
use crate::extension_data::ExtensionData;
use crate::field::{field_name, Entries, FieldMap, FieldName, FieldValue, Key};
use crate::hash::{marker, HashInto, HashSink, HasherSink};
use crate::json::{decode_as_complex, ComplexType, DecodeField, SerializeField};
use crate::mem::arc_size;
use crate::types::element::Element;
use crate::types::primitives::{FhirString, Uri};
use crate::types::quantity::expect_element;

const FHIR_TYPE: &str = "Reference";

const HASH_KEY_REFERENCE: u8 = 2;
const HASH_KEY_TYPE: u8 = 3;
const HASH_KEY_DISPLAY: u8 = 5;

static RESOURCE_TYPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z][A-Za-z0-9_]{0,254}$").expect("resource type regex must compile"));
static RESOURCE_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9\-.]{1,64}$").expect("resource id regex must compile"));

/// Splits a local literal reference `Type/id`.
pub fn parse_local_reference(reference: &str) -> Option<ReferenceTarget> {
    let (resource_type, id) = reference.split_once('/')?;
    if RESOURCE_TYPE.is_match(resource_type) && RESOURCE_ID.is_match(id) {
        Some(ReferenceTarget::new(resource_type, id))
    } else {
        None
    }
}

#[derive(Clone, PartialEq, Eq)]
struct Inner {
    ext: ExtensionData,
    reference: Option<FhirString>,
    type_: Option<Uri>,
    display: Option<FhirString>,
}

/// A reference. Never pooled, since references are mostly unique.
#[derive(Clone)]
pub struct Reference(Arc<Inner>);

impl Reference {
    pub fn new(reference: Option<FhirString>, type_: Option<Uri>, display: Option<FhirString>) -> Self {
        Reference(Arc::new(Inner {
            ext: ExtensionData::empty(),
            reference,
            type_,
            display,
        }))
    }

    /// A reference with just a literal `reference` value.
    pub fn literal(reference: &str) -> Self {
        Self::new(Some(FhirString::new(reference)), None, None)
    }

    pub fn reference(&self) -> Option<&FhirString> {
        self.0.reference.as_ref()
    }

    pub fn type_(&self) -> Option<&Uri> {
        self.0.type_.as_ref()
    }

    pub fn display(&self) -> Option<&FhirString> {
        self.0.display.as_ref()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn update(&self, f: impl FnOnce(&mut Inner)) -> Self {
        let mut inner = (*self.0).clone();
        f(&mut inner);
        Reference(Arc::new(inner))
    }

    fn local_reference(&self) -> Option<ReferenceTarget> {
        self.0
            .reference
            .as_ref()
            .and_then(|r| r.as_str())
            .and_then(parse_local_reference)
    }
}

impl Base for Reference {
    fn create(map: &FieldMap) -> Result<Self> {
        let field = |key: Key| map.get(&key).cloned();
        Ok(Reference(Arc::new(Inner {
            ext: ExtensionData::from_map(map, FHIR_TYPE)?,
            reference: field(Key::Reference)
                .map(|v| expect_element!(FHIR_TYPE, "reference", v, String, FhirString))
                .transpose()?,
            type_: field(Key::Type)
                .map(|v| expect_element!(FHIR_TYPE, "type", v, Uri, Uri))
                .transpose()?,
            display: field(Key::Display)
                .map(|v| expect_element!(FHIR_TYPE, "display", v, String, FhirString))
                .transpose()?,
        })))
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
            Key::Reference => self.0.reference.clone().map(|v| Element::String(v).into()),
            Key::Type => self.0.type_.clone().map(|v| Element::Uri(v).into()),
            Key::Display => self.0.display.clone().map(|v| Element::String(v).into()),
            _ => self.0.ext.get(key),
        }
    }

    fn assoc(&self, key: Key, value: Option<FieldValue>) -> Result<Self> {
        match key {
            Key::Reference => {
                let v = value
                    .map(|v| expect_element!(FHIR_TYPE, "reference", v, String, FhirString))
                    .transpose()?;
                Ok(self.update(|inner| inner.reference = v))
            }
            Key::Type => {
                let v = value
                    .map(|v| expect_element!(FHIR_TYPE, "type", v, Uri, Uri))
                    .transpose()?;
                Ok(self.update(|inner| inner.type_ = v))
            }
            Key::Display => {
                let v = value
                    .map(|v| expect_element!(FHIR_TYPE, "display", v, String, FhirString))
                    .transpose()?;
                Ok(self.update(|inner| inner.display = v))
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
        for key in [Key::Reference, Key::Type, Key::Display] {
            if let Some(value) = self.get(key) {
                entries.push((key, value));
            }
        }
        entries
    }

    fn is_interned(&self) -> bool {
        false
    }

    /// The local target first, then references held in field extensions,
    /// then those of the reference's own extensions.
    fn references(&self) -> References {
        let mut out: Vec<ReferenceTarget> = self.local_reference().into_iter().collect();
        field_references(self.0.reference.as_ref(), &mut out);
        field_references(self.0.type_.as_ref(), &mut out);
        field_references(self.0.display.as_ref(), &mut out);
        out.extend(self.0.ext.references());
        References::Collected(out)
    }

    fn mem_size<E: Environment + ?Sized>(&self, env: &E) -> usize {
        arc_size::<Inner>()
            + self.0.ext.mem_size(env)
            + field_mem_size(self.0.reference.as_ref(), env)
            + field_mem_size(self.0.type_.as_ref(), env)
            + field_mem_size(self.0.display.as_ref(), env)
    }
}

impl HashInto for Reference {
    fn hash_into(&self, sink: &mut dyn HashSink) {
        sink.put_byte(marker::REFERENCE);
        self.0.ext.hash_into(sink);
        if let Some(reference) = &self.0.reference {
            sink.put_byte(HASH_KEY_REFERENCE);
            reference.hash_into(sink);
        }
        if let Some(type_) = &self.0.type_ {
            sink.put_byte(HASH_KEY_TYPE);
            type_.hash_into(sink);
        }
        if let Some(display) = &self.0.display {
            sink.put_byte(HASH_KEY_DISPLAY);
            display.hash_into(sink);
        }
    }
}

impl PartialEq for Reference {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || *self.0 == *other.0
    }
}

impl Eq for Reference {}

impl Hash for Reference {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hash_into(&mut HasherSink(state));
    }
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reference")
            .field("extension_data", &self.0.ext)
            .field("reference", &self.0.reference)
            .field("type", &self.0.type_)
            .field("display", &self.0.display)
            .finish()
    }
}

impl Serialize for Reference {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        self.0.ext.serialize_entries(&mut map)?;
        if let Some(reference) = &self.0.reference {
            reference.serialize_field(&mut map, field_name!("reference"))?;
        }
        if let Some(type_) = &self.0.type_ {
            type_.serialize_field(&mut map, field_name!("type"))?;
        }
        if let Some(display) = &self.0.display {
            display.serialize_field(&mut map, field_name!("display"))?;
        }
        map.end()
    }
}

impl SerializeField for Reference {
    fn serialize_field<M: SerializeMap>(&self, map: &mut M, name: &FieldName) -> std::result::Result<(), M::Error> {
        crate::json::serialize_complex(map, name, self)
    }
}

impl ComplexType for Reference {
    const FHIR_TYPE: &'static str = FHIR_TYPE;

    fn from_json_object(object: &Map<String, Value>) -> Result<Self> {
        Ok(Reference(Arc::new(Inner {
            ext: ExtensionData::from_json_object(object, FHIR_TYPE)?,
            reference: FhirString::decode_field(object, field_name!("reference"))?,
            type_: Uri::decode_field(object, field_name!("type"))?,
            display: FhirString::decode_field(object, field_name!("display"))?,
        })))
    }
}

decode_as_complex!(Reference);
