//! Quantities: a measured amount with an optional comparator and unit.
//!
//! `Quantity` and its profiles `Age`, `Count`, `Distance` and `Duration` share
//! one layout. They differ in type name, hash marker, extension value field
//! name and in how `assoc` treats undeclared keys.

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
use crate::extension_data::ExtensionData;
use crate::field::{field_name, Entries, FieldMap, FieldName, FieldValue, Key};
use crate::hash::{marker, HashInto, HashSink, HasherSink};
use crate::intern::{Interner, WeakInterner};
use crate::json::{ComplexType, DecodeField, SerializeField};
use crate::mem::arc_size;
use crate::types::element::Element;
use crate::types::primitives::{Code, Decimal, FhirString, Uri};

const HASH_KEY_VALUE: u8 = 2;
const HASH_KEY_COMPARATOR: u8 = 3;
const HASH_KEY_UNIT: u8 = 4;
const HASH_KEY_SYSTEM: u8 = 5;
const HASH_KEY_CODE: u8 = 6;

pub trait QuantityKind: Sized + Send + Sync + 'static {
    const FHIR_TYPE: &'static str;
    const HASH_MARKER: u8;
    const REJECTS_UNKNOWN_KEYS: bool;

    fn pool() -> &'static WeakInterner<QuantityData<Self>, QuantityData<Self>>;
}

pub struct QuantityData<K: QuantityKind> {
    ext: ExtensionData,
    value: Option<Decimal>,
    comparator: Option<Code>,
    unit: Option<FhirString>,
    system: Option<Uri>,
    code: Option<Code>,
    kind: std::marker::PhantomData<K>,
}

impl<K: QuantityKind> QuantityData<K> {
    fn is_interned(&self) -> bool {
        self.ext.is_interned()
            && field_interned(self.value.as_ref())
            && field_interned(self.comparator.as_ref())
            && field_interned(self.unit.as_ref())
            && field_interned(self.system.as_ref())
            && field_interned(self.code.as_ref())
    }
}

impl<K: QuantityKind> Clone for QuantityData<K> {
    fn clone(&self) -> Self {
        Self {
            ext: self.ext.clone(),
            value: self.value.clone(),
            comparator: self.comparator.clone(),
            unit: self.unit.clone(),
            system: self.system.clone(),
            code: self.code.clone(),
            kind: std::marker::PhantomData,
        }
    }
}

impl<K: QuantityKind> PartialEq for QuantityData<K> {
    fn eq(&self, other: &Self) -> bool {
        self.ext == other.ext
            && self.value == other.value
            && self.comparator == other.comparator
            && self.unit == other.unit
            && self.system == other.system
            && self.code == other.code
    }
}

impl<K: QuantityKind> Eq for QuantityData<K> {}

impl<K: QuantityKind> Hash for QuantityData<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hash_into(&mut HasherSink(state));
    }
}

impl<K: QuantityKind> HashInto for QuantityData<K> {
    fn hash_into(&self, sink: &mut dyn HashSink) {
        sink.put_byte(K::HASH_MARKER);
        self.ext.hash_into(sink);
        if let Some(value) = &self.value {
            sink.put_byte(HASH_KEY_VALUE);
            value.hash_into(sink);
        }
        if let Some(comparator) = &self.comparator {
            sink.put_byte(HASH_KEY_COMPARATOR);
            comparator.hash_into(sink);
        }
        if let Some(unit) = &self.unit {
            sink.put_byte(HASH_KEY_UNIT);
            unit.hash_into(sink);
        }
        if let Some(system) = &self.system {
            sink.put_byte(HASH_KEY_SYSTEM);
            system.hash_into(sink);
        }
        if let Some(code) = &self.code {
            sink.put_byte(HASH_KEY_CODE);
            code.hash_into(sink);
        }
    }
}

/// Immutable quantity of kind `K`.
pub struct AbstractQuantity<K: QuantityKind>(Arc<QuantityData<K>>);

impl<K: QuantityKind> AbstractQuantity<K> {
    pub fn new(
        value: Option<Decimal>,
        comparator: Option<Code>,
        unit: Option<FhirString>,
        system: Option<Uri>,
        code: Option<Code>,
    ) -> Self {
        Self::from_data(QuantityData {
            ext: ExtensionData::empty(),
            value,
            comparator,
            unit,
            system,
            code,
            kind: std::marker::PhantomData,
        })
    }

    pub fn empty() -> Self {
        Self::new(None, None, None, None, None)
    }

    fn from_data(data: QuantityData<K>) -> Self {
        if data.is_interned() {
            AbstractQuantity(K::pool().intern(&data))
        } else {
            AbstractQuantity(Arc::new(data))
        }
    }

    fn update(&self, f: impl FnOnce(&mut QuantityData<K>)) -> Self {
        let mut data = (*self.0).clone();
        f(&mut data);
        Self::from_data(data)
    }

    pub fn value(&self) -> Option<&Decimal> {
        self.0.value.as_ref()
    }

    pub fn comparator(&self) -> Option<&Code> {
        self.0.comparator.as_ref()
    }

    pub fn unit(&self) -> Option<&FhirString> {
        self.0.unit.as_ref()
    }

    pub fn system(&self) -> Option<&Uri> {
        self.0.system.as_ref()
    }

    pub fn code(&self) -> Option<&Code> {
        self.0.code.as_ref()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Converts an element field, accepting either the element itself or its
/// bare payload.
macro_rules! expect_element {
    ($fhir_type:expr, $key:literal, $value:expr, $variant:ident, $ty:ty) => {
        match $value {
            FieldValue::Element(Element::$variant(v)) => Ok(v),
            other => match <$ty as Base>::create(&FieldMap::from([(Key::Value, other.clone())])) {
                Ok(v) if v.has_value() => Ok(v),
                _ => Err(Error::mismatch($fhir_type, $key, stringify!($variant), other.kind())),
            },
        }
    };
}

pub(crate) use expect_element;

impl<K: QuantityKind> Base for AbstractQuantity<K> {
    fn create(map: &FieldMap) -> Result<Self> {
        let ext = ExtensionData::from_map(map, K::FHIR_TYPE)?;
        let field = |key: Key| map.get(&key).cloned();
        Ok(Self::from_data(QuantityData {
            ext,
            value: field(Key::Value)
                .map(|v| expect_element!(K::FHIR_TYPE, "value", v, Decimal, Decimal))
                .transpose()?,
            comparator: field(Key::Comparator)
                .map(|v| expect_element!(K::FHIR_TYPE, "comparator", v, Code, Code))
                .transpose()?,
            unit: field(Key::Unit)
                .map(|v| expect_element!(K::FHIR_TYPE, "unit", v, String, FhirString))
                .transpose()?,
            system: field(Key::System)
                .map(|v| expect_element!(K::FHIR_TYPE, "system", v, Uri, Uri))
                .transpose()?,
            code: field(Key::Code)
                .map(|v| expect_element!(K::FHIR_TYPE, "code", v, Code, Code))
                .transpose()?,
            kind: std::marker::PhantomData,
        }))
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
            Key::Value => self.0.value.clone().map(|v| Element::Decimal(v).into()),
            Key::Comparator => self.0.comparator.clone().map(|v| Element::Code(v).into()),
            Key::Unit => self.0.unit.clone().map(|v| Element::String(v).into()),
            Key::System => self.0.system.clone().map(|v| Element::Uri(v).into()),
            Key::Code => self.0.code.clone().map(|v| Element::Code(v).into()),
            _ => self.0.ext.get(key),
        }
    }

    fn assoc(&self, key: Key, value: Option<FieldValue>) -> Result<Self> {
        match key {
            Key::Value => {
                let v = value
                    .map(|v| expect_element!(K::FHIR_TYPE, "value", v, Decimal, Decimal))
                    .transpose()?;
                Ok(self.update(|d| d.value = v))
            }
            Key::Comparator => {
                let v = value
                    .map(|v| expect_element!(K::FHIR_TYPE, "comparator", v, Code, Code))
                    .transpose()?;
                Ok(self.update(|d| d.comparator = v))
            }
            Key::Unit => {
                let v = value
                    .map(|v| expect_element!(K::FHIR_TYPE, "unit", v, String, FhirString))
                    .transpose()?;
                Ok(self.update(|d| d.unit = v))
            }
            Key::System => {
                let v = value
                    .map(|v| expect_element!(K::FHIR_TYPE, "system", v, Uri, Uri))
                    .transpose()?;
                Ok(self.update(|d| d.system = v))
            }
            Key::Code => {
                let v = value
                    .map(|v| expect_element!(K::FHIR_TYPE, "code", v, Code, Code))
                    .transpose()?;
                Ok(self.update(|d| d.code = v))
            }
            _ => match self.0.ext.assoc(K::FHIR_TYPE, key, value)? {
                Some(ext) => Ok(self.update(|d| d.ext = ext)),
                None if K::REJECTS_UNKNOWN_KEYS => Err(Error::unsupported(K::FHIR_TYPE, key)),
                None => Ok(self.clone()),
            },
        }
    }

    fn entries(&self) -> Entries {
        let mut entries = Entries::new();
        self.0.ext.append_entries(&mut entries);
        for key in [Key::Value, Key::Comparator, Key::Unit, Key::System, Key::Code] {
            if let Some(value) = self.get(key) {
                entries.push((key, value));
            }
        }
        entries
    }

    fn is_interned(&self) -> bool {
        self.0.is_interned()
    }

    fn references(&self) -> References {
        let mut out = Vec::new();
        field_references(self.0.value.as_ref(), &mut out);
        field_references(self.0.comparator.as_ref(), &mut out);
        field_references(self.0.unit.as_ref(), &mut out);
        field_references(self.0.system.as_ref(), &mut out);
        field_references(self.0.code.as_ref(), &mut out);
        out.extend(self.0.ext.references());
        References::Collected(out)
    }

    fn mem_size<E: Environment + ?Sized>(&self, env: &E) -> usize {
        if self.is_interned() {
            return 0;
        }
        arc_size::<QuantityData<K>>()
            + self.0.ext.mem_size(env)
            + field_mem_size(self.0.value.as_ref(), env)
            + field_mem_size(self.0.comparator.as_ref(), env)
            + field_mem_size(self.0.unit.as_ref(), env)
            + field_mem_size(self.0.system.as_ref(), env)
            + field_mem_size(self.0.code.as_ref(), env)
    }
}

impl<K: QuantityKind> HashInto for AbstractQuantity<K> {
    fn hash_into(&self, sink: &mut dyn HashSink) {
        self.0.hash_into(sink);
    }
}

impl<K: QuantityKind> Clone for AbstractQuantity<K> {
    fn clone(&self) -> Self {
        AbstractQuantity(Arc::clone(&self.0))
    }
}

impl<K: QuantityKind> PartialEq for AbstractQuantity<K> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || *self.0 == *other.0
    }
}

impl<K: QuantityKind> Eq for AbstractQuantity<K> {}

impl<K: QuantityKind> Hash for AbstractQuantity<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hash_into(&mut HasherSink(state));
    }
}

impl<K: QuantityKind> fmt::Debug for AbstractQuantity<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(K::FHIR_TYPE)
            .field("extension_data", &self.0.ext)
            .field("value", &self.0.value)
            .field("comparator", &self.0.comparator)
            .field("unit", &self.0.unit)
            .field("system", &self.0.system)
            .field("code", &self.0.code)
            .finish()
    }
}

impl<K: QuantityKind> Serialize for AbstractQuantity<K> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        self.0.ext.serialize_entries(&mut map)?;
        if let Some(value) = &self.0.value {
            value.serialize_field(&mut map, field_name!("value"))?;
        }
        if let Some(comparator) = &self.0.comparator {
            comparator.serialize_field(&mut map, field_name!("comparator"))?;
        }
        if let Some(unit) = &self.0.unit {
            unit.serialize_field(&mut map, field_name!("unit"))?;
        }
        if let Some(system) = &self.0.system {
            system.serialize_field(&mut map, field_name!("system"))?;
        }
        if let Some(code) = &self.0.code {
            code.serialize_field(&mut map, field_name!("code"))?;
        }
        map.end()
    }
}

impl<K: QuantityKind> SerializeField for AbstractQuantity<K> {
    fn serialize_field<M: SerializeMap>(&self, map: &mut M, name: &FieldName) -> std::result::Result<(), M::Error> {
        crate::json::serialize_complex(map, name, self)
    }
}

impl<K: QuantityKind> ComplexType for AbstractQuantity<K> {
    const FHIR_TYPE: &'static str = K::FHIR_TYPE;

    fn from_json_object(object: &Map<String, Value>) -> Result<Self> {
        Ok(Self::from_data(QuantityData {
            ext: ExtensionData::from_json_object(object, K::FHIR_TYPE)?,
            value: Decimal::decode_field(object, field_name!("value"))?,
            comparator: Code::decode_field(object, field_name!("comparator"))?,
            unit: FhirString::decode_field(object, field_name!("unit"))?,
            system: Uri::decode_field(object, field_name!("system"))?,
            code: Code::decode_field(object, field_name!("code"))?,
            kind: std::marker::PhantomData,
        }))
    }
}

impl<K: QuantityKind> DecodeField for AbstractQuantity<K> {
    fn decode_field(object: &Map<String, Value>, name: &FieldName) -> Result<Option<Self>> {
        crate::json::decode_complex(object, name)
    }

    fn decode_list(object: &Map<String, Value>, name: &FieldName) -> Result<Vec<Self>> {
        crate::json::decode_complex_list(object, name)
    }
}

macro_rules! quantity_kind {
    ($(#[$doc:meta])* $alias:ident, $kind:ident, $fhir_type:literal, $marker:expr, $rejects:literal) => {
        #[derive(Debug)]
        pub enum $kind {}

        impl QuantityKind for $kind {
            const FHIR_TYPE: &'static str = $fhir_type;
            const HASH_MARKER: u8 = $marker;
            const REJECTS_UNKNOWN_KEYS: bool = $rejects;

            fn pool() -> &'static WeakInterner<QuantityData<Self>, QuantityData<Self>> {
                static POOL: Lazy<WeakInterner<QuantityData<$kind>, QuantityData<$kind>>> =
                    Lazy::new(|| WeakInterner::new(QuantityData::clone));
                &POOL
            }
        }

        $(#[$doc])*
        pub type $alias = AbstractQuantity<$kind>;
    };
}

quantity_kind!(
    /// A measured amount. Rejects undeclared keys.
    Quantity, QuantityTypeKind, "Quantity", marker::QUANTITY, true
);
quantity_kind!(
    /// A duration of time during which an organism has existed.
    Age, AgeKind, "Age", marker::AGE, false
);
quantity_kind!(
    /// A measured count of discrete items.
    Count, CountKind, "Count", marker::COUNT, false
);
quantity_kind!(Distance, DistanceKind, "Distance", marker::DISTANCE, false);
quantity_kind!(
    /// A length of time.
    Duration, DurationKind, "Duration", marker::DURATION, false
);
