//! Keyed access shared by every value type.

use std::fmt;

use crate::env::Environment;
use crate::error::Result;
use crate::extension_data::ExtensionData;
use crate::field::{Entries, FieldMap, FieldValue, Key};
use crate::hash::{ContentHash, HashInto};

/// Resource type and id of a literal reference like `Patient/0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReferenceTarget {
    pub resource_type: String,
    pub id: String,
}

impl ReferenceTarget {
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for ReferenceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.resource_type, self.id)
    }
}

/// Result of a reference walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum References {
    /// A primitive without extensions. It can't hold references.
    NotApplicable,
    /// References in field declaration order, then those of the extensions.
    /// Duplicates are kept.
    Collected(Vec<ReferenceTarget>),
}

impl References {
    pub fn is_applicable(&self) -> bool {
        matches!(self, References::Collected(_))
    }

    pub fn into_vec(self) -> Vec<ReferenceTarget> {
        match self {
            References::NotApplicable => Vec::new(),
            References::Collected(targets) => targets,
        }
    }

    pub(crate) fn append_to(self, out: &mut Vec<ReferenceTarget>) {
        if let References::Collected(targets) = self {
            out.extend(targets);
        }
    }
}

/// Generic access to the fields of an immutable value.
///
/// `assoc` never changes `self`. It returns a new value and routes it through
/// the same canonicalization as `create`, so the result may be a pooled
/// instance.
pub trait Base: Clone + HashInto {
    /// Builds a value from a keyed map. Missing keys become absent fields,
    /// keys the type doesn't declare are ignored.
    fn create(map: &FieldMap) -> Result<Self>;

    fn fhir_type(&self) -> &str;

    fn extension_data(&self) -> &ExtensionData;

    /// Field stored under `key`, `None` when absent or unknown.
    fn get(&self, key: Key) -> Option<FieldValue>;

    fn val_at(&self, key: Key, not_found: FieldValue) -> FieldValue {
        self.get(key).unwrap_or(not_found)
    }

    /// Returns a value with `key` set to `value`, or removed on `None`.
    ///
    /// Element fields also take a bare payload (`"wk"` for a quantity's
    /// `unit`) and store it wrapped in the field's element type. Reading the
    /// key back yields that element, not the payload written.
    fn assoc(&self, key: Key, value: Option<FieldValue>) -> Result<Self>;

    /// Present fields in declaration order.
    fn entries(&self) -> Entries;

    fn to_field_map(&self) -> FieldMap {
        self.entries().into_iter().collect()
    }

    /// Whether this value is the pooled instance for its content.
    fn is_interned(&self) -> bool;

    fn references(&self) -> References;

    /// Estimated heap bytes owned by this value alone.
    fn mem_size<E: Environment + ?Sized>(&self, env: &E) -> usize;

    fn content_hash(&self) -> ContentHash {
        ContentHash::of(self)
    }
}

/// References of an optional field.
pub(crate) fn field_references<T: Base>(field: Option<&T>, out: &mut Vec<ReferenceTarget>) {
    if let Some(field) = field {
        field.references().append_to(out);
    }
}

/// Memory size of an optional field.
pub(crate) fn field_mem_size<T: Base, E: Environment + ?Sized>(field: Option<&T>, env: &E) -> usize {
    field.map_or(0, |f| f.mem_size(env))
}

pub(crate) fn field_interned<T: Base>(field: Option<&T>) -> bool {
    field.map_or(true, Base::is_interned)
}
