//! Immutable FHIR data type values.
//!
//! Every value is an immutable, cheaply clonable handle. Values are read and
//! updated through symbolic [`Key`]s (see [`Base`]), hash structurally into a
//! [`ContentHash`], and read and write the FHIR JSON form, where primitives
//! carry their id and extensions in a sibling `_name` member (see [`json`]).
//!
//! Values whose content is common are canonicalized through weak pools, so
//! equal values share one instance:
//!
//! ```
//! use ferrum_types::{Base, Code};
//!
//! let a = Code::new("kg");
//! let b = Code::new("kg");
//! assert!(a.ptr_eq(&b));
//! assert!(a.is_interned());
//! ```
#![forbid(unsafe_code)]

pub mod base;
pub mod config;
pub mod env;
pub mod error;
pub mod extension_data;
pub mod field;
pub mod hash;
pub mod intern;
pub mod json;
pub mod mem;
pub mod primitive;
pub mod types;

pub use base::{Base, ReferenceTarget, References};
pub use config::{config, configure, TypesConfig};
pub use env::{BasicEnvironment, Environment, XmlElement};
pub use error::{Error, Result};
pub use extension_data::ExtensionData;
pub use field::{Entries, FieldMap, FieldName, FieldValue, Key, Metadata};
pub use hash::{ContentHash, HashInto, HashSink};
pub use json::{ComplexType, DecodeField, SerializeField};
pub use primitive::{DecimalValue, Primitive};
pub use types::{
    parse_local_reference, Age, Code, Count, Decimal, Distance, Duration, Element, Extension, External,
    FhirString, Id, Integer64, Markdown, Oid, Quantity, Reference, Uri, Xhtml,
};
