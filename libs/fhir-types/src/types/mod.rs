//! Concrete value types.

pub(crate) mod element;
pub(crate) mod extension;
pub(crate) mod external;
pub(crate) mod primitives;
pub(crate) mod quantity;
pub(crate) mod reference;

pub use element::Element;
pub use extension::Extension;
pub use external::External;
pub use primitives::{
    Code, CodeKind, Decimal, DecimalKind, FhirString, Id, IdKind, Integer64, Integer64Kind, Markdown,
    MarkdownKind, Oid, OidKind, StringKind, Uri, UriKind, Xhtml, XhtmlKind,
};
pub use quantity::{
    AbstractQuantity, Age, AgeKind, Count, CountKind, Distance, DistanceKind, Duration, DurationKind,
    Quantity, QuantityData, QuantityKind, QuantityTypeKind,
};
pub use reference::{parse_local_reference, Reference};
