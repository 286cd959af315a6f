//! Concrete primitive types.

use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::hash::marker;
use crate::intern::WeakInterner;
use crate::primitive::{DecimalValue, Payload, Primitive, PrimitiveData, PrimitiveKind};

/// Longest textual form that still gets pooled for short-value types.
const SHORT_VALUE_LEN: usize = 4;

fn always<T>(_value: Option<&T>) -> bool {
    true
}

fn absent_only<T>(value: Option<&T>) -> bool {
    value.is_none()
}

fn short_value<T: Payload>(value: Option<&T>) -> bool {
    value.map_or(true, |v| v.text_len() <= SHORT_VALUE_LEN)
}

macro_rules! primitive_kind {
    (
        $(#[$doc:meta])*
        $alias:ident, $kind:ident {
            value: $value:ty,
            fhir_type: $fhir_type:literal,
            marker: $marker:expr,
            rejects_unknown_keys: $rejects:literal,
            internable: $internable:path $(,)?
        }
    ) => {
        #[derive(Debug)]
        pub enum $kind {}

        impl PrimitiveKind for $kind {
            type Value = $value;

            const FHIR_TYPE: &'static str = $fhir_type;
            const HASH_MARKER: u8 = $marker;
            const REJECTS_UNKNOWN_KEYS: bool = $rejects;

            fn internable(value: Option<&$value>) -> bool {
                $internable(value)
            }

            fn pool() -> &'static WeakInterner<PrimitiveData<Self>, PrimitiveData<Self>> {
                static POOL: Lazy<WeakInterner<PrimitiveData<$kind>, PrimitiveData<$kind>>> =
                    Lazy::new(|| WeakInterner::new(PrimitiveData::clone));
                &POOL
            }
        }

        $(#[$doc])*
        pub type $alias = Primitive<$kind>;
    };
}

primitive_kind! {
    /// 64-bit integer. Pooled only without a value.
    Integer64, Integer64Kind {
        value: i64,
        fhir_type: "integer64",
        marker: marker::INTEGER64,
        rejects_unknown_keys: false,
        internable: absent_only,
    }
}

primitive_kind! {
    /// Arbitrary precision decimal keeping its scale.
    Decimal, DecimalKind {
        value: DecimalValue,
        fhir_type: "decimal",
        marker: marker::DECIMAL,
        rejects_unknown_keys: true,
        internable: short_value,
    }
}

primitive_kind! {
    FhirString, StringKind {
        value: Arc<str>,
        fhir_type: "string",
        marker: marker::STRING,
        rejects_unknown_keys: false,
        internable: short_value,
    }
}

primitive_kind! {
    Uri, UriKind {
        value: Arc<str>,
        fhir_type: "uri",
        marker: marker::URI,
        rejects_unknown_keys: false,
        internable: short_value,
    }
}

primitive_kind! {
    /// Value from a code system. Codes come from small vocabularies and are
    /// always pooled.
    Code, CodeKind {
        value: Arc<str>,
        fhir_type: "code",
        marker: marker::CODE,
        rejects_unknown_keys: false,
        internable: always,
    }
}

primitive_kind! {
    Id, IdKind {
        value: Arc<str>,
        fhir_type: "id",
        marker: marker::ID,
        rejects_unknown_keys: false,
        internable: absent_only,
    }
}

primitive_kind! {
    Oid, OidKind {
        value: Arc<str>,
        fhir_type: "oid",
        marker: marker::OID,
        rejects_unknown_keys: false,
        internable: absent_only,
    }
}

primitive_kind! {
    Markdown, MarkdownKind {
        value: Arc<str>,
        fhir_type: "markdown",
        marker: marker::MARKDOWN,
        rejects_unknown_keys: true,
        internable: absent_only,
    }
}

primitive_kind! {
    /// XHTML narrative, held as text.
    Xhtml, XhtmlKind {
        value: Arc<str>,
        fhir_type: "xhtml",
        marker: marker::XHTML,
        rejects_unknown_keys: false,
        internable: absent_only,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::Base;
    use crate::error::Error;
    use crate::field::{FieldValue, Key};

    #[test]
    fn test_pooling_policies() {
        assert!(Code::new("a-long-code-value").is_interned());
        assert!(Uri::new("urn").is_interned());
        assert!(!Uri::new("http://unitsofmeasure.org").is_interned());
        assert!(FhirString::new("wk").is_interned());
        assert!(Decimal::new(DecimalValue::from(75i64)).is_interned());
        assert!(!Id::new("a").is_interned());
        assert!(!Oid::new("urn:oid:1.2").is_interned());
        assert!(!Integer64::new(1i64).is_interned());
        assert!(Integer64::empty().is_interned());
    }

    #[test]
    fn test_pooled_values_share_instance() {
        assert!(Code::new("kg").ptr_eq(&Code::new("kg")));
        assert!(!Id::new("a").ptr_eq(&Id::new("a")));
        assert_eq!(Id::new("a"), Id::new("a"));
    }

    #[test]
    fn test_unknown_key_policies() {
        let code = Code::new("kg");
        assert_eq!(code.assoc(Key::Unit, Some(FieldValue::from("x"))).unwrap(), code);
        let xhtml = Xhtml::new("<div/>");
        assert_eq!(xhtml.assoc(Key::Url, None).unwrap(), xhtml);

        assert!(matches!(
            Markdown::new("*a*").assoc(Key::Unit, None),
            Err(Error::UnsupportedField { fhir_type: "markdown", key: "unit" })
        ));
        assert!(matches!(
            Decimal::empty().assoc(Key::FhirType, None),
            Err(Error::UnsupportedField { fhir_type: "decimal", .. })
        ));
    }

    #[test]
    fn test_distinct_types_hash_differently() {
        assert_ne!(Code::new("a").content_hash(), Id::new("a").content_hash());
        assert_ne!(Markdown::new("a").content_hash(), Oid::new("a").content_hash());
    }
}
