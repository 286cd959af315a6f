//! Error types for FHIR type values

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("the key `{key}` isn't supported on FHIR.{fhir_type}")]
    UnsupportedField {
        fhir_type: &'static str,
        key: &'static str,
    },

    #[error("invalid value for FHIR.{fhir_type}.{key}: expected {expected}, found {found}")]
    TypeMismatch {
        fhir_type: &'static str,
        key: String,
        expected: &'static str,
        found: String,
    },

    #[error("missing required component FHIR.{fhir_type}.{key}")]
    NullRequiredComponent {
        fhir_type: &'static str,
        key: &'static str,
    },

    #[error("failed to write JSON: {0}")]
    Sink(#[source] serde_json::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid content hash: {0}")]
    InvalidContentHash(String),

    #[error("type configuration is already set")]
    AlreadyConfigured,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn mismatch(
        fhir_type: &'static str,
        key: impl Into<String>,
        expected: &'static str,
        found: impl Into<String>,
    ) -> Self {
        Error::TypeMismatch {
            fhir_type,
            key: key.into(),
            expected,
            found: found.into(),
        }
    }

    pub(crate) fn unsupported(fhir_type: &'static str, key: crate::Key) -> Self {
        Error::UnsupportedField {
            fhir_type,
            key: key.name(),
        }
    }
}
