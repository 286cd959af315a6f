//! Capabilities supplied by the embedding system.
//!
//! Values of types outside this crate's catalog, and XML element nodes, are
//! owned by the surrounding engine. It hands them in through an
//! [`Environment`].

use serde_json::Value;

pub trait Environment {
    /// Element node type produced for the XML hook.
    type Node;

    /// Memory size of a value of a type this crate doesn't know. `None`
    /// counts as zero.
    fn size_of(&self, fhir_type: &str, value: &Value) -> Option<usize>;

    /// Builds an element node with an optional id and `(name, value)`
    /// attributes.
    fn build_element(&self, id: Option<&str>, attributes: &[(&str, &str)]) -> Self::Node;
}

/// Plain element node produced by [`BasicEnvironment`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XmlElement {
    pub id: Option<String>,
    pub attributes: Vec<(String, String)>,
}

impl XmlElement {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Environment without external type knowledge.
///
/// Every foreign value is estimated by the length of its JSON text.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicEnvironment;

impl Environment for BasicEnvironment {
    type Node = XmlElement;

    fn size_of(&self, _fhir_type: &str, value: &Value) -> Option<usize> {
        serde_json::to_string(value).ok().map(|s| s.len())
    }

    fn build_element(&self, id: Option<&str>, attributes: &[(&str, &str)]) -> XmlElement {
        XmlElement {
            id: id.map(str::to_string),
            attributes: attributes
                .iter()
                .map(|(n, v)| (n.to_string(), v.to_string()))
                .collect(),
        }
    }
}

pub(crate) fn foreign_size<E: Environment + ?Sized>(env: &E, fhir_type: &str, value: &Value) -> usize {
    env.size_of(fhir_type, value).unwrap_or(0)
}
