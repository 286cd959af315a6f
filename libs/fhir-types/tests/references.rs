//! Reference extraction order and applicability

use ferrum_types::{
    Age, Base, Code, DecimalValue, Decimal, Extension, ExtensionData, External, FhirString, Key,
    Reference, ReferenceTarget, References,
};
use serde_json::json;

fn pointing_to(target: &str) -> ExtensionData {
    ExtensionData::with_extensions(vec![Extension::new(
        "http://example.org/source",
        Some(Reference::literal(target).into()),
    )])
}

fn targets(references: References) -> Vec<String> {
    references.into_vec().iter().map(ToString::to_string).collect()
}

#[test]
fn plain_primitive_is_not_applicable() {
    assert_eq!(Code::new("kg").references(), References::NotApplicable);
    assert!(!FhirString::empty().references().is_applicable());
}

#[test]
fn primitive_with_extensions_collects() {
    let code = Code::new("kg").with_extension_data(pointing_to("Patient/0"));
    assert_eq!(
        code.references(),
        References::Collected(vec![ReferenceTarget::new("Patient", "0")])
    );

    let plain = ExtensionData::with_extensions(vec![Extension::new("http://a", Some(Code::new("x").into()))]);
    let code = Code::new("kg").with_extension_data(plain);
    assert_eq!(code.references(), References::Collected(Vec::new()));
}

#[test]
fn composite_without_references_is_empty_not_absent() {
    let references = Age::empty().references();
    assert!(references.is_applicable());
    assert!(references.into_vec().is_empty());
}

#[test]
fn composite_orders_fields_then_own_extensions() {
    let value = Decimal::new(DecimalValue::from(3i64)).with_extension_data(pointing_to("Patient/0"));
    let unit = FhirString::new("a").with_extension_data(pointing_to("Patient/1"));
    let own = pointing_to("Patient/2").extension().to_vec();
    let age = Age::new(Some(value), None, Some(unit), None, None)
        .assoc(Key::Extension, Some(own.into()))
        .unwrap();
    assert_eq!(targets(age.references()), ["Patient/0", "Patient/1", "Patient/2"]);
}

#[test]
fn extensions_keep_their_order_and_duplicates() {
    let ext = ExtensionData::with_extensions(vec![
        Extension::new("http://a", Some(Reference::literal("Practitioner/b").into())),
        Extension::new("http://a", Some(Reference::literal("Organization/a").into())),
        Extension::new("http://a", Some(Reference::literal("Practitioner/b").into())),
    ]);
    let code = Code::new("x").with_extension_data(ext);
    assert_eq!(
        targets(code.references()),
        ["Practitioner/b", "Organization/a", "Practitioner/b"]
    );
}

#[test]
fn reference_lists_its_target_first() {
    let display = FhirString::new("Dr. Who").with_extension_data(pointing_to("Patient/9"));
    let reference = Reference::new(Some(FhirString::new("Practitioner/7")), None, Some(display));
    assert_eq!(targets(reference.references()), ["Practitioner/7", "Patient/9"]);
}

#[test]
fn only_local_literal_references_count() {
    for literal in ["http://server/fhir/Patient/1", "#contained", "urn:uuid:1234", "Patient"] {
        assert!(Reference::literal(literal).references().into_vec().is_empty(), "{}", literal);
    }
}

#[test]
fn nested_extensions_are_walked() {
    let inner = Extension::new("http://inner", Some(Reference::literal("Device/d1").into()));
    let outer = Extension::from_parts(
        ExtensionData::with_extensions(vec![inner]),
        "http://outer".into(),
        None,
    );
    assert_eq!(targets(outer.references()), ["Device/d1"]);
}

#[test]
fn external_values_are_searched() {
    let annotation = External::new(
        "Annotation",
        json!({
            "authorReference": {"reference": "Practitioner/p1"},
            "note": [{"subject": {"reference": "Patient/p2"}}]
        }),
    );
    assert_eq!(targets(annotation.references()), ["Practitioner/p1", "Patient/p2"]);
}
