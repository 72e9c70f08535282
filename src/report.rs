//! Renders the secondary warning-report document returned alongside a
//! [`crate::result::ProcessingResult`] (spec.md §7, SPEC_FULL.md §4.10).
//!
//! The report is itself a template: a small built-in body with conditional
//! sections and loops, run through the same [`crate::transform::transform`]
//! and [`crate::doc::writer`] the main pipeline uses, fed a data context
//! assembled from the warnings being reported. Categories with nothing to
//! report are omitted by the template's own `{{#if}}` guards.

use crate::doc::model::{Body, BodyBlock, Paragraph, ParagraphProperties, Run, RunProperties};
use crate::doc::properties::CoreProperties;
use crate::doc::Document;
use crate::error::Error;
use crate::options::Options;
use crate::result::{ProcessingResult, Warning};
use crate::transform;
use crate::value::Value;
use std::rc::Rc;

fn plain_paragraph(text: impl Into<String>) -> Paragraph {
    Paragraph {
        id: 0,
        properties: ParagraphProperties::default(),
        runs: vec![Run::new(text, Rc::new(RunProperties::default()))],
        bookmarks: vec![],
    }
}

fn heading_paragraph(text: impl Into<String>) -> Paragraph {
    let props = Rc::new(RunProperties { bold: true, ..RunProperties::default() });
    Paragraph { id: 0, properties: ParagraphProperties::default(), runs: vec![Run::new(text, props)], bookmarks: vec![] }
}

fn section(flag: &str, heading: &str, items_path: &str) -> Vec<Paragraph> {
    vec![
        plain_paragraph(format!("{{{{#if {flag}}}}}")),
        heading_paragraph(heading),
        plain_paragraph(format!("{{{{#foreach {items_path}}}}}")),
        plain_paragraph("- {{.}}"),
        plain_paragraph("{{/foreach}}"),
        plain_paragraph("{{/if}}"),
    ]
}

/// Builds the fixed report template body. Every paragraph here is
/// marker-only or a single inline placeholder, so the ordinary transform
/// pipeline drives it with no special-casing.
fn build_template() -> Body {
    let mut paragraphs = vec![heading_paragraph("Template Processing Report")];
    paragraphs.extend(section("HasMissingVariables", "Missing Variables", "MissingVariables"));
    paragraphs.extend(section("HasMissingLoopCollections", "Missing Loop Collections", "MissingLoopCollections"));
    paragraphs.extend(section("HasNullLoopCollections", "Null Loop Collections", "NullLoopCollections"));
    paragraphs.push(plain_paragraph("Total Warnings: {{TotalWarnings}}"));
    Body::new(paragraphs.into_iter().map(BodyBlock::Paragraph).collect())
}

fn names_in_category<'a>(warnings: &'a [Warning], category: &str) -> Vec<&'a str> {
    let mut names = Vec::new();
    for warning in warnings {
        if warning.category() == category && !names.contains(&warning.name()) {
            names.push(warning.name());
        }
    }
    names
}

fn build_data(result: &ProcessingResult) -> Value {
    let missing_variables = names_in_category(&result.warnings, "Missing Variables");
    let missing_loop_collections = names_in_category(&result.warnings, "Missing Loop Collections");
    let null_loop_collections = names_in_category(&result.warnings, "Null Loop Collections");

    Value::mapping([
        ("HasMissingVariables".to_string(), Value::Bool(!missing_variables.is_empty())),
        ("MissingVariables".to_string(), Value::Sequence(missing_variables.iter().map(|n| Value::String((*n).to_string())).collect())),
        ("HasMissingLoopCollections".to_string(), Value::Bool(!missing_loop_collections.is_empty())),
        (
            "MissingLoopCollections".to_string(),
            Value::Sequence(missing_loop_collections.iter().map(|n| Value::String((*n).to_string())).collect()),
        ),
        ("HasNullLoopCollections".to_string(), Value::Bool(!null_loop_collections.is_empty())),
        ("NullLoopCollections".to_string(), Value::Sequence(null_loop_collections.iter().map(|n| Value::String((*n).to_string())).collect())),
        ("TotalWarnings".to_string(), Value::Integer(result.warnings.len() as i64)),
    ])
}

const DOCUMENT_PREFIX: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>"#;
const DOCUMENT_SUFFIX: &str = "</w:body></w:document>";

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/><Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/></Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/></Relationships>"#;

/// Renders the secondary diagnostics document for `result`.
pub fn render_warning_report(result: &ProcessingResult) -> Result<Vec<u8>, Error> {
    let mut body = build_template();
    let data = build_data(result);
    transform::transform(&mut body, data, &Options::default())?;

    let document = Document {
        body,
        properties: CoreProperties { title: Some("Template Processing Report".to_string()), ..CoreProperties::default() },
        update_fields_on_open: false,
        document_prefix: DOCUMENT_PREFIX.as_bytes().to_vec(),
        document_suffix: DOCUMENT_SUFFIX.as_bytes().to_vec(),
        other_parts: vec![
            ("[Content_Types].xml".to_string(), CONTENT_TYPES.as_bytes().to_vec()),
            ("_rels/.rels".to_string(), ROOT_RELS.as_bytes().to_vec()),
        ],
        settings_xml: None,
        document_had_fields: false,
        declares_w14_namespace: false,
    };

    crate::doc::writer::write_package(&document, &Options::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_with(warnings: Vec<Warning>) -> ProcessingResult {
        ProcessingResult {
            is_success: true,
            error_message: None,
            replacement_count: 0,
            missing_variables: Vec::new(),
            warnings,
            output: None,
        }
    }

    #[test]
    fn empty_warnings_report_still_emits_total() {
        let result = result_with(vec![]);
        let bytes = render_warning_report(&result).unwrap();
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(&bytes)).unwrap();
        let mut file = archive.by_name("word/document.xml").unwrap();
        let mut xml = String::new();
        std::io::Read::read_to_string(&mut file, &mut xml).unwrap();
        assert!(xml.contains("Total Warnings: 0"));
        assert!(!xml.contains("Missing Variables"));
    }

    #[test]
    fn missing_variable_warnings_are_listed() {
        let result = result_with(vec![Warning::MissingVariable("Customer.Name".to_string()), Warning::MissingVariable("Order.Id".to_string())]);
        let bytes = render_warning_report(&result).unwrap();
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(&bytes)).unwrap();
        let mut file = archive.by_name("word/document.xml").unwrap();
        let mut xml = String::new();
        std::io::Read::read_to_string(&mut file, &mut xml).unwrap();
        assert!(xml.contains("Missing Variables"));
        assert!(xml.contains("Customer.Name"));
        assert!(xml.contains("Order.Id"));
        assert!(xml.contains("Total Warnings: 2"));
    }
}
