//! `docProps/core.xml` (Dublin Core document properties) and the
//! `w:updateFields` flag in `word/settings.xml` (SPEC_FULL.md §4.9).

use crate::error::Error;
use crate::options::{DocumentPropertyOverrides, UpdateFieldsOnOpen};
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::Reader;

/// The subset of `docProps/core.xml` this crate reads and can override.
/// `None` on any field means the template's original value was absent.
#[derive(Debug, Clone, Default)]
pub struct CoreProperties {
    pub title: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub description: Option<String>,
    pub keywords: Option<String>,
    pub category: Option<String>,
    pub last_modified_by: Option<String>,
}

impl CoreProperties {
    /// Applies caller overrides, preserving the template's original value
    /// wherever the override is `None` (spec.md §6 "nulls preserve
    /// originals").
    pub fn with_overrides(&self, overrides: &DocumentPropertyOverrides) -> CoreProperties {
        CoreProperties {
            title: overrides.title.clone().or_else(|| self.title.clone()),
            subject: overrides.subject.clone().or_else(|| self.subject.clone()),
            creator: overrides.creator.clone().or_else(|| self.creator.clone()),
            description: overrides.description.clone().or_else(|| self.description.clone()),
            keywords: overrides.keywords.clone().or_else(|| self.keywords.clone()),
            category: overrides.category.clone().or_else(|| self.category.clone()),
            last_modified_by: overrides.last_modified_by.clone().or_else(|| self.last_modified_by.clone()),
        }
    }
}

/// Parses `docProps/core.xml`. Elements this crate doesn't recognize (e.g.
/// `dcterms:created`) are silently ignored — their values are not carried
/// over, a documented simplification (DESIGN.md).
pub fn parse_core_properties(xml: &[u8]) -> Result<CoreProperties, Error> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut props = CoreProperties::default();
    let mut current: Option<String> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf).map_err(|source| Error::Xml { part: "docProps/core.xml".into(), source })? {
            Event::Start(e) => {
                current = Some(local_name(&e));
            }
            Event::Text(t) => {
                if let Some(name) = &current {
                    let text = t.unescape().map_err(|source| Error::Xml { part: "docProps/core.xml".into(), source })?.into_owned();
                    assign_property(&mut props, name, text);
                }
            }
            Event::End(_) => current = None,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(props)
}

fn local_name(start: &BytesStart) -> String {
    String::from_utf8_lossy(start.local_name().as_ref()).into_owned()
}

fn assign_property(props: &mut CoreProperties, name: &str, text: String) {
    match name {
        "title" => props.title = Some(text),
        "subject" => props.subject = Some(text),
        "creator" => props.creator = Some(text),
        "description" => props.description = Some(text),
        "keywords" => props.keywords = Some(text),
        "category" => props.category = Some(text),
        "lastModifiedBy" => props.last_modified_by = Some(text),
        _ => {}
    }
}

/// Serializes `props` as a complete `docProps/core.xml` part.
pub fn render_core_properties(props: &CoreProperties) -> Vec<u8> {
    let mut out = String::new();
    out.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    out.push_str(
        r#"<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">"#,
    );
    push_elem(&mut out, "dc:title", &props.title);
    push_elem(&mut out, "dc:subject", &props.subject);
    push_elem(&mut out, "dc:creator", &props.creator);
    push_elem(&mut out, "dc:description", &props.description);
    push_elem(&mut out, "cp:keywords", &props.keywords);
    push_elem(&mut out, "cp:category", &props.category);
    push_elem(&mut out, "cp:lastModifiedBy", &props.last_modified_by);
    out.push_str("</cp:coreProperties>");
    out.into_bytes()
}

fn push_elem(out: &mut String, tag: &str, value: &Option<String>) {
    if let Some(text) = value {
        let escaped = escape_text(text);
        out.push_str(&format!("<{tag}>{escaped}</{tag}>"));
    }
}

fn escape_text(text: &str) -> String {
    let escaped = BytesText::new(text);
    String::from_utf8_lossy(escaped.as_ref()).into_owned()
}

/// `true` iff `settings_xml` has `<w:updateFields w:val="true"/>` (or any
/// truthy `w:val`) already set.
pub fn settings_has_update_fields(settings_xml: &[u8]) -> bool {
    let text = String::from_utf8_lossy(settings_xml);
    text.contains("w:updateFields") && (text.contains(r#"w:val="true""#) || text.contains(r#"w:val="1""#) || !text.contains("w:val"))
}

/// Decides whether the output should set `w:updateFields`, per the policy
/// in `options::UpdateFieldsOnOpen`.
pub fn resolve_update_fields(policy: UpdateFieldsOnOpen, document_has_fields: bool) -> bool {
    match policy {
        UpdateFieldsOnOpen::Always => true,
        UpdateFieldsOnOpen::Never => false,
        UpdateFieldsOnOpen::Auto => document_has_fields,
    }
}

/// Patches `settings_xml` (or synthesizes a minimal one if the template had
/// none) so `<w:updateFields w:val="..."/>` reflects `enabled`.
pub fn render_settings(settings_xml: Option<&[u8]>, enabled: bool) -> Vec<u8> {
    let val = if enabled { "true" } else { "false" };
    match settings_xml {
        Some(xml) => {
            let text = String::from_utf8_lossy(xml).into_owned();
            if text.contains("w:updateFields") {
                replace_update_fields_val(&text, val).into_bytes()
            } else {
                insert_update_fields(&text, val).into_bytes()
            }
        }
        None => format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:settings xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:updateFields w:val="{val}"/></w:settings>"#
        )
        .into_bytes(),
    }
}

fn replace_update_fields_val(text: &str, val: &str) -> String {
    if let Some(start) = text.find("<w:updateFields") {
        if let Some(end_rel) = text[start..].find('>') {
            let end = start + end_rel + 1;
            let tag = &text[start..end];
            let replaced = if tag.contains("w:val=") {
                let before = &tag[..tag.find("w:val=").unwrap()];
                let after_quote_start = tag.find("w:val=").unwrap() + "w:val=\"".len();
                let after_close = tag[after_quote_start..].find('"').map(|i| after_quote_start + i + 1).unwrap_or(tag.len());
                format!("{before}w:val=\"{val}\"{}", &tag[after_close..])
            } else {
                format!("{}{}", &tag[..tag.len() - 1].trim_end_matches("/>"), format!(" w:val=\"{val}\"/>"))
            };
            return format!("{}{}{}", &text[..start], replaced, &text[end..]);
        }
    }
    text.to_string()
}

fn insert_update_fields(text: &str, val: &str) -> String {
    if let Some(pos) = text.find("<w:settings") {
        if let Some(end_rel) = text[pos..].find('>') {
            let insert_at = pos + end_rel + 1;
            return format!("{}<w:updateFields w:val=\"{val}\"/>{}", &text[..insert_at], &text[insert_at..]);
        }
    }
    text.to_string()
}
