//! Serializes a (possibly transformed) [`super::Document`] back into a
//! `.docx` package.
//!
//! `word/document.xml` is rebuilt as `document_prefix + body + suffix`
//! (SPEC_FULL.md §3); every other part is written back byte-for-byte except
//! `docProps/core.xml` and `word/settings.xml`, which are regenerated from
//! the (possibly overridden) [`super::properties::CoreProperties`] and the
//! resolved "update fields on open" flag.

use super::model::{Body, BodyBlock, Break, Cell, NumberingRef, Paragraph, Row, Run, RunProperties, Table};
use super::properties;
use super::Document;
use crate::error::Error;
use crate::options::Options;

/// Serializes `document` into a complete `.docx` ZIP archive, applying
/// `options.document_properties` overrides and resolving the
/// `update_fields_on_open` policy against the parts the reader already
/// recorded.
pub fn write_package(document: &Document, options: &Options) -> Result<Vec<u8>, Error> {
    let document_xml = render_document_xml(document);
    let core_properties = document.properties.with_overrides(&options.document_properties);
    let core_xml = properties::render_core_properties(&core_properties);
    let update_fields = properties::resolve_update_fields(options.update_fields_on_open, document.document_had_fields);
    let settings_xml = properties::render_settings(document.settings_xml.as_deref(), update_fields);

    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        let file_options = zip::write::SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        write_part(&mut zip, file_options, "word/document.xml", &document_xml)?;
        write_part(&mut zip, file_options, "docProps/core.xml", &core_xml)?;
        write_part(&mut zip, file_options, "word/settings.xml", &settings_xml)?;
        for (name, data) in &document.other_parts {
            write_part(&mut zip, file_options, name, data)?;
        }
        zip.finish()?;
    }
    Ok(buf)
}

fn write_part<W: std::io::Write + std::io::Seek>(
    zip: &mut zip::ZipWriter<W>,
    options: zip::write::SimpleFileOptions,
    name: &str,
    data: &[u8],
) -> Result<(), Error> {
    zip.start_file(name, options)?;
    std::io::Write::write_all(zip, data).map_err(|source| Error::Io { path: name.into(), source })?;
    Ok(())
}

fn render_document_xml(document: &Document) -> Vec<u8> {
    let mut out = String::new();
    out.push_str(&String::from_utf8_lossy(&document.document_prefix));
    render_body(&document.body, document.declares_w14_namespace, &mut out);
    out.push_str(&String::from_utf8_lossy(&document.document_suffix));
    out.into_bytes()
}

fn render_body(body: &Body, emit_para_id: bool, out: &mut String) {
    for block in &body.blocks {
        render_block(block, emit_para_id, out);
    }
}

fn render_block(block: &BodyBlock, emit_para_id: bool, out: &mut String) {
    match block {
        BodyBlock::Paragraph(para) => render_paragraph(para, emit_para_id, out),
        BodyBlock::Table(table) => render_table(table, emit_para_id, out),
        BodyBlock::Passthrough(raw) => out.push_str(raw),
    }
}

/// Emits the paragraph's remapped `w14:paraId` (spec.md §9, "ID rewriting on
/// clone") only when the source document already declared the `w14`
/// namespace, so a document that never used revision-tracking paragraph IDs
/// doesn't gain a reference to an undeclared namespace prefix.
fn render_paragraph(para: &Paragraph, emit_para_id: bool, out: &mut String) {
    out.push_str("<w:p");
    if emit_para_id {
        out.push_str(&format!(r#" w14:paraId="{:08X}""#, para.id));
    }
    out.push('>');
    render_paragraph_properties(para, out);
    for bookmark in &para.bookmarks {
        out.push_str(&format!(r#"<w:bookmarkStart w:id="{}" w:name="{}"/>"#, bookmark.id, escape_attr(&bookmark.name)));
        out.push_str(&format!(r#"<w:bookmarkEnd w:id="{}"/>"#, bookmark.id));
    }
    for run in &para.runs {
        render_run(run, out);
    }
    out.push_str("</w:p>");
}

fn render_paragraph_properties(para: &Paragraph, out: &mut String) {
    let has_props = para.properties.numbering.is_some() || para.properties.style.is_some() || para.properties.alignment.is_some();
    if !has_props {
        return;
    }
    out.push_str("<w:pPr>");
    if let Some(style) = &para.properties.style {
        out.push_str(&format!(r#"<w:pStyle w:val="{}"/>"#, escape_attr(style)));
    }
    if let Some(NumberingRef { num_id, ilvl }) = para.properties.numbering {
        out.push_str(&format!(r#"<w:numPr><w:ilvl w:val="{ilvl}"/><w:numId w:val="{num_id}"/></w:numPr>"#));
    }
    if let Some(alignment) = &para.properties.alignment {
        out.push_str(&format!(r#"<w:jc w:val="{}"/>"#, escape_attr(alignment)));
    }
    out.push_str("</w:pPr>");
}

fn render_run(run: &Run, out: &mut String) {
    out.push_str("<w:r>");
    render_run_properties(&run.properties, out);
    for br in &run.breaks_before {
        match br {
            Break::Line => out.push_str("<w:br/>"),
            Break::Page => out.push_str(r#"<w:br w:type="page"/>"#),
        }
    }
    out.push_str(r#"<w:t xml:space="preserve">"#);
    out.push_str(&escape_text(&run.text));
    out.push_str("</w:t>");
    out.push_str("</w:r>");
}

fn render_run_properties(props: &RunProperties, out: &mut String) {
    let has_props = props.bold
        || props.italic
        || props.strike
        || props.underline
        || props.color.is_some()
        || props.highlight.is_some()
        || props.shading.is_some()
        || props.font.is_some()
        || props.size_half_points.is_some();
    if !has_props {
        return;
    }
    out.push_str("<w:rPr>");
    if props.bold {
        out.push_str("<w:b/>");
    }
    if props.italic {
        out.push_str("<w:i/>");
    }
    if props.strike {
        out.push_str("<w:strike/>");
    }
    if props.underline {
        out.push_str(r#"<w:u w:val="single"/>"#);
    }
    if let Some(color) = &props.color {
        out.push_str(&format!(r#"<w:color w:val="{}"/>"#, escape_attr(&color.0)));
    }
    if let Some(highlight) = &props.highlight {
        out.push_str(&format!(r#"<w:highlight w:val="{}"/>"#, escape_attr(highlight)));
    }
    if let Some(shading) = &props.shading {
        out.push_str(&format!(r#"<w:shd w:val="clear" w:fill="{}"/>"#, escape_attr(&shading.fill)));
    }
    if let Some(font) = &props.font {
        out.push_str(&format!(r#"<w:rFonts w:ascii="{0}" w:hAnsi="{0}"/>"#, escape_attr(&font.0)));
    }
    if let Some(size) = props.size_half_points {
        out.push_str(&format!(r#"<w:sz w:val="{size}"/>"#));
    }
    out.push_str("</w:rPr>");
}

fn render_table(table: &Table, emit_para_id: bool, out: &mut String) {
    out.push_str("<w:tbl>");
    for row in &table.rows {
        render_row(row, emit_para_id, out);
    }
    out.push_str("</w:tbl>");
}

fn render_row(row: &Row, emit_para_id: bool, out: &mut String) {
    out.push_str("<w:tr>");
    if row.properties.is_header {
        out.push_str("<w:trPr><w:tblHeader/></w:trPr>");
    }
    for cell in &row.cells {
        render_cell(cell, emit_para_id, out);
    }
    out.push_str("</w:tr>");
}

fn render_cell(cell: &Cell, emit_para_id: bool, out: &mut String) {
    out.push_str("<w:tc>");
    let has_props = cell.properties.shading.is_some() || cell.properties.grid_span.is_some();
    if has_props {
        out.push_str("<w:tcPr>");
        if let Some(span) = cell.properties.grid_span {
            out.push_str(&format!(r#"<w:gridSpan w:val="{span}"/>"#));
        }
        if let Some(shading) = &cell.properties.shading {
            out.push_str(&format!(r#"<w:shd w:val="clear" w:fill="{}"/>"#, escape_attr(&shading.fill)));
        }
        out.push_str("</w:tcPr>");
    }
    render_body(&cell.body, emit_para_id, out);
    out.push_str("</w:tc>");
}

fn escape_text(text: &str) -> String {
    quick_xml::escape::escape(text).into_owned()
}

fn escape_attr(text: &str) -> String {
    quick_xml::escape::escape(text).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc::reader;

    fn minimal_docx(body_xml: &str) -> Vec<u8> {
        let document = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body_xml}</w:body></w:document>"#
        );
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            let options = zip::write::SimpleFileOptions::default();
            zip.start_file("word/document.xml", options).unwrap();
            std::io::Write::write_all(&mut zip, document.as_bytes()).unwrap();
            zip.start_file("docProps/core.xml", options).unwrap();
            std::io::Write::write_all(
                &mut zip,
                br#"<?xml version="1.0"?><cp:coreProperties xmlns:cp="x" xmlns:dc="y"><dc:title>Orig</dc:title></cp:coreProperties>"#,
            )
            .unwrap();
            zip.finish().unwrap();
        }
        buf
    }

    fn roundtrip(body_xml: &str, options: &Options) -> Vec<u8> {
        let doc = reader::read_package(&minimal_docx(body_xml)).unwrap();
        write_package(&doc, options).unwrap()
    }

    fn extract_document_xml(package: &[u8]) -> String {
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(package)).unwrap();
        let mut file = archive.by_name("word/document.xml").unwrap();
        let mut data = String::new();
        std::io::Read::read_to_string(&mut file, &mut data).unwrap();
        data
    }

    #[test]
    fn roundtrips_plain_paragraph_text() {
        let package = roundtrip(r#"<w:p><w:r><w:t>Hello World</w:t></w:r></w:p>"#, &Options::default());
        let xml = extract_document_xml(&package);
        assert!(xml.contains("Hello World"));
        assert!(xml.contains("<w:body>"));
    }

    #[test]
    fn bold_property_is_written_back() {
        let package = roundtrip(r#"<w:p><w:r><w:rPr><w:b/></w:rPr><w:t>Bold</w:t></w:r></w:p>"#, &Options::default());
        let xml = extract_document_xml(&package);
        assert!(xml.contains("<w:b/>"));
    }

    #[test]
    fn passthrough_section_properties_survive() {
        let package = roundtrip(
            r#"<w:p><w:r><w:t>Text</w:t></w:r></w:p><w:sectPr><w:pgSz w:w="12240" w:h="15840"/></w:sectPr>"#,
            &Options::default(),
        );
        let xml = extract_document_xml(&package);
        assert!(xml.contains("w:sectPr"));
        assert!(xml.contains("w:pgSz"));
    }

    #[test]
    fn core_properties_round_trip_without_overrides() {
        let package = roundtrip(r#"<w:p><w:r><w:t>x</w:t></w:r></w:p>"#, &Options::default());
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(&package)).unwrap();
        let mut file = archive.by_name("docProps/core.xml").unwrap();
        let mut data = String::new();
        std::io::Read::read_to_string(&mut file, &mut data).unwrap();
        assert!(data.contains("Orig"));
    }

    fn minimal_docx_with_w14(body_xml: &str) -> Vec<u8> {
        let document = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" xmlns:w14="http://schemas.microsoft.com/office/word/2010/wordml"><w:body>{body_xml}</w:body></w:document>"#
        );
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            let options = zip::write::SimpleFileOptions::default();
            zip.start_file("word/document.xml", options).unwrap();
            std::io::Write::write_all(&mut zip, document.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        buf
    }

    #[test]
    fn para_id_is_remapped_and_rewritten_when_source_declares_w14() {
        let bytes = minimal_docx_with_w14(r#"<w:p w14:paraId="0000002A"><w:r><w:t>x</w:t></w:r></w:p>"#);
        let mut doc = reader::read_package(&bytes).unwrap();
        assert_eq!(doc.body.blocks.len(), 1);
        match &mut doc.body.blocks[0] {
            crate::doc::model::BodyBlock::Paragraph(p) => {
                assert_eq!(p.id, 0x2A);
                p.id = 0x99;
            }
            other => panic!("expected paragraph, got {other:?}"),
        }
        let package = write_package(&doc, &Options::default()).unwrap();
        let xml = extract_document_xml(&package);
        assert!(xml.contains(r#"w14:paraId="00000099""#));
    }

    #[test]
    fn para_id_is_not_emitted_when_source_never_declared_w14() {
        let package = roundtrip(r#"<w:p><w:r><w:t>x</w:t></w:r></w:p>"#, &Options::default());
        let xml = extract_document_xml(&package);
        assert!(!xml.contains("w14:paraId"));
    }
}
