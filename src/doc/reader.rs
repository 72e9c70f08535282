//! Reads a `.docx` package into a [`super::Document`].
//!
//! Parses `word/document.xml`'s body element into the typed tree
//! (paragraphs, runs, tables); everything else — media, styles,
//! headers/footers, relationship parts, and any body-level element this
//! crate doesn't model (most commonly `w:sectPr`) — is kept as an opaque
//! byte blob so the writer can put it back untouched (SPEC_FULL.md §3,
//! "Expansion — OOXML codec").

use super::model::{Body, BodyBlock, Bookmark, Break, Cell, CellProperties, Color, FontRef, NumberingRef, ParaId, Paragraph, ParagraphProperties, Row, RowProperties, Run, RunProperties, Shading, Table};
use super::properties;
use super::Document;
use crate::error::Error;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::io::Read;
use std::rc::Rc;

const PART: &str = "word/document.xml";

fn xerr(source: quick_xml::Error) -> Error {
    Error::Xml { part: PART.to_string(), source }
}

/// Reads an entire `.docx` package from `bytes`.
pub fn read_package(bytes: &[u8]) -> Result<Document, Error> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))?;
    let mut document_xml: Option<Vec<u8>> = None;
    let mut core_xml: Option<Vec<u8>> = None;
    let mut settings_xml: Option<Vec<u8>> = None;
    let mut other_parts = Vec::new();

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        let name = file.name().to_string();
        let mut data = Vec::new();
        file.read_to_end(&mut data).map_err(|source| Error::Io { path: name.clone().into(), source })?;
        match name.as_str() {
            "word/document.xml" => document_xml = Some(data),
            "docProps/core.xml" => core_xml = Some(data),
            "word/settings.xml" => settings_xml = Some(data),
            _ => other_parts.push((name, data)),
        }
    }

    let document_had_fields = contains_field(&document_xml);
    let document_xml_input = document_xml;
    let (document_prefix, body, document_suffix) = parse_document_xml(&document_xml_input)?;
    let declares_w14_namespace = String::from_utf8_lossy(&document_prefix).contains("xmlns:w14");
    let properties = match &core_xml {
        Some(xml) => properties::parse_core_properties(xml)?,
        None => properties::CoreProperties::default(),
    };
    let update_fields_on_open = settings_xml.as_deref().map(properties::settings_has_update_fields).unwrap_or(false);

    Ok(Document {
        body,
        properties,
        update_fields_on_open,
        document_prefix,
        document_suffix,
        other_parts,
        settings_xml,
        document_had_fields,
        declares_w14_namespace,
    })
}

/// Parses a `w14:paraId` attribute value (8 hex digits) off a `<w:p>` start
/// tag. Absent or unparsable on a paragraph the source never tagged.
fn para_id(e: &BytesStart) -> ParaId {
    attr_val(e, b"paraId").and_then(|v| u32::from_str_radix(&v, 16).ok()).unwrap_or(0)
}

/// This crate's body model doesn't represent Word fields at all, so field
/// presence is detected directly from the unparsed bytes rather than from
/// the parsed tree.
fn contains_field(xml: &[u8]) -> bool {
    let text = String::from_utf8_lossy(xml);
    text.contains("w:fldSimple") || text.contains("w:instrText") || text.contains("w:fldChar")
}

/// Splits `word/document.xml` around its `w:body` element, preserving the
/// prefix (document element open tag plus namespace declarations) and
/// suffix (the closing tags) verbatim, and parses the body content in
/// between.
fn parse_document_xml(xml: &[u8]) -> Result<(Vec<u8>, Body, Vec<u8>), Error> {
    let body_open = find_subslice(xml, b"<w:body").ok_or_else(|| Error::MissingPart("w:body element".to_string()))?;
    let body_open_end = xml[body_open..]
        .iter()
        .position(|&b| b == b'>')
        .map(|p| body_open + p + 1)
        .ok_or_else(|| Error::MissingPart("w:body opening tag".to_string()))?;
    let body_close = find_subslice(xml, b"</w:body>").ok_or_else(|| Error::MissingPart("w:body closing tag".to_string()))?;

    let prefix = xml[..body_open_end].to_vec();
    let suffix = xml[body_close..].to_vec();
    let inner = &xml[body_open_end..body_close];

    let mut reader = Reader::from_reader(inner);
    let mut buf = Vec::new();
    let blocks = parse_body_blocks(&mut reader, inner, &mut buf)?;
    Ok((prefix, Body::new(blocks), suffix))
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn local_name_is(e: &BytesStart, name: &[u8]) -> bool {
    e.local_name().as_ref() == name
}

fn attr_val(e: &BytesStart, name: &[u8]) -> Option<String> {
    e.attributes().flatten().find(|a| a.key.local_name().as_ref() == name).and_then(|a| a.unescape_value().ok()).map(|s| s.into_owned())
}

fn attr_bool_or_true(e: &BytesStart) -> bool {
    match attr_val(e, b"val") {
        Some(v) => v != "false" && v != "0",
        None => true,
    }
}

/// Reads the direct block-level children of `word/document.xml`'s body —
/// paragraphs and tables are modeled; anything else is captured whole as a
/// [`BodyBlock::Passthrough`].
fn parse_body_blocks(reader: &mut Reader<&[u8]>, original: &[u8], buf: &mut Vec<u8>) -> Result<Vec<BodyBlock>, Error> {
    let mut blocks = Vec::new();
    loop {
        let before = reader.buffer_position();
        match reader.read_event_into(buf).map_err(xerr)? {
            Event::Start(e) if local_name_is(&e, b"p") => {
                let id = para_id(&e);
                blocks.push(BodyBlock::Paragraph(parse_paragraph(reader, buf, id)?));
            }
            Event::Start(e) if local_name_is(&e, b"tbl") => blocks.push(BodyBlock::Table(parse_table(reader, original, buf)?)),
            Event::Empty(e) if local_name_is(&e, b"p") => blocks.push(BodyBlock::Paragraph(empty_paragraph(para_id(&e)))),
            Event::Start(e) => {
                let name = e.local_name().as_ref().to_vec();
                let raw = skip_and_capture(reader, original, before as usize, &name)?;
                blocks.push(BodyBlock::Passthrough(raw));
            }
            Event::Empty(_) => {
                let end = reader.buffer_position() as usize;
                blocks.push(BodyBlock::Passthrough(String::from_utf8_lossy(&original[before as usize..end]).into_owned()));
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(blocks)
}

fn empty_paragraph(id: ParaId) -> Paragraph {
    Paragraph { id, properties: ParagraphProperties::default(), runs: Vec::new(), bookmarks: Vec::new() }
}

/// Reads events until the matching close tag of `name`, returning the raw
/// source bytes of the whole subtree (open tag through close tag) so it can
/// be written back byte-for-byte.
fn skip_and_capture(reader: &mut Reader<&[u8]>, original: &[u8], start_offset: usize, name: &[u8]) -> Result<String, Error> {
    let mut depth = 1u32;
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf).map_err(xerr)? {
            Event::Start(e) if e.local_name().as_ref() == name => depth += 1,
            Event::End(e) if e.local_name().as_ref() == name => {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    let end_offset = reader.buffer_position() as usize;
    Ok(String::from_utf8_lossy(&original[start_offset..end_offset]).into_owned())
}

fn skip_to_end(reader: &mut Reader<&[u8]>, name: &[u8]) -> Result<(), Error> {
    let mut depth = 1u32;
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf).map_err(xerr)? {
            Event::Start(e) if e.local_name().as_ref() == name => depth += 1,
            Event::End(e) if e.local_name().as_ref() == name => {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(())
}

fn parse_paragraph(reader: &mut Reader<&[u8]>, buf: &mut Vec<u8>, id: ParaId) -> Result<Paragraph, Error> {
    let mut properties = ParagraphProperties::default();
    let mut runs = Vec::new();
    let mut bookmarks = Vec::new();
    let mut wrapper_depth = 0u32;

    loop {
        match reader.read_event_into(buf).map_err(xerr)? {
            Event::Start(e) if wrapper_depth == 0 && local_name_is(&e, b"pPr") => {
                properties = parse_paragraph_properties(reader, buf)?;
            }
            Event::Start(e) if local_name_is(&e, b"r") => {
                runs.extend(parse_run(reader, buf)?);
            }
            Event::Empty(e) if local_name_is(&e, b"bookmarkStart") => {
                if let Some(id) = attr_val(&e, b"id").and_then(|v| v.parse().ok()) {
                    bookmarks.push(Bookmark { id, name: attr_val(&e, b"name").unwrap_or_default() });
                }
            }
            Event::Empty(e) if local_name_is(&e, b"bookmarkEnd") => {}
            Event::End(e) if wrapper_depth == 0 && local_name_is(&e, b"p") => break,
            Event::Start(_) => wrapper_depth += 1,
            Event::End(_) => {
                if wrapper_depth > 0 {
                    wrapper_depth -= 1;
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(Paragraph { id, properties, runs, bookmarks })
}

fn parse_paragraph_properties(reader: &mut Reader<&[u8]>, buf: &mut Vec<u8>) -> Result<ParagraphProperties, Error> {
    let mut props = ParagraphProperties::default();
    let mut depth = 0u32;
    loop {
        match reader.read_event_into(buf).map_err(xerr)? {
            Event::Start(e) if depth == 0 && local_name_is(&e, b"numPr") => {
                let (ilvl, num_id) = parse_num_pr(reader, buf)?;
                if let (Some(ilvl), Some(num_id)) = (ilvl, num_id) {
                    props.numbering = Some(NumberingRef { num_id, ilvl });
                }
            }
            Event::Empty(e) if depth == 0 => match e.local_name().as_ref() {
                b"pStyle" => props.style = attr_val(&e, b"val"),
                b"jc" => props.alignment = attr_val(&e, b"val"),
                _ => {}
            },
            Event::End(e) if depth == 0 && local_name_is(&e, b"pPr") => break,
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                if depth > 0 {
                    depth -= 1;
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(props)
}

fn parse_num_pr(reader: &mut Reader<&[u8]>, buf: &mut Vec<u8>) -> Result<(Option<u32>, Option<u32>), Error> {
    let mut ilvl = None;
    let mut num_id = None;
    loop {
        match reader.read_event_into(buf).map_err(xerr)? {
            Event::Empty(e) => match e.local_name().as_ref() {
                b"ilvl" => ilvl = attr_val(&e, b"val").and_then(|v| v.parse().ok()),
                b"numId" => num_id = attr_val(&e, b"val").and_then(|v| v.parse().ok()),
                _ => {}
            },
            Event::End(e) if local_name_is(&e, b"numPr") => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok((ilvl, num_id))
}

fn parse_run(reader: &mut Reader<&[u8]>, buf: &mut Vec<u8>) -> Result<Vec<Run>, Error> {
    let mut properties = Rc::new(RunProperties::default());
    let mut runs = Vec::new();
    let mut pending_breaks = Vec::new();
    let mut pending_text = String::new();
    let mut wrapper_depth = 0u32;

    loop {
        match reader.read_event_into(buf).map_err(xerr)? {
            Event::Start(e) if wrapper_depth == 0 && local_name_is(&e, b"rPr") => {
                properties = Rc::new(parse_run_properties(reader, buf)?);
            }
            Event::Start(e) if local_name_is(&e, b"t") => {
                let text = read_text_content(reader, buf)?;
                let full = std::mem::take(&mut pending_text) + &text;
                let mut run = Run::new(full, Rc::clone(&properties));
                run.breaks_before = std::mem::take(&mut pending_breaks);
                runs.push(run);
            }
            Event::Empty(e) if local_name_is(&e, b"br") => {
                let is_page = attr_val(&e, b"type").as_deref() == Some("page");
                pending_breaks.push(if is_page { Break::Page } else { Break::Line });
            }
            Event::Empty(e) if local_name_is(&e, b"tab") => {
                pending_text.push('\t');
            }
            Event::End(e) if wrapper_depth == 0 && local_name_is(&e, b"r") => break,
            Event::Start(_) => wrapper_depth += 1,
            Event::End(_) => {
                if wrapper_depth > 0 {
                    wrapper_depth -= 1;
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !pending_text.is_empty() || !pending_breaks.is_empty() {
        let mut run = Run::new(pending_text, Rc::clone(&properties));
        run.breaks_before = pending_breaks;
        runs.push(run);
    }
    if runs.is_empty() {
        runs.push(Run::new(String::new(), properties));
    }
    Ok(runs)
}

fn read_text_content(reader: &mut Reader<&[u8]>, buf: &mut Vec<u8>) -> Result<String, Error> {
    let mut text = String::new();
    loop {
        match reader.read_event_into(buf).map_err(xerr)? {
            Event::Text(t) => text.push_str(&t.unescape().map_err(xerr)?),
            Event::CData(t) => text.push_str(&String::from_utf8_lossy(t.as_ref())),
            Event::End(e) if local_name_is(&e, b"t") => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(text)
}

fn parse_run_properties(reader: &mut Reader<&[u8]>, buf: &mut Vec<u8>) -> Result<RunProperties, Error> {
    let mut props = RunProperties::default();
    let mut depth = 0u32;
    loop {
        match reader.read_event_into(buf).map_err(xerr)? {
            Event::Empty(e) if depth == 0 => apply_run_property(&mut props, &e),
            Event::End(e) if depth == 0 && local_name_is(&e, b"rPr") => break,
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                if depth > 0 {
                    depth -= 1;
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(props)
}

fn apply_run_property(props: &mut RunProperties, e: &BytesStart) {
    match e.local_name().as_ref() {
        b"b" => props.bold = attr_bool_or_true(e),
        b"i" => props.italic = attr_bool_or_true(e),
        b"strike" => props.strike = attr_bool_or_true(e),
        b"u" => props.underline = attr_val(e, b"val").map(|v| v != "none").unwrap_or(true),
        b"color" => props.color = attr_val(e, b"val").map(Color),
        b"highlight" => props.highlight = attr_val(e, b"val"),
        b"shd" => props.shading = attr_val(e, b"fill").map(|fill| Shading { fill }),
        b"rFonts" => props.font = attr_val(e, b"ascii").map(FontRef),
        b"sz" => props.size_half_points = attr_val(e, b"val").and_then(|v| v.parse().ok()),
        _ => {}
    }
}

fn parse_table(reader: &mut Reader<&[u8]>, original: &[u8], buf: &mut Vec<u8>) -> Result<Table, Error> {
    let mut rows = Vec::new();
    loop {
        match reader.read_event_into(buf).map_err(xerr)? {
            Event::Start(e) if local_name_is(&e, b"tr") => rows.push(parse_row(reader, original, buf)?),
            Event::Start(e) if local_name_is(&e, b"tblPr") => skip_to_end(reader, b"tblPr")?,
            Event::Start(e) if local_name_is(&e, b"tblGrid") => skip_to_end(reader, b"tblGrid")?,
            Event::End(e) if local_name_is(&e, b"tbl") => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(Table { rows })
}

fn parse_row(reader: &mut Reader<&[u8]>, original: &[u8], buf: &mut Vec<u8>) -> Result<Row, Error> {
    let mut properties = RowProperties::default();
    let mut cells = Vec::new();
    loop {
        match reader.read_event_into(buf).map_err(xerr)? {
            Event::Start(e) if local_name_is(&e, b"trPr") => properties = parse_row_properties(reader, buf)?,
            Event::Start(e) if local_name_is(&e, b"tc") => cells.push(parse_cell(reader, original, buf)?),
            Event::End(e) if local_name_is(&e, b"tr") => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(Row { properties, cells })
}

fn parse_row_properties(reader: &mut Reader<&[u8]>, buf: &mut Vec<u8>) -> Result<RowProperties, Error> {
    let mut props = RowProperties::default();
    loop {
        match reader.read_event_into(buf).map_err(xerr)? {
            Event::Start(e) | Event::Empty(e) if local_name_is(&e, b"tblHeader") => props.is_header = true,
            Event::End(e) if local_name_is(&e, b"trPr") => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(props)
}

fn parse_cell(reader: &mut Reader<&[u8]>, original: &[u8], buf: &mut Vec<u8>) -> Result<Cell, Error> {
    let mut properties = CellProperties::default();
    let mut blocks = Vec::new();
    loop {
        let before = reader.buffer_position();
        match reader.read_event_into(buf).map_err(xerr)? {
            Event::Start(e) if local_name_is(&e, b"tcPr") => properties = parse_cell_properties(reader, buf)?,
            Event::Start(e) if local_name_is(&e, b"p") => {
                let id = para_id(&e);
                blocks.push(BodyBlock::Paragraph(parse_paragraph(reader, buf, id)?));
            }
            Event::Start(e) if local_name_is(&e, b"tbl") => blocks.push(BodyBlock::Table(parse_table(reader, original, buf)?)),
            Event::Empty(e) if local_name_is(&e, b"p") => blocks.push(BodyBlock::Paragraph(empty_paragraph(para_id(&e)))),
            Event::Start(e) => {
                let name = e.local_name().as_ref().to_vec();
                let raw = skip_and_capture(reader, original, before as usize, &name)?;
                blocks.push(BodyBlock::Passthrough(raw));
            }
            Event::End(e) if local_name_is(&e, b"tc") => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(Cell { properties, body: Body::new(blocks) })
}

fn parse_cell_properties(reader: &mut Reader<&[u8]>, buf: &mut Vec<u8>) -> Result<CellProperties, Error> {
    let mut props = CellProperties::default();
    loop {
        match reader.read_event_into(buf).map_err(xerr)? {
            Event::Empty(e) => match e.local_name().as_ref() {
                b"shd" => props.shading = attr_val(&e, b"fill").map(|fill| Shading { fill }),
                b"gridSpan" => props.grid_span = attr_val(&e, b"val").and_then(|v| v.parse().ok()),
                _ => {}
            },
            Event::End(e) if local_name_is(&e, b"tcPr") => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(props)
}

#[cfg(test)]
mod tests {
    use super::*;

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
            zip.finish().unwrap();
        }
        buf
    }

    #[test]
    fn reads_plain_paragraph_text() {
        let bytes = minimal_docx(r#"<w:p><w:r><w:t>Hello World</w:t></w:r></w:p>"#);
        let doc = read_package(&bytes).unwrap();
        assert_eq!(doc.body.blocks.len(), 1);
        match &doc.body.blocks[0] {
            BodyBlock::Paragraph(p) => assert_eq!(p.text(), "Hello World"),
            other => panic!("expected paragraph, got {other:?}"),
        }
    }

    #[test]
    fn reads_bold_run_property() {
        let bytes = minimal_docx(r#"<w:p><w:r><w:rPr><w:b/></w:rPr><w:t>Bold</w:t></w:r></w:p>"#);
        let doc = read_package(&bytes).unwrap();
        match &doc.body.blocks[0] {
            BodyBlock::Paragraph(p) => assert!(p.runs[0].properties.bold),
            other => panic!("expected paragraph, got {other:?}"),
        }
    }

    #[test]
    fn unmodeled_body_element_becomes_passthrough() {
        let bytes = minimal_docx(r#"<w:p><w:r><w:t>Text</w:t></w:r></w:p><w:sectPr><w:pgSz w:w="12240" w:h="15840"/></w:sectPr>"#);
        let doc = read_package(&bytes).unwrap();
        assert_eq!(doc.body.blocks.len(), 2);
        match &doc.body.blocks[1] {
            BodyBlock::Passthrough(raw) => assert!(raw.contains("w:sectPr")),
            other => panic!("expected passthrough, got {other:?}"),
        }
    }

    #[test]
    fn reads_table_with_nested_paragraph() {
        let bytes = minimal_docx(
            r#"<w:tbl><w:tr><w:tc><w:p><w:r><w:t>Cell</w:t></w:r></w:p></w:tc></w:tr></w:tbl>"#,
        );
        let doc = read_package(&bytes).unwrap();
        match &doc.body.blocks[0] {
            BodyBlock::Table(t) => {
                assert_eq!(t.rows.len(), 1);
                assert_eq!(t.rows[0].cells.len(), 1);
            }
            other => panic!("expected table, got {other:?}"),
        }
    }

    #[test]
    fn newline_break_is_recorded_on_following_run() {
        let bytes = minimal_docx(r#"<w:p><w:r><w:t>line1</w:t><w:br/><w:t>line2</w:t></w:r></w:p>"#);
        let doc = read_package(&bytes).unwrap();
        match &doc.body.blocks[0] {
            BodyBlock::Paragraph(p) => {
                assert_eq!(p.runs.len(), 2);
                assert_eq!(p.runs[1].breaks_before, vec![Break::Line]);
            }
            other => panic!("expected paragraph, got {other:?}"),
        }
    }
}
