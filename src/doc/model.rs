//! The typed document tree the transformer mutates.
//!
//! This is the concrete realization of the interface spec.md treats as
//! belonging to "the OOXML reader/writer" external collaborator: a reader
//! builds this tree from a package, the transformer mutates it in place, and
//! a writer serializes it back. Preserved run-properties are reference
//! counted (spec.md §9, "Run-property sharing") so cloning a loop body for
//! expansion never deep-copies formatting.
//!
//! Structural IDs the host reader needs unique (bookmark IDs, paragraph IDs
//! used for revision tracking) are distinguished from structural IDs that
//! must stay *shared* across clones (numbering references) — see
//! [`ParagraphProperties::numbering`] vs. [`Paragraph::id`].

use std::rc::Rc;

/// A stable per-paragraph identifier some readers use to correlate tracked
/// changes across revisions. Remapped to a fresh value whenever a paragraph
/// is cloned for loop expansion (spec.md §9, "ID rewriting on clone").
pub type ParaId = u32;

/// A bookmark start/end anchor. The `id` must be unique within the document;
/// cloning remaps it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bookmark {
    pub id: u32,
    pub name: String,
}

/// An explicit line or page break positioned immediately before a run's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Break {
    Line,
    Page,
}

/// RGB color, as it appears in `w:color`/`w:highlight`/`w:shd` attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Color(pub String);

/// A font reference (`w:rFonts`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontRef(pub String);

/// Cell/paragraph shading (`w:shd`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shading {
    pub fill: String,
}

/// A run's visual properties. Immutable once constructed and shared by
/// reference between the original run and every run the inline-value
/// renderer derives from it, except where markdown toggles bold/italic/
/// strike for a particular segment (see [`crate::render`]).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunProperties {
    pub bold: bool,
    pub italic: bool,
    pub strike: bool,
    pub underline: bool,
    pub color: Option<Color>,
    pub highlight: Option<String>,
    pub shading: Option<Shading>,
    pub font: Option<FontRef>,
    pub size_half_points: Option<u32>,
}

impl RunProperties {
    /// Returns a copy of `self` with bold/italic/strike overlaid by markdown
    /// toggles, leaving every other field (color, highlight, shading, font,
    /// size) untouched — spec.md §8's formatting-preservation property.
    pub fn with_markdown_overlay(&self, bold: bool, italic: bool, strike: bool) -> RunProperties {
        RunProperties {
            bold: self.bold ^ bold,
            italic: self.italic ^ italic,
            strike: self.strike ^ strike,
            ..self.clone()
        }
    }
}

/// A contiguous run of same-formatted text within a paragraph.
#[derive(Debug, Clone)]
pub struct Run {
    pub text: String,
    pub properties: Rc<RunProperties>,
    /// Breaks rendered immediately before `text` (used when a substituted
    /// value contains newlines and is split across several runs).
    pub breaks_before: Vec<Break>,
}

impl Run {
    pub fn new(text: impl Into<String>, properties: Rc<RunProperties>) -> Self {
        Run { text: text.into(), properties, breaks_before: Vec::new() }
    }
}

/// A shared list-numbering reference (`w:numId`/`w:ilvl`). Never remapped on
/// clone — list numbering must continue across cloned paragraphs (spec.md
/// §3 invariants, §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberingRef {
    pub num_id: u32,
    pub ilvl: u32,
}

/// Paragraph-level (non-run) properties.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParagraphProperties {
    pub numbering: Option<NumberingRef>,
    pub style: Option<String>,
    pub alignment: Option<String>,
}

/// A paragraph: an identity, paragraph properties, an ordered run sequence,
/// and any bookmarks anchored to it.
#[derive(Debug, Clone)]
pub struct Paragraph {
    pub id: ParaId,
    pub properties: ParagraphProperties,
    pub runs: Vec<Run>,
    pub bookmarks: Vec<Bookmark>,
}

impl Paragraph {
    /// The paragraph's text with all run text concatenated, used by the
    /// marker-only-paragraph check (spec.md §4.2).
    pub fn text(&self) -> String {
        self.runs.iter().map(|r| r.text.as_str()).collect()
    }
}

/// Row-level properties (e.g. "repeat as header row").
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowProperties {
    pub is_header: bool,
}

/// Cell-level properties (shading, span).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CellProperties {
    pub shading: Option<Shading>,
    pub grid_span: Option<u32>,
}

/// A table cell; its body may itself contain paragraphs and nested tables.
#[derive(Debug, Clone)]
pub struct Cell {
    pub properties: CellProperties,
    pub body: Body,
}

/// A table row.
#[derive(Debug, Clone)]
pub struct Row {
    pub properties: RowProperties,
    pub cells: Vec<Cell>,
}

/// A table.
#[derive(Debug, Clone)]
pub struct Table {
    pub rows: Vec<Row>,
}

/// One block-level unit within a [`Body`].
#[derive(Debug, Clone)]
pub enum BodyBlock {
    Paragraph(Paragraph),
    Table(Table),
    /// An opaque passthrough fragment (section properties, and anything else
    /// the reader doesn't model) carried byte-for-byte through the pipeline.
    Passthrough(String),
}

/// An ordered sequence of block-level content: the document body, or a table
/// cell's contents.
#[derive(Debug, Clone, Default)]
pub struct Body {
    pub blocks: Vec<BodyBlock>,
}

impl Body {
    pub fn new(blocks: Vec<BodyBlock>) -> Self {
        Body { blocks }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paragraph_text_concatenates_runs() {
        let props = Rc::new(RunProperties::default());
        let para = Paragraph {
            id: 1,
            properties: ParagraphProperties::default(),
            runs: vec![Run::new("Hello ", Rc::clone(&props)), Run::new("World", props)],
            bookmarks: vec![],
        };
        assert_eq!(para.text(), "Hello World");
    }

    #[test]
    fn markdown_overlay_leaves_other_fields_untouched() {
        let props = RunProperties {
            bold: false,
            color: Some(Color("FF0000".into())),
            ..Default::default()
        };
        let overlaid = props.with_markdown_overlay(true, false, false);
        assert!(overlaid.bold);
        assert_eq!(overlaid.color, Some(Color("FF0000".into())));
    }
}
