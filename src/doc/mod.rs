//! The document tree and its OOXML codec.
//!
//! [`model`] is the typed tree the transformer mutates; [`reader`] builds one
//! from a `.docx` package; [`writer`] serializes a mutated tree back into a
//! package, copying every part the tree doesn't model byte-for-byte.
//! [`properties`] covers `docProps/core.xml` and the `word/settings.xml`
//! "refresh fields on open" flag.

pub mod model;
pub mod properties;
pub mod reader;
pub mod writer;

use model::Body;
use properties::CoreProperties;

/// A loaded template package: the typed body the transformer mutates, plus
/// everything needed to write a complete package back out.
pub struct Document {
    pub body: Body,
    pub properties: CoreProperties,
    pub update_fields_on_open: bool,
    /// Raw bytes of `word/document.xml` up to and including the opening
    /// `<w:body...>` tag, preserved verbatim so namespace declarations and
    /// any processing instructions on the document element survive
    /// untouched.
    pub(crate) document_prefix: Vec<u8>,
    /// Raw bytes of `word/document.xml` from `</w:body>` to the end of the
    /// file (the closing tag and anything the body element doesn't own,
    /// e.g. a body-level `w:sectPr` that reader.rs already folded into
    /// `body` is NOT here; this is purely the literal closing markup).
    pub(crate) document_suffix: Vec<u8>,
    /// Every other ZIP entry (media, styles, headers/footers, relationship
    /// parts, `[Content_Types].xml`, …), copied through untouched.
    pub(crate) other_parts: Vec<(String, Vec<u8>)>,
    /// Raw `word/settings.xml` bytes, if the package had one, used as a
    /// template for patching the `w:updateFields` flag on write.
    pub(crate) settings_xml: Option<Vec<u8>>,
    /// Whether the original `word/document.xml` contained a field (TOC,
    /// PAGE, REF, …) of any kind, detected from the raw bytes before
    /// parsing since this crate's body model doesn't represent fields.
    /// Drives [`crate::options::UpdateFieldsOnOpen::Auto`].
    pub(crate) document_had_fields: bool,
    /// Whether `document_prefix` already declares the `w14` namespace
    /// (present on any document that has ever carried a `w14:paraId`).
    /// The writer only emits remapped `w14:paraId` attributes when this is
    /// set, so it never introduces a use of an undeclared namespace prefix
    /// into a document that never had one.
    pub(crate) declares_w14_namespace: bool,
}
