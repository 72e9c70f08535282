//! Fills `.docx` Word templates from a JSON data context: placeholders,
//! conditionals, loops, and inline formatting, preserving everything about
//! the original document this crate doesn't need to change (spec.md §1).
//!
//! [`process`] and [`validate`] are the two public entry points; everything
//! else is organized around the pipeline they drive: [`token`] finds marker
//! syntax inside a paragraph's runs, [`block`] pairs markers into a nested
//! span tree, [`expr`]/[`path`] parse and resolve placeholder/condition
//! text against a [`scope::Scope`], [`transform`] walks the span tree to
//! produce the filled document, and [`doc`] is the OOXML codec it all sits
//! on top of.

pub mod block;
pub mod doc;
pub mod error;
pub mod expr;
pub mod facade;
pub mod format;
pub mod options;
pub mod path;
pub mod render;
pub mod report;
pub mod result;
pub mod scope;
pub mod token;
pub mod transform;
pub mod validate;
pub mod value;

pub use error::{Error, TemplateError};
pub use facade::{process, validate as validate_template};
pub use options::{DocumentPropertyOverrides, MissingVariableBehavior, Options, UpdateFieldsOnOpen};
pub use result::{ProcessingResult, ValidationResult, Warning};
