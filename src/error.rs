//! Crate-wide error types.
//!
//! [`Error`] covers document-shape failures (the input isn't a readable OOXML
//! package, the data context isn't valid JSON) and wraps [`TemplateError`] for
//! structural template failures. Data-binding misses (missing variables,
//! missing/null loop collections) are never represented here; they are routed
//! through the warning collector (see [`crate::result`]).

use std::path::PathBuf;

/// Top-level crate error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The template package could not be read or written as a ZIP container.
    #[error("zip container error: {0}")]
    Zip(#[from] zip::result::ZipError),
    /// An XML part inside the package could not be parsed or serialized.
    #[error("xml error in {part}: {source}")]
    Xml {
        /// The package-relative path of the offending part.
        part: String,
        /// The underlying parse error.
        #[source]
        source: quick_xml::Error,
    },
    /// The supplied data context was not valid JSON, or its root was not an object.
    #[error("invalid data context: {0}")]
    Json(#[from] serde_json::Error),
    /// The JSON data context's root value was not an object.
    #[error("data context root must be a JSON object")]
    NonObjectRoot,
    /// A filesystem operation failed (CLI glue only).
    #[error("io error reading {path}: {source}")]
    Io {
        /// The path that could not be read or written.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The template failed structural validation and cannot be processed.
    #[error(transparent)]
    Template(#[from] TemplateError),
    /// `missing_variable_behavior = fail` and a variable could not be resolved.
    #[error("missing variable '{0}'")]
    MissingVariableFatal(String),
    /// A part the codec requires was absent from the package (e.g. no
    /// `word/document.xml`, or a `document.xml` with no `w:body`).
    #[error("missing required part: {0}")]
    MissingPart(String),
}

/// Structural errors produced by the block matcher and validator.
///
/// These are always fatal: a template that fails to parse structurally never
/// produces partial output (spec §7, "structural errors short-circuit the
/// whole transform").
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    /// A `{{#if}}` had no matching `{{/if}}` in the same container.
    #[error("unmatched '{{{{#if}}}}' at paragraph {0}")]
    UnmatchedConditionalStart(usize),
    /// A `{{/if}}` closed a block that was not an open conditional.
    #[error("unmatched '{{{{/if}}}}' at paragraph {0}")]
    UnmatchedConditionalEnd(usize),
    /// A `{{#foreach}}` had no matching `{{/foreach}}` in the same container.
    #[error("unmatched '{{{{#foreach}}}}' at paragraph {0}")]
    UnmatchedLoopStart(usize),
    /// A `{{/foreach}}` closed a block that was not an open loop.
    #[error("unmatched '{{{{/foreach}}}}' at paragraph {0}")]
    UnmatchedLoopEnd(usize),
    /// `{{else}}` appeared after an `{{#else}}` branch in the same if-block.
    #[error("'{{{{else}}}}' after '{{{{else}}}}' at paragraph {0}")]
    ElseAfterElse(usize),
    /// `{{#elseif}}` appeared after an `{{#else}}` branch in the same if-block.
    #[error("'{{{{#elseif}}}}' after '{{{{#else}}}}' at paragraph {0}")]
    ElseIfAfterElse(usize),
    /// A `{{#foreach ident in path}}` used a reserved iteration-variable name.
    #[error("invalid iteration variable name '{0}' at paragraph {1}")]
    InvalidIterationVariableName(String, usize),
    /// A `{{` token had no matching `}}` within its paragraph.
    #[error("unterminated token starting at paragraph {0}, run {1}")]
    UnterminatedToken(usize, usize),
    /// `missing_variable_behavior = fail` during validation found a placeholder
    /// with no resolvable path.
    #[error("missing variable '{0}' at paragraph {1}")]
    MissingVariable(String, usize),
}

impl From<crate::token::TokenError> for TemplateError {
    fn from(err: crate::token::TokenError) -> Self {
        match err {
            crate::token::TokenError::Unterminated(run, offset) => TemplateError::UnterminatedToken(run, offset),
        }
    }
}

impl From<crate::token::TokenError> for Error {
    fn from(err: crate::token::TokenError) -> Self {
        Error::Template(err.into())
    }
}
