//! Caller-facing configuration for `process`/`validate` (spec.md §6).

use crate::format::{BooleanFormatters, Culture};

/// What to do when a placeholder's path cannot be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingVariableBehavior {
    /// Keep the placeholder's original source text untouched (the default).
    #[default]
    LeaveUnchanged,
    /// Substitute an empty string.
    ReplaceEmpty,
    /// Abort the whole call with a descriptive error.
    Fail,
}

/// When to set the "refresh fields on open" flag the host reader honors in
/// lieu of recomputing table-of-contents page numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateFieldsOnOpen {
    Never,
    Always,
    /// Set the flag iff the document contains at least one field.
    #[default]
    Auto,
}

/// Optional overrides for `docProps/core.xml` fields. `None` preserves the
/// template's original value for that field.
#[derive(Debug, Clone, Default)]
pub struct DocumentPropertyOverrides {
    pub title: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub description: Option<String>,
    pub keywords: Option<String>,
    pub category: Option<String>,
    pub last_modified_by: Option<String>,
}

/// All caller-recognized options for a `process`/`validate` call.
#[derive(Debug, Clone)]
pub struct Options {
    pub culture: Culture,
    pub missing_variable_behavior: MissingVariableBehavior,
    pub document_properties: DocumentPropertyOverrides,
    pub boolean_formatter_registry: BooleanFormatters,
    pub text_replacements: Vec<(String, String)>,
    pub enable_newline_support: bool,
    pub update_fields_on_open: UpdateFieldsOnOpen,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            culture: Culture::default(),
            missing_variable_behavior: MissingVariableBehavior::default(),
            document_properties: DocumentPropertyOverrides::default(),
            boolean_formatter_registry: BooleanFormatters::default(),
            text_replacements: Vec::new(),
            enable_newline_support: true,
            update_fields_on_open: UpdateFieldsOnOpen::default(),
        }
    }
}
