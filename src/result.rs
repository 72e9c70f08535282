//! Caller-facing result surfaces for `process`/`validate` (spec.md §6).

use std::collections::BTreeSet;

/// A non-fatal event recorded while processing or validating a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// A placeholder's path could not be resolved.
    MissingVariable(String),
    /// A `{{#foreach}}` collection path resolved to nothing (no such member).
    MissingLoopCollection(String),
    /// A `{{#foreach}}` collection path resolved to an explicit `Null`.
    NullLoopCollection(String),
}

impl Warning {
    /// The category name used to group warnings in the warning report.
    pub fn category(&self) -> &'static str {
        match self {
            Warning::MissingVariable(_) => "Missing Variables",
            Warning::MissingLoopCollection(_) => "Missing Loop Collections",
            Warning::NullLoopCollection(_) => "Null Loop Collections",
        }
    }

    /// The variable/collection name this warning is about.
    pub fn name(&self) -> &str {
        match self {
            Warning::MissingVariable(n) | Warning::MissingLoopCollection(n) | Warning::NullLoopCollection(n) => n,
        }
    }
}

/// The outcome of a `process` call.
#[derive(Debug, Clone)]
pub struct ProcessingResult {
    pub is_success: bool,
    pub error_message: Option<String>,
    pub replacement_count: usize,
    pub missing_variables: Vec<String>,
    pub warnings: Vec<Warning>,
    /// The materialized document, present iff `is_success`.
    pub output: Option<Vec<u8>>,
}

impl ProcessingResult {
    /// Renders the secondary warning-report document (spec.md §7).
    pub fn warning_report_bytes(&self) -> Result<Vec<u8>, crate::error::Error> {
        crate::report::render_warning_report(self)
    }
}

/// The outcome of a `validate` call.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<crate::error::TemplateError>,
    pub warnings: Vec<Warning>,
    pub all_placeholders: Vec<String>,
    pub missing_variables: Vec<String>,
}

/// Collects warnings and tracks the unique missing-variable/collection names
/// spec.md §6 surfaces in `missing_variables`.
#[derive(Debug, Default)]
pub(crate) struct WarningCollector {
    pub warnings: Vec<Warning>,
    missing_names: BTreeSet<String>,
}

impl WarningCollector {
    pub fn push(&mut self, warning: Warning) {
        if let Warning::MissingVariable(name) = &warning {
            self.missing_names.insert(name.clone());
        }
        self.warnings.push(warning);
    }

    pub fn missing_variables(&self) -> Vec<String> {
        self.missing_names.iter().cloned().collect()
    }
}
