//! Public entry points: `process` and `validate` (spec.md §6).

use crate::doc::{reader, writer, Document};
use crate::error::Error;
use crate::options::Options;
use crate::result::{ProcessingResult, ValidationResult};
use crate::transform;
use crate::validate as validate_impl;
use crate::value;

fn load_data(data: &[u8]) -> Result<value::Value, Error> {
    let json: serde_json::Value = serde_json::from_slice(data)?;
    if !json.is_object() {
        return Err(Error::NonObjectRoot);
    }
    Ok(value::from_json(json))
}

/// Fills `template_bytes` (a `.docx` package) with `data` (a JSON object) and
/// returns the processing outcome, per spec.md §6.
///
/// A document-shape failure (unreadable ZIP/XML, non-object JSON root) or a
/// `MissingVariableBehavior::Fail` miss is returned as `Err`; every other
/// outcome — including a template with structural errors — is reported
/// through the returned [`ProcessingResult`].
pub fn process(template_bytes: &[u8], data: &[u8], options: &Options) -> Result<ProcessingResult, Error> {
    let data = load_data(data)?;
    let mut document: Document = reader::read_package(template_bytes)?;

    match transform::transform(&mut document.body, data, options) {
        Ok(ctx) => {
            let replacement_count = ctx.replacement_count;
            let (warnings, missing_variables) = ctx.into_warnings();
            let output = writer::write_package(&document, options)?;
            Ok(ProcessingResult {
                is_success: true,
                error_message: None,
                replacement_count,
                missing_variables,
                warnings,
                output: Some(output),
            })
        }
        Err(err) => Err(err),
    }
}

/// Checks `template_bytes` against `data` without mutating either, reporting
/// every placeholder the template could reach (spec.md §6).
pub fn validate(template_bytes: &[u8], data: &[u8], options: &Options) -> Result<ValidationResult, Error> {
    let data = load_data(data)?;
    let document = reader::read_package(template_bytes)?;
    Ok(validate_impl::validate(&document.body, &data, options))
}
