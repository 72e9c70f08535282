//! Value-to-string formatting: the boolean formatter registry and
//! culture-aware numeric rendering.
//!
//! Spec.md §2 notes the registry and contract are specified but "concrete
//! glyph tables are not"; SPEC_FULL.md §4.8 fills in the default table.

use crate::value::Value;
use std::collections::HashMap;

/// A culture identifier for numeric formatting. Only the invariant culture's
/// separators are built in; callers may register others.
#[derive(Debug, Clone)]
pub struct Culture {
    pub decimal_separator: char,
    pub group_separator: Option<char>,
}

impl Default for Culture {
    fn default() -> Self {
        Culture { decimal_separator: '.', group_separator: None }
    }
}

/// A case-insensitive name → (true-text, false-text) table for `Bool`
/// placeholders, e.g. `{{Flag:yesno}}`.
#[derive(Debug, Clone)]
pub struct BooleanFormatters {
    table: HashMap<String, (String, String)>,
}

impl Default for BooleanFormatters {
    fn default() -> Self {
        let mut table = HashMap::new();
        table.insert("yesno".to_string(), ("Yes".to_string(), "No".to_string()));
        table.insert("truefalse".to_string(), ("True".to_string(), "False".to_string()));
        table.insert("checkbox".to_string(), ("\u{2612}".to_string(), "\u{2610}".to_string()));
        table.insert("onoff".to_string(), ("On".to_string(), "Off".to_string()));
        table.insert("10".to_string(), ("1".to_string(), "0".to_string()));
        BooleanFormatters { table }
    }
}

impl BooleanFormatters {
    /// Registers or overrides a formatter under `name`, looked up
    /// case-insensitively.
    pub fn register(&mut self, name: impl Into<String>, true_text: impl Into<String>, false_text: impl Into<String>) {
        self.table.insert(name.into().to_ascii_lowercase(), (true_text.into(), false_text.into()));
    }

    /// Resolves `b` to text, falling back to the culture-invariant
    /// "True"/"False" for an unknown or absent specifier (spec.md §4.5).
    pub fn format(&self, b: bool, specifier: Option<&str>) -> String {
        let pair = specifier
            .and_then(|name| self.table.get(&name.to_ascii_lowercase()))
            .cloned();
        match pair {
            Some((t, f)) => if b { t } else { f },
            None => if b { "True".to_string() } else { "False".to_string() },
        }
    }
}

/// Formats `value` for substitution into a run, per spec.md §4.5's
/// value-to-string conversion rules.
///
/// `Null`/missing is handled by the caller (the transformer applies the
/// missing-variable policy before reaching here); structured values
/// (`Sequence`/`Mapping`/`Object`) stringify to an opaque placeholder.
pub fn format_value(value: &Value, format: Option<&str>, culture: &Culture, booleans: &BooleanFormatters) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => booleans.format(*b, format),
        Value::Integer(n) => format_integer(*n, culture),
        Value::Decimal(d) => format_decimal(d, culture),
        Value::String(s) => s.clone(),
        Value::Sequence(_) => "[sequence]".to_string(),
        Value::Mapping(_) => "[mapping]".to_string(),
        Value::Object(obj) => format!("[{}]", obj.type_name()),
    }
}

fn format_integer(n: i64, culture: &Culture) -> String {
    let digits = n.unsigned_abs().to_string();
    let grouped = match culture.group_separator {
        Some(sep) => group_digits(&digits, sep),
        None => digits,
    };
    if n < 0 {
        format!("-{grouped}")
    } else {
        grouped
    }
}

fn group_digits(digits: &str, sep: char) -> String {
    let bytes = digits.as_bytes();
    let mut out = String::new();
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 && (bytes.len() - i) % 3 == 0 {
            out.push(sep);
        }
        out.push(*b as char);
    }
    out
}

/// Renders a [`rust_decimal::Decimal`] at its stored scale verbatim — no
/// rounding, no trailing-zero stripping — substituting only the culture's
/// decimal separator (spec.md §4.5: "`1250.50` must not render as
/// `1250.5`").
fn format_decimal(d: &rust_decimal::Decimal, culture: &Culture) -> String {
    let text = d.to_string();
    if culture.decimal_separator == '.' {
        return text;
    }
    text.replace('.', &culture.decimal_separator.to_string())
}
