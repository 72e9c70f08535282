//! The dynamic value model expressions and placeholders evaluate over.
//!
//! [`Value`] is a tagged union rather than a trait-object hierarchy so the
//! expression evaluator and formatter can match on variants directly, the way
//! the teacher's own expression engine (`expr::do_expression`) works against a
//! flat `f64` stack rather than a polymorphic numeric type.

use indexmap::IndexMap;
use rust_decimal::Decimal;
use std::{fmt, rc::Rc};

/// An opaque caller-provided object whose members are resolved by name at
/// evaluation time.
///
/// This is the capability spec.md §9 calls for: "the source accesses
/// arbitrary member paths on caller objects at runtime… an `Object` variant
/// whose property access is implemented by a caller-provided accessor."
pub trait ObjectAccess: fmt::Debug {
    /// Returns the named property, or `None` if the object has no such member.
    fn get_property(&self, name: &str) -> Option<Value>;

    /// A human-readable type name, used only when an `Object` must be
    /// stringified directly (spec.md §4.5: undefined, should warn).
    fn type_name(&self) -> &str {
        "object"
    }
}

/// The tagged dynamic value all expressions and placeholders evaluate over.
#[derive(Debug, Clone)]
pub enum Value {
    /// The absence of a value. Distinct from "missing" (an unresolved path);
    /// `Null` is a value a caller explicitly supplied.
    Null,
    /// A boolean.
    Bool(bool),
    /// A signed integer, at least 64 bits wide.
    Integer(i64),
    /// A fixed-point decimal that preserves the scale the caller entered
    /// (`29.99` keeps two fractional digits; `1250.50` does not collapse to
    /// `1250.5`).
    Decimal(Decimal),
    /// A UTF-8 string.
    String(String),
    /// An ordered sequence of values.
    Sequence(Vec<Value>),
    /// An insertion-ordered mapping with case-sensitive string keys.
    Mapping(IndexMap<String, Value>),
    /// An opaque caller object accessed via [`ObjectAccess`].
    Object(Rc<dyn ObjectAccess>),
}

impl Value {
    /// Builds a [`Value::Mapping`] from an iterator of key/value pairs,
    /// preserving the order supplied.
    pub fn mapping<I: IntoIterator<Item = (String, Value)>>(entries: I) -> Self {
        Value::Mapping(entries.into_iter().collect())
    }

    /// Truthiness per spec.md §4.3: `Null`, `false`, empty string/sequence/
    /// mapping, and numeric zero are false; everything else, including any
    /// `Object`, is true.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Integer(n) => *n != 0,
            Value::Decimal(d) => !d.is_zero(),
            Value::String(s) => !s.is_empty(),
            Value::Sequence(items) => !items.is_empty(),
            Value::Mapping(map) => !map.is_empty(),
            Value::Object(_) => true,
        }
    }

    /// Looks up a named member on `self`, used by the path resolver for
    /// non-leaf segments. `Sequence` has no named members (only indices);
    /// `String`/`Bool`/`Integer`/`Decimal`/`Null` have none either.
    pub fn get_member(&self, name: &str) -> Option<Value> {
        match self {
            Value::Mapping(map) => map.get(name).cloned(),
            Value::Object(obj) => obj.get_property(name),
            _ => None,
        }
    }

    /// Looks up an index into `self`, used by the path resolver for bracketed
    /// integer segments. Out-of-range indices are "missing" (`None`), not an
    /// error, per spec.md §4.3.
    pub fn get_index(&self, index: i64) -> Option<Value> {
        match self {
            Value::Sequence(items) => {
                let index = usize::try_from(index).ok()?;
                items.get(index).cloned()
            }
            Value::Mapping(map) => map.get(&index.to_string()).cloned(),
            _ => None,
        }
    }

    /// Returns a decimal view of numeric values, used by the comparison
    /// operators to widen `Integer`/`Decimal` mixes to a common type.
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::Integer(n) => Some(Decimal::from(*n)),
            Value::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    /// Returns a string view of `self` for string-vs-string or coerced
    /// comparisons; unlike [`Value::render`] this does not run formatter
    /// registries or markdown.
    pub fn as_str_lossy(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// `true` for `Sequence`/`Mapping`/`Object`, the variants spec.md §4.5
    /// flags as producing an "opaque placeholder" and a warning when
    /// interpolated directly.
    pub fn is_structured(&self) -> bool {
        matches!(self, Value::Sequence(_) | Value::Mapping(_) | Value::Object(_))
    }
}

impl fmt::Display for Value {
    /// An opaque, non-localized rendering used only for diagnostics (warning
    /// text, error messages); placeholder substitution goes through
    /// [`crate::format`] instead.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Integer(n) => write!(f, "{n}"),
            Value::Decimal(d) => write!(f, "{d}"),
            Value::String(s) => write!(f, "{s}"),
            Value::Sequence(_) => write!(f, "[sequence]"),
            Value::Mapping(_) => write!(f, "[mapping]"),
            Value::Object(obj) => write!(f, "[{}]", obj.type_name()),
        }
    }
}

/// Converts a parsed JSON data context into the [`Value`] model, per spec.md
/// §6's JSON-to-Value mapping table.
pub fn from_json(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => {
            if n.is_i64() || (n.is_u64() && n.as_u64().unwrap() <= i64::MAX as u64) {
                // Integer only when the literal spelling has no fraction or
                // exponent; serde_json's Number already distinguishes this.
                if let Some(i) = n.as_i64() {
                    return Value::Integer(i);
                }
            }
            // Preserve the literal's spelled scale (e.g. "1250.50") by parsing
            // the number's own text representation. This relies on serde_json's
            // `arbitrary_precision` feature (Cargo.toml), which keeps `Number`
            // backed by the original literal text instead of an f64, so
            // `to_string()` reproduces spelled trailing zeros verbatim.
            let text = n.to_string();
            match Decimal::from_str_exact(&text) {
                Ok(d) => Value::Decimal(d),
                Err(_) => Value::Decimal(Decimal::from_str_exact("0").unwrap()),
            }
        }
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(items) => Value::Sequence(items.into_iter().map(from_json).collect()),
        serde_json::Value::Object(map) => {
            let mut out = IndexMap::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k, from_json(v));
            }
            Value::Mapping(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_matches_spec_table() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(!Value::Integer(0).is_truthy());
        assert!(Value::Integer(-1).is_truthy());
        assert!(!Value::String(String::new()).is_truthy());
        assert!(Value::String("x".into()).is_truthy());
        assert!(!Value::Sequence(vec![]).is_truthy());
        assert!(!Value::Mapping(IndexMap::new()).is_truthy());
    }

    #[test]
    fn json_number_preserves_spelled_scale() {
        let json: serde_json::Value = serde_json::from_str("29.99").unwrap();
        match from_json(json) {
            Value::Decimal(d) => assert_eq!(d.to_string(), "29.99"),
            other => panic!("expected Decimal, got {other:?}"),
        }
        let json: serde_json::Value = serde_json::from_str("1250.50").unwrap();
        match from_json(json) {
            Value::Decimal(d) => assert_eq!(d.to_string(), "1250.50"),
            other => panic!("expected Decimal, got {other:?}"),
        }
    }

    #[test]
    fn json_object_preserves_insertion_order() {
        let json: serde_json::Value = serde_json::from_str(r#"{"b":1,"a":2}"#).unwrap();
        match from_json(json) {
            Value::Mapping(map) => {
                let keys: Vec<_> = map.keys().collect();
                assert_eq!(keys, vec!["b", "a"]);
            }
            other => panic!("expected Mapping, got {other:?}"),
        }
    }

    #[test]
    fn index_out_of_range_is_missing_not_error() {
        let seq = Value::Sequence(vec![Value::Integer(1)]);
        assert!(seq.get_index(5).is_none());
        assert!(seq.get_index(-1).is_none());
    }
}
