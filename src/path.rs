//! Property paths: `a.b`, `a[b]`, `a[0]`, `.current`, `@index`.
//!
//! A [`PropertyPath`] is parsed once by the expression parser and evaluated
//! repeatedly (once per loop iteration, typically) against a [`crate::scope::Scope`].

use crate::{scope::Scope, value::Value};
use std::fmt;

/// One segment of a [`PropertyPath`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// A bare or bracketed identifier: `.b` in `a.b`, `b` in `a[b]`.
    Name(String),
    /// A bracketed literal integer index: `0` in `a[0]`.
    Index(i64),
    /// A bracketed identifier resolved against the scope at evaluation time,
    /// e.g. `a[@index]`.
    DynamicIndex(String),
}

/// A parsed property path: a leading marker (relative vs. root) plus segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyPath {
    /// `true` if the path began with a leading `.`, meaning "start from the
    /// current item" rather than performing ordinary scope lookup for the
    /// first segment.
    pub relative: bool,
    /// The path's segments, in left-to-right order. Empty only for the bare
    /// relative path `.` (current item itself).
    pub segments: Vec<Segment>,
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.relative {
            write!(f, ".")?;
        }
        for (i, seg) in self.segments.iter().enumerate() {
            match seg {
                Segment::Name(name) => {
                    if i > 0 || self.relative {
                        write!(f, ".{name}")?;
                    } else {
                        write!(f, "{name}")?;
                    }
                }
                Segment::Index(idx) => write!(f, "[{idx}]")?,
                Segment::DynamicIndex(name) => write!(f, "[{name}]")?,
            }
        }
        Ok(())
    }
}

/// An error parsing a property path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathParseError {
    /// The path was empty where at least one segment was required.
    #[error("empty property path")]
    Empty,
    /// A `[` was never closed.
    #[error("unterminated index bracket in '{0}'")]
    UnterminatedBracket(String),
    /// A segment was neither an identifier nor an integer.
    #[error("invalid path segment '{0}'")]
    InvalidSegment(String),
}

impl PropertyPath {
    /// Parses `text` as a property path. `a.b`, `a[b]`, `a[0]`, `.b` are all
    /// accepted; `@index`-style identifiers are parsed as ordinary `Name`
    /// segments (their "reserved" status is a naming rule the scope/validator
    /// enforce, not a different parse path — spec.md §3).
    pub fn parse(text: &str) -> Result<Self, PathParseError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(PathParseError::Empty);
        }
        let relative = text.starts_with('.');
        let rest = if relative { &text[1..] } else { text };
        if rest.is_empty() {
            // Bare "." — current item.
            return Ok(PropertyPath { relative: true, segments: vec![] });
        }

        let mut segments = Vec::new();
        let bytes = rest.as_bytes();
        let mut i = 0;
        let mut start = 0;
        // Track whether we're at the very start of a dotted segment to
        // correctly split "a.b.c" while also handling "a[b].c" and "a[0]".
        while i <= bytes.len() {
            let at_end = i == bytes.len();
            let ch = if at_end { None } else { Some(bytes[i] as char) };
            match ch {
                Some('.') => {
                    if i > start {
                        segments.push(parse_identifier_segment(&rest[start..i])?);
                    }
                    i += 1;
                    start = i;
                }
                Some('[') => {
                    if i > start {
                        segments.push(parse_identifier_segment(&rest[start..i])?);
                    }
                    let close = rest[i..]
                        .find(']')
                        .map(|off| i + off)
                        .ok_or_else(|| PathParseError::UnterminatedBracket(text.to_string()))?;
                    let inner = rest[i + 1..close].trim();
                    segments.push(parse_bracket_segment(inner)?);
                    i = close + 1;
                    start = i;
                    // Allow a following '.' to start the next segment cleanly.
                    if i < bytes.len() && bytes[i] as char == '.' {
                        i += 1;
                        start = i;
                    }
                    continue;
                }
                None => {
                    if i > start {
                        segments.push(parse_identifier_segment(&rest[start..i])?);
                    }
                }
                _ => {}
            }
            i += 1;
        }

        if segments.is_empty() {
            return Err(PathParseError::Empty);
        }
        Ok(PropertyPath { relative, segments })
    }

    /// Evaluates this path against `scope`, returning `None` when any segment
    /// is missing (spec.md §4.3: "Missing members... produce 'missing'").
    ///
    /// Before decomposing a run of dotted `Name` segments into member-by-member
    /// lookups, a literal key spelled the same as that whole run is preferred
    /// when present: `{"Customer.Name":"Flat","Customer":{"Name":"Nested"}}`
    /// resolves `Customer.Name` to `"Flat"`, not `"Nested"` (spec.md §9, "the
    /// flat key wins; this is a decision, not an inference").
    pub fn resolve(&self, scope: &Scope) -> Option<Value> {
        let segments = &self.segments;
        let mut idx;
        let mut current = if self.relative {
            idx = 0;
            scope.current_item()?
        } else {
            let (value, consumed) = resolve_root(segments, scope)?;
            idx = consumed;
            value
        };
        while idx < segments.len() {
            let (next, consumed) = step(&current, segments, idx, scope)?;
            current = next;
            idx += consumed;
        }
        Some(current)
    }
}

/// The length of the longest run of `Name` segments starting at `segments[0]`.
fn leading_name_run(segments: &[Segment]) -> usize {
    segments.iter().take_while(|s| matches!(s, Segment::Name(_))).count()
}

/// Joins the `Name` text of `segments[..len]` with `.`, the literal spelling a
/// flat key of that shape would have.
fn joined_name_text(segments: &[Segment], len: usize) -> String {
    segments[..len]
        .iter()
        .map(|s| match s {
            Segment::Name(n) => n.as_str(),
            _ => unreachable!("leading_name_run only counts Name segments"),
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// Resolves the path's first segment(s) against `scope`, preferring a literal
/// flat key over the ordinary single-segment scope lookup. Returns the
/// resolved value and how many segments it consumed.
fn resolve_root(segments: &[Segment], scope: &Scope) -> Option<(Value, usize)> {
    let max_len = leading_name_run(segments);
    for len in (2..=max_len).rev() {
        let text = joined_name_text(segments, len);
        if let Some(value) = scope.resolve_literal(&text) {
            return Some((value, len));
        }
    }
    let first = match segments.first()? {
        Segment::Name(name) => name,
        _ => return None,
    };
    let value = scope.resolve_identifier(first)?;
    Some((value, 1))
}

/// Resolves one step of the path against `current`, preferring a literal flat
/// key over the ordinary single-segment member/index lookup when `current` is
/// a mapping. Returns the resolved value and how many segments it consumed.
fn step(current: &Value, segments: &[Segment], idx: usize, scope: &Scope) -> Option<(Value, usize)> {
    if matches!(current, Value::Mapping(_)) {
        let max_len = leading_name_run(&segments[idx..]);
        for len in (2..=max_len).rev() {
            let text = joined_name_text(&segments[idx..], len);
            if let Some(value) = current.get_member(&text) {
                return Some((value, len));
            }
        }
    }
    match &segments[idx] {
        Segment::Name(name) => Some((current.get_member(name)?, 1)),
        Segment::Index(index) => Some((current.get_index(*index)?, 1)),
        Segment::DynamicIndex(name) => {
            let index_value = scope.resolve_identifier(name)?;
            let index = match index_value {
                Value::Integer(n) => n,
                _ => return None,
            };
            Some((current.get_index(index)?, 1))
        }
    }
}

fn parse_identifier_segment(text: &str) -> Result<Segment, PathParseError> {
    if text.is_empty() {
        return Err(PathParseError::InvalidSegment(text.to_string()));
    }
    Ok(Segment::Name(text.to_string()))
}

fn parse_bracket_segment(text: &str) -> Result<Segment, PathParseError> {
    if text.is_empty() {
        return Err(PathParseError::InvalidSegment(text.to_string()));
    }
    if let Ok(n) = text.parse::<i64>() {
        return Ok(Segment::Index(n));
    }
    if text.starts_with('"') || text.starts_with('\'') {
        let unquoted = text.trim_matches(|c| c == '"' || c == '\'');
        return Ok(Segment::Name(unquoted.to_string()));
    }
    Ok(Segment::DynamicIndex(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotted_and_bracketed_forms_are_equivalent() {
        let dotted = PropertyPath::parse("a.b").unwrap();
        let bracketed = PropertyPath::parse("a[b]").unwrap();
        assert_eq!(dotted.segments, bracketed.segments);
    }

    #[test]
    fn leading_dot_is_relative() {
        let p = PropertyPath::parse(".Name").unwrap();
        assert!(p.relative);
        assert_eq!(p.segments, vec![Segment::Name("Name".into())]);
    }

    #[test]
    fn bracketed_literal_index() {
        let p = PropertyPath::parse("items[0]").unwrap();
        assert_eq!(
            p.segments,
            vec![Segment::Name("items".into()), Segment::Index(0)]
        );
    }

    #[test]
    fn dynamic_index_identifier() {
        let p = PropertyPath::parse("items[@index]").unwrap();
        assert_eq!(
            p.segments,
            vec![
                Segment::Name("items".into()),
                Segment::DynamicIndex("@index".into())
            ]
        );
    }

    #[test]
    fn mixed_dotted_and_bracketed_chain() {
        let p = PropertyPath::parse("interview.settings.isEnabled").unwrap();
        assert_eq!(
            p.segments,
            vec![
                Segment::Name("interview".into()),
                Segment::Name("settings".into()),
                Segment::Name("isEnabled".into()),
            ]
        );
    }

    #[test]
    fn unterminated_bracket_is_error() {
        assert!(matches!(
            PropertyPath::parse("a[b"),
            Err(PathParseError::UnterminatedBracket(_))
        ));
    }

    fn mapping(entries: &[(&str, Value)]) -> Value {
        let mut map = indexmap::IndexMap::new();
        for (k, v) in entries {
            map.insert((*k).to_string(), v.clone());
        }
        Value::Mapping(map)
    }

    #[test]
    fn flat_key_shadows_nested_path_of_same_spelling() {
        let root = mapping(&[
            ("Customer.Name", Value::String("Flat".into())),
            ("Customer", mapping(&[("Name", Value::String("Nested".into()))])),
        ]);
        let scope = Scope::new(root);
        let path = PropertyPath::parse("Customer.Name").unwrap();
        assert_eq!(path.resolve(&scope).unwrap().to_string(), "Flat");
    }

    #[test]
    fn nested_path_resolves_normally_without_a_shadowing_flat_key() {
        let root = mapping(&[("Customer", mapping(&[("Name", Value::String("Nested".into()))]))]);
        let scope = Scope::new(root);
        let path = PropertyPath::parse("Customer.Name").unwrap();
        assert_eq!(path.resolve(&scope).unwrap().to_string(), "Nested");
    }
}
