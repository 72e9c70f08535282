//! Template-token recognizer.
//!
//! Locates `{{ … }}` tokens across a paragraph's run sequence, tolerating
//! tokens whose opening delimiter, content, or closing delimiter are split
//! across any number of runs — something that happens constantly in real
//! documents because editors split runs mid-word on every formatting change,
//! spell-check squiggle, or tracked edit.

use crate::doc::model::{Run, RunProperties};
use std::rc::Rc;

/// The classified contents of a recognized token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// `{{ expr [: format] }}`.
    Placeholder { expr: String, format: Option<String> },
    /// `{{#if expr}}`.
    IfStart(String),
    /// `{{#elseif expr}}`.
    ElseIf(String),
    /// `{{#else}}` or `{{else}}`.
    Else,
    /// `{{/if}}`.
    IfEnd,
    /// `{{#foreach path}}` or `{{#foreach ident in path}}`.
    ForeachStart(String),
    /// `{{/foreach}}`.
    ForeachEnd,
}

impl TokenKind {
    /// `true` for any of the six block-marker kinds (as opposed to a value
    /// placeholder).
    pub fn is_block_marker(&self) -> bool {
        !matches!(self, TokenKind::Placeholder { .. })
    }
}

/// A location within a paragraph's run sequence: a run index and a
/// character offset into that run's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunPos {
    pub run: usize,
    pub offset: usize,
}

/// One recognized token and everything needed to splice it back out.
#[derive(Debug, Clone)]
pub struct Match {
    pub kind: TokenKind,
    pub start: RunPos,
    pub end: RunPos,
    /// The raw, untrimmed text between `{{` and `}}`.
    pub raw_inner: String,
    /// Properties of the run that physically contained the opening `{{`
    /// (spec.md §3 invariants: "the *first* run's properties win").
    pub preserved_properties: Rc<RunProperties>,
}

/// An error recognizing tokens in a paragraph.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// A `{{` was never closed within the paragraph.
    #[error("unterminated '{{{{' starting at run {0}, offset {1}")]
    Unterminated(usize, usize),
}

/// Scans `runs` for every `{{ … }}` token. A `}}` with no preceding `{{` is
/// left as literal text (not an error); a `{{` with no matching `}}` within
/// the paragraph is a [`TokenError::Unterminated`].
pub fn scan(runs: &[Run]) -> Result<Vec<Match>, TokenError> {
    // Concatenate run texts into a single virtual stream with an index map
    // back to (run, offset), so the delimiters and a token's content can
    // straddle any number of run boundaries.
    let mut stream = String::new();
    let mut index_map: Vec<RunPos> = Vec::new();
    for (run_idx, run) in runs.iter().enumerate() {
        for (offset, ch) in run.text.char_indices() {
            stream.push(ch);
            index_map.push(RunPos { run: run_idx, offset });
            let _ = ch;
        }
    }
    // Sentinel so an end position at the very end of the paragraph is valid.
    let end_sentinel = runs
        .last()
        .map(|r| RunPos { run: runs.len() - 1, offset: r.text.chars().count() })
        .unwrap_or(RunPos { run: 0, offset: 0 });

    let chars: Vec<char> = stream.chars().collect();
    let mut matches = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '{' && chars.get(i + 1) == Some(&'{') {
            let start_pos = index_map[i];
            let content_start = i + 2;
            let mut j = content_start;
            let mut found = None;
            while j + 1 < chars.len() {
                if chars[j] == '}' && chars[j + 1] == '}' {
                    found = Some(j);
                    break;
                }
                j += 1;
            }
            // Also check the last possible position (two-char window already
            // covered by `j + 1 < chars.len()`; nothing more to do here).
            match found {
                Some(close_start) => {
                    let raw_inner: String = chars[content_start..close_start].iter().collect();
                    let end_pos = if close_start + 2 < chars.len() {
                        index_map[close_start + 2]
                    } else {
                        end_sentinel
                    };
                    let preserved_properties = Rc::clone(&runs[start_pos.run].properties);
                    let kind = classify(&raw_inner);
                    matches.push(Match {
                        kind,
                        start: start_pos,
                        end: end_pos,
                        raw_inner,
                        preserved_properties,
                    });
                    i = close_start + 2;
                }
                None => return Err(TokenError::Unterminated(start_pos.run, start_pos.offset)),
            }
        } else {
            i += 1;
        }
    }
    Ok(matches)
}

/// Classifies raw inner text (already trimmed of the `{{`/`}}` delimiters)
/// into a [`TokenKind`]. Keywords are recognized case-insensitively.
fn classify(raw_inner: &str) -> TokenKind {
    let trimmed = raw_inner.trim();
    let lower = trimmed.to_ascii_lowercase();

    if let Some(rest) = strip_keyword_prefix(&lower, trimmed, "#if") {
        return TokenKind::IfStart(rest.trim().to_string());
    }
    if let Some(rest) = strip_keyword_prefix(&lower, trimmed, "#elseif") {
        return TokenKind::ElseIf(rest.trim().to_string());
    }
    if lower == "#else" || lower == "else" {
        return TokenKind::Else;
    }
    if lower == "/if" {
        return TokenKind::IfEnd;
    }
    if let Some(rest) = strip_keyword_prefix(&lower, trimmed, "#foreach") {
        return TokenKind::ForeachStart(rest.trim().to_string());
    }
    if lower == "/foreach" {
        return TokenKind::ForeachEnd;
    }

    let (expr, format) = split_format_specifier(trimmed);
    TokenKind::Placeholder { expr: expr.trim().to_string(), format }
}

/// If `lower` starts with `keyword` followed by whitespace or end-of-string,
/// returns the remainder of `original` (preserving original case) after the
/// keyword.
fn strip_keyword_prefix<'a>(lower: &str, original: &'a str, keyword: &str) -> Option<&'a str> {
    if !lower.starts_with(keyword) {
        return None;
    }
    let rest = &original[keyword.len()..];
    if rest.is_empty() || rest.starts_with(|c: char| c.is_whitespace()) {
        Some(rest)
    } else {
        None
    }
}

/// Splits `{{ expr : format }}` at the top-level colon — i.e. a colon that
/// is not nested inside `(...)`, `[...]`, or a quoted string — per spec.md
/// §4.5: "When the inner expression is parenthesized... the colon-specifier
/// is parsed *after* the closing parenthesis."
fn split_format_specifier(text: &str) -> (&str, Option<String>) {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    for (byte_idx, ch) in text.char_indices() {
        if let Some(q) = quote {
            if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' | '\u{2018}' | '\u{201C}' => quote = Some(matching_close(ch)),
            '(' | '[' => depth += 1,
            ')' | ']' => depth -= 1,
            ':' if depth <= 0 => {
                let format = text[byte_idx + 1..].trim();
                if format.is_empty() {
                    return (&text[..byte_idx], None);
                }
                return (&text[..byte_idx], Some(format.to_string()));
            }
            _ => {}
        }
    }
    (text, None)
}

fn matching_close(open: char) -> char {
    match open {
        '\u{2018}' => '\u{2019}',
        '\u{201C}' => '\u{201D}',
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(text: &str) -> Run {
        Run::new(text, Rc::new(RunProperties::default()))
    }

    #[test]
    fn finds_simple_placeholder_in_one_run() {
        let runs = vec![run("Hello {{Name}}!")];
        let matches = scan(&runs).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(
            matches[0].kind,
            TokenKind::Placeholder { expr: "Name".into(), format: None }
        );
    }

    #[test]
    fn token_split_across_runs_is_still_found() {
        // "{{" split across two runs, and the identifier split across two more.
        let runs = vec![run("Hello {"), run("{Na"), run("me}"), run("} done")];
        let matches = scan(&runs).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(
            matches[0].kind,
            TokenKind::Placeholder { expr: "Name".into(), format: None }
        );
    }

    #[test]
    fn split_token_same_as_concatenated_for_any_partition() {
        let full = "X{{Flag:yesno}}Y";
        let whole = vec![run(full)];
        let expected = scan(&whole).unwrap();

        // Partition the same text across several arbitrary run boundaries.
        let partitions: &[&[usize]] = &[&[1, 3, 10], &[2, 2, 2, 5], &[0, 1, 1, 1, 1]];
        for cuts in partitions {
            let mut runs = Vec::new();
            let mut rest = full;
            for &cut in *cuts {
                let cut = cut.min(rest.len());
                let (head, tail) = rest.split_at(cut);
                if !head.is_empty() {
                    runs.push(run(head));
                }
                rest = tail;
            }
            if !rest.is_empty() {
                runs.push(run(rest));
            }
            let got = scan(&runs).unwrap();
            assert_eq!(got.len(), expected.len());
            assert_eq!(got[0].kind, expected[0].kind);
        }
    }

    #[test]
    fn unterminated_brace_is_an_error() {
        let runs = vec![run("Hello {{Name")];
        assert!(scan(&runs).is_err());
    }

    #[test]
    fn dangling_close_brace_is_literal_not_error() {
        let runs = vec![run("Hello }} World")];
        let matches = scan(&runs).unwrap();
        assert!(matches.is_empty());
    }

    #[test]
    fn classifies_block_markers_case_insensitively() {
        assert_eq!(classify("#IF Status = \"Active\""), TokenKind::IfStart("Status = \"Active\"".into()));
        assert_eq!(classify("#ElseIf x"), TokenKind::ElseIf("x".into()));
        assert_eq!(classify("#Else"), TokenKind::Else);
        assert_eq!(classify("ELSE"), TokenKind::Else);
        assert_eq!(classify("/IF"), TokenKind::IfEnd);
        assert_eq!(classify("#ForEach items"), TokenKind::ForeachStart("items".into()));
        assert_eq!(classify("/FOREACH"), TokenKind::ForeachEnd);
    }

    #[test]
    fn format_specifier_parsed_after_closing_paren() {
        let kind = classify("(a and b):yesno");
        assert_eq!(kind, TokenKind::Placeholder { expr: "(a and b)".into(), format: Some("yesno".into()) });
    }

    #[test]
    fn colon_inside_quoted_literal_is_not_a_format_separator() {
        let kind = classify("Status = \"a:b\"");
        assert_eq!(kind, TokenKind::Placeholder { expr: "Status = \"a:b\"".into(), format: None });
    }

    #[test]
    fn preserved_properties_are_first_runs() {
        let bold_props = Rc::new(RunProperties { bold: true, ..Default::default() });
        let plain_props = Rc::new(RunProperties::default());
        let runs = vec![
            Run::new("{{Na", bold_props.clone()),
            Run::new("me}}", plain_props),
        ];
        let matches = scan(&runs).unwrap();
        assert!(matches[0].preserved_properties.bold);
    }
}
