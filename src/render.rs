//! Inline-value renderer: converts a substituted string into a sequence of
//! runs (and line breaks) that replaces a placeholder's covered span.
//!
//! Phases run in the order spec.md §4.6 lists them: configured text
//! replacements, newline normalization, markdown emphasis, then segment
//! emission.

use crate::doc::model::{Break, Run, RunProperties};
use std::rc::Rc;

/// Configuration for a single render call, assembled from [`crate::options::Options`].
pub struct RenderOptions<'a> {
    /// Ordered literal replacement pairs applied before markdown parsing,
    /// after the crate's built-in HTML-entity table.
    pub text_replacements: &'a [(String, String)],
    /// Whether `\n`/`\r\n`/`\r` in the value become line breaks.
    pub enable_newline_support: bool,
}

impl Default for RenderOptions<'_> {
    fn default() -> Self {
        RenderOptions { text_replacements: &[], enable_newline_support: true }
    }
}

/// The crate's built-in HTML entity table, consulted before any
/// caller-configured replacement (SPEC_FULL.md §4.11).
const BUILTIN_ENTITIES: &[(&str, &str)] = &[
    ("&amp;", "&"),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&nbsp;", "\u{00A0}"),
    ("&#39;", "'"),
];

/// Private-use sentinel standing in for a normalized line break during
/// markdown scanning, so break positions survive emphasis tokenization.
const BREAK_SENTINEL: char = '\u{E000}';

/// Renders `text` into one or more [`Run`]s inheriting `host_properties`,
/// ready to splice into a paragraph's run list in place of a placeholder.
pub fn render_value(text: &str, host_properties: &Rc<RunProperties>, options: &RenderOptions) -> Vec<Run> {
    let replaced = apply_replacements(text, options.text_replacements);
    let normalized = if options.enable_newline_support {
        normalize_newlines(&replaced)
    } else {
        replaced
    };
    let pieces = parse_markdown(&normalized);
    emit_runs(pieces, host_properties)
}

fn apply_replacements(text: &str, configured: &[(String, String)]) -> String {
    let mut out = text.to_string();
    for (from, to) in BUILTIN_ENTITIES {
        out = out.replace(from, to);
    }
    for (from, to) in configured {
        out = out.replace(from.as_str(), to.as_str());
    }
    out
}

fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\r").replace('\n', "\r").replace('\r', &BREAK_SENTINEL.to_string())
}

/// One markdown-delimiter kind, in the precedence order the tokenizer
/// matches them (longest-first so `***x***` isn't misread as `**` + `*x*`
/// + stray `*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkerKind {
    BoldItalic,
    Bold,
    Italic,
    Strike,
}

const MARKERS: &[(&str, MarkerKind)] = &[
    ("***", MarkerKind::BoldItalic),
    ("~~", MarkerKind::Strike),
    ("**", MarkerKind::Bold),
    ("__", MarkerKind::Bold),
    ("*", MarkerKind::Italic),
    ("_", MarkerKind::Italic),
];

/// A piece of the rendered string: either literal text (with any pending
/// line breaks before it) or a toggle applied going forward.
enum Piece {
    Text { text: String, breaks_before: Vec<Break> },
    Toggle { bold: bool, italic: bool, strike: bool },
}

/// Parses markdown emphasis per spec.md §4.6. Markers are paired
/// consecutively within each kind (1st-with-2nd, 3rd-with-4th, …); an odd
/// trailing occurrence has no closer and renders literally, per "Unclosed
/// markers render literally."
fn parse_markdown(text: &str) -> Vec<Piece> {
    // First pass: tokenize into literal spans and marker spans.
    enum Tok<'a> {
        Literal(&'a str),
        Marker(MarkerKind),
    }
    let mut toks = Vec::new();
    let bytes = text.as_bytes();
    let mut i = 0;
    let mut literal_start = 0;
    while i < bytes.len() {
        let rest = &text[i..];
        let matched = MARKERS.iter().find(|(pat, _)| rest.starts_with(pat));
        if let Some((pat, kind)) = matched {
            if i > literal_start {
                toks.push(Tok::Literal(&text[literal_start..i]));
            }
            toks.push(Tok::Marker(*kind));
            i += pat.len();
            literal_start = i;
        } else {
            // Advance by one full character, never splitting a multi-byte one.
            let ch_len = rest.chars().next().map(char::len_utf8).unwrap_or(1);
            i += ch_len;
        }
    }
    if literal_start < bytes.len() {
        toks.push(Tok::Literal(&text[literal_start..]));
    }

    // Count occurrences per kind so we know which are paired vs. trailing-odd.
    let mut counts = [0usize; 4];
    let kind_idx = |k: MarkerKind| -> usize {
        match k {
            MarkerKind::BoldItalic => 0,
            MarkerKind::Bold => 1,
            MarkerKind::Italic => 2,
            MarkerKind::Strike => 3,
        }
    };
    for tok in &toks {
        if let Tok::Marker(k) = tok {
            counts[kind_idx(*k)] += 1;
        }
    }
    let paired_count = counts.map(|c| c - (c % 2));

    let mut pieces = Vec::new();
    let mut seen = [0usize; 4];
    let mut pending_breaks = Vec::new();
    let mut buffer = String::new();

    let flush_text = |pieces: &mut Vec<Piece>, buffer: &mut String, breaks: &mut Vec<Break>| {
        if !buffer.is_empty() || !breaks.is_empty() {
            pieces.push(Piece::Text { text: std::mem::take(buffer), breaks_before: std::mem::take(breaks) });
        }
    };

    for tok in toks {
        match tok {
            Tok::Literal(text) => {
                for ch in text.chars() {
                    if ch == BREAK_SENTINEL {
                        flush_text(&mut pieces, &mut buffer, &mut pending_breaks);
                        pending_breaks.push(Break::Line);
                    } else {
                        buffer.push(ch);
                    }
                }
            }
            Tok::Marker(kind) => {
                let idx = kind_idx(kind);
                let is_paired = seen[idx] < paired_count[idx];
                seen[idx] += 1;
                if is_paired {
                    flush_text(&mut pieces, &mut buffer, &mut pending_breaks);
                    let (bold, italic, strike) = match kind {
                        MarkerKind::BoldItalic => (true, true, false),
                        MarkerKind::Bold => (true, false, false),
                        MarkerKind::Italic => (false, true, false),
                        MarkerKind::Strike => (false, false, true),
                    };
                    pieces.push(Piece::Toggle { bold, italic, strike });
                } else {
                    // Unmatched: render the marker's literal characters.
                    let literal = match kind {
                        MarkerKind::BoldItalic => "***",
                        MarkerKind::Bold => "**",
                        MarkerKind::Italic => "*",
                        MarkerKind::Strike => "~~",
                    };
                    buffer.push_str(literal);
                }
            }
        }
    }
    flush_text(&mut pieces, &mut buffer, &mut pending_breaks);
    pieces
}

/// Walks the parsed pieces, accumulating bold/italic/strike toggle state and
/// emitting one [`Run`] per contiguous text piece with the property set
/// computed at that point, overlaid on `host_properties`.
fn emit_runs(pieces: Vec<Piece>, host_properties: &Rc<RunProperties>) -> Vec<Run> {
    let mut runs = Vec::new();
    let (mut bold, mut italic, mut strike) = (false, false, false);
    for piece in pieces {
        match piece {
            Piece::Toggle { bold: b, italic: it, strike: s } => {
                bold ^= b;
                italic ^= it;
                strike ^= s;
            }
            Piece::Text { text, breaks_before } => {
                if text.is_empty() && breaks_before.is_empty() {
                    continue;
                }
                let properties = if bold || italic || strike {
                    Rc::new(host_properties.with_markdown_overlay(bold, italic, strike))
                } else {
                    Rc::clone(host_properties)
                };
                let mut run = Run::new(text, properties);
                run.breaks_before = breaks_before;
                runs.push(run);
            }
        }
    }
    if runs.is_empty() {
        runs.push(Run::new(String::new(), Rc::clone(host_properties)));
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain() -> Rc<RunProperties> {
        Rc::new(RunProperties::default())
    }

    fn text_of(runs: &[Run]) -> String {
        runs.iter().map(|r| r.text.as_str()).collect()
    }

    #[test]
    fn plain_text_round_trips() {
        let runs = render_value("John Doe", &plain(), &RenderOptions::default());
        assert_eq!(text_of(&runs), "John Doe");
        assert!(!runs[0].properties.bold);
    }

    #[test]
    fn bold_markdown_toggles_and_restores() {
        let runs = render_value("a **b** c", &plain(), &RenderOptions::default());
        assert_eq!(text_of(&runs), "a b c");
        let bold_run = runs.iter().find(|r| r.text == "b").unwrap();
        assert!(bold_run.properties.bold);
        let plain_run = runs.iter().find(|r| r.text == "a ").unwrap();
        assert!(!plain_run.properties.bold);
    }

    #[test]
    fn triple_star_toggles_both_bold_and_italic() {
        let runs = render_value("***x***", &plain(), &RenderOptions::default());
        let run = runs.iter().find(|r| r.text == "x").unwrap();
        assert!(run.properties.bold && run.properties.italic);
    }

    #[test]
    fn unclosed_marker_renders_literally() {
        let runs = render_value("a * b", &plain(), &RenderOptions::default());
        assert_eq!(text_of(&runs), "a * b");
    }

    #[test]
    fn newline_becomes_a_break_between_runs() {
        let runs = render_value("line1\nline2", &plain(), &RenderOptions::default());
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].text, "line1");
        assert_eq!(runs[1].text, "line2");
        assert_eq!(runs[1].breaks_before, vec![Break::Line]);
    }

    #[test]
    fn newline_support_disabled_keeps_literal_char() {
        let opts = RenderOptions { text_replacements: &[], enable_newline_support: false };
        let runs = render_value("line1\nline2", &plain(), &opts);
        assert_eq!(text_of(&runs), "line1\nline2");
    }

    #[test]
    fn configured_text_replacement_applies_before_markdown() {
        let replacements = vec![("<br>".to_string(), "\n".to_string())];
        let opts = RenderOptions { text_replacements: &replacements, enable_newline_support: true };
        let runs = render_value("a<br>b", &plain(), &opts);
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[1].breaks_before, vec![Break::Line]);
    }

    #[test]
    fn html_entities_decoded_by_default() {
        let runs = render_value("Tom &amp; Jerry", &plain(), &RenderOptions::default());
        assert_eq!(text_of(&runs), "Tom & Jerry");
    }

    #[test]
    fn empty_string_yields_single_empty_run() {
        let runs = render_value("", &plain(), &RenderOptions::default());
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].text, "");
    }
}
