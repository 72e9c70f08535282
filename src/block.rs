//! Block structure matcher.
//!
//! Pairs `{{#if}}/{{#elseif}}/{{else}}/{{/if}}` and
//! `{{#foreach}}/{{/foreach}}` markers over a sequence of events, enforcing
//! nesting. The same state machine runs three times over three different
//! kinds of sequence (spec.md §4.2): paragraphs in a body, rows in a table,
//! and tokens within a single paragraph — so it's generic over the content
//! type `T` a leaf [`Span::Content`] carries.

use crate::error::TemplateError;

/// One block-level node, generic over the leaf content type `T` (a
/// paragraph index, a table row index, or an inline token/text fragment).
#[derive(Debug, Clone, PartialEq)]
pub enum Span<T> {
    /// A passthrough leaf: ordinary content untouched by block structure.
    Content(T),
    /// An `{{#if}}/{{#elseif}}*/{{#else}}?/{{/if}}` region.
    If(IfBlock<T>),
    /// An `{{#foreach}}/{{/foreach}}` region.
    Foreach(ForeachBlock<T>),
}

/// An if/elseif*/else chain. `branches` is ordered; a `None` condition marks
/// the `else` branch and, per the grammar, can only be the last entry.
#[derive(Debug, Clone, PartialEq)]
pub struct IfBlock<T> {
    pub branches: Vec<(Option<String>, Vec<Span<T>>)>,
}

/// A foreach region: an optional bound iteration-variable name, the raw
/// collection-path text, and the body to repeat per element.
#[derive(Debug, Clone, PartialEq)]
pub struct ForeachBlock<T> {
    pub var: Option<String>,
    pub path: String,
    pub body: Vec<Span<T>>,
}

/// One input event the matcher consumes, each tagged with a position used
/// only for error messages (a paragraph index, row index, or token index —
/// whatever the caller's sequence is indexed by).
#[derive(Debug, Clone)]
pub enum Event<T> {
    /// Ordinary content that isn't a block marker.
    Content(T, usize),
    /// `{{#if <expr>}}`.
    OpenIf(String, usize),
    /// `{{#elseif <expr>}}`.
    ElseIf(String, usize),
    /// `{{#else}}` or `{{else}}`.
    Else(usize),
    /// `{{/if}}`.
    CloseIf(usize),
    /// `{{#foreach <header>}}`, header being `path` or `ident in path`.
    OpenForeach(String, usize),
    /// `{{/foreach}}`.
    CloseForeach(usize),
}

enum Frame<T> {
    If { branches: Vec<(Option<String>, Vec<Span<T>>)>, saw_else: bool, pos: usize },
    Foreach { var: Option<String>, path: String, body: Vec<Span<T>>, pos: usize },
}

/// Runs the pairing algorithm over `events`, producing an ordered forest of
/// [`Span`]s. Each closer pops the innermost matching opening; a closer that
/// doesn't match the innermost opening's kind is a structural error.
pub fn match_blocks<T>(events: Vec<Event<T>>) -> Result<Vec<Span<T>>, TemplateError> {
    let mut root: Vec<Span<T>> = Vec::new();
    let mut stack: Vec<Frame<T>> = Vec::new();

    for event in events {
        match event {
            Event::Content(item, _) => {
                push_span(&mut stack, &mut root, Span::Content(item));
            }
            Event::OpenIf(cond, pos) => {
                stack.push(Frame::If { branches: vec![(Some(cond), vec![])], saw_else: false, pos });
            }
            Event::ElseIf(cond, pos) => match stack.last_mut() {
                Some(Frame::If { branches, saw_else, .. }) => {
                    if *saw_else {
                        return Err(TemplateError::ElseIfAfterElse(pos));
                    }
                    branches.push((Some(cond), vec![]));
                }
                _ => return Err(TemplateError::UnmatchedConditionalStart(pos)),
            },
            Event::Else(pos) => match stack.last_mut() {
                Some(Frame::If { branches, saw_else, .. }) => {
                    if *saw_else {
                        return Err(TemplateError::ElseAfterElse(pos));
                    }
                    *saw_else = true;
                    branches.push((None, vec![]));
                }
                _ => return Err(TemplateError::UnmatchedConditionalStart(pos)),
            },
            Event::CloseIf(pos) => match stack.pop() {
                Some(Frame::If { branches, .. }) => {
                    push_span(&mut stack, &mut root, Span::If(IfBlock { branches }));
                }
                Some(other) => {
                    stack.push(other);
                    return Err(TemplateError::UnmatchedConditionalEnd(pos));
                }
                None => return Err(TemplateError::UnmatchedConditionalEnd(pos)),
            },
            Event::OpenForeach(header, pos) => {
                let (var, path) = parse_foreach_header(&header, pos)?;
                stack.push(Frame::Foreach { var, path, body: vec![], pos });
            }
            Event::CloseForeach(pos) => match stack.pop() {
                Some(Frame::Foreach { var, path, body, .. }) => {
                    push_span(&mut stack, &mut root, Span::Foreach(ForeachBlock { var, path, body }));
                }
                Some(other) => {
                    stack.push(other);
                    return Err(TemplateError::UnmatchedLoopEnd(pos));
                }
                None => return Err(TemplateError::UnmatchedLoopEnd(pos)),
            },
        }
    }

    if let Some(frame) = stack.into_iter().next() {
        return Err(match frame {
            Frame::If { pos, .. } => TemplateError::UnmatchedConditionalStart(pos),
            Frame::Foreach { pos, .. } => TemplateError::UnmatchedLoopStart(pos),
        });
    }

    Ok(root)
}

fn push_span<T>(stack: &mut [Frame<T>], root: &mut Vec<Span<T>>, span: Span<T>) {
    match stack.last_mut() {
        Some(Frame::If { branches, .. }) => {
            branches.last_mut().expect("if frame always has a branch").1.push(span);
        }
        Some(Frame::Foreach { body, .. }) => body.push(span),
        None => root.push(span),
    }
}

/// Parses a `{{#foreach …}}` header into an optional bound name and the
/// collection path, enforcing the reserved-word rules of spec.md §4.2:
/// `in` cannot be an iteration-variable name, and iteration-variable names
/// must not start with `@`.
pub fn parse_foreach_header(header: &str, pos: usize) -> Result<(Option<String>, String), TemplateError> {
    let words: Vec<&str> = header.split_whitespace().collect();
    if words.len() >= 3 && words[1].eq_ignore_ascii_case("in") {
        let ident = words[0];
        if ident.eq_ignore_ascii_case("in") || ident.starts_with('@') {
            return Err(TemplateError::InvalidIterationVariableName(ident.to_string(), pos));
        }
        let path = words[2..].join(" ");
        Ok((Some(ident.to_string()), path))
    } else {
        Ok((None, header.trim().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content(n: u32) -> Event<u32> {
        Event::Content(n, n as usize)
    }

    #[test]
    fn simple_if_else_pairs() {
        let events = vec![
            Event::OpenIf("x".into(), 0),
            content(1),
            Event::Else(2),
            content(3),
            Event::CloseIf(4),
        ];
        let spans = match_blocks(events).unwrap();
        assert_eq!(spans.len(), 1);
        match &spans[0] {
            Span::If(block) => {
                assert_eq!(block.branches.len(), 2);
                assert_eq!(block.branches[0].0, Some("x".to_string()));
                assert_eq!(block.branches[1].0, None);
            }
            _ => panic!("expected if block"),
        }
    }

    #[test]
    fn four_branch_if_elseif_elseif_else() {
        let events = vec![
            Event::OpenIf("a".into(), 0),
            Event::ElseIf("b".into(), 1),
            Event::ElseIf("c".into(), 2),
            Event::Else(3),
            Event::CloseIf(4),
        ];
        let spans = match_blocks(events).unwrap();
        match &spans[0] {
            Span::If(block) => assert_eq!(block.branches.len(), 4),
            _ => panic!("expected if block"),
        }
    }

    #[test]
    fn nested_foreach() {
        let events = vec![
            Event::OpenForeach("Categories".into(), 0),
            Event::OpenForeach("Items".into(), 1),
            content(2),
            Event::CloseForeach(3),
            Event::CloseForeach(4),
        ];
        let spans = match_blocks(events).unwrap();
        match &spans[0] {
            Span::Foreach(outer) => match &outer.body[0] {
                Span::Foreach(inner) => assert_eq!(inner.path, "Items"),
                _ => panic!("expected nested foreach"),
            },
            _ => panic!("expected foreach"),
        }
    }

    #[test]
    fn mismatched_closer_kind_is_error() {
        let events: Vec<Event<u32>> = vec![Event::OpenIf("x".into(), 0), Event::CloseForeach(1)];
        assert_eq!(match_blocks(events).unwrap_err(), TemplateError::UnmatchedLoopEnd(1));
    }

    #[test]
    fn else_after_else_is_error() {
        let events: Vec<Event<u32>> = vec![
            Event::OpenIf("x".into(), 0),
            Event::Else(1),
            Event::Else(2),
        ];
        assert_eq!(match_blocks(events).unwrap_err(), TemplateError::ElseAfterElse(2));
    }

    #[test]
    fn elseif_after_else_is_error() {
        let events: Vec<Event<u32>> = vec![
            Event::OpenIf("x".into(), 0),
            Event::Else(1),
            Event::ElseIf("y".into(), 2),
        ];
        assert_eq!(match_blocks(events).unwrap_err(), TemplateError::ElseIfAfterElse(2));
    }

    #[test]
    fn unclosed_if_is_error() {
        let events: Vec<Event<u32>> = vec![Event::OpenIf("x".into(), 7)];
        assert_eq!(match_blocks(events).unwrap_err(), TemplateError::UnmatchedConditionalStart(7));
    }

    #[test]
    fn foreach_header_with_named_variable() {
        let (var, path) = parse_foreach_header("item in Items", 0).unwrap();
        assert_eq!(var, Some("item".to_string()));
        assert_eq!(path, "Items");
    }

    #[test]
    fn foreach_header_reserved_word_in_is_rejected() {
        assert!(parse_foreach_header("in in Items", 0).is_err());
    }

    #[test]
    fn foreach_header_at_prefixed_name_is_rejected() {
        assert!(parse_foreach_header("@x in Items", 0).is_err());
    }

    #[test]
    fn foreach_header_without_in_is_bare_path() {
        let (var, path) = parse_foreach_header("Categories", 0).unwrap();
        assert_eq!(var, None);
        assert_eq!(path, "Categories");
    }
}
