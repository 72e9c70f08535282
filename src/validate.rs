//! Structural validation: walks a template the same way [`crate::transform`]
//! does — body-level marker-only paragraphs first, then each paragraph's
//! inline tokens — but only to collect diagnostics. Nothing is mutated, and
//! every branch of a conditional is visited (spec.md §6, `validate`: "every
//! placeholder the template could reach", not just the one the sample data
//! picks).

use crate::{
    block::{self, Span},
    doc::model::{Body, BodyBlock, Paragraph, Row, Table},
    error::TemplateError,
    options::Options,
    path::PropertyPath,
    result::{ValidationResult, Warning},
    scope::Scope,
    token::{self, TokenKind},
    transform,
    value::Value,
};
use indexmap::IndexMap;
use std::collections::BTreeSet;

struct Collector {
    errors: Vec<TemplateError>,
    warnings: Vec<Warning>,
    placeholders: BTreeSet<String>,
    missing: BTreeSet<String>,
}

impl Collector {
    fn new() -> Self {
        Collector { errors: Vec::new(), warnings: Vec::new(), placeholders: BTreeSet::new(), missing: BTreeSet::new() }
    }
}

/// Validates `body` against `data`, never mutating either. Structural errors
/// (unmatched markers, reserved iteration-variable names) are collected
/// rather than short-circuiting, so a single call reports everything wrong
/// with a template at once.
pub fn validate(body: &Body, data: &Value, _options: &Options) -> ValidationResult {
    let mut collector = Collector::new();
    let scope = Scope::new(data.clone());
    walk_body(body, &scope, &mut collector);

    ValidationResult {
        is_valid: collector.errors.is_empty(),
        errors: collector.errors,
        warnings: collector.warnings,
        all_placeholders: collector.placeholders.into_iter().collect(),
        missing_variables: collector.missing.into_iter().collect(),
    }
}

fn walk_body(body: &Body, scope: &Scope, collector: &mut Collector) {
    let events = match transform::body_events(body.blocks.clone()) {
        Ok(events) => events,
        Err(err) => {
            push_error(collector, err);
            return;
        }
    };
    let spans = match block::match_blocks(events) {
        Ok(spans) => spans,
        Err(err) => {
            collector.errors.push(err);
            return;
        }
    };
    walk_block_spans(&spans, scope, collector);
}

fn walk_block_spans(spans: &[Span<BodyBlock>], scope: &Scope, collector: &mut Collector) {
    for span in spans {
        match span {
            Span::Content(block) => walk_body_block(block, scope, collector),
            Span::If(if_block) => {
                for (cond, body) in &if_block.branches {
                    if let Some(text) = cond {
                        record_expr_path(text, scope, collector);
                    }
                    walk_block_spans(body, scope, collector);
                }
            }
            Span::Foreach(fb) => {
                record_collection_path(&fb.path, scope, collector);
                let loop_scope = push_foreach_scope(&fb.path, fb.var.clone(), scope);
                walk_block_spans(&fb.body, &loop_scope, collector);
            }
        }
    }
}

fn walk_body_block(block: &BodyBlock, scope: &Scope, collector: &mut Collector) {
    match block {
        BodyBlock::Paragraph(para) => walk_paragraph(para, scope, collector),
        BodyBlock::Table(table) => walk_table(table, scope, collector),
        BodyBlock::Passthrough(_) => {}
    }
}

fn walk_table(table: &Table, scope: &Scope, collector: &mut Collector) {
    let events = match transform::row_events(table.rows.clone()) {
        Ok(events) => events,
        Err(err) => {
            push_error(collector, err);
            return;
        }
    };
    let spans = match block::match_blocks(events) {
        Ok(spans) => spans,
        Err(err) => {
            collector.errors.push(err);
            return;
        }
    };
    walk_row_spans(&spans, scope, collector);
}

fn walk_row_spans(spans: &[Span<Row>], scope: &Scope, collector: &mut Collector) {
    for span in spans {
        match span {
            Span::Content(row) => {
                for cell in &row.cells {
                    walk_body(&cell.body, scope, collector);
                }
            }
            Span::If(if_block) => {
                for (cond, body) in &if_block.branches {
                    if let Some(text) = cond {
                        record_expr_path(text, scope, collector);
                    }
                    walk_row_spans(body, scope, collector);
                }
            }
            Span::Foreach(fb) => {
                record_collection_path(&fb.path, scope, collector);
                let loop_scope = push_foreach_scope(&fb.path, fb.var.clone(), scope);
                walk_row_spans(&fb.body, &loop_scope, collector);
            }
        }
    }
}

fn push_error(collector: &mut Collector, err: crate::error::Error) {
    if let crate::error::Error::Template(t) = err {
        collector.errors.push(t);
    }
}

/// Scans one paragraph's tokens: records every placeholder path, resolves
/// inline conditions/collections, and pairs any if/foreach markers wholly
/// contained within this paragraph.
fn walk_paragraph(para: &Paragraph, scope: &Scope, collector: &mut Collector) {
    let tokens = match token::scan(&para.runs) {
        Ok(tokens) => tokens,
        Err(err) => {
            collector.errors.push(err.into());
            return;
        }
    };

    // A marker-only paragraph's single token is already accounted for at the
    // body/row level; re-scanning it here would double-count.
    if matches!(transform::marker_only_kind(para), Ok(Some(_))) {
        return;
    }

    let mut marker_events = Vec::new();
    for (i, m) in tokens.iter().enumerate() {
        match &m.kind {
            TokenKind::Placeholder { expr, .. } => {
                collector.placeholders.insert(expr.clone());
                record_expr_path(expr, scope, collector);
            }
            TokenKind::IfStart(cond) => {
                record_expr_path(cond, scope, collector);
                marker_events.push(block::Event::OpenIf(cond.clone(), i));
            }
            TokenKind::ElseIf(cond) => {
                record_expr_path(cond, scope, collector);
                marker_events.push(block::Event::ElseIf(cond.clone(), i));
            }
            TokenKind::Else => marker_events.push(block::Event::Else(i)),
            TokenKind::IfEnd => marker_events.push(block::Event::CloseIf(i)),
            TokenKind::ForeachStart(header) => {
                if let Ok((_, path)) = block::parse_foreach_header(header, i) {
                    record_collection_path(&path, scope, collector);
                }
                marker_events.push(block::Event::OpenForeach(header.clone(), i));
            }
            TokenKind::ForeachEnd => marker_events.push(block::Event::CloseForeach(i)),
        }
    }

    let content_events: Vec<block::Event<()>> = marker_events.into_iter().collect();
    if let Err(err) = block::match_blocks(content_events) {
        collector.errors.push(err);
    }
}

/// Records a placeholder/condition's path as missing when it parses as a
/// bare property-path expression (no comparison/boolean operators) and fails
/// to resolve. Compound expressions aren't single paths and are left to
/// runtime evaluation (spec.md §7 leaves condition-level diagnostics
/// unspecified beyond structural correctness).
fn record_expr_path(text: &str, scope: &Scope, collector: &mut Collector) {
    let Ok(expr) = crate::expr::parse(text) else { return };
    if let Some(path) = expr.path() {
        if path.resolve(scope).is_none() {
            mark_missing(text, collector);
        }
    }
}

/// Builds the scope a loop body is validated under: not any one element (the
/// sample data might not cover every field a real run's collection would),
/// but a synthetic item unioning the member keys of every element observed,
/// so `{{#foreach Items}}{{Title}}{{/foreach}}` doesn't spuriously report
/// `Title` as missing just because `transform`'s per-item expansion isn't
/// running here.
fn push_foreach_scope(path_text: &str, var: Option<String>, scope: &Scope) -> Scope {
    let items = match PropertyPath::parse(path_text).ok().and_then(|p| p.resolve(scope)) {
        Some(Value::Sequence(items)) => items,
        _ => Vec::new(),
    };
    let count = items.len();
    let item = aggregate_loop_item(&items);
    scope.push_loop(var, item, 0, count.max(1))
}

/// Unions the member keys of every mapping in `items` into one synthetic
/// mapping; non-mapping elements fall back to the first element itself, so
/// relative (`.`) lookups inside the loop body still resolve against
/// something.
fn aggregate_loop_item(items: &[Value]) -> Value {
    let mut merged = IndexMap::new();
    let mut any_mapping = false;
    for item in items {
        if let Value::Mapping(map) = item {
            any_mapping = true;
            for (key, value) in map {
                merged.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }
    }
    if any_mapping {
        Value::Mapping(merged)
    } else {
        items.first().cloned().unwrap_or(Value::Null)
    }
}

fn record_collection_path(text: &str, scope: &Scope, collector: &mut Collector) {
    let Ok(path) = PropertyPath::parse(text) else { return };
    if path.resolve(scope).is_none() {
        mark_missing(text, collector);
    }
}

fn mark_missing(text: &str, collector: &mut Collector) {
    let name = text.trim().to_string();
    collector.missing.insert(name.clone());
    collector.warnings.push(Warning::MissingVariable(name));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc::model::{ParagraphProperties, Run, RunProperties};
    use indexmap::IndexMap;
    use std::rc::Rc;

    fn para(text: &str) -> Paragraph {
        Paragraph {
            id: 0,
            properties: ParagraphProperties::default(),
            runs: vec![Run::new(text, Rc::new(RunProperties::default()))],
            bookmarks: vec![],
        }
    }

    fn body_of(paragraphs: Vec<Paragraph>) -> Body {
        Body::new(paragraphs.into_iter().map(BodyBlock::Paragraph).collect())
    }

    #[test]
    fn valid_template_reports_all_placeholders() {
        let body = body_of(vec![para("Hello {{Name}}, you are {{Age}}.")]);
        let data = Value::mapping([("Name".to_string(), Value::String("A".into()))]);
        let result = validate(&body, &data, &Options::default());
        assert!(result.is_valid);
        assert_eq!(result.all_placeholders, vec!["Age".to_string(), "Name".to_string()]);
        assert_eq!(result.missing_variables, vec!["Age".to_string()]);
    }

    #[test]
    fn unclosed_if_is_reported_as_structural_error() {
        let body = body_of(vec![para("{{#if Flag}}text")]);
        let data = Value::Mapping(IndexMap::new());
        let result = validate(&body, &data, &Options::default());
        assert!(!result.is_valid);
        assert!(!result.errors.is_empty());
    }

    #[test]
    fn body_scoped_foreach_spanning_paragraphs_is_valid() {
        let body = body_of(vec![para("{{#foreach Items}}"), para("- {{.}}"), para("{{/foreach}}")]);
        let data = Value::Mapping(IndexMap::new());
        let result = validate(&body, &data, &Options::default());
        assert!(result.is_valid);
        assert_eq!(result.missing_variables, vec!["Items".to_string()]);
    }

    #[test]
    fn foreach_body_placeholders_resolve_against_aggregate_item_not_missing() {
        let body = body_of(vec![para("{{#foreach Items}}"), para("{{Title}}"), para("{{/foreach}}")]);
        let mut item = IndexMap::new();
        item.insert("Title".to_string(), Value::String("A".into()));
        let data = Value::mapping([("Items".to_string(), Value::Sequence(vec![Value::Mapping(item)]))]);
        let result = validate(&body, &data, &Options::default());
        assert!(result.is_valid);
        assert!(result.missing_variables.is_empty());
        assert_eq!(result.all_placeholders, vec!["Title".to_string()]);
    }

    #[test]
    fn foreach_body_placeholder_absent_from_every_element_is_reported_missing() {
        let body = body_of(vec![para("{{#foreach Items}}"), para("{{Missing}}"), para("{{/foreach}}")]);
        let mut item = IndexMap::new();
        item.insert("Title".to_string(), Value::String("A".into()));
        let data = Value::mapping([("Items".to_string(), Value::Sequence(vec![Value::Mapping(item)]))]);
        let result = validate(&body, &data, &Options::default());
        assert_eq!(result.missing_variables, vec!["Missing".to_string()]);
    }

    #[test]
    fn both_if_and_else_branch_placeholders_are_collected() {
        let body = body_of(vec![para("{{#if Flag}}{{A}}{{#else}}{{B}}{{/if}}")]);
        let data = Value::Mapping(IndexMap::new());
        let result = validate(&body, &data, &Options::default());
        assert!(result.is_valid);
        assert_eq!(result.all_placeholders, vec!["A".to_string(), "B".to_string()]);
    }
}
