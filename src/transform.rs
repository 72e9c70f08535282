//! The tree transformer: expands foreach blocks, resolves conditionals,
//! splices inline regions, substitutes placeholders, and preserves
//! formatting — spec.md §4.5.
//!
//! Discovery and resolution share one generic walk ([`resolve_spans`]) over
//! the [`crate::block::Span`] tree the block matcher produces, parameterized
//! by the leaf type: [`crate::doc::model::BodyBlock`] for paragraph-level
//! work, [`crate::doc::model::Row`] for table-row-level work, and
//! [`InlineItem`] for inline splicing within one paragraph.

use crate::{
    block::{self, Span},
    doc::model::{Body, BodyBlock, Paragraph, Row, Table},
    error::Error,
    format::{BooleanFormatters, Culture},
    options::{MissingVariableBehavior, Options},
    path::PropertyPath,
    render::{self, RenderOptions},
    result::{Warning, WarningCollector},
    scope::Scope,
    token::{self, Match, RunPos, TokenKind},
    value::Value,
};

/// Mutable state threaded through one top-level `transform` call: counters,
/// accumulated warnings, and the caller's options.
pub struct Context<'a> {
    options: &'a Options,
    pub replacement_count: usize,
    warnings: WarningCollector,
    next_para_id: u32,
    next_bookmark_id: u32,
}

impl<'a> Context<'a> {
    pub fn new(options: &'a Options) -> Self {
        Context {
            options,
            replacement_count: 0,
            warnings: WarningCollector::default(),
            next_para_id: 1,
            next_bookmark_id: 1,
        }
    }

    fn next_para_id(&mut self) -> u32 {
        let id = self.next_para_id;
        self.next_para_id += 1;
        id
    }

    fn next_bookmark_id(&mut self) -> u32 {
        let id = self.next_bookmark_id;
        self.next_bookmark_id += 1;
        id
    }

    fn culture(&self) -> &Culture {
        &self.options.culture
    }

    fn booleans(&self) -> &BooleanFormatters {
        &self.options.boolean_formatter_registry
    }

    fn render_options(&self) -> RenderOptions<'_> {
        RenderOptions {
            text_replacements: &self.options.text_replacements,
            enable_newline_support: self.options.enable_newline_support,
        }
    }

    fn warn(&mut self, warning: Warning) {
        log::debug!("{warning:?}");
        self.warnings.push(warning);
    }

    pub fn into_warnings(self) -> (Vec<Warning>, Vec<String>) {
        (self.warnings.warnings.clone(), self.warnings.missing_variables())
    }
}

/// Transforms `body` in place against `data`, per spec.md §4.5.
pub fn transform(body: &mut Body, data: Value, options: &Options) -> Result<Context<'_>, Error> {
    let mut ctx = Context::new(options);
    let scope = Scope::new(data);
    transform_body(body, &scope, &mut ctx)?;
    Ok(ctx)
}

fn transform_body(body: &mut Body, scope: &Scope, ctx: &mut Context) -> Result<(), Error> {
    let blocks = std::mem::take(&mut body.blocks);
    let events = body_events(blocks)?;
    let spans = block::match_blocks(events)?;
    body.blocks = resolve_spans(spans, scope, ctx, &mut transform_body_block)?;
    Ok(())
}

/// Classifies each body block as ordinary content or, if it is a
/// marker-only paragraph, a block-matcher event (spec.md §4.2: "Such
/// paragraphs do not contribute to output").
pub(crate) fn body_events(blocks: Vec<BodyBlock>) -> Result<Vec<block::Event<BodyBlock>>, Error> {
    let mut events = Vec::with_capacity(blocks.len());
    for (idx, block) in blocks.into_iter().enumerate() {
        if let BodyBlock::Paragraph(para) = &block {
            if let Some(kind) = marker_only_kind(para)? {
                events.push(marker_event(kind, idx)?);
                continue;
            }
        }
        events.push(block::Event::Content(block, idx));
    }
    Ok(events)
}

/// If `para`'s entire trimmed text is exactly one block marker token,
/// returns that token's kind.
pub(crate) fn marker_only_kind(para: &Paragraph) -> Result<Option<TokenKind>, Error> {
    let tokens = token::scan(&para.runs)?;
    if tokens.len() != 1 {
        return Ok(None);
    }
    let only = &tokens[0];
    if !only.kind.is_block_marker() {
        return Ok(None);
    }
    let reconstructed = format!("{{{{{}}}}}", only.raw_inner);
    if para.text().trim() == reconstructed.trim() {
        Ok(Some(only.kind.clone()))
    } else {
        Ok(None)
    }
}

fn marker_event<T>(kind: TokenKind, pos: usize) -> Result<block::Event<T>, Error> {
    Ok(match kind {
        TokenKind::IfStart(cond) => block::Event::OpenIf(cond, pos),
        TokenKind::ElseIf(cond) => block::Event::ElseIf(cond, pos),
        TokenKind::Else => block::Event::Else(pos),
        TokenKind::IfEnd => block::Event::CloseIf(pos),
        TokenKind::ForeachStart(header) => block::Event::OpenForeach(header, pos),
        TokenKind::ForeachEnd => block::Event::CloseForeach(pos),
        TokenKind::Placeholder { .. } => unreachable!("placeholders are never marker-only"),
    })
}

/// Walks a resolved [`Span`] tree, keeping the winning conditional branch and
/// expanding foreach bodies per element, transforming each surviving leaf
/// with `transform_leaf`. Shared by the paragraph-level (`T = BodyBlock`)
/// and table-row-level (`T = Row`) passes.
fn resolve_spans<T: Clone>(
    spans: Vec<Span<T>>,
    scope: &Scope,
    ctx: &mut Context,
    transform_leaf: &mut dyn FnMut(T, &Scope, &mut Context) -> Result<T, Error>,
) -> Result<Vec<T>, Error> {
    let mut out = Vec::new();
    for span in spans {
        match span {
            Span::Content(item) => out.push(transform_leaf(item, scope, ctx)?),
            Span::If(if_block) => {
                for (cond, body) in if_block.branches {
                    let take = match &cond {
                        Some(text) => eval_condition(text, scope),
                        None => true,
                    };
                    if take {
                        out.extend(resolve_spans(body, scope, ctx, transform_leaf)?);
                        break;
                    }
                }
            }
            Span::Foreach(foreach) => {
                out.extend(expand_foreach(&foreach.path, foreach.var.clone(), foreach.body, scope, ctx, transform_leaf)?);
            }
        }
    }
    Ok(out)
}

fn expand_foreach<T: Clone>(
    path_text: &str,
    var: Option<String>,
    body: Vec<Span<T>>,
    scope: &Scope,
    ctx: &mut Context,
    transform_leaf: &mut dyn FnMut(T, &Scope, &mut Context) -> Result<T, Error>,
) -> Result<Vec<T>, Error> {
    match resolve_collection(path_text, scope) {
        None => {
            ctx.warn(Warning::MissingLoopCollection(path_text.to_string()));
            Ok(Vec::new())
        }
        Some(Value::Null) => {
            ctx.warn(Warning::NullLoopCollection(path_text.to_string()));
            Ok(Vec::new())
        }
        Some(Value::Sequence(items)) => {
            let n = items.len();
            let mut out = Vec::new();
            for (i, elem) in items.into_iter().enumerate() {
                let inner_scope = scope.push_loop(var.clone(), elem, i, n);
                out.extend(resolve_spans(body.clone(), &inner_scope, ctx, transform_leaf)?);
            }
            Ok(out)
        }
        Some(_) => {
            // A non-sequence, non-null collection path: not enumerable.
            ctx.warn(Warning::MissingLoopCollection(path_text.to_string()));
            Ok(Vec::new())
        }
    }
}

fn eval_condition(text: &str, scope: &Scope) -> bool {
    match crate::expr::parse(text) {
        Ok(expr) => expr.eval(scope).is_truthy(),
        Err(err) => {
            log::warn!("condition parse error in '{text}': {err}");
            false
        }
    }
}

fn resolve_collection(path_text: &str, scope: &Scope) -> Option<Value> {
    match PropertyPath::parse(path_text) {
        Ok(path) => path.resolve(scope),
        Err(err) => {
            log::warn!("foreach path parse error in '{path_text}': {err}");
            None
        }
    }
}

fn transform_body_block(block: BodyBlock, scope: &Scope, ctx: &mut Context) -> Result<BodyBlock, Error> {
    match block {
        BodyBlock::Paragraph(mut para) => {
            para.id = ctx.next_para_id();
            for bookmark in para.bookmarks.iter_mut() {
                bookmark.id = ctx.next_bookmark_id();
            }
            transform_paragraph_inline(&mut para, scope, ctx)?;
            Ok(BodyBlock::Paragraph(para))
        }
        BodyBlock::Table(mut table) => {
            transform_table(&mut table, scope, ctx)?;
            Ok(BodyBlock::Table(table))
        }
        BodyBlock::Passthrough(text) => Ok(BodyBlock::Passthrough(text)),
    }
}

fn transform_table(table: &mut Table, scope: &Scope, ctx: &mut Context) -> Result<(), Error> {
    let rows = std::mem::take(&mut table.rows);
    let events = row_events(rows)?;
    let spans = block::match_blocks(events)?;
    table.rows = resolve_spans(spans, scope, ctx, &mut transform_row)?;
    Ok(())
}

fn transform_row(mut row: Row, scope: &Scope, ctx: &mut Context) -> Result<Row, Error> {
    for cell in row.cells.iter_mut() {
        transform_body(&mut cell.body, scope, ctx)?;
    }
    Ok(row)
}

/// A row is marker-only when it has exactly one cell whose body is a single
/// marker-only paragraph (spec.md §4.2: "if a row's sole textual content is
/// one block marker"). Rows with richer structure are never table-row-scoped
/// markers, only ordinary content.
pub(crate) fn row_events(rows: Vec<Row>) -> Result<Vec<block::Event<Row>>, Error> {
    let mut events = Vec::with_capacity(rows.len());
    for (idx, row) in rows.into_iter().enumerate() {
        if row.cells.len() == 1 {
            if let [BodyBlock::Paragraph(para)] = row.cells[0].body.blocks.as_slice() {
                if let Some(kind) = marker_only_kind(para)? {
                    events.push(marker_event(kind, idx)?);
                    continue;
                }
            }
        }
        events.push(block::Event::Content(row, idx));
    }
    Ok(events)
}

// --- Inline splicing ---------------------------------------------------------

/// One leaf of a paragraph's inline span tree: either an untouched literal
/// text range, or a resolved placeholder awaiting substitution.
#[derive(Debug, Clone)]
enum InlineItem {
    Literal(RunPos, RunPos),
    Placeholder(Match),
}

/// Inline conditional/loop resolution and placeholder substitution for one
/// paragraph (spec.md §4.5 rules 4 and 5), unified: a paragraph with no
/// block markers degenerates to a single flat list of literal/placeholder
/// items with no branching.
fn transform_paragraph_inline(para: &mut Paragraph, scope: &Scope, ctx: &mut Context) -> Result<(), Error> {
    let tokens = token::scan(&para.runs)?;
    let original_runs = para.runs.clone();
    let events = inline_events(&original_runs, &tokens);
    let spans = block::match_blocks(events)?;
    let resolved = resolve_inline_spans(spans, scope, ctx)?;

    let mut new_runs = Vec::new();
    for (item, item_scope) in resolved {
        match item {
            InlineItem::Literal(start, end) => new_runs.extend(slice_runs(&original_runs, start, end)),
            InlineItem::Placeholder(m) => new_runs.extend(substitute_placeholder(&m, &item_scope, ctx)?),
        }
    }
    para.runs = new_runs;
    Ok(())
}

fn paragraph_end_pos(runs: &[Run_]) -> RunPos {
    match runs.last() {
        Some(last) => RunPos { run: runs.len() - 1, offset: last.text.chars().count() },
        None => RunPos { run: 0, offset: 0 },
    }
}

fn inline_events(runs: &[Run_], tokens: &[Match]) -> Vec<block::Event<InlineItem>> {
    let mut events = Vec::new();
    let mut cursor = RunPos { run: 0, offset: 0 };
    for (i, m) in tokens.iter().enumerate() {
        if pos_lt(cursor, m.start) {
            events.push(block::Event::Content(InlineItem::Literal(cursor, m.start), i));
        }
        match &m.kind {
            TokenKind::IfStart(cond) => events.push(block::Event::OpenIf(cond.clone(), i)),
            TokenKind::ElseIf(cond) => events.push(block::Event::ElseIf(cond.clone(), i)),
            TokenKind::Else => events.push(block::Event::Else(i)),
            TokenKind::IfEnd => events.push(block::Event::CloseIf(i)),
            TokenKind::ForeachStart(header) => events.push(block::Event::OpenForeach(header.clone(), i)),
            TokenKind::ForeachEnd => events.push(block::Event::CloseForeach(i)),
            TokenKind::Placeholder { .. } => {
                events.push(block::Event::Content(InlineItem::Placeholder(m.clone()), i));
            }
        }
        cursor = m.end;
    }
    let end = paragraph_end_pos(runs);
    if pos_lt(cursor, end) {
        events.push(block::Event::Content(InlineItem::Literal(cursor, end), tokens.len()));
    }
    events
}

fn pos_lt(a: RunPos, b: RunPos) -> bool {
    (a.run, a.offset) < (b.run, b.offset)
}

/// Resolves an inline span tree into a flat, ordered list of surviving
/// leaves, each paired with the scope it should be rendered under (loop
/// iterations push distinct scopes for their own body).
fn resolve_inline_spans(
    spans: Vec<Span<InlineItem>>,
    scope: &Scope,
    ctx: &mut Context,
) -> Result<Vec<(InlineItem, Scope)>, Error> {
    let mut out = Vec::new();
    for span in spans {
        match span {
            Span::Content(item) => out.push((item, scope.clone())),
            Span::If(if_block) => {
                for (cond, body) in if_block.branches {
                    let take = match &cond {
                        Some(text) => eval_condition(text, scope),
                        None => true,
                    };
                    if take {
                        out.extend(resolve_inline_spans(body, scope, ctx)?);
                        break;
                    }
                }
            }
            Span::Foreach(foreach) => match resolve_collection(&foreach.path, scope) {
                None => ctx.warn(Warning::MissingLoopCollection(foreach.path.clone())),
                Some(Value::Null) => ctx.warn(Warning::NullLoopCollection(foreach.path.clone())),
                Some(Value::Sequence(items)) => {
                    let n = items.len();
                    for (i, elem) in items.into_iter().enumerate() {
                        let inner_scope = scope.push_loop(foreach.var.clone(), elem, i, n);
                        out.extend(resolve_inline_spans(foreach.body.clone(), &inner_scope, ctx)?);
                    }
                }
                Some(_) => ctx.warn(Warning::MissingLoopCollection(foreach.path.clone())),
            },
        }
    }
    Ok(out)
}

/// Extracts the run(s) spanning `[start, end)`, preserving each underlying
/// run's own properties (spec.md §3: formatting carried verbatim for
/// untouched text).
fn slice_runs(runs: &[Run_], start: RunPos, end: RunPos) -> Vec<Run_> {
    if start.run == end.run {
        let run = &runs[start.run];
        let text: String = run.text.chars().skip(start.offset).take(end.offset - start.offset).collect();
        let mut sliced = Run_::new(text, std::rc::Rc::clone(&run.properties));
        if start.offset == 0 {
            sliced.breaks_before = run.breaks_before.clone();
        }
        return vec![sliced];
    }
    let mut out = Vec::new();
    let first = &runs[start.run];
    let head: String = first.text.chars().skip(start.offset).collect();
    if !head.is_empty() {
        let mut head_run = Run_::new(head, std::rc::Rc::clone(&first.properties));
        if start.offset == 0 {
            head_run.breaks_before = first.breaks_before.clone();
        }
        out.push(head_run);
    }
    for run in &runs[start.run + 1..end.run] {
        out.push(run.clone());
    }
    let last = &runs[end.run];
    let tail: String = last.text.chars().take(end.offset).collect();
    if !tail.is_empty() || out.is_empty() {
        let mut tail_run = Run_::new(tail, std::rc::Rc::clone(&last.properties));
        tail_run.breaks_before = last.breaks_before.clone();
        out.push(tail_run);
    }
    out
}

/// Evaluates and renders one placeholder token, applying the
/// missing-variable policy and recording the replacement count / warnings.
fn substitute_placeholder(m: &Match, scope: &Scope, ctx: &mut Context) -> Result<Vec<Run_>, Error> {
    let (expr_text, format) = match &m.kind {
        TokenKind::Placeholder { expr, format } => (expr.as_str(), format.clone()),
        _ => unreachable!("non-placeholder token reached substitution"),
    };

    let expr = match crate::expr::parse(expr_text) {
        Ok(e) => e,
        Err(err) => {
            log::warn!("placeholder expression parse error in '{expr_text}': {err}");
            return handle_missing(expr_text, m, ctx);
        }
    };
    let value = expr.eval(scope);

    if matches!(value, Value::Null) {
        return handle_missing(expr_text, m, ctx);
    }

    let text = crate::format::format_value(&value, format.as_deref(), ctx.culture(), ctx.booleans());
    let runs = render::render_value(&text, &m.preserved_properties, &ctx.render_options());
    ctx.replacement_count += 1;
    Ok(runs)
}

fn handle_missing(expr_text: &str, m: &Match, ctx: &mut Context) -> Result<Vec<Run_>, Error> {
    match ctx.options.missing_variable_behavior {
        MissingVariableBehavior::Fail => Err(Error::MissingVariableFatal(expr_text.to_string())),
        MissingVariableBehavior::ReplaceEmpty => {
            ctx.warn(Warning::MissingVariable(expr_text.to_string()));
            Ok(vec![Run_::new(String::new(), std::rc::Rc::clone(&m.preserved_properties))])
        }
        MissingVariableBehavior::LeaveUnchanged => {
            ctx.warn(Warning::MissingVariable(expr_text.to_string()));
            let original = format!("{{{{{}}}}}", m.raw_inner);
            Ok(vec![Run_::new(original, std::rc::Rc::clone(&m.preserved_properties))])
        }
    }
}

// Local aliases so this module reads naturally without repeating the full
// `doc::model::` path at every use.
use crate::doc::model::Run as Run_;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc::model::{ParagraphProperties, Run, RunProperties};
    use indexmap::IndexMap;
    use std::rc::Rc;

    fn plain_para(text: &str) -> Paragraph {
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

    fn data(entries: Vec<(&str, Value)>) -> Value {
        let mut map = IndexMap::new();
        for (k, v) in entries {
            map.insert(k.to_string(), v);
        }
        Value::Mapping(map)
    }

    fn body_text(body: &Body) -> Vec<String> {
        body.blocks
            .iter()
            .map(|b| match b {
                BodyBlock::Paragraph(p) => p.text(),
                _ => String::new(),
            })
            .collect()
    }

    #[test]
    fn simple_placeholder_substitution() {
        let mut body = body_of(vec![plain_para("Hello {{Name}}!")]);
        let options = Options::default();
        let ctx = transform(&mut body, data(vec![("Name", Value::String("John Doe".into()))]), &options).unwrap();
        assert_eq!(body_text(&body), vec!["Hello John Doe!"]);
        assert_eq!(ctx.replacement_count, 1);
    }

    #[test]
    fn inline_conditional_survives_false_branch_text() {
        let mut body = body_of(vec![plain_para("{{Street1}}{{#if Street2}}, {{Street2}}{{/if}}")]);
        let options = Options::default();
        transform(&mut body, data(vec![("Street1", Value::String("Main St 123".into()))]), &options).unwrap();
        assert_eq!(body_text(&body), vec!["Main St 123"]);
    }

    #[test]
    fn empty_value_between_brackets_yields_literal_brackets() {
        let mut body = body_of(vec![plain_para("[{{Name}}]")]);
        let options = Options::default();
        transform(&mut body, data(vec![("Name", Value::String(String::new()))]), &options).unwrap();
        assert_eq!(body_text(&body), vec!["[]"]);
    }

    #[test]
    fn missing_variable_leave_unchanged_preserves_text() {
        let mut body = body_of(vec![plain_para("Hello {{Name}}!")]);
        let options = Options::default();
        let ctx = transform(&mut body, data(vec![]), &options).unwrap();
        assert_eq!(body_text(&body), vec!["Hello {{Name}}!"]);
        let (_, missing) = ctx.into_warnings();
        assert_eq!(missing, vec!["Name".to_string()]);
    }

    #[test]
    fn foreach_cardinality_n_paragraphs_becomes_n_copies() {
        let mut body = body_of(vec![
            plain_para("{{#foreach Items}}"),
            plain_para("- {{.}}"),
            plain_para("{{/foreach}}"),
        ]);
        let options = Options::default();
        let items = Value::Sequence(vec![Value::String("a".into()), Value::String("b".into()), Value::String("c".into())]);
        transform(&mut body, data(vec![("Items", items)]), &options).unwrap();
        assert_eq!(body_text(&body), vec!["- a", "- b", "- c"]);
    }

    #[test]
    fn empty_collection_drops_block_silently() {
        let mut body = body_of(vec![
            plain_para("before"),
            plain_para("{{#foreach Items}}"),
            plain_para("- {{.}}"),
            plain_para("{{/foreach}}"),
            plain_para("after"),
        ]);
        let options = Options::default();
        transform(&mut body, data(vec![("Items", Value::Sequence(vec![]))]), &options).unwrap();
        assert_eq!(body_text(&body), vec!["before", "after"]);
    }

    #[test]
    fn nested_loop_relative_collection() {
        let mut categories = Vec::new();
        for (name, item_count) in [("Fruit", 2), ("Veg", 1)] {
            let items: Vec<Value> = (0..item_count).map(|i| data(vec![("Title", Value::String(format!("{name}{i}")))])).collect();
            categories.push(data(vec![("Name", Value::String(name.into())), ("Items", Value::Sequence(items))]));
        }
        let mut body = body_of(vec![
            plain_para("{{#foreach Categories}}"),
            plain_para("{{#foreach Items}}"),
            plain_para("- {{Title}}"),
            plain_para("{{/foreach}}"),
            plain_para("{{/foreach}}"),
        ]);
        let options = Options::default();
        transform(&mut body, data(vec![("Categories", Value::Sequence(categories))]), &options).unwrap();
        let texts = body_text(&body);
        assert_eq!(texts, vec!["- Fruit0", "- Fruit1", "- Veg0"]);
    }

    #[test]
    fn loop_scoped_conditional_sees_item_not_root() {
        let mut item_interview = IndexMap::new();
        item_interview.insert("settings".to_string(), data(vec![("isEnabled", Value::Bool(true))]));
        let asset = data(vec![("interview", Value::Mapping(item_interview))]);
        let mut body = body_of(vec![
            plain_para("{{#foreach assets}}"),
            plain_para("{{#if interview.settings.isEnabled}}YES{{#else}}NO{{/if}}"),
            plain_para("{{/foreach}}"),
        ]);
        let options = Options::default();
        let root = data(vec![("assets", Value::Sequence(vec![asset.clone(), asset])), ("interview", data(vec![]))]);
        transform(&mut body, root, &options).unwrap();
        assert_eq!(body_text(&body), vec!["YES", "YES"]);
    }

    #[test]
    fn four_branch_elseif_picks_grade_c() {
        let mut body = body_of(vec![plain_para(
            "Grade: {{#if Score >= 90}}A{{#elseif Score >= 80}}B{{#elseif Score >= 70}}C{{else}}F{{/if}}",
        )]);
        let options = Options::default();
        transform(&mut body, data(vec![("Score", Value::Integer(75))]), &options).unwrap();
        assert_eq!(body_text(&body), vec!["Grade: C"]);
    }
}
