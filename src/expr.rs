//! Expression parser and evaluator for conditions and value placeholders.
//!
//! A hand-written recursive-descent parser over a hand-written lexer, in the
//! style of the teacher's own `expr::do_expression` (also a hand-rolled,
//! lexer-free evaluator) but shaped for the boolean/comparison grammar
//! spec.md §4.3 specifies rather than arithmetic.

use crate::{
    path::{PathParseError, PropertyPath, Segment},
    scope::Scope,
    value::Value,
};
use rust_decimal::Decimal;
use std::str::FromStr;

/// An error parsing an expression.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExprError {
    /// The lexer found a character it couldn't classify.
    #[error("unexpected character '{0}' at offset {1}")]
    UnexpectedChar(char, usize),
    /// A quoted string literal was never closed.
    #[error("unterminated string literal starting at offset {0}")]
    UnterminatedString(usize),
    /// The parser expected one kind of token and found another (or none).
    #[error("unexpected token '{0}' at offset {1}")]
    UnexpectedToken(String, usize),
    /// The expression ended where more input was expected.
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    /// A path embedded in the expression failed to parse.
    #[error("invalid path: {0}")]
    Path(#[from] PathParseError),
}

/// A comparison operator. `Eq` also matches the source spelling `=` (spec.md
/// §3: "`=` and `==` are equivalent").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// An expression AST node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A literal string/integer/decimal/bool.
    Literal(Value),
    /// A property-path reference, e.g. `Customer.Name`.
    Path(PropertyPath),
    /// `not expr`.
    Not(Box<Expr>),
    /// `lhs and rhs`.
    And(Box<Expr>, Box<Expr>),
    /// `lhs or rhs`.
    Or(Box<Expr>, Box<Expr>),
    /// `lhs <op> rhs`.
    Compare(Box<Expr>, CompareOp, Box<Expr>),
}

impl Expr {
    /// Evaluates this expression against `scope`.
    pub fn eval(&self, scope: &Scope) -> Value {
        match self {
            Expr::Literal(v) => v.clone(),
            Expr::Path(path) => path.resolve(scope).unwrap_or(Value::Null),
            Expr::Not(inner) => Value::Bool(!inner.eval(scope).is_truthy()),
            Expr::And(lhs, rhs) => {
                Value::Bool(lhs.eval(scope).is_truthy() && rhs.eval(scope).is_truthy())
            }
            Expr::Or(lhs, rhs) => {
                Value::Bool(lhs.eval(scope).is_truthy() || rhs.eval(scope).is_truthy())
            }
            Expr::Compare(lhs, op, rhs) => {
                Value::Bool(compare(&lhs.eval(scope), *op, &rhs.eval(scope)))
            }
        }
    }

    /// `true` if resolving this expression (or any path it references) would
    /// hit a missing value — used by the validator, which needs to know
    /// *whether* resolution succeeded, not just the resulting truthiness.
    pub fn path(&self) -> Option<&PropertyPath> {
        match self {
            Expr::Path(path) => Some(path),
            _ => None,
        }
    }
}

/// Compares two values per spec.md §4.3: numeric comparisons widen
/// `Integer`/`Decimal` mixes; string equality is case-sensitive; otherwise
/// unresolvable cross-type comparisons evaluate false.
fn compare(lhs: &Value, op: CompareOp, rhs: &Value) -> bool {
    if let (Some(l), Some(r)) = (lhs.as_decimal(), rhs.as_decimal()) {
        return apply_ord(l.cmp(&r), op);
    }
    if let (Value::String(l), Value::String(r)) = (lhs, rhs) {
        return apply_ord(l.cmp(r), op);
    }
    if let (Value::Bool(l), Value::Bool(r)) = (lhs, rhs) {
        return match op {
            CompareOp::Eq => l == r,
            CompareOp::Ne => l != r,
            _ => false,
        };
    }
    match op {
        CompareOp::Eq => values_loosely_equal(lhs, rhs),
        CompareOp::Ne => !values_loosely_equal(lhs, rhs),
        _ => false,
    }
}

fn values_loosely_equal(lhs: &Value, rhs: &Value) -> bool {
    matches!((lhs, rhs), (Value::Null, Value::Null))
}

fn apply_ord(ord: std::cmp::Ordering, op: CompareOp) -> bool {
    use std::cmp::Ordering::*;
    match op {
        CompareOp::Eq => ord == Equal,
        CompareOp::Ne => ord != Equal,
        CompareOp::Lt => ord == Less,
        CompareOp::Le => ord != Greater,
        CompareOp::Gt => ord == Greater,
        CompareOp::Ge => ord != Less,
    }
}

/// Parses `text` as an expression (the grammar in spec.md §4.3).
pub fn parse(text: &str) -> Result<Expr, ExprError> {
    let tokens = lex(text)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_or()?;
    if let Some(tok) = parser.peek() {
        return Err(ExprError::UnexpectedToken(format!("{:?}", tok.kind), tok.offset));
    }
    Ok(expr)
}

// --- Lexer -----------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,
    And,
    Or,
    Not,
    True,
    False,
    Op(CompareOp),
    Ident(String),
    Int(i64),
    Decimal(Decimal),
    Str(String),
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    offset: usize,
}

/// Maps an opening quote character to its matching closer, per spec.md §3:
/// "String literals inside expressions accept straight and typographic
/// quotation marks... with matching pairs."
fn quote_close(open: char) -> Option<char> {
    match open {
        '"' => Some('"'),
        '\'' => Some('\''),
        '\u{2018}' => Some('\u{2019}'),
        '\u{2019}' => Some('\u{2018}'),
        '\u{201C}' => Some('\u{201D}'),
        '\u{201D}' => Some('\u{201C}'),
        _ => None,
    }
}

fn lex(text: &str) -> Result<Vec<Token>, ExprError> {
    let mut tokens = Vec::new();
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut i = 0;
    while i < chars.len() {
        let (offset, ch) = chars[i];
        if ch.is_whitespace() {
            i += 1;
            continue;
        }
        match ch {
            '(' => {
                tokens.push(Token { kind: TokenKind::LParen, offset });
                i += 1;
            }
            ')' => {
                tokens.push(Token { kind: TokenKind::RParen, offset });
                i += 1;
            }
            '[' => {
                tokens.push(Token { kind: TokenKind::LBracket, offset });
                i += 1;
            }
            ']' => {
                tokens.push(Token { kind: TokenKind::RBracket, offset });
                i += 1;
            }
            '.' if !matches!(chars.get(i + 1), Some((_, c)) if c.is_ascii_digit()) => {
                tokens.push(Token { kind: TokenKind::Dot, offset });
                i += 1;
            }
            '=' => {
                if matches!(chars.get(i + 1), Some((_, '='))) {
                    tokens.push(Token { kind: TokenKind::Op(CompareOp::Eq), offset });
                    i += 2;
                } else {
                    tokens.push(Token { kind: TokenKind::Op(CompareOp::Eq), offset });
                    i += 1;
                }
            }
            '!' if matches!(chars.get(i + 1), Some((_, '='))) => {
                tokens.push(Token { kind: TokenKind::Op(CompareOp::Ne), offset });
                i += 2;
            }
            '<' => {
                if matches!(chars.get(i + 1), Some((_, '='))) {
                    tokens.push(Token { kind: TokenKind::Op(CompareOp::Le), offset });
                    i += 2;
                } else {
                    tokens.push(Token { kind: TokenKind::Op(CompareOp::Lt), offset });
                    i += 1;
                }
            }
            '>' => {
                if matches!(chars.get(i + 1), Some((_, '='))) {
                    tokens.push(Token { kind: TokenKind::Op(CompareOp::Ge), offset });
                    i += 2;
                } else {
                    tokens.push(Token { kind: TokenKind::Op(CompareOp::Gt), offset });
                    i += 1;
                }
            }
            c if quote_close(c).is_some() => {
                let close = quote_close(c).unwrap();
                let start = i;
                i += 1;
                let mut s = String::new();
                let mut closed = false;
                while i < chars.len() {
                    let (_, c2) = chars[i];
                    if c2 == close {
                        closed = true;
                        i += 1;
                        break;
                    }
                    s.push(c2);
                    i += 1;
                }
                if !closed {
                    return Err(ExprError::UnterminatedString(chars[start].0));
                }
                tokens.push(Token { kind: TokenKind::Str(s), offset });
            }
            c if c.is_ascii_digit() => {
                let start = i;
                let mut end = i + 1;
                while end < chars.len() && chars[end].1.is_ascii_digit() {
                    end += 1;
                }
                let mut is_decimal = false;
                if end < chars.len() && chars[end].1 == '.' {
                    let mut look = end + 1;
                    if look < chars.len() && chars[look].1.is_ascii_digit() {
                        is_decimal = true;
                        look += 1;
                        while look < chars.len() && chars[look].1.is_ascii_digit() {
                            look += 1;
                        }
                        end = look;
                    }
                }
                let end_byte = chars.get(end).map(|(o, _)| *o).unwrap_or(text.len());
                let slice = &text[offset..end_byte];
                let kind = if is_decimal {
                    TokenKind::Decimal(
                        Decimal::from_str(slice)
                            .map_err(|_| ExprError::UnexpectedChar(ch, offset))?,
                    )
                } else {
                    TokenKind::Int(slice.parse::<i64>().map_err(|_| ExprError::UnexpectedChar(ch, offset))?)
                };
                tokens.push(Token { kind, offset });
                i = end;
                let _ = start;
            }
            c if c.is_alphabetic() || c == '_' || c == '@' => {
                let start = i;
                let mut end = i + 1;
                while end < chars.len() {
                    let c2 = chars[end].1;
                    if c2.is_alphanumeric() || c2 == '_' || c2 == '@' {
                        end += 1;
                    } else {
                        break;
                    }
                }
                let end_byte = chars.get(end).map(|(o, _)| *o).unwrap_or(text.len());
                let word = &text[offset..end_byte];
                let kind = match word.to_ascii_lowercase().as_str() {
                    "and" => TokenKind::And,
                    "or" => TokenKind::Or,
                    "not" => TokenKind::Not,
                    "true" => TokenKind::True,
                    "false" => TokenKind::False,
                    _ => TokenKind::Ident(word.to_string()),
                };
                tokens.push(Token { kind, offset });
                i = end;
                let _ = start;
            }
            other => return Err(ExprError::UnexpectedChar(other, offset)),
        }
    }
    Ok(tokens)
}

// --- Parser ------------------------------------------------------------------

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_and()?;
        while matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Or)) {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_unary()?;
        while matches!(self.peek().map(|t| &t.kind), Some(TokenKind::And)) {
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Not)) {
            self.advance();
            let inner = self.parse_unary()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExprError> {
        let lhs = self.parse_primary()?;
        if let Some(Token { kind: TokenKind::Op(op), .. }) = self.peek() {
            let op = *op;
            self.advance();
            let rhs = self.parse_primary()?;
            return Ok(Expr::Compare(Box::new(lhs), op, Box::new(rhs)));
        }
        Ok(lhs)
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        let tok = self.advance().ok_or(ExprError::UnexpectedEnd)?;
        match tok.kind {
            TokenKind::LParen => {
                let inner = self.parse_or()?;
                match self.advance() {
                    Some(Token { kind: TokenKind::RParen, .. }) => Ok(inner),
                    Some(other) => Err(ExprError::UnexpectedToken(format!("{:?}", other.kind), other.offset)),
                    None => Err(ExprError::UnexpectedEnd),
                }
            }
            TokenKind::Str(s) => Ok(Expr::Literal(Value::String(s))),
            TokenKind::Int(n) => Ok(Expr::Literal(Value::Integer(n))),
            TokenKind::Decimal(d) => Ok(Expr::Literal(Value::Decimal(d))),
            TokenKind::True => Ok(Expr::Literal(Value::Bool(true))),
            TokenKind::False => Ok(Expr::Literal(Value::Bool(false))),
            TokenKind::Dot => self.parse_path(true, None),
            TokenKind::Ident(name) => self.parse_path(false, Some(name)),
            other => Err(ExprError::UnexpectedToken(format!("{other:?}"), tok.offset)),
        }
    }

    /// Parses the remainder of a property path starting either with a leading
    /// `.` (relative) or an already-consumed leading identifier.
    fn parse_path(&mut self, relative: bool, first: Option<String>) -> Result<Expr, ExprError> {
        let mut segments = Vec::new();
        if let Some(name) = first {
            segments.push(Segment::Name(name));
        }
        loop {
            match self.peek().map(|t| &t.kind) {
                Some(TokenKind::Dot) => {
                    self.advance();
                    match self.advance() {
                        Some(Token { kind: TokenKind::Ident(name), .. }) => {
                            segments.push(Segment::Name(name));
                        }
                        Some(other) => {
                            return Err(ExprError::UnexpectedToken(format!("{:?}", other.kind), other.offset))
                        }
                        None => return Err(ExprError::UnexpectedEnd),
                    }
                }
                Some(TokenKind::LBracket) => {
                    self.advance();
                    let seg = match self.advance() {
                        Some(Token { kind: TokenKind::Int(n), .. }) => Segment::Index(n),
                        Some(Token { kind: TokenKind::Str(s), .. }) => Segment::Name(s),
                        Some(Token { kind: TokenKind::Ident(name), .. }) => Segment::DynamicIndex(name),
                        Some(other) => {
                            return Err(ExprError::UnexpectedToken(format!("{:?}", other.kind), other.offset))
                        }
                        None => return Err(ExprError::UnexpectedEnd),
                    };
                    match self.advance() {
                        Some(Token { kind: TokenKind::RBracket, .. }) => {}
                        Some(other) => {
                            return Err(ExprError::UnexpectedToken(format!("{:?}", other.kind), other.offset))
                        }
                        None => return Err(ExprError::UnexpectedEnd),
                    }
                    segments.push(seg);
                }
                _ => break,
            }
        }
        Ok(Expr::Path(PropertyPath { relative, segments }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn scope_with(entries: &[(&str, Value)]) -> Scope {
        let mut map = IndexMap::new();
        for (k, v) in entries {
            map.insert((*k).to_string(), v.clone());
        }
        Scope::new(Value::Mapping(map))
    }

    #[test]
    fn typographic_quotes_parse_like_straight_quotes() {
        let expr = parse("Status = \u{201C}Active\u{201D}").unwrap();
        let scope = scope_with(&[("Status", Value::String("Active".into()))]);
        assert!(expr.eval(&scope).is_truthy());
    }

    #[test]
    fn equals_and_double_equals_are_equivalent() {
        let scope = scope_with(&[("n", Value::Integer(5))]);
        assert_eq!(parse("n = 5").unwrap().eval(&scope).is_truthy(), true);
        assert_eq!(parse("n == 5").unwrap().eval(&scope).is_truthy(), true);
    }

    #[test]
    fn precedence_comparison_then_not_then_and_then_or() {
        // "not a = 1 and b = 2 or c = 3" should parse as
        // ((not (a=1)) and (b=2)) or (c=3)
        let scope = scope_with(&[
            ("a", Value::Integer(2)),
            ("b", Value::Integer(2)),
            ("c", Value::Integer(9)),
        ]);
        let expr = parse("not a = 1 and b = 2 or c = 3").unwrap();
        assert!(!expr.eval(&scope).is_truthy());

        let scope2 = scope_with(&[
            ("a", Value::Integer(2)),
            ("b", Value::Integer(2)),
            ("c", Value::Integer(3)),
        ]);
        assert!(expr.eval(&scope2).is_truthy());
    }

    #[test]
    fn decimal_vs_integer_widens_for_comparison() {
        let scope = scope_with(&[("price", Value::Decimal(Decimal::from_str("10.00").unwrap()))]);
        let expr = parse("price = 10").unwrap();
        assert!(expr.eval(&scope).is_truthy());
    }

    #[test]
    fn parenthesized_expression() {
        let scope = scope_with(&[("a", Value::Bool(false)), ("b", Value::Bool(true))]);
        let expr = parse("(a or b) and b").unwrap();
        assert!(expr.eval(&scope).is_truthy());
    }

    #[test]
    fn cross_type_comparison_is_false_not_error() {
        let scope = scope_with(&[("a", Value::Integer(1))]);
        let expr = parse("a = \"1\"").unwrap();
        assert!(!expr.eval(&scope).is_truthy());
    }

    #[test]
    fn four_branch_scores_grade_c() {
        let scope = scope_with(&[("Score", Value::Integer(75))]);
        assert!(!parse("Score >= 90").unwrap().eval(&scope).is_truthy());
        assert!(!parse("Score >= 80").unwrap().eval(&scope).is_truthy());
        assert!(parse("Score >= 70").unwrap().eval(&scope).is_truthy());
    }
}
