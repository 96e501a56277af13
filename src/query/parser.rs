//! Parser for query-language snippets embedded in configuration.
//!
//! Legacy configurations carry function bodies, role predicates and object
//! references as snippets such as `Query(Lambda("x", Var("x")))`. They are
//! parsed into an [`Expr`] tree by a small recursive-descent parser and are
//! never evaluated.

use serde_json::Number;
use std::collections::BTreeMap;

use crate::catalog::ObjectKind;
use crate::error::QueryError;

use super::expr::Expr;

/// Maximum nesting depth accepted by the parser.
const MAX_DEPTH: usize = 128;

/// Parses a snippet into an expression tree.
///
/// # Errors
///
/// Returns an error if the snippet is malformed or a reference constructor
/// such as `Role(...)` is not given exactly one string argument.
pub fn parse_snippet(input: &str) -> Result<Expr, QueryError> {
    let mut parser = Parser { src: input, pos: 0 };
    let expr = parser.expr(0)?;
    parser.skip_ws();
    if parser.pos < input.len() {
        return Err(QueryError::syntax(parser.pos, "unexpected trailing input"));
    }
    Ok(expr)
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn expect(&mut self, want: char) -> Result<(), QueryError> {
        self.skip_ws();
        if self.peek() == Some(want) {
            self.bump();
            Ok(())
        } else {
            Err(QueryError::syntax(self.pos, format!("expected `{want}`")))
        }
    }

    fn expr(&mut self, depth: usize) -> Result<Expr, QueryError> {
        if depth > MAX_DEPTH {
            return Err(QueryError::syntax(self.pos, "nesting too deep"));
        }
        self.skip_ws();
        match self.peek() {
            Some('"') => self.string().map(Expr::String),
            Some('[') => self.array(depth),
            Some('{') => self.object(depth),
            Some(c) if c == '-' || c.is_ascii_digit() => self.number(),
            Some(c) if c.is_ascii_alphabetic() || c == '_' => self.ident_or_call(depth),
            Some(c) => Err(QueryError::syntax(self.pos, format!("unexpected `{c}`"))),
            None => Err(QueryError::syntax(self.pos, "unexpected end of input")),
        }
    }

    fn string(&mut self) -> Result<String, QueryError> {
        let start = self.pos;
        self.bump();
        let mut escaped = false;
        loop {
            match self.bump() {
                None => return Err(QueryError::syntax(start, "unterminated string")),
                Some('\\') if !escaped => escaped = true,
                Some('"') if !escaped => break,
                Some(_) => escaped = false,
            }
        }
        serde_json::from_str(&self.src[start..self.pos])
            .map_err(|e| QueryError::syntax(start, format!("invalid string literal: {e}")))
    }

    fn number(&mut self) -> Result<Expr, QueryError> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E'))
        {
            self.bump();
        }
        let text = &self.src[start..self.pos];
        text.parse::<Number>()
            .map(Expr::Number)
            .map_err(|_| QueryError::syntax(start, format!("invalid number `{text}`")))
    }

    fn ident(&mut self) -> &str {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.bump();
        }
        &self.src[start..self.pos]
    }

    fn ident_or_call(&mut self, depth: usize) -> Result<Expr, QueryError> {
        let name = self.ident().to_string();
        self.skip_ws();
        if self.peek() != Some('(') {
            return Ok(match name.as_str() {
                "true" => Expr::Bool(true),
                "false" => Expr::Bool(false),
                "null" => Expr::Null,
                _ => Expr::Var(name),
            });
        }
        self.bump();
        let args = self.items(')', depth)?;

        let Some(kind) = ObjectKind::from_label(&name) else {
            return Ok(Expr::Call { name, args });
        };
        match args.as_slice() {
            [Expr::String(target)] => Ok(Expr::reference(kind, target.clone())),
            _ => Err(QueryError::InvalidReference {
                call: name,
                message: String::from("expected exactly one string argument"),
            }),
        }
    }

    /// Parses comma-separated expressions up to `close`, which is consumed.
    fn items(&mut self, close: char, depth: usize) -> Result<Vec<Expr>, QueryError> {
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(close) {
                self.bump();
                return Ok(items);
            }
            items.push(self.expr(depth + 1)?);
            self.skip_ws();
            match self.bump() {
                Some(',') => {}
                Some(c) if c == close => return Ok(items),
                _ => {
                    return Err(QueryError::syntax(
                        self.pos,
                        format!("expected `,` or `{close}`"),
                    ));
                }
            }
        }
    }

    fn array(&mut self, depth: usize) -> Result<Expr, QueryError> {
        self.bump();
        self.items(']', depth).map(Expr::Array)
    }

    fn object(&mut self, depth: usize) -> Result<Expr, QueryError> {
        self.bump();
        let mut fields = BTreeMap::new();
        loop {
            self.skip_ws();
            let key = match self.peek() {
                Some('}') => {
                    self.bump();
                    return Ok(Expr::Object(fields));
                }
                Some('"') => self.string()?,
                Some(c) if c.is_ascii_alphabetic() || c == '_' => self.ident().to_string(),
                _ => return Err(QueryError::syntax(self.pos, "expected object key")),
            };
            self.expect(':')?;
            let value = self.expr(depth + 1)?;
            fields.insert(key, value);
            self.skip_ws();
            match self.bump() {
                Some(',') => {}
                Some('}') => return Ok(Expr::Object(fields)),
                _ => return Err(QueryError::syntax(self.pos, "expected `,` or `}`")),
            }
        }
    }
}
