//! A recursive-descent parser for the supported Python-like subset.
//!
//! Not a general Python parser: the grammar is `def NAME(params):` headers,
//! one statement per line, `+`/`*` binary operators, augmented assignment,
//! `for x in range(...):` loops with an indentation-delimited body,
//! `.shape` attribute access, subscript load, `pass`, `return`, and
//! int/float/bool literals and identifiers. Anything outside this grammar
//! is a [`FastpyError::Parse`]; anything inside it but outside what
//! lowering handles is a later `UnsupportedConstruct`.
//!
//! Indentation is measured per physical line before any token-level lexing
//! (see [`split_lines`]), so the lexer itself never has to recognize
//! `INDENT`/`DEDENT` tokens.

mod lexer;

use lexer::Token;

use crate::error::FastpyError;
use crate::host_ast::{BinOpKind, Expr, FunctionDef, HostModule, Stmt};

struct Line {
    indent: usize,
    tokens: Vec<Token>,
    offset: usize,
}

fn split_lines(source: &str) -> Result<Vec<Line>, FastpyError> {
    let mut lines = Vec::new();
    let mut offset = 0usize;
    for raw in source.split_inclusive('\n') {
        let line_offset = offset;
        offset += raw.len();
        let raw = raw.trim_end_matches('\n').trim_end_matches('\r');
        let trimmed_start = raw.trim_start_matches(' ');
        let indent = raw.len() - trimmed_start.len();
        let content = trimmed_start.trim_end();
        if content.is_empty() {
            continue;
        }
        let tokens = lexer::tokenize_line(content, line_offset + indent).map_err(
            |(byte_offset, message)| FastpyError::Parse { offset: byte_offset, message },
        )?;
        lines.push(Line { indent, tokens, offset: line_offset + indent });
    }
    Ok(lines)
}

/// Parse a complete source file into a [`HostModule`].
pub fn parse(source: &str) -> Result<HostModule, FastpyError> {
    let lines = split_lines(source)?;
    let header = lines.first().ok_or_else(|| FastpyError::Parse {
        offset: 0,
        message: "empty source, expected a function definition".into(),
    })?;
    if header.indent != 0 {
        return Err(FastpyError::Parse {
            offset: header.offset,
            message: "function definition must start at column 0".into(),
        });
    }

    let mut cursor = Cursor::new(&header.tokens, header.offset);
    cursor.expect(&Token::Def)?;
    let name = cursor.expect_ident()?;
    cursor.expect(&Token::LParen)?;
    let mut params = Vec::new();
    if !cursor.at(&Token::RParen) {
        loop {
            params.push(cursor.expect_ident()?);
            if cursor.at(&Token::Comma) {
                cursor.advance();
            } else {
                break;
            }
        }
    }
    cursor.expect(&Token::RParen)?;
    cursor.expect(&Token::Colon)?;
    cursor.expect_end()?;

    let rest = &lines[1..];
    let body_indent = rest
        .first()
        .map(|l| l.indent)
        .filter(|&i| i > header.indent)
        .ok_or_else(|| FastpyError::Parse {
            offset: header.offset,
            message: format!("function {name} has an empty body"),
        })?;
    let (body, consumed) = parse_block(rest, body_indent)?;
    if consumed != rest.len() {
        let bad = &rest[consumed];
        return Err(FastpyError::Parse {
            offset: bad.offset,
            message: "unexpected indentation after function body".into(),
        });
    }

    Ok(HostModule { function: FunctionDef { name, params, body } })
}

fn parse_block(lines: &[Line], indent: usize) -> Result<(Vec<Stmt>, usize), FastpyError> {
    let mut stmts = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let line = &lines[i];
        if line.indent < indent {
            break;
        }
        if line.indent > indent {
            return Err(FastpyError::Parse {
                offset: line.offset,
                message: "unexpected indent".into(),
            });
        }
        let (stmt, consumed) = parse_stmt(&lines[i..], indent)?;
        stmts.push(stmt);
        i += consumed;
    }
    Ok((stmts, i))
}

fn parse_stmt(lines: &[Line], indent: usize) -> Result<(Stmt, usize), FastpyError> {
    let line = &lines[0];
    let mut cursor = Cursor::new(&line.tokens, line.offset);
    match cursor.peek() {
        Some(Token::Pass) => {
            cursor.advance();
            cursor.expect_end()?;
            Ok((Stmt::Pass, 1))
        }
        Some(Token::Return) => {
            cursor.advance();
            let value = parse_expr(&mut cursor)?;
            cursor.expect_end()?;
            Ok((Stmt::Return(value), 1))
        }
        Some(Token::For) => {
            cursor.advance();
            let target = cursor.expect_ident()?;
            cursor.expect(&Token::In)?;
            let iter = parse_expr(&mut cursor)?;
            cursor.expect(&Token::Colon)?;
            cursor.expect_end()?;

            let rest = &lines[1..];
            let body_indent = rest
                .first()
                .map(|l| l.indent)
                .filter(|&i| i > indent)
                .ok_or_else(|| FastpyError::Parse {
                    offset: line.offset,
                    message: "for loop has an empty body".into(),
                })?;
            let (body, consumed) = parse_block(rest, body_indent)?;
            Ok((Stmt::For { target, iter, body }, 1 + consumed))
        }
        Some(Token::Ident(_)) => {
            let name = cursor.expect_ident()?;
            match cursor.peek() {
                Some(Token::Eq) => {
                    cursor.advance();
                    let value = parse_expr(&mut cursor)?;
                    cursor.expect_end()?;
                    Ok((Stmt::Assign { target: name, value }, 1))
                }
                Some(Token::PlusEq) => {
                    cursor.advance();
                    let value = parse_expr(&mut cursor)?;
                    cursor.expect_end()?;
                    Ok((Stmt::AugAssign { target: name, op: BinOpKind::Add, value }, 1))
                }
                Some(Token::StarEq) => {
                    cursor.advance();
                    let value = parse_expr(&mut cursor)?;
                    cursor.expect_end()?;
                    Ok((Stmt::AugAssign { target: name, op: BinOpKind::Mul, value }, 1))
                }
                Some(Token::LParen) => {
                    let call = parse_call(&mut cursor, name)?;
                    cursor.expect_end()?;
                    Ok((Stmt::Expr(call), 1))
                }
                Some(Token::LBracket) => {
                    cursor.advance();
                    let index = parse_expr(&mut cursor)?;
                    cursor.expect(&Token::RBracket)?;
                    cursor.expect(&Token::Eq)?;
                    let value = parse_expr(&mut cursor)?;
                    cursor.expect_end()?;
                    Ok((Stmt::SubscriptAssign { target: name, index, value }, 1))
                }
                _ => Err(cursor.unexpected("'=', '+=', '*=', '[' or '('")),
            }
        }
        _ => Err(cursor.unexpected("a statement")),
    }
}

fn parse_call(cursor: &mut Cursor, func: String) -> Result<Expr, FastpyError> {
    cursor.expect(&Token::LParen)?;
    let mut args = Vec::new();
    if !cursor.at(&Token::RParen) {
        loop {
            args.push(parse_expr(cursor)?);
            if cursor.at(&Token::Comma) {
                cursor.advance();
            } else {
                break;
            }
        }
    }
    cursor.expect(&Token::RParen)?;
    Ok(Expr::Call { func, args })
}

/// Parses `lhs (+ | *) rhs (+ | *) ...` left-associatively, without
/// distinguishing `+`/`*` precedence — the grammar's scenarios never mix
/// the two operators in a single expression.
fn parse_expr(cursor: &mut Cursor) -> Result<Expr, FastpyError> {
    let mut lhs = parse_postfix(cursor)?;
    loop {
        let op = match cursor.peek() {
            Some(Token::Plus) => BinOpKind::Add,
            Some(Token::Star) => BinOpKind::Mul,
            _ => break,
        };
        cursor.advance();
        let rhs = parse_postfix(cursor)?;
        lhs = Expr::BinOp { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
    }
    Ok(lhs)
}

fn parse_postfix(cursor: &mut Cursor) -> Result<Expr, FastpyError> {
    let mut expr = parse_atom(cursor)?;
    loop {
        match cursor.peek() {
            Some(Token::Dot) => {
                cursor.advance();
                let attr = cursor.expect_ident()?;
                expr = Expr::Attribute { value: Box::new(expr), attr };
            }
            Some(Token::LBracket) => {
                cursor.advance();
                let index = parse_expr(cursor)?;
                cursor.expect(&Token::RBracket)?;
                expr = Expr::Subscript { value: Box::new(expr), index: Box::new(index) };
            }
            _ => break,
        }
    }
    Ok(expr)
}

fn parse_atom(cursor: &mut Cursor) -> Result<Expr, FastpyError> {
    match cursor.advance() {
        Some(Token::Ident(name)) => {
            let name = name.clone();
            if cursor.at(&Token::LParen) {
                parse_call(cursor, name)
            } else if name == "range" {
                Ok(Expr::Name(name))
            } else {
                Ok(Expr::Name(name))
            }
        }
        Some(Token::Int(v)) => Ok(Expr::Int(*v)),
        Some(Token::Float(v)) => Ok(Expr::Float(*v)),
        Some(Token::True_) => Ok(Expr::Bool(true)),
        Some(Token::False_) => Ok(Expr::Bool(false)),
        Some(Token::Range) => Ok(Expr::Name("range".to_string())),
        Some(Token::LParen) => {
            let inner = parse_expr(cursor)?;
            cursor.expect(&Token::RParen)?;
            Ok(inner)
        }
        _ => Err(cursor.unexpected("an expression")),
    }
}

struct Cursor<'a> {
    tokens: &'a [Token],
    pos: usize,
    line_offset: usize,
}

impl<'a> Cursor<'a> {
    fn new(tokens: &'a [Token], line_offset: usize) -> Self {
        Cursor { tokens, pos: 0, line_offset }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn at(&self, tok: &Token) -> bool {
        matches!(self.peek(), Some(t) if std::mem::discriminant(t) == std::mem::discriminant(tok))
    }

    fn advance(&mut self) -> Option<&Token> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, tok: &Token) -> Result<(), FastpyError> {
        if self.at(tok) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.unexpected(&format!("{tok:?}")))
        }
    }

    fn expect_ident(&mut self) -> Result<String, FastpyError> {
        match self.advance() {
            Some(Token::Ident(name)) => Ok(name.clone()),
            _ => Err(self.unexpected("an identifier")),
        }
    }

    fn expect_end(&self) -> Result<(), FastpyError> {
        if self.pos == self.tokens.len() {
            Ok(())
        } else {
            Err(self.unexpected("end of line"))
        }
    }

    fn unexpected(&self, what: &str) -> FastpyError {
        FastpyError::Parse {
            offset: self.line_offset,
            message: format!("expected {what}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_function() {
        let m = parse("def add(a, b):\n    return a + b\n").unwrap();
        assert_eq!(m.function.name, "add");
        assert_eq!(m.function.params, vec!["a", "b"]);
        assert!(matches!(m.function.body.as_slice(), [Stmt::Return(_)]));
    }

    #[test]
    fn parses_for_loop_with_body() {
        let src = "def s(a):\n    total = 0\n    for i in range(a.shape):\n        total += a[i]\n    return total\n";
        let m = parse(src).unwrap();
        assert_eq!(m.function.body.len(), 3);
        match &m.function.body[1] {
            Stmt::For { target, body, .. } => {
                assert_eq!(target, "i");
                assert_eq!(body.len(), 1);
            }
            other => panic!("expected a for loop, got {other:?}"),
        }
    }

    #[test]
    fn rejects_text_outside_the_grammar() {
        assert!(parse("def f(x):\n    while x:\n        pass\n").is_err());
    }

    #[test]
    fn rejects_missing_colon() {
        assert!(parse("def f(x)\n    return x\n").is_err());
    }

    #[test]
    fn parses_subscript_assignment_target() {
        let m = parse("def f(a):\n    a[0] = 1\n    return a[0]\n").unwrap();
        match &m.function.body[0] {
            Stmt::SubscriptAssign { target, .. } => assert_eq!(target, "a"),
            other => panic!("expected a subscript assignment, got {other:?}"),
        }
    }
}
