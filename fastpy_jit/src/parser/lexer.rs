//! Token kinds for one line of source.
//!
//! Only tokens within a single logical line are ever lexed at once (see
//! [`super::split_lines`]): the grammar's block structure is
//! indentation-delimited, and indentation is measured on whole lines before
//! any token-level lexing happens, so the lexer itself never needs to
//! recognize `INDENT`/`DEDENT`.

use logos::Logos;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t]+")]
pub enum Token {
    #[token("def")]
    Def,
    #[token("return")]
    Return,
    #[token("for")]
    For,
    #[token("in")]
    In,
    #[token("range")]
    Range,
    #[token("pass")]
    Pass,
    #[token("True")]
    True_,
    #[token("False")]
    False_,
    #[token("+=")]
    PlusEq,
    #[token("*=")]
    StarEq,
    #[token("+")]
    Plus,
    #[token("*")]
    Star,
    #[token("=")]
    Eq,
    #[token(".")]
    Dot,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),
    #[regex(r"[0-9]+\.[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    Float(f64),
    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Int(i64),
}

/// Lex one line's trimmed content into a token list.
///
/// `line_offset` is the byte offset of the start of this line within the
/// whole source, used to report parse errors at a source-wide byte offset
/// rather than a line-local one.
pub fn tokenize_line(text: &str, line_offset: usize) -> Result<Vec<Token>, (usize, String)> {
    let mut lexer = Token::lexer(text);
    let mut tokens = Vec::new();
    while let Some(result) = lexer.next() {
        match result {
            Ok(tok) => tokens.push(tok),
            Err(_) => {
                return Err((
                    line_offset + lexer.span().start,
                    format!("unrecognized token {:?}", lexer.slice()),
                ))
            }
        }
    }
    Ok(tokens)
}
