//! Lexer for the textual IR.
//!
//! Built on logos. Whitespace and `;` comments are skipped; everything else
//! becomes a token with a byte span that the parser turns into line/column
//! positions.

use logos::Logos;
use std::ops::Range;

/// Byte span of a token in the source
pub type Span = Range<usize>;

/// Lexing failure kinds
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LexError {
    #[default]
    UnexpectedCharacter,
    /// Integer literal that fits neither `i64` nor `u64`
    IntegerOutOfRange,
}

/// IR token
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(error = LexError)]
#[logos(skip r"[ \t\r\n]+")]
#[logos(skip r";[^\n]*")]
pub enum Token {
    // Keywords (must come before identifiers)
    #[token("define")]
    Define,

    #[token("declare")]
    Declare,

    #[token("label")]
    Label,

    #[token("attributes")]
    Attributes,

    #[token("source_filename")]
    SourceFilename,

    #[token("target")]
    Target,

    #[token("true")]
    True,

    #[token("false")]
    False,

    // Names
    #[regex(r"%[-A-Za-z0-9_.$]+", |lex| lex.slice()[1..].to_string())]
    Local(String),

    #[regex(r"@[-A-Za-z0-9_.$]+", |lex| lex.slice()[1..].to_string())]
    Global(String),

    #[regex(r"[A-Za-z0-9_.]+:", |lex| {
        let s = lex.slice();
        s[..s.len() - 1].to_string()
    })]
    LabelDef(String),

    #[regex(r"[A-Za-z_][A-Za-z0-9_.]*", |lex| lex.slice().to_string())]
    Ident(String),

    // Literals
    #[regex(r"-?[0-9]+", parse_int)]
    Int(i64),

    #[regex(r#""[^"]*""#, |lex| {
        let s = lex.slice();
        s[1..s.len() - 1].to_string()
    })]
    Str(String),

    #[regex(r"#[0-9]+")]
    AttrRef,

    // Punctuation
    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token("{")]
    LBrace,

    #[token("}")]
    RBrace,

    #[token(",")]
    Comma,

    #[token("=")]
    Equals,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Define => write!(f, "'define'"),
            Token::Declare => write!(f, "'declare'"),
            Token::Label => write!(f, "'label'"),
            Token::Attributes => write!(f, "'attributes'"),
            Token::SourceFilename => write!(f, "'source_filename'"),
            Token::Target => write!(f, "'target'"),
            Token::True => write!(f, "'true'"),
            Token::False => write!(f, "'false'"),
            Token::Local(name) => write!(f, "'%{}'", name),
            Token::Global(name) => write!(f, "'@{}'", name),
            Token::LabelDef(name) => write!(f, "label '{}:'", name),
            Token::Ident(name) => write!(f, "'{}'", name),
            Token::Int(value) => write!(f, "integer {}", value),
            Token::Str(s) => write!(f, "string \"{}\"", s),
            Token::AttrRef => write!(f, "attribute reference"),
            Token::LParen => write!(f, "'('"),
            Token::RParen => write!(f, "')'"),
            Token::LBrace => write!(f, "'{{'"),
            Token::RBrace => write!(f, "'}}'"),
            Token::Comma => write!(f, "','"),
            Token::Equals => write!(f, "'='"),
        }
    }
}

/// Integer literal; values up to `u64::MAX` wrap into the signed range
fn parse_int(lex: &mut logos::Lexer<'_, Token>) -> Result<i64, LexError> {
    let value: i128 = lex.slice().parse().map_err(|_| LexError::IntegerOutOfRange)?;
    if value < i64::MIN as i128 || value > u64::MAX as i128 {
        return Err(LexError::IntegerOutOfRange);
    }
    Ok(value as i64)
}

/// Tokenize `source`.
///
/// On failure returns the error kind and the span of the offending input.
pub fn tokenize(source: &str) -> Result<Vec<(Token, Span)>, (LexError, Span)> {
    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();
    while let Some(result) = lexer.next() {
        match result {
            Ok(token) => tokens.push((token, lexer.span())),
            Err(e) => return Err((e, lexer.span())),
        }
    }
    Ok(tokens)
}

/// 1-based line and column of a byte offset
pub fn line_col(source: &str, offset: usize) -> (u32, u32) {
    let mut line = 1u32;
    let mut column = 1u32;
    for ch in source[..offset.min(source.len())].chars() {
        if ch == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }
    (line, column)
}
