// Lexer for block-diagram source files.
//
// Uses the `logos` crate for DFA-based lexing. Comments and whitespace are
// skipped; every other byte of input ends up in a token or a lexical error.
//
// Preconditions: input is valid UTF-8.
// Postconditions: returns all tokens with byte spans and 1-based positions,
//                 plus any lex errors.
// Failure modes: unrecognized characters produce `LexicalError` diagnostics;
//                lexing continues with the next character.
// Side effects: none.

use logos::Logos;
use std::fmt;

use crate::ast::Span;
use crate::diag::{DiagKind, Diagnostic, LineIndex};

/// Why logos rejected a slice of input.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum LexErrorKind {
    #[default]
    UnexpectedChar,
    MalformedNumber,
}

/// A token together with its location.
#[derive(Debug, Clone, PartialEq)]
pub struct Lexeme {
    pub token: Token,
    pub span: Span,
    pub line: usize,
    pub column: usize,
}

impl Lexeme {
    pub fn kind(&self) -> TokenKind {
        self.token.kind()
    }

    /// Source text of the token.
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.span.start..self.span.end]
    }
}

/// Result of lexing: tokens plus any errors (non-fatal).
#[derive(Debug)]
pub struct LexResult {
    pub tokens: Vec<Lexeme>,
    pub errors: Vec<Diagnostic>,
}

/// Coarse token classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Keyword,
    Identifier,
    Number,
    String,
    Operator,
    Punctuation,
}

/// Token types.
///
/// Identifiers carry no value; use the span to retrieve the text from the
/// source.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(error = LexErrorKind)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"/\*([^*]|\*+[^*/])*\*+/")]
pub enum Token {
    // ── Keywords ──
    #[token("import")]
    Import,
    #[token("with")]
    With,
    #[token("declare")]
    Declare,

    // ── Composition operators ──
    #[token("<:")]
    Split,
    #[token(":>")]
    Merge,
    #[token(":")]
    Seq,
    #[token(",")]
    Par,
    #[token("~")]
    Rec,

    // ── Primitive operators ──
    #[token("+")]
    Add,
    #[token("-")]
    Sub,
    #[token("*")]
    Mul,
    #[token("/")]
    Div,
    #[token("%")]
    Mod,
    #[token("@")]
    At,
    #[token("!")]
    Cut,
    #[token("'")]
    Prime,
    #[token("=")]
    Equals,

    // ── Punctuation ──
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(";")]
    Semi,

    /// Start of a block comment that never closes (a closed one is skipped
    /// above, and wins as the longer match).
    #[token("/*")]
    UnterminatedComment,

    // ── Literals ──
    /// Hexadecimal integer literal (`0x1F`).
    #[regex(r"0[xX][0-9a-fA-F]+", parse_hex)]
    /// Decimal literal: integer, float (`1.5`, `.5`, `1.`), or scientific.
    #[regex(r"[0-9]+(\.[0-9]*)?([eE][+-]?[0-9]+)?", parse_number)]
    #[regex(r"\.[0-9]+([eE][+-]?[0-9]+)?", parse_number)]
    Number(f64),

    /// String literal with `\"`, `\\`, `\n` and `\t` escapes.
    #[regex(r#""([^"\\]|\\.)*""#, parse_string)]
    Str(String),

    // ── Identifier ──
    //
    // Dotted names (`os.osc`) are a single token. Keywords win over this
    // regex for the same length, so `with` matches With, not Ident.
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*(\.[a-zA-Z_][a-zA-Z0-9_]*)*")]
    Ident,
}

impl Token {
    pub fn kind(&self) -> TokenKind {
        match self {
            Token::Import | Token::With | Token::Declare => TokenKind::Keyword,
            Token::Ident => TokenKind::Identifier,
            Token::Number(_) => TokenKind::Number,
            Token::Str(_) => TokenKind::String,
            Token::Split
            | Token::Merge
            | Token::Seq
            | Token::Par
            | Token::Rec
            | Token::Add
            | Token::Sub
            | Token::Mul
            | Token::Div
            | Token::Mod
            | Token::At
            | Token::Cut
            | Token::Prime
            | Token::Equals => TokenKind::Operator,
            Token::LParen
            | Token::RParen
            | Token::LBrace
            | Token::RBrace
            | Token::Semi
            | Token::UnterminatedComment => TokenKind::Punctuation,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Import => write!(f, "import"),
            Token::With => write!(f, "with"),
            Token::Declare => write!(f, "declare"),
            Token::Split => write!(f, "<:"),
            Token::Merge => write!(f, ":>"),
            Token::Seq => write!(f, ":"),
            Token::Par => write!(f, ","),
            Token::Rec => write!(f, "~"),
            Token::Add => write!(f, "+"),
            Token::Sub => write!(f, "-"),
            Token::Mul => write!(f, "*"),
            Token::Div => write!(f, "/"),
            Token::Mod => write!(f, "%"),
            Token::At => write!(f, "@"),
            Token::Cut => write!(f, "!"),
            Token::Prime => write!(f, "'"),
            Token::Equals => write!(f, "="),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::Semi => write!(f, ";"),
            Token::UnterminatedComment => write!(f, "/*"),
            Token::Number(v) => write!(f, "{v}"),
            Token::Str(s) => write!(f, "\"{s}\""),
            Token::Ident => write!(f, "identifier"),
        }
    }
}

// ── Callbacks ──

fn parse_number(lex: &mut logos::Lexer<'_, Token>) -> Result<f64, LexErrorKind> {
    lex.slice().parse().map_err(|_| LexErrorKind::MalformedNumber)
}

fn parse_hex(lex: &mut logos::Lexer<'_, Token>) -> Result<f64, LexErrorKind> {
    let digits = &lex.slice()[2..];
    u64::from_str_radix(digits, 16)
        .map(|v| v as f64)
        .map_err(|_| LexErrorKind::MalformedNumber)
}

fn parse_string(lex: &mut logos::Lexer<'_, Token>) -> String {
    let slice = lex.slice();
    let inner = &slice[1..slice.len() - 1]; // strip quotes
    let mut result = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        // The regex guarantees a character follows every backslash.
        match chars.next() {
            Some('"') => result.push('"'),
            Some('\\') => result.push('\\'),
            Some('n') => result.push('\n'),
            Some('t') => result.push('\t'),
            Some(other) => {
                // Unknown escapes are kept verbatim.
                result.push('\\');
                result.push(other);
            }
            None => result.push('\\'),
        }
    }
    result
}

// ── Public API ──

/// Lex a source string into tokens.
///
/// Returns all successfully lexed tokens together with diagnostics for
/// unrecognised characters. Lexing is non-fatal: errors are collected and
/// the lexer continues past bad characters. An unterminated block comment
/// swallows the rest of the input.
pub fn lex(source: &str) -> LexResult {
    let lines = LineIndex::new(source);
    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();
    let mut errors = Vec::new();

    while let Some(result) = lexer.next() {
        let range = lexer.span();
        let span: Span = (range.start..range.end).into();
        match result {
            Ok(Token::UnterminatedComment) => {
                errors.push(Diagnostic::new(
                    DiagKind::LexicalError,
                    span,
                    "unterminated block comment",
                ));
                break;
            }
            Ok(token) => {
                let pos = lines.position(span.start);
                tokens.push(Lexeme {
                    token,
                    span,
                    line: pos.line,
                    column: pos.column,
                });
            }
            Err(kind) => {
                let text = &source[span.start..span.end];
                let message = match kind {
                    LexErrorKind::UnexpectedChar => format!("unexpected character: {text:?}"),
                    LexErrorKind::MalformedNumber => format!("malformed number literal: {text:?}"),
                };
                errors.push(Diagnostic::new(DiagKind::LexicalError, span, message));
            }
        }
    }

    LexResult { tokens, errors }
}

// ── Tests ──
