//! Token definitions for the Cascade language
//!
//! This module defines every token the lexer can produce. The keyword and
//! symbol tables are compiled into the `logos` state machine, which also
//! gives us longest-match symbol resolution (`<<=` before `<<` before `<`).

use crate::span::SourceInfo;
use logos::Logos;
use std::fmt;

/// A token produced by the lexer
#[derive(Debug, Clone, PartialEq)]
pub struct Token<'src> {
    pub info: SourceInfo,
    pub kind: TokenKind,
    /// Zero-copy view into the source buffer; valid only while it lives
    pub raw: &'src str,
}

impl<'src> Token<'src> {
    pub fn new(info: SourceInfo, kind: TokenKind, raw: &'src str) -> Self {
        Self { info, kind, raw }
    }
}

/// Malformed input classified during lexing; each maps to one diagnostic.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexError {
    /// A byte no rule recognizes
    #[default]
    UnknownChar,
    UnterminatedString,
    UnterminatedChar,
    UnterminatedBlockComment,
    /// Digits running straight into an identifier, e.g. `123abc`
    NumberJoinedIdentifier,
}

fn lex_stringlike(lex: &mut logos::Lexer<'_, TokenKind>, delim: u8, err: LexError) -> Result<(), LexError> {
    let rest = lex.remainder().as_bytes();
    let mut i = 0;

    while i < rest.len() {
        // only `\<delim>` is an escape; a backslash before anything else is
        // an ordinary character
        if rest[i] == b'\\' && i + 1 < rest.len() && rest[i + 1] == delim {
            i += 2;
            continue;
        }

        if rest[i] == delim {
            lex.bump(i + 1);
            return Ok(());
        }

        i += 1;
    }

    lex.bump(rest.len());
    Err(err)
}

fn lex_string(lex: &mut logos::Lexer<'_, TokenKind>) -> Result<(), LexError> {
    lex_stringlike(lex, b'"', LexError::UnterminatedString)
}

fn lex_char(lex: &mut logos::Lexer<'_, TokenKind>) -> Result<(), LexError> {
    lex_stringlike(lex, b'\'', LexError::UnterminatedChar)
}

fn lex_block_comment(lex: &mut logos::Lexer<'_, TokenKind>) -> logos::FilterResult<(), LexError> {
    let rest = lex.remainder();
    match rest.find("*-") {
        Some(end) => {
            lex.bump(end + 2);
            logos::FilterResult::Skip
        }
        None => {
            lex.bump(rest.len());
            logos::FilterResult::Error(LexError::UnterminatedBlockComment)
        }
    }
}

fn joined_identifier(_lex: &mut logos::Lexer<'_, TokenKind>) -> Result<(), LexError> {
    Err(LexError::NumberJoinedIdentifier)
}

/// All token kinds in the Cascade language
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(error = LexError)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"--[^\n]*")]
pub enum TokenKind {
    // ============ Trivia ============
    /// `-* ... *-`; consumed entirely by the callback and never reaches
    /// the token stream
    #[token("-*", lex_block_comment)]
    BlockComment,

    // ============ Literals ============
    /// Character literal: 'a'
    #[token("'", lex_char)]
    LiteralChar,

    /// String literal: "hello"
    #[token("\"", lex_string)]
    LiteralString,

    /// Integer literal: 42
    #[regex(r"[0-9]+", priority = 3)]
    #[regex(r"[0-9]+(\.[0-9]+)?[a-zA-Z_][a-zA-Z0-9_]*", joined_identifier)]
    LiteralNumber,

    /// Float literal: 3.14
    #[regex(r"[0-9]+\.[0-9]+")]
    LiteralFloat,

    /// Boolean literal
    #[token("true")]
    #[token("false")]
    LiteralBool,

    // ============ Keywords ============
    #[token("const")]
    Const,
    #[token("static")]
    Static,
    #[token("fn")]
    Fn,
    #[token("struct")]
    Struct,
    #[token("pub")]
    Pub,
    #[token("let")]
    Let,
    #[token("mut")]
    Mut,
    #[token("loop")]
    Loop,
    #[token("while")]
    While,
    #[token("for")]
    For,
    #[token("in")]
    In,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,
    #[token("ret")]
    Ret,
    #[token("assert")]
    Assert,
    #[token("module")]
    Module,
    #[token("import")]
    Import,
    #[token("as")]
    As,
    #[token("from")]
    From,
    #[token("export")]
    Export,
    #[token("type")]
    Type,
    #[token("if")]
    If,
    #[token("then")]
    Then,
    #[token("else")]
    Else,
    #[token("and")]
    And,
    #[token("or")]
    Or,
    #[token("xor")]
    Xor,
    #[token("not")]
    Not,
    #[token("clone")]
    Clone,

    // ============ Symbols ============
    #[token("=")]
    Equal,
    #[token(":")]
    Colon,
    #[token("::")]
    ColonColon,
    #[token("*")]
    Star,
    #[token("&")]
    Amp,
    #[token("[")]
    OpenBracket,
    #[token("]")]
    CloseBracket,
    #[token("@")]
    At,
    #[token(".")]
    Dot,
    #[token("{")]
    OpenBrace,
    #[token("}")]
    CloseBrace,
    #[token("(")]
    OpenParen,
    #[token(")")]
    CloseParen,
    #[token(";")]
    Semicolon,
    #[token("|")]
    Pipe,
    #[token("^")]
    Caret,
    #[token("+")]
    Plus,
    #[token("-")]
    Hyphen,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("<")]
    Lt,
    #[token("<=")]
    Leq,
    #[token(">")]
    Gt,
    #[token(">=")]
    Geq,
    #[token(">>")]
    Shr,
    #[token("<<")]
    Shl,
    #[token("==")]
    EqualEqual,
    #[token("!=")]
    BangEqual,
    #[token(">>=")]
    ShrEqual,
    #[token("<<=")]
    ShlEqual,
    #[token("&=")]
    AmpEqual,
    #[token("|=")]
    PipeEqual,
    #[token("^=")]
    CaretEqual,
    #[token("%=")]
    PercentEqual,
    #[token("/=")]
    SlashEqual,
    #[token("*=")]
    StarEqual,
    #[token("-=")]
    HyphenEqual,
    #[token("+=")]
    PlusEqual,
    #[token("~")]
    Tilde,
    #[token(",")]
    Comma,

    // ============ Identifiers ============
    /// Identifier: foo, _bar
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Identifier,

    // ============ Sentinels ============
    /// Byte the lexer could not classify; never enters the token stream
    Unknown,

    /// Synthetic token attached to a lexer diagnostic
    Error,
}

impl TokenKind {
    /// Check if this token is a keyword
    pub fn is_keyword(&self) -> bool {
        matches!(
            self,
            TokenKind::Const
                | TokenKind::Static
                | TokenKind::Fn
                | TokenKind::Struct
                | TokenKind::Pub
                | TokenKind::Let
                | TokenKind::Mut
                | TokenKind::Loop
                | TokenKind::While
                | TokenKind::For
                | TokenKind::In
                | TokenKind::Break
                | TokenKind::Continue
                | TokenKind::Ret
                | TokenKind::Assert
                | TokenKind::Module
                | TokenKind::Import
                | TokenKind::As
                | TokenKind::From
                | TokenKind::Export
                | TokenKind::Type
                | TokenKind::If
                | TokenKind::Then
                | TokenKind::Else
                | TokenKind::And
                | TokenKind::Or
                | TokenKind::Xor
                | TokenKind::Not
                | TokenKind::Clone
        )
    }

    /// Check if this token is a literal
    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            TokenKind::LiteralChar
                | TokenKind::LiteralString
                | TokenKind::LiteralNumber
                | TokenKind::LiteralFloat
                | TokenKind::LiteralBool
        )
    }

    /// Check if this token is a compound-assignment symbol
    pub fn is_assignment(&self) -> bool {
        matches!(
            self,
            TokenKind::Equal
                | TokenKind::PlusEqual
                | TokenKind::HyphenEqual
                | TokenKind::StarEqual
                | TokenKind::SlashEqual
                | TokenKind::PercentEqual
                | TokenKind::ShlEqual
                | TokenKind::ShrEqual
                | TokenKind::AmpEqual
                | TokenKind::PipeEqual
                | TokenKind::CaretEqual
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TokenKind::BlockComment => "comment",
            TokenKind::LiteralChar => "char literal",
            TokenKind::LiteralString => "string literal",
            TokenKind::LiteralNumber => "number literal",
            TokenKind::LiteralFloat => "float literal",
            TokenKind::LiteralBool => "bool literal",
            TokenKind::Const => "const",
            TokenKind::Static => "static",
            TokenKind::Fn => "fn",
            TokenKind::Struct => "struct",
            TokenKind::Pub => "pub",
            TokenKind::Let => "let",
            TokenKind::Mut => "mut",
            TokenKind::Loop => "loop",
            TokenKind::While => "while",
            TokenKind::For => "for",
            TokenKind::In => "in",
            TokenKind::Break => "break",
            TokenKind::Continue => "continue",
            TokenKind::Ret => "ret",
            TokenKind::Assert => "assert",
            TokenKind::Module => "module",
            TokenKind::Import => "import",
            TokenKind::As => "as",
            TokenKind::From => "from",
            TokenKind::Export => "export",
            TokenKind::Type => "type",
            TokenKind::If => "if",
            TokenKind::Then => "then",
            TokenKind::Else => "else",
            TokenKind::And => "and",
            TokenKind::Or => "or",
            TokenKind::Xor => "xor",
            TokenKind::Not => "not",
            TokenKind::Clone => "clone",
            TokenKind::Equal => "=",
            TokenKind::Colon => ":",
            TokenKind::ColonColon => "::",
            TokenKind::Star => "*",
            TokenKind::Amp => "&",
            TokenKind::OpenBracket => "[",
            TokenKind::CloseBracket => "]",
            TokenKind::At => "@",
            TokenKind::Dot => ".",
            TokenKind::OpenBrace => "{",
            TokenKind::CloseBrace => "}",
            TokenKind::OpenParen => "(",
            TokenKind::CloseParen => ")",
            TokenKind::Semicolon => ";",
            TokenKind::Pipe => "|",
            TokenKind::Caret => "^",
            TokenKind::Plus => "+",
            TokenKind::Hyphen => "-",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::Lt => "<",
            TokenKind::Leq => "<=",
            TokenKind::Gt => ">",
            TokenKind::Geq => ">=",
            TokenKind::Shr => ">>",
            TokenKind::Shl => "<<",
            TokenKind::EqualEqual => "==",
            TokenKind::BangEqual => "!=",
            TokenKind::ShrEqual => ">>=",
            TokenKind::ShlEqual => "<<=",
            TokenKind::AmpEqual => "&=",
            TokenKind::PipeEqual => "|=",
            TokenKind::CaretEqual => "^=",
            TokenKind::PercentEqual => "%=",
            TokenKind::SlashEqual => "/=",
            TokenKind::StarEqual => "*=",
            TokenKind::HyphenEqual => "-=",
            TokenKind::PlusEqual => "+=",
            TokenKind::Tilde => "~",
            TokenKind::Comma => ",",
            TokenKind::Identifier => "identifier",
            TokenKind::Unknown => "unknown",
            TokenKind::Error => "error",
        };
        write!(f, "{}", s)
    }
}
