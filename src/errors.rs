//! Diagnostics: error codes, the diagnostic queue, and the pretty-printer
//!
//! Every stage reports through a [`Reporter`] and keeps going; nothing is
//! thrown across stage boundaries. Codes are stable, human-facing numbers
//! (`E0001`, `E0002`, ...): each maps to one canonical message and,
//! optionally, one canonical note. A note attached to an individual
//! diagnostic overrides the canonical one.

use crate::span::SourceInfo;
use crate::token::Token;

/// Stable error codes for every diagnostic the front-end can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    UnknownChar = 1,
    UnterminatedStr = 2,
    UnterminatedChar = 3,
    UnexpectedTok = 4,
    UnterminatedBlockComment = 5,
    NumberLiteralTooLarge = 6,
    UnclosedParen = 7,
    ExpectedExpression = 8,
    UnexpectedExpression = 9,
    ExpectedSemi = 10,
    ExpectedElseAfterThen = 11,
    InvalidCharLiteral = 12,
    UnmatchedBrace = 13,
    UnexpectedEndOfInput = 14,
    ExpectedComma = 15,
    ExpectedClosingBracket = 16,
    ExpectedOpeningBrace = 17,
    ExpectedType = 18,
    ExpectedIdentifier = 19,
    ExpectedDeclaration = 20,
    CannotExportExport = 21,
    DuplicateModule = 22,
    MismatchedTypes = 23,
    DereferenceRequiresPointerType = 24,
    UsingVariableInInitializer = 25,
    UnknownIdentifier = 26,
}

impl ErrorCode {
    /// The numeric part of the `Ennnn` display form.
    pub fn number(self) -> u16 {
        self as u16
    }

    /// Canonical single-line message for the code.
    pub fn message(self) -> &'static str {
        match self {
            ErrorCode::UnknownChar => "unknown character",
            ErrorCode::UnterminatedStr => "unterminated string literal",
            ErrorCode::UnterminatedChar => "unterminated character literal",
            ErrorCode::UnexpectedTok => "unexpected token",
            ErrorCode::UnterminatedBlockComment => "unterminated multiline comment",
            ErrorCode::NumberLiteralTooLarge => "number literal too large",
            ErrorCode::UnclosedParen => "expected closing parentheses",
            ErrorCode::ExpectedExpression => "expected an expression",
            ErrorCode::UnexpectedExpression => "unexpected expression",
            ErrorCode::ExpectedSemi => "expected a semicolon",
            ErrorCode::ExpectedElseAfterThen => "expected 'else' in if-then expression",
            ErrorCode::InvalidCharLiteral => "more than one character in char literal",
            ErrorCode::UnmatchedBrace => "expected a matching '}'",
            ErrorCode::UnexpectedEndOfInput => "unexpected end of input",
            ErrorCode::ExpectedComma => "expected a comma",
            ErrorCode::ExpectedClosingBracket => "expected a closing square bracket",
            ErrorCode::ExpectedOpeningBrace => "expected an opening curly brace",
            ErrorCode::ExpectedType => "expected a type",
            ErrorCode::ExpectedIdentifier => "expected an identifier",
            ErrorCode::ExpectedDeclaration => "expected a declaration",
            ErrorCode::CannotExportExport => "cannot export an export",
            ErrorCode::DuplicateModule => "file already has a module declaration",
            ErrorCode::MismatchedTypes => "mismatched types",
            ErrorCode::DereferenceRequiresPointerType => "dereference requires a pointer type",
            ErrorCode::UsingVariableInInitializer => {
                "cannot use a variable inside its own initializer"
            }
            ErrorCode::UnknownIdentifier => "use of an undeclared identifier",
        }
    }

    /// Canonical note for the code, when one exists.
    pub fn note(self) -> Option<&'static str> {
        match self {
            ErrorCode::UnknownChar => {
                Some("This character isn't used in any part of the language.")
            }
            ErrorCode::UnexpectedTok => Some("Did you leave out a space?"),
            ErrorCode::UnterminatedBlockComment
            | ErrorCode::UnterminatedChar
            | ErrorCode::UnterminatedStr => Some("Did you leave out the terminator?"),
            ErrorCode::NumberLiteralTooLarge => {
                Some("Number literals are of type 'i32' and must fit inside that.")
            }
            ErrorCode::ExpectedSemi => {
                Some("All statements require a ';' after them, unless they end with a '}'.")
            }
            ErrorCode::ExpectedElseAfterThen => {
                Some("If an 'if' expression has 'then', an 'else' is required.")
            }
            ErrorCode::InvalidCharLiteral => Some(
                "Char literals can only contain a single UTF-8 code point, not a UTF-8 \
                 character. If it doesn't fit inside one byte, you cannot use it.",
            ),
            ErrorCode::ExpectedOpeningBrace => Some("A block was expected to begin here."),
            ErrorCode::UsingVariableInInitializer => {
                Some("The name is not usable until its initializer has finished evaluating.")
            }
            _ => None,
        }
    }
}

/// Which stage a diagnostic came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Lexer or parser diagnostic anchored to a token
    Token,
    /// Parser or typechecker diagnostic anchored to a tree node
    Node,
    /// Typechecker diagnostic anchored to a computed type
    Type,
}

/// One reported error: a code, a snapshot of the offending span, and an
/// optional note that overrides the canonical one.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: ErrorCode,
    pub info: SourceInfo,
    pub note: Option<String>,
    pub origin: Origin,
}

impl Diagnostic {
    /// A diagnostic anchored to a token.
    pub fn token(code: ErrorCode, token: &Token<'_>) -> Self {
        Self {
            code,
            info: token.info.clone(),
            note: None,
            origin: Origin::Token,
        }
    }

    /// A diagnostic anchored to a tree node's span.
    pub fn node(code: ErrorCode, info: SourceInfo) -> Self {
        Self {
            code,
            info,
            note: None,
            origin: Origin::Node,
        }
    }

    /// A diagnostic produced while computing types.
    pub fn of_type(code: ErrorCode, info: SourceInfo) -> Self {
        Self {
            code,
            info,
            note: None,
            origin: Origin::Type,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// The explicit note if one was attached, otherwise the canonical one.
    pub fn resolved_note(&self) -> Option<&str> {
        self.note.as_deref().or_else(|| self.code.note())
    }

    /// Lay the diagnostic out as a printable block:
    ///
    /// ```text
    /// error: [E0010] expected a semicolon! main.csc
    ///    |
    ///  4 | let y = 2;
    ///    | ^
    /// note: All statements require a ';' after them, unless they end with a '}'.
    /// ```
    pub fn render(&self, display_path: &str, source: &str) -> String {
        let mut out = String::new();

        out.push_str(&format!(
            "error: [E{:04}] {}! {}\n",
            self.code.number(),
            self.code.message(),
            display_path
        ));

        let padding = " ".repeat(digits(self.info.line));
        out.push_str(&format!(" {} |\n", padding));

        // position is 0-based and column 1-based, so this lands on the
        // first byte of the offending line
        let line_start = self.info.position - (self.info.column - 1);
        let line_text = source[line_start..]
            .split('\n')
            .next()
            .unwrap_or("");
        out.push_str(&format!(" {} | {}\n", self.info.line, line_text));

        // the underline never runs past the end of the source line
        let line_end = line_start + line_text.len();
        let width = self.info.length.min(line_end.saturating_sub(self.info.position)).max(1);
        let underline = if width == 1 {
            "^".to_string()
        } else {
            "~".repeat(width)
        };
        let lead = " ".repeat(self.info.column - 1);
        out.push_str(&format!(" {} | {}{}\n", padding, lead, underline));

        if let Some(note) = self.resolved_note() {
            out.push_str(&format!("note: {}\n", note));
        }

        out
    }
}

fn digits(mut n: usize) -> usize {
    let mut count = 1;
    while n >= 10 {
        n /= 10;
        count += 1;
    }
    count
}

/// The diagnostic sink. Stages push into it and keep going; the driver
/// renders the queue once a stage boundary is reached.
#[derive(Default)]
pub struct Reporter {
    diagnostics: Vec<Diagnostic>,
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes ownership of the diagnostic; the only side channel by which a
    /// stage reports failure.
    pub fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn had_errors(&self) -> bool {
        !self.diagnostics.is_empty()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Drains the queue in source-position order, ready for rendering.
    pub fn take_sorted(&mut self) -> Vec<Diagnostic> {
        let mut diags = std::mem::take(&mut self.diagnostics);
        diags.sort_by_key(|d| d.info.position);
        diags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::Arc;

    fn info_at(position: usize, line: usize, column: usize, length: usize) -> SourceInfo {
        SourceInfo::new(position, line, column, length, Arc::from(Path::new("main.csc")))
    }

    #[test]
    fn test_code_numbers_are_stable() {
        assert_eq!(ErrorCode::UnknownChar.number(), 1);
        assert_eq!(ErrorCode::ExpectedSemi.number(), 10);
        assert_eq!(ErrorCode::DuplicateModule.number(), 22);
        assert_eq!(ErrorCode::MismatchedTypes.number(), 23);
    }

    #[test]
    fn test_explicit_note_overrides_canonical() {
        let diag = Diagnostic::node(ErrorCode::ExpectedSemi, info_at(0, 1, 1, 1))
            .with_note("custom note");
        assert_eq!(diag.resolved_note(), Some("custom note"));

        let diag = Diagnostic::node(ErrorCode::ExpectedSemi, info_at(0, 1, 1, 1));
        assert_eq!(
            diag.resolved_note(),
            Some("All statements require a ';' after them, unless they end with a '}'.")
        );
    }

    #[test]
    fn test_render_block_layout() {
        let source = "let x = 1\nlet y = 2;\n";
        let diag = Diagnostic::node(ErrorCode::ExpectedSemi, info_at(10, 2, 1, 3));
        let block = diag.render("main.csc", source);
        assert!(block.starts_with("error: [E0010] expected a semicolon! main.csc\n"));
        assert!(block.contains(" 2 | let y = 2;\n"));
        assert!(block.contains("   | ~~~\n"));
        assert!(block.contains("note: "));
    }

    #[test]
    fn test_render_uses_caret_for_width_one() {
        let source = "let x = 1;\n";
        let diag = Diagnostic::node(ErrorCode::UnknownChar, info_at(4, 1, 5, 1));
        let block = diag.render("main.csc", source);
        assert!(block.contains("   |     ^\n"));
    }

    #[test]
    fn test_render_underline_clipped_to_line() {
        let source = "ab\ncd\n";
        // length runs past the end of line 1; the underline must not
        let diag = Diagnostic::node(ErrorCode::UnexpectedTok, info_at(0, 1, 1, 10));
        let block = diag.render("main.csc", source);
        assert!(block.contains(" 1 | ab\n"));
        assert!(block.contains(" | ~~\n"));
    }

    #[test]
    fn test_reporter_sorts_by_position() {
        let mut reporter = Reporter::new();
        reporter.report(Diagnostic::node(ErrorCode::ExpectedSemi, info_at(20, 2, 1, 1)));
        reporter.report(Diagnostic::node(ErrorCode::ExpectedComma, info_at(5, 1, 6, 1)));
        let sorted = reporter.take_sorted();
        assert_eq!(sorted[0].code, ErrorCode::ExpectedComma);
        assert_eq!(sorted[1].code, ErrorCode::ExpectedSemi);
        assert!(reporter.is_empty());
    }
}
