//! Lexer for the Cascade language
//!
//! The lexer converts source text into a flat stream of tokens, each tagged
//! with full provenance. It uses the `logos` crate for the token state
//! machine and never fails: malformed input is reported through the sink as
//! a diagnostic with a synthetic token covering the offending span, and
//! scanning continues.

use crate::errors::{Diagnostic, ErrorCode, Reporter};
use crate::span::{LineMap, SourceInfo};
use crate::token::{LexError, Token, TokenKind};
use logos::Logos;
use std::path::Path;
use std::sync::Arc;

/// The lexer for one source file
pub struct Lexer<'src> {
    source: &'src str,
    path: Arc<Path>,
    inner: logos::Lexer<'src, TokenKind>,
    line_map: LineMap,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str, path: Arc<Path>) -> Self {
        Self {
            source,
            path,
            inner: TokenKind::lexer(source),
            line_map: LineMap::new(source),
        }
    }

    /// Eagerly lex the whole file, reporting malformed input through the
    /// sink. Always returns the full token vector.
    pub fn tokenize(mut self, reporter: &mut Reporter) -> Vec<Token<'src>> {
        let mut tokens = Vec::new();

        while let Some(result) = self.inner.next() {
            let span = self.inner.span();
            match result {
                Ok(kind) => {
                    tokens.push(Token::new(self.info_for(span.start, span.len()), kind, &self.source[span]));
                }
                Err(err) => self.report(err, span, reporter),
            }
        }

        tokens
    }

    fn info_for(&self, start: usize, length: usize) -> SourceInfo {
        let (line, column) = self.line_map.location(start);
        SourceInfo::new(start, line, column, length.max(1), self.path.clone())
    }

    fn report(&self, err: LexError, span: std::ops::Range<usize>, reporter: &mut Reporter) {
        let token = |kind: TokenKind, start: usize, length: usize| {
            let end = (start + length).min(self.source.len()).max(start + 1);
            Token::new(self.info_for(start, end - start), kind, &self.source[start..end.min(self.source.len())])
        };

        let diagnostic = match err {
            LexError::UnknownChar => {
                Diagnostic::token(ErrorCode::UnknownChar, &token(TokenKind::Unknown, span.start, span.len().max(1)))
            }
            LexError::UnterminatedString => Diagnostic::token(
                ErrorCode::UnterminatedStr,
                &token(TokenKind::LiteralString, span.start, span.len()),
            ),
            LexError::UnterminatedChar => Diagnostic::token(
                ErrorCode::UnterminatedChar,
                &token(TokenKind::LiteralChar, span.start, span.len()),
            ),
            // the comment may run to EOF; point at its two-char opener
            LexError::UnterminatedBlockComment => Diagnostic::token(
                ErrorCode::UnterminatedBlockComment,
                &token(TokenKind::Error, span.start, 2),
            )
            .with_note("did you leave out '*-' to end the comment?"),
            LexError::NumberJoinedIdentifier => Diagnostic::token(
                ErrorCode::UnexpectedTok,
                &token(TokenKind::Error, span.start, span.len()),
            ),
        };

        reporter.report(diagnostic);
    }
}

/// Helper to lex a file in one call.
pub fn lex<'src>(source: &'src str, path: &Arc<Path>, reporter: &mut Reporter) -> Vec<Token<'src>> {
    Lexer::new(source, path.clone()).tokenize(reporter)
}
