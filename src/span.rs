//! Source code location tracking
//!
//! Every token and tree node carries a `SourceInfo` recording where in which
//! file it came from. Diagnostics snapshot one at construction time, so they
//! stay printable after the tree that produced them is gone.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Provenance of a token or tree node: byte offset, 1-based line/column,
/// length in bytes, and the file it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInfo {
    /// 0-based byte offset into the source buffer
    pub position: usize,
    /// 1-based line number
    pub line: usize,
    /// 1-based column number
    pub column: usize,
    /// Length of the region in bytes, always at least 1
    pub length: usize,
    /// File the region belongs to
    pub path: Arc<Path>,
}

impl SourceInfo {
    pub fn new(position: usize, line: usize, column: usize, length: usize, path: Arc<Path>) -> Self {
        debug_assert!(line >= 1 && column >= 1 && length >= 1);
        Self {
            position,
            line,
            column,
            length,
            path,
        }
    }

    /// Byte offset one past the end of the region.
    pub fn end(&self) -> usize {
        self.position + self.length
    }

    /// The smallest region covering both `self` and `other`.
    ///
    /// Keeps the earliest position/line/column and extends the length to the
    /// later end. Both regions must belong to the same file.
    pub fn merge(&self, other: &SourceInfo) -> SourceInfo {
        let (first, last) = if self.position <= other.position {
            (self, other)
        } else {
            (other, self)
        };

        SourceInfo {
            position: first.position,
            line: first.line,
            column: first.column,
            length: last.end().max(first.end()) - first.position,
            path: first.path.clone(),
        }
    }
}

impl fmt::Display for SourceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.path.display(), self.line, self.column)
    }
}

/// Table of line-start offsets for one file, built once per lex.
///
/// The lexer core produces byte ranges; this map turns an offset into the
/// 1-based line/column pair that `SourceInfo` carries.
pub struct LineMap {
    starts: Vec<usize>,
}

impl LineMap {
    pub fn new(source: &str) -> Self {
        let mut starts = vec![0];
        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' {
                starts.push(i + 1);
            }
        }
        Self { starts }
    }

    /// The (line, column) of a byte offset, both 1-based.
    pub fn location(&self, offset: usize) -> (usize, usize) {
        let line = self.starts.partition_point(|&start| start <= offset);
        let column = offset - self.starts[line - 1] + 1;
        (line, column)
    }
}
