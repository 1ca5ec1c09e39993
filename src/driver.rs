//! Pipeline orchestration: text → tokens → tree → typed tree
//!
//! Each stage runs to completion and owns its output; a stage that
//! reported errors stops the pipeline at the next boundary. Diagnostics
//! are rendered per file in source-position order, files in argument
//! order.

use crate::errors::Reporter;
use crate::token::Token;
use crate::{lexer, parser, typeck};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Stage-tagged pipeline failure; the CLI maps each stage to its exit code.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("found {count} parse error(s)")]
    Parse { count: usize },

    #[error("found {count} type error(s)")]
    Typecheck { count: usize },
}

impl CompileError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CompileError::Read { .. } => -2,
            CompileError::Parse { .. } => -3,
            CompileError::Typecheck { .. } => -4,
        }
    }
}

/// One source file, CRLF-normalized, with the path form used in
/// diagnostics. The text must outlive every diagnostic that refers to it.
pub struct SourceFile {
    pub path: Arc<Path>,
    pub display: String,
    pub text: String,
}

impl SourceFile {
    pub fn new(path: impl AsRef<Path>, text: impl Into<String>) -> Self {
        let path = path.as_ref();
        Self {
            path: Arc::from(path),
            display: display_path(path),
            text: text.into().replace("\r\n", "\n"),
        }
    }
}

/// What the compiler should output. The front-end only validates the
/// choice; producing it belongs to the back-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Emit {
    #[default]
    LlvmIr,
    LlvmBc,
    Asm,
    Obj,
    Exe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptLevel {
    #[default]
    Disabled,
    Enabled,
    Aggressive,
    Unsafe,
}

impl OptLevel {
    pub fn from_int(level: u8) -> Option<Self> {
        match level {
            0 => Some(OptLevel::Disabled),
            1 => Some(OptLevel::Enabled),
            2 => Some(OptLevel::Aggressive),
            3 => Some(OptLevel::Unsafe),
            _ => None,
        }
    }
}

/// Everything the command line decided about this compilation.
#[derive(Debug, Default)]
pub struct Options {
    pub files: Vec<PathBuf>,
    pub debug: bool,
    pub opt_level: OptLevel,
    pub emit: Emit,
    pub output: PathBuf,
    pub target: Option<String>,
}

/// Drives the front-end over a set of files.
pub struct Driver {
    options: Options,
}

impl Driver {
    pub fn new(options: Options) -> Self {
        Self { options }
    }

    pub fn run(&self) -> Result<(), CompileError> {
        let sources = self.read_sources()?;
        self.compile(&sources)
    }

    /// Lex and parse every file, then typecheck the lot. Diagnostics from
    /// a failing stage are rendered before the pipeline refuses to
    /// advance.
    pub fn compile(&self, sources: &[SourceFile]) -> Result<(), CompileError> {
        let mut reporter = Reporter::new();
        let mut programs = Vec::with_capacity(sources.len());

        for file in sources {
            let tokens = lexer::lex(&file.text, &file.path, &mut reporter);
            if self.options.debug {
                debug_print(&tokens);
            }
            programs.push(parser::parse(tokens, file.path.clone(), &mut reporter));
        }

        if reporter.had_errors() {
            let count = render_all(&mut reporter, sources);
            return Err(CompileError::Parse { count });
        }

        typeck::typecheck(&mut programs, &mut reporter);

        if reporter.had_errors() {
            let count = render_all(&mut reporter, sources);
            return Err(CompileError::Typecheck { count });
        }

        Ok(())
    }

    /// Zero paths means one source read from standard input.
    fn read_sources(&self) -> Result<Vec<SourceFile>, CompileError> {
        if self.options.files.is_empty() {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .map_err(|source| CompileError::Read {
                    path: PathBuf::from("<stdin>"),
                    source,
                })?;
            return Ok(vec![SourceFile::new("<stdin>", text)]);
        }

        self.options
            .files
            .iter()
            .map(|path| {
                let text = fs::read_to_string(path).map_err(|source| CompileError::Read {
                    path: path.clone(),
                    source,
                })?;
                Ok(SourceFile::new(path, text))
            })
            .collect()
    }
}

/// Print every buffered diagnostic to stderr, grouped by file in argument
/// order and sorted by position within each file. Returns the count.
fn render_all(reporter: &mut Reporter, sources: &[SourceFile]) -> usize {
    let diagnostics = reporter.take_sorted();

    for file in sources {
        for diagnostic in diagnostics.iter().filter(|d| d.info.path == file.path) {
            eprintln!("{}", diagnostic.render(&file.display, &file.text));
        }
    }

    diagnostics.len()
}

/// Diagnostics show paths relative to the working directory when the file
/// lives under it.
fn display_path(path: &Path) -> String {
    let relative = std::env::current_dir()
        .ok()
        .and_then(|cwd| path.strip_prefix(&cwd).ok());

    relative.unwrap_or(path).display().to_string()
}

/// Aligned token dump behind `--debug`.
fn debug_print(tokens: &[Token<'_>]) {
    let width = tokens
        .iter()
        .map(|t| t.kind.to_string().len())
        .max()
        .unwrap_or(0);

    for token in tokens {
        println!(
            "{{ type: {:<width$}, p/l/c: {:04}:{:04}:{:03}, raw: '{}' }}",
            token.kind.to_string(),
            token.info.position,
            token.info.line,
            token.info.column,
            token.raw,
            width = width,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn driver() -> Driver {
        Driver::new(Options::default())
    }

    #[test]
    fn test_clean_pipeline_is_silent() {
        let sources = vec![SourceFile::new(
            "main.csc",
            "module m;\nfn add(a: i32, b: i32): i32 { ret a + b; }\n",
        )];
        assert!(driver().compile(&sources).is_ok());
    }

    #[test]
    fn test_parse_errors_stop_the_pipeline() {
        let sources = vec![SourceFile::new("main.csc", "fn f( {")];
        match driver().compile(&sources) {
            Err(CompileError::Parse { count }) => assert!(count > 0),
            other => panic!("expected parse failure, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_type_errors_stop_the_pipeline() {
        let sources = vec![SourceFile::new("main.csc", "const x: i32 = 3.5;\n")];
        match driver().compile(&sources) {
            Err(CompileError::Typecheck { count }) => assert_eq!(count, 1),
            other => panic!("expected type failure, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_crlf_is_normalized() {
        let file = SourceFile::new("main.csc", "module m;\r\nconst x = 5;\r\n");
        assert!(!file.text.contains('\r'));
        assert!(driver().compile(&[file]).is_ok());
    }

    #[test]
    fn test_exit_codes_per_stage() {
        let read = CompileError::Read {
            path: PathBuf::from("missing.csc"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        assert_eq!(read.exit_code(), -2);
        assert_eq!(CompileError::Parse { count: 1 }.exit_code(), -3);
        assert_eq!(CompileError::Typecheck { count: 1 }.exit_code(), -4);
    }
}
