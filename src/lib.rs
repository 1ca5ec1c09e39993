//! Cascade compiler front-end
//!
//! Given one or more source files, the front-end produces a fully-typed
//! program tree plus precise diagnostics. Data flows strictly forward:
//!
//! ```text
//! Source Code (.csc)
//!       │
//!       ▼
//! ┌─────────────┐
//! │    Lexer    │  → Tokens
//! └─────────────┘
//!       │
//!       ▼
//! ┌─────────────┐
//! │   Parser    │  → Tree
//! └─────────────┘
//!       │
//!       ▼
//! ┌─────────────┐
//! │  Typecheck  │  → Typed tree
//! └─────────────┘
//! ```
//!
//! Every stage shares the source-location model ([`span::SourceInfo`]) and
//! the diagnostic sink ([`errors::Reporter`]); nothing is ever thrown
//! across a stage boundary.

pub mod ast;
pub mod driver;
pub mod errors;
pub mod lexer;
pub mod parser;
pub mod span;
pub mod token;
pub mod typeck;

// Re-exports for convenience
pub use errors::{Diagnostic, ErrorCode, Reporter};
pub use span::SourceInfo;
pub use token::{Token, TokenKind};

/// Compiler version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// File extension for Cascade source files
pub const FILE_EXTENSION: &str = "csc";
