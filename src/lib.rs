//! Utility libraries for a small embedded scripting runtime: terminal
//! colors, a sequential test harness, runtime-validated record types, an
//! insertion-ordered set, sandboxed modules with a search-path loader, and
//! cooperative task helpers.

pub mod ast;
pub mod color;
pub mod diagnostics;
pub mod environment;
pub mod lexer;
pub mod loader;
pub mod parser;
pub mod record;
pub mod repl;
pub mod runtime;
pub mod set;
pub mod stdlib;
pub mod task;
pub mod testkit;
pub mod value;

pub use diagnostics::{BouquetError, Diagnostic, DiagnosticKind, Result, SourceSpan};
pub use loader::{LoaderConfig, Module};
pub use record::{Record, RecordType};
pub use repl::Repl;
pub use set::Set;
pub use stdlib::Globals;
pub use testkit::TestRun;
pub use value::{Value, ValueKind};
