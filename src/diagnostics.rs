use std::{fmt, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Represents a byte span within a source chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpan {
    pub start: usize,
    pub end: usize,
}

impl SourceSpan {
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// Classification of a diagnostic event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticKind {
    Lexer,
    Parser,
    Runtime,
    Artifact,
}

/// Failure raised while lexing, parsing or running a chunk.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub span: Option<SourceSpan>,
    pub notes: Vec<String>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            span: None,
            notes: Vec::new(),
        }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Runtime, message)
    }

    pub fn with_span(mut self, span: SourceSpan) -> Self {
        self.span = Some(span);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)?;
        if let Some(span) = self.span {
            write!(f, " ({}..{})", span.start, span.end)?;
        }
        if !self.notes.is_empty() {
            writeln!(f)?;
            for note in &self.notes {
                writeln!(f, "  note: {note}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostic {}

/// Unified error type for every bouquet component.
#[derive(Debug, Error)]
pub enum BouquetError {
    /// Syntax or runtime failure in evaluated code.
    #[error("{0}")]
    Eval(#[from] Diagnostic),
    #[error("invalid key `{key}` for record type `{record}`")]
    InvalidKey { record: String, key: String },
    #[error("invalid prototype for record type `{record}`: {reason}")]
    InvalidPrototype { record: String, reason: String },
    #[error("invalid record descriptor: {0}")]
    InvalidDescriptor(String),
    #[error("cannot choose {requested} elements from a set holding {available}")]
    InsufficientElements { requested: usize, available: usize },
    #[error("{}", not_found_message(.name, .attempts))]
    ModuleNotFound { name: String, attempts: Vec<PathBuf> },
    #[error("failed to load `{}`: {reason}", .path.display())]
    Load { path: PathBuf, reason: String },
    #[error("attempt to yield from outside a task")]
    CannotYieldOnMainThread,
    #[error("cannot resume dead task")]
    CannotResumeDeadTask,
    #[error("unknown color or attribute `{0}`")]
    UnknownColorOrAttribute(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn not_found_message(name: &str, attempts: &[PathBuf]) -> String {
    let mut message = format!("module `{name}` not found:");
    message.push_str("\n\tno field loaded[\"");
    message.push_str(name);
    message.push_str("\"]");
    for path in attempts {
        message.push_str(&format!("\n\tno file '{}'", path.display()));
    }
    message
}

impl BouquetError {
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Eval(Diagnostic::runtime(message))
    }
}

pub type Result<T> = std::result::Result<T, BouquetError>;
