//! Syntax tree of module scripts.
//!
//! A chunk is a list of statements. Blocks, `if`, `while` and `for` bodies
//! open a scope; top-level `var` and `const` bindings become a module's
//! exports. The tree derives serde so compiled artifacts can store it
//! instead of source text.

use serde::{Deserialize, Serialize};

use crate::diagnostics::SourceSpan;

/// `none` evaluates to unit, which also clears record fields on assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    /// Short-circuits; yields a Bool.
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum UnaryOp {
    Negate,
    Not,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExprKind {
    Literal(Literal),
    Variable(String),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    /// `target` is a variable, a `.field` or an `[index]`. Maps and arrays
    /// are values, so the updated copy is written back to its owner.
    Assign {
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    ArrayLiteral(Vec<Expr>),
    /// Keys are identifiers or string literals, kept in source order.
    MapLiteral(Vec<(String, Expr)>),
    Group(Box<Expr>),
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    Field {
        target: Box<Expr>,
        field: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StmtKind {
    /// `var [mut] name [= value]`; without an initializer the binding is unit.
    VarDecl {
        name: String,
        mutable: bool,
        initializer: Option<Expr>,
    },
    ConstDecl {
        name: String,
        value: Expr,
    },
    /// The last one run is the value of an `eval` without `return`.
    Expr(Expr),
    Block(Vec<Stmt>),
    If {
        condition: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Option<Vec<Stmt>>,
    },
    While {
        condition: Expr,
        body: Vec<Stmt>,
    },
    /// Iterates arrays, string characters, and `[key, value]` pairs of maps
    /// and records.
    For {
        binding: String,
        iterable: Expr,
        body: Vec<Stmt>,
    },
    /// At top level, the value replaces the module's exports.
    Return(Option<Expr>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: SourceSpan,
}

/// A parsed unit of source: one file or one `eval` snippet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub items: Vec<Stmt>,
}
