use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    List(Vec<Expr>),
    Var(String),
    Attr(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Call(Box<Expr>, Vec<Expr>),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub condition: Expr,
    pub body: Vec<Node>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    /// `code` is the placeholder exactly as written, echoed when it fails.
    Placeholder { expr: Expr, code: String, line: usize },
    If { branches: Vec<Branch>, otherwise: Vec<Node> },
    For { targets: Vec<String>, iterable: Expr, body: Vec<Node>, line: usize },
    Set { name: String, value: Expr, line: usize },
    Silent { expr: Expr, line: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub default: Option<Expr>,
}

/// A `#def` block.
#[derive(Debug, Clone, PartialEq)]
pub struct Macro {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Vec<Node>,
}

pub type MacroTable = IndexMap<String, Arc<Macro>>;

/// A compiled legacy template.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Template {
    pub body: Vec<Node>,
    pub macros: MacroTable,
    /// Set by `#errorCatcher ListErrors`.
    pub catch_errors: bool,
}
