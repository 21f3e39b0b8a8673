//! Statement and declaration nodes.

use super::expressions::Expr;
use super::patterns::Pattern;
use super::types::TypeExpr;
use crate::diagnostics::Span;

/// Statement node with span metadata.
#[derive(Debug, Clone)]
pub struct Stmt {
    pub span: Span,
    pub kind: StmtKind,
}

impl Stmt {
    #[must_use]
    pub fn new(span: Span, kind: StmtKind) -> Self {
        Self { span, kind }
    }
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    Let(LetStmt),
    /// `global x = e`: whitelists `x` as an allowed global.
    Global {
        name: String,
        name_span: Span,
        value: Expr,
    },
    Assign {
        target: Expr,
        value: Expr,
    },
    Expr(Expr),
    Function(FunctionDecl),
    Struct(StructDecl),
    Enum(EnumDecl),
    If(IfStmt),
    While {
        condition: Expr,
        body: Block,
    },
    ForNum {
        var: String,
        var_span: Span,
        start: Expr,
        end: Expr,
        step: Option<Expr>,
        body: Block,
    },
    ForIn {
        vars: Vec<(String, Span)>,
        iter: Expr,
        body: Block,
    },
    Return {
        value: Option<Expr>,
    },
    Match(MatchStmt),
}

#[derive(Debug, Clone)]
pub struct Block {
    pub statements: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct LetStmt {
    pub name: String,
    pub name_span: Span,
    pub annotation: Option<TypeExpr>,
    pub value: Option<Expr>,
    pub exported: bool,
}

#[derive(Debug, Clone)]
pub struct FunctionDecl {
    pub name: String,
    pub name_span: Span,
    pub params: Vec<Param>,
    pub ret: Option<TypeExpr>,
    pub body: Block,
    pub exported: bool,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub span: Span,
    pub annotation: Option<TypeExpr>,
}

#[derive(Debug, Clone)]
pub struct StructDecl {
    pub name: String,
    pub name_span: Span,
    pub fields: Vec<StructField>,
    pub exported: bool,
}

#[derive(Debug, Clone)]
pub struct StructField {
    pub name: String,
    pub span: Span,
    pub ty: TypeExpr,
}

#[derive(Debug, Clone)]
pub struct EnumDecl {
    pub name: String,
    pub name_span: Span,
    pub items: Vec<EnumItem>,
    pub exported: bool,
}

#[derive(Debug, Clone)]
pub struct EnumItem {
    pub name: String,
    pub span: Span,
    /// Explicit numeric value; the emitter's counter advances from it.
    pub value: Option<i64>,
}

/// `if`/`elseif` chain. The first arm is the `if`, the rest are `elseif`s.
#[derive(Debug, Clone)]
pub struct IfStmt {
    pub arms: Vec<IfArm>,
    pub else_body: Option<Block>,
}

#[derive(Debug, Clone)]
pub struct IfArm {
    pub condition: Expr,
    pub body: Block,
}

#[derive(Debug, Clone)]
pub struct MatchStmt {
    pub subject: Expr,
    pub cases: Vec<MatchCase>,
}

#[derive(Debug, Clone)]
pub struct MatchCase {
    pub pattern: Pattern,
    pub body: Block,
    pub span: Span,
}
