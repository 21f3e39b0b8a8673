//! Tagged syntax tree for Loam programs.
//!
//! Every node carries a [`Span`]; each category (statement, expression,
//! pattern, type expression) is a tagged sum dispatched on by the later
//! phases. The tree is built by the parser, rewritten in place by the
//! optimizer, and read by everything else.

mod expressions;
mod patterns;
mod statements;
mod types;

pub use expressions::{BinaryOp, Expr, ExprKind, TableField, UnaryOp};
pub use patterns::{Pattern, PatternKind};
pub use statements::{
    Block, EnumDecl, EnumItem, FunctionDecl, IfArm, IfStmt, LetStmt, MatchCase, MatchStmt, Param,
    Stmt, StmtKind, StructDecl, StructField,
};
pub use types::{TypeExpr, TypeExprKind};

use crate::diagnostics::Span;

/// A parsed compilation unit.
#[derive(Debug, Clone)]
pub struct Program {
    /// `module a.b` header, when present.
    pub module: Option<ModuleDecl>,
    /// Imports in source order.
    pub imports: Vec<Import>,
    pub body: Block,
}

#[derive(Debug, Clone)]
pub struct ModuleDecl {
    /// Dotted module name, e.g. `game.entities`.
    pub name: String,
    pub span: Span,
}

/// One `import` directive.
#[derive(Debug, Clone)]
pub struct Import {
    /// Dotted path of the imported module.
    pub path: String,
    /// `import m as alias` binding, when given.
    pub alias: Option<String>,
    /// `import m.{a, b}` symbol list, when given. Mutually exclusive with
    /// `alias` by construction in the parser.
    pub names: Option<Vec<(String, Span)>>,
    pub span: Span,
}

impl Import {
    /// The local name this import binds, for bare and aliased imports.
    /// Named-symbol imports bind each listed symbol instead.
    #[must_use]
    pub fn binding(&self) -> Option<&str> {
        if self.names.is_some() {
            return None;
        }
        match &self.alias {
            Some(alias) => Some(alias),
            None => self.path.rsplit('.').next(),
        }
    }
}
