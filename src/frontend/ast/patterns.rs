//! Match-case pattern nodes.

use super::expressions::Expr;
use crate::diagnostics::Span;

#[derive(Debug, Clone)]
pub struct Pattern {
    pub span: Span,
    pub kind: PatternKind,
}

#[derive(Debug, Clone)]
pub enum PatternKind {
    /// `_` — matches anything.
    Wildcard,
    /// A literal: number, string, boolean, or `nil`.
    Literal(Expr),
    /// Any other comparison expression, e.g. `Color.Red`.
    Expr(Expr),
}

impl Pattern {
    /// The compared expression for literal and expression patterns.
    #[must_use]
    pub fn comparison(&self) -> Option<&Expr> {
        match &self.kind {
            PatternKind::Wildcard => None,
            PatternKind::Literal(expr) | PatternKind::Expr(expr) => Some(expr),
        }
    }
}
