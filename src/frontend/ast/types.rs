//! Type-expression nodes as written in source.

use crate::diagnostics::Span;

#[derive(Debug, Clone)]
pub struct TypeExpr {
    pub span: Span,
    pub kind: TypeExprKind,
}

#[derive(Debug, Clone)]
pub enum TypeExprKind {
    /// A named type: primitive, `any`, `never`, `nil`, or a declared
    /// enum/struct.
    Name(String),
    /// Structural type: `{x: number, y: string}`.
    Struct(Vec<(String, TypeExpr)>),
    /// `left | right`.
    Union {
        left: Box<TypeExpr>,
        right: Box<TypeExpr>,
    },
    /// `fn(number, string): boolean`.
    Func {
        params: Vec<TypeExpr>,
        ret: Option<Box<TypeExpr>>,
    },
}

impl TypeExpr {
    /// Whether this annotation is a union with `nil` as a member. Used by
    /// the analyzer: an annotated `let` is promoted to non-nil unless the
    /// annotation itself admits `nil`.
    #[must_use]
    pub fn union_contains_nil(&self) -> bool {
        match &self.kind {
            TypeExprKind::Union { left, right } => {
                left.is_nil_name() || right.is_nil_name()
                    || left.union_contains_nil()
                    || right.union_contains_nil()
            }
            _ => false,
        }
    }

    fn is_nil_name(&self) -> bool {
        matches!(&self.kind, TypeExprKind::Name(name) if name == "nil")
    }

    /// Plain type name, when the annotation is a bare name.
    #[must_use]
    pub fn as_name(&self) -> Option<&str> {
        match &self.kind {
            TypeExprKind::Name(name) => Some(name),
            _ => None,
        }
    }
}
