//! Conservative, output-readable AST rewrites.
//!
//! Six passes run in a fixed order, each preserving observable behavior of
//! checker-approved programs: constant folding, loop-invariant hoisting,
//! local field caching, global aliasing, a reserved for-normalization slot,
//! and single-use temp elimination. Passes that mint names draw from their
//! own counters so output is deterministic. Individual passes can be
//! toggled off; the default is all on.

mod alias;
mod cache;
mod fold;
mod hoist;
mod temps;

use std::collections::HashSet;

use crate::frontend::ast::{Block, Expr, Program, Stmt, StmtKind, TableField};

/// Per-pass switches, mirroring the `enable` block of compile options.
#[derive(Debug, Clone, Copy)]
pub struct PassToggles {
    pub constant_folding: bool,
    pub loop_invariant_hoisting: bool,
    pub local_cache: bool,
    pub global_aliasing: bool,
    pub numeric_for_normalization: bool,
    pub redundant_temps: bool,
}

impl Default for PassToggles {
    fn default() -> Self {
        Self {
            constant_folding: true,
            loop_invariant_hoisting: true,
            local_cache: true,
            global_aliasing: true,
            numeric_for_normalization: true,
            redundant_temps: true,
        }
    }
}

/// Rewrite the tree in place. Order is load-bearing: folding feeds
/// hoisting, hoisting feeds caching, caching can remove global reads
/// before aliasing counts them, and temp elimination cleans up last.
pub fn optimize(program: &mut Program, toggles: &PassToggles) {
    if toggles.constant_folding {
        fold::run(program);
    }
    if toggles.loop_invariant_hoisting {
        hoist::run(program);
    }
    if toggles.local_cache {
        cache::run(program);
    }
    if toggles.global_aliasing {
        alias::run(program);
    }
    if toggles.numeric_for_normalization {
        // Reserved pass slot: numeric-for normalization currently does not
        // change the tree.
    }
    if toggles.redundant_temps {
        temps::run(program);
    }
}

/// Expressions attached directly to a statement, excluding anything inside
/// nested blocks. Match patterns are deliberately left out: they are
/// emitted verbatim as comparisons and must not be rewritten.
pub(crate) fn stmt_exprs_mut(stmt: &mut Stmt) -> Vec<&mut Expr> {
    match &mut stmt.kind {
        StmtKind::Let(decl) => decl.value.iter_mut().collect(),
        StmtKind::Global { value, .. } => vec![value],
        StmtKind::Assign { target, value } => vec![target, value],
        StmtKind::Expr(expr) => vec![expr],
        StmtKind::If(if_stmt) => if_stmt
            .arms
            .iter_mut()
            .map(|arm| &mut arm.condition)
            .collect(),
        StmtKind::While { condition, .. } => vec![condition],
        StmtKind::ForNum {
            start, end, step, ..
        } => {
            let mut exprs = vec![start, end];
            exprs.extend(step.iter_mut());
            exprs
        }
        StmtKind::ForIn { iter, .. } => vec![iter],
        StmtKind::Return { value } => value.iter_mut().collect(),
        StmtKind::Match(match_stmt) => vec![&mut match_stmt.subject],
        StmtKind::Function(_) | StmtKind::Struct(_) | StmtKind::Enum(_) => Vec::new(),
    }
}

/// Nested blocks of a statement, each with the names the construct itself
/// introduces into that block's scope.
pub(crate) fn stmt_blocks_mut(stmt: &mut Stmt) -> Vec<(&mut Block, Vec<String>)> {
    match &mut stmt.kind {
        StmtKind::Function(decl) => {
            let params = decl.params.iter().map(|param| param.name.clone()).collect();
            vec![(&mut decl.body, params)]
        }
        StmtKind::If(if_stmt) => {
            let mut blocks: Vec<_> = if_stmt
                .arms
                .iter_mut()
                .map(|arm| (&mut arm.body, Vec::new()))
                .collect();
            if let Some(else_body) = &mut if_stmt.else_body {
                blocks.push((else_body, Vec::new()));
            }
            blocks
        }
        StmtKind::While { body, .. } => vec![(body, Vec::new())],
        StmtKind::ForNum { var, body, .. } => vec![(body, vec![var.clone()])],
        StmtKind::ForIn { vars, body, .. } => {
            let names = vars.iter().map(|(name, _)| name.clone()).collect();
            vec![(body, names)]
        }
        StmtKind::Match(match_stmt) => match_stmt
            .cases
            .iter_mut()
            .map(|case| (&mut case.body, Vec::new()))
            .collect(),
        _ => Vec::new(),
    }
}

/// Name a statement introduces into the enclosing scope, if any.
pub(crate) fn stmt_declared_name(stmt: &Stmt) -> Option<&str> {
    match &stmt.kind {
        StmtKind::Let(decl) => Some(&decl.name),
        StmtKind::Function(decl) => Some(&decl.name),
        StmtKind::Struct(decl) => Some(&decl.name),
        StmtKind::Enum(decl) => Some(&decl.name),
        _ => None,
    }
}

/// Names mutated anywhere under a statement list: locals introduced,
/// assignment targets (including the root of an index chain), loop
/// variables of inner loops, and `global` declarations. Nested function
/// bodies count too; the passes that consume this set are conservative.
pub(crate) fn collect_mutations(statements: &[Stmt], out: &mut HashSet<String>) {
    for stmt in statements {
        match &stmt.kind {
            StmtKind::Let(decl) => {
                out.insert(decl.name.clone());
            }
            StmtKind::Global { name, .. } => {
                out.insert(name.clone());
            }
            StmtKind::Assign { target, .. } => {
                if let Some(root) = index_root(target) {
                    out.insert(root.to_string());
                }
            }
            StmtKind::Function(decl) => {
                out.insert(decl.name.clone());
                collect_mutations(&decl.body.statements, out);
            }
            StmtKind::Struct(decl) => {
                out.insert(decl.name.clone());
            }
            StmtKind::Enum(decl) => {
                out.insert(decl.name.clone());
            }
            StmtKind::If(if_stmt) => {
                for arm in &if_stmt.arms {
                    collect_mutations(&arm.body.statements, out);
                }
                if let Some(else_body) = &if_stmt.else_body {
                    collect_mutations(&else_body.statements, out);
                }
            }
            StmtKind::While { body, .. } => collect_mutations(&body.statements, out),
            StmtKind::ForNum { var, body, .. } => {
                out.insert(var.clone());
                collect_mutations(&body.statements, out);
            }
            StmtKind::ForIn { vars, body, .. } => {
                out.extend(vars.iter().map(|(name, _)| name.clone()));
                collect_mutations(&body.statements, out);
            }
            StmtKind::Match(match_stmt) => {
                for case in &match_stmt.cases {
                    collect_mutations(&case.body.statements, out);
                }
            }
            StmtKind::Expr(_) | StmtKind::Return { .. } => {}
        }
    }
}

/// Root identifier of an assignment target (`x`, `x.f`, `x[i].g`, ...).
pub(crate) fn index_root(expr: &Expr) -> Option<&str> {
    use crate::frontend::ast::ExprKind;
    match &expr.kind {
        ExprKind::Ident(name) => Some(name),
        ExprKind::Index { base, .. } => index_root(base),
        _ => None,
    }
}

/// Direct sub-expressions of an expression.
pub(crate) fn child_exprs_mut(expr: &mut Expr) -> Vec<&mut Expr> {
    use crate::frontend::ast::ExprKind;
    match &mut expr.kind {
        ExprKind::Unary { operand, .. } => vec![operand],
        ExprKind::Binary { left, right, .. } => vec![left, right],
        ExprKind::Call { callee, args } => {
            let mut children = vec![&mut **callee];
            children.extend(args.iter_mut());
            children
        }
        ExprKind::Index { base, key, .. } => vec![base, key],
        ExprKind::Table { fields } => fields
            .iter_mut()
            .flat_map(|field| match field {
                TableField::Field { key, value, .. } => vec![key, value],
                TableField::Array { value } => vec![value],
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Whether `name` occurs as an identifier anywhere under the expression.
pub(crate) fn expr_mentions(expr: &Expr, name: &str) -> bool {
    use crate::frontend::ast::ExprKind;
    match &expr.kind {
        ExprKind::Ident(ident) => ident == name,
        ExprKind::Number(_) | ExprKind::Str(_) | ExprKind::Boolean(_) | ExprKind::Nil => false,
        ExprKind::Unary { operand, .. } => expr_mentions(operand, name),
        ExprKind::Binary { left, right, .. } => {
            expr_mentions(left, name) || expr_mentions(right, name)
        }
        ExprKind::Call { callee, args } => {
            expr_mentions(callee, name) || args.iter().any(|arg| expr_mentions(arg, name))
        }
        ExprKind::Index { base, key, .. } => {
            expr_mentions(base, name) || expr_mentions(key, name)
        }
        ExprKind::Table { fields } => fields.iter().any(|field| match field {
            TableField::Field {
                key_is_ident,
                key,
                value,
            } => (!key_is_ident && expr_mentions(key, name)) || expr_mentions(value, name),
            TableField::Array { value } => expr_mentions(value, name),
        }),
    }
}
