//! P6: single-use temp elimination.
//!
//! A non-exported `let x = e` whose initializer is an identifier or a
//! literal and whose binding is read exactly once in the block is deleted,
//! with the use rewritten to `e`. Runs to a fixpoint per block so chains
//! like `let x = 1  let y = x  return y` collapse fully.

use crate::frontend::ast::{Expr, ExprKind, Program, Stmt, StmtKind};

pub fn run(program: &mut Program) {
    process_block(&mut program.body.statements);
}

fn process_block(statements: &mut Vec<Stmt>) {
    loop {
        let Some((index, name, replacement)) = find_candidate(statements) else {
            break;
        };
        statements.remove(index);
        substitute(statements, &name, &replacement);
    }

    for stmt in statements.iter_mut() {
        for (block, _) in super::stmt_blocks_mut(stmt) {
            process_block(&mut block.statements);
        }
    }
}

/// First removable `let` in the block: simple initializer, exactly one
/// read, never reassigned, and (for identifier initializers) the source
/// name itself never reassigned in the block.
fn find_candidate(statements: &mut Vec<Stmt>) -> Option<(usize, String, Expr)> {
    let mut assigned = std::collections::HashSet::new();
    collect_assigned_roots(statements, &mut assigned);

    for index in 0..statements.len() {
        let StmtKind::Let(decl) = &statements[index].kind else {
            continue;
        };
        if decl.exported {
            continue;
        }
        let Some(value) = &decl.value else {
            continue;
        };
        let simple = matches!(
            value.kind,
            ExprKind::Ident(_)
                | ExprKind::Number(_)
                | ExprKind::Str(_)
                | ExprKind::Boolean(_)
                | ExprKind::Nil
        );
        if !simple {
            continue;
        }
        let name = decl.name.clone();
        let replacement = value.clone();

        if assigned.contains(&name) {
            continue;
        }
        if let ExprKind::Ident(source) = &replacement.kind {
            if assigned.contains(source) {
                continue;
            }
        }

        let mut count = 0usize;
        for (position, stmt) in statements.iter_mut().enumerate() {
            if position == index {
                continue;
            }
            count_uses(std::slice::from_mut(stmt), &name, &mut count);
        }
        if count == 1 {
            return Some((index, name, replacement));
        }
    }
    None
}

/// Assignment targets anywhere under the statements, loop variables and
/// `global` names included.
fn collect_assigned_roots(statements: &[Stmt], out: &mut std::collections::HashSet<String>) {
    for stmt in statements {
        match &stmt.kind {
            StmtKind::Assign { target, .. } => {
                if let ExprKind::Ident(name) = &target.kind {
                    out.insert(name.clone());
                }
            }
            StmtKind::Global { name, .. } => {
                out.insert(name.clone());
            }
            StmtKind::Function(decl) => collect_assigned_roots(&decl.body.statements, out),
            StmtKind::If(if_stmt) => {
                for arm in &if_stmt.arms {
                    collect_assigned_roots(&arm.body.statements, out);
                }
                if let Some(else_body) = &if_stmt.else_body {
                    collect_assigned_roots(&else_body.statements, out);
                }
            }
            StmtKind::While { body, .. } => collect_assigned_roots(&body.statements, out),
            StmtKind::ForNum { var, body, .. } => {
                out.insert(var.clone());
                collect_assigned_roots(&body.statements, out);
            }
            StmtKind::ForIn { vars, body, .. } => {
                out.extend(vars.iter().map(|(name, _)| name.clone()));
                collect_assigned_roots(&body.statements, out);
            }
            StmtKind::Match(match_stmt) => {
                for case in &match_stmt.cases {
                    collect_assigned_roots(&case.body.statements, out);
                }
            }
            _ => {}
        }
    }
}

/// Count reads of `name`, descending into nested blocks and functions but
/// stopping at any scope that redeclares the name.
fn count_uses(statements: &mut [Stmt], name: &str, count: &mut usize) {
    for stmt in statements {
        for expr in super::stmt_exprs_mut(stmt) {
            count_in_expr(expr, name, count);
        }
        for (block, introduced) in super::stmt_blocks_mut(stmt) {
            if introduced.iter().any(|declared| declared == name)
                || block
                    .statements
                    .iter()
                    .any(|inner| super::stmt_declared_name(inner) == Some(name))
            {
                continue;
            }
            count_uses(&mut block.statements, name, count);
        }
    }
}

fn count_in_expr(expr: &mut Expr, name: &str, count: &mut usize) {
    if matches!(&expr.kind, ExprKind::Ident(ident) if ident == name) {
        *count += 1;
        return;
    }
    for child in super::child_exprs_mut(expr) {
        count_in_expr(child, name, count);
    }
}

fn substitute(statements: &mut [Stmt], name: &str, replacement: &Expr) {
    for stmt in statements {
        for expr in super::stmt_exprs_mut(stmt) {
            substitute_in_expr(expr, name, replacement);
        }
        for (block, introduced) in super::stmt_blocks_mut(stmt) {
            if introduced.iter().any(|declared| declared == name)
                || block
                    .statements
                    .iter()
                    .any(|inner| super::stmt_declared_name(inner) == Some(name))
            {
                continue;
            }
            substitute(&mut block.statements, name, replacement);
        }
    }
}

fn substitute_in_expr(expr: &mut Expr, name: &str, replacement: &Expr) {
    if matches!(&expr.kind, ExprKind::Ident(ident) if ident == name) {
        expr.kind = replacement.kind.clone();
        return;
    }
    for child in super::child_exprs_mut(expr) {
        substitute_in_expr(child, name, replacement);
    }
}
