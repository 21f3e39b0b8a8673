//! P4: global aliasing for a fixed set of known-safe target built-ins.
//!
//! `G.field` read twice or more by the statements of one block gets a
//! `let field = G.field` prepended to that block (or `_alias<N>` on
//! collision), with the occurrences rewritten. Occurrences inside nested
//! blocks count toward those blocks, not this one.

use std::collections::{HashMap, HashSet};

use crate::frontend::ast::{Expr, ExprKind, LetStmt, Program, Stmt, StmtKind};

const SAFE_GLOBALS: &[&str] = &["math", "string", "table", "coroutine", "utf8", "os"];

pub fn run(program: &mut Program) {
    let mut pass = GlobalAlias { counter: 0 };
    let mut locals = HashSet::new();
    for import in &program.imports {
        if let Some(binding) = import.binding() {
            locals.insert(binding.to_string());
        }
        if let Some(names) = &import.names {
            locals.extend(names.iter().map(|(name, _)| name.clone()));
        }
    }
    pass.process_block(&mut program.body.statements, &locals);
}

struct GlobalAlias {
    counter: usize,
}

impl GlobalAlias {
    fn process_block(&mut self, statements: &mut Vec<Stmt>, inherited: &HashSet<String>) {
        let mut visible = inherited.clone();
        for stmt in statements.iter() {
            if let Some(name) = super::stmt_declared_name(stmt) {
                visible.insert(name.to_string());
            }
        }

        let mut written = HashSet::new();
        collect_written_pairs(statements, &mut written);

        let mut order = Vec::new();
        let mut counts: HashMap<(String, String), usize> = HashMap::new();
        for stmt in statements.iter_mut() {
            for expr in super::stmt_exprs_mut(stmt) {
                count_global_reads(expr, &visible, &mut order, &mut counts);
            }
        }

        let mut prepended = 0usize;
        for (global, field) in order {
            let count = counts
                .get(&(global.clone(), field.clone()))
                .copied()
                .unwrap_or(0);
            // A write to `G.field` anywhere nearby makes the read unsafe to
            // alias.
            if count < 2 || written.contains(&(global.clone(), field.clone())) {
                continue;
            }

            let name = if visible.contains(&field) || mentioned_anywhere(statements, &field) {
                let fresh = format!("_alias{}", self.counter);
                self.counter += 1;
                fresh
            } else {
                field.clone()
            };

            for stmt in statements.iter_mut() {
                for expr in super::stmt_exprs_mut(stmt) {
                    replace_global_read(expr, &global, &field, &name);
                }
            }

            let span = statements
                .first()
                .map_or_else(|| unreachable!("count >= 2 implies statements"), |s| s.span);
            let init = Expr::new(
                span,
                ExprKind::Index {
                    base: Box::new(Expr::new(span, ExprKind::Ident(global.clone()))),
                    key: Box::new(Expr::new(span, ExprKind::Str(field.clone()))),
                    dot: true,
                },
            );
            statements.insert(
                prepended,
                Stmt::new(
                    span,
                    StmtKind::Let(LetStmt {
                        name: name.clone(),
                        name_span: span,
                        annotation: None,
                        value: Some(init),
                        exported: false,
                    }),
                ),
            );
            prepended += 1;
            visible.insert(name);
        }

        for stmt in statements.iter_mut() {
            for (block, introduced) in super::stmt_blocks_mut(stmt) {
                let mut child = visible.clone();
                child.extend(introduced);
                self.process_block(&mut block.statements, &child);
            }
        }
    }
}

fn count_global_reads(
    expr: &Expr,
    visible: &HashSet<String>,
    order: &mut Vec<(String, String)>,
    counts: &mut HashMap<(String, String), usize>,
) {
    if let Some(pair) = global_read(expr, visible) {
        let slot = counts.entry(pair.clone()).or_insert(0);
        if *slot == 0 {
            order.push(pair);
        }
        *slot += 1;
        return;
    }
    match &expr.kind {
        ExprKind::Unary { operand, .. } => count_global_reads(operand, visible, order, counts),
        ExprKind::Binary { left, right, .. } => {
            count_global_reads(left, visible, order, counts);
            count_global_reads(right, visible, order, counts);
        }
        ExprKind::Call { callee, args } => {
            count_global_reads(callee, visible, order, counts);
            for arg in args {
                count_global_reads(arg, visible, order, counts);
            }
        }
        ExprKind::Index { base, key, .. } => {
            count_global_reads(base, visible, order, counts);
            count_global_reads(key, visible, order, counts);
        }
        ExprKind::Table { fields } => {
            use crate::frontend::ast::TableField;
            for field in fields {
                match field {
                    TableField::Field { key, value, .. } => {
                        count_global_reads(key, visible, order, counts);
                        count_global_reads(value, visible, order, counts);
                    }
                    TableField::Array { value } => {
                        count_global_reads(value, visible, order, counts);
                    }
                }
            }
        }
        _ => {}
    }
}

fn replace_global_read(expr: &mut Expr, global: &str, field: &str, name: &str) {
    let matches = matches!(
        &expr.kind,
        ExprKind::Index { base, key, dot: true }
            if base.as_ident() == Some(global)
                && matches!(&key.kind, ExprKind::Str(k) if k == field)
    );
    if matches {
        expr.kind = ExprKind::Ident(name.to_string());
        return;
    }
    for child in super::child_exprs_mut(expr) {
        replace_global_read(child, global, field, name);
    }
}

/// `G.field` where `G` is a safe built-in not shadowed by a local.
fn global_read(expr: &Expr, visible: &HashSet<String>) -> Option<(String, String)> {
    let ExprKind::Index { base, key, dot: true } = &expr.kind else {
        return None;
    };
    let name = base.as_ident()?;
    if !SAFE_GLOBALS.contains(&name) || visible.contains(name) {
        return None;
    }
    match &key.kind {
        ExprKind::Str(field) => Some((name.to_string(), field.clone())),
        _ => None,
    }
}

/// `G.field` pairs assigned to anywhere under the statements, nested
/// blocks and functions included.
fn collect_written_pairs(statements: &[Stmt], out: &mut HashSet<(String, String)>) {
    for stmt in statements {
        if let StmtKind::Assign { target, .. } = &stmt.kind {
            if let ExprKind::Index { base, key, dot: true } = &target.kind {
                if let (Some(global), ExprKind::Str(field)) = (base.as_ident(), &key.kind) {
                    if SAFE_GLOBALS.contains(&global) {
                        out.insert((global.to_string(), field.clone()));
                    }
                }
            }
        }
        match &stmt.kind {
            StmtKind::Function(decl) => collect_written_pairs(&decl.body.statements, out),
            StmtKind::If(if_stmt) => {
                for arm in &if_stmt.arms {
                    collect_written_pairs(&arm.body.statements, out);
                }
                if let Some(else_body) = &if_stmt.else_body {
                    collect_written_pairs(&else_body.statements, out);
                }
            }
            StmtKind::While { body, .. }
            | StmtKind::ForNum { body, .. }
            | StmtKind::ForIn { body, .. } => collect_written_pairs(&body.statements, out),
            StmtKind::Match(match_stmt) => {
                for case in &match_stmt.cases {
                    collect_written_pairs(&case.body.statements, out);
                }
            }
            _ => {}
        }
    }
}

fn mentioned_anywhere(statements: &mut [Stmt], name: &str) -> bool {
    let mut found = false;
    visit_all(statements, &mut |expr| {
        if super::expr_mentions(expr, name) {
            found = true;
        }
    });
    found
}

fn visit_all(statements: &mut [Stmt], f: &mut impl FnMut(&mut Expr)) {
    for stmt in statements {
        for expr in super::stmt_exprs_mut(stmt) {
            f(expr);
        }
        for (block, _) in super::stmt_blocks_mut(stmt) {
            visit_all(&mut block.statements, f);
        }
    }
}
