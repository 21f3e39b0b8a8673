//! P3: local field caching.
//!
//! When `base.field` is read twice or more in a block and `base` is a
//! local the block never mutates (no `base = ...`, no `base.* = ...`),
//! the read is cached in a fresh local right after `base`'s declaration
//! (or at the block start for inherited locals) and every occurrence is
//! rewritten to the cache. Occurrences inside nested functions or scopes
//! that redeclare `base` are left alone.

use std::collections::{HashMap, HashSet};

use crate::frontend::ast::{Expr, ExprKind, LetStmt, Program, Stmt, StmtKind};

use super::child_exprs_mut;

pub fn run(program: &mut Program) {
    let mut pass = FieldCache { counter: 0 };
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

struct FieldCache {
    counter: usize,
}

impl FieldCache {
    fn process_block(&mut self, statements: &mut Vec<Stmt>, inherited: &HashSet<String>) {
        let mut visible = inherited.clone();
        for stmt in statements.iter() {
            if let Some(name) = super::stmt_declared_name(stmt) {
                visible.insert(name.to_string());
            }
        }

        let mut assigned = HashSet::new();
        collect_assigned_roots(statements, &mut assigned);

        let mut order = Vec::new();
        let mut seen: HashMap<(String, String), usize> = HashMap::new();
        visit_block_exprs(statements, None, &mut |expr| {
            count_reads(expr, &visible, &mut order, &mut seen);
        });

        for (base, field) in order {
            if assigned.contains(&base) {
                continue;
            }
            // Recount with the scope guard: occurrences under a shadowing
            // redeclaration belong to that scope, not this one.
            let mut count = 0usize;
            visit_block_exprs(statements, Some(&base), &mut |expr| {
                count_matching(expr, &base, &field, &mut count);
            });
            if count < 2 {
                continue;
            }

            let preferred = format!("{}_{}", base, field);
            let name = if visible.contains(&preferred)
                || mentions_in_statements(statements, &preferred)
            {
                let fresh = format!("_cache{}", self.counter);
                self.counter += 1;
                fresh
            } else {
                preferred
            };

            visit_block_exprs(statements, Some(&base), &mut |expr| {
                replace_read(expr, &base, &field, &name);
            });

            let position = statements
                .iter()
                .position(|stmt| super::stmt_declared_name(stmt) == Some(base.as_str()))
                .map_or(0, |index| index + 1);
            let span = statements
                .first()
                .map_or_else(|| unreachable!("count >= 2 implies statements"), |s| s.span);
            let base_span = span;
            let init = Expr::new(
                base_span,
                ExprKind::Index {
                    base: Box::new(Expr::new(base_span, ExprKind::Ident(base.clone()))),
                    key: Box::new(Expr::new(base_span, ExprKind::Str(field.clone()))),
                    dot: true,
                },
            );
            statements.insert(
                position,
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
            visible.insert(name);
        }

        // Nested blocks get their own counting with the updated locals.
        for stmt in statements.iter_mut() {
            for (block, introduced) in super::stmt_blocks_mut(stmt) {
                let mut child = visible.clone();
                child.extend(introduced);
                self.process_block(&mut block.statements, &child);
            }
        }
    }
}

/// Walk every expression of a statement list, descending into nested
/// blocks but never into function bodies. When `guard` names a base, any
/// scope that redeclares it is skipped so substitution cannot cross it.
fn visit_block_exprs(
    statements: &mut [Stmt],
    guard: Option<&str>,
    f: &mut impl FnMut(&mut Expr),
) {
    for stmt in statements {
        if matches!(stmt.kind, StmtKind::Function(_)) {
            continue;
        }
        for expr in super::stmt_exprs_mut(stmt) {
            f(expr);
        }
        for (block, introduced) in super::stmt_blocks_mut(stmt) {
            if let Some(base) = guard {
                if introduced.iter().any(|name| name == base)
                    || block
                        .statements
                        .iter()
                        .any(|inner| super::stmt_declared_name(inner) == Some(base))
                {
                    continue;
                }
            }
            visit_block_exprs(&mut block.statements, guard, f);
        }
    }
}

fn count_reads(
    expr: &mut Expr,
    visible: &HashSet<String>,
    order: &mut Vec<(String, String)>,
    counts: &mut HashMap<(String, String), usize>,
) {
    if let ExprKind::Index { base, key, dot: true } = &expr.kind {
        if let (Some(name), ExprKind::Str(field)) = (base.as_ident(), &key.kind) {
            if visible.contains(name) {
                let pair = (name.to_string(), field.clone());
                let slot = counts.entry(pair.clone()).or_insert(0);
                if *slot == 0 {
                    order.push(pair);
                }
                *slot += 1;
            }
        }
    }
    for child in child_exprs_mut(expr) {
        count_reads(child, visible, order, counts);
    }
}

fn count_matching(expr: &mut Expr, base: &str, field: &str, count: &mut usize) {
    if let ExprKind::Index { base: inner, key, dot: true } = &expr.kind {
        if inner.as_ident() == Some(base) && matches!(&key.kind, ExprKind::Str(k) if k == field) {
            *count += 1;
        }
    }
    for child in child_exprs_mut(expr) {
        count_matching(child, base, field, count);
    }
}

fn replace_read(expr: &mut Expr, base: &str, field: &str, name: &str) {
    let matches = matches!(
        &expr.kind,
        ExprKind::Index { base: inner, key, dot: true }
            if inner.as_ident() == Some(base)
                && matches!(&key.kind, ExprKind::Str(k) if k == field)
    );
    if matches {
        expr.kind = ExprKind::Ident(name.to_string());
        return;
    }
    for child in child_exprs_mut(expr) {
        replace_read(child, base, field, name);
    }
}

/// Assignment roots, `global` names, and loop variables anywhere under the
/// statements, nested functions included.
fn collect_assigned_roots(statements: &[Stmt], out: &mut HashSet<String>) {
    for stmt in statements {
        match &stmt.kind {
            StmtKind::Assign { target, .. } => {
                if let Some(root) = super::index_root(target) {
                    out.insert(root.to_string());
                }
            }
            StmtKind::Global { name, .. } => {
                out.insert(name.clone());
            }
            StmtKind::ForNum { var, body, .. } => {
                out.insert(var.clone());
                collect_assigned_roots(&body.statements, out);
            }
            StmtKind::ForIn { vars, body, .. } => {
                out.extend(vars.iter().map(|(name, _)| name.clone()));
                collect_assigned_roots(&body.statements, out);
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
            StmtKind::Match(match_stmt) => {
                for case in &match_stmt.cases {
                    collect_assigned_roots(&case.body.statements, out);
                }
            }
            _ => {}
        }
    }
}

fn mentions_in_statements(statements: &mut [Stmt], name: &str) -> bool {
    let mut found = false;
    visit_all_exprs(statements, &mut |expr| {
        if super::expr_mentions(expr, name) {
            found = true;
        }
    });
    found
}

/// Like [`visit_block_exprs`] but descends into function bodies too; used
/// only for collision checks.
fn visit_all_exprs(statements: &mut [Stmt], f: &mut impl FnMut(&mut Expr)) {
    for stmt in statements {
        for expr in super::stmt_exprs_mut(stmt) {
            f(expr);
        }
        for (block, _) in super::stmt_blocks_mut(stmt) {
            visit_all_exprs(&mut block.statements, f);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::FileId;
    use crate::frontend::lexer::tokenize;
    use crate::frontend::parser::parse;

    fn cache_source(source: &str) -> Vec<Stmt> {
        let (tokens, _) = tokenize(source, FileId(0));
        let mut program = parse(&tokens, FileId(0)).expect("source parses");
        run(&mut program);
        let StmtKind::Function(func) = program.body.statements.remove(0).kind else {
            panic!("expected function");
        };
        func.body.statements
    }

    fn let_names(statements: &[Stmt]) -> Vec<String> {
        statements
            .iter()
            .filter_map(|stmt| match &stmt.kind {
                StmtKind::Let(decl) => Some(decl.name.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn repeated_field_reads_get_cached_after_the_declaration() {
        let body = cache_source(
            "fn f() { let p = { x = 1 } print(p.x) print(p.x) }",
        );
        assert_eq!(let_names(&body), ["p", "p_x"]);
        let StmtKind::Let(cache) = &body[1].kind else {
            panic!("expected cache let");
        };
        assert!(matches!(
            cache.value.as_ref().map(|value| &value.kind),
            Some(ExprKind::Index { .. })
        ));
        let StmtKind::Expr(call) = &body[2].kind else {
            panic!("expected call");
        };
        let ExprKind::Call { args, .. } = &call.kind else {
            panic!("expected call expr");
        };
        assert!(matches!(&args[0].kind, ExprKind::Ident(name) if name == "p_x"));
    }

    #[test]
    fn single_reads_are_left_alone() {
        let body = cache_source("fn f() { let p = { x = 1 } print(p.x) }");
        assert_eq!(let_names(&body), ["p"]);
    }

    #[test]
    fn mutated_bases_are_not_cached() {
        let body = cache_source(
            "fn f() { let p = { x = 1 } print(p.x) p = { x = 2 } print(p.x) }",
        );
        assert_eq!(let_names(&body), ["p"]);

        let body = cache_source(
            "fn f() { let p = { x = 1 } print(p.x) p.x = 2 print(p.x) }",
        );
        assert_eq!(let_names(&body), ["p"]);
    }

    #[test]
    fn inherited_bases_cache_at_block_start() {
        let body = cache_source("fn f(p: {x: number}) { print(p.x) print(p.x) }");
        assert_eq!(let_names(&body), ["p_x"]);
        assert!(matches!(body[0].kind, StmtKind::Let(_)));
    }

    #[test]
    fn preferred_name_collision_falls_back_to_cache_counter() {
        let body = cache_source(
            "fn f(p: {x: number}) { let p_x = 0 print(p_x) print(p.x) print(p.x) }",
        );
        assert_eq!(let_names(&body), ["_cache0", "p_x"]);
    }

    #[test]
    fn nested_function_bodies_are_not_rewritten_from_outside() {
        let body = cache_source(
            "fn f(p: {x: number}) { fn inner(): number { return p.x } print(p.x) print(inner()) }",
        );
        // Two outer reads would be needed; the read inside `inner` does not
        // count toward the outer block.
        assert!(let_names(&body).is_empty());
    }
}
