//! P2: loop-invariant hoisting.
//!
//! A `let` at the top level of a loop body whose initializer is pure with
//! respect to everything the loop mutates is given a fresh `_hoisted<N>`
//! binding immediately before the loop; the original initializer then
//! reads the hoisted name. Loop variables always count as mutated.

use std::collections::HashSet;

use crate::frontend::ast::{Expr, ExprKind, LetStmt, Program, Stmt, StmtKind};

pub fn run(program: &mut Program) {
    let mut hoister = Hoister { counter: 0 };
    let mut locals = HashSet::new();
    for import in &program.imports {
        if let Some(binding) = import.binding() {
            locals.insert(binding.to_string());
        }
        if let Some(names) = &import.names {
            locals.extend(names.iter().map(|(name, _)| name.clone()));
        }
    }
    hoister.process_statements(&mut program.body.statements, &mut locals);
}

struct Hoister {
    counter: usize,
}

impl Hoister {
    fn process_statements(&mut self, statements: &mut Vec<Stmt>, locals: &mut HashSet<String>) {
        let mut index = 0;
        while index < statements.len() {
            if is_loop(&statements[index]) {
                let hoisted = self.hoist_from_loop(&mut statements[index], locals);
                let count = hoisted.len();
                for (offset, stmt) in hoisted.into_iter().enumerate() {
                    statements.insert(index + offset, stmt);
                }
                index += count;
            }

            if let Some(name) = super::stmt_declared_name(&statements[index]) {
                locals.insert(name.to_string());
            }
            for (block, introduced) in super::stmt_blocks_mut(&mut statements[index]) {
                let mut child_locals = locals.clone();
                child_locals.extend(introduced);
                self.process_statements(&mut block.statements, &mut child_locals);
            }
            index += 1;
        }
    }

    /// Rewrite hoistable `let`s inside one loop statement, returning the
    /// fresh bindings to insert before it.
    fn hoist_from_loop(&mut self, stmt: &mut Stmt, locals: &HashSet<String>) -> Vec<Stmt> {
        let mut mutated = HashSet::new();
        let body = match &mut stmt.kind {
            StmtKind::ForNum { var, body, .. } => {
                mutated.insert(var.clone());
                body
            }
            StmtKind::ForIn { vars, body, .. } => {
                mutated.extend(vars.iter().map(|(name, _)| name.clone()));
                body
            }
            StmtKind::While { body, .. } => body,
            _ => return Vec::new(),
        };
        super::collect_mutations(&body.statements, &mut mutated);

        let mut hoisted = Vec::new();
        for inner in &mut body.statements {
            let StmtKind::Let(decl) = &mut inner.kind else {
                continue;
            };
            let span = match &decl.value {
                Some(value) if is_pure(value, &mutated, locals) => value.span,
                _ => continue,
            };
            let fresh = format!("_hoisted{}", self.counter);
            self.counter += 1;
            let Some(init) = decl
                .value
                .replace(Expr::new(span, ExprKind::Ident(fresh.clone())))
            else {
                continue;
            };
            hoisted.push(Stmt::new(
                inner.span,
                StmtKind::Let(LetStmt {
                    name: fresh,
                    name_span: decl.name_span,
                    annotation: None,
                    value: Some(init),
                    exported: false,
                }),
            ));
        }
        hoisted
    }
}

fn is_loop(stmt: &Stmt) -> bool {
    matches!(
        stmt.kind,
        StmtKind::ForNum { .. } | StmtKind::ForIn { .. } | StmtKind::While { .. }
    )
}

/// Purity for hoisting: identifiers the loop does not mutate, literals,
/// unary/binary combinations of pure operands, and `local.field` dotted
/// reads of an unmutated local.
fn is_pure(expr: &Expr, mutated: &HashSet<String>, locals: &HashSet<String>) -> bool {
    match &expr.kind {
        ExprKind::Ident(name) => !mutated.contains(name),
        ExprKind::Number(_) | ExprKind::Str(_) | ExprKind::Boolean(_) | ExprKind::Nil => true,
        ExprKind::Unary { operand, .. } => is_pure(operand, mutated, locals),
        ExprKind::Binary { left, right, .. } => {
            is_pure(left, mutated, locals) && is_pure(right, mutated, locals)
        }
        ExprKind::Index { base, key, dot } => {
            *dot && matches!(&key.kind, ExprKind::Str(_))
                && base
                    .as_ident()
                    .is_some_and(|name| locals.contains(name) && !mutated.contains(name))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::FileId;
    use crate::frontend::lexer::tokenize;
    use crate::frontend::parser::parse;

    fn hoist_source(source: &str) -> Program {
        let (tokens, _) = tokenize(source, FileId(0));
        let mut program = parse(&tokens, FileId(0)).expect("source parses");
        run(&mut program);
        program
    }

    fn function_body(program: &Program) -> &[Stmt] {
        let StmtKind::Function(func) = &program.body.statements[0].kind else {
            panic!("expected function");
        };
        &func.body.statements
    }

    #[test]
    fn invariant_let_moves_out_of_the_loop() {
        let program = hoist_source(
            "fn f(n: number) { let a = 2 let b = 3 for i = 1, n { let x = a * b print(x) } }",
        );
        let body = function_body(&program);
        // let a, let b, hoisted binding, then the loop.
        let StmtKind::Let(hoisted) = &body[2].kind else {
            panic!("expected hoisted let, got {:?}", body[2].kind);
        };
        assert_eq!(hoisted.name, "_hoisted0");
        assert!(matches!(
            hoisted.value.as_ref().map(|value| &value.kind),
            Some(ExprKind::Binary { .. })
        ));
        let StmtKind::ForNum { body: loop_body, .. } = &body[3].kind else {
            panic!("expected loop after hoisted let");
        };
        let StmtKind::Let(rewritten) = &loop_body.statements[0].kind else {
            panic!("expected rewritten let");
        };
        assert!(matches!(
            rewritten.value.as_ref().map(|value| &value.kind),
            Some(ExprKind::Ident(name)) if name == "_hoisted0"
        ));
    }

    #[test]
    fn initializers_reading_loop_locals_stay_put() {
        let program = hoist_source(
            "fn f(n: number) { for i = 1, n { let x = i * 2 print(x) } }",
        );
        let body = function_body(&program);
        assert!(
            matches!(body[0].kind, StmtKind::ForNum { .. }),
            "nothing to hoist when the initializer reads the loop variable"
        );
    }

    #[test]
    fn mutated_bases_disqualify_dotted_reads() {
        let program = hoist_source(
            "fn f(t: {limit: number}, n: number) { for i = 1, n { let x = t.limit t = { limit = 1 } print(x) } }",
        );
        let body = function_body(&program);
        assert!(matches!(body[0].kind, StmtKind::ForNum { .. }));
    }

    #[test]
    fn unmutated_dotted_read_of_local_hoists() {
        let program = hoist_source(
            "fn f(t: {limit: number}, n: number) { for i = 1, n { let x = t.limit print(x) } }",
        );
        let body = function_body(&program);
        let StmtKind::Let(hoisted) = &body[0].kind else {
            panic!("expected hoisted dotted read");
        };
        assert_eq!(hoisted.name, "_hoisted0");
    }

    #[test]
    fn fresh_names_stay_unique_across_loops() {
        let program = hoist_source(
            "fn f(a: number, n: number) { for i = 1, n { let x = a + 1 print(x) } for j = 1, n { let y = a + 2 print(y) } }",
        );
        let body = function_body(&program);
        let mut names = Vec::new();
        for stmt in body {
            if let StmtKind::Let(decl) = &stmt.kind {
                names.push(decl.name.clone());
            }
        }
        assert_eq!(names, ["_hoisted0", "_hoisted1"]);
    }
}
