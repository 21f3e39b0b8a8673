//! P1: constant folding over literal operands.
//!
//! Folds numeric arithmetic and comparisons, negation of number literals,
//! and `not` of literal truth values. Never folds across identifiers.

use crate::frontend::ast::{BinaryOp, Expr, ExprKind, Program, Stmt, TableField, UnaryOp};

pub fn run(program: &mut Program) {
    fold_statements(&mut program.body.statements);
}

fn fold_statements(statements: &mut [Stmt]) {
    for stmt in statements {
        for expr in super::stmt_exprs_mut(stmt) {
            fold_expr(expr);
        }
        for (block, _) in super::stmt_blocks_mut(stmt) {
            fold_statements(&mut block.statements);
        }
    }
}

fn fold_expr(expr: &mut Expr) {
    match &mut expr.kind {
        ExprKind::Unary { operand, .. } => fold_expr(operand),
        ExprKind::Binary { left, right, .. } => {
            fold_expr(left);
            fold_expr(right);
        }
        ExprKind::Call { callee, args } => {
            fold_expr(callee);
            for arg in args {
                fold_expr(arg);
            }
        }
        ExprKind::Index { base, key, .. } => {
            fold_expr(base);
            fold_expr(key);
        }
        ExprKind::Table { fields } => {
            for field in fields {
                match field {
                    TableField::Field { key, value, .. } => {
                        fold_expr(key);
                        fold_expr(value);
                    }
                    TableField::Array { value } => fold_expr(value),
                }
            }
        }
        _ => {}
    }

    if let Some(folded) = folded_kind(expr) {
        expr.kind = folded;
    }
}

fn folded_kind(expr: &Expr) -> Option<ExprKind> {
    match &expr.kind {
        ExprKind::Unary { op, operand } => match (op, &operand.kind) {
            (UnaryOp::Neg, ExprKind::Number(value)) => Some(ExprKind::Number(-value)),
            (UnaryOp::Not, ExprKind::Boolean(value)) => Some(ExprKind::Boolean(!value)),
            (UnaryOp::Not, ExprKind::Nil) => Some(ExprKind::Boolean(true)),
            _ => None,
        },
        ExprKind::Binary { op, left, right } => {
            let (ExprKind::Number(lhs), ExprKind::Number(rhs)) = (&left.kind, &right.kind)
            else {
                return None;
            };
            let kind = match op {
                BinaryOp::Add => ExprKind::Number(lhs + rhs),
                BinaryOp::Sub => ExprKind::Number(lhs - rhs),
                BinaryOp::Mul => ExprKind::Number(lhs * rhs),
                BinaryOp::Div => ExprKind::Number(lhs / rhs),
                BinaryOp::Mod => ExprKind::Number(lhs % rhs),
                BinaryOp::Pow => ExprKind::Number(lhs.powf(*rhs)),
                BinaryOp::Eq => ExprKind::Boolean(lhs == rhs),
                BinaryOp::Ne => ExprKind::Boolean(lhs != rhs),
                BinaryOp::Lt => ExprKind::Boolean(lhs < rhs),
                BinaryOp::Le => ExprKind::Boolean(lhs <= rhs),
                BinaryOp::Gt => ExprKind::Boolean(lhs > rhs),
                BinaryOp::Ge => ExprKind::Boolean(lhs >= rhs),
                BinaryOp::And | BinaryOp::Or => return None,
            };
            Some(kind)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::FileId;
    use crate::frontend::ast::StmtKind;
    use crate::frontend::lexer::tokenize;
    use crate::frontend::parser::parse;

    fn folded_init(source: &str) -> ExprKind {
        let (tokens, _) = tokenize(source, FileId(0));
        let mut program = parse(&tokens, FileId(0)).expect("source parses");
        run(&mut program);
        match program.body.statements.remove(0).kind {
            StmtKind::Let(decl) => decl.value.expect("initializer").kind,
            _ => panic!("expected let"),
        }
    }

    #[test]
    fn numeric_arithmetic_folds_recursively() {
        assert!(matches!(folded_init("let x = 1 + 2 * 3"), ExprKind::Number(v) if v == 7.0));
        assert!(matches!(folded_init("let x = 2 ^ 3"), ExprKind::Number(v) if v == 8.0));
        assert!(matches!(folded_init("let x = -(1 + 1)"), ExprKind::Number(v) if v == -2.0));
    }

    #[test]
    fn numeric_comparisons_fold_to_booleans() {
        assert!(matches!(folded_init("let x = 1 < 2"), ExprKind::Boolean(true)));
        assert!(matches!(folded_init("let x = 1 ~= 1"), ExprKind::Boolean(false)));
    }

    #[test]
    fn not_folds_on_literal_truth_values() {
        assert!(matches!(folded_init("let x = not true"), ExprKind::Boolean(false)));
        assert!(matches!(folded_init("let x = not nil"), ExprKind::Boolean(true)));
    }

    #[test]
    fn identifiers_block_folding() {
        assert!(matches!(folded_init("let x = 1 + y"), ExprKind::Binary { .. }));
        assert!(matches!(folded_init("let x = not y"), ExprKind::Unary { .. }));
    }

    #[test]
    fn folding_reaches_nested_blocks() {
        let (tokens, _) = tokenize("fn f() { if c { let x = 1 + 1 } }", FileId(0));
        let mut program = parse(&tokens, FileId(0)).expect("parses");
        run(&mut program);
        let StmtKind::Function(func) = &program.body.statements[0].kind else {
            panic!("expected fn");
        };
        let StmtKind::If(if_stmt) = &func.body.statements[0].kind else {
            panic!("expected if");
        };
        let StmtKind::Let(decl) = &if_stmt.arms[0].body.statements[0].kind else {
            panic!("expected let");
        };
        assert!(matches!(
            decl.value.as_ref().map(|value| &value.kind),
            Some(ExprKind::Number(v)) if *v == 2.0
        ));
    }
}
