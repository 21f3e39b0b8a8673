//! Constant truthiness over a small expression sub-language.
//!
//! Used for reachability warnings only: literals, `not`, unary minus,
//! arithmetic on numeric literals, comparisons on numbers, and the
//! short-circuit operators. Anything touching an identifier is not
//! constant.

use crate::frontend::ast::{BinaryOp, Expr, ExprKind, UnaryOp};

#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    Number(f64),
    Boolean(bool),
    Str(String),
    Nil,
}

impl ConstValue {
    /// Lua truthiness: only `nil` and `false` are falsy.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        !matches!(self, ConstValue::Nil | ConstValue::Boolean(false))
    }
}

/// Truthiness of a condition, when it is constant.
#[must_use]
pub fn const_truthiness(expr: &Expr) -> Option<bool> {
    const_eval(expr).map(|value| value.is_truthy())
}

/// Evaluate the constant sub-language. `None` means "not a constant".
#[must_use]
pub fn const_eval(expr: &Expr) -> Option<ConstValue> {
    match &expr.kind {
        ExprKind::Number(value) => Some(ConstValue::Number(*value)),
        ExprKind::Str(value) => Some(ConstValue::Str(value.clone())),
        ExprKind::Boolean(value) => Some(ConstValue::Boolean(*value)),
        ExprKind::Nil => Some(ConstValue::Nil),
        ExprKind::Unary { op, operand } => {
            let operand = const_eval(operand)?;
            match (op, operand) {
                (UnaryOp::Not, value) => Some(ConstValue::Boolean(!value.is_truthy())),
                (UnaryOp::Neg, ConstValue::Number(value)) => Some(ConstValue::Number(-value)),
                _ => None,
            }
        }
        ExprKind::Binary { op, left, right } => match op {
            BinaryOp::And => {
                let left = const_eval(left)?;
                if left.is_truthy() {
                    const_eval(right)
                } else {
                    Some(left)
                }
            }
            BinaryOp::Or => {
                let left = const_eval(left)?;
                if left.is_truthy() {
                    Some(left)
                } else {
                    const_eval(right)
                }
            }
            _ => {
                let (ConstValue::Number(lhs), ConstValue::Number(rhs)) =
                    (const_eval(left)?, const_eval(right)?)
                else {
                    return None;
                };
                numeric_binary(*op, lhs, rhs)
            }
        },
        _ => None,
    }
}

fn numeric_binary(op: BinaryOp, lhs: f64, rhs: f64) -> Option<ConstValue> {
    let value = match op {
        BinaryOp::Add => ConstValue::Number(lhs + rhs),
        BinaryOp::Sub => ConstValue::Number(lhs - rhs),
        BinaryOp::Mul => ConstValue::Number(lhs * rhs),
        BinaryOp::Div => ConstValue::Number(lhs / rhs),
        BinaryOp::Mod => ConstValue::Number(lhs % rhs),
        BinaryOp::Pow => ConstValue::Number(lhs.powf(rhs)),
        BinaryOp::Eq => ConstValue::Boolean(lhs == rhs),
        BinaryOp::Ne => ConstValue::Boolean(lhs != rhs),
        BinaryOp::Lt => ConstValue::Boolean(lhs < rhs),
        BinaryOp::Le => ConstValue::Boolean(lhs <= rhs),
        BinaryOp::Gt => ConstValue::Boolean(lhs > rhs),
        BinaryOp::Ge => ConstValue::Boolean(lhs >= rhs),
        BinaryOp::And | BinaryOp::Or => return None,
    };
    Some(value)
}
