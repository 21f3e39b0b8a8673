//! Statement and expression checking against the structural type model.

use std::collections::HashMap;

use crate::diagnostics::{DiagnosticSink, Span};
use crate::frontend::ast::{
    Block, Expr, ExprKind, FunctionDecl, IfArm, IfStmt, LetStmt, MatchStmt, Program, Stmt,
    StmtKind, StructDecl, TableField, TypeExpr, UnaryOp,
};
use crate::link::ModuleEnv;

use super::types::{assignable, resolve_type_expr, StructDef, Type, TypeContext};

/// Type-check one unit. Expects the analyzer to have handled binding and
/// flow rules; the checker only judges types.
pub fn check(program: &Program, env: Option<&ModuleEnv>) -> DiagnosticSink {
    let mut checker = Checker {
        sink: DiagnosticSink::new("type"),
        scopes: Vec::new(),
        enums: HashMap::new(),
        structs: HashMap::new(),
        ret_stack: Vec::new(),
        env,
    };
    checker.run(program);
    checker.sink
}

struct Checker<'env> {
    sink: DiagnosticSink,
    scopes: Vec<HashMap<String, Type>>,
    enums: HashMap<String, Vec<String>>,
    structs: HashMap<String, StructDef>,
    /// Declared return type of each enclosing function; `None` when the
    /// function has no annotation (returns are then unchecked).
    ret_stack: Vec<Option<Type>>,
    env: Option<&'env ModuleEnv>,
}

impl<'env> Checker<'env> {
    fn run(&mut self, program: &Program) {
        self.scopes.push(HashMap::new());
        self.predeclare_imports(program);
        self.scopes.push(HashMap::new());
        for stmt in &program.body.statements {
            self.check_stmt(stmt);
        }
        self.scopes.pop();
        self.scopes.pop();
    }

    fn predeclare_imports(&mut self, program: &Program) {
        for import in &program.imports {
            if let Some(binding) = import.binding() {
                self.declare(binding, Type::Any);
            }
            if let Some(names) = &import.names {
                for (name, _) in names {
                    let ty = self
                        .env
                        .and_then(|env| env.imported_types.get(name))
                        .cloned()
                        .unwrap_or(Type::Any);
                    if let Type::Enum { items, .. } = &ty {
                        // Imported enums take part in member validation.
                        self.enums.insert(name.clone(), items.clone());
                    }
                    self.declare(name, ty);
                }
            }
        }
    }

    // ---- scope plumbing ----

    fn declare(&mut self, name: &str, ty: Type) {
        if name == "_" {
            return;
        }
        if let Some(frame) = self.scopes.last_mut() {
            frame.insert(name.to_string(), ty);
        }
    }

    fn lookup(&self, name: &str) -> Option<&Type> {
        self.scopes
            .iter()
            .rev()
            .find_map(|frame| frame.get(name))
    }

    fn set_type(&mut self, name: &str, ty: Type) {
        for frame in self.scopes.iter_mut().rev() {
            if let Some(slot) = frame.get_mut(name) {
                *slot = ty;
                return;
            }
        }
    }

    fn resolve(&self, expr: &TypeExpr) -> Type {
        let ctx = TypeContext {
            enums: &self.enums,
            structs: &self.structs,
            env: self.env,
        };
        resolve_type_expr(&ctx, expr)
    }

    // ---- statements ----

    fn check_block(&mut self, block: &Block) {
        self.scopes.push(HashMap::new());
        for stmt in &block.statements {
            self.check_stmt(stmt);
        }
        self.scopes.pop();
    }

    fn check_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Let(decl) => self.check_let(decl),
            StmtKind::Global { value, .. } => {
                self.type_of(value);
            }
            StmtKind::Assign { target, value } => self.check_assign(target, value),
            StmtKind::Expr(expr) => {
                self.type_of(expr);
            }
            StmtKind::Function(decl) => self.check_function(decl),
            StmtKind::Struct(decl) => self.check_struct(decl),
            StmtKind::Enum(decl) => {
                let items: Vec<_> = decl.items.iter().map(|item| item.name.clone()).collect();
                self.enums.insert(decl.name.clone(), items.clone());
                self.declare(
                    &decl.name,
                    Type::Enum {
                        name: decl.name.clone(),
                        items,
                    },
                );
            }
            StmtKind::If(if_stmt) => self.check_if(if_stmt),
            StmtKind::While { condition, body } => {
                self.type_of(condition);
                let entry = self.scopes.clone();
                self.narrow(condition, true);
                self.check_block(body);
                self.scopes = entry;
            }
            StmtKind::ForNum {
                var,
                start,
                end,
                step,
                body,
                ..
            } => {
                for bound in [Some(start), Some(end), step.as_ref()].into_iter().flatten() {
                    let ty = self.type_of(bound);
                    if !assignable(&ty, &Type::Number) {
                        self.sink
                            .error(Some(bound.span), format!("Expected number, got {ty}"));
                    }
                }
                self.scopes.push(HashMap::new());
                self.declare(var, Type::Number);
                self.check_block(body);
                self.scopes.pop();
            }
            StmtKind::ForIn { vars, iter, body } => {
                self.type_of(iter);
                self.scopes.push(HashMap::new());
                for (var, _) in vars {
                    self.declare(var, Type::Any);
                }
                self.check_block(body);
                self.scopes.pop();
            }
            StmtKind::Return { value } => self.check_return(stmt.span, value.as_ref()),
            StmtKind::Match(match_stmt) => self.check_match(match_stmt),
        }
    }

    fn check_let(&mut self, decl: &LetStmt) {
        let annotated = decl.annotation.as_ref().map(|annotation| self.resolve(annotation));
        let value_ty = decl.value.as_ref().map(|value| self.type_of(value));
        let declared = match (annotated, value_ty) {
            (Some(declared), Some(value_ty)) => {
                if !assignable(&value_ty, &declared) {
                    let span = decl.value.as_ref().map(|value| value.span);
                    self.sink.error(
                        span,
                        format!("Type mismatch: expected {declared}, got {value_ty}"),
                    );
                }
                declared
            }
            (Some(declared), None) => declared,
            (None, Some(value_ty)) => value_ty,
            (None, None) => Type::Any,
        };
        self.declare(&decl.name, declared);
    }

    fn check_assign(&mut self, target: &Expr, value: &Expr) {
        let value_ty = self.type_of(value);
        match &target.kind {
            ExprKind::Ident(name) => {
                if let Some(target_ty) = self.lookup(name).cloned() {
                    if !assignable(&value_ty, &target_ty) {
                        self.sink.error(
                            Some(value.span),
                            format!("Type mismatch: expected {target_ty}, got {value_ty}"),
                        );
                    }
                }
            }
            _ => {
                self.type_of(target);
            }
        }
    }

    fn check_function(&mut self, decl: &FunctionDecl) {
        let params: Vec<_> = decl
            .params
            .iter()
            .map(|param| {
                param
                    .annotation
                    .as_ref()
                    .map_or(Type::Any, |annotation| self.resolve(annotation))
            })
            .collect();
        let declared_ret = decl.ret.as_ref().map(|annotation| self.resolve(annotation));
        let func_ty = Type::Func {
            params: params.clone(),
            ret: Box::new(declared_ret.clone().unwrap_or(Type::Any)),
        };
        self.declare(&decl.name, func_ty);

        self.scopes.push(HashMap::new());
        for (param, ty) in decl.params.iter().zip(params) {
            self.declare(&param.name, ty);
        }
        self.ret_stack.push(declared_ret);
        self.check_block(&decl.body);
        self.ret_stack.pop();
        self.scopes.pop();
    }

    fn check_struct(&mut self, decl: &StructDecl) {
        let fields: std::collections::BTreeMap<_, _> = decl
            .fields
            .iter()
            .map(|field| (field.name.clone(), self.resolve(&field.ty)))
            .collect();
        let ctor_params: Vec<_> = decl
            .fields
            .iter()
            .map(|field| fields[&field.name].clone())
            .collect();
        self.structs.insert(
            decl.name.clone(),
            StructDef {
                fields: fields.clone(),
                ctor_params: ctor_params.clone(),
            },
        );
        self.declare(
            &decl.name,
            Type::StructCtor {
                name: decl.name.clone(),
                instance: Box::new(Type::Struct { fields }),
                ctor_params,
            },
        );
    }

    fn check_return(&mut self, span: Span, value: Option<&Expr>) {
        let declared = match self.ret_stack.last() {
            Some(Some(declared)) => declared.clone(),
            _ => {
                if let Some(value) = value {
                    self.type_of(value);
                }
                return;
            }
        };
        let (value_ty, at) = match value {
            Some(value) => (self.type_of(value), value.span),
            None => (Type::Nil, span),
        };
        if !assignable(&value_ty, &declared) {
            self.sink.error(
                Some(at),
                format!("Return type mismatch: expected {declared}, got {value_ty}"),
            );
        }
    }

    fn check_if(&mut self, if_stmt: &IfStmt) {
        self.check_if_arms(&if_stmt.arms, if_stmt.else_body.as_ref());
    }

    fn check_if_arms(&mut self, arms: &[IfArm], else_body: Option<&Block>) {
        let Some((arm, rest)) = arms.split_first() else {
            if let Some(block) = else_body {
                self.check_block(block);
            }
            return;
        };
        self.type_of(&arm.condition);
        let entry = self.scopes.clone();
        self.narrow(&arm.condition, true);
        self.check_block(&arm.body);
        self.scopes.clone_from(&entry);
        self.narrow(&arm.condition, false);
        self.check_if_arms(rest, else_body);
        self.scopes = entry;
    }

    fn check_match(&mut self, match_stmt: &MatchStmt) {
        self.type_of(&match_stmt.subject);
        for case in &match_stmt.cases {
            if let Some(comparison) = case.pattern.comparison() {
                self.type_of(comparison);
            }
            self.check_block(&case.body);
        }
    }

    /// Mirror of the analyzer's narrowing, at the type level: `x == nil`,
    /// `x ~= nil`, and bare `x`. Mutates the narrowed local's type in the
    /// current scope copy only; callers restore around branches.
    fn narrow(&mut self, condition: &Expr, positive: bool) {
        use crate::frontend::ast::BinaryOp;
        match &condition.kind {
            ExprKind::Ident(name) => {
                if positive {
                    if let Some(current) = self.lookup(name).cloned() {
                        self.set_type(name, current.remove_nil());
                    }
                }
            }
            ExprKind::Binary { op, left, right }
                if matches!(op, BinaryOp::Eq | BinaryOp::Ne) =>
            {
                let name = match (&left.kind, &right.kind) {
                    (ExprKind::Ident(name), ExprKind::Nil)
                    | (ExprKind::Nil, ExprKind::Ident(name)) => name.clone(),
                    _ => return,
                };
                let Some(current) = self.lookup(&name).cloned() else {
                    return;
                };
                let is_nil_branch = matches!(op, BinaryOp::Eq) == positive;
                if is_nil_branch {
                    if current.is_nilable() {
                        self.set_type(&name, Type::Nil);
                    }
                } else {
                    self.set_type(&name, current.remove_nil());
                }
            }
            _ => {}
        }
    }

    // ---- expressions ----

    fn type_of(&mut self, expr: &Expr) -> Type {
        match &expr.kind {
            ExprKind::Number(_) => Type::Number,
            ExprKind::Str(_) => Type::String,
            ExprKind::Boolean(_) => Type::Boolean,
            ExprKind::Nil => Type::Nil,
            ExprKind::Ident(name) => self.lookup(name).cloned().unwrap_or(Type::Any),
            ExprKind::Table { fields } => self.type_of_table(fields),
            ExprKind::Unary { op, operand } => {
                let operand_ty = self.type_of(operand);
                match op {
                    UnaryOp::Not => Type::Boolean,
                    UnaryOp::Neg | UnaryOp::Len => {
                        if !assignable(&operand_ty, &Type::Number) {
                            self.sink.error(
                                Some(operand.span),
                                format!("Expected number, got {operand_ty}"),
                            );
                        }
                        Type::Number
                    }
                }
            }
            ExprKind::Binary { op, left, right } => {
                use crate::frontend::ast::BinaryOp;
                let left_ty = self.type_of(left);
                let right_ty = self.type_of(right);
                if op.is_arithmetic() {
                    for (side, ty) in [(left, &left_ty), (right, &right_ty)] {
                        if !assignable(ty, &Type::Number) {
                            self.sink
                                .error(Some(side.span), format!("Expected number, got {ty}"));
                        }
                    }
                    Type::Number
                } else if op.is_comparison() || op.is_equality() {
                    Type::Boolean
                } else {
                    debug_assert!(matches!(op, BinaryOp::And | BinaryOp::Or));
                    Type::union(vec![left_ty, right_ty])
                }
            }
            ExprKind::Call { callee, args } => self.type_of_call(callee, args),
            ExprKind::Index { base, key, dot } => self.type_of_index(expr.span, base, key, *dot),
        }
    }

    fn type_of_table(&mut self, fields: &[TableField]) -> Type {
        let mut map = std::collections::BTreeMap::new();
        let mut positional = Vec::new();
        let mut computed = false;
        for field in fields {
            match field {
                TableField::Field {
                    key_is_ident: true,
                    key,
                    value,
                } => {
                    let value_ty = self.type_of(value);
                    if let ExprKind::Str(name) = &key.kind {
                        map.insert(name.clone(), value_ty);
                    }
                }
                TableField::Field { key, value, .. } => {
                    self.type_of(key);
                    self.type_of(value);
                    computed = true;
                }
                TableField::Array { value } => {
                    positional.push(self.type_of(value));
                }
            }
        }
        if computed {
            map.insert("[index]".to_string(), Type::Any);
        } else if !positional.is_empty() {
            map.insert("[index]".to_string(), Type::union(positional));
        }
        Type::Struct { fields: map }
    }

    fn type_of_call(&mut self, callee: &Expr, args: &[Expr]) -> Type {
        let callee_ty = self.type_of(callee);
        let func = match &callee_ty {
            Type::Func { params, ret } => Some((params.clone(), (**ret).clone())),
            Type::Union(members) => members.iter().find_map(|member| match member {
                Type::Func { params, ret } => Some((params.clone(), (**ret).clone())),
                _ => None,
            }),
            Type::Any | Type::Never => None,
            other => {
                self.sink.error(
                    Some(callee.span),
                    format!("Attempt to call non-function value of type {other}"),
                );
                None
            }
        };

        let Some((params, ret)) = func else {
            for arg in args {
                self.type_of(arg);
            }
            return Type::Any;
        };

        for (index, arg) in args.iter().enumerate() {
            let arg_ty = self.type_of(arg);
            // Extra arguments are accepted and treated as any -> any.
            if let Some(param) = params.get(index) {
                if !assignable(&arg_ty, param) {
                    self.sink.error(
                        Some(arg.span),
                        format!("Argument {}: expected {param}, got {arg_ty}", index + 1),
                    );
                }
            }
        }
        for (index, param) in params.iter().enumerate().skip(args.len()) {
            if !assignable(&Type::Nil, param) {
                self.sink.error(
                    Some(callee.span),
                    format!("Argument {}: expected {param}, got nil", index + 1),
                );
            }
        }
        ret
    }

    fn type_of_index(&mut self, span: Span, base: &Expr, key: &Expr, dot: bool) -> Type {
        if !dot {
            self.type_of(base);
            self.type_of(key);
            return Type::Any;
        }
        let ExprKind::Str(symbol) = &key.kind else {
            self.type_of(base);
            return Type::Any;
        };

        if let Some(name) = base.as_ident() {
            if let Some(env) = self.env {
                if let Some(module) = env.alias_target(name) {
                    // Missing exports were already reported by the analyzer.
                    return env.export_type(module, symbol).cloned().unwrap_or(Type::Any);
                }
            }
            if let Some(items) = self.enums.get(name).cloned() {
                if !items.iter().any(|item| item == symbol) {
                    self.sink.error(
                        Some(span),
                        format!("Enum '{name}' has no member '{symbol}'"),
                    );
                }
                return Type::Enum {
                    name: name.to_string(),
                    items,
                };
            }
        }

        let base_ty = self.type_of(base);
        match &base_ty {
            Type::StructCtor {
                instance,
                ctor_params,
                ..
            } if symbol == "new" => Type::Func {
                params: ctor_params.clone(),
                ret: instance.clone(),
            },
            Type::Struct { fields } => match fields.get(symbol) {
                Some(field_ty) => field_ty.clone(),
                None => {
                    self.sink.error(
                        Some(span),
                        format!("Field '{symbol}' not present on type {base_ty}"),
                    );
                    Type::Any
                }
            },
            ty if ty.is_nilable() => {
                self.sink
                    .error(Some(span), "Cannot access field on possibly-nil value");
                Type::Any
            }
            _ => Type::Any,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::FileId;
    use crate::frontend::lexer::tokenize;
    use crate::frontend::parser::parse;

    fn check_source(source: &str) -> DiagnosticSink {
        let (tokens, sink) = tokenize(source, FileId(0));
        assert!(sink.is_empty(), "lex errors: {:?}", sink.as_slice());
        let program = parse(&tokens, FileId(0)).expect("source parses");
        check(&program, None)
    }

    fn has_message(sink: &DiagnosticSink, needle: &str) -> bool {
        sink.as_slice()
            .iter()
            .any(|diagnostic| diagnostic.message.contains(needle))
    }

    #[test]
    fn return_type_mismatch_is_reported() {
        let sink = check_source("fn f(): number { return \"no\" }");
        assert!(has_message(
            &sink,
            "Return type mismatch: expected number, got string"
        ));
    }

    #[test]
    fn return_without_value_against_declared_type() {
        let sink = check_source("fn f(): number { return }");
        assert!(has_message(
            &sink,
            "Return type mismatch: expected number, got nil"
        ));
    }

    #[test]
    fn let_annotation_rejects_bad_initializer() {
        let sink = check_source("fn f() { let x: number = \"s\" }");
        assert!(has_message(&sink, "Type mismatch: expected number, got string"));
    }

    #[test]
    fn assignment_checks_against_declared_type() {
        let sink = check_source("fn f() { let x: number = 1 x = \"s\" }");
        assert!(has_message(&sink, "Type mismatch: expected number, got string"));
    }

    #[test]
    fn arithmetic_requires_numbers_pointing_at_the_bad_side() {
        let sink = check_source("fn f() { let x = 1 + \"s\" }");
        assert!(has_message(&sink, "Expected number, got string"));
    }

    #[test]
    fn and_or_yield_the_union_of_both_sides() {
        let sink = check_source("fn f() { let x: number | string = 1 and \"s\" }");
        assert!(!sink.has_errors(), "{:?}", sink.as_slice());
    }

    #[test]
    fn call_checks_arguments_in_order() {
        let sink = check_source(
            "fn add(a: number, b: number): number { return a + b } fn g() { add(1, \"s\") }",
        );
        assert!(has_message(&sink, "Argument 2: expected number, got string"));
    }

    #[test]
    fn extra_call_arguments_are_accepted() {
        let sink = check_source("fn f(a: number) { } fn g() { f(1, 2, 3) }");
        assert!(!sink.has_errors(), "{:?}", sink.as_slice());
    }

    #[test]
    fn missing_non_nilable_argument_is_reported() {
        let sink = check_source("fn f(a: number) { } fn g() { f() }");
        assert!(has_message(&sink, "Argument 1: expected number, got nil"));
    }

    #[test]
    fn calling_a_non_function_is_an_error() {
        let sink = check_source("fn f() { let x = 1 x(2) }");
        assert!(has_message(
            &sink,
            "Attempt to call non-function value of type number"
        ));
    }

    #[test]
    fn enum_member_access_is_validated() {
        let sink = check_source("enum E { A, B } fn f() { let x = E.C }");
        assert!(has_message(&sink, "Enum 'E' has no member 'C'"));

        let sink = check_source("enum E { A, B } fn f() { let x: E = E.A }");
        assert!(!sink.has_errors(), "{:?}", sink.as_slice());
    }

    #[test]
    fn struct_constructor_new_returns_the_instance() {
        let sink = check_source(
            "struct Point { x: number, y: number } fn f(): number { let p = Point.new(1, 2) return p.x }",
        );
        assert!(!sink.has_errors(), "{:?}", sink.as_slice());
    }

    #[test]
    fn struct_constructor_checks_field_arguments() {
        let sink = check_source(
            "struct Point { x: number, y: number } fn f() { let p = Point.new(1, \"s\") }",
        );
        assert!(has_message(&sink, "Argument 2: expected number, got string"));
    }

    #[test]
    fn missing_struct_field_is_reported() {
        let sink = check_source(
            "struct Point { x: number } fn f(p: Point) { let y = p.z }",
        );
        assert!(has_message(&sink, "Field 'z' not present on type {x: number}"));
    }

    #[test]
    fn narrowing_removes_nil_for_field_access() {
        let sink = check_source(
            "fn f() { let t: {x: number} | nil = nil if t ~= nil { let y = t.x } }",
        );
        assert!(!sink.has_errors(), "{:?}", sink.as_slice());
    }

    #[test]
    fn unnarrowed_nilable_field_access_is_an_error() {
        let sink = check_source("fn f(t: {x: number} | nil) { let y = t.x }");
        assert!(has_message(&sink, "Cannot access field on possibly-nil value"));
    }

    #[test]
    fn narrowing_does_not_escape_the_branch() {
        let sink = check_source(
            "fn f(t: {x: number} | nil) { if t ~= nil { let a = t.x } let b = t.x }",
        );
        assert!(has_message(&sink, "Cannot access field on possibly-nil value"));
    }

    #[test]
    fn truthiness_test_narrows_in_then_branch() {
        let sink = check_source("fn f(t: {x: number} | nil) { if t { let y = t.x } }");
        assert!(!sink.has_errors(), "{:?}", sink.as_slice());
    }

    #[test]
    fn width_subtyping_accepts_extra_fields() {
        let sink = check_source(
            "fn takes(p: {x: number}): number { return p.x } fn g() { let wide = { x = 1, y = 2 } let n = takes(wide) }",
        );
        assert!(!sink.has_errors(), "{:?}", sink.as_slice());
    }

    #[test]
    fn numeric_for_bounds_must_be_numbers() {
        let sink = check_source("fn f() { for i = 1, \"ten\" { } }");
        assert!(has_message(&sink, "Expected number, got string"));
    }

    #[test]
    fn unknown_type_names_fall_back_to_any() {
        let sink = check_source("fn f(x: Widget) { let y: number = x }");
        assert!(!sink.has_errors(), "{:?}", sink.as_slice());
    }
}
