//! Flow-sensitive analysis: scope and binding rules, definite assignment,
//! nil tracking with branch narrowing, constant-condition reachability,
//! return-path summaries, and match exhaustiveness.
//!
//! The analyzer enforces every static rule that does not need the type
//! lattice and computes the flow facts the checker does not. It reads the
//! tree, never rewrites it; all findings land in its diagnostic sink.

mod const_eval;
mod scope;

pub use const_eval::{const_eval, const_truthiness, ConstValue};
pub use scope::{FlowSummary, LocalInfo, Nilness, Scope, StateSnapshot};

use std::collections::HashSet;

use crate::diagnostics::{DiagnosticSink, Span};
use crate::frontend::ast::{
    Block, EnumDecl, Expr, ExprKind, FunctionDecl, IfArm, IfStmt, LetStmt, MatchStmt, PatternKind,
    Program, Stmt, StmtKind, StructDecl, TableField, TypeExpr, UnaryOp,
};
use crate::link::ModuleEnv;
use crate::typeck::Type;

/// Target built-ins that may be read without a `global` declaration.
const DEFAULT_GLOBALS: &[&str] = &[
    "assert",
    "error",
    "ipairs",
    "next",
    "pairs",
    "pcall",
    "print",
    "select",
    "tonumber",
    "tostring",
    "type",
    "unpack",
    "xpcall",
    "math",
    "string",
    "table",
    "coroutine",
    "os",
    "utf8",
    "require",
    "_G",
];

/// Run the analyzer over one unit. The module environment is present for
/// multi-unit compiles and pre-declares import bindings.
pub fn analyze(program: &Program, env: Option<&ModuleEnv>) -> DiagnosticSink {
    let mut analyzer = Analyzer {
        sink: DiagnosticSink::new("sem"),
        scopes: Vec::new(),
        allowed_globals: HashSet::new(),
        env,
    };
    analyzer.run(program);
    analyzer.sink
}

struct Analyzer<'env> {
    sink: DiagnosticSink,
    scopes: Vec<Scope>,
    allowed_globals: HashSet<String>,
    env: Option<&'env ModuleEnv>,
}

impl<'env> Analyzer<'env> {
    fn run(&mut self, program: &Program) {
        self.push_scope();
        self.predeclare_imports(program);
        self.push_scope();
        self.analyze_statements(&program.body.statements);
        self.pop_scope();
        // The import frame never warns: bindings are marked used up front.
        self.scopes.pop();
    }

    /// Import bindings behave as assigned non-nil locals of the import
    /// scope. With a module environment, imported enums also register their
    /// items so matches on them can be checked for exhaustiveness.
    fn predeclare_imports(&mut self, program: &Program) {
        let mut bindings: Vec<String> = Vec::new();
        for import in &program.imports {
            if let Some(binding) = import.binding() {
                bindings.push(binding.to_string());
            }
            if let Some(names) = &import.names {
                bindings.extend(names.iter().map(|(name, _)| name.clone()));
            }
        }
        let Some(frame) = self.scopes.last_mut() else {
            return;
        };
        for name in bindings {
            frame.locals.insert(
                name.clone(),
                LocalInfo {
                    used: true,
                    assigned: true,
                    nilness: Nilness::NonNil,
                    type_name: Some(name),
                    decl_span: Span::point(crate::diagnostics::FileId::UNKNOWN, 1, 1),
                },
            );
        }
        if let Some(env) = self.env {
            for (name, ty) in &env.imported_types {
                if let Type::Enum { items, .. } = ty {
                    frame.enums.insert(name.clone(), items.clone());
                }
            }
        }
    }

    // ---- scope plumbing ----

    fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    fn pop_scope(&mut self) {
        let Some(frame) = self.scopes.pop() else {
            return;
        };
        let mut unused: Vec<_> = frame
            .locals
            .into_iter()
            .filter(|(name, info)| !info.used && name != "_")
            .collect();
        unused.sort_by_key(|(name, info)| {
            (info.decl_span.start_line, info.decl_span.start_col, name.clone())
        });
        for (name, info) in unused {
            self.sink
                .warn(Some(info.decl_span), format!("Unused local '{name}'"));
        }
    }

    fn declare(&mut self, name: &str, name_span: Span, info: LocalInfo) {
        if name == "_" {
            return;
        }
        let depth = self.scopes.len();
        if depth == 0 {
            return;
        }
        if self.scopes[depth - 1].locals.contains_key(name) {
            self.sink.error(
                Some(name_span),
                format!("Duplicate declaration of '{name}' in the same scope"),
            );
            return;
        }
        if self.scopes[..depth - 1]
            .iter()
            .any(|frame| frame.locals.contains_key(name))
        {
            self.sink.warn(
                Some(name_span),
                format!("Declaration of '{name}' shadows an earlier binding"),
            );
        }
        self.scopes[depth - 1].locals.insert(name.to_string(), info);
    }

    fn lookup_mut(&mut self, name: &str) -> Option<&mut LocalInfo> {
        self.scopes
            .iter_mut()
            .rev()
            .find_map(|frame| frame.locals.get_mut(name))
    }

    fn lookup_enum(&self, name: &str) -> Option<&[String]> {
        self.scopes
            .iter()
            .rev()
            .find_map(|frame| frame.enums.get(name).map(Vec::as_slice))
    }

    fn is_allowed_global(&self, name: &str) -> bool {
        DEFAULT_GLOBALS.contains(&name) || self.allowed_globals.contains(name)
    }

    // ---- control-flow state ----

    fn snapshot(&self) -> StateSnapshot {
        self.scopes
            .iter()
            .map(|frame| {
                frame
                    .locals
                    .iter()
                    .map(|(name, info)| (name.clone(), (info.assigned, info.nilness)))
                    .collect()
            })
            .collect()
    }

    fn restore(&mut self, state: &StateSnapshot) {
        for (frame, saved) in self.scopes.iter_mut().zip(state) {
            for (name, (assigned, nilness)) in saved {
                if let Some(info) = frame.locals.get_mut(name) {
                    info.assigned = *assigned;
                    info.nilness = *nilness;
                }
            }
        }
    }

    /// Join the current state with another branch's exit state: assignment
    /// is intersected, nilness joins through the lattice.
    fn join_with(&mut self, state: &StateSnapshot) {
        for (frame, other) in self.scopes.iter_mut().zip(state) {
            for (name, (assigned, nilness)) in other {
                if let Some(info) = frame.locals.get_mut(name) {
                    info.assigned = info.assigned && *assigned;
                    info.nilness = info.nilness.join(*nilness);
                }
            }
        }
    }

    fn set_nilness(&mut self, name: &str, nilness: Nilness) {
        if let Some(info) = self.lookup_mut(name) {
            info.nilness = nilness;
        }
    }

    /// Narrow a branch condition. Supported shapes: `x == nil`, `x ~= nil`,
    /// and a bare `x` truthiness test. Mutation is confined to the current
    /// state; callers snapshot around branches.
    fn apply_narrowing(&mut self, condition: &Expr, positive: bool) {
        use crate::frontend::ast::BinaryOp;
        match &condition.kind {
            ExprKind::Ident(name) => {
                let name = name.clone();
                let nilness = if positive {
                    Nilness::NonNil
                } else {
                    Nilness::MaybeNil
                };
                self.set_nilness(&name, nilness);
            }
            ExprKind::Binary { op, left, right }
                if matches!(op, BinaryOp::Eq | BinaryOp::Ne) =>
            {
                let (name, _) = match (&left.kind, &right.kind) {
                    (ExprKind::Ident(name), ExprKind::Nil) => (name.clone(), ()),
                    (ExprKind::Nil, ExprKind::Ident(name)) => (name.clone(), ()),
                    _ => return,
                };
                let is_nil_when_true = matches!(op, BinaryOp::Eq);
                let nilness = if positive == is_nil_when_true {
                    Nilness::MaybeNil
                } else {
                    Nilness::NonNil
                };
                self.set_nilness(&name, nilness);
            }
            _ => {}
        }
    }

    // ---- statements ----

    fn analyze_statements(&mut self, statements: &[Stmt]) -> FlowSummary {
        let mut flow = FlowSummary::default();
        let mut warned_dead = false;
        for stmt in statements {
            if flow.always_returns && !warned_dead {
                self.sink.warn(Some(stmt.span), "Dead code after return");
                warned_dead = true;
            }
            let next = self.analyze_stmt(stmt);
            flow.extend(next);
        }
        flow
    }

    fn analyze_block(&mut self, block: &Block) -> FlowSummary {
        self.push_scope();
        let flow = self.analyze_statements(&block.statements);
        self.pop_scope();
        flow
    }

    fn analyze_stmt(&mut self, stmt: &Stmt) -> FlowSummary {
        match &stmt.kind {
            StmtKind::Let(decl) => {
                self.analyze_let(decl);
                FlowSummary::default()
            }
            StmtKind::Global { name, value, .. } => {
                self.analyze_expr(value);
                self.allowed_globals.insert(name.clone());
                FlowSummary::default()
            }
            StmtKind::Assign { target, value } => {
                let nilness = self.analyze_expr(value);
                self.analyze_assign_target(target, nilness);
                FlowSummary::default()
            }
            StmtKind::Expr(expr) => {
                self.analyze_expr(expr);
                FlowSummary::default()
            }
            StmtKind::Function(decl) => {
                self.analyze_function(decl);
                FlowSummary::default()
            }
            StmtKind::Struct(decl) => {
                self.declare_struct(decl);
                FlowSummary::default()
            }
            StmtKind::Enum(decl) => {
                self.declare_enum(decl);
                FlowSummary::default()
            }
            StmtKind::If(if_stmt) => self.analyze_if(if_stmt),
            StmtKind::While { condition, body } => self.analyze_while(condition, body),
            StmtKind::ForNum {
                var,
                var_span,
                start,
                end,
                step,
                body,
            } => {
                self.analyze_expr(start);
                self.analyze_expr(end);
                if let Some(step) = step {
                    self.analyze_expr(step);
                }
                self.push_scope();
                self.declare(
                    var,
                    *var_span,
                    LocalInfo {
                        used: false,
                        assigned: true,
                        nilness: Nilness::NonNil,
                        type_name: Some("number".to_string()),
                        decl_span: *var_span,
                    },
                );
                let snap = self.snapshot();
                let body_flow = self.analyze_statements(&body.statements);
                self.join_with(&snap);
                self.pop_scope();
                FlowSummary {
                    always_returns: false,
                    ..body_flow
                }
            }
            StmtKind::ForIn { vars, iter, body } => {
                self.analyze_expr(iter);
                self.push_scope();
                for (var, span) in vars {
                    self.declare(
                        var,
                        *span,
                        LocalInfo {
                            used: false,
                            assigned: true,
                            nilness: Nilness::NonNil,
                            type_name: None,
                            decl_span: *span,
                        },
                    );
                }
                let snap = self.snapshot();
                let body_flow = self.analyze_statements(&body.statements);
                self.join_with(&snap);
                self.pop_scope();
                FlowSummary {
                    always_returns: false,
                    ..body_flow
                }
            }
            StmtKind::Return { value } => {
                if let Some(value) = value {
                    self.analyze_expr(value);
                }
                FlowSummary {
                    always_returns: true,
                    any_with: value.is_some(),
                    any_without: value.is_none(),
                }
            }
            StmtKind::Match(match_stmt) => self.analyze_match(match_stmt),
        }
    }

    fn analyze_let(&mut self, decl: &LetStmt) {
        let value_nilness = decl.value.as_ref().map(|value| self.analyze_expr(value));
        let nilness = match (&decl.annotation, value_nilness) {
            // The annotation is the source of truth unless it admits nil.
            (Some(annotation), Some(_)) if !annotation.union_contains_nil() => Nilness::NonNil,
            (_, Some(from_value)) => from_value,
            (_, None) => Nilness::Unknown,
        };
        self.declare(
            &decl.name,
            decl.name_span,
            LocalInfo {
                used: decl.exported,
                assigned: decl.value.is_some(),
                nilness,
                type_name: decl.annotation.as_ref().and_then(annotation_name),
                decl_span: decl.name_span,
            },
        );
    }

    fn analyze_assign_target(&mut self, target: &Expr, value_nilness: Nilness) {
        match &target.kind {
            ExprKind::Ident(name) => {
                if let Some(info) = self.lookup_mut(name) {
                    info.assigned = true;
                    info.nilness = value_nilness;
                } else if !self.is_allowed_global(name) {
                    self.sink
                        .error(Some(target.span), format!("Undefined variable '{name}'"));
                }
            }
            ExprKind::Index { .. } => {
                self.analyze_expr(target);
            }
            _ => {
                // The parser restricts targets to names and index chains.
            }
        }
    }

    fn analyze_function(&mut self, decl: &FunctionDecl) {
        self.declare(
            &decl.name,
            decl.name_span,
            LocalInfo {
                used: decl.exported,
                assigned: true,
                nilness: Nilness::NonNil,
                type_name: None,
                decl_span: decl.name_span,
            },
        );

        self.push_scope();
        for param in &decl.params {
            let nilness = match &param.annotation {
                None => Nilness::Unknown,
                Some(annotation) if annotation.union_contains_nil() => Nilness::MaybeNil,
                Some(_) => Nilness::NonNil,
            };
            self.declare(
                &param.name,
                param.span,
                LocalInfo {
                    used: false,
                    assigned: true,
                    nilness,
                    type_name: param.annotation.as_ref().and_then(annotation_name),
                    decl_span: param.span,
                },
            );
        }
        let flow = self.analyze_block(&decl.body);
        self.pop_scope();

        if flow.any_with && flow.any_without {
            self.sink
                .error(Some(decl.name_span), "Inconsistent return values");
        }
        if (decl.ret.is_some() || flow.any_with) && !flow.always_returns {
            self.sink
                .error(Some(decl.name_span), "Missing return on some paths");
        }
    }

    fn declare_struct(&mut self, decl: &StructDecl) {
        self.declare(
            &decl.name,
            decl.name_span,
            LocalInfo {
                used: decl.exported,
                assigned: true,
                nilness: Nilness::NonNil,
                type_name: None,
                decl_span: decl.name_span,
            },
        );
    }

    fn declare_enum(&mut self, decl: &EnumDecl) {
        self.declare(
            &decl.name,
            decl.name_span,
            LocalInfo {
                used: decl.exported,
                assigned: true,
                nilness: Nilness::NonNil,
                type_name: None,
                decl_span: decl.name_span,
            },
        );
        let items = decl.items.iter().map(|item| item.name.clone()).collect();
        if let Some(frame) = self.scopes.last_mut() {
            frame.enums.insert(decl.name.clone(), items);
        }
    }

    fn analyze_if(&mut self, if_stmt: &IfStmt) -> FlowSummary {
        self.analyze_if_arms(&if_stmt.arms, if_stmt.else_body.as_ref(), true, false)
    }

    fn analyze_if_arms(
        &mut self,
        arms: &[IfArm],
        else_body: Option<&Block>,
        is_first: bool,
        prev_always_true: bool,
    ) -> FlowSummary {
        let Some((arm, rest)) = arms.split_first() else {
            return match else_body {
                Some(block) => self.analyze_block(block),
                None => FlowSummary::default(),
            };
        };

        self.analyze_expr(&arm.condition);
        let truth = const_truthiness(&arm.condition);
        let kind = if is_first { "if" } else { "elseif" };
        if prev_always_true {
            self.sink.warn(
                Some(arm.body.span),
                "Unreachable elseif branch (previous condition is always true)",
            );
        } else if truth == Some(false) {
            self.sink
                .warn(Some(arm.body.span), format!("Unreachable {kind} branch"));
        }

        let entry = self.snapshot();
        self.apply_narrowing(&arm.condition, true);
        let then_flow = self.analyze_block(&arm.body);
        let then_state = self.snapshot();

        self.restore(&entry);
        self.apply_narrowing(&arm.condition, false);
        let else_flow = self.analyze_if_arms(
            rest,
            else_body,
            false,
            prev_always_true || truth == Some(true),
        );
        self.join_with(&then_state);

        let mut flow = then_flow.branch(else_flow);
        if rest.is_empty() && else_body.is_none() {
            // No else: the fall-through path never returns.
            flow.always_returns = false;
        }
        flow
    }

    fn analyze_while(&mut self, condition: &Expr, body: &Block) -> FlowSummary {
        self.analyze_expr(condition);
        if const_truthiness(condition) == Some(false) {
            self.sink
                .warn(Some(body.span), "Unreachable while branch");
        }
        let entry = self.snapshot();
        self.apply_narrowing(condition, true);
        let body_flow = self.analyze_block(body);
        self.join_with(&entry);
        FlowSummary {
            always_returns: false,
            ..body_flow
        }
    }

    fn analyze_match(&mut self, match_stmt: &MatchStmt) -> FlowSummary {
        self.analyze_expr(&match_stmt.subject);

        let enum_subject = match_stmt.subject.as_ident().and_then(|name| {
            let type_name = self
                .scopes
                .iter()
                .rev()
                .find_map(|frame| frame.locals.get(name))?
                .type_name
                .clone()?;
            let items = self.lookup_enum(&type_name)?.to_vec();
            Some((type_name, items))
        });

        let mut has_wildcard = false;
        let mut seen_literals: Vec<String> = Vec::new();
        let mut seen_members: Vec<String> = Vec::new();
        let mut case_flows: Vec<FlowSummary> = Vec::new();

        let entry = self.snapshot();
        let mut joined: Option<StateSnapshot> = None;

        for case in &match_stmt.cases {
            if has_wildcard {
                self.sink
                    .warn(Some(case.span), "Unreachable match case after wildcard");
            }
            match &case.pattern.kind {
                PatternKind::Wildcard => has_wildcard = true,
                PatternKind::Literal(literal) => {
                    let key = literal_key(literal);
                    if seen_literals.contains(&key) {
                        self.sink.warn(
                            Some(case.pattern.span),
                            "Redundant match case (duplicate literal)",
                        );
                    } else {
                        seen_literals.push(key);
                    }
                }
                PatternKind::Expr(expr) => {
                    if let Some((enum_name, items)) = &enum_subject {
                        if let Some(member) = enum_member(expr, enum_name) {
                            if items.contains(&member.to_string()) {
                                if seen_members.iter().any(|seen| seen == member) {
                                    self.sink.warn(
                                        Some(case.pattern.span),
                                        "Redundant match case (duplicate enum member)",
                                    );
                                } else {
                                    seen_members.push(member.to_string());
                                }
                            }
                        }
                    }
                    self.analyze_expr(expr);
                }
            }

            self.restore(&entry);
            case_flows.push(self.analyze_block(&case.body));
            let exit = self.snapshot();
            joined = Some(match joined {
                None => exit,
                Some(previous) => {
                    self.join_with(&previous);
                    self.snapshot()
                }
            });
        }

        self.restore(&entry);
        if let Some(joined) = &joined {
            if has_wildcard {
                // Every path goes through some case.
                self.restore(joined);
            } else {
                self.join_with(joined);
            }
        }

        if let Some((enum_name, items)) = &enum_subject {
            if !has_wildcard {
                let missing: Vec<_> = items
                    .iter()
                    .filter(|item| !seen_members.contains(item))
                    .cloned()
                    .collect();
                if !missing.is_empty() {
                    self.sink.error(
                        Some(match_stmt.subject.span),
                        format!(
                            "Non-exhaustive match for enum '{enum_name}': missing {}",
                            missing.join(", ")
                        ),
                    );
                }
            }
        } else if !has_wildcard {
            self.sink.warn(
                Some(match_stmt.subject.span),
                "Non-exhaustive match (missing wildcard case)",
            );
        }

        let mut flow = FlowSummary {
            always_returns: has_wildcard && !case_flows.is_empty(),
            any_with: false,
            any_without: false,
        };
        for case_flow in &case_flows {
            flow.always_returns = flow.always_returns && case_flow.always_returns;
            flow.any_with = flow.any_with || case_flow.any_with;
            flow.any_without = flow.any_without || case_flow.any_without;
        }
        flow
    }

    // ---- expressions ----

    /// Walk an expression, reporting reads, and produce its nilness.
    fn analyze_expr(&mut self, expr: &Expr) -> Nilness {
        match &expr.kind {
            ExprKind::Number(_) | ExprKind::Str(_) | ExprKind::Boolean(_) => Nilness::NonNil,
            ExprKind::Nil => Nilness::MaybeNil,
            ExprKind::Ident(name) => {
                let name = name.clone();
                self.read_ident(&name, expr.span)
            }
            ExprKind::Table { fields } => {
                for field in fields {
                    match field {
                        TableField::Field {
                            key_is_ident,
                            key,
                            value,
                        } => {
                            if !key_is_ident {
                                self.analyze_expr(key);
                            }
                            self.analyze_expr(value);
                        }
                        TableField::Array { value } => {
                            self.analyze_expr(value);
                        }
                    }
                }
                Nilness::NonNil
            }
            ExprKind::Unary { op, operand } => {
                self.analyze_expr(operand);
                match op {
                    UnaryOp::Not | UnaryOp::Neg | UnaryOp::Len => Nilness::NonNil,
                }
            }
            ExprKind::Binary { op, left, right } => {
                self.analyze_expr(left);
                self.analyze_expr(right);
                if op.is_arithmetic() || op.is_comparison() || op.is_equality() {
                    Nilness::NonNil
                } else {
                    Nilness::Unknown
                }
            }
            ExprKind::Call { callee, args } => {
                self.analyze_expr(callee);
                for arg in args {
                    self.analyze_expr(arg);
                }
                Nilness::Unknown
            }
            ExprKind::Index { base, key, dot } => {
                self.analyze_index(expr.span, base, key, *dot);
                Nilness::Unknown
            }
        }
    }

    fn analyze_index(&mut self, span: Span, base: &Expr, key: &Expr, dot: bool) {
        if let Some(name) = base.as_ident() {
            let name = name.to_string();
            if dot {
                if let Some(env) = self.env {
                    if let Some(module) = env.alias_target(&name) {
                        let module = module.to_string();
                        self.read_ident(&name, base.span);
                        if let ExprKind::Str(symbol) = &key.kind {
                            if !env.module_has_export(&module, symbol) {
                                self.sink.error(
                                    Some(span),
                                    format!(
                                        "Access to non-exported symbol '{symbol}' from module '{module}'"
                                    ),
                                );
                            }
                        }
                        return;
                    }
                }
            }
            let nilness = self.read_ident(&name, base.span);
            if nilness == Nilness::MaybeNil {
                self.sink
                    .error(Some(span), "Cannot access field on possibly-nil value");
            }
        } else {
            self.analyze_expr(base);
        }
        if !dot {
            self.analyze_expr(key);
        }
    }

    fn read_ident(&mut self, name: &str, span: Span) -> Nilness {
        if let Some(info) = self.lookup_mut(name) {
            info.used = true;
            let nilness = info.nilness;
            if !info.assigned {
                self.sink
                    .error(Some(span), format!("Use of '{name}' before assignment"));
            }
            return nilness;
        }
        if !self.is_allowed_global(name) && name != "_" {
            self.sink
                .error(Some(span), format!("Undefined variable '{name}'"));
        }
        Nilness::Unknown
    }
}

fn annotation_name(annotation: &TypeExpr) -> Option<String> {
    annotation.as_name().map(str::to_string)
}

/// Stable key for duplicate-literal detection.
fn literal_key(literal: &Expr) -> String {
    match &literal.kind {
        ExprKind::Number(value) => format!("n:{value}"),
        ExprKind::Str(value) => format!("s:{value}"),
        ExprKind::Boolean(value) => format!("b:{value}"),
        ExprKind::Nil => "nil".to_string(),
        _ => String::new(),
    }
}

/// `Enum.Member` pattern shape for the subject's enum.
fn enum_member<'a>(expr: &'a Expr, enum_name: &str) -> Option<&'a str> {
    let ExprKind::Index { base, key, dot } = &expr.kind else {
        return None;
    };
    if !dot || base.as_ident() != Some(enum_name) {
        return None;
    }
    match &key.kind {
        ExprKind::Str(member) => Some(member),
        _ => None,
    }
}
