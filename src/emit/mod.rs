//! AST to readable Lua source.
//!
//! Lowering conventions: structs become `local S = {}` plus an `S.new`
//! factory, enums become plain numbered tables, module units wrap their
//! body in `local M = {} ... return M` with `require` imports up top, and
//! `match` lowers to an `if/elseif/else` chain with non-trivial subjects
//! bound to a fresh `__match<N>` local. Emission is precedence-aware and
//! inserts parentheses only where required.

use crate::frontend::ast::{
    BinaryOp, Block, EnumDecl, Expr, ExprKind, FunctionDecl, Import, MatchStmt, Pattern,
    PatternKind, Program, Stmt, StmtKind, StructDecl, TableField, UnaryOp,
};
use crate::target::Target;

/// Render one program. Both targets currently share the same lowering.
#[must_use]
pub fn emit(program: &Program, _target: Target) -> String {
    let mut emitter = Emitter {
        out: String::new(),
        indent: 0,
        match_counter: 0,
        module_table: None,
    };
    emitter.emit_program(program);
    emitter.out
}

struct Emitter {
    out: String,
    indent: usize,
    match_counter: usize,
    /// Export table name for module units, e.g. `M`.
    module_table: Option<String>,
}

impl Emitter {
    fn emit_program(&mut self, program: &Program) {
        for import in &program.imports {
            self.emit_import(import);
        }

        if program.module.is_some() {
            let table = module_table_name(program);
            if !program.imports.is_empty() {
                self.blank_line();
            }
            self.line(&format!("local {table} = {{}}"));
            self.blank_line();
            self.module_table = Some(table);
        } else if !program.imports.is_empty() {
            self.blank_line();
        }

        self.emit_top_level(&program.body.statements);

        if let Some(table) = self.module_table.clone() {
            self.blank_line();
            self.line(&format!("return {table}"));
        }
    }

    fn emit_import(&mut self, import: &Import) {
        if let Some(names) = &import.names {
            let table = import
                .path
                .rsplit('.')
                .next()
                .unwrap_or(import.path.as_str())
                .to_string();
            self.line(&format!("local {table} = require(\"{}\")", import.path));
            for (name, _) in names {
                self.line(&format!("local {name} = {table}.{name}"));
            }
        } else if let Some(binding) = import.binding() {
            self.line(&format!("local {binding} = require(\"{}\")", import.path));
        }
    }

    fn emit_top_level(&mut self, statements: &[Stmt]) {
        for (index, stmt) in statements.iter().enumerate() {
            let wants_gap = matches!(
                stmt.kind,
                StmtKind::Function(_) | StmtKind::Struct(_) | StmtKind::Enum(_)
            );
            if index > 0 && wants_gap {
                self.blank_line();
            }
            self.emit_stmt(stmt);
        }
    }

    fn emit_block(&mut self, block: &Block) {
        self.indent += 1;
        for stmt in &block.statements {
            self.emit_stmt(stmt);
        }
        self.indent -= 1;
    }

    fn emit_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Let(decl) => {
                match &decl.value {
                    Some(value) => {
                        let rendered = self.render_expr(value, 0);
                        self.line(&format!("local {} = {rendered}", decl.name));
                    }
                    None => self.line(&format!("local {}", decl.name)),
                }
                if decl.exported {
                    self.emit_export(&decl.name);
                }
            }
            StmtKind::Global { name, value, .. } => {
                let rendered = self.render_expr(value, 0);
                self.line(&format!("{name} = {rendered}"));
            }
            StmtKind::Assign { target, value } => {
                let target = self.render_expr(target, 0);
                let rendered = self.render_expr(value, 0);
                self.line(&format!("{target} = {rendered}"));
            }
            StmtKind::Expr(expr) => {
                let rendered = self.render_expr(expr, 0);
                self.line(&rendered);
            }
            StmtKind::Function(decl) => self.emit_function(decl),
            StmtKind::Struct(decl) => self.emit_struct(decl),
            StmtKind::Enum(decl) => self.emit_enum(decl),
            StmtKind::If(if_stmt) => {
                for (index, arm) in if_stmt.arms.iter().enumerate() {
                    let keyword = if index == 0 { "if" } else { "elseif" };
                    let condition = self.render_expr(&arm.condition, 0);
                    self.line(&format!("{keyword} {condition} then"));
                    self.emit_block(&arm.body);
                }
                if let Some(else_body) = &if_stmt.else_body {
                    self.line("else");
                    self.emit_block(else_body);
                }
                self.line("end");
            }
            StmtKind::While { condition, body } => {
                let condition = self.render_expr(condition, 0);
                self.line(&format!("while {condition} do"));
                self.emit_block(body);
                self.line("end");
            }
            StmtKind::ForNum {
                var,
                start,
                end,
                step,
                body,
                ..
            } => {
                let start = self.render_expr(start, 0);
                let end = self.render_expr(end, 0);
                let mut header = format!("for {var} = {start}, {end}");
                if let Some(step) = step {
                    let step = self.render_expr(step, 0);
                    header.push_str(&format!(", {step}"));
                }
                header.push_str(" do");
                self.line(&header);
                self.emit_block(body);
                self.line("end");
            }
            StmtKind::ForIn { vars, iter, body } => {
                let names: Vec<_> = vars.iter().map(|(name, _)| name.as_str()).collect();
                let iter = self.render_expr(iter, 0);
                self.line(&format!("for {} in {iter} do", names.join(", ")));
                self.emit_block(body);
                self.line("end");
            }
            StmtKind::Return { value } => match value {
                Some(value) => {
                    let rendered = self.render_expr(value, 0);
                    self.line(&format!("return {rendered}"));
                }
                None => self.line("return"),
            },
            StmtKind::Match(match_stmt) => self.emit_match(match_stmt),
        }
    }

    fn emit_function(&mut self, decl: &FunctionDecl) {
        let params: Vec<_> = decl.params.iter().map(|param| param.name.as_str()).collect();
        self.line(&format!(
            "local function {}({})",
            decl.name,
            params.join(", ")
        ));
        self.emit_block(&decl.body);
        self.line("end");
        if decl.exported {
            self.emit_export(&decl.name);
        }
    }

    fn emit_struct(&mut self, decl: &StructDecl) {
        self.line(&format!("local {} = {{}}", decl.name));
        self.blank_line();
        let params: Vec<_> = decl.fields.iter().map(|field| field.name.as_str()).collect();
        self.line(&format!(
            "function {}.new({})",
            decl.name,
            params.join(", ")
        ));
        self.indent += 1;
        if params.is_empty() {
            self.line("return {}");
        } else {
            let fields: Vec<_> = params.iter().map(|name| format!("{name} = {name}")).collect();
            self.line(&format!("return {{ {} }}", fields.join(", ")));
        }
        self.indent -= 1;
        self.line("end");
        if decl.exported {
            self.emit_export(&decl.name);
        }
    }

    fn emit_enum(&mut self, decl: &EnumDecl) {
        let mut next = 1i64;
        let mut items = Vec::new();
        for item in &decl.items {
            if let Some(value) = item.value {
                next = value;
            }
            items.push(format!("{} = {next}", item.name));
            next += 1;
        }
        if items.is_empty() {
            self.line(&format!("local {} = {{}}", decl.name));
        } else {
            self.line(&format!("local {} = {{ {} }}", decl.name, items.join(", ")));
        }
        if decl.exported {
            self.emit_export(&decl.name);
        }
    }

    fn emit_match(&mut self, match_stmt: &MatchStmt) {
        let subject = match &match_stmt.subject.kind {
            ExprKind::Ident(name) => name.clone(),
            _ => {
                let fresh = format!("__match{}", self.match_counter);
                self.match_counter += 1;
                let rendered = self.render_expr(&match_stmt.subject, 0);
                self.line(&format!("local {fresh} = {rendered}"));
                fresh
            }
        };

        let mut armed = Vec::new();
        let mut wildcard: Option<&crate::frontend::ast::MatchCase> = None;
        for case in &match_stmt.cases {
            match &case.pattern.kind {
                PatternKind::Wildcard => {
                    wildcard = Some(case);
                    break;
                }
                _ => armed.push(case),
            }
        }

        if armed.is_empty() {
            if let Some(case) = wildcard {
                self.line("do");
                self.emit_block(&case.body);
                self.line("end");
            }
            return;
        }

        for (index, case) in armed.iter().enumerate() {
            let keyword = if index == 0 { "if" } else { "elseif" };
            let comparison = self.render_pattern(&case.pattern, &subject);
            self.line(&format!("{keyword} {comparison} then"));
            self.emit_block(&case.body);
        }
        if let Some(case) = wildcard {
            self.line("else");
            self.emit_block(&case.body);
        }
        self.line("end");
    }

    fn render_pattern(&mut self, pattern: &Pattern, subject: &str) -> String {
        match pattern.comparison() {
            Some(expr) => {
                let rendered = self.render_expr(expr, prec::COMPARISON + 1);
                format!("{subject} == {rendered}")
            }
            None => String::new(),
        }
    }

    fn emit_export(&mut self, name: &str) {
        if let Some(table) = &self.module_table {
            let table = table.clone();
            self.line(&format!("{table}.{name} = {name}"));
        }
    }

    // ---- expressions ----

    fn render_expr(&mut self, expr: &Expr, min_prec: u8) -> String {
        let (rendered, own_prec) = match &expr.kind {
            ExprKind::Number(value) => (render_number(*value), prec::PRIMARY),
            ExprKind::Str(value) => (render_string(value), prec::PRIMARY),
            ExprKind::Boolean(true) => ("true".to_string(), prec::PRIMARY),
            ExprKind::Boolean(false) => ("false".to_string(), prec::PRIMARY),
            ExprKind::Nil => ("nil".to_string(), prec::PRIMARY),
            ExprKind::Ident(name) => (name.clone(), prec::PRIMARY),
            ExprKind::Unary { op, operand } => {
                let inner = self.render_expr(operand, prec::UNARY);
                let rendered = match op {
                    UnaryOp::Not => format!("not {inner}"),
                    UnaryOp::Len => format!("#{inner}"),
                    UnaryOp::Neg if inner.starts_with('-') => format!("-({inner})"),
                    UnaryOp::Neg => format!("-{inner}"),
                };
                (rendered, prec::UNARY)
            }
            ExprKind::Binary { op, left, right } => {
                let own = binary_prec(*op);
                let (left_min, right_min) = if matches!(op, BinaryOp::Pow) {
                    // Right-associative.
                    (own + 1, own)
                } else {
                    (own, own + 1)
                };
                let lhs = self.render_expr(left, left_min);
                let rhs = self.render_expr(right, right_min);
                (format!("{lhs} {} {rhs}", op.as_str()), own)
            }
            ExprKind::Call { callee, args } => {
                let callee = self.render_suffixable(callee);
                let args: Vec<_> = args
                    .iter()
                    .map(|arg| self.render_expr(arg, 0))
                    .collect();
                (format!("{callee}({})", args.join(", ")), prec::PRIMARY)
            }
            ExprKind::Index { base, key, dot } => {
                let base = self.render_suffixable(base);
                let rendered = if *dot {
                    match &key.kind {
                        ExprKind::Str(name) => format!("{base}.{name}"),
                        _ => {
                            let key = self.render_expr(key, 0);
                            format!("{base}[{key}]")
                        }
                    }
                } else {
                    let key = self.render_expr(key, 0);
                    format!("{base}[{key}]")
                };
                (rendered, prec::PRIMARY)
            }
            ExprKind::Table { fields } => (self.render_table(fields), prec::PRIMARY),
        };

        if own_prec < min_prec {
            format!("({rendered})")
        } else {
            rendered
        }
    }

    /// Bases of calls and index chains: anything that is not already a
    /// name, call, or index needs parentheses to be a valid Lua prefix
    /// expression.
    fn render_suffixable(&mut self, expr: &Expr) -> String {
        let rendered = self.render_expr(expr, prec::PRIMARY);
        match &expr.kind {
            ExprKind::Ident(_) | ExprKind::Call { .. } | ExprKind::Index { .. } => rendered,
            _ if rendered.starts_with('(') => rendered,
            _ => format!("({rendered})"),
        }
    }

    fn render_table(&mut self, fields: &[TableField]) -> String {
        if fields.is_empty() {
            return "{}".to_string();
        }
        let entries: Vec<_> = fields
            .iter()
            .map(|field| match field {
                TableField::Field {
                    key_is_ident: true,
                    key,
                    value,
                } => {
                    let value = self.render_expr(value, 0);
                    match &key.kind {
                        ExprKind::Str(name) => format!("{name} = {value}"),
                        _ => value,
                    }
                }
                TableField::Field { key, value, .. } => {
                    let key = self.render_expr(key, 0);
                    let value = self.render_expr(value, 0);
                    format!("[{key}] = {value}")
                }
                TableField::Array { value } => self.render_expr(value, 0),
            })
            .collect();
        format!("{{ {} }}", entries.join(", "))
    }

    // ---- output plumbing ----

    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn blank_line(&mut self) {
        self.out.push('\n');
    }
}

mod prec {
    pub const COMPARISON: u8 = 3;
    pub const UNARY: u8 = 7;
    pub const PRIMARY: u8 = 9;
}

fn binary_prec(op: BinaryOp) -> u8 {
    match op {
        BinaryOp::Or => 1,
        BinaryOp::And => 2,
        BinaryOp::Eq
        | BinaryOp::Ne
        | BinaryOp::Lt
        | BinaryOp::Le
        | BinaryOp::Gt
        | BinaryOp::Ge => prec::COMPARISON,
        BinaryOp::Add | BinaryOp::Sub => 5,
        BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => 6,
        BinaryOp::Pow => 8,
    }
}

fn render_number(value: f64) -> String {
    if value.is_nan() {
        return "0/0".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 {
            "math.huge".to_string()
        } else {
            "-math.huge".to_string()
        };
    }
    if value.fract() == 0.0 && value.abs() < 9.007_199_254_740_992e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

fn render_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

/// Export table name for a module unit. `M` unless the body or imports
/// already bind it, in which case underscores are prefixed until free.
fn module_table_name(program: &Program) -> String {
    let mut taken: Vec<&str> = Vec::new();
    for stmt in &program.body.statements {
        match &stmt.kind {
            StmtKind::Let(decl) => taken.push(&decl.name),
            StmtKind::Function(decl) => taken.push(&decl.name),
            StmtKind::Struct(decl) => taken.push(&decl.name),
            StmtKind::Enum(decl) => taken.push(&decl.name),
            _ => {}
        }
    }
    for import in &program.imports {
        if let Some(binding) = import.binding() {
            taken.push(binding);
        }
    }
    let mut name = "M".to_string();
    while taken.iter().any(|existing| *existing == name) {
        name.insert(0, '_');
    }
    name
}
