//! Recursive-descent parser for Loam source.
//!
//! Token stream in, [`Program`] out. Structural failures are fatal and
//! surface as a single [`ParseError`]; the driver converts it into a
//! diagnostic at the compile boundary.

use std::error::Error as StdError;
use std::fmt;

use crate::diagnostics::{FileId, Span};
use crate::frontend::ast::{
    BinaryOp, Block, EnumDecl, EnumItem, Expr, ExprKind, FunctionDecl, IfArm, IfStmt, Import,
    LetStmt, MatchCase, MatchStmt, ModuleDecl, Param, Pattern, PatternKind, Program, Stmt,
    StmtKind, StructDecl, StructField, TableField, TypeExpr, TypeExprKind, UnaryOp,
};
use crate::frontend::lexer::{Keyword, Token, TokenKind};

/// Structured parse failure, caught at the compile boundary.
#[derive(Debug, Clone)]
pub struct ParseError {
    pub message: String,
    pub span: Option<Span>,
}

impl ParseError {
    #[must_use]
    pub fn new(message: impl Into<String>, span: Option<Span>) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for ParseError {}

/// Parse one unit into a program tree.
pub fn parse(tokens: &[Token], file: FileId) -> Result<Program, ParseError> {
    let mut parser = Parser {
        tokens,
        index: 0,
        file,
        last_span: None,
    };
    parser.parse_program()
}

struct Parser<'a> {
    tokens: &'a [Token],
    index: usize,
    file: FileId,
    last_span: Option<Span>,
}

type Parsed<T> = Result<T, ParseError>;

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.index)
    }

    fn peek_n(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.index + offset)
    }

    fn is_at_end(&self) -> bool {
        self.index >= self.tokens.len()
    }

    fn advance(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.index)?;
        self.index += 1;
        self.last_span = Some(token.span);
        Some(token)
    }

    fn current_span(&self) -> Option<Span> {
        self.peek().map(|token| token.span).or(self.last_span)
    }

    /// Span running from `start` to the last consumed token.
    fn span_from(&self, start: Span) -> Span {
        match self.last_span {
            Some(end) => start.to(end),
            None => start,
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message, self.current_span())
    }

    fn error_here(&self, expected: &str) -> ParseError {
        match self.peek() {
            Some(token) => ParseError::new(
                format!("expected {expected}, found '{}'", token.lexeme),
                Some(token.span),
            ),
            None => ParseError::new(
                format!("expected {expected}, found end of input"),
                self.last_span,
            ),
        }
    }

    fn check_keyword(&self, keyword: Keyword) -> bool {
        self.peek()
            .is_some_and(|token| token.kind == TokenKind::Keyword(keyword))
    }

    fn match_keyword(&mut self, keyword: Keyword) -> bool {
        if self.check_keyword(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: Keyword, expected: &str) -> Parsed<Span> {
        if self.check_keyword(keyword) {
            let span = self.peek().map(|token| token.span);
            self.advance();
            span.ok_or_else(|| self.error_here(expected))
        } else {
            Err(self.error_here(expected))
        }
    }

    fn check_punct(&self, punct: char) -> bool {
        self.peek()
            .is_some_and(|token| token.kind == TokenKind::Punct(punct))
    }

    fn consume_punct(&mut self, punct: char) -> bool {
        if self.check_punct(punct) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, punct: char) -> Parsed<Span> {
        if self.check_punct(punct) {
            let span = self.peek().map(|token| token.span);
            self.advance();
            span.ok_or_else(|| self.error_here(&format!("'{punct}'")))
        } else {
            Err(self.error_here(&format!("'{punct}'")))
        }
    }

    fn check_op(&self, op: &str) -> bool {
        self.peek()
            .is_some_and(|token| matches!(token.kind, TokenKind::Op(text) if text == op))
    }

    fn consume_op(&mut self, op: &str) -> bool {
        if self.check_op(op) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: &str) -> Parsed<()> {
        if self.consume_op(op) {
            Ok(())
        } else {
            Err(self.error_here(&format!("'{op}'")))
        }
    }

    fn expect_ident(&mut self, expected: &str) -> Parsed<(String, Span)> {
        match self.peek() {
            Some(token) if token.kind == TokenKind::Ident => {
                let name = token.lexeme.clone();
                let span = token.span;
                self.advance();
                Ok((name, span))
            }
            _ => Err(self.error_here(expected)),
        }
    }

    // ---- program structure ----

    fn parse_program(&mut self) -> Parsed<Program> {
        let module = if self.match_keyword(Keyword::Module) {
            let start = self.last_span.unwrap_or_else(|| Span::point(self.file, 1, 1));
            let (name, _) = self.parse_dotted_name()?;
            Some(ModuleDecl {
                name,
                span: self.span_from(start),
            })
        } else {
            None
        };

        let mut imports = Vec::new();
        while self.check_keyword(Keyword::Import) {
            imports.push(self.parse_import()?);
        }

        let mut statements = Vec::new();
        while !self.is_at_end() {
            statements.push(self.parse_statement(true)?);
        }

        let body_span = match (statements.first(), statements.last()) {
            (Some(first), Some(last)) => first.span.to(last.span),
            _ => Span::point(self.file, 1, 1),
        };
        Ok(Program {
            module,
            imports,
            body: Block {
                statements,
                span: body_span,
            },
        })
    }

    fn parse_dotted_name(&mut self) -> Parsed<(String, Span)> {
        let (first, start) = self.expect_ident("module name")?;
        let mut name = first;
        while self.check_punct('.')
            && self
                .peek_n(1)
                .is_some_and(|token| token.kind == TokenKind::Ident)
        {
            self.advance();
            let (segment, _) = self.expect_ident("name segment")?;
            name.push('.');
            name.push_str(&segment);
        }
        Ok((name, self.span_from(start)))
    }

    fn parse_import(&mut self) -> Parsed<Import> {
        let start = self.expect_keyword(Keyword::Import, "'import'")?;
        let (first, _) = self.expect_ident("module path")?;
        let mut path = first;
        let mut names = None;

        while self.check_punct('.') {
            if self
                .peek_n(1)
                .is_some_and(|token| token.kind == TokenKind::Punct('{'))
            {
                self.advance();
                self.expect_punct('{')?;
                let mut list = Vec::new();
                loop {
                    let (name, span) = self.expect_ident("imported symbol")?;
                    list.push((name, span));
                    if !self.consume_punct(',') {
                        break;
                    }
                }
                self.expect_punct('}')?;
                names = Some(list);
                break;
            }
            self.advance();
            let (segment, _) = self.expect_ident("module path segment")?;
            path.push('.');
            path.push_str(&segment);
        }

        let alias = if names.is_none() && self.match_keyword(Keyword::As) {
            let (alias, _) = self.expect_ident("import alias")?;
            Some(alias)
        } else {
            None
        };

        self.consume_punct(';');
        Ok(Import {
            path,
            alias,
            names,
            span: self.span_from(start),
        })
    }

    // ---- statements ----

    fn parse_statement(&mut self, top_level: bool) -> Parsed<Stmt> {
        if self.check_keyword(Keyword::Export) {
            if !top_level {
                return Err(self.error("'export' is only allowed at the top level of a module"));
            }
            let start = self.expect_keyword(Keyword::Export, "'export'")?;
            return match self.peek().map(|token| &token.kind) {
                Some(TokenKind::Keyword(Keyword::Let)) => self.parse_let(start, true),
                Some(TokenKind::Keyword(Keyword::Fn)) => self.parse_function(start, true),
                Some(TokenKind::Keyword(Keyword::Struct)) => self.parse_struct(start, true),
                Some(TokenKind::Keyword(Keyword::Enum)) => self.parse_enum(start, true),
                _ => Err(self.error_here("declaration after 'export'")),
            };
        }

        let Some(token) = self.peek() else {
            return Err(self.error_here("statement"));
        };
        let start = token.span;
        match &token.kind {
            TokenKind::Keyword(Keyword::Let) => self.parse_let(start, false),
            TokenKind::Keyword(Keyword::Global) => self.parse_global(start),
            TokenKind::Keyword(Keyword::Fn) => self.parse_function(start, false),
            TokenKind::Keyword(Keyword::Struct) => self.parse_struct(start, false),
            TokenKind::Keyword(Keyword::Enum) => self.parse_enum(start, false),
            TokenKind::Keyword(Keyword::If) => self.parse_if(start),
            TokenKind::Keyword(Keyword::While) => self.parse_while(start),
            TokenKind::Keyword(Keyword::For) => self.parse_for(start),
            TokenKind::Keyword(Keyword::Return) => self.parse_return(start),
            TokenKind::Keyword(Keyword::Match) => self.parse_match(start),
            _ => self.parse_assign_or_call(start),
        }
    }

    fn parse_let(&mut self, start: Span, exported: bool) -> Parsed<Stmt> {
        self.expect_keyword(Keyword::Let, "'let'")?;
        let (name, name_span) = self.expect_ident("binding name")?;
        let annotation = if self.consume_punct(':') {
            Some(self.parse_type()?)
        } else {
            None
        };
        let value = if self.consume_op("=") {
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.consume_punct(';');
        Ok(Stmt::new(
            self.span_from(start),
            StmtKind::Let(LetStmt {
                name,
                name_span,
                annotation,
                value,
                exported,
            }),
        ))
    }

    fn parse_global(&mut self, start: Span) -> Parsed<Stmt> {
        self.expect_keyword(Keyword::Global, "'global'")?;
        let (name, name_span) = self.expect_ident("global name")?;
        self.expect_op("=")?;
        let value = self.parse_expr()?;
        self.consume_punct(';');
        Ok(Stmt::new(
            self.span_from(start),
            StmtKind::Global {
                name,
                name_span,
                value,
            },
        ))
    }

    fn parse_function(&mut self, start: Span, exported: bool) -> Parsed<Stmt> {
        self.expect_keyword(Keyword::Fn, "'fn'")?;
        let (name, name_span) = self.expect_ident("function name")?;
        self.expect_punct('(')?;
        let mut params = Vec::new();
        if !self.check_punct(')') {
            loop {
                let (param, span) = self.expect_ident("parameter name")?;
                let annotation = if self.consume_punct(':') {
                    Some(self.parse_type()?)
                } else {
                    None
                };
                params.push(Param {
                    name: param,
                    span,
                    annotation,
                });
                if !self.consume_punct(',') {
                    break;
                }
            }
        }
        self.expect_punct(')')?;
        let ret = if self.consume_punct(':') {
            Some(self.parse_type()?)
        } else {
            None
        };
        let body = self.parse_block()?;
        Ok(Stmt::new(
            self.span_from(start),
            StmtKind::Function(FunctionDecl {
                name,
                name_span,
                params,
                ret,
                body,
                exported,
            }),
        ))
    }

    fn parse_struct(&mut self, start: Span, exported: bool) -> Parsed<Stmt> {
        self.expect_keyword(Keyword::Struct, "'struct'")?;
        let (name, name_span) = self.expect_ident("struct name")?;
        self.expect_punct('{')?;
        let mut fields = Vec::new();
        while !self.check_punct('}') {
            let (field, span) = self.expect_ident("field name")?;
            self.expect_punct(':')?;
            let ty = self.parse_type()?;
            fields.push(StructField {
                name: field,
                span,
                ty,
            });
            if !self.consume_punct(',') {
                break;
            }
        }
        self.expect_punct('}')?;
        Ok(Stmt::new(
            self.span_from(start),
            StmtKind::Struct(StructDecl {
                name,
                name_span,
                fields,
                exported,
            }),
        ))
    }

    fn parse_enum(&mut self, start: Span, exported: bool) -> Parsed<Stmt> {
        self.expect_keyword(Keyword::Enum, "'enum'")?;
        let (name, name_span) = self.expect_ident("enum name")?;
        self.expect_punct('{')?;
        let mut items = Vec::new();
        while !self.check_punct('}') {
            let (item, span) = self.expect_ident("enum member")?;
            let value = if self.consume_op("=") {
                match self.peek().map(|token| token.kind.clone()) {
                    Some(TokenKind::Number(number)) if number.fract() == 0.0 => {
                        self.advance();
                        Some(number as i64)
                    }
                    _ => return Err(self.error_here("integer value for enum member")),
                }
            } else {
                None
            };
            items.push(EnumItem {
                name: item,
                span,
                value,
            });
            if !self.consume_punct(',') {
                break;
            }
        }
        self.expect_punct('}')?;
        Ok(Stmt::new(
            self.span_from(start),
            StmtKind::Enum(EnumDecl {
                name,
                name_span,
                items,
                exported,
            }),
        ))
    }

    fn parse_if(&mut self, start: Span) -> Parsed<Stmt> {
        self.expect_keyword(Keyword::If, "'if'")?;
        let mut arms = Vec::new();
        let condition = self.parse_expr()?;
        let body = self.parse_block()?;
        arms.push(IfArm { condition, body });

        let mut else_body = None;
        loop {
            if self.match_keyword(Keyword::Elseif) {
                let condition = self.parse_expr()?;
                let body = self.parse_block()?;
                arms.push(IfArm { condition, body });
            } else if self.match_keyword(Keyword::Else) {
                else_body = Some(self.parse_block()?);
                break;
            } else {
                break;
            }
        }
        Ok(Stmt::new(
            self.span_from(start),
            StmtKind::If(IfStmt { arms, else_body }),
        ))
    }

    fn parse_while(&mut self, start: Span) -> Parsed<Stmt> {
        self.expect_keyword(Keyword::While, "'while'")?;
        let condition = self.parse_expr()?;
        let body = self.parse_block()?;
        Ok(Stmt::new(
            self.span_from(start),
            StmtKind::While { condition, body },
        ))
    }

    fn parse_for(&mut self, start: Span) -> Parsed<Stmt> {
        self.expect_keyword(Keyword::For, "'for'")?;
        let (first, first_span) = self.expect_ident("loop variable")?;

        if self.consume_op("=") {
            let from = self.parse_expr()?;
            self.expect_punct(',')?;
            let to = self.parse_expr()?;
            let step = if self.consume_punct(',') {
                Some(self.parse_expr()?)
            } else {
                None
            };
            let body = self.parse_block()?;
            return Ok(Stmt::new(
                self.span_from(start),
                StmtKind::ForNum {
                    var: first,
                    var_span: first_span,
                    start: from,
                    end: to,
                    step,
                    body,
                },
            ));
        }

        let mut vars = vec![(first, first_span)];
        while self.consume_punct(',') {
            vars.push(self.expect_ident("loop variable")?);
        }
        self.expect_keyword(Keyword::In, "'in'")?;
        let iter = self.parse_expr()?;
        let body = self.parse_block()?;
        Ok(Stmt::new(
            self.span_from(start),
            StmtKind::ForIn { vars, iter, body },
        ))
    }

    fn parse_return(&mut self, start: Span) -> Parsed<Stmt> {
        self.expect_keyword(Keyword::Return, "'return'")?;
        let value = if self.is_at_end()
            || self.check_punct('}')
            || self.check_punct(';')
            || self.check_keyword(Keyword::Case)
        {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.consume_punct(';');
        Ok(Stmt::new(self.span_from(start), StmtKind::Return { value }))
    }

    fn parse_match(&mut self, start: Span) -> Parsed<Stmt> {
        self.expect_keyword(Keyword::Match, "'match'")?;
        let subject = self.parse_expr()?;
        self.expect_punct('{')?;
        let mut cases = Vec::new();
        while !self.check_punct('}') {
            let case_start = self.expect_keyword(Keyword::Case, "'case'")?;
            let pattern = self.parse_pattern()?;
            self.expect_op("=>")?;
            let body = if self.check_punct('{') {
                self.parse_block()?
            } else {
                let mut statements = Vec::new();
                while !self.check_punct('}') && !self.check_keyword(Keyword::Case) {
                    statements.push(self.parse_statement(false)?);
                }
                let span = match (statements.first(), statements.last()) {
                    (Some(first), Some(last)) => first.span.to(last.span),
                    _ => self.span_from(case_start),
                };
                Block { statements, span }
            };
            cases.push(MatchCase {
                pattern,
                body,
                span: self.span_from(case_start),
            });
        }
        self.expect_punct('}')?;
        Ok(Stmt::new(
            self.span_from(start),
            StmtKind::Match(MatchStmt { subject, cases }),
        ))
    }

    fn parse_pattern(&mut self) -> Parsed<Pattern> {
        let Some(token) = self.peek() else {
            return Err(self.error_here("pattern"));
        };
        let span = token.span;
        match &token.kind {
            TokenKind::Ident if token.lexeme == "_" => {
                self.advance();
                Ok(Pattern {
                    span,
                    kind: PatternKind::Wildcard,
                })
            }
            TokenKind::Number(_)
            | TokenKind::Str(_)
            | TokenKind::Keyword(Keyword::True | Keyword::False | Keyword::Nil) => {
                let literal = self.parse_primary()?;
                Ok(Pattern {
                    span: self.span_from(span),
                    kind: PatternKind::Literal(literal),
                })
            }
            _ => {
                let expr = self.parse_expr()?;
                Ok(Pattern {
                    span: self.span_from(span),
                    kind: PatternKind::Expr(expr),
                })
            }
        }
    }

    fn parse_assign_or_call(&mut self, start: Span) -> Parsed<Stmt> {
        let expr = self.parse_expr()?;
        if self.consume_op("=") {
            if !matches!(expr.kind, ExprKind::Ident(_) | ExprKind::Index { .. }) {
                return Err(ParseError::new(
                    "invalid assignment target",
                    Some(expr.span),
                ));
            }
            let value = self.parse_expr()?;
            self.consume_punct(';');
            return Ok(Stmt::new(
                self.span_from(start),
                StmtKind::Assign {
                    target: expr,
                    value,
                },
            ));
        }
        if !matches!(expr.kind, ExprKind::Call { .. }) {
            return Err(ParseError::new(
                "expected a statement; a bare expression must be a call",
                Some(expr.span),
            ));
        }
        self.consume_punct(';');
        Ok(Stmt::new(self.span_from(start), StmtKind::Expr(expr)))
    }

    fn parse_block(&mut self) -> Parsed<Block> {
        let start = self.expect_punct('{')?;
        let mut statements = Vec::new();
        while !self.check_punct('}') {
            if self.is_at_end() {
                return Err(self.error_here("'}'"));
            }
            statements.push(self.parse_statement(false)?);
        }
        self.expect_punct('}')?;
        Ok(Block {
            statements,
            span: self.span_from(start),
        })
    }

    // ---- types ----

    fn parse_type(&mut self) -> Parsed<TypeExpr> {
        let mut ty = self.parse_type_atom()?;
        while self.consume_op("|") {
            let right = self.parse_type_atom()?;
            let span = ty.span.to(right.span);
            ty = TypeExpr {
                span,
                kind: TypeExprKind::Union {
                    left: Box::new(ty),
                    right: Box::new(right),
                },
            };
        }
        Ok(ty)
    }

    fn parse_type_atom(&mut self) -> Parsed<TypeExpr> {
        let Some(token) = self.peek() else {
            return Err(self.error_here("type"));
        };
        let span = token.span;
        match &token.kind {
            TokenKind::Ident => {
                let name = token.lexeme.clone();
                self.advance();
                Ok(TypeExpr {
                    span,
                    kind: TypeExprKind::Name(name),
                })
            }
            TokenKind::Keyword(Keyword::Nil) => {
                self.advance();
                Ok(TypeExpr {
                    span,
                    kind: TypeExprKind::Name("nil".to_string()),
                })
            }
            TokenKind::Punct('{') => {
                self.advance();
                let mut fields = Vec::new();
                while !self.check_punct('}') {
                    let (name, _) = self.expect_ident("field name")?;
                    self.expect_punct(':')?;
                    let ty = self.parse_type()?;
                    fields.push((name, ty));
                    if !self.consume_punct(',') {
                        break;
                    }
                }
                self.expect_punct('}')?;
                Ok(TypeExpr {
                    span: self.span_from(span),
                    kind: TypeExprKind::Struct(fields),
                })
            }
            TokenKind::Keyword(Keyword::Fn) => {
                self.advance();
                self.expect_punct('(')?;
                let mut params = Vec::new();
                if !self.check_punct(')') {
                    loop {
                        params.push(self.parse_type()?);
                        if !self.consume_punct(',') {
                            break;
                        }
                    }
                }
                self.expect_punct(')')?;
                let ret = if self.consume_punct(':') {
                    Some(Box::new(self.parse_type()?))
                } else {
                    None
                };
                Ok(TypeExpr {
                    span: self.span_from(span),
                    kind: TypeExprKind::Func { params, ret },
                })
            }
            TokenKind::Punct('(') => {
                self.advance();
                let inner = self.parse_type()?;
                self.expect_punct(')')?;
                Ok(inner)
            }
            _ => Err(self.error_here("type")),
        }
    }

    // ---- expressions ----

    fn parse_expr(&mut self) -> Parsed<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Parsed<Expr> {
        let mut left = self.parse_and()?;
        while self.match_keyword(Keyword::Or) {
            let right = self.parse_and()?;
            left = binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Parsed<Expr> {
        let mut left = self.parse_comparison()?;
        while self.match_keyword(Keyword::And) {
            let right = self.parse_comparison()?;
            left = binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Parsed<Expr> {
        let mut left = self.parse_additive()?;
        loop {
            let op = if self.consume_op("==") {
                BinaryOp::Eq
            } else if self.consume_op("~=") {
                BinaryOp::Ne
            } else if self.consume_op("<=") {
                BinaryOp::Le
            } else if self.consume_op(">=") {
                BinaryOp::Ge
            } else if self.consume_op("<") {
                BinaryOp::Lt
            } else if self.consume_op(">") {
                BinaryOp::Gt
            } else {
                break;
            };
            let right = self.parse_additive()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Parsed<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = if self.consume_op("+") {
                BinaryOp::Add
            } else if self.consume_op("-") {
                BinaryOp::Sub
            } else {
                break;
            };
            let right = self.parse_multiplicative()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Parsed<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = if self.consume_op("*") {
                BinaryOp::Mul
            } else if self.consume_op("/") {
                BinaryOp::Div
            } else if self.consume_op("%") {
                BinaryOp::Mod
            } else {
                break;
            };
            let right = self.parse_unary()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Parsed<Expr> {
        let Some(token) = self.peek() else {
            return Err(self.error_here("expression"));
        };
        let start = token.span;
        let op = match &token.kind {
            TokenKind::Keyword(Keyword::Not) => Some(UnaryOp::Not),
            TokenKind::Op("-") => Some(UnaryOp::Neg),
            TokenKind::Op("#") => Some(UnaryOp::Len),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.parse_unary()?;
            let span = start.to(operand.span);
            return Ok(Expr::new(
                span,
                ExprKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
            ));
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> Parsed<Expr> {
        let base = self.parse_postfix()?;
        if self.consume_op("^") {
            // Right-associative; the exponent may itself be unary.
            let exponent = self.parse_unary()?;
            return Ok(binary(BinaryOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn parse_postfix(&mut self) -> Parsed<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.check_punct('(') {
                self.advance();
                let mut args = Vec::new();
                if !self.check_punct(')') {
                    loop {
                        args.push(self.parse_expr()?);
                        if !self.consume_punct(',') {
                            break;
                        }
                    }
                }
                self.expect_punct(')')?;
                let span = self.span_from(expr.span);
                expr = Expr::new(
                    span,
                    ExprKind::Call {
                        callee: Box::new(expr),
                        args,
                    },
                );
            } else if self.check_punct('.')
                && self
                    .peek_n(1)
                    .is_some_and(|token| token.kind == TokenKind::Ident)
            {
                self.advance();
                let (name, key_span) = self.expect_ident("field name")?;
                let span = self.span_from(expr.span);
                expr = Expr::new(
                    span,
                    ExprKind::Index {
                        base: Box::new(expr),
                        key: Box::new(Expr::new(key_span, ExprKind::Str(name))),
                        dot: true,
                    },
                );
            } else if self.check_punct('[') {
                self.advance();
                let key = self.parse_expr()?;
                self.expect_punct(']')?;
                let span = self.span_from(expr.span);
                expr = Expr::new(
                    span,
                    ExprKind::Index {
                        base: Box::new(expr),
                        key: Box::new(key),
                        dot: false,
                    },
                );
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Parsed<Expr> {
        let Some(token) = self.peek() else {
            return Err(self.error_here("expression"));
        };
        let span = token.span;
        let kind = match &token.kind {
            TokenKind::Number(value) => ExprKind::Number(*value),
            TokenKind::Str(value) => ExprKind::Str(value.clone()),
            TokenKind::Keyword(Keyword::True) => ExprKind::Boolean(true),
            TokenKind::Keyword(Keyword::False) => ExprKind::Boolean(false),
            TokenKind::Keyword(Keyword::Nil) => ExprKind::Nil,
            TokenKind::Ident => ExprKind::Ident(token.lexeme.clone()),
            TokenKind::Punct('(') => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect_punct(')')?;
                return Ok(inner);
            }
            TokenKind::Punct('{') => return self.parse_table(),
            _ => return Err(self.error_here("expression")),
        };
        self.advance();
        Ok(Expr::new(span, kind))
    }

    fn parse_table(&mut self) -> Parsed<Expr> {
        let start = self.expect_punct('{')?;
        let mut fields = Vec::new();
        while !self.check_punct('}') {
            if self.check_punct('[') {
                self.advance();
                let key = self.parse_expr()?;
                self.expect_punct(']')?;
                self.expect_op("=")?;
                let value = self.parse_expr()?;
                fields.push(TableField::Field {
                    key_is_ident: false,
                    key,
                    value,
                });
            } else if self
                .peek()
                .is_some_and(|token| token.kind == TokenKind::Ident)
                && self
                    .peek_n(1)
                    .is_some_and(|token| matches!(token.kind, TokenKind::Op("=")))
            {
                let (name, key_span) = self.expect_ident("field name")?;
                self.expect_op("=")?;
                let value = self.parse_expr()?;
                fields.push(TableField::Field {
                    key_is_ident: true,
                    key: Expr::new(key_span, ExprKind::Str(name)),
                    value,
                });
            } else {
                let value = self.parse_expr()?;
                fields.push(TableField::Array { value });
            }
            if !self.consume_punct(',') && !self.consume_punct(';') {
                break;
            }
        }
        self.expect_punct('}')?;
        Ok(Expr::new(self.span_from(start), ExprKind::Table { fields }))
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    let span = left.span.to(right.span);
    Expr::new(
        span,
        ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::FileId;
    use crate::frontend::lexer::tokenize;

    fn parse_source(source: &str) -> Program {
        let (tokens, sink) = tokenize(source, FileId(0));
        assert!(sink.is_empty(), "lex errors: {:?}", sink.as_slice());
        parse(&tokens, FileId(0)).expect("source should parse")
    }

    fn parse_err(source: &str) -> ParseError {
        let (tokens, _) = tokenize(source, FileId(0));
        parse(&tokens, FileId(0)).expect_err("source should not parse")
    }

    #[test]
    fn parses_module_header_and_imports() {
        let program = parse_source(
            "module game.entities\nimport util\nimport game.math as m\nimport game.colors.{red, blue}\nlet x = 1",
        );
        let module = program.module.expect("module header");
        assert_eq!(module.name, "game.entities");
        assert_eq!(program.imports.len(), 3);
        assert_eq!(program.imports[0].binding(), Some("util"));
        assert_eq!(program.imports[1].binding(), Some("m"));
        let names = program.imports[2].names.as_ref().expect("named import");
        let listed: Vec<_> = names.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(listed, ["red", "blue"]);
    }

    #[test]
    fn parses_let_with_union_annotation() {
        let program = parse_source("let t: {x: number} | nil = nil");
        let StmtKind::Let(let_stmt) = &program.body.statements[0].kind else {
            panic!("expected let statement");
        };
        let annotation = let_stmt.annotation.as_ref().expect("annotation");
        assert!(annotation.union_contains_nil());
        assert!(matches!(
            let_stmt.value.as_ref().map(|value| &value.kind),
            Some(ExprKind::Nil)
        ));
    }

    #[test]
    fn parses_function_with_typed_params() {
        let program = parse_source("fn add(a: number, b: number): number { return a + b }");
        let StmtKind::Function(func) = &program.body.statements[0].kind else {
            panic!("expected function");
        };
        assert_eq!(func.name, "add");
        assert_eq!(func.params.len(), 2);
        assert!(func.ret.is_some());
        assert!(matches!(
            func.body.statements[0].kind,
            StmtKind::Return { .. }
        ));
    }

    #[test]
    fn precedence_follows_lua() {
        let program = parse_source("let x = 1 + 2 * 3");
        let StmtKind::Let(let_stmt) = &program.body.statements[0].kind else {
            panic!("expected let");
        };
        let ExprKind::Binary { op, right, .. } =
            &let_stmt.value.as_ref().expect("initializer").kind
        else {
            panic!("expected binary");
        };
        assert_eq!(*op, BinaryOp::Add);
        assert!(matches!(
            right.kind,
            ExprKind::Binary {
                op: BinaryOp::Mul,
                ..
            }
        ));
    }

    #[test]
    fn dotted_index_becomes_string_key() {
        let program = parse_source("let x = point.y");
        let StmtKind::Let(let_stmt) = &program.body.statements[0].kind else {
            panic!("expected let");
        };
        let ExprKind::Index { key, dot, .. } = &let_stmt.value.as_ref().expect("value").kind
        else {
            panic!("expected index");
        };
        assert!(dot);
        assert!(matches!(&key.kind, ExprKind::Str(name) if name == "y"));
    }

    #[test]
    fn parses_match_with_inline_and_block_cases() {
        let program = parse_source(
            "match x { case 1 => return 1 case 2 => { return 2 } case _ => return 3 }",
        );
        let StmtKind::Match(match_stmt) = &program.body.statements[0].kind else {
            panic!("expected match");
        };
        assert_eq!(match_stmt.cases.len(), 3);
        assert!(matches!(
            match_stmt.cases[2].pattern.kind,
            PatternKind::Wildcard
        ));
    }

    #[test]
    fn parses_numeric_and_generic_for() {
        let program = parse_source(
            "fn f(n: number) { for i = 1, n { print(i) } for k, v in pairs({}) { print(k, v) } }",
        );
        let StmtKind::Function(func) = &program.body.statements[0].kind else {
            panic!("expected function");
        };
        assert!(matches!(func.body.statements[0].kind, StmtKind::ForNum { .. }));
        let StmtKind::ForIn { vars, .. } = &func.body.statements[1].kind else {
            panic!("expected generic for");
        };
        assert_eq!(vars.len(), 2);
    }

    #[test]
    fn parses_enum_with_explicit_values() {
        let program = parse_source("enum Color { Red = 5, Green, Blue }");
        let StmtKind::Enum(decl) = &program.body.statements[0].kind else {
            panic!("expected enum");
        };
        assert_eq!(decl.items[0].value, Some(5));
        assert_eq!(decl.items[1].value, None);
    }

    #[test]
    fn rejects_bare_expression_statement() {
        let error = parse_err("fn f() { 1 + 2 }");
        assert!(error.message.contains("bare expression"));
    }

    #[test]
    fn rejects_invalid_assignment_target() {
        let error = parse_err("fn f() { f() = 2 }");
        assert!(error.message.contains("invalid assignment target"));
    }

    #[test]
    fn rejects_export_inside_function() {
        let error = parse_err("fn f() { export let x = 1 }");
        assert!(error.message.contains("top level"));
    }

    #[test]
    fn table_literals_distinguish_field_kinds() {
        let program = parse_source("let t = { x = 1, [key] = 2, 3 }");
        let StmtKind::Let(let_stmt) = &program.body.statements[0].kind else {
            panic!("expected let");
        };
        let ExprKind::Table { fields } = &let_stmt.value.as_ref().expect("value").kind else {
            panic!("expected table");
        };
        assert!(matches!(
            fields[0],
            TableField::Field {
                key_is_ident: true,
                ..
            }
        ));
        assert!(matches!(
            fields[1],
            TableField::Field {
                key_is_ident: false,
                ..
            }
        ));
        assert!(matches!(fields[2], TableField::Array { .. }));
    }
}
