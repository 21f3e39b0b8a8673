//! Byte stream to token stream with source spans.
//!
//! The lexer recovers from bad input (stray bytes, unterminated strings)
//! by reporting a diagnostic and continuing, so the parser always sees a
//! best-effort token stream.

use crate::diagnostics::{DiagnosticSink, FileId, Span};

pub use keyword::Keyword;

mod keyword {
    /// Reserved words recognised by the lexer.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Keyword {
        Module,
        Import,
        As,
        Export,
        Let,
        Global,
        Fn,
        Struct,
        Enum,
        If,
        Elseif,
        Else,
        While,
        For,
        In,
        Return,
        Match,
        Case,
        And,
        Or,
        Not,
        True,
        False,
        Nil,
    }

    impl Keyword {
        #[must_use]
        pub fn from_ident(ident: &str) -> Option<Self> {
            KEYWORDS
                .iter()
                .find_map(|(name, keyword)| (*name == ident).then_some(*keyword))
        }
    }

    const KEYWORDS: &[(&str, Keyword)] = &[
        ("module", Keyword::Module),
        ("import", Keyword::Import),
        ("as", Keyword::As),
        ("export", Keyword::Export),
        ("let", Keyword::Let),
        ("global", Keyword::Global),
        ("fn", Keyword::Fn),
        ("struct", Keyword::Struct),
        ("enum", Keyword::Enum),
        ("if", Keyword::If),
        ("elseif", Keyword::Elseif),
        ("else", Keyword::Else),
        ("while", Keyword::While),
        ("for", Keyword::For),
        ("in", Keyword::In),
        ("return", Keyword::Return),
        ("match", Keyword::Match),
        ("case", Keyword::Case),
        ("and", Keyword::And),
        ("or", Keyword::Or),
        ("not", Keyword::Not),
        ("true", Keyword::True),
        ("false", Keyword::False),
        ("nil", Keyword::Nil),
    ];
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident,
    Number(f64),
    Str(String),
    Keyword(Keyword),
    Op(&'static str),
    Punct(char),
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub span: Span,
}

/// Tokenize a single unit. Lexical problems land in the returned sink; the
/// token stream covers everything that could be recognised.
pub fn tokenize(source: &str, file: FileId) -> (Vec<Token>, DiagnosticSink) {
    let mut lexer = Lexer::new(source, file);
    lexer.run();
    (lexer.tokens, lexer.sink)
}

struct Lexer {
    chars: Vec<char>,
    index: usize,
    line: u32,
    col: u32,
    file: FileId,
    tokens: Vec<Token>,
    sink: DiagnosticSink,
}

impl Lexer {
    fn new(source: &str, file: FileId) -> Self {
        Self {
            chars: source.chars().collect(),
            index: 0,
            line: 1,
            col: 1,
            file,
            tokens: Vec::new(),
            sink: DiagnosticSink::new("lex"),
        }
    }

    fn run(&mut self) {
        while let Some(ch) = self.peek() {
            match ch {
                ' ' | '\t' | '\r' | '\n' => {
                    self.bump();
                }
                '-' if self.peek_at(1) == Some('-') => self.skip_comment(),
                'a'..='z' | 'A'..='Z' | '_' => self.lex_ident(),
                '0'..='9' => self.lex_number(),
                '"' | '\'' => self.lex_string(ch),
                _ => self.lex_operator(ch),
            }
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.index).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.index + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.index += 1;
        if ch == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    fn position(&self) -> (u32, u32) {
        (self.line, self.col)
    }

    fn span_from(&self, start: (u32, u32)) -> Span {
        Span::new(self.file, start.0, start.1, self.line, self.col)
    }

    fn push(&mut self, kind: TokenKind, lexeme: String, start: (u32, u32)) {
        let span = self.span_from(start);
        self.tokens.push(Token { kind, lexeme, span });
    }

    fn skip_comment(&mut self) {
        while let Some(ch) = self.peek() {
            if ch == '\n' {
                break;
            }
            self.bump();
        }
    }

    fn lex_ident(&mut self) {
        let start = self.position();
        let mut lexeme = String::new();
        while let Some(ch) = self.peek() {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                lexeme.push(ch);
                self.bump();
            } else {
                break;
            }
        }
        let kind = match Keyword::from_ident(&lexeme) {
            Some(keyword) => TokenKind::Keyword(keyword),
            None => TokenKind::Ident,
        };
        self.push(kind, lexeme, start);
    }

    fn lex_number(&mut self) {
        let start = self.position();
        let mut lexeme = String::new();

        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x' | 'X')) {
            lexeme.push(self.bump().unwrap_or('0'));
            lexeme.push(self.bump().unwrap_or('x'));
            while let Some(ch) = self.peek() {
                if ch.is_ascii_hexdigit() {
                    lexeme.push(ch);
                    self.bump();
                } else {
                    break;
                }
            }
            let value = i64::from_str_radix(&lexeme[2..], 16).ok();
            match value {
                Some(value) => self.push(TokenKind::Number(value as f64), lexeme, start),
                None => {
                    let span = self.span_from(start);
                    self.sink
                        .error(Some(span), format!("Malformed number literal '{lexeme}'"));
                }
            }
            return;
        }

        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                lexeme.push(ch);
                self.bump();
            } else {
                break;
            }
        }
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|ch| ch.is_ascii_digit()) {
            lexeme.push(self.bump().unwrap_or('.'));
            while let Some(ch) = self.peek() {
                if ch.is_ascii_digit() {
                    lexeme.push(ch);
                    self.bump();
                } else {
                    break;
                }
            }
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let mut exponent = String::from(self.bump().unwrap_or('e'));
            if matches!(self.peek(), Some('+' | '-')) {
                exponent.push(self.bump().unwrap_or('+'));
            }
            let mut digits = false;
            while let Some(ch) = self.peek() {
                if ch.is_ascii_digit() {
                    exponent.push(ch);
                    self.bump();
                    digits = true;
                } else {
                    break;
                }
            }
            if digits {
                lexeme.push_str(&exponent);
            } else {
                let span = self.span_from(start);
                self.sink
                    .error(Some(span), "Malformed exponent in number literal");
            }
        }

        match lexeme.parse::<f64>() {
            Ok(value) => self.push(TokenKind::Number(value), lexeme, start),
            Err(_) => {
                let span = self.span_from(start);
                self.sink
                    .error(Some(span), format!("Malformed number literal '{lexeme}'"));
            }
        }
    }

    fn lex_string(&mut self, quote: char) {
        let start = self.position();
        self.bump();
        let mut value = String::new();
        let mut lexeme = String::from(quote);
        loop {
            match self.peek() {
                None | Some('\n') => {
                    let span = self.span_from(start);
                    self.sink.error(Some(span), "Unterminated string literal");
                    return;
                }
                Some(ch) if ch == quote => {
                    lexeme.push(ch);
                    self.bump();
                    break;
                }
                Some('\\') => {
                    lexeme.push('\\');
                    self.bump();
                    let Some(escape) = self.bump() else {
                        let span = self.span_from(start);
                        self.sink.error(Some(span), "Unterminated string literal");
                        return;
                    };
                    lexeme.push(escape);
                    match escape {
                        'n' => value.push('\n'),
                        't' => value.push('\t'),
                        'r' => value.push('\r'),
                        '0' => value.push('\0'),
                        '\\' | '"' | '\'' => value.push(escape),
                        other => {
                            let span = self.span_from(start);
                            self.sink.error(
                                Some(span),
                                format!("Unknown string escape '\\{other}'"),
                            );
                        }
                    }
                }
                Some(ch) => {
                    value.push(ch);
                    lexeme.push(ch);
                    self.bump();
                }
            }
        }
        self.push(TokenKind::Str(value), lexeme, start);
    }

    fn lex_operator(&mut self, first: char) {
        let start = self.position();

        const TWO_CHAR: &[(&str, &str)] = &[
            ("==", "=="),
            ("~=", "~="),
            ("<=", "<="),
            (">=", ">="),
            ("=>", "=>"),
        ];
        if let Some(second) = self.peek_at(1) {
            let pair: String = [first, second].iter().collect();
            if let Some((_, op)) = TWO_CHAR.iter().find(|(text, _)| *text == pair) {
                self.bump();
                self.bump();
                self.push(TokenKind::Op(op), pair, start);
                return;
            }
        }

        let single: Option<&'static str> = match first {
            '+' => Some("+"),
            '-' => Some("-"),
            '*' => Some("*"),
            '/' => Some("/"),
            '%' => Some("%"),
            '^' => Some("^"),
            '#' => Some("#"),
            '<' => Some("<"),
            '>' => Some(">"),
            '=' => Some("="),
            '|' => Some("|"),
            _ => None,
        };
        if let Some(op) = single {
            self.bump();
            self.push(TokenKind::Op(op), first.to_string(), start);
            return;
        }

        if matches!(
            first,
            '(' | ')' | '{' | '}' | '[' | ']' | ',' | ':' | ';' | '.'
        ) {
            self.bump();
            self.push(TokenKind::Punct(first), first.to_string(), start);
            return;
        }

        self.bump();
        let span = self.span_from(start);
        self.sink
            .error(Some(span), format!("Unexpected character '{first}'"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::FileId;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let (tokens, sink) = tokenize(source, FileId(0));
        assert!(sink.is_empty(), "unexpected diagnostics: {:?}", sink.as_slice());
        tokens.into_iter().map(|token| token.kind).collect()
    }

    #[test]
    fn lexes_keywords_and_identifiers() {
        let kinds = kinds("let answer = 42");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Keyword(Keyword::Let),
                TokenKind::Ident,
                TokenKind::Op("="),
                TokenKind::Number(42.0),
            ]
        );
    }

    #[test]
    fn lexes_numbers_in_all_forms() {
        let kinds = kinds("1 2.5 0xff 1e3 2.5e-1");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Number(1.0),
                TokenKind::Number(2.5),
                TokenKind::Number(255.0),
                TokenKind::Number(1000.0),
                TokenKind::Number(0.25),
            ]
        );
    }

    #[test]
    fn lexes_strings_with_escapes() {
        let kinds = kinds(r#""a\nb" 'c'"#);
        assert_eq!(
            kinds,
            vec![
                TokenKind::Str("a\nb".to_string()),
                TokenKind::Str("c".to_string()),
            ]
        );
    }

    #[test]
    fn comments_run_to_end_of_line() {
        let kinds = kinds("1 -- the answer\n2");
        assert_eq!(kinds, vec![TokenKind::Number(1.0), TokenKind::Number(2.0)]);
    }

    #[test]
    fn two_char_operators_win_over_single() {
        let kinds = kinds("== ~= <= >= => = < >");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Op("=="),
                TokenKind::Op("~="),
                TokenKind::Op("<="),
                TokenKind::Op(">="),
                TokenKind::Op("=>"),
                TokenKind::Op("="),
                TokenKind::Op("<"),
                TokenKind::Op(">"),
            ]
        );
    }

    #[test]
    fn unterminated_string_reports_and_recovers() {
        let (tokens, sink) = tokenize("let x = \"oops\nlet y = 1", FileId(0));
        assert!(sink.has_errors());
        assert!(
            tokens
                .iter()
                .any(|token| token.kind == TokenKind::Keyword(Keyword::Let) && token.span.start_line == 2),
            "lexing continues on the next line"
        );
    }

    #[test]
    fn stray_bytes_are_reported_with_spans() {
        let (_, sink) = tokenize("let @ = 1", FileId(0));
        assert!(sink.has_errors());
        let diagnostic = &sink.as_slice()[0];
        assert!(diagnostic.message.contains("Unexpected character '@'"));
        let span = diagnostic.span.expect("lexer errors carry spans");
        assert_eq!((span.start_line, span.start_col), (1, 5));
    }

    #[test]
    fn spans_track_lines_and_columns() {
        let (tokens, _) = tokenize("let x\nreturn x", FileId(0));
        let ret = tokens
            .iter()
            .find(|token| token.kind == TokenKind::Keyword(Keyword::Return))
            .expect("return token present");
        assert_eq!((ret.span.start_line, ret.span.start_col), (2, 1));
        assert_eq!((ret.span.end_line, ret.span.end_col), (2, 7));
    }
}
