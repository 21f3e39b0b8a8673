//! Shared diagnostics model and formatting utilities for the compiler
//! pipeline and CLI.

mod files;
mod formatter;

use blake3::Hasher;
pub use files::{FileCache, FileId};
pub use formatter::{format_diagnostics, ErrorFormat, JSON_SCHEMA_VERSION};
use serde::Serialize;
use std::fmt;

/// Span into a source file (1-based line/column coordinates).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Span {
    pub file: FileId,
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
}

impl Span {
    #[must_use]
    pub fn new(file: FileId, start_line: u32, start_col: u32, end_line: u32, end_col: u32) -> Self {
        Self {
            file,
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }

    /// Single-position span.
    #[must_use]
    pub fn point(file: FileId, line: u32, col: u32) -> Self {
        Self::new(file, line, col, line, col)
    }

    /// Smallest span covering both `self` and `other`.
    #[must_use]
    pub fn to(self, other: Span) -> Span {
        Span {
            file: self.file,
            start_line: self.start_line,
            start_col: self.start_col,
            end_line: other.end_line,
            end_col: other.end_col,
        }
    }

    #[must_use]
    pub fn is_point(self) -> bool {
        self.start_line == self.end_line && self.start_col == self.end_col
    }
}

/// Severity level of a diagnostic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl Severity {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Note => "note",
        }
    }

    #[must_use]
    pub fn is_error(self) -> bool {
        matches!(self, Severity::Error)
    }
}

/// Structured identifier for diagnostics, derived from the phase namespace.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DiagnosticCode {
    pub code: String,
    pub category: String,
}

/// A single reported problem with optional location and follow-up hints.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub severity: Severity,
    pub span: Option<Span>,
    pub message: String,
    pub hints: Vec<String>,
    pub code: Option<DiagnosticCode>,
}

impl Diagnostic {
    #[must_use]
    pub fn error(message: impl Into<String>, span: Option<Span>) -> Self {
        Self::new(Severity::Error, message, span)
    }

    #[must_use]
    pub fn warning(message: impl Into<String>, span: Option<Span>) -> Self {
        Self::new(Severity::Warning, message, span)
    }

    #[must_use]
    pub fn note(message: impl Into<String>, span: Option<Span>) -> Self {
        Self::new(Severity::Note, message, span)
    }

    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hints.push(hint.into());
        self
    }

    fn new(severity: Severity, message: impl Into<String>, span: Option<Span>) -> Self {
        Self {
            severity,
            span,
            message: message.into(),
            hints: Vec::new(),
            code: None,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity.as_str(), self.message)
    }
}

/// Collection helper used to accumulate diagnostics during a compile.
///
/// Each pipeline phase owns a sink with its own namespace; the driver merges
/// them in phase order. The sink is the only grow-only mutable state during
/// a compile.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    diagnostics: Vec<Diagnostic>,
    namespace: String,
}

impl DiagnosticSink {
    #[must_use]
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            diagnostics: Vec::new(),
            namespace: namespace.into(),
        }
    }

    pub fn push(&mut self, mut diagnostic: Diagnostic) {
        if diagnostic.code.is_none() {
            diagnostic.code = Some(self.auto_code(&diagnostic));
        }
        self.diagnostics.push(diagnostic);
    }

    pub fn error(&mut self, span: Option<Span>, message: impl Into<String>) {
        self.push(Diagnostic::error(message, span));
    }

    pub fn warn(&mut self, span: Option<Span>, message: impl Into<String>) {
        self.push(Diagnostic::warning(message, span));
    }

    pub fn note(&mut self, span: Option<Span>, message: impl Into<String>) {
        self.push(Diagnostic::note(message, span));
    }

    /// Append all diagnostics from another sink, preserving their codes.
    pub fn merge(&mut self, other: DiagnosticSink) {
        self.diagnostics.extend(other.diagnostics);
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|diagnostic| diagnostic.severity.is_error())
    }

    #[must_use]
    pub fn count_errors(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|diagnostic| diagnostic.severity.is_error())
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    /// Stable code derived from the namespace and message text. Position is
    /// deliberately excluded so the same problem keeps the same code when
    /// surrounding code moves.
    fn auto_code(&self, diagnostic: &Diagnostic) -> DiagnosticCode {
        let mut hasher = Hasher::new();
        hasher.update(self.namespace.as_bytes());
        hasher.update(diagnostic.message.as_bytes());
        let hash = hasher.finalize();
        let raw = u32::from_le_bytes(
            hash.as_bytes()[..4]
                .try_into()
                .unwrap_or([0, 0, 0, 0]),
        );
        let suffix = raw % 100_000;
        DiagnosticCode {
            code: format!("{}{suffix:05}", self.namespace.to_ascii_uppercase()),
            category: self.namespace.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_tracks_error_counts() {
        let mut sink = DiagnosticSink::new("sem");
        sink.warn(None, "shadowed");
        assert!(!sink.has_errors());

        sink.error(None, "undefined variable 'x'");
        sink.error(None, "undefined variable 'y'");
        assert!(sink.has_errors());
        assert_eq!(sink.count_errors(), 2);
    }

    #[test]
    fn auto_codes_are_stable_per_message() {
        let mut first = DiagnosticSink::new("sem");
        first.error(None, "Undefined variable 'x'");
        let mut second = DiagnosticSink::new("sem");
        second.error(None, "Undefined variable 'x'");

        let lhs = first.as_slice()[0].code.clone().expect("code assigned");
        let rhs = second.as_slice()[0].code.clone().expect("code assigned");
        assert_eq!(lhs, rhs);
        assert!(lhs.code.starts_with("SEM"));
    }

    #[test]
    fn merge_preserves_order() {
        let mut lex = DiagnosticSink::new("lex");
        lex.error(None, "stray byte");
        let mut all = DiagnosticSink::new("driver");
        all.warn(None, "first");
        all.merge(lex);
        let messages: Vec<_> = all
            .as_slice()
            .iter()
            .map(|diagnostic| diagnostic.message.as_str())
            .collect();
        assert_eq!(messages, ["first", "stray byte"]);
    }

    #[test]
    fn span_merge_covers_both_endpoints() {
        let file = FileId(0);
        let head = Span::new(file, 1, 5, 1, 9);
        let tail = Span::new(file, 3, 1, 3, 4);
        let merged = head.to(tail);
        assert_eq!((merged.start_line, merged.start_col), (1, 5));
        assert_eq!((merged.end_line, merged.end_col), (3, 4));
    }
}
