//! Public entry points and phase orchestration.
//!
//! `compile` runs the single-unit pipeline (lex, parse, analyze, check,
//! optimize, emit); `compile_modules` hands a source map to the linker.
//! Phase gating: lexical or parse errors stop a unit before semantic
//! analysis, any error stops optimization and emission, and the only
//! failure that propagates out of a phase is the parser's `ParseError`,
//! converted to a diagnostic here at the boundary.

use std::collections::BTreeMap;

use crate::analysis;
use crate::diagnostics::{
    format_diagnostics, Diagnostic, DiagnosticSink, ErrorFormat, FileCache, Severity,
};
use crate::emit;
use crate::frontend::{lexer, parser};
use crate::link;
use crate::optimize::{self, PassToggles};
use crate::target::Target;
use crate::typeck;

/// Options accepted by both entry points.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    pub target: Target,
    /// Name used for spans in single-unit mode.
    pub filename: String,
    pub passes: PassToggles,
}

impl CompileOptions {
    #[must_use]
    pub fn with_filename(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            ..Self::default()
        }
    }
}

/// Diagnostics of one compile, bundled with the file names its spans
/// reference so callers can render them.
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
    files: FileCache,
}

impl Diagnostics {
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|entry| entry.severity.is_error())
    }

    #[must_use]
    pub fn count_errors(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.severity.is_error())
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    /// Render with the stable formatting rules.
    #[must_use]
    pub fn render(&self, format: ErrorFormat) -> String {
        format_diagnostics(&self.entries, &self.files, format)
    }

    /// Reclassify every warning as an error (`--warnings-as-errors`).
    pub fn warnings_as_errors(&mut self) {
        for entry in &mut self.entries {
            if entry.severity == Severity::Warning {
                entry.severity = Severity::Error;
            }
        }
    }

    /// Keep only the first `max` errors; warnings and notes pass through.
    pub fn truncate_errors(&mut self, max: usize) {
        let mut seen = 0usize;
        self.entries.retain(|entry| {
            if entry.severity.is_error() {
                seen += 1;
                seen <= max
            } else {
                true
            }
        });
    }
}

/// Compile one unit to target source. Errors yield `(None, diagnostics)`.
pub fn compile(source: &str, options: &CompileOptions) -> (Option<String>, Diagnostics) {
    let mut files = FileCache::new();
    let filename = if options.filename.is_empty() {
        "input".to_string()
    } else {
        options.filename.clone()
    };
    let file = files.intern(filename);
    let mut sink = DiagnosticSink::new("driver");

    let (tokens, lex_sink) = lexer::tokenize(source, file);
    let lex_failed = lex_sink.has_errors();
    sink.merge(lex_sink);
    if lex_failed {
        return (None, bundle(sink, files));
    }

    let mut program = match parser::parse(&tokens, file) {
        Ok(program) => program,
        Err(error) => {
            sink.push(Diagnostic::error(error.message, error.span));
            return (None, bundle(sink, files));
        }
    };
    tracing::debug!(statements = program.body.statements.len(), "parsed unit");

    sink.merge(analysis::analyze(&program, None));
    sink.merge(typeck::check(&program, None));
    if sink.has_errors() {
        return (None, bundle(sink, files));
    }

    optimize::optimize(&mut program, &options.passes);
    let output = emit::emit(&program, options.target);
    tracing::debug!(bytes = output.len(), "emitted unit");
    (Some(output), bundle(sink, files))
}

/// Compile a set of modules keyed by module name. See the linker for the
/// multi-unit pipeline.
pub fn compile_modules(
    sources: &BTreeMap<String, String>,
    options: &CompileOptions,
) -> (Option<BTreeMap<String, String>>, Diagnostics) {
    let (outputs, entries, files) = link::link(sources, options);
    (outputs, Diagnostics { entries, files })
}

fn bundle(sink: DiagnosticSink, files: FileCache) -> Diagnostics {
    Diagnostics {
        entries: sink.into_vec(),
        files,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile_ok(source: &str) -> String {
        let (output, diagnostics) = compile(source, &CompileOptions::default());
        assert!(
            !diagnostics.has_errors(),
            "diagnostics: {}",
            diagnostics.render(ErrorFormat::Human)
        );
        output.expect("clean compile emits")
    }

    #[test]
    fn clean_unit_compiles_to_lua() {
        let output = compile_ok("fn f(): number { return 1 }");
        assert!(output.contains("local function f()"));
    }

    #[test]
    fn errors_suppress_output() {
        let (output, diagnostics) =
            compile("fn f() { let x; let y = x print(y) }", &CompileOptions::default());
        assert!(output.is_none());
        assert!(diagnostics.has_errors());
        assert!(diagnostics
            .render(ErrorFormat::Human)
            .contains("Use of 'x' before assignment"));
    }

    #[test]
    fn parse_errors_become_a_single_diagnostic() {
        let (output, diagnostics) = compile("fn f( {", &CompileOptions::default());
        assert!(output.is_none());
        assert_eq!(diagnostics.count_errors(), 1);
    }

    #[test]
    fn warnings_do_not_block_emission() {
        let (output, diagnostics) =
            compile("fn f() { let unused = 1 }", &CompileOptions::default());
        assert!(output.is_some());
        assert!(!diagnostics.has_errors());
        assert!(!diagnostics.is_empty());
    }

    #[test]
    fn warnings_as_errors_reclassifies() {
        let (_, mut diagnostics) =
            compile("fn f() { let unused = 1 }", &CompileOptions::default());
        assert!(!diagnostics.has_errors());
        diagnostics.warnings_as_errors();
        assert!(diagnostics.has_errors());
    }

    #[test]
    fn truncate_errors_keeps_warnings() {
        let (_, mut diagnostics) = compile(
            "fn f() { let unused = 1 print(a) print(b) print(c) }",
            &CompileOptions::default(),
        );
        assert!(diagnostics.count_errors() >= 3);
        diagnostics.truncate_errors(2);
        assert_eq!(diagnostics.count_errors(), 2);
        assert!(diagnostics
            .entries()
            .iter()
            .any(|entry| entry.severity == Severity::Warning));
    }

    #[test]
    fn compile_is_deterministic() {
        let source = "fn f(n: number): number { let a = 2 let b = 3 for i = 1, n { let x = a * b print(x) } return a }";
        let (first_out, first_diags) = compile(source, &CompileOptions::default());
        let (second_out, second_diags) = compile(source, &CompileOptions::default());
        assert_eq!(first_out, second_out);
        assert_eq!(
            first_diags.render(ErrorFormat::Human),
            second_diags.render(ErrorFormat::Human)
        );
    }

    #[test]
    fn pass_toggles_disable_individual_rewrites() {
        let source = "fn f(): number { let x = 1 let y = x return y }";
        let mut options = CompileOptions::default();
        options.passes.redundant_temps = false;
        let (output, _) = compile(source, &options);
        assert!(output.expect("emits").contains("local x = 1"));

        let (output, _) = compile(source, &CompileOptions::default());
        assert!(output.expect("emits").contains("return 1"));
    }
}
