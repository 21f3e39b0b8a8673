//! Multi-unit compilation: export resolution, import validation, cycle
//! detection, and per-module environments.
//!
//! Input is a `module name -> source text` map. Units are parsed first
//! (a parse failure in one unit does not stop the others), then headers,
//! export tables, and the import graph are validated; circular imports are
//! rejected with a three-colour DFS that reports the cycle path. Only when
//! the structural phase is clean do the analyzer and checker run per unit,
//! and only a fully clean compile emits. All map iteration is sorted by
//! module name so diagnostics and traversal order are deterministic.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::analysis;
use crate::diagnostics::{Diagnostic, DiagnosticSink, FileCache, FileId, Span};
use crate::driver::CompileOptions;
use crate::emit;
use crate::frontend::ast::{Program, StmtKind};
use crate::frontend::{lexer, parser};
use crate::optimize;
use crate::typeck::{self, Type};

/// Everything one unit's analyzer and checker need to know about the rest
/// of the build.
#[derive(Debug, Clone)]
pub struct ModuleEnv {
    /// The unit's own module name.
    pub name: String,
    /// Local binding -> imported module name, for bare and aliased imports.
    pub aliases: BTreeMap<String, String>,
    /// Module name -> exported names, across the whole build.
    pub exports: BTreeMap<String, BTreeSet<String>>,
    /// Module name -> export signatures, across the whole build.
    pub export_types: BTreeMap<String, BTreeMap<String, Type>>,
    /// Named-import binding -> its export signature.
    pub imported_types: BTreeMap<String, Type>,
}

impl ModuleEnv {
    #[must_use]
    pub fn alias_target(&self, binding: &str) -> Option<&str> {
        self.aliases.get(binding).map(String::as_str)
    }

    #[must_use]
    pub fn module_has_export(&self, module: &str, symbol: &str) -> bool {
        self.exports
            .get(module)
            .is_some_and(|names| names.contains(symbol))
    }

    #[must_use]
    pub fn export_type(&self, module: &str, symbol: &str) -> Option<&Type> {
        self.export_types.get(module)?.get(symbol)
    }
}

/// Run the full multi-unit pipeline. Returns per-module emitted output on
/// success, accumulated diagnostics either way, and the file cache used
/// for span rendering.
pub(crate) fn link(
    sources: &BTreeMap<String, String>,
    options: &CompileOptions,
) -> (Option<BTreeMap<String, String>>, Vec<Diagnostic>, FileCache) {
    let mut files = FileCache::new();
    let mut sink = DiagnosticSink::new("link");

    // Parse every unit; failures are reported against their module.
    let mut units: BTreeMap<String, (FileId, Program)> = BTreeMap::new();
    for (name, source) in sources {
        let file = files.intern(name.clone());
        let (tokens, lex_sink) = lexer::tokenize(source, file);
        let lex_failed = lex_sink.has_errors();
        sink.merge(lex_sink);
        if lex_failed {
            continue;
        }
        match parser::parse(&tokens, file) {
            Ok(program) => {
                units.insert(name.clone(), (file, program));
            }
            Err(error) => {
                sink.push(Diagnostic::error(
                    format!("parse error in module '{name}': {}", error.message),
                    error.span,
                ));
            }
        }
    }
    tracing::debug!(units = units.len(), "parsed module set");

    // Headers must agree with the map key.
    for (name, (file, program)) in &units {
        match &program.module {
            None => sink.error(
                Some(Span::point(*file, 1, 1)),
                format!("Missing module declaration (expected 'module {name}')"),
            ),
            Some(decl) if decl.name != *name => sink.error(
                Some(decl.span),
                format!(
                    "Module name mismatch: expected '{name}', found '{}'",
                    decl.name
                ),
            ),
            Some(_) => {}
        }
    }

    // Export tables and signatures.
    let mut exports: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut export_types: BTreeMap<String, BTreeMap<String, Type>> = BTreeMap::new();
    for (name, (_, program)) in &units {
        let (types, duplicate_errors) = typeck::export_signatures(program);
        for error in duplicate_errors {
            sink.push(error);
        }
        exports.insert(name.clone(), types.keys().cloned().collect());
        export_types.insert(name.clone(), types);
    }

    // Import validation and graph construction.
    let mut graph: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, (_, program)) in &units {
        let top_level: BTreeSet<&str> = program
            .body
            .statements
            .iter()
            .filter_map(declared_name)
            .collect();
        let mut bound: BTreeSet<String> = BTreeSet::new();
        let mut edges = Vec::new();

        for import in &program.imports {
            let target = &import.path;
            if !sources.contains_key(target) {
                sink.error(Some(import.span), format!("unknown module '{target}'"));
                continue;
            }
            edges.push(target.clone());

            if let Some(names) = &import.names {
                for (symbol, span) in names {
                    if !exports
                        .get(target)
                        .is_some_and(|names| names.contains(symbol))
                    {
                        sink.error(
                            Some(*span),
                            format!("Module '{target}' does not export '{symbol}'"),
                        );
                    }
                    if !bound.insert(symbol.clone()) {
                        sink.error(Some(*span), format!("duplicate import name '{symbol}'"));
                    } else if top_level.contains(symbol.as_str()) {
                        sink.error(
                            Some(*span),
                            format!("name collision between import and local '{symbol}'"),
                        );
                    }
                }
            } else if let Some(binding) = import.binding() {
                if !bound.insert(binding.to_string()) {
                    sink.error(
                        Some(import.span),
                        format!("duplicate import name '{binding}'"),
                    );
                } else if top_level.contains(binding) {
                    sink.error(
                        Some(import.span),
                        format!("name collision between import and local '{binding}'"),
                    );
                }
            }
        }
        edges.sort();
        edges.dedup();
        graph.insert(name.clone(), edges);
    }

    detect_cycles(&graph, &units, &mut sink);

    // Structural errors gate semantic analysis.
    if sink.has_errors() {
        return (None, sink.into_vec(), files);
    }

    // Per-unit environments, then analyzer and checker.
    for (name, (_, program)) in &units {
        let mut aliases = BTreeMap::new();
        let mut imported_types = BTreeMap::new();
        for import in &program.imports {
            if let Some(names) = &import.names {
                for (symbol, _) in names {
                    if let Some(ty) = export_types
                        .get(&import.path)
                        .and_then(|types| types.get(symbol))
                    {
                        imported_types.insert(symbol.clone(), ty.clone());
                    }
                }
            } else if let Some(binding) = import.binding() {
                aliases.insert(binding.to_string(), import.path.clone());
            }
        }
        let env = ModuleEnv {
            name: name.clone(),
            aliases,
            exports: exports.clone(),
            export_types: export_types.clone(),
            imported_types,
        };
        tracing::debug!(module = %name, "analyzing unit");
        sink.merge(analysis::analyze(program, Some(&env)));
        sink.merge(typeck::check(program, Some(&env)));
    }

    // Semantic errors gate emission.
    if sink.has_errors() {
        return (None, sink.into_vec(), files);
    }

    let mut outputs = BTreeMap::new();
    for (name, (_, mut program)) in units {
        optimize::optimize(&mut program, &options.passes);
        outputs.insert(name, emit::emit(&program, options.target));
    }
    (Some(outputs), sink.into_vec(), files)
}

fn declared_name(stmt: &crate::frontend::ast::Stmt) -> Option<&str> {
    match &stmt.kind {
        StmtKind::Let(decl) => Some(&decl.name),
        StmtKind::Function(decl) => Some(&decl.name),
        StmtKind::Struct(decl) => Some(&decl.name),
        StmtKind::Enum(decl) => Some(&decl.name),
        _ => None,
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Three-colour DFS over the sorted import graph. A back edge reports the
/// cycle path, anchored to the offending import directive.
fn detect_cycles(
    graph: &BTreeMap<String, Vec<String>>,
    units: &BTreeMap<String, (FileId, Program)>,
    sink: &mut DiagnosticSink,
) {
    let mut colors: HashMap<String, Color> = HashMap::new();
    let mut path = Vec::new();
    for name in graph.keys() {
        if colors.get(name).copied().unwrap_or(Color::White) == Color::White {
            visit(name, graph, units, &mut colors, &mut path, sink);
        }
    }
}

fn visit(
    node: &str,
    graph: &BTreeMap<String, Vec<String>>,
    units: &BTreeMap<String, (FileId, Program)>,
    colors: &mut HashMap<String, Color>,
    path: &mut Vec<String>,
    sink: &mut DiagnosticSink,
) {
    colors.insert(node.to_string(), Color::Gray);
    path.push(node.to_string());

    let edges = graph.get(node).cloned().unwrap_or_default();
    for next in edges {
        match colors.get(&next).copied().unwrap_or(Color::White) {
            Color::White => visit(&next, graph, units, colors, path, sink),
            Color::Gray => {
                let start = path.iter().position(|name| *name == next).unwrap_or(0);
                let mut cycle: Vec<&str> = path[start..].iter().map(String::as_str).collect();
                cycle.push(&next);
                let span = import_span(units, node, &next);
                sink.error(
                    span,
                    format!("Circular import detected: {}", cycle.join(" -> ")),
                );
            }
            Color::Black => {}
        }
    }

    colors.insert(node.to_string(), Color::Black);
    path.pop();
}

/// Span of the import directive in `importer` that references `target`.
fn import_span(
    units: &BTreeMap<String, (FileId, Program)>,
    importer: &str,
    target: &str,
) -> Option<Span> {
    let (_, program) = units.get(importer)?;
    program
        .imports
        .iter()
        .find(|import| import.path == target)
        .map(|import| import.span)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::CompileOptions;

    fn sources(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(name, source)| ((*name).to_string(), (*source).to_string()))
            .collect()
    }

    fn link_all(
        pairs: &[(&str, &str)],
    ) -> (Option<BTreeMap<String, String>>, Vec<Diagnostic>) {
        let (outputs, diagnostics, _) = link(&sources(pairs), &CompileOptions::default());
        (outputs, diagnostics)
    }

    fn has_message(diagnostics: &[Diagnostic], needle: &str) -> bool {
        diagnostics
            .iter()
            .any(|diagnostic| diagnostic.message.contains(needle))
    }

    #[test]
    fn two_module_build_links_and_emits() {
        let (outputs, diagnostics) = link_all(&[
            (
                "util",
                "module util\nexport fn double(n: number): number { return n * 2 }",
            ),
            (
                "app",
                "module app\nimport util\nexport fn main(): number { return util.double(21) }",
            ),
        ]);
        assert!(
            !diagnostics.iter().any(|d| d.severity.is_error()),
            "diagnostics: {diagnostics:?}"
        );
        let outputs = outputs.expect("clean build emits");
        assert!(outputs["app"].contains("local util = require(\"util\")"));
        assert!(outputs["util"].contains("M.double = double"));
    }

    #[test]
    fn circular_imports_are_rejected_with_the_cycle_path() {
        let (outputs, diagnostics) = link_all(&[
            (
                "a",
                "module a\nimport b\nexport fn f(): number { return 1 }",
            ),
            (
                "b",
                "module b\nimport a\nexport fn g(): number { return 2 }",
            ),
        ]);
        assert!(outputs.is_none());
        assert!(has_message(
            &diagnostics,
            "Circular import detected: a -> b -> a"
        ));
    }

    #[test]
    fn unknown_module_is_reported() {
        let (outputs, diagnostics) =
            link_all(&[("app", "module app\nimport missing\nlet x = 1")]);
        assert!(outputs.is_none());
        assert!(has_message(&diagnostics, "unknown module 'missing'"));
    }

    #[test]
    fn missing_and_mismatched_headers_are_reported() {
        let (_, diagnostics) = link_all(&[("app", "let x = 1")]);
        assert!(has_message(
            &diagnostics,
            "Missing module declaration (expected 'module app')"
        ));

        let (_, diagnostics) = link_all(&[("app", "module other\nlet x = 1")]);
        assert!(has_message(
            &diagnostics,
            "Module name mismatch: expected 'app', found 'other'"
        ));
    }

    #[test]
    fn named_import_misses_are_reported() {
        let (_, diagnostics) = link_all(&[
            ("util", "module util\nexport fn f(): number { return 1 }"),
            ("app", "module app\nimport util.{f, g}\nlet x = f"),
        ]);
        assert!(has_message(&diagnostics, "Module 'util' does not export 'g'"));
    }

    #[test]
    fn duplicate_import_names_are_reported() {
        let (_, diagnostics) = link_all(&[
            ("util", "module util\nexport fn f(): number { return 1 }"),
            ("extra", "module extra\nexport fn f(): number { return 2 }"),
            (
                "app",
                "module app\nimport util.{f}\nimport extra.{f}\nlet x = f",
            ),
        ]);
        assert!(has_message(&diagnostics, "duplicate import name 'f'"));
    }

    #[test]
    fn import_local_collisions_are_reported() {
        let (_, diagnostics) = link_all(&[
            ("util", "module util\nexport fn f(): number { return 1 }"),
            (
                "app",
                "module app\nimport util\nfn util(): number { return 3 }",
            ),
        ]);
        assert!(has_message(
            &diagnostics,
            "name collision between import and local 'util'"
        ));
    }

    #[test]
    fn non_exported_symbol_access_is_reported() {
        let (outputs, diagnostics) = link_all(&[
            (
                "util",
                "module util\nexport fn f(): number { return 1 }\nfn hidden(): number { return 2 }",
            ),
            (
                "app",
                "module app\nimport util\nexport fn main(): number { return util.hidden() }",
            ),
        ]);
        assert!(outputs.is_none());
        assert!(has_message(
            &diagnostics,
            "Access to non-exported symbol 'hidden' from module 'util'"
        ));
    }

    #[test]
    fn parse_failure_in_one_unit_reports_but_does_not_hide_others() {
        let (outputs, diagnostics) = link_all(&[
            ("broken", "module broken\nlet = 3"),
            ("app", "module app\nimport missing\nlet x = 1"),
        ]);
        assert!(outputs.is_none());
        assert!(has_message(&diagnostics, "parse error in module 'broken'"));
        assert!(has_message(&diagnostics, "unknown module 'missing'"));
    }

    #[test]
    fn imported_enum_exhaustiveness_travels_across_modules() {
        let (outputs, diagnostics) = link_all(&[
            ("colors", "module colors\nexport enum Color { Red, Green }"),
            (
                "app",
                "module app\nimport colors.{Color}\nexport fn pick(c: Color): number { match c { case Color.Red => return 1 } }",
            ),
        ]);
        assert!(outputs.is_none());
        assert!(has_message(
            &diagnostics,
            "Non-exhaustive match for enum 'Color': missing Green"
        ));
    }

    #[test]
    fn linker_output_is_deterministic() {
        let pairs = [
            ("util", "module util\nexport fn f(): number { return 1 }"),
            ("app", "module app\nimport util\nlet x = util.f()"),
        ];
        let (first_out, first_diags, _) = link(&sources(&pairs), &CompileOptions::default());
        let (second_out, second_diags, _) = link(&sources(&pairs), &CompileOptions::default());
        assert_eq!(first_out, second_out);
        assert_eq!(
            first_diags.iter().map(|d| d.message.clone()).collect::<Vec<_>>(),
            second_diags
                .iter()
                .map(|d| d.message.clone())
                .collect::<Vec<_>>()
        );
    }
}
