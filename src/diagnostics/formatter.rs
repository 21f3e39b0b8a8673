use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde_json::json;

use super::{Diagnostic, FileCache};

pub const JSON_SCHEMA_VERSION: &str = "1.0.0";

/// Fallback group name for diagnostics without a resolvable file.
const UNKNOWN_FILE: &str = "<input>";

/// Rendering style for a batch of diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ErrorFormat {
    #[default]
    Human,
    Json,
}

impl ErrorFormat {
    pub fn parse(spec: &str) -> Option<Self> {
        match spec.to_ascii_lowercase().as_str() {
            "human" | "text" => Some(Self::Human),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Render a collection of diagnostics to a single deterministic string.
///
/// The human format groups by file name (sorted), then orders entries by
/// span coordinates, falling back to insertion order. Identical inputs
/// produce byte-identical output.
#[must_use]
pub fn format_diagnostics(
    diagnostics: &[Diagnostic],
    files: &FileCache,
    format: ErrorFormat,
) -> String {
    match format {
        ErrorFormat::Human => render_human(diagnostics, files),
        ErrorFormat::Json => render_json(diagnostics, files),
    }
}

fn file_name(diagnostic: &Diagnostic, files: &FileCache) -> String {
    diagnostic
        .span
        .and_then(|span| files.name(span.file))
        .unwrap_or(UNKNOWN_FILE)
        .to_string()
}

fn render_human(diagnostics: &[Diagnostic], files: &FileCache) -> String {
    let mut groups: BTreeMap<String, Vec<(usize, &Diagnostic)>> = BTreeMap::new();
    for (index, diagnostic) in diagnostics.iter().enumerate() {
        groups
            .entry(file_name(diagnostic, files))
            .or_default()
            .push((index, diagnostic));
    }

    let mut out = String::new();
    for (file, mut entries) in groups {
        entries.sort_by_key(|(index, diagnostic)| {
            let key = diagnostic.span.map_or((1, 1, 1, 1), |span| {
                (span.start_line, span.start_col, span.end_line, span.end_col)
            });
            (key, *index)
        });

        out.push_str(&file);
        out.push('\n');
        for (_, diagnostic) in entries {
            let location = match diagnostic.span {
                Some(span) if !span.is_point() => format!(
                    "{}:{}-{}:{}",
                    span.start_line, span.start_col, span.end_line, span.end_col
                ),
                Some(span) => format!("{}:{}", span.start_line, span.start_col),
                None => "1:1".to_string(),
            };
            let _ = writeln!(
                out,
                "  {location}: {}: {}",
                diagnostic.severity.as_str(),
                diagnostic.message
            );
            for hint in &diagnostic.hints {
                let _ = writeln!(out, "    hint: {hint}");
            }
        }
    }
    out
}

fn render_json(diagnostics: &[Diagnostic], files: &FileCache) -> String {
    let entries: Vec<_> = diagnostics
        .iter()
        .map(|diagnostic| {
            let span = diagnostic.span.map(|span| {
                json!({
                    "start_line": span.start_line,
                    "start_col": span.start_col,
                    "end_line": span.end_line,
                    "end_col": span.end_col,
                })
            });
            json!({
                "severity": diagnostic.severity.as_str(),
                "file": file_name(diagnostic, files),
                "span": span,
                "message": diagnostic.message,
                "hints": diagnostic.hints,
                "code": diagnostic.code.as_ref().map(|code| code.code.clone()),
            })
        })
        .collect();

    let document = json!({
        "schema_version": JSON_SCHEMA_VERSION,
        "diagnostics": entries,
    });
    serde_json::to_string_pretty(&document).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{Diagnostic, FileCache, Span};

    fn sample() -> (Vec<Diagnostic>, FileCache) {
        let mut files = FileCache::new();
        let main = files.intern("main.loam");
        let util = files.intern("util.loam");
        let diagnostics = vec![
            Diagnostic::error(
                "Undefined variable 'x'",
                Some(Span::new(util, 3, 5, 3, 6)),
            ),
            Diagnostic::warning("Unused local 'y'", Some(Span::new(main, 2, 9, 2, 10))),
            Diagnostic::error("Use of 'z' before assignment", Some(Span::point(main, 1, 1)))
                .with_hint("assign a value before reading"),
        ];
        (diagnostics, files)
    }

    #[test]
    fn human_format_groups_by_sorted_file() {
        let (diagnostics, files) = sample();
        let rendered = format_diagnostics(&diagnostics, &files, ErrorFormat::Human);
        let expected = "main.loam\n  1:1: error: Use of 'z' before assignment\n    hint: assign a value before reading\n  2:9-2:10: warning: Unused local 'y'\nutil.loam\n  3:5-3:6: error: Undefined variable 'x'\n";
        assert_eq!(rendered, expected);
    }

    #[test]
    fn human_format_is_deterministic() {
        let (diagnostics, files) = sample();
        let first = format_diagnostics(&diagnostics, &files, ErrorFormat::Human);
        let second = format_diagnostics(&diagnostics, &files, ErrorFormat::Human);
        assert_eq!(first, second);
    }

    #[test]
    fn missing_span_renders_under_input_at_one_one() {
        let files = FileCache::new();
        let diagnostics = vec![Diagnostic::error("bad flag", None)];
        let rendered = format_diagnostics(&diagnostics, &files, ErrorFormat::Human);
        assert_eq!(rendered, "<input>\n  1:1: error: bad flag\n");
    }

    #[test]
    fn json_format_carries_schema_version() {
        let (diagnostics, files) = sample();
        let rendered = format_diagnostics(&diagnostics, &files, ErrorFormat::Json);
        let value: serde_json::Value =
            serde_json::from_str(&rendered).expect("formatter emits valid json");
        assert_eq!(value["schema_version"], JSON_SCHEMA_VERSION);
        assert_eq!(value["diagnostics"].as_array().map(Vec::len), Some(3));
    }
}
