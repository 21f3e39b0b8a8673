//! End-to-end checks of the `loam` binary: exit codes, diagnostic
//! reporting, and output placement.

use assert_cmd::Command;
use predicates::prelude::*;

mod common;
use common::{write_source, write_sources};

fn loam() -> Command {
    Command::cargo_bin("loam").expect("binary builds")
}

#[test]
fn clean_compile_prints_lua_to_stdout() {
    let dir = tempfile::tempdir().expect("temp dir");
    let input = dir.path().join("main.loam");
    write_source(&input, "fn f(): number { return 1 + 1 }\n");

    loam()
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("local function f()"))
        .stdout(predicate::str::contains("return 2"));
}

#[test]
fn errors_exit_one_and_report_on_stderr() {
    let dir = tempfile::tempdir().expect("temp dir");
    let input = dir.path().join("main.loam");
    write_source(&input, "fn f() { let x; let y = x print(y) }\n");

    loam()
        .arg(&input)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Use of 'x' before assignment"))
        .stderr(predicate::str::contains("error"));
}

#[test]
fn warnings_as_errors_fails_warning_only_compiles() {
    let dir = tempfile::tempdir().expect("temp dir");
    let input = dir.path().join("main.loam");
    write_source(&input, "fn f() { let unused = 1 }\n");

    loam().arg(&input).assert().success();

    loam()
        .arg(&input)
        .arg("--warnings-as-errors")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Unused local 'unused'"));
}

#[test]
fn max_errors_truncates_error_diagnostics() {
    let dir = tempfile::tempdir().expect("temp dir");
    let input = dir.path().join("main.loam");
    write_source(&input, "fn f() { print(a) print(b) print(c) }\n");

    let assert = loam()
        .arg(&input)
        .arg("--max-errors")
        .arg("1")
        .assert()
        .failure();
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).to_string();
    assert_eq!(
        stderr.matches(": error: ").count(),
        1,
        "expected one error line, got:\n{stderr}"
    );
}

#[test]
fn json_error_format_is_structured() {
    let dir = tempfile::tempdir().expect("temp dir");
    let input = dir.path().join("main.loam");
    write_source(&input, "fn f() { print(mystery) }\n");

    let assert = loam()
        .arg(&input)
        .arg("--error-format")
        .arg("json")
        .assert()
        .failure();
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).to_string();
    // The final "aborting" line follows the document; stream-parse the
    // leading JSON value.
    let value: serde_json::Value = serde_json::Deserializer::from_str(&stderr)
        .into_iter()
        .next()
        .expect("stderr starts with a json document")
        .expect("document parses");
    assert_eq!(value["schema_version"], "1.0.0");
    assert!(value["diagnostics"].as_array().is_some_and(|a| !a.is_empty()));
}

#[test]
fn output_flag_writes_the_file() {
    let dir = tempfile::tempdir().expect("temp dir");
    let input = dir.path().join("main.loam");
    let output = dir.path().join("main.lua");
    write_source(&input, "fn f(): number { return 1 }\n");

    loam()
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
    let written = std::fs::read_to_string(&output).expect("output written");
    assert!(written.contains("local function f()"));
}

#[test]
fn multi_file_build_writes_one_lua_file_per_module() {
    let dir = tempfile::tempdir().expect("temp dir");
    write_sources(
        dir.path(),
        &[
            (
                "util.loam",
                "module util\nexport fn double(n: number): number { return n * 2 }\n",
            ),
            (
                "app.loam",
                "module app\nimport util\nexport fn main(): number { return util.double(21) }\n",
            ),
        ],
    );
    let out_dir = dir.path().join("out");
    std::fs::create_dir(&out_dir).expect("create out dir");

    loam()
        .arg(dir.path().join("util.loam"))
        .arg(dir.path().join("app.loam"))
        .arg("-o")
        .arg(&out_dir)
        .assert()
        .success();

    let util = std::fs::read_to_string(out_dir.join("util.lua")).expect("util.lua written");
    assert!(util.contains("return M"));
    let app = std::fs::read_to_string(out_dir.join("app.lua")).expect("app.lua written");
    assert!(app.contains("local util = require(\"util\")"));
}

#[test]
fn module_header_mismatch_is_reported_against_the_file_stem() {
    let dir = tempfile::tempdir().expect("temp dir");
    write_sources(
        dir.path(),
        &[
            ("first.loam", "module wrong\nlet x = 1\n"),
            ("second.loam", "module second\nlet y = 1\n"),
        ],
    );

    loam()
        .arg(dir.path().join("first.loam"))
        .arg(dir.path().join("second.loam"))
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "Module name mismatch: expected 'first', found 'wrong'",
        ));
}

#[test]
fn help_prints_usage_and_succeeds() {
    loam()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: loam"));
}

#[test]
fn missing_input_reports_usage() {
    loam()
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing input file"));
}

#[test]
fn unknown_target_is_a_cli_error() {
    loam()
        .arg("whatever.loam")
        .arg("--target")
        .arg("js")
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid target 'js'"));
}

#[test]
fn diagnostics_are_byte_stable_across_runs() {
    let dir = tempfile::tempdir().expect("temp dir");
    let input = dir.path().join("main.loam");
    write_source(
        &input,
        "fn f() { let x; let y = x print(y) print(mystery) }\n",
    );

    let first = loam().arg(&input).assert().failure();
    let second = loam().arg(&input).assert().failure();
    assert_eq!(
        first.get_output().stderr,
        second.get_output().stderr,
        "diagnostic output must be identical across runs"
    );
}
