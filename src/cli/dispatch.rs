//! Command execution: logging setup, file IO, compile invocation, and
//! diagnostic reporting.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::cli::{Cli, USAGE};
use crate::driver::{self, CompileOptions};
use crate::error::{Error, Result};
use crate::logging::{LogConfig, LogFormat};

/// Run a parsed command line to completion.
pub fn run(cli: Cli) -> Result<()> {
    if cli.help {
        print!("{USAGE}");
        return Ok(());
    }

    init_logging(LogConfig::resolve(cli.log_level, cli.log_format));

    let options = CompileOptions {
        target: cli.target,
        filename: cli.inputs[0].display().to_string(),
        passes: crate::optimize::PassToggles::default(),
    };

    let (outputs, mut diagnostics) = if cli.inputs.len() == 1 {
        let source = fs::read_to_string(&cli.inputs[0])?;
        let (output, diagnostics) = driver::compile(&source, &options);
        (output.map(SingleOrMany::Single), diagnostics)
    } else {
        let mut sources = BTreeMap::new();
        for input in &cli.inputs {
            let stem = module_name(input)?;
            let source = fs::read_to_string(input)?;
            sources.insert(stem, source);
        }
        let (outputs, diagnostics) = driver::compile_modules(&sources, &options);
        (outputs.map(SingleOrMany::Many), diagnostics)
    };

    if cli.warnings_as_errors {
        diagnostics.warnings_as_errors();
    }
    if let Some(max) = cli.max_errors {
        diagnostics.truncate_errors(max);
    }
    if !diagnostics.is_empty() {
        eprint!("{}", diagnostics.render(cli.error_format));
    }
    if diagnostics.has_errors() {
        return Err(Error::CompileFailed {
            errors: diagnostics.count_errors(),
        });
    }

    match outputs {
        Some(SingleOrMany::Single(output)) => match &cli.output {
            Some(path) => fs::write(path, output)?,
            None => print!("{output}"),
        },
        Some(SingleOrMany::Many(outputs)) => write_many(&cli, &outputs)?,
        None => {
            // Gated on errors above; an empty success still emits nothing.
        }
    }
    Ok(())
}

enum SingleOrMany {
    Single(String),
    Many(BTreeMap<String, String>),
}

/// Multi-input builds write `<module>.lua` next to each input, or into the
/// `-o` directory when given.
fn write_many(cli: &Cli, outputs: &BTreeMap<String, String>) -> Result<()> {
    for input in &cli.inputs {
        let module = module_name(input)?;
        let Some(output) = outputs.get(&module) else {
            continue;
        };
        let path = match &cli.output {
            Some(dir) => dir.join(format!("{module}.lua")),
            None => input.with_extension("lua"),
        };
        fs::write(path, output)?;
    }
    Ok(())
}

/// Module name of an input path: its file stem. The linker then reports a
/// mismatch when the `module` header disagrees.
fn module_name(input: &Path) -> Result<String> {
    input
        .file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            Error::Cli(crate::cli::CliError::new(format!(
                "cannot derive a module name from '{}'",
                input.display()
            )))
        })
}

/// Install the tracing subscriber once, writing to stderr.
pub fn init_logging(config: LogConfig) {
    use std::io::IsTerminal;
    use std::sync::OnceLock;
    use tracing_subscriber::{fmt, EnvFilter};

    static INSTALLED: OnceLock<()> = OnceLock::new();

    let _ = INSTALLED.get_or_init(|| {
        let use_ansi = std::env::var_os("NO_COLOR").is_none() && std::io::stderr().is_terminal();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.level.to_string()));

        match config.format {
            LogFormat::Json => {
                let subscriber = fmt::fmt()
                    .with_env_filter(filter)
                    .with_max_level(config.level)
                    .with_ansi(use_ansi)
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .json()
                    .finish();
                let _ = tracing::subscriber::set_global_default(subscriber);
            }
            LogFormat::Text => {
                let subscriber = fmt::fmt()
                    .with_env_filter(filter)
                    .with_max_level(config.level)
                    .with_ansi(use_ansi)
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .compact()
                    .finish();
                let _ = tracing::subscriber::set_global_default(subscriber);
            }
        }
    });
}

/// Report a top-level error the way the binary does.
pub fn report_error(error: &Error) {
    eprintln!("error: {error}");
}
