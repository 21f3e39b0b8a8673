//! CLI front-end: argument parsing and dispatch for the `loam` binary.

pub mod dispatch;

use std::error::Error as StdError;
use std::fmt;
use std::path::PathBuf;

use crate::diagnostics::ErrorFormat;
use crate::logging::{parse_level, LogFormat};
use crate::target::Target;

pub const USAGE: &str = "\
Usage: loam <input>... [options]

Options:
  --target <lua|luau>          Emission dialect (default: luau)
  --warnings-as-errors         Reclassify all warnings as errors
  --max-errors <N>             Keep at most N error diagnostics
  --error-format <human|json>  Diagnostic rendering (default: human)
  -o, --output <path>          Output file (single input) or directory
  --log-level <level>          error|warn|info|debug|trace
  --log-format <text|json>     Log event rendering (default: text)
  -h, --help                   Show this help
";

/// Argument parsing failure, reported before any compilation starts.
#[derive(Debug, Clone)]
pub struct CliError {
    message: String,
}

impl CliError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for CliError {}

/// Parsed command line.
#[derive(Debug, Clone)]
pub struct Cli {
    pub inputs: Vec<PathBuf>,
    pub target: Target,
    pub warnings_as_errors: bool,
    pub max_errors: Option<usize>,
    pub error_format: ErrorFormat,
    pub output: Option<PathBuf>,
    pub log_level: Option<tracing::Level>,
    pub log_format: Option<LogFormat>,
    pub help: bool,
}

impl Cli {
    pub fn parse_from<I, S>(args: I) -> Result<Cli, CliError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut cli = Cli {
            inputs: Vec::new(),
            target: Target::default(),
            warnings_as_errors: false,
            max_errors: None,
            error_format: ErrorFormat::default(),
            output: None,
            log_level: None,
            log_format: None,
            help: false,
        };

        let mut args = args.into_iter().map(Into::into);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-h" | "--help" => cli.help = true,
                "--warnings-as-errors" => cli.warnings_as_errors = true,
                "--target" => {
                    let value = expect_value(&mut args, "--target")?;
                    cli.target = Target::parse(&value).ok_or_else(|| {
                        CliError::new(format!(
                            "invalid target '{value}' (expected 'lua' or 'luau')"
                        ))
                    })?;
                }
                "--max-errors" => {
                    let value = expect_value(&mut args, "--max-errors")?;
                    cli.max_errors = Some(value.parse().map_err(|_| {
                        CliError::new(format!("invalid --max-errors value '{value}'"))
                    })?);
                }
                "--error-format" => {
                    let value = expect_value(&mut args, "--error-format")?;
                    cli.error_format = ErrorFormat::parse(&value).ok_or_else(|| {
                        CliError::new(format!(
                            "invalid error format '{value}' (expected 'human' or 'json')"
                        ))
                    })?;
                }
                "-o" | "--output" => {
                    let value = expect_value(&mut args, "--output")?;
                    cli.output = Some(PathBuf::from(value));
                }
                "--log-level" => {
                    let value = expect_value(&mut args, "--log-level")?;
                    cli.log_level = Some(parse_level(&value).ok_or_else(|| {
                        CliError::new(format!("invalid log level '{value}'"))
                    })?);
                }
                "--log-format" => {
                    let value = expect_value(&mut args, "--log-format")?;
                    cli.log_format = Some(LogFormat::parse(&value).ok_or_else(|| {
                        CliError::new(format!(
                            "invalid log format '{value}' (expected 'text' or 'json')"
                        ))
                    })?);
                }
                other if other.starts_with('-') => {
                    return Err(CliError::new(format!("unknown option '{other}'")));
                }
                input => cli.inputs.push(PathBuf::from(input)),
            }
        }

        if !cli.help && cli.inputs.is_empty() {
            return Err(CliError::new(format!("missing input file\n\n{USAGE}")));
        }
        Ok(cli)
    }
}

fn expect_value(
    args: &mut impl Iterator<Item = String>,
    option: &str,
) -> Result<String, CliError> {
    args.next()
        .ok_or_else(|| CliError::new(format!("option '{option}' expects a value")))
}
