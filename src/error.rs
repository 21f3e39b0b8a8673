use std::error::Error as StdError;
use std::fmt;
use std::io;

use crate::cli::CliError;
use crate::frontend::parser::ParseError;

/// Unified error type for the compiler library and CLI.
#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    Cli(CliError),
    Parse(ParseError),
    /// Compilation finished but produced error diagnostics. The diagnostics
    /// themselves have already been reported through the sink.
    CompileFailed {
        errors: usize,
    },
    Internal {
        message: String,
    },
}

/// Convenience result alias used across the compiler.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Construct a new internal compiler error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "I/O error: {err}"),
            Error::Cli(err) => write!(f, "{err}"),
            Error::Parse(err) => write!(f, "parse error: {err}"),
            Error::CompileFailed { errors } => {
                write!(f, "aborting due to {errors} previous error")?;
                if *errors != 1 {
                    write!(f, "s")?;
                }
                Ok(())
            }
            Error::Internal { message } => write!(f, "internal error: {message}"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Cli(err) => Some(err),
            Error::Parse(err) => Some(err),
            Error::CompileFailed { .. } | Error::Internal { .. } => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        Error::Io(error)
    }
}

impl From<CliError> for Error {
    fn from(error: CliError) -> Self {
        Error::Cli(error)
    }
}

impl From<ParseError> for Error {
    fn from(error: ParseError) -> Self {
        Error::Parse(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats_variants() {
        let io_error = Error::from(io::Error::new(io::ErrorKind::Other, "disk error"));
        assert_eq!(io_error.to_string(), "I/O error: disk error");

        let cli_error = Error::from(CliError::new("bad args"));
        assert_eq!(cli_error.to_string(), "bad args");

        let failed = Error::CompileFailed { errors: 2 };
        assert_eq!(failed.to_string(), "aborting due to 2 previous errors");

        let failed_one = Error::CompileFailed { errors: 1 };
        assert_eq!(failed_one.to_string(), "aborting due to 1 previous error");

        let internal_error = Error::internal("walked off the tree");
        assert_eq!(
            internal_error.to_string(),
            "internal error: walked off the tree"
        );
    }

    #[test]
    fn source_exposes_wrapped_errors() {
        let io_error = Error::from(io::Error::new(io::ErrorKind::Other, "boom"));
        let source = io_error.source().expect("io errors carry a source");
        assert!(source.downcast_ref::<io::Error>().is_some());

        let cli_error = Error::from(CliError::new("oops"));
        let source = cli_error.source().expect("cli errors carry a source");
        assert!(source.downcast_ref::<CliError>().is_some());

        assert!(Error::internal("internal").source().is_none());
        assert!(Error::CompileFailed { errors: 1 }.source().is_none());
    }
}
