//! Logging configuration for the `loam` CLI.
//!
//! Compile diagnostics own stderr, so the log stream defaults to
//! warnings-only compact text. Pipeline phases emit `tracing` events; the
//! CLI resolves a [`LogConfig`] from `--log-level` / `--log-format` and
//! the `LOAM_LOG_LEVEL` / `LOAM_LOG_FORMAT` environment variables, then
//! installs the subscriber once per process (see `cli::dispatch`).

use std::env;

use tracing::Level;

/// Rendering of log events on stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Compact single-line text.
    #[default]
    Text,
    /// Newline-delimited JSON, for harnesses that scrape the log stream.
    Json,
}

impl LogFormat {
    pub fn parse(spec: &str) -> Option<Self> {
        match spec.to_ascii_lowercase().as_str() {
            "text" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Verbosity for `--log-level`. Loam has no level lattice of its own;
/// tracing's five levels are parsed by tracing itself.
pub fn parse_level(spec: &str) -> Option<Level> {
    spec.parse().ok()
}

/// Resolved logging configuration for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogConfig {
    pub level: Level,
    pub format: LogFormat,
}

impl LogConfig {
    /// Warnings-only text: loud enough for real problems, quiet enough
    /// that compile diagnostics stay the loudest thing on stderr.
    pub const DEFAULT: Self = Self {
        level: Level::WARN,
        format: LogFormat::Text,
    };

    /// CLI flags beat environment variables, which beat the default.
    #[must_use]
    pub fn resolve(cli_level: Option<Level>, cli_format: Option<LogFormat>) -> Self {
        let env_level = env::var("LOAM_LOG_LEVEL").ok();
        let env_format = env::var("LOAM_LOG_FORMAT").ok();
        Self::resolve_from(
            env_level.as_deref(),
            env_format.as_deref(),
            cli_level,
            cli_format,
        )
    }

    fn resolve_from(
        env_level: Option<&str>,
        env_format: Option<&str>,
        cli_level: Option<Level>,
        cli_format: Option<LogFormat>,
    ) -> Self {
        let level = cli_level
            .or_else(|| env_level.and_then(parse_level))
            .unwrap_or(Self::DEFAULT.level);
        let format = cli_format
            .or_else(|| env_format.and_then(LogFormat::parse))
            .unwrap_or(Self::DEFAULT.format);
        Self { level, format }
    }
}
