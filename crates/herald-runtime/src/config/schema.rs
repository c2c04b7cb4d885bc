//! Configuration schema definitions.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use herald_framework::{DispatchOptions, ExecutorOptions};
use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeraldConfig {
    /// Prefix and separator used to recognise commands.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Sizing of the asynchronous command runtime.
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Logging setup applied when the runtime is created.
    #[serde(default)]
    pub logging: LoggingConfig,
}

// =============================================================================
// Dispatch
// =============================================================================

/// Command recognition settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Literal string a message must start with. An empty prefix is allowed
    /// but makes every message a command candidate.
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Character separating an alias from its parameters, in addition to
    /// whitespace.
    #[serde(default = "default_argument_separator")]
    pub argument_separator: char,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            argument_separator: default_argument_separator(),
        }
    }
}

impl DispatchConfig {
    /// Converts to framework dispatch options.
    pub fn to_options(&self) -> DispatchOptions {
        DispatchOptions {
            prefix: self.prefix.clone(),
            argument_separator: self.argument_separator,
        }
    }
}

fn default_prefix() -> String {
    "!".to_string()
}

fn default_argument_separator() -> char {
    ' '
}

// =============================================================================
// Executor
// =============================================================================

/// Settings for the lazily built runtime running asynchronous commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Number of worker threads.
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,

    /// Name given to worker threads.
    #[serde(default = "default_thread_name")]
    pub thread_name: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            worker_threads: default_worker_threads(),
            thread_name: default_thread_name(),
        }
    }
}

impl ExecutorConfig {
    /// Converts to framework executor options.
    pub fn to_options(&self) -> ExecutorOptions {
        ExecutorOptions {
            worker_threads: self.worker_threads,
            thread_name: self.thread_name.clone(),
        }
    }
}

fn default_worker_threads() -> usize {
    2
}

fn default_thread_name() -> String {
    "herald-command".to_string()
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output format of log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature.
    Json,
}

/// Where log lines are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    /// Requires [`LoggingConfig::file_path`].
    File,
}

/// Rotation of the log file when writing to [`LogOutput::File`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpanEventConfig {
    pub new: bool,
    pub enter: bool,
    pub exit: bool,
    pub close: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Global log level. `RUST_LOG` takes precedence when set.
    pub level: LogLevel,

    pub format: LogFormat,

    pub output: LogOutput,

    pub span_events: SpanEventConfig,

    /// Include thread ids in log lines.
    pub thread_ids: bool,

    /// Include source file and line number in log lines.
    pub file_location: bool,

    /// Log file, used when `output` is `file`.
    pub file_path: Option<PathBuf>,

    pub rotation: LogRotation,

    /// Per-module level overrides, e.g. `herald_framework = "debug"`.
    pub filters: HashMap<String, LogLevel>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_framework() {
        let config = HeraldConfig::default();
        assert_eq!(config.dispatch.to_options(), DispatchOptions::default());
        assert_eq!(config.executor.to_options(), ExecutorOptions::default());
        assert_eq!(config.logging.level, LogLevel::Info);
    }

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(LogLevel::Warn.to_tracing_level(), tracing::Level::WARN);
        assert_eq!(LogLevel::Trace.to_string(), "trace");
    }
}
