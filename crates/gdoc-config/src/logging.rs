use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Supported logging output formats for the client's own telemetry.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// Structured JSON suitable for ingestion by logging stacks.
    Json,
    /// Human-readable single line output.
    #[default]
    Compact,
}

/// Errors encountered while parsing a [`LogFormat`] from text.
pub type LogFormatParseError = strum::ParseError;

/// Verbosity requested from the language server via `--logging-level`.
///
/// The textual form is the upper-case level name the server accepts.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, Hash, EnumString, Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum ServerLogLevel {
    /// Everything, including protocol traces.
    Debug,
    /// Informational records.
    Info,
    /// Warnings and above.
    #[default]
    Warning,
    /// Errors and above.
    Error,
    /// Only critical failures.
    Critical,
}

impl ServerLogLevel {
    /// Returns the flag value passed on the server command line.
    #[must_use]
    pub const fn as_arg(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        }
    }
}

/// File mode used by the server when opening its log file.
#[derive(
    Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash, EnumString, Display,
)]
#[strum(ascii_case_insensitive)]
pub enum LogFileMode {
    /// Append to an existing log.
    #[serde(rename = "a")]
    #[strum(to_string = "a", serialize = "append")]
    Append,
    /// Truncate the log on start.
    #[serde(rename = "w")]
    #[strum(to_string = "w", serialize = "write")]
    Write,
}

impl LogFileMode {
    /// Returns the flag value passed on the server command line.
    #[must_use]
    pub const fn as_arg(self) -> &'static str {
        match self {
            Self::Append => "a",
            Self::Write => "w",
        }
    }
}
