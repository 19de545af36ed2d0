//! Shared configuration for the gdoc editor integration.
//!
//! Values are layered by `ortho_config`: built-in defaults, an optional
//! configuration file (`--config-path` or `GDOC_CONFIG_PATH`), `GDOC_*`
//! environment variables, and finally command-line flags. The session bridge
//! reads the language server logging profile, the document kinds to route,
//! and the lifecycle timings from here; the host binary additionally reads its
//! own telemetry settings.

mod defaults;
mod logging;

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_CHANNEL_CAPACITY, DEFAULT_DOCUMENT_KIND, DEFAULT_LINGER_MS, DEFAULT_LOG_FILTER,
    DEFAULT_SHUTDOWN_GRACE_MS, DEFAULT_STARTUP_TIMEOUT_MS, default_document_kinds,
    default_log_filter, default_log_filter_string, default_log_format, default_server_log_level,
};
pub use logging::{LogFileMode, LogFormat, LogFormatParseError, ServerLogLevel};

/// Resolved configuration for a gdoc session host.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "GDOC")]
pub struct Config {
    /// Filter expression for the host's own tracing output.
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Output format for the host's own tracing output.
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
    /// Installation directory holding `bin/gdoc`; derived from the host
    /// executable when unset.
    pub installation_root: Option<Utf8PathBuf>,
    /// Verbosity passed to the server as `--logging-level`.
    #[ortho_config(default = default_server_log_level())]
    pub server_log_level: ServerLogLevel,
    /// Optional `--logging-filemode`; the server's default applies when unset.
    pub server_log_filemode: Option<LogFileMode>,
    /// Whether to pass `--logging-timestamp`.
    #[ortho_config(default = false)]
    pub server_log_timestamp: bool,
    /// Module paths passed to `--logging-scope`.
    #[ortho_config(default = Vec::new())]
    pub server_log_scope: Vec<String>,
    /// Language identifiers of `file:` documents routed to the server.
    #[ortho_config(default = default_document_kinds())]
    pub document_kinds: Vec<String>,
    /// Upper bound on the `initialize` handshake, in milliseconds.
    #[ortho_config(default = DEFAULT_STARTUP_TIMEOUT_MS)]
    pub startup_timeout_ms: u64,
    /// Grace period before a non-exiting server is killed, in milliseconds.
    #[ortho_config(default = DEFAULT_SHUTDOWN_GRACE_MS)]
    pub shutdown_grace_ms: u64,
    /// Messages buffered per direction of the protocol channel.
    #[ortho_config(default = DEFAULT_CHANNEL_CAPACITY)]
    pub channel_capacity: usize,
    /// How long the host collects server output after routing documents.
    #[ortho_config(default = DEFAULT_LINGER_MS)]
    pub linger_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            installation_root: None,
            server_log_level: default_server_log_level(),
            server_log_filemode: None,
            server_log_timestamp: false,
            server_log_scope: Vec::new(),
            document_kinds: default_document_kinds(),
            startup_timeout_ms: DEFAULT_STARTUP_TIMEOUT_MS,
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            linger_ms: DEFAULT_LINGER_MS,
        }
    }
}

impl Config {
    /// Tracing filter for the host.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Tracing output format for the host.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Configured installation root, if any.
    #[must_use]
    pub fn installation_root(&self) -> Option<&Utf8Path> {
        self.installation_root.as_deref()
    }

    /// Document kinds routed to the server; falls back to the default kind
    /// when the configured list is empty.
    #[must_use]
    pub fn document_kinds(&self) -> Vec<String> {
        if self.document_kinds.is_empty() {
            default_document_kinds()
        } else {
            self.document_kinds.clone()
        }
    }

    /// Handshake budget as a [`Duration`].
    #[must_use]
    pub const fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    /// Shutdown grace period as a [`Duration`].
    #[must_use]
    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Channel capacity, never below one message.
    #[must_use]
    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity.max(1)
    }

    /// Output collection window for the host as a [`Duration`].
    #[must_use]
    pub const fn linger(&self) -> Duration {
        Duration::from_millis(self.linger_ms)
    }
}
