//! Session configuration builder.
//!
//! Produces the immutable [`SessionConfig`] used to launch the gdoc language
//! server. Construction performs no I/O and cannot fail; identical inputs
//! always yield identical argument sequences.

use camino::{Utf8Path, Utf8PathBuf};
use gdoc_config::{Config, LogFileMode, ServerLogLevel};

use crate::selector::ActivationScope;

/// Executable location relative to the installation root.
pub const EXECUTABLE_RELATIVE_PATH: &str = "bin/gdoc";

/// Server log file name, placed directly under the installation root.
pub const LOG_FILE_NAME: &str = ".gdoc-language-server.log";

/// Subcommand selecting the language server mode.
pub const LANGUAGE_SERVER_SUBCOMMAND: &str = "language-server";

/// Logging options forwarded to the server's `--logging-*` flags.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoggingProfile {
    /// Verbosity passed as `--logging-level`.
    pub level: ServerLogLevel,
    /// Optional `--logging-filemode`.
    pub filemode: Option<LogFileMode>,
    /// Adds `--logging-timestamp` when set.
    pub timestamp: bool,
    /// Module paths passed after `--logging-scope`.
    pub scope: Vec<String>,
    /// Overrides `<root>/.gdoc-language-server.log`.
    pub filename: Option<Utf8PathBuf>,
}

impl LoggingProfile {
    /// Builds a profile from the server logging fields of `config`.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            level: config.server_log_level,
            filemode: config.server_log_filemode,
            timestamp: config.server_log_timestamp,
            scope: config.server_log_scope.clone(),
            filename: None,
        }
    }
}

/// Everything needed to launch one server session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    executable_path: Utf8PathBuf,
    arguments: Vec<String>,
    activation_scope: ActivationScope,
}

impl SessionConfig {
    /// Assembles a configuration from explicit parts.
    ///
    /// Prefer [`SessionConfigBuilder`]; this exists for hosts that launch a
    /// different executable with their own argument list.
    #[must_use]
    pub fn new(
        executable_path: impl Into<Utf8PathBuf>,
        arguments: Vec<String>,
        activation_scope: ActivationScope,
    ) -> Self {
        Self {
            executable_path: executable_path.into(),
            arguments,
            activation_scope,
        }
    }

    /// Path of the server binary.
    #[must_use]
    pub fn executable_path(&self) -> &Utf8Path {
        &self.executable_path
    }

    /// Ordered launch arguments.
    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    /// Documents routed to the session.
    #[must_use]
    pub fn activation_scope(&self) -> &ActivationScope {
        &self.activation_scope
    }
}

/// Builds a [`SessionConfig`] from an installation root.
#[derive(Debug, Clone)]
pub struct SessionConfigBuilder {
    installation_root: Utf8PathBuf,
    logging: LoggingProfile,
    activation_scope: ActivationScope,
}

impl SessionConfigBuilder {
    /// Starts a builder with default logging and the `{file, gdoc}` scope.
    #[must_use]
    pub fn new(installation_root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            installation_root: installation_root.into(),
            logging: LoggingProfile::default(),
            activation_scope: ActivationScope::from_kinds([gdoc_config::DEFAULT_DOCUMENT_KIND]),
        }
    }

    /// Seeds logging and scope from layered configuration.
    #[must_use]
    pub fn from_config(installation_root: impl Into<Utf8PathBuf>, config: &Config) -> Self {
        Self::new(installation_root)
            .logging(LoggingProfile::from_config(config))
            .activation_scope(ActivationScope::from_kinds(config.document_kinds()))
    }

    /// Replaces the logging profile.
    #[must_use]
    pub fn logging(mut self, logging: LoggingProfile) -> Self {
        self.logging = logging;
        self
    }

    /// Replaces the activation scope.
    #[must_use]
    pub fn activation_scope(mut self, scope: ActivationScope) -> Self {
        self.activation_scope = scope;
        self
    }

    /// Produces the session configuration.
    #[must_use]
    pub fn build(&self) -> SessionConfig {
        SessionConfig {
            executable_path: self.installation_root.join(EXECUTABLE_RELATIVE_PATH),
            arguments: self.arguments(),
            activation_scope: self.activation_scope.clone(),
        }
    }

    fn arguments(&self) -> Vec<String> {
        let log_file = self
            .logging
            .filename
            .clone()
            .unwrap_or_else(|| self.installation_root.join(LOG_FILE_NAME));

        let mut arguments = vec![
            LANGUAGE_SERVER_SUBCOMMAND.to_owned(),
            "--logging-filename".to_owned(),
            log_file.into_string(),
        ];
        if let Some(mode) = self.logging.filemode {
            arguments.push("--logging-filemode".to_owned());
            arguments.push(mode.as_arg().to_owned());
        }
        arguments.push("--logging-level".to_owned());
        arguments.push(self.logging.level.as_arg().to_owned());
        if self.logging.timestamp {
            arguments.push("--logging-timestamp".to_owned());
        }
        // Must stay last: the server consumes every remaining argument.
        if !self.logging.scope.is_empty() {
            arguments.push("--logging-scope".to_owned());
            arguments.extend(self.logging.scope.iter().cloned());
        }
        arguments
    }
}
