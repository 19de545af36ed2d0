//! Error types for the host runtime.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::telemetry::TelemetryError;

/// Failures that end a host run.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration layers could not be merged.
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(Arc<ortho_config::OrthoError>),
    /// Telemetry could not be installed.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    /// The host executable's location could not be determined.
    #[error("failed to locate the host executable: {0}")]
    LocateExecutable(io::Error),
    /// The installation root is not valid UTF-8 or has no parent.
    #[error("cannot derive an installation root from {}", path.display())]
    InstallationRoot {
        /// Path the root was derived from.
        path: PathBuf,
    },
    /// A document could not be read.
    #[error("failed to read document {}: {source}", path.display())]
    ReadDocument {
        /// Document path as given.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },
    /// A document path could not be expressed as a `file:` URI.
    #[error("document path {} cannot be expressed as a file URI", path.display())]
    DocumentUri {
        /// Document path as given.
        path: PathBuf,
    },
    /// The language session did not reach the running state.
    #[error("{message}")]
    SessionNotStarted {
        /// Notification shown to the user.
        message: String,
    },
    /// A server message could not be serialised.
    #[error("failed to serialise server message: {0}")]
    SerialiseMessage(#[from] serde_json::Error),
    /// Server output could not be written.
    #[error("failed to write server output: {0}")]
    WriteOutput(io::Error),
}
