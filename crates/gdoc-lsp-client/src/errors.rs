//! Error types surfaced by the session bridge.
//!
//! I/O errors are wrapped in `Arc` to satisfy the `result_large_err` Clippy
//! lint.

use std::io;
use std::sync::Arc;

use thiserror::Error;

use crate::jsonrpc::JsonRpcError;
use crate::manager::SessionState;

/// Transport-layer errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// I/O error during read or write.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Missing Content-Length header.
    #[error("missing Content-Length header")]
    MissingContentLength,

    /// Invalid header format.
    #[error("invalid header format")]
    InvalidHeader,

    /// The announced body exceeds the reader's limit.
    #[error("message of {length} bytes exceeds the {limit}-byte limit")]
    MessageTooLarge {
        /// Length announced by `Content-Length`.
        length: usize,
        /// Largest accepted body.
        limit: usize,
    },
}

/// Faults on a running protocol channel.
///
/// These are reported to whoever issued the failing operation; the bridge
/// never retries them.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The channel has been closed, either by `stop` or because the server
    /// went away.
    #[error("protocol channel is closed")]
    Closed,

    /// Transport-level I/O error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// JSON serialization/deserialization error.
    #[error("JSON codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// The server returned an error response.
    #[error("server returned error: {message} (code: {code})")]
    Server {
        /// The JSON-RPC error code.
        code: i64,
        /// The error message from the server.
        message: String,
    },

    /// No response arrived in time.
    #[error("request '{method}' timed out after {timeout_ms}ms")]
    Timeout {
        /// Method of the request.
        method: String,
        /// Budget that elapsed, in milliseconds.
        timeout_ms: u64,
    },

    /// The wait was interrupted by deactivation.
    #[error("request '{method}' was interrupted")]
    Interrupted {
        /// Method of the request.
        method: String,
    },

    /// A document location has no protocol URI form.
    #[error("document URI '{uri}' is not a valid protocol URI")]
    InvalidUri {
        /// The rejected location.
        uri: String,
    },
}

impl ChannelError {
    /// Creates a server error from a JSON-RPC error object.
    #[must_use]
    pub fn from_jsonrpc(error: JsonRpcError) -> Self {
        Self::Server {
            code: error.code,
            message: error.message,
        }
    }
}

/// Reasons a session could not be started.
#[derive(Debug, Error)]
pub enum StartupError {
    /// The language server binary was not found.
    #[error("language server binary not found: {command}")]
    ExecutableNotFound {
        /// The command that was not found.
        command: String,
        /// The underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The binary exists but could not be launched.
    #[error("failed to spawn language server process: {message}")]
    SpawnFailed {
        /// Description of the spawn failure.
        message: String,
        /// The underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The process started but the protocol channel could not be established.
    #[error("initialization handshake failed: {source}")]
    Handshake {
        /// The channel fault observed during `initialize`.
        #[source]
        source: ChannelError,
    },

    /// Deactivation interrupted the start attempt.
    #[error("start was interrupted by deactivation")]
    Interrupted,

    /// `start` was called outside the `Uninitialized` state.
    #[error("cannot start a session while {state}")]
    InvalidState {
        /// State the manager was in.
        state: SessionState,
    },
}

impl StartupError {
    /// Classifies a launch failure by its I/O error kind.
    pub(crate) fn from_spawn(command: &str, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            Self::ExecutableNotFound {
                command: command.to_owned(),
                source: Arc::new(source),
            }
        } else {
            Self::SpawnFailed {
                message: format!("failed to start {command}"),
                source: Arc::new(source),
            }
        }
    }
}

/// Problems observed while stopping a session.
///
/// The process is always released before one of these is returned; they
/// report that the graceful path was not taken.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// The `shutdown`/`exit` handshake failed.
    #[error("graceful shutdown handshake failed: {source}")]
    Handshake {
        /// The channel fault observed.
        #[source]
        source: ChannelError,
    },

    /// The server did not exit within the grace period and was killed.
    #[error("language server did not exit within {grace_ms}ms and was killed")]
    Killed {
        /// Grace period that elapsed, in milliseconds.
        grace_ms: u64,
    },

    /// Killing the process failed.
    #[error("failed to terminate language server process: {source}")]
    Kill {
        /// The underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
}
