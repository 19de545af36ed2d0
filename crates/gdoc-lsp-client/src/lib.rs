//! Client-side session bridge for the gdoc language server.
#![deny(missing_docs)]
//!
//! The crate decides when the out-of-process gdoc language server runs, which
//! editor documents reach it, and how its lifecycle is surfaced to the user.
//! All language intelligence lives in the server; this side only launches it,
//! speaks the Language Server Protocol over its stdio, and tears it down.
//!
//! A [`SessionConfigBuilder`] turns an installation root and logging profile
//! into a [`SessionConfig`]. A [`SessionManager`] owns the resulting process
//! and routes [`DocumentEvent`]s whose documents fall inside the activation
//! scope. [`Extension`] wires both into the host's activation and
//! deactivation hooks. Process launch sits behind the [`Spawner`] trait so
//! tests can substitute in-memory servers.

mod channel;
mod document;
mod errors;
mod extension;
mod jsonrpc;
mod launch;
mod lifecycle;
mod manager;
mod selector;
mod session;
mod session_config;
mod sync;
mod transport;

pub use channel::{PendingResponse, ProtocolChannel, ServerMessage};
pub use document::{DocumentEvent, Routing, TextDocument};
pub use errors::{ChannelError, ShutdownError, StartupError, TransportError};
pub use extension::{
    ActivationContext, Deactivation, Extension, Notifier, STARTUP_FAILURE_MESSAGE, TracingNotifier,
};
pub use jsonrpc::{
    JSONRPC_VERSION, JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, RequestId,
};
pub use launch::{ProcessSpawner, ServerExit, ServerProcess, SpawnedServer, Spawner};
pub use manager::{SessionManager, SessionState};
pub use selector::{ActivationScope, DocumentFilter, FILE_SCHEME};
pub use session::{CLIENT_NAME, SessionHandle, SessionInfo, SessionOptions};
pub use session_config::{
    EXECUTABLE_RELATIVE_PATH, LANGUAGE_SERVER_SUBCOMMAND, LOG_FILE_NAME, LoggingProfile,
    SessionConfig, SessionConfigBuilder,
};
pub use transport::{MAX_MESSAGE_BYTES, MessageReader, MessageWriter};

#[cfg(test)]
mod tests;
