//! A live language server session: process, channel, and document routing.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use gdoc_config::Config;
use lsp_types::{
    ClientCapabilities, ClientInfo, InitializeParams, InitializeResult, InitializedParams,
    ServerCapabilities,
};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::channel::{PendingResponse, ProtocolChannel, ServerMessage};
use crate::document::{DocumentEvent, DocumentRouter, Routing};
use crate::errors::{ChannelError, ShutdownError, StartupError};
use crate::jsonrpc::{JsonRpcNotification, JsonRpcResponse, RequestId};
use crate::launch::{ServerProcess, Spawner};
use crate::lifecycle::{Termination, terminate};
use crate::session_config::SessionConfig;
use crate::sync::{lock, try_lock};

/// Log target for session operations.
pub(crate) const SESSION_TARGET: &str = "gdoc_lsp_client::session";

/// Name reported to the server in `clientInfo`.
pub const CLIENT_NAME: &str = "gdoc-lsp-client";

/// Timing and capacity knobs for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Budget for the `initialize` handshake.
    pub startup_timeout: Duration,
    /// Budget for the `shutdown` handshake and process exit.
    pub shutdown_grace: Duration,
    /// Bound on each message queue.
    pub channel_capacity: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            startup_timeout: Duration::from_millis(gdoc_config::DEFAULT_STARTUP_TIMEOUT_MS),
            shutdown_grace: Duration::from_millis(gdoc_config::DEFAULT_SHUTDOWN_GRACE_MS),
            channel_capacity: gdoc_config::DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl SessionOptions {
    /// Reads the lifecycle timings from layered configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            startup_timeout: config.startup_timeout(),
            shutdown_grace: config.shutdown_grace(),
            channel_capacity: config.channel_capacity(),
        }
    }
}

/// What the server reported during the handshake.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    /// Operating-system process id, when known.
    pub pid: Option<u32>,
    /// `serverInfo.name`, if provided.
    pub server_name: Option<String>,
    /// `serverInfo.version`, if provided.
    pub server_version: Option<String>,
    /// Capabilities advertised in the `initialize` result.
    pub capabilities: ServerCapabilities,
}

/// Owns a running server process and its protocol channel.
pub struct SessionHandle {
    process: Mutex<Box<dyn ServerProcess>>,
    channel: ProtocolChannel,
    router: Mutex<DocumentRouter>,
    info: SessionInfo,
    options: SessionOptions,
    stopped: AtomicBool,
}

impl SessionHandle {
    /// Launches the server and completes the `initialize` handshake.
    ///
    /// Exactly one launch attempt is made. On failure the process is killed
    /// and the channel threads are reaped before returning.
    ///
    /// # Errors
    ///
    /// Returns [`StartupError::ExecutableNotFound`] for an empty or missing
    /// executable, [`StartupError::SpawnFailed`] when launching fails,
    /// [`StartupError::Handshake`] when `initialize` fails or times out, and
    /// [`StartupError::Interrupted`] when `interrupt` is raised meanwhile.
    pub fn start<S: Spawner + ?Sized>(
        config: &SessionConfig,
        spawner: &S,
        options: SessionOptions,
        interrupt: &AtomicBool,
    ) -> Result<Self, StartupError> {
        if config.executable_path().as_str().is_empty() {
            return Err(StartupError::ExecutableNotFound {
                command: String::new(),
                source: Arc::new(io::Error::new(
                    io::ErrorKind::NotFound,
                    "empty executable path",
                )),
            });
        }

        let spawned = spawner.spawn(config)?;
        let mut process = spawned.process;
        let channel = ProtocolChannel::spawn(spawned.stdout, spawned.stdin, options.channel_capacity);

        let handshake = initialize(&channel, options.startup_timeout, interrupt);
        let capabilities = match handshake {
            Ok(result) => result,
            Err(error) => {
                release(process.as_mut(), &channel, interrupt);
                return Err(match error {
                    ChannelError::Interrupted { .. } => StartupError::Interrupted,
                    source => StartupError::Handshake { source },
                });
            }
        };

        let info = SessionInfo {
            pid: process.id(),
            server_name: capabilities.server_info.as_ref().map(|server| server.name.clone()),
            server_version: capabilities.server_info.and_then(|server| server.version),
            capabilities: capabilities.capabilities,
        };
        info!(
            target: SESSION_TARGET,
            pid = ?info.pid,
            server = ?info.server_name,
            scope = config.activation_scope().len(),
            "language server session running"
        );

        Ok(Self {
            process: Mutex::new(process),
            channel,
            router: Mutex::new(DocumentRouter::new(config.activation_scope().clone())),
            info,
            options,
            stopped: AtomicBool::new(false),
        })
    }

    /// Handshake results.
    #[must_use]
    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    /// Returns true once the server process has gone away or the session was
    /// stopped.
    ///
    /// Never waits for the process lock. `stop` raises `stopped` before it
    /// takes that lock for the grace period, so a busy lock outside `stop`
    /// only means another caller is polling the process right now.
    #[must_use]
    pub fn has_exited(&self) -> bool {
        if self.stopped.load(Ordering::SeqCst) || self.channel.is_closed() {
            return true;
        }
        try_lock(&self.process).is_some_and(|mut process| matches!(process.try_wait(), Ok(Some(_))))
    }

    /// Forwards a document event when the document is in scope.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] after `stop` or once the server has
    /// gone away, and [`ChannelError::InvalidUri`] for a location the
    /// protocol cannot carry.
    pub fn forward(&self, event: &DocumentEvent) -> Result<Routing, ChannelError> {
        self.ensure_open()?;
        // Routing and sending happen under one lock to keep event order.
        let mut router = lock(&self.router);
        match router.route(event)? {
            Some(notification) => {
                self.channel.notify(&notification)?;
                Ok(Routing::Forwarded)
            }
            None => {
                debug!(target: SESSION_TARGET, uri = %event.uri(), "document outside activation scope");
                Ok(Routing::Ignored)
            }
        }
    }

    /// Sends a request; wait on the returned handle for the result.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] when the session is no longer running.
    pub fn request(&self, method: &str, params: Option<Value>) -> Result<PendingResponse, ChannelError> {
        self.ensure_open()?;
        self.channel.request(method, params)
    }

    /// Sends a notification.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] when the session is no longer running.
    pub fn notify(&self, method: &str, params: Option<Value>) -> Result<(), ChannelError> {
        self.ensure_open()?;
        self.channel.notify(&JsonRpcNotification::new(method, params))
    }

    /// Answers a server-initiated request.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] when the session is no longer running.
    pub fn respond(&self, id: RequestId, result: Value) -> Result<(), ChannelError> {
        self.ensure_open()?;
        self.channel.respond(&JsonRpcResponse::success(id, result))
    }

    /// Drains queued server messages in arrival order.
    #[must_use]
    pub fn take_incoming(&self) -> Vec<ServerMessage> {
        self.channel.take_incoming()
    }

    /// Waits up to `timeout` for the next server message.
    #[must_use]
    pub fn next_incoming(&self, timeout: Duration) -> Option<ServerMessage> {
        self.channel.next_incoming(timeout)
    }

    fn ensure_open(&self) -> Result<(), ChannelError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(ChannelError::Closed);
        }
        Ok(())
    }

    /// Runs the `shutdown`/`exit` handshake and releases the process.
    ///
    /// Only the first call does any work. The process is gone when this
    /// returns, whatever the result.
    ///
    /// # Errors
    ///
    /// Reports a failed handshake, a forced kill, or a failed kill.
    pub fn stop(&self, interrupt: &AtomicBool) -> Result<(), ShutdownError> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let grace = self.options.shutdown_grace;
        let deadline = Instant::now() + grace;
        let mut process = lock(&self.process);

        let handshake = if matches!(process.try_wait(), Ok(Some(_))) || self.channel.is_closed() {
            debug!(target: SESSION_TARGET, "server already gone, skipping shutdown handshake");
            Ok(())
        } else {
            // Nobody reads server messages once stopping; a full incoming
            // queue must not hold back the `shutdown` response.
            self.channel.discard_incoming();
            shutdown_handshake(&self.channel, grace, interrupt)
        };
        if let Err(error) = &handshake {
            debug!(target: SESSION_TARGET, %error, "shutdown handshake failed");
        }

        self.channel.close_outgoing();
        let remaining = deadline.saturating_duration_since(Instant::now());
        let termination = terminate(process.as_mut(), remaining, interrupt);
        drop(process);
        self.channel.shutdown();

        match termination {
            Termination::KillFailed(source) => Err(ShutdownError::Kill {
                source: Arc::new(source),
            }),
            Termination::Killed => Err(ShutdownError::Killed {
                grace_ms: u64::try_from(grace.as_millis()).unwrap_or(u64::MAX),
            }),
            Termination::Exited(status) => {
                info!(target: SESSION_TARGET, code = ?status.code, "language server session stopped");
                handshake.map_err(|source| ShutdownError::Handshake { source })
            }
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }
        let process = self.process.get_mut().unwrap_or_else(|poison| poison.into_inner());
        if let Err(error) = process.kill() {
            warn!(target: SESSION_TARGET, %error, "failed to kill language server on drop");
        } else {
            let _ = process.wait();
        }
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("pid", &self.info.pid)
            .field("stopped", &self.stopped.load(Ordering::SeqCst))
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

fn initialize(
    channel: &ProtocolChannel,
    timeout: Duration,
    interrupt: &AtomicBool,
) -> Result<InitializeResult, ChannelError> {
    let initialize_params = InitializeParams {
        process_id: Some(std::process::id()),
        client_info: Some(ClientInfo {
            name: CLIENT_NAME.to_owned(),
            version: Some(env!("CARGO_PKG_VERSION").to_owned()),
        }),
        capabilities: ClientCapabilities::default(),
        ..InitializeParams::default()
    };
    let params = serde_json::to_value(initialize_params)?;

    debug!(target: SESSION_TARGET, "sending initialize");
    let response = channel.request("initialize", Some(params))?.wait(timeout, interrupt)?;
    let result: InitializeResult = serde_json::from_value(response)?;

    let initialized = serde_json::to_value(InitializedParams {})?;
    channel.notify(&JsonRpcNotification::new("initialized", Some(initialized)))?;
    Ok(result)
}

fn shutdown_handshake(
    channel: &ProtocolChannel,
    grace: Duration,
    interrupt: &AtomicBool,
) -> Result<(), ChannelError> {
    channel.try_request("shutdown", None)?.wait(grace, interrupt)?;
    channel.try_notify(&JsonRpcNotification::new("exit", None))
}

/// Releases a half-started session.
fn release(process: &mut dyn ServerProcess, channel: &ProtocolChannel, interrupt: &AtomicBool) {
    channel.close_outgoing();
    if let Termination::KillFailed(error) = terminate(process, Duration::ZERO, interrupt) {
        warn!(target: SESSION_TARGET, %error, "failed to kill language server after failed start");
    }
    channel.shutdown();
}
