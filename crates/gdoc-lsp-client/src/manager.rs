//! Language session manager: the single owner of a session's lifecycle.
//!
//! The manager is created once per activation and shared by both extension
//! hooks. `start` and `stop` are serialised by a lifecycle lock; document
//! forwarding and protocol traffic only take short-lived locks, so a blocked
//! sender never prevents `stop` from releasing the process.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::channel::{PendingResponse, ServerMessage};
use crate::document::{DocumentEvent, Routing};
use crate::errors::{ChannelError, ShutdownError, StartupError};
use crate::jsonrpc::RequestId;
use crate::launch::{ProcessSpawner, Spawner};
use crate::session::{SESSION_TARGET, SessionHandle, SessionInfo, SessionOptions};
use crate::session_config::SessionConfig;
use crate::sync::lock;

/// Lifecycle state of a [`SessionManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No start attempted yet, or the last attempt failed.
    Uninitialized,
    /// A start is in progress.
    Starting,
    /// The server is running and documents are routed to it.
    Running,
    /// A stop is in progress.
    Stopping,
    /// Terminal; the process has been released.
    Stopped,
}

impl SessionState {
    /// Lower-case name used in logs and errors.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Starts, tracks, and stops one language server session.
pub struct SessionManager<S: Spawner = ProcessSpawner> {
    spawner: S,
    options: SessionOptions,
    lifecycle: Mutex<()>,
    state: Mutex<SessionState>,
    session: Mutex<Option<Arc<SessionHandle>>>,
    interrupt: AtomicBool,
}

impl SessionManager<ProcessSpawner> {
    /// Creates a manager that launches real processes.
    #[must_use]
    pub fn new(options: SessionOptions) -> Self {
        Self::with_spawner(ProcessSpawner, options)
    }
}

impl<S: Spawner> SessionManager<S> {
    /// Creates a manager with a custom spawner.
    #[must_use]
    pub fn with_spawner(spawner: S, options: SessionOptions) -> Self {
        Self {
            spawner,
            options,
            lifecycle: Mutex::new(()),
            state: Mutex::new(SessionState::Uninitialized),
            session: Mutex::new(None),
            interrupt: AtomicBool::new(false),
        }
    }

    /// Current lifecycle state.
    ///
    /// A running session whose server exited on its own reports
    /// [`SessionState::Stopped`].
    #[must_use]
    pub fn state(&self) -> SessionState {
        let state = *lock(&self.state);
        if state == SessionState::Running && self.current().is_none_or(|session| session.has_exited()) {
            return SessionState::Stopped;
        }
        state
    }

    /// Launches the server described by `config` and completes the handshake.
    ///
    /// # Errors
    ///
    /// Returns [`StartupError::InvalidState`] unless the manager is
    /// [`SessionState::Uninitialized`], otherwise the error from
    /// [`SessionHandle::start`]. A failed start leaves the manager
    /// `Uninitialized`; an interrupted one leaves it `Stopped`.
    pub fn start(&self, config: &SessionConfig) -> Result<SessionInfo, StartupError> {
        let _lifecycle = lock(&self.lifecycle);
        {
            let mut state = lock(&self.state);
            if *state != SessionState::Uninitialized {
                return Err(StartupError::InvalidState { state: *state });
            }
            *state = SessionState::Starting;
        }
        info!(
            target: SESSION_TARGET,
            executable = %config.executable_path(),
            "starting language server session"
        );

        let outcome = SessionHandle::start(config, &self.spawner, self.options, &self.interrupt);
        match outcome {
            Ok(handle) if self.interrupt.load(Ordering::SeqCst) => {
                if let Err(error) = handle.stop(&self.interrupt) {
                    debug!(target: SESSION_TARGET, %error, "interrupted session released");
                }
                self.set_state(SessionState::Stopped);
                Err(StartupError::Interrupted)
            }
            Ok(handle) => {
                let info = handle.info().clone();
                *lock(&self.session) = Some(Arc::new(handle));
                self.set_state(SessionState::Running);
                Ok(info)
            }
            Err(StartupError::Interrupted) => {
                self.set_state(SessionState::Stopped);
                Err(StartupError::Interrupted)
            }
            Err(error) => {
                warn!(target: SESSION_TARGET, %error, "language server failed to start");
                self.set_state(SessionState::Uninitialized);
                Err(error)
            }
        }
    }

    /// Shuts the session down; later calls do nothing.
    ///
    /// Stopping a manager that never started moves it straight to
    /// [`SessionState::Stopped`].
    ///
    /// # Errors
    ///
    /// Returns the [`ShutdownError`] from the first stop. The process is
    /// released either way.
    pub fn stop(&self) -> Result<(), ShutdownError> {
        let _lifecycle = lock(&self.lifecycle);
        {
            let mut state = lock(&self.state);
            match *state {
                SessionState::Stopped => return Ok(()),
                SessionState::Uninitialized | SessionState::Starting | SessionState::Stopping => {
                    *state = SessionState::Stopped;
                    return Ok(());
                }
                SessionState::Running => *state = SessionState::Stopping,
            }
        }

        let session = lock(&self.session).take();
        let result = session.map_or(Ok(()), |session| session.stop(&self.interrupt));
        if let Err(error) = &result {
            warn!(target: SESSION_TARGET, %error, "language server did not shut down cleanly");
        }
        self.set_state(SessionState::Stopped);
        result
    }

    /// Aborts a start or stop currently waiting on the server.
    ///
    /// Has no effect in any other state, so a later `stop` stays graceful.
    pub fn interrupt_pending(&self) {
        let state = lock(&self.state);
        if matches!(*state, SessionState::Starting | SessionState::Stopping) {
            debug!(target: SESSION_TARGET, state = %*state, "interrupting pending lifecycle operation");
            self.interrupt.store(true, Ordering::SeqCst);
        }
    }

    /// Forwards a host document event.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] when no session is running.
    pub fn forward(&self, event: &DocumentEvent) -> Result<Routing, ChannelError> {
        self.running()?.forward(event)
    }

    /// Sends a request to the server.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] when no session is running.
    pub fn request(&self, method: &str, params: Option<Value>) -> Result<PendingResponse, ChannelError> {
        self.running()?.request(method, params)
    }

    /// Sends a notification to the server.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] when no session is running.
    pub fn notify(&self, method: &str, params: Option<Value>) -> Result<(), ChannelError> {
        self.running()?.notify(method, params)
    }

    /// Answers a server-initiated request.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] when no session is running.
    pub fn respond(&self, id: RequestId, result: Value) -> Result<(), ChannelError> {
        self.running()?.respond(id, result)
    }

    /// Drains server messages received so far, in arrival order.
    #[must_use]
    pub fn take_incoming(&self) -> Vec<ServerMessage> {
        self.current()
            .map(|session| session.take_incoming())
            .unwrap_or_default()
    }

    /// Waits up to `timeout` for the next server message.
    #[must_use]
    pub fn next_incoming(&self, timeout: Duration) -> Option<ServerMessage> {
        self.current()?.next_incoming(timeout)
    }

    fn current(&self) -> Option<Arc<SessionHandle>> {
        lock(&self.session).clone()
    }

    fn running(&self) -> Result<Arc<SessionHandle>, ChannelError> {
        self.current().ok_or(ChannelError::Closed)
    }

    fn set_state(&self, next: SessionState) {
        let mut state = lock(&self.state);
        debug!(target: SESSION_TARGET, from = %*state, to = %next, "session state change");
        *state = next;
    }
}

impl<S: Spawner> fmt::Debug for SessionManager<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("state", &self.state())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
