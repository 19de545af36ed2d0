//! Editor-facing activation and deactivation hooks.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use camino::Utf8PathBuf;
use gdoc_config::Config;
use tracing::{error, info, warn};

use crate::errors::{ShutdownError, StartupError};
use crate::launch::{ProcessSpawner, Spawner};
use crate::manager::SessionManager;
use crate::session::SessionOptions;
use crate::session_config::SessionConfigBuilder;

/// Log target for extension hooks.
pub(crate) const EXTENSION_TARGET: &str = "gdoc_lsp_client::extension";

/// Text of the single notification shown when the server cannot start.
pub const STARTUP_FAILURE_MESSAGE: &str = "gdoc-language-server couldn't be started.";

/// Surfaces user-visible messages in the host editor.
pub trait Notifier: Send + Sync {
    /// Shows an error notification.
    fn show_error(&self, message: &str);
}

/// Notifier that records messages through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn show_error(&self, message: &str) {
        error!(target: EXTENSION_TARGET, message, "user notification");
    }
}

/// Inputs supplied by the host when the extension activates.
#[derive(Debug, Clone)]
pub struct ActivationContext {
    /// Directory containing `bin/gdoc`.
    pub installation_root: Utf8PathBuf,
    /// Layered configuration snapshot.
    pub config: Config,
}

/// The extension: one session manager plus a way to talk to the user.
pub struct Extension<S: Spawner = ProcessSpawner, N: Notifier = TracingNotifier> {
    manager: Arc<SessionManager<S>>,
    notifier: N,
}

impl Extension {
    /// Creates an extension that launches real processes and logs
    /// notifications.
    #[must_use]
    pub fn new(options: SessionOptions) -> Self {
        Self::with_parts(SessionManager::new(options), TracingNotifier)
    }
}

impl<S, N> Extension<S, N>
where
    S: Spawner + 'static,
    N: Notifier,
{
    /// Assembles an extension from an existing manager and notifier.
    #[must_use]
    pub fn with_parts(manager: SessionManager<S>, notifier: N) -> Self {
        Self {
            manager: Arc::new(manager),
            notifier,
        }
    }

    /// Session manager shared by both hooks.
    #[must_use]
    pub fn manager(&self) -> &Arc<SessionManager<S>> {
        &self.manager
    }

    /// Activation hook: starts the session.
    ///
    /// A failed start shows [`STARTUP_FAILURE_MESSAGE`] once; activation
    /// itself always completes. A start rejected because the manager has
    /// already left `Uninitialized` (for example after a deactivation won
    /// the race) launched nothing, so it is only logged.
    pub fn activate(&self, context: &ActivationContext) {
        let config =
            SessionConfigBuilder::from_config(context.installation_root.clone(), &context.config)
                .build();

        match self.manager.start(&config) {
            Ok(session) => info!(
                target: EXTENSION_TARGET,
                pid = ?session.pid,
                server = ?session.server_name,
                "extension activated"
            ),
            Err(error @ StartupError::InvalidState { .. }) => {
                info!(target: EXTENSION_TARGET, %error, "activation skipped");
            }
            Err(error) => {
                warn!(target: EXTENSION_TARGET, %error, "language server could not be started");
                self.notifier.show_error(STARTUP_FAILURE_MESSAGE);
            }
        }
    }

    /// Deactivation hook: interrupts pending work and stops the session in
    /// the background.
    #[must_use = "wait on the deactivation to know when shutdown completed"]
    pub fn deactivate(&self) -> Deactivation {
        self.manager.interrupt_pending();
        let manager = Arc::clone(&self.manager);
        let spawned = thread::Builder::new()
            .name(String::from("gdoc-deactivate"))
            .spawn(move || manager.stop());

        match spawned {
            Ok(handle) => Deactivation::Pending(handle),
            Err(spawn_error) => {
                warn!(target: EXTENSION_TARGET, error = %spawn_error, "stopping session inline");
                Deactivation::Done(self.manager.stop())
            }
        }
    }
}

/// Completion signal returned by [`Extension::deactivate`].
#[derive(Debug)]
pub enum Deactivation {
    /// Shutdown is running on a background thread.
    Pending(JoinHandle<Result<(), ShutdownError>>),
    /// Shutdown already finished.
    Done(Result<(), ShutdownError>),
}

impl Deactivation {
    /// Returns true when shutdown has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        match self {
            Self::Pending(handle) => handle.is_finished(),
            Self::Done(_) => true,
        }
    }

    /// Blocks until shutdown finished.
    ///
    /// # Errors
    ///
    /// Returns the [`ShutdownError`] reported by the session.
    pub fn wait(self) -> Result<(), ShutdownError> {
        match self {
            Self::Pending(handle) => match handle.join() {
                Ok(result) => result,
                Err(payload) => std::panic::resume_unwind(payload),
            },
            Self::Done(result) => result,
        }
    }
}
