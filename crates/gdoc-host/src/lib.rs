//! Minimal command-line editor host for the gdoc language session.
//!
//! `gdoc-host [config flags] <documents...>` activates the extension, opens
//! each document, prints every server message as a JSON line on stdout for
//! the configured linger window, then closes the documents and deactivates.
//! Server requests are answered with `null`. The process exits with status
//! 1 when the language server could not be started.

mod config;
pub mod documents;
mod errors;
mod notifier;
pub mod telemetry;

use std::ffi::OsString;
use std::io::Write;
use std::path::Path;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use gdoc_lsp_client::{
    ActivationContext, DocumentEvent, Extension, STARTUP_FAILURE_MESSAGE, ServerMessage,
    SessionManager, SessionOptions, SessionState, TextDocument,
};
use serde_json::Value;
use tracing::{info, warn};

use crate::config::{ConfigLoader, OrthoConfigLoader, split_config_arguments};

pub use errors::AppError;
pub use notifier::QueuedNotifier;

const HOST_TARGET: &str = "gdoc_host";

type HostExtension = Extension<gdoc_lsp_client::ProcessSpawner, QueuedNotifier>;

/// Runs the host with the given arguments and output streams.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    run_with_loader(args, stdout, stderr, &OrthoConfigLoader)
}

pub(crate) fn run_with_loader<I, W, E, L>(
    args: I,
    stdout: &mut W,
    stderr: &mut E,
    loader: &L,
) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
    L: ConfigLoader,
{
    let arguments: Vec<OsString> = args.into_iter().collect();
    match execute(&arguments, stdout, loader) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            let _ = writeln!(stderr, "{error}");
            ExitCode::FAILURE
        }
    }
}

fn execute<W, L>(args: &[OsString], stdout: &mut W, loader: &L) -> Result<(), AppError>
where
    W: Write,
    L: ConfigLoader,
{
    let split = split_config_arguments(args);
    let config = loader.load(&split.config_arguments)?;
    let _telemetry = telemetry::initialise(&config)?;

    let documents = args
        .iter()
        .skip(split.documents_start)
        .map(|path| documents::load(Path::new(path)))
        .collect::<Result<Vec<_>, _>>()?;
    let installation_root = match config.installation_root() {
        Some(root) => root.to_path_buf(),
        None => {
            let executable = std::env::current_exe().map_err(AppError::LocateExecutable)?;
            installation_root_for(&executable)?
        }
    };

    let notifier = QueuedNotifier::default();
    let extension = Extension::with_parts(
        SessionManager::new(SessionOptions::from_config(&config)),
        notifier.clone(),
    );
    extension.activate(&ActivationContext {
        installation_root,
        config: config.clone(),
    });

    let result = if extension.manager().state() == SessionState::Running {
        drive(extension.manager(), &documents, config.linger(), stdout)
    } else {
        let shown = notifier.drain();
        Err(AppError::SessionNotStarted {
            message: if shown.is_empty() {
                STARTUP_FAILURE_MESSAGE.to_owned()
            } else {
                shown.join("\n")
            },
        })
    };
    finish(&extension);
    result
}

/// Derives `<root>` from an executable installed as `<root>/bin/<name>`.
///
/// # Errors
///
/// Returns [`AppError::InstallationRoot`] when the path is too shallow or
/// not UTF-8.
pub fn installation_root_for(executable: &Path) -> Result<Utf8PathBuf, AppError> {
    let invalid = || AppError::InstallationRoot {
        path: executable.to_path_buf(),
    };
    let root = executable
        .parent()
        .and_then(Path::parent)
        .filter(|root| !root.as_os_str().is_empty())
        .ok_or_else(invalid)?;
    Utf8PathBuf::from_path_buf(root.to_path_buf()).map_err(|_| invalid())
}

fn drive<W: Write>(
    manager: &SessionManager,
    documents: &[TextDocument],
    linger: Duration,
    stdout: &mut W,
) -> Result<(), AppError> {
    for document in documents {
        match manager.forward(&DocumentEvent::Opened(document.clone())) {
            Ok(routing) => info!(
                target: HOST_TARGET,
                uri = %document.uri,
                language = %document.language_id,
                ?routing,
                "document opened"
            ),
            Err(error) => warn!(target: HOST_TARGET, uri = %document.uri, %error, "open not delivered"),
        }
    }

    let relayed = relay(manager, linger, stdout);

    for document in documents {
        let closed = DocumentEvent::Closed {
            uri: document.uri.clone(),
        };
        if let Err(error) = manager.forward(&closed) {
            warn!(target: HOST_TARGET, uri = %document.uri, %error, "close not delivered");
        }
    }
    relayed
}

fn relay<W: Write>(
    manager: &SessionManager,
    linger: Duration,
    stdout: &mut W,
) -> Result<(), AppError> {
    let deadline = Instant::now() + linger;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        let Some(message) = manager.next_incoming(remaining) else {
            if manager.state() == SessionState::Running {
                continue;
            }
            break;
        };
        if let ServerMessage::Request(request) = &message
            && let Err(error) = manager.respond(request.id.clone(), Value::Null)
        {
            warn!(target: HOST_TARGET, method = %request.method, %error, "reply not delivered");
        }
        write_message(stdout, &message)?;
    }
    stdout.flush().map_err(AppError::WriteOutput)
}

fn write_message<W: Write>(stdout: &mut W, message: &ServerMessage) -> Result<(), AppError> {
    serde_json::to_writer(&mut *stdout, message)?;
    writeln!(stdout).map_err(AppError::WriteOutput)
}

fn finish(extension: &HostExtension) {
    if let Err(error) = extension.deactivate().wait() {
        warn!(target: HOST_TARGET, %error, "language server did not shut down cleanly");
    }
}
