//! Launching the language server process.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::process::{Child, ChildStderr, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread;

use tracing::{debug, warn};

use crate::errors::StartupError;
use crate::session_config::SessionConfig;

/// Log target for process operations.
pub(crate) const PROCESS_TARGET: &str = "gdoc_lsp_client::process";

/// How a server process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerExit {
    /// Exit code, absent when the process was ended by a signal.
    pub code: Option<i32>,
}

impl ServerExit {
    /// Returns true for a zero exit code.
    #[must_use]
    pub fn success(self) -> bool {
        self.code == Some(0)
    }
}

impl From<ExitStatus> for ServerExit {
    fn from(status: ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }
}

/// Control surface over a launched server process.
pub trait ServerProcess: Send {
    /// Operating-system identifier, when known.
    fn id(&self) -> Option<u32>;

    /// Reports the exit status without blocking.
    ///
    /// # Errors
    ///
    /// Returns the I/O error raised while querying the process.
    fn try_wait(&mut self) -> io::Result<Option<ServerExit>>;

    /// Forcibly terminates the process.
    ///
    /// # Errors
    ///
    /// Returns the I/O error raised while signalling the process.
    fn kill(&mut self) -> io::Result<()>;

    /// Blocks until the process exits.
    ///
    /// # Errors
    ///
    /// Returns the I/O error raised while waiting.
    fn wait(&mut self) -> io::Result<ServerExit>;
}

impl ServerProcess for Child {
    fn id(&self) -> Option<u32> {
        Some(Child::id(self))
    }

    fn try_wait(&mut self) -> io::Result<Option<ServerExit>> {
        Ok(Child::try_wait(self)?.map(ServerExit::from))
    }

    fn kill(&mut self) -> io::Result<()> {
        Child::kill(self)
    }

    fn wait(&mut self) -> io::Result<ServerExit> {
        Child::wait(self).map(ServerExit::from)
    }
}

/// A launched server with its stdio streams detached from the process.
pub struct SpawnedServer {
    /// Process control handle.
    pub process: Box<dyn ServerProcess>,
    /// Server stdin.
    pub stdin: Box<dyn Write + Send>,
    /// Server stdout.
    pub stdout: Box<dyn Read + Send>,
}

impl std::fmt::Debug for SpawnedServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpawnedServer")
            .field("pid", &self.process.id())
            .finish_non_exhaustive()
    }
}

/// Launches a server for a session configuration.
pub trait Spawner: Send + Sync {
    /// Makes exactly one launch attempt.
    ///
    /// # Errors
    ///
    /// Returns [`StartupError::ExecutableNotFound`] or
    /// [`StartupError::SpawnFailed`] when the process cannot be started.
    fn spawn(&self, config: &SessionConfig) -> Result<SpawnedServer, StartupError>;
}

/// Spawns real processes through [`std::process::Command`].
///
/// The server's stderr is read on a background thread and re-emitted as
/// `debug` records.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessSpawner;

impl Spawner for ProcessSpawner {
    fn spawn(&self, config: &SessionConfig) -> Result<SpawnedServer, StartupError> {
        let executable = config.executable_path();
        debug!(
            target: PROCESS_TARGET,
            command = %executable,
            args = ?config.arguments(),
            "spawning language server process"
        );

        let mut child = Command::new(executable.as_std_path())
            .args(config.arguments())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|error| StartupError::from_spawn(executable.as_str(), error))?;

        let streams = (child.stdin.take(), child.stdout.take());
        let (Some(stdin), Some(stdout)) = streams else {
            discard(&mut child);
            return Err(StartupError::SpawnFailed {
                message: String::from("failed to capture server stdio"),
                source: Arc::new(io::Error::other("stdio not piped")),
            });
        };
        if let Some(stderr) = child.stderr.take() {
            forward_stderr(stderr);
        }

        debug!(target: PROCESS_TARGET, pid = child.id(), "language server process spawned");

        Ok(SpawnedServer {
            process: Box::new(child),
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
        })
    }
}

fn discard(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn forward_stderr(stderr: ChildStderr) {
    let spawned = thread::Builder::new()
        .name(String::from("gdoc-lsp-stderr"))
        .spawn(move || {
            for line in BufReader::new(stderr).lines() {
                match line {
                    Ok(line) => debug!(target: PROCESS_TARGET, line = %line, "server stderr"),
                    Err(_) => break,
                }
            }
        });
    if let Err(error) = spawned {
        warn!(target: PROCESS_TARGET, %error, "failed to forward server stderr");
    }
}
