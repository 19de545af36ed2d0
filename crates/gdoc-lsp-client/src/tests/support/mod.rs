//! In-process language servers and recording collaborators for tests.

mod world;

use std::io::{self, PipeReader, PipeWriter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use mockall::mock;
use serde_json::{Value, json};

use crate::errors::StartupError;
use crate::extension::Notifier;
use crate::jsonrpc::{JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcResponse};
use crate::launch::{ServerExit, ServerProcess, SpawnedServer, Spawner};
use crate::session_config::SessionConfig;
use crate::sync::lock;
use crate::transport::{MessageReader, MessageWriter};

pub use world::{TestWorld, quick_options};

mock! {
    pub Notifier {}
    impl Notifier for Notifier {
        fn show_error(&self, message: &str);
    }
}

/// How the fake server behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerScript {
    /// Answers the handshakes and exits on `exit`.
    Healthy,
    /// Answers `initialize` with an error.
    RejectInitialize,
    /// Reads messages but never answers.
    Silent,
    /// Answers requests but stays alive until killed.
    IgnoreExit,
}

/// Observations shared between a fake spawner and its processes.
#[derive(Debug, Default)]
pub struct ServerRecord {
    /// Launch attempts.
    pub spawns: usize,
    /// Kill calls across all processes.
    pub kills: usize,
    /// Processes that have neither exited nor been killed.
    pub live: usize,
    /// Every method received, in arrival order.
    pub methods: Vec<String>,
}

/// Launches in-process fake servers over OS pipes.
#[derive(Debug, Clone)]
pub struct FakeSpawner {
    script: ServerScript,
    missing: bool,
    record: Arc<Mutex<ServerRecord>>,
}

impl FakeSpawner {
    pub fn new(script: ServerScript) -> Self {
        Self {
            script,
            missing: false,
            record: Arc::default(),
        }
    }

    /// A spawner whose executable does not exist.
    pub fn missing_executable() -> Self {
        Self {
            missing: true,
            ..Self::new(ServerScript::Healthy)
        }
    }

    pub fn spawns(&self) -> usize {
        lock(&self.record).spawns
    }

    pub fn kills(&self) -> usize {
        lock(&self.record).kills
    }

    pub fn live(&self) -> usize {
        lock(&self.record).live
    }

    pub fn methods(&self) -> Vec<String> {
        lock(&self.record).methods.clone()
    }

    /// Number of received messages with the given method.
    pub fn received(&self, method: &str) -> usize {
        lock(&self.record)
            .methods
            .iter()
            .filter(|received| *received == method)
            .count()
    }

    /// Received `textDocument/*` methods in arrival order.
    pub fn document_methods(&self) -> Vec<String> {
        self.methods()
            .into_iter()
            .filter(|method| method.starts_with("textDocument/"))
            .collect()
    }
}

impl Spawner for FakeSpawner {
    fn spawn(&self, config: &SessionConfig) -> Result<SpawnedServer, StartupError> {
        let command = config.executable_path().as_str();
        if self.missing {
            return Err(StartupError::from_spawn(
                command,
                io::Error::from(io::ErrorKind::NotFound),
            ));
        }
        let (client_rx, server_tx) = io::pipe().map_err(|error| StartupError::from_spawn(command, error))?;
        let (server_rx, client_tx) = io::pipe().map_err(|error| StartupError::from_spawn(command, error))?;

        let exited = Arc::new(AtomicBool::new(false));
        {
            let mut record = lock(&self.record);
            record.spawns += 1;
            record.live += 1;
        }

        let fake = FakeServer {
            script: self.script,
            exited: Arc::clone(&exited),
            record: Arc::clone(&self.record),
        };
        thread::spawn(move || fake.serve(server_rx, server_tx));

        Ok(SpawnedServer {
            process: Box::new(FakeProcess {
                exited,
                record: Arc::clone(&self.record),
            }),
            stdin: Box::new(client_tx),
            stdout: Box::new(client_rx),
        })
    }
}

fn mark_exited(exited: &AtomicBool, record: &Mutex<ServerRecord>) {
    if !exited.swap(true, Ordering::SeqCst) {
        lock(record).live -= 1;
    }
}

struct FakeProcess {
    exited: Arc<AtomicBool>,
    record: Arc<Mutex<ServerRecord>>,
}

impl ServerProcess for FakeProcess {
    fn id(&self) -> Option<u32> {
        None
    }

    fn try_wait(&mut self) -> io::Result<Option<ServerExit>> {
        Ok(self
            .exited
            .load(Ordering::SeqCst)
            .then_some(ServerExit { code: Some(0) }))
    }

    fn kill(&mut self) -> io::Result<()> {
        lock(&self.record).kills += 1;
        mark_exited(&self.exited, &self.record);
        Ok(())
    }

    fn wait(&mut self) -> io::Result<ServerExit> {
        Ok(ServerExit { code: None })
    }
}

struct FakeServer {
    script: ServerScript,
    exited: Arc<AtomicBool>,
    record: Arc<Mutex<ServerRecord>>,
}

impl FakeServer {
    fn serve(self, input: PipeReader, output: PipeWriter) {
        let mut reader = MessageReader::new(input);
        let mut writer = MessageWriter::new(output);

        while let Ok(Some(frame)) = reader.receive() {
            let Ok(message) = JsonRpcMessage::from_bytes(&frame) else {
                continue;
            };
            if let Some(method) = message.method() {
                lock(&self.record).methods.push(method.to_owned());
            }
            let reply = match message {
                JsonRpcMessage::Request(request) => self.answer(request.id, &request.method),
                JsonRpcMessage::Notification(notification) => {
                    if notification.method == "exit" {
                        if self.script == ServerScript::IgnoreExit {
                            continue;
                        }
                        mark_exited(&self.exited, &self.record);
                        return;
                    }
                    self.echo(notification)
                }
                JsonRpcMessage::Response(_) => None,
            };
            let Some(reply) = reply else { continue };
            if writer.send(&reply).is_err() {
                break;
            }
        }

        if self.script == ServerScript::Healthy {
            mark_exited(&self.exited, &self.record);
        }
    }

    fn answer(&self, id: crate::jsonrpc::RequestId, method: &str) -> Option<Vec<u8>> {
        let response = match (self.script, method) {
            (ServerScript::Silent, _) => return None,
            (ServerScript::RejectInitialize, "initialize") => JsonRpcResponse::failure(
                id,
                JsonRpcError::new(JsonRpcError::INTERNAL_ERROR, "initialization refused"),
            ),
            (_, "initialize") => JsonRpcResponse::success(
                id,
                json!({ "capabilities": {}, "serverInfo": { "name": "fake-gdoc" } }),
            ),
            (_, "shutdown") => JsonRpcResponse::success(id, Value::Null),
            (_, "gdoc/ping") => JsonRpcResponse::success(id, json!("pong")),
            _ => JsonRpcResponse::failure(
                id,
                JsonRpcError::new(JsonRpcError::METHOD_NOT_FOUND, method.to_owned()),
            ),
        };
        serde_json::to_vec(&response).ok()
    }

    fn echo(&self, notification: JsonRpcNotification) -> Option<Vec<u8>> {
        if self.script == ServerScript::Silent {
            return None;
        }
        let echo = JsonRpcNotification::new(
            "gdoc/echo",
            Some(json!({ "method": notification.method })),
        );
        serde_json::to_vec(&echo).ok()
    }
}

/// Notifier that keeps every message for later inspection.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    messages: Arc<Mutex<Vec<String>>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        lock(&self.messages).clone()
    }
}

impl Notifier for RecordingNotifier {
    fn show_error(&self, message: &str) {
        lock(&self.messages).push(message.to_owned());
    }
}
