//! Minimal language server used to exercise real process lifecycles.
//!
//! Answers `initialize` and `shutdown`, exits on `exit`, and echoes every
//! other notification back as `gdoc/echo`. After `initialized` it reports its
//! command line as `gdoc/arguments`.
//!
//! Flags (any other argument is accepted and ignored):
//! - `--ignore-exit`: never exit on request; only a kill ends the process.
//! - `--fail-initialize`: answer `initialize` with an error.

use std::io::{self, Stdout};
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use gdoc_lsp_client::{
    JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    MessageReader, MessageWriter,
};
use serde_json::{Value, json};

struct Flags {
    ignore_exit: bool,
    fail_initialize: bool,
}

struct StubServer {
    flags: Flags,
    arguments: Vec<String>,
    writer: MessageWriter<Stdout>,
    shutdown_requested: bool,
}

impl StubServer {
    fn send(&mut self, message: &impl serde::Serialize) -> io::Result<()> {
        let payload = serde_json::to_vec(message).map_err(io::Error::other)?;
        self.writer.send(&payload).map_err(io::Error::other)
    }

    fn handle_request(&mut self, request: JsonRpcRequest) -> io::Result<()> {
        let response = match request.method.as_str() {
            "initialize" if self.flags.fail_initialize => JsonRpcResponse::failure(
                request.id,
                JsonRpcError::new(JsonRpcError::INTERNAL_ERROR, "initialization refused"),
            ),
            "initialize" => JsonRpcResponse::success(
                request.id,
                json!({
                    "capabilities": { "textDocumentSync": 1 },
                    "serverInfo": {
                        "name": "gdoc-stub-server",
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                }),
            ),
            "shutdown" => {
                self.shutdown_requested = true;
                JsonRpcResponse::success(request.id, Value::Null)
            }
            other => JsonRpcResponse::failure(
                request.id,
                JsonRpcError::new(JsonRpcError::METHOD_NOT_FOUND, format!("unknown method {other}")),
            ),
        };
        self.send(&response)
    }

    /// Returns an exit code once the server should stop.
    fn handle_notification(&mut self, notification: JsonRpcNotification) -> io::Result<Option<u8>> {
        if notification.method == "exit" {
            if self.flags.ignore_exit {
                return Ok(None);
            }
            return Ok(Some(self.exit_code()));
        }

        let initialized = notification.method == "initialized";
        let echo = JsonRpcNotification::new(
            "gdoc/echo",
            Some(json!({
                "method": notification.method,
                "params": notification.params,
            })),
        );
        self.send(&echo)?;
        if initialized {
            let arguments = JsonRpcNotification::new(
                "gdoc/arguments",
                Some(json!({ "arguments": self.arguments })),
            );
            self.send(&arguments)?;
        }
        Ok(None)
    }

    fn exit_code(&self) -> u8 {
        u8::from(!self.shutdown_requested)
    }
}

fn serve(server: &mut StubServer) -> io::Result<u8> {
    let mut reader = MessageReader::new(io::stdin());
    loop {
        let Some(frame) = reader.receive().map_err(io::Error::other)? else {
            return Ok(server.exit_code());
        };
        match JsonRpcMessage::from_bytes(&frame).map_err(io::Error::other)? {
            JsonRpcMessage::Request(request) => server.handle_request(request)?,
            JsonRpcMessage::Notification(notification) => {
                if let Some(code) = server.handle_notification(notification)? {
                    return Ok(code);
                }
            }
            JsonRpcMessage::Response(_) => {}
        }
    }
}

fn main() -> ExitCode {
    let arguments: Vec<String> = std::env::args().skip(1).collect();
    let flags = Flags {
        ignore_exit: arguments.iter().any(|arg| arg == "--ignore-exit"),
        fail_initialize: arguments.iter().any(|arg| arg == "--fail-initialize"),
    };
    let ignore_exit = flags.ignore_exit;
    eprintln!("gdoc-stub-server: started with {} arguments", arguments.len());
    let mut server = StubServer {
        flags,
        arguments,
        writer: MessageWriter::new(io::stdout()),
        shutdown_requested: false,
    };

    let outcome = serve(&mut server);
    if ignore_exit {
        loop {
            thread::sleep(Duration::from_secs(1));
        }
    }
    match outcome {
        Ok(code) => ExitCode::from(code),
        Err(error) => {
            eprintln!("gdoc-stub-server: {error}");
            ExitCode::FAILURE
        }
    }
}
