//! Session lifecycle against a real server process.
//!
//! The stub server binary is installed as `<root>/bin/gdoc` inside a
//! temporary installation root so the builder's default layout is exercised
//! end to end.

use std::fs;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use gdoc_config::{Config, LogFileMode, ServerLogLevel};
use gdoc_lsp_client::{
    ActivationContext, ActivationScope, ChannelError, DocumentEvent, Extension, LoggingProfile,
    Routing, ServerMessage, SessionConfig, SessionConfigBuilder, SessionManager, SessionOptions,
    SessionState, ShutdownError, StartupError, TextDocument,
};
use rstest::{fixture, rstest};
use serde_json::Value;
use tempfile::TempDir;
use url::Url;

const STUB: &str = env!("CARGO_BIN_EXE_gdoc-stub-server");

struct Installation {
    _dir: TempDir,
    root: Utf8PathBuf,
}

impl Installation {
    fn builder(&self) -> SessionConfigBuilder {
        SessionConfigBuilder::new(self.root.clone())
    }
}

#[fixture]
fn installation() -> Installation {
    let dir = TempDir::new().expect("temporary directory");
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("UTF-8 temp path");
    fs::create_dir_all(root.join("bin")).expect("create bin directory");
    fs::copy(STUB, root.join("bin/gdoc")).expect("install stub server");
    Installation { _dir: dir, root }
}

fn options() -> SessionOptions {
    SessionOptions {
        startup_timeout: Duration::from_secs(10),
        shutdown_grace: Duration::from_secs(2),
        channel_capacity: 16,
    }
}

fn with_extra_argument(config: &SessionConfig, argument: &str) -> SessionConfig {
    let mut arguments = config.arguments().to_vec();
    arguments.push(argument.to_owned());
    SessionConfig::new(
        config.executable_path(),
        arguments,
        config.activation_scope().clone(),
    )
}

fn document(root: &Utf8Path, name: &str, language: &str) -> TextDocument {
    let uri = Url::from_file_path(root.join(name)).expect("absolute document path");
    TextDocument::new(uri, language, 1, "= Title")
}

/// Collects `method` values of `gdoc/echo` notifications until `count`
/// arrive or the deadline passes.
fn echoed_methods(manager: &SessionManager, count: usize) -> Vec<String> {
    let mut methods = Vec::new();
    let deadline = Instant::now() + Duration::from_secs(5);
    while methods.len() < count && Instant::now() < deadline {
        let Some(ServerMessage::Notification(notification)) =
            manager.next_incoming(Duration::from_millis(50))
        else {
            continue;
        };
        if notification.method != "gdoc/echo" {
            continue;
        }
        let method = notification
            .params
            .as_ref()
            .and_then(|params| params.get("method"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        if method.starts_with("textDocument/") {
            methods.push(method.to_owned());
        }
    }
    methods
}

#[cfg(target_os = "linux")]
fn process_exists(pid: u32) -> bool {
    Utf8Path::new("/proc").join(pid.to_string()).exists()
}

#[rstest]
fn start_then_stop_leaves_no_process(installation: Installation) {
    let manager = SessionManager::new(options());

    let info = manager
        .start(&installation.builder().build())
        .expect("stub server should start");
    assert_eq!(manager.state(), SessionState::Running);
    assert_eq!(info.server_name.as_deref(), Some("gdoc-stub-server"));

    manager.stop().expect("graceful stop");

    assert_eq!(manager.state(), SessionState::Stopped);
    #[cfg(target_os = "linux")]
    {
        let pid = info.pid.expect("real process has a pid");
        assert!(!process_exists(pid), "server process {pid} still exists");
    }
}

#[rstest]
fn second_stop_is_a_no_op(installation: Installation) {
    let manager = SessionManager::new(options());
    manager
        .start(&installation.builder().build())
        .expect("stub server should start");

    manager.stop().expect("first stop");
    let started = Instant::now();
    manager.stop().expect("second stop");

    assert!(started.elapsed() < Duration::from_millis(100));
    assert_eq!(manager.state(), SessionState::Stopped);
}

#[rstest]
fn server_receives_builder_arguments(installation: Installation) {
    let profile = LoggingProfile {
        level: ServerLogLevel::Info,
        filemode: Some(LogFileMode::Append),
        timestamp: true,
        scope: vec![String::from("gdoc.lsp")],
        filename: None,
    };
    let config = installation.builder().logging(profile).build();
    let manager = SessionManager::new(options());
    manager.start(&config).expect("stub server should start");

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut reported = None;
    while reported.is_none() && Instant::now() < deadline {
        if let Some(ServerMessage::Notification(notification)) =
            manager.next_incoming(Duration::from_millis(50))
            && notification.method == "gdoc/arguments"
        {
            reported = notification.params;
        }
    }
    manager.stop().expect("graceful stop");

    let report = reported.expect("stub should report its arguments");
    let arguments: Vec<String> =
        serde_json::from_value(report["arguments"].clone()).expect("argument list");
    assert_eq!(arguments, config.arguments());
}

#[rstest]
fn in_scope_events_are_forwarded_in_order(installation: Installation) {
    let manager = SessionManager::new(options());
    manager
        .start(&installation.builder().build())
        .expect("stub server should start");
    let doc = document(&installation.root, "index.gdoc", "gdoc");

    let events = [
        DocumentEvent::Opened(doc.clone()),
        DocumentEvent::Changed {
            uri: doc.uri.clone(),
            version: 2,
            text: String::from("= Title\n\nBody"),
        },
        DocumentEvent::Saved {
            uri: doc.uri.clone(),
            text: None,
        },
        DocumentEvent::Closed {
            uri: doc.uri.clone(),
        },
    ];
    for event in &events {
        assert_eq!(manager.forward(event).expect("forward"), Routing::Forwarded);
    }

    let echoed = echoed_methods(&manager, 4);
    manager.stop().expect("graceful stop");

    assert_eq!(
        echoed,
        [
            "textDocument/didOpen",
            "textDocument/didChange",
            "textDocument/didSave",
            "textDocument/didClose",
        ]
    );
}

#[rstest]
fn out_of_scope_documents_produce_no_traffic(installation: Installation) {
    let manager = SessionManager::new(options());
    manager
        .start(&installation.builder().build())
        .expect("stub server should start");
    let markdown = document(&installation.root, "README.md", "markdown");

    let routing = manager
        .forward(&DocumentEvent::Opened(markdown))
        .expect("forward");
    // A request after the ignored event proves the server has drained its
    // input before the echoes are inspected.
    manager
        .request("shutdown", None)
        .expect("request")
        .wait(Duration::from_secs(5), &Default::default())
        .expect("shutdown response");
    let echoed: Vec<ServerMessage> = manager.take_incoming();
    manager.stop().expect("stop");

    assert_eq!(routing, Routing::Ignored);
    assert!(
        echoed
            .iter()
            .filter_map(|message| match message {
                ServerMessage::Notification(notification) => notification.params.as_ref(),
                ServerMessage::Request(_) => None,
            })
            .all(|params| !params["method"].as_str().unwrap_or_default().starts_with("textDocument/")),
        "unexpected document traffic: {echoed:?}"
    );
}

#[rstest]
fn extended_scope_routes_markdown(installation: Installation) {
    let config = installation
        .builder()
        .activation_scope(ActivationScope::from_kinds(["gdoc", "markdown"]))
        .build();
    let manager = SessionManager::new(options());
    manager.start(&config).expect("stub server should start");

    let routing = manager
        .forward(&DocumentEvent::Opened(document(&installation.root, "README.md", "markdown")))
        .expect("forward");
    let echoed = echoed_methods(&manager, 1);
    manager.stop().expect("graceful stop");

    assert_eq!(routing, Routing::Forwarded);
    assert_eq!(echoed, ["textDocument/didOpen"]);
}

#[rstest]
fn nonexistent_installation_fails_to_start() {
    let manager = SessionManager::new(options());
    let config = SessionConfigBuilder::new("/nonexistent/gdoc-installation").build();

    let result = manager.start(&config);

    assert!(matches!(result, Err(StartupError::ExecutableNotFound { .. })));
    assert_ne!(manager.state(), SessionState::Running);
    manager.stop().expect("stop after failed start");
}

#[rstest]
fn rejected_initialize_is_a_handshake_failure(installation: Installation) {
    let config = with_extra_argument(&installation.builder().build(), "--fail-initialize");
    let manager = SessionManager::new(options());

    let result = manager.start(&config);

    assert!(matches!(
        result,
        Err(StartupError::Handshake {
            source: ChannelError::Server { .. }
        })
    ));
    assert_eq!(manager.state(), SessionState::Uninitialized);
}

#[rstest]
fn server_ignoring_exit_is_killed_after_grace(installation: Installation) {
    let config = with_extra_argument(&installation.builder().build(), "--ignore-exit");
    let manager = SessionManager::new(SessionOptions {
        shutdown_grace: Duration::from_millis(300),
        ..options()
    });
    let info = manager.start(&config).expect("stub server should start");

    let started = Instant::now();
    let result = manager.stop();

    assert!(matches!(result, Err(ShutdownError::Killed { grace_ms: 300 })));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(manager.state(), SessionState::Stopped);
    #[cfg(target_os = "linux")]
    {
        let pid = info.pid.expect("real process has a pid");
        assert!(!process_exists(pid), "server process {pid} still exists");
    }
    #[cfg(not(target_os = "linux"))]
    let _ = info;
}

#[rstest]
fn extension_hooks_drive_a_real_session(installation: Installation) {
    let extension = Extension::new(options());

    extension.activate(&ActivationContext {
        installation_root: installation.root.clone(),
        config: Config::default(),
    });
    assert_eq!(extension.manager().state(), SessionState::Running);

    extension
        .deactivate()
        .wait()
        .expect("deactivation should stop the server");
    assert_eq!(extension.manager().state(), SessionState::Stopped);
}
