//! BDD world wrapping an extension driven by a fake server.

use std::time::Duration;

use camino::Utf8PathBuf;
use gdoc_config::Config;
use url::Url;

use super::{FakeSpawner, RecordingNotifier, ServerScript};
use crate::document::{DocumentEvent, Routing, TextDocument};
use crate::errors::{ChannelError, ShutdownError};
use crate::extension::{ActivationContext, Extension};
use crate::manager::{SessionManager, SessionState};
use crate::session::SessionOptions;

/// Options small enough to keep failing scenarios fast.
pub fn quick_options() -> SessionOptions {
    SessionOptions {
        startup_timeout: Duration::from_millis(500),
        shutdown_grace: Duration::from_millis(500),
        channel_capacity: 8,
    }
}

/// Shared state exercised by BDD step implementations.
pub struct TestWorld {
    pub spawner: FakeSpawner,
    pub notifier: RecordingNotifier,
    pub extension: Extension<FakeSpawner, RecordingNotifier>,
    pub routings: Vec<Result<Routing, ChannelError>>,
    pub stops: Vec<Result<(), ShutdownError>>,
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::with_spawner(FakeSpawner::new(ServerScript::Healthy))
    }
}

impl TestWorld {
    pub fn with_spawner(spawner: FakeSpawner) -> Self {
        let notifier = RecordingNotifier::default();
        let manager = SessionManager::with_spawner(spawner.clone(), quick_options());
        Self {
            extension: Extension::with_parts(manager, notifier.clone()),
            spawner,
            notifier,
            routings: Vec::new(),
            stops: Vec::new(),
        }
    }

    pub fn activate(&self, document_kinds: &[&str]) {
        let config = Config {
            document_kinds: document_kinds.iter().map(|kind| (*kind).to_owned()).collect(),
            ..Config::default()
        };
        self.extension.activate(&ActivationContext {
            installation_root: Utf8PathBuf::from("/opt/gdoc"),
            config,
        });
    }

    pub fn deactivate(&mut self) {
        let outcome = self.extension.deactivate().wait();
        self.stops.push(outcome);
    }

    pub fn stop_again(&mut self) {
        let outcome = self.extension.manager().stop();
        self.stops.push(outcome);
    }

    pub fn state(&self) -> SessionState {
        self.extension.manager().state()
    }

    pub fn send(&mut self, event: &DocumentEvent) {
        let routing = self.extension.manager().forward(event);
        self.routings.push(routing);
    }

    pub fn open(&mut self, path: &str, language: &str) -> Url {
        let uri = Url::parse(&format!("file://{path}")).unwrap_or_else(|error| panic!("bad test path {path}: {error}"));
        self.send(&DocumentEvent::Opened(TextDocument::new(uri.clone(), language, 1, "= Title")));
        uri
    }

    /// Polls until the fake server has recorded `count` document methods.
    pub fn await_document_methods(&self, count: usize) -> Vec<String> {
        for _ in 0..100 {
            let methods = self.spawner.document_methods();
            if methods.len() >= count {
                return methods;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        self.spawner.document_methods()
    }
}
