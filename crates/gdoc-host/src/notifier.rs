use std::sync::{Arc, Mutex, PoisonError};

use gdoc_lsp_client::Notifier;
use tracing::error;

/// Notifier that holds messages until the host prints them.
///
/// Clones share one queue, so the host keeps a clone while the extension
/// owns the other.
#[derive(Debug, Clone, Default)]
pub struct QueuedNotifier {
    messages: Arc<Mutex<Vec<String>>>,
}

impl QueuedNotifier {
    /// Removes and returns the queued messages in the order they were shown.
    #[must_use]
    pub fn drain(&self) -> Vec<String> {
        let mut messages = self
            .messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *messages)
    }
}

impl Notifier for QueuedNotifier {
    fn show_error(&self, message: &str) {
        error!(target: "gdoc_host", message, "user notification");
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.to_owned());
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn clones_share_one_queue() {
        let notifier = QueuedNotifier::default();
        let owned_by_extension = notifier.clone();

        owned_by_extension.show_error("first");
        owned_by_extension.show_error("second");

        assert_eq!(notifier.drain(), ["first", "second"]);
        assert!(notifier.drain().is_empty());
    }
}
