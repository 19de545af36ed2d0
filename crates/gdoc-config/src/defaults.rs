use crate::logging::{LogFormat, ServerLogLevel};

/// Default log filter expression used by the host binary.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Document kind served by the language server out of the box.
pub const DEFAULT_DOCUMENT_KIND: &str = "gdoc";

/// Upper bound on the `initialize` handshake, in milliseconds.
pub const DEFAULT_STARTUP_TIMEOUT_MS: u64 = 10_000;

/// Grace period granted to the server between `exit` and a forced kill.
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 2_000;

/// Number of messages buffered in each direction of the protocol channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// How long the host keeps collecting server output after routing documents.
pub const DEFAULT_LINGER_MS: u64 = 500;

/// Default log filter expression used by the host binary.
#[must_use]
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the host binary.
#[must_use]
pub fn default_log_format() -> LogFormat {
    LogFormat::Compact
}

/// Default verbosity requested from the language server.
#[must_use]
pub fn default_server_log_level() -> ServerLogLevel {
    ServerLogLevel::Warning
}

/// Document kinds routed to the language server when none are configured.
#[must_use]
pub fn default_document_kinds() -> Vec<String> {
    vec![DEFAULT_DOCUMENT_KIND.to_owned()]
}
