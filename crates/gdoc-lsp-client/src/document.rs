//! Host document events and their routing into protocol notifications.

use std::collections::HashSet;
use std::str::FromStr;

use lsp_types::notification::{
    DidChangeTextDocument, DidCloseTextDocument, DidOpenTextDocument, DidSaveTextDocument,
    Notification,
};
use lsp_types::{
    DidChangeTextDocumentParams, DidCloseTextDocumentParams, DidOpenTextDocumentParams,
    DidSaveTextDocumentParams, TextDocumentContentChangeEvent, TextDocumentIdentifier,
    TextDocumentItem, Uri, VersionedTextDocumentIdentifier,
};
use serde::Serialize;
use url::Url;

use crate::errors::ChannelError;
use crate::jsonrpc::JsonRpcNotification;
use crate::selector::ActivationScope;

/// A document as the host editor sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextDocument {
    /// Location of the document.
    pub uri: Url,
    /// Language identifier assigned by the host.
    pub language_id: String,
    /// Monotonic version supplied by the host.
    pub version: i32,
    /// Full text content.
    pub text: String,
}

impl TextDocument {
    /// Creates a document descriptor.
    #[must_use]
    pub fn new(uri: Url, language_id: impl Into<String>, version: i32, text: impl Into<String>) -> Self {
        Self {
            uri,
            language_id: language_id.into(),
            version,
            text: text.into(),
        }
    }
}

/// Document lifecycle events reported by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentEvent {
    /// The host opened a document.
    Opened(TextDocument),
    /// The full content of an open document changed.
    Changed {
        /// Document location.
        uri: Url,
        /// New version.
        version: i32,
        /// New full text.
        text: String,
    },
    /// The document was saved.
    Saved {
        /// Document location.
        uri: Url,
        /// Saved content, when the host includes it.
        text: Option<String>,
    },
    /// The host closed the document.
    Closed {
        /// Document location.
        uri: Url,
    },
}

impl DocumentEvent {
    /// Location of the document the event refers to.
    #[must_use]
    pub fn uri(&self) -> &Url {
        match self {
            Self::Opened(document) => &document.uri,
            Self::Changed { uri, .. } | Self::Saved { uri, .. } | Self::Closed { uri } => uri,
        }
    }
}

/// Outcome of handing a document event to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routing {
    /// The event was sent to the server.
    Forwarded,
    /// The document is outside the activation scope; nothing was sent.
    Ignored,
}

/// Tracks which documents are attached to the session.
///
/// A document attaches when it is opened with a matching scheme and language
/// id and detaches when it is closed. Only attached documents generate
/// traffic.
#[derive(Debug, Clone)]
pub(crate) struct DocumentRouter {
    scope: ActivationScope,
    attached: HashSet<Url>,
}

impl DocumentRouter {
    pub(crate) fn new(scope: ActivationScope) -> Self {
        Self {
            scope,
            attached: HashSet::new(),
        }
    }

    /// Maps an event to the notification it produces, if any.
    ///
    /// Attachment changes only once the notification has been built, so a
    /// rejected event leaves the router untouched.
    pub(crate) fn route(
        &mut self,
        event: &DocumentEvent,
    ) -> Result<Option<JsonRpcNotification>, ChannelError> {
        match event {
            DocumentEvent::Opened(document) => {
                if !self.scope.matches(&document.uri, &document.language_id) {
                    return Ok(None);
                }
                let params = DidOpenTextDocumentParams {
                    text_document: TextDocumentItem::new(
                        protocol_uri(&document.uri)?,
                        document.language_id.clone(),
                        document.version,
                        document.text.clone(),
                    ),
                };
                let sent = notification::<DidOpenTextDocument>(&params)?;
                self.attached.insert(document.uri.clone());
                Ok(Some(sent))
            }
            DocumentEvent::Changed { uri, version, text } => {
                if !self.attached.contains(uri) {
                    return Ok(None);
                }
                let params = DidChangeTextDocumentParams {
                    text_document: VersionedTextDocumentIdentifier::new(protocol_uri(uri)?, *version),
                    content_changes: vec![TextDocumentContentChangeEvent {
                        range: None,
                        range_length: None,
                        text: text.clone(),
                    }],
                };
                notification::<DidChangeTextDocument>(&params).map(Some)
            }
            DocumentEvent::Saved { uri, text } => {
                if !self.attached.contains(uri) {
                    return Ok(None);
                }
                let params = DidSaveTextDocumentParams {
                    text_document: TextDocumentIdentifier::new(protocol_uri(uri)?),
                    text: text.clone(),
                };
                notification::<DidSaveTextDocument>(&params).map(Some)
            }
            DocumentEvent::Closed { uri } => {
                if !self.attached.contains(uri) {
                    return Ok(None);
                }
                let params = DidCloseTextDocumentParams {
                    text_document: TextDocumentIdentifier::new(protocol_uri(uri)?),
                };
                let sent = notification::<DidCloseTextDocument>(&params)?;
                self.attached.remove(uri);
                Ok(Some(sent))
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn is_attached(&self, uri: &Url) -> bool {
        self.attached.contains(uri)
    }
}

fn protocol_uri(uri: &Url) -> Result<Uri, ChannelError> {
    Uri::from_str(uri.as_str()).map_err(|_| ChannelError::InvalidUri {
        uri: uri.to_string(),
    })
}

fn notification<N>(params: &N::Params) -> Result<JsonRpcNotification, ChannelError>
where
    N: Notification,
    N::Params: Serialize,
{
    let value = serde_json::to_value(params)?;
    Ok(JsonRpcNotification::new(N::METHOD, Some(value)))
}
