//! Duplex protocol channel over a server's stdio.
//!
//! Two threads service the channel. The writer drains a bounded outgoing
//! queue into the server's stdin; the reader parses frames from stdout,
//! routes responses to the callers waiting on them, and queues everything
//! else for the host. Both queues are bounded: a full outgoing queue blocks
//! senders and a full incoming queue blocks the reader until the host drains
//! it or the channel starts discarding server messages for shutdown.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::errors::ChannelError;
use crate::jsonrpc::{
    JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId,
};
use crate::sync::{lock, try_lock};
use crate::transport::{MessageReader, MessageWriter};

/// Log target for channel operations.
pub(crate) const CHANNEL_TARGET: &str = "gdoc_lsp_client::channel";

/// How often blocking waits re-check their interrupt flag.
const WAIT_SLICE: Duration = Duration::from_millis(20);

/// How long `shutdown` waits for each service thread before detaching it.
const THREAD_JOIN_BUDGET: Duration = Duration::from_millis(500);

type ResponseSlot = SyncSender<JsonRpcResponse>;
type PendingMap = Arc<Mutex<HashMap<RequestId, ResponseSlot>>>;

/// A message the server sent on its own initiative.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ServerMessage {
    /// A server notification such as `textDocument/publishDiagnostics`.
    Notification(JsonRpcNotification),
    /// A server-to-client request awaiting [`ProtocolChannel::respond`].
    Request(JsonRpcRequest),
}

impl ServerMessage {
    /// Method name of the message.
    #[must_use]
    pub fn method(&self) -> &str {
        match self {
            Self::Notification(notification) => &notification.method,
            Self::Request(request) => &request.method,
        }
    }
}

/// Bidirectional JSON-RPC channel bound to one server process.
pub struct ProtocolChannel {
    outgoing: Mutex<Option<SyncSender<Vec<u8>>>>,
    incoming: Mutex<Option<Receiver<ServerMessage>>>,
    pending: PendingMap,
    closed: Arc<AtomicBool>,
    discard: Arc<AtomicBool>,
    next_id: AtomicI64,
    writer: Mutex<Option<JoinHandle<()>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl ProtocolChannel {
    /// Starts the writer and reader threads over the given streams.
    ///
    /// `capacity` bounds each direction and is clamped to at least one.
    pub fn spawn<R, W>(stdout: R, stdin: W, capacity: usize) -> Self
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let bound = capacity.max(1);
        let (outgoing_tx, outgoing_rx) = mpsc::sync_channel::<Vec<u8>>(bound);
        let (incoming_tx, incoming_rx) = mpsc::sync_channel::<ServerMessage>(bound);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let discard = Arc::new(AtomicBool::new(false));

        let writer_closed = Arc::clone(&closed);
        let writer = thread::Builder::new()
            .name(String::from("gdoc-lsp-writer"))
            .spawn(move || write_loop(MessageWriter::new(stdin), &outgoing_rx, &writer_closed))
            .inspect_err(|error| warn!(target: CHANNEL_TARGET, %error, "failed to spawn writer thread"))
            .ok();

        let reader_state = ReaderState {
            incoming: incoming_tx,
            pending: Arc::clone(&pending),
            closed: Arc::clone(&closed),
            discard: Arc::clone(&discard),
        };
        let reader = thread::Builder::new()
            .name(String::from("gdoc-lsp-reader"))
            .spawn(move || read_loop(MessageReader::new(stdout), &reader_state))
            .inspect_err(|error| warn!(target: CHANNEL_TARGET, %error, "failed to spawn reader thread"))
            .ok();
        if writer.is_none() || reader.is_none() {
            closed.store(true, Ordering::SeqCst);
        }

        Self {
            outgoing: Mutex::new(Some(outgoing_tx)),
            incoming: Mutex::new(Some(incoming_rx)),
            pending,
            closed,
            discard,
            next_id: AtomicI64::new(1),
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
        }
    }

    /// Returns true once either stream failed or the channel was shut down.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Sends a request; blocks only while the outgoing queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] when the channel no longer accepts
    /// messages and [`ChannelError::Codec`] if the parameters cannot be
    /// serialised.
    pub fn request(&self, method: &str, params: Option<Value>) -> Result<PendingResponse, ChannelError> {
        self.send_request(method, params, true)
    }

    /// Like [`Self::request`] but fails with [`ChannelError::Closed`] instead
    /// of blocking when the outgoing queue is full.
    pub(crate) fn try_request(&self, method: &str, params: Option<Value>) -> Result<PendingResponse, ChannelError> {
        self.send_request(method, params, false)
    }

    fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
        block: bool,
    ) -> Result<PendingResponse, ChannelError> {
        let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst));
        let payload = serde_json::to_vec(&JsonRpcRequest::new(id.clone(), method, params))?;
        let (slot, response) = mpsc::sync_channel(1);

        lock(&self.pending).insert(id.clone(), slot);
        let pending = PendingResponse {
            id: id.clone(),
            method: method.to_owned(),
            response,
            registry: Arc::clone(&self.pending),
        };
        if self.is_closed() {
            return Err(ChannelError::Closed);
        }

        debug!(target: CHANNEL_TARGET, method, %id, "sending request");
        self.enqueue(payload, block)?;
        Ok(pending)
    }

    /// Sends a notification.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] when the channel no longer accepts
    /// messages and [`ChannelError::Codec`] if the parameters cannot be
    /// serialised.
    pub fn notify(&self, notification: &JsonRpcNotification) -> Result<(), ChannelError> {
        self.send_notification(notification, true)
    }

    pub(crate) fn try_notify(&self, notification: &JsonRpcNotification) -> Result<(), ChannelError> {
        self.send_notification(notification, false)
    }

    fn send_notification(&self, notification: &JsonRpcNotification, block: bool) -> Result<(), ChannelError> {
        let payload = serde_json::to_vec(notification)?;
        debug!(target: CHANNEL_TARGET, method = %notification.method, "sending notification");
        self.enqueue(payload, block)
    }

    /// Answers a server-initiated request.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] when the channel no longer accepts
    /// messages.
    pub fn respond(&self, response: &JsonRpcResponse) -> Result<(), ChannelError> {
        let payload = serde_json::to_vec(response)?;
        debug!(target: CHANNEL_TARGET, id = ?response.id, "sending response");
        self.enqueue(payload, true)
    }

    fn enqueue(&self, payload: Vec<u8>, block: bool) -> Result<(), ChannelError> {
        // Clone the sender so a blocked send does not hold the lock that
        // `close_outgoing` needs.
        let sender = lock(&self.outgoing).clone().ok_or(ChannelError::Closed)?;
        if block {
            sender.send(payload).map_err(|_| ChannelError::Closed)
        } else {
            sender.try_send(payload).map_err(|error| match error {
                TrySendError::Full(_) => {
                    debug!(target: CHANNEL_TARGET, "outgoing queue full");
                    ChannelError::Closed
                }
                TrySendError::Disconnected(_) => ChannelError::Closed,
            })
        }
    }

    /// Drains every server message currently queued, in arrival order.
    #[must_use]
    pub fn take_incoming(&self) -> Vec<ServerMessage> {
        lock(&self.incoming)
            .as_ref()
            .map(|receiver| receiver.try_iter().collect())
            .unwrap_or_default()
    }

    /// Waits up to `timeout` for the next server message.
    #[must_use]
    pub fn next_incoming(&self, timeout: Duration) -> Option<ServerMessage> {
        let guard = lock(&self.incoming);
        guard.as_ref()?.recv_timeout(timeout).ok()
    }

    /// Drops queued and future server messages instead of delivering them.
    ///
    /// Responses keep flowing to their waiters, so a request issued after
    /// this call completes even when nobody drains the incoming queue.
    pub(crate) fn discard_incoming(&self) {
        self.discard.store(true, Ordering::SeqCst);
        // A holder of the lock is already receiving, which unblocks the
        // reader just as well.
        let Some(guard) = try_lock(&self.incoming) else {
            return;
        };
        let dropped = guard
            .as_ref()
            .map_or(0, |receiver| receiver.try_iter().count());
        if dropped > 0 {
            debug!(target: CHANNEL_TARGET, dropped, "discarded undelivered server messages");
        }
    }

    /// Stops accepting outgoing messages; queued ones are still written.
    pub(crate) fn close_outgoing(&self) {
        lock(&self.outgoing).take();
    }

    /// Closes both directions and reaps the service threads.
    ///
    /// Call after the server process is gone. A thread that has not finished
    /// within a short budget is detached rather than joined.
    pub(crate) fn shutdown(&self) {
        self.close_outgoing();
        // Dropping the receiver releases a reader blocked on a full queue.
        lock(&self.incoming).take();
        self.closed.store(true, Ordering::SeqCst);
        lock(&self.pending).clear();

        for (name, slot) in [("writer", &self.writer), ("reader", &self.reader)] {
            if let Some(handle) = lock(slot).take() {
                join_within(name, handle, THREAD_JOIN_BUDGET);
            }
        }
    }
}

impl Drop for ProtocolChannel {
    fn drop(&mut self) {
        self.close_outgoing();
        lock(&self.incoming).take();
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for ProtocolChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolChannel")
            .field("closed", &self.is_closed())
            .field("pending", &lock(&self.pending).len())
            .finish_non_exhaustive()
    }
}

fn join_within(name: &str, handle: JoinHandle<()>, budget: Duration) {
    let deadline = Instant::now() + budget;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            debug!(target: CHANNEL_TARGET, thread = name, "detaching unfinished channel thread");
            return;
        }
        thread::sleep(Duration::from_millis(5));
    }
    if handle.join().is_err() {
        warn!(target: CHANNEL_TARGET, thread = name, "channel thread panicked");
    }
}

fn write_loop<W: Write>(mut writer: MessageWriter<W>, queue: &Receiver<Vec<u8>>, closed: &AtomicBool) {
    for payload in queue {
        if let Err(error) = writer.send(&payload) {
            debug!(target: CHANNEL_TARGET, %error, "server stdin closed");
            closed.store(true, Ordering::SeqCst);
            return;
        }
    }
    trace!(target: CHANNEL_TARGET, "outgoing queue closed");
}

/// What the reader thread shares with its channel.
struct ReaderState {
    incoming: SyncSender<ServerMessage>,
    pending: PendingMap,
    closed: Arc<AtomicBool>,
    discard: Arc<AtomicBool>,
}

impl ReaderState {
    /// Queues a server message for the host; false once nobody listens.
    fn deliver(&self, message: ServerMessage) -> bool {
        if self.discard.load(Ordering::SeqCst) {
            trace!(target: CHANNEL_TARGET, method = message.method(), "discarding server message");
            return true;
        }
        self.incoming.send(message).is_ok()
    }
}

/// Marks the channel closed however the reader thread ends, panics included.
struct CloseOnExit<'a>(&'a ReaderState);

impl Drop for CloseOnExit<'_> {
    fn drop(&mut self) {
        self.0.closed.store(true, Ordering::SeqCst);
        // Dropping the slots wakes every waiter with `Closed`.
        lock(&self.0.pending).clear();
    }
}

fn read_loop<R: Read>(mut reader: MessageReader<R>, state: &ReaderState) {
    let _close = CloseOnExit(state);
    loop {
        let frame = match reader.receive() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                debug!(target: CHANNEL_TARGET, "server stdout reached end of stream");
                break;
            }
            Err(error) => {
                warn!(target: CHANNEL_TARGET, %error, "failed to read from server");
                break;
            }
        };

        let message = match JsonRpcMessage::from_bytes(&frame) {
            Ok(message) => message,
            Err(error) => {
                warn!(target: CHANNEL_TARGET, %error, "discarding malformed message");
                continue;
            }
        };

        let delivered = match message {
            JsonRpcMessage::Response(response) => {
                route_response(response, &state.pending);
                true
            }
            JsonRpcMessage::Notification(notification) => {
                state.deliver(ServerMessage::Notification(notification))
            }
            JsonRpcMessage::Request(request) => state.deliver(ServerMessage::Request(request)),
        };
        if !delivered {
            trace!(target: CHANNEL_TARGET, "incoming queue closed");
            break;
        }
    }
}

fn route_response(response: JsonRpcResponse, pending: &Mutex<HashMap<RequestId, ResponseSlot>>) {
    let slot = response.id.as_ref().and_then(|id| lock(pending).remove(id));
    match slot {
        Some(slot) => {
            let _ = slot.try_send(response);
        }
        None => warn!(
            target: CHANNEL_TARGET,
            id = ?response.id,
            "skipping response with no pending request"
        ),
    }
}

/// A request awaiting its response.
///
/// Dropping the handle abandons the request; a late response is discarded.
#[derive(Debug)]
pub struct PendingResponse {
    id: RequestId,
    method: String,
    response: Receiver<JsonRpcResponse>,
    registry: PendingMap,
}

impl PendingResponse {
    /// Identifier assigned to the request.
    #[must_use]
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    /// Waits for the result.
    ///
    /// A `null` or absent result is returned as [`Value::Null`].
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Timeout`] when `timeout` elapses,
    /// [`ChannelError::Interrupted`] once `interrupt` is set,
    /// [`ChannelError::Closed`] if the channel closes first, and
    /// [`ChannelError::Server`] for an error response.
    pub fn wait(self, timeout: Duration, interrupt: &AtomicBool) -> Result<Value, ChannelError> {
        let deadline = Instant::now() + timeout;
        loop {
            if interrupt.load(Ordering::SeqCst) {
                return Err(ChannelError::Interrupted {
                    method: self.method.clone(),
                });
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ChannelError::Timeout {
                    method: self.method.clone(),
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                });
            }
            match self.response.recv_timeout(remaining.min(WAIT_SLICE)) {
                Ok(response) => {
                    if let Some(error) = response.error {
                        return Err(ChannelError::from_jsonrpc(error));
                    }
                    return Ok(response.result.unwrap_or(Value::Null));
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return Err(ChannelError::Closed),
            }
        }
    }
}

impl Drop for PendingResponse {
    fn drop(&mut self) {
        lock(&self.registry).remove(&self.id);
    }
}
