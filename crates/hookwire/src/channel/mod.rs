//! Bidirectional JSON-RPC call channel between host and plugin.
//!
//! A [`Channel`] owns one byte-stream pair (the child's stdio on the host,
//! the process's own stdio inside a plugin). A dedicated reader thread
//! decodes frames and routes them:
//!
//! - responses complete the matching pending call by request id, so any
//!   number of callers may [`Channel::invoke`] concurrently;
//! - requests from the peer run on their own thread through an
//!   [`IncomingHandler`], which lets a handler call back over the same
//!   channel while the reader keeps draining frames;
//! - notifications go to the handler inline.
//!
//! When the stream ends or fails, every pending call observes
//! [`ChannelError::Broken`] and the optional close callback fires. The
//! reader thread therefore doubles as the liveness monitor for the peer.

mod error;
mod jsonrpc;
mod transport;

#[cfg(all(test, unix))]
mod tests;

use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

pub use self::error::{ChannelError, TransportError};
pub use self::jsonrpc::{
    JSONRPC_VERSION, Message, Notification, Request, Response, RpcError, codes, decode_params,
    encode_result,
};
pub use self::transport::{FrameReader, FrameWriter, MAX_FRAME_BYTES};
use crate::config::duration_millis;

/// Log target for channel operations.
pub(crate) const CHANNEL_TARGET: &str = "hookwire::channel";

/// Callback invoked once, from the reader thread, when the channel closes.
///
/// The argument describes why the reader stopped.
pub type ClosedCallback = Box<dyn FnOnce(&str) + Send + 'static>;

type BoxedWriter = FrameWriter<Box<dyn Write + Send>>;

/// Serves calls initiated by the peer.
pub trait IncomingHandler: Send + Sync + 'static {
    /// Handles a request and produces its result or error object.
    ///
    /// Runs on a dedicated thread; the handler may issue calls of its own
    /// through `channel`.
    ///
    /// # Errors
    ///
    /// Returns the JSON-RPC error object sent back to the peer.
    fn handle_request(
        &self,
        channel: &Channel,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, RpcError>;

    /// Handles a notification. Runs on the reader thread and must not block.
    fn handle_notification(&self, channel: &Channel, method: &str, _params: Option<Value>) {
        debug!(
            target: CHANNEL_TARGET,
            label = channel.label(),
            method,
            "ignoring notification"
        );
    }
}

/// A cloneable handle to a running channel.
#[derive(Clone)]
pub struct Channel {
    shared: Arc<Shared>,
}

struct Shared {
    label: String,
    writer: Mutex<Option<BoxedWriter>>,
    close_requested: AtomicBool,
    pending: Mutex<Pending>,
    next_id: AtomicI64,
    reader: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Default)]
struct Pending {
    waiters: HashMap<i64, mpsc::Sender<Response>>,
    closed: Option<String>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panicking handler must not wedge the channel for everyone else.
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Channel {
    /// Starts a channel over the given stream halves.
    ///
    /// `on_closed` runs once on the reader thread after every pending call
    /// has been failed.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the reader thread cannot be spawned.
    pub fn spawn<R, W>(
        label: impl Into<String>,
        reader: R,
        writer: W,
        handler: Arc<dyn IncomingHandler>,
        on_closed: Option<ClosedCallback>,
    ) -> std::io::Result<Self>
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let label = label.into();
        let boxed: Box<dyn Write + Send> = Box::new(writer);
        let channel = Self {
            shared: Arc::new(Shared {
                label: label.clone(),
                writer: Mutex::new(Some(FrameWriter::new(boxed))),
                close_requested: AtomicBool::new(false),
                pending: Mutex::default(),
                next_id: AtomicI64::new(1),
                reader: Mutex::new(None),
            }),
        };

        let reader_channel = channel.clone();
        let handle = thread::Builder::new()
            .name(format!("hookwire-{label}"))
            .spawn(move || {
                reader_channel.read_loop(FrameReader::new(reader), &handler, on_closed);
            })?;
        *lock(&channel.shared.reader) = Some(handle);

        debug!(target: CHANNEL_TARGET, label = %label, "channel started");
        Ok(channel)
    }

    /// Returns the label used in diagnostics.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.shared.label
    }

    /// Invokes `method` and blocks until its response or transport loss.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Broken`] if the peer goes away,
    /// [`ChannelError::Remote`] if it answers with an error object, and
    /// [`ChannelError::Codec`] if the request cannot be encoded.
    pub fn invoke(&self, method: &str, params: Option<Value>) -> Result<Value, ChannelError> {
        self.call(method, params, None)
    }

    /// Like [`Channel::invoke`] but gives up after `timeout`.
    ///
    /// # Errors
    ///
    /// As [`Channel::invoke`], plus [`ChannelError::Timeout`] when no response
    /// arrives in time. A late response is discarded.
    pub fn invoke_timeout(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value, ChannelError> {
        self.call(method, params, Some(timeout))
    }

    /// Typed convenience over [`Channel::invoke`].
    ///
    /// # Errors
    ///
    /// As [`Channel::invoke`], plus [`ChannelError::Codec`] when the result
    /// does not decode as `R`.
    pub fn request<P, R>(&self, method: &str, params: &P) -> Result<R, ChannelError>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let params = serde_json::to_value(params)?;
        let value = self.invoke(method, Some(params))?;
        Ok(serde_json::from_value(value)?)
    }

    /// Sends a notification.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Broken`] if the write half is gone.
    pub fn notify(&self, method: &str, params: Option<Value>) -> Result<(), ChannelError> {
        debug!(
            target: CHANNEL_TARGET,
            label = self.label(),
            method,
            "sending notification"
        );
        self.write_message(&Notification::new(method, params))
    }

    /// Drops the write half, signalling end-of-stream to the peer.
    ///
    /// Never blocks. When another thread is mid-write the half is dropped as
    /// soon as that write returns; killing an unresponsive peer makes it
    /// return.
    pub fn close(&self) {
        self.shared.close_requested.store(true, Ordering::Release);
        match self.shared.writer.try_lock() {
            Ok(mut writer) => self.drop_writer(&mut writer),
            Err(TryLockError::Poisoned(poisoned)) => self.drop_writer(&mut poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => debug!(
                target: CHANNEL_TARGET,
                label = self.label(),
                "write in progress; closing once it returns"
            ),
        }
    }

    fn drop_writer(&self, writer: &mut Option<BoxedWriter>) {
        if writer.take().is_some() {
            debug!(target: CHANNEL_TARGET, label = self.label(), "write half closed");
        }
    }

    /// Returns `true` once the reader has stopped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        lock(&self.shared.pending).closed.is_some()
    }

    /// Blocks until the reader thread has stopped.
    ///
    /// Must not be called from a handler running on this channel.
    pub fn wait_closed(&self) {
        let Some(handle) = lock(&self.shared.reader).take() else {
            return;
        };
        if handle.join().is_err() {
            warn!(
                target: CHANNEL_TARGET,
                label = self.label(),
                "channel reader thread panicked"
            );
        }
    }

    fn call(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Option<Duration>,
    ) -> Result<Value, ChannelError> {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel();
        {
            let mut pending = lock(&self.shared.pending);
            if let Some(reason) = &pending.closed {
                return Err(self.broken(reason));
            }
            pending.waiters.insert(id, sender);
        }

        debug!(
            target: CHANNEL_TARGET,
            label = self.label(),
            method,
            id,
            "sending request"
        );

        if let Err(err) = self.write_message(&Request::new(id, method, params)) {
            self.forget(id);
            return Err(err);
        }

        let response = match timeout {
            None => receiver.recv().map_err(|_| self.broken_now())?,
            Some(limit) => match receiver.recv_timeout(limit) {
                Ok(response) => response,
                Err(RecvTimeoutError::Timeout) => {
                    self.forget(id);
                    return Err(ChannelError::Timeout {
                        method: method.to_owned(),
                        timeout_ms: duration_millis(limit),
                    });
                }
                Err(RecvTimeoutError::Disconnected) => return Err(self.broken_now()),
            },
        };

        match response.error {
            Some(error) => Err(ChannelError::Remote {
                code: error.code,
                message: error.message,
                data: error.data,
            }),
            None => Ok(response.result.unwrap_or(Value::Null)),
        }
    }

    fn write_message<T: Serialize>(&self, message: &T) -> Result<(), ChannelError> {
        let payload = serde_json::to_vec(message)?;
        let mut writer = lock(&self.shared.writer);
        if self.shared.close_requested.load(Ordering::Acquire) {
            self.drop_writer(&mut writer);
        }
        let Some(frame_writer) = writer.as_mut() else {
            return Err(self.broken("write half closed"));
        };
        let sent = frame_writer
            .send(&payload)
            .map_err(|err| self.broken(&err.to_string()));
        // `close` may have given up on the lock while this write was blocked.
        if self.shared.close_requested.load(Ordering::Acquire) {
            self.drop_writer(&mut writer);
        }
        sent
    }

    fn forget(&self, id: i64) {
        lock(&self.shared.pending).waiters.remove(&id);
    }

    fn broken(&self, reason: &str) -> ChannelError {
        ChannelError::Broken {
            label: self.shared.label.clone(),
            reason: reason.to_owned(),
        }
    }

    fn broken_now(&self) -> ChannelError {
        let reason = lock(&self.shared.pending)
            .closed
            .clone()
            .unwrap_or_else(|| String::from("channel closed"));
        self.broken(&reason)
    }

    fn read_loop<R: Read>(
        &self,
        mut reader: FrameReader<R>,
        handler: &Arc<dyn IncomingHandler>,
        on_closed: Option<ClosedCallback>,
    ) {
        let reason = loop {
            let frame = match reader.receive() {
                Ok(frame) => frame,
                Err(TransportError::Closed) => break String::from("peer closed the stream"),
                Err(err) => break err.to_string(),
            };

            match Message::from_bytes(&frame) {
                Ok(Message::Response(response)) => self.complete(response),
                Ok(Message::Request(request)) => self.dispatch_request(request, handler),
                Ok(Message::Notification(notification)) => {
                    handler.handle_notification(self, &notification.method, notification.params);
                }
                Err(err) => self.reject_undecodable(&frame, &err),
            }
        };

        debug!(
            target: CHANNEL_TARGET,
            label = self.label(),
            reason = %reason,
            "channel reader stopped"
        );
        self.mark_closed(&reason);
        if let Some(callback) = on_closed {
            callback(&reason);
        }
    }

    fn mark_closed(&self, reason: &str) {
        {
            let mut pending = lock(&self.shared.pending);
            pending.closed = Some(reason.to_owned());
            // Dropping the senders wakes every waiter with a disconnect.
            pending.waiters.clear();
        }
        self.close();
    }

    fn complete(&self, response: Response) {
        let Some(id) = response.id else {
            warn!(
                target: CHANNEL_TARGET,
                label = self.label(),
                error = ?response.error,
                "dropping response without an id"
            );
            return;
        };

        let waiter = lock(&self.shared.pending).waiters.remove(&id);
        match waiter {
            Some(sender) => {
                if sender.send(response).is_err() {
                    debug!(
                        target: CHANNEL_TARGET,
                        label = self.label(),
                        id,
                        "caller stopped waiting for response"
                    );
                }
            }
            None => warn!(
                target: CHANNEL_TARGET,
                label = self.label(),
                id,
                "dropping response for unknown or expired request"
            ),
        }
    }

    fn dispatch_request(&self, request: Request, handler: &Arc<dyn IncomingHandler>) {
        let channel = self.clone();
        let handler = Arc::clone(handler);
        let method = request.method.clone();

        let spawned = thread::Builder::new()
            .name(format!("hookwire-{}-call", self.label()))
            .spawn(move || {
                let Request {
                    id, method, params, ..
                } = request;
                let response = match handler.handle_request(&channel, &method, params) {
                    Ok(result) => Response::success(id, result),
                    Err(error) => Response::failure(Some(id), error),
                };
                if let Err(err) = channel.write_message(&response) {
                    debug!(
                        target: CHANNEL_TARGET,
                        label = channel.label(),
                        method = %method,
                        id,
                        error = %err,
                        "failed to deliver response"
                    );
                }
            });

        if let Err(err) = spawned {
            warn!(
                target: CHANNEL_TARGET,
                label = self.label(),
                method = %method,
                error = %err,
                "failed to spawn request handler thread"
            );
        }
    }

    fn reject_undecodable(&self, frame: &[u8], err: &serde_json::Error) {
        warn!(
            target: CHANNEL_TARGET,
            label = self.label(),
            error = %err,
            "discarding undecodable message"
        );
        // A malformed reply to one of our calls still names its caller.
        if let Some(id) = awaited_id(frame) {
            if lock(&self.shared.pending).waiters.contains_key(&id) {
                let error =
                    RpcError::new(codes::PARSE_ERROR, format!("undecodable response: {err}"));
                self.complete(Response::failure(Some(id), error));
                return;
            }
        }
        let response = Response::failure(None, RpcError::new(codes::PARSE_ERROR, err.to_string()));
        if let Err(write_err) = self.write_message(&response) {
            debug!(
                target: CHANNEL_TARGET,
                label = self.label(),
                error = %write_err,
                "failed to report parse error"
            );
        }
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("label", &self.shared.label)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Recovers the id of a frame that parses as JSON but not as a message,
/// unless it looks like a request.
fn awaited_id(frame: &[u8]) -> Option<i64> {
    let value: Value = serde_json::from_slice(frame).ok()?;
    if value.get("method").is_some() {
        return None;
    }
    match value.get("id")? {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.parse().ok(),
        _ => None,
    }
}
