//! Transport write handles.
//!
//! A [`Responder`] is the raw transport handle a [`Context`](crate::Context)
//! closes over. The context guarantees it is called at most once.

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

/// A finalized response, ready to be written by a transport.
#[derive(Debug, Clone)]
pub struct Reply {
    /// Response status.
    pub status: StatusCode,
    /// Extra response headers set through the context.
    pub headers: HeaderMap,
    /// `Content-Type` of `body`.
    pub content_type: &'static str,
    /// Serialized body.
    pub body: Bytes,
}

impl Reply {
    /// Returns the body as UTF-8 text, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Writes a single [`Reply`] to the underlying transport.
pub trait Responder: Send + Sync + 'static {
    /// Delivers the reply. Called at most once per context.
    fn deliver(&self, reply: Reply);
}

/// Responder backed by a oneshot channel, one per HTTP request.
#[derive(Debug)]
pub struct OneshotResponder {
    sender: Mutex<Option<oneshot::Sender<Reply>>>,
}

impl OneshotResponder {
    /// Creates the responder and the receiver the transport awaits.
    pub fn channel() -> (Self, oneshot::Receiver<Reply>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                sender: Mutex::new(Some(tx)),
            },
            rx,
        )
    }
}

impl Responder for OneshotResponder {
    fn deliver(&self, reply: Reply) {
        if let Some(sender) = self.sender.lock().take() {
            if sender.send(reply).is_err() {
                tracing::debug!("Client went away before the reply was delivered");
            }
        }
    }
}

/// Responder that forwards replies into an unbounded channel.
///
/// Socket connections share one receiver across every message they carry.
#[derive(Debug, Clone)]
pub struct ChannelResponder {
    sender: mpsc::UnboundedSender<Reply>,
}

impl ChannelResponder {
    /// Wraps an existing sender.
    pub fn new(sender: mpsc::UnboundedSender<Reply>) -> Self {
        Self { sender }
    }

    /// Creates a responder and its receiver.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Reply>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl Responder for ChannelResponder {
    fn deliver(&self, reply: Reply) {
        if self.sender.send(reply).is_err() {
            tracing::debug!("Connection closed before the reply was delivered");
        }
    }
}
