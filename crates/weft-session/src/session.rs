//! Session identity, request data, and the application-facing handle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};

use weft_protocol::{Message, Payload};
use weft_transport::TransportError;

use crate::engine::SessionTransport;
use crate::SessionError;

/// Counter for generating unique session IDs.
static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

// ---------------------------------------------------------------------------
// SessionId
// ---------------------------------------------------------------------------

/// Unique identifier for one session, used as a structured log field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    pub(crate) fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ws-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// SessionRequest
// ---------------------------------------------------------------------------

/// The connection request a session was opened with: path, headers, and
/// the subprotocols the peer asked for.
#[derive(Debug, Clone, Default)]
pub struct SessionRequest {
    path: String,
    headers: Vec<(String, String)>,
    subprotocols: Vec<String>,
}

impl SessionRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into(), headers: Vec::new(), subprotocols: Vec::new() }
    }

    /// Appends one header. Names are matched case-insensitively on read.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the subprotocols the peer requests, in preference order.
    pub fn subprotocols<I, S>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subprotocols = protocols.into_iter().map(Into::into).collect();
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// First value of the named header, compared case-insensitively.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The subprotocols the peer requested, in the order it sent them.
    pub fn requested_subprotocols(&self) -> &[String] {
        &self.subprotocols
    }
}

// ---------------------------------------------------------------------------
// SessionOutcome
// ---------------------------------------------------------------------------

/// How a session ended, for the non-error terminations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The handler ran to completion.
    Completed,
    /// The peer disconnected; the handler's cancellation was absorbed.
    Disconnected,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// The application's view of one open session.
///
/// `receive` dequeues inbound payloads in arrival order; `send` delivers
/// one payload to the peer. A peer disconnect is never surfaced through
/// `receive`: the pending call simply never resolves and the handler is
/// cancelled by the engine instead. `send` on a dead session fails with
/// [`SessionError::Disconnected`].
pub struct Session {
    id: SessionId,
    request: SessionRequest,
    subprotocol: Option<String>,
    inbox: Mutex<mpsc::UnboundedReceiver<Payload>>,
    transport: Arc<dyn SessionTransport>,
}

impl Session {
    pub(crate) fn new(
        id: SessionId,
        request: SessionRequest,
        subprotocol: Option<String>,
        inbox: mpsc::UnboundedReceiver<Payload>,
        transport: Arc<dyn SessionTransport>,
    ) -> Self {
        Self { id, request, subprotocol, inbox: Mutex::new(inbox), transport }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn path(&self) -> &str {
        self.request.path()
    }

    pub fn headers(&self) -> &[(String, String)] {
        self.request.headers()
    }

    /// First value of the named header, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.request.header_value(name)
    }

    /// The subprotocol chosen during the handshake, if any.
    pub fn subprotocol(&self) -> Option<&str> {
        self.subprotocol.as_deref()
    }

    /// Next inbound payload, in the order the peer sent them.
    ///
    /// Suspends while the queue is empty. Once the peer has disconnected
    /// this never resolves; the engine cancels the handler instead.
    pub async fn receive(&self) -> Payload {
        let mut inbox = self.inbox.lock().await;
        match inbox.recv().await {
            Some(payload) => payload,
            None => std::future::pending().await,
        }
    }

    /// Sends one payload to the peer.
    pub async fn send(&self, payload: impl Into<Payload>) -> Result<(), SessionError> {
        let message = Message::send(payload.into());
        self.transport.outgoing(message).await.map_err(|e| match e {
            TransportError::ConnectionAbandoned => SessionError::Disconnected,
            other => SessionError::Transport(other),
        })
    }

    /// Serializes a value to JSON and sends it as a text payload.
    ///
    /// A value `serde_json` cannot represent fails with
    /// [`SessionError::UnsupportedPayload`].
    pub async fn send_json<T: Serialize>(&self, value: &T) -> Result<(), SessionError> {
        let text = serde_json::to_string(value).map_err(SessionError::UnsupportedPayload)?;
        self.send(text).await
    }

    /// Receives one payload and decodes it as JSON.
    pub async fn receive_json<T: DeserializeOwned>(&self) -> Result<T, SessionError> {
        let decoded = match self.receive().await {
            Payload::Text { text } => serde_json::from_str(&text),
            Payload::Binary { bytes } => serde_json::from_slice(&bytes),
        };
        decoded.map_err(SessionError::app)
    }
}
