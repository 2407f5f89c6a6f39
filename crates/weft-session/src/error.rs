//! Session error taxonomy.

use weft_protocol::{MessageKind, ProtocolViolation};
use weft_transport::TransportError;

/// Boxed error for application failures carried through the engine.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Everything that can go wrong while opening or running one session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The first inbound message was not `Connect`. No `Accept` is sent.
    #[error("handshake failed: expected connect, got {got}")]
    HandshakeFailed { got: MessageKind },

    /// Negotiation found no overlap between the accepted set and the
    /// peer's requested list. The connection is refused without `Accept`.
    #[error("no compatible subprotocol")]
    NoCompatibleSubprotocol,

    /// An inbound message arrived out of sequence.
    #[error(transparent)]
    Violation(#[from] ProtocolViolation),

    /// A value entered the session that cannot be carried as text or
    /// bytes (reachable through the JSON helpers).
    #[error("unsupported payload: {0}")]
    UnsupportedPayload(#[source] serde_json::Error),

    /// The peer ended the connection. Absorbed by the engine; an
    /// application only sees this from `send` on a dead session.
    #[error("peer disconnected")]
    Disconnected,

    /// The transport itself failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The application handler failed. Re-raised to the caller only
    /// after teardown has notified the peer.
    #[error("application error: {0}")]
    App(#[source] BoxError),
}

impl SessionError {
    /// Wraps an arbitrary application failure.
    pub fn app(err: impl Into<BoxError>) -> Self {
        Self::App(err.into())
    }
}
