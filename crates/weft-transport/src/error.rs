//! Error types for the transport layer.
//!
//! Each crate in weft defines its own error enum; a `TransportError`
//! always means the problem is in moving messages, not in session logic
//! or configuration.

use weft_protocol::MessageKind;

/// Errors that can occur while moving messages over a transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The endpoint is gone: the session tore down, the channel pair was
    /// severed, or the peer vanished and its disconnect was already
    /// delivered. Further operations on this endpoint keep failing.
    #[error("connection abandoned")]
    ConnectionAbandoned,

    /// Writing to the underlying socket failed.
    #[error("send failed: {0}")]
    SendFailed(std::io::Error),

    /// Reading from the underlying socket failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(std::io::Error),

    /// The message kind cannot travel in this direction on this
    /// transport (e.g. an outbound `connect` on the server bridge).
    #[error("{0} frames are not sendable from this side")]
    InvalidOutbound(MessageKind),
}

impl TransportError {
    /// `true` when the failure means the other side is simply gone,
    /// as opposed to a fault worth surfacing.
    pub fn is_abandoned(&self) -> bool {
        matches!(self, Self::ConnectionAbandoned)
    }
}
