//! Errors the harness reports to the test.

use std::time::Duration;

use weft::WeftError;
use weft_protocol::{MessageKind, ProtocolViolation};

/// What went wrong from the simulated peer's point of view.
///
/// Timeouts and refusals are deliberately distinct variants: a test
/// asserting "the server refused me" must never pass because the
/// server merely failed to answer in time.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// The application side answered the handshake with something
    /// other than an accept or a refusal.
    #[error("handshake failed: expected accept, got {got}")]
    HandshakeFailed { got: MessageKind },

    /// A peer-side wait outlived the configured timeout.
    #[error("peer timed out after {0:?}")]
    PeerTimedOut(Duration),

    /// The application side closed or disconnected during the
    /// handshake instead of accepting.
    #[error("connection refused during handshake")]
    ConnectionRefused,

    /// The session under test has already ended.
    #[error("session already ended")]
    SessionEnded,

    /// The test wrote input the application never consumed.
    #[error("input not consumed by the application")]
    InputNotConsumed,

    /// The application wrote output the test never read.
    #[error("output not consumed by the test")]
    OutputNotConsumed,

    /// The application side broke message sequencing.
    #[error(transparent)]
    Protocol(#[from] ProtocolViolation),

    /// The application failed. Delivered to the test exactly once.
    #[error("application failed: {0}")]
    Application(WeftError),

    /// A JSON helper could not encode or decode a payload.
    #[error("invalid JSON payload")]
    Json(#[source] serde_json::Error),
}
