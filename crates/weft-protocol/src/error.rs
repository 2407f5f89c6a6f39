//! The shared out-of-sequence error.
//!
//! Both ends of a session report sequencing violations with the same
//! value so logs and assertions read identically whichever side caught
//! the problem.

use crate::MessageKind;

/// A message arrived outside the sequence the transport contract allows.
///
/// `expected` names the set of kinds that were legal at that point
/// ("connect", "send or close", ...); `got` is what actually arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("protocol violation: expected {expected}, got {got}")]
pub struct ProtocolViolation {
    pub expected: &'static str,
    pub got: MessageKind,
}

impl ProtocolViolation {
    pub fn new(expected: &'static str, got: MessageKind) -> Self {
        Self { expected, got }
    }
}
