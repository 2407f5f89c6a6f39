//! Session message types and their wire shape.
//!
//! Every endpoint of a session speaks the same six-message vocabulary.
//! The serde attributes pin the serialized form to the hosting server's
//! record layout: a required `kind` field plus, depending on the kind,
//! `text` xor `bytes` xor `subprotocol`. A data frame reads
//! `{"kind": "send", "text": "hi"}`; a bare control frame reads
//! `{"kind": "close"}`.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// The application-visible content of a data frame: text or bytes,
/// never both.
///
/// The wire contract says a data frame carries exactly one of `text`
/// or `bytes`. Modeling that as an enum rather than a pair of optional
/// fields makes a frame with both, or with neither, unrepresentable.
///
/// `#[serde(untagged)]` tells serde this enum has no discriminant field
/// of its own; the variant is recognized by which field is present.
/// Combined with `#[serde(flatten)]` at the use sites in [`Message`],
/// the payload field sits directly in the message record:
/// `{"kind": "send", "text": "hi"}`, not
/// `{"kind": "send", "payload": {"text": "hi"}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    /// A UTF-8 text frame. On the wire: `"text": "..."`.
    Text { text: String },
    /// A raw byte frame. On the wire: `"bytes": [...]`.
    Binary { bytes: Vec<u8> },
}

impl Payload {
    /// Builds a text payload.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Builds a binary payload.
    pub fn binary(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Binary { bytes: bytes.into() }
    }

    /// Returns the text content, or `None` for a binary payload.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::Binary { .. } => None,
        }
    }

    /// Returns the binary content, or `None` for a text payload.
    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            Self::Text { .. } => None,
            Self::Binary { bytes } => Some(bytes),
        }
    }

    /// Consumes the payload, yielding its text; a binary payload is
    /// handed back unchanged in the error position.
    pub fn into_text(self) -> Result<String, Payload> {
        match self {
            Self::Text { text } => Ok(text),
            other @ Self::Binary { .. } => Err(other),
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text { .. })
    }

    /// Payload length in bytes (UTF-8 length for text).
    pub fn len(&self) -> usize {
        match self {
            Self::Text { text } => text.len(),
            Self::Binary { bytes } => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self::text(text)
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self::Text { text }
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Binary { bytes }
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Self::binary(bytes.to_vec())
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// One discrete session message.
///
/// Sequencing rules (violations are a [`ProtocolViolation`], never a
/// silent no-op):
///
/// 1. `Connect` must be the first message the application side observes.
/// 2. The application side replies `Accept` (optionally naming the
///    negotiated subprotocol) before any data flows.
/// 3. `Receive` carries peer→application data; `Send` carries
///    application→peer data.
/// 4. `Disconnect` (peer ends it) or `Close` (application ends it) may
///    arrive at any time; after either, no further data frames are
///    permitted on that side.
///
/// `#[serde(tag = "kind")]` produces internally tagged JSON: the
/// variant name travels in a `kind` field next to the variant's own
/// fields, `{"kind": "connect"}` rather than `{"Connect": {}}`, and
/// `rename_all = "lowercase"` writes `connect`, not `Connect`. That is
/// exactly the record layout the hosting server already speaks.
///
/// [`ProtocolViolation`]: crate::ProtocolViolation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Message {
    /// Peer → application: a connection has arrived. Always the first
    /// message of a session.
    Connect,
    /// Application → peer: the handshake is complete, data may flow.
    ///
    /// Carries the negotiated subprotocol when one was chosen. With
    /// `skip_serializing_if` the field stays off the wire entirely when
    /// none was, so a plain accept is just `{"kind": "accept"}`.
    Accept {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subprotocol: Option<String>,
    },
    /// Peer → application: one inbound data frame.
    Receive {
        #[serde(flatten)]
        payload: Payload,
    },
    /// Application → peer: one outbound data frame.
    Send {
        #[serde(flatten)]
        payload: Payload,
    },
    /// Peer → application: the peer ended the session.
    Disconnect,
    /// Application → peer: the application ended the session.
    Close,
}

impl Message {
    /// Builds an `Accept` with no subprotocol.
    pub fn accept() -> Self {
        Self::Accept { subprotocol: None }
    }

    /// Builds a `Receive` data frame.
    pub fn receive(payload: impl Into<Payload>) -> Self {
        Self::Receive { payload: payload.into() }
    }

    /// Builds a `Send` data frame.
    pub fn send(payload: impl Into<Payload>) -> Self {
        Self::Send { payload: payload.into() }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Connect => MessageKind::Connect,
            Self::Accept { .. } => MessageKind::Accept,
            Self::Receive { .. } => MessageKind::Receive,
            Self::Send { .. } => MessageKind::Send,
            Self::Disconnect => MessageKind::Disconnect,
            Self::Close => MessageKind::Close,
        }
    }

    /// `true` for the payload-bearing kinds (`Receive`/`Send`).
    pub fn is_data(&self) -> bool {
        matches!(self, Self::Receive { .. } | Self::Send { .. })
    }
}

// ---------------------------------------------------------------------------
// MessageKind
// ---------------------------------------------------------------------------

/// The discriminant of a [`Message`], with any payload stripped.
///
/// Violation reports and log lines name the kind of message they saw
/// without quoting the frame it arrived in. `Display` prints the same
/// lowercase name the `kind` field carries on the wire, so a log line
/// and a wire capture read the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Connect,
    Accept,
    Receive,
    Send,
    Disconnect,
    Close,
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Connect => "connect",
            Self::Accept => "accept",
            Self::Receive => "receive",
            Self::Send => "send",
            Self::Disconnect => "disconnect",
            Self::Close => "close",
        };
        f.write_str(name)
    }
}
