//! Message vocabulary for weft sessions.
//!
//! This crate defines the "language" both ends of a session speak:
//!
//! - **[`Message`]**: the six-kind vocabulary (`connect`, `accept`,
//!   `receive`, `send`, `disconnect`, `close`) and its sequencing rules.
//! - **[`Payload`]**: the text-or-bytes content of a data frame.
//! - **[`ProtocolViolation`]**: the shared out-of-sequence error.
//!
//! # Architecture
//!
//! The vocabulary sits between transport (how messages move) and session
//! (what the application does with them). It carries no behavior of its
//! own beyond construction and classification; the engine and the test
//! harness both enforce the sequencing rules against these definitions.
//!
//! ```text
//! Transport (endpoints) → Protocol (Message) → Session (handler logic)
//! ```

mod error;
mod message;

pub use error::ProtocolViolation;
pub use message::{Message, MessageKind, Payload};
