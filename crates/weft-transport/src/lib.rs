//! Transport layer for weft sessions.
//!
//! A [`Transport`] moves [`Message`]s between the session engine and a
//! peer. Two implementations ship with this crate:
//!
//! - [`ChannelTransport`]: an in-process duplex pair built by
//!   [`duplex`], used by the test harness to run sessions without a
//!   network stack.
//! - `WebSocketTransport` (behind the `websocket` feature): bridges a
//!   real WebSocket connection into the session message vocabulary.
//!
//! Both ends of a transport speak the same vocabulary; which kinds a
//! side is allowed to send is enforced above this layer.

mod duplex;
mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use duplex::{duplex, ChannelTransport, DEFAULT_CAPACITY};
pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::WebSocketTransport;

use weft_protocol::Message;

/// Bidirectional message stream between the engine and one peer.
///
/// `receive` resolves with the next inbound message, suspending until
/// one is available. `send` delivers one outbound message, suspending
/// while the transport applies backpressure. Both fail with
/// [`TransportError::ConnectionAbandoned`] once the underlying
/// connection is gone.
///
/// The returned futures are `Send` so sessions can run on multi-threaded
/// executors; implementations are free to write plain `async fn`s.
pub trait Transport: Send + Sync + 'static {
    fn receive(&self)
    -> impl std::future::Future<Output = Result<Message, TransportError>> + Send;

    fn send(
        &self,
        message: Message,
    ) -> impl std::future::Future<Output = Result<(), TransportError>> + Send;
}
