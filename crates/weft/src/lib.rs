//! # Weft
//!
//! WebSocket session framework: a route table, before-accept guards,
//! lifecycle hooks, and a session engine that supervises one handler
//! task and one frame pump per connection.
//!
//! Handlers are plain async functions over a [`Session`]; the same
//! [`handle_connection`] path serves real sockets (via the bundled
//! server, `server` feature) and in-process test traffic (via
//! `weft-testkit`).
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use weft::prelude::*;
//!
//! async fn echo(session: Session) -> Result<(), SessionError> {
//!     loop {
//!         let payload = session.receive().await;
//!         session.send(payload).await?;
//!     }
//! }
//!
//! # fn main() -> Result<(), WeftError> {
//! let app = App::builder()
//!     .router(Router::new().socket("/echo", SocketEndpoint::new(echo))?)
//!     .build();
//! # let _ = app;
//! # Ok(())
//! # }
//! ```

mod error;
mod handler;
mod hooks;
mod middleware;
mod router;
#[cfg(feature = "server")]
mod server;

pub use error::{ConfigError, WeftError};
pub use handler::{App, AppBuilder, handle_connection};
pub use hooks::{NoHooks, SessionHooks};
pub use middleware::{Guard, OriginGuard, SocketMiddleware};
pub use router::{Router, SocketEndpoint};
#[cfg(feature = "server")]
pub use server::{Server, ServerBuilder};

// Guard implementations name this future type in their signatures.
pub use futures_util::future::BoxFuture;
// The pieces the sub-crates own, re-exported so `weft` alone is enough
// for most applications.
pub use weft_protocol::{Message, MessageKind, Payload, ProtocolViolation};
pub use weft_session::{
    Session, SessionError, SessionId, SessionOutcome, SessionRequest, run_session,
};
pub use weft_transport::{ChannelTransport, Transport, TransportError, duplex};
#[cfg(feature = "server")]
pub use weft_transport::WebSocketTransport;

pub mod prelude {
    //! Everything a handler module usually needs.
    pub use crate::{
        App, ConfigError, Guard, Message, OriginGuard, Payload, Router, Session, SessionError,
        SessionHooks, SessionOutcome, SessionRequest, SocketEndpoint, SocketMiddleware, Transport,
        WeftError, handle_connection,
    };
    #[cfg(feature = "server")]
    pub use crate::Server;
}
