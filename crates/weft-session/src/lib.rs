//! Session protocol engine for weft.
//!
//! One [`run_session`] call owns one WebSocket session end to end:
//!
//! ```text
//!                    ┌──────────────────────────────┐
//!   Transport ──────▶│ handshake: Connect → Accept  │
//!                    │   (subprotocol negotiation)  │
//!                    ├──────────────┬───────────────┤
//!                    │  frame pump  │    handler    │
//!                    │ (background) │ (application) │
//!                    ├──────────────┴───────────────┤
//!                    │ teardown: Close, then report │
//!                    └──────────────────────────────┘
//! ```
//!
//! The handler sees the session only through the [`Session`] handle:
//! ordered `receive`, payload `send`, and the JSON conveniences. Peer
//! disconnects cancel the handler and come back as the absorbed
//! [`SessionOutcome::Disconnected`]; every real failure is re-raised to
//! the caller after the peer has been notified.

mod dispatch;
mod engine;
mod error;
mod session;
mod subprotocol;

pub use dispatch::SessionHandler;
pub use engine::run_session;
pub use error::{BoxError, SessionError};
pub use session::{Session, SessionId, SessionOutcome, SessionRequest};
pub use subprotocol::negotiate;
