//! Unified error types for the weft framework.

use weft_session::SessionError;
use weft_transport::TransportError;

/// Configuration mistakes caught while assembling an app.
///
/// These fail fast at build time, before any connection is handled.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An endpoint's subprotocol set was declared more than once.
    ///
    /// Each dispatch target carries a single protocol declaration slot;
    /// a second [`subprotocols`](crate::SocketEndpoint::subprotocols)
    /// call would silently shadow the first, so it is rejected instead.
    #[error("subprotocols declared more than once for the same endpoint")]
    MultipleProtocolDefinitions,

    /// Two endpoints were registered under the same path.
    #[error("duplicate route registration for path {path:?}")]
    DuplicateRoute { path: String },
}

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `weft` meta-crate, you deal with this single error
/// type instead of importing errors from each sub-crate. The `#[from]`
/// attribute on each variant auto-generates `From` impls, so the `?`
/// operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum WeftError {
    /// A session-level error (handshake, negotiation, application).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A transport-level error (abandoned connection, send/recv fault).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// An app-assembly error (routes, subprotocol declarations).
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// No route is registered for the requested path.
    #[error("no route registered for path {path:?}")]
    RouteNotFound { path: String },

    /// A guard refused the connection before the handshake.
    #[error("connection refused by guard {guard:?}")]
    Refused { guard: String },

    /// A socket-level failure in the bundled server.
    #[error("server i/o error: {0}")]
    Io(#[from] std::io::Error),
}
