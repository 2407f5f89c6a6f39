//! Before-accept guards and the middleware configuration list.
//!
//! An app carries an ordered list of [`SocketMiddleware`] entries.
//! Active entries are [`Guard`]s, checked against every inbound
//! request before the handshake; entries that have no meaning for
//! socket traffic are declared [`Dropped`](SocketMiddleware::Dropped)
//! by name so the list still documents the full chain.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use weft_session::SessionRequest;

/// A before-accept check run against each inbound session request.
///
/// Guards run in configuration order; the first refusal stops the
/// chain, and the connection is closed without an accept ever being
/// sent.
pub trait Guard: Send + Sync + 'static {
    /// Short name used in refusal errors and logs.
    fn name(&self) -> &str;

    /// Returns `true` to let the request through.
    fn check<'a>(&'a self, request: &'a SessionRequest) -> BoxFuture<'a, bool>;
}

/// One entry in the app's middleware list.
pub enum SocketMiddleware {
    /// An active guard, consulted for every session request.
    Guard(Arc<dyn Guard>),
    /// A named entry excluded from the socket chain.
    ///
    /// Dropped entries are logged once when the app is built and never
    /// consulted afterwards.
    Dropped(&'static str),
}

impl SocketMiddleware {
    /// Wraps a guard as an active entry.
    pub fn guard(guard: impl Guard) -> Self {
        Self::Guard(Arc::new(guard))
    }

    /// Declares a named entry that does not apply to socket traffic.
    pub fn dropped(name: &'static str) -> Self {
        Self::Dropped(name)
    }
}

/// Ready-made guard validating the `Origin` header against an allowed
/// list.
///
/// A request is let through only when it carries an `Origin` header
/// that exactly matches one of the allowed values. Requests with no
/// `Origin` header are refused.
pub struct OriginGuard {
    allowed: Vec<String>,
}

impl OriginGuard {
    /// Builds a guard allowing exactly the listed origins.
    ///
    /// Values are compared verbatim, scheme and port included, e.g.
    /// `"https://example.com"` does not admit `"http://example.com"`.
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: allowed.into_iter().map(Into::into).collect(),
        }
    }
}

impl Guard for OriginGuard {
    fn name(&self) -> &str {
        "origin"
    }

    fn check<'a>(&'a self, request: &'a SessionRequest) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            match request.header_value("origin") {
                Some(origin) => self.allowed.iter().any(|allowed| allowed == origin),
                None => false,
            }
        })
    }
}
