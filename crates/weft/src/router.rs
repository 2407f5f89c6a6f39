//! Exact-path route table mapping request paths to socket endpoints.

use std::collections::HashMap;
use std::sync::Arc;

use weft_session::SessionHandler;

use crate::ConfigError;

/// One dispatch target: a session handler plus the subprotocols it
/// accepts.
///
/// Plain async functions taking a [`Session`](weft_session::Session)
/// register directly:
///
/// ```rust,ignore
/// let endpoint = SocketEndpoint::new(echo).subprotocols(["summa", "erotus"])?;
/// ```
pub struct SocketEndpoint {
    handler: Arc<dyn SessionHandler>,
    accepted: Vec<String>,
    declared: bool,
}

impl SocketEndpoint {
    /// Wraps a session handler with no accepted subprotocols.
    pub fn new(handler: impl SessionHandler) -> Self {
        Self {
            handler: Arc::new(handler),
            accepted: Vec::new(),
            declared: false,
        }
    }

    /// Declares the subprotocols this endpoint accepts.
    ///
    /// An endpoint carries exactly one declaration slot. A second call
    /// fails with [`ConfigError::MultipleProtocolDefinitions`] rather
    /// than silently shadowing the first, so misconfiguration surfaces
    /// before any connection is handled.
    pub fn subprotocols<I, S>(mut self, accepted: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.declared {
            return Err(ConfigError::MultipleProtocolDefinitions);
        }
        self.declared = true;
        self.accepted = accepted.into_iter().map(Into::into).collect();
        Ok(self)
    }

    /// The subprotocols this endpoint accepts, in declaration order.
    pub fn accepted_subprotocols(&self) -> &[String] {
        &self.accepted
    }

    pub(crate) fn handler(&self) -> &dyn SessionHandler {
        self.handler.as_ref()
    }
}

/// Exact-path route table.
///
/// Paths match exactly; any query string on the request is stripped
/// before lookup.
#[derive(Default)]
pub struct Router {
    routes: HashMap<String, Arc<SocketEndpoint>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an endpoint under an exact path.
    ///
    /// Registering the same path twice fails with
    /// [`ConfigError::DuplicateRoute`].
    pub fn socket(
        mut self,
        path: impl Into<String>,
        endpoint: SocketEndpoint,
    ) -> Result<Self, ConfigError> {
        let path = path.into();
        if self.routes.contains_key(&path) {
            return Err(ConfigError::DuplicateRoute { path });
        }
        self.routes.insert(path, Arc::new(endpoint));
        Ok(self)
    }

    /// Looks up the endpoint for a request path.
    pub(crate) fn resolve(&self, path: &str) -> Option<&Arc<SocketEndpoint>> {
        let path = match path.split_once('?') {
            Some((bare, _query)) => bare,
            None => path,
        };
        self.routes.get(path)
    }
}
