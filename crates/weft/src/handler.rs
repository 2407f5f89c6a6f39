//! The handler adapter: one inbound connection becomes one engine run.
//!
//! [`handle_connection`] is the single entry point both the bundled
//! server and the test harness drive, so real traffic and harness
//! traffic exercise the same route, guard, and hook path.

use std::sync::Arc;

use weft_protocol::Message;
use weft_session::{SessionOutcome, SessionRequest, run_session};
use weft_transport::Transport;

use crate::WeftError;
use crate::hooks::{NoHooks, SessionHooks};
use crate::middleware::{Guard, SocketMiddleware};
use crate::router::{Router, SocketEndpoint};

/// An assembled application: routes, guards, and lifecycle hooks.
///
/// Built once via [`App::builder`] and shared across connections.
pub struct App {
    router: Router,
    guards: Vec<Arc<dyn Guard>>,
    hooks: Arc<dyn SessionHooks>,
}

impl App {
    pub fn builder() -> AppBuilder {
        AppBuilder::new()
    }

    pub(crate) fn resolve(&self, path: &str) -> Option<&Arc<SocketEndpoint>> {
        self.router.resolve(path)
    }
}

/// Builder for [`App`].
pub struct AppBuilder {
    router: Router,
    middleware: Vec<SocketMiddleware>,
    hooks: Arc<dyn SessionHooks>,
}

impl AppBuilder {
    fn new() -> Self {
        Self {
            router: Router::new(),
            middleware: Vec::new(),
            hooks: Arc::new(NoHooks),
        }
    }

    /// Sets the route table.
    pub fn router(mut self, router: Router) -> Self {
        self.router = router;
        self
    }

    /// Sets the ordered middleware list.
    pub fn middleware(mut self, middleware: impl IntoIterator<Item = SocketMiddleware>) -> Self {
        self.middleware = middleware.into_iter().collect();
        self
    }

    /// Sets the lifecycle hooks.
    pub fn hooks(mut self, hooks: impl SessionHooks) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    /// Resolves the middleware list and assembles the app.
    ///
    /// Dropped entries are logged here, once, and never consulted
    /// again.
    pub fn build(self) -> App {
        let mut guards = Vec::new();
        for entry in self.middleware {
            match entry {
                SocketMiddleware::Guard(guard) => guards.push(guard),
                SocketMiddleware::Dropped(name) => {
                    tracing::debug!(middleware = name, "dropped middleware without socket support");
                }
            }
        }
        App {
            router: self.router,
            guards,
            hooks: self.hooks,
        }
    }
}

/// Serves one connection end to end.
///
/// Resolves the route, runs the guards in order, fires the lifecycle
/// hooks, and hands the transport to the session engine. A route miss
/// or a guard refusal answers `close` without ever sending `accept`,
/// so the remote side observes an ordinary refusal.
pub async fn handle_connection<T: Transport>(
    app: &App,
    transport: T,
    request: SessionRequest,
) -> Result<SessionOutcome, WeftError> {
    let Some(endpoint) = app.resolve(request.path()) else {
        tracing::debug!(path = request.path(), "no route for connection");
        refuse(&transport).await;
        return Err(WeftError::RouteNotFound {
            path: request.path().to_string(),
        });
    };

    for guard in &app.guards {
        if !guard.check(&request).await {
            tracing::debug!(
                guard = guard.name(),
                path = request.path(),
                "guard refused connection"
            );
            refuse(&transport).await;
            return Err(WeftError::Refused {
                guard: guard.name().to_string(),
            });
        }
    }

    app.hooks.on_session_start(&request);
    let result = run_session(
        transport,
        request.clone(),
        endpoint.accepted_subprotocols(),
        endpoint.handler(),
    )
    .await;
    app.hooks.on_session_end(&request, &result);
    Ok(result?)
}

/// Answers a refusal: drain the peer's `connect`, then close.
///
/// Best effort on both steps. If the peer is already gone there is
/// nobody left to notify.
async fn refuse<T: Transport>(transport: &T) {
    let _ = transport.receive().await;
    if let Err(e) = transport.send(Message::Close).await {
        tracing::debug!(error = %e, "refusal close not delivered");
    }
}
