//! Bundled development server: TCP accept loop plus HTTP upgrade.
//!
//! The server owns the socket layer only. Each accepted connection is
//! upgraded with `tokio-tungstenite`, screened against the route table
//! during the upgrade (so a bad path or an impossible subprotocol
//! request is answered with an HTTP error instead of a 101), then
//! bridged into the same [`handle_connection`] path the test harness
//! drives.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};

use weft_session::{SessionRequest, negotiate};
use weft_transport::WebSocketTransport;

use crate::WeftError;
use crate::handler::{App, AppBuilder, handle_connection};
use crate::hooks::SessionHooks;
use crate::middleware::SocketMiddleware;
use crate::router::Router;

/// Builder for configuring and starting a [`Server`].
///
/// # Example
///
/// ```rust,ignore
/// use weft::prelude::*;
///
/// let server = Server::builder()
///     .router(router)
///     .bind("127.0.0.1:9000")
///     .await?;
/// server.serve().await
/// ```
pub struct ServerBuilder {
    app: AppBuilder,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self { app: App::builder() }
    }

    /// Sets the route table.
    pub fn router(mut self, router: Router) -> Self {
        self.app = self.app.router(router);
        self
    }

    /// Sets the ordered middleware list.
    pub fn middleware(mut self, middleware: impl IntoIterator<Item = SocketMiddleware>) -> Self {
        self.app = self.app.middleware(middleware);
        self
    }

    /// Sets the lifecycle hooks.
    pub fn hooks(mut self, hooks: impl SessionHooks) -> Self {
        self.app = self.app.hooks(hooks);
        self
    }

    /// Assembles the app and binds the listener.
    pub async fn bind(self, addr: &str) -> Result<Server, WeftError> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Server {
            listener,
            app: Arc::new(self.app.build()),
        })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running development server.
///
/// Call [`serve()`](Self::serve) to start accepting connections.
pub struct Server {
    listener: TcpListener,
    app: Arc<App>,
}

impl Server {
    /// Creates a new builder.
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the accept loop.
    ///
    /// Each connection is upgraded and served on its own task. Runs
    /// until the process is terminated.
    pub async fn serve(self) -> Result<(), WeftError> {
        tracing::info!(addr = %self.listener.local_addr()?, "weft server running");

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let app = Arc::clone(&self.app);
                    tokio::spawn(async move {
                        if let Err(e) = serve_connection(app, stream).await {
                            tracing::debug!(%peer, error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}

/// Upgrades one TCP stream and runs the session over it.
async fn serve_connection(app: Arc<App>, stream: TcpStream) -> Result<(), WeftError> {
    let mut screened: Option<Result<SessionRequest, WeftError>> = None;
    let upgrade = accept_hdr_async(stream, |request: &Request, response: Response| {
        match screen_upgrade(&app, request, response) {
            Ok((response, parsed)) => {
                screened = Some(Ok(parsed));
                Ok(response)
            }
            Err((error, http)) => {
                screened = Some(Err(error));
                Err(http)
            }
        }
    })
    .await;

    match (upgrade, screened) {
        (Ok(ws), Some(Ok(request))) => {
            let transport = WebSocketTransport::new(ws);
            handle_connection(&app, transport, request).await?;
            Ok(())
        }
        // The callback turned the request away before the 101.
        (Err(_), Some(Err(refusal))) => Err(refusal),
        (Err(e), _) => Err(WeftError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("websocket upgrade failed: {e}"),
        ))),
        // The upgrade cannot succeed without the callback screening it.
        (Ok(_), _) => Err(WeftError::Io(std::io::Error::other(
            "upgrade completed without screening",
        ))),
    }
}

/// Screens an upgrade request against the route table.
///
/// On success, returns the (possibly amended) upgrade response together
/// with the parsed [`SessionRequest`]; the `Sec-WebSocket-Protocol`
/// response header is set from the same negotiation the engine later
/// repeats, so the two always agree. On refusal, returns the error for
/// the caller and the HTTP response for the peer.
fn screen_upgrade(
    app: &App,
    request: &Request,
    mut response: Response,
) -> Result<(Response, SessionRequest), (WeftError, ErrorResponse)> {
    let path = match request.uri().path_and_query() {
        Some(pq) => pq.as_str().to_string(),
        None => request.uri().path().to_string(),
    };

    let requested = requested_subprotocols(request);

    let Some(endpoint) = app.resolve(&path) else {
        tracing::debug!(path, "no route for upgrade request");
        return Err((
            WeftError::RouteNotFound { path },
            http_refusal(StatusCode::NOT_FOUND, "no such socket path"),
        ));
    };

    match negotiate(endpoint.accepted_subprotocols(), &requested) {
        Ok(Some(chosen)) => {
            if let Ok(value) = HeaderValue::from_str(&chosen) {
                response.headers_mut().insert("Sec-WebSocket-Protocol", value);
            }
        }
        Ok(None) => {}
        Err(e) => {
            tracing::debug!(path, "no compatible subprotocol for upgrade request");
            return Err((
                WeftError::Session(e),
                http_refusal(StatusCode::BAD_REQUEST, "no compatible subprotocol"),
            ));
        }
    }

    let mut parsed = SessionRequest::new(path);
    for (name, value) in request.headers() {
        if let Ok(value) = value.to_str() {
            parsed = parsed.header(name.as_str(), value);
        }
    }
    parsed = parsed.subprotocols(requested);

    Ok((response, parsed))
}

/// Collects the `Sec-WebSocket-Protocol` request values in wire order.
fn requested_subprotocols(request: &Request) -> Vec<String> {
    request
        .headers()
        .get_all("Sec-WebSocket-Protocol")
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

fn http_refusal(status: StatusCode, body: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(body.to_string()));
    *response.status_mut() = status;
    response
}
