//! Integration tests for the handler adapter: routing, guards, hooks.
//!
//! Each test wires an [`App`] to one end of a duplex pair and plays
//! the remote peer over the other end.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::timeout;

use weft::{
    App, BoxFuture, Guard, OriginGuard, Router, SessionHooks, SocketEndpoint, SocketMiddleware,
    WeftError, handle_connection,
};
use weft_protocol::Message;
use weft_session::{Session, SessionError, SessionOutcome, SessionRequest};
use weft_transport::{ChannelTransport, Transport, duplex};

const LONG: Duration = Duration::from_secs(1);

// =========================================================================
// Handlers and guards under test
// =========================================================================

async fn echo(session: Session) -> Result<(), SessionError> {
    loop {
        let payload = session.receive().await;
        session.send(payload).await?;
    }
}

async fn fails_immediately(_session: Session) -> Result<(), SessionError> {
    Err(SessionError::app("handler refused to work"))
}

/// Records its name into a shared log, then allows or refuses.
struct RecordingGuard {
    name: &'static str,
    allow: bool,
    log: Arc<Mutex<Vec<&'static str>>>,
}

impl Guard for RecordingGuard {
    fn name(&self) -> &str {
        self.name
    }

    fn check<'a>(&'a self, _request: &'a SessionRequest) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            self.log.lock().unwrap().push(self.name);
            self.allow
        })
    }
}

#[derive(Default)]
struct HookLog {
    started: AtomicUsize,
    endings: Mutex<Vec<bool>>,
}

struct CountingHooks {
    log: Arc<HookLog>,
}

impl SessionHooks for CountingHooks {
    fn on_session_start(&self, _request: &SessionRequest) {
        self.log.started.fetch_add(1, Ordering::SeqCst);
    }

    fn on_session_end(
        &self,
        _request: &SessionRequest,
        result: &Result<SessionOutcome, SessionError>,
    ) {
        self.log.endings.lock().unwrap().push(result.is_ok());
    }
}

// =========================================================================
// Helpers
// =========================================================================

fn echo_app() -> App {
    App::builder()
        .router(
            Router::new()
                .socket("/echo", SocketEndpoint::new(echo))
                .unwrap(),
        )
        .build()
}

async fn open_from_peer(peer: &ChannelTransport) {
    peer.send(Message::Connect).await.unwrap();
    match peer.receive().await.unwrap() {
        Message::Accept { .. } => {}
        other => panic!("expected Accept, got {other:?}"),
    }
}

/// Connects and expects the refusal shape: a bare Close, no Accept.
async fn expect_refusal(peer: &ChannelTransport) {
    peer.send(Message::Connect).await.unwrap();
    assert_eq!(peer.receive().await.unwrap(), Message::Close);
}

// =========================================================================
// Routing
// =========================================================================

#[tokio::test]
async fn test_route_dispatch_reaches_handler() {
    let app = echo_app();
    let (peer, inside) = duplex(8);
    let serving = handle_connection(&app, inside, SessionRequest::new("/echo"));

    let script = async {
        open_from_peer(&peer).await;
        peer.send(Message::receive("ping")).await.unwrap();
        assert_eq!(peer.receive().await.unwrap(), Message::send("ping"));
        peer.send(Message::Disconnect).await.unwrap();
    };

    let (result, ()) = timeout(LONG, async { tokio::join!(serving, script) })
        .await
        .unwrap();
    assert!(matches!(result, Ok(SessionOutcome::Disconnected)));
}

#[tokio::test]
async fn test_query_string_does_not_affect_routing() {
    let app = echo_app();
    let (peer, inside) = duplex(8);
    let serving = handle_connection(&app, inside, SessionRequest::new("/echo?token=abc"));

    let script = async {
        open_from_peer(&peer).await;
        peer.send(Message::Disconnect).await.unwrap();
    };

    let (result, ()) = timeout(LONG, async { tokio::join!(serving, script) })
        .await
        .unwrap();
    assert!(matches!(result, Ok(SessionOutcome::Disconnected)));
}

#[tokio::test]
async fn test_route_miss_refuses_without_accept() {
    let app = echo_app();
    let (peer, inside) = duplex(8);
    let serving = handle_connection(&app, inside, SessionRequest::new("/nope"));

    let (result, ()) = timeout(LONG, async { tokio::join!(serving, expect_refusal(&peer)) })
        .await
        .unwrap();
    match result {
        Err(WeftError::RouteNotFound { path }) => assert_eq!(path, "/nope"),
        other => panic!("expected RouteNotFound, got {other:?}"),
    }
}

// =========================================================================
// Guards
// =========================================================================

#[tokio::test]
async fn test_guard_refusal_closes_before_accept() {
    let app = App::builder()
        .router(
            Router::new()
                .socket("/echo", SocketEndpoint::new(echo))
                .unwrap(),
        )
        .middleware([SocketMiddleware::guard(OriginGuard::new([
            "https://example.com",
        ]))])
        .build();

    let (peer, inside) = duplex(8);
    let request = SessionRequest::new("/echo").header("Origin", "https://evil.example");
    let serving = handle_connection(&app, inside, request);

    let (result, ()) = timeout(LONG, async { tokio::join!(serving, expect_refusal(&peer)) })
        .await
        .unwrap();
    match result {
        Err(WeftError::Refused { guard }) => assert_eq!(guard, "origin"),
        other => panic!("expected Refused, got {other:?}"),
    }
}

#[tokio::test]
async fn test_guards_run_in_order_and_stop_at_first_refusal() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let app = App::builder()
        .router(
            Router::new()
                .socket("/echo", SocketEndpoint::new(echo))
                .unwrap(),
        )
        .middleware([
            SocketMiddleware::guard(RecordingGuard {
                name: "first",
                allow: true,
                log: Arc::clone(&log),
            }),
            SocketMiddleware::guard(RecordingGuard {
                name: "second",
                allow: false,
                log: Arc::clone(&log),
            }),
            SocketMiddleware::guard(RecordingGuard {
                name: "third",
                allow: true,
                log: Arc::clone(&log),
            }),
        ])
        .build();

    let (peer, inside) = duplex(8);
    let serving = handle_connection(&app, inside, SessionRequest::new("/echo"));

    let (result, ()) = timeout(LONG, async { tokio::join!(serving, expect_refusal(&peer)) })
        .await
        .unwrap();
    match result {
        Err(WeftError::Refused { guard }) => assert_eq!(guard, "second"),
        other => panic!("expected Refused, got {other:?}"),
    }
    assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
}

#[tokio::test]
async fn test_dropped_middleware_entries_are_skipped() {
    let app = App::builder()
        .router(
            Router::new()
                .socket("/echo", SocketEndpoint::new(echo))
                .unwrap(),
        )
        .middleware([
            SocketMiddleware::dropped("csrf"),
            SocketMiddleware::dropped("gzip"),
        ])
        .build();

    let (peer, inside) = duplex(8);
    let serving = handle_connection(&app, inside, SessionRequest::new("/echo"));

    let script = async {
        open_from_peer(&peer).await;
        peer.send(Message::Disconnect).await.unwrap();
    };

    let (result, ()) = timeout(LONG, async { tokio::join!(serving, script) })
        .await
        .unwrap();
    assert!(matches!(result, Ok(SessionOutcome::Disconnected)));
}

// =========================================================================
// Hooks
// =========================================================================

#[tokio::test]
async fn test_hooks_fire_around_a_clean_session() {
    let log = Arc::new(HookLog::default());
    let app = App::builder()
        .router(
            Router::new()
                .socket("/echo", SocketEndpoint::new(echo))
                .unwrap(),
        )
        .hooks(CountingHooks {
            log: Arc::clone(&log),
        })
        .build();

    let (peer, inside) = duplex(8);
    let serving = handle_connection(&app, inside, SessionRequest::new("/echo"));

    let script = async {
        open_from_peer(&peer).await;
        peer.send(Message::Disconnect).await.unwrap();
    };

    let (result, ()) = timeout(LONG, async { tokio::join!(serving, script) })
        .await
        .unwrap();
    assert!(result.is_ok());
    assert_eq!(log.started.load(Ordering::SeqCst), 1);
    assert_eq!(*log.endings.lock().unwrap(), vec![true]);
}

#[tokio::test]
async fn test_hooks_observe_handler_failure() {
    let log = Arc::new(HookLog::default());
    let app = App::builder()
        .router(
            Router::new()
                .socket("/fail", SocketEndpoint::new(fails_immediately))
                .unwrap(),
        )
        .hooks(CountingHooks {
            log: Arc::clone(&log),
        })
        .build();

    let (peer, inside) = duplex(8);
    let serving = handle_connection(&app, inside, SessionRequest::new("/fail"));

    let script = async {
        open_from_peer(&peer).await;
        assert_eq!(peer.receive().await.unwrap(), Message::Close);
    };

    let (result, ()) = timeout(LONG, async { tokio::join!(serving, script) })
        .await
        .unwrap();
    match result {
        Err(WeftError::Session(SessionError::App(e))) => {
            assert_eq!(e.to_string(), "handler refused to work");
        }
        other => panic!("expected App error, got {other:?}"),
    }
    assert_eq!(log.started.load(Ordering::SeqCst), 1);
    assert_eq!(*log.endings.lock().unwrap(), vec![false]);
}

#[tokio::test]
async fn test_hooks_do_not_fire_for_refused_connections() {
    let log = Arc::new(HookLog::default());
    let app = App::builder()
        .router(
            Router::new()
                .socket("/echo", SocketEndpoint::new(echo))
                .unwrap(),
        )
        .middleware([SocketMiddleware::guard(OriginGuard::new([
            "https://example.com",
        ]))])
        .hooks(CountingHooks {
            log: Arc::clone(&log),
        })
        .build();

    let (peer, inside) = duplex(8);
    let serving = handle_connection(&app, inside, SessionRequest::new("/echo"));

    let (result, ()) = timeout(LONG, async { tokio::join!(serving, expect_refusal(&peer)) })
        .await
        .unwrap();
    assert!(matches!(result, Err(WeftError::Refused { .. })));
    assert_eq!(log.started.load(Ordering::SeqCst), 0);
    assert!(log.endings.lock().unwrap().is_empty());
}

// =========================================================================
// Subprotocol declarations on routes
// =========================================================================

#[tokio::test]
async fn test_route_declared_subprotocol_is_negotiated() {
    async fn expects_erotus(session: Session) -> Result<(), SessionError> {
        assert_eq!(session.subprotocol(), Some("erotus"));
        Ok(())
    }

    let app = App::builder()
        .router(
            Router::new()
                .socket(
                    "/calc",
                    SocketEndpoint::new(expects_erotus)
                        .subprotocols(["summa", "erotus"])
                        .unwrap(),
                )
                .unwrap(),
        )
        .build();

    let (peer, inside) = duplex(8);
    let request = SessionRequest::new("/calc").subprotocols(["erotus"]);
    let serving = handle_connection(&app, inside, request);

    let script = async {
        peer.send(Message::Connect).await.unwrap();
        match peer.receive().await.unwrap() {
            Message::Accept { subprotocol } => {
                assert_eq!(subprotocol.as_deref(), Some("erotus"));
            }
            other => panic!("expected Accept, got {other:?}"),
        }
        assert_eq!(peer.receive().await.unwrap(), Message::Close);
    };

    let (result, ()) = timeout(LONG, async { tokio::join!(serving, script) })
        .await
        .unwrap();
    assert!(matches!(result, Ok(SessionOutcome::Completed)));
}

#[tokio::test]
async fn test_disjoint_subprotocol_request_is_refused() {
    let app = App::builder()
        .router(
            Router::new()
                .socket(
                    "/calc",
                    SocketEndpoint::new(echo)
                        .subprotocols(["summa", "erotus"])
                        .unwrap(),
                )
                .unwrap(),
        )
        .build();

    let (peer, inside) = duplex(8);
    let request = SessionRequest::new("/calc").subprotocols(["json"]);
    let serving = handle_connection(&app, inside, request);

    let (result, ()) = timeout(LONG, async { tokio::join!(serving, expect_refusal(&peer)) })
        .await
        .unwrap();
    assert!(matches!(
        result,
        Err(WeftError::Session(SessionError::NoCompatibleSubprotocol))
    ));
}
