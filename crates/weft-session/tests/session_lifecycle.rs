//! Integration tests driving the engine over an in-process duplex pair.
//!
//! Each test plays the remote peer by hand: the engine runs over one
//! endpoint while the test scripts the other.

use std::time::Duration;

use tokio::time::timeout;

use weft_protocol::{Message, MessageKind, Payload};
use weft_session::{run_session, Session, SessionError, SessionOutcome, SessionRequest};
use weft_transport::{duplex, ChannelTransport, Transport};

const LONG: Duration = Duration::from_secs(1);
const SHORT: Duration = Duration::from_millis(50);

// =========================================================================
// Handlers under test
// =========================================================================

/// Reads one payload and sends it back unchanged.
async fn echo_once(session: Session) -> Result<(), SessionError> {
    let payload = session.receive().await;
    session.send(payload).await
}

/// Never stops reading.
async fn reads_forever(session: Session) -> Result<(), SessionError> {
    loop {
        let _ = session.receive().await;
    }
}

/// Never touches the session at all.
async fn idles_forever(_session: Session) -> Result<(), SessionError> {
    std::future::pending().await
}

/// Fails after consuming one message.
async fn fails_after_one(session: Session) -> Result<(), SessionError> {
    let _ = session.receive().await;
    Err(SessionError::app("handler gave up"))
}

async fn panics(_session: Session) -> Result<(), SessionError> {
    panic!("handler exploded")
}

/// Keeps sending until the peer is gone.
async fn sends_forever(session: Session) -> Result<(), SessionError> {
    loop {
        session.send("ping").await?;
        tokio::task::yield_now().await;
    }
}

/// Asserts the messages arrive in transport order, then reports back.
async fn expects_three_in_order(session: Session) -> Result<(), SessionError> {
    for expected in ["one", "two", "three"] {
        let payload = session.receive().await;
        assert_eq!(payload.as_text(), Some(expected));
    }
    session.send("done").await
}

async fn expects_beta(session: Session) -> Result<(), SessionError> {
    assert_eq!(session.subprotocol(), Some("beta"));
    Ok(())
}

/// Asserts no subprotocol was chosen, then echoes one payload.
async fn expects_no_protocol(session: Session) -> Result<(), SessionError> {
    assert_eq!(session.subprotocol(), None);
    let payload = session.receive().await;
    session.send(payload).await
}

// =========================================================================
// Helpers
// =========================================================================

fn protocols(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

async fn open_from_peer(peer: &ChannelTransport) {
    peer.send(Message::Connect).await.unwrap();
    match peer.receive().await.unwrap() {
        Message::Accept { .. } => {}
        other => panic!("expected Accept, got {other:?}"),
    }
}

// =========================================================================
// Handshake
// =========================================================================

#[tokio::test]
async fn test_handshake_connect_then_accept_then_close() {
    let (peer, inside) = duplex(8);
    let engine = run_session(inside, SessionRequest::new("/echo"), &[], &echo_once);

    let script = async {
        open_from_peer(&peer).await;
        peer.send(Message::receive("data")).await.unwrap();
        assert_eq!(peer.receive().await.unwrap(), Message::send("data"));
        assert_eq!(peer.receive().await.unwrap(), Message::Close);
    };

    let (outcome, ()) = timeout(LONG, async { tokio::join!(engine, script) }).await.unwrap();
    assert_eq!(outcome.unwrap(), SessionOutcome::Completed);
}

#[tokio::test]
async fn test_handshake_rejects_data_before_connect() {
    let (peer, inside) = duplex(8);
    let engine = run_session(inside, SessionRequest::new("/echo"), &[], &echo_once);

    let script = async {
        peer.send(Message::receive("too soon")).await.unwrap();
        // Refusal is a bare Close; no Accept is ever sent.
        assert_eq!(peer.receive().await.unwrap(), Message::Close);
    };

    let (outcome, ()) = timeout(LONG, async { tokio::join!(engine, script) }).await.unwrap();
    match outcome {
        Err(SessionError::HandshakeFailed { got: MessageKind::Receive }) => {}
        other => panic!("expected HandshakeFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_handshake_refuses_when_no_subprotocol_matches() {
    let (peer, inside) = duplex(8);
    let accepted = protocols(&["alpha"]);
    let request = SessionRequest::new("/pick").subprotocols(["gamma"]);
    let engine = run_session(inside, request, &accepted, &echo_once);

    let script = async {
        peer.send(Message::Connect).await.unwrap();
        assert_eq!(peer.receive().await.unwrap(), Message::Close);
    };

    let (outcome, ()) = timeout(LONG, async { tokio::join!(engine, script) }).await.unwrap();
    match outcome {
        Err(SessionError::NoCompatibleSubprotocol) => {}
        other => panic!("expected NoCompatibleSubprotocol, got {other:?}"),
    }
}

#[tokio::test]
async fn test_accept_carries_first_requested_match() {
    let (peer, inside) = duplex(8);
    let accepted = protocols(&["alpha", "beta"]);
    let request = SessionRequest::new("/pick").subprotocols(["gamma", "beta", "alpha"]);
    let engine = run_session(inside, request, &accepted, &expects_beta);

    let script = async {
        peer.send(Message::Connect).await.unwrap();
        match peer.receive().await.unwrap() {
            Message::Accept { subprotocol } => {
                assert_eq!(subprotocol.as_deref(), Some("beta"));
            }
            other => panic!("expected Accept, got {other:?}"),
        }
        assert_eq!(peer.receive().await.unwrap(), Message::Close);
    };

    let (outcome, ()) = timeout(LONG, async { tokio::join!(engine, script) }).await.unwrap();
    assert_eq!(outcome.unwrap(), SessionOutcome::Completed);
}

#[tokio::test]
async fn test_handshake_accepts_any_request_when_nothing_is_declared() {
    let (peer, inside) = duplex(8);
    // An endpoint declaring no protocols takes whatever is requested.
    let request = SessionRequest::new("/open").subprotocols(["gamma", "alpha"]);
    let engine = run_session(inside, request, &[], &expects_no_protocol);

    let script = async {
        peer.send(Message::Connect).await.unwrap();
        match peer.receive().await.unwrap() {
            Message::Accept { subprotocol } => assert_eq!(subprotocol, None),
            other => panic!("expected Accept, got {other:?}"),
        }
        peer.send(Message::receive("still on")).await.unwrap();
        assert_eq!(peer.receive().await.unwrap(), Message::send("still on"));
        assert_eq!(peer.receive().await.unwrap(), Message::Close);
    };

    let (outcome, ()) = timeout(LONG, async { tokio::join!(engine, script) }).await.unwrap();
    assert_eq!(outcome.unwrap(), SessionOutcome::Completed);
}

// =========================================================================
// Disconnects and cancellation
// =========================================================================

#[tokio::test]
async fn test_disconnect_cancels_blocked_reader() {
    let (peer, inside) = duplex(8);
    let engine = run_session(inside, SessionRequest::new("/r"), &[], &reads_forever);

    let script = async {
        open_from_peer(&peer).await;
        peer.send(Message::Disconnect).await.unwrap();
    };

    let (outcome, ()) = timeout(LONG, async { tokio::join!(engine, script) }).await.unwrap();
    assert_eq!(outcome.unwrap(), SessionOutcome::Disconnected);
}

#[tokio::test]
async fn test_disconnect_cancels_handler_that_never_reads() {
    let (peer, inside) = duplex(8);
    let engine = run_session(inside, SessionRequest::new("/idle"), &[], &idles_forever);

    let script = async {
        open_from_peer(&peer).await;
        // The pump must observe this even though the handler never reads.
        peer.send(Message::Disconnect).await.unwrap();
    };

    let (outcome, ()) = timeout(LONG, async { tokio::join!(engine, script) }).await.unwrap();
    assert_eq!(outcome.unwrap(), SessionOutcome::Disconnected);
}

#[tokio::test]
async fn test_no_close_is_sent_after_peer_disconnect() {
    let (peer, inside) = duplex(8);
    let engine = run_session(inside, SessionRequest::new("/r"), &[], &reads_forever);

    let script = async {
        open_from_peer(&peer).await;
        peer.send(Message::Disconnect).await.unwrap();
    };
    let (outcome, ()) = timeout(LONG, async { tokio::join!(engine, script) }).await.unwrap();
    assert_eq!(outcome.unwrap(), SessionOutcome::Disconnected);

    // The engine is done and must not have answered the disconnect.
    match timeout(SHORT, peer.receive()).await {
        Err(_elapsed) => {}
        Ok(other) => panic!("expected silence after disconnect, got {other:?}"),
    }
}

#[tokio::test]
async fn test_send_to_vanished_peer_is_absorbed_as_disconnect() {
    let (peer, inside) = duplex(8);
    let engine = run_session(inside, SessionRequest::new("/s"), &[], &sends_forever);

    let script = async {
        open_from_peer(&peer).await;
        peer.sever();
    };

    let (outcome, ()) = timeout(LONG, async { tokio::join!(engine, script) }).await.unwrap();
    assert_eq!(outcome.unwrap(), SessionOutcome::Disconnected);
}

// =========================================================================
// Failures
// =========================================================================

#[tokio::test]
async fn test_close_reaches_peer_before_handler_error_reports() {
    let (peer, inside) = duplex(8);
    let engine = run_session(inside, SessionRequest::new("/f"), &[], &fails_after_one);

    let script = async {
        open_from_peer(&peer).await;
        peer.send(Message::receive("go")).await.unwrap();
        // Teardown notifies the peer even though the handler failed.
        assert_eq!(peer.receive().await.unwrap(), Message::Close);
    };

    let (outcome, ()) = timeout(LONG, async { tokio::join!(engine, script) }).await.unwrap();
    match outcome {
        Err(SessionError::App(e)) => assert_eq!(e.to_string(), "handler gave up"),
        other => panic!("expected App error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_out_of_sequence_inbound_fails_session_with_close() {
    let (peer, inside) = duplex(8);
    let engine = run_session(inside, SessionRequest::new("/v"), &[], &reads_forever);

    let script = async {
        open_from_peer(&peer).await;
        // A second Connect after the handshake is out of sequence.
        peer.send(Message::Connect).await.unwrap();
        assert_eq!(peer.receive().await.unwrap(), Message::Close);
    };

    let (outcome, ()) = timeout(LONG, async { tokio::join!(engine, script) }).await.unwrap();
    match outcome {
        Err(SessionError::Violation(v)) => {
            assert_eq!(v.got, MessageKind::Connect);
        }
        other => panic!("expected Violation, got {other:?}"),
    }
}

#[tokio::test]
async fn test_handler_panic_is_resumed_after_close() {
    let (peer, inside) = duplex(8);
    let engine = tokio::spawn(async move {
        run_session(inside, SessionRequest::new("/p"), &[], &panics).await
    });

    open_from_peer(&peer).await;
    // The peer is still told the session is over.
    assert_eq!(
        timeout(LONG, peer.receive()).await.unwrap().unwrap(),
        Message::Close
    );

    let joined = timeout(LONG, engine).await.unwrap();
    assert!(joined.unwrap_err().is_panic());
}

// =========================================================================
// Ordering
// =========================================================================

#[tokio::test]
async fn test_receive_preserves_transport_order() {
    let (peer, inside) = duplex(8);
    let engine =
        run_session(inside, SessionRequest::new("/ord"), &[], &expects_three_in_order);

    let script = async {
        open_from_peer(&peer).await;
        for text in ["one", "two", "three"] {
            peer.send(Message::receive(text)).await.unwrap();
        }
        assert_eq!(peer.receive().await.unwrap(), Message::send("done"));
        assert_eq!(peer.receive().await.unwrap(), Message::Close);
    };

    let (outcome, ()) = timeout(LONG, async { tokio::join!(engine, script) }).await.unwrap();
    assert_eq!(outcome.unwrap(), SessionOutcome::Completed);
}

// =========================================================================
// Payload mapping
// =========================================================================

#[tokio::test]
async fn test_binary_payloads_round_through_the_session() {
    async fn double_bytes(session: Session) -> Result<(), SessionError> {
        let payload = session.receive().await;
        let mut bytes = payload.as_binary().unwrap().to_vec();
        bytes.extend_from_within(..);
        session.send(bytes).await
    }

    let (peer, inside) = duplex(8);
    let engine = run_session(inside, SessionRequest::new("/b"), &[], &double_bytes);

    let script = async {
        open_from_peer(&peer).await;
        peer.send(Message::receive(vec![1u8, 2])).await.unwrap();
        assert_eq!(
            peer.receive().await.unwrap(),
            Message::send(vec![1u8, 2, 1, 2])
        );
        assert_eq!(peer.receive().await.unwrap(), Message::Close);
    };

    let (outcome, ()) = timeout(LONG, async { tokio::join!(engine, script) }).await.unwrap();
    assert_eq!(outcome.unwrap(), SessionOutcome::Completed);
}

#[tokio::test]
async fn test_json_helpers_round_trip_via_text_frames() {
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct Ping {
        seq: u32,
    }

    async fn bump_seq(session: Session) -> Result<(), SessionError> {
        let ping: Ping = session.receive_json().await?;
        session.send_json(&Ping { seq: ping.seq + 1 }).await
    }

    let (peer, inside) = duplex(8);
    let engine = run_session(inside, SessionRequest::new("/j"), &[], &bump_seq);

    let script = async {
        open_from_peer(&peer).await;
        peer.send(Message::receive(r#"{"seq":6}"#)).await.unwrap();
        match peer.receive().await.unwrap() {
            Message::Send { payload: Payload::Text { text } } => {
                assert_eq!(text, r#"{"seq":7}"#);
            }
            other => panic!("expected a text frame, got {other:?}"),
        }
        assert_eq!(peer.receive().await.unwrap(), Message::Close);
    };

    let (outcome, ()) = timeout(LONG, async { tokio::join!(engine, script) }).await.unwrap();
    assert_eq!(outcome.unwrap(), SessionOutcome::Completed);
}
