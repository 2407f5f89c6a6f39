//! The protocol engine: handshake, frame pump, supervision, teardown.
//!
//! [`run_session`] owns one connection end to end. After the
//! `Connect`/`Accept` handshake it runs the application handler and the
//! frame pump as independent tasks and races them; whichever finishes
//! first decides the session's fate, the loser is cancelled and its
//! cancellation awaited before teardown touches the transport. The
//! absorbed peer-disconnect cancellation is the one error this module
//! deliberately swallows; every other failure reaches the caller, but
//! only after the peer has been told the session is over.

use std::any::Any;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio::sync::mpsc;
use tokio::task::JoinError;

use weft_protocol::{Message, Payload, ProtocolViolation};
use weft_transport::{Transport, TransportError};

use crate::subprotocol::negotiate;
use crate::{Session, SessionError, SessionHandler, SessionId, SessionOutcome, SessionRequest};

// ---------------------------------------------------------------------------
// Transport erasure
// ---------------------------------------------------------------------------

/// Object-safe mirror of [`Transport`], so the [`Session`] handle and
/// the pump need not be generic over the concrete transport.
pub(crate) trait SessionTransport: Send + Sync {
    fn incoming(&self) -> BoxFuture<'_, Result<Message, TransportError>>;
    fn outgoing(&self, message: Message) -> BoxFuture<'_, Result<(), TransportError>>;
}

impl<T: Transport> SessionTransport for T {
    fn incoming(&self) -> BoxFuture<'_, Result<Message, TransportError>> {
        Box::pin(Transport::receive(self))
    }

    fn outgoing(&self, message: Message) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(Transport::send(self, message))
    }
}

// ---------------------------------------------------------------------------
// Frame pump
// ---------------------------------------------------------------------------

/// Why the frame pump stopped.
#[derive(Debug)]
enum PumpEnd {
    /// Peer sent `Disconnect`.
    Disconnected,
    /// Peer sent a message out of sequence.
    Violation(ProtocolViolation),
    /// The transport failed underneath the session.
    Transport(TransportError),
}

/// Drains inbound messages into the session queue until the peer is
/// done. Runs regardless of whether the handler ever reads, so a
/// disconnect is observed promptly.
async fn frame_pump(
    transport: Arc<dyn SessionTransport>,
    inbox: mpsc::UnboundedSender<Payload>,
) -> PumpEnd {
    loop {
        match transport.incoming().await {
            Ok(Message::Receive { payload }) => {
                // The handle may already be gone while the peer still
                // talks; keep draining so the disconnect is observed.
                let _ = inbox.send(payload);
            }
            Ok(Message::Disconnect) => return PumpEnd::Disconnected,
            Ok(other) => {
                return PumpEnd::Violation(ProtocolViolation::new(
                    "receive or disconnect",
                    other.kind(),
                ));
            }
            Err(e) => return PumpEnd::Transport(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Supervision
// ---------------------------------------------------------------------------

/// Internal verdict carried from the race to teardown.
enum Verdict {
    Completed,
    Disconnected,
    Failed(SessionError),
    Panicked(Box<dyn Any + Send>),
}

/// What the handler task had to say when joined, regardless of which
/// side won the race. A real result always beats the abort.
fn handler_verdict(ack: Result<Result<(), SessionError>, JoinError>) -> Option<Verdict> {
    match ack {
        Ok(Ok(())) => Some(Verdict::Completed),
        Ok(Err(SessionError::Disconnected)) => Some(Verdict::Disconnected),
        Ok(Err(e)) => Some(Verdict::Failed(e)),
        Err(e) if e.is_panic() => Some(Verdict::Panicked(e.into_panic())),
        // Cancelled: the expected acknowledgment of an abort.
        Err(_) => None,
    }
}

/// Verdict and whether the peer is already gone (suppresses the
/// teardown `Close`) when the pump finished first.
fn settle_pump_first(
    pump_end: Result<PumpEnd, JoinError>,
    ack: Result<Result<(), SessionError>, JoinError>,
) -> (Verdict, bool) {
    let handler = handler_verdict(ack);
    match pump_end {
        Ok(PumpEnd::Disconnected) => (handler.unwrap_or(Verdict::Disconnected), true),
        Ok(PumpEnd::Transport(TransportError::ConnectionAbandoned)) => {
            (handler.unwrap_or(Verdict::Disconnected), true)
        }
        Ok(PumpEnd::Violation(v)) => {
            let verdict = match handler {
                Some(won @ (Verdict::Panicked(_) | Verdict::Failed(_))) => won,
                _ => Verdict::Failed(SessionError::Violation(v)),
            };
            (verdict, false)
        }
        Ok(PumpEnd::Transport(e)) => {
            let verdict = match handler {
                Some(won @ (Verdict::Panicked(_) | Verdict::Failed(_))) => won,
                _ => Verdict::Failed(SessionError::Transport(e)),
            };
            (verdict, false)
        }
        Err(e) if e.is_panic() => (Verdict::Panicked(e.into_panic()), false),
        Err(_) => (handler.unwrap_or(Verdict::Disconnected), false),
    }
}

fn settle_handler_first(result: Result<Result<(), SessionError>, JoinError>) -> Verdict {
    handler_verdict(result).unwrap_or(Verdict::Disconnected)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Runs one complete session over `transport`.
///
/// Waits for `Connect`, negotiates the subprotocol against
/// `accepted_subprotocols`, sends `Accept`, then supervises `handler`
/// against the frame pump. Teardown always notifies the peer with
/// `Close` unless the peer disconnected first, and only then reports:
///
/// - `Ok(Completed)` when the handler returned cleanly;
/// - `Ok(Disconnected)` when the peer ended the session first (the
///   handler's cancellation is absorbed, never surfaced as an error);
/// - `Err(_)` for handshake failures, violations, transport faults, and
///   handler errors. A panicking handler is torn down the same way and
///   its panic then resumed for the caller.
pub async fn run_session<T: Transport>(
    transport: T,
    request: SessionRequest,
    accepted_subprotocols: &[String],
    handler: &dyn SessionHandler,
) -> Result<SessionOutcome, SessionError> {
    let id = SessionId::next();
    let transport: Arc<dyn SessionTransport> = Arc::new(transport);
    tracing::debug!(%id, path = request.path(), "session opening");

    let subprotocol = match handshake(&*transport, &request, accepted_subprotocols).await {
        Ok(subprotocol) => subprotocol,
        Err(e) => {
            tracing::debug!(%id, error = %e, "handshake failed, refusing");
            let _ = transport.outgoing(Message::Close).await;
            return Err(e);
        }
    };
    match &subprotocol {
        Some(name) => tracing::debug!(%id, subprotocol = %name, "session accepted"),
        None => tracing::debug!(%id, "session accepted"),
    }

    let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
    let session = Session::new(id, request, subprotocol, inbox_rx, Arc::clone(&transport));

    let mut pump = tokio::spawn(frame_pump(Arc::clone(&transport), inbox_tx));
    let mut app = tokio::spawn(handler.call(session));

    let (verdict, peer_gone) = tokio::select! {
        pump_end = &mut pump => {
            app.abort();
            let ack = (&mut app).await;
            settle_pump_first(pump_end, ack)
        }
        result = &mut app => {
            pump.abort();
            let _ = (&mut pump).await;
            (settle_handler_first(result), false)
        }
    };

    if !peer_gone {
        if let Err(e) = transport.outgoing(Message::Close).await {
            tracing::debug!(%id, error = %e, "close message not delivered");
        }
    }

    match verdict {
        Verdict::Completed => {
            tracing::debug!(%id, "session completed");
            Ok(SessionOutcome::Completed)
        }
        Verdict::Disconnected => {
            tracing::debug!(%id, "peer disconnected");
            Ok(SessionOutcome::Disconnected)
        }
        Verdict::Failed(e) => {
            tracing::debug!(%id, error = %e, "session failed");
            Err(e)
        }
        Verdict::Panicked(payload) => std::panic::resume_unwind(payload),
    }
}

/// `Connect` in, `Accept` out. Any failure here means no `Accept` was
/// sent and the caller refuses the connection.
async fn handshake(
    transport: &dyn SessionTransport,
    request: &SessionRequest,
    accepted: &[String],
) -> Result<Option<String>, SessionError> {
    let first = transport.incoming().await?;
    if !matches!(first, Message::Connect) {
        return Err(SessionError::HandshakeFailed { got: first.kind() });
    }
    let subprotocol = negotiate(accepted, request.requested_subprotocols())?;
    transport
        .outgoing(Message::Accept { subprotocol: subprotocol.clone() })
        .await?;
    Ok(subprotocol)
}
