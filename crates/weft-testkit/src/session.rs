//! The session-scoped handle a test drives the application through.

use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::timeout;

use weft::WeftError;
use weft_protocol::{Message, Payload, ProtocolViolation};
use weft_session::SessionOutcome;
use weft_transport::{ChannelTransport, Transport};

use crate::error::HarnessError;

type StackResult = Result<SessionOutcome, WeftError>;

/// One open session, seen from the remote peer's side.
///
/// `send` and `receive` speak plain payloads; the wire bookkeeping
/// (message kinds, the closing exchange) stays inside the harness.
/// Every receive is bounded by the configured timeout. Dropping the
/// handle without [`close`](Self::close) skips leak detection.
#[derive(Debug)]
pub struct TestSession {
    peer: ChannelTransport,
    stack: JoinHandle<StackResult>,
    failure: Option<WeftError>,
    reaped: bool,
    finished: bool,
    subprotocol: Option<String>,
    receive_timeout: Duration,
}

impl TestSession {
    pub(crate) fn new(
        peer: ChannelTransport,
        stack: JoinHandle<StackResult>,
        receive_timeout: Duration,
    ) -> Self {
        Self {
            peer,
            stack,
            failure: None,
            reaped: false,
            finished: false,
            subprotocol: None,
            receive_timeout,
        }
    }

    pub(crate) fn peer(&self) -> &ChannelTransport {
        &self.peer
    }

    pub(crate) fn set_subprotocol(&mut self, subprotocol: Option<String>) {
        self.subprotocol = subprotocol;
    }

    /// Tears the stack down after a failed handshake.
    ///
    /// A panic in the stack still resumes on the test task; everything
    /// else is discarded in favor of the handshake error.
    pub(crate) async fn abandon(&mut self) {
        self.reaped = true;
        self.stack.abort();
        if let Err(join_error) = (&mut self.stack).await {
            if join_error.is_panic() {
                std::panic::resume_unwind(join_error.into_panic());
            }
        }
    }

    /// The subprotocol the application accepted for this session.
    pub fn subprotocol(&self) -> Option<&str> {
        self.subprotocol.as_deref()
    }

    /// Writes one data payload into the application's inbound queue.
    ///
    /// Once the session has ended the queue is severed and the write
    /// reports [`HarnessError::InputNotConsumed`] instead of hanging.
    pub async fn send(&mut self, payload: impl Into<Payload>) -> Result<(), HarnessError> {
        if self.peer.send(Message::receive(payload)).await.is_err() {
            // The stack is gone; surface a pending panic before reporting.
            self.reap().await;
            return Err(HarnessError::InputNotConsumed);
        }
        Ok(())
    }

    /// Serializes `value` and sends it as a text payload.
    pub async fn send_json<T: Serialize>(&mut self, value: &T) -> Result<(), HarnessError> {
        let text = serde_json::to_string(value).map_err(HarnessError::Json)?;
        self.send(text).await
    }

    /// Reads one outbound payload from the application.
    ///
    /// When the application has closed, the first read after the close
    /// delivers its failure if it had one; later reads report
    /// [`HarnessError::SessionEnded`].
    pub async fn receive(&mut self) -> Result<Payload, HarnessError> {
        match self.next().await? {
            Some(payload) => Ok(payload),
            None => Err(self
                .take_failure()
                .map(HarnessError::Application)
                .unwrap_or(HarnessError::SessionEnded)),
        }
    }

    /// Reads one payload and deserializes it from JSON.
    pub async fn receive_json<T: DeserializeOwned>(&mut self) -> Result<T, HarnessError> {
        let payload = self.receive().await?;
        let parsed = match &payload {
            Payload::Text { text } => serde_json::from_str(text),
            Payload::Binary { bytes } => serde_json::from_slice(bytes),
        };
        parsed.map_err(HarnessError::Json)
    }

    /// Yields the next inbound payload, or `None` once the application
    /// has closed. The sequence is fused: it stays `None` after the
    /// close and cannot be restarted.
    pub async fn next(&mut self) -> Result<Option<Payload>, HarnessError> {
        if self.finished {
            return Ok(None);
        }

        let message = match timeout(self.receive_timeout, self.peer.receive()).await {
            Ok(Ok(message)) => message,
            Ok(Err(_abandoned)) => {
                self.reap().await;
                return Err(self
                    .take_failure()
                    .map(HarnessError::Application)
                    .unwrap_or(HarnessError::SessionEnded));
            }
            Err(_elapsed) => return Err(HarnessError::PeerTimedOut(self.receive_timeout)),
        };

        match message {
            Message::Send { payload } => Ok(Some(payload)),
            Message::Close => {
                self.finished = true;
                self.reap().await;
                match self.take_failure() {
                    Some(failure) => Err(HarnessError::Application(failure)),
                    None => Ok(None),
                }
            }
            other => Err(ProtocolViolation::new("send or close", other.kind()).into()),
        }
    }

    /// Ends the session and runs leak detection.
    ///
    /// Sends `disconnect` so a still-reading application is cancelled
    /// the normal way, then races application completion against the
    /// test's input being drained. Reports, in precedence order: the
    /// application's own failure, input the application never
    /// consumed, output the test never read.
    pub async fn close(mut self) -> Result<(), HarnessError> {
        // Best effort: the pair may already be severed or the queue full.
        let _ = timeout(self.receive_timeout, self.peer.send(Message::Disconnect)).await;

        if !self.reaped {
            self.reaped = true;
            tokio::select! {
                joined = &mut self.stack => {
                    self.absorb(joined);
                }
                () = self.peer.outbound_drained() => {
                    // Input fully consumed; allow a grace period for the
                    // stack to wind down before giving up on it.
                    match timeout(self.receive_timeout, &mut self.stack).await {
                        Ok(joined) => self.absorb(joined),
                        Err(_elapsed) => {
                            self.stack.abort();
                            let _ = (&mut self.stack).await;
                        }
                    }
                }
                () = tokio::time::sleep(self.receive_timeout) => {
                    // Neither side settled; a wedged stack must not hang
                    // the test.
                    self.stack.abort();
                    let _ = (&mut self.stack).await;
                }
            }
        }

        if let Some(failure) = self.take_failure() {
            return Err(HarnessError::Application(failure));
        }
        if self.peer.outbound_data_frames() > 0 {
            return Err(HarnessError::InputNotConsumed);
        }
        if self.peer.inbound_data_frames() > 0 {
            return Err(HarnessError::OutputNotConsumed);
        }
        Ok(())
    }

    /// Waits the stack out once and caches its failure.
    ///
    /// Panics from the handler resume here, on the test task.
    async fn reap(&mut self) {
        if self.reaped {
            return;
        }
        self.reaped = true;
        match timeout(self.receive_timeout, &mut self.stack).await {
            Ok(joined) => self.absorb(joined),
            Err(_elapsed) => {
                self.stack.abort();
                let _ = (&mut self.stack).await;
            }
        }
    }

    fn absorb(&mut self, joined: Result<StackResult, JoinError>) {
        match joined {
            Ok(Ok(_outcome)) => {}
            Ok(Err(e)) => self.failure = Some(e),
            Err(join_error) if join_error.is_panic() => {
                std::panic::resume_unwind(join_error.into_panic());
            }
            Err(_cancelled) => {}
        }
    }

    fn take_failure(&mut self) -> Option<WeftError> {
        self.failure.take()
    }
}
