//! Harness entry point: build an app once, open sessions against it.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use weft::{App, handle_connection};
use weft_protocol::Message;
use weft_session::SessionRequest;
use weft_transport::{ChannelTransport, DEFAULT_CAPACITY, Transport, duplex};

use crate::error::HarnessError;
use crate::session::TestSession;

/// Default wait for the application to answer the handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(100);

/// Default wait for each peer-side receive.
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(1);

/// Severs the duplex pair when the application stack ends, however it
/// ends, so peer-side operations fail fast instead of hanging.
struct SeverOnDrop(ChannelTransport);

impl Drop for SeverOnDrop {
    fn drop(&mut self) {
        self.0.sever();
    }
}

/// Drives a whole [`App`] over an in-process duplex pair.
///
/// The harness plays the remote peer: it performs the client half of
/// the handshake and hands the test a [`TestSession`] speaking plain
/// payloads. Sessions opened here run the same route, guard, and hook
/// path as connections served by the bundled server.
///
/// ```rust,ignore
/// let tester = WebSocketTester::new(app);
/// let mut session = tester.connect("/echo").open().await?;
/// session.send("hello").await?;
/// assert_eq!(session.receive().await?.as_text(), Some("hello"));
/// session.close().await?;
/// ```
pub struct WebSocketTester {
    app: Arc<App>,
    handshake_timeout: Duration,
    receive_timeout: Duration,
    capacity: usize,
}

impl WebSocketTester {
    pub fn new(app: App) -> Self {
        Self {
            app: Arc::new(app),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
            capacity: DEFAULT_CAPACITY,
        }
    }

    /// Overrides the handshake wait (default 100 ms).
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Overrides the per-receive wait (default 1 s).
    pub fn receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    /// Overrides the message capacity of each queue in the pair.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Starts building a connection to `path`.
    pub fn connect(&self, path: impl Into<String>) -> Connect<'_> {
        Connect {
            tester: self,
            request: SessionRequest::new(path),
        }
    }
}

/// One pending connection: path plus optional headers and subprotocols.
pub struct Connect<'a> {
    tester: &'a WebSocketTester,
    request: SessionRequest,
}

impl Connect<'_> {
    /// Requests these subprotocols, in preference order.
    pub fn subprotocols<I, S>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.request = self.request.subprotocols(protocols);
        self
    }

    /// Adds one request header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request = self.request.header(name, value);
        self
    }

    /// Spawns the application stack and performs the peer handshake.
    ///
    /// Fails with [`HarnessError::ConnectionRefused`] when the
    /// application actively turns the connection away (bad route,
    /// guard refusal, no compatible subprotocol), and with
    /// [`HarnessError::PeerTimedOut`] when it simply never answers.
    pub async fn open(self) -> Result<TestSession, HarnessError> {
        let tester = self.tester;
        let (peer, inside) = duplex(tester.capacity);
        let app = Arc::clone(&tester.app);
        let request = self.request;
        tracing::debug!(path = request.path(), "opening harness session");

        let guard_end = inside.clone();
        let stack = tokio::spawn(async move {
            let _sever = SeverOnDrop(guard_end);
            handle_connection(&app, inside, request).await
        });

        let mut session = TestSession::new(peer, stack, tester.receive_timeout);
        match handshake(&session, tester.handshake_timeout).await {
            Ok(subprotocol) => {
                session.set_subprotocol(subprotocol);
                Ok(session)
            }
            Err(e) => {
                session.abandon().await;
                Err(e)
            }
        }
    }
}

/// Client half of the handshake: send `connect`, wait for `accept`.
///
/// Both steps run under the handshake timeout so a wedged application
/// stack surfaces as [`HarnessError::PeerTimedOut`] rather than a
/// hanging test.
async fn handshake(
    session: &TestSession,
    handshake_timeout: Duration,
) -> Result<Option<String>, HarnessError> {
    let peer = session.peer();

    match timeout(handshake_timeout, peer.send(Message::Connect)).await {
        Ok(Ok(())) => {}
        Ok(Err(_abandoned)) => return Err(HarnessError::ConnectionRefused),
        Err(_elapsed) => return Err(HarnessError::PeerTimedOut(handshake_timeout)),
    }

    match timeout(handshake_timeout, peer.receive()).await {
        Ok(Ok(Message::Accept { subprotocol })) => Ok(subprotocol),
        Ok(Ok(Message::Close | Message::Disconnect)) => Err(HarnessError::ConnectionRefused),
        Ok(Ok(other)) => Err(HarnessError::HandshakeFailed { got: other.kind() }),
        Ok(Err(_abandoned)) => Err(HarnessError::ConnectionRefused),
        Err(_elapsed) => Err(HarnessError::PeerTimedOut(handshake_timeout)),
    }
}
