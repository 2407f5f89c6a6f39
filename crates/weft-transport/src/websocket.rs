//! WebSocket-backed [`Transport`] using `tokio-tungstenite`.
//!
//! The bridge translates between wire frames and the session message
//! vocabulary:
//!
//! - a completed upgrade surfaces as a synthetic `Connect` before any
//!   wire traffic is read;
//! - `Accept` is a no-op on the wire (the HTTP upgrade response already
//!   carried the negotiated subprotocol);
//! - `Send` maps to a text or binary frame, `Close` to a close frame;
//! - inbound data frames surface as `Receive`; a close frame or EOF
//!   surfaces as a single `Disconnect`, after which reads fail with
//!   [`TransportError::ConnectionAbandoned`].

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::WebSocketStream;

use weft_protocol::{Message, Payload};

use crate::{Transport, TransportError};

type WsStream = WebSocketStream<TcpStream>;

/// Reader-side lifecycle. `Opening` synthesizes the `Connect`; `Ended`
/// means the peer's close frame (or EOF) has already been surfaced.
enum ReadPhase {
    Opening,
    Open,
    Ended,
}

struct Reader {
    stream: SplitStream<WsStream>,
    phase: ReadPhase,
}

/// Bridges one upgraded WebSocket connection into a [`Transport`].
///
/// The stream halves sit behind separate locks so a blocked read never
/// holds up a write.
pub struct WebSocketTransport {
    reader: Mutex<Reader>,
    writer: Mutex<SplitSink<WsStream, WsMessage>>,
}

impl WebSocketTransport {
    /// Wraps an already-upgraded stream.
    pub fn new(ws: WsStream) -> Self {
        let (writer, stream) = ws.split();
        Self {
            reader: Mutex::new(Reader { stream, phase: ReadPhase::Opening }),
            writer: Mutex::new(writer),
        }
    }

    async fn write(&self, frame: WsMessage) -> Result<(), TransportError> {
        self.writer.lock().await.send(frame).await.map_err(|e| match e {
            WsError::ConnectionClosed | WsError::AlreadyClosed => {
                TransportError::ConnectionAbandoned
            }
            other => TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                other,
            )),
        })
    }
}

impl Transport for WebSocketTransport {
    async fn receive(&self) -> Result<Message, TransportError> {
        let mut reader = self.reader.lock().await;
        match reader.phase {
            ReadPhase::Opening => {
                reader.phase = ReadPhase::Open;
                return Ok(Message::Connect);
            }
            ReadPhase::Ended => return Err(TransportError::ConnectionAbandoned),
            ReadPhase::Open => {}
        }

        loop {
            match reader.stream.next().await {
                Some(Ok(WsMessage::Text(text))) => {
                    return Ok(Message::receive(text.as_str()));
                }
                Some(Ok(WsMessage::Binary(data))) => {
                    return Ok(Message::receive(data.to_vec()));
                }
                Some(Ok(WsMessage::Close(_))) | None => {
                    tracing::debug!("peer closed WebSocket");
                    reader.phase = ReadPhase::Ended;
                    return Ok(Message::Disconnect);
                }
                Some(Ok(_)) => continue, // skip ping/pong/frame
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => {
                    reader.phase = ReadPhase::Ended;
                    return Ok(Message::Disconnect);
                }
                Some(Err(e)) => {
                    reader.phase = ReadPhase::Ended;
                    return Err(TransportError::ReceiveFailed(
                        std::io::Error::new(
                            std::io::ErrorKind::ConnectionReset,
                            e,
                        ),
                    ));
                }
            }
        }
    }

    async fn send(&self, message: Message) -> Result<(), TransportError> {
        match message {
            // The upgrade response already answered the handshake.
            Message::Accept { .. } => Ok(()),
            Message::Send { payload } => {
                let frame = match payload {
                    Payload::Text { text } => WsMessage::Text(text.into()),
                    Payload::Binary { bytes } => WsMessage::Binary(bytes.into()),
                };
                self.write(frame).await
            }
            Message::Close => self.write(WsMessage::Close(None)).await,
            other => Err(TransportError::InvalidOutbound(other.kind())),
        }
    }
}
