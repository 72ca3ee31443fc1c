//! WebSocket client transport.

use std::time::Duration;

use async_trait::async_trait;
use chatload_core::{InboundEvent, InboundReceiver, Transport, TransportError};
use futures::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use tokio::{net::TcpStream, sync::mpsc, task::JoinHandle};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{self, Message},
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long `close` waits for the peer's close acknowledgement before
/// stopping the reader.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// WebSocket transport holding at most one open connection.
///
/// Inbound frames are forwarded by a reader task to the receiver returned
/// from `connect`, ending with [`InboundEvent::Close`].
#[derive(Default)]
pub struct WebSocketTransport {
    sink: Option<SplitSink<WsStream, Message>>,
    reader: Option<JoinHandle<()>>,
}

impl WebSocketTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn classify_connect_error(err: tungstenite::Error) -> TransportError {
    match err {
        tungstenite::Error::Io(e) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
            TransportError::ConnectRefused(e.to_string())
        }
        tungstenite::Error::Http(response) => {
            TransportError::Connect(format!("handshake rejected with {}", response.status()))
        }
        other => TransportError::Connect(other.to_string()),
    }
}

async fn read_frames(mut stream: SplitStream<WsStream>, tx: mpsc::UnboundedSender<InboundEvent>) {
    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text.to_string(),
            Ok(Message::Binary(data)) => String::from_utf8_lossy(&data).into_owned(),
            Ok(Message::Close(frame)) => {
                tracing::debug!(?frame, "WebSocket closed by peer");
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!("WebSocket error: {e}");
                let _ = tx.send(InboundEvent::Error(e.to_string()));
                break;
            }
        };
        if tx.send(InboundEvent::Message(text)).is_err() {
            return;
        }
    }
    let _ = tx.send(InboundEvent::Close);
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&mut self, address: &str) -> Result<InboundReceiver, TransportError> {
        self.close().await;

        let (socket, response) = connect_async(address)
            .await
            .map_err(classify_connect_error)?;
        tracing::debug!(status = %response.status(), "WebSocket handshake complete");

        let (sink, stream) = socket.split();
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(InboundEvent::Open);

        self.reader = Some(tokio::spawn(read_frames(stream, tx)));
        self.sink = Some(sink);
        Ok(rx)
    }

    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        let sink = self.sink.as_mut().ok_or(TransportError::NotConnected)?;
        sink.send(Message::text(text))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn close(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            if let Err(e) = sink.close().await {
                tracing::debug!("Error while closing WebSocket: {e}");
            }
        }
        // Frames still in flight are forwarded until the peer acknowledges.
        if let Some(mut reader) = self.reader.take() {
            if tokio::time::timeout(CLOSE_GRACE, &mut reader).await.is_err() {
                tracing::debug!("Peer did not acknowledge close, stopping reader");
                reader.abort();
            }
        }
    }

    fn is_open(&self) -> bool {
        self.sink.is_some()
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}
