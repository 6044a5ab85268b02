use crate::core::errors::StreamError;
use crate::core::kernel::frame::{Frame, FrameKind};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, instrument};

/// How long a graceful shutdown waits for the peer to acknowledge the close frame
const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Transport socket - the only surface the stream connections depend on
///
/// Implementations deliver framed messages in order. Control frames (ping,
/// pong, close) are reported as such; answering pings is the caller's job.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Read the next frame into `frame`, returning the payload length
    async fn read_frame(&mut self, frame: &mut Frame) -> Result<usize, StreamError>;

    /// Write `frame` to the peer, returning the payload length
    async fn write_frame(&mut self, frame: &Frame) -> Result<usize, StreamError>;

    /// Drop the socket immediately, without a close handshake
    async fn close(&mut self) -> Result<(), StreamError>;

    /// Send a close frame and wait for the peer to acknowledge it
    async fn shutdown(&mut self) -> Result<(), StreamError>;
}

/// Tungstenite-backed transport
pub struct TungsteniteTransport<S> {
    stream: Option<WebSocketStream<S>>,
}

/// Transport produced by dialing a `ws://` or `wss://` URL
pub type WsTransport = TungsteniteTransport<MaybeTlsStream<TcpStream>>;

impl<S> TungsteniteTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Wrap an already established websocket
    pub fn new(stream: WebSocketStream<S>) -> Self {
        Self {
            stream: Some(stream),
        }
    }

    fn socket(&mut self) -> Result<&mut WebSocketStream<S>, StreamError> {
        self.stream.as_mut().ok_or(StreamError::ConnectionClosed)
    }
}

impl WsTransport {
    /// Dial `url` and complete the websocket handshake within `timeout`
    #[instrument(skip_all, fields(url = %url))]
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, StreamError> {
        let (stream, _) = tokio::time::timeout(timeout, connect_async(url))
            .await
            .map_err(|_| {
                StreamError::ConnectionTimeout(format!("WebSocket connection to {} timed out", url))
            })?
            .map_err(|e| {
                StreamError::NetworkError(format!("WebSocket connection to {} failed: {}", url, e))
            })?;

        debug!("websocket connected");
        Ok(Self::new(stream))
    }
}

#[async_trait]
impl<S> Transport for TungsteniteTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn read_frame(&mut self, frame: &mut Frame) -> Result<usize, StreamError> {
        let socket = self.socket()?;
        loop {
            let message = match socket.next().await {
                Some(Ok(message)) => message,
                Some(Err(e)) => return Err(e.into()),
                None => return Err(StreamError::ConnectionClosed),
            };

            match message {
                Message::Text(text) => frame.set(FrameKind::Data, text.as_bytes()),
                Message::Binary(data) => frame.set(FrameKind::Data, &data),
                Message::Ping(data) => frame.set(FrameKind::Ping, &data),
                Message::Pong(data) => frame.set(FrameKind::Pong, &data),
                Message::Close(_) => frame.set(FrameKind::Close, &[]),
                // raw frames are never yielded while reading
                Message::Frame(_) => continue,
            }
            break;
        }

        Ok(frame.payload().len())
    }

    async fn write_frame(&mut self, frame: &Frame) -> Result<usize, StreamError> {
        let payload = frame.payload().to_vec();
        let len = payload.len();
        let message = match frame.kind() {
            FrameKind::Pong => Message::Pong(payload),
            FrameKind::Ping => Message::Ping(payload),
            FrameKind::Close => Message::Close(None),
            FrameKind::Data => match String::from_utf8(payload) {
                Ok(text) => Message::Text(text),
                Err(e) => Message::Binary(e.into_bytes()),
            },
        };

        self.socket()?.send(message).await?;
        Ok(len)
    }

    async fn close(&mut self) -> Result<(), StreamError> {
        if self.stream.take().is_some() {
            debug!("websocket dropped without close handshake");
        }
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), StreamError> {
        let Some(mut socket) = self.stream.take() else {
            return Ok(());
        };

        match socket.close(None).await {
            Ok(()) => {}
            Err(e) => match StreamError::from(e) {
                StreamError::ConnectionClosed => return Ok(()),
                other => return Err(other),
            },
        }

        // drain until the peer echoes the close frame
        let drain = async { while let Some(Ok(_)) = socket.next().await {} };
        if tokio::time::timeout(CLOSE_HANDSHAKE_TIMEOUT, drain).await.is_err() {
            debug!("peer did not acknowledge close frame in time");
        }
        Ok(())
    }
}
