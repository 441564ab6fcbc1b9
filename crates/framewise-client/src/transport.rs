//! Socket transport.
//!
//! [`Transport`] is the seam between [`crate::Connection`] and the network.
//! [`WsTransport`] is the real implementation on top of `tokio-tungstenite`;
//! tests drive the connection with scripted transports instead.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace};

use crate::error::{ConnectError, RecvError, SendError};

/// Boxed future used by the object-safe traits of this crate.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A bidirectional text-frame socket.
pub trait Transport: Send {
    /// Opens the socket to `url`.
    fn open<'a>(&'a mut self, url: &'a str) -> BoxFuture<'a, Result<(), ConnectError>>;

    /// Waits for the next text frame.
    fn next_frame(&mut self) -> BoxFuture<'_, Result<String, RecvError>>;

    /// Writes one text frame.
    fn send_text(&mut self, text: String) -> BoxFuture<'_, Result<(), SendError>>;

    /// Closes the socket. Closing a socket that is not open is a no-op.
    fn close(&mut self) -> BoxFuture<'_, ()>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket transport.
pub struct WsTransport {
    connect_timeout: Duration,
    writer: Option<SplitSink<WsStream, Message>>,
    reader: Option<SplitStream<WsStream>>,
}

impl WsTransport {
    /// Creates a transport that gives up connecting after `connect_timeout`.
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            writer: None,
            reader: None,
        }
    }
}

impl Transport for WsTransport {
    fn open<'a>(&'a mut self, url: &'a str) -> BoxFuture<'a, Result<(), ConnectError>> {
        Box::pin(async move {
            let connecting = connect_async(url);
            let (ws, response) = tokio::time::timeout(self.connect_timeout, connecting)
                .await
                .map_err(|_| ConnectError::Timeout(self.connect_timeout.as_secs()))?
                .map_err(|e| ConnectError::Transport(e.to_string()))?;
            debug!(status = %response.status(), "websocket handshake complete");

            let (writer, reader) = ws.split();
            self.writer = Some(writer);
            self.reader = Some(reader);
            Ok(())
        })
    }

    fn next_frame(&mut self) -> BoxFuture<'_, Result<String, RecvError>> {
        Box::pin(async move {
            let reader = self.reader.as_mut().ok_or(RecvError::NotConnected)?;
            loop {
                match reader.next().await {
                    Some(Ok(Message::Text(text))) => return Ok(text.as_str().to_owned()),
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame.map_or((1005, String::new()), |f| {
                            (u16::from(f.code), f.reason.as_str().to_owned())
                        });
                        return Err(RecvError::Closed { code, reason });
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        trace!(len = bytes.len(), "ignoring binary frame");
                    }
                    // Ping/pong are answered by tungstenite.
                    Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                    Some(Err(e)) => return Err(RecvError::Transport(e.to_string())),
                    None => {
                        return Err(RecvError::Closed {
                            code: 1006,
                            reason: "stream ended".into(),
                        });
                    }
                }
            }
        })
    }

    fn send_text(&mut self, text: String) -> BoxFuture<'_, Result<(), SendError>> {
        Box::pin(async move {
            let writer = self.writer.as_mut().ok_or(SendError::NotConnected)?;
            writer
                .send(Message::Text(text.into()))
                .await
                .map_err(|e| SendError::Transport(e.to_string()))
        })
    }

    fn close(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.reader = None;
            if let Some(mut writer) = self.writer.take() {
                let frame = CloseFrame {
                    code: CloseCode::Normal,
                    reason: "client disconnect".into(),
                };
                if let Err(e) = writer.send(Message::Close(Some(frame))).await {
                    debug!(error = %e, "close frame not delivered");
                }
                let _ = writer.close().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn echo_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            ws.send(Message::Binary(vec![1, 2, 3].into())).await.unwrap();
            while let Some(Ok(msg)) = ws.next().await {
                match msg {
                    Message::Text(text) => {
                        ws.send(Message::Text(format!("echo:{}", text.as_str()).into()))
                            .await
                            .unwrap();
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        });
        format!("ws://{addr}/ws/meeting")
    }

    #[tokio::test]
    async fn test_text_frames_over_local_socket() {
        let url = echo_server().await;
        let mut transport = WsTransport::new(Duration::from_secs(5));
        transport.open(&url).await.unwrap();

        transport.send_text("hello".into()).await.unwrap();
        // The binary frame sent first is skipped.
        assert_eq!(transport.next_frame().await.unwrap(), "echo:hello");

        transport.close().await;
        assert!(matches!(
            transport.next_frame().await,
            Err(RecvError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_unopened_transport() {
        let mut transport = WsTransport::new(Duration::from_secs(1));
        assert!(matches!(
            transport.send_text("x".into()).await,
            Err(SendError::NotConnected)
        ));
        transport.close().await;
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut transport = WsTransport::new(Duration::from_secs(5));
        let url = format!("ws://{addr}/ws/meeting");
        assert!(matches!(
            transport.open(&url).await,
            Err(ConnectError::Transport(_))
        ));
    }
}
