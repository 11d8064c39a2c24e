//! WebSocket push transport for native targets, over `tokio-tungstenite`.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;

use crate::transport::{PushReader, PushTransport, PushWriter, TransportError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct WsPushTransport {
    stream: WsStream,
}

impl WsPushTransport {
    /// Connect to the push endpoint. Supports `ws://` and `wss://`.
    pub async fn connect(url: &str) -> Result<Self, TransportError> {
        let (stream, response) = connect_async(url)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        debug!(url, status = %response.status(), "push channel connected");
        Ok(Self { stream })
    }
}

impl PushTransport for WsPushTransport {
    type Reader = WsPushReader;
    type Writer = WsPushWriter;

    fn split(self) -> (Self::Reader, Self::Writer) {
        let (sink, stream) = self.stream.split();
        (WsPushReader { stream }, WsPushWriter { sink })
    }
}

pub struct WsPushReader {
    stream: SplitStream<WsStream>,
}

impl PushReader for WsPushReader {
    /// Next push frame.
    ///
    /// Blank keepalive frames are dropped here, and binary frames carrying
    /// UTF-8 are passed on as text. A close with code 1000 or 1001 reads as a
    /// clean end of stream. Any other close code is an error that carries the
    /// server's code and reason.
    async fn recv(&mut self) -> Result<Option<String>, TransportError> {
        while let Some(frame) = self.stream.next().await {
            let text = match frame {
                Ok(Message::Text(text)) => text.to_string(),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => text,
                    Err(_) => {
                        debug!(len = bytes.len(), "skipping non-UTF-8 push frame");
                        continue;
                    }
                },
                Ok(Message::Close(frame)) => return closed(frame),
                // Pings are answered by tungstenite itself.
                Ok(_) => continue,
                Err(e) => return Err(TransportError::Io(e.to_string())),
            };
            if text.trim().is_empty() {
                continue;
            }
            return Ok(Some(text));
        }
        Ok(None)
    }
}

fn closed(frame: Option<CloseFrame>) -> Result<Option<String>, TransportError> {
    let Some(frame) = frame else {
        return Ok(None);
    };
    debug!(code = u16::from(frame.code), reason = %frame.reason, "push channel closed by server");
    match frame.code {
        CloseCode::Normal | CloseCode::Away => Ok(None),
        code if frame.reason.is_empty() => Err(TransportError::Io(format!(
            "closed by server ({})",
            u16::from(code)
        ))),
        code => Err(TransportError::Io(format!(
            "closed by server ({}): {}",
            u16::from(code),
            frame.reason
        ))),
    }
}

pub struct WsPushWriter {
    sink: SplitSink<WsStream, Message>,
}

impl PushWriter for WsPushWriter {
    async fn send(&mut self, text: &str) -> Result<(), TransportError> {
        self.sink
            .send(Message::text(text))
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }
}
