//! Transport abstraction for the push-notification channel.
//!
//! [`PushClient`](crate::push::PushClient) only needs a duplex stream of text
//! frames. Keeping it behind [`PushTransport`] lets tests drive it from an
//! in-memory channel and lets other transports (SSE, a WASM socket) slot in
//! without touching the client.

use std::future::Future;

use thiserror::Error;

/// Errors that can occur on the push channel.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Could not establish the connection.
    #[error("connect failed: {0}")]
    Connect(String),

    /// The remote peer closed the connection.
    #[error("connection closed")]
    ConnectionClosed,

    /// An I/O or protocol-level error on an open connection.
    #[error("{0}")]
    Io(String),
}

/// Inbound half of a push connection.
pub trait PushReader: Send + 'static {
    /// Receive the next text frame.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed. Control
    /// frames (ping/pong, binary) are consumed by the implementation.
    fn recv(&mut self) -> impl Future<Output = Result<Option<String>, TransportError>> + Send;
}

/// Outbound half of a push connection.
pub trait PushWriter: Send + 'static {
    fn send(&mut self, text: &str) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// A duplex push connection that can be split so reads and writes run in
/// separate tasks.
pub trait PushTransport: Send + 'static {
    type Reader: PushReader;
    type Writer: PushWriter;

    fn split(self) -> (Self::Reader, Self::Writer);
}

/// In-memory transport backed by tokio channels.
///
/// Used by tests and by embedders that already receive push frames from
/// somewhere else and only want to feed them in.
pub mod channel {
    use tokio::sync::mpsc;

    use super::{PushReader, PushTransport, PushWriter, TransportError};

    pub struct ChannelTransport {
        inbound: mpsc::UnboundedReceiver<String>,
        outbound: mpsc::UnboundedSender<String>,
    }

    /// Remote end of a [`ChannelTransport`]: push frames in, observe frames
    /// the client sent.
    pub struct ChannelPeer {
        pub to_client: mpsc::UnboundedSender<String>,
        pub from_client: mpsc::UnboundedReceiver<String>,
    }

    pub fn pair() -> (ChannelTransport, ChannelPeer) {
        let (to_client, inbound) = mpsc::unbounded_channel();
        let (outbound, from_client) = mpsc::unbounded_channel();
        (
            ChannelTransport { inbound, outbound },
            ChannelPeer {
                to_client,
                from_client,
            },
        )
    }

    pub struct ChannelReader(mpsc::UnboundedReceiver<String>);
    pub struct ChannelWriter(mpsc::UnboundedSender<String>);

    impl PushTransport for ChannelTransport {
        type Reader = ChannelReader;
        type Writer = ChannelWriter;

        fn split(self) -> (Self::Reader, Self::Writer) {
            (ChannelReader(self.inbound), ChannelWriter(self.outbound))
        }
    }

    impl PushReader for ChannelReader {
        async fn recv(&mut self) -> Result<Option<String>, TransportError> {
            Ok(self.0.recv().await)
        }
    }

    impl PushWriter for ChannelWriter {
        async fn send(&mut self, text: &str) -> Result<(), TransportError> {
            self.0
                .send(text.to_string())
                .map_err(|_| TransportError::ConnectionClosed)
        }
    }
}
