//! Push-notification client.
//!
//! Spawns background reader/writer tasks over a [`PushTransport`] and
//! exposes only what the sync engine cares about: "the active session
//! changed, fetch it again". Every other frame (other sessions, other
//! message types, garbage) is filtered out in the reader task.
//!
//! Dropping the client unsubscribes and stops the reader task, so a torn
//! down view never keeps receiving notifications.

use quoridor_core::protocol::{PushMessage, SessionId};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::transport::{PushReader, PushTransport, PushWriter};

// ---------------------------------------------------------------------------
// Frame parsing
// ---------------------------------------------------------------------------

/// Outcome of parsing one inbound frame.
#[derive(Debug, PartialEq, Eq)]
pub enum PushFrame {
    /// A refresh for the session we are watching.
    Refresh,
    /// Well-formed, but for another session or of a type we do not act on.
    Ignored,
    /// Blank frame.
    Empty,
    /// Couldn't parse the frame (kept as raw text for logging).
    Unknown(String),
}

/// Parse a raw frame and filter it against the watched session.
pub fn parse_push_frame(text: &str, session_id: &SessionId) -> PushFrame {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return PushFrame::Empty;
    }
    match serde_json::from_str::<PushMessage>(trimmed) {
        Ok(PushMessage::Refresh { session_id: target }) if target == *session_id => {
            PushFrame::Refresh
        }
        Ok(_) => PushFrame::Ignored,
        Err(_) => PushFrame::Unknown(trimmed.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq, Eq)]
pub enum PushEvent {
    /// The watched session changed on the server.
    Refresh,
    /// The server closed the channel.
    Disconnected,
    /// The channel failed.
    Error(String),
}

// ---------------------------------------------------------------------------
// PushClient
// ---------------------------------------------------------------------------

/// Subscription to refresh notifications for one session.
pub struct PushClient {
    session_id: SessionId,
    incoming: mpsc::UnboundedReceiver<PushEvent>,
    outgoing: mpsc::UnboundedSender<PushMessage>,
    reader: JoinHandle<()>,
}

impl PushClient {
    /// Subscribe to `session_id` over any [`PushTransport`].
    ///
    /// Splits the transport, spawns the background tasks, and queues the
    /// `subscribe` frame.
    pub fn from_transport<T: PushTransport>(transport: T, session_id: SessionId) -> Self {
        let (reader, writer) = transport.split();

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<PushMessage>();

        let reader = Self::spawn_reader_task(reader, session_id.clone(), event_tx);
        Self::spawn_writer_task(writer, cmd_rx);

        let _ = cmd_tx.send(PushMessage::Subscribe {
            session_id: session_id.clone(),
        });

        Self {
            session_id,
            incoming: event_rx,
            outgoing: cmd_tx,
            reader,
        }
    }

    /// Connect to a WebSocket push endpoint and subscribe to `session_id`.
    #[cfg(feature = "native")]
    pub async fn connect_ws(
        url: &str,
        session_id: SessionId,
    ) -> Result<Self, crate::transport::TransportError> {
        let transport = crate::ws_transport::WsPushTransport::connect(url).await?;
        Ok(Self::from_transport(transport, session_id))
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Await the next event. `None` once the reader task has exited and
    /// every buffered event was consumed.
    pub async fn recv(&mut self) -> Option<PushEvent> {
        self.incoming.recv().await
    }

    // -- private -----------------------------------------------------------

    fn spawn_reader_task<R: PushReader>(
        mut reader: R,
        session_id: SessionId,
        event_tx: mpsc::UnboundedSender<PushEvent>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match reader.recv().await {
                    Ok(Some(text)) => match parse_push_frame(&text, &session_id) {
                        PushFrame::Refresh => {
                            if event_tx.send(PushEvent::Refresh).is_err() {
                                break;
                            }
                        }
                        PushFrame::Unknown(raw) => {
                            debug!(session = %session_id, frame = %raw, "unparseable push frame");
                        }
                        PushFrame::Ignored | PushFrame::Empty => {}
                    },
                    Ok(None) => {
                        let _ = event_tx.send(PushEvent::Disconnected);
                        break;
                    }
                    Err(e) => {
                        warn!(session = %session_id, error = %e, "push channel failed");
                        let _ = event_tx.send(PushEvent::Error(e.to_string()));
                        break;
                    }
                }
            }
        })
    }

    fn spawn_writer_task<W: PushWriter>(
        mut writer: W,
        mut cmd_rx: mpsc::UnboundedReceiver<PushMessage>,
    ) {
        tokio::spawn(async move {
            while let Some(msg) = cmd_rx.recv().await {
                let json = match serde_json::to_string(&msg) {
                    Ok(j) => j,
                    Err(_) => continue,
                };
                if writer.send(&json).await.is_err() {
                    break;
                }
            }
        });
    }
}

impl Drop for PushClient {
    fn drop(&mut self) {
        // The writer task drains this and then exits with the channel.
        let _ = self.outgoing.send(PushMessage::Unsubscribe {
            session_id: self.session_id.clone(),
        });
        self.reader.abort();
    }
}
