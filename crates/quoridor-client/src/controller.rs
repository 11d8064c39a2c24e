//! Session controller.
//!
//! Owns everything one open game view needs: the store, the sync scheduler
//! and the chat lifecycle. Front-ends read from [`SessionController::snapshot`]
//! (or subscribe), drain [`SessionController::poll_events`] and call the
//! action methods; they never talk to the backend directly.

use std::sync::Arc;
use std::time::Duration;

use quoridor_core::move_gate::{self, Rejection};
use quoridor_core::protocol::{CreateSession, MoveIntent, MoveKind, ParticipantId, Session, SessionId};
use quoridor_core::turn::Winner;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::api::{ApiError, SessionApi};
use crate::chat::{ChatChannelLifecycle, ChatProvider};
use crate::push::PushClient;
use crate::store::{GameSessionStore, SessionSnapshot, StoreChanged};
use crate::sync::{SyncEvent, SyncHandle, SyncScheduler};

#[derive(Debug, Error)]
pub enum SubmitError {
    /// Refused locally; nothing was sent.
    #[error(transparent)]
    Rejected(#[from] Rejection),
    /// The server refused the move or could not be reached. The store is
    /// unchanged.
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Flags describing what a [`SessionController::poll_events`] call observed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollResult {
    /// The store changed.
    pub changed: bool,
    /// The session ended during this poll.
    pub ended: bool,
    /// The session disappeared; the view should close.
    pub gone: bool,
    /// Number of refreshes that failed.
    pub failures: usize,
    /// The push channel dropped.
    pub push_lost: bool,
}

pub struct SessionController<A, P> {
    api: Arc<A>,
    chat: Arc<ChatChannelLifecycle<P>>,
    store: Arc<GameSessionStore>,
    session_id: SessionId,
    local: ParticipantId,
    sync: SyncHandle,
}

impl<A: SessionApi, P: ChatProvider> SessionController<A, P> {
    /// Create a session on the server and open its chat channel.
    ///
    /// A chat failure does not fail the creation; the game is playable
    /// without it.
    pub async fn create_session(
        api: &A,
        chat: &ChatChannelLifecycle<P>,
        request: CreateSession,
    ) -> Result<Session, ApiError> {
        let session = api.create_session(request).await?;
        info!(session = %session.id, board_size = session.board_size, "session created");
        if let Err(e) = chat.start(&session.id).await {
            warn!(session = %session.id, error = %e, "could not open chat channel");
        }
        Ok(session)
    }

    /// Open the view for `session_id` as `local` and start syncing.
    pub fn open(
        api: Arc<A>,
        chat: Arc<ChatChannelLifecycle<P>>,
        session_id: SessionId,
        local: ParticipantId,
        poll_interval: Duration,
        push: Option<PushClient>,
    ) -> Self {
        let store = Arc::new(GameSessionStore::new());
        let sync = SyncScheduler::new(
            Arc::clone(&api),
            Arc::clone(&store),
            Arc::clone(&chat),
            session_id.clone(),
            poll_interval,
        )
        .spawn(push);
        info!(session = %session_id, participant = %local, "session view opened");
        Self {
            api,
            chat,
            store,
            session_id,
            local,
            sync,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn local(&self) -> &ParticipantId {
        &self.local
    }

    pub fn store(&self) -> &GameSessionStore {
        &self.store
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.store.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.store.subscribe()
    }

    /// Whether the local participant may act now. Recomputed from the
    /// current snapshot on every call.
    pub fn is_my_turn(&self) -> bool {
        self.store.snapshot().is_turn_of(&self.local)
    }

    pub fn outcome(&self) -> Option<Winner> {
        self.store.snapshot().winner(&self.local)
    }

    pub fn walls_remaining(&self) -> usize {
        self.store.snapshot().walls_remaining(&self.local)
    }

    /// Ask for an immediate refresh.
    pub fn refresh(&self) -> bool {
        self.sync.trigger()
    }

    /// Await the next scheduler event.
    pub async fn next_event(&mut self) -> Option<SyncEvent> {
        self.sync.next_event().await
    }

    /// Drain pending scheduler events without blocking.
    pub fn poll_events(&mut self) -> PollResult {
        let mut result = PollResult::default();
        while let Some(event) = self.sync.try_next_event() {
            match event {
                SyncEvent::Refreshed(changed) => {
                    result.changed |= changed.any();
                    result.ended |= changed.ended;
                }
                SyncEvent::Transient(_) => result.failures += 1,
                SyncEvent::SessionGone => result.gone = true,
                SyncEvent::PushLost(_) => result.push_lost = true,
            }
        }
        result
    }

    /// Admit `kind` locally, then submit it.
    ///
    /// On success the returned session is applied to the store right away
    /// and a refresh is requested so the board follows.
    pub async fn submit(&self, kind: MoveKind) -> Result<StoreChanged, SubmitError> {
        let intent = MoveIntent {
            participant: self.local.clone(),
            kind,
        };
        let snapshot = self.store.snapshot();
        let session = snapshot.session.as_ref().ok_or(Rejection::NoSession)?;
        move_gate::admit(&intent, session, &snapshot.board)?;

        let updated = self.api.submit_move(&self.session_id, &intent).await?;
        let changed = self.store.apply_move_result(updated);
        if changed.ended {
            self.close_chat().await;
        }
        self.sync.trigger();
        Ok(changed)
    }

    /// Abort the game on the server, remove its chat and close the view.
    pub async fn abort(&mut self) -> Result<(), ApiError> {
        self.api.abort_session(&self.session_id).await?;
        info!(session = %self.session_id, "session aborted");
        self.close_chat().await;
        self.close();
        Ok(())
    }

    /// Tear down the view: stop syncing and freeze the store. Safe to call
    /// more than once.
    pub fn close(&mut self) {
        self.sync.shutdown();
        self.store.dispose();
    }

    async fn close_chat(&self) {
        if let Err(e) = self.chat.stop(&self.session_id).await {
            warn!(session = %self.session_id, error = %e, "could not remove chat channel");
        }
    }
}

impl<A, P> Drop for SessionController<A, P> {
    fn drop(&mut self) {
        self.sync.shutdown();
        self.store.dispose();
    }
}
