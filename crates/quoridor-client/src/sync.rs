//! Keeps a [`GameSessionStore`] in step with the backend.
//!
//! Three producers feed one consumer:
//!
//! - a poll timer, which only fires while the session is running;
//! - the push channel, on `refresh` frames for this session;
//! - manual [`SyncHandle::trigger`] calls (plus one initial trigger).
//!
//! They share a trigger queue of capacity one. A trigger that finds the slot
//! already taken is coalesced: the pending refresh will fetch the newest
//! state anyway. So while a refresh is in flight, at most one more is queued
//! behind it, however many triggers arrive.
//!
//! The store ends up holding the most recently *completed* fetch, not the
//! most recently triggered one; the store's forward-only status rule keeps
//! that window from resurrecting an ended game.

use std::sync::Arc;
use std::time::Duration;

use quoridor_core::protocol::{Pawn, Session, SessionId, Wall};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::api::{ApiError, SessionApi};
use crate::chat::{ChatChannelLifecycle, ChatProvider};
use crate::push::{PushClient, PushEvent};
use crate::store::{GameSessionStore, StoreChanged};

/// What caused a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Initial,
    Poll,
    Push,
    Manual,
}

/// Outcome of scheduler activity, for the view to react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// A refresh completed and was offered to the store.
    Refreshed(StoreChanged),
    /// A refresh failed; the store is untouched and the next trigger retries.
    Transient(ApiError),
    /// The session no longer exists. The scheduler has stopped; the view
    /// should close.
    SessionGone,
    /// The push channel dropped. Polling continues on its own.
    PushLost(String),
}

pub struct SyncScheduler<A, P> {
    api: Arc<A>,
    store: Arc<GameSessionStore>,
    chat: Arc<ChatChannelLifecycle<P>>,
    session_id: SessionId,
    poll_interval: Duration,
}

impl<A: SessionApi, P: ChatProvider> SyncScheduler<A, P> {
    pub fn new(
        api: Arc<A>,
        store: Arc<GameSessionStore>,
        chat: Arc<ChatChannelLifecycle<P>>,
        session_id: SessionId,
        poll_interval: Duration,
    ) -> Self {
        Self {
            api,
            store,
            chat,
            session_id,
            poll_interval,
        }
    }

    /// Start the producer and consumer tasks. An initial refresh is queued
    /// immediately.
    pub fn spawn(self, push: Option<PushClient>) -> SyncHandle {
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let stop = Arc::new(watch::Sender::new(false));

        offer(&trigger_tx, Trigger::Initial);

        let mut tasks = Vec::with_capacity(3);
        tasks.push(spawn_poll_task(
            Arc::clone(&self.store),
            self.poll_interval,
            trigger_tx.clone(),
            stop.subscribe(),
        ));
        if let Some(push) = push {
            tasks.push(spawn_push_task(
                push,
                trigger_tx.clone(),
                event_tx.clone(),
                stop.subscribe(),
            ));
        }
        info!(session = %self.session_id, interval = ?self.poll_interval, "sync started");
        tasks.push(self.spawn_refresh_task(trigger_rx, event_tx, Arc::clone(&stop)));

        SyncHandle {
            triggers: trigger_tx,
            events: event_rx,
            stop,
            tasks,
        }
    }

    fn spawn_refresh_task(
        self,
        mut triggers: mpsc::Receiver<Trigger>,
        events: mpsc::UnboundedSender<SyncEvent>,
        stop: Arc<watch::Sender<bool>>,
    ) -> JoinHandle<()> {
        let mut stopped = stop.subscribe();
        tokio::spawn(async move {
            loop {
                let trigger = tokio::select! {
                    biased;
                    _ = cancelled(&mut stopped) => break,
                    t = triggers.recv() => match t {
                        Some(t) => t,
                        None => break,
                    },
                };
                debug!(session = %self.session_id, ?trigger, "refreshing");

                let result = tokio::select! {
                    biased;
                    _ = cancelled(&mut stopped) => break,
                    r = self.fetch() => r,
                };
                // Torn down while the fetch was in flight: drop the result.
                if *stopped.borrow() {
                    break;
                }

                match result {
                    Ok((session, pawns, walls)) => {
                        let changed = self.store.replace(session, pawns, walls);
                        if changed.ended {
                            self.close_chat().await;
                        }
                        let _ = events.send(SyncEvent::Refreshed(changed));
                    }
                    Err(e) if e.is_not_found() => {
                        info!(session = %self.session_id, "session no longer exists, stopping sync");
                        stop.send_replace(true);
                        let _ = events.send(SyncEvent::SessionGone);
                        break;
                    }
                    Err(e) => {
                        warn!(session = %self.session_id, error = %e, "refresh failed");
                        let _ = events.send(SyncEvent::Transient(e));
                    }
                }
            }
            debug!(session = %self.session_id, "refresh task finished");
        })
    }

    /// Read session, pawns and walls concurrently.
    async fn fetch(&self) -> Result<(Session, Vec<Pawn>, Vec<Wall>), ApiError> {
        let id = &self.session_id;
        tokio::try_join!(
            self.api.fetch_session(id),
            self.api.fetch_pawns(id),
            self.api.fetch_walls(id),
        )
    }

    async fn close_chat(&self) {
        if let Err(e) = self.chat.stop(&self.session_id).await {
            warn!(session = %self.session_id, error = %e, "could not remove chat channel");
        }
    }
}

fn spawn_poll_task(
    store: Arc<GameSessionStore>,
    interval: Duration,
    triggers: mpsc::Sender<Trigger>,
    mut stopped: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = cancelled(&mut stopped) => break,
                _ = ticker.tick() => {}
            }
            if store.snapshot().is_running() {
                offer(&triggers, Trigger::Poll);
            }
        }
    })
}

fn spawn_push_task(
    mut push: PushClient,
    triggers: mpsc::Sender<Trigger>,
    events: mpsc::UnboundedSender<SyncEvent>,
    mut stopped: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                biased;
                _ = cancelled(&mut stopped) => break,
                e = push.recv() => e,
            };
            match event {
                Some(PushEvent::Refresh) => {
                    offer(&triggers, Trigger::Push);
                }
                Some(PushEvent::Error(reason)) => {
                    let _ = events.send(SyncEvent::PushLost(reason));
                    break;
                }
                Some(PushEvent::Disconnected) | None => {
                    let _ = events.send(SyncEvent::PushLost("connection closed".to_string()));
                    break;
                }
            }
        }
        // Dropping `push` here unsubscribes.
    })
}

/// Queue `trigger` unless a refresh is already pending. Returns whether it
/// was queued.
fn offer(triggers: &mpsc::Sender<Trigger>, trigger: Trigger) -> bool {
    match triggers.try_send(trigger) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            debug!(?trigger, "refresh already pending, coalesced");
            false
        }
        Err(TrySendError::Closed(_)) => false,
    }
}

/// Resolves once the stop flag is set (or its sender is gone).
async fn cancelled(stopped: &mut watch::Receiver<bool>) {
    let _ = stopped.wait_for(|stop| *stop).await;
}

/// Owner's side of a running scheduler. Dropping it tears everything down.
pub struct SyncHandle {
    triggers: mpsc::Sender<Trigger>,
    events: mpsc::UnboundedReceiver<SyncEvent>,
    stop: Arc<watch::Sender<bool>>,
    tasks: Vec<JoinHandle<()>>,
}

impl SyncHandle {
    /// Ask for a refresh now. Returns `false` if it was coalesced into an
    /// already pending one, or the scheduler has stopped.
    pub fn trigger(&self) -> bool {
        !self.is_stopped() && offer(&self.triggers, Trigger::Manual)
    }

    /// Await the next event. `None` once every task has exited.
    pub async fn next_event(&mut self) -> Option<SyncEvent> {
        self.events.recv().await
    }

    /// Non-blocking variant of [`next_event`](Self::next_event).
    pub fn try_next_event(&mut self) -> Option<SyncEvent> {
        self.events.try_recv().ok()
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop.borrow()
    }

    /// Stop all tasks. Timers and the push subscription are released; a
    /// fetch still in flight is dropped and never reaches the store.
    pub fn shutdown(&mut self) {
        self.stop.send_replace(true);
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeApi, RecordingChat, session, sid};
    use crate::transport::channel;
    use quoridor_core::protocol::SessionStatus;

    const POLL: Duration = Duration::from_secs(5);

    fn scheduler(
        api: &Arc<FakeApi>,
        store: &Arc<GameSessionStore>,
        chat: &Arc<ChatChannelLifecycle<RecordingChat>>,
    ) -> SyncScheduler<FakeApi, RecordingChat> {
        SyncScheduler::new(
            Arc::clone(api),
            Arc::clone(store),
            Arc::clone(chat),
            sid("g1"),
            POLL,
        )
    }

    fn parts() -> (Arc<GameSessionStore>, Arc<ChatChannelLifecycle<RecordingChat>>) {
        (
            Arc::new(GameSessionStore::new()),
            Arc::new(ChatChannelLifecycle::new(RecordingChat::default())),
        )
    }

    #[tokio::test]
    async fn initial_refresh_fills_the_store() {
        let api = Arc::new(FakeApi::new(session(SessionStatus::Running, Some("1"))));
        let (store, chat) = parts();
        let mut handle = scheduler(&api, &store, &chat).spawn(None);

        match handle.next_event().await {
            Some(SyncEvent::Refreshed(changed)) => assert!(changed.session && changed.pawns),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(store.snapshot().is_running());
        assert_eq!(store.snapshot().board.pawns, api.pawns());
    }

    #[tokio::test]
    async fn triggers_during_a_refresh_coalesce_into_one() {
        let api = Arc::new(FakeApi::gated(session(
            SessionStatus::AwaitingOpponent,
            None,
        )));
        let (store, chat) = parts();
        let mut handle = scheduler(&api, &store, &chat).spawn(None);

        // The initial refresh is now blocked inside the fetch.
        api.wait_entered().await;
        assert!(handle.trigger());
        assert!(!handle.trigger());
        assert!(!handle.trigger());

        api.release(10);
        for _ in 0..2 {
            assert!(matches!(
                handle.next_event().await,
                Some(SyncEvent::Refreshed(_))
            ));
        }
        let extra = tokio::time::timeout(Duration::from_millis(100), handle.next_event()).await;
        assert!(extra.is_err(), "no third refresh expected");
        assert_eq!(api.fetch_count(), 2);
    }

    #[tokio::test]
    async fn teardown_discards_a_fetch_in_flight() {
        let api = Arc::new(FakeApi::gated(session(SessionStatus::Running, Some("1"))));
        let (store, chat) = parts();
        let mut handle = scheduler(&api, &store, &chat).spawn(None);

        api.wait_entered().await;
        handle.shutdown();
        api.release(10);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(store.snapshot().session, None);
        assert_eq!(handle.next_event().await, None);
        assert!(handle.is_stopped());
    }

    #[tokio::test]
    async fn ended_session_closes_chat_exactly_once() {
        let api = Arc::new(FakeApi::new(session(SessionStatus::Running, Some("1"))));
        let (store, chat) = parts();
        let mut handle = scheduler(&api, &store, &chat).spawn(None);
        assert!(matches!(handle.next_event().await, Some(SyncEvent::Refreshed(_))));

        api.set_session(session(SessionStatus::Ended, Some("2")));
        for expect_ended in [true, false, false] {
            assert!(handle.trigger());
            match handle.next_event().await {
                Some(SyncEvent::Refreshed(changed)) => assert_eq!(changed.ended, expect_ended),
                other => panic!("unexpected event: {other:?}"),
            }
        }
        assert_eq!(chat.provider().deletes("chats/g1"), 1);
    }

    #[tokio::test]
    async fn missing_session_stops_the_scheduler() {
        let api = Arc::new(FakeApi::new(session(SessionStatus::Running, Some("1"))));
        api.set_error(Some(ApiError::Status {
            code: 404,
            message: "game not found".into(),
        }));
        let (store, chat) = parts();
        let mut handle = scheduler(&api, &store, &chat).spawn(None);

        assert_eq!(handle.next_event().await, Some(SyncEvent::SessionGone));
        assert!(handle.is_stopped());
        assert_eq!(handle.next_event().await, None);
        assert_eq!(store.snapshot().session, None);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_keep_polling() {
        let api = Arc::new(FakeApi::new(session(SessionStatus::Running, Some("1"))));
        let (store, chat) = parts();
        let mut handle = scheduler(&api, &store, &chat).spawn(None);
        assert!(matches!(handle.next_event().await, Some(SyncEvent::Refreshed(_))));
        let before = store.snapshot();

        api.set_error(Some(ApiError::Status {
            code: 503,
            message: "unavailable".into(),
        }));
        assert!(matches!(
            handle.next_event().await,
            Some(SyncEvent::Transient(_))
        ));
        assert_eq!(store.snapshot(), before);

        api.set_error(None);
        api.set_session(session(SessionStatus::Running, Some("2")));
        match handle.next_event().await {
            Some(SyncEvent::Refreshed(changed)) => assert!(changed.session),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(store.snapshot().is_turn_of(&"2".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn no_polling_unless_running() {
        let api = Arc::new(FakeApi::new(session(
            SessionStatus::AwaitingOpponent,
            None,
        )));
        let (store, chat) = parts();
        let mut handle = scheduler(&api, &store, &chat).spawn(None);
        assert!(matches!(handle.next_event().await, Some(SyncEvent::Refreshed(_))));

        tokio::time::sleep(POLL * 6).await;
        assert_eq!(api.fetch_count(), 1);

        assert!(handle.trigger());
        assert!(matches!(handle.next_event().await, Some(SyncEvent::Refreshed(_))));
        assert_eq!(api.fetch_count(), 2);
    }

    #[tokio::test]
    async fn push_refresh_for_this_session_triggers_a_fetch() {
        let api = Arc::new(FakeApi::new(session(
            SessionStatus::AwaitingOpponent,
            None,
        )));
        let (store, chat) = parts();
        let (transport, peer) = channel::pair();
        let push = PushClient::from_transport(transport, sid("g1"));
        let mut handle = scheduler(&api, &store, &chat).spawn(Some(push));
        assert!(matches!(handle.next_event().await, Some(SyncEvent::Refreshed(_))));

        api.set_session(session(SessionStatus::Running, Some("1")));
        peer.to_client
            .send(r#"{"type":"refresh","sessionId":"other"}"#.to_string())
            .unwrap();
        peer.to_client
            .send(r#"{"type":"refresh","sessionId":"g1"}"#.to_string())
            .unwrap();

        match handle.next_event().await {
            Some(SyncEvent::Refreshed(changed)) => assert!(changed.status),
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(api.fetch_count(), 2);
        assert!(store.snapshot().is_running());
    }

    #[tokio::test]
    async fn lost_push_channel_is_reported() {
        let api = Arc::new(FakeApi::new(session(SessionStatus::Running, Some("1"))));
        let (store, chat) = parts();
        let (transport, peer) = channel::pair();
        let push = PushClient::from_transport(transport, sid("g1"));
        let mut handle = scheduler(&api, &store, &chat).spawn(Some(push));

        drop(peer);
        let mut saw_lost = false;
        for _ in 0..2 {
            if let Some(SyncEvent::PushLost(_)) = handle.next_event().await {
                saw_lost = true;
            }
        }
        assert!(saw_lost);
        assert!(!handle.is_stopped());
    }
}
