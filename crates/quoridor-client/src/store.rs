//! Local mirror of the remote session.
//!
//! [`GameSessionStore`] is the single mutation point for the session, pawns
//! and walls of the active view. Every successful sync replaces all three in
//! one step, so a reader never sees a new session next to old pawns. Readers
//! either take a [`SessionSnapshot`] or [`subscribe`](GameSessionStore::subscribe)
//! to be woken on real changes; replacing with identical data wakes nobody.
//!
//! Status only moves forward. In particular, once the held session has
//! ended, data claiming it is still running is dropped: a slow poll started
//! before the final move must not revive the game.

use std::sync::atomic::{AtomicBool, Ordering};

use quoridor_core::move_gate::Board;
use quoridor_core::protocol::{ParticipantId, Pawn, Session, SessionStatus, Wall};
use quoridor_core::turn::{self, Winner};
use tokio::sync::watch;
use tracing::{debug, info};

/// Everything the view knows about its session at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub session: Option<Session>,
    pub board: Board,
}

impl SessionSnapshot {
    pub fn status(&self) -> Option<SessionStatus> {
        self.session.as_ref().map(|s| s.status)
    }

    pub fn is_running(&self) -> bool {
        self.status() == Some(SessionStatus::Running)
    }

    pub fn is_ended(&self) -> bool {
        self.status() == Some(SessionStatus::Ended)
    }

    pub fn is_turn_of(&self, participant: &ParticipantId) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| turn::resolve_turn(s, participant))
    }

    pub fn winner(&self, participant: &ParticipantId) -> Option<Winner> {
        self.session
            .as_ref()
            .and_then(|s| turn::winner(s, participant))
    }

    pub fn walls_remaining(&self, participant: &ParticipantId) -> usize {
        self.board.walls_remaining(participant)
    }
}

/// Describes what a store update changed.
///
/// All flags default to `false`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreChanged {
    /// Any field of the session differs.
    pub session: bool,
    pub pawns: bool,
    pub walls: bool,
    /// The lifecycle status moved forward.
    pub status: bool,
    /// The session entered `Ended` with this update. Set at most once per
    /// store.
    pub ended: bool,
    /// The update was dropped: older than what the store holds, for another
    /// session, or arriving after disposal.
    pub stale: bool,
}

impl StoreChanged {
    /// Returns `true` if the store was modified.
    pub fn any(self) -> bool {
        self.session || self.pawns || self.walls
    }
}

pub struct GameSessionStore {
    snapshot: watch::Sender<SessionSnapshot>,
    disposed: AtomicBool,
}

impl Default for GameSessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl GameSessionStore {
    pub fn new() -> Self {
        Self {
            snapshot: watch::Sender::new(SessionSnapshot::default()),
            disposed: AtomicBool::new(false),
        }
    }

    /// Clone of the current snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver woken whenever the snapshot actually changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn status(&self) -> Option<SessionStatus> {
        self.snapshot.borrow().status()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Replace session, pawns and walls together.
    pub fn replace(&self, session: Session, pawns: Vec<Pawn>, walls: Vec<Wall>) -> StoreChanged {
        let mut changed = StoreChanged::default();
        self.snapshot.send_if_modified(|snap| {
            if self.is_disposed() || !accepts(snap.session.as_ref(), &session) {
                changed.stale = true;
                return false;
            }
            changed = diff_session(snap.session.as_ref(), &session);
            changed.pawns = snap.board.pawns != pawns;
            changed.walls = snap.board.walls != walls;
            if !changed.any() {
                return false;
            }
            snap.session = Some(session);
            snap.board = Board::new(pawns, walls);
            true
        });
        self.log_change("sync", changed);
        changed
    }

    /// Take the session returned by a successful move submission, ahead of
    /// the next sync. Pawns and walls follow with that sync.
    pub fn apply_move_result(&self, session: Session) -> StoreChanged {
        let mut changed = StoreChanged::default();
        self.snapshot.send_if_modified(|snap| {
            if self.is_disposed() || !accepts(snap.session.as_ref(), &session) {
                changed.stale = true;
                return false;
            }
            changed = diff_session(snap.session.as_ref(), &session);
            if !changed.any() {
                return false;
            }
            snap.session = Some(session);
            true
        });
        self.log_change("move", changed);
        changed
    }

    /// Stop accepting updates. Called when the owning view is torn down; any
    /// fetch that resolves afterwards is dropped as stale.
    pub fn dispose(&self) {
        // Taken under the snapshot lock so no replace straddles disposal.
        self.snapshot.send_if_modified(|_| {
            self.disposed.store(true, Ordering::SeqCst);
            false
        });
    }

    fn log_change(&self, source: &'static str, changed: StoreChanged) {
        if changed.stale {
            debug!(source, "dropped stale session update");
            return;
        }
        if changed.ended {
            info!(source, "session ended");
        } else if changed.any() {
            debug!(
                source,
                session = changed.session,
                pawns = changed.pawns,
                walls = changed.walls,
                "session updated"
            );
        }
    }
}

/// Whether `incoming` may replace `current`.
fn accepts(current: Option<&Session>, incoming: &Session) -> bool {
    let Some(current) = current else {
        return true;
    };
    if current.id != incoming.id {
        return false;
    }
    if current.status == SessionStatus::Ended {
        return incoming.status == SessionStatus::Ended;
    }
    incoming.status >= current.status
}

fn diff_session(current: Option<&Session>, incoming: &Session) -> StoreChanged {
    let previous_status = current.map(|s| s.status);
    let status = previous_status != Some(incoming.status);
    StoreChanged {
        session: current != Some(incoming),
        status,
        ended: status && incoming.status == SessionStatus::Ended,
        ..StoreChanged::default()
    }
}
