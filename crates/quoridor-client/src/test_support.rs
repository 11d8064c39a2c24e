//! In-process fakes for the backend and the chat store.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use quoridor_core::protocol::{
    Coord, CreateSession, MoveIntent, Participant, Pawn, Session, SessionId, SessionStatus, Wall,
};
use tokio::sync::{Notify, Semaphore};

use crate::api::{ApiError, SessionApi};
use crate::chat::{ChatError, ChatProvider};

pub(crate) fn sid(s: &str) -> SessionId {
    SessionId::parse(s).unwrap()
}

/// Session `g1` between participants `1` (creator) and `2`.
pub(crate) fn session(status: SessionStatus, turn: Option<&str>) -> Session {
    Session {
        id: sid("g1"),
        status,
        creator: Participant::new("1"),
        current_turn: turn.map(Participant::new),
        players: vec![Participant::new("1"), Participant::new("2")],
        board_size: 9,
        winner: None,
    }
}

pub(crate) fn start_pawns() -> Vec<Pawn> {
    vec![
        Pawn {
            owner: "1".into(),
            position: Coord::new(0, 8),
            color: "red".into(),
        },
        Pawn {
            owner: "2".into(),
            position: Coord::new(16, 8),
            color: "blue".into(),
        },
    ]
}

struct FakeState {
    session: Session,
    pawns: Vec<Pawn>,
    walls: Vec<Wall>,
    error: Option<ApiError>,
    move_result: Result<Session, ApiError>,
}

/// Scripted [`SessionApi`]. Fetches read whatever the test last set;
/// `gated` fakes block every session fetch until [`release`](Self::release).
pub(crate) struct FakeApi {
    state: Mutex<FakeState>,
    gate: Option<Semaphore>,
    entered: Notify,
    fetches: AtomicUsize,
    moves: AtomicUsize,
    aborts: AtomicUsize,
    submitted: Mutex<Vec<MoveIntent>>,
}

impl FakeApi {
    pub(crate) fn new(session: Session) -> Self {
        Self::build(session, None)
    }

    pub(crate) fn gated(session: Session) -> Self {
        Self::build(session, Some(Semaphore::new(0)))
    }

    fn build(session: Session, gate: Option<Semaphore>) -> Self {
        Self {
            state: Mutex::new(FakeState {
                session,
                pawns: start_pawns(),
                walls: Vec::new(),
                error: None,
                move_result: Err(ApiError::Status {
                    code: 500,
                    message: "no move result scripted".into(),
                }),
            }),
            gate,
            entered: Notify::new(),
            fetches: AtomicUsize::new(0),
            moves: AtomicUsize::new(0),
            aborts: AtomicUsize::new(0),
            submitted: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn set_session(&self, session: Session) {
        self.state.lock().unwrap().session = session;
    }

    pub(crate) fn set_error(&self, error: Option<ApiError>) {
        self.state.lock().unwrap().error = error;
    }

    pub(crate) fn set_move_result(&self, result: Result<Session, ApiError>) {
        self.state.lock().unwrap().move_result = result;
    }

    pub(crate) fn pawns(&self) -> Vec<Pawn> {
        self.state.lock().unwrap().pawns.clone()
    }

    /// Let `n` gated fetches through.
    pub(crate) fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    /// Wait until a session fetch has started.
    pub(crate) async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    pub(crate) fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub(crate) fn move_count(&self) -> usize {
        self.moves.load(Ordering::SeqCst)
    }

    pub(crate) fn abort_count(&self) -> usize {
        self.aborts.load(Ordering::SeqCst)
    }

    pub(crate) fn submitted(&self) -> Vec<MoveIntent> {
        self.submitted.lock().unwrap().clone()
    }

    fn check(&self) -> Result<(), ApiError> {
        match &self.state.lock().unwrap().error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

impl SessionApi for FakeApi {
    async fn list_sessions(&self) -> Result<Vec<Session>, ApiError> {
        self.check()?;
        Ok(vec![self.state.lock().unwrap().session.clone()])
    }

    async fn fetch_session(&self, _id: &SessionId) -> Result<Session, ApiError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        self.check()?;
        Ok(self.state.lock().unwrap().session.clone())
    }

    async fn fetch_pawns(&self, _id: &SessionId) -> Result<Vec<Pawn>, ApiError> {
        self.check()?;
        Ok(self.state.lock().unwrap().pawns.clone())
    }

    async fn fetch_walls(&self, _id: &SessionId) -> Result<Vec<Wall>, ApiError> {
        self.check()?;
        Ok(self.state.lock().unwrap().walls.clone())
    }

    async fn submit_move(&self, _id: &SessionId, intent: &MoveIntent) -> Result<Session, ApiError> {
        self.moves.fetch_add(1, Ordering::SeqCst);
        self.submitted.lock().unwrap().push(intent.clone());
        self.state.lock().unwrap().move_result.clone()
    }

    async fn abort_session(&self, _id: &SessionId) -> Result<(), ApiError> {
        self.aborts.fetch_add(1, Ordering::SeqCst);
        self.check()
    }

    async fn create_session(&self, _request: CreateSession) -> Result<Session, ApiError> {
        self.check()?;
        Ok(self.state.lock().unwrap().session.clone())
    }

    async fn join_session(&self, _id: &SessionId) -> Result<Session, ApiError> {
        self.check()?;
        Ok(self.state.lock().unwrap().session.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ChatOp {
    Initialize(String),
    Delete(String),
}

/// [`ChatProvider`] that only records what was asked of it.
#[derive(Debug, Default)]
pub(crate) struct RecordingChat {
    ops: Mutex<Vec<ChatOp>>,
}

impl RecordingChat {
    pub(crate) fn ops(&self) -> Vec<ChatOp> {
        self.ops.lock().unwrap().clone()
    }

    pub(crate) fn deletes(&self, key: &str) -> usize {
        self.ops()
            .iter()
            .filter(|op| matches!(op, ChatOp::Delete(k) if k == key))
            .count()
    }
}

impl ChatProvider for RecordingChat {
    async fn initialize_if_absent(&self, key: &str) -> Result<bool, ChatError> {
        self.ops
            .lock()
            .unwrap()
            .push(ChatOp::Initialize(key.to_string()));
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<(), ChatError> {
        self.ops.lock().unwrap().push(ChatOp::Delete(key.to_string()));
        Ok(())
    }
}
