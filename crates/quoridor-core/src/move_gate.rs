//! Local admission of move intents.
//!
//! [`admit`] filters out requests that are obviously malformed before they
//! cost a round trip. Passing it says nothing about legality: path
//! connectivity, wall overlap and jumps are decided by the server.

use thiserror::Error;
use tracing::debug;

use crate::protocol::{MoveIntent, MoveKind, ParticipantId, Pawn, Session, WALL_QUOTA, Wall};
use crate::turn::resolve_turn;

/// Pieces currently on the board, as last synced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Board {
    pub pawns: Vec<Pawn>,
    pub walls: Vec<Wall>,
}

impl Board {
    pub fn new(pawns: Vec<Pawn>, walls: Vec<Wall>) -> Self {
        Self { pawns, walls }
    }

    pub fn pawn_of(&self, participant: &ParticipantId) -> Option<&Pawn> {
        self.pawns.iter().find(|p| p.owner == *participant)
    }

    pub fn walls_owned_by(&self, participant: &ParticipantId) -> usize {
        self.walls.iter().filter(|w| w.owner == *participant).count()
    }

    /// Walls `participant` may still place.
    pub fn walls_remaining(&self, participant: &ParticipantId) -> usize {
        WALL_QUOTA.saturating_sub(self.walls_owned_by(participant))
    }
}

/// Why a move was refused locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("it is not your turn")]
    NotYourTurn,
    #[error("that position is not a valid target")]
    InvalidTarget,
    #[error("you have no walls left")]
    NoWallsLeft,
    #[error("no session is loaded")]
    NoSession,
}

/// Admit or reject `intent` against the last known session and board.
pub fn admit(intent: &MoveIntent, session: &Session, board: &Board) -> Result<(), Rejection> {
    let result = check(intent, session, board);
    if let Err(reason) = result {
        debug!(
            session = %session.id,
            participant = %intent.participant,
            %reason,
            "move rejected locally"
        );
    }
    result
}

fn check(intent: &MoveIntent, session: &Session, board: &Board) -> Result<(), Rejection> {
    if !resolve_turn(session, &intent.participant) {
        return Err(Rejection::NotYourTurn);
    }
    let limit = session.grid_limit();
    match &intent.kind {
        MoveKind::MovePawn { to, .. } => {
            if !to.is_cell() || !to.within(limit) {
                return Err(Rejection::InvalidTarget);
            }
        }
        MoveKind::PlaceWall { anchor, .. } => {
            if !anchor.is_wall_track() || !anchor.within(limit) {
                return Err(Rejection::InvalidTarget);
            }
            if board.walls_remaining(&intent.participant) == 0 {
                return Err(Rejection::NoWallsLeft);
            }
        }
    }
    Ok(())
}
