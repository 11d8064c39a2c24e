//! Turn ownership and end-of-game outcome.
//!
//! Both answers are derived from the shape of the session the server
//! reports. Two of the rules here are heuristics covering gaps in that data
//! and are kept as separate, named functions so callers never inline them:
//!
//! - [`first_turn_fallback`]: with no `current_turn` on a running session,
//!   the creator is assumed to move first. Only sound for the opening move;
//!   a server that drops `current_turn` mid-game will make it misattribute
//!   turns.
//! - [`infer_winner`]: with no explicit `winner`, whoever is *not* holding
//!   the turn at the end is taken to have made the winning move.

use tracing::debug;

use crate::protocol::{ParticipantId, Session, SessionStatus};

/// Is it `local`'s turn in `session`?
///
/// Pure and cheap; evaluate it against every fresh snapshot instead of
/// caching the answer.
pub fn resolve_turn(session: &Session, local: &ParticipantId) -> bool {
    if session.status != SessionStatus::Running {
        return false;
    }
    match &session.current_turn {
        Some(holder) => holder.id == *local,
        None => first_turn_fallback(session, local),
    }
}

/// Heuristic: the creator opens the game.
pub fn first_turn_fallback(session: &Session, local: &ParticipantId) -> bool {
    debug!(
        session = %session.id,
        creator = %session.creator.id,
        "current turn missing, assuming creator moves first"
    );
    session.creator.id == *local
}

/// Outcome of an ended session from the local participant's point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Winner {
    Local,
    Opponent(ParticipantId),
    Unknown,
}

/// Who won `session`, or `None` while it has not ended.
pub fn winner(session: &Session, local: &ParticipantId) -> Option<Winner> {
    if session.status != SessionStatus::Ended {
        return None;
    }
    if let Some(declared) = &session.winner {
        return Some(if declared.id == *local {
            Winner::Local
        } else {
            Winner::Opponent(declared.id.clone())
        });
    }
    Some(infer_winner(session, local))
}

/// Heuristic: the participant not holding the final turn made the last
/// (winning) move.
pub fn infer_winner(session: &Session, local: &ParticipantId) -> Winner {
    let Some(holder) = &session.current_turn else {
        return Winner::Unknown;
    };
    if holder.id == *local {
        match session.opponent_of(local) {
            Some(opponent) => Winner::Opponent(opponent.id.clone()),
            None => Winner::Unknown,
        }
    } else {
        Winner::Local
    }
}
