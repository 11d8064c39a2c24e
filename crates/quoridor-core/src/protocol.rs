use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Maximum number of walls one participant may place over a session.
pub const WALL_QUOTA: usize = 10;

/// Board dimension used when the server omits it.
pub const DEFAULT_BOARD_SIZE: u16 = 9;

// ---------------------------------------------------------------------------
// Identities
// ---------------------------------------------------------------------------

/// Opaque session identifier, as issued by the backend.
///
/// Deserialization goes through [`SessionId::parse`], so an id from the
/// server is held to the same rules as one typed by a user. Numeric ids are
/// accepted and kept in their decimal form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Validate and wrap a session id.
    ///
    /// Session ids are embedded in request paths and channel keys, so they
    /// must be non-empty, fewer than 64 characters, and free of path
    /// separators and whitespace.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let id = raw.trim();
        if id.is_empty() {
            return Err("Session ID cannot be empty".to_string());
        }
        if id.len() >= 64 {
            return Err("Session ID must be fewer than 64 characters".to_string());
        }
        if id
            .chars()
            .any(|c| c == '/' || c == '?' || c == '#' || c.is_whitespace())
        {
            return Err("Session ID contains invalid characters".to_string());
        }
        Ok(Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for SessionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = match RawId::deserialize(deserializer)? {
            RawId::Text(s) => s,
            RawId::Number(n) => n.to_string(),
        };
        SessionId::parse(&raw).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical participant identity.
///
/// The backend is inconsistent about identities: the same user shows up as
/// `7` in one payload and `"7"` in another. Both deserialize to the same
/// canonical string form, so equality is always representation-independent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ParticipantId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ParticipantId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

impl From<u64> for ParticipantId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity as it appears on the wire: a string or a bare number.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(serde_json::Number),
}

impl<'de> Deserialize<'de> for ParticipantId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(s) => ParticipantId::new(s),
            RawId::Number(n) => ParticipantId(n.to_string()),
        })
    }
}

/// A user taking part in a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl Participant {
    pub fn new(id: impl Into<ParticipantId>) -> Self {
        Self {
            id: id.into(),
            username: None,
        }
    }

    /// Display name, falling back to `"Player #id"`.
    pub fn display_name(&self) -> String {
        self.username
            .clone()
            .unwrap_or_else(|| format!("Player #{}", self.id))
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Lifecycle status of a session. Ordered: a session only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[serde(alias = "waiting", alias = "pending", alias = "AwaitingOpponent")]
    AwaitingOpponent,
    #[serde(alias = "in_progress", alias = "active", alias = "Running")]
    Running,
    #[serde(alias = "finished", alias = "completed", alias = "Ended")]
    Ended,
}

impl SessionStatus {
    pub fn label(self) -> &'static str {
        match self {
            SessionStatus::AwaitingOpponent => "Waiting for opponent",
            SessionStatus::Running => "Running",
            SessionStatus::Ended => "Ended",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

fn default_board_size() -> u16 {
    DEFAULT_BOARD_SIZE
}

/// One two-player game as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,
    pub status: SessionStatus,
    pub creator: Participant,
    /// Whose turn the server says it is. May be missing even while running.
    #[serde(default)]
    pub current_turn: Option<Participant>,
    #[serde(default)]
    pub players: Vec<Participant>,
    #[serde(default = "default_board_size")]
    pub board_size: u16,
    /// Explicit winner, for backends that report one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<Participant>,
}

impl Session {
    pub fn is_running(&self) -> bool {
        self.status == SessionStatus::Running
    }

    pub fn is_ended(&self) -> bool {
        self.status == SessionStatus::Ended
    }

    pub fn has_participant(&self, id: &ParticipantId) -> bool {
        self.creator.id == *id || self.players.iter().any(|p| p.id == *id)
    }

    /// The other participant, if the session lists one.
    pub fn opponent_of(&self, id: &ParticipantId) -> Option<&Participant> {
        self.players
            .iter()
            .chain(std::iter::once(&self.creator))
            .find(|p| p.id != *id)
    }

    /// Largest valid coordinate on the doubled grid.
    ///
    /// Widened to `u32`: `board_size` is server data and may be anything.
    pub fn grid_limit(&self) -> u32 {
        (u32::from(self.board_size.max(1)) - 1) * 2
    }
}

// ---------------------------------------------------------------------------
// Board pieces
// ---------------------------------------------------------------------------

/// Position on the doubled grid.
///
/// Real cells sit at even row/column; odd positions are wall tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coord {
    pub row: u16,
    pub col: u16,
}

impl Coord {
    pub fn new(row: u16, col: u16) -> Self {
        Self { row, col }
    }

    /// Both coordinates even: a cell a pawn can stand on.
    pub fn is_cell(self) -> bool {
        self.row % 2 == 0 && self.col % 2 == 0
    }

    /// At least one coordinate odd: a slot on a wall track.
    pub fn is_wall_track(self) -> bool {
        self.row % 2 == 1 || self.col % 2 == 1
    }

    pub fn within(self, limit: u32) -> bool {
        u32::from(self.row) <= limit && u32::from(self.col) <= limit
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pawn {
    pub owner: ParticipantId,
    #[serde(flatten)]
    pub position: Coord,
    #[serde(default)]
    pub color: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[serde(alias = "h", alias = "Horizontal")]
    Horizontal,
    #[serde(alias = "v", alias = "Vertical")]
    Vertical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wall {
    pub owner: ParticipantId,
    #[serde(flatten)]
    pub anchor: Coord,
    pub orientation: Orientation,
    #[serde(default)]
    pub color: String,
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// What the acting participant wants to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MoveKind {
    MovePawn { from: Coord, to: Coord },
    PlaceWall { anchor: Coord, orientation: Orientation },
}

/// A move request. The server alone decides whether it is legal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveIntent {
    pub participant: ParticipantId,
    #[serde(flatten)]
    pub kind: MoveKind,
}

impl MoveIntent {
    pub fn move_pawn(participant: impl Into<ParticipantId>, from: Coord, to: Coord) -> Self {
        Self {
            participant: participant.into(),
            kind: MoveKind::MovePawn { from, to },
        }
    }

    pub fn place_wall(
        participant: impl Into<ParticipantId>,
        anchor: Coord,
        orientation: Orientation,
    ) -> Self {
        Self {
            participant: participant.into(),
            kind: MoveKind::PlaceWall {
                anchor,
                orientation,
            },
        }
    }
}

/// Body of `POST /games`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSession {
    pub board_size: u16,
}

impl Default for CreateSession {
    fn default() -> Self {
        Self {
            board_size: DEFAULT_BOARD_SIZE,
        }
    }
}

// ---------------------------------------------------------------------------
// Push channel
// ---------------------------------------------------------------------------

/// Frames exchanged over the push-notification channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushMessage {
    /// Server → client: state for `session_id` changed, fetch it again.
    Refresh {
        #[serde(rename = "sessionId")]
        session_id: SessionId,
    },
    /// Client → server: start delivering refreshes for `session_id`.
    Subscribe {
        #[serde(rename = "sessionId")]
        session_id: SessionId,
    },
    /// Client → server: stop delivering refreshes for `session_id`.
    Unsubscribe {
        #[serde(rename = "sessionId")]
        session_id: SessionId,
    },
    /// Any other frame type; never acted on.
    #[serde(other)]
    Other,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn participant_ids_compare_across_representations() {
        let from_number: ParticipantId = serde_json::from_str("7").unwrap();
        let from_string: ParticipantId = serde_json::from_str("\"7\"").unwrap();
        assert_eq!(from_number, from_string);
        assert_eq!(from_number, ParticipantId::from(7u64));
        assert_eq!(from_string.as_str(), "7");
    }

    #[test]
    fn session_parses_with_missing_optional_fields() {
        let json = r#"{
            "id": "g1",
            "status": "running",
            "creator": { "id": 1, "username": "ada" }
        }"#;
        let session: Session = serde_json::from_str(json).unwrap();
        assert_eq!(session.status, SessionStatus::Running);
        assert!(session.current_turn.is_none());
        assert!(session.players.is_empty());
        assert_eq!(session.board_size, DEFAULT_BOARD_SIZE);
        assert_eq!(session.creator.id, ParticipantId::from("1"));
    }

    #[test]
    fn status_aliases_and_order() {
        let s: SessionStatus = serde_json::from_str("\"in_progress\"").unwrap();
        assert_eq!(s, SessionStatus::Running);
        let s: SessionStatus = serde_json::from_str("\"finished\"").unwrap();
        assert_eq!(s, SessionStatus::Ended);
        assert!(SessionStatus::AwaitingOpponent < SessionStatus::Running);
        assert!(SessionStatus::Running < SessionStatus::Ended);
    }

    #[test]
    fn pawn_and_wall_read_flat_coordinates() {
        let pawn: Pawn =
            serde_json::from_str(r#"{"owner": "2", "row": 16, "col": 8, "color": "red"}"#).unwrap();
        assert_eq!(pawn.position, Coord::new(16, 8));

        let wall: Wall =
            serde_json::from_str(r#"{"owner": 2, "row": 1, "col": 4, "orientation": "h"}"#)
                .unwrap();
        assert_eq!(wall.orientation, Orientation::Horizontal);
        assert_eq!(wall.anchor, Coord::new(1, 4));
        assert_eq!(wall.owner, ParticipantId::from(2u64));
    }

    #[test]
    fn move_intent_wire_shape() {
        let intent = MoveIntent::place_wall("3", Coord::new(3, 4), Orientation::Vertical);
        let value = serde_json::to_value(&intent).unwrap();
        assert_eq!(value["type"], "place_wall");
        assert_eq!(value["participant"], "3");
        assert_eq!(value["anchor"]["row"], 3);
        assert_eq!(value["orientation"], "vertical");
    }

    #[test]
    fn push_frames_with_unknown_type_parse_as_other() {
        let msg: PushMessage =
            serde_json::from_str(r#"{"type": "refresh", "sessionId": "g1"}"#).unwrap();
        assert_eq!(
            msg,
            PushMessage::Refresh {
                session_id: SessionId::parse("g1").unwrap()
            }
        );
        let msg: PushMessage =
            serde_json::from_str(r#"{"type": "chat", "sessionId": "g1"}"#).unwrap();
        assert_eq!(msg, PushMessage::Other);
    }

    #[test]
    fn session_ids_from_the_wire_are_validated() {
        let id: SessionId = serde_json::from_str("5").unwrap();
        assert_eq!(id.as_str(), "5");
        let id: SessionId = serde_json::from_str("\"g1\"").unwrap();
        assert_eq!(id, SessionId::parse("g1").unwrap());

        assert!(serde_json::from_str::<SessionId>("\"a/b\"").is_err());
        assert!(serde_json::from_str::<SessionId>("\"\"").is_err());

        let json = r#"{"id": "a/b", "status": "running", "creator": {"id": 1}}"#;
        assert!(serde_json::from_str::<Session>(json).is_err());
        let json = r#"{"id": 5, "status": "running", "creator": {"id": 1}}"#;
        let session: Session = serde_json::from_str(json).unwrap();
        assert_eq!(session.id.as_str(), "5");
    }

    #[test]
    fn huge_board_size_does_not_overflow_the_grid() {
        let json = r#"{"id": "g1", "status": "running", "creator": {"id": 1}, "boardSize": 40000}"#;
        let session: Session = serde_json::from_str(json).unwrap();
        assert_eq!(session.grid_limit(), 79_998);
        assert!(Coord::new(u16::MAX, 0).within(session.grid_limit()));
    }

    #[test]
    fn valid_session_ids() {
        assert!(SessionId::parse("abc123").is_ok());
        assert!(SessionId::parse("65f1c0e2-9a1b").is_ok());
        assert_eq!(SessionId::parse("  g7 ").unwrap().as_str(), "g7");
    }

    #[test]
    fn invalid_session_ids() {
        assert!(SessionId::parse("").is_err());
        assert!(SessionId::parse("a/b").is_err());
        assert!(SessionId::parse("a b").is_err());
        assert!(SessionId::parse(&"x".repeat(64)).is_err());
    }

    #[test]
    fn opponent_lookup_skips_self() {
        let session = Session {
            id: SessionId::parse("g").unwrap(),
            status: SessionStatus::Running,
            creator: Participant::new("1"),
            current_turn: None,
            players: vec![Participant::new("1"), Participant::new("2")],
            board_size: 9,
            winner: None,
        };
        assert_eq!(
            session.opponent_of(&"1".into()).map(|p| p.id.clone()),
            Some(ParticipantId::from("2"))
        );
        assert_eq!(session.grid_limit(), 16);
    }
}
