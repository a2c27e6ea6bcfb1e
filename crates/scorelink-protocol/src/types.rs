//! Core protocol types for Scorelink's push channel and auth payloads.
//!
//! Everything here is serialized on the wire, so the serde attributes are
//! part of the contract with the scoreboard server. Timestamps are
//! RFC 3339 strings on the wire and `DateTime<Utc>` in Rust; the
//! server-assigned `updated_at` values are what the session layer compares
//! to decide which write is newer.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for a user account.
///
/// Serialized as a plain number (`42`, not `{"0":42}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "U-{}", self.0)
    }
}

/// The authenticated user's profile plus their current score.
///
/// The REST API uses camelCase for the timestamp fields, hence the
/// `rename_all`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: UserId,
    pub email: String,
    pub username: String,
    pub score: i64,
    pub created_at: DateTime<Utc>,
    /// When the server produced this snapshot. Used as the snapshot's
    /// freshness stamp.
    pub updated_at: DateTime<Utc>,
}

/// One row of the leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub id: UserId,
    pub username: String,
    pub score: i64,
    pub rank: u32,
}

// ---------------------------------------------------------------------------
// Push events
// ---------------------------------------------------------------------------

/// Payload of a `score_update` push: the user's score changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreUpdated {
    pub new_score: i64,
    pub points_earned: i64,
    pub updated_at: DateTime<Utc>,
}

/// Payload of a `leaderboard_update` push: the ranking changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardUpdated {
    /// Ranked entries, best first.
    #[serde(rename = "leaderboard")]
    pub entries: Vec<LeaderboardEntry>,
    pub updated_at: DateTime<Utc>,
}

/// The categories of push events a listener can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "score_update")]
    ScoreUpdated,
    #[serde(rename = "leaderboard_update")]
    LeaderboardUpdated,
}

impl EventKind {
    /// Every event category, in a stable order.
    pub const ALL: [EventKind; 2] =
        [EventKind::ScoreUpdated, EventKind::LeaderboardUpdated];

    /// The wire name of this category.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ScoreUpdated => "score_update",
            Self::LeaderboardUpdated => "leaderboard_update",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded server push.
///
/// Adjacently tagged on the wire:
/// `{ "event": "score_update", "data": { "new_score": 10, ... } }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum PushEvent {
    #[serde(rename = "score_update")]
    ScoreUpdated(ScoreUpdated),
    #[serde(rename = "leaderboard_update")]
    LeaderboardUpdated(LeaderboardUpdated),
}

impl PushEvent {
    /// The category listeners subscribe to for this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::ScoreUpdated(_) => EventKind::ScoreUpdated,
            Self::LeaderboardUpdated(_) => EventKind::LeaderboardUpdated,
        }
    }

    /// The server-assigned timestamp carried by every event.
    pub fn updated_at(&self) -> DateTime<Utc> {
        match self {
            Self::ScoreUpdated(e) => e.updated_at,
            Self::LeaderboardUpdated(e) => e.updated_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Frames
// ---------------------------------------------------------------------------

/// Everything the server can send over the push channel.
///
/// ```text
/// { "type": "Welcome",   "data": { "connection_id": "abc" } }
/// { "type": "Event",     "data": { "event": "score_update", "data": {..} } }
/// { "type": "AuthError", "data": { "message": "token expired" } }
/// { "type": "Disconnect","data": { "reason": "...", "retry": false } }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerFrame {
    /// The server accepted the credential; the channel is open.
    Welcome { connection_id: String },

    /// An out-of-band push.
    Event(PushEvent),

    /// The presented credential was refused. Reconnecting with the same
    /// credential cannot succeed.
    AuthError { message: String },

    /// The server is closing the channel. Unless `retry` is set, the
    /// client must not reconnect on its own.
    Disconnect {
        reason: String,
        #[serde(default)]
        retry: bool,
    },
}

/// Frames the client sends over the push channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    /// Present a renewed credential on an already-open channel.
    Reauthenticate { token: String },
}

// =========================================================================
// Tests
// =========================================================================
