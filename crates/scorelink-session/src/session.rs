//! Session state: "am I signed in, who am I, what is my score".
//!
//! Two kinds of writes hit this record and they can race:
//!
//! - **wholesale**: login, registration, profile refresh, or renewal
//!   replace the whole [`Identity`]. Stamped with the snapshot's
//!   `updated_at`.
//! - **score-only**: a `score_update` push changes just the score.
//!   Stamped with the event's `updated_at`.
//!
//! The later server timestamp wins for the fields it touches. A wholesale
//! snapshot older than the last applied push keeps the pushed score; a push
//! older than the current score stamp is dropped.
//!
//! ```text
//!  replace_identity(T1) ──→ [score@T1] ──apply_score(T2 > T1)──→ [score@T2]
//!                                           │
//!                  replace_identity(T0 < T2) ┘ keeps score@T2, takes other fields
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use scorelink_protocol::{Identity, ScoreUpdated};
use tokio::sync::watch;

/// An immutable view of the session at one moment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    identity: Option<Identity>,
    /// Server time of the write the current score came from.
    score_as_of: Option<DateTime<Utc>>,
}

impl SessionSnapshot {
    /// `true` while an identity is held.
    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    /// The signed-in user, if any.
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Shortcut for the current score.
    pub fn score(&self) -> Option<i64> {
        self.identity.as_ref().map(|i| i.score)
    }

    /// Server time the current score was written at.
    pub fn score_as_of(&self) -> Option<DateTime<Utc>> {
        self.score_as_of
    }
}

/// What happened to a score-only update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreApplied {
    /// The score was written.
    Applied,
    /// A newer write already set the score; the update was dropped.
    Stale,
    /// Nobody is signed in; the update was dropped.
    NoSession,
}

/// Shared handle to the session record.
///
/// Every write swaps the snapshot under the watch cell's lock, so readers
/// never observe a half-applied update.
#[derive(Clone)]
pub struct SessionStore {
    tx: Arc<watch::Sender<SessionSnapshot>>,
}

impl SessionStore {
    /// Creates an unauthenticated session.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionSnapshot::default());
        Self { tx: Arc::new(tx) }
    }

    /// A copy of the current snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.tx.borrow().clone()
    }

    /// `true` while an identity is held.
    pub fn is_authenticated(&self) -> bool {
        self.tx.borrow().is_authenticated()
    }

    /// The signed-in user, if any.
    pub fn identity(&self) -> Option<Identity> {
        self.tx.borrow().identity.clone()
    }

    /// Replaces the whole identity (login, registration, profile refresh,
    /// renewal).
    ///
    /// If a push for the same user already wrote a score newer than
    /// `identity.updated_at`, that score is kept.
    pub fn replace_identity(&self, identity: Identity) {
        self.tx.send_modify(|snapshot| {
            let stamp = identity.updated_at;
            let mut next = identity;
            let mut score_as_of = Some(stamp);

            let same_user =
                snapshot.identity.as_ref().map(|i| i.id) == Some(next.id);
            if let (true, Some(pushed_at), Some(current)) =
                (same_user, snapshot.score_as_of, snapshot.identity.as_ref())
            {
                if pushed_at > stamp {
                    tracing::debug!(
                        user = %next.id,
                        snapshot_at = %stamp,
                        %pushed_at,
                        "keeping newer pushed score over stale snapshot"
                    );
                    next.score = current.score;
                    score_as_of = Some(pushed_at);
                }
            }

            *snapshot = SessionSnapshot {
                identity: Some(next),
                score_as_of,
            };
        });
    }

    /// Writes the score from a `score_update` push, leaving every other
    /// identity field alone.
    pub fn apply_score(&self, update: &ScoreUpdated) -> ScoreApplied {
        let mut outcome = ScoreApplied::Applied;
        self.tx.send_if_modified(|snapshot| {
            let Some(identity) = snapshot.identity.as_mut() else {
                outcome = ScoreApplied::NoSession;
                return false;
            };
            if snapshot.score_as_of.is_some_and(|at| update.updated_at < at) {
                outcome = ScoreApplied::Stale;
                return false;
            }
            identity.score = update.new_score;
            snapshot.score_as_of = Some(update.updated_at);
            true
        });

        match outcome {
            ScoreApplied::Applied => tracing::debug!(
                score = update.new_score,
                earned = update.points_earned,
                "score updated from push"
            ),
            ScoreApplied::Stale => tracing::debug!(
                updated_at = %update.updated_at,
                "dropping stale score push"
            ),
            ScoreApplied::NoSession => {
                tracing::debug!("score push with no session, ignored")
            }
        }
        outcome
    }

    /// Signs the session out. Idempotent.
    pub fn clear(&self) {
        self.tx.send_if_modified(|snapshot| {
            if snapshot.identity.is_some() {
                *snapshot = SessionSnapshot::default();
                true
            } else {
                false
            }
        });
    }

    /// Watches session changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.tx.subscribe()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

// =========================================================================
// Tests
// =========================================================================
