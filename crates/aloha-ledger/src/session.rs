//! Surf sessions and the quorum state machine.
//!
//! A session is keyed by the content hash of its defining fields, so two
//! submissions with identical content always collide. Each listed surfer
//! owns one approval seat; the session is finalized the moment the last
//! seat is filled.
//!
//! # State machine
//!
//! ```text
//!  Open ──(last seat filled)──▶ Finalized
//! ```
//!
//! Seats only ever go from unset to set, and the transition into
//! `Finalized` is reported exactly once by [`apply_approvals`]. Issuance is
//! the engine's business; this module never touches balances.

use crate::encoding;
use crate::error::{Error, Result};
use crate::ids::{Account, SessionId, SurferId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// The content fields of a session, as submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDraft {
    /// Participating surfers, order-significant
    pub surfers: Vec<SurferId>,
    /// Waves caught per surfer, parallel to `surfers`
    pub waves: Vec<u64>,
    /// Best-wave award, or [`SurferId::NONE`]
    pub best_award: SurferId,
    /// Kook award, or [`SurferId::NONE`]
    pub other_award: SurferId,
    /// When the session happened (unix seconds)
    pub session_time: u64,
    /// Content address of the off-ledger session details
    pub metadata: String,
}

impl SessionDraft {
    /// The session's content-addressed identifier.
    pub fn id(&self) -> SessionId {
        encoding::session_id(
            &self.surfers,
            &self.waves,
            self.best_award,
            self.other_award,
            self.session_time,
            &self.metadata,
        )
    }

    /// Check structural invariants. Does not consult the registry.
    pub fn validate(&self) -> Result<()> {
        if self.surfers.is_empty() {
            return Err(Error::InvalidInput("session has no surfers".into()));
        }
        if self.waves.len() != self.surfers.len() {
            return Err(Error::LengthMismatch {
                what: "waves",
                expected: self.surfers.len(),
                actual: self.waves.len(),
            });
        }
        if self.metadata.is_empty() {
            return Err(Error::EmptyMetadata);
        }

        let mut seen = BTreeSet::new();
        for surfer in &self.surfers {
            if surfer.is_zero() {
                return Err(Error::InvalidInput("surfer list contains the null id".into()));
            }
            if !seen.insert(*surfer) {
                return Err(Error::InvalidInput(format!("surfer {} listed twice", surfer)));
            }
        }

        for (slot, award) in [("best award", self.best_award), ("other award", self.other_award)] {
            if !award.is_zero() && !seen.contains(&award) {
                return Err(Error::InvalidInput(format!(
                    "{} names {} who is not in the session",
                    slot, award
                )));
            }
        }
        Ok(())
    }
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Open,
    Finalized,
}

/// A stored session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfSession {
    pub id: SessionId,
    pub surfers: Vec<SurferId>,
    pub waves: Vec<u64>,
    pub best_award: SurferId,
    pub other_award: SurferId,
    pub session_time: u64,
    pub metadata: String,

    /// One seat per surfer
    pub approvals: Vec<bool>,

    /// Set exactly once, when the last seat is filled
    pub finalized: bool,

    /// Account that submitted the session
    pub creator: Account,

    /// Ledger time of admission
    pub created_at: u64,
}

impl SurfSession {
    /// Build a stored session from a validated draft.
    pub fn from_draft(draft: SessionDraft, creator: Account, created_at: u64) -> Self {
        let seats = draft.surfers.len();
        Self {
            id: draft.id(),
            surfers: draft.surfers,
            waves: draft.waves,
            best_award: draft.best_award,
            other_award: draft.other_award,
            session_time: draft.session_time,
            metadata: draft.metadata,
            approvals: vec![false; seats],
            finalized: false,
            creator,
            created_at,
        }
    }

    /// Recover the content fields.
    pub fn draft(&self) -> SessionDraft {
        SessionDraft {
            surfers: self.surfers.clone(),
            waves: self.waves.clone(),
            best_award: self.best_award,
            other_award: self.other_award,
            session_time: self.session_time,
            metadata: self.metadata.clone(),
        }
    }

    pub fn status(&self) -> SessionStatus {
        if self.finalized {
            SessionStatus::Finalized
        } else {
            SessionStatus::Open
        }
    }

    /// Number of filled seats.
    pub fn approval_count(&self) -> usize {
        self.approvals.iter().filter(|&&a| a).count()
    }

    /// Surfers whose seats are filled, in seat order.
    pub fn approved_surfers(&self) -> Vec<SurferId> {
        self.surfers
            .iter()
            .zip(&self.approvals)
            .filter(|(_, &approved)| approved)
            .map(|(surfer, _)| *surfer)
            .collect()
    }

}

/// Marker returned when a transition filled the last open seat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuorumReached;

/// Fill `indices` in `seats`.
///
/// Pure: either every index is valid and unset (and distinct), in which
/// case the new seat vector is returned, or nothing changes. Reports
/// [`QuorumReached`] only when the result is complete and the input was not.
pub fn apply_approvals(
    seats: &[bool],
    indices: &[usize],
) -> Result<(Vec<bool>, Option<QuorumReached>)> {
    let mut next = seats.to_vec();
    for &index in indices {
        match next.get_mut(index) {
            None => {
                return Err(Error::InvalidInput(format!(
                    "seat {} out of range for {} surfers",
                    index,
                    seats.len()
                )))
            }
            Some(seat) if *seat => return Err(Error::AlreadyApproved),
            Some(seat) => *seat = true,
        }
    }

    let was_complete = seats.iter().all(|&s| s);
    let is_complete = next.iter().all(|&s| s);
    let quorum = (is_complete && !was_complete).then_some(QuorumReached);
    Ok((next, quorum))
}

/// All sessions ever admitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionLedger {
    sessions: BTreeMap<SessionId, SurfSession>,
    /// Admission order
    order: Vec<SessionId>,
}

impl SessionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn get(&self, id: &SessionId) -> Option<&SurfSession> {
        self.sessions.get(id)
    }

    /// Get a session or fail with `SessionNotFound`.
    pub fn resolve(&self, id: &SessionId) -> Result<&SurfSession> {
        self.sessions.get(id).ok_or(Error::SessionNotFound(*id))
    }

    pub(crate) fn get_mut(&mut self, id: &SessionId) -> Result<&mut SurfSession> {
        self.sessions.get_mut(id).ok_or(Error::SessionNotFound(*id))
    }

    /// Store a new session. Fails if its id is taken.
    pub fn insert(&mut self, session: SurfSession) -> Result<()> {
        if self.sessions.contains_key(&session.id) {
            return Err(Error::AlreadyExists(format!("session {}", session.id)));
        }
        self.order.push(session.id);
        self.sessions.insert(session.id, session);
        Ok(())
    }

    /// Session ids in admission order.
    pub fn ids(&self) -> Vec<SessionId> {
        self.order.clone()
    }

    /// Sessions in admission order.
    pub fn list(&self) -> Vec<&SurfSession> {
        self.order
            .iter()
            .filter_map(|id| self.sessions.get(id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
