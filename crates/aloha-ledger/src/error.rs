//! Error types for the Aloha ledger.
//!
//! Every error is a rejected transition: the ledger is left exactly as it
//! was before the call.

use crate::ids::{Account, SessionId, SurferId};
use crate::throttle::Gate;
use thiserror::Error;

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Alias was empty
    #[error("alias cannot be empty")]
    EmptyAlias,

    /// Metadata pointer was empty
    #[error("metadata pointer cannot be empty")]
    EmptyMetadata,

    /// Approval batch named nobody
    #[error("not enough approvals: target list is empty")]
    EmptyTargetList,

    /// Admission cooldown has not elapsed
    #[error("{gate} admission throttled until {ready_at}")]
    ThrottleActive { gate: Gate, ready_at: u64 },

    /// Content-addressed identifier (or account mapping) already taken
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Caller lacks the required relationship to the record
    #[error("not authorized")]
    NotAuthorized,

    /// Caller does not resolve to a registered surfer
    #[error("not a surfer: {0}")]
    NotAParticipant(Account),

    /// Signature does not recover to the expected surfer
    #[error("invalid signature at position {index}")]
    InvalidSignature { index: usize },

    /// Approval already recorded
    #[error("already approved")]
    AlreadyApproved,

    /// Burn exceeds balance
    #[error("insufficient balance: have {available}, need {needed}")]
    InsufficientBalance { available: u128, needed: u128 },

    /// Aloha cannot be transferred
    #[error("token is non-transferable")]
    NonTransferable,

    /// Unknown surfer
    #[error("surfer not found: {0}")]
    SurferNotFound(SurferId),

    /// Unknown session
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    /// Account owns no surfer
    #[error("no surfer for account {0}")]
    AccountNotFound(Account),

    /// Parallel arrays differ in length
    #[error("length mismatch: {what} has {actual} entries, expected {expected}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Structurally invalid input
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Balance or supply arithmetic overflowed
    #[error("arithmetic overflow")]
    Overflow,
}

impl Error {
    /// True for the empty-input family (alias, metadata, target list).
    pub fn is_empty_input(&self) -> bool {
        matches!(
            self,
            Error::EmptyAlias | Error::EmptyMetadata | Error::EmptyTargetList
        )
    }

    /// True for any of the not-found variants.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::SurferNotFound(_) | Error::SessionNotFound(_) | Error::AccountNotFound(_)
        )
    }
}
