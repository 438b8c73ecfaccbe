//! Content-addressed identifiers.
//!
//! Identifiers are `keccak256` over Solidity-style packed encodings so that
//! signatures produced by existing clients stay valid:
//!
//! ```text
//! surfer_id  = keccak256(alias)
//! session_id = keccak256(p_0 ‖ .. ‖ p_n ‖ w_0 ‖ .. ‖ w_n ‖ best ‖ other ‖ time ‖ metadata)
//! ```
//!
//! Ids are 32 raw bytes, integers are 32-byte big-endian words, and the
//! metadata pointer is its raw UTF-8 bytes with no length prefix. Array
//! elements are word-padded, scalars are not length-prefixed. Changing any
//! byte here breaks every previously issued signature.

use crate::ids::{SessionId, SurferId};
use alloy_primitives::keccak256;

/// Prefix for signed personal messages carrying a 32-byte payload.
pub const PERSONAL_MESSAGE_PREFIX: &[u8] = b"\x19Ethereum Signed Message:\n32";

/// Derive a surfer identifier from its alias.
pub fn surfer_id(alias: &str) -> SurferId {
    SurferId(keccak256(alias.as_bytes()).0)
}

/// Encode a `u64` as a 32-byte big-endian word.
fn word(value: u64) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[24..].copy_from_slice(&value.to_be_bytes());
    out
}

/// Packed encoding of a session's defining fields.
pub fn pack_session(
    surfers: &[SurferId],
    waves: &[u64],
    best_award: SurferId,
    other_award: SurferId,
    session_time: u64,
    metadata: &str,
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(32 * (surfers.len() + waves.len() + 3) + metadata.len());
    for surfer in surfers {
        buf.extend_from_slice(surfer.as_bytes());
    }
    for &wave in waves {
        buf.extend_from_slice(&word(wave));
    }
    buf.extend_from_slice(best_award.as_bytes());
    buf.extend_from_slice(other_award.as_bytes());
    buf.extend_from_slice(&word(session_time));
    buf.extend_from_slice(metadata.as_bytes());
    buf
}

/// Content hash identifying a session.
pub fn session_id(
    surfers: &[SurferId],
    waves: &[u64],
    best_award: SurferId,
    other_award: SurferId,
    session_time: u64,
    metadata: &str,
) -> SessionId {
    let packed = pack_session(surfers, waves, best_award, other_award, session_time, metadata);
    SessionId(keccak256(&packed).0)
}

/// Digest actually signed when a party attests to `message`.
pub fn personal_message_digest(message: &[u8; 32]) -> [u8; 32] {
    let mut buf = Vec::with_capacity(PERSONAL_MESSAGE_PREFIX.len() + 32);
    buf.extend_from_slice(PERSONAL_MESSAGE_PREFIX);
    buf.extend_from_slice(message);
    keccak256(&buf).0
}
