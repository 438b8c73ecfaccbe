//! Signature recovery and local signing.
//!
//! Attestations are secp256k1 signatures over the personal-message digest of
//! a 32-byte identifier (see [`personal_message_digest`]). The engine only
//! needs to learn *who* signed, so verification is expressed as recovery of
//! the signer's account.

use crate::encoding::personal_message_digest;
use crate::error::{Error, Result};
use crate::ids::{Account, Signature};
use alloy_primitives::keccak256;
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;

/// Recovers the account that produced a signature over a message.
pub trait SignatureVerifier {
    /// Return the signing account, or `None` if the signature is malformed
    /// or does not recover to any key.
    fn recover(&self, message: &[u8; 32], signature: &Signature) -> Option<Account>;
}

/// secp256k1 recovery with Ethereum personal-message digests.
#[derive(Debug, Clone, Copy, Default)]
pub struct EthereumVerifier;

impl SignatureVerifier for EthereumVerifier {
    fn recover(&self, message: &[u8; 32], signature: &Signature) -> Option<Account> {
        let bytes = signature.as_bytes();
        if bytes.len() != Signature::LEN {
            return None;
        }

        let sig = EcdsaSignature::from_slice(&bytes[..64]).ok()?;
        // Wallets emit v as 27/28, raw signers as 0/1
        let v = match bytes[64] {
            v @ 27..=28 => v - 27,
            v => v,
        };
        let recovery_id = RecoveryId::from_byte(v)?;

        let digest = personal_message_digest(message);
        let key = VerifyingKey::recover_from_prehash(&digest, &sig, recovery_id).ok()?;
        Some(account_of(&key))
    }
}

/// Derive the account controlled by a public key.
pub fn account_of(key: &VerifyingKey) -> Account {
    let point = key.as_affine().to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    let mut out = [0u8; 20];
    out.copy_from_slice(&hash.0[12..]);
    Account(out)
}

/// A private key held by a client, producing signatures the engine accepts.
pub struct LocalSigner {
    key: SigningKey,
    account: Account,
}

impl LocalSigner {
    /// Load a signer from a 32-byte secret.
    pub fn from_bytes(secret: &[u8; 32]) -> Result<Self> {
        let key = SigningKey::from_slice(secret)
            .map_err(|e| Error::InvalidInput(format!("invalid secret key: {}", e)))?;
        let account = account_of(key.verifying_key());
        Ok(Self { key, account })
    }

    /// The account this signer controls.
    pub fn account(&self) -> Account {
        self.account
    }

    /// Sign a 32-byte identifier (surfer id or session id).
    pub fn sign(&self, message: &[u8; 32]) -> Result<Signature> {
        let digest = personal_message_digest(message);
        let (sig, recovery_id) = self
            .key
            .sign_prehash_recoverable(&digest)
            .map_err(|e| Error::InvalidInput(format!("signing failed: {}", e)))?;

        let mut out = [0u8; 65];
        out[..64].copy_from_slice(&sig.to_bytes());
        out[64] = recovery_id.to_byte() + 27;
        Ok(Signature::from(out))
    }
}

impl std::fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSigner")
            .field("account", &self.account)
            .finish_non_exhaustive()
    }
}
