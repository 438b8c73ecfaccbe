//! Fixed-width identifiers used throughout the ledger.
//!
//! Every identifier renders as `0x`-prefixed lowercase hex, both in
//! `Display` output and in serialized form, so they can be used as JSON
//! map keys.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Error returned when parsing an identifier from hex.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseIdError {
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },
}

fn decode_fixed<const N: usize>(s: &str) -> Result<[u8; N], ParseIdError> {
    let bytes = hex::decode(s.strip_prefix("0x").unwrap_or(s))?;
    if bytes.len() != N {
        return Err(ParseIdError::Length {
            expected: N,
            actual: bytes.len(),
        });
    }
    let mut arr = [0u8; N];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}

macro_rules! fixed_id {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            /// Width in bytes.
            pub const LEN: usize = $len;

            /// Create from raw bytes.
            pub const fn from_bytes(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            /// Get the raw bytes.
            pub const fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// Convert to `0x`-prefixed hex.
            pub fn to_hex(&self) -> String {
                format!("0x{}", hex::encode(self.0))
            }

            /// Parse from hex, with or without the `0x` prefix.
            pub fn from_hex(s: &str) -> Result<Self, ParseIdError> {
                decode_fixed::<$len>(s).map(Self)
            }

            /// True for the all-zero value.
            pub fn is_zero(&self) -> bool {
                self.0 == [0u8; $len]
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                // Short form keeps log lines readable
                let hex = hex::encode(self.0);
                write!(f, "{}(0x{}..)", stringify!($name), &hex[..8])
            }
        }

        impl std::str::FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_hex(s)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Self::from_hex(&s).map_err(de::Error::custom)
            }
        }
    };
}

fixed_id!(
    /// A surfer identifier: `keccak256(alias)`.
    SurferId,
    32
);

fixed_id!(
    /// A surf session identifier: the content hash of its defining fields.
    SessionId,
    32
);

fixed_id!(
    /// An externally-controlled account (20-byte address).
    Account,
    20
);

impl SurferId {
    /// Sentinel used in award slots to mean "nobody".
    pub const NONE: SurferId = SurferId([0u8; 32]);
}

/// A recoverable signature, `r ‖ s ‖ v`.
///
/// Stored as raw bytes so malformed input still deserializes and is then
/// rejected by the verifier as an invalid signature.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Signature(pub Vec<u8>);

impl Signature {
    /// Length of a well-formed signature.
    pub const LEN: usize = 65;

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Convert to `0x`-prefixed hex.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.0))
    }

    /// Parse from hex, with or without the `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, ParseIdError> {
        Ok(Self(hex::decode(s.strip_prefix("0x").unwrap_or(s))?))
    }
}

impl From<[u8; 65]> for Signature {
    fn from(bytes: [u8; 65]) -> Self {
        Self(bytes.to_vec())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({} bytes)", self.0.len())
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(de::Error::custom)
    }
}
