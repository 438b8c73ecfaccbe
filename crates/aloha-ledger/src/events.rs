//! Notifications emitted by committed transitions.

use crate::config::Setting;
use crate::ids::{Account, SessionId, SurferId};
use crate::token::amount_serde;
use serde::{Deserialize, Serialize};

/// Something that happened on the ledger. Only successful calls emit events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerEvent {
    SurferAdded {
        surfer: SurferId,
        owner: Account,
    },
    SurferEdited {
        surfer: SurferId,
        owner: Account,
    },
    SurferRemoved {
        surfer: SurferId,
    },
    SurferApproved {
        from: SurferId,
        to: SurferId,
    },
    SurfSessionCreated {
        session: SessionId,
        creator: Account,
    },
    SurfSessionApproved {
        session: SessionId,
        surfer: SurferId,
    },
    SurfSessionFinalized {
        session: SessionId,
        #[serde(with = "amount_serde")]
        minted: u128,
        #[serde(with = "amount_serde")]
        burned: u128,
    },
    Minted {
        account: Account,
        #[serde(with = "amount_serde")]
        amount: u128,
    },
    Burned {
        account: Account,
        #[serde(with = "amount_serde")]
        amount: u128,
    },
    ConfigUpdated {
        setting: Setting,
        value: u64,
    },
}

impl LedgerEvent {
    /// Short name, as used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            LedgerEvent::SurferAdded { .. } => "surfer_added",
            LedgerEvent::SurferEdited { .. } => "surfer_edited",
            LedgerEvent::SurferRemoved { .. } => "surfer_removed",
            LedgerEvent::SurferApproved { .. } => "surfer_approved",
            LedgerEvent::SurfSessionCreated { .. } => "surf_session_created",
            LedgerEvent::SurfSessionApproved { .. } => "surf_session_approved",
            LedgerEvent::SurfSessionFinalized { .. } => "surf_session_finalized",
            LedgerEvent::Minted { .. } => "minted",
            LedgerEvent::Burned { .. } => "burned",
            LedgerEvent::ConfigUpdated { .. } => "config_updated",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagged_json_roundtrip_with_large_amounts() {
        let event = LedgerEvent::Minted {
            account: Account([3; 20]),
            amount: u128::MAX,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""event":"minted""#));
        let back: LedgerEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
        assert_eq!(back.name(), "minted");
    }
}
