//! Engine configuration and genesis.

use crate::ids::Account;
use serde::{Deserialize, Serialize};

/// One day in seconds.
pub const DAY: u64 = 24 * 60 * 60;

/// Extra issuance tied to a session's award slots, in whole tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AwardPolicy {
    /// Minted to the best-award surfer on finalization
    #[serde(default)]
    pub best_award_bonus: u64,

    /// Burned from the other-award surfer on finalization, capped at balance
    #[serde(default)]
    pub other_award_penalty: u64,
}

impl AwardPolicy {
    /// No award adjustments: a session issues exactly its waves.
    pub const fn none() -> Self {
        Self {
            best_award_bonus: 0,
            other_award_penalty: 0,
        }
    }

    /// +5 for the best wave, -3 for the kook.
    pub const fn original() -> Self {
        Self {
            best_award_bonus: 5,
            other_award_penalty: 3,
        }
    }
}

/// Engine parameters. Everything but `admin` can later be changed by the
/// administrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Account holding administrative rights
    pub admin: Account,

    /// Minimum approval count consulted by external policy
    pub min_approvals: u32,

    /// Seconds between surfer admissions (network-wide)
    pub surfer_add_interval: u64,

    /// Seconds between session admissions (network-wide)
    pub session_add_interval: u64,

    #[serde(default)]
    pub awards: AwardPolicy,
}

impl EngineConfig {
    /// Defaults: one approval, one admission per day on each gate, no
    /// award adjustments.
    pub fn new(admin: Account) -> Self {
        Self {
            admin,
            min_approvals: 1,
            surfer_add_interval: DAY,
            session_add_interval: DAY,
            awards: AwardPolicy::none(),
        }
    }

    #[must_use]
    pub fn with_intervals(mut self, surfer: u64, session: u64) -> Self {
        self.surfer_add_interval = surfer;
        self.session_add_interval = session;
        self
    }

    #[must_use]
    pub fn with_awards(mut self, awards: AwardPolicy) -> Self {
        self.awards = awards;
        self
    }

    #[must_use]
    pub fn with_min_approvals(mut self, min_approvals: u32) -> Self {
        self.min_approvals = min_approvals;
        self
    }
}

/// A surfer present from the start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisSurfer {
    pub account: Account,
    pub alias: String,
    pub metadata: String,
}

/// Initial registry contents. Genesis surfers bypass the admission throttle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genesis {
    #[serde(default)]
    pub surfers: Vec<GenesisSurfer>,
}

impl Genesis {
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_surfer(mut self, account: Account, alias: &str, metadata: &str) -> Self {
        self.surfers.push(GenesisSurfer {
            account,
            alias: alias.to_string(),
            metadata: metadata.to_string(),
        });
        self
    }
}

/// Administrator-settable parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Setting {
    MinApprovals,
    SurferAddInterval,
    SessionAddInterval,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_from_json() {
        let json = r#"{
            "surfers": [
                {"account": "0x0101010101010101010101010101010101010101", "alias": "Viking", "metadata": "QmA"}
            ]
        }"#;
        let genesis: Genesis = serde_json::from_str(json).unwrap();
        assert_eq!(genesis.surfers[0].account, Account([1; 20]));
        assert_eq!(genesis.surfers[0].alias, "Viking");
    }

    #[test]
    fn config_awards_default_to_none() {
        let json = r#"{
            "admin": "0x0000000000000000000000000000000000000009",
            "min_approvals": 2,
            "surfer_add_interval": 10,
            "session_add_interval": 20
        }"#;
        let config: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.awards, AwardPolicy::none());
        assert_eq!(config.min_approvals, 2);
    }
}
