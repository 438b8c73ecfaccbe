//! Aloha reward ledger.
//!
//! Balances are kept in base units (18 decimals). Aloha cannot move between
//! accounts: it only appears through minting and disappears through
//! burning.

use crate::error::{Error, Result};
use crate::ids::{Account, SessionId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const NAME: &str = "Aloha";
pub const SYMBOL: &str = "ALH";
pub const DECIMALS: u8 = 18;

/// Base units per whole token.
pub const UNIT: u128 = 1_000_000_000_000_000_000;

/// Convert whole tokens to base units.
pub fn to_base_units(whole: u64) -> Result<u128> {
    u128::from(whole).checked_mul(UNIT).ok_or(Error::Overflow)
}

/// Serialize amounts as decimal strings so JSON clients don't lose
/// precision.
pub mod amount_serde {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(amount: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&amount.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// A single balance change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub account: Account,
    #[serde(with = "amount_serde")]
    pub amount: u128,
}

/// Everything a session's finalization changes, computed before any
/// balance is touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issuance {
    pub session: SessionId,
    /// Wave rewards and award bonus, applied in order
    pub mints: Vec<Payout>,
    /// Award penalty, capped at the balance after `mints`
    pub penalty: Option<Payout>,
}

impl Issuance {
    /// Total of all mints.
    pub fn minted(&self) -> u128 {
        self.mints.iter().map(|p| p.amount).sum()
    }
}

/// What an issuance actually did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuanceReceipt {
    pub minted: Vec<Payout>,
    pub burned: Option<Payout>,
}

/// Account balances and total supply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardLedger {
    balances: BTreeMap<Account, u128>,
    total_supply: u128,
}

impl RewardLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance_of(&self, account: &Account) -> u128 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    pub fn total_supply(&self) -> u128 {
        self.total_supply
    }

    /// Accounts with a non-zero balance.
    pub fn holders(&self) -> usize {
        self.balances.values().filter(|&&b| b > 0).count()
    }

    /// Create `amount` for `account`.
    pub fn mint(&mut self, account: Account, amount: u128) -> Result<()> {
        let balance = self
            .balance_of(&account)
            .checked_add(amount)
            .ok_or(Error::Overflow)?;
        let supply = self.total_supply.checked_add(amount).ok_or(Error::Overflow)?;
        self.balances.insert(account, balance);
        self.total_supply = supply;
        Ok(())
    }

    /// Destroy `amount` from `account`.
    pub fn burn(&mut self, account: Account, amount: u128) -> Result<()> {
        let available = self.balance_of(&account);
        if amount > available {
            return Err(Error::InsufficientBalance {
                available,
                needed: amount,
            });
        }
        self.balances.insert(account, available - amount);
        self.total_supply -= amount;
        Ok(())
    }

    /// Always fails: Aloha is non-transferable.
    pub fn transfer(&mut self, _from: Account, _to: Account, _amount: u128) -> Result<()> {
        Err(Error::NonTransferable)
    }

    /// Always fails: Aloha is non-transferable.
    pub fn transfer_from(
        &mut self,
        _spender: Account,
        _from: Account,
        _to: Account,
        _amount: u128,
    ) -> Result<()> {
        Err(Error::NonTransferable)
    }

    /// Apply a finalization's balance changes atomically.
    ///
    /// New balances are computed on the side and committed only if every
    /// mint fits; the penalty burns at most what the account holds.
    pub fn apply_issuance(&mut self, issuance: &Issuance) -> Result<IssuanceReceipt> {
        let mut touched: BTreeMap<Account, u128> = BTreeMap::new();
        let mut supply = self.total_supply;

        for payout in &issuance.mints {
            let balance = touched
                .entry(payout.account)
                .or_insert_with(|| self.balance_of(&payout.account));
            *balance = balance.checked_add(payout.amount).ok_or(Error::Overflow)?;
            supply = supply.checked_add(payout.amount).ok_or(Error::Overflow)?;
        }

        let burned = issuance.penalty.map(|penalty| {
            let balance = touched
                .entry(penalty.account)
                .or_insert_with(|| self.balance_of(&penalty.account));
            let amount = penalty.amount.min(*balance);
            *balance -= amount;
            supply -= amount;
            Payout {
                account: penalty.account,
                amount,
            }
        });

        self.balances.extend(touched);
        self.total_supply = supply;

        Ok(IssuanceReceipt {
            minted: issuance.mints.clone(),
            burned,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(n: u8) -> Account {
        Account([n; 20])
    }

    #[test]
    fn mint_and_burn_track_supply() {
        let mut ledger = RewardLedger::new();
        ledger.mint(account(1), 500).unwrap();
        ledger.burn(account(1), 200).unwrap();
        assert_eq!(ledger.balance_of(&account(1)), 300);
        assert_eq!(ledger.total_supply(), 300);
    }

    #[test]
    fn burn_more_than_balance_fails() {
        let mut ledger = RewardLedger::new();
        ledger.mint(account(1), 10).unwrap();
        assert_eq!(
            ledger.burn(account(1), 11),
            Err(Error::InsufficientBalance {
                available: 10,
                needed: 11
            })
        );
        assert_eq!(ledger.balance_of(&account(1)), 10);
    }

    #[test]
    fn transfers_always_refused() {
        let mut ledger = RewardLedger::new();
        ledger.mint(account(1), 100).unwrap();
        assert_eq!(
            ledger.transfer(account(1), account(2), 50),
            Err(Error::NonTransferable)
        );
        assert_eq!(
            ledger.transfer_from(account(3), account(1), account(2), 50),
            Err(Error::NonTransferable)
        );
        assert_eq!(ledger.balance_of(&account(1)), 100);
    }

    #[test]
    fn mint_overflow_rejected() {
        let mut ledger = RewardLedger::new();
        ledger.mint(account(1), u128::MAX).unwrap();
        assert_eq!(ledger.mint(account(2), 1), Err(Error::Overflow));
        assert_eq!(ledger.balance_of(&account(2)), 0);
    }

    #[test]
    fn issuance_penalty_is_capped() {
        let mut ledger = RewardLedger::new();
        let issuance = Issuance {
            session: SessionId([0; 32]),
            mints: vec![
                Payout { account: account(1), amount: 2 * UNIT },
                Payout { account: account(2), amount: UNIT },
                Payout { account: account(1), amount: 5 * UNIT },
            ],
            penalty: Some(Payout { account: account(2), amount: 3 * UNIT }),
        };

        let receipt = ledger.apply_issuance(&issuance).unwrap();

        assert_eq!(ledger.balance_of(&account(1)), 7 * UNIT);
        assert_eq!(ledger.balance_of(&account(2)), 0);
        assert_eq!(ledger.total_supply(), 7 * UNIT);
        assert_eq!(receipt.burned, Some(Payout { account: account(2), amount: UNIT }));
    }

    #[test]
    fn issuance_overflow_leaves_balances_untouched() {
        let mut ledger = RewardLedger::new();
        ledger.mint(account(1), u128::MAX - 1).unwrap();
        let issuance = Issuance {
            session: SessionId([0; 32]),
            mints: vec![
                Payout { account: account(2), amount: 1 },
                Payout { account: account(3), amount: 1 },
            ],
            penalty: None,
        };
        assert_eq!(ledger.apply_issuance(&issuance), Err(Error::Overflow));
        assert_eq!(ledger.balance_of(&account(2)), 0);
        assert_eq!(ledger.total_supply(), u128::MAX - 1);
    }

    #[test]
    fn base_units() {
        assert_eq!(to_base_units(5).unwrap(), 5 * UNIT);
        assert_eq!(to_base_units(0).unwrap(), 0);
    }

    #[test]
    fn payout_amount_serializes_as_string() {
        let payout = Payout { account: account(1), amount: 5 * UNIT };
        let json = serde_json::to_value(payout).unwrap();
        assert_eq!(json["amount"], "5000000000000000000");
        let back: Payout = serde_json::from_value(json).unwrap();
        assert_eq!(back, payout);
    }
}
