//! Surfer registry.
//!
//! Maps surfer ids to records and owning accounts back to ids. Records are
//! never erased: removal only makes an id unresolvable, so its alias stays
//! taken and its approvals remain part of history.

use crate::encoding;
use crate::error::{Error, Result};
use crate::ids::{Account, SurferId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A registered surfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Surfer {
    /// `keccak256(alias)`
    pub id: SurferId,

    /// Account allowed to act as this surfer
    pub owner: Account,

    /// Registration alias, immutable
    pub alias: String,

    /// Content address of the off-ledger profile
    pub metadata: String,

    /// Surfers who attested to this one, in attestation order
    #[serde(default)]
    pub approvals: Vec<SurferId>,

    /// Set by an administrative remove
    #[serde(default)]
    pub removed: bool,
}

impl Surfer {
    /// Create a fresh record with no approvals.
    pub fn new(owner: Account, alias: String, metadata: String) -> Self {
        Self {
            id: encoding::surfer_id(&alias),
            owner,
            alias,
            metadata,
            approvals: Vec::new(),
            removed: false,
        }
    }
}

/// Registry of all surfers ever admitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurferRegistry {
    surfers: BTreeMap<SurferId, Surfer>,
    /// Registration order
    order: Vec<SurferId>,
    by_account: BTreeMap<Account, SurferId>,
    /// `(from, to)` pairs
    approved_by: BTreeSet<(SurferId, SurferId)>,
}

impl SurferRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure a new surfer with this id and owner could be stored.
    pub fn ensure_available(&self, id: &SurferId, owner: &Account) -> Result<()> {
        if self.surfers.contains_key(id) {
            return Err(Error::AlreadyExists(format!("surfer {}", id)));
        }
        if self.by_account.contains_key(owner) {
            return Err(Error::AlreadyExists(format!("account {} already owns a surfer", owner)));
        }
        Ok(())
    }

    /// Store a new surfer. Returns its id.
    pub fn insert(&mut self, surfer: Surfer) -> Result<SurferId> {
        self.ensure_available(&surfer.id, &surfer.owner)?;
        let id = surfer.id;
        self.by_account.insert(surfer.owner, id);
        self.order.push(id);
        self.surfers.insert(id, surfer);
        Ok(id)
    }

    /// Get a record, including removed ones.
    pub fn get(&self, id: &SurferId) -> Option<&Surfer> {
        self.surfers.get(id)
    }

    /// Get a record that is still resolvable.
    pub fn resolve(&self, id: &SurferId) -> Result<&Surfer> {
        match self.surfers.get(id) {
            Some(surfer) if !surfer.removed => Ok(surfer),
            _ => Err(Error::SurferNotFound(*id)),
        }
    }

    /// Whether `id` names a resolvable surfer.
    pub fn is_surfer(&self, id: &SurferId) -> bool {
        self.resolve(id).is_ok()
    }

    /// Reverse lookup from owning account.
    pub fn lookup_by_account(&self, account: &Account) -> Result<SurferId> {
        self.by_account
            .get(account)
            .copied()
            .ok_or(Error::AccountNotFound(*account))
    }

    /// Replace owner and metadata. Authorization is the caller's job.
    pub fn edit(&mut self, id: &SurferId, new_owner: Account, metadata: String) -> Result<()> {
        let current = self.resolve(id)?.owner;
        if current != new_owner {
            if let Some(other) = self.by_account.get(&new_owner) {
                if other != id {
                    return Err(Error::AlreadyExists(format!(
                        "account {} already owns a surfer",
                        new_owner
                    )));
                }
            }
        }

        self.by_account.remove(&current);
        self.by_account.insert(new_owner, *id);
        if let Some(surfer) = self.surfers.get_mut(id) {
            surfer.owner = new_owner;
            surfer.metadata = metadata;
        }
        Ok(())
    }

    /// Make `id` unresolvable. The record itself is kept.
    pub fn remove(&mut self, id: &SurferId) -> Result<()> {
        let owner = self.resolve(id)?.owner;
        self.by_account.remove(&owner);
        if let Some(surfer) = self.surfers.get_mut(id) {
            surfer.removed = true;
        }
        Ok(())
    }

    /// Append `from` to `to`'s approvals and set the pairwise flag.
    ///
    /// No uniqueness check here; callers validate the whole batch first.
    pub fn record_approval(&mut self, from: SurferId, to: SurferId) {
        if let Some(surfer) = self.surfers.get_mut(&to) {
            surfer.approvals.push(from);
            self.approved_by.insert((from, to));
        }
    }

    /// Whether `from` has attested to `to`.
    pub fn has_approval(&self, from: &SurferId, to: &SurferId) -> bool {
        self.approved_by.contains(&(*from, *to))
    }

    /// Resolvable surfer ids in registration order.
    pub fn ids(&self) -> Vec<SurferId> {
        self.order
            .iter()
            .filter(|id| self.is_surfer(id))
            .copied()
            .collect()
    }

    /// Resolvable surfers in registration order.
    pub fn list(&self) -> Vec<&Surfer> {
        self.order
            .iter()
            .filter_map(|id| self.resolve(id).ok())
            .collect()
    }

    /// Number of records ever stored, removed ones included.
    pub fn len(&self) -> usize {
        self.surfers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.surfers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(n: u8) -> Account {
        Account([n; 20])
    }

    fn registry_with(names: &[&str]) -> SurferRegistry {
        let mut registry = SurferRegistry::new();
        for (i, name) in names.iter().enumerate() {
            registry
                .insert(Surfer::new(account(i as u8 + 1), name.to_string(), "Qm".into()))
                .unwrap();
        }
        registry
    }

    #[test]
    fn insert_and_lookup() {
        let registry = registry_with(&["Viking", "GonzaHo"]);
        let viking = encoding::surfer_id("Viking");

        assert_eq!(registry.lookup_by_account(&account(1)).unwrap(), viking);
        assert_eq!(registry.resolve(&viking).unwrap().alias, "Viking");
        assert_eq!(registry.ids(), vec![viking, encoding::surfer_id("GonzaHo")]);
    }

    #[test]
    fn duplicate_alias_and_account_rejected() {
        let mut registry = registry_with(&["Viking"]);

        let dup_alias = registry.insert(Surfer::new(account(9), "Viking".into(), "Qm".into()));
        assert!(matches!(dup_alias, Err(Error::AlreadyExists(_))));

        let dup_account = registry.insert(Surfer::new(account(1), "Other".into(), "Qm".into()));
        assert!(matches!(dup_account, Err(Error::AlreadyExists(_))));
    }

    #[test]
    fn edit_repoints_reverse_lookup() {
        let mut registry = registry_with(&["Viking"]);
        let id = encoding::surfer_id("Viking");

        registry.edit(&id, account(7), "QmNew".into()).unwrap();

        assert_eq!(registry.lookup_by_account(&account(7)).unwrap(), id);
        assert!(registry.lookup_by_account(&account(1)).is_err());
        assert_eq!(registry.resolve(&id).unwrap().metadata, "QmNew");
    }

    #[test]
    fn edit_to_taken_account_rejected() {
        let mut registry = registry_with(&["Viking", "GonzaHo"]);
        let id = encoding::surfer_id("Viking");
        let result = registry.edit(&id, account(2), "QmNew".into());
        assert!(matches!(result, Err(Error::AlreadyExists(_))));
        assert_eq!(registry.resolve(&id).unwrap().owner, account(1));
    }

    #[test]
    fn edit_keeping_owner_only_changes_metadata() {
        let mut registry = registry_with(&["Viking"]);
        let id = encoding::surfer_id("Viking");
        registry.edit(&id, account(1), "QmUpdated".into()).unwrap();
        assert_eq!(registry.lookup_by_account(&account(1)).unwrap(), id);
    }

    #[test]
    fn remove_keeps_history() {
        let mut registry = registry_with(&["Viking", "GonzaHo"]);
        let viking = encoding::surfer_id("Viking");
        let gonza = encoding::surfer_id("GonzaHo");
        registry.record_approval(gonza, viking);

        registry.remove(&viking).unwrap();

        assert!(!registry.is_surfer(&viking));
        assert!(registry.lookup_by_account(&account(1)).is_err());
        assert_eq!(registry.get(&viking).unwrap().approvals, vec![gonza]);
        assert_eq!(registry.ids(), vec![gonza]);
        assert_eq!(registry.len(), 2);

        // alias stays taken
        let again = registry.insert(Surfer::new(account(5), "Viking".into(), "Qm".into()));
        assert!(matches!(again, Err(Error::AlreadyExists(_))));
        assert!(matches!(registry.remove(&viking), Err(Error::SurferNotFound(_))));
    }

    #[test]
    fn approvals_keep_attestation_order() {
        let mut registry = registry_with(&["A", "B", "C"]);
        let (a, b, c) = (
            encoding::surfer_id("A"),
            encoding::surfer_id("B"),
            encoding::surfer_id("C"),
        );
        registry.record_approval(c, a);
        registry.record_approval(b, a);

        assert_eq!(registry.resolve(&a).unwrap().approvals, vec![c, b]);
        assert!(registry.has_approval(&c, &a));
        assert!(!registry.has_approval(&a, &c));
    }
}
