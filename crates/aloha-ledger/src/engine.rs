//! Quorum and issuance engine.
//!
//! The engine is the only writer of approval seats and the only trigger of
//! automatic issuance. Every operation follows the same shape:
//!
//! 1. validate everything (authorization, throttle, signatures, seats)
//! 2. commit all writes
//! 3. emit events
//!
//! Nothing is written before step 2, so any error leaves the ledger exactly
//! as it was. Mutation goes through `&mut self`; callers that share an
//! engine must serialize access (the node runs it behind a command queue),
//! which makes "last seat filled" observable by exactly one call.

use crate::clock::{Clock, SystemClock};
use crate::config::{AwardPolicy, EngineConfig, Genesis, Setting};
use crate::error::{Error, Result};
use crate::events::LedgerEvent;
use crate::ids::{Account, SessionId, Signature, SurferId};
use crate::session::{apply_approvals, QuorumReached, SessionDraft, SessionLedger, SurfSession};
use crate::signature::{EthereumVerifier, SignatureVerifier};
use crate::surfer::{Surfer, SurferRegistry};
use crate::throttle::{AdmissionThrottle, Gate};
use crate::token::{self, Issuance, Payout, RewardLedger};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Complete persistent state of the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerState {
    pub admin: Account,
    pub min_approvals: u32,
    pub awards: AwardPolicy,
    pub throttle: AdmissionThrottle,
    pub surfers: SurferRegistry,
    pub sessions: SessionLedger,
    pub token: RewardLedger,
}

impl LedgerState {
    /// Fresh state with the genesis surfers registered.
    pub fn new(config: &EngineConfig, genesis: &Genesis) -> Result<Self> {
        let mut surfers = SurferRegistry::new();
        for entry in &genesis.surfers {
            if entry.alias.is_empty() {
                return Err(Error::EmptyAlias);
            }
            if entry.metadata.is_empty() {
                return Err(Error::EmptyMetadata);
            }
            surfers.insert(Surfer::new(
                entry.account,
                entry.alias.clone(),
                entry.metadata.clone(),
            ))?;
        }

        Ok(Self {
            admin: config.admin,
            min_approvals: config.min_approvals,
            awards: config.awards,
            throttle: AdmissionThrottle::new(
                config.surfer_add_interval,
                config.session_add_interval,
            ),
            surfers,
            sessions: SessionLedger::new(),
            token: RewardLedger::new(),
        })
    }
}

/// The ledger engine.
pub struct Engine<V = EthereumVerifier, C = SystemClock> {
    state: LedgerState,
    verifier: V,
    clock: C,
    events: Vec<LedgerEvent>,
}

impl Engine<EthereumVerifier, SystemClock> {
    /// Engine with secp256k1 recovery and wall-clock time.
    pub fn with_defaults(config: &EngineConfig, genesis: &Genesis) -> Result<Self> {
        Self::new(config, genesis, EthereumVerifier, SystemClock)
    }
}

impl<V: SignatureVerifier, C: Clock> Engine<V, C> {
    /// Create an engine from configuration and genesis.
    pub fn new(config: &EngineConfig, genesis: &Genesis, verifier: V, clock: C) -> Result<Self> {
        let state = LedgerState::new(config, genesis)?;
        info!(
            surfers = state.surfers.len(),
            admin = %state.admin,
            "Ledger initialized from genesis"
        );
        Ok(Self::from_state(state, verifier, clock))
    }

    /// Resume from previously persisted state.
    pub fn from_state(state: LedgerState, verifier: V, clock: C) -> Self {
        Self {
            state,
            verifier,
            clock,
            events: Vec::new(),
        }
    }

    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    pub fn into_state(self) -> LedgerState {
        self.state
    }

    /// Events emitted since the last call.
    pub fn take_events(&mut self) -> Vec<LedgerEvent> {
        std::mem::take(&mut self.events)
    }

    /// Roll back to `state`, dropping any events not yet taken.
    pub fn restore(&mut self, state: LedgerState) {
        self.state = state;
        self.events.clear();
    }

    fn emit(&mut self, event: LedgerEvent) {
        debug!(event = event.name(), "Ledger event");
        self.events.push(event);
    }

    fn require_admin(&self, caller: &Account) -> Result<()> {
        if *caller == self.state.admin {
            Ok(())
        } else {
            Err(Error::NotAuthorized)
        }
    }

    /// Resolve the caller to a live surfer or fail with `NotAParticipant`.
    fn caller_surfer(&self, caller: &Account) -> Result<SurferId> {
        self.state
            .surfers
            .lookup_by_account(caller)
            .map_err(|_| Error::NotAParticipant(*caller))
    }

    /// Account that signed `message`, if it resolves to a live surfer.
    fn recover_surfer(&self, message: &[u8; 32], signature: &Signature) -> Option<(Account, SurferId)> {
        let account = self.verifier.recover(message, signature)?;
        let surfer = self.state.surfers.lookup_by_account(&account).ok()?;
        Some((account, surfer))
    }

    // --- Surfers ---

    /// Register a new surfer owned by `caller`.
    pub fn register_surfer(&mut self, caller: Account, alias: &str, metadata: &str) -> Result<SurferId> {
        if alias.is_empty() {
            return Err(Error::EmptyAlias);
        }
        if metadata.is_empty() {
            return Err(Error::EmptyMetadata);
        }

        let now = self.clock.now();
        self.state.throttle.check(Gate::Surfer, now)?;

        let surfer = Surfer::new(caller, alias.to_string(), metadata.to_string());
        let id = self.state.surfers.insert(surfer)?;
        self.state.throttle.record(Gate::Surfer, now);

        info!(surfer = %id, owner = %caller, alias, "Surfer added");
        self.emit(LedgerEvent::SurferAdded { surfer: id, owner: caller });
        Ok(id)
    }

    /// Change a surfer's owner and metadata. Owner or administrator only.
    pub fn edit_surfer(
        &mut self,
        caller: Account,
        id: SurferId,
        new_owner: Account,
        metadata: &str,
    ) -> Result<()> {
        let current = self.state.surfers.resolve(&id)?.owner;
        if caller != current && caller != self.state.admin {
            return Err(Error::NotAuthorized);
        }
        if metadata.is_empty() {
            return Err(Error::EmptyMetadata);
        }

        self.state.surfers.edit(&id, new_owner, metadata.to_string())?;

        info!(surfer = %id, owner = %new_owner, "Surfer edited");
        self.emit(LedgerEvent::SurferEdited { surfer: id, owner: new_owner });
        Ok(())
    }

    /// Make a surfer unresolvable. Administrator only.
    pub fn remove_surfer(&mut self, caller: Account, id: SurferId) -> Result<()> {
        self.require_admin(&caller)?;
        self.state.surfers.remove(&id)?;

        info!(surfer = %id, "Surfer removed");
        self.emit(LedgerEvent::SurferRemoved { surfer: id });
        Ok(())
    }

    pub fn surfer(&self, id: &SurferId) -> Option<&Surfer> {
        self.state.surfers.get(id)
    }

    pub fn is_surfer(&self, id: &SurferId) -> bool {
        self.state.surfers.is_surfer(id)
    }

    pub fn surfer_id_by_account(&self, account: &Account) -> Result<SurferId> {
        self.state.surfers.lookup_by_account(account)
    }

    /// Live surfers in registration order.
    pub fn surfer_list(&self) -> Vec<SurferId> {
        self.state.surfers.ids()
    }

    /// Whether `from` has attested to `to`.
    pub fn surfer_approval(&self, from: &SurferId, to: &SurferId) -> bool {
        self.state.surfers.has_approval(from, to)
    }

    /// Check that `from` may newly attest to `target`.
    fn check_attestation(&self, from: SurferId, target: SurferId, batch: &mut BTreeSet<SurferId>) -> Result<()> {
        self.state.surfers.resolve(&target)?;
        if from == target {
            return Err(Error::NotAuthorized);
        }
        if self.state.surfers.has_approval(&from, &target) {
            return Err(Error::AlreadyApproved);
        }
        if !batch.insert(target) {
            return Err(Error::AlreadyApproved);
        }
        Ok(())
    }

    fn commit_attestations(&mut self, pairs: Vec<(SurferId, SurferId)>) {
        for (from, to) in pairs {
            self.state.surfers.record_approval(from, to);
            debug!(from = %from, to = %to, "Surfer approved");
            self.emit(LedgerEvent::SurferApproved { from, to });
        }
    }

    /// Attest, as the caller's surfer, to every surfer in `targets`.
    ///
    /// Only an empty list is rejected for size; there is no minimum batch.
    pub fn approve_surfers(&mut self, caller: Account, targets: &[SurferId]) -> Result<()> {
        if targets.is_empty() {
            return Err(Error::EmptyTargetList);
        }
        let from = self.caller_surfer(&caller)?;

        let mut seen = BTreeSet::new();
        for &target in targets {
            self.check_attestation(from, target, &mut seen)?;
        }

        self.commit_attestations(targets.iter().map(|&to| (from, to)).collect());
        Ok(())
    }

    /// Record attestations to `target` proven by off-ledger signatures over
    /// the target's id.
    pub fn approve_surfer_with_signatures(
        &mut self,
        caller: Account,
        target: SurferId,
        signers: &[Account],
        signatures: &[Signature],
    ) -> Result<()> {
        if signers.len() != signatures.len() {
            return Err(Error::LengthMismatch {
                what: "signatures",
                expected: signers.len(),
                actual: signatures.len(),
            });
        }
        if signers.is_empty() {
            return Err(Error::EmptyTargetList);
        }
        self.caller_surfer(&caller)?;
        self.state.surfers.resolve(&target)?;

        let mut approvers = BTreeSet::new();
        let mut pairs = Vec::with_capacity(signers.len());
        for (index, (signer, signature)) in signers.iter().zip(signatures).enumerate() {
            let from = match self.recover_surfer(target.as_bytes(), signature) {
                Some((account, surfer)) if account == *signer => surfer,
                _ => {
                    warn!(target_surfer = %target, index, "Rejected surfer approval signature");
                    return Err(Error::InvalidSignature { index });
                }
            };
            if from == target {
                return Err(Error::NotAuthorized);
            }
            if self.state.surfers.has_approval(&from, &target) || !approvers.insert(from) {
                return Err(Error::AlreadyApproved);
            }
            pairs.push((from, target));
        }

        self.commit_attestations(pairs);
        Ok(())
    }

    // --- Sessions ---

    /// Registry checks a draft must pass beyond its structural invariants.
    fn check_draft(&self, draft: &SessionDraft) -> Result<SessionId> {
        draft.validate()?;
        for surfer in &draft.surfers {
            self.state.surfers.resolve(surfer)?;
        }
        let id = draft.id();
        if self.state.sessions.contains(&id) {
            return Err(Error::AlreadyExists(format!("session {}", id)));
        }
        Ok(id)
    }

    /// Owner of a live surfer, for signature checks.
    fn live_owner(&self, surfer: &SurferId) -> Option<Account> {
        self.state.surfers.resolve(surfer).ok().map(|s| s.owner)
    }

    /// Owner of any surfer, removed ones included, for payouts.
    fn owner_of(&self, surfer: &SurferId) -> Result<Account> {
        self.state
            .surfers
            .get(surfer)
            .map(|s| s.owner)
            .ok_or(Error::SurferNotFound(*surfer))
    }

    /// Submit a session, approving the caller's own seat.
    pub fn create_session(
        &mut self,
        caller: Account,
        draft: SessionDraft,
        self_index: usize,
    ) -> Result<SessionId> {
        draft.validate()?;
        let Some(own_seat) = draft.surfers.get(self_index) else {
            return Err(Error::InvalidInput(format!(
                "seat {} out of range for {} surfers",
                self_index,
                draft.surfers.len()
            )));
        };
        if self.state.surfers.lookup_by_account(&caller).ok() != Some(*own_seat) {
            return Err(Error::NotAuthorized);
        }

        let now = self.clock.now();
        self.state.throttle.check(Gate::Session, now)?;
        let id = self.check_draft(&draft)?;

        let mut session = SurfSession::from_draft(draft, caller, now);
        let (seats, quorum) = apply_approvals(&session.approvals, &[self_index])?;
        session.approvals = seats;
        let issuance = quorum.map(|q| self.plan_issuance(&session, q)).transpose()?;

        self.admit(session, caller, now, issuance)?;
        Ok(id)
    }

    /// Submit a session already signed by every listed surfer. It is stored
    /// complete and finalized in the same call.
    pub fn create_session_with_signatures(
        &mut self,
        caller: Account,
        draft: SessionDraft,
        signatures: &[Signature],
    ) -> Result<SessionId> {
        draft.validate()?;
        if signatures.len() != draft.surfers.len() {
            return Err(Error::LengthMismatch {
                what: "signatures",
                expected: draft.surfers.len(),
                actual: signatures.len(),
            });
        }

        let now = self.clock.now();
        self.state.throttle.check(Gate::Session, now)?;
        let id = self.check_draft(&draft)?;

        for (index, (surfer, signature)) in draft.surfers.iter().zip(signatures).enumerate() {
            let expected = self.live_owner(surfer);
            if expected.is_none() || self.verifier.recover(id.as_bytes(), signature) != expected {
                warn!(session = %id, index, "Rejected session creation signature");
                return Err(Error::InvalidSignature { index });
            }
        }

        let mut session = SurfSession::from_draft(draft, caller, now);
        let all: Vec<usize> = (0..session.surfers.len()).collect();
        let (seats, quorum) = apply_approvals(&session.approvals, &all)?;
        session.approvals = seats;
        let issuance = quorum.map(|q| self.plan_issuance(&session, q)).transpose()?;

        self.admit(session, caller, now, issuance)?;
        Ok(id)
    }

    /// Commit a fully validated new session.
    fn admit(
        &mut self,
        mut session: SurfSession,
        caller: Account,
        now: u64,
        issuance: Option<Issuance>,
    ) -> Result<()> {
        let id = session.id;
        let approved = session.approved_surfers();

        // check_draft ruled out a collision, so the insert below cannot fail
        let receipt = match &issuance {
            Some(issuance) => Some(self.state.token.apply_issuance(issuance)?),
            None => None,
        };
        session.finalized = receipt.is_some();

        self.state.sessions.insert(session)?;
        self.state.throttle.record(Gate::Session, now);

        info!(session = %id, creator = %caller, "Surf session created");
        self.emit(LedgerEvent::SurfSessionCreated { session: id, creator: caller });
        for surfer in approved {
            self.emit(LedgerEvent::SurfSessionApproved { session: id, surfer });
        }
        if let (Some(issuance), Some(receipt)) = (issuance, receipt) {
            self.emit_finalized(&issuance, receipt);
        }
        Ok(())
    }

    /// Approve the caller's own seat.
    pub fn approve_session(&mut self, caller: Account, id: SessionId, index: usize) -> Result<()> {
        let session = self.state.sessions.resolve(&id)?;
        let Some(seat) = session.surfers.get(index) else {
            return Err(Error::InvalidInput(format!(
                "seat {} out of range for {} surfers",
                index,
                session.surfers.len()
            )));
        };
        if self.state.surfers.lookup_by_account(&caller).ok() != Some(*seat) {
            return Err(Error::NotAuthorized);
        }

        self.fill_seats(id, &[index])
    }

    /// Approve seats on behalf of their owners using off-ledger signatures
    /// over the session id. The caller must be a surfer.
    pub fn approve_session_with_signatures(
        &mut self,
        caller: Account,
        id: SessionId,
        indices: &[usize],
        signatures: &[Signature],
    ) -> Result<()> {
        self.caller_surfer(&caller)?;
        if indices.len() != signatures.len() {
            return Err(Error::LengthMismatch {
                what: "signatures",
                expected: indices.len(),
                actual: signatures.len(),
            });
        }
        if indices.is_empty() {
            return Err(Error::EmptyTargetList);
        }

        let session = self.state.sessions.resolve(&id)?;
        for (position, (&index, signature)) in indices.iter().zip(signatures).enumerate() {
            let Some(seat) = session.surfers.get(index) else {
                return Err(Error::InvalidInput(format!(
                    "seat {} out of range for {} surfers",
                    index,
                    session.surfers.len()
                )));
            };
            let expected = self.live_owner(seat);
            if expected.is_none() || self.verifier.recover(id.as_bytes(), signature) != expected {
                warn!(session = %id, index, "Rejected session approval signature");
                return Err(Error::InvalidSignature { index: position });
            }
        }

        self.fill_seats(id, indices)
    }

    /// Fill seats and finalize if that completed the session. All checks
    /// happen before the session is touched.
    fn fill_seats(&mut self, id: SessionId, indices: &[usize]) -> Result<()> {
        let session = self.state.sessions.resolve(&id)?;
        let (seats, quorum) = apply_approvals(&session.approvals, indices)?;

        let issuance = match quorum {
            Some(q) => {
                let mut preview = session.clone();
                preview.approvals = seats.clone();
                Some(self.plan_issuance(&preview, q)?)
            }
            None => None,
        };
        let receipt = match &issuance {
            Some(issuance) => Some(self.state.token.apply_issuance(issuance)?),
            None => None,
        };

        let session = self.state.sessions.get_mut(&id)?;
        session.approvals = seats;
        session.finalized = session.finalized || receipt.is_some();
        let approved: Vec<SurferId> = indices.iter().map(|&i| session.surfers[i]).collect();

        for surfer in approved {
            debug!(session = %id, surfer = %surfer, "Surf session seat approved");
            self.emit(LedgerEvent::SurfSessionApproved { session: id, surfer });
        }
        if let (Some(issuance), Some(receipt)) = (issuance, receipt) {
            self.emit_finalized(&issuance, receipt);
        }
        Ok(())
    }

    /// Work out who gets what when `session` reaches quorum.
    ///
    /// Requires proof of the quorum transition, so finalization can only be
    /// planned by the call that filled the last seat.
    fn plan_issuance(&self, session: &SurfSession, _quorum: QuorumReached) -> Result<Issuance> {
        let mut mints = Vec::with_capacity(session.surfers.len() + 1);
        for (surfer, &waves) in session.surfers.iter().zip(&session.waves) {
            mints.push(Payout {
                account: self.owner_of(surfer)?,
                amount: token::to_base_units(waves)?,
            });
        }

        let awards = self.state.awards;
        if awards.best_award_bonus > 0 && !session.best_award.is_zero() {
            mints.push(Payout {
                account: self.owner_of(&session.best_award)?,
                amount: token::to_base_units(awards.best_award_bonus)?,
            });
        }
        let penalty = if awards.other_award_penalty > 0 && !session.other_award.is_zero() {
            Some(Payout {
                account: self.owner_of(&session.other_award)?,
                amount: token::to_base_units(awards.other_award_penalty)?,
            })
        } else {
            None
        };

        Ok(Issuance {
            session: session.id,
            mints,
            penalty,
        })
    }

    fn emit_finalized(&mut self, issuance: &Issuance, receipt: token::IssuanceReceipt) {
        let id = issuance.session;
        for payout in &receipt.minted {
            self.emit(LedgerEvent::Minted {
                account: payout.account,
                amount: payout.amount,
            });
        }
        let burned = match receipt.burned {
            Some(burn) if burn.amount > 0 => {
                self.emit(LedgerEvent::Burned {
                    account: burn.account,
                    amount: burn.amount,
                });
                burn.amount
            }
            _ => 0,
        };

        info!(
            session = %id,
            minted = %issuance.minted(),
            burned = %burned,
            "Surf session finalized"
        );
        self.emit(LedgerEvent::SurfSessionFinalized {
            session: id,
            minted: issuance.minted(),
            burned,
        });
    }

    pub fn session(&self, id: &SessionId) -> Option<&SurfSession> {
        self.state.sessions.get(id)
    }

    /// Session ids in admission order.
    pub fn session_list(&self) -> Vec<SessionId> {
        self.state.sessions.ids()
    }

    // --- Token ---

    /// Administrative mint.
    pub fn mint(&mut self, caller: Account, account: Account, amount: u128) -> Result<()> {
        self.require_admin(&caller)?;
        self.state.token.mint(account, amount)?;
        info!(account = %account, amount = %amount, "Administrative mint");
        self.emit(LedgerEvent::Minted { account, amount });
        Ok(())
    }

    /// Administrative burn.
    pub fn burn(&mut self, caller: Account, account: Account, amount: u128) -> Result<()> {
        self.require_admin(&caller)?;
        self.state.token.burn(account, amount)?;
        info!(account = %account, amount = %amount, "Administrative burn");
        self.emit(LedgerEvent::Burned { account, amount });
        Ok(())
    }

    /// Always fails: Aloha is non-transferable.
    pub fn transfer(&mut self, caller: Account, to: Account, amount: u128) -> Result<()> {
        self.state.token.transfer(caller, to, amount)
    }

    /// Always fails: Aloha is non-transferable.
    pub fn transfer_from(&mut self, caller: Account, from: Account, to: Account, amount: u128) -> Result<()> {
        self.state.token.transfer_from(caller, from, to, amount)
    }

    pub fn balance_of(&self, account: &Account) -> u128 {
        self.state.token.balance_of(account)
    }

    pub fn total_supply(&self) -> u128 {
        self.state.token.total_supply()
    }

    // --- Configuration ---

    fn update_setting(&mut self, caller: Account, setting: Setting, value: u64) -> Result<()> {
        self.require_admin(&caller)?;
        match setting {
            Setting::MinApprovals => {
                self.state.min_approvals = u32::try_from(value)
                    .map_err(|_| Error::InvalidInput(format!("min approvals {} too large", value)))?;
            }
            Setting::SurferAddInterval => self.state.throttle.set_interval(Gate::Surfer, value),
            Setting::SessionAddInterval => self.state.throttle.set_interval(Gate::Session, value),
        }
        info!(?setting, value, "Configuration updated");
        self.emit(LedgerEvent::ConfigUpdated { setting, value });
        Ok(())
    }

    pub fn set_min_approvals(&mut self, caller: Account, min_approvals: u32) -> Result<()> {
        self.update_setting(caller, Setting::MinApprovals, u64::from(min_approvals))
    }

    pub fn set_surfer_add_interval(&mut self, caller: Account, interval: u64) -> Result<()> {
        self.update_setting(caller, Setting::SurferAddInterval, interval)
    }

    pub fn set_session_add_interval(&mut self, caller: Account, interval: u64) -> Result<()> {
        self.update_setting(caller, Setting::SessionAddInterval, interval)
    }

    pub fn min_approvals(&self) -> u32 {
        self.state.min_approvals
    }

    pub fn surfer_add_interval(&self) -> u64 {
        self.state.throttle.surfers.interval
    }

    pub fn session_add_interval(&self) -> u64 {
        self.state.throttle.sessions.interval
    }

    pub fn admin(&self) -> Account {
        self.state.admin
    }

    /// Current ledger time.
    pub fn now(&self) -> u64 {
        self.clock.now()
    }
}

/// Message a surfer signs to attest to another surfer.
pub fn surfer_approval_message(target: &SurferId) -> [u8; 32] {
    *target.as_bytes()
}

/// Message a surfer signs to approve (or co-create) a session.
pub fn session_approval_message(draft: &SessionDraft) -> [u8; 32] {
    *draft.id().as_bytes()
}
