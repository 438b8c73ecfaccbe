//! Single-writer ledger service.
//!
//! One task owns the [`Engine`]. Everything else talks to it through a
//! [`LedgerHandle`]: mutating commands and read-only queries are queued and
//! run one at a time, so concurrent approvals of the same session are
//! strictly ordered and exactly one of them observes the last seat filling.
//! Every successful command is persisted before its reply is sent.

use crate::error::{Error, Result};
use crate::storage::Storage;
use aloha_ledger::token::amount_serde;
use aloha_ledger::{
    Account, Clock, Engine, LedgerState, SessionDraft, SessionId, Signature, SignatureVerifier,
    SurferId,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

/// Commands waiting for the ledger task.
const COMMAND_QUEUE_DEPTH: usize = 256;

/// A mutating ledger call. `caller` is the account the call is made as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum LedgerCommand {
    RegisterSurfer {
        caller: Account,
        alias: String,
        metadata: String,
    },
    EditSurfer {
        caller: Account,
        surfer: SurferId,
        new_owner: Account,
        metadata: String,
    },
    RemoveSurfer {
        caller: Account,
        surfer: SurferId,
    },
    ApproveSurfers {
        caller: Account,
        targets: Vec<SurferId>,
    },
    ApproveSurferWithSignatures {
        caller: Account,
        target: SurferId,
        signers: Vec<Account>,
        signatures: Vec<Signature>,
    },
    CreateSession {
        caller: Account,
        draft: SessionDraft,
        self_index: usize,
    },
    CreateSessionWithSignatures {
        caller: Account,
        draft: SessionDraft,
        signatures: Vec<Signature>,
    },
    ApproveSession {
        caller: Account,
        session: SessionId,
        index: usize,
    },
    ApproveSessionWithSignatures {
        caller: Account,
        session: SessionId,
        indices: Vec<usize>,
        signatures: Vec<Signature>,
    },
    Mint {
        caller: Account,
        account: Account,
        #[serde(with = "amount_serde")]
        amount: u128,
    },
    Burn {
        caller: Account,
        account: Account,
        #[serde(with = "amount_serde")]
        amount: u128,
    },
    Transfer {
        caller: Account,
        to: Account,
        #[serde(with = "amount_serde")]
        amount: u128,
    },
    TransferFrom {
        caller: Account,
        from: Account,
        to: Account,
        #[serde(with = "amount_serde")]
        amount: u128,
    },
    SetMinApprovals {
        caller: Account,
        value: u32,
    },
    SetSurferAddInterval {
        caller: Account,
        seconds: u64,
    },
    SetSessionAddInterval {
        caller: Account,
        seconds: u64,
    },
}

/// What a successful command produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    Done,
    Surfer { id: SurferId },
    Session { id: SessionId },
}

impl LedgerCommand {
    pub fn name(&self) -> &'static str {
        match self {
            LedgerCommand::RegisterSurfer { .. } => "register_surfer",
            LedgerCommand::EditSurfer { .. } => "edit_surfer",
            LedgerCommand::RemoveSurfer { .. } => "remove_surfer",
            LedgerCommand::ApproveSurfers { .. } => "approve_surfers",
            LedgerCommand::ApproveSurferWithSignatures { .. } => "approve_surfer_with_signatures",
            LedgerCommand::CreateSession { .. } => "create_session",
            LedgerCommand::CreateSessionWithSignatures { .. } => "create_session_with_signatures",
            LedgerCommand::ApproveSession { .. } => "approve_session",
            LedgerCommand::ApproveSessionWithSignatures { .. } => "approve_session_with_signatures",
            LedgerCommand::Mint { .. } => "mint",
            LedgerCommand::Burn { .. } => "burn",
            LedgerCommand::Transfer { .. } => "transfer",
            LedgerCommand::TransferFrom { .. } => "transfer_from",
            LedgerCommand::SetMinApprovals { .. } => "set_min_approvals",
            LedgerCommand::SetSurferAddInterval { .. } => "set_surfer_add_interval",
            LedgerCommand::SetSessionAddInterval { .. } => "set_session_add_interval",
        }
    }

    /// Run the command against an engine.
    pub fn apply<V, C>(self, engine: &mut Engine<V, C>) -> aloha_ledger::Result<Outcome>
    where
        V: SignatureVerifier,
        C: Clock,
    {
        use LedgerCommand::*;

        let outcome = match self {
            RegisterSurfer { caller, alias, metadata } => Outcome::Surfer {
                id: engine.register_surfer(caller, &alias, &metadata)?,
            },
            EditSurfer { caller, surfer, new_owner, metadata } => {
                engine.edit_surfer(caller, surfer, new_owner, &metadata)?;
                Outcome::Done
            }
            RemoveSurfer { caller, surfer } => {
                engine.remove_surfer(caller, surfer)?;
                Outcome::Done
            }
            ApproveSurfers { caller, targets } => {
                engine.approve_surfers(caller, &targets)?;
                Outcome::Done
            }
            ApproveSurferWithSignatures { caller, target, signers, signatures } => {
                engine.approve_surfer_with_signatures(caller, target, &signers, &signatures)?;
                Outcome::Done
            }
            CreateSession { caller, draft, self_index } => Outcome::Session {
                id: engine.create_session(caller, draft, self_index)?,
            },
            CreateSessionWithSignatures { caller, draft, signatures } => Outcome::Session {
                id: engine.create_session_with_signatures(caller, draft, &signatures)?,
            },
            ApproveSession { caller, session, index } => {
                engine.approve_session(caller, session, index)?;
                Outcome::Done
            }
            ApproveSessionWithSignatures { caller, session, indices, signatures } => {
                engine.approve_session_with_signatures(caller, session, &indices, &signatures)?;
                Outcome::Done
            }
            Mint { caller, account, amount } => {
                engine.mint(caller, account, amount)?;
                Outcome::Done
            }
            Burn { caller, account, amount } => {
                engine.burn(caller, account, amount)?;
                Outcome::Done
            }
            Transfer { caller, to, amount } => {
                engine.transfer(caller, to, amount)?;
                Outcome::Done
            }
            TransferFrom { caller, from, to, amount } => {
                engine.transfer_from(caller, from, to, amount)?;
                Outcome::Done
            }
            SetMinApprovals { caller, value } => {
                engine.set_min_approvals(caller, value)?;
                Outcome::Done
            }
            SetSurferAddInterval { caller, seconds } => {
                engine.set_surfer_add_interval(caller, seconds)?;
                Outcome::Done
            }
            SetSessionAddInterval { caller, seconds } => {
                engine.set_session_add_interval(caller, seconds)?;
                Outcome::Done
            }
        };
        Ok(outcome)
    }
}

type Query = Box<dyn FnOnce(&LedgerState, u64) + Send>;

enum Request {
    Apply {
        command: LedgerCommand,
        reply: oneshot::Sender<Result<Outcome>>,
    },
    Query(Query),
}

/// Cloneable handle to the ledger task.
#[derive(Clone)]
pub struct LedgerHandle {
    tx: mpsc::Sender<Request>,
}

impl LedgerHandle {
    /// Move `engine` into a new task and return a handle to it.
    pub fn spawn<V, C>(engine: Engine<V, C>, storage: Arc<Storage>) -> Self
    where
        V: SignatureVerifier + Send + 'static,
        C: Clock + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        tokio::spawn(run(engine, storage, rx));
        Self { tx }
    }

    /// Apply a mutating command and wait for it to be persisted.
    pub async fn apply(&self, command: LedgerCommand) -> Result<Outcome> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request::Apply { command, reply })
            .await
            .map_err(|_| Error::ServiceStopped)?;
        rx.await.map_err(|_| Error::ServiceStopped)?
    }

    /// Read from the current ledger state. `f` also gets the ledger clock.
    pub async fn query<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&LedgerState, u64) -> T + Send + 'static,
        T: Send + 'static,
    {
        let (reply, rx) = oneshot::channel();
        let job: Query = Box::new(move |state, now| {
            let _ = reply.send(f(state, now));
        });
        self.tx
            .send(Request::Query(job))
            .await
            .map_err(|_| Error::ServiceStopped)?;
        rx.await.map_err(|_| Error::ServiceStopped)
    }
}

async fn run<V, C>(mut engine: Engine<V, C>, storage: Arc<Storage>, mut rx: mpsc::Receiver<Request>)
where
    V: SignatureVerifier,
    C: Clock,
{
    info!("Ledger service started");
    while let Some(request) = rx.recv().await {
        match request {
            Request::Apply { command, reply } => {
                let result = execute(&mut engine, &storage, command);
                let _ = reply.send(result);
            }
            Request::Query(job) => job(engine.state(), engine.now()),
        }
    }
    info!("Ledger service stopped");
}

fn execute<V, C>(engine: &mut Engine<V, C>, storage: &Storage, command: LedgerCommand) -> Result<Outcome>
where
    V: SignatureVerifier,
    C: Clock,
{
    let name = command.name();
    let committed = engine.state().clone();
    let outcome = match command.apply(engine) {
        Ok(outcome) => outcome,
        Err(e) => {
            debug!(command = name, error = %e, "Command rejected");
            return Err(e.into());
        }
    };

    let events = engine.take_events();
    if let Err(e) = storage.commit(engine.state(), &events) {
        // The caller sees a failure, so the engine must not keep the change.
        engine.restore(committed);
        error!(command = name, error = %e, "Failed to persist ledger state, rolled back");
        return Err(e);
    }
    debug!(command = name, events = events.len(), "Command committed");
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aloha_ledger::{
        EngineConfig, EthereumVerifier, Genesis, LedgerEvent, LocalSigner, ManualClock, UNIT,
    };
    use tempfile::tempdir;

    fn signer(seed: u8) -> LocalSigner {
        let mut secret = [0u8; 32];
        secret[31] = seed;
        LocalSigner::from_bytes(&secret).unwrap()
    }

    fn admin() -> Account {
        Account([0xad; 20])
    }

    /// Handle over `count` genesis surfers named Surfer1.., owned by signer(n).
    fn handle(dir: &std::path::Path, count: u8) -> (LedgerHandle, Arc<Storage>) {
        let mut genesis = Genesis::empty();
        for n in 1..=count {
            genesis = genesis.with_surfer(signer(n).account(), &format!("Surfer{}", n), "QmProfile");
        }
        let engine = Engine::new(
            &EngineConfig::new(admin()),
            &genesis,
            EthereumVerifier,
            ManualClock::new(1_700_000_000),
        )
        .unwrap();
        let storage = Arc::new(Storage::open(dir).unwrap());
        (LedgerHandle::spawn(engine, Arc::clone(&storage)), storage)
    }

    fn draft(surfers: Vec<SurferId>, waves: Vec<u64>) -> SessionDraft {
        SessionDraft {
            surfers,
            waves,
            best_award: SurferId::NONE,
            other_award: SurferId::NONE,
            session_time: 1_000_000_000,
            metadata: "QmSessionInfoHash".into(),
        }
    }

    #[test]
    fn command_json_uses_tags_and_string_amounts() {
        let cmd = LedgerCommand::Mint {
            caller: admin(),
            account: Account([1; 20]),
            amount: 5 * UNIT,
        };
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["cmd"], "mint");
        assert_eq!(json["amount"], "5000000000000000000");

        let back: LedgerCommand = serde_json::from_value(json).unwrap();
        assert_eq!(back, cmd);
    }

    #[tokio::test]
    async fn successful_commands_are_persisted() {
        let dir = tempdir().unwrap();
        let (ledger, storage) = handle(dir.path(), 1);

        let outcome = ledger
            .apply(LedgerCommand::RegisterSurfer {
                caller: signer(2).account(),
                alias: "Surfer2".into(),
                metadata: "QmTwo".into(),
            })
            .await
            .unwrap();
        let Outcome::Surfer { id } = outcome else {
            panic!("unexpected outcome {:?}", outcome);
        };

        let stored = storage.load_state().unwrap().unwrap();
        assert!(stored.surfers.is_surfer(&id));
        let events = storage.events(0, 10).unwrap();
        assert!(matches!(events[0].event, LedgerEvent::SurferAdded { .. }));
    }

    #[tokio::test]
    async fn rejected_commands_leave_storage_alone() {
        let dir = tempdir().unwrap();
        let (ledger, storage) = handle(dir.path(), 1);

        let result = ledger
            .apply(LedgerCommand::SetMinApprovals {
                caller: signer(1).account(),
                value: 3,
            })
            .await;
        assert!(matches!(
            result,
            Err(Error::Ledger(aloha_ledger::Error::NotAuthorized))
        ));
        assert!(storage.load_state().unwrap().is_none());
        assert!(storage.events(0, 10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_commit_rolls_back_engine() {
        let dir = tempdir().unwrap();
        drop(Storage::open(dir.path()).unwrap());
        let storage = Arc::new(Storage::open_read_only(dir.path()).unwrap());
        let engine = Engine::new(
            &EngineConfig::new(admin()),
            &Genesis::empty(),
            EthereumVerifier,
            ManualClock::new(1_700_000_000),
        )
        .unwrap();
        let ledger = LedgerHandle::spawn(engine, Arc::clone(&storage));

        let account = signer(1).account();
        let result = ledger
            .apply(LedgerCommand::Mint {
                caller: admin(),
                account,
                amount: 7,
            })
            .await;
        assert!(matches!(result, Err(Error::Storage(_))));

        let (balance, supply) = ledger
            .query(move |state, _| (state.token.balance_of(&account), state.token.total_supply()))
            .await
            .unwrap();
        assert_eq!(balance, 0);
        assert_eq!(supply, 0);
        assert!(storage.events(0, 10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn queries_see_committed_state() {
        let dir = tempdir().unwrap();
        let (ledger, _storage) = handle(dir.path(), 2);

        ledger
            .apply(LedgerCommand::Mint {
                caller: admin(),
                account: signer(1).account(),
                amount: 42,
            })
            .await
            .unwrap();

        let account = signer(1).account();
        let (balance, now) = ledger
            .query(move |state, now| (state.token.balance_of(&account), now))
            .await
            .unwrap();
        assert_eq!(balance, 42);
        assert_eq!(now, 1_700_000_000);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_approvals_finalize_once() {
        let dir = tempdir().unwrap();
        let (ledger, storage) = handle(dir.path(), 6);

        let surfers: Vec<SurferId> = ledger
            .query(|state, _| state.surfers.ids())
            .await
            .unwrap();
        let session = match ledger
            .apply(LedgerCommand::CreateSession {
                caller: signer(1).account(),
                draft: draft(surfers, vec![1, 2, 3, 4, 5, 6]),
                self_index: 0,
            })
            .await
            .unwrap()
        {
            Outcome::Session { id } => id,
            other => panic!("unexpected outcome {:?}", other),
        };

        // every remaining seat twice: once direct, once by signature
        let mut tasks = Vec::new();
        for seat in 1..6usize {
            let owner = signer(seat as u8 + 1);
            let direct = ledger.clone();
            let caller = owner.account();
            tasks.push(tokio::spawn(async move {
                direct
                    .apply(LedgerCommand::ApproveSession { caller, session, index: seat })
                    .await
            }));

            let signed = ledger.clone();
            let signature = owner.sign(session.as_bytes()).unwrap();
            tasks.push(tokio::spawn(async move {
                signed
                    .apply(LedgerCommand::ApproveSessionWithSignatures {
                        caller: signer(1).account(),
                        session,
                        indices: vec![seat],
                        signatures: vec![signature],
                    })
                    .await
            }));
        }

        let mut accepted = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(Error::Ledger(aloha_ledger::Error::AlreadyApproved)) => {}
                Err(e) => panic!("unexpected error {}", e),
            }
        }
        assert_eq!(accepted, 5);

        let finalized = storage
            .events(0, 1000)
            .unwrap()
            .into_iter()
            .filter(|e| matches!(e.event, LedgerEvent::SurfSessionFinalized { .. }))
            .count();
        assert_eq!(finalized, 1);

        let supply = ledger.query(|state, _| state.token.total_supply()).await.unwrap();
        assert_eq!(supply, 21 * UNIT);
    }
}
