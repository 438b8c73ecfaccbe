//! Aloha Ledger - co-signed surf sessions and non-transferable rewards
//!
//! Surfers register under a unique alias, vouch for each other, and record
//! surf sessions together. A session only counts once every surfer named in
//! it has attested, either by calling in themselves or by handing over an
//! off-ledger signature. The call that fills the last seat mints the
//! session's rewards.
//!
//! # Architecture
//!
//! - **Identifiers** ([`ids`], [`encoding`]): content-addressed ids and the
//!   packed encoding every client must reproduce byte for byte
//! - **Signatures** ([`signature`]): secp256k1 recovery of the signing account
//! - **Surfers** ([`surfer`]): registry with reverse account lookup
//! - **Sessions** ([`session`]): session records and the pure quorum transition
//! - **Throttle** ([`throttle`]): network-wide admission cooldowns
//! - **Token** ([`token`]): Aloha balances, mint and burn only
//! - **Engine** ([`engine`]): the only writer; validate-then-commit for every call
//!
//! # Example
//!
//! ```
//! use aloha_ledger::{Account, Engine, EngineConfig, Genesis, ManualClock, EthereumVerifier};
//!
//! let admin = Account([0xaa; 20]);
//! let alice = Account([1; 20]);
//! let mut engine = Engine::new(
//!     &EngineConfig::new(admin),
//!     &Genesis::empty(),
//!     EthereumVerifier,
//!     ManualClock::new(1_700_000_000),
//! )?;
//!
//! let id = engine.register_surfer(alice, "Viking", "QmProfile")?;
//! assert_eq!(engine.surfer_id_by_account(&alice)?, id);
//! # Ok::<(), aloha_ledger::Error>(())
//! ```

pub mod blob;
pub mod clock;
pub mod config;
pub mod encoding;
pub mod engine;
pub mod error;
pub mod events;
pub mod ids;
pub mod session;
pub mod signature;
pub mod surfer;
pub mod throttle;
pub mod token;

pub use blob::{BlobStore, MemoryBlobStore};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AwardPolicy, EngineConfig, Genesis, GenesisSurfer, Setting, DAY};
pub use engine::{session_approval_message, surfer_approval_message, Engine, LedgerState};
pub use error::{Error, Result};
pub use events::LedgerEvent;
pub use ids::{Account, ParseIdError, SessionId, Signature, SurferId};
pub use session::{SessionDraft, SessionStatus, SurfSession};
pub use signature::{EthereumVerifier, LocalSigner, SignatureVerifier};
pub use surfer::Surfer;
pub use throttle::Gate;
pub use token::{Payout, UNIT};
