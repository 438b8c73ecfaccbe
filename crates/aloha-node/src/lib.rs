//! Aloha Node - ledger daemon
//!
//! Runs one Aloha ledger and exposes it to local tooling and clients.
//!
//! # Architecture
//!
//! - **Service**: single task owning the engine, fed through a command queue
//! - **Storage**: RocksDB snapshot, event log and metadata blobs
//! - **Admin Socket**: Unix socket for submissions and admin commands (aloha-admin CLI)
//! - **API**: read-only HTTP endpoints
//!
//! # Example
//!
//! ```no_run
//! use aloha_node::{AlohaNode, NodeConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = NodeConfig::from_env()?;
//!     let node = AlohaNode::new(config).await?;
//!     node.run().await?;
//!     Ok(())
//! }
//! ```

pub mod admin_socket;
pub mod api;
pub mod error;
pub mod node;
pub mod service;
pub mod storage;

pub use admin_socket::{AdminRequest, AdminResponse, NodeCommand};
pub use error::{Error, Result};
pub use node::{AlohaNode, NodeConfig};
pub use service::{LedgerCommand, LedgerHandle, Outcome};
pub use storage::Storage;
