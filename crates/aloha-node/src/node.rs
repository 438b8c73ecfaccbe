//! Aloha Node - the main application entry point.
//!
//! Architecture:
//! - One ledger task owning the engine, fed by a command queue
//! - RocksDB snapshot + event log written after every accepted command
//! - Unix admin socket for submissions and admin ops (aloha-admin CLI)
//! - Read-only HTTP API for clients

use crate::admin_socket::AdminSocket;
use crate::api::{self, ApiState};
use crate::error::{Error, Result};
use crate::service::LedgerHandle;
use crate::storage::Storage;
use aloha_ledger::{Account, AwardPolicy, Engine, EngineConfig, EthereumVerifier, Genesis, SystemClock, DAY};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

/// Configuration for an Aloha node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Data directory for storage
    pub data_dir: PathBuf,

    /// HTTP API listen address
    pub api_addr: SocketAddr,

    /// Admin socket path (for aloha-admin CLI)
    pub admin_socket: PathBuf,

    /// Account allowed to mint, burn, remove surfers and change settings
    pub admin: Account,

    /// Seconds between accepted surfer registrations
    pub surfer_add_interval: u64,

    /// Seconds between accepted sessions
    pub session_add_interval: u64,

    pub min_approvals: u32,

    pub awards: AwardPolicy,

    /// JSON file listing the genesis surfers
    pub genesis: Option<PathBuf>,
}

fn parse_var<T>(key: &str, raw: Option<String>, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid {}: {}", key, e))),
        None => Ok(default),
    }
}

fn parse_awards(raw: Option<String>) -> Result<AwardPolicy> {
    match raw.as_deref().map(str::trim) {
        None | Some("none") => Ok(AwardPolicy::none()),
        Some("original") => Ok(AwardPolicy::original()),
        Some(other) => Err(Error::Config(format!(
            "Invalid ALOHA_AWARDS: {} (expected none or original)",
            other
        ))),
    }
}

impl NodeConfig {
    /// Create config from environment variables with sensible defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = PathBuf::from(lookup("ALOHA_DATA_DIR").unwrap_or_else(|| "./aloha-data".to_string()));

        let api_addr = parse_var(
            "ALOHA_API_ADDR",
            lookup("ALOHA_API_ADDR"),
            SocketAddr::from(([0, 0, 0, 0], 8080)),
        )?;

        let admin_socket = lookup("ALOHA_ADMIN_SOCKET")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("admin.sock"));

        let admin = match lookup("ALOHA_ADMIN_ACCOUNT") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e| Error::Config(format!("Invalid ALOHA_ADMIN_ACCOUNT: {}", e)))?,
            None => return Err(Error::Config("ALOHA_ADMIN_ACCOUNT is required".into())),
        };

        let surfer_add_interval = parse_var("ALOHA_SURFER_INTERVAL", lookup("ALOHA_SURFER_INTERVAL"), DAY)?;
        let session_add_interval = parse_var("ALOHA_SESSION_INTERVAL", lookup("ALOHA_SESSION_INTERVAL"), DAY)?;
        let min_approvals = parse_var("ALOHA_MIN_APPROVALS", lookup("ALOHA_MIN_APPROVALS"), 1)?;
        let awards = parse_awards(lookup("ALOHA_AWARDS"))?;
        let genesis = lookup("ALOHA_GENESIS").map(PathBuf::from);

        Ok(Self {
            data_dir,
            api_addr,
            admin_socket,
            admin,
            surfer_add_interval,
            session_add_interval,
            min_approvals,
            awards,
            genesis,
        })
    }

    /// Engine settings for a fresh ledger.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::new(self.admin)
            .with_intervals(self.surfer_add_interval, self.session_add_interval)
            .with_min_approvals(self.min_approvals)
            .with_awards(self.awards)
    }

    /// Load the genesis file, or an empty genesis if none is configured.
    pub fn load_genesis(&self) -> Result<Genesis> {
        match &self.genesis {
            Some(path) => {
                let data = std::fs::read(path)?;
                Ok(serde_json::from_slice(&data)?)
            }
            None => Ok(Genesis::empty()),
        }
    }
}

/// Resume the ledger from storage, or start it from genesis and persist
/// the initial state.
pub fn load_engine(storage: &Storage, config: &NodeConfig) -> Result<Engine> {
    match storage.load_state()? {
        Some(state) => {
            tracing::info!(
                surfers = state.surfers.len(),
                sessions = state.sessions.len(),
                "Resuming ledger from storage; interval and award settings come from the stored state"
            );
            Ok(Engine::from_state(state, EthereumVerifier, SystemClock))
        }
        None => {
            let genesis = config.load_genesis()?;
            let mut engine = Engine::with_defaults(&config.engine_config(), &genesis)?;
            let events = engine.take_events();
            storage.commit(engine.state(), &events)?;
            Ok(engine)
        }
    }
}

/// An Aloha node instance.
pub struct AlohaNode {
    config: NodeConfig,
    storage: Arc<Storage>,
    ledger: LedgerHandle,
}

impl AlohaNode {
    /// Open storage, resume or initialize the ledger and start its task.
    pub async fn new(config: NodeConfig) -> Result<Self> {
        // Ensure data directory exists
        std::fs::create_dir_all(&config.data_dir)?;

        let storage = Arc::new(Storage::open(config.data_dir.join("ledger"))?);
        let engine = load_engine(&storage, &config)?;

        let ledger = LedgerHandle::spawn(engine, Arc::clone(&storage));
        Ok(Self {
            config,
            storage,
            ledger,
        })
    }

    /// Handle to the ledger task.
    pub fn ledger(&self) -> LedgerHandle {
        self.ledger.clone()
    }

    /// Run the node (starts the admin socket and HTTP server).
    pub async fn run(self) -> Result<()> {
        tracing::info!("Aloha node starting");
        tracing::info!("  API: http://{}", self.config.api_addr);
        tracing::info!("  Admin: {:?}", self.config.admin_socket);
        tracing::info!("  Data: {:?}", self.config.data_dir);

        // Start admin socket server in background
        let admin_socket = AdminSocket::new(
            self.ledger.clone(),
            Arc::clone(&self.storage),
            &self.config.admin_socket,
        );
        tokio::spawn(async move {
            if let Err(e) = admin_socket.run().await {
                tracing::error!("Admin socket error: {}", e);
            }
        });

        // Build HTTP API
        let app = api::build_router(ApiState {
            ledger: self.ledger.clone(),
            storage: Arc::clone(&self.storage),
        });

        // Start HTTP server
        let listener = tokio::net::TcpListener::bind(self.config.api_addr).await?;
        tracing::info!("HTTP server listening on {}", self.config.api_addr);

        axum::serve(listener, app).await?;

        Ok(())
    }
}
