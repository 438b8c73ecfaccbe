//! Unix socket server for admin and submission commands.
//!
//! Speaks JSON lines. Each line is either a [`LedgerCommand`] or a
//! [`NodeCommand`], both tagged by `cmd`; each reply is one
//! [`AdminResponse`] line. The socket is local-only: whoever can open it may
//! act as any `caller`, so its file permissions are the access control.

use crate::error::Result;
use crate::service::{LedgerCommand, LedgerHandle, Outcome};
use crate::storage::Storage;
use aloha_ledger::token::amount_serde;
use aloha_ledger::{Account, SessionId, SurferId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

/// Node-level command that does not change the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum NodeCommand {
    /// Store a metadata document, returning its content address
    PutBlob { document: Value },
    /// Fetch a metadata document
    GetBlob { address: String },
    /// Aloha balance of an account
    Balance { account: Account },
    /// Ping (health check)
    Ping,
}

/// One line read from the socket.
#[derive(Debug, Clone, PartialEq)]
pub enum AdminRequest {
    Node(NodeCommand),
    Ledger(LedgerCommand),
}

impl AdminRequest {
    /// Parse a request line. Errors describe the ledger command shape,
    /// since that is what most lines are.
    pub fn parse(line: &str) -> std::result::Result<Self, serde_json::Error> {
        match serde_json::from_str::<NodeCommand>(line) {
            Ok(cmd) => Ok(AdminRequest::Node(cmd)),
            Err(_) => serde_json::from_str::<LedgerCommand>(line).map(AdminRequest::Ledger),
        }
    }
}

/// Response from admin command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AdminResponse {
    Ok { message: String },
    Error { error: String },
    Surfer { id: SurferId },
    Session { id: SessionId },
    Blob { address: String },
    Document { document: Option<Value> },
    Balance {
        #[serde(with = "amount_serde")]
        amount: u128,
    },
    Pong,
}

impl AdminResponse {
    fn error(e: impl std::fmt::Display) -> Self {
        AdminResponse::Error {
            error: e.to_string(),
        }
    }
}

/// Admin socket server.
pub struct AdminSocket {
    ledger: LedgerHandle,
    storage: Arc<Storage>,
    socket_path: PathBuf,
}

impl AdminSocket {
    /// Create a new admin socket server.
    pub fn new(ledger: LedgerHandle, storage: Arc<Storage>, socket_path: impl AsRef<Path>) -> Self {
        Self {
            ledger,
            storage,
            socket_path: socket_path.as_ref().to_path_buf(),
        }
    }

    /// Run the admin socket server.
    pub async fn run(&self) -> Result<()> {
        // Remove existing socket file if present
        let _ = std::fs::remove_file(&self.socket_path);

        let listener = UnixListener::bind(&self.socket_path)?;
        tracing::info!("Admin socket listening on {:?}", self.socket_path);

        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let ledger = self.ledger.clone();
                    let storage = Arc::clone(&self.storage);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, ledger, storage).await {
                            tracing::error!("Admin connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Failed to accept admin connection: {}", e);
                }
            }
        }
    }

    /// Get the socket path.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

async fn handle_connection(stream: UnixStream, ledger: LedgerHandle, storage: Arc<Storage>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    while reader.read_line(&mut line).await? > 0 {
        let response = match AdminRequest::parse(&line) {
            Ok(request) => execute_request(request, &ledger, &storage).await,
            Err(e) => AdminResponse::Error {
                error: format!("Invalid command: {}", e),
            },
        };

        let response_json = serde_json::to_string(&response)? + "\n";
        writer.write_all(response_json.as_bytes()).await?;
        line.clear();
    }

    Ok(())
}

/// Execute one request and build its reply.
pub async fn execute_request(request: AdminRequest, ledger: &LedgerHandle, storage: &Storage) -> AdminResponse {
    match request {
        AdminRequest::Ledger(cmd) => {
            let name = cmd.name();
            match ledger.apply(cmd).await {
                Ok(Outcome::Surfer { id }) => AdminResponse::Surfer { id },
                Ok(Outcome::Session { id }) => AdminResponse::Session { id },
                Ok(Outcome::Done) => AdminResponse::Ok {
                    message: format!("{} applied", name),
                },
                Err(e) => {
                    tracing::info!("Admin command {} rejected: {}", name, e);
                    AdminResponse::error(e)
                }
            }
        }

        AdminRequest::Node(NodeCommand::PutBlob { document }) => match storage.put_blob(&document) {
            Ok(address) => {
                tracing::info!("Stored blob {}", address);
                AdminResponse::Blob { address }
            }
            Err(e) => AdminResponse::error(e),
        },

        AdminRequest::Node(NodeCommand::GetBlob { address }) => match storage.get_blob(&address) {
            Ok(document) => AdminResponse::Document { document },
            Err(e) => AdminResponse::error(e),
        },

        AdminRequest::Node(NodeCommand::Balance { account }) => {
            match ledger.query(move |state, _| state.token.balance_of(&account)).await {
                Ok(amount) => AdminResponse::Balance { amount },
                Err(e) => AdminResponse::error(e),
            }
        }

        AdminRequest::Node(NodeCommand::Ping) => AdminResponse::Pong,
    }
}

/// Default socket path.
pub fn default_socket_path() -> PathBuf {
    let data_dir = std::env::var("ALOHA_DATA_DIR").unwrap_or_else(|_| "./aloha-data".to_string());
    PathBuf::from(data_dir).join("admin.sock")
}

#[cfg(test)]
mod tests {
    use super::*;
    use aloha_ledger::{encoding, Engine, EngineConfig, EthereumVerifier, Genesis, ManualClock};
    use serde_json::json;
    use tempfile::tempdir;

    fn ledger(dir: &Path) -> (LedgerHandle, Arc<Storage>) {
        let engine = Engine::new(
            &EngineConfig::new(Account([0xad; 20])),
            &Genesis::empty(),
            EthereumVerifier,
            ManualClock::new(1_000),
        )
        .unwrap();
        let storage = Arc::new(Storage::open(dir).unwrap());
        (LedgerHandle::spawn(engine, Arc::clone(&storage)), storage)
    }

    #[test]
    fn parses_both_command_families() {
        assert_eq!(
            AdminRequest::parse(r#"{"cmd":"ping"}"#).unwrap(),
            AdminRequest::Node(NodeCommand::Ping)
        );

        let line = json!({
            "cmd": "register_surfer",
            "caller": Account([1; 20]),
            "alias": "Kelly",
            "metadata": "QmKelly",
        })
        .to_string();
        assert!(matches!(
            AdminRequest::parse(&line).unwrap(),
            AdminRequest::Ledger(LedgerCommand::RegisterSurfer { .. })
        ));

        let err = AdminRequest::parse(r#"{"cmd":"register_surfer","alias":"x"}"#).unwrap_err();
        assert!(err.to_string().contains("caller"));
    }

    #[tokio::test]
    async fn register_returns_surfer_id() {
        let dir = tempdir().unwrap();
        let (ledger, storage) = ledger(dir.path());

        let request = AdminRequest::Ledger(LedgerCommand::RegisterSurfer {
            caller: Account([1; 20]),
            alias: "Kelly".into(),
            metadata: "QmKelly".into(),
        });
        assert_eq!(
            execute_request(request.clone(), &ledger, &storage).await,
            AdminResponse::Surfer {
                id: encoding::surfer_id("Kelly")
            }
        );

        // same alias again: rejected, reported as an error line
        let response = execute_request(request, &ledger, &storage).await;
        assert!(matches!(response, AdminResponse::Error { .. }));
    }

    #[tokio::test]
    async fn blobs_and_balances() {
        let dir = tempdir().unwrap();
        let (ledger, storage) = ledger(dir.path());
        let document = json!({"spot": "Mundaka", "wave": "left"});

        let AdminResponse::Blob { address } = execute_request(
            AdminRequest::Node(NodeCommand::PutBlob { document: document.clone() }),
            &ledger,
            &storage,
        )
        .await
        else {
            panic!("expected blob address");
        };
        assert_eq!(
            execute_request(AdminRequest::Node(NodeCommand::GetBlob { address }), &ledger, &storage).await,
            AdminResponse::Document {
                document: Some(document)
            }
        );

        assert_eq!(
            execute_request(
                AdminRequest::Node(NodeCommand::Balance { account: Account([7; 20]) }),
                &ledger,
                &storage
            )
            .await,
            AdminResponse::Balance { amount: 0 }
        );
    }

    #[test]
    fn balance_response_serializes_amount_as_string() {
        let json = serde_json::to_string(&AdminResponse::Balance { amount: u128::MAX }).unwrap();
        assert!(json.contains(r#""status":"balance""#));
        assert!(json.contains(&u128::MAX.to_string()));
    }
}
