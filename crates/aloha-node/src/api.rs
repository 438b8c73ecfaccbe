//! Read-only HTTP API for the ledger.

use crate::service::LedgerHandle;
use crate::storage::{LoggedEvent, Storage};
use aloha_ledger::token::{self, amount_serde};
use aloha_ledger::{Account, AwardPolicy, SessionId, SurfSession, Surfer, SurferId};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub ledger: LedgerHandle,
    pub storage: Arc<Storage>,
}

type ApiResult<T> = Result<Json<T>, StatusCode>;

/// Build the API router.
pub fn build_router(state: ApiState) -> Router {
    // CORS layer for browser access
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/health", get(health))
        // Token
        .route("/api/v1/token", get(token_info))
        .route("/api/v1/accounts/:account/balance", get(balance))
        .route("/api/v1/accounts/:account/surfer", get(surfer_by_account))
        // Surfers
        .route("/api/v1/surfers", get(list_surfers))
        .route("/api/v1/surfers/:id", get(get_surfer))
        .route("/api/v1/surfers/:from/approvals/:to", get(surfer_approval))
        // Sessions
        .route("/api/v1/sessions", get(list_sessions))
        .route("/api/v1/sessions/:id", get(get_session))
        // Configuration, events and metadata
        .route("/api/v1/config", get(get_config))
        .route("/api/v1/events", get(list_events))
        .route("/api/v1/blobs/:address", get(get_blob))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn parse<T: std::str::FromStr>(raw: &str) -> Result<T, StatusCode> {
    raw.parse().map_err(|_| StatusCode::BAD_REQUEST)
}

fn lookup_status(e: &aloha_ledger::Error) -> StatusCode {
    if e.is_not_found() {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::BAD_REQUEST
    }
}

async fn health() -> &'static str {
    "OK"
}

// --- Token ---

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenInfo {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    #[serde(with = "amount_serde")]
    pub total_supply: u128,
    /// Accounts holding a non-zero balance
    pub holders: usize,
}

async fn token_info(State(state): State<ApiState>) -> ApiResult<TokenInfo> {
    let (total_supply, holders) = state
        .ledger
        .query(|ledger, _| (ledger.token.total_supply(), ledger.token.holders()))
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;
    Ok(Json(TokenInfo {
        name: token::NAME.to_string(),
        symbol: token::SYMBOL.to_string(),
        decimals: token::DECIMALS,
        total_supply,
        holders,
    }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Balance {
    pub account: Account,
    #[serde(with = "amount_serde")]
    pub balance: u128,
}

async fn balance(State(state): State<ApiState>, Path(account): Path<String>) -> ApiResult<Balance> {
    let account: Account = parse(&account)?;
    let balance = state
        .ledger
        .query(move |ledger, _| ledger.token.balance_of(&account))
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;
    Ok(Json(Balance { account, balance }))
}

// --- Surfers ---

#[derive(Debug, Serialize, Deserialize)]
pub struct SurferRef {
    pub surfer: SurferId,
}

async fn surfer_by_account(State(state): State<ApiState>, Path(account): Path<String>) -> ApiResult<SurferRef> {
    let account: Account = parse(&account)?;
    let found = state
        .ledger
        .query(move |ledger, _| ledger.surfers.lookup_by_account(&account))
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;
    found
        .map(|surfer| Json(SurferRef { surfer }))
        .map_err(|e| lookup_status(&e))
}

async fn list_surfers(State(state): State<ApiState>) -> ApiResult<Vec<Surfer>> {
    let surfers = state
        .ledger
        .query(|ledger, _| ledger.surfers.list().into_iter().cloned().collect())
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;
    Ok(Json(surfers))
}

async fn get_surfer(State(state): State<ApiState>, Path(id): Path<String>) -> ApiResult<Surfer> {
    let id: SurferId = parse(&id)?;
    let surfer = state
        .ledger
        .query(move |ledger, _| ledger.surfers.resolve(&id).cloned())
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;
    surfer.map(Json).map_err(|e| lookup_status(&e))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Approval {
    pub from: SurferId,
    pub to: SurferId,
    pub approved: bool,
}

async fn surfer_approval(
    State(state): State<ApiState>,
    Path((from, to)): Path<(String, String)>,
) -> ApiResult<Approval> {
    let from: SurferId = parse(&from)?;
    let to: SurferId = parse(&to)?;
    let approved = state
        .ledger
        .query(move |ledger, _| ledger.surfers.has_approval(&from, &to))
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;
    Ok(Json(Approval { from, to, approved }))
}

// --- Sessions ---

async fn list_sessions(State(state): State<ApiState>) -> ApiResult<Vec<SurfSession>> {
    let sessions = state
        .ledger
        .query(|ledger, _| ledger.sessions.list().into_iter().cloned().collect())
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;
    Ok(Json(sessions))
}

async fn get_session(State(state): State<ApiState>, Path(id): Path<String>) -> ApiResult<SurfSession> {
    let id: SessionId = parse(&id)?;
    let session = state
        .ledger
        .query(move |ledger, _| ledger.sessions.resolve(&id).cloned())
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;
    session.map(Json).map_err(|e| lookup_status(&e))
}

// --- Configuration ---

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigView {
    pub admin: Account,
    pub min_approvals: u32,
    pub surfer_add_interval: u64,
    pub session_add_interval: u64,
    pub awards: AwardPolicy,
    pub now: u64,
}

async fn get_config(State(state): State<ApiState>) -> ApiResult<ConfigView> {
    let view = state
        .ledger
        .query(|ledger, now| ConfigView {
            admin: ledger.admin,
            min_approvals: ledger.min_approvals,
            surfer_add_interval: ledger.throttle.surfers.interval,
            session_add_interval: ledger.throttle.sessions.interval,
            awards: ledger.awards,
            now,
        })
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;
    Ok(Json(view))
}

// --- Events and blobs ---

#[derive(Debug, Deserialize)]
pub struct EventRange {
    #[serde(default)]
    pub from: u64,
    pub limit: Option<usize>,
}

const MAX_EVENTS: usize = 500;

async fn list_events(State(state): State<ApiState>, Query(range): Query<EventRange>) -> ApiResult<Vec<LoggedEvent>> {
    let limit = range.limit.unwrap_or(100).min(MAX_EVENTS);
    state
        .storage
        .events(range.from, limit)
        .map(Json)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

async fn get_blob(State(state): State<ApiState>, Path(address): Path<String>) -> ApiResult<Value> {
    match state.storage.get_blob(&address) {
        Ok(Some(document)) => Ok(Json(document)),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::LedgerCommand;
    use aloha_ledger::{encoding, Engine, EngineConfig, EthereumVerifier, Genesis, ManualClock};
    use tempfile::tempdir;

    const ADMIN: Account = Account([0xad; 20]);
    const KELLY: Account = Account([1; 20]);

    fn api_state(dir: &std::path::Path) -> ApiState {
        let genesis = Genesis::empty().with_surfer(KELLY, "Kelly", "QmKelly");
        let engine = Engine::new(
            &EngineConfig::new(ADMIN),
            &genesis,
            EthereumVerifier,
            ManualClock::new(1_000),
        )
        .unwrap();
        let storage = Arc::new(Storage::open(dir).unwrap());
        ApiState {
            ledger: LedgerHandle::spawn(engine, Arc::clone(&storage)),
            storage,
        }
    }

    #[tokio::test]
    async fn surfer_lookups() {
        let dir = tempdir().unwrap();
        let state = api_state(dir.path());
        let kelly = encoding::surfer_id("Kelly");

        let Json(list) = list_surfers(State(state.clone())).await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, kelly);

        let Json(found) = get_surfer(State(state.clone()), Path(kelly.to_hex())).await.unwrap();
        assert_eq!(found.alias, "Kelly");

        let Json(by_account) = surfer_by_account(State(state.clone()), Path(KELLY.to_hex()))
            .await
            .unwrap();
        assert_eq!(by_account.surfer, kelly);

        let missing = get_surfer(State(state.clone()), Path(SurferId([9; 32]).to_hex())).await;
        assert_eq!(missing.err(), Some(StatusCode::NOT_FOUND));

        let malformed = get_surfer(State(state), Path("not-hex".into())).await;
        assert_eq!(malformed.err(), Some(StatusCode::BAD_REQUEST));
    }

    #[tokio::test]
    async fn removed_surfer_is_not_found() {
        let dir = tempdir().unwrap();
        let state = api_state(dir.path());
        let kelly = encoding::surfer_id("Kelly");
        state
            .ledger
            .apply(LedgerCommand::RemoveSurfer {
                caller: ADMIN,
                surfer: kelly,
            })
            .await
            .unwrap();

        let found = get_surfer(State(state.clone()), Path(kelly.to_hex())).await;
        assert_eq!(found.err(), Some(StatusCode::NOT_FOUND));
        let by_account = surfer_by_account(State(state.clone()), Path(KELLY.to_hex())).await;
        assert_eq!(by_account.err(), Some(StatusCode::NOT_FOUND));

        let Json(list) = list_surfers(State(state)).await.unwrap();
        assert!(list.is_empty());
    }

    #[tokio::test]
    async fn balances_and_token_info() {
        let dir = tempdir().unwrap();
        let state = api_state(dir.path());
        state
            .ledger
            .apply(LedgerCommand::Mint {
                caller: ADMIN,
                account: KELLY,
                amount: 7,
            })
            .await
            .unwrap();

        let Json(balance) = balance(State(state.clone()), Path(KELLY.to_hex())).await.unwrap();
        assert_eq!(balance.balance, 7);

        let Json(info) = token_info(State(state.clone())).await.unwrap();
        assert_eq!(info.symbol, "ALH");
        assert_eq!(info.decimals, 18);
        assert_eq!(info.total_supply, 7);
        assert_eq!(info.holders, 1);

        let Json(events) = list_events(
            State(state),
            Query(EventRange {
                from: 0,
                limit: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn config_view_reports_clock() {
        let dir = tempdir().unwrap();
        let state = api_state(dir.path());
        let Json(view) = get_config(State(state)).await.unwrap();
        assert_eq!(view.admin, ADMIN);
        assert_eq!(view.now, 1_000);
        assert_eq!(view.min_approvals, 1);
    }
}
