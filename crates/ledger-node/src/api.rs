use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use ledger_core::{CancelToken, LedgerError, SharedChain, Transaction};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

#[derive(Clone)]
pub(crate) struct AppState {
    chain: SharedChain,
    // shared flag of every mining attempt started since the last cancel
    cancel: Arc<Mutex<CancelToken>>,
    mine_timeout: Duration,
}

impl AppState {
    pub(crate) fn new(chain: SharedChain, mine_timeout: Duration) -> Self {
        Self {
            chain,
            cancel: Arc::new(Mutex::new(CancelToken::new())),
            mine_timeout,
        }
    }

    fn mining_token(&self) -> CancelToken {
        self.cancel.lock().clone().with_timeout(self.mine_timeout)
    }

    /// Stops every in-flight attempt; later attempts get a fresh flag.
    pub(crate) fn cancel_mining(&self) {
        let mut current = self.cancel.lock();
        current.cancel();
        *current = CancelToken::new();
    }
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

#[derive(Serialize)]
struct ChainView {
    length: usize,
    chain: Vec<Value>,
}

#[derive(Serialize)]
struct Validity {
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

#[derive(Deserialize)]
struct TxIn {
    sender: String,
    recipient: String,
    quantity: u64,
}

#[derive(Serialize)]
struct TxAccepted {
    accepted: bool,
    block_index: u64,
}

#[derive(Deserialize)]
struct MineIn {
    miner: String,
}

#[derive(Deserialize)]
struct NodeIn {
    address: String,
}

#[derive(Serialize)]
struct NodeRegistered {
    registered: bool,
    total: usize,
}

pub(crate) struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        let status = match &err {
            LedgerError::InvalidMiner
            | LedgerError::InvalidNode
            | LedgerError::MalformedRecord(_) => StatusCode::BAD_REQUEST,
            LedgerError::StaleTip { .. } => StatusCode::CONFLICT,
            LedgerError::MiningCancelled => StatusCode::SERVICE_UNAVAILABLE,
            LedgerError::InvalidChain { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("mining worker failed: {err}"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(Health { status: "ok" }) }))
        .route("/chain", get(chain))
        .route("/chain/valid", get(chain_valid))
        .route("/transactions", post(submit_transaction))
        .route("/transactions/pending", get(pending))
        .route("/mine", post(mine))
        .route("/mine/cancel", post(cancel_mine))
        .route("/nodes", get(nodes).post(register_node))
        .with_state(state)
}

async fn chain(State(state): State<AppState>) -> Json<ChainView> {
    let blocks = state.chain.blocks();
    Json(ChainView {
        length: blocks.len(),
        chain: blocks.iter().map(|b| b.to_record()).collect(),
    })
}

async fn chain_valid(State(state): State<AppState>) -> Json<Validity> {
    let outcome = state.chain.validate();
    Json(Validity {
        valid: outcome.is_ok(),
        reason: outcome.err().map(|e| e.to_string()),
    })
}

async fn pending(State(state): State<AppState>) -> Json<Vec<Transaction>> {
    Json(state.chain.pending())
}

async fn submit_transaction(
    State(state): State<AppState>,
    Json(tx): Json<TxIn>,
) -> Json<TxAccepted> {
    let block_index = state
        .chain
        .add_transaction(tx.sender, tx.recipient, tx.quantity);
    Json(TxAccepted {
        accepted: true,
        block_index,
    })
}

async fn mine(
    State(state): State<AppState>,
    Json(req): Json<MineIn>,
) -> Result<Json<Value>, ApiError> {
    let token = state.mining_token();
    let chain = state.chain.clone();
    let miner = req.miner;
    let block =
        tokio::task::spawn_blocking(move || chain.mine_block(&miner, &token)).await??;
    Ok(Json(block.to_record()))
}

async fn cancel_mine(State(state): State<AppState>) -> Json<Value> {
    state.cancel_mining();
    warn!("mining attempts cancelled on request");
    Json(serde_json::json!({ "cancelled": true }))
}

async fn nodes(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.chain.nodes())
}

async fn register_node(
    State(state): State<AppState>,
    Json(req): Json<NodeIn>,
) -> Result<Json<NodeRegistered>, ApiError> {
    let registered = state.chain.register_node(&req.address)?;
    let total = state.chain.nodes().len();
    info!(address = %req.address, total, "peer address stored");
    Ok(Json(NodeRegistered { registered, total }))
}
