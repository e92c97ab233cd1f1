use crate::constants::{BLOCKS_PER_BATCH, MAX_BLOCKS_PER_REQUEST};
use crate::error::ApiResult;
use crate::AppState;
use audit_core::{
    Block, ChainStats, HistoryEvent, ImportSummary, LedgerError, LedgerTransaction,
    NewTransaction, SettlementRecord, TransactionStatus,
};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Health {
    pub status: String,
    pub chain_valid: bool,
    pub height: usize,
    /// First integrity violation, when the chain is not valid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Head {
    pub height: u64,
    pub hash: String,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmIn {
    pub confirmed_by: String,
    #[serde(default)]
    pub signature: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct FailIn {
    #[serde(default)]
    pub reason: String,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct CleanupIn {
    pub max_age_hours: Option<u64>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct CleanupOut {
    pub removed: usize,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct MineOut {
    pub block: Option<Block>,
}

#[derive(Deserialize, Debug)]
pub struct BlocksQuery {
    pub start: Option<u64>,
    pub limit: Option<usize>,
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<Health>) {
    let verdict = state.ledger.verify();
    let chain_valid = verdict.is_ok();
    let (code, status) = if chain_valid {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };
    let health = Health {
        status: status.to_string(),
        chain_valid,
        height: state.ledger.chain_len(),
        error: verdict.err().map(|err| err.to_string()),
    };
    (code, Json(health))
}

pub async fn head(State(state): State<AppState>) -> Json<Head> {
    let latest = state.ledger.latest_block();
    Json(Head {
        height: latest.index,
        hash: latest.hash,
    })
}

pub async fn blocks(
    State(state): State<AppState>,
    Query(q): Query<BlocksQuery>,
) -> Json<Vec<Block>> {
    let limit = q.limit.unwrap_or(BLOCKS_PER_BATCH).min(MAX_BLOCKS_PER_REQUEST);
    Json(state.ledger.blocks(q.start.unwrap_or(0), limit))
}

pub async fn block(
    State(state): State<AppState>,
    Path(index): Path<u64>,
) -> ApiResult<Json<Block>> {
    let block = state
        .ledger
        .block(index)
        .ok_or_else(|| LedgerError::NotFound(format!("block {index}")))?;
    Ok(Json(block))
}

pub async fn submit(
    State(state): State<AppState>,
    Json(request): Json<NewTransaction>,
) -> ApiResult<(StatusCode, Json<LedgerTransaction>)> {
    let tx = state.ledger.submit(request)?;
    info!(event = "transaction_created", hash = %tx.hash, kind = %tx.kind, "notify");
    Ok((StatusCode::CREATED, Json(tx)))
}

pub async fn pending(State(state): State<AppState>) -> Json<Vec<LedgerTransaction>> {
    Json(state.ledger.pending_transactions())
}

pub async fn confirm(
    State(state): State<AppState>,
    Path(hash): Path<String>,
    Json(body): Json<ConfirmIn>,
) -> ApiResult<Json<SettlementRecord>> {
    let record = state
        .ledger
        .confirm(&hash, &body.confirmed_by, body.signature)?;
    info!(event = "transaction_confirmed", %hash, "notify");
    Ok(Json(record))
}

pub async fn fail(
    State(state): State<AppState>,
    Path(hash): Path<String>,
    Json(body): Json<FailIn>,
) -> ApiResult<Json<SettlementRecord>> {
    let record = state.ledger.fail(&hash, &body.reason)?;
    info!(event = "transaction_failed", %hash, "notify");
    Ok(Json(record))
}

pub async fn status(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> (StatusCode, Json<TransactionStatus>) {
    let status = state.ledger.status(&hash);
    let code = if status.is_found() {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    };
    (code, Json(status))
}

pub async fn history(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Json<Vec<HistoryEvent>> {
    Json(state.ledger.history(&hash))
}

pub async fn project_transactions(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<Vec<LedgerTransaction>> {
    Json(state.ledger.project_transactions(&id))
}

pub async fn user_transactions(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<Vec<LedgerTransaction>> {
    Json(state.ledger.user_transactions(&id))
}

pub async fn stats(State(state): State<AppState>) -> Json<ChainStats> {
    Json(state.ledger.stats())
}

/// Proof-of-work is CPU bound, so it runs on the blocking pool.
pub async fn mine(State(state): State<AppState>) -> ApiResult<Json<MineOut>> {
    let ledger = state.ledger.clone();
    let cancel = state.cancel.clone();
    let block = tokio::task::spawn_blocking(move || ledger.mine_pending(&cancel)).await??;
    Ok(Json(MineOut { block }))
}

pub async fn export(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let snapshot = serde_json::to_value(state.ledger.export())
        .map_err(LedgerError::from)?;
    Ok(Json(snapshot))
}

pub async fn import(
    State(state): State<AppState>,
    Json(snapshot): Json<Value>,
) -> ApiResult<Json<ImportSummary>> {
    let ledger = state.ledger.clone();
    let summary = tokio::task::spawn_blocking(move || ledger.import(snapshot)).await??;
    Ok(Json(summary))
}

pub async fn cleanup(
    State(state): State<AppState>,
    body: Option<Json<CleanupIn>>,
) -> Json<CleanupOut> {
    let max_age = body
        .and_then(|Json(b)| b.max_age_hours)
        .unwrap_or(state.ledger.config().pending_max_age_hours);
    Json(CleanupOut {
        removed: state.ledger.cleanup(max_age),
    })
}
