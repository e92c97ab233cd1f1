//! HTTP surface over a shared [`LedgerService`].

pub mod constants;
pub mod error;
pub mod handlers;
pub mod tasks;

use audit_core::{CancelToken, LedgerService};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<LedgerService>,
    /// Cancels in-flight proof-of-work on shutdown.
    pub cancel: CancelToken,
}

impl AppState {
    pub fn new(ledger: Arc<LedgerService>) -> Self {
        Self {
            ledger,
            cancel: CancelToken::new(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/healthz", get(handlers::health))
        .route("/chain/head", get(handlers::head))
        .route("/chain/blocks", get(handlers::blocks))
        .route("/chain/blocks/{index}", get(handlers::block))
        .route(
            "/transactions",
            post(handlers::submit).get(handlers::pending),
        )
        .route("/transactions/{hash}", get(handlers::status))
        .route("/transactions/{hash}/history", get(handlers::history))
        .route("/transactions/{hash}/confirm", post(handlers::confirm))
        .route("/transactions/{hash}/fail", post(handlers::fail))
        .route("/projects/{id}/transactions", get(handlers::project_transactions))
        .route("/users/{id}/transactions", get(handlers::user_transactions))
        .route("/stats", get(handlers::stats))
        .route("/mine", post(handlers::mine))
        .route("/export", get(handlers::export))
        .route("/import", post(handlers::import))
        .route("/cleanup", post(handlers::cleanup))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
