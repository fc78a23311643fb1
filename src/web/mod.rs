//! # Web API
//!
//! axum routes over the handler registry:
//!
//! | Route | Operation |
//! |-------|-----------|
//! | `POST /index` | start a run, returns its id as plain text |
//! | `GET /index` | summaries of stored runs |
//! | `GET /index/:run_id` | checkpoint of a run |
//! | `POST /index/:run_id/resume` | resume a halted run |
//! | `POST /index/:run_id/cancel` | request cancellation (202) |
//! | `GET /health` | liveness |

pub mod errors;
pub mod handlers;

use crate::error::{IndexerError, Result};
use crate::registry::HandlerRegistry;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use errors::{ApiError, ApiResult};

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<HandlerRegistry>,
}

impl AppState {
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self { registry }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/index", post(handlers::start_index).get(handlers::list_runs))
        .route("/index/:run_id", get(handlers::run_status))
        .route("/index/:run_id/resume", post(handlers::resume_run))
        .route("/index/:run_id/cancel", post(handlers::cancel_run))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until Ctrl-C
pub async fn serve(bind_address: &str, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!(address = %bind_address, "Indexer API listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %err, "Failed to install Ctrl-C handler");
            }
            info!("Shutdown signal received");
        })
        .await
        .map_err(IndexerError::from)
}
