// Copyright 2026 Ratekeeper Contributors
// SPDX-License-Identifier: Apache-2.0

//! HTTP read API.
//!
//! `GET /api/rate` answers from the query service and never fails: when no
//! rate has been captured it serves the fallback with a 503. `GET /health`
//! reports scrape health for operators.

use crate::query::QueryService;
use crate::scheduler::ScrapeHealth;
use crate::store::RateStore;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::SecondsFormat;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Notify;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

/// Shared handles the handlers read from.
pub struct AppState {
    pub query: QueryService,
    pub store: Arc<RateStore>,
    pub health: Arc<ScrapeHealth>,
}

/// Build the axum Router with all endpoints.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/rate", get(current_rate))
        .route("/health", get(health))
        .layer(cors)
        .with_state(state)
}

/// Serve the API on `addr` until `shutdown` is notified.
pub async fn start(
    addr: SocketAddr,
    state: Arc<AppState>,
    shutdown: Arc<Notify>,
) -> anyhow::Result<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("API listening on http://{}", listener.local_addr()?);

    let mut notified = Box::pin(shutdown.notified_owned());
    notified.as_mut().enable();

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            notified.await;
            tracing::info!("API shutting down");
        })
        .await?;
    Ok(())
}

async fn current_rate(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    let reader = Arc::clone(&state);
    let current = tokio::task::spawn_blocking(move || reader.query.current_rate())
        .await
        .unwrap_or_else(|e| {
            warn!("rate lookup task failed, serving fallback: {e}");
            state.query.fallback()
        });

    if current.degraded {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "success": false,
                "error": "rate unavailable",
                "rate": current.rate,
                "source": current.source,
            })),
        );
    }

    let last_update = current
        .captured_at
        .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Millis, true));

    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "rate": current.rate,
            "lastUpdate": last_update,
            "source": current.source,
        })),
    )
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let store = Arc::clone(&state.store);
    let retained = match tokio::task::spawn_blocking(move || store.len()).await {
        Ok(Ok(n)) => n,
        Ok(Err(e)) => {
            warn!("failed to count retained records: {e}");
            0
        }
        Err(e) => {
            warn!("record count task failed: {e}");
            0
        }
    };
    let status = if state.health.is_stale() { "stale" } else { "ok" };

    Json(json!({
        "status": status,
        "retained": retained,
        "retention": state.store.retention(),
        "scrape": state.health.snapshot(),
    }))
}
