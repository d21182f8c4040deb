// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Liveness and readiness probes.
//!
//! `/healthz` answers 200 for as long as the process is alive. `/readyz`
//! flips to 503 the moment graceful shutdown begins, so load balancers
//! stop routing new connections while in-flight work drains.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared readiness flag, flipped once at the start of shutdown.
#[derive(Clone, Default)]
pub struct ReadyState(Arc<AtomicBool>);

impl ReadyState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the process as not-ready. Irreversible.
    pub fn begin_shutdown(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Build the probe router.
pub fn health_router(ready: ReadyState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .with_state(ready)
}

// Liveness: "is the process running?"
async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

// Readiness: "can you take new work?"
async fn readyz(State(ready): State<ReadyState>) -> impl IntoResponse {
    if ready.is_shutting_down() {
        (StatusCode::SERVICE_UNAVAILABLE, "shutting down")
    } else {
        (StatusCode::OK, "ready")
    }
}

/// Serve the probe endpoints until `shutdown` resolves.
pub async fn serve_health(
    port: u16,
    ready: ReadyState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    axum::serve(listener, health_router(ready))
        .with_graceful_shutdown(shutdown)
        .await
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod tests;
