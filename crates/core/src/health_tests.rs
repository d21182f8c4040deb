// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unit tests for the probe router

use super::*;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

async fn probe(router: &Router, path: &str) -> StatusCode {
    let response = router
        .clone()
        .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    response.status()
}

#[tokio::test]
async fn ready_process_answers_ok_on_both_probes() {
    let router = health_router(ReadyState::new());
    assert_eq!(probe(&router, "/healthz").await, StatusCode::OK);
    assert_eq!(probe(&router, "/readyz").await, StatusCode::OK);
}

#[tokio::test]
async fn shutdown_flips_readiness_but_not_liveness() {
    let ready = ReadyState::new();
    let router = health_router(ready.clone());

    ready.begin_shutdown();

    assert_eq!(probe(&router, "/healthz").await, StatusCode::OK);
    assert_eq!(probe(&router, "/readyz").await, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn unknown_paths_are_not_found() {
    let router = health_router(ReadyState::new());
    assert_eq!(probe(&router, "/metrics").await, StatusCode::NOT_FOUND);
}
