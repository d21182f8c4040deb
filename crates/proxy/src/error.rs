// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Proxy errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("ssh error: {0}")]
    Ssh(#[from] russh::Error),

    #[error("key error: {0}")]
    Keys(#[from] russh_keys::Error),

    #[error("kubernetes api error: {0}")]
    Kube(#[from] kube::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to generate key material")]
    KeyGeneration,

    #[error("timed out waiting for a routable worker")]
    WorkerReadyTimeout,

    #[error("timed out dialing worker at {0}")]
    DialTimeout(String),

    #[error("worker rejected the proxy's key")]
    WorkerAuthRejected,

    #[error("shutting down")]
    Cancelled,
}
