// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deterministic naming and labels.
//!
//! The pod name is a pure function of the session id: the cluster's
//! name-uniqueness constraint is what enforces at-most-one worker per
//! session, and the adopt-on-found logic in the controller depends on it.

use std::collections::BTreeMap;

/// Label carried by every worker pod and the published key secret.
pub const APP_LABEL: &str = "app";
pub const APP_NAME: &str = "nix-builder";

/// Label pointing a pod back at its session.
pub const SESSION_ID_LABEL: &str = "nixherd.io/session-id";

/// Label pointing a pod back at its owning record.
pub const BUILD_REQUEST_LABEL: &str = "nixherd.io/build-request";

/// Finalizer that holds a record until its pod is gone.
pub const CLEANUP_FINALIZER: &str = "nixherd.io/cleanup";

/// Name of the worker container inside the pod.
pub const WORKER_CONTAINER: &str = "nix-builder";

/// Field of the published secret holding the proxy's public key.
pub const AUTHORIZED_KEYS_FIELD: &str = "authorized_keys";

/// Record name for a session: `build-<sessionId>`.
pub fn record_name(session_id: &str) -> String {
    format!("build-{session_id}")
}

/// Pod name for a session: `nix-builder-<sessionId>`.
pub fn pod_name(session_id: &str) -> String {
    format!("nix-builder-{session_id}")
}

/// Full label set for a worker pod.
pub fn pod_labels(session_id: &str, record_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (APP_LABEL.to_string(), APP_NAME.to_string()),
        (SESSION_ID_LABEL.to_string(), session_id.to_string()),
        (BUILD_REQUEST_LABEL.to_string(), record_name.to_string()),
    ])
}

#[cfg(test)]
#[path = "names_tests.rs"]
mod tests;
