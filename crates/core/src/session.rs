// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session identity

use uuid::Uuid;

/// Identifier for one client connection to the proxy.
///
/// A time-ordered UUIDv7 rendered in canonical hyphenated hex: sortable
/// enough for log correlation, cheap to generate, and lowercase so it can
/// be embedded verbatim in RFC-1123 resource names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// Lifecycle of a proxy session, from handshake to teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Handshake complete, worker not yet dialed.
    Pending,
    /// Spliced to a worker.
    Connected,
    /// Torn down; the record is about to leave the registry.
    Closed,
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
