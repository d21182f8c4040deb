// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session-id validation.
//!
//! Session ids end up inside pod names, so they must be lowercase RFC-1123
//! DNS labels. The length ceiling leaves room for the `nix-builder-` prefix.

use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

/// Maximum accepted session-id length.
pub const SESSION_ID_MAX_LEN: usize = 240;

static SESSION_ID_RE: OnceLock<Regex> = OnceLock::new();

fn session_id_re() -> &'static Regex {
    SESSION_ID_RE.get_or_init(|| {
        // RFC 1123 DNS label: lowercase alphanumeric or '-', alphanumeric
        // at both ends.
        Regex::new(r"^[a-z0-9]([a-z0-9\-]{0,61}[a-z0-9])?$").expect("session id regex")
    })
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionIdError {
    #[error("sessionId cannot be empty")]
    Empty,

    #[error("sessionId too long: {0} characters (max {SESSION_ID_MAX_LEN} to fit the pod name prefix)")]
    TooLong(usize),

    #[error("sessionId {0:?} is invalid: must be a lowercase RFC 1123 DNS label (lowercase alphanumeric or '-', alphanumeric at both ends)")]
    NotDnsLabel(String),
}

/// Validate a session id for use in pod and record names.
pub fn validate_session_id(id: &str) -> Result<(), SessionIdError> {
    if id.is_empty() {
        return Err(SessionIdError::Empty);
    }
    if id.len() > SESSION_ID_MAX_LEN {
        return Err(SessionIdError::TooLong(id.len()));
    }
    if !session_id_re().is_match(id) {
        return Err(SessionIdError::NotDnsLabel(id.to_string()));
    }
    Ok(())
}

#[cfg(test)]
#[path = "validate_tests.rs"]
mod tests;
