// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unit tests for session identity

use super::*;
use crate::validate::validate_session_id;

#[test]
fn ids_are_unique() {
    let a = SessionId::new();
    let b = SessionId::new();
    assert_ne!(a, b);
}

#[test]
fn renders_canonical_hyphenated_form() {
    let id = SessionId::new().to_string();
    assert_eq!(id.len(), 36);
    assert_eq!(id.matches('-').count(), 4);
    assert!(id.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
}

#[test]
fn rendered_ids_are_valid_session_ids() {
    // The rendered form feeds straight into record and pod names.
    let id = SessionId::new().to_string();
    validate_session_id(&id).unwrap();
}

#[test]
fn uses_time_ordered_uuids() {
    let id = SessionId::new().to_string();
    // Version nibble sits at the start of the third group.
    assert_eq!(id.as_bytes()[14], b'7');
}

#[test]
fn serializes_transparently() {
    let id = SessionId::new();
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, format!("\"{id}\""));
}
