// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unit tests for the session registry

use super::*;

fn registry() -> SessionRegistry<()> {
    SessionRegistry::new()
}

#[test]
fn insert_and_remove_track_the_count() {
    let registry = registry();
    assert_eq!(registry.count(), 0);

    let a = SessionId::new();
    let b = SessionId::new();
    registry.insert(SessionRecord::new(a, ()));
    registry.insert(SessionRecord::new(b, ()));
    assert_eq!(registry.count(), 2);

    assert!(registry.remove(&a).is_some());
    assert_eq!(registry.count(), 1);

    // Removing twice is harmless.
    assert!(registry.remove(&a).is_none());
    assert_eq!(registry.count(), 1);
}

#[test]
fn new_records_start_pending_without_a_worker() {
    let registry = registry();
    let id = SessionId::new();
    registry.insert(SessionRecord::new(id, ()));

    assert_eq!(registry.status(&id), Some(SessionStatus::Pending));
    let record = registry.remove(&id).unwrap();
    assert_eq!(record.worker_addr, None);
}

#[test]
fn status_and_worker_addr_update_in_place() {
    let registry = registry();
    let id = SessionId::new();
    registry.insert(SessionRecord::new(id, ()));

    registry.set_worker_addr(&id, "10.0.0.42:22".to_string());
    registry.set_status(&id, SessionStatus::Connected);

    assert_eq!(registry.status(&id), Some(SessionStatus::Connected));
    let record = registry.remove(&id).unwrap();
    assert_eq!(record.worker_addr.as_deref(), Some("10.0.0.42:22"));
}

#[test]
fn updates_to_unknown_sessions_are_ignored() {
    let registry = registry();
    let id = SessionId::new();
    registry.set_status(&id, SessionStatus::Closed);
    registry.set_worker_addr(&id, "10.0.0.1:22".to_string());
    assert_eq!(registry.count(), 0);
    assert_eq!(registry.status(&id), None);
}

#[test]
fn registry_is_shared_across_clones() {
    let registry = registry();
    let clone = registry.clone();
    registry.insert(SessionRecord::new(SessionId::new(), ()));
    assert_eq!(clone.count(), 1);
}
