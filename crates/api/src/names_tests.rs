// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unit tests for deterministic naming

use super::*;

#[test]
fn record_and_pod_names_embed_the_session_id() {
    assert_eq!(record_name("abc-123"), "build-abc-123");
    assert_eq!(pod_name("abc-123"), "nix-builder-abc-123");
}

#[test]
fn same_session_always_maps_to_the_same_pod_name() {
    assert_eq!(pod_name("s1"), pod_name("s1"));
    assert_ne!(pod_name("s1"), pod_name("s2"));
}

#[test]
fn pod_labels_carry_session_and_record() {
    let labels = pod_labels("s1", "build-s1");
    assert_eq!(labels[APP_LABEL], APP_NAME);
    assert_eq!(labels[SESSION_ID_LABEL], "s1");
    assert_eq!(labels[BUILD_REQUEST_LABEL], "build-s1");
    assert_eq!(labels.len(), 3);
}
