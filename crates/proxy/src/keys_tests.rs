// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unit tests for key material handling

use super::*;
use std::io::Write;

#[test]
fn generated_keys_are_distinct() {
    let a = generate_key().unwrap();
    let b = generate_key().unwrap();
    assert_ne!(a.public_key_base64(), b.public_key_base64());
}

#[test]
fn authorized_keys_line_is_a_single_terminated_line() {
    let key = generate_key().unwrap();
    let line = authorized_keys_line(&key).unwrap();

    assert!(line.starts_with("ssh-ed25519 "), "unexpected line: {line}");
    assert!(line.ends_with('\n'));
    assert_eq!(line.trim_end().lines().count(), 1);
    assert!(line.trim_end().split(' ').nth(1).is_some_and(|b64| !b64.is_empty()));
}

#[test]
fn missing_path_yields_an_ephemeral_host_key() {
    let key = load_or_generate_host_key(None).unwrap();
    assert_eq!(key.clone_public_key().unwrap().name(), "ssh-ed25519");
}

#[test]
fn host_key_round_trips_through_disk() {
    let key = generate_key().unwrap();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    let mut pem = Vec::new();
    russh_keys::encode_pkcs8_pem(&key, &mut pem).unwrap();
    file.write_all(&pem).unwrap();
    file.flush().unwrap();

    let loaded = load_or_generate_host_key(Some(file.path())).unwrap();
    assert_eq!(loaded.public_key_base64(), key.public_key_base64());
}

#[test]
fn unreadable_host_key_path_is_an_error() {
    let result = load_or_generate_host_key(Some(std::path::Path::new("/nonexistent/host_key")));
    assert!(result.is_err());
}
