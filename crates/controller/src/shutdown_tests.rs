// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unit tests for shutdown phase selection

use super::*;

#[test]
fn pending_and_creating_are_interrupted() {
    assert!(interrupted_by_shutdown(WorkerPhase::Pending));
    assert!(interrupted_by_shutdown(WorkerPhase::Creating));
}

#[test]
fn running_and_terminal_records_are_left_alone() {
    assert!(!interrupted_by_shutdown(WorkerPhase::Running));
    assert!(!interrupted_by_shutdown(WorkerPhase::Completed));
    assert!(!interrupted_by_shutdown(WorkerPhase::Failed));
}
