// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unit tests for WorkerRecord types

use super::*;
use k8s_openapi::chrono::{TimeZone, Utc};

fn at(secs: i64) -> Time {
    Time(Utc.timestamp_opt(secs, 0).unwrap())
}

#[test]
fn absent_phase_reads_as_pending() {
    let status: WorkerRecordStatus = serde_json::from_str("{}").unwrap();
    assert_eq!(status.phase, WorkerPhase::Pending);
}

#[test]
fn terminal_phases() {
    assert!(WorkerPhase::Completed.is_terminal());
    assert!(WorkerPhase::Failed.is_terminal());
    assert!(!WorkerPhase::Pending.is_terminal());
    assert!(!WorkerPhase::Creating.is_terminal());
    assert!(!WorkerPhase::Running.is_terminal());
}

#[test]
fn status_serializes_with_kubernetes_field_names() {
    let status = WorkerRecordStatus {
        phase: WorkerPhase::Running,
        pod_name: "nix-builder-s1".into(),
        pod_ip: "10.0.0.42".into(),
        start_time: Some(at(100)),
        ..Default::default()
    };
    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(json["phase"], "Running");
    assert_eq!(json["podName"], "nix-builder-s1");
    assert_eq!(json["podIP"], "10.0.0.42");
    assert!(json.get("startTime").is_some());
    assert!(json.get("completionTime").is_none());
}

#[test]
fn spec_serializes_with_kubernetes_field_names() {
    let spec = WorkerRecordSpec { session_id: "s1".into(), ..Default::default() };
    let json = serde_json::to_value(&spec).unwrap();
    assert_eq!(json["sessionId"], "s1");
    // Optional fields stay off the wire when unset.
    assert!(json.get("image").is_none());
    assert!(json.get("timeoutSeconds").is_none());
}

#[test]
fn set_condition_inserts_then_updates_in_place() {
    let mut status = WorkerRecordStatus::default();
    status.set_condition(
        WorkerConditionType::PodReady,
        ConditionStatus::False,
        "PodCreating",
        "waiting for pod",
        at(100),
    );
    status.set_condition(
        WorkerConditionType::PodReady,
        ConditionStatus::True,
        "PodRunning",
        "pod is routable",
        at(200),
    );

    assert_eq!(status.conditions.len(), 1);
    let cond = &status.conditions[0];
    assert_eq!(cond.status, ConditionStatus::True);
    assert_eq!(cond.reason, "PodRunning");
    assert_eq!(cond.last_transition_time, at(200));
}

#[test]
fn set_condition_keeps_transition_time_when_status_is_unchanged() {
    let mut status = WorkerRecordStatus::default();
    status.set_condition(
        WorkerConditionType::PodReady,
        ConditionStatus::True,
        "PodRunning",
        "pod is routable",
        at(100),
    );
    status.set_condition(
        WorkerConditionType::PodReady,
        ConditionStatus::True,
        "PodRunning",
        "still routable",
        at(500),
    );

    let cond = &status.conditions[0];
    assert_eq!(cond.last_transition_time, at(100));
    assert_eq!(cond.message, "still routable");
}

#[test]
fn distinct_condition_types_do_not_collide() {
    let mut status = WorkerRecordStatus::default();
    status.set_condition(WorkerConditionType::PodReady, ConditionStatus::True, "r", "m", at(1));
    status.set_condition(WorkerConditionType::Failed, ConditionStatus::True, "r", "m", at(2));
    assert_eq!(status.conditions.len(), 2);
}
