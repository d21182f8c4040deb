// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unit tests for the worker state machine

use super::*;
use k8s_openapi::api::core::v1::PodStatus;
use k8s_openapi::chrono::TimeZone;

fn pod_with(phase: &str, ip: Option<&str>, message: Option<&str>) -> Pod {
    Pod {
        status: Some(PodStatus {
            phase: Some(phase.to_string()),
            pod_ip: ip.map(String::from),
            message: message.map(String::from),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

#[test]
fn classify_covers_every_pod_phase() {
    assert_eq!(classify_pod(&pod_with("Pending", None, None)), ObservedPod::Pending);
    assert_eq!(
        classify_pod(&pod_with("Running", Some("10.0.0.42"), None)),
        ObservedPod::Running { pod_ip: "10.0.0.42".into() }
    );
    assert_eq!(classify_pod(&pod_with("Succeeded", None, None)), ObservedPod::Succeeded);
    assert_eq!(
        classify_pod(&pod_with("Failed", None, Some("oom"))),
        ObservedPod::Failed { message: "oom".into() }
    );
    assert_eq!(classify_pod(&pod_with("Unknown", None, None)), ObservedPod::Unknown);
    assert_eq!(classify_pod(&Pod::default()), ObservedPod::Unknown);
}

#[test]
fn pending_creates_when_no_pod_exists() {
    assert_eq!(pending_step(&ObservedPod::Missing), PendingStep::Create);
}

#[test]
fn pending_adopts_any_existing_pod() {
    for pod in [
        ObservedPod::Pending,
        ObservedPod::Running { pod_ip: "10.0.0.1".into() },
        ObservedPod::Failed { message: String::new() },
    ] {
        assert_eq!(pending_step(&pod), PendingStep::Adopt);
    }
}

#[test]
fn creating_rolls_back_when_pod_vanishes() {
    assert_eq!(creating_step(&ObservedPod::Missing), CreatingStep::Rollback);
}

#[test]
fn creating_marks_running_only_with_an_address() {
    assert_eq!(
        creating_step(&ObservedPod::Running { pod_ip: "10.0.0.42".into() }),
        CreatingStep::MarkRunning { pod_ip: "10.0.0.42".into() }
    );
    // Running pod with no IP yet is not routable.
    assert_eq!(creating_step(&ObservedPod::Running { pod_ip: String::new() }), CreatingStep::Poll);
}

#[test]
fn creating_surfaces_pod_failure() {
    let step = creating_step(&ObservedPod::Failed { message: "image pull".into() });
    assert_eq!(step, CreatingStep::Fail { message: "Builder pod failed: image pull".into() });
}

#[test]
fn creating_polls_while_pod_is_scheduled() {
    assert_eq!(creating_step(&ObservedPod::Pending), CreatingStep::Poll);
}

#[test]
fn running_fails_when_pod_disappears() {
    assert_eq!(
        running_step(&ObservedPod::Missing),
        RunningStep::Fail { message: "Build failed - pod was deleted".into() }
    );
}

#[test]
fn running_completes_on_pod_success() {
    assert_eq!(running_step(&ObservedPod::Succeeded), RunningStep::Complete);
}

#[test]
fn running_fails_on_pod_failure() {
    assert_eq!(
        running_step(&ObservedPod::Failed { message: "killed".into() }),
        RunningStep::Fail { message: "Build failed: killed".into() }
    );
}

#[test]
fn running_keeps_polling_while_pod_runs() {
    assert_eq!(
        running_step(&ObservedPod::Running { pod_ip: "10.0.0.42".into() }),
        RunningStep::Poll
    );
}

#[test]
fn terminal_waits_out_the_gc_window() {
    let completed = Time(at(1_000));
    let step = terminal_step(Some(&completed), &ObservedPod::Succeeded, at(1_000 + 60));
    assert_eq!(step, TerminalStep::Wait(TERMINAL_GC_AFTER - Duration::from_secs(60)));
}

#[test]
fn terminal_reaps_a_lingering_pod_after_the_window() {
    let completed = Time(at(1_000));
    let now = at(1_000 + 301);
    assert_eq!(terminal_step(Some(&completed), &ObservedPod::Succeeded, now), TerminalStep::DeletePod);
}

#[test]
fn terminal_settles_once_the_pod_is_gone() {
    let completed = Time(at(1_000));
    let now = at(1_000 + 301);
    assert_eq!(terminal_step(Some(&completed), &ObservedPod::Missing, now), TerminalStep::Settle);
}

#[test]
fn terminal_without_completion_time_settles() {
    assert_eq!(terminal_step(None, &ObservedPod::Missing, at(0)), TerminalStep::Settle);
}

#[test]
fn replaying_an_observation_yields_the_same_step() {
    // Level-triggered loops must converge when fed the same state twice.
    let pod = ObservedPod::Running { pod_ip: "10.0.0.42".into() };
    assert_eq!(pending_step(&pod), pending_step(&pod));
    assert_eq!(creating_step(&pod), creating_step(&pod));
    assert_eq!(running_step(&pod), running_step(&pod));
}
