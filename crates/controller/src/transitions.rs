// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pure transition decisions for the worker state machine.
//!
//! Each function maps what the reconciler observed to the single step it
//! should take, with no side effects: replaying the same observation any
//! number of times yields the same step. The reconciler applies the step
//! and writes status last.

use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use k8s_openapi::chrono::{DateTime, Utc};
use std::time::Duration;

/// Delay before re-checking a record that just left Pending.
pub const PENDING_REQUEUE: Duration = Duration::from_secs(5);

/// Poll interval while waiting for the pod to become routable.
pub const CREATING_POLL: Duration = Duration::from_secs(2);

/// Poll interval while the build runs.
pub const RUNNING_POLL: Duration = Duration::from_secs(10);

/// Terminal records keep their pod around this long before it is reaped.
pub const TERMINAL_GC_AFTER: Duration = Duration::from_secs(5 * 60);

/// What the reconciler observed about the builder pod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObservedPod {
    Missing,
    Pending,
    Running { pod_ip: String },
    Succeeded,
    Failed { message: String },
    Unknown,
}

impl ObservedPod {
    pub fn exists(&self) -> bool {
        !matches!(self, Self::Missing)
    }
}

/// Classify a pod the API server returned.
pub fn classify_pod(pod: &Pod) -> ObservedPod {
    let status = pod.status.as_ref();
    let phase = status.and_then(|s| s.phase.as_deref()).unwrap_or("");
    match phase {
        "Pending" => ObservedPod::Pending,
        "Running" => ObservedPod::Running {
            pod_ip: status.and_then(|s| s.pod_ip.clone()).unwrap_or_default(),
        },
        "Succeeded" => ObservedPod::Succeeded,
        "Failed" => ObservedPod::Failed {
            message: status.and_then(|s| s.message.clone()).unwrap_or_default(),
        },
        _ => ObservedPod::Unknown,
    }
}

/// Step out of the Pending (or empty) phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingStep {
    /// A pod for this session already exists: take it over.
    Adopt,
    /// No pod yet: create one.
    Create,
}

/// Pending phase: ensure a pod exists. Deterministic naming means a found
/// pod is ours, whatever state it is in.
pub fn pending_step(pod: &ObservedPod) -> PendingStep {
    if pod.exists() {
        PendingStep::Adopt
    } else {
        PendingStep::Create
    }
}

/// Step out of the Creating phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreatingStep {
    /// The pod vanished mid-creation: clear podName/podIP, back to Pending.
    Rollback,
    /// The pod is routable: record its address.
    MarkRunning { pod_ip: String },
    Fail { message: String },
    /// Not routable yet; look again shortly.
    Poll,
}

/// Creating phase: wait for the pod to become routable.
pub fn creating_step(pod: &ObservedPod) -> CreatingStep {
    match pod {
        ObservedPod::Missing => CreatingStep::Rollback,
        ObservedPod::Running { pod_ip } if !pod_ip.is_empty() => {
            CreatingStep::MarkRunning { pod_ip: pod_ip.clone() }
        }
        ObservedPod::Failed { message } => {
            CreatingStep::Fail { message: format!("Builder pod failed: {message}") }
        }
        // Scheduled-but-addressless pods and anything indeterminate.
        _ => CreatingStep::Poll,
    }
}

/// Step out of the Running phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunningStep {
    Complete,
    Fail { message: String },
    Poll,
}

/// Running phase: watch for the build to finish or the pod to vanish.
pub fn running_step(pod: &ObservedPod) -> RunningStep {
    match pod {
        ObservedPod::Missing => {
            RunningStep::Fail { message: "Build failed - pod was deleted".to_string() }
        }
        ObservedPod::Succeeded => RunningStep::Complete,
        ObservedPod::Failed { message } => {
            RunningStep::Fail { message: format!("Build failed: {message}") }
        }
        _ => RunningStep::Poll,
    }
}

/// Step for a terminal record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalStep {
    /// Past the GC deadline with the pod still around.
    DeletePod,
    /// Inside the GC window; come back when it closes.
    Wait(Duration),
    /// Nothing left to do.
    Settle,
}

/// Terminal phases: reap the pod once the record has been done for a while.
pub fn terminal_step(
    completion_time: Option<&Time>,
    pod: &ObservedPod,
    now: DateTime<Utc>,
) -> TerminalStep {
    // Terminal records always carry a completion time; a record without one
    // has nothing to age against, so leave it alone.
    let Some(completed) = completion_time else {
        return TerminalStep::Settle;
    };

    let age = now.signed_duration_since(completed.0).to_std().unwrap_or_default();
    if age < TERMINAL_GC_AFTER {
        return TerminalStep::Wait(TERMINAL_GC_AFTER - age);
    }
    if pod.exists() {
        TerminalStep::DeletePod
    } else {
        TerminalStep::Settle
    }
}

#[cfg(test)]
#[path = "transitions_tests.rs"]
mod tests;
