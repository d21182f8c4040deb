// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `WorkerRecord` resource: spec, status, phases, conditions.

use k8s_openapi::api::core::v1::ResourceRequirements;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Desired state of one remote-builder worker.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "nixherd.io",
    version = "v1alpha1",
    kind = "WorkerRecord",
    plural = "workerrecords",
    namespaced,
    status = "WorkerRecordStatus",
    shortname = "wr",
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Pod","type":"string","jsonPath":".status.podName"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRecordSpec {
    /// Session this worker is bound to; also the pod-name suffix, so it
    /// must be a valid RFC-1123 DNS label.
    pub session_id: String,

    /// Builder image override; the controller default applies when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    /// Activity deadline applied to the worker pod, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<BTreeMap<String, String>>,
}

/// Observed state, written only by the controller.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRecordStatus {
    #[serde(default)]
    pub phase: WorkerPhase,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pod_name: String,

    /// Non-empty exactly while the phase is Running.
    #[serde(default, rename = "podIP", skip_serializing_if = "String::is_empty")]
    pub pod_ip: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<Time>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<Time>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<WorkerCondition>,
}

impl WorkerRecordStatus {
    /// Insert or update a condition. The transition time only moves when
    /// the condition's status value actually changes.
    pub fn set_condition(
        &mut self,
        type_: WorkerConditionType,
        status: ConditionStatus,
        reason: &str,
        message: &str,
        now: Time,
    ) {
        match self.conditions.iter_mut().find(|c| c.type_ == type_) {
            Some(existing) => {
                if existing.status != status {
                    existing.last_transition_time = now;
                }
                existing.status = status;
                existing.reason = reason.to_string();
                existing.message = message.to_string();
            }
            None => self.conditions.push(WorkerCondition {
                type_,
                status,
                last_transition_time: now,
                reason: reason.to_string(),
                message: message.to_string(),
            }),
        }
    }
}

/// Phase of a worker record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum WorkerPhase {
    /// Record exists, pod not yet requested.
    #[default]
    Pending,
    /// Pod requested, not yet routable.
    Creating,
    /// Pod running with an address; ready for connections.
    Running,
    /// Pod exited successfully.
    Completed,
    /// Pod failed, disappeared, or the record is invalid.
    Failed,
}

impl WorkerPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for WorkerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pending => "Pending",
            Self::Creating => "Creating",
            Self::Running => "Running",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        };
        f.write_str(name)
    }
}

/// One observed condition of a worker record.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkerCondition {
    #[serde(rename = "type")]
    pub type_: WorkerConditionType,

    pub status: ConditionStatus,

    pub last_transition_time: Time,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum WorkerConditionType {
    /// The builder pod is routable.
    PodReady,
    Completed,
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

#[cfg(test)]
#[path = "record_tests.rs"]
mod tests;
