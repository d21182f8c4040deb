// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Graceful-shutdown cleanup: fail records the controller was still
//! driving so no client keeps waiting on a worker that will never come.

use crate::error::Error;
use crate::reconciler::write_status;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use k8s_openapi::chrono::Utc;
use kube::api::{Api, ListParams};
use kube::{Client, ResourceExt};
use nh_api::{ConditionStatus, WorkerConditionType, WorkerPhase, WorkerRecord};

/// Message written to records interrupted by shutdown.
pub const SHUTDOWN_MESSAGE: &str = "Controller shutdown during processing";

/// Whether a record in this phase is abandoned by a controller shutdown.
///
/// Running pods keep serving their session without us; terminal records
/// are already settled. Only records still waiting on the controller to
/// make progress are failed.
pub fn interrupted_by_shutdown(phase: WorkerPhase) -> bool {
    matches!(phase, WorkerPhase::Pending | WorkerPhase::Creating)
}

/// Mark every Pending/Creating record Failed. Update errors are logged
/// and skipped; shutdown proceeds regardless.
pub async fn fail_inflight_records(client: Client) -> Result<usize, Error> {
    let all = Api::<WorkerRecord>::all(client.clone());
    let records = all.list(&ListParams::default()).await?;

    let mut updated = 0;
    for record in records {
        let mut status = record.status.clone().unwrap_or_default();
        if !interrupted_by_shutdown(status.phase) {
            continue;
        }

        let now = Time(Utc::now());
        status.phase = WorkerPhase::Failed;
        status.message = SHUTDOWN_MESSAGE.to_string();
        if status.completion_time.is_none() {
            status.completion_time = Some(now.clone());
        }
        status.set_condition(
            WorkerConditionType::Failed,
            ConditionStatus::True,
            "ControllerShutdown",
            SHUTDOWN_MESSAGE,
            now,
        );

        let namespace = record.namespace().unwrap_or_else(|| "default".to_string());
        let api = Api::<WorkerRecord>::namespaced(client.clone(), &namespace);
        match write_status(&api, &record.name_any(), &status).await {
            Ok(()) => updated += 1,
            Err(error) => {
                tracing::error!(record = %record.name_any(), %error, "failed to update record during shutdown");
            }
        }
    }

    tracing::info!(updated, "completed graceful shutdown cleanup");
    Ok(updated)
}

#[cfg(test)]
#[path = "shutdown_tests.rs"]
mod tests;
