// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker-record lifecycle as seen from the proxy: create at session
//! start, poll until routable, delete on teardown.

use crate::error::ProxyError;
use kube::api::{Api, DeleteParams, PostParams};
use kube::Client;
use nh_api::{names, WorkerPhase, WorkerRecord, WorkerRecordSpec};
use nh_core::SessionId;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Wall-clock ceiling on waiting for a worker to become routable.
const WORKER_READY_TIMEOUT: Duration = Duration::from_secs(120);

/// Poll cadence against the record store.
const WORKER_READY_POLL: Duration = Duration::from_secs(1);

/// Deadline for record deletion at teardown. Runs under its own timer;
/// the ambient token may already be cancelled by the time cleanup fires.
const RECORD_DELETE_TIMEOUT: Duration = Duration::from_secs(5);

/// Typed access to worker records in one namespace.
#[derive(Clone)]
pub struct RecordClient {
    api: Api<WorkerRecord>,
}

impl RecordClient {
    pub fn new(client: Client, namespace: &str) -> Self {
        Self { api: Api::namespaced(client, namespace) }
    }

    /// Create the record that asks the controller for a worker.
    pub async fn create(&self, session_id: &SessionId) -> Result<(), ProxyError> {
        let session = session_id.to_string();
        let record = WorkerRecord::new(
            &names::record_name(&session),
            WorkerRecordSpec { session_id: session.clone(), ..Default::default() },
        );
        self.api.create(&PostParams::default(), &record).await?;
        tracing::info!(session_id = %session, "created worker record");
        Ok(())
    }

    /// Poll until the record reports a routable worker and return its IP.
    ///
    /// Missing records and read errors are retried silently; only the
    /// 2-minute ceiling or ambient cancellation end the wait.
    pub async fn await_routable(
        &self,
        session_id: &SessionId,
        cancel: &CancellationToken,
    ) -> Result<String, ProxyError> {
        let name = names::record_name(&session_id.to_string());
        let deadline = tokio::time::Instant::now() + WORKER_READY_TIMEOUT;
        let mut tick = tokio::time::interval(WORKER_READY_POLL);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Err(ProxyError::Cancelled),
                _ = tokio::time::sleep_until(deadline) => return Err(ProxyError::WorkerReadyTimeout),
                _ = tick.tick() => {
                    match self.api.get(&name).await {
                        Ok(record) => {
                            if let Some(status) = record.status {
                                if status.phase == WorkerPhase::Running && !status.pod_ip.is_empty() {
                                    tracing::info!(
                                        session_id = %session_id,
                                        pod_ip = %status.pod_ip,
                                        "builder pod ready"
                                    );
                                    return Ok(status.pod_ip);
                                }
                            }
                        }
                        Err(error) => {
                            tracing::debug!(record = %name, %error, "worker record not readable yet");
                        }
                    }
                }
            }
        }
    }

    /// Delete the record, logging rather than failing: the owner-reference
    /// chain is the backstop if this is lost.
    pub async fn delete(&self, session_id: &SessionId) {
        let name = names::record_name(&session_id.to_string());
        let params = DeleteParams::default();
        let delete = self.api.delete(&name, &params);
        match tokio::time::timeout(RECORD_DELETE_TIMEOUT, delete).await {
            Ok(Ok(_)) => tracing::debug!(record = %name, "deleted worker record"),
            Ok(Err(kube::Error::Api(response))) if response.code == 404 => {}
            Ok(Err(error)) => {
                tracing::error!(record = %name, %error, "failed to clean up worker record");
            }
            Err(_) => tracing::error!(record = %name, "timed out deleting worker record"),
        }
    }
}
