// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The level-triggered reconcile loop for worker records.
//!
//! Every invocation re-reads the record and its pod, decides one
//! transition through the pure layer in [`crate::transitions`], applies
//! the side effect, and writes status as its last action. No state is
//! carried between invocations.

use crate::error::Error;
use crate::pod::{build_worker_pod, effective_image, PodParams};
use crate::transitions::{
    self, CreatingStep, PendingStep, RunningStep, TerminalStep, CREATING_POLL, PENDING_REQUEUE,
    RUNNING_POLL, TERMINAL_GC_AFTER,
};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use k8s_openapi::chrono::Utc;
use kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams};
use kube::runtime::controller::{Action, Controller};
use kube::runtime::finalizer::{finalizer, Event as FinalizerEvent};
use kube::runtime::watcher;
use kube::{Client, Resource, ResourceExt};
use nh_api::{
    names, ConditionStatus, WorkerConditionType, WorkerPhase, WorkerRecord, WorkerRecordStatus,
};
use nh_core::validate_session_id;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Shared reconciler configuration.
pub struct Context {
    pub client: Client,
    /// Image for builder pods when the record does not override it.
    pub builder_image: String,
    /// SSH port exposed by builder pods.
    pub remote_port: i32,
    /// Optional ConfigMap with nix.conf for the builders.
    pub nix_config: Option<String>,
    /// Secret carrying the proxy's authorized key.
    pub ssh_key_secret: String,
}

/// Run the controller until `shutdown` fires and in-flight reconciles drain.
pub async fn run(ctx: Context, shutdown: CancellationToken) {
    let records = Api::<WorkerRecord>::all(ctx.client.clone());
    let pods = Api::<Pod>::all(ctx.client.clone());

    Controller::new(records, watcher::Config::default())
        .owns(pods, watcher::Config::default())
        .graceful_shutdown_on(shutdown.cancelled_owned())
        .run(reconcile, error_policy, Arc::new(ctx))
        .for_each(|result| async {
            match result {
                Ok((record, _)) => tracing::debug!(record = %record.name, "reconciled"),
                Err(error) => tracing::warn!(error = %error, "reconciliation failed"),
            }
        })
        .await;
}

async fn reconcile(record: Arc<WorkerRecord>, ctx: Arc<Context>) -> Result<Action, Error> {
    let namespace = record.namespace().unwrap_or_else(|| "default".to_string());
    let records = Api::<WorkerRecord>::namespaced(ctx.client.clone(), &namespace);

    // Invalid input must not loop. Validation only gates live records: a
    // deleting record still runs its cleanup so the finalizer can clear.
    if record.meta().deletion_timestamp.is_none() {
        if let Err(err) = validate_session_id(&record.spec.session_id) {
            return fail_validation(&records, &record, &err.to_string()).await;
        }
    }

    finalizer(&records, names::CLEANUP_FINALIZER, record, |event| async {
        match event {
            FinalizerEvent::Apply(record) => apply(record, &ctx, &namespace).await,
            FinalizerEvent::Cleanup(record) => cleanup(record, &ctx, &namespace).await,
        }
    })
    .await
    .map_err(|error| Error::Finalizer(Box::new(error)))
}

fn error_policy(record: Arc<WorkerRecord>, error: &Error, _ctx: Arc<Context>) -> Action {
    tracing::warn!(record = %record.name_any(), %error, "reconcile failed, requeueing");
    Action::requeue(Duration::from_secs(2))
}

/// Drive a live record one step through the state machine.
async fn apply(record: Arc<WorkerRecord>, ctx: &Context, namespace: &str) -> Result<Action, Error> {
    let records = Api::<WorkerRecord>::namespaced(ctx.client.clone(), namespace);
    let pods = Api::<Pod>::namespaced(ctx.client.clone(), namespace);
    let status = record.status.clone().unwrap_or_default();

    tracing::info!(
        session_id = %record.spec.session_id,
        phase = %status.phase,
        "reconciling worker record"
    );

    match status.phase {
        WorkerPhase::Pending => handle_pending(&record, status, ctx, &records, &pods).await,
        WorkerPhase::Creating => handle_creating(&record, status, &records, &pods).await,
        WorkerPhase::Running => handle_running(&record, status, &records, &pods).await,
        WorkerPhase::Completed | WorkerPhase::Failed => {
            handle_terminal(&record, &status, &pods).await
        }
    }
}

async fn handle_pending(
    record: &WorkerRecord,
    mut status: WorkerRecordStatus,
    ctx: &Context,
    records: &Api<WorkerRecord>,
    pods: &Api<Pod>,
) -> Result<Action, Error> {
    let session_id = &record.spec.session_id;
    let pod_name = names::pod_name(session_id);
    let observed = observe_pod(pods, &pod_name).await?;

    match transitions::pending_step(&observed) {
        PendingStep::Adopt => {
            tracing::info!(%session_id, %pod_name, "builder pod already exists, adopting");
            status.message = "Builder pod exists".to_string();
        }
        PendingStep::Create => {
            tracing::info!(%session_id, %pod_name, "creating builder pod");
            let pod = build_worker_pod(&PodParams {
                record,
                image: effective_image(record, &ctx.builder_image),
                remote_port: ctx.remote_port,
                ssh_key_secret: &ctx.ssh_key_secret,
                nix_config: ctx.nix_config.as_deref(),
            });
            match pods.create(&PostParams::default(), &pod).await {
                Ok(_) => {}
                // A concurrent reconcile won the race; the pod is still ours.
                Err(kube::Error::Api(response)) if response.code == 409 => {
                    tracing::debug!(%pod_name, "pod already exists, adopting");
                }
                Err(error) => {
                    tracing::error!(%session_id, %error, "failed to create builder pod");
                    return Err(error.into());
                }
            }
            status.message = "Builder pod created".to_string();
        }
    }

    let now = Time(Utc::now());
    status.phase = WorkerPhase::Creating;
    status.pod_name = pod_name;
    if status.start_time.is_none() {
        status.start_time = Some(now.clone());
    }
    status.set_condition(
        WorkerConditionType::PodReady,
        ConditionStatus::False,
        "PodCreating",
        "waiting for the builder pod to become routable",
        now,
    );
    write_status(records, &record.name_any(), &status).await?;
    Ok(Action::requeue(PENDING_REQUEUE))
}

async fn handle_creating(
    record: &WorkerRecord,
    mut status: WorkerRecordStatus,
    records: &Api<WorkerRecord>,
    pods: &Api<Pod>,
) -> Result<Action, Error> {
    let session_id = &record.spec.session_id;
    let pod_name = tracked_pod_name(record, &status);
    let observed = observe_pod(pods, &pod_name).await?;

    match transitions::creating_step(&observed) {
        CreatingStep::Rollback => {
            tracing::warn!(%session_id, %pod_name, "builder pod was deleted, recreating");
            let now = Time(Utc::now());
            status.phase = WorkerPhase::Pending;
            status.pod_name = String::new();
            status.pod_ip = String::new();
            status.message = "Builder pod was deleted, recreating".to_string();
            status.set_condition(
                WorkerConditionType::PodReady,
                ConditionStatus::False,
                "PodDeleted",
                "builder pod disappeared before becoming routable",
                now,
            );
            write_status(records, &record.name_any(), &status).await?;
            Ok(Action::requeue(CREATING_POLL))
        }
        CreatingStep::MarkRunning { pod_ip } => {
            tracing::info!(%session_id, %pod_ip, "builder pod ready");
            let now = Time(Utc::now());
            status.phase = WorkerPhase::Running;
            status.pod_ip = pod_ip;
            status.message = "Builder pod ready for connections".to_string();
            status.set_condition(
                WorkerConditionType::PodReady,
                ConditionStatus::True,
                "PodRunning",
                "builder pod is routable",
                now,
            );
            write_status(records, &record.name_any(), &status).await?;
            Ok(Action::requeue(RUNNING_POLL))
        }
        CreatingStep::Fail { message } => {
            mark_failed(records, record, status, message, "PodFailed").await
        }
        CreatingStep::Poll => Ok(Action::requeue(CREATING_POLL)),
    }
}

async fn handle_running(
    record: &WorkerRecord,
    mut status: WorkerRecordStatus,
    records: &Api<WorkerRecord>,
    pods: &Api<Pod>,
) -> Result<Action, Error> {
    let session_id = &record.spec.session_id;
    let pod_name = tracked_pod_name(record, &status);
    let observed = observe_pod(pods, &pod_name).await?;

    match transitions::running_step(&observed) {
        RunningStep::Complete => {
            tracing::info!(%session_id, "build completed");
            let now = Time(Utc::now());
            status.phase = WorkerPhase::Completed;
            if status.completion_time.is_none() {
                status.completion_time = Some(now.clone());
            }
            status.message = "Build completed successfully".to_string();
            status.set_condition(
                WorkerConditionType::Completed,
                ConditionStatus::True,
                "BuildSucceeded",
                "builder pod exited successfully",
                now.clone(),
            );
            status.set_condition(
                WorkerConditionType::PodReady,
                ConditionStatus::False,
                "BuildSucceeded",
                "builder pod exited",
                now,
            );
            write_status(records, &record.name_any(), &status).await?;
            Ok(Action::requeue(TERMINAL_GC_AFTER))
        }
        RunningStep::Fail { message } => {
            tracing::warn!(%session_id, %message, "build failed");
            mark_failed(records, record, status, message, "PodFailed").await
        }
        RunningStep::Poll => Ok(Action::requeue(RUNNING_POLL)),
    }
}

async fn handle_terminal(
    record: &WorkerRecord,
    status: &WorkerRecordStatus,
    pods: &Api<Pod>,
) -> Result<Action, Error> {
    let pod_name = tracked_pod_name(record, status);
    let observed = observe_pod(pods, &pod_name).await?;

    match transitions::terminal_step(status.completion_time.as_ref(), &observed, Utc::now()) {
        TerminalStep::DeletePod => {
            tracing::info!(%pod_name, "cleaning up pod of finished record");
            delete_pod(pods, &pod_name).await?;
            Ok(Action::await_change())
        }
        TerminalStep::Wait(delay) => Ok(Action::requeue(delay)),
        TerminalStep::Settle => Ok(Action::await_change()),
    }
}

/// Finalizer cleanup: the pod must be gone before the marker comes off.
async fn cleanup(
    record: Arc<WorkerRecord>,
    ctx: &Context,
    namespace: &str,
) -> Result<Action, Error> {
    let pods = Api::<Pod>::namespaced(ctx.client.clone(), namespace);
    let status = record.status.clone().unwrap_or_default();
    let pod_name = tracked_pod_name(&record, &status);

    tracing::info!(session_id = %record.spec.session_id, %pod_name, "cleaning up worker record");
    delete_pod(&pods, &pod_name).await?;
    Ok(Action::await_change())
}

/// Fail a record whose sessionId does not validate. Never requeues.
async fn fail_validation(
    records: &Api<WorkerRecord>,
    record: &WorkerRecord,
    reason: &str,
) -> Result<Action, Error> {
    let message = format!("Invalid sessionId: {reason}");
    tracing::error!(record = %record.name_any(), %message, "rejecting worker record");

    let mut status = record.status.clone().unwrap_or_default();
    // Converges on replay: write only when something would change.
    if status.phase != WorkerPhase::Failed || status.message != message {
        let now = Time(Utc::now());
        status.phase = WorkerPhase::Failed;
        status.message = message.clone();
        if status.completion_time.is_none() {
            status.completion_time = Some(now.clone());
        }
        status.set_condition(
            WorkerConditionType::Failed,
            ConditionStatus::True,
            "InvalidSessionId",
            &message,
            now,
        );
        write_status(records, &record.name_any(), &status).await?;
    }
    Ok(Action::await_change())
}

async fn mark_failed(
    records: &Api<WorkerRecord>,
    record: &WorkerRecord,
    mut status: WorkerRecordStatus,
    message: String,
    reason: &str,
) -> Result<Action, Error> {
    let now = Time(Utc::now());
    status.phase = WorkerPhase::Failed;
    if status.completion_time.is_none() {
        status.completion_time = Some(now.clone());
    }
    status.message = message.clone();
    status.set_condition(WorkerConditionType::Failed, ConditionStatus::True, reason, &message, now.clone());
    status.set_condition(WorkerConditionType::PodReady, ConditionStatus::False, reason, &message, now);
    write_status(records, &record.name_any(), &status).await?;
    Ok(Action::requeue(TERMINAL_GC_AFTER))
}

/// The pod a record is tracking: `status.podName` once set, the
/// deterministic name otherwise.
fn tracked_pod_name(record: &WorkerRecord, status: &WorkerRecordStatus) -> String {
    if status.pod_name.is_empty() {
        names::pod_name(&record.spec.session_id)
    } else {
        status.pod_name.clone()
    }
}

async fn observe_pod(pods: &Api<Pod>, name: &str) -> Result<transitions::ObservedPod, Error> {
    match pods.get(name).await {
        Ok(pod) => Ok(transitions::classify_pod(&pod)),
        Err(kube::Error::Api(response)) if response.code == 404 => {
            Ok(transitions::ObservedPod::Missing)
        }
        Err(error) => Err(error.into()),
    }
}

async fn delete_pod(pods: &Api<Pod>, name: &str) -> Result<(), Error> {
    match pods.delete(name, &DeleteParams::default()).await {
        Ok(_) => {
            tracing::info!(pod = %name, "deleted builder pod");
            Ok(())
        }
        Err(kube::Error::Api(response)) if response.code == 404 => Ok(()),
        Err(error) => {
            tracing::error!(pod = %name, %error, "failed to delete builder pod");
            Err(error.into())
        }
    }
}

/// The status subresource write every transition funnels through.
pub(crate) async fn write_status(
    records: &Api<WorkerRecord>,
    name: &str,
    status: &WorkerRecordStatus,
) -> Result<(), Error> {
    let patch = serde_json::json!({
        "apiVersion": "nixherd.io/v1alpha1",
        "kind": "WorkerRecord",
        "status": status,
    });
    records.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch)).await?;
    Ok(())
}
