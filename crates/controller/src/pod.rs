// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Builder pod construction.

use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, ContainerPort, Pod, PodSpec, SecretVolumeSource, Volume,
    VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Resource;
use nh_api::{names, WorkerRecord};

/// Where the worker's sshd expects the proxy's public key. The builder
/// image runs sshd as the `nixbld` user.
const AUTHORIZED_KEYS_PATH: &str = "/home/nixbld/.ssh/authorized_keys";

/// Parameters for building a worker pod.
pub struct PodParams<'a> {
    pub record: &'a WorkerRecord,
    /// Effective image: `spec.image` if set, the controller default otherwise.
    pub image: &'a str,
    pub remote_port: i32,
    /// Secret published by the proxy with the client public key.
    pub ssh_key_secret: &'a str,
    /// Optional ConfigMap with nix.conf, mounted at /etc/nix.
    pub nix_config: Option<&'a str>,
}

/// Build the pod backing a worker record.
///
/// The pod name is derived from the session id, so a duplicate reconcile
/// can only ever collide with its own pod (AlreadyExists), never spawn a
/// second one. The owner reference hands final pod cleanup to the
/// cluster's garbage collector if the finalizer never runs.
pub fn build_worker_pod(params: &PodParams<'_>) -> Pod {
    let record = params.record;
    let session_id = &record.spec.session_id;
    let record_name = record.meta().name.clone().unwrap_or_default();
    let pod_name = names::pod_name(session_id);

    let mut volumes = vec![Volume {
        name: "ssh-authorized-keys".to_string(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(params.ssh_key_secret.to_string()),
            default_mode: Some(0o644),
            ..Default::default()
        }),
        ..Default::default()
    }];
    let mut volume_mounts = vec![VolumeMount {
        name: "ssh-authorized-keys".to_string(),
        mount_path: AUTHORIZED_KEYS_PATH.to_string(),
        sub_path: Some(names::AUTHORIZED_KEYS_FIELD.to_string()),
        read_only: Some(true),
        ..Default::default()
    }];

    if let Some(config_map) = params.nix_config {
        volumes.push(Volume {
            name: "nix-config".to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: config_map.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        });
        volume_mounts.push(VolumeMount {
            name: "nix-config".to_string(),
            mount_path: "/etc/nix".to_string(),
            read_only: Some(true),
            ..Default::default()
        });
    }

    let container = Container {
        name: names::WORKER_CONTAINER.to_string(),
        image: Some(params.image.to_string()),
        command: Some(vec!["/usr/sbin/sshd".to_string(), "-D".to_string(), "-e".to_string()]),
        ports: Some(vec![ContainerPort {
            container_port: params.remote_port,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        resources: record.spec.resources.clone(),
        volume_mounts: Some(volume_mounts),
        ..Default::default()
    };

    Pod {
        metadata: ObjectMeta {
            name: Some(pod_name),
            namespace: record.meta().namespace.clone(),
            labels: Some(names::pod_labels(session_id, &record_name)),
            owner_references: record.controller_owner_ref(&()).map(|oref| vec![oref]),
            ..Default::default()
        },
        spec: Some(PodSpec {
            restart_policy: Some("Never".to_string()),
            active_deadline_seconds: record.spec.timeout_seconds,
            node_selector: record.spec.node_selector.clone(),
            containers: vec![container],
            volumes: Some(volumes),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// The image a record's pod should run.
pub fn effective_image<'a>(record: &'a WorkerRecord, default_image: &'a str) -> &'a str {
    match record.spec.image.as_deref() {
        Some(image) if !image.is_empty() => image,
        _ => default_image,
    }
}

#[cfg(test)]
#[path = "pod_tests.rs"]
mod tests;
