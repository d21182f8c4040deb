// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unit tests for builder pod construction

use super::*;
use k8s_openapi::api::core::v1::ResourceRequirements;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use nh_api::WorkerRecordSpec;
use std::collections::BTreeMap;

fn record(spec: WorkerRecordSpec) -> WorkerRecord {
    let mut record = WorkerRecord::new(&names::record_name(&spec.session_id), spec);
    record.metadata.namespace = Some("builders".to_string());
    record.metadata.uid = Some("uid-1234".to_string());
    record
}

fn base_record() -> WorkerRecord {
    record(WorkerRecordSpec { session_id: "s1".into(), ..Default::default() })
}

fn params<'a>(record: &'a WorkerRecord, image: &'a str) -> PodParams<'a> {
    PodParams {
        record,
        image,
        remote_port: 22,
        ssh_key_secret: "nix-builder-keys",
        nix_config: None,
    }
}

#[test]
fn pod_is_named_and_labeled_for_its_session() {
    let record = base_record();
    let pod = build_worker_pod(&params(&record, "nixos/nix:latest"));

    assert_eq!(pod.metadata.name.as_deref(), Some("nix-builder-s1"));
    assert_eq!(pod.metadata.namespace.as_deref(), Some("builders"));

    let labels = pod.metadata.labels.unwrap();
    assert_eq!(labels[names::APP_LABEL], names::APP_NAME);
    assert_eq!(labels[names::SESSION_ID_LABEL], "s1");
    assert_eq!(labels[names::BUILD_REQUEST_LABEL], "build-s1");
}

#[test]
fn pod_is_owned_by_its_record() {
    let record = base_record();
    let pod = build_worker_pod(&params(&record, "img"));

    let owners = pod.metadata.owner_references.unwrap();
    assert_eq!(owners.len(), 1);
    let owner = &owners[0];
    assert_eq!(owner.kind, "WorkerRecord");
    assert_eq!(owner.name, "build-s1");
    assert_eq!(owner.uid, "uid-1234");
    assert_eq!(owner.controller, Some(true));
    assert_eq!(owner.block_owner_deletion, Some(true));
}

#[test]
fn pod_runs_sshd_and_never_restarts() {
    let record = base_record();
    let pod = build_worker_pod(&params(&record, "img"));

    let spec = pod.spec.unwrap();
    assert_eq!(spec.restart_policy.as_deref(), Some("Never"));

    let container = &spec.containers[0];
    assert_eq!(container.name, names::WORKER_CONTAINER);
    assert_eq!(
        container.command.as_deref(),
        Some(&["/usr/sbin/sshd".to_string(), "-D".to_string(), "-e".to_string()][..])
    );
    assert_eq!(container.ports.as_ref().unwrap()[0].container_port, 22);
}

#[test]
fn authorized_keys_secret_is_mounted_read_only() {
    let record = base_record();
    let pod = build_worker_pod(&params(&record, "img"));

    let spec = pod.spec.unwrap();
    let volume = &spec.volumes.as_ref().unwrap()[0];
    let secret = volume.secret.as_ref().unwrap();
    assert_eq!(secret.secret_name.as_deref(), Some("nix-builder-keys"));
    assert_eq!(secret.default_mode, Some(0o644));

    let mount = &spec.containers[0].volume_mounts.as_ref().unwrap()[0];
    assert_eq!(mount.mount_path, "/home/nixbld/.ssh/authorized_keys");
    assert_eq!(mount.sub_path.as_deref(), Some(names::AUTHORIZED_KEYS_FIELD));
    assert_eq!(mount.read_only, Some(true));
}

#[test]
fn nix_config_mount_is_optional() {
    let record = base_record();

    let without = build_worker_pod(&params(&record, "img"));
    assert_eq!(without.spec.as_ref().unwrap().volumes.as_ref().unwrap().len(), 1);

    let mut with_config = params(&record, "img");
    with_config.nix_config = Some("nix-conf");
    let pod = build_worker_pod(&with_config);
    let spec = pod.spec.unwrap();
    let volumes = spec.volumes.unwrap();
    assert_eq!(volumes.len(), 2);
    assert_eq!(volumes[1].config_map.as_ref().unwrap().name, "nix-conf");

    let mounts = spec.containers[0].volume_mounts.as_ref().unwrap();
    assert_eq!(mounts[1].mount_path, "/etc/nix");
    assert_eq!(mounts[1].read_only, Some(true));
}

#[test]
fn spec_fields_flow_into_the_pod() {
    let record = record(WorkerRecordSpec {
        session_id: "s1".into(),
        timeout_seconds: Some(3600),
        node_selector: Some(BTreeMap::from([("kind".to_string(), "builder".to_string())])),
        resources: Some(ResourceRequirements {
            limits: Some(BTreeMap::from([("cpu".to_string(), Quantity("4".to_string()))])),
            ..Default::default()
        }),
        ..Default::default()
    });
    let pod = build_worker_pod(&params(&record, "img"));

    let spec = pod.spec.unwrap();
    assert_eq!(spec.active_deadline_seconds, Some(3600));
    assert_eq!(spec.node_selector.as_ref().unwrap()["kind"], "builder");
    let limits = spec.containers[0].resources.as_ref().unwrap().limits.as_ref().unwrap();
    assert_eq!(limits["cpu"], Quantity("4".to_string()));
}

#[test]
fn image_override_beats_the_default() {
    let with_override = record(WorkerRecordSpec {
        session_id: "s1".into(),
        image: Some("custom:1".into()),
        ..Default::default()
    });
    assert_eq!(effective_image(&with_override, "default:latest"), "custom:1");

    let without = base_record();
    assert_eq!(effective_image(&without, "default:latest"), "default:latest");

    let empty = record(WorkerRecordSpec {
        session_id: "s1".into(),
        image: Some(String::new()),
        ..Default::default()
    });
    assert_eq!(effective_image(&empty, "default:latest"), "default:latest");
}
