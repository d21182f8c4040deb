// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Key material: the proxy's host key, the per-process client key, and
//! publication of the client public key for builder pods to trust.

use crate::error::ProxyError;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::Client;
use nh_api::names;
use russh_keys::key::KeyPair;
use russh_keys::PublicKeyBase64;
use std::collections::BTreeMap;
use std::path::Path;

/// Host key for the proxy's SSH server side: loaded from disk when a path
/// is configured, otherwise freshly generated for this process.
pub fn load_or_generate_host_key(path: Option<&Path>) -> Result<KeyPair, ProxyError> {
    match path {
        Some(path) => {
            let key = russh_keys::load_secret_key(path, None)?;
            tracing::info!(path = %path.display(), "loaded SSH host key");
            Ok(key)
        }
        None => {
            tracing::info!("generating ephemeral SSH host key");
            generate_key()
        }
    }
}

/// Fresh Ed25519 keypair. The client key is always ephemeral: workers
/// trust whatever public key the current proxy process published.
pub fn generate_key() -> Result<KeyPair, ProxyError> {
    KeyPair::generate_ed25519().ok_or(ProxyError::KeyGeneration)
}

/// The public half of a keypair as a single authorized-keys line.
pub fn authorized_keys_line(key: &KeyPair) -> Result<String, ProxyError> {
    let public = key.clone_public_key()?;
    Ok(format!("{} {}\n", public.name(), public.public_key_base64()))
}

/// Ensure the namespaced secret carries the client public key under the
/// `authorized_keys` field, overwriting whatever a previous proxy wrote.
/// Failure here is fatal for startup: workers would reject every dial.
pub async fn publish_authorized_keys(
    client: &Client,
    namespace: &str,
    secret_name: &str,
    line: &str,
) -> Result<(), ProxyError> {
    let secrets: Api<Secret> = Api::namespaced(client.clone(), namespace);

    let secret = Secret {
        metadata: ObjectMeta {
            name: Some(secret_name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(BTreeMap::from([(
                names::APP_LABEL.to_string(),
                names::APP_NAME.to_string(),
            )])),
            ..Default::default()
        },
        string_data: Some(BTreeMap::from([(
            names::AUTHORIZED_KEYS_FIELD.to_string(),
            line.to_string(),
        )])),
        ..Default::default()
    };

    match secrets.create(&PostParams::default(), &secret).await {
        Ok(_) => {
            tracing::info!(secret = secret_name, "created SSH key secret");
            Ok(())
        }
        Err(kube::Error::Api(response)) if response.code == 409 => {
            let patch = serde_json::json!({
                "stringData": { names::AUTHORIZED_KEYS_FIELD: line },
            });
            secrets.patch(secret_name, &PatchParams::default(), &Patch::Merge(&patch)).await?;
            tracing::info!(secret = secret_name, "updated existing SSH key secret");
            Ok(())
        }
        Err(error) => Err(error.into()),
    }
}

#[cfg(test)]
#[path = "keys_tests.rs"]
mod tests;
