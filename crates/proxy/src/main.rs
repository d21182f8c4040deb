// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! nixherd-proxy: one SSH endpoint, a dedicated builder pod per session.

use anyhow::Context as _;
use clap::Parser;
use kube::Client;
use nh_core::{serve_health, ReadyState};
use nh_proxy::records::RecordClient;
use nh_proxy::registry::SessionRegistry;
use nh_proxy::{keys, ProxyContext, ProxyServer};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "nixherd-proxy", version, about = "SSH proxy for Nix remote builders")]
struct Cli {
    /// SSH proxy server port
    #[arg(short, long, default_value_t = 2222)]
    port: u16,

    /// Path to an SSH host private key file (ephemeral when omitted)
    #[arg(short = 'k', long)]
    host_key: Option<PathBuf>,

    /// Kubernetes namespace for worker records
    #[arg(short, long, default_value = "default")]
    namespace: String,

    /// SSH username on builder pods
    #[arg(short = 'u', long, default_value = "nixbld")]
    remote_user: String,

    /// SSH port on builder pods
    #[arg(short = 'r', long, default_value_t = 22)]
    remote_port: u16,

    /// Health check server port
    #[arg(long, default_value_t = 8080)]
    health_port: u16,

    /// Secret that receives the proxy's authorized key
    #[arg(long, default_value = "nix-builder-keys")]
    ssh_key_secret: String,

    /// Graceful shutdown timeout in seconds
    #[arg(long, default_value_t = 30)]
    shutdown_timeout: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let host_key = keys::load_or_generate_host_key(cli.host_key.as_deref())
        .context("failed to prepare host key")?;
    let client_key = keys::generate_key().context("failed to generate client key")?;

    let client = Client::try_default().await.context("failed to create Kubernetes client")?;

    // Workers only trust this process once the public key is published;
    // without it every dial would be rejected, so failure is fatal.
    let line = keys::authorized_keys_line(&client_key)?;
    keys::publish_authorized_keys(&client, &cli.namespace, &cli.ssh_key_secret, &line)
        .await
        .context("failed to publish SSH key secret")?;

    let listener = TcpListener::bind(("0.0.0.0", cli.port))
        .await
        .with_context(|| format!("failed to listen on port {}", cli.port))?;

    let ready = ReadyState::new();
    let health_token = CancellationToken::new();
    let health = tokio::spawn(serve_health(
        cli.health_port,
        ready.clone(),
        health_token.clone().cancelled_owned(),
    ));

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone())?;

    let ctx = Arc::new(ProxyContext {
        registry: SessionRegistry::new(),
        records: RecordClient::new(client, &cli.namespace),
        remote_user: cli.remote_user,
        remote_port: cli.remote_port,
        client_key: Arc::new(client_key),
        cancel,
    });

    info!(port = cli.port, namespace = %cli.namespace, "starting Nix remote builder SSH proxy");
    let server = ProxyServer::new(
        Arc::clone(&ctx),
        host_key,
        ready,
        Duration::from_secs(cli.shutdown_timeout),
    );
    server.run(listener).await?;

    // Health endpoint goes down last, with its own deadline.
    health_token.cancel();
    match tokio::time::timeout(Duration::from_secs(5), health).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(err))) => warn!(error = %err, "health server failed"),
        Ok(Err(err)) => warn!(error = %err, "health server task panicked"),
        Err(_) => warn!("health server shutdown timed out"),
    }

    info!("proxy stopped");
    Ok(())
}

/// Cancel the token on SIGINT or SIGTERM.
fn spawn_signal_handler(token: CancellationToken) -> anyhow::Result<()> {
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .context("failed to install SIGTERM handler")?;
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
        token.cancel();
    });
    Ok(())
}
