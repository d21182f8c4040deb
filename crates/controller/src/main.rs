// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! nixherd-controller: drives worker records to running builder pods.

use anyhow::Context as _;
use clap::Parser;
use kube::Client;
use nh_controller::{reconciler, shutdown, Context};
use nh_core::{serve_health, ReadyState};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "nixherd-controller", version, about = "Kubernetes controller for Nix remote builders")]
struct Cli {
    /// Builder container image
    #[arg(long, default_value = "nixos/nix:latest")]
    builder_image: String,

    /// SSH port in builder pods
    #[arg(long, default_value_t = 22)]
    remote_port: i32,

    /// ConfigMap containing nix.conf (optional)
    #[arg(long)]
    nix_config: Option<String>,

    /// Secret holding the proxy's authorized key
    #[arg(long, default_value = "nix-builder-keys")]
    ssh_key_secret: String,

    /// Health check server port
    #[arg(long, default_value_t = 8081)]
    health_port: u16,

    /// Graceful shutdown timeout in seconds
    #[arg(long, default_value_t = 30)]
    shutdown_timeout: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let client = Client::try_default().await.context("failed to create Kubernetes client")?;
    let shutdown_timeout = Duration::from_secs(cli.shutdown_timeout);

    let ready = ReadyState::new();
    let health_token = CancellationToken::new();
    let health = tokio::spawn(serve_health(
        cli.health_port,
        ready.clone(),
        health_token.clone().cancelled_owned(),
    ));

    let token = CancellationToken::new();
    spawn_signal_handler(token.clone())?;

    // On shutdown: flip readiness first, then fail in-flight records within
    // half the budget while the controller drains.
    let cleanup = tokio::spawn({
        let token = token.clone();
        let client = client.clone();
        let ready = ready.clone();
        async move {
            token.cancelled().await;
            ready.begin_shutdown();
            info!(timeout_secs = shutdown_timeout.as_secs(), "shutdown signal received");
            match tokio::time::timeout(shutdown_timeout / 2, shutdown::fail_inflight_records(client))
                .await
            {
                Ok(Ok(updated)) => info!(updated, "shutdown cleanup finished"),
                Ok(Err(err)) => error!(error = %err, "shutdown cleanup failed"),
                Err(_) => warn!("shutdown cleanup timed out"),
            }
        }
    });

    info!(
        builder_image = %cli.builder_image,
        remote_port = cli.remote_port,
        nix_config = cli.nix_config.as_deref().unwrap_or(""),
        health_port = cli.health_port,
        shutdown_timeout_secs = shutdown_timeout.as_secs(),
        "starting nixherd controller"
    );

    let ctx = Context {
        client,
        builder_image: cli.builder_image,
        remote_port: cli.remote_port,
        nix_config: cli.nix_config,
        ssh_key_secret: cli.ssh_key_secret,
    };

    let controller = reconciler::run(ctx, token.clone());
    tokio::pin!(controller);
    tokio::select! {
        _ = &mut controller => {}
        _ = async { token.cancelled().await; tokio::time::sleep(shutdown_timeout).await } => {
            warn!("graceful shutdown timeout exceeded, forcing exit");
        }
    }

    // Idempotent; makes sure the cleanup task is released even if the
    // controller stream ended on its own.
    token.cancel();
    let _ = cleanup.await;

    // Health endpoint goes down last, with its own deadline.
    health_token.cancel();
    match tokio::time::timeout(Duration::from_secs(5), health).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(err))) => warn!(error = %err, "health server failed"),
        Ok(Err(err)) => warn!(error = %err, "health server task panicked"),
        Err(_) => warn!("health server shutdown timed out"),
    }

    info!("controller stopped");
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
