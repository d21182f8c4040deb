// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Accept loop and graceful drain for the SSH proxy.

use crate::error::ProxyError;
use crate::handler::ClientSession;
use crate::records::RecordClient;
use crate::registry::SessionRegistry;
use nh_core::{ReadyState, SessionId};
use russh::server::Config;
use russh::MethodSet;
use russh_keys::key::KeyPair;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Shared state for all connections.
pub struct ProxyContext {
    pub registry: SessionRegistry,
    pub records: RecordClient,
    /// SSH user on builder pods.
    pub remote_user: String,
    /// SSH port on builder pods.
    pub remote_port: u16,
    /// Key the proxy authenticates to workers with.
    pub client_key: Arc<KeyPair>,
    /// Ambient cancellation, derived from process signals.
    pub cancel: CancellationToken,
}

pub struct ProxyServer {
    ctx: Arc<ProxyContext>,
    config: Arc<Config>,
    ready: ReadyState,
    shutdown_grace: Duration,
}

impl ProxyServer {
    pub fn new(
        ctx: Arc<ProxyContext>,
        host_key: KeyPair,
        ready: ReadyState,
        shutdown_grace: Duration,
    ) -> Self {
        let config = Config {
            methods: MethodSet::NONE,
            keys: vec![host_key],
            ..Default::default()
        };
        Self { ctx, config: Arc::new(config), ready, shutdown_grace }
    }

    /// Accept connections until cancellation, then drain.
    pub async fn run(&self, listener: TcpListener) -> Result<(), ProxyError> {
        let tracker = TaskTracker::new();
        info!(addr = %listener.local_addr()?, "SSH proxy listening");

        loop {
            tokio::select! {
                _ = self.ctx.cancel.cancelled() => {
                    // Readiness flips first so load balancers stop routing
                    // to us before we stop accepting.
                    self.ready.begin_shutdown();
                    info!("no longer ready, stopping accept loop");
                    break;
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let ctx = Arc::clone(&self.ctx);
                            let config = Arc::clone(&self.config);
                            tracker.spawn(handle_connection(ctx, config, stream, peer));
                        }
                        Err(error) => error!(%error, "failed to accept connection"),
                    }
                }
            }
        }

        drop(listener);
        tracker.close();
        info!(
            active_sessions = self.ctx.registry.count(),
            "gracefully terminating, waiting for active connections"
        );
        tokio::select! {
            _ = tracker.wait() => info!("all connections completed"),
            _ = tokio::time::sleep(self.shutdown_grace) => {
                warn!("shutdown deadline reached, abandoning in-flight connections");
            }
        }
        Ok(())
    }
}

/// One inbound connection: handshake, session lifetime, registry removal.
async fn handle_connection(
    ctx: Arc<ProxyContext>,
    config: Arc<Config>,
    stream: TcpStream,
    peer: SocketAddr,
) {
    let session_id = SessionId::new();
    let handler = ClientSession::new(Arc::clone(&ctx), session_id, peer);

    match russh::server::run_stream(config, stream, handler).await {
        Ok(session) => {
            if let Err(error) = session.await {
                debug!(%session_id, %error, "SSH session ended with error");
            }
        }
        Err(error) => error!(client_addr = %peer, %error, "SSH handshake failed"),
    }

    ctx.registry.remove(&session_id);
    debug!(%session_id, "session closed");
}
