// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The splice: one task that owns a session's worker leg.
//!
//! The connection handler feeds client-side events in as [`ClientFrame`]s;
//! this task provisions the worker, dials it, and pumps both directions
//! until either side closes. Teardown happens exactly once, on every exit
//! path: both channels closed, both transports disconnected, the worker
//! record deleted under its own deadline.

use crate::error::ProxyError;
use crate::server::ProxyContext;
use async_trait::async_trait;
use nh_core::{SessionId, SessionStatus};
use russh::client;
use russh::server::Handle as ServerHandle;
use russh::{Channel, ChannelId, ChannelMsg, Disconnect, Pty, Sig};
use russh_keys::key;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Dial budget for the worker connection.
const WORKER_DIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Out-of-band channel requests that carry an accept/reject reply.
#[derive(Debug)]
pub enum ChannelRequest {
    Pty {
        term: String,
        col_width: u32,
        row_height: u32,
        pix_width: u32,
        pix_height: u32,
        modes: Vec<(Pty, u32)>,
    },
    Shell,
    Exec(Vec<u8>),
    Env { name: String, value: String },
    Subsystem(String),
}

/// One client-side event, forwarded verbatim to the worker.
#[derive(Debug)]
pub enum ClientFrame {
    Data(Vec<u8>),
    ExtendedData { ext: u32, data: Vec<u8> },
    Eof,
    Close,
    /// Request expecting a reply; the worker's verdict resolves `reply`.
    Request { request: ChannelRequest, reply: oneshot::Sender<bool> },
    WindowChange { col_width: u32, row_height: u32, pix_width: u32, pix_height: u32 },
    Signal(Sig),
}

/// Pending replies for forwarded requests, resolved in protocol order.
///
/// SSH answers channel requests strictly in the order they were sent, so
/// a FIFO pairs each worker SUCCESS/FAILURE with the oldest outstanding
/// request. Dropping the queue fails every waiter, which the handler
/// turns into a rejection toward the client.
#[derive(Default)]
pub(crate) struct ReplyQueue(VecDeque<oneshot::Sender<bool>>);

impl ReplyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, reply: oneshot::Sender<bool>) {
        self.0.push_back(reply);
    }

    pub fn resolve(&mut self, accepted: bool) {
        match self.0.pop_front() {
            Some(reply) => {
                let _ = reply.send(accepted);
            }
            None => tracing::debug!("unsolicited channel reply from worker"),
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Run one session's worker leg to completion.
///
/// Owns the record lifecycle: created first, deleted on every exit path.
pub async fn run_bridge(
    ctx: Arc<ProxyContext>,
    session_id: SessionId,
    client_channel: ChannelId,
    client: ServerHandle,
    frames: mpsc::Receiver<ClientFrame>,
) {
    if let Err(error) = ctx.records.create(&session_id).await {
        tracing::error!(%session_id, %error, "failed to create worker record");
        let _ = client.close(client_channel).await;
        return;
    }

    let result = connect_and_splice(&ctx, session_id, client_channel, &client, frames).await;

    match result {
        Ok(()) => tracing::info!(%session_id, "completed build session"),
        Err(ProxyError::Cancelled) => tracing::info!(%session_id, "session cancelled by shutdown"),
        Err(error) => tracing::error!(%session_id, %error, "session ended with error"),
    }

    // Teardown, in order: client channel, worker record, registry status.
    let _ = client.eof(client_channel).await;
    let _ = client.close(client_channel).await;
    ctx.records.delete(&session_id).await;
    ctx.registry.set_status(&session_id, SessionStatus::Closed);
}

async fn connect_and_splice(
    ctx: &ProxyContext,
    session_id: SessionId,
    client_channel: ChannelId,
    client: &ServerHandle,
    frames: mpsc::Receiver<ClientFrame>,
) -> Result<(), ProxyError> {
    let pod_ip = ctx.records.await_routable(&session_id, &ctx.cancel).await?;
    let addr = format!("{pod_ip}:{}", ctx.remote_port);

    let worker = dial_worker(ctx, &addr).await?;
    ctx.registry.set_worker_addr(&session_id, addr.clone());
    ctx.registry.set_status(&session_id, SessionStatus::Connected);
    tracing::info!(%session_id, %addr, "connected to builder pod");

    let worker_channel = worker.channel_open_session().await?;
    let result = splice(client_channel, client, worker_channel, frames, ctx).await;

    let _ = worker.disconnect(Disconnect::ByApplication, "session ended", "").await;
    result
}

/// Dial the worker's sshd as the configured user with the client key.
async fn dial_worker(
    ctx: &ProxyContext,
    addr: &str,
) -> Result<client::Handle<WorkerHandler>, ProxyError> {
    let config = Arc::new(client::Config::default());
    let mut worker = tokio::time::timeout(
        WORKER_DIAL_TIMEOUT,
        client::connect(config, addr, WorkerHandler),
    )
    .await
    .map_err(|_| ProxyError::DialTimeout(addr.to_string()))??;

    let authenticated =
        worker.authenticate_publickey(&ctx.remote_user, ctx.client_key.clone()).await?;
    if !authenticated {
        return Err(ProxyError::WorkerAuthRejected);
    }
    Ok(worker)
}

struct WorkerHandler;

#[async_trait]
impl client::Handler for WorkerHandler {
    type Error = russh::Error;

    // Host-key verification is deliberately skipped: the dial target is a
    // pod the controller just created inside the cluster.
    async fn check_server_key(&mut self, _key: &key::PublicKey) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// Pump both directions until either side closes or cancellation fires.
async fn splice(
    client_channel: ChannelId,
    client: &ServerHandle,
    mut worker: Channel<client::Msg>,
    mut frames: mpsc::Receiver<ClientFrame>,
    ctx: &ProxyContext,
) -> Result<(), ProxyError> {
    let mut replies = ReplyQueue::new();

    loop {
        tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            frame = frames.recv() => {
                match frame {
                    // Handler dropped: the client connection is gone.
                    None => break,
                    Some(frame) => {
                        if !forward_client_frame(&worker, frame, &mut replies).await {
                            break;
                        }
                    }
                }
            }
            msg = worker.wait() => {
                match msg {
                    None => break,
                    Some(msg) => {
                        if !forward_worker_msg(client, client_channel, msg, &mut replies).await {
                            break;
                        }
                    }
                }
            }
        }
    }

    let _ = worker.eof().await;
    let _ = worker.close().await;
    Ok(())
}

/// Forward one client event to the worker. Returns false once this
/// direction is finished.
async fn forward_client_frame(
    worker: &Channel<client::Msg>,
    frame: ClientFrame,
    replies: &mut ReplyQueue,
) -> bool {
    let result = match frame {
        ClientFrame::Data(data) => worker.data(&data[..]).await,
        ClientFrame::ExtendedData { ext, data } => worker.extended_data(ext, &data[..]).await,
        ClientFrame::Eof => worker.eof().await,
        ClientFrame::Close => return false,
        ClientFrame::WindowChange { col_width, row_height, pix_width, pix_height } => {
            worker.window_change(col_width, row_height, pix_width, pix_height).await
        }
        ClientFrame::Signal(signal) => worker.signal(signal).await,
        ClientFrame::Request { request, reply } => {
            match forward_request(worker, &request).await {
                Ok(()) => {
                    replies.push(reply);
                    Ok(())
                }
                Err(error) => {
                    // The worker never saw the request; reject it upstream.
                    let _ = reply.send(false);
                    Err(error)
                }
            }
        }
    };

    match result {
        Ok(()) => true,
        Err(error) => {
            tracing::debug!(%error, "client->worker forwarding ended");
            false
        }
    }
}

/// Send a channel request to the worker, always asking for a reply so the
/// verdict can be relayed to the originator.
async fn forward_request(
    worker: &Channel<client::Msg>,
    request: &ChannelRequest,
) -> Result<(), russh::Error> {
    match request {
        ChannelRequest::Pty { term, col_width, row_height, pix_width, pix_height, modes } => {
            worker
                .request_pty(true, term, *col_width, *row_height, *pix_width, *pix_height, modes)
                .await
        }
        ChannelRequest::Shell => worker.request_shell(true).await,
        ChannelRequest::Exec(command) => worker.exec(true, &command[..]).await,
        ChannelRequest::Env { name, value } => worker.set_env(true, name, value).await,
        ChannelRequest::Subsystem(name) => worker.request_subsystem(true, name).await,
    }
}

/// Forward one worker message to the client. Returns false once this
/// direction is finished.
async fn forward_worker_msg(
    client: &ServerHandle,
    channel: ChannelId,
    msg: ChannelMsg,
    replies: &mut ReplyQueue,
) -> bool {
    match msg {
        ChannelMsg::Data { data } => client.data(channel, data).await.is_ok(),
        ChannelMsg::ExtendedData { data, ext } => {
            client.extended_data(channel, ext, data).await.is_ok()
        }
        ChannelMsg::Eof => client.eof(channel).await.is_ok(),
        ChannelMsg::Close => false,
        ChannelMsg::ExitStatus { exit_status } => {
            let _ = client.exit_status_request(channel, exit_status).await;
            true
        }
        ChannelMsg::ExitSignal { signal_name, core_dumped, error_message, lang_tag } => {
            let _ = client
                .exit_signal_request(channel, signal_name, core_dumped, error_message, lang_tag)
                .await;
            true
        }
        ChannelMsg::Success => {
            replies.resolve(true);
            true
        }
        ChannelMsg::Failure => {
            replies.resolve(false);
            true
        }
        // Window adjustments are flow control; russh applies them itself.
        _ => true,
    }
}

#[cfg(test)]
#[path = "bridge_tests.rs"]
mod tests;
