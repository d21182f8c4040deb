// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-connection SSH server handler.
//!
//! Accepts any client (authentication is an explicit non-goal), admits
//! only `session` channels, and converts everything the client sends into
//! [`ClientFrame`]s for the bridge task. Requests that want a reply block
//! here until the worker's verdict comes back, which preserves SSH's
//! per-channel request ordering.

use crate::bridge::{self, ChannelRequest, ClientFrame};
use crate::error::ProxyError;
use crate::registry::SessionRecord;
use crate::server::ProxyContext;
use async_trait::async_trait;
use nh_core::SessionId;
use russh::server::{Auth, Handler, Msg, Session};
use russh::{Channel, ChannelId, Pty, Sig};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Frames buffered toward the bridge while the worker comes up.
const FRAME_BUFFER: usize = 64;

pub struct ClientSession {
    ctx: Arc<ProxyContext>,
    session_id: SessionId,
    peer: SocketAddr,
    /// Set once the first `session` channel is open; later session
    /// channels are refused.
    bridge: Option<mpsc::Sender<ClientFrame>>,
}

impl ClientSession {
    pub fn new(ctx: Arc<ProxyContext>, session_id: SessionId, peer: SocketAddr) -> Self {
        Self { ctx, session_id, peer, bridge: None }
    }

    /// Hand a frame to the bridge. Errors mean the bridge is gone; the
    /// frame is dropped and the channel teardown catches up with us.
    async fn forward(&self, frame: ClientFrame) {
        if let Some(bridge) = &self.bridge {
            if bridge.send(frame).await.is_err() {
                tracing::debug!(session_id = %self.session_id, "bridge gone, dropping frame");
            }
        }
    }

    /// Forward a request and relay the worker's verdict as the reply.
    async fn forward_request(
        &self,
        request: ChannelRequest,
        channel: ChannelId,
        session: &mut Session,
    ) {
        let Some(bridge) = &self.bridge else {
            session.channel_failure(channel);
            return;
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        if bridge.send(ClientFrame::Request { request, reply: reply_tx }).await.is_err() {
            session.channel_failure(channel);
            return;
        }

        // A dropped sender (bridge teardown) reads as rejection.
        match reply_rx.await {
            Ok(true) => session.channel_success(channel),
            _ => session.channel_failure(channel),
        }
    }
}

#[async_trait]
impl Handler for ClientSession {
    type Error = ProxyError;

    // Any client identity is accepted; only workers authenticate us.
    async fn auth_none(&mut self, _user: &str) -> Result<Auth, Self::Error> {
        Ok(Auth::Accept)
    }

    async fn auth_succeeded(&mut self, session: &mut Session) -> Result<(), Self::Error> {
        tracing::info!(
            session_id = %self.session_id,
            client_addr = %self.peer,
            "new SSH connection"
        );
        self.ctx.registry.insert(SessionRecord::new(self.session_id, session.handle()));
        Ok(())
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        session: &mut Session,
    ) -> Result<bool, Self::Error> {
        if self.bridge.is_some() {
            tracing::warn!(
                session_id = %self.session_id,
                "refusing second session channel"
            );
            return Ok(false);
        }

        tracing::info!(session_id = %self.session_id, "handling SSH session channel");
        let (frame_tx, frame_rx) = mpsc::channel(FRAME_BUFFER);
        self.bridge = Some(frame_tx);
        tokio::spawn(bridge::run_bridge(
            Arc::clone(&self.ctx),
            self.session_id,
            channel.id(),
            session.handle(),
            frame_rx,
        ));
        Ok(true)
    }

    // Only `session` channels are proxied.
    async fn channel_open_direct_tcpip(
        &mut self,
        _channel: Channel<Msg>,
        _host_to_connect: &str,
        _port_to_connect: u32,
        _originator_address: &str,
        _originator_port: u32,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        tracing::info!(session_id = %self.session_id, "rejecting direct-tcpip channel");
        Ok(false)
    }

    async fn channel_open_x11(
        &mut self,
        _channel: Channel<Msg>,
        _originator_address: &str,
        _originator_port: u32,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        tracing::info!(session_id = %self.session_id, "rejecting x11 channel");
        Ok(false)
    }

    async fn channel_open_forwarded_tcpip(
        &mut self,
        _channel: Channel<Msg>,
        _host_to_connect: &str,
        _port_to_connect: u32,
        _originator_address: &str,
        _originator_port: u32,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        tracing::info!(session_id = %self.session_id, "rejecting forwarded-tcpip channel");
        Ok(false)
    }

    async fn data(
        &mut self,
        _channel: ChannelId,
        data: &[u8],
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.forward(ClientFrame::Data(data.to_vec())).await;
        Ok(())
    }

    async fn extended_data(
        &mut self,
        _channel: ChannelId,
        code: u32,
        data: &[u8],
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.forward(ClientFrame::ExtendedData { ext: code, data: data.to_vec() }).await;
        Ok(())
    }

    async fn channel_eof(
        &mut self,
        _channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.forward(ClientFrame::Eof).await;
        Ok(())
    }

    async fn channel_close(
        &mut self,
        _channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.forward(ClientFrame::Close).await;
        Ok(())
    }

    async fn pty_request(
        &mut self,
        channel: ChannelId,
        term: &str,
        col_width: u32,
        row_height: u32,
        pix_width: u32,
        pix_height: u32,
        modes: &[(Pty, u32)],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let request = ChannelRequest::Pty {
            term: term.to_string(),
            col_width,
            row_height,
            pix_width,
            pix_height,
            modes: modes.to_vec(),
        };
        self.forward_request(request, channel, session).await;
        Ok(())
    }

    async fn shell_request(
        &mut self,
        channel: ChannelId,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.forward_request(ChannelRequest::Shell, channel, session).await;
        Ok(())
    }

    async fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.forward_request(ChannelRequest::Exec(data.to_vec()), channel, session).await;
        Ok(())
    }

    async fn env_request(
        &mut self,
        channel: ChannelId,
        variable_name: &str,
        variable_value: &str,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let request = ChannelRequest::Env {
            name: variable_name.to_string(),
            value: variable_value.to_string(),
        };
        self.forward_request(request, channel, session).await;
        Ok(())
    }

    async fn subsystem_request(
        &mut self,
        channel: ChannelId,
        name: &str,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.forward_request(ChannelRequest::Subsystem(name.to_string()), channel, session).await;
        Ok(())
    }

    async fn window_change_request(
        &mut self,
        _channel: ChannelId,
        col_width: u32,
        row_height: u32,
        pix_width: u32,
        pix_height: u32,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.forward(ClientFrame::WindowChange { col_width, row_height, pix_width, pix_height })
            .await;
        Ok(())
    }

    async fn signal(
        &mut self,
        _channel: ChannelId,
        signal: Sig,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.forward(ClientFrame::Signal(signal)).await;
        Ok(())
    }
}
