// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory session registry.
//!
//! The only shared mutable state in the proxy. A read-write lock is
//! enough because every operation touches a single entry; no iteration is
//! exposed, so no caller can hold the lock across awaits.

use nh_core::{SessionId, SessionStatus};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// One live proxy session.
///
/// Generic over the transport handle so the registry can be exercised
/// without a real SSH connection.
#[derive(Debug)]
pub struct SessionRecord<H = russh::server::Handle> {
    pub id: SessionId,
    /// Handle to the client's transport connection.
    pub handle: H,
    /// Address of the assigned worker, once dialed.
    pub worker_addr: Option<String>,
    pub status: SessionStatus,
}

impl<H> SessionRecord<H> {
    pub fn new(id: SessionId, handle: H) -> Self {
        Self { id, handle, worker_addr: None, status: SessionStatus::Pending }
    }
}

/// Mapping from session id to live session record.
pub struct SessionRegistry<H = russh::server::Handle> {
    inner: Arc<RwLock<HashMap<SessionId, SessionRecord<H>>>>,
}

impl<H> Clone for SessionRegistry<H> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<H> Default for SessionRegistry<H> {
    fn default() -> Self {
        Self { inner: Arc::new(RwLock::new(HashMap::new())) }
    }
}

impl<H> SessionRegistry<H> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: SessionRecord<H>) {
        self.inner.write().insert(record.id, record);
    }

    pub fn remove(&self, id: &SessionId) -> Option<SessionRecord<H>> {
        self.inner.write().remove(id)
    }

    /// Number of live sessions.
    pub fn count(&self) -> usize {
        self.inner.read().len()
    }

    pub fn set_status(&self, id: &SessionId, status: SessionStatus) {
        if let Some(record) = self.inner.write().get_mut(id) {
            record.status = status;
        }
    }

    pub fn set_worker_addr(&self, id: &SessionId, addr: String) {
        if let Some(record) = self.inner.write().get_mut(id) {
            record.worker_addr = Some(addr);
        }
    }

    /// Status of one session, if it is still registered.
    pub fn status(&self, id: &SessionId) -> Option<SessionStatus> {
        self.inner.read().get(id).map(|record| record.status)
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
