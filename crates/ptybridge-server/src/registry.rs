//! Session registry: every live session, keyed by id.
//!
//! Entries are inserted when a handshake completes and removed when the
//! session's teardown finishes. Besides bookkeeping, the registry is the only
//! way to reach a session from outside its task: each entry carries a
//! cancellation token that ends the session's pumps.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ptybridge_common::SessionId;
use tokio::sync::{Notify, RwLock};
use tokio_util::sync::CancellationToken;

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Handshake accepted, terminal not allocated yet.
    Connecting,
    /// Shell running, both pumps live.
    Active,
    /// Pumps stopped, shell being terminated.
    Closing,
    /// Everything released.
    Closed,
}

struct SessionEntry {
    peer: SocketAddr,
    started_at: Instant,
    state: SessionState,
    pid: Option<u32>,
    cancel: CancellationToken,
}

/// Point-in-time view of one session.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub id: SessionId,
    pub peer: SocketAddr,
    pub state: SessionState,
    pub pid: Option<u32>,
    pub age: Duration,
}

/// Thread-safe session registry.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<SessionId, SessionEntry>>>,
    /// Parent of every session token; cancelled on shutdown.
    root: CancellationToken,
    drained: Arc<Notify>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session in `Connecting` state and hand back the token
    /// that cancels it. After [`shutdown`](Self::shutdown) the token comes
    /// back already cancelled.
    pub async fn insert(&self, id: SessionId, peer: SocketAddr) -> CancellationToken {
        let cancel = self.root.child_token();
        let mut map = self.sessions.write().await;
        map.insert(
            id,
            SessionEntry {
                peer,
                started_at: Instant::now(),
                state: SessionState::Connecting,
                pid: None,
                cancel: cancel.clone(),
            },
        );
        cancel
    }

    /// Record a state transition. Returns false for unknown ids.
    pub async fn set_state(&self, id: &SessionId, state: SessionState) -> bool {
        let mut map = self.sessions.write().await;
        match map.get_mut(id) {
            Some(entry) => {
                entry.state = state;
                true
            }
            None => false,
        }
    }

    /// Mark a session `Active` with its shell's pid.
    pub async fn activate(&self, id: &SessionId, pid: Option<u32>) -> bool {
        let mut map = self.sessions.write().await;
        match map.get_mut(id) {
            Some(entry) => {
                entry.state = SessionState::Active;
                entry.pid = pid;
                true
            }
            None => false,
        }
    }

    /// Drop a session's entry. Returns true if it was present.
    pub async fn remove(&self, id: &SessionId) -> bool {
        let mut map = self.sessions.write().await;
        let removed = map.remove(id).is_some();
        if map.is_empty() {
            self.drained.notify_waiters();
        }
        removed
    }

    pub async fn get(&self, id: &SessionId) -> Option<SessionInfo> {
        let map = self.sessions.read().await;
        map.get(id).map(|entry| info(id, entry))
    }

    /// All sessions, oldest first.
    pub async fn list(&self) -> Vec<SessionInfo> {
        let map = self.sessions.read().await;
        let mut sessions: Vec<SessionInfo> = map.iter().map(|(id, entry)| info(id, entry)).collect();
        sessions.sort_by(|a, b| b.age.cmp(&a.age));
        sessions
    }

    /// Number of registered sessions.
    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Force one session to end. Its own task performs the teardown.
    pub async fn terminate(&self, id: &SessionId) -> bool {
        let map = self.sessions.read().await;
        match map.get(id) {
            Some(entry) => {
                tracing::info!(session = %id.short(), peer = %entry.peer, "terminating session");
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every current session and any registered later. Returns how
    /// many sessions were live.
    pub async fn shutdown(&self) -> usize {
        self.root.cancel();
        self.count().await
    }

    /// Wait until no sessions are registered, up to `timeout`. Returns
    /// whether the registry drained in time.
    pub async fn wait_until_empty(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, async {
            loop {
                let drained = self.drained.notified();
                if self.count().await == 0 {
                    return;
                }
                drained.await;
            }
        })
        .await
        .is_ok()
    }
}

fn info(id: &SessionId, entry: &SessionEntry) -> SessionInfo {
    SessionInfo {
        id: id.clone(),
        peer: entry.peer,
        state: entry.state,
        pid: entry.pid,
        age: entry.started_at.elapsed(),
    }
}
