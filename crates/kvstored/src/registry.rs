//! The connection list: one entry per live connection, scanned by the idle
//! reaper and touched by every connection task on each command processed.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use tokio::sync::Notify;

/// Per-connection shared state: the idle reaper reads `last_activity` and
/// signals `close` when it reaps a connection; the connection task updates
/// `last_activity` on every command and observes `close` via `Notify`.
pub struct ConnHandle {
    pub peer: String,
    last_activity: AtomicI64,
    close: Notify,
}

impl ConnHandle {
    fn new(peer: String) -> Self {
        Self {
            peer,
            last_activity: AtomicI64::new(now_unix()),
            close: Notify::new(),
        }
    }

    pub fn touch(&self) {
        self.last_activity.store(now_unix(), Ordering::Relaxed);
    }

    pub fn idle_for_secs(&self) -> i64 {
        now_unix() - self.last_activity.load(Ordering::Relaxed)
    }

    /// Forces this connection closed. Safe to call more than once.
    pub fn force_close(&self) {
        self.close.notify_waiters();
    }

    /// Resolves once `force_close` has been called.
    pub async fn closed(&self) {
        self.close.notified().await;
    }
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<DashMap<u64, Arc<ConnHandle>>>,
    next_id: Arc<AtomicU64>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, peer: String) -> (u64, Arc<ConnHandle>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = Arc::new(ConnHandle::new(peer));
        self.connections.insert(id, handle.clone());
        (id, handle)
    }

    pub fn unregister(&self, id: u64) {
        self.connections.remove(&id);
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Closes every connection whose idle time exceeds `timeout_secs`.
    pub fn reap_idle(&self, timeout_secs: i64) {
        for entry in self.connections.iter() {
            if entry.value().idle_for_secs() >= timeout_secs {
                tracing::info!(peer = %entry.value().peer, "idle connection reaped");
                entry.value().force_close();
            }
        }
    }

    /// Closes every connection. Used during shutdown.
    pub fn close_all(&self) {
        for entry in self.connections.iter() {
            entry.value().force_close();
        }
    }
}
