use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use time::{Duration, OffsetDateTime};

use crate::domain::toast::{Toast, ToastKind};
use crate::domain::vote::VoterId;

/// Transient notifications per client. Toasts dismiss themselves once
/// older than the TTL; nothing here is persisted. Every push sweeps expired
/// toasts of all clients, so clients that never poll are not retained.
pub struct ToastQueue {
    ttl: Duration,
    next_id: AtomicU64,
    queues: Mutex<HashMap<VoterId, Vec<Toast>>>,
}

impl ToastQueue {
    pub fn new(ttl: std::time::Duration) -> Self {
        Self {
            ttl: Duration::try_from(ttl).unwrap_or(Duration::seconds(5)),
            next_id: AtomicU64::new(1),
            queues: Mutex::new(HashMap::new()),
        }
    }

    pub fn success(&self, client: &VoterId, message_key: &'static str) -> u64 {
        self.push(client, ToastKind::Success, message_key)
    }

    pub fn error(&self, client: &VoterId, message_key: &'static str) -> u64 {
        self.push(client, ToastKind::Error, message_key)
    }

    pub fn push(&self, client: &VoterId, kind: ToastKind, message_key: &'static str) -> u64 {
        self.push_at(client, kind, message_key, OffsetDateTime::now_utc())
    }

    fn push_at(
        &self,
        client: &VoterId,
        kind: ToastKind,
        message_key: &'static str,
        now: OffsetDateTime,
    ) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let toast = Toast {
            id,
            kind,
            message_key,
            created_at: now,
        };
        let mut queues = self.lock();
        queues.retain(|_, queue| {
            queue.retain(|queued| now - queued.created_at < self.ttl);
            !queue.is_empty()
        });
        queues.entry(client.clone()).or_default().push(toast);
        id
    }

    pub fn dismiss(&self, client: &VoterId, id: u64) -> bool {
        let mut queues = self.lock();
        let Some(queue) = queues.get_mut(client) else {
            return false;
        };
        let before = queue.len();
        queue.retain(|toast| toast.id != id);
        let removed = before != queue.len();
        if queue.is_empty() {
            queues.remove(client);
        }
        removed
    }

    pub fn active(&self, client: &VoterId) -> Vec<Toast> {
        self.active_at(client, OffsetDateTime::now_utc())
    }

    /// Live toasts at `now`, oldest first. Expired ones are dropped.
    pub fn active_at(&self, client: &VoterId, now: OffsetDateTime) -> Vec<Toast> {
        let mut queues = self.lock();
        let Some(queue) = queues.get_mut(client) else {
            return Vec::new();
        };
        queue.retain(|toast| now - toast.created_at < self.ttl);
        let live = queue.clone();
        if queue.is_empty() {
            queues.remove(client);
        }
        live
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<VoterId, Vec<Toast>>> {
        self.queues
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
