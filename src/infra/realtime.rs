use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::change::{ChangeEvent, ChangeNotice, Operation, Table};
use crate::infra::db::Db;
use crate::infra::store::DirectoryStore;

const RECONNECT_BACKOFF_MS: u64 = 1000;

/// Fans backend change notifications out to in-process listeners.
#[derive(Clone)]
pub struct RealtimeHub {
    sender: broadcast::Sender<ChangeEvent>,
}

/// Narrows a subscription to one table and, optionally, one listing.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeFilter {
    pub table: Option<Table>,
    pub listing_id: Option<Uuid>,
}

impl ChangeFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn table(table: Table) -> Self {
        Self {
            table: Some(table),
            listing_id: None,
        }
    }

    pub fn comments_for(listing_id: Uuid) -> Self {
        Self {
            table: Some(Table::Comments),
            listing_id: Some(listing_id),
        }
    }

    pub fn matches(&self, event: &ChangeEvent) -> bool {
        self.table.map_or(true, |table| event.table() == table)
            && self.listing_id.map_or(true, |id| event.listing_id() == id)
    }
}

/// A live listener. Dropping it unsubscribes.
pub struct Subscription {
    receiver: broadcast::Receiver<ChangeEvent>,
    filter: ChangeFilter,
}

impl Subscription {
    /// Next matching event, or `None` once the hub is gone.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "realtime subscriber lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl RealtimeHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: ChangeEvent) {
        // No receivers is fine: nobody is watching yet.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self, filter: ChangeFilter) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
            filter,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Forward `pg_notify` notices on `channel` into the hub until the task is
/// aborted. Each notice is resolved against `store` before it is published.
pub fn spawn_pg_listener(
    db: Db,
    channel: String,
    hub: RealtimeHub,
    store: Arc<dyn DirectoryStore>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let mut listener = match db.listener(&channel).await {
                Ok(listener) => listener,
                Err(err) => {
                    error!(error = ?err, channel = %channel, "failed to start realtime listener");
                    tokio::time::sleep(Duration::from_millis(RECONNECT_BACKOFF_MS)).await;
                    continue;
                }
            };
            info!(channel = %channel, "realtime listener started");

            loop {
                match listener.recv().await {
                    Ok(notification) => relay(&hub, store.as_ref(), notification.payload()).await,
                    Err(err) => {
                        warn!(error = ?err, "realtime listener failed, reconnecting");
                        break;
                    }
                }
            }

            tokio::time::sleep(Duration::from_millis(RECONNECT_BACKOFF_MS)).await;
        }
    })
}

async fn relay(hub: &RealtimeHub, store: &dyn DirectoryStore, payload: &str) {
    let value = match serde_json::from_str(payload) {
        Ok(value) => value,
        Err(err) => {
            debug!(error = %err, "dropping non-JSON change notification");
            return;
        }
    };

    let Some(notice) = ChangeNotice::decode(&value) else {
        debug!("dropping malformed change notification");
        return;
    };

    match resolve(store, notice).await {
        Ok(Some(event)) => hub.publish(event),
        Ok(None) => debug!(id = %notice.id, table = ?notice.table, "changed row is gone"),
        Err(err) => warn!(error = ?err, id = %notice.id, "failed to read changed row"),
    }
}

/// The event subscribers see for `notice`. `None` when the row no longer
/// exists by the time it is read.
pub async fn resolve(
    store: &dyn DirectoryStore,
    notice: ChangeNotice,
) -> Result<Option<ChangeEvent>> {
    let event = match (notice.table, notice.operation) {
        (Table::Listings, Operation::Delete) => Some(ChangeEvent::ListingDeleted { id: notice.id }),
        (Table::Listings, Operation::Insert) => store
            .fetch_listing(notice.id)
            .await?
            .map(ChangeEvent::ListingInserted),
        (Table::Listings, Operation::Update) => store
            .fetch_listing(notice.id)
            .await?
            .map(ChangeEvent::ListingUpdated),
        (Table::Comments, Operation::Insert) => store
            .fetch_comment(notice.id)
            .await?
            .map(ChangeEvent::CommentInserted),
        (Table::Comments, _) => None,
    };
    Ok(event)
}
