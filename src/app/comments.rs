use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{error, info};
use uuid::Uuid;

use crate::app::error::DirectoryError;
use crate::app::toasts::ToastQueue;
use crate::app::validation::CommentDraft;
use crate::domain::change::ChangeEvent;
use crate::domain::comment::Comment;
use crate::domain::vote::VoterId;
use crate::infra::realtime::{ChangeFilter, RealtimeHub, Subscription};
use crate::infra::store::DirectoryStore;

/// The comment list of one detail view, kept current from the change feed.
/// Dropping the thread drops its subscription.
pub struct CommentThread {
    listing_id: Uuid,
    comments: Vec<Comment>,
    subscription: Subscription,
}

impl CommentThread {
    /// Subscribe first, then fetch, so no insert falls between the two.
    pub async fn open(
        store: &dyn DirectoryStore,
        hub: &RealtimeHub,
        listing_id: Uuid,
    ) -> Result<Self, DirectoryError> {
        let subscription = hub.subscribe(ChangeFilter::comments_for(listing_id));
        let comments = store.fetch_comments(listing_id).await.map_err(|err| {
            error!(error = ?err, listing_id = %listing_id, "failed to load comments");
            DirectoryError::Backend(err)
        })?;

        Ok(Self {
            listing_id,
            comments,
            subscription,
        })
    }

    pub fn comments(&self) -> &[Comment] {
        &self.comments
    }

    /// Put `comment` at the head unless it belongs elsewhere or is already shown.
    pub fn apply_insert(&mut self, comment: Comment) -> bool {
        if comment.listing_id != self.listing_id
            || self.comments.iter().any(|existing| existing.id == comment.id)
        {
            return false;
        }
        self.comments.insert(0, comment);
        true
    }

    /// Wait for the next comment that actually changes the thread.
    pub async fn next_insert(&mut self) -> Option<Comment> {
        while let Some(event) = self.subscription.next().await {
            if let ChangeEvent::CommentInserted(comment) = event {
                if self.apply_insert(comment.clone()) {
                    return Some(comment);
                }
            }
        }
        None
    }
}

/// Releases the in-flight slot when the submission finishes either way.
struct InFlight<'a> {
    slots: &'a Mutex<HashSet<(VoterId, Uuid)>>,
    key: (VoterId, Uuid),
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.key);
    }
}

pub struct CommentService {
    store: Arc<dyn DirectoryStore>,
    toasts: Arc<ToastQueue>,
    in_flight: Mutex<HashSet<(VoterId, Uuid)>>,
}

impl CommentService {
    pub fn new(store: Arc<dyn DirectoryStore>, toasts: Arc<ToastQueue>) -> Self {
        Self {
            store,
            toasts,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub async fn list(&self, listing_id: Uuid) -> Result<Vec<Comment>, DirectoryError> {
        self.store.fetch_comments(listing_id).await.map_err(|err| {
            error!(error = ?err, listing_id = %listing_id, "failed to load comments");
            DirectoryError::Backend(err)
        })
    }

    pub async fn open_thread(
        &self,
        hub: &RealtimeHub,
        listing_id: Uuid,
    ) -> Result<CommentThread, DirectoryError> {
        CommentThread::open(self.store.as_ref(), hub, listing_id).await
    }

    /// Validate and insert. One submission per client and listing at a time;
    /// the thread picks the new comment up from the change feed.
    pub async fn submit(
        &self,
        client: &VoterId,
        listing_id: Uuid,
        draft: &CommentDraft,
    ) -> Result<Comment, DirectoryError> {
        let comment = draft.validate(listing_id)?;
        let _slot = self.claim(client, listing_id)?;

        match self.store.insert_comment(&comment).await {
            Ok(stored) => {
                info!(listing_id = %listing_id, comment_id = %stored.id, "comment posted");
                self.toasts.success(client, "plumberDetail.commentSuccess");
                Ok(stored)
            }
            Err(err) => {
                error!(error = ?err, listing_id = %listing_id, "failed to post comment");
                self.toasts.error(client, "plumberDetail.commentError");
                Err(DirectoryError::Backend(err))
            }
        }
    }

    fn claim(&self, client: &VoterId, listing_id: Uuid) -> Result<InFlight<'_>, DirectoryError> {
        let key = (client.clone(), listing_id);
        let mut slots = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !slots.insert(key.clone()) {
            return Err(DirectoryError::InFlight);
        }
        Ok(InFlight {
            slots: &self.in_flight,
            key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::memory::InMemoryStore;
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;
    use time::OffsetDateTime;

    fn comment(listing_id: Uuid, minutes_ago: i64) -> Comment {
        Comment {
            id: Uuid::new_v4(),
            created_at: OffsetDateTime::now_utc() - time::Duration::minutes(minutes_ago),
            listing_id,
            author: "Amina".into(),
            content: format!("posted {} minutes ago", minutes_ago),
        }
    }

    fn client() -> VoterId {
        VoterId::from_ip(IpAddr::V4(Ipv4Addr::new(172, 16, 0, 9)))
    }

    #[tokio::test]
    async fn thread_opens_newest_first_and_dedupes_inserts() {
        let hub = RealtimeHub::new(16);
        let store = InMemoryStore::new();
        let listing_id = Uuid::new_v4();
        let old = comment(listing_id, 30);
        let recent = comment(listing_id, 1);
        store.seed_comment(old.clone());
        store.seed_comment(recent.clone());
        store.seed_comment(comment(Uuid::new_v4(), 5));

        let mut thread = CommentThread::open(&store, &hub, listing_id).await.unwrap();
        assert_eq!(
            thread.comments().iter().map(|c| c.id).collect::<Vec<_>>(),
            vec![recent.id, old.id]
        );

        assert!(!thread.apply_insert(recent.clone()));
        assert!(!thread.apply_insert(comment(Uuid::new_v4(), 0)));
        let fresh = comment(listing_id, 0);
        assert!(thread.apply_insert(fresh.clone()));
        assert_eq!(thread.comments()[0].id, fresh.id);
        assert_eq!(thread.comments().len(), 3);
    }

    #[tokio::test]
    async fn thread_follows_the_change_feed() {
        let hub = RealtimeHub::new(16);
        let store = Arc::new(InMemoryStore::with_realtime(hub.clone()));
        let toasts = Arc::new(ToastQueue::new(Duration::from_secs(5)));
        let service = CommentService::new(store.clone(), toasts);
        let listing_id = Uuid::new_v4();

        let mut thread = service.open_thread(&hub, listing_id).await.unwrap();
        let posted = service
            .submit(
                &client(),
                listing_id,
                &CommentDraft {
                    author: "Amina".into(),
                    content: "Travail soigné".into(),
                },
            )
            .await
            .unwrap();

        let seen = thread.next_insert().await.unwrap();
        assert_eq!(seen.id, posted.id);
        assert_eq!(thread.comments().len(), 1);

        drop(thread);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn failed_submission_leaves_the_thread_untouched() {
        let store = Arc::new(InMemoryStore::new());
        let toasts = Arc::new(ToastQueue::new(Duration::from_secs(5)));
        let service = CommentService::new(store.clone(), toasts.clone());
        let listing_id = Uuid::new_v4();
        store.set_fail_writes(true);

        let err = service
            .submit(
                &client(),
                listing_id,
                &CommentDraft {
                    author: "Amina".into(),
                    content: "Bien".into(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DirectoryError::Backend(_)));
        assert!(service.list(listing_id).await.unwrap().is_empty());
        assert_eq!(
            toasts.active(&client())[0].message_key,
            "plumberDetail.commentError"
        );

        // The slot is released, so a retry is not refused as in flight.
        store.set_fail_writes(false);
        service
            .submit(
                &client(),
                listing_id,
                &CommentDraft {
                    author: "Amina".into(),
                    content: "Bien".into(),
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn concurrent_submission_is_refused() {
        let store = Arc::new(InMemoryStore::new());
        let toasts = Arc::new(ToastQueue::new(Duration::from_secs(5)));
        let service = CommentService::new(store, toasts);
        let listing_id = Uuid::new_v4();

        let _held = service.claim(&client(), listing_id).unwrap();
        let err = service
            .submit(
                &client(),
                listing_id,
                &CommentDraft {
                    author: "Amina".into(),
                    content: "Bien".into(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DirectoryError::InFlight));
    }

    #[tokio::test]
    async fn empty_comment_never_reaches_the_store() {
        let store = Arc::new(InMemoryStore::new());
        store.set_fail_writes(true);
        let toasts = Arc::new(ToastQueue::new(Duration::from_secs(5)));
        let service = CommentService::new(store, toasts.clone());

        let err = service
            .submit(&client(), Uuid::new_v4(), &CommentDraft::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DirectoryError::Invalid(_)));
        assert!(toasts.active(&client()).is_empty());
    }
}
