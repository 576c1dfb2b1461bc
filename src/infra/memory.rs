//! Process-local stand-in for the hosted backend.
//!
//! Mirrors the database behaviour the directory relies on: the vote
//! procedure's three cases, newest-first comments, and a change
//! notification for every write. Reads and writes can be made to fail.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::change::ChangeEvent;
use crate::domain::comment::{Comment, NewComment};
use crate::domain::listing::{Listing, NewListing};
use crate::domain::vote::{StoredVote, VoteDirection, VoteTally, VoterId};
use crate::infra::realtime::RealtimeHub;
use crate::infra::storage::ImageStore;
use crate::infra::store::DirectoryStore;

#[derive(Default)]
struct Tables {
    listings: Vec<Listing>,
    comments: Vec<Comment>,
    votes: HashMap<(VoterId, Uuid), VoteDirection>,
}

#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
    hub: Option<RealtimeHub>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a change event for every write, like the database triggers.
    pub fn with_realtime(hub: RealtimeHub) -> Self {
        Self {
            hub: Some(hub),
            ..Self::default()
        }
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Insert a listing directly, bypassing notifications.
    pub fn seed_listing(&self, listing: Listing) {
        self.lock().listings.push(listing);
    }

    pub fn seed_comment(&self, comment: Comment) {
        self.lock().comments.push(comment);
    }

    pub fn seed_vote(&self, voter: &VoterId, listing_id: Uuid, direction: VoteDirection) {
        self.lock().votes.insert((voter.clone(), listing_id), direction);
    }

    pub fn listing(&self, id: Uuid) -> Option<Listing> {
        self.lock().listings.iter().find(|listing| listing.id == id).cloned()
    }

    pub fn vote_of(&self, voter: &VoterId, listing_id: Uuid) -> Option<VoteDirection> {
        self.lock().votes.get(&(voter.clone(), listing_id)).copied()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tables> {
        // A panicking test must not poison every other assertion.
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_read(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            bail!("backend unavailable");
        }
        Ok(())
    }

    fn check_write(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("backend rejected the write");
        }
        Ok(())
    }

    fn notify(&self, event: ChangeEvent) {
        if let Some(hub) = &self.hub {
            hub.publish(event);
        }
    }
}

#[async_trait]
impl DirectoryStore for InMemoryStore {
    async fn ping(&self) -> Result<()> {
        self.check_read()
    }

    async fn fetch_listings(&self) -> Result<Vec<Listing>> {
        self.check_read()?;
        Ok(self.lock().listings.clone())
    }

    async fn fetch_listing(&self, id: Uuid) -> Result<Option<Listing>> {
        self.check_read()?;
        Ok(self.listing(id))
    }

    async fn fetch_comment_counts(&self) -> Result<HashMap<Uuid, i64>> {
        self.check_read()?;
        let mut counts = HashMap::new();
        for comment in &self.lock().comments {
            *counts.entry(comment.listing_id).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn insert_listing(&self, listing: &NewListing) -> Result<Listing> {
        self.check_write()?;
        let stored = Listing {
            id: Uuid::new_v4(),
            name: listing.name.clone(),
            phone: listing.phone.clone(),
            city: listing.city.clone(),
            bio: listing.bio.clone(),
            address: listing.address.clone(),
            image_url: listing.image_url.clone(),
            latitude: listing.latitude,
            longitude: listing.longitude,
            ratings: Vec::new(),
            is_verified: false,
            likes: 0,
            dislikes: 0,
            comment_count: 0,
            created_at: OffsetDateTime::now_utc(),
        };
        self.lock().listings.push(stored.clone());
        self.notify(ChangeEvent::ListingInserted(stored.clone()));
        Ok(stored)
    }

    async fn append_rating(&self, listing_id: Uuid, rating: i32) -> Result<Vec<i32>> {
        self.check_write()?;
        let updated = {
            let mut tables = self.lock();
            let listing = tables
                .listings
                .iter_mut()
                .find(|listing| listing.id == listing_id)
                .ok_or_else(|| anyhow!("listing {} not found", listing_id))?;
            listing.ratings.push(rating);
            listing.clone()
        };
        let ratings = updated.ratings.clone();
        self.notify(ChangeEvent::ListingUpdated(updated));
        Ok(ratings)
    }

    async fn apply_vote(
        &self,
        listing_id: Uuid,
        voter: &VoterId,
        direction: VoteDirection,
    ) -> Result<StoredVote> {
        self.check_write()?;
        let (updated, next) = {
            let mut tables = self.lock();
            let key = (voter.clone(), listing_id);
            let previous = tables.votes.get(&key).copied();
            let listing = tables
                .listings
                .iter_mut()
                .find(|listing| listing.id == listing_id)
                .ok_or_else(|| anyhow!("listing {} not found", listing_id))?;

            let counter = |listing: &mut Listing, direction: VoteDirection, delta: i32| {
                let value = match direction {
                    VoteDirection::Like => &mut listing.likes,
                    VoteDirection::Dislike => &mut listing.dislikes,
                };
                *value = (*value + delta).max(0);
            };

            let next = match previous {
                None => {
                    counter(listing, direction, 1);
                    Some(direction)
                }
                Some(previous) if previous == direction => {
                    counter(listing, direction, -1);
                    None
                }
                Some(previous) => {
                    counter(listing, previous, -1);
                    counter(listing, direction, 1);
                    Some(direction)
                }
            };
            let updated = listing.clone();

            match next {
                Some(direction) => tables.votes.insert(key, direction),
                None => tables.votes.remove(&key),
            };
            (updated, next)
        };

        let stored = StoredVote {
            tally: VoteTally {
                likes: updated.likes,
                dislikes: updated.dislikes,
            },
            vote: next,
        };
        self.notify(ChangeEvent::ListingUpdated(updated));
        Ok(stored)
    }

    async fn fetch_votes(&self, voter: &VoterId) -> Result<HashMap<Uuid, VoteDirection>> {
        self.check_read()?;
        Ok(self
            .lock()
            .votes
            .iter()
            .filter(|((owner, _), _)| owner == voter)
            .map(|((_, listing_id), direction)| (*listing_id, *direction))
            .collect())
    }

    async fn fetch_comments(&self, listing_id: Uuid) -> Result<Vec<Comment>> {
        self.check_read()?;
        let mut comments: Vec<Comment> = self
            .lock()
            .comments
            .iter()
            .filter(|comment| comment.listing_id == listing_id)
            .cloned()
            .collect();
        comments.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(comments)
    }

    async fn fetch_comment(&self, id: Uuid) -> Result<Option<Comment>> {
        self.check_read()?;
        Ok(self
            .lock()
            .comments
            .iter()
            .find(|comment| comment.id == id)
            .cloned())
    }

    async fn insert_comment(&self, comment: &NewComment) -> Result<Comment> {
        self.check_write()?;
        let stored = Comment {
            id: Uuid::new_v4(),
            created_at: OffsetDateTime::now_utc(),
            listing_id: comment.listing_id,
            author: comment.author.clone(),
            content: comment.content.clone(),
        };
        self.lock().comments.push(stored.clone());
        self.notify(ChangeEvent::CommentInserted(stored.clone()));
        Ok(stored)
    }
}

/// Image store double that records uploads instead of sending them anywhere.
#[derive(Default)]
pub struct InMemoryImages {
    uploads: Mutex<Vec<(String, String, usize)>>,
    fail: AtomicBool,
    counter: AtomicUsize,
}

impl InMemoryImages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// `(file name, content type, byte length)` per upload.
    pub fn uploads(&self) -> Vec<(String, String, usize)> {
        self.uploads
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl ImageStore for InMemoryImages {
    async fn upload(&self, file_name: &str, content_type: &str, body: Bytes) -> Result<String> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("storage rejected the upload");
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        self.uploads
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((file_name.to_string(), content_type.to_string(), body.len()));
        Ok(format!("memory://plumber-images/public/{}-{}", n, file_name))
    }
}
