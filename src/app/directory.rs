use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::error::DirectoryError;
use crate::app::toasts::ToastQueue;
use crate::app::validation::{FieldErrors, ImageUpload, ListingDraft};
use crate::app::vote_cache::{VoteCache, VOTE_CACHE_CAPACITY, VOTE_CACHE_TTL};
use crate::app::voting::cast_vote;
use crate::domain::change::ChangeEvent;
use crate::domain::listing::Listing;
use crate::domain::vote::{VoteDirection, VoteTally, VoterId};
use crate::infra::realtime::{ChangeFilter, RealtimeHub};
use crate::infra::storage::ImageStore;
use crate::infra::store::DirectoryStore;

pub const MIN_RATING: i32 = 1;
pub const MAX_RATING: i32 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    Loading,
    Ready,
    Failed(String),
}

/// Where a vote left the listing and the voter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VoteReceipt {
    pub listing_id: Uuid,
    pub likes: i32,
    pub dislikes: i32,
    pub vote: Option<VoteDirection>,
}

struct Mirror {
    state: LoadState,
    listings: Vec<Listing>,
}

/// In-memory mirror of the listings table. Every mutation goes through here:
/// applied locally first, then persisted, and rolled back if the backend
/// refuses it.
pub struct DirectoryController {
    store: Arc<dyn DirectoryStore>,
    images: Arc<dyn ImageStore>,
    toasts: Arc<ToastQueue>,
    upload_max_bytes: usize,
    mirror: RwLock<Mirror>,
    votes: RwLock<VoteCache>,
}

impl DirectoryController {
    pub fn new(
        store: Arc<dyn DirectoryStore>,
        images: Arc<dyn ImageStore>,
        toasts: Arc<ToastQueue>,
        upload_max_bytes: usize,
    ) -> Self {
        Self {
            store,
            images,
            toasts,
            upload_max_bytes,
            mirror: RwLock::new(Mirror {
                state: LoadState::Loading,
                listings: Vec::new(),
            }),
            votes: RwLock::new(VoteCache::new(VOTE_CACHE_TTL, VOTE_CACHE_CAPACITY)),
        }
    }

    /// Fetch every listing and its comment count. A failed count query only
    /// zeroes the counts; a failed listing query leaves the mirror in
    /// `Failed` until the next reload.
    pub async fn reload(&self) -> Result<usize, DirectoryError> {
        self.mirror.write().await.state = LoadState::Loading;

        let listings = match self.store.fetch_listings().await {
            Ok(listings) => listings,
            Err(err) => {
                error!(error = ?err, "failed to load listings");
                let mut mirror = self.mirror.write().await;
                mirror.state = LoadState::Failed(err.to_string());
                mirror.listings.clear();
                return Err(DirectoryError::Backend(err));
            }
        };

        let counts = match self.store.fetch_comment_counts().await {
            Ok(counts) => counts,
            Err(err) => {
                warn!(error = ?err, "failed to load comment counts");
                HashMap::new()
            }
        };

        let listings: Vec<Listing> = listings
            .into_iter()
            .map(|mut listing| {
                listing.comment_count = counts.get(&listing.id).copied().unwrap_or(0);
                listing
            })
            .collect();

        let loaded = listings.len();
        let mut mirror = self.mirror.write().await;
        mirror.listings = listings;
        mirror.state = LoadState::Ready;
        info!(listings = loaded, "listings loaded");
        Ok(loaded)
    }

    pub async fn load_state(&self) -> LoadState {
        self.mirror.read().await.state.clone()
    }

    pub async fn snapshot(&self) -> Vec<Listing> {
        self.mirror.read().await.listings.clone()
    }

    pub async fn get(&self, id: Uuid) -> Option<Listing> {
        self.mirror
            .read()
            .await
            .listings
            .iter()
            .find(|listing| listing.id == id)
            .cloned()
    }

    /// The voter's standing votes. A failed fetch is reported and yields an
    /// empty map without caching it, so the next call asks the store again.
    pub async fn votes_for(&self, voter: &VoterId) -> HashMap<Uuid, VoteDirection> {
        if let Some(votes) = self.votes.read().await.get(voter, Instant::now()) {
            return votes.clone();
        }

        match self.store.fetch_votes(voter).await {
            Ok(votes) => {
                let mut cache = self.votes.write().await;
                cache.insert(voter.clone(), votes.clone(), Instant::now());
                debug!(voter = %voter, cached_voters = cache.len(), "vote map loaded");
                votes
            }
            Err(err) => {
                warn!(error = ?err, voter = %voter, "failed to load votes");
                self.toasts.error(voter, "vote.loadFailed");
                HashMap::new()
            }
        }
    }

    /// Upload the optional photo, then insert the listing. Nothing is
    /// written when validation fails, and a failed upload aborts the insert.
    pub async fn submit(
        &self,
        client: &VoterId,
        draft: &ListingDraft,
        image: Option<ImageUpload>,
    ) -> Result<Listing, DirectoryError> {
        let mut errors = FieldErrors::default();
        let listing = match draft.validate() {
            Ok(listing) => Some(listing),
            Err(field_errors) => {
                errors.merge(field_errors);
                None
            }
        };
        if let Some(image) = &image {
            if let Err(field_errors) = image.validate(self.upload_max_bytes) {
                errors.merge(field_errors);
            }
        }
        let mut listing = match listing {
            Some(listing) if errors.is_empty() => listing,
            _ => return Err(DirectoryError::Invalid(errors)),
        };

        if let Some(image) = image {
            let url = self
                .images
                .upload(&image.file_name, &image.content_type, image.bytes)
                .await
                .map_err(|err| {
                    error!(error = ?err, "failed to upload listing image");
                    self.toasts.error(client, "form.submitError");
                    DirectoryError::Upload(err)
                })?;
            listing.image_url = Some(url);
        }

        let stored = match self.store.insert_listing(&listing).await {
            Ok(stored) => stored,
            Err(err) => {
                error!(error = ?err, "failed to insert listing");
                self.toasts.error(client, "form.submitError");
                return Err(DirectoryError::Backend(err));
            }
        };

        {
            let mut mirror = self.mirror.write().await;
            if !mirror.listings.iter().any(|listing| listing.id == stored.id) {
                mirror.listings.push(Listing {
                    comment_count: 0,
                    ..stored.clone()
                });
            }
        }

        info!(listing_id = %stored.id, city = %stored.city, "listing submitted");
        self.toasts.success(client, "form.successMessage");
        Ok(stored)
    }

    /// Append a 1..=5 rating, optimistically.
    pub async fn rate(
        &self,
        client: &VoterId,
        id: Uuid,
        value: i32,
    ) -> Result<Listing, DirectoryError> {
        if !(MIN_RATING..=MAX_RATING).contains(&value) {
            return Err(DirectoryError::InvalidRating(value));
        }

        let previous = self
            .update_listing(id, |listing| {
                let previous = listing.ratings.clone();
                listing.ratings.push(value);
                previous
            })
            .await
            .ok_or(DirectoryError::NotFound(id))?;

        match self.store.append_rating(id, value).await {
            Ok(confirmed) => {
                self.toasts.success(client, "card.ratingThankYou");
                self.update_listing(id, |listing| {
                    listing.ratings = confirmed;
                    listing.clone()
                })
                .await
                .ok_or(DirectoryError::NotFound(id))
            }
            Err(err) => {
                error!(error = ?err, listing_id = %id, "failed to save rating");
                self.update_listing(id, |listing| listing.ratings = previous)
                    .await;
                self.toasts.error(client, "card.ratingFailed");
                Err(DirectoryError::Backend(err))
            }
        }
    }

    /// Like or dislike. Repeating the standing vote retracts it and voting the
    /// other way switches it. On success the stored tallies and the stored
    /// vote replace the local guesses.
    pub async fn vote(
        &self,
        voter: Option<&VoterId>,
        id: Uuid,
        direction: VoteDirection,
    ) -> Result<VoteReceipt, DirectoryError> {
        let voter = voter.ok_or(DirectoryError::VoterUnknown)?;
        let previous_vote = self.votes_for(voter).await.get(&id).copied();

        let (previous_tally, outcome) = self
            .update_listing(id, |listing| {
                let tally = VoteTally {
                    likes: listing.likes,
                    dislikes: listing.dislikes,
                };
                let outcome = cast_vote(tally, previous_vote, direction);
                listing.likes = outcome.tally.likes;
                listing.dislikes = outcome.tally.dislikes;
                (tally, outcome)
            })
            .await
            .ok_or(DirectoryError::NotFound(id))?;
        self.set_vote(voter, id, outcome.vote).await;

        match self.store.apply_vote(id, voter, direction).await {
            Ok(stored) => {
                self.update_listing(id, |listing| {
                    listing.likes = stored.tally.likes;
                    listing.dislikes = stored.tally.dislikes;
                })
                .await;
                self.set_vote(voter, id, stored.vote).await;
                debug!(listing_id = %id, voter = %voter, ?direction, vote = ?stored.vote, "vote saved");
                Ok(VoteReceipt {
                    listing_id: id,
                    likes: stored.tally.likes,
                    dislikes: stored.tally.dislikes,
                    vote: stored.vote,
                })
            }
            Err(err) => {
                error!(error = ?err, listing_id = %id, voter = %voter, "failed to save vote");
                self.update_listing(id, |listing| {
                    listing.likes = previous_tally.likes;
                    listing.dislikes = previous_tally.dislikes;
                })
                .await;
                self.set_vote(voter, id, previous_vote).await;
                self.toasts.error(voter, "vote.saveFailed");
                Err(DirectoryError::Backend(err))
            }
        }
    }

    /// Merge one change notification into the mirror.
    pub async fn apply_change(&self, event: ChangeEvent) {
        let mut mirror = self.mirror.write().await;
        match event {
            ChangeEvent::ListingInserted(listing) => {
                if mirror.listings.iter().any(|existing| existing.id == listing.id) {
                    return;
                }
                mirror.listings.push(Listing {
                    comment_count: 0,
                    ..listing
                });
            }
            ChangeEvent::ListingUpdated(listing) => {
                if let Some(existing) = mirror
                    .listings
                    .iter_mut()
                    .find(|existing| existing.id == listing.id)
                {
                    let comment_count = existing.comment_count;
                    *existing = Listing {
                        comment_count,
                        ..listing
                    };
                }
            }
            ChangeEvent::ListingDeleted { id } => {
                mirror.listings.retain(|listing| listing.id != id);
            }
            ChangeEvent::CommentInserted(comment) => {
                if let Some(existing) = mirror
                    .listings
                    .iter_mut()
                    .find(|existing| existing.id == comment.listing_id)
                {
                    existing.comment_count += 1;
                }
            }
        }
    }

    /// Follow the hub until it closes.
    pub fn spawn_realtime(self: Arc<Self>, hub: &RealtimeHub) -> JoinHandle<()> {
        let mut subscription = hub.subscribe(ChangeFilter::all());
        tokio::spawn(async move {
            while let Some(event) = subscription.next().await {
                debug!(listing_id = %event.listing_id(), table = ?event.table(), "applying change");
                self.apply_change(event).await;
            }
            info!("realtime feed closed");
        })
    }

    async fn update_listing<T>(&self, id: Uuid, f: impl FnOnce(&mut Listing) -> T) -> Option<T> {
        let mut mirror = self.mirror.write().await;
        mirror
            .listings
            .iter_mut()
            .find(|listing| listing.id == id)
            .map(f)
    }

    async fn set_vote(&self, voter: &VoterId, id: Uuid, vote: Option<VoteDirection>) {
        self.votes
            .write()
            .await
            .set(voter, id, vote, Instant::now());
    }
}
