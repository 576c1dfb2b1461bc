use anyhow::{anyhow, Result};
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::Row;
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::comment::{Comment, NewComment};
use crate::domain::listing::{Listing, NewListing};
use crate::domain::vote::{StoredVote, VoteDirection, VoteTally, VoterId};
use crate::infra::db::Db;

/// Table-level access to the hosted backend.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    async fn ping(&self) -> Result<()>;

    /// Every listing, without comment counts.
    async fn fetch_listings(&self) -> Result<Vec<Listing>>;

    /// One listing, without its comment count.
    async fn fetch_listing(&self, id: Uuid) -> Result<Option<Listing>>;

    async fn fetch_comment_counts(&self) -> Result<HashMap<Uuid, i64>>;

    async fn insert_listing(&self, listing: &NewListing) -> Result<Listing>;

    /// Append one rating and return the ratings as stored.
    async fn append_rating(&self, listing_id: Uuid, rating: i32) -> Result<Vec<i32>>;

    /// Run the atomic vote procedure and return what it stored.
    async fn apply_vote(
        &self,
        listing_id: Uuid,
        voter: &VoterId,
        direction: VoteDirection,
    ) -> Result<StoredVote>;

    async fn fetch_votes(&self, voter: &VoterId) -> Result<HashMap<Uuid, VoteDirection>>;

    /// Comments for one listing, newest first.
    async fn fetch_comments(&self, listing_id: Uuid) -> Result<Vec<Comment>>;

    async fn fetch_comment(&self, id: Uuid) -> Result<Option<Comment>>;

    async fn insert_comment(&self, comment: &NewComment) -> Result<Comment>;
}

const LISTING_COLUMNS: &str = "id, name, phone, city, bio, address, image_url, latitude, longitude, \
                               ratings, is_verified, likes, dislikes, created_at";

#[derive(Clone)]
pub struct PgStore {
    db: Db,
}

impl PgStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl DirectoryStore for PgStore {
    async fn ping(&self) -> Result<()> {
        self.db.ping().await
    }

    async fn fetch_listings(&self) -> Result<Vec<Listing>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM listings ORDER BY created_at, id",
            LISTING_COLUMNS
        ))
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.iter().map(listing_from_row).collect())
    }

    async fn fetch_listing(&self, id: Uuid) -> Result<Option<Listing>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM listings WHERE id = $1",
            LISTING_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.as_ref().map(listing_from_row))
    }

    async fn fetch_comment_counts(&self) -> Result<HashMap<Uuid, i64>> {
        let rows = sqlx::query(
            "SELECT listing_id, COUNT(*) AS comment_count \
             FROM comments \
             GROUP BY listing_id",
        )
        .fetch_all(self.db.pool())
        .await?;

        let mut counts = HashMap::with_capacity(rows.len());
        for row in rows {
            counts.insert(row.get("listing_id"), row.get("comment_count"));
        }
        Ok(counts)
    }

    async fn insert_listing(&self, listing: &NewListing) -> Result<Listing> {
        let row = sqlx::query(&format!(
            "INSERT INTO listings (name, phone, city, bio, address, image_url, latitude, longitude) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {}",
            LISTING_COLUMNS
        ))
        .bind(&listing.name)
        .bind(&listing.phone)
        .bind(&listing.city)
        .bind(&listing.bio)
        .bind(&listing.address)
        .bind(&listing.image_url)
        .bind(listing.latitude)
        .bind(listing.longitude)
        .fetch_one(self.db.pool())
        .await?;

        Ok(listing_from_row(&row))
    }

    async fn append_rating(&self, listing_id: Uuid, rating: i32) -> Result<Vec<i32>> {
        let row = sqlx::query(
            "UPDATE listings SET ratings = array_append(ratings, $2) \
             WHERE id = $1 \
             RETURNING ratings",
        )
        .bind(listing_id)
        .bind(rating)
        .fetch_optional(self.db.pool())
        .await?;

        let row = row.ok_or_else(|| anyhow!("listing {} not found", listing_id))?;
        Ok(row.get("ratings"))
    }

    async fn apply_vote(
        &self,
        listing_id: Uuid,
        voter: &VoterId,
        direction: VoteDirection,
    ) -> Result<StoredVote> {
        let row = sqlx::query("SELECT likes, dislikes, vote_type FROM handle_vote($1, $2, $3)")
            .bind(listing_id)
            .bind(voter.as_str())
            .bind(direction.as_db())
            .fetch_optional(self.db.pool())
            .await?;

        let row = row.ok_or_else(|| anyhow!("listing {} not found", listing_id))?;
        let vote_type: Option<String> = row.get("vote_type");
        let vote = match vote_type {
            Some(vote_type) => Some(
                VoteDirection::from_db(&vote_type)
                    .ok_or_else(|| anyhow!("unknown vote type: {}", vote_type))?,
            ),
            None => None,
        };
        Ok(StoredVote {
            tally: VoteTally {
                likes: row.get("likes"),
                dislikes: row.get("dislikes"),
            },
            vote,
        })
    }

    async fn fetch_votes(&self, voter: &VoterId) -> Result<HashMap<Uuid, VoteDirection>> {
        let rows = sqlx::query("SELECT listing_id, vote_type FROM votes WHERE voter_id = $1")
            .bind(voter.as_str())
            .fetch_all(self.db.pool())
            .await?;

        let mut votes = HashMap::with_capacity(rows.len());
        for row in rows {
            let vote_type: String = row.get("vote_type");
            let direction = VoteDirection::from_db(&vote_type)
                .ok_or_else(|| anyhow!("unknown vote type: {}", vote_type))?;
            votes.insert(row.get("listing_id"), direction);
        }
        Ok(votes)
    }

    async fn fetch_comments(&self, listing_id: Uuid) -> Result<Vec<Comment>> {
        let rows = sqlx::query(
            "SELECT id, created_at, listing_id, author, content \
             FROM comments \
             WHERE listing_id = $1 \
             ORDER BY created_at DESC, id DESC",
        )
        .bind(listing_id)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.iter().map(comment_from_row).collect())
    }

    async fn fetch_comment(&self, id: Uuid) -> Result<Option<Comment>> {
        let row = sqlx::query(
            "SELECT id, created_at, listing_id, author, content FROM comments WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.as_ref().map(comment_from_row))
    }

    async fn insert_comment(&self, comment: &NewComment) -> Result<Comment> {
        let row = sqlx::query(
            "INSERT INTO comments (listing_id, author, content) VALUES ($1, $2, $3) \
             RETURNING id, created_at, listing_id, author, content",
        )
        .bind(comment.listing_id)
        .bind(&comment.author)
        .bind(&comment.content)
        .fetch_one(self.db.pool())
        .await?;

        Ok(comment_from_row(&row))
    }
}

fn listing_from_row(row: &PgRow) -> Listing {
    Listing {
        id: row.get("id"),
        name: row.get("name"),
        phone: row.get("phone"),
        city: row.get("city"),
        bio: row.get("bio"),
        address: row.get("address"),
        image_url: row.get("image_url"),
        latitude: row.get("latitude"),
        longitude: row.get("longitude"),
        ratings: row.get("ratings"),
        is_verified: row.get("is_verified"),
        likes: row.get("likes"),
        dislikes: row.get("dislikes"),
        comment_count: 0,
        created_at: row.get("created_at"),
    }
}

fn comment_from_row(row: &PgRow) -> Comment {
    Comment {
        id: row.get("id"),
        created_at: row.get("created_at"),
        listing_id: row.get("listing_id"),
        author: row.get("author"),
        content: row.get("content"),
    }
}
