use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::comment::Comment;
use crate::domain::listing::Listing;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    Listings,
    Comments,
}

impl Table {
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "listings" => Some(Self::Listings),
            "comments" => Some(Self::Comments),
            _ => None,
        }
    }
}

/// A row-level change pushed by the backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "record", rename_all = "snake_case")]
pub enum ChangeEvent {
    ListingInserted(Listing),
    ListingUpdated(Listing),
    ListingDeleted { id: Uuid },
    CommentInserted(Comment),
}

impl ChangeEvent {
    pub fn table(&self) -> Table {
        match self {
            Self::ListingInserted(_) | Self::ListingUpdated(_) | Self::ListingDeleted { .. } => {
                Table::Listings
            }
            Self::CommentInserted(_) => Table::Comments,
        }
    }

    /// The listing the change belongs to.
    pub fn listing_id(&self) -> Uuid {
        match self {
            Self::ListingInserted(listing) | Self::ListingUpdated(listing) => listing.id,
            Self::ListingDeleted { id } => *id,
            Self::CommentInserted(comment) => comment.listing_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

impl Operation {
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "INSERT" => Some(Self::Insert),
            "UPDATE" => Some(Self::Update),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// A notification as sent by the database: which row changed and how, but
/// not its contents. The listener re-reads the row before publishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeNotice {
    pub table: Table,
    pub operation: Operation,
    pub id: Uuid,
}

impl ChangeNotice {
    /// Decode a payload of the shape `{"table", "type", "id"}`.
    ///
    /// Returns `None` for anything without an identity or outside the
    /// tables and operations the directory tracks.
    pub fn decode(payload: &Value) -> Option<Self> {
        let table = Table::from_db(payload.get("table")?.as_str()?)?;
        let operation = Operation::from_db(payload.get("type")?.as_str()?)?;
        let id = payload.get("id")?.as_str()?.parse().ok()?;

        match (table, operation) {
            (Table::Listings, _) | (Table::Comments, Operation::Insert) => Some(Self {
                table,
                operation,
                id,
            }),
            (Table::Comments, _) => None,
        }
    }
}
