use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub listing_id: Uuid,
    pub author: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewComment {
    pub listing_id: Uuid,
    pub author: String,
    pub content: String,
}
