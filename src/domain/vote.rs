use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::net::IpAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteDirection {
    Like,
    Dislike,
}

impl VoteDirection {
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "like" => Some(Self::Like),
            "dislike" => Some(Self::Dislike),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::Dislike => "dislike",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    pub likes: i32,
    pub dislikes: i32,
}

/// What the vote procedure stored: the listing's tallies and the voter's
/// standing vote, `None` once retracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredVote {
    pub tally: VoteTally,
    pub vote: Option<VoteDirection>,
}

/// Opaque per-client identity used to own votes and toasts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VoterId(String);

impl VoterId {
    /// Derive the identifier from the client IP so raw addresses never reach storage.
    pub fn from_ip(ip: IpAddr) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(ip.to_string().as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VoterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Enough to correlate log lines without printing the whole hash.
        f.write_str(&self.0[..self.0.len().min(12)])
    }
}
