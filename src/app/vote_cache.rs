use std::collections::HashMap;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::domain::vote::{VoteDirection, VoterId};

pub const VOTE_CACHE_TTL: Duration = Duration::from_secs(15 * 60);
pub const VOTE_CACHE_CAPACITY: usize = 10_000;

struct Entry {
    votes: HashMap<Uuid, VoteDirection>,
    loaded_at: Instant,
}

/// Per-voter copies of the stored vote records. Entries expire after the TTL
/// and the oldest is evicted once the cache is full; an evicted voter is
/// simply fetched again.
pub struct VoteCache {
    ttl: Duration,
    capacity: usize,
    entries: HashMap<VoterId, Entry>,
}

impl VoteCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, voter: &VoterId, now: Instant) -> Option<&HashMap<Uuid, VoteDirection>> {
        self.entries
            .get(voter)
            .filter(|entry| now.duration_since(entry.loaded_at) < self.ttl)
            .map(|entry| &entry.votes)
    }

    /// Store a freshly fetched vote map, replacing any earlier copy.
    pub fn insert(&mut self, voter: VoterId, votes: HashMap<Uuid, VoteDirection>, now: Instant) {
        if !self.entries.contains_key(&voter) && self.entries.len() >= self.capacity {
            let ttl = self.ttl;
            self.entries
                .retain(|_, entry| now.duration_since(entry.loaded_at) < ttl);
            if self.entries.len() >= self.capacity {
                self.evict_oldest();
            }
        }
        self.entries.insert(
            voter,
            Entry {
                votes,
                loaded_at: now,
            },
        );
    }

    /// Record one vote for a voter whose map is cached. Voters without a live
    /// copy are left alone; their next read goes to the store.
    pub fn set(&mut self, voter: &VoterId, listing_id: Uuid, vote: Option<VoteDirection>, now: Instant) {
        let ttl = self.ttl;
        let Some(entry) = self
            .entries
            .get_mut(voter)
            .filter(|entry| now.duration_since(entry.loaded_at) < ttl)
        else {
            return;
        };
        match vote {
            Some(direction) => entry.votes.insert(listing_id, direction),
            None => entry.votes.remove(&listing_id),
        };
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.loaded_at)
            .map(|(voter, _)| voter.clone());
        if let Some(voter) = oldest {
            self.entries.remove(&voter);
        }
    }
}
