use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::domain::listing::Listing;

pub const ALL_CITIES: &str = "All";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    #[default]
    Rating,
    Likes,
}

impl SortMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "rating" => Some(Self::Rating),
            "likes" => Some(Self::Likes),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectoryFilter {
    /// Exact city, or `None` for every city.
    pub city: Option<String>,
    pub query: String,
    pub sort: SortMode,
}

impl DirectoryFilter {
    pub fn new(city: Option<&str>, query: Option<&str>, sort: SortMode) -> Self {
        let city = city
            .map(str::trim)
            .filter(|city| !city.is_empty() && *city != ALL_CITIES)
            .map(str::to_string);
        Self {
            city,
            query: query.unwrap_or_default().to_string(),
            sort,
        }
    }

    pub fn has_query(&self) -> bool {
        !self.query.trim().is_empty()
    }

    pub fn matches(&self, listing: &Listing) -> bool {
        if let Some(city) = &self.city {
            if listing.city != *city {
                return false;
            }
        }

        let needle = self.query.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }

        listing.name.to_lowercase().contains(&needle)
            || listing.city.to_lowercase().contains(&needle)
            || listing
                .address
                .as_deref()
                .map_or(false, |address| address.to_lowercase().contains(&needle))
    }

    /// Filter then sort. The sort is stable, so full ties keep their input order.
    pub fn apply(&self, listings: &[Listing]) -> Vec<Listing> {
        let mut selected: Vec<Listing> = listings
            .iter()
            .filter(|listing| self.matches(listing))
            .cloned()
            .collect();
        selected.sort_by(|a, b| compare(self.sort, a, b));
        selected
    }
}

fn compare(sort: SortMode, a: &Listing, b: &Listing) -> Ordering {
    let by_rating = b.average_rating().total_cmp(&a.average_rating());
    match sort {
        SortMode::Rating => by_rating.then_with(|| b.rating_count().cmp(&a.rating_count())),
        SortMode::Likes => b.likes.cmp(&a.likes).then(by_rating),
    }
}
