use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// Listings younger than this carry the "new" badge.
pub const NEW_BADGE_WINDOW: Duration = Duration::hours(48);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub city: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub ratings: Vec<i32>,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default)]
    pub likes: i32,
    #[serde(default)]
    pub dislikes: i32,
    /// Derived from the comments table; change notifications never carry it.
    #[serde(default)]
    pub comment_count: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Listing {
    pub fn average_rating(&self) -> f64 {
        average_rating(&self.ratings)
    }

    pub fn rating_count(&self) -> usize {
        self.ratings.len()
    }

    pub fn is_new(&self, now: OffsetDateTime) -> bool {
        now - self.created_at < NEW_BADGE_WINDOW
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => Some((lat, lng)),
            _ => None,
        }
    }
}

/// Arithmetic mean of the ratings, zero when there are none.
pub fn average_rating(ratings: &[i32]) -> f64 {
    if ratings.is_empty() {
        return 0.0;
    }
    let sum: i64 = ratings.iter().map(|value| i64::from(*value)).sum();
    sum as f64 / ratings.len() as f64
}

/// A validated registration, ready to be inserted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewListing {
    pub name: String,
    pub phone: String,
    pub city: String,
    pub bio: String,
    pub address: Option<String>,
    pub image_url: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(ratings: Vec<i32>, created_at: OffsetDateTime) -> Listing {
        Listing {
            id: Uuid::new_v4(),
            name: "Youssef".into(),
            phone: "0612345678".into(),
            city: "Rabat".into(),
            bio: String::new(),
            address: None,
            image_url: None,
            latitude: Some(34.02),
            longitude: None,
            ratings,
            is_verified: false,
            likes: 0,
            dislikes: 0,
            comment_count: 0,
            created_at,
        }
    }

    #[test]
    fn average_of_empty_ratings_is_zero() {
        assert_eq!(average_rating(&[]), 0.0);
    }

    #[test]
    fn average_is_the_arithmetic_mean() {
        let now = OffsetDateTime::now_utc();
        assert_eq!(listing(vec![5, 4, 3], now).average_rating(), 4.0);
        assert_eq!(listing(vec![5, 4], now).average_rating(), 4.5);
    }

    #[test]
    fn new_badge_expires_after_two_days() {
        let now = OffsetDateTime::now_utc();
        assert!(listing(vec![], now - Duration::hours(47)).is_new(now));
        assert!(!listing(vec![], now - Duration::hours(49)).is_new(now));
    }

    #[test]
    fn partial_coordinates_are_ignored() {
        let now = OffsetDateTime::now_utc();
        assert_eq!(listing(vec![], now).coordinates(), None);
    }
}
