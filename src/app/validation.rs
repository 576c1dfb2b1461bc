use bytes::Bytes;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use thiserror::Error;
use uuid::Uuid;

use crate::config::cities::is_known_city;
use crate::domain::comment::NewComment;
use crate::domain::listing::NewListing;

pub const ALLOWED_IMAGE_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/gif"];

/// Per-field failures, each a localisation key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Error)]
#[error("validation failed for {}", .0.keys().copied().collect::<Vec<_>>().join(", "))]
pub struct FieldErrors(BTreeMap<&'static str, &'static str>);

impl FieldErrors {
    pub fn add(&mut self, field: &'static str, message_key: &'static str) {
        self.0.entry(field).or_insert(message_key);
    }

    /// Keep the first message per field across both sets.
    pub fn merge(&mut self, other: FieldErrors) {
        for (field, key) in other.0 {
            self.add(field, key);
        }
    }

    pub fn get(&self, field: &str) -> Option<&'static str> {
        self.0.get(field).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.0.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
        self.0.iter().map(|(field, key)| (*field, *key))
    }

    fn into_result<T>(self, value: T) -> Result<T, FieldErrors> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

/// The registration form as submitted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListingDraft {
    pub name: String,
    pub phone: String,
    pub city: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub address: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl ListingDraft {
    pub fn validate(&self) -> Result<NewListing, FieldErrors> {
        let mut errors = FieldErrors::default();

        let name = self.name.trim();
        if name.is_empty() {
            errors.add("name", "form.validation.nameRequired");
        }

        let phone = normalize_phone(&self.phone);
        if phone.is_empty() {
            errors.add("phone", "form.validation.phoneRequired");
        } else if !phone_pattern().is_match(&phone) {
            errors.add("phone", "form.validation.phoneInvalid");
        }

        let city = self.city.trim();
        if city.is_empty() || !is_known_city(city) {
            errors.add("city", "form.validation.cityRequired");
        }

        // A location is kept only when both halves are present and plausible.
        let location = match (self.latitude, self.longitude) {
            (Some(lat), Some(lng))
                if (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lng) =>
            {
                Some((lat, lng))
            }
            _ => None,
        };

        let address = self.address.trim();
        errors.into_result(NewListing {
            name: name.to_string(),
            phone: format!("0{}", phone),
            city: city.to_string(),
            bio: self.bio.trim().to_string(),
            address: (!address.is_empty()).then(|| address.to_string()),
            image_url: None,
            latitude: location.map(|(lat, _)| lat),
            longitude: location.map(|(_, lng)| lng),
        })
    }
}

/// Digits only, with a national trunk `0` dropped from ten-digit input.
pub fn normalize_phone(input: &str) -> String {
    let digits: String = input.chars().filter(|ch| ch.is_ascii_digit()).collect();
    if digits.len() == 10 && digits.starts_with('0') {
        digits[1..].to_string()
    } else {
        digits
    }
}

fn phone_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[67]\d{8}$").expect("static phone pattern"))
}

/// An uploaded profile photo awaiting checks.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl ImageUpload {
    pub fn validate(&self, max_bytes: usize) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::default();

        let declared = self.content_type.trim().to_ascii_lowercase();
        if !ALLOWED_IMAGE_TYPES.contains(&declared.as_str()) || !self.sniffs_as(&declared) {
            errors.add("image", "form.validation.imageType");
        } else if self.bytes.len() > max_bytes {
            errors.add("image", "form.validation.imageSize");
        }

        errors.into_result(())
    }

    fn sniffs_as(&self, declared: &str) -> bool {
        let expected = match declared {
            "image/jpeg" => image::ImageFormat::Jpeg,
            "image/png" => image::ImageFormat::Png,
            "image/gif" => image::ImageFormat::Gif,
            _ => return false,
        };
        image::guess_format(&self.bytes).map_or(false, |format| format == expected)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommentDraft {
    pub author: String,
    pub content: String,
}

impl CommentDraft {
    pub fn validate(&self, listing_id: Uuid) -> Result<NewComment, FieldErrors> {
        let mut errors = FieldErrors::default();
        let author = self.author.trim();
        let content = self.content.trim();
        if author.is_empty() {
            errors.add("author", "commentForm.validation.nameRequired");
        }
        if content.is_empty() {
            errors.add("content", "commentForm.validation.commentRequired");
        }

        errors.into_result(NewComment {
            listing_id,
            author: author.to_string(),
            content: content.to_string(),
        })
    }
}
