use thiserror::Error;
use uuid::Uuid;

use crate::app::validation::FieldErrors;

/// Failures the HTTP layer maps to distinct responses.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("listing {0} not found")]
    NotFound(Uuid),
    #[error("listings are not loaded")]
    NotLoaded,
    #[error("voter identity is unavailable")]
    VoterUnknown,
    #[error("rating {0} is outside 1..=5")]
    InvalidRating(i32),
    #[error(transparent)]
    Invalid(#[from] FieldErrors),
    #[error("a submission is already in flight")]
    InFlight,
    #[error("image upload failed: {0}")]
    Upload(#[source] anyhow::Error),
    #[error("backend call failed: {0}")]
    Backend(#[source] anyhow::Error),
}

impl DirectoryError {
    /// Localisation key shown to the user for this failure.
    pub fn message_key(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "error.notFound",
            Self::NotLoaded => "error.message",
            Self::VoterUnknown => "vote.identityUnavailable",
            Self::InvalidRating(_) => "error.invalidRating",
            Self::Invalid(_) => "form.submitError",
            Self::InFlight => "error.inFlight",
            Self::Upload(_) | Self::Backend(_) => "error.message",
        }
    }
}
