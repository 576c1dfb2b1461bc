use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::app::error::DirectoryError;
use crate::app::i18n::Catalog;
use crate::domain::preferences::Language;

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    fields: Option<BTreeMap<&'static str, String>>,
    retryable: bool,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<BTreeMap<&'static str, String>>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    retryable: bool,
}

impl AppError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            fields: None,
            retryable: false,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, message)
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, message)
    }

    /// A read failure the client may retry.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            retryable: true,
            ..Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
        }
    }

    /// Render a directory failure in the reader's language.
    pub fn from_directory(err: DirectoryError, catalog: &Catalog, language: Language) -> Self {
        let message = catalog.t(language, err.message_key());
        match err {
            DirectoryError::NotFound(_) => Self::not_found(message),
            DirectoryError::NotLoaded => Self::unavailable(message),
            DirectoryError::VoterUnknown | DirectoryError::InvalidRating(_) => {
                Self::bad_request(message)
            }
            DirectoryError::Invalid(errors) => Self {
                fields: Some(
                    errors
                        .iter()
                        .map(|(field, key)| (field, catalog.t(language, key)))
                        .collect(),
                ),
                ..Self::unprocessable(message)
            },
            DirectoryError::InFlight => Self::conflict(message),
            DirectoryError::Upload(_) => Self::bad_gateway(message),
            DirectoryError::Backend(_) => Self {
                retryable: true,
                ..Self::bad_gateway(message)
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.message,
            fields: self.fields,
            retryable: self.retryable,
        });
        (self.status, body).into_response()
    }
}
