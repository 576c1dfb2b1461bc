use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, HeaderName};
use std::net::{IpAddr, SocketAddr};

use crate::domain::preferences::{ConsentDecision, Language};
use crate::domain::vote::VoterId;
use crate::http::AppError;
use crate::AppState;

pub const LANGUAGE_COOKIE: &str = "language";
pub const CONSENT_COOKIE: &str = "gdpr_consent";

const FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Who is asking and how they want the answer rendered.
#[derive(Debug, Clone)]
pub struct Client {
    pub voter: Option<VoterId>,
    pub language: Language,
    pub consent: Option<ConsentDecision>,
}

impl Client {
    pub fn voter(&self) -> Result<&VoterId, AppError> {
        self.voter
            .as_ref()
            .ok_or_else(|| AppError::bad_request("client address unavailable"))
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for Client {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let voter = client_ip(parts).map(VoterId::from_ip);

        let language = query_param(parts, "lang")
            .and_then(|code| Language::parse(&code))
            .or_else(|| cookie(&parts.headers, LANGUAGE_COOKIE).and_then(Language::parse))
            .unwrap_or(state.default_language);

        let consent = cookie(&parts.headers, CONSENT_COOKIE).and_then(ConsentDecision::parse);

        Ok(Client {
            voter,
            language,
            consent,
        })
    }
}

/// First `X-Forwarded-For` hop, else the socket peer.
fn client_ip(parts: &Parts) -> Option<IpAddr> {
    let forwarded = parts
        .headers
        .get(FORWARDED_FOR)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .and_then(|first| first.trim().parse().ok());

    forwarded.or_else(|| {
        parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
    })
}

fn query_param(parts: &Parts, name: &str) -> Option<String> {
    let query = parts.uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

pub fn cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim())
}
