use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::convert::Infallible;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::directory::{LoadState, VoteReceipt};
use crate::app::error::DirectoryError;
use crate::app::filter::{DirectoryFilter, SortMode};
use crate::app::validation::{CommentDraft, ImageUpload, ListingDraft};
use crate::app::view::{self, DirectoryPage, MapMarker, PageRequest, SelectedListing};
use crate::domain::change::{ChangeEvent, Table};
use crate::domain::comment::Comment;
use crate::domain::listing::Listing;
use crate::domain::preferences::{ConsentDecision, Language, TextDirection};
use crate::domain::toast::ToastKind;
use crate::domain::vote::VoteDirection;
use crate::http::client::{Client, CONSENT_COOKIE, LANGUAGE_COOKIE};
use crate::http::AppError;
use crate::infra::realtime::ChangeFilter;
use crate::AppState;

const PREFERENCE_MAX_AGE_SECONDS: u64 = 60 * 60 * 24 * 365;

type EventStream = Sse<std::pin::Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>>;

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
}

pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, AppError> {
    state.store.ping().await.map_err(|err| {
        tracing::error!(error = ?err, "health check failed");
        AppError::unavailable("backend unavailable")
    })?;
    Ok(Json(HealthResponse { status: "ok" }))
}

fn reject(state: &AppState, client: &Client, err: DirectoryError) -> AppError {
    AppError::from_directory(err, &state.catalog, client.language)
}

#[derive(Deserialize)]
pub struct DirectoryQuery {
    pub city: Option<String>,
    pub q: Option<String>,
    pub sort: Option<String>,
    pub plumber: Option<Uuid>,
}

#[derive(Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum DirectoryResponse {
    Loading,
    Ready(DirectoryPage),
}

pub async fn list_listings(
    State(state): State<AppState>,
    client: Client,
    Query(query): Query<DirectoryQuery>,
) -> Result<Json<DirectoryResponse>, AppError> {
    let sort = match query.sort.as_deref() {
        None | Some("") => SortMode::default(),
        Some(value) => SortMode::parse(value)
            .ok_or_else(|| AppError::bad_request(format!("unknown sort mode: {}", value)))?,
    };

    match state.controller.load_state().await {
        LoadState::Loading => return Ok(Json(DirectoryResponse::Loading)),
        LoadState::Failed(_) => return Err(reject(&state, &client, DirectoryError::NotLoaded)),
        LoadState::Ready => {}
    }

    let filter = DirectoryFilter::new(query.city.as_deref(), query.q.as_deref(), sort);
    let listings = state.controller.snapshot().await;
    let votes = match &client.voter {
        Some(voter) => state.controller.votes_for(voter).await,
        None => Default::default(),
    };

    let page = view::directory_page(
        &state.catalog,
        PageRequest {
            language: client.language,
            filter: &filter,
            selected: query.plumber,
            base_url: &state.public_base_url,
            now: OffsetDateTime::now_utc(),
        },
        &listings,
        &votes,
    );
    Ok(Json(DirectoryResponse::Ready(page)))
}

#[derive(Serialize)]
pub struct ReloadResponse {
    loaded: usize,
}

pub async fn reload_listings(
    State(state): State<AppState>,
    client: Client,
) -> Result<Json<ReloadResponse>, AppError> {
    let loaded = state
        .controller
        .reload()
        .await
        .map_err(|_| reject(&state, &client, DirectoryError::NotLoaded))?;
    Ok(Json(ReloadResponse { loaded }))
}

pub async fn get_listing(
    State(state): State<AppState>,
    client: Client,
    Path(id): Path<Uuid>,
) -> Result<Json<SelectedListing>, AppError> {
    let listing = state
        .controller
        .get(id)
        .await
        .ok_or_else(|| reject(&state, &client, DirectoryError::NotFound(id)))?;
    let vote = match &client.voter {
        Some(voter) => state.controller.votes_for(voter).await.get(&id).copied(),
        None => None,
    };

    Ok(Json(SelectedListing {
        share_url: view::share_url(&state.public_base_url, id),
        card: view::listing_card(
            &state.catalog,
            client.language,
            listing,
            vote,
            OffsetDateTime::now_utc(),
        ),
    }))
}

pub async fn submit_listing(
    State(state): State<AppState>,
    client: Client,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Listing>), AppError> {
    let voter = client.voter()?.clone();
    let mut draft = ListingDraft::default();
    let mut image = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(format!("invalid form data: {}", err)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "image" {
            let file_name = field.file_name().unwrap_or("upload").to_string();
            let content_type = field.content_type().unwrap_or_default().to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|err| AppError::bad_request(format!("invalid image: {}", err)))?;
            if !bytes.is_empty() {
                image = Some(ImageUpload {
                    file_name,
                    content_type,
                    bytes,
                });
            }
            continue;
        }

        let text = field
            .text()
            .await
            .map_err(|err| AppError::bad_request(format!("invalid form field {}: {}", name, err)))?;
        match name.as_str() {
            "name" => draft.name = text,
            "phone" => draft.phone = text,
            "city" => draft.city = text,
            "bio" => draft.bio = text,
            "address" => draft.address = text,
            "latitude" => draft.latitude = text.trim().parse().ok(),
            "longitude" => draft.longitude = text.trim().parse().ok(),
            _ => {}
        }
    }

    let listing = state
        .controller
        .submit(&voter, &draft, image)
        .await
        .map_err(|err| reject(&state, &client, err))?;
    Ok((StatusCode::CREATED, Json(listing)))
}

/// Request bodies for the upload route may carry a full-size photo.
pub fn upload_body_limit(max_bytes: usize) -> DefaultBodyLimit {
    DefaultBodyLimit::max(max_bytes.saturating_mul(2).max(64 * 1024))
}

#[derive(Deserialize)]
pub struct RateRequest {
    pub value: i32,
}

pub async fn rate_listing(
    State(state): State<AppState>,
    client: Client,
    Path(id): Path<Uuid>,
    Json(payload): Json<RateRequest>,
) -> Result<Json<SelectedListing>, AppError> {
    let voter = client.voter()?;
    let listing = state
        .controller
        .rate(voter, id, payload.value)
        .await
        .map_err(|err| reject(&state, &client, err))?;
    let vote = state.controller.votes_for(voter).await.get(&id).copied();

    Ok(Json(SelectedListing {
        share_url: view::share_url(&state.public_base_url, id),
        card: view::listing_card(
            &state.catalog,
            client.language,
            listing,
            vote,
            OffsetDateTime::now_utc(),
        ),
    }))
}

#[derive(Deserialize)]
pub struct VoteRequest {
    pub direction: VoteDirection,
}

pub async fn vote_listing(
    State(state): State<AppState>,
    client: Client,
    Path(id): Path<Uuid>,
    Json(payload): Json<VoteRequest>,
) -> Result<Json<VoteReceipt>, AppError> {
    let receipt = state
        .controller
        .vote(client.voter.as_ref(), id, payload.direction)
        .await
        .map_err(|err| reject(&state, &client, err))?;
    Ok(Json(receipt))
}

#[derive(Serialize)]
pub struct CommentView {
    #[serde(flatten)]
    comment: Comment,
    posted: String,
}

fn comment_view(state: &AppState, language: Language, comment: Comment) -> CommentView {
    CommentView {
        posted: state
            .catalog
            .time_ago(language, comment.created_at, OffsetDateTime::now_utc()),
        comment,
    }
}

pub async fn list_comments(
    State(state): State<AppState>,
    client: Client,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<CommentView>>, AppError> {
    let comments = state
        .comments
        .list(id)
        .await
        .map_err(|err| reject(&state, &client, err))?;
    Ok(Json(
        comments
            .into_iter()
            .map(|comment| comment_view(&state, client.language, comment))
            .collect(),
    ))
}

pub async fn post_comment(
    State(state): State<AppState>,
    client: Client,
    Path(id): Path<Uuid>,
    Json(draft): Json<CommentDraft>,
) -> Result<(StatusCode, Json<CommentView>), AppError> {
    let voter = client.voter()?;
    if state.controller.get(id).await.is_none() {
        return Err(reject(&state, &client, DirectoryError::NotFound(id)));
    }

    let comment = state
        .comments
        .submit(voter, id, &draft)
        .await
        .map_err(|err| reject(&state, &client, err))?;
    Ok((
        StatusCode::CREATED,
        Json(comment_view(&state, client.language, comment)),
    ))
}

fn change_event_name(event: &ChangeEvent) -> &'static str {
    match event {
        ChangeEvent::ListingInserted(_) => "listing_inserted",
        ChangeEvent::ListingUpdated(_) => "listing_updated",
        ChangeEvent::ListingDeleted { .. } => "listing_deleted",
        ChangeEvent::CommentInserted(_) => "comment_inserted",
    }
}

fn json_event<T: Serialize>(name: &'static str, data: &T) -> Event {
    Event::default().event(name).json_data(data).unwrap_or_else(|err| {
        tracing::warn!(error = %err, event = name, "failed to encode event");
        Event::default().comment("encoding failed")
    })
}

pub async fn listings_stream(State(state): State<AppState>) -> EventStream {
    let subscription = state.hub.subscribe(ChangeFilter::table(Table::Listings));
    let events = stream::unfold(subscription, |mut subscription| async move {
        let event = subscription.next().await?;
        let sse = json_event(change_event_name(&event), &event);
        Some((Ok::<_, Infallible>(sse), subscription))
    });
    Sse::new(events.boxed()).keep_alive(KeepAlive::default())
}

pub async fn comments_stream(
    State(state): State<AppState>,
    client: Client,
    Path(id): Path<Uuid>,
) -> Result<EventStream, AppError> {
    let thread = state
        .comments
        .open_thread(&state.hub, id)
        .await
        .map_err(|err| reject(&state, &client, err))?;

    let language = client.language;
    let snapshot: Vec<CommentView> = thread
        .comments()
        .iter()
        .cloned()
        .map(|comment| comment_view(&state, language, comment))
        .collect();
    let initial = stream::once(async move { Ok::<_, Infallible>(json_event("snapshot", &snapshot)) });

    let updates = stream::unfold((thread, state), move |(mut thread, state)| async move {
        let comment = thread.next_insert().await?;
        let sse = json_event("comment", &comment_view(&state, language, comment));
        Some((Ok::<_, Infallible>(sse), (thread, state)))
    });

    Ok(Sse::new(initial.chain(updates).boxed()).keep_alive(KeepAlive::default()))
}

#[derive(Deserialize)]
pub struct MapQuery {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

#[derive(Serialize)]
pub struct MapResponse {
    markers: Vec<MapMarker>,
    user_location: Option<UserLocation>,
}

#[derive(Serialize)]
pub struct UserLocation {
    latitude: f64,
    longitude: f64,
}

pub async fn map_markers(
    State(state): State<AppState>,
    Query(query): Query<MapQuery>,
) -> Json<MapResponse> {
    let listings = state.controller.snapshot().await;
    let user_location = match (query.lat, query.lng) {
        (Some(latitude), Some(longitude)) => Some(UserLocation {
            latitude,
            longitude,
        }),
        _ => None,
    };
    Json(MapResponse {
        markers: view::map_markers(&listings),
        user_location,
    })
}

#[derive(Serialize)]
pub struct TranslationBundle {
    language: Language,
    direction: TextDirection,
    strings: Value,
}

pub async fn translations(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<TranslationBundle>, AppError> {
    let language = Language::parse(&code)
        .ok_or_else(|| AppError::not_found(format!("unknown language: {}", code)))?;
    let strings = state
        .catalog
        .table(language)
        .cloned()
        .ok_or_else(|| AppError::not_found(format!("no strings for language: {}", code)))?;
    Ok(Json(TranslationBundle {
        language,
        direction: language.direction(),
        strings,
    }))
}

#[derive(Serialize)]
pub struct ToastView {
    id: u64,
    kind: ToastKind,
    message: String,
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
}

pub async fn list_toasts(State(state): State<AppState>, client: Client) -> Json<Vec<ToastView>> {
    let Some(voter) = &client.voter else {
        return Json(Vec::new());
    };
    let toasts = state
        .toasts
        .active(voter)
        .into_iter()
        .map(|toast| ToastView {
            id: toast.id,
            kind: toast.kind,
            message: state.catalog.t(client.language, toast.message_key),
            created_at: toast.created_at,
        })
        .collect();
    Json(toasts)
}

pub async fn dismiss_toast(
    State(state): State<AppState>,
    client: Client,
    Path(id): Path<u64>,
) -> Result<StatusCode, AppError> {
    let voter = client.voter()?;
    if state.toasts.dismiss(voter, id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("toast not found"))
    }
}

#[derive(Serialize)]
pub struct PreferencesResponse {
    language: Language,
    direction: TextDirection,
    consent: Option<ConsentDecision>,
    show_consent_banner: bool,
}

impl PreferencesResponse {
    fn new(language: Language, consent: Option<ConsentDecision>) -> Self {
        Self {
            language,
            direction: language.direction(),
            consent,
            show_consent_banner: consent.is_none(),
        }
    }
}

pub async fn get_preferences(client: Client) -> Json<PreferencesResponse> {
    Json(PreferencesResponse::new(client.language, client.consent))
}

#[derive(Deserialize)]
pub struct PreferencesUpdate {
    pub language: Option<Language>,
    pub consent: Option<ConsentDecision>,
}

pub async fn update_preferences(
    client: Client,
    Json(update): Json<PreferencesUpdate>,
) -> Result<(HeaderMap, Json<PreferencesResponse>), AppError> {
    let mut headers = HeaderMap::new();
    if let Some(language) = update.language {
        headers.append(header::SET_COOKIE, preference_cookie(LANGUAGE_COOKIE, language.code())?);
    }
    if let Some(consent) = update.consent {
        headers.append(header::SET_COOKIE, preference_cookie(CONSENT_COOKIE, consent.as_str())?);
    }

    let language = update.language.unwrap_or(client.language);
    let consent = update.consent.or(client.consent);
    tracing::debug!(language = language.code(), ?consent, "preferences updated");
    Ok((headers, Json(PreferencesResponse::new(language, consent))))
}

fn preference_cookie(name: &str, value: &str) -> Result<HeaderValue, AppError> {
    HeaderValue::from_str(&format!(
        "{}={}; Path=/; Max-Age={}; SameSite=Lax",
        name, value, PREFERENCE_MAX_AGE_SECONDS
    ))
    .map_err(|_| AppError::bad_request("invalid preference value"))
}
