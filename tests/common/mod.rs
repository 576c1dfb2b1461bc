#![allow(dead_code)]

use axum::body::Body;
use axum::extract::connect_info::ConnectInfo;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::future::Future;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tower::ServiceExt;
use url::Url;
use uuid::Uuid;

use plombier::domain::comment::Comment;
use plombier::domain::listing::Listing;
use plombier::domain::preferences::Language;
use plombier::infra::memory::{InMemoryImages, InMemoryStore};
use plombier::infra::realtime::RealtimeHub;
use plombier::{AppState, Settings};

pub const DEFAULT_CLIENT: &str = "198.51.100.10";
pub const UPLOAD_MAX_BYTES: usize = 64 * 1024;
const BOUNDARY: &str = "plombier-test-boundary";

// ---------------------------------------------------------------------------
// TestApp: one per test, backed by the in-memory store
// ---------------------------------------------------------------------------

pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub store: Arc<InMemoryStore>,
    pub images: Arc<InMemoryImages>,
    pub hub: RealtimeHub,
    realtime: JoinHandle<()>,
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.realtime.abort();
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    body_bytes: bytes::Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body_bytes).unwrap_or(Value::Null)
    }

    pub fn error_message(&self) -> String {
        self.json()["error"].as_str().unwrap_or("").to_string()
    }

    pub fn set_cookies(&self) -> Vec<String> {
        self.headers
            .get_all("set-cookie")
            .iter()
            .filter_map(|value| value.to_str().ok())
            .map(str::to_string)
            .collect()
    }
}

/// A fresh app with nothing loaded yet.
pub async fn app() -> TestApp {
    TestApp::setup(Vec::new()).await
}

/// A fresh app whose mirror already holds `listings`.
pub async fn app_with(listings: Vec<Listing>) -> TestApp {
    let app = TestApp::setup(listings).await;
    app.state
        .controller
        .reload()
        .await
        .expect("initial reload failed");
    app
}

impl TestApp {
    async fn setup(listings: Vec<Listing>) -> Self {
        let hub = RealtimeHub::new(64);
        let store = Arc::new(InMemoryStore::with_realtime(hub.clone()));
        for listing in listings {
            store.seed_listing(listing);
        }
        let images = Arc::new(InMemoryImages::new());

        let state = AppState::new(
            store.clone(),
            images.clone(),
            hub.clone(),
            Settings {
                public_base_url: Url::parse("https://plombier.example/").unwrap(),
                default_language: Language::Ar,
                upload_max_bytes: UPLOAD_MAX_BYTES,
                toast_ttl: Duration::from_secs(5),
            },
        )
        .expect("failed to build AppState");

        let router = plombier::http::router(state.clone());
        let realtime = state.controller.clone().spawn_realtime(&hub);

        TestApp {
            router,
            state,
            store,
            images,
            hub,
            realtime,
        }
    }

    // ------------------------------------------------------------------
    // Low-level request helper
    // ------------------------------------------------------------------
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(path);
        for &(key, value) in headers {
            builder = builder.header(key, value);
        }

        let request = if let Some(body) = body {
            builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap()
        } else {
            builder.body(Body::empty()).unwrap()
        };

        self.send(request).await
    }

    async fn dispatch(&self, request: Request<Body>) -> axum::response::Response {
        // Without a proxy header the socket address identifies the client.
        let mut request = request;
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 0))));

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("oneshot failed")
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.dispatch(request).await;

        let status = response.status();
        let headers = response.headers().clone();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("failed to collect body")
            .to_bytes();

        TestResponse {
            status,
            headers,
            body_bytes,
        }
    }

    // ------------------------------------------------------------------
    // Convenience HTTP helpers; `client` is the X-Forwarded-For address
    // ------------------------------------------------------------------
    pub async fn get(&self, path: &str) -> TestResponse {
        self.get_as(path, DEFAULT_CLIENT).await
    }

    pub async fn get_as(&self, path: &str, client: &str) -> TestResponse {
        self.request(Method::GET, path, None, &[("x-forwarded-for", client)])
            .await
    }

    pub async fn post_json(&self, path: &str, body: Value) -> TestResponse {
        self.post_json_as(path, body, DEFAULT_CLIENT).await
    }

    pub async fn post_json_as(&self, path: &str, body: Value, client: &str) -> TestResponse {
        self.request(Method::POST, path, Some(body), &[("x-forwarded-for", client)])
            .await
    }

    pub async fn put_json(&self, path: &str, body: Value, headers: &[(&str, &str)]) -> TestResponse {
        self.request(Method::PUT, path, Some(body), headers).await
    }

    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request(Method::DELETE, path, None, &[("x-forwarded-for", DEFAULT_CLIENT)])
            .await
    }

    /// Open an event stream. The response body stays open until the reader
    /// is dropped.
    pub async fn open_stream(&self, path: &str) -> (StatusCode, EventReader) {
        let request = Request::builder()
            .method(Method::GET)
            .uri(path)
            .header("x-forwarded-for", DEFAULT_CLIENT)
            .header("accept", "text/event-stream")
            .body(Body::empty())
            .unwrap();
        let response = self.dispatch(request).await;
        let status = response.status();
        (
            status,
            EventReader {
                body: response.into_body(),
                buffer: String::new(),
            },
        )
    }

    /// POST a multipart form. `image` is `(file name, content type, bytes)`.
    pub async fn post_multipart(
        &self,
        path: &str,
        fields: &[(&str, &str)],
        image: Option<(&str, &str, &[u8])>,
    ) -> TestResponse {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                    BOUNDARY, name, value
                )
                .as_bytes(),
            );
        }
        if let Some((file_name, content_type, bytes)) = image {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                    BOUNDARY, file_name, content_type
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

        let request = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header("x-forwarded-for", DEFAULT_CLIENT)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap();

        self.send(request).await
    }
}

// ---------------------------------------------------------------------------
// Server-sent events
// ---------------------------------------------------------------------------

pub struct EventReader {
    body: Body,
    buffer: String,
}

#[derive(Debug)]
pub struct StreamEvent {
    pub name: String,
    pub data: Value,
}

impl EventReader {
    /// The next named event, skipping keep-alive comments. `None` when the
    /// stream ends or nothing arrives within a second.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        loop {
            while let Some(end) = self.buffer.find("\n\n") {
                let block: String = self.buffer.drain(..end + 2).collect();
                if let Some(event) = parse_event(&block) {
                    return Some(event);
                }
            }

            let frame = tokio::time::timeout(Duration::from_secs(1), self.body.frame())
                .await
                .ok()??
                .ok()?;
            if let Ok(data) = frame.into_data() {
                self.buffer.push_str(&String::from_utf8_lossy(&data));
            }
        }
    }
}

fn parse_event(block: &str) -> Option<StreamEvent> {
    let mut name = None;
    let mut data = String::new();
    for line in block.lines() {
        if let Some(value) = line.strip_prefix("event:") {
            name = Some(value.trim().to_string());
        } else if let Some(value) = line.strip_prefix("data:") {
            data.push_str(value.trim_start());
        }
    }
    Some(StreamEvent {
        name: name?,
        data: serde_json::from_str(&data).unwrap_or(Value::Null),
    })
}

/// Poll `check` until it holds or a second has passed. The realtime merge
/// runs on its own task, so its effects land shortly after a write.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

// ---------------------------------------------------------------------------
// Test data helpers
// ---------------------------------------------------------------------------

pub fn listing(name: &str, city: &str) -> Listing {
    Listing {
        id: Uuid::new_v4(),
        name: name.to_string(),
        phone: "0612345678".to_string(),
        city: city.to_string(),
        bio: String::new(),
        address: None,
        image_url: None,
        latitude: None,
        longitude: None,
        ratings: Vec::new(),
        is_verified: false,
        likes: 0,
        dislikes: 0,
        comment_count: 0,
        created_at: OffsetDateTime::now_utc(),
    }
}

pub fn comment(listing_id: Uuid, author: &str, content: &str) -> Comment {
    Comment {
        id: Uuid::new_v4(),
        created_at: OffsetDateTime::now_utc(),
        listing_id,
        author: author.to_string(),
        content: content.to_string(),
    }
}

pub const PNG_HEADER: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
