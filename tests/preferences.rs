//! Preferences, Translations & Toast Tests
//!
//! Covers language and consent cookies, translation bundles, the per-client
//! toast queue, and the health check.

mod common;

use axum::http::{Method, StatusCode};
use common::{app, app_with, listing, DEFAULT_CLIENT};
use serde_json::json;

// ===========================================================================
// Preferences
// ===========================================================================

#[tokio::test]
async fn first_visit_asks_for_consent() {
    let app = app().await;

    let resp = app.get("/preferences").await;

    assert_eq!(resp.status, StatusCode::OK);
    let body = resp.json();
    assert_eq!(body["language"], "ar");
    assert_eq!(body["direction"], "rtl");
    assert!(body["consent"].is_null());
    assert_eq!(body["show_consent_banner"], true);
}

#[tokio::test]
async fn cookies_restore_preferences() {
    let app = app().await;

    let resp = app
        .request(
            Method::GET,
            "/preferences",
            None,
            &[("cookie", "language=fr; gdpr_consent=declined")],
        )
        .await;

    let body = resp.json();
    assert_eq!(body["language"], "fr");
    assert_eq!(body["direction"], "ltr");
    assert_eq!(body["consent"], "declined");
    assert_eq!(body["show_consent_banner"], false);
}

#[tokio::test]
async fn query_language_beats_cookie() {
    let app = app().await;

    let resp = app
        .request(
            Method::GET,
            "/preferences?lang=en",
            None,
            &[("cookie", "language=fr")],
        )
        .await;

    assert_eq!(resp.json()["language"], "en");
}

#[tokio::test]
async fn unknown_cookie_language_falls_back_to_default() {
    let app = app().await;

    let resp = app
        .request(Method::GET, "/preferences", None, &[("cookie", "language=de")])
        .await;

    assert_eq!(resp.json()["language"], "ar");
}

#[tokio::test]
async fn saving_preferences_sets_cookies() {
    let app = app().await;

    let resp = app
        .put_json(
            "/preferences",
            json!({ "language": "en", "consent": "accepted" }),
            &[],
        )
        .await;

    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json()["language"], "en");
    assert_eq!(resp.json()["direction"], "ltr");
    assert_eq!(resp.json()["show_consent_banner"], false);

    let cookies = resp.set_cookies();
    assert_eq!(cookies.len(), 2);
    assert!(cookies.contains(&"language=en; Path=/; Max-Age=31536000; SameSite=Lax".to_string()));
    assert!(cookies.contains(&"gdpr_consent=accepted; Path=/; Max-Age=31536000; SameSite=Lax".to_string()));
}

#[tokio::test]
async fn saving_only_consent_keeps_language() {
    let app = app().await;

    let resp = app
        .put_json(
            "/preferences",
            json!({ "consent": "declined" }),
            &[("cookie", "language=fr")],
        )
        .await;

    assert_eq!(resp.json()["language"], "fr");
    assert_eq!(resp.json()["consent"], "declined");
    assert_eq!(resp.set_cookies().len(), 1);
}

// ===========================================================================
// Translations
// ===========================================================================

#[tokio::test]
async fn translation_bundle_per_language() {
    let app = app().await;

    let resp = app.get("/i18n/fr").await;
    assert_eq!(resp.status, StatusCode::OK);
    let body = resp.json();
    assert_eq!(body["language"], "fr");
    assert_eq!(body["direction"], "ltr");
    assert!(body["strings"]["card"]["noRatings"].is_string());

    let resp = app.get("/i18n/ar").await;
    assert_eq!(resp.json()["direction"], "rtl");
}

#[tokio::test]
async fn unknown_language_bundle_is_not_found() {
    let app = app().await;

    let resp = app.get("/i18n/de").await;

    assert_eq!(resp.status, StatusCode::NOT_FOUND);
    assert_eq!(resp.error_message(), "unknown language: de");
}

// ===========================================================================
// Toasts
// ===========================================================================

#[tokio::test]
async fn toasts_belong_to_one_client() {
    let chosen = listing("Youssef", "Rabat");
    let id = chosen.id;
    let app = app_with(vec![chosen]).await;

    app.post_json(&format!("/listings/{}/ratings", id), json!({ "value": 5 }))
        .await;

    let resp = app.get_as("/toasts?lang=en", DEFAULT_CLIENT).await;
    assert_eq!(resp.json().as_array().unwrap().len(), 1);

    let resp = app.get_as("/toasts?lang=en", "192.0.2.44").await;
    assert_eq!(resp.json(), json!([]));
}

#[tokio::test]
async fn toast_message_follows_reader_language() {
    let chosen = listing("Youssef", "Rabat");
    let id = chosen.id;
    let app = app_with(vec![chosen]).await;

    app.post_json(&format!("/listings/{}/ratings", id), json!({ "value": 5 }))
        .await;

    let english = app.get("/toasts?lang=en").await.json()[0]["message"].clone();
    let french = app.get("/toasts?lang=fr").await.json()[0]["message"].clone();
    assert_eq!(english, "Thank you for your feedback!");
    assert_ne!(english, french);
}

#[tokio::test]
async fn dismissing_a_toast() {
    let chosen = listing("Youssef", "Rabat");
    let id = chosen.id;
    let app = app_with(vec![chosen]).await;

    app.post_json(&format!("/listings/{}/ratings", id), json!({ "value": 5 }))
        .await;
    let toast_id = app.get("/toasts").await.json()[0]["id"].as_u64().unwrap();

    let resp = app.delete(&format!("/toasts/{}", toast_id)).await;
    assert_eq!(resp.status, StatusCode::NO_CONTENT);

    let resp = app.delete(&format!("/toasts/{}", toast_id)).await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);

    assert_eq!(app.get("/toasts").await.json(), json!([]));
}

// ===========================================================================
// Health
// ===========================================================================

#[tokio::test]
async fn health_follows_the_backend() {
    let app = app().await;

    let resp = app.get("/health").await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json()["status"], "ok");

    app.store.set_fail_reads(true);
    let resp = app.get("/health").await;
    assert_eq!(resp.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(resp.json()["retryable"], true);
}
