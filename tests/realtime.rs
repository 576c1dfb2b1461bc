//! Realtime Tests
//!
//! Covers the change feed end to end: writes reaching the in-memory mirror,
//! the listings and comments event streams, and unsubscribing when a stream
//! is closed.

mod common;

use axum::http::StatusCode;
use common::{app_with, comment, eventually, listing};
use serde_json::json;

// ===========================================================================
// Mirror Merge
// ===========================================================================

#[tokio::test]
async fn posted_comment_bumps_the_mirror_count() {
    let chosen = listing("Youssef", "Rabat");
    let id = chosen.id;
    let app = app_with(vec![chosen]).await;

    let resp = app
        .post_json(
            &format!("/listings/{}/comments", id),
            json!({ "author": "Omar", "content": "Came on time." }),
        )
        .await;
    assert_eq!(resp.status, StatusCode::CREATED);

    let controller = app.state.controller.clone();
    assert!(
        eventually(|| {
            let controller = controller.clone();
            async move {
                controller
                    .get(id)
                    .await
                    .map_or(false, |listing| listing.comment_count == 1)
            }
        })
        .await
    );

    let resp = app.get(&format!("/listings/{}?lang=en", id)).await;
    assert_eq!(resp.json()["card"]["comment_count"], 1);
    assert_eq!(resp.json()["card"]["comments_label"], "1 comment");
}

#[tokio::test]
async fn vote_from_another_client_keeps_the_comment_count() {
    let chosen = listing("Youssef", "Rabat");
    let id = chosen.id;
    let app = app_with(vec![chosen]).await;
    app.store.seed_comment(comment(id, "Samira", "Reliable"));
    app.state.controller.reload().await.unwrap();

    let resp = app
        .post_json_as(
            &format!("/listings/{}/vote", id),
            json!({ "direction": "like" }),
            "192.0.2.44",
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);

    let controller = app.state.controller.clone();
    assert!(
        eventually(|| {
            let controller = controller.clone();
            async move {
                controller
                    .get(id)
                    .await
                    .map_or(false, |listing| listing.likes == 1 && listing.comment_count == 1)
            }
        })
        .await
    );
}

// ===========================================================================
// Event Streams
// ===========================================================================

#[tokio::test]
async fn comments_stream_starts_with_a_snapshot() {
    let chosen = listing("Youssef", "Rabat");
    let id = chosen.id;
    let app = app_with(vec![chosen]).await;
    app.store.seed_comment(comment(id, "Samira", "Fixed my sink"));

    let (status, mut events) = app
        .open_stream(&format!("/listings/{}/comments/stream?lang=en", id))
        .await;
    assert_eq!(status, StatusCode::OK);

    let snapshot = events.next_event().await.expect("snapshot event");
    assert_eq!(snapshot.name, "snapshot");
    assert_eq!(snapshot.data.as_array().unwrap().len(), 1);
    assert_eq!(snapshot.data[0]["author"], "Samira");

    app.post_json(
        &format!("/listings/{}/comments", id),
        json!({ "author": "Omar", "content": "Quick and clean" }),
    )
    .await;

    let update = events.next_event().await.expect("comment event");
    assert_eq!(update.name, "comment");
    assert_eq!(update.data["author"], "Omar");
    assert_eq!(update.data["posted"], "Just now");
}

#[tokio::test]
async fn comments_stream_ignores_other_listings() {
    let chosen = listing("Youssef", "Rabat");
    let other = listing("Karim", "Fes");
    let (id, other_id) = (chosen.id, other.id);
    let app = app_with(vec![chosen, other]).await;

    let (_, mut events) = app
        .open_stream(&format!("/listings/{}/comments/stream", id))
        .await;
    assert_eq!(events.next_event().await.unwrap().name, "snapshot");

    app.post_json(
        &format!("/listings/{}/comments", other_id),
        json!({ "author": "Omar", "content": "Elsewhere" }),
    )
    .await;

    assert!(events.next_event().await.is_none());
}

#[tokio::test]
async fn comments_stream_for_unknown_listing_is_empty() {
    let app = app_with(vec![listing("Youssef", "Rabat")]).await;

    let (status, mut events) = app
        .open_stream(&format!("/listings/{}/comments/stream", uuid::Uuid::new_v4()))
        .await;

    assert_eq!(status, StatusCode::OK);
    let snapshot = events.next_event().await.unwrap();
    assert_eq!(snapshot.name, "snapshot");
    assert_eq!(snapshot.data, json!([]));
}

#[tokio::test]
async fn listings_stream_reports_a_vote() {
    let chosen = listing("Youssef", "Rabat");
    let id = chosen.id;
    let app = app_with(vec![chosen]).await;

    let (status, mut events) = app.open_stream("/listings/stream").await;
    assert_eq!(status, StatusCode::OK);

    let resp = app
        .post_json(&format!("/listings/{}/vote", id), json!({ "direction": "like" }))
        .await;
    assert_eq!(resp.status, StatusCode::OK);

    let event = events.next_event().await.expect("listing event");
    assert_eq!(event.name, "listing_updated");
    assert_eq!(event.data["type"], "listing_updated");
    assert_eq!(event.data["record"]["id"], id.to_string());
    assert_eq!(event.data["record"]["likes"], 1);
}

#[tokio::test]
async fn closing_a_stream_unsubscribes() {
    let chosen = listing("Youssef", "Rabat");
    let id = chosen.id;
    let app = app_with(vec![chosen]).await;
    let baseline = app.hub.subscriber_count();

    let (_, listings) = app.open_stream("/listings/stream").await;
    let (_, comments) = app
        .open_stream(&format!("/listings/{}/comments/stream", id))
        .await;
    assert_eq!(app.hub.subscriber_count(), baseline + 2);

    drop(listings);
    drop(comments);
    assert_eq!(app.hub.subscriber_count(), baseline);
}
