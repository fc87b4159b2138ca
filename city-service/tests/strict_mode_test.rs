mod common;

use axum::http::StatusCode;
use city_service::config::UpsertMode;
use city_service::services::StoreError;
use common::TestApp;
use futures::future::join_all;
use serde_json::json;

#[tokio::test]
async fn strict_mode_follows_the_same_upsert_protocol() {
    let app = TestApp::with_mode(UpsertMode::Strict);

    let (_, body) = app
        .post_city(json!({ "city": "Berlin", "population": 3600000 }))
        .await;
    assert_eq!(body["operation"], "insert");

    let (_, body) = app
        .post_city(json!({ "city": "Berlin", "population": 3600000 }))
        .await;
    assert_eq!(body["message"], "Population unchanged");

    let (status, body) = app
        .post_city(json!({ "city": "Berlin", "population": 3700000 }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Population updated successfully");
}

#[tokio::test]
async fn strict_mode_reports_version_conflicts() {
    let app = TestApp::with_mode(UpsertMode::Strict);
    app.store.fail_with(StoreError::Conflict(
        "version_conflict_engine_exception".into(),
    ));

    let (status, body) = app
        .post_city(json!({ "city": "Berlin", "population": 3600000 }))
        .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body, json!({ "error": "Concurrent update detected for city" }));
}

#[tokio::test]
async fn concurrent_identical_inserts_write_once() {
    let app = TestApp::with_mode(UpsertMode::Strict);

    let requests =
        (0..10).map(|_| app.post_city(json!({ "city": "Lagos", "population": 15000000 })));
    let responses = join_all(requests).await;

    let inserts = responses
        .iter()
        .filter(|(status, body)| *status == StatusCode::OK && body["operation"] == "insert")
        .count();
    assert_eq!(inserts, 1);
    assert_eq!(app.store.write_count(), 1);
}
