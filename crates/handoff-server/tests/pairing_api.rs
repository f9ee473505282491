//! Router tests for the pairing flow.

mod common;

use axum::http::StatusCode;
use serde_json::json;

#[tokio::test]
async fn pairing_handoff_end_to_end() {
    let app = common::build_test_app().await;

    let (status, body) = app
        .post("/api/pair/register", json!({ "clientId": "tv-123" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    let session_id = body["sessionId"].as_str().unwrap().to_string();
    assert!(body["expiresAt"].is_i64());

    let (status, body) = app
        .post("/api/pair/check", json!({ "sessionId": session_id }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "pending" }));

    let (status, body) = app
        .post_as(
            "/api/pair/approve",
            json!({ "sessionId": session_id }),
            &app.approver_token,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (_, body) = app
        .post("/api/pair/check", json!({ "sessionId": session_id }))
        .await;
    assert_eq!(body["status"], "complete");
    assert_eq!(body["tokens"]["user"]["id"], "u1");
    assert_eq!(body["tokens"]["sessionId"], session_id.as_str());
    let t1 = body["tokens"]["mobileSessionToken"].as_str().unwrap().to_string();

    let (status, body) = app
        .post(
            "/api/pair/refresh",
            json!({ "clientId": "tv-123", "sessionId": session_id }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["user"]["email"], "a@b.com");
    let t2 = body["mobileSessionToken"].as_str().unwrap();
    assert_ne!(t1, t2);
}

#[tokio::test]
async fn register_without_client_id_is_bad_request() {
    let app = common::build_test_app().await;

    let (status, body) = app.post("/api/pair/register", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn unknown_session_polls_as_expired() {
    let app = common::build_test_app().await;

    let (status, body) = app
        .post("/api/pair/check", json!({ "sessionId": "does-not-exist" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "expired" }));
}

#[tokio::test]
async fn approve_requires_authentication() {
    let app = common::build_test_app().await;
    let (_, body) = app
        .post("/api/pair/register", json!({ "clientId": "tv-1" }))
        .await;
    let session_id = body["sessionId"].as_str().unwrap().to_string();

    let (status, body) = app
        .post("/api/pair/approve", json!({ "sessionId": session_id }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let (status, _) = app
        .post_as("/api/pair/approve", json!({ "sessionId": session_id }), "bogus")
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, body) = app
        .post("/api/pair/check", json!({ "sessionId": session_id }))
        .await;
    assert_eq!(body["status"], "pending");
}

#[tokio::test]
async fn refresh_from_other_client_is_forbidden() {
    let app = common::build_test_app().await;
    let (_, body) = app
        .post("/api/pair/register", json!({ "clientId": "tv-123" }))
        .await;
    let session_id = body["sessionId"].as_str().unwrap().to_string();
    app.post_as(
        "/api/pair/approve",
        json!({ "sessionId": session_id }),
        &app.approver_token,
    )
    .await;

    let (status, body) = app
        .post(
            "/api/pair/refresh",
            json!({ "clientId": "tv-999", "sessionId": session_id }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["success"], false);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn refresh_unknown_session_is_not_found() {
    let app = common::build_test_app().await;
    let (status, body) = app
        .post(
            "/api/pair/refresh",
            json!({ "clientId": "tv-1", "sessionId": "missing" }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("new code"));
}
