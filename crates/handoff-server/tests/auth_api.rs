//! Router tests for bearer token resolution and health.

mod common;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use serde_json::json;

fn session_request(authorization: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(Method::GET).uri("/api/auth/session");
    if let Some(value) = authorization {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn valid_token_resolves_to_live_user() {
    let app = common::build_test_app().await;
    let auth = format!("Bearer {}", app.approver_token);

    let (status, body) = app.send(session_request(Some(&auth))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["authenticated"], true);
    assert_eq!(body["user"]["admin"], false);

    app.users.set_flags("u1", true, true).await.unwrap();
    let (_, body) = app.send(session_request(Some(&auth))).await;
    assert_eq!(body["user"]["admin"], true);
}

#[tokio::test]
async fn unknown_token_is_unauthorized_with_expired_hint() {
    let app = common::build_test_app().await;

    let (status, body) = app.send(session_request(Some("Bearer nope"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        body,
        json!({ "authenticated": false, "sessionExpired": true })
    );
}

#[tokio::test]
async fn garbled_header_is_bad_request() {
    let app = common::build_test_app().await;

    let (status, body) = app.send(session_request(Some("Token abc"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn signout_revokes_token() {
    let app = common::build_test_app().await;
    let auth = format!("Bearer {}", app.approver_token);

    let (status, body) = app
        .post_as("/api/auth/signout", json!({}), &app.approver_token)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["revoked"], true);

    let (status, _) = app.send(session_request(Some(&auth))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn health_reports_ok() {
    let app = common::build_test_app().await;
    let (status, body) = app.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}
