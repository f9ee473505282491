//! Shared helpers for router tests.

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use handoff_auth::{FileStorage, FileUserDirectory, User};
use handoff_core::Config;
use handoff_server::{create_router, AppState};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub users: Arc<FileUserDirectory>,
    /// Bearer token for the seeded approver `u1`
    pub approver_token: String,
}

pub async fn build_test_app() -> TestApp {
    build_test_app_with(Config::new().with_public_url("https://tv.example.com")).await
}

pub async fn build_test_app_with(config: Config) -> TestApp {
    let storage = Arc::new(FileStorage::in_memory());
    let users = Arc::new(FileUserDirectory::in_memory());
    users
        .upsert(User::new("u1", "a@b.com").with_name("Ada"))
        .await
        .unwrap();

    let state = Arc::new(AppState::with_storage(config, storage, users.clone()));
    let approver_token = state.tokens.mint("u1", "console").await.unwrap().token;

    TestApp {
        router: create_router(state.clone()),
        state,
        users,
        approver_token,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(json_request(Method::POST, uri, body, None)).await
    }

    pub async fn post_as(&self, uri: &str, body: Value, token: &str) -> (StatusCode, Value) {
        self.send(json_request(Method::POST, uri, body, Some(token)))
            .await
    }
}

pub fn json_request(method: Method, uri: &str, body: Value, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}
