#![allow(dead_code)]

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use sessiongate::config::ServerConfig;
use sessiongate::identity::ROLE_USER;
use sessiongate::security::HashParams;
use sessiongate::server::{build_state, AppState};
use sessiongate::storage::NewUser;

pub const ALICE: &str = "alice";
pub const ALICE_PASSWORD: &str = "correct";

pub fn test_config() -> ServerConfig {
    ServerConfig {
        hash_params: HashParams::insecure_fast(),
        admin_user: Some("admin".to_string()),
        admin_password: Some("admin".to_string()),
        ..Default::default()
    }
}

pub fn add_user(state: &AppState, username: &str, password: &str, authorities: &[&str]) {
    state
        .users
        .save_user(NewUser {
            username: username.to_string(),
            password: password.to_string(),
            authorities: authorities.iter().map(|s| s.to_string()).collect(),
        })
        .expect("save user");
}

/// Default state plus `alice`/`correct` with ROLE_USER.
pub fn state_with_alice(config: &ServerConfig) -> AppState {
    let state = build_state(config).expect("build state");
    add_user(&state, ALICE, ALICE_PASSWORD, &[ROLE_USER]);
    state
}

pub fn login_request(username: &str, password: &str) -> Request<Body> {
    let body = serde_json::json!({"username": username, "password": password}).to_string();
    Request::builder()
        .method(Method::POST)
        .uri("/api/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap()
}

pub fn authed(method: Method, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("x-auth-token", token)
        .body(Body::empty())
        .unwrap()
}

pub async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.expect("router is infallible");
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.expect("read body");
    let body = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    (status, body)
}

/// Log in and return the access token, asserting success.
pub async fn login(app: &Router, username: &str, password: &str) -> String {
    let (status, body) = send(app, login_request(username, password)).await;
    assert_eq!(status, StatusCode::OK, "login failed: {}", body);
    body["accessToken"].as_str().expect("accessToken").to_string()
}
