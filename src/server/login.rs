//! Login filter: intercepts `/api/login` before routing and turns a JSON
//! credential payload into a bearer token backed by the session store.

use axum::body::to_bytes;
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{debug, error, info};

use super::{on_store, AppState};
use crate::error::{AppError, AppResult};
use crate::identity::{LoginRequest, LoginResponse};

pub const LOGIN_PATH: &str = "/api/login";

pub fn is_login_path(path: &str) -> bool {
    path.eq_ignore_ascii_case(LOGIN_PATH)
}

pub fn is_content_type_valid(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.to_ascii_lowercase().contains("application/json"))
        .unwrap_or(false)
}

/// Buffer the whole body, then parse. Any read failure, oversize body or
/// shape mismatch is reported as malformed credentials.
async fn read_login_request(req: Request, limit: usize) -> AppResult<LoginRequest> {
    let bytes = to_bytes(req.into_body(), limit).await.map_err(|e| {
        debug!(target: "auth", "login body unreadable: {}", e);
        AppError::malformed_credentials()
    })?;
    serde_json::from_slice::<LoginRequest>(&bytes).map_err(|e| {
        debug!(target: "auth", "login body rejected: {}", e);
        AppError::malformed_credentials()
    })
}

/// Run the full login pipeline for one request. Checks happen strictly in
/// order: method, content type, payload, credentials, store write.
pub async fn attempt_login(state: &AppState, req: Request) -> AppResult<LoginResponse> {
    if !req.method().as_str().eq_ignore_ascii_case("POST") {
        debug!(target: "auth", method = %req.method(), "Invalid HTTP Method. it accepts only POST");
        return Err(AppError::method_not_allowed());
    }
    if !is_content_type_valid(req.headers()) {
        return Err(AppError::unsupported_content_type());
    }
    let creds = read_login_request(req, state.max_login_body).await?;

    let verifier = state.verifier.clone();
    let context = tokio::task::spawn_blocking(move || verifier.verify(&creds.username, &creds.password))
        .await
        .map_err(|e| {
            error!(target: "auth", "credential verification task failed: {}", e);
            AppError::internal("credential verification failed")
        })??;

    let name = context.username().to_string();
    let token = on_store(&state.sessions, move |sm| sm.issue(context)).await.inspect_err(|e| {
        error!(target: "auth", user = %name, "session store write failed: {}", e);
    })?;
    info!(target: "auth", user = %name, "login ok");
    Ok(LoginResponse { access_token: token.into_string(), name })
}

/// Middleware registered on the whole router; only `/api/login` is handled
/// here, everything else passes straight through.
pub async fn login_filter(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if !is_login_path(req.uri().path()) {
        return next.run(req).await;
    }
    match attempt_login(&state, req).await {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(e) => e.into_response(),
    }
}
