//!
//! sessiongate HTTP server
//! ------------------------
//! Axum router for the login service.
//!
//! Responsibilities:
//! - Login filter on `/api/login` (see `login`): JSON credentials in, bearer token out.
//! - Authorization interceptor on every request (see `interceptor`): token in, identity out.
//! - Logout, logout-everywhere and identity endpoints consuming the session store.
//! - Admin user lookup and removal over the user repository.
//! - Startup wiring: session store backend, user repository, default admin, TTL sweeper.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::{Extension, Path, State};
use axum::http::HeaderName;
use axum::middleware::from_fn_with_state;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::config::{ServerConfig, StoreBackend};
use crate::error::{AppError, AppResult};
use crate::identity::{
    CredentialVerifier, MemorySessionStore, RandomTokenIssuer, RepositoryCredentialVerifier, RequestContext,
    SessionManager, SessionStore, ROLE_ADMIN,
};
use crate::security::PasswordEncoder;
use crate::storage::users::ensure_default_admin;
use crate::storage::{FileSessionStore, InMemoryUserRepository, UserRepository};

pub mod interceptor;
pub mod login;

pub use interceptor::{authorization_interceptor, presented_token, SESSION_COOKIE};
pub use login::{attempt_login, login_filter, LOGIN_PATH};

/// Shared server state injected into all handlers and middleware.
#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionManager,
    pub verifier: Arc<dyn CredentialVerifier>,
    pub users: Arc<dyn UserRepository>,
    pub token_header: HeaderName,
    pub max_login_body: usize,
}

impl AppState {
    pub fn new(
        sessions: SessionManager,
        verifier: Arc<dyn CredentialVerifier>,
        users: Arc<dyn UserRepository>,
        config: &ServerConfig,
    ) -> anyhow::Result<Self> {
        let token_header = HeaderName::from_bytes(config.token_header.to_ascii_lowercase().as_bytes())
            .with_context(|| format!("invalid token header name '{}'", config.token_header))?;
        Ok(Self { sessions, verifier, users, token_header, max_login_body: config.max_login_body })
    }
}

/// Open the configured session store backend.
pub fn open_session_store(config: &ServerConfig) -> anyhow::Result<Arc<dyn SessionStore>> {
    let store: Arc<dyn SessionStore> = match config.store {
        StoreBackend::Memory => Arc::new(MemorySessionStore::new(config.session_ttl)),
        StoreBackend::File => {
            let store = FileSessionStore::open(&config.store_dir, &config.map_name, config.session_ttl)
                .with_context(|| format!("While opening session store under {}", config.store_dir.display()))?;
            info!(target: "startup", dir = %store.dir().display(), "file session store ready");
            Arc::new(store)
        }
    };
    Ok(store)
}

/// Wire repository, verifier, token issuer and session store from configuration.
/// Seeds the first admin when the user repository is empty and admin credentials are configured.
pub fn build_state(config: &ServerConfig) -> anyhow::Result<AppState> {
    config.validate()?;
    let encoder = PasswordEncoder::new(config.hash_params)?;
    let users: Arc<dyn UserRepository> = Arc::new(InMemoryUserRepository::new(encoder.clone()));
    ensure_default_admin(users.as_ref(), config.admin_credentials())
        .context("While seeding default admin")?;
    let verifier: Arc<dyn CredentialVerifier> = Arc::new(RepositoryCredentialVerifier::new(users.clone(), encoder));
    let issuer = Arc::new(RandomTokenIssuer::new(config.token_bits)?);
    let sessions = SessionManager::new(open_session_store(config)?, issuer);
    AppState::new(sessions, verifier, users, config)
}

/// Mount routes. The login filter is the outermost layer so it sees
/// `/api/login` before routing; the interceptor runs for everything else.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "sessiongate ok" }))
        .route("/api/logout", post(logout))
        .route("/api/logout/all", post(logout_all))
        .route("/api/me", get(me))
        .route("/api/users/count", get(user_count))
        .route("/api/users/{username}", get(user_view))
        .route("/api/users/id/{id}", delete(delete_user))
        .fallback(not_found)
        .layer(from_fn_with_state(state.clone(), authorization_interceptor))
        .layer(from_fn_with_state(state.clone(), login_filter))
        .with_state(state)
}

/// Run a session store call on the blocking pool. File-backed stores do disk
/// I/O on every call and must not stall the async workers.
pub(crate) async fn on_store<T, F>(sessions: &SessionManager, f: F) -> AppResult<T>
where
    T: Send + 'static,
    F: FnOnce(&SessionManager) -> AppResult<T> + Send + 'static,
{
    let sm = sessions.clone();
    tokio::task::spawn_blocking(move || f(&sm)).await.map_err(|e| {
        error!(target: "session", "session store task failed: {}", e);
        AppError::internal("session store task failed")
    })?
}

async fn not_found() -> AppError {
    AppError::not_found("No handler for this path")
}

async fn logout(State(state): State<AppState>, Extension(rc): Extension<RequestContext>) -> AppResult<Json<Value>> {
    let ctx = rc.require_authenticated()?;
    let token = rc.token.clone().ok_or_else(AppError::unauthenticated)?;
    on_store(&state.sessions, move |sm| Ok(sm.logout(&token)?)).await?;
    info!(target: "auth", user = %ctx.username(), "logout");
    Ok(Json(json!({"status": "ok"})))
}

async fn logout_all(State(state): State<AppState>, Extension(rc): Extension<RequestContext>) -> AppResult<Json<Value>> {
    let ctx = rc.require_authenticated()?;
    let user = ctx.username().to_string();
    let revoked = on_store(&state.sessions, move |sm| Ok(sm.revoke_user(&user)?)).await?;
    info!(target: "auth", user = %ctx.username(), revoked, "logout everywhere");
    Ok(Json(json!({"status": "ok", "revoked": revoked})))
}

async fn me(Extension(rc): Extension<RequestContext>) -> AppResult<Json<Value>> {
    let ctx = rc.require_authenticated()?;
    Ok(Json(json!({
        "id": ctx.principal().id,
        "username": ctx.username(),
        "authorities": ctx.authorities(),
    })))
}

async fn user_count(State(state): State<AppState>, Extension(rc): Extension<RequestContext>) -> AppResult<Json<Value>> {
    rc.require_authority(ROLE_ADMIN)?;
    let count = state.users.count()?;
    Ok(Json(json!({"count": count})))
}

async fn user_view(
    State(state): State<AppState>,
    Extension(rc): Extension<RequestContext>,
    Path(username): Path<String>,
) -> AppResult<Json<Value>> {
    rc.require_authority(ROLE_ADMIN)?;
    let users = state.users.clone();
    let lookup = username.clone();
    let view = tokio::task::spawn_blocking(move || users.get_user_view(&lookup))
        .await
        .map_err(|e| AppError::internal(e.to_string()))??;
    match view {
        Some(v) => Ok(Json(serde_json::to_value(v).map_err(|e| AppError::internal(e.to_string()))?)),
        None => Err(AppError::not_found(format!("No user named '{}'", username))),
    }
}

/// Remove a user and every session they hold.
async fn delete_user(
    State(state): State<AppState>,
    Extension(rc): Extension<RequestContext>,
    Path(id): Path<u64>,
) -> AppResult<Json<Value>> {
    let admin = rc.require_authority(ROLE_ADMIN)?.username().to_string();
    let users = state.users.clone();
    let removed = tokio::task::spawn_blocking(move || users.delete_user(id))
        .await
        .map_err(|e| AppError::internal(e.to_string()))?
        .map_err(|e| AppError::not_found(e.to_string()))?;
    let name = removed.clone();
    let revoked = on_store(&state.sessions, move |sm| Ok(sm.revoke_user(&name)?)).await?;
    info!(target: "auth", admin = %admin, user = %removed, revoked, "user deleted");
    Ok(Json(json!({"status": "ok", "username": removed, "revoked": revoked})))
}

/// Periodically evict expired sessions. Only spawned when a TTL is configured.
fn spawn_session_sweeper(store: Arc<dyn SessionStore>, every: Duration) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(every).await;
            let store = store.clone();
            match tokio::task::spawn_blocking(move || store.sweep()).await {
                Ok(Ok(removed)) if removed > 0 => debug!(target: "session", removed, "session_sweep"),
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!(target: "session", "session sweep failed: {}", e),
                Err(e) => warn!(target: "session", "session sweep task failed: {}", e),
            }
        }
    });
}

fn log_startup(config: &ServerConfig) {
    info!(
        target: "startup",
        "sessiongate starting: bind={} http_port={} store={:?} store_dir={:?} map_name={} session_ttl={:?} token_header={} token_bits={}",
        config.bind, config.http_port, config.store, config.store_dir, config.map_name,
        config.session_ttl, config.token_header, config.token_bits
    );
    if config.session_ttl.is_none() {
        info!(target: "startup", "sessions never expire; tokens live until logout");
    }
}

/// Start the HTTP server and block until it stops.
pub async fn run_with_config(config: ServerConfig) -> anyhow::Result<()> {
    log_startup(&config);
    let state = build_state(&config)?;
    if config.session_ttl.is_some() {
        spawn_session_sweeper(state.sessions.store().clone(), config.sweep_interval);
    }
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.bind, config.http_port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", config.bind, config.http_port))?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Convenience entry point using environment configuration.
pub async fn run() -> anyhow::Result<()> {
    run_with_config(ServerConfig::from_env()?).await
}
