//! Authorization interceptor: re-establishes the caller's identity from the
//! session store on every request. Never touches the user repository.

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderName};
use axum::middleware::Next;
use axum::response::Response;
use tracing::{debug, warn};

use super::{on_store, AppState};
use crate::identity::RequestContext;

pub const SESSION_COOKIE: &str = "sessiongate_token";

fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    for cookie in headers.get_all(header::COOKIE).iter() {
        let Ok(s) = cookie.to_str() else { continue; };
        for part in s.split(';') {
            let p = part.trim();
            if let Some((k, v)) = p.split_once('=') {
                if k == name && !v.is_empty() { return Some(v.to_string()); }
            }
        }
    }
    None
}

/// Token lookup order: configured header, `Authorization: Bearer`, session cookie.
pub fn presented_token(headers: &HeaderMap, token_header: &HeaderName) -> Option<String> {
    if let Some(v) = headers.get(token_header).and_then(|v| v.to_str().ok()) {
        let v = v.trim();
        if !v.is_empty() { return Some(v.to_string()); }
    }
    if let Some(v) = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        // auth scheme names are case-insensitive
        if let Some((scheme, t)) = v.trim().split_once(' ') {
            let t = t.trim();
            if scheme.eq_ignore_ascii_case("bearer") && !t.is_empty() { return Some(t.to_string()); }
        }
    }
    parse_cookie(headers, SESSION_COOKIE)
}

/// Unknown tokens and store failures leave the request anonymous; protected
/// handlers reject it at their own authorization check.
pub async fn authorization_interceptor(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let mut rc = RequestContext::default();
    if let Some(token) = presented_token(req.headers(), &state.token_header) {
        let lookup = token.clone();
        match on_store(&state.sessions, move |sm| Ok(sm.resolve(&lookup)?)).await {
            Ok(Some(ctx)) => {
                debug!(target: "auth", request_id = %rc.request_id, user = %ctx.username(), "token resolved");
                rc.security = Some(ctx);
            }
            Ok(None) => debug!(target: "auth", request_id = %rc.request_id, "token not found in session store"),
            Err(e) => warn!(target: "auth", request_id = %rc.request_id, "session store read failed: {}", e),
        }
        rc.token = Some(token);
    }
    req.extensions_mut().insert(rc);
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn hdr() -> HeaderName { HeaderName::from_static("x-auth-token") }

    #[test]
    fn header_wins_over_bearer_and_cookie() {
        let mut h = HeaderMap::new();
        h.insert("x-auth-token", HeaderValue::from_static("from-header"));
        h.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer from-bearer"));
        h.insert(header::COOKIE, HeaderValue::from_static("sessiongate_token=from-cookie"));
        assert_eq!(presented_token(&h, &hdr()).as_deref(), Some("from-header"));
    }

    #[test]
    fn bearer_then_cookie() {
        let mut h = HeaderMap::new();
        h.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(presented_token(&h, &hdr()).as_deref(), Some("abc"));

        let mut h = HeaderMap::new();
        h.insert(header::COOKIE, HeaderValue::from_static("theme=dark; sessiongate_token=xyz"));
        assert_eq!(presented_token(&h, &hdr()).as_deref(), Some("xyz"));
    }

    #[test]
    fn bearer_scheme_ignores_case() {
        for v in ["bearer abc", "BEARER abc", "BeArEr   abc "] {
            let mut h = HeaderMap::new();
            h.insert(header::AUTHORIZATION, HeaderValue::from_str(v).unwrap());
            assert_eq!(presented_token(&h, &hdr()).as_deref(), Some("abc"), "{}", v);
        }
        let mut h = HeaderMap::new();
        h.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearerabc"));
        assert!(presented_token(&h, &hdr()).is_none());
    }

    #[test]
    fn nothing_presented() {
        let mut h = HeaderMap::new();
        h.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic Zm9vOmJhcg=="));
        h.insert("x-auth-token", HeaderValue::from_static("   "));
        assert!(presented_token(&h, &hdr()).is_none());
    }
}
