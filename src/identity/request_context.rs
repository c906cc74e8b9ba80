use super::SecurityContext;
use crate::error::{AppError, AppResult};

/// Per-request identity, attached to request extensions by the authorization
/// interceptor. `security` is `None` for anonymous callers.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub token: Option<String>,
    pub security: Option<SecurityContext>,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self { request_id: uuid::Uuid::new_v4().to_string(), token: None, security: None }
    }
}

impl RequestContext {
    /// Authorization-check stage: anonymous callers stop here.
    pub fn require_authenticated(&self) -> AppResult<&SecurityContext> {
        self.security.as_ref().ok_or_else(AppError::unauthenticated)
    }

    pub fn require_authority(&self, authority: &str) -> AppResult<&SecurityContext> {
        let ctx = self.require_authenticated()?;
        if ctx.has_authority(authority) { Ok(ctx) } else { Err(AppError::forbidden("Access is denied")) }
    }
}
