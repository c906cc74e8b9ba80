//!
//! sessiongate storage module
//! ---------------------------
//! Backends behind the two collaborator seams of the login service:
//!
//! - `users`: the user/credential repository consulted by the credential verifier.
//! - `sessions`: a directory-backed session store that several server processes
//!   can share, next to the in-process `MemorySessionStore` in `identity`.
//!
//! Both speak `StoreError` so infrastructure failures stay distinguishable from
//! authentication failures all the way up to the HTTP layer.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::identity::SecurityContext;

pub mod sessions;
pub mod users;

pub use sessions::FileSessionStore;
pub use users::{InMemoryUserRepository, NewUser, StoredCredential, UserRepository, UserView};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("session store i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("session entry is corrupt: {0}")]
    Codec(#[from] bincode::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// One session record as held by a store backend. Timestamps are wall-clock
/// epoch milliseconds so that every process sharing a backend agrees on expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEntry {
    pub context: SecurityContext,
    pub issued_at_ms: i64,
    #[serde(default)]
    pub expires_at_ms: Option<i64>,
}

impl SessionEntry {
    pub fn new(context: SecurityContext, ttl: Option<Duration>) -> Self {
        let now = Self::now_ms();
        let expires_at_ms = ttl.map(|d| now.saturating_add(d.as_millis().min(i64::MAX as u128) as i64));
        Self { context, issued_at_ms: now, expires_at_ms }
    }

    pub fn now_ms() -> i64 { chrono::Utc::now().timestamp_millis() }

    pub fn is_expired(&self, now_ms: i64) -> bool {
        matches!(self.expires_at_ms, Some(exp) if now_ms >= exp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;

    #[test]
    fn entry_without_ttl_never_expires() {
        let ctx = SecurityContext::new(Identity { id: 1, username: "a".into() }, Vec::<String>::new());
        let e = SessionEntry::new(ctx, None);
        assert!(!e.is_expired(i64::MAX));
    }

    #[test]
    fn entry_with_ttl_expires_at_boundary() {
        let ctx = SecurityContext::new(Identity { id: 1, username: "a".into() }, Vec::<String>::new());
        let e = SessionEntry::new(ctx, Some(Duration::from_secs(10)));
        let exp = e.expires_at_ms.unwrap();
        assert_eq!(exp - e.issued_at_ms, 10_000);
        assert!(!e.is_expired(exp - 1));
        assert!(e.is_expired(exp));
    }
}
