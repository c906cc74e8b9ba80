use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use parking_lot::RwLock;
use tracing::debug;

use super::principal::SecurityContext;
use super::token::{Token, TokenIssuer};
use crate::error::{AppError, AppResult};
use crate::storage::{SessionEntry, StoreError};

/// Shared token -> security context map.
///
/// Implementations must be safe for concurrent use from any number of request
/// workers. Entries are never mutated in place: `put` replaces, `remove` drops.
/// Expired entries (when a TTL is configured) read as absent.
pub trait SessionStore: Send + Sync {
    fn put(&self, token: &Token, context: SecurityContext) -> Result<(), StoreError>;
    fn get(&self, token: &str) -> Result<Option<SecurityContext>, StoreError>;
    /// Returns whether a live entry was removed.
    fn remove(&self, token: &str) -> Result<bool, StoreError>;
    /// Every live token whose context belongs to `username`.
    fn tokens_for(&self, username: &str) -> Result<Vec<Token>, StoreError>;
    /// Evict expired entries, returning how many went.
    fn sweep(&self) -> Result<usize, StoreError>;
    fn len(&self) -> Result<usize, StoreError>;
    fn is_empty(&self) -> Result<bool, StoreError> { Ok(self.len()? == 0) }
}

/// Single-process store. Sessions do not survive a restart and are not seen by
/// other server processes; use `FileSessionStore` for that.
pub struct MemorySessionStore {
    ttl: Option<Duration>,
    sessions: RwLock<HashMap<String, SessionEntry>>,
    // username -> tokens; always locked after `sessions`
    user_index: RwLock<HashMap<String, HashSet<String>>>,
}

impl Default for MemorySessionStore {
    fn default() -> Self { Self::new(None) }
}

impl MemorySessionStore {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self { ttl, sessions: RwLock::new(HashMap::new()), user_index: RwLock::new(HashMap::new()) }
    }

    fn unindex(&self, username: &str, token: &str) {
        let mut idx = self.user_index.write();
        if let Some(set) = idx.get_mut(username) {
            set.remove(token);
            if set.is_empty() { idx.remove(username); }
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn put(&self, token: &Token, context: SecurityContext) -> Result<(), StoreError> {
        let username = context.username().to_string();
        let entry = SessionEntry::new(context, self.ttl);
        let mut map = self.sessions.write();
        if let Some(prev) = map.insert(token.as_str().to_string(), entry) {
            if prev.context.username() != username {
                self.unindex(prev.context.username(), token.as_str());
            }
        }
        self.user_index.write().entry(username).or_default().insert(token.as_str().to_string());
        Ok(())
    }

    fn get(&self, token: &str) -> Result<Option<SecurityContext>, StoreError> {
        let now = SessionEntry::now_ms();
        {
            let map = self.sessions.read();
            match map.get(token) {
                None => return Ok(None),
                Some(ent) if !ent.is_expired(now) => return Ok(Some(ent.context.clone())),
                Some(_) => {}
            }
        }
        // Expired: drop it on the way out
        let mut map = self.sessions.write();
        if let Some(ent) = map.get(token) {
            if ent.is_expired(now) {
                let username = ent.context.username().to_string();
                map.remove(token);
                self.unindex(&username, token);
            }
        }
        Ok(None)
    }

    fn remove(&self, token: &str) -> Result<bool, StoreError> {
        let mut map = self.sessions.write();
        match map.remove(token) {
            Some(ent) => {
                self.unindex(ent.context.username(), token);
                Ok(!ent.is_expired(SessionEntry::now_ms()))
            }
            None => Ok(false),
        }
    }

    fn tokens_for(&self, username: &str) -> Result<Vec<Token>, StoreError> {
        let now = SessionEntry::now_ms();
        let map = self.sessions.read();
        let idx = self.user_index.read();
        let Some(set) = idx.get(username) else { return Ok(Vec::new()); };
        Ok(set
            .iter()
            .filter(|t| map.get(t.as_str()).map(|e| !e.is_expired(now)).unwrap_or(false))
            .map(|t| Token::from(t.clone()))
            .collect())
    }

    fn sweep(&self) -> Result<usize, StoreError> {
        if self.ttl.is_none() { return Ok(0); }
        let now = SessionEntry::now_ms();
        let mut map = self.sessions.write();
        let expired: Vec<(String, String)> = map
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(t, e)| (t.clone(), e.context.username().to_string()))
            .collect();
        for (token, username) in expired.iter() {
            map.remove(token);
            self.unindex(username, token);
        }
        Ok(expired.len())
    }

    fn len(&self) -> Result<usize, StoreError> {
        let now = SessionEntry::now_ms();
        Ok(self.sessions.read().values().filter(|e| !e.is_expired(now)).count())
    }
}

/// Ties token issuing to the store: one fresh token per login, one entry per token.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    issuer: Arc<dyn TokenIssuer>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>, issuer: Arc<dyn TokenIssuer>) -> Self { Self { store, issuer } }

    pub fn store(&self) -> &Arc<dyn SessionStore> { &self.store }

    /// Mint a token for `context` and record it. A failed store write fails the
    /// whole call so no token is handed out that cannot be resolved.
    pub fn issue(&self, context: SecurityContext) -> AppResult<Token> {
        let token = self.issuer.issue().map_err(|e| AppError::internal(e.to_string()))?;
        let user = context.username().to_string();
        self.store.put(&token, context)?;
        debug!(target: "session", user = %user, "session.issue");
        Ok(token)
    }

    pub fn resolve(&self, token: &str) -> Result<Option<SecurityContext>, StoreError> {
        self.store.get(token)
    }

    pub fn logout(&self, token: &str) -> Result<bool, StoreError> {
        let removed = self.store.remove(token)?;
        debug!(target: "session", removed, "session.logout");
        Ok(removed)
    }

    /// Drop every token held by `username` (logout on all devices).
    pub fn revoke_user(&self, username: &str) -> Result<usize, StoreError> {
        let mut count = 0usize;
        for t in self.store.tokens_for(username)? {
            if self.store.remove(t.as_str())? { count += 1; }
        }
        debug!(target: "session", user = %username, count, "session.revoke");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{Identity, RandomTokenIssuer, ROLE_USER};

    fn ctx(id: u64, name: &str) -> SecurityContext {
        SecurityContext::new(Identity { id, username: name.into() }, [ROLE_USER])
    }

    fn manager(ttl: Option<Duration>) -> SessionManager {
        SessionManager::new(Arc::new(MemorySessionStore::new(ttl)), Arc::new(RandomTokenIssuer::default()))
    }

    #[test]
    fn issue_then_resolve() {
        let sm = manager(None);
        let t = sm.issue(ctx(1, "alice")).unwrap();
        let got = sm.resolve(t.as_str()).unwrap().expect("live session");
        assert_eq!(got.username(), "alice");
    }

    #[test]
    fn remove_makes_token_absent() {
        let sm = manager(None);
        let t = sm.issue(ctx(1, "alice")).unwrap();
        assert!(sm.logout(t.as_str()).unwrap());
        assert!(sm.resolve(t.as_str()).unwrap().is_none());
        // second removal is a no-op
        assert!(!sm.logout(t.as_str()).unwrap());
    }

    #[test]
    fn same_user_many_tokens() {
        let sm = manager(None);
        let a = sm.issue(ctx(1, "alice")).unwrap();
        let b = sm.issue(ctx(1, "alice")).unwrap();
        assert_ne!(a, b);
        assert_eq!(sm.store().tokens_for("alice").unwrap().len(), 2);
        assert_eq!(sm.store().len().unwrap(), 2);
    }

    #[test]
    fn revoke_user_leaves_others_alone() {
        let sm = manager(None);
        sm.issue(ctx(1, "alice")).unwrap();
        sm.issue(ctx(1, "alice")).unwrap();
        let bob = sm.issue(ctx(2, "bob")).unwrap();
        assert_eq!(sm.revoke_user("alice").unwrap(), 2);
        assert!(sm.store().tokens_for("alice").unwrap().is_empty());
        assert!(sm.resolve(bob.as_str()).unwrap().is_some());
    }

    #[test]
    fn overwrite_moves_index() {
        let store = MemorySessionStore::default();
        let t = Token::from("fixed".to_string());
        store.put(&t, ctx(1, "alice")).unwrap();
        store.put(&t, ctx(2, "bob")).unwrap();
        assert!(store.tokens_for("alice").unwrap().is_empty());
        assert_eq!(store.tokens_for("bob").unwrap(), vec![t.clone()]);
        assert_eq!(store.get("fixed").unwrap().unwrap().username(), "bob");
    }

    #[test]
    fn ttl_expiry_and_sweep() {
        let store = MemorySessionStore::new(Some(Duration::from_millis(30)));
        let t1 = Token::from("t1".to_string());
        let t2 = Token::from("t2".to_string());
        store.put(&t1, ctx(1, "alice")).unwrap();
        store.put(&t2, ctx(1, "alice")).unwrap();
        assert!(store.get("t1").unwrap().is_some());
        std::thread::sleep(Duration::from_millis(60));
        assert!(store.get("t1").unwrap().is_none());
        assert_eq!(store.sweep().unwrap(), 1);
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn without_ttl_nothing_expires() {
        let store = MemorySessionStore::default();
        store.put(&Token::from("t".to_string()), ctx(1, "alice")).unwrap();
        assert_eq!(store.sweep().unwrap(), 0);
        assert_eq!(store.len().unwrap(), 1);
    }
}
