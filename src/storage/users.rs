//! User and credential repository.
//!
//! The login path only ever reads from here (`find_by_username`); the write
//! side exists for provisioning and the seeded admin account.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use anyhow::{Result, anyhow, bail};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{info, warn};

use crate::identity::Identity;
use crate::security::{generate_salt, PasswordEncoder};

pub const PROTECTED_PASSWORD: &str = "[PROTECTED]";

/// Credential record as persisted. The password only exists here as a salted hash.
#[derive(Debug, Clone)]
pub struct StoredCredential {
    pub id: u64,
    pub username: String,
    pub password_hash: String,
    pub salt: Vec<u8>,
    pub authorities: BTreeSet<String>,
}

impl StoredCredential {
    pub fn identity(&self) -> Identity { Identity { id: self.id, username: self.username.clone() } }
}

/// Provisioning input; `password` is plaintext and is hashed before storage.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub authorities: Vec<String>,
}

/// Outward-facing view of a user, password always masked.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UserView {
    pub id: u64,
    pub username: String,
    pub password: &'static str,
    pub authorities: BTreeSet<String>,
}

impl From<&StoredCredential> for UserView {
    fn from(c: &StoredCredential) -> Self {
        Self { id: c.id, username: c.username.clone(), password: PROTECTED_PASSWORD, authorities: c.authorities.clone() }
    }
}

pub trait UserRepository: Send + Sync {
    /// Exact, case-sensitive lookup.
    fn find_by_username(&self, username: &str) -> Result<Option<StoredCredential>>;
    /// Hash and store `user`, replacing any user with the same name. Returns the new id.
    fn save_user(&self, user: NewUser) -> Result<u64>;
    /// Remove a user by id, returning the removed username. Unknown ids are an error.
    fn delete_user(&self, id: u64) -> Result<String>;
    fn count(&self) -> Result<u64>;

    fn get_user_view(&self, username: &str) -> Result<Option<UserView>> {
        Ok(self.find_by_username(username)?.as_ref().map(UserView::from))
    }
}

pub struct InMemoryUserRepository {
    encoder: PasswordEncoder,
    users: RwLock<HashMap<String, StoredCredential>>,
    next_id: AtomicU64,
}

impl InMemoryUserRepository {
    pub fn new(encoder: PasswordEncoder) -> Self {
        Self { encoder, users: RwLock::new(HashMap::new()), next_id: AtomicU64::new(1) }
    }

    #[cfg(test)]
    pub(crate) fn encoder(&self) -> &PasswordEncoder { &self.encoder }
}

impl UserRepository for InMemoryUserRepository {
    fn find_by_username(&self, username: &str) -> Result<Option<StoredCredential>> {
        Ok(self.users.read().get(username).cloned())
    }

    fn save_user(&self, user: NewUser) -> Result<u64> {
        if user.username.trim().is_empty() { bail!("username cannot be empty"); }
        if user.password.is_empty() { bail!("password cannot be empty"); }
        let salt = generate_salt()?;
        let password_hash = self.encoder.encode(&user.password, &salt)?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cred = StoredCredential {
            id,
            username: user.username.clone(),
            password_hash,
            salt,
            authorities: user.authorities.into_iter().collect(),
        };
        self.users.write().insert(user.username, cred);
        Ok(id)
    }

    fn delete_user(&self, id: u64) -> Result<String> {
        let mut users = self.users.write();
        let Some(name) = users.values().find(|c| c.id == id).map(|c| c.username.clone()) else {
            info!(target: "sessiongate::users", id, "There is no record with this id");
            return Err(anyhow!("Record not exists with id :: {}", id));
        };
        users.remove(&name);
        Ok(name)
    }

    fn count(&self) -> Result<u64> { Ok(self.users.read().len() as u64) }
}

/// Seed the first admin when the repository is empty. Returns whether a user was created.
/// Without credentials nothing is seeded and the server runs with no admin.
pub fn ensure_default_admin(repo: &dyn UserRepository, credentials: Option<(&str, &str)>) -> Result<bool> {
    if repo.count()? > 0 { return Ok(false); }
    let Some((username, password)) = credentials else {
        warn!(target: "sessiongate::users", "no users present and no admin provisioned; set SESSIONGATE_ADMIN_USER and SESSIONGATE_ADMIN_PASSWORD");
        return Ok(false);
    };
    if username == "admin" && password == "admin" {
        warn!(target: "sessiongate::users", "seeding development admin 'admin' with the default password; never expose this server");
    }
    repo.save_user(NewUser {
        username: username.to_string(),
        password: password.to_string(),
        authorities: vec![crate::identity::ROLE_ADMIN.to_string(), crate::identity::ROLE_USER.to_string()],
    })?;
    info!(target: "sessiongate::users", user = %username, "seeded default admin");
    Ok(true)
}
