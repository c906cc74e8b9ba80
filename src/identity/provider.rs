use std::fmt;
use std::sync::Arc;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use super::principal::SecurityContext;
use crate::error::{AppError, AppResult};
use crate::security::{generate_salt, PasswordEncoder};
use crate::storage::UserRepository;

/// Login payload. Exactly `username` and `password`, both required.
#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest").field("username", &self.username).field("password", &"***").finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
    pub name: String,
}

pub trait CredentialVerifier: Send + Sync {
    /// Check `password` for `username` and build the caller's security context.
    /// Unknown user and wrong password fail identically with `InvalidCredentials`.
    fn verify(&self, username: &str, password: &str) -> AppResult<SecurityContext>;
}

/// Verifies against salted hashes held by a `UserRepository`.
pub struct RepositoryCredentialVerifier {
    users: Arc<dyn UserRepository>,
    encoder: PasswordEncoder,
    // (hash, salt) burned on unknown usernames so both failure paths cost one hash
    dummy: OnceCell<(String, Vec<u8>)>,
}

impl RepositoryCredentialVerifier {
    /// Builds the dummy credential up front so that even the first unknown-user
    /// login costs exactly one hash.
    pub fn new(users: Arc<dyn UserRepository>, encoder: PasswordEncoder) -> Self {
        let verifier = Self { users, encoder, dummy: OnceCell::new() };
        if let Err(e) = verifier.dummy_credential() {
            warn!(target: "auth", "dummy credential not prepared, retrying on first use: {}", e);
        }
        verifier
    }

    fn dummy_credential(&self) -> anyhow::Result<&(String, Vec<u8>)> {
        self.dummy.get_or_try_init(|| {
            let salt = generate_salt()?;
            let hash = self.encoder.encode("sessiongate-dummy-credential", &salt)?;
            Ok((hash, salt))
        })
    }

    fn burn_dummy_hash(&self, password: &str) {
        if let Ok((hash, salt)) = self.dummy_credential() {
            let _ = self.encoder.matches(password, hash, salt);
        }
    }
}

impl CredentialVerifier for RepositoryCredentialVerifier {
    fn verify(&self, username: &str, password: &str) -> AppResult<SecurityContext> {
        let found = self.users.find_by_username(username).map_err(|e| {
            error!(target: "auth", "user lookup failed: {}", e);
            AppError::store_unavailable("user repository unavailable")
        })?;
        let Some(cred) = found else {
            self.burn_dummy_hash(password);
            debug!(target: "auth", "login rejected: unknown user");
            return Err(AppError::invalid_credentials());
        };
        if !self.encoder.matches(password, &cred.password_hash, &cred.salt) {
            debug!(target: "auth", "login rejected: password mismatch");
            return Err(AppError::invalid_credentials());
        }
        Ok(SecurityContext::new(cred.identity(), cred.authorities.iter().cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::ROLE_USER;
    use crate::security::HashParams;
    use crate::storage::{InMemoryUserRepository, NewUser, StoredCredential, UserView};

    fn verifier() -> RepositoryCredentialVerifier {
        let enc = PasswordEncoder::new(HashParams::insecure_fast()).unwrap();
        let repo = InMemoryUserRepository::new(enc.clone());
        repo.save_user(NewUser { username: "alice".into(), password: "correct".into(), authorities: vec![ROLE_USER.into()] }).unwrap();
        RepositoryCredentialVerifier::new(Arc::new(repo), enc)
    }

    #[test]
    fn good_password_yields_context() {
        let ctx = verifier().verify("alice", "correct").unwrap();
        assert_eq!(ctx.username(), "alice");
        assert!(ctx.has_authority(ROLE_USER));
    }

    #[test]
    fn unknown_user_and_wrong_password_look_the_same() {
        let v = verifier();
        let wrong = v.verify("alice", "wrong").unwrap_err();
        let unknown = v.verify("mallory", "correct").unwrap_err();
        assert_eq!(wrong, unknown);
        assert_eq!(wrong, AppError::invalid_credentials());
    }

    #[test]
    fn dummy_credential_is_ready_before_first_login() {
        let v = verifier();
        let (hash, salt) = v.dummy.get().expect("prepared in new");
        assert!(hash.starts_with("$argon2id$"));
        assert_eq!(salt.len(), crate::security::SALT_LEN);
    }

    #[test]
    fn username_match_is_exact() {
        assert!(verifier().verify("ALICE", "correct").is_err());
    }

    struct BrokenRepo;
    impl UserRepository for BrokenRepo {
        fn find_by_username(&self, _: &str) -> anyhow::Result<Option<StoredCredential>> { anyhow::bail!("db down") }
        fn save_user(&self, _: NewUser) -> anyhow::Result<u64> { anyhow::bail!("db down") }
        fn delete_user(&self, _: u64) -> anyhow::Result<String> { anyhow::bail!("db down") }
        fn count(&self) -> anyhow::Result<u64> { anyhow::bail!("db down") }
        fn get_user_view(&self, _: &str) -> anyhow::Result<Option<UserView>> { anyhow::bail!("db down") }
    }

    #[test]
    fn repository_outage_is_not_bad_credentials() {
        let v = RepositoryCredentialVerifier::new(Arc::new(BrokenRepo), PasswordEncoder::default());
        assert_eq!(v.verify("alice", "x").unwrap_err().http_status(), 503);
    }

    #[test]
    fn login_request_debug_hides_password() {
        let r = LoginRequest { username: "alice".into(), password: "hunter2".into() };
        assert!(!format!("{:?}", r).contains("hunter2"));
    }

    #[test]
    fn login_response_is_camel_case() {
        let v = serde_json::to_value(LoginResponse { access_token: "t".into(), name: "alice".into() }).unwrap();
        assert_eq!(v, serde_json::json!({"accessToken": "t", "name": "alice"}));
    }
}
