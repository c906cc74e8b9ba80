//! Password hashing with per-user salts.
//!
//! Hashes are Argon2id PHC strings. The salt is also kept next to the hash in
//! the user record and verification always re-derives with that per-user salt,
//! so a hash can never be checked against a salt it was not produced with.

use anyhow::{Result, anyhow};
use argon2::{Algorithm, Argon2, Params, PasswordHasher, Version};
use password_hash::{PasswordHash, SaltString};

pub const SALT_LEN: usize = 16;

/// Argon2 cost parameters. Defaults follow the argon2 crate recommendations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashParams {
    pub m_cost_kib: u32,
    pub t_cost: u32,
    pub p_cost: u32,
}

impl Default for HashParams {
    fn default() -> Self {
        Self { m_cost_kib: Params::DEFAULT_M_COST, t_cost: Params::DEFAULT_T_COST, p_cost: Params::DEFAULT_P_COST }
    }
}

impl HashParams {
    /// Cheap parameters for tests and local tooling. Never use for real users.
    pub fn insecure_fast() -> Self { Self { m_cost_kib: 256, t_cost: 1, p_cost: 1 } }
}

#[derive(Debug, Clone, Default)]
pub struct PasswordEncoder {
    params: Params,
}

impl PasswordEncoder {
    pub fn new(p: HashParams) -> Result<Self> {
        let params = Params::new(p.m_cost_kib, p.t_cost, p.p_cost, None).map_err(|e| anyhow!("invalid argon2 params: {}", e))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash `password` with `salt` into a PHC string.
    pub fn encode(&self, password: &str, salt: &[u8]) -> Result<String> {
        let salt = SaltString::encode_b64(salt).map_err(|e| anyhow!(e.to_string()))?;
        let phc = self.argon2().hash_password(password.as_bytes(), &salt).map_err(|e| anyhow!(e.to_string()))?.to_string();
        Ok(phc)
    }

    /// Re-derive the hash of `password` with the stored per-user `salt` and compare
    /// against `stored_hash`. The output comparison is constant time.
    pub fn matches(&self, password: &str, stored_hash: &str, salt: &[u8]) -> bool {
        let Ok(stored) = PasswordHash::new(stored_hash) else { return false; };
        // Honour the cost the hash was created with, not the current defaults
        let params = Params::try_from(&stored).unwrap_or_else(|_| self.params.clone());
        let Some(expected) = stored.hash else { return false; };
        let Ok(salt) = SaltString::encode_b64(salt) else { return false; };
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        match argon2.hash_password(password.as_bytes(), &salt) {
            Ok(candidate) => candidate.hash.map(|h| h == expected).unwrap_or(false),
            Err(_) => false,
        }
    }
}

/// Fresh random salt from the OS CSPRNG.
pub fn generate_salt() -> Result<Vec<u8>> {
    let mut salt_bytes = [0u8; SALT_LEN];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    Ok(salt_bytes.to_vec())
}
