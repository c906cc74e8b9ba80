use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const ROLE_USER: &str = "ROLE_USER";
pub const ROLE_ADMIN: &str = "ROLE_ADMIN";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Identity {
    pub id: u64,
    pub username: String,
}

/// Who is logged in behind a token. Built once at login and never mutated;
/// the session store hands out clones.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SecurityContext {
    principal: Identity,
    #[serde(default)]
    authorities: BTreeSet<String>,
}

impl SecurityContext {
    pub fn new<I, S>(principal: Identity, authorities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { principal, authorities: authorities.into_iter().map(Into::into).collect() }
    }

    pub fn principal(&self) -> &Identity { &self.principal }
    pub fn username(&self) -> &str { &self.principal.username }
    pub fn authorities(&self) -> &BTreeSet<String> { &self.authorities }
    pub fn has_authority(&self, authority: &str) -> bool { self.authorities.contains(authority) }
}
