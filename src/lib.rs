//! sessiongate: token-based login service.
//!
//! `server` mounts the login filter and authorization interceptor; `identity`
//! holds tokens, sessions and credential verification; `storage` provides the
//! user repository and the shared file-backed session store.

pub mod config;
pub mod error;
pub mod identity;
pub mod security;
pub mod server;
pub mod storage;
