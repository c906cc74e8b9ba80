//! Identity and session management for token-based login.
//! Keep the public surface thin and split implementation across sub-modules.

mod principal;
mod token;
mod session;
mod provider;
mod request_context;

pub use principal::{Identity, SecurityContext, ROLE_ADMIN, ROLE_USER};
pub use token::{RandomTokenIssuer, Token, TokenIssuer, MIN_TOKEN_BITS};
pub use session::{MemorySessionStore, SessionManager, SessionStore};
pub use provider::{CredentialVerifier, LoginRequest, LoginResponse, RepositoryCredentialVerifier};
pub use request_context::RequestContext;
