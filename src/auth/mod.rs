//! The key & auth gate (§4.1): opaque bearer credentials, scope checks, and
//! the internal-dashboard synthetic admin path.

pub mod credential;
mod error;
mod middleware;

pub use credential::{generate_secret, hash_secret, ip_allowed, scope_permits, GeneratedSecret};
pub use error::{AuthError, AuthResult};
pub use middleware::{require_credential, ResolvedCredential};
