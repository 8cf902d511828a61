//! Opaque bearer credential: generation, hashing, scope and IP-allowlist checks.

use axum::http::Method;
use std::net::IpAddr;
use uuid::Uuid;

use crate::db::CredentialScope;

/// Number of random bytes in a generated secret (before hex-encoding).
const SECRET_BYTES: usize = 32;
/// Length of the non-secret prefix shown back to the tenant for identification.
const PREFIX_LEN: usize = 8;

/// A freshly generated secret, returned to the caller exactly once.
pub struct GeneratedSecret {
    /// The full plaintext secret (`ek_<hex>`). Never persisted.
    pub plaintext: String,
    /// First characters of the hex body, safe to store and display.
    pub prefix: String,
    /// SHA-256 hex digest of the plaintext, the only form persisted.
    pub digest: String,
}

/// Generate a new high-entropy credential secret.
#[must_use]
pub fn generate_secret() -> GeneratedSecret {
    use rand::RngCore;
    let mut bytes = [0u8; SECRET_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    let body = hex::encode(bytes);
    let plaintext = format!("ek_{body}");
    let prefix = body[..PREFIX_LEN].to_string();
    let digest = hash_secret(&plaintext);
    GeneratedSecret {
        plaintext,
        prefix,
        digest,
    }
}

/// Hash a presented secret with the fixed digest used for lookup.
#[must_use]
pub fn hash_secret(secret: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Whether a scope permits the given HTTP method.
///
/// READ -> GET/HEAD; WRITE -> READ + POST; ADMIN -> all.
#[must_use]
pub fn scope_permits(scope: CredentialScope, method: &Method) -> bool {
    match scope {
        CredentialScope::Admin => true,
        CredentialScope::Write => {
            matches!(*method, Method::GET | Method::HEAD | Method::POST)
        }
        CredentialScope::Read => matches!(*method, Method::GET | Method::HEAD),
    }
}

/// Whether `ip` matches at least one CIDR in `allowlist`.
///
/// An empty allowlist means "no restriction" (always allowed). IPv4-mapped
/// IPv6 addresses are normalized to IPv4 before comparison.
#[must_use]
pub fn ip_allowed(allowlist: &[String], ip: IpAddr) -> bool {
    if allowlist.is_empty() {
        return true;
    }

    let normalized = match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map_or(ip, IpAddr::V4),
        other => other,
    };

    allowlist.iter().any(|cidr| {
        cidr.parse::<ipnet::IpNet>()
            .is_ok_and(|net| net.contains(&normalized))
    })
}

/// Synthetic credential id used for the internal-dashboard auth path.
///
/// Deterministic per tenant so audit log entries stay correlatable across
/// requests without a real row existing in the `credentials` table.
#[must_use]
pub fn internal_dashboard_credential_id(tenant_id: Uuid) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, tenant_id.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_secret_roundtrips_through_digest() {
        let generated = generate_secret();
        assert_eq!(hash_secret(&generated.plaintext), generated.digest);
        assert_eq!(generated.prefix.len(), PREFIX_LEN);
        assert!(generated.plaintext.starts_with("ek_"));
    }

    #[test]
    fn scope_permits_matches_spec_table() {
        assert!(scope_permits(CredentialScope::Read, &Method::GET));
        assert!(!scope_permits(CredentialScope::Read, &Method::POST));
        assert!(scope_permits(CredentialScope::Write, &Method::POST));
        assert!(!scope_permits(CredentialScope::Write, &Method::DELETE));
        assert!(scope_permits(CredentialScope::Admin, &Method::DELETE));
    }

    #[test]
    fn empty_allowlist_allows_everything() {
        assert!(ip_allowed(&[], "203.0.113.5".parse().unwrap()));
    }

    #[test]
    fn allowlist_matches_containing_cidr() {
        let allowlist = vec!["10.0.0.0/8".to_string()];
        assert!(ip_allowed(&allowlist, "10.1.2.3".parse().unwrap()));
        assert!(!ip_allowed(&allowlist, "192.168.1.1".parse().unwrap()));
    }

    #[test]
    fn allowlist_normalizes_ipv4_mapped_ipv6() {
        let allowlist = vec!["10.0.0.0/8".to_string()];
        let mapped: IpAddr = "::ffff:10.1.2.3".parse().unwrap();
        assert!(ip_allowed(&allowlist, mapped));
    }

    #[test]
    fn internal_dashboard_credential_id_is_stable_per_tenant() {
        let tenant = Uuid::new_v4();
        assert_eq!(
            internal_dashboard_credential_id(tenant),
            internal_dashboard_credential_id(tenant)
        );
    }
}
