//! Dashboard credential check
//!
//! The dashboard takes an optional `Authorization: Bearer <token>` header.
//! What counts as a valid credential is decided by a [`CredentialVerifier`],
//! chosen once at startup from configuration.

use axum::http::{header, HeaderMap};

pub trait CredentialVerifier: Send + Sync {
    /// `credential` is the bearer token, if the request carried one.
    fn verify(&self, credential: Option<&str>) -> bool;

    fn name(&self) -> &'static str;
}

/// Admits every request. Used when no dashboard secret is configured.
pub struct OpenAccess;

impl CredentialVerifier for OpenAccess {
    fn verify(&self, _credential: Option<&str>) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "open"
    }
}

/// Single shared secret compared against the bearer token.
pub struct SharedSecret {
    secret: String,
}

impl SharedSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

impl CredentialVerifier for SharedSecret {
    fn verify(&self, credential: Option<&str>) -> bool {
        match credential {
            Some(token) => constant_time_eq(token.as_bytes(), self.secret.as_bytes()),
            None => false,
        }
    }

    fn name(&self) -> &'static str {
        "shared-secret"
    }
}

/// Pick the verifier for an optional configured secret.
pub fn verifier_for(secret: Option<&str>) -> Box<dyn CredentialVerifier> {
    match secret {
        Some(secret) => Box::new(SharedSecret::new(secret)),
        None => Box::new(OpenAccess),
    }
}

/// Token from an `Authorization: Bearer <token>` header, if present.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
