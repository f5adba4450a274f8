//! HTTP Basic authentication against a credential store

use super::{Authenticator, Identity};
use crate::core::error::{MfsError, Result};
use crate::core::request::RequestHead;
use crate::core::stats::{Metric, MetricKind, MetricsProvider};
use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use base64::{engine::general_purpose::STANDARD, Engine};
use std::sync::Arc;
use tracing::debug;

/// Salted Argon2id hash of a secret in PHC string format, as stored in configuration
pub fn hash_secret(secret: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| MfsError::Configuration(format!("failed to hash secret: {}", e)))
}

#[derive(Debug, Clone)]
struct Credentials {
    access: String,
    /// PHC string, checked to parse on registration
    hash: String,
}

/// Access keys and the password hashes of their secrets
#[derive(Debug, Clone, Default)]
pub struct KeyManager {
    keys: Vec<Credentials>,
}

impl KeyManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a key from its plain secret
    pub fn add_key(&mut self, access: impl Into<String>, secret: &str) -> Result<&mut Self> {
        let hash = hash_secret(secret)?;
        self.keys.push(Credentials {
            access: access.into(),
            hash,
        });
        Ok(self)
    }

    /// Register a key from a PHC password hash (see [`hash_secret`])
    pub fn add_hashed_credentials(
        &mut self,
        access: impl Into<String>,
        hash: &str,
    ) -> Result<&mut Self> {
        let access = access.into();
        let hash = hash.trim();
        PasswordHash::new(hash).map_err(|e| {
            MfsError::Configuration(format!(
                "secret hash for key '{}' is not a PHC string: {}",
                access, e
            ))
        })?;

        self.keys.push(Credentials {
            access,
            hash: hash.to_string(),
        });
        Ok(self)
    }

    /// True if `secret` belongs to `access`
    pub fn valid_credentials(&self, access: &str, secret: &str) -> bool {
        self.keys
            .iter()
            .filter(|key| key.access == access)
            .any(|key| match PasswordHash::new(&key.hash) {
                Ok(hash) => Argon2::default()
                    .verify_password(secret.as_bytes(), &hash)
                    .is_ok(),
                Err(_) => false,
            })
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl MetricsProvider for KeyManager {
    fn metrics(&self) -> Vec<Metric> {
        vec![Metric::new("auth_key_count", self.keys.len() as f64)
            .with_help("Number of configured access keys")
            .with_kind(MetricKind::Gauge)]
    }
}

/// `Authorization: Basic <base64(access:secret)>`
pub struct BasicAuthenticator {
    keys: Arc<KeyManager>,
}

impl BasicAuthenticator {
    pub fn new(keys: Arc<KeyManager>) -> Self {
        BasicAuthenticator { keys }
    }

    fn check(&self, header: &str) -> Option<String> {
        let fields: Vec<&str> = header.split(' ').collect();
        if fields.len() != 2 || fields[0] != "Basic" {
            return None;
        }

        let decoded = STANDARD.decode(fields[1]).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let parts: Vec<&str> = decoded.split(':').collect();
        if parts.len() != 2 {
            return None;
        }

        if !self.keys.valid_credentials(parts[0], parts[1]) {
            debug!("Invalid credentials for key '{}'", parts[0]);
            return None;
        }
        Some(parts[0].to_string())
    }
}

impl Authenticator for BasicAuthenticator {
    fn name(&self) -> &str {
        "basic"
    }

    fn authenticate(&self, request: &RequestHead) -> Option<Identity> {
        request
            .headers
            .get_all("authorization")
            .find_map(|header| self.check(header))
            .map(Identity::new)
    }

    fn metrics(&self) -> Vec<Metric> {
        self.keys.metrics()
    }
}
