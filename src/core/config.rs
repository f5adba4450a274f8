//! Gateway configuration
//!
//! Loaded from TOML:
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 8080
//!
//! [bucket]
//! path = "data"
//!
//! [[keys]]
//! access = "alice"
//! secret_hash = "$argon2id$v=19$..."
//!
//! [[policies]]
//! usernames = ["alice"]
//! resources = ["mfs:/*"]
//! permissions = ["mfs::*"]
//! ```
//!
//! Relative paths (bucket, policy files) are resolved against the directory
//! of the configuration file.

use crate::core::authn::{AuthenticatorSet, BasicAuthenticator, JwtSessionAuthenticator, KeyManager};
use crate::core::bucket::Acls;
use crate::core::error::{MfsError, Result};
use crate::core::iam::{AccessManager, Policy};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub bucket: BucketConfig,
    /// Custom ACLs; empty means `public-read` and `private`
    pub acls: Vec<AclConfig>,
    pub keys: Vec<KeyConfig>,
    pub jwt: Option<JwtConfig>,
    pub messaging: Option<MessagingConfig>,
    pub policies: Vec<PolicyDocument>,
    /// JSON or TOML files with more policies, appended after `policies`
    pub policy_files: Vec<PathBuf>,

    #[serde(skip)]
    base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Realm announced in `WWW-Authenticate`
    pub realm: String,
    /// Answer `?debug` requests with a request dump, unauthenticated
    pub debug_requests: bool,
    /// Serve `?metrics` without authentication
    pub public_metrics: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
            realm: "mfs".to_string(),
            debug_requests: true,
            public_metrics: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AclConfig {
    pub name: String,
    pub mode: u32,
    #[serde(default)]
    pub default: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyConfig {
    pub access: String,
    /// Plain secret (convenient for development), hashed on load
    #[serde(default)]
    pub secret: Option<String>,
    /// Argon2 hash of the secret in PHC string format
    #[serde(default)]
    pub secret_hash: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagingConfig {
    pub endpoint: String,
    pub access: String,
    pub secret: String,
    pub queue: String,
}

/// Policy as written in configuration
///
/// Accepts the deprecated `prefixes` list, each entry becoming a
/// `mfs:<prefix>*` resource pattern.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyDocument {
    #[serde(flatten)]
    pub policy: Policy,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prefixes: Vec<String>,
}

impl PolicyDocument {
    pub fn into_policy(self) -> Policy {
        let mut policy = self.policy;
        for prefix in &self.prefixes {
            policy.for_prefix(prefix);
        }
        policy
    }
}

#[derive(Debug, Deserialize)]
struct PolicyFile {
    #[serde(default)]
    policies: Vec<PolicyDocument>,
}

impl Config {
    /// Read and validate a TOML configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            MfsError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let config = Self::parse(&text, base_dir)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse TOML, resolving relative paths against `base_dir`
    pub fn parse(text: &str, base_dir: impl Into<PathBuf>) -> Result<Self> {
        let mut config: Config = toml::from_str(text)?;
        config.base_dir = base_dir.into();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.bucket.path.as_os_str().is_empty() {
            return Err(MfsError::Configuration(
                "missing bucket path ([bucket] path)".into(),
            ));
        }

        for key in &self.keys {
            if key.secret.is_none() && key.secret_hash.is_none() {
                return Err(MfsError::Configuration(format!(
                    "key '{}' has neither secret nor secret_hash",
                    key.access
                )));
            }
        }

        if !self.acls.is_empty() && !self.acls.iter().any(|acl| acl.default) {
            return Err(MfsError::Configuration("no default ACL defined".into()));
        }

        Ok(())
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn bucket_path(&self) -> PathBuf {
        self.resolve_path(&self.bucket.path)
    }

    pub fn acls(&self) -> Acls {
        if self.acls.is_empty() {
            return Acls::defaults();
        }
        let mut acls = Acls::new();
        for acl in &self.acls {
            acls.define(acl.name.clone(), acl.mode, acl.default);
        }
        acls
    }

    pub fn key_manager(&self) -> Result<KeyManager> {
        let mut keys = KeyManager::new();
        for key in &self.keys {
            match (&key.secret_hash, &key.secret) {
                (Some(hash), _) => {
                    keys.add_hashed_credentials(key.access.clone(), hash)?;
                }
                (None, Some(secret)) => {
                    keys.add_key(key.access.clone(), secret)?;
                }
                (None, None) => {}
            }
        }
        Ok(keys)
    }

    /// Basic authentication first, then bearer tokens when configured
    pub fn authenticator_set(&self) -> Result<AuthenticatorSet> {
        let mut set = AuthenticatorSet::default();
        set.push(Arc::new(BasicAuthenticator::new(Arc::new(self.key_manager()?))));

        if let Some(jwt) = &self.jwt {
            let mut authenticator = JwtSessionAuthenticator::new(jwt.secret.as_bytes());
            if let Some(scope) = &jwt.scope {
                authenticator = authenticator.with_scope(scope.clone());
            }
            set.push(Arc::new(authenticator));
        }
        Ok(set)
    }

    /// Inline policies followed by those of every policy file, in order
    pub fn access_manager(&self) -> Result<AccessManager> {
        let mut manager = AccessManager::new();
        let documents = self.policies.iter().cloned();
        let mut from_files = Vec::new();
        for file in &self.policy_files {
            from_files.extend(load_policy_file(&self.resolve_path(file))?);
        }

        for document in documents.chain(from_files) {
            let policy = document.into_policy();
            if let Err(problem) = policy.validate() {
                warn!("{}", problem);
            }
            manager.add_policy(policy);
        }

        debug!("Configured {} policies", manager.len());
        Ok(manager)
    }
}

/// Read policies from a `.json` (array) or `.toml` (`[[policies]]`) file
pub fn load_policy_file(path: &Path) -> Result<Vec<PolicyDocument>> {
    let text = fs::read_to_string(path).map_err(|e| {
        MfsError::Configuration(format!("cannot read policy file {}: {}", path.display(), e))
    })?;

    let documents = match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => serde_json::from_str(&text)?,
        Some("toml") => toml::from_str::<PolicyFile>(&text)?.policies,
        _ => {
            return Err(MfsError::Configuration(format!(
                "unsupported policy file type: {}",
                path.display()
            )))
        }
    };

    debug!("Read policies from {}", path.display());
    Ok(documents)
}
