use thiserror::Error;

#[derive(Error, Debug)]
pub enum MfsError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Invalid ACL: {0}")]
    InvalidAcl(String),

    #[error("Cannot create key with same name as common-prefix: {0}")]
    PrefixConflict(String),

    #[error("Object does not exist: {0}")]
    NoSuchKey(String),

    #[error("Invalid authenticator result from '{0}'")]
    InvalidAuthenticatorResult(String),

    #[error("Failed to publish event: {0}")]
    Publish(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl MfsError {
    /// True for errors caused by the caller's input rather than the server
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            MfsError::InvalidPath(_) | MfsError::InvalidAcl(_) | MfsError::PrefixConflict(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, MfsError>;
