//! Request authentication
//!
//! An [`AuthenticatorSet`] asks each configured [`Authenticator`] in turn who
//! sent a request; the first one that recognises the caller wins.

mod basic;
mod jwt;

pub use basic::{hash_secret, BasicAuthenticator, KeyManager};
pub use jwt::{JwtSessionAuthenticator, SESSION_COOKIE};

use crate::core::error::{MfsError, Result};
use crate::core::request::RequestHead;
use crate::core::stats::{Metric, MetricKind, MetricsProvider};
use std::sync::Arc;
use tracing::{debug, error};

/// Who sent a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub subject: String,
    /// Newly opened session to hand back to the client as a cookie
    pub session: Option<String>,
}

impl Identity {
    pub fn new(subject: impl Into<String>) -> Self {
        Identity {
            subject: subject.into(),
            session: None,
        }
    }

    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }
}

/// One way of identifying the caller
pub trait Authenticator: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// `None` when this authenticator does not recognise the request
    fn authenticate(&self, request: &RequestHead) -> Option<Identity>;

    fn metrics(&self) -> Vec<Metric> {
        Vec::new()
    }
}

/// Ordered chain of authenticators
#[derive(Clone, Default)]
pub struct AuthenticatorSet {
    authenticators: Vec<Arc<dyn Authenticator>>,
}

impl AuthenticatorSet {
    pub fn new(authenticators: Vec<Arc<dyn Authenticator>>) -> Self {
        AuthenticatorSet { authenticators }
    }

    pub fn push(&mut self, authenticator: Arc<dyn Authenticator>) {
        self.authenticators.push(authenticator);
    }

    pub fn len(&self) -> usize {
        self.authenticators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.authenticators.is_empty()
    }

    /// Identify the caller
    ///
    /// An authenticator that claims the request with an empty subject is a
    /// programming error and fails the request.
    pub fn authenticate(&self, request: &RequestHead) -> Result<Option<Identity>> {
        for authenticator in &self.authenticators {
            let Some(identity) = authenticator.authenticate(request) else {
                continue;
            };

            if identity.subject.is_empty() {
                error!(
                    "Authenticator '{}' returned an empty identity",
                    authenticator.name()
                );
                return Err(MfsError::InvalidAuthenticatorResult(
                    authenticator.name().to_string(),
                ));
            }

            debug!(
                "Authenticated '{}' via {}",
                identity.subject,
                authenticator.name()
            );
            return Ok(Some(identity));
        }

        Ok(None)
    }
}

impl MetricsProvider for AuthenticatorSet {
    fn metrics(&self) -> Vec<Metric> {
        let mut metrics = vec![Metric::new(
            "authn_authenticators_count",
            self.authenticators.len() as f64,
        )
        .with_help("Number of configured authenticators")
        .with_kind(MetricKind::Gauge)];

        for authenticator in &self.authenticators {
            metrics.extend(authenticator.metrics());
        }
        metrics
    }
}

impl std::fmt::Debug for AuthenticatorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.authenticators.iter().map(|a| a.name()).collect();
        f.debug_struct("AuthenticatorSet")
            .field("authenticators", &names)
            .finish()
    }
}
