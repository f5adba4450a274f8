//! Access manager with deny precedence
//!
//! Evaluates the configured policies, in order, for a (resource, subject,
//! permission) triple. Key features:
//! - Explicit deny takes precedence over allow, wherever it appears
//! - No matching policy means no access
//! - Conditions see a context describing the request and the object
//! - Compiled patterns are cached

use super::cache::PatternCache;
use super::condition::{ConditionEvaluator, ConditionOutcome, ConditionValue, Context};
use super::policy::{Effect, Policy};
use crate::core::stats::{Metric, MetricKind, MetricsProvider};
use chrono::{SecondsFormat, Utc};
use tracing::debug;

/// Prefix turning a bucket path into a resource name
pub const RESOURCE_PREFIX: &str = "mfs:";
/// Prefix of permissions and object attributes in the context
pub const ATTRIBUTE_PREFIX: &str = "mfs::";

pub const CTX_RESOURCE: &str = "mfs::resource";
pub const CTX_PERMISSION: &str = "mfs::permission";
pub const CTX_USERNAME: &str = "authn::username";
pub const CTX_CURRENT_TIME: &str = "sys::CurrentTime";
pub const CTX_CLIENT_IP: &str = "req::ip";

/// Everything known about a request when authorizing it
#[derive(Debug, Clone, Copy)]
pub struct AccessRequest<'a> {
    /// Bucket path, without the `mfs:` prefix
    pub resource_path: &'a str,
    pub subject: Option<&'a str>,
    pub permission: &'a str,
    pub client_ip: Option<&'a str>,
    /// Object attributes (`key`, `size`, `acl`, ...), exposed as `mfs::<name>`
    pub attributes: Option<&'a Context>,
}

impl<'a> AccessRequest<'a> {
    pub fn new(resource_path: &'a str, subject: Option<&'a str>, permission: &'a str) -> Self {
        AccessRequest {
            resource_path,
            subject,
            permission,
            client_ip: None,
            attributes: None,
        }
    }

    pub fn with_client_ip(mut self, client_ip: &'a str) -> Self {
        self.client_ip = Some(client_ip);
        self
    }

    pub fn with_attributes(mut self, attributes: &'a Context) -> Self {
        self.attributes = Some(attributes);
        self
    }
}

/// Ordered policy set
#[derive(Debug, Default)]
pub struct AccessManager {
    policies: Vec<Policy>,
    conditions: ConditionEvaluator,
    patterns: PatternCache,
}

impl AccessManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Access manager using a custom condition registry
    pub fn with_conditions(conditions: ConditionEvaluator) -> Self {
        AccessManager {
            conditions,
            ..Self::default()
        }
    }

    /// Append an empty Allow policy and return it for configuration
    ///
    /// ```
    /// use mfs_rs::core::iam::AccessManager;
    ///
    /// let mut manager = AccessManager::new();
    /// manager
    ///     .new_policy()
    ///     .for_username("alice")
    ///     .for_prefix("/")
    ///     .permission("mfs::*");
    ///
    /// assert!(manager.is_granted("/notes.txt", "alice", "mfs::GetObject"));
    /// assert!(!manager.is_granted("/notes.txt", "bob", "mfs::GetObject"));
    /// ```
    pub fn new_policy(&mut self) -> &mut Policy {
        let index = self.policies.len();
        self.policies.push(Policy::new());
        &mut self.policies[index]
    }

    pub fn add_policy(&mut self, policy: Policy) {
        self.policies.push(policy);
    }

    pub fn policies(&self) -> &[Policy] {
        &self.policies
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    pub fn condition_evaluator(&self) -> &ConditionEvaluator {
        &self.conditions
    }

    /// Shorthand for [`is_authorized`](Self::is_authorized) without request metadata
    pub fn is_granted<'a>(
        &self,
        resource_path: &str,
        subject: impl Into<Option<&'a str>>,
        permission: &str,
    ) -> bool {
        self.is_authorized(&AccessRequest::new(resource_path, subject.into(), permission))
    }

    /// Evaluate every policy; the first applicable Deny wins, otherwise any
    /// applicable Allow grants
    pub fn is_authorized(&self, request: &AccessRequest<'_>) -> bool {
        let resource = format!("{}{}", RESOURCE_PREFIX, request.resource_path);
        let context = self.build_context(request, &resource);
        let mut allowed = false;

        for (index, policy) in self.policies.iter().enumerate() {
            if !policy.applies_to(request.subject, &resource, request.permission, &self.patterns) {
                continue;
            }

            if !policy.conditions.is_empty() {
                if let ConditionOutcome::Failed(reason) =
                    self.conditions.evaluate(&context, &policy.conditions)
                {
                    debug!(policy = index, id = ?policy.id, "Policy conditions not met: {}", reason);
                    continue;
                }
            }

            match policy.effect {
                Effect::Deny => {
                    debug!(
                        policy = index,
                        id = ?policy.id,
                        "Denied {} on {} for {:?}",
                        request.permission,
                        resource,
                        request.subject
                    );
                    return false;
                }
                Effect::Allow => allowed = true,
            }
        }

        if !allowed {
            debug!(
                "No policy grants {} on {} for {:?}",
                request.permission, resource, request.subject
            );
        }
        allowed
    }

    /// Context seen by conditions for `request`
    pub fn build_context(&self, request: &AccessRequest<'_>, resource: &str) -> Context {
        let mut context = Context::new();

        if let Some(attributes) = request.attributes {
            for (name, value) in attributes {
                context.insert(format!("{}{}", ATTRIBUTE_PREFIX, name), value.clone());
            }
        }

        context.insert(CTX_RESOURCE.to_string(), resource.into());
        context.insert(CTX_PERMISSION.to_string(), request.permission.into());
        context.insert(
            CTX_CURRENT_TIME.to_string(),
            ConditionValue::String(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
        );
        if let Some(subject) = request.subject {
            context.insert(CTX_USERNAME.to_string(), subject.into());
        }
        if let Some(ip) = request.client_ip {
            context.insert(CTX_CLIENT_IP.to_string(), ip.into());
        }

        context
    }
}

impl MetricsProvider for AccessManager {
    fn metrics(&self) -> Vec<Metric> {
        vec![Metric::new("iam_policy_count", self.policies.len() as f64)
            .with_help("Number of configured access policies")
            .with_kind(MetricKind::Gauge)]
    }
}
