//! IAM policy structure
//!
//! A policy grants or denies a set of permissions to a set of subjects on a
//! set of resources. Subjects, resources and permissions are wildcard
//! patterns (see [`super::pattern`]); conditions narrow the policy further.
//!
//! Policies are configured fluently:
//!
//! ```
//! use mfs_rs::core::iam::Policy;
//!
//! let mut policy = Policy::new();
//! policy
//!     .for_username("alice")
//!     .for_resource("mfs:/shared/*")
//!     .permission("mfs::Get*")
//!     .description("alice reads shared files");
//! assert!(policy.has_access());
//! ```

use super::cache::PatternCache;
use super::condition::{Conditions, ExpectedValue};
use super::engine::RESOURCE_PREFIX;
use serde::{Deserialize, Serialize};

/// Effect of a policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Effect {
    /// Grant the permissions
    #[default]
    Allow,
    /// Refuse the permissions (takes precedence over Allow)
    Deny,
}

/// A single access policy
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Free text, diagnostics only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Subject patterns; empty applies to any subject
    pub usernames: Vec<String>,

    /// Resource patterns, e.g. `mfs:/data/*`; empty applies to any resource
    pub resources: Vec<String>,

    /// Permission patterns, e.g. `mfs::Get*`; empty applies to nothing
    pub permissions: Vec<String>,

    pub effect: Effect,

    #[serde(skip_serializing_if = "Conditions::is_empty")]
    pub conditions: Conditions,
}

impl Policy {
    /// An Allow policy that matches nothing until configured
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(&mut self, id: impl Into<String>) -> &mut Self {
        self.id = Some(id.into());
        self
    }

    pub fn description(&mut self, description: impl Into<String>) -> &mut Self {
        self.description = Some(description.into());
        self
    }

    pub fn for_username(&mut self, pattern: impl Into<String>) -> &mut Self {
        self.usernames.push(pattern.into());
        self
    }

    pub fn for_resource(&mut self, pattern: impl Into<String>) -> &mut Self {
        self.resources.push(pattern.into());
        self
    }

    /// Deprecated shorthand for `for_resource("mfs:" + prefix + "*")`
    pub fn for_prefix(&mut self, prefix: &str) -> &mut Self {
        self.for_resource(format!("{}{}*", RESOURCE_PREFIX, prefix))
    }

    pub fn permission(&mut self, pattern: impl Into<String>) -> &mut Self {
        self.permissions.push(pattern.into());
        self
    }

    pub fn deny(&mut self) -> &mut Self {
        self.effect = Effect::Deny;
        self
    }

    pub fn allow(&mut self) -> &mut Self {
        self.effect = Effect::Allow;
        self
    }

    /// Add one condition check; an existing check on the same field is replaced
    pub fn with_condition(
        &mut self,
        condition_type: impl Into<String>,
        field: impl Into<String>,
        expected: impl Into<ExpectedValue>,
    ) -> &mut Self {
        self.conditions
            .entry(condition_type.into())
            .or_default()
            .insert(field.into(), expected.into());
        self
    }

    /// Merge a condition map, per type and field
    pub fn with_conditions(&mut self, conditions: Conditions) -> &mut Self {
        for (condition_type, checks) in conditions {
            let entry = self.conditions.entry(condition_type).or_default();
            for (field, expected) in checks {
                entry.insert(field, expected);
            }
        }
        self
    }

    /// Snapshot of the configured policy
    pub fn build(&self) -> Policy {
        self.clone()
    }

    pub fn has_access(&self) -> bool {
        self.effect == Effect::Allow
    }

    /// Subject, resource and permission filters (conditions excluded)
    pub(crate) fn applies_to(
        &self,
        subject: Option<&str>,
        resource: &str,
        permission: &str,
        patterns: &PatternCache,
    ) -> bool {
        if !self.usernames.is_empty() {
            match subject {
                Some(subject) if patterns.matches_any(&self.usernames, subject) => {}
                _ => return false,
            }
        }

        if !self.resources.is_empty() && !patterns.matches_any(&self.resources, resource) {
            return false;
        }

        patterns.matches_any(&self.permissions, permission)
    }

    /// Report configuration mistakes that make the policy inert
    pub fn validate(&self) -> Result<(), String> {
        if self.permissions.is_empty() {
            return Err(format!(
                "policy {} has no permissions and never applies",
                self.label()
            ));
        }

        for pattern in self.permissions.iter().chain(&self.resources).chain(&self.usernames) {
            if pattern.is_empty() {
                return Err(format!("policy {} contains an empty pattern", self.label()));
            }
        }

        Ok(())
    }

    fn label(&self) -> String {
        self.id
            .clone()
            .or_else(|| self.description.clone())
            .unwrap_or_else(|| "<unnamed>".to_string())
    }
}
