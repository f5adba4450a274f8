//! Identity and Access Management (IAM) for mfs
//!
//! Provides policy-based access control with:
//! - Fluent or file-based policy definitions
//! - Allow/Deny policies with explicit deny precedence
//! - Wildcard pattern matching for subjects, resources and permissions
//! - A registry of condition types with `${var}` interpolation
//! - LRU caching of compiled patterns

mod cache;
mod condition;
mod engine;
mod pattern;
mod policy;

pub use cache::PatternCache;
pub use condition::{
    resolve, BoolEquals, Comparison, Condition, ConditionEvaluator, ConditionOutcome,
    ConditionValue, Conditions, Context, DateCompare, ExpectedValue, IgnoreCase, Not,
    NumericCompare, ResolveError, StringEquals, StringLike,
};
pub use engine::{
    AccessManager, AccessRequest, ATTRIBUTE_PREFIX, CTX_CLIENT_IP, CTX_CURRENT_TIME,
    CTX_PERMISSION, CTX_RESOURCE, CTX_USERNAME, RESOURCE_PREFIX,
};
pub use pattern::{PatternMatcher, WildcardSyntax};
pub use policy::{Effect, Policy};

#[cfg(test)]
mod tests;
