//! Named access control lists
//!
//! An ACL is a name bound to unix permission bits. Objects store their ACL as
//! the file mode, so the name of an object's ACL is recovered by mode lookup.

use crate::core::stats::{Metric, MetricKind, MetricsProvider};
use serde::{Deserialize, Serialize};

pub const PUBLIC_READ: &str = "public-read";
pub const PRIVATE: &str = "private";

/// Mode bit allowing anyone to read
pub const OTHER_READ: u32 = 0o004;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acl {
    pub name: String,
    pub mode: u32,
}

impl Acl {
    /// True if the mode lets unauthenticated callers read
    pub fn is_public_read(&self) -> bool {
        self.mode & OTHER_READ != 0
    }
}

/// ACL registry with an optional default
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acls {
    acls: Vec<Acl>,
    default: Option<String>,
}

impl Acls {
    /// Registry without any ACLs
    pub fn new() -> Self {
        Acls {
            acls: Vec::new(),
            default: None,
        }
    }

    /// `public-read` (0o664) and `private` (0o660, default)
    pub fn defaults() -> Self {
        let mut acls = Acls::new();
        acls.define(PUBLIC_READ, 0o664, false)
            .define(PRIVATE, 0o660, true);
        acls
    }

    /// Add or replace an ACL
    pub fn define(&mut self, name: impl Into<String>, mode: u32, default: bool) -> &mut Self {
        let acl = Acl {
            name: name.into(),
            mode: mode & 0o777,
        };
        if default {
            self.default = Some(acl.name.clone());
        }
        match self.acls.iter_mut().find(|existing| existing.name == acl.name) {
            Some(existing) => *existing = acl,
            None => self.acls.push(acl),
        }
        self
    }

    pub fn by_name(&self, name: &str) -> Option<&Acl> {
        self.acls.iter().find(|acl| acl.name == name)
    }

    /// First ACL with exactly this mode (permission bits only)
    pub fn by_mode(&self, mode: u32) -> Option<&Acl> {
        let mode = mode & 0o777;
        self.acls.iter().find(|acl| acl.mode == mode)
    }

    pub fn default_acl(&self) -> Option<&Acl> {
        self.default.as_deref().and_then(|name| self.by_name(name))
    }

    /// True if the named ACL exists and lets anyone read
    pub fn allows_unauthorized_read(&self, name: Option<&str>) -> bool {
        name.and_then(|name| self.by_name(name))
            .map(Acl::is_public_read)
            .unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Acl> {
        self.acls.iter()
    }

    pub fn len(&self) -> usize {
        self.acls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.acls.is_empty()
    }
}

impl Default for Acls {
    fn default() -> Self {
        Self::defaults()
    }
}

impl MetricsProvider for Acls {
    fn metrics(&self) -> Vec<Metric> {
        vec![Metric::new("acl_count", self.acls.len() as f64)
            .with_help("Number of defined ACLs")
            .with_kind(MetricKind::Gauge)]
    }
}
