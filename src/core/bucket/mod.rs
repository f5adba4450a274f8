//! Object storage
//!
//! Keys are absolute slash-separated paths (`/folder/file.txt`). A trailing
//! slash names a common prefix, never an object.

mod acl;
mod local;

pub use acl::{Acl, Acls, OTHER_READ, PRIVATE, PUBLIC_READ};
pub use local::{guess_mime, validate_key, LocalBucket};

use crate::core::error::Result;
use crate::core::iam::{ConditionValue, Context};
use crate::core::stats::MetricsProvider;
use serde::Serialize;

/// Object metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    /// Name of the ACL matching the object's mode, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acl: Option<String>,
    pub mime: String,
    /// Modification time, RFC 3339
    pub mtime: String,
}

impl ObjectInfo {
    /// Attributes exposed to policy conditions as `mfs::<name>`
    pub fn attributes(&self) -> Context {
        let mut attributes = Context::new();
        attributes.insert("key".into(), self.key.as_str().into());
        attributes.insert("size".into(), ConditionValue::from(self.size));
        if let Some(acl) = &self.acl {
            attributes.insert("acl".into(), acl.as_str().into());
        }
        attributes.insert("mime".into(), self.mime.as_str().into());
        attributes.insert("mtime".into(), self.mtime.as_str().into());
        attributes
    }
}

/// Result of listing a prefix
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    pub objects: Vec<ObjectInfo>,
    /// Sub-prefixes ending in `/`, when requested
    pub common_prefixes: Vec<String>,
}

/// Storage backend used by the server
pub trait ObjectStore: MetricsProvider + Send + Sync {
    /// ACLs known to this store
    fn acls(&self) -> &Acls;

    fn object_info(&self, key: &str) -> Result<Option<ObjectInfo>>;

    fn get_object(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Create or replace an object; `acl` falls back to the default ACL
    fn put_object(&self, key: &str, data: &[u8], acl: Option<&str>) -> Result<()>;

    /// `false` when there was nothing to delete
    fn delete_object(&self, key: &str) -> Result<bool>;

    fn list_objects(&self, prefix: &str, common_prefixes: bool) -> Result<Listing>;

    fn update_object_acl(&self, key: &str, acl: &str) -> Result<()>;
}
