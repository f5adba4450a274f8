//! Mapping of requests to operations
//!
//! | Method | Path      | Query       | Operation (resource)              |
//! |--------|-----------|-------------|-----------------------------------|
//! | any    | any       | `debug`     | SendDebug (path)                  |
//! | HEAD   | `/`       |             | 405                               |
//! | HEAD   | key       |             | GetObject / GetPublicObject (key) |
//! | GET    | `/`       | `metrics`   | FetchPrometheusMetrics (`*`)      |
//! | GET    | `/`       |             | ListObjects (`prefix` or `/`)     |
//! | GET    | key       |             | GetObject / GetPublicObject (key) |
//! | PUT    | key       | `acl`       | PutObjectACL (key)                |
//! | PUT    | key       |             | PutObject (key)                   |
//! | DELETE | key       |             | DeleteObject (key)                |

use crate::error::{ApiError, ApiResult};
use mfs::core::bucket::{validate_key, ObjectInfo, ObjectStore};
use mfs::core::request::RequestHead;

/// Operations served by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    SendDebug,
    GetObject,
    GetPublicObject,
    FetchPrometheusMetrics,
    ListObjects,
    PutObjectAcl,
    PutObject,
    DeleteObject,
}

impl Operation {
    /// Handler name, as used in metrics labels and permissions
    pub fn name(&self) -> &'static str {
        match self {
            Operation::SendDebug => "SendDebug",
            Operation::GetObject => "GetObject",
            Operation::GetPublicObject => "GetPublicObject",
            Operation::FetchPrometheusMetrics => "FetchPrometheusMetrics",
            Operation::ListObjects => "ListObjects",
            Operation::PutObjectAcl => "PutObjectACL",
            Operation::PutObject => "PutObject",
            Operation::DeleteObject => "DeleteObject",
        }
    }

    /// Permission checked against policies, e.g. `mfs::GetObject`
    pub fn permission(&self) -> String {
        format!("mfs::{}", self.name())
    }

    /// True if the operation runs without authentication
    pub fn is_public(&self, public_metrics: bool) -> bool {
        match self {
            Operation::SendDebug | Operation::GetPublicObject => true,
            Operation::FetchPrometheusMetrics => public_metrics,
            _ => false,
        }
    }
}

/// A resolved request
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub operation: Operation,
    /// Bucket path the permission applies to
    pub resource: String,
    /// Metadata of the addressed object, when it exists
    pub object: Option<ObjectInfo>,
}

impl Route {
    fn new(operation: Operation, resource: impl Into<String>) -> Self {
        Route {
            operation,
            resource: resource.into(),
            object: None,
        }
    }
}

fn is_root(path: &str) -> bool {
    path.is_empty() || path == "/"
}

/// Determine the operation and resource of a request
pub fn resolve(head: &RequestHead, store: &dyn ObjectStore, debug_requests: bool) -> ApiResult<Route> {
    let path = head.path.as_str();

    if debug_requests && head.has_param("debug") {
        return Ok(Route::new(Operation::SendDebug, path));
    }

    let method = head.method.to_ascii_uppercase();
    let root = is_root(path);

    match (method.as_str(), root) {
        ("GET", true) if head.has_param("metrics") => {
            Ok(Route::new(Operation::FetchPrometheusMetrics, "*"))
        }
        ("GET", true) => {
            let prefix = head.param("prefix").filter(|p| !p.is_empty()).unwrap_or("/");
            Ok(Route::new(Operation::ListObjects, prefix))
        }
        ("HEAD", true) => Err(ApiError::MethodNotAllowed(
            "HEAD is not supported on the bucket root".into(),
        )),
        ("GET" | "HEAD", false) => {
            validate_key(path)?;
            let object = store.object_info(path)?;
            let public = object
                .as_ref()
                .map(|info| store.acls().allows_unauthorized_read(info.acl.as_deref()))
                .unwrap_or(false);
            let operation = if public {
                Operation::GetPublicObject
            } else {
                Operation::GetObject
            };
            Ok(Route {
                operation,
                resource: path.to_string(),
                object,
            })
        }
        ("PUT" | "DELETE", false) => {
            validate_key(path)?;
            let operation = match method.as_str() {
                "DELETE" => Operation::DeleteObject,
                _ if head.has_param("acl") => Operation::PutObjectAcl,
                _ => Operation::PutObject,
            };
            Ok(Route {
                operation,
                resource: path.to_string(),
                object: store.object_info(path)?,
            })
        }
        ("PUT" | "DELETE", true) => Err(ApiError::MethodNotAllowed(format!(
            "{} is not supported on the bucket root",
            method
        ))),
        _ => Err(ApiError::MethodNotAllowed(format!(
            "Method {} is not supported",
            method
        ))),
    }
}
