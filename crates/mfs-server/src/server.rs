//! Request processing
//!
//! [`Server::handle`] is synchronous and transport-independent: it routes a
//! request, authenticates and authorizes the caller, runs the handler,
//! publishes a success event and records request statistics. The hyper
//! adapter in [`crate::http`] drives it from a blocking task.

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::publisher::HttpPublisher;
use crate::router::{self, Operation, Route};
use bytes::Bytes;
use hyper::StatusCode;
use mfs::core::authn::SESSION_COOKIE;
use mfs::core::config::ServerConfig;
use mfs::core::iam::Context;
use mfs::{
    AccessManager, AccessRequest, AuthenticatorSet, Config, Event, EventPublisher, Identity,
    InMemoryStatsRegistry, LocalBucket, MetricsProvider, NullPublisher, ObjectInfo, ObjectStore,
    RequestHead, StatsRegistry,
};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Handler label for requests that could not be routed
pub const UNRESOLVED_HANDLER: &str = "Unresolved";

/// Upper bounds of the request duration histogram, in seconds
pub const DURATION_BUCKETS: [f64; 11] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Behaviour switches of the request pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerOptions {
    /// Realm announced in `WWW-Authenticate`
    pub realm: String,
    /// Answer `?debug` with a request dump, without authentication
    pub debug_requests: bool,
    /// Serve `?metrics` without authentication
    pub public_metrics: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        ServerOptions::from(&ServerConfig::default())
    }
}

impl From<&ServerConfig> for ServerOptions {
    fn from(config: &ServerConfig) -> Self {
        ServerOptions {
            realm: config.realm.clone(),
            debug_requests: config.debug_requests,
            public_metrics: config.public_metrics,
        }
    }
}

/// A buffered request
#[derive(Debug, Clone, Default)]
pub struct ApiRequest {
    pub head: RequestHead,
    pub body: Bytes,
}

impl ApiRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        ApiRequest {
            head: RequestHead::new(method, path),
            body: Bytes::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.head.headers.insert(name, value);
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.head.params.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_client_ip(mut self, ip: impl Into<String>) -> Self {
        self.head.client_ip = Some(ip.into());
        self
    }

    fn pretty(&self) -> bool {
        self.head.has_param("pretty")
    }
}

/// A buffered response
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl ApiResponse {
    pub fn new(status: StatusCode) -> Self {
        ApiResponse {
            status,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn text(status: StatusCode, content_type: &str, body: impl Into<Bytes>) -> Self {
        ApiResponse::new(status)
            .with_header("content-type", content_type)
            .with_body(body)
    }

    /// JSON body followed by a newline
    pub fn json<T: Serialize>(status: StatusCode, value: &T, pretty: bool) -> ApiResult<Self> {
        let mut body = if pretty {
            serde_json::to_vec_pretty(value)
        } else {
            serde_json::to_vec(value)
        }
        .map_err(|e| ApiError::Internal(format!("Failed to encode response: {}", e)))?;
        body.push(b'\n');
        Ok(ApiResponse::text(status, "application/json", body))
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_ascii_lowercase(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of a header, by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Serialize)]
struct ListResponse<'a> {
    prefix: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    delimiter: Option<&'a str>,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    objects: &'a [ObjectInfo],
    #[serde(rename = "common-prefixes", skip_serializing_if = "<[_]>::is_empty")]
    common_prefixes: &'a [String],
}

/// The gateway
pub struct Server {
    bucket: Arc<dyn ObjectStore>,
    authenticators: AuthenticatorSet,
    access: RwLock<Arc<AccessManager>>,
    events: Arc<dyn EventPublisher>,
    stats: Arc<dyn StatsRegistry>,
    options: ServerOptions,
}

impl Server {
    /// Server with no event delivery and in-memory statistics
    pub fn new(
        bucket: Arc<dyn ObjectStore>,
        authenticators: AuthenticatorSet,
        access: AccessManager,
        options: ServerOptions,
    ) -> Self {
        Server {
            bucket,
            authenticators,
            access: RwLock::new(Arc::new(access)),
            events: Arc::new(NullPublisher),
            stats: Arc::new(InMemoryStatsRegistry::new()),
            options,
        }
    }

    /// Build everything a configuration file describes
    pub fn from_config(config: &Config) -> mfs::Result<Self> {
        let bucket = LocalBucket::open(config.acls(), config.bucket_path())?;
        info!("Serving bucket {:?}", bucket.root());

        let mut server = Server::new(
            Arc::new(bucket),
            config.authenticator_set()?,
            config.access_manager()?,
            ServerOptions::from(&config.server),
        );

        if let Some(messaging) = &config.messaging {
            info!("Publishing write events to {}", messaging.endpoint);
            server = server.with_events(Arc::new(HttpPublisher::new(messaging)?));
        }

        Ok(server)
    }

    pub fn with_events(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = events;
        self
    }

    pub fn with_stats(mut self, stats: Arc<dyn StatsRegistry>) -> Self {
        self.stats = stats;
        self
    }

    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    pub fn bucket(&self) -> &Arc<dyn ObjectStore> {
        &self.bucket
    }

    /// Current policy snapshot
    pub fn access_manager(&self) -> Arc<AccessManager> {
        self.access.read().clone()
    }

    /// Swap in a new policy set; requests already being evaluated keep the old one
    pub fn replace_access_manager(&self, manager: AccessManager) {
        let count = manager.len();
        *self.access.write() = Arc::new(manager);
        info!("Loaded {} policies", count);
    }

    /// Process one request
    pub fn handle(&self, request: &ApiRequest) -> ApiResponse {
        let started = Instant::now();

        let route = match router::resolve(&request.head, self.bucket.as_ref(), self.options.debug_requests) {
            Ok(route) => route,
            Err(e) => {
                self.stats.counter_inc(
                    "api_http_requests_total",
                    &[("handler", UNRESOLVED_HANDLER)],
                    1.0,
                );
                return self.error_response(UNRESOLVED_HANDLER, request, e);
            }
        };

        let handler = route.operation.name();
        debug!(
            "{} {} -> {} ({})",
            request.head.method, request.head.path, handler, route.resource
        );
        self.stats
            .counter_inc("api_http_requests_total", &[("handler", handler)], 1.0);

        let mut session = None;
        let outcome = self.identify(request, &route).and_then(|identity| {
            session = identity.as_ref().and_then(|i| i.session.clone());
            self.process(request, &route, identity.as_ref())
        });
        let mut response = match outcome {
            Ok(response) => response,
            Err(e) => self.error_response(handler, request, e),
        };
        // Issued sessions reach the client even when the operation fails
        if let Some(session) = session {
            response = response.with_header(
                "set-cookie",
                format!("{}={}; Path=/; HttpOnly", SESSION_COOKIE, session),
            );
        }

        self.stats.histogram(
            "api_http_request_duration_seconds",
            &[("handler", handler)],
            &DURATION_BUCKETS,
            started.elapsed().as_secs_f64(),
        );

        response
    }

    /// Caller identity, or `None` for operations that need no authentication
    fn identify(&self, request: &ApiRequest, route: &Route) -> ApiResult<Option<Identity>> {
        if route.operation.is_public(self.options.public_metrics) {
            return Ok(None);
        }
        self.authenticators
            .authenticate(&request.head)?
            .ok_or(ApiError::AuthenticationRequired)
            .map(Some)
    }

    fn process(
        &self,
        request: &ApiRequest,
        route: &Route,
        identity: Option<&Identity>,
    ) -> ApiResult<ApiResponse> {
        if let Some(identity) = identity {
            self.authorize(identity, request, route)?;
        }

        let response = match route.operation {
            Operation::SendDebug => self.send_debug(request)?,
            Operation::GetObject | Operation::GetPublicObject => self.get_object(request, route)?,
            Operation::FetchPrometheusMetrics => self.fetch_metrics(),
            Operation::ListObjects => self.list_objects(request, route)?,
            Operation::PutObjectAcl => self.put_object_acl(request, route)?,
            Operation::PutObject => self.put_object(request, route)?,
            Operation::DeleteObject => self.delete_object(route)?,
        };

        self.publish(Event {
            username: identity.map(|i| i.subject.clone()),
            action: route.operation.permission(),
            resource: route.resource.clone(),
        });

        Ok(response)
    }

    fn authorize(&self, identity: &Identity, request: &ApiRequest, route: &Route) -> ApiResult<()> {
        let access = self.access_manager();
        let permission = route.operation.permission();
        let attributes: Option<Context> = route.object.as_ref().map(ObjectInfo::attributes);

        let mut access_request =
            AccessRequest::new(&route.resource, Some(identity.subject.as_str()), &permission);
        if let Some(ip) = request.head.client_ip.as_deref() {
            access_request = access_request.with_client_ip(ip);
        }
        if let Some(attributes) = &attributes {
            access_request = access_request.with_attributes(attributes);
        }

        if access.is_authorized(&access_request) {
            Ok(())
        } else {
            info!(
                "Denied {} on '{}' for '{}'",
                permission, route.resource, identity.subject
            );
            Err(ApiError::AccessDenied(format!(
                "Access denied - {} for '{}'",
                permission, route.resource
            )))
        }
    }

    fn publish(&self, event: Event) {
        if let Err(e) = self.events.publish(&event) {
            warn!("Failed to publish {} on {}: {}", event.action, event.resource, e);
        }
    }

    fn error_response(&self, handler: &str, request: &ApiRequest, err: ApiError) -> ApiResponse {
        if err.is_server_error() {
            error!("{} failed: {}", handler, err);
        } else {
            debug!("{} rejected: {}", handler, err);
        }

        let code = err.code().to_string();
        self.stats.counter_inc(
            "api_http_failures_total",
            &[("handler", handler), ("code", code.as_str())],
            1.0,
        );

        let mut response = match ApiResponse::json(err.status(), &err.body(), request.pretty()) {
            Ok(response) => response,
            Err(_) => ApiResponse::new(err.status()),
        };
        if matches!(err, ApiError::AuthenticationRequired) {
            response = response.with_header(
                "www-authenticate",
                format!("Basic realm=\"{}\"", self.options.realm),
            );
        }
        response
    }

    fn get_object(&self, request: &ApiRequest, route: &Route) -> ApiResult<ApiResponse> {
        let not_found = || ApiError::NotFound(format!("Object does not exist: {}", route.resource));
        let info = route.object.as_ref().ok_or_else(not_found)?;

        // HEAD announces the stored size without sending the data
        let data = if request.head.method.eq_ignore_ascii_case("HEAD") {
            None
        } else {
            Some(self.bucket.get_object(&route.resource)?.ok_or_else(not_found)?)
        };
        let length = data.as_ref().map(|d| d.len() as u64).unwrap_or(info.size);

        let mut response = ApiResponse::new(StatusCode::OK)
            .with_header("content-type", info.mime.as_str())
            .with_header("content-length", length.to_string());
        if let Some(acl) = &info.acl {
            response = response.with_header("x-acl", acl.as_str());
        }
        if let Some(data) = data {
            response = response.with_body(data);
        }
        Ok(response)
    }

    fn put_object(&self, request: &ApiRequest, route: &Route) -> ApiResult<ApiResponse> {
        let acl = request.head.headers.get("x-acl").filter(|acl| !acl.is_empty());
        self.bucket.put_object(&route.resource, &request.body, acl)?;
        Ok(ApiResponse::new(StatusCode::CREATED))
    }

    fn put_object_acl(&self, request: &ApiRequest, route: &Route) -> ApiResult<ApiResponse> {
        let acl = std::str::from_utf8(&request.body)
            .map_err(|_| ApiError::BadRequest("ACL name must be UTF-8".into()))?
            .trim();
        if acl.is_empty() {
            return Err(ApiError::BadRequest("Missing ACL name in request body".into()));
        }
        self.bucket.update_object_acl(&route.resource, acl)?;
        Ok(ApiResponse::new(StatusCode::NO_CONTENT))
    }

    fn delete_object(&self, route: &Route) -> ApiResult<ApiResponse> {
        if self.bucket.delete_object(&route.resource)? {
            Ok(ApiResponse::new(StatusCode::NO_CONTENT))
        } else {
            Err(ApiError::NotFound("Not found".into()))
        }
    }

    fn list_objects(&self, request: &ApiRequest, route: &Route) -> ApiResult<ApiResponse> {
        let delimiter = request.head.param("delimiter").filter(|d| !d.is_empty());
        if let Some(delimiter) = delimiter {
            if delimiter != "/" {
                return Err(ApiError::BadRequest(
                    "Invalid parameter: Parameter \"delimiter\" only supports \"/\"".into(),
                ));
            }
        }

        let listing = self
            .bucket
            .list_objects(&route.resource, delimiter.is_some())?;
        let body = ListResponse {
            prefix: &route.resource,
            delimiter,
            objects: &listing.objects,
            common_prefixes: &listing.common_prefixes,
        };
        ApiResponse::json(StatusCode::OK, &body, request.pretty())
    }

    fn fetch_metrics(&self) -> ApiResponse {
        let mut all = self.bucket.metrics();
        all.extend(self.access_manager().metrics());
        all.extend(self.bucket.acls().metrics());
        all.extend(self.authenticators.metrics());
        all.extend(self.stats.metrics());

        ApiResponse::text(
            StatusCode::OK,
            "text/plain; version=0.0.4",
            metrics::render(&all),
        )
    }

    fn send_debug(&self, request: &ApiRequest) -> ApiResult<ApiResponse> {
        let head = &request.head;
        let headers: serde_json::Map<String, serde_json::Value> = head
            .headers
            .iter()
            .map(|(name, value)| (name.to_string(), value.into()))
            .collect();
        let headers = serde_json::to_string(&headers)
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        let params = serde_json::to_string(&head.params)
            .map_err(|e| ApiError::Internal(e.to_string()))?;

        let body = format!(
            "Host: {}\nMethod: {}\nPath: {}\n\nHeaders: {}\nParams: {}\n",
            head.host, head.method, head.path, headers, params
        );
        Ok(ApiResponse::text(StatusCode::OK, "text/plain", body))
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("authenticators", &self.authenticators)
            .field("policies", &self.access.read().len())
            .field("options", &self.options)
            .finish()
    }
}
