//! End-to-end request handling: routing, authentication, policies, storage,
//! events and statistics

use base64::Engine as _;
use hyper::StatusCode;
use mfs::core::events::MemoryPublisher;
use mfs::{
    Authenticator, Config, Identity, InMemoryStatsRegistry, RequestHead,
};
use mfs_server::{ApiRequest, Server};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

const CONFIG: &str = r#"
    [server]
    realm = "files"

    [bucket]
    path = "bucket"

    [[keys]]
    access = "alice"
    secret = "wonderland"

    [[keys]]
    access = "bob"
    secret = "builder"

    [[policies]]
    description = "alice owns the bucket"
    usernames = ["alice"]
    prefixes = ["/"]
    permissions = ["mfs::*"]

    [[policies]]
    description = "bob reads and writes his home"
    usernames = ["bob"]
    resources = ["mfs:/home/*"]
    permissions = ["mfs::GetObject", "mfs::PutObject", "mfs::DeleteObject"]
    conditions = { StringLike = { "mfs::resource" = "mfs:/home/${authn::username}/*" } }

    [[policies]]
    description = "bob may list from the office network"
    usernames = ["bob"]
    prefixes = ["/"]
    permissions = ["mfs::ListObjects"]
    conditions = { StringLike = { "req::ip" = "10.0.*" } }

    [[policies]]
    description = "alice scrapes metrics"
    usernames = ["alice"]
    resources = ["mfs:*"]
    permissions = ["mfs::FetchPrometheusMetrics"]

    [[policies]]
    description = "archives are read-only"
    prefixes = ["/archive/"]
    permissions = ["mfs::PutObject", "mfs::DeleteObject", "mfs::PutObjectACL"]
    effect = "Deny"
"#;

struct Gateway {
    _dir: TempDir,
    server: Server,
    events: Arc<MemoryPublisher>,
    stats: Arc<InMemoryStatsRegistry>,
}

fn gateway() -> Gateway {
    let dir = TempDir::new().unwrap();
    let config = Config::parse(CONFIG, dir.path()).unwrap();
    let events = Arc::new(MemoryPublisher::new());
    let stats = Arc::new(InMemoryStatsRegistry::new());
    let server = Server::from_config(&config)
        .unwrap()
        .with_events(events.clone())
        .with_stats(stats.clone());
    Gateway {
        _dir: dir,
        server,
        events,
        stats,
    }
}

fn basic(user: &str, secret: &str) -> String {
    let token = base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", user, secret));
    format!("Basic {}", token)
}

fn as_alice(request: ApiRequest) -> ApiRequest {
    request.with_header("authorization", basic("alice", "wonderland"))
}

fn as_bob(request: ApiRequest) -> ApiRequest {
    request.with_header("authorization", basic("bob", "builder"))
}

fn json(body: &[u8]) -> serde_json::Value {
    serde_json::from_slice(body).unwrap()
}

#[test]
fn test_anonymous_reads_follow_acl() {
    let gw = gateway();
    let put_public = as_alice(ApiRequest::new("PUT", "/pub.txt"))
        .with_header("x-acl", "public-read")
        .with_body("for everyone");
    let put_private = as_alice(ApiRequest::new("PUT", "/priv.txt")).with_body("secret");
    assert_eq!(gw.server.handle(&put_public).status, StatusCode::CREATED);
    assert_eq!(gw.server.handle(&put_private).status, StatusCode::CREATED);

    let public = gw.server.handle(&ApiRequest::new("GET", "/pub.txt"));
    assert_eq!(public.status, StatusCode::OK);
    assert_eq!(&public.body[..], b"for everyone");
    assert_eq!(public.header("x-acl"), Some("public-read"));

    let private = gw.server.handle(&ApiRequest::new("GET", "/priv.txt"));
    assert_eq!(private.status, StatusCode::UNAUTHORIZED);
    assert_eq!(private.header("www-authenticate"), Some("Basic realm=\"files\""));

    let wrong_password = gw
        .server
        .handle(&ApiRequest::new("GET", "/priv.txt").with_header("authorization", basic("alice", "nope")));
    assert_eq!(wrong_password.status, StatusCode::UNAUTHORIZED);
}

struct Counting {
    calls: AtomicUsize,
}

impl Authenticator for Counting {
    fn name(&self) -> &str {
        "counting"
    }

    fn authenticate(&self, _request: &RequestHead) -> Option<Identity> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        None
    }
}

#[test]
fn test_public_objects_skip_authentication() {
    use mfs::core::bucket::{Acls, LocalBucket, PUBLIC_READ};
    use mfs::{AccessManager, AuthenticatorSet, ObjectStore};
    use mfs_server::ServerOptions;

    let dir = TempDir::new().unwrap();
    let bucket = LocalBucket::open(Acls::defaults(), dir.path()).unwrap();
    bucket.put_object("/open", b"data", Some(PUBLIC_READ)).unwrap();
    bucket.put_object("/closed", b"data", None).unwrap();

    let counting = Arc::new(Counting {
        calls: AtomicUsize::new(0),
    });
    let server = Server::new(
        Arc::new(bucket),
        AuthenticatorSet::new(vec![counting.clone()]),
        AccessManager::new(),
        ServerOptions::default(),
    );

    assert_eq!(server.handle(&ApiRequest::new("GET", "/open")).status, StatusCode::OK);
    assert_eq!(server.handle(&ApiRequest::new("HEAD", "/open")).status, StatusCode::OK);
    assert_eq!(counting.calls.load(Ordering::SeqCst), 0);

    assert_eq!(
        server.handle(&ApiRequest::new("GET", "/closed")).status,
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(counting.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_acl_change_makes_object_public() {
    let gw = gateway();
    gw.server
        .handle(&as_alice(ApiRequest::new("PUT", "/report.pdf")).with_body("v1"));
    assert_eq!(
        gw.server.handle(&ApiRequest::new("GET", "/report.pdf")).status,
        StatusCode::UNAUTHORIZED
    );

    let change = as_alice(ApiRequest::new("PUT", "/report.pdf"))
        .with_param("acl", "")
        .with_body("public-read");
    assert_eq!(gw.server.handle(&change).status, StatusCode::NO_CONTENT);

    let response = gw.server.handle(&ApiRequest::new("GET", "/report.pdf"));
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.header("content-type"), Some("application/pdf"));

    let bad_acl = as_alice(ApiRequest::new("PUT", "/report.pdf"))
        .with_param("acl", "")
        .with_body("world-writable");
    assert_eq!(gw.server.handle(&bad_acl).status, StatusCode::BAD_REQUEST);

    let missing = as_alice(ApiRequest::new("PUT", "/missing.pdf"))
        .with_param("acl", "")
        .with_body("private");
    assert_eq!(gw.server.handle(&missing).status, StatusCode::NOT_FOUND);
}

#[test]
fn test_delete_lifecycle() {
    let gw = gateway();
    let delete = as_alice(ApiRequest::new("DELETE", "/tmp.txt"));
    assert_eq!(gw.server.handle(&delete).status, StatusCode::NOT_FOUND);

    gw.server
        .handle(&as_alice(ApiRequest::new("PUT", "/tmp.txt")).with_body("x"));
    assert_eq!(gw.server.handle(&delete).status, StatusCode::NO_CONTENT);
    assert_eq!(
        gw.server
            .handle(&as_alice(ApiRequest::new("GET", "/tmp.txt")))
            .status,
        StatusCode::NOT_FOUND
    );
}

#[test]
fn test_home_directory_policy() {
    let gw = gateway();
    let own = as_bob(ApiRequest::new("PUT", "/home/bob/todo.txt")).with_body("milk");
    assert_eq!(gw.server.handle(&own).status, StatusCode::CREATED);

    let other = as_bob(ApiRequest::new("PUT", "/home/alice/todo.txt")).with_body("milk");
    let response = gw.server.handle(&other);
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(
        json(&response.body)["message"],
        "Access denied - mfs::PutObject for '/home/alice/todo.txt'"
    );

    // granted permissions do not extend to ACL changes
    let acl = as_bob(ApiRequest::new("PUT", "/home/bob/todo.txt"))
        .with_param("acl", "")
        .with_body("public-read");
    assert_eq!(gw.server.handle(&acl).status, StatusCode::FORBIDDEN);
}

#[test]
fn test_deny_beats_allow() {
    let gw = gateway();
    let write = as_alice(ApiRequest::new("PUT", "/archive/2020.tar")).with_body("old");
    assert_eq!(gw.server.handle(&write).status, StatusCode::FORBIDDEN);

    let read = as_alice(ApiRequest::new("GET", "/archive/2020.tar"));
    assert_eq!(gw.server.handle(&read).status, StatusCode::NOT_FOUND);
}

#[test]
fn test_listing_depends_on_client_ip() {
    let gw = gateway();
    gw.server
        .handle(&as_alice(ApiRequest::new("PUT", "/a.txt")).with_body("a"));

    let office = as_bob(ApiRequest::new("GET", "/")).with_client_ip("10.0.4.2");
    let response = gw.server.handle(&office);
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(json(&response.body)["objects"][0]["key"], "/a.txt");

    let home = as_bob(ApiRequest::new("GET", "/")).with_client_ip("192.168.1.5");
    assert_eq!(gw.server.handle(&home).status, StatusCode::FORBIDDEN);

    let unknown = as_bob(ApiRequest::new("GET", "/"));
    assert_eq!(gw.server.handle(&unknown).status, StatusCode::FORBIDDEN);
}

#[test]
fn test_success_events() {
    let gw = gateway();
    gw.server
        .handle(&as_alice(ApiRequest::new("PUT", "/e.txt")).with_body("e"));
    gw.server.handle(&as_alice(ApiRequest::new("GET", "/e.txt")));
    gw.server.handle(&as_alice(ApiRequest::new("DELETE", "/nothing")));
    gw.server.handle(&ApiRequest::new("GET", "/e.txt"));

    let events = gw.events.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].username.as_deref(), Some("alice"));
    assert_eq!(events[0].action, "mfs::PutObject");
    assert_eq!(events[0].resource, "/e.txt");
    assert!(events[0].is_write());
    assert_eq!(events[1].action, "mfs::GetObject");
    assert!(!events[1].is_write());
}

#[test]
fn test_request_statistics() {
    let gw = gateway();
    gw.server.handle(&as_alice(ApiRequest::new("GET", "/")));
    gw.server.handle(&ApiRequest::new("GET", "/"));
    gw.server.handle(&ApiRequest::new("PATCH", "/x"));

    assert_eq!(
        gw.stats
            .value("api_http_requests_total", &[("handler", "ListObjects")]),
        Some(2.0)
    );
    assert_eq!(
        gw.stats.value(
            "api_http_failures_total",
            &[("handler", "ListObjects"), ("code", "401")]
        ),
        Some(1.0)
    );
    assert_eq!(
        gw.stats
            .value("api_http_requests_total", &[("handler", "Unresolved")]),
        Some(1.0)
    );
    assert_eq!(
        gw.stats.value(
            "api_http_request_duration_seconds_count",
            &[("handler", "ListObjects")]
        ),
        Some(2.0)
    );
    assert_eq!(
        gw.stats.value(
            "api_http_request_duration_seconds_bucket",
            &[("handler", "ListObjects"), ("le", "+Inf")]
        ),
        Some(2.0)
    );
}

#[test]
fn test_metrics_endpoint() {
    let gw = gateway();
    gw.server
        .handle(&as_alice(ApiRequest::new("PUT", "/m.bin")).with_body(vec![0u8; 10]));

    let anonymous = gw
        .server
        .handle(&ApiRequest::new("GET", "/").with_param("metrics", ""));
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);

    let without_grant = gw
        .server
        .handle(&as_bob(ApiRequest::new("GET", "/")).with_param("metrics", ""));
    assert_eq!(without_grant.status, StatusCode::FORBIDDEN);

    let response = gw
        .server
        .handle(&as_alice(ApiRequest::new("GET", "/")).with_param("metrics", ""));
    assert_eq!(response.status, StatusCode::OK);
    let text = std::str::from_utf8(&response.body).unwrap();
    assert!(text.contains("bucket_object_size_bytes_count{service=\"mfs\"} 1\n"));
    assert!(text.contains("iam_policy_count{service=\"mfs\"} 5\n"));
    assert!(text.contains("acl_count{service=\"mfs\"} 2\n"));
    assert!(text.contains("api_http_requests_total{service=\"mfs\",handler=\"PutObject\"} 1\n"));
    assert!(text.contains("# TYPE iam_policy_count gauge\n"));
}

#[test]
fn test_public_metrics() {
    let dir = TempDir::new().unwrap();
    let text = "[server]\npublic_metrics = true\n\n[bucket]\npath = \"b\"\n";
    let config = Config::parse(text, dir.path()).unwrap();
    let server = Server::from_config(&config).unwrap();

    let response = server.handle(&ApiRequest::new("GET", "").with_param("metrics", ""));
    assert_eq!(response.status, StatusCode::OK);
    assert!(response
        .header("content-type")
        .unwrap()
        .starts_with("text/plain"));
}

#[test]
fn test_policy_reload() {
    let gw = gateway();
    let list = as_alice(ApiRequest::new("GET", "/"));
    assert_eq!(gw.server.handle(&list).status, StatusCode::OK);

    let mut restricted = mfs::AccessManager::new();
    restricted
        .new_policy()
        .for_username("alice")
        .for_prefix("/")
        .permission("mfs::GetObject");
    gw.server.replace_access_manager(restricted);

    assert_eq!(gw.server.handle(&list).status, StatusCode::FORBIDDEN);
}

#[test]
fn test_invalid_paths() {
    let gw = gateway();
    let traversal = as_alice(ApiRequest::new("PUT", "/a/../../etc/passwd")).with_body("x");
    assert_eq!(gw.server.handle(&traversal).status, StatusCode::BAD_REQUEST);

    gw.server
        .handle(&as_alice(ApiRequest::new("PUT", "/dir/file")).with_body("x"));
    let conflict = as_alice(ApiRequest::new("PUT", "/dir")).with_body("x");
    assert_eq!(gw.server.handle(&conflict).status, StatusCode::BAD_REQUEST);

    let root = as_alice(ApiRequest::new("DELETE", "/"));
    assert_eq!(gw.server.handle(&root).status, StatusCode::METHOD_NOT_ALLOWED);
}
