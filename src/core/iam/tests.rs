//! Integration tests for the IAM access manager

use super::*;
use indexmap::IndexMap;

fn attributes(pairs: &[(&str, ConditionValue)]) -> Context {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[test]
fn test_complex_policy_scenario() {
    let mut manager = AccessManager::new();

    // Everyone may read public files
    manager
        .new_policy()
        .for_resource("mfs:/public/*")
        .permission("mfs::GetObject")
        .permission("mfs::ListObjects");

    // Admins do anything
    manager
        .new_policy()
        .for_username("admin")
        .for_prefix("/")
        .permission("mfs::*");

    // Users manage their home directory
    manager
        .new_policy()
        .for_resource("mfs:/home/*")
        .permission("mfs::*")
        .with_condition("StringLike", "mfs::resource", "mfs:/home/${authn::username}/*");

    // Nobody touches secrets
    manager
        .new_policy()
        .for_resource("mfs:/admin/secrets/*")
        .permission("mfs::*")
        .deny();

    // Public reads allowed
    assert!(manager.is_granted("/public/readme.txt", "guest", "mfs::GetObject"));
    assert!(!manager.is_granted("/public/readme.txt", "guest", "mfs::PutObject"));

    // Admin access allowed (except secrets)
    assert!(manager.is_granted("/admin/config.txt", "admin", "mfs::PutObject"));
    assert!(manager.is_granted("/admin/old.txt", "admin", "mfs::DeleteObject"));
    assert!(!manager.is_granted("/admin/secrets/key.pem", "admin", "mfs::GetObject"));

    // Home directories are per user
    assert!(manager.is_granted("/home/alice/notes.txt", "alice", "mfs::PutObject"));
    assert!(!manager.is_granted("/home/alice/notes.txt", "bob", "mfs::GetObject"));
}

#[test]
fn test_narrower_deny_flips_only_matching_pairs() {
    let mut manager = AccessManager::new();
    manager
        .new_policy()
        .for_username("u")
        .for_prefix("/")
        .permission("mfs::*");
    manager
        .new_policy()
        .for_username("u")
        .for_prefix("/archive/")
        .permission("mfs::DeleteObject")
        .deny();

    assert!(manager.is_granted("/archive/2020.tar", "u", "mfs::GetObject"));
    assert!(!manager.is_granted("/archive/2020.tar", "u", "mfs::DeleteObject"));
    assert!(manager.is_granted("/current.txt", "u", "mfs::DeleteObject"));
}

#[test]
fn test_anonymous_subject() {
    let mut manager = AccessManager::new();
    manager
        .new_policy()
        .for_prefix("/")
        .permission("mfs::ListObjects");
    manager
        .new_policy()
        .for_username("*")
        .for_prefix("/")
        .permission("mfs::GetObject");

    // No usernames: applies to anonymous callers too
    assert!(manager.is_authorized(&AccessRequest::new("/", None, "mfs::ListObjects")));
    // A username pattern, even `*`, needs a subject
    assert!(!manager.is_authorized(&AccessRequest::new("/x", None, "mfs::GetObject")));
    assert!(manager.is_granted("/x", "anyone", "mfs::GetObject"));
}

#[test]
fn test_policy_without_permissions_never_applies() {
    let mut manager = AccessManager::new();
    manager.new_policy().for_username("u").for_prefix("/");
    assert!(!manager.is_granted("/x", "u", "mfs::GetObject"));

    // Not even as a deny
    let mut manager = AccessManager::new();
    manager.new_policy().for_prefix("/").permission("mfs::*");
    manager.new_policy().for_prefix("/").deny();
    assert!(manager.is_granted("/x", "u", "mfs::GetObject"));
}

#[test]
fn test_resource_patterns_are_not_regex() {
    let mut manager = AccessManager::new();
    manager
        .new_policy()
        .for_resource("mfs:/a.txt")
        .permission("mfs::GetObject");

    assert!(manager.is_granted("/a.txt", "u", "mfs::GetObject"));
    assert!(!manager.is_granted("/abtxt", "u", "mfs::GetObject"));
}

#[test]
fn test_client_ip_condition() {
    let mut manager = AccessManager::new();
    manager
        .new_policy()
        .for_prefix("/")
        .permission("mfs::*")
        .with_condition("StringLike", "req::ip", vec!["10.*", "127.0.0.1"]);

    let inside = AccessRequest::new("/x", Some("u"), "mfs::GetObject").with_client_ip("10.1.2.3");
    let outside =
        AccessRequest::new("/x", Some("u"), "mfs::GetObject").with_client_ip("192.168.0.9");
    let unknown = AccessRequest::new("/x", Some("u"), "mfs::GetObject");

    assert!(manager.is_authorized(&inside));
    assert!(!manager.is_authorized(&outside));
    // Missing context key fails the condition
    assert!(!manager.is_authorized(&unknown));
}

#[test]
fn test_deny_by_object_attribute() {
    let mut manager = AccessManager::new();
    manager
        .new_policy()
        .for_username("u")
        .for_prefix("/")
        .permission("mfs::*");
    manager
        .new_policy()
        .for_prefix("/")
        .permission("mfs::GetObject")
        .with_condition("NumericGreaterThan", "mfs::size", 1024.0)
        .deny();

    let small = attributes(&[("size", ConditionValue::Number(10.0))]);
    let large = attributes(&[("size", ConditionValue::Number(4096.0))]);

    let small_req =
        AccessRequest::new("/f.bin", Some("u"), "mfs::GetObject").with_attributes(&small);
    let large_req =
        AccessRequest::new("/f.bin", Some("u"), "mfs::GetObject").with_attributes(&large);

    assert!(manager.is_authorized(&small_req));
    assert!(!manager.is_authorized(&large_req));
}

#[test]
fn test_time_window_condition() {
    let mut manager = AccessManager::new();
    manager
        .new_policy()
        .for_prefix("/")
        .permission("mfs::*")
        .with_condition("DateGreaterThan", "sys::CurrentTime", "2000-01-01T00:00:00Z")
        .with_condition("DateLessThan", "sys::CurrentTime", "2999-01-01T00:00:00Z");

    assert!(manager.is_granted("/x", "u", "mfs::GetObject"));

    let mut expired = AccessManager::new();
    expired
        .new_policy()
        .for_prefix("/")
        .permission("mfs::*")
        .with_condition("DateLessThan", "sys::CurrentTime", "2000-01-01T00:00:00Z");

    assert!(!expired.is_granted("/x", "u", "mfs::GetObject"));
}

#[test]
fn test_unknown_condition_type_fails_closed() {
    let mut manager = AccessManager::new();
    manager
        .new_policy()
        .for_prefix("/")
        .permission("mfs::*")
        .with_condition("IpAddress", "req::ip", "10.0.0.0/8");

    let request = AccessRequest::new("/x", Some("u"), "mfs::GetObject").with_client_ip("10.0.0.1");
    assert!(!manager.is_authorized(&request));
}

#[test]
fn test_unknown_condition_on_deny_does_not_deny() {
    let mut manager = AccessManager::new();
    manager.new_policy().for_prefix("/").permission("mfs::*");
    manager
        .new_policy()
        .for_prefix("/")
        .permission("mfs::*")
        .with_condition("NoSuchCondition", "mfs::permission", "x")
        .deny();

    assert!(manager.is_granted("/x", "u", "mfs::GetObject"));
}

#[test]
fn test_policies_from_json() {
    let json = r#"[
        {"usernames": ["reader"], "resources": ["mfs:/*"], "permissions": ["mfs::Get*", "mfs::ListObjects"]},
        {"usernames": ["*"], "resources": ["mfs:/private/*"], "permissions": ["mfs::*"], "effect": "Deny"}
    ]"#;
    let policies: Vec<Policy> = serde_json::from_str(json).unwrap();

    let mut manager = AccessManager::new();
    for policy in policies {
        manager.add_policy(policy);
    }

    assert_eq!(manager.len(), 2);
    assert!(manager.is_granted("/docs/a.txt", "reader", "mfs::GetObject"));
    assert!(!manager.is_granted("/docs/a.txt", "reader", "mfs::PutObject"));
    assert!(!manager.is_granted("/private/a.txt", "reader", "mfs::GetObject"));
}

#[test]
fn test_conditions_evaluated_in_insertion_order() {
    let evaluator = ConditionEvaluator::new();
    let context = attributes(&[("a", "1".into())]);

    let mut conditions: Conditions = IndexMap::new();
    conditions
        .entry("StringEquals".to_string())
        .or_default()
        .insert("missing".to_string(), ExpectedValue::from("x"));
    conditions
        .entry("Unknown".to_string())
        .or_default()
        .insert("a".to_string(), ExpectedValue::from("1"));

    let outcome = evaluator.evaluate(&context, &conditions);
    assert!(outcome.reason().unwrap().contains("missing"));
}
