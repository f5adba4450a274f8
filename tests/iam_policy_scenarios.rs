//! IAM scenarios through the public API: deny precedence, bypass attempts
//! and edge cases

use mfs_rs::core::iam::{
    resolve, AccessManager, AccessRequest, ConditionEvaluator, ConditionValue, Context, Effect,
    Policy, ResolveError,
};
use std::sync::Arc;

#[test]
fn test_zero_policies_deny_everything() {
    let manager = AccessManager::new();
    for permission in ["mfs::GetObject", "mfs::PutObject", "mfs::*", ""] {
        assert!(!manager.is_granted("/", "root", permission));
        assert!(!manager.is_granted("/any/key", "root", permission));
    }
}

#[test]
fn test_deny_wins_in_any_position() {
    let deny = {
        let mut p = Policy::new();
        p.for_prefix("/private/").permission("mfs::*").deny();
        p.build()
    };
    let allow = {
        let mut p = Policy::new();
        p.for_prefix("/").permission("mfs::*");
        p.build()
    };

    for position in 0..3 {
        let mut policies = vec![allow.clone(), allow.clone()];
        policies.insert(position, deny.clone());

        let mut manager = AccessManager::new();
        for policy in policies {
            manager.add_policy(policy);
        }

        assert!(!manager.is_granted("/private/x", "u", "mfs::GetObject"));
        assert!(manager.is_granted("/public/x", "u", "mfs::GetObject"));
    }
}

#[test]
fn test_owner_only_grant() {
    let mut manager = AccessManager::new();
    manager
        .new_policy()
        .for_username("u")
        .for_prefix("/")
        .permission("mfs::*");

    for permission in ["mfs::GetObject", "mfs::PutObject", "mfs::DeleteObject"] {
        assert!(manager.is_granted("/x/y", "u", permission));
        assert!(!manager.is_granted("/x/y", "v", permission));
        assert!(!manager.is_granted("/x/y", "uu", permission));
        assert!(!manager.is_granted("/x/y", "U", permission));
    }
}

#[test]
fn test_path_traversal_is_not_normalised() {
    let mut manager = AccessManager::new();
    manager
        .new_policy()
        .for_username("u")
        .for_prefix("/public/")
        .permission("mfs::GetObject");

    // Matching is textual; the bucket rejects `..` before it gets here
    assert!(manager.is_granted("/public/../private/secret", "u", "mfs::GetObject"));
    assert!(!manager.is_granted("/private/../public/x", "u", "mfs::GetObject"));
    assert!(!manager.is_granted("public/x", "u", "mfs::GetObject"));
}

#[test]
fn test_regex_injection_in_patterns() {
    let mut manager = AccessManager::new();
    manager
        .new_policy()
        .for_username("a.c")
        .for_resource("mfs:/(x|y)")
        .permission("mfs::Get.*");

    assert!(!manager.is_granted("/x", "abc", "mfs::GetObject"));
    assert!(!manager.is_granted("/(x|y)", "a.c", "mfs::GetObject"));
    assert!(manager.is_granted("/(x|y)", "a.c", "mfs::Get.*"));
}

#[test]
fn test_home_directory_interpolation() {
    let mut manager = AccessManager::new();
    manager
        .new_policy()
        .for_username("*")
        .for_prefix("/home/")
        .permission("mfs::*")
        .with_condition(
            "StringLike",
            "mfs::resource",
            "mfs:/home/${authn::username}/*",
        );

    assert!(manager.is_granted("/home/alice/a.txt", "alice", "mfs::PutObject"));
    assert!(!manager.is_granted("/home/alice/a.txt", "bob", "mfs::PutObject"));

    // A subject containing a token is substituted literally, not re-expanded
    assert!(!manager.is_granted("/home/x/a.txt", "${mfs::permission}", "mfs::PutObject"));
}

#[test]
fn test_not_equals_ignore_case() {
    let mut manager = AccessManager::new();
    manager.new_policy().for_prefix("/").permission("mfs::*");
    manager
        .new_policy()
        .for_prefix("/")
        .permission("mfs::*")
        .with_condition("StringNotEqualsIgnoreCase", "authn::username", "ADMIN")
        .with_condition("StringLike", "mfs::resource", "mfs:/admin/*")
        .deny();

    assert!(manager.is_granted("/admin/panel", "admin", "mfs::GetObject"));
    assert!(manager.is_granted("/admin/panel", "Admin", "mfs::GetObject"));
    assert!(!manager.is_granted("/admin/panel", "mallory", "mfs::GetObject"));
    assert!(manager.is_granted("/other", "mallory", "mfs::GetObject"));
}

#[test]
fn test_bool_condition_on_custom_attribute() {
    let mut manager = AccessManager::new();
    manager
        .new_policy()
        .for_prefix("/")
        .permission("mfs::GetObject")
        .with_condition("Bool", "mfs::archived", false);

    let mut live = Context::new();
    live.insert("archived".into(), ConditionValue::Bool(false));
    let mut archived = Context::new();
    archived.insert("archived".into(), ConditionValue::Bool(true));
    let mut stringly = Context::new();
    stringly.insert("archived".into(), "false".into());

    let check = |attrs: &Context| {
        manager.is_authorized(
            &AccessRequest::new("/x", Some("u"), "mfs::GetObject").with_attributes(attrs),
        )
    };
    assert!(check(&live));
    assert!(!check(&archived));
    assert!(!check(&stringly));
}

#[test]
fn test_custom_condition_registry() {
    struct IsLocal;
    impl mfs_rs::core::iam::Condition for IsLocal {
        fn fulfills(
            &self,
            actual: &ConditionValue,
            _expected: &mfs_rs::core::iam::ExpectedValue,
        ) -> bool {
            actual
                .as_string()
                .map(|ip| ip.starts_with("127."))
                .unwrap_or(false)
        }
    }

    let mut conditions = ConditionEvaluator::new();
    conditions.register("IsLocal", Arc::new(IsLocal));

    let mut manager = AccessManager::with_conditions(conditions);
    manager
        .new_policy()
        .for_prefix("/")
        .permission("mfs::*")
        .with_condition("IsLocal", "req::ip", true);

    let local = AccessRequest::new("/x", Some("u"), "mfs::GetObject").with_client_ip("127.0.0.1");
    let remote = AccessRequest::new("/x", Some("u"), "mfs::GetObject").with_client_ip("8.8.8.8");
    assert!(manager.is_authorized(&local));
    assert!(!manager.is_authorized(&remote));
}

#[test]
fn test_resolve_examples() {
    let mut vars = Context::new();
    vars.insert("b".into(), "Z".into());
    vars.insert("user".into(), "alice".into());

    assert_eq!(resolve("a${b}c", &vars).unwrap(), "aZc");
    assert_eq!(resolve("${user}/${b}/${user}", &vars).unwrap(), "alice/Z/alice");
    assert_eq!(resolve("", &vars).unwrap(), "");
    assert_eq!(
        resolve("${nope}", &vars),
        Err(ResolveError::UnknownVariable("nope".into()))
    );
    assert!(resolve("${user", &vars).is_err());
}

#[test]
fn test_policy_round_trip_through_json() {
    let mut policy = Policy::new();
    policy
        .id("ops")
        .for_username("ops-*")
        .for_resource("mfs:/logs/*")
        .permission("mfs::GetObject")
        .with_condition("StringLike", "req::ip", vec!["10.*", "172.16.*"])
        .deny();

    let json = serde_json::to_string(&policy).unwrap();
    let parsed: Policy = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, policy);
    assert_eq!(parsed.effect, Effect::Deny);
}
