//! # mfs - Policy-Guarded Object Storage
//!
//! `mfs-rs` holds the transport-independent core of the mfs gateway: an S3-like
//! flat object namespace guarded by pluggable authentication and a policy
//! engine with explicit deny precedence.
//!
//! - **IAM**: wildcard policies over subjects, resources and permissions, with
//!   typed conditions and `${var}` interpolation
//! - **Authentication**: HTTP Basic against hashed keys, JWT bearer sessions
//! - **Storage**: a local directory bucket with ACLs kept as file modes
//! - **Stats and events**: counters, histograms and success events
//!
//! The HTTP service lives in the `mfs-server` crate.
//!
//! ## Quick Start
//!
//! ```rust
//! use mfs_rs::{AccessManager, AccessRequest};
//!
//! let mut manager = AccessManager::new();
//!
//! // alice may do anything below /home/alice/
//! manager
//!     .new_policy()
//!     .for_username("alice")
//!     .for_resource("mfs:/home/alice/*")
//!     .permission("mfs::*");
//!
//! // nobody deletes from /home/alice/archive/
//! manager
//!     .new_policy()
//!     .for_prefix("/home/alice/archive/")
//!     .permission("mfs::DeleteObject")
//!     .deny();
//!
//! assert!(manager.is_granted("/home/alice/notes.txt", "alice", "mfs::PutObject"));
//! assert!(!manager.is_granted("/home/alice/archive/2020.tar", "alice", "mfs::DeleteObject"));
//!
//! let request = AccessRequest::new("/home/alice/notes.txt", Some("bob"), "mfs::GetObject")
//!     .with_client_ip("10.0.0.7");
//! assert!(!manager.is_authorized(&request));
//! ```

pub mod core;

pub use crate::core::{
    authn::{Authenticator, AuthenticatorSet, Identity},
    bucket::{Acls, Listing, LocalBucket, ObjectInfo, ObjectStore},
    config::Config,
    error::{MfsError, Result},
    events::{Event, EventPublisher, NullPublisher},
    iam::{AccessManager, AccessRequest, Effect, Policy},
    request::{Headers, RequestHead},
    stats::{InMemoryStatsRegistry, Metric, MetricsProvider, StatsRegistry},
};
