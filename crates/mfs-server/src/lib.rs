//! HTTP gateway for mfs object storage
//!
//! Routes S3-like requests (`GET`/`HEAD`/`PUT`/`DELETE` on object keys, listings
//! and Prometheus metrics on the bucket root) through authentication and the
//! policy engine of `mfs-rs`, then to a local bucket.
//!
//! ## Example
//!
//! ```no_run
//! use mfs::Config;
//! use mfs_server::{ApiRequest, Server};
//!
//! let config = Config::load("mfs.toml")?;
//! let server = Server::from_config(&config)?;
//!
//! let response = server.handle(&ApiRequest::new("GET", "/").with_param("metrics", ""));
//! println!("{}", response.status);
//! # Ok::<(), mfs::MfsError>(())
//! ```

mod error;
pub mod http;
mod metrics;
mod publisher;
mod router;
mod server;

pub use error::{ApiError, ApiResult, ErrorBody};
pub use metrics::{render as render_metrics, SERVICE_LABEL};
pub use publisher::HttpPublisher;
pub use router::{resolve, Operation, Route};
pub use server::{
    ApiRequest, ApiResponse, Server, ServerOptions, DURATION_BUCKETS, UNRESOLVED_HANDLER,
};
