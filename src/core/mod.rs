//! Core building blocks of the mfs gateway
//!
//! Everything here is transport-agnostic; the HTTP service lives in the
//! `mfs-server` crate.

pub mod authn;
pub mod bucket;
pub mod config;
pub mod error;
pub mod events;
pub mod iam;
pub mod request;
pub mod stats;
