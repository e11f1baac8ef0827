//! # Kove Core
//!
//! Core types for the Kove policy violation exporter.
//!
//! Kove watches live objects in a cluster resource store, evaluates each one
//! against a set of policies and exports the offending objects as metrics.
//! This crate holds the pieces every other crate agrees on:
//! - the dynamic object envelope and its identity key
//! - resource kinds and discovery entries
//! - violation records and the error type
//! - the exporter configuration

pub mod config;
pub mod error;
pub mod object;
pub mod resource;
pub mod violation;

pub use config::KoveConfig;
pub use error::{KoveError, Result};
pub use object::{ObjectBuilder, ObjectKey, ObjectRef, OwnerReference};
pub use resource::{ApiResource, WatchedResource};
pub use violation::ViolationRecord;

/// Current Kove version for compatibility checks
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Kove build information for telemetry and debugging
pub const BUILD_INFO: &str = concat!(
    "Kove ",
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("CARGO_PKG_NAME"),
    ")"
);

/// Standard HTTP endpoints served by the exporter
pub mod endpoints {
    pub const HEALTHZ: &str = "/healthz";
    pub const METRICS: &str = "/metrics";
}

/// Report whether `item` is present in `list` as an exact match.
pub fn contains<S: AsRef<str>>(list: &[S], item: &str) -> bool {
    list.iter().any(|v| v.as_ref() == item)
}
