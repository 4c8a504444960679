//! Offline cache controller for the application shell.
//!
//! This module provides a versioned, cache-first asset cache that:
//! - Pre-caches a fixed manifest when a version installs
//! - Drops every other bucket when a version activates
//! - Answers requests from the active bucket, falling back to the network
//! - Serves the cached root document to navigations when offline

mod controller;
mod error;
mod http;
mod storage;
mod traits;

pub use controller::{OfflineCache, Registration};
pub use http::HttpFetcher;
pub use storage::SqliteCacheStorage;
pub use traits::Request;
