//! Cached query layer for server-derived state.
//!
//! This module provides the `QueryCache`, an in-memory store of API
//! results keyed by logical resource name (`students`, `students/7`).
//! Entries are stale once invalidated by a successful mutation or after
//! 60 minutes.

pub mod manager;

pub use manager::{CacheInvalidator, CachedData, QueryCache, QueryKey};
