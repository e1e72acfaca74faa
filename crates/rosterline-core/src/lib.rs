//! rosterline-core - client library for the rosterline student roster API.
//!
//! This crate contains the non-UI pieces shared by every front end:
//! - API client with bearer auth, retry/backoff and uniform outcomes
//! - Credential store with expiry tracking and fallback persistence
//! - Session controller (login/logout, unauthorized handling, auto-logout)
//! - Query cache invalidated by successful mutations
//! - Data models and configuration
//!
//! Wiring, done once by the embedder:
//!
//! ```no_run
//! use std::sync::Arc;
//! use rosterline_core::api::{unauthorized_channel, ApiClient, StudentsApi};
//! use rosterline_core::auth::{CredentialStore, NoopNavigator, SessionController, SessionOptions};
//! use rosterline_core::cache::QueryCache;
//! use rosterline_core::config::ApiConfig;
//!
//! # async fn wire() -> Result<(), rosterline_core::api::ClientError> {
//! let credentials = Arc::new(CredentialStore::in_memory());
//! let (notifier, signals) = unauthorized_channel();
//! let client = ApiClient::new(&ApiConfig::from_env(), credentials, Arc::new(notifier))?;
//! let cache = Arc::new(QueryCache::default());
//! let session = SessionController::start(
//!     client.clone(),
//!     Arc::new(NoopNavigator),
//!     signals,
//!     SessionOptions { query_cache: Some(cache.clone()), ..Default::default() },
//! );
//! let students = StudentsApi::new(client, cache);
//! # let _ = (session, students);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod models;
pub mod time;
