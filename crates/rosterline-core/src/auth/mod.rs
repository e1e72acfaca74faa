//! Authentication module for managing credentials and sessions.
//!
//! This module provides:
//! - `CredentialStore`: the current bearer token and its expiry, mirrored
//!   into a best-effort fallback medium
//! - `SessionStorage` implementations for that medium (memory, file, OS keychain)
//! - `SessionController`: login/logout, unauthorized handling and auto-logout
//! - `jwt`: read-only access to token claims

pub mod credentials;
pub mod jwt;
pub mod session;
pub mod storage;

pub use credentials::{Credential, CredentialStore};
pub use session::{
    AutoLogoutTimer, LoginOutcome, Navigator, NoopNavigator, Route, SessionController,
    SessionOptions, SessionState,
};
pub use storage::{FileStorage, KeyringStorage, MemoryStorage, SessionStorage, UnavailableStorage};
