use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::storage::{MemoryStorage, SessionStorage};
use crate::time::{Clock, SystemClock};

/// Fallback key holding the bearer token.
pub const TOKEN_KEY: &str = "auth_token";

/// Fallback key holding the RFC 3339 expiry.
pub const EXPIRY_KEY: &str = "token_expiry";

/// A bearer token plus its optional expiry.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn new(token: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|expiry| now >= expiry).unwrap_or(false)
    }
}

// Keep tokens out of logs and panic messages.
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Owner of the current credential.
///
/// The in-memory value is authoritative; the fallback medium only exists so
/// a fresh store can rehydrate. Expiry is checked on every read, so an
/// expired credential is never handed out even if nobody cleared it.
pub struct CredentialStore {
    memory: Mutex<Option<Credential>>,
    fallback: Arc<dyn SessionStorage>,
    clock: Arc<dyn Clock>,
}

impl CredentialStore {
    pub fn new(fallback: Arc<dyn SessionStorage>, clock: Arc<dyn Clock>) -> Self {
        Self {
            memory: Mutex::new(None),
            fallback,
            clock,
        }
    }

    /// Store backed only by process memory and the system clock.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()), Arc::new(SystemClock))
    }

    pub fn with_fallback(fallback: Arc<dyn SessionStorage>) -> Self {
        Self::new(fallback, Arc::new(SystemClock))
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Replace the current credential. An empty token clears the store.
    pub fn set(&self, token: impl Into<String>, expires_at: Option<DateTime<Utc>>) {
        let credential = Credential::new(token, expires_at);
        if credential.token.is_empty() {
            debug!("Empty token, clearing credential");
            self.clear();
            return;
        }
        self.persist(&credential);
        *self.memory() = Some(credential);
        debug!(expires_at = ?expires_at, "Credential stored");
    }

    /// Current token, or `None` when absent or expired.
    pub fn get(&self) -> Option<String> {
        self.credential().map(|c| c.token)
    }

    /// Current credential, with the same expiry semantics as [`get`](Self::get).
    pub fn credential(&self) -> Option<Credential> {
        if self.is_expired() {
            debug!("Credential expired, clearing");
            self.clear();
            return None;
        }

        let mut memory = self.memory();
        if let Some(ref credential) = *memory {
            return Some(credential.clone());
        }

        let restored = self.rehydrate()?;
        if restored.is_expired_at(self.clock.now()) {
            drop(memory);
            self.clear();
            return None;
        }
        debug!("Credential rehydrated from fallback storage");
        *memory = Some(restored.clone());
        Some(restored)
    }

    /// Drop the credential from memory and the fallback medium.
    pub fn clear(&self) {
        *self.memory() = None;
        for key in [TOKEN_KEY, EXPIRY_KEY] {
            if let Err(e) = self.fallback.remove_item(key) {
                warn!(key, error = %e, "Failed to clear fallback storage");
            }
        }
    }

    /// True iff an expiry is recorded and the clock is at or past it.
    pub fn is_expired(&self) -> bool {
        self.expiry()
            .map(|expiry| self.clock.now() >= expiry)
            .unwrap_or(false)
    }

    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        if let Some(ref credential) = *self.memory() {
            return credential.expires_at;
        }
        self.persisted_expiry()
    }

    fn persist(&self, credential: &Credential) {
        if let Err(e) = self.fallback.set_item(TOKEN_KEY, &credential.token) {
            warn!(error = %e, "Failed to persist token to fallback storage");
            return;
        }
        let result = match credential.expires_at {
            Some(expiry) => self.fallback.set_item(EXPIRY_KEY, &expiry.to_rfc3339()),
            None => self.fallback.remove_item(EXPIRY_KEY),
        };
        if let Err(e) = result {
            warn!(error = %e, "Failed to persist token expiry to fallback storage");
        }
    }

    fn rehydrate(&self) -> Option<Credential> {
        let token = match self.fallback.get_item(TOKEN_KEY) {
            Ok(Some(token)) if !token.is_empty() => token,
            Ok(_) => return None,
            Err(e) => {
                warn!(error = %e, "Failed to read token from fallback storage");
                return None;
            }
        };
        Some(Credential::new(token, self.persisted_expiry()))
    }

    fn persisted_expiry(&self) -> Option<DateTime<Utc>> {
        let raw = match self.fallback.get_item(EXPIRY_KEY) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(error = %e, "Failed to read token expiry from fallback storage");
                return None;
            }
        };
        match DateTime::parse_from_rfc3339(&raw) {
            Ok(expiry) => Some(expiry.with_timezone(&Utc)),
            Err(e) => {
                warn!(error = %e, "Ignoring unparseable token expiry");
                None
            }
        }
    }

    fn memory(&self) -> MutexGuard<'_, Option<Credential>> {
        // The guarded value is a plain Option; poisoning cannot break it.
        self.memory.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("credential", &*self.memory())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
