use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::auth::jwt;

#[derive(Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    #[serde(default)]
    pub expires_at: Option<String>,
}

impl LoginResponse {
    /// Expiry of the issued token.
    ///
    /// Uses `expires_at` when it parses as RFC 3339, otherwise the `exp`
    /// claim of the token. `None` means the credential never expires.
    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        if let Some(ref raw) = self.expires_at {
            match DateTime::parse_from_rfc3339(raw) {
                Ok(expiry) => return Some(expiry.with_timezone(&Utc)),
                Err(e) => warn!(error = %e, "Login response has unparseable expires_at"),
            }
        }
        jwt::token_expiry(&self.token)
    }
}

impl std::fmt::Debug for LoginResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginResponse")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
