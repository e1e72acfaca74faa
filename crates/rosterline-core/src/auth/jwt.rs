//! Read-only access to JWT claims.
//!
//! Tokens are never verified here; the server owns that. The payload is only
//! decoded to recover an expiry when the login response omits one.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

/// Decode the claims segment of a compact JWT.
pub fn parse_claims(token: &str) -> Option<Value> {
    let mut segments = token.split('.');
    let payload = match (segments.next(), segments.next(), segments.next()) {
        (Some(_), Some(payload), Some(_)) => payload,
        _ => {
            debug!("Token is not a compact JWT");
            return None;
        }
    };

    // Some issuers keep the padding; the engine rejects it.
    let bytes = match URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')) {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(error = %e, "Failed to decode JWT payload");
            return None;
        }
    };

    match serde_json::from_slice(&bytes) {
        Ok(Value::Object(map)) => Some(Value::Object(map)),
        Ok(_) => None,
        Err(e) => {
            debug!(error = %e, "JWT payload is not JSON");
            None
        }
    }
}

/// Expiry carried in the `exp` claim (seconds since the epoch).
pub fn expiry_from_claims(claims: &Value) -> Option<DateTime<Utc>> {
    let exp = claims.get("exp")?;
    let seconds = exp.as_i64().or_else(|| exp.as_f64().map(|f| f as i64))?;
    DateTime::from_timestamp(seconds, 0)
}

/// Shorthand for `parse_claims` followed by `expiry_from_claims`.
pub fn token_expiry(token: &str) -> Option<DateTime<Utc>> {
    parse_claims(token).as_ref().and_then(expiry_from_claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_token(claims: &str) -> String {
        format!(
            "{}.{}.sig",
            URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#),
            URL_SAFE_NO_PAD.encode(claims)
        )
    }

    #[test]
    fn test_parse_claims() {
        let token = make_token(r#"{"sub":"42","exp":1900000000}"#);
        let claims = parse_claims(&token).unwrap();
        assert_eq!(claims["sub"], "42");
    }

    #[test]
    fn test_token_expiry() {
        let token = make_token(r#"{"exp":1900000000}"#);
        let expiry = token_expiry(&token).unwrap();
        assert_eq!(expiry.timestamp(), 1_900_000_000);
    }

    #[test]
    fn test_opaque_tokens_have_no_claims() {
        assert!(parse_claims("t1").is_none());
        assert!(parse_claims("a.b").is_none());
        assert!(parse_claims("a.!!!.c").is_none());
        assert!(token_expiry("t1").is_none());
    }

    #[test]
    fn test_missing_exp() {
        let token = make_token(r#"{"sub":"42"}"#);
        assert!(token_expiry(&token).is_none());
    }
}
