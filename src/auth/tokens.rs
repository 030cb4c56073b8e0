//! Token storage and management

use base64::Engine;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Consider a token expired this many seconds before its real expiry.
const EXPIRY_SKEW_SECS: i64 = 300;

/// Stored access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredToken {
    pub token: String,
    pub expires_at: Option<i64>,
}

impl StoredToken {
    /// Build from a lifetime in seconds, falling back to the JWT `exp` claim.
    pub fn new(token: String, expires_in_secs: Option<u64>) -> Self {
        let expires_at = match expires_in_secs {
            Some(secs) => Some(Utc::now().timestamp() + secs as i64),
            None => jwt_expiry(&token),
        };
        Self { token, expires_at }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now().timestamp())
    }

    fn is_expired_at(&self, now: i64) -> bool {
        match self.expires_at {
            Some(exp) => now + EXPIRY_SKEW_SECS >= exp,
            None => false,
        }
    }
}

#[derive(Deserialize)]
struct ExpClaim {
    exp: Option<i64>,
}

/// Read the `exp` claim from a JWT without verifying it.
pub fn jwt_expiry(token: &str) -> Option<i64> {
    let payload = token.split('.').nth(1)?;
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    serde_json::from_slice::<ExpClaim>(&bytes).ok()?.exp
}

/// Token store trait for different storage backends
pub trait TokenStore {
    fn get_access_token(&self) -> Option<StoredToken>;
    fn set_access_token(&mut self, token: String, expires_in: Option<u64>);
    fn get_refresh_token(&self) -> Option<String>;
    fn set_refresh_token(&mut self, token: String);
    fn clear_tokens(&mut self);
}
