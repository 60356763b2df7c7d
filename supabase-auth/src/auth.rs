use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A session as returned by the GoTrue token endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Lifetime of the access token in seconds.
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Unix timestamp (seconds) at which the access token expires.
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: AuthUser,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Error, Debug, PartialEq)]
pub enum TokenExpiryError {
    #[error("invalid JWT format")]
    InvalidFormat,
    #[error("base64 decode failed: {0}")]
    Base64(String),
    #[error("JSON parse failed: {0}")]
    Json(String),
    #[error("missing exp claim")]
    MissingExp,
    #[error("invalid exp timestamp")]
    InvalidTimestamp,
}

impl AuthSession {
    /// Resolves the expiry of the access token.
    ///
    /// Prefers the explicit `expires_at` field, then falls back to `expires_in`
    /// relative to `issued_at`, then to the `exp` claim inside the JWT.
    pub fn expiry(&self, issued_at: DateTime<Utc>) -> Result<DateTime<Utc>, TokenExpiryError> {
        if let Some(ts) = self.expires_at {
            return DateTime::from_timestamp(ts, 0).ok_or(TokenExpiryError::InvalidTimestamp);
        }

        if let Some(secs) = self.expires_in {
            return Ok(issued_at + chrono::Duration::seconds(secs));
        }

        decode_expiry(&self.access_token)
    }
}

/// Decode the JWT `exp` claim without verifying the signature.
pub fn decode_expiry(jwt: &str) -> Result<DateTime<Utc>, TokenExpiryError> {
    let parts: Vec<&str> = jwt.split('.').collect();
    if parts.len() != 3 {
        return Err(TokenExpiryError::InvalidFormat);
    }

    let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(parts[1])
        .map_err(|e| TokenExpiryError::Base64(e.to_string()))?;
    let value: serde_json::Value =
        serde_json::from_slice(&payload).map_err(|e| TokenExpiryError::Json(e.to_string()))?;
    let exp = value["exp"].as_i64().ok_or(TokenExpiryError::MissingExp)?;

    DateTime::from_timestamp(exp, 0).ok_or(TokenExpiryError::InvalidTimestamp)
}
