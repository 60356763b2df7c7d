//! Core types for the session domain.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// An authenticated session against the auth provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub user: SessionUser,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: String,
    pub email: Option<String>,
}

impl Session {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }

    /// Time left before the access token expires, zero once it has.
    pub fn time_to_expiry(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).to_std().unwrap_or(Duration::ZERO)
    }

    /// True when the token expires in less than `margin` (or already has).
    pub fn expires_within(&self, margin: Duration, now: DateTime<Utc>) -> bool {
        self.time_to_expiry(now) < margin
    }
}

/// Observed network quality towards the auth provider.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ConnectionQuality {
    #[default]
    Unknown,
    Good,
    Medium,
    Slow,
    Poor,
}

/// Result of one connectivity probe run.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    pub quality: ConnectionQuality,
    /// Latency of the first successful attempt.
    pub latency: Option<Duration>,
    /// Every staged attempt failed. Operations still run but are at risk.
    pub degraded: bool,
}

impl ProbeOutcome {
    pub fn failed() -> Self {
        Self {
            quality: ConnectionQuality::Poor,
            latency: None,
            degraded: true,
        }
    }
}

/// Lifecycle notifications published by the session service.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A new token was obtained.
    Refreshed { expires_at: DateTime<Utc> },
    /// The token was re-checked with the provider and is still accepted.
    Verified { expires_at: DateTime<Utc> },
    /// The session could not be kept alive and has been dropped.
    Expired,
    /// Automatic refreshing stopped after repeated failures.
    Halted { consecutive_failures: u32 },
    QualityChanged(ConnectionQuality),
    SignedIn,
    SignedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SessionStatus {
    /// No session is held.
    SignedOut,
    Active,
    /// A session is held but its access token has expired.
    Expired,
    /// Refreshing failed too many times in a row; waiting for a manual reset.
    Halted,
}

impl From<supabase_auth::AuthUser> for SessionUser {
    fn from(user: supabase_auth::AuthUser) -> Self {
        Self {
            id: user.id,
            email: user.email,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_expiring_in(secs: i64) -> Session {
        Session {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
            expires_at: Utc::now() + chrono::Duration::seconds(secs),
            user: SessionUser {
                id: "u".to_string(),
                email: None,
            },
        }
    }

    #[test]
    fn expired_session_has_no_time_left() {
        let s = session_expiring_in(-30);
        let now = Utc::now();
        assert!(!s.is_valid_at(now));
        assert_eq!(s.time_to_expiry(now), Duration::ZERO);
        assert!(s.expires_within(Duration::from_secs(1), now));
    }

    #[test]
    fn margin_decides_whether_refresh_is_due() {
        let s = session_expiring_in(120);
        let now = Utc::now();
        assert!(s.is_valid_at(now));
        assert!(s.expires_within(Duration::from_secs(300), now));
        assert!(!s.expires_within(Duration::from_secs(60), now));
    }

    #[test]
    fn quality_parses_case_insensitively() {
        assert_eq!("POOR".parse::<ConnectionQuality>().unwrap(), ConnectionQuality::Poor);
        assert_eq!(ConnectionQuality::Medium.to_string(), "medium");
    }
}
