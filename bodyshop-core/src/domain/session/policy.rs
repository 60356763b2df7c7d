//! Timing policies for connectivity classification and token refresh.
//!
//! Observed quality ([`ConnectionQuality`]) and the timing it implies are kept
//! apart: [`LatencyThresholds`] turns a latency into a quality, and
//! [`RefreshPolicyTable`] turns a quality into timings. Both are plain
//! configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds, DurationSeconds};

use super::types::ConnectionQuality;

/// Upper latency bounds for each quality tier. Anything slower is `poor`.
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencyThresholds {
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub good: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub medium: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub slow: Duration,
}

impl Default for LatencyThresholds {
    fn default() -> Self {
        Self {
            good: Duration::from_millis(1_000),
            medium: Duration::from_millis(3_000),
            slow: Duration::from_millis(8_000),
        }
    }
}

impl LatencyThresholds {
    pub fn classify(&self, latency: Duration) -> ConnectionQuality {
        if latency < self.good {
            ConnectionQuality::Good
        } else if latency < self.medium {
            ConnectionQuality::Medium
        } else if latency < self.slow {
            ConnectionQuality::Slow
        } else {
            ConnectionQuality::Poor
        }
    }
}

/// Timings the refresh scheduler runs with.
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RefreshPolicy {
    /// How often the scheduler wakes up to look at the token.
    #[serde_as(as = "DurationSeconds<u64>")]
    pub check_interval: Duration,
    /// Refresh once the token expires in less than this.
    #[serde_as(as = "DurationSeconds<u64>")]
    pub refresh_margin: Duration,
    /// Deadline of a single refresh attempt.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub attempt_timeout: Duration,
}

impl RefreshPolicy {
    const fn secs(check_interval: u64, refresh_margin: u64, attempt_timeout: u64) -> Self {
        Self {
            check_interval: Duration::from_secs(check_interval),
            refresh_margin: Duration::from_secs(refresh_margin),
            attempt_timeout: Duration::from_secs(attempt_timeout),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PolicyError {
    #[error("{quality}: refresh margin {margin:?} must exceed check interval {interval:?}")]
    MarginNotAboveInterval {
        quality: ConnectionQuality,
        margin: Duration,
        interval: Duration,
    },
    #[error("{quality}: check interval must be positive")]
    ZeroInterval { quality: ConnectionQuality },
}

/// One [`RefreshPolicy`] per connection quality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshPolicyTable {
    pub good: RefreshPolicy,
    pub medium: RefreshPolicy,
    pub slow: RefreshPolicy,
    pub poor: RefreshPolicy,
    /// Used before the first probe has completed.
    pub unknown: RefreshPolicy,
}

impl Default for RefreshPolicyTable {
    fn default() -> Self {
        Self {
            good: RefreshPolicy::secs(60, 300, 5),
            medium: RefreshPolicy::secs(90, 600, 15),
            slow: RefreshPolicy::secs(120, 900, 30),
            poor: RefreshPolicy::secs(180, 1_200, 30),
            unknown: RefreshPolicy::secs(90, 600, 15),
        }
    }
}

impl RefreshPolicyTable {
    pub fn for_quality(&self, quality: ConnectionQuality) -> RefreshPolicy {
        match quality {
            ConnectionQuality::Good => self.good,
            ConnectionQuality::Medium => self.medium,
            ConnectionQuality::Slow => self.slow,
            ConnectionQuality::Poor => self.poor,
            ConnectionQuality::Unknown => self.unknown,
        }
    }

    /// Every policy must wake up at least once inside its refresh margin,
    /// otherwise a token can expire between two ticks.
    pub fn validate(&self) -> Result<(), PolicyError> {
        let entries = [
            (ConnectionQuality::Good, self.good),
            (ConnectionQuality::Medium, self.medium),
            (ConnectionQuality::Slow, self.slow),
            (ConnectionQuality::Poor, self.poor),
            (ConnectionQuality::Unknown, self.unknown),
        ];

        for (quality, policy) in entries {
            if policy.check_interval.is_zero() {
                return Err(PolicyError::ZeroInterval { quality });
            }
            if policy.refresh_margin <= policy.check_interval {
                return Err(PolicyError::MarginNotAboveInterval {
                    quality,
                    margin: policy.refresh_margin,
                    interval: policy.check_interval,
                });
            }
        }

        Ok(())
    }
}
