use std::{sync::Arc, time::Duration};

use tokio::time::Instant;
use tracing::{info, warn};

use super::{
    policy::LatencyThresholds,
    traits::{AuthProvider, SessionError},
    types::{ProbeOutcome, Session},
};
use crate::domain::retry::{retry_with_timeout, RetryPolicy};

/// Classifies the connection to the auth provider by timing a cheap call.
///
/// Attempts run with increasing deadlines. The latency of the first attempt
/// that succeeds decides the tier. When every attempt fails the outcome is
/// `poor` and degraded; nothing is returned as an error.
pub struct ConnectivityProber<P> {
    provider: Arc<P>,
    stages: RetryPolicy,
    thresholds: LatencyThresholds,
}

impl<P: AuthProvider> ConnectivityProber<P> {
    pub fn new(provider: Arc<P>, stage_timeouts: Vec<Duration>, thresholds: LatencyThresholds) -> Self {
        Self {
            provider,
            stages: RetryPolicy::staged(stage_timeouts, Duration::ZERO),
            thresholds,
        }
    }

    pub async fn probe(&self, current: Option<&Session>) -> ProbeOutcome {
        let provider = &self.provider;
        let result = retry_with_timeout(&self.stages, "connectivity_probe", move || async move {
            let started = Instant::now();
            provider.get_session(current).await?;
            Ok::<_, SessionError>(started.elapsed())
        })
        .await;

        match result {
            Ok(latency) => {
                let quality = self.thresholds.classify(latency);
                info!(%quality, latency_ms = latency.as_millis() as u64, "connectivity probed");
                ProbeOutcome {
                    quality,
                    latency: Some(latency),
                    degraded: false,
                }
            }
            Err(e) => {
                warn!(error = %e, attempts = self.stages.attempts(), "all connectivity probes failed, running degraded");
                ProbeOutcome::failed()
            }
        }
    }
}
