use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{
    notifier::Notifier,
    service::SessionService,
    traits::AuthProvider,
    types::ProbeOutcome,
};

/// Background task that keeps the session fresh.
///
/// Each tick sleeps for the check interval of the current connection quality
/// and refreshes once the token is inside the refresh margin. The task ends
/// by itself once the service halts and only comes back through [`reset`].
///
/// [`reset`]: RefreshScheduler::reset
pub struct RefreshScheduler<P: AuthProvider, N: Notifier> {
    service: SessionService<P, N>,
    handle: Option<JoinHandle<()>>,
}

impl<P: AuthProvider, N: Notifier> RefreshScheduler<P, N> {
    pub fn new(service: SessionService<P, N>) -> Self {
        Self {
            service,
            handle: None,
        }
    }

    /// Spawn the refresh loop. Does nothing when it is already running.
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }
        let service = self.service.clone();
        self.handle = Some(tokio::spawn(run(service)));
    }

    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            debug!("session refresh scheduler stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Manual recovery: clear the halted state, re-probe and start over.
    pub async fn reset(&mut self) -> ProbeOutcome {
        self.stop();
        let outcome = self.service.reset().await;
        self.start();
        outcome
    }
}

impl<P: AuthProvider, N: Notifier> Drop for RefreshScheduler<P, N> {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run<P: AuthProvider, N: Notifier>(service: SessionService<P, N>) {
    info!("session refresh scheduler started");

    loop {
        let policy = service.current_policy().await;
        tokio::time::sleep(policy.check_interval).await;

        match service.refresh_if_due().await {
            Ok(true) => debug!("scheduled refresh succeeded"),
            Ok(false) => {}
            Err(e) => warn!(error = %e, "scheduled refresh failed"),
        }

        if service.store().is_halted().await {
            warn!("session refresh scheduler stopped until reset");
            break;
        }
    }
}
