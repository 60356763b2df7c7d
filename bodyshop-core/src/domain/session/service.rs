use std::{fmt::Display, future::Future, sync::Arc, time::Duration};

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds, DurationSeconds};
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use super::{
    notifier::{Notifier, Toast, ToastLevel, ToastOptions, TracingNotifier},
    policy::{LatencyThresholds, RefreshPolicy, RefreshPolicyTable},
    prober::ConnectivityProber,
    store::SessionStore,
    traits::{AuthProvider, Result, SessionError},
    types::{ConnectionQuality, ProbeOutcome, Session, SessionEvent},
};
use crate::domain::retry::{retry_with_timeout, RetryPolicy};

const EVENT_CAPACITY: usize = 32;
const DEGRADED_WARNING: &str = "Connection is unstable, this operation may fail";
const HALTED_WARNING: &str = "Session refresh is paused, this operation may fail";

/// Tunables of the session service.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Deadlines of the staged connectivity probes.
    #[serde_as(as = "Vec<DurationSeconds<u64>>")]
    pub probe_timeouts: Vec<Duration>,
    pub latency_thresholds: LatencyThresholds,
    pub policies: RefreshPolicyTable,
    /// Attempts per refresh, each bounded by the policy's attempt timeout.
    pub refresh_attempts: u32,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub refresh_retry_delay: Duration,
    /// Failed refreshes in a row before automatic refreshing halts.
    pub max_consecutive_failures: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            probe_timeouts: vec![
                Duration::from_secs(5),
                Duration::from_secs(15),
                Duration::from_secs(30),
            ],
            latency_thresholds: LatencyThresholds::default(),
            policies: RefreshPolicyTable::default(),
            refresh_attempts: 3,
            refresh_retry_delay: Duration::from_secs(2),
            max_consecutive_failures: 3,
        }
    }
}

type SharedRefresh = Shared<BoxFuture<'static, Result<Session>>>;

/// Keeps a session alive and runs operations against it.
///
/// Constructed once by the application root and passed around by clone;
/// clones share the same store, event channel and in-flight refresh.
pub struct SessionService<P, N = TracingNotifier> {
    inner: Arc<Inner<P, N>>,
}

struct Inner<P, N> {
    provider: Arc<P>,
    notifier: N,
    store: SessionStore,
    prober: ConnectivityProber<P>,
    config: SessionConfig,
    connection: RwLock<ProbeOutcome>,
    events: broadcast::Sender<SessionEvent>,
    in_flight: Mutex<Option<SharedRefresh>>,
}

impl<P, N> Clone for SessionService<P, N> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: AuthProvider, N: Notifier> SessionService<P, N> {
    pub fn new(provider: Arc<P>, notifier: N, config: SessionConfig) -> Self {
        Self::with_store(provider, notifier, config, SessionStore::new())
    }

    /// Start from an existing store, e.g. one restored from a snapshot.
    pub fn with_store(provider: Arc<P>, notifier: N, config: SessionConfig, store: SessionStore) -> Self {
        let prober = ConnectivityProber::new(
            provider.clone(),
            config.probe_timeouts.clone(),
            config.latency_thresholds,
        );
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            inner: Arc::new(Inner {
                provider,
                notifier,
                store,
                prober,
                config,
                connection: RwLock::new(ProbeOutcome {
                    quality: ConnectionQuality::Unknown,
                    latency: None,
                    degraded: false,
                }),
                events,
                in_flight: Mutex::new(None),
            }),
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.inner.store
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Subscribe to session events. Dropping the receiver ends the subscription.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    pub async fn connection(&self) -> ProbeOutcome {
        self.inner.connection.read().await.clone()
    }

    pub async fn current_policy(&self) -> RefreshPolicy {
        let quality = self.inner.connection.read().await.quality;
        self.inner.config.policies.for_quality(quality)
    }

    pub async fn probe_connectivity(&self) -> ProbeOutcome {
        let current = self.inner.store.current().await;
        let outcome = self.inner.prober.probe(current.as_ref()).await;

        let previous = {
            let mut connection = self.inner.connection.write().await;
            std::mem::replace(&mut *connection, outcome.clone())
        };

        if previous.quality != outcome.quality {
            self.emit(SessionEvent::QualityChanged(outcome.quality));
        }

        outcome
    }

    pub async fn sign_in(&self, session: Session) {
        self.inner.store.set(session).await;
        self.inner.store.resume().await;
        info!("signed in");
        self.emit(SessionEvent::SignedIn);
    }

    /// Drop the session locally. Provider-side logout is best effort.
    pub async fn sign_out(&self) {
        if let Some(session) = self.inner.store.clear().await {
            if let Err(e) = self.inner.provider.sign_out(&session).await {
                warn!(error = %e, "provider sign-out failed, session dropped locally");
            }
        }
        self.emit(SessionEvent::SignedOut);
    }

    /// Leave the halted state and re-probe connectivity.
    pub async fn reset(&self) -> ProbeOutcome {
        self.inner.store.resume().await;
        info!("session refresh reset");
        self.probe_connectivity().await
    }

    /// Return a session that is valid and not about to expire, refreshing it
    /// first when it is inside the refresh margin.
    ///
    /// A failed refresh is tolerated as long as the current token is still
    /// valid. The same goes for a halted store: no refresh is attempted, but
    /// the current token is handed out until it expires.
    pub async fn ensure_valid_session(&self) -> Result<Session> {
        let store = &self.inner.store;
        if store.is_halted().await {
            let failures = store.consecutive_failures().await;
            return match store.current().await {
                Some(current) if current.is_valid_at(Utc::now()) => {
                    warn!(failures, "refresh halted, continuing with current token");
                    Ok(current)
                }
                _ => Err(SessionError::Halted(failures)),
            };
        }

        let current = store.current().await.ok_or(SessionError::NoSession)?;
        let policy = self.current_policy().await;
        if !current.expires_within(policy.refresh_margin, Utc::now()) {
            return Ok(current);
        }

        match self.refresh_shared().await {
            Ok(session) => Ok(session),
            Err(e) if current.is_valid_at(Utc::now()) && store.current().await.is_some() => {
                warn!(error = %e, "refresh failed, continuing with current token");
                Ok(current)
            }
            Err(e) => Err(e),
        }
    }

    /// Refresh regardless of the remaining lifetime.
    pub async fn refresh_now(&self) -> Result<Session> {
        self.refresh_shared().await
    }

    /// Refresh when the token is inside the current policy's margin.
    /// Returns whether a refresh happened.
    pub async fn refresh_if_due(&self) -> Result<bool> {
        let store = &self.inner.store;
        if store.is_halted().await {
            return Err(SessionError::Halted(store.consecutive_failures().await));
        }

        let Some(remaining) = store.time_to_expiry().await else {
            return Ok(false);
        };

        let policy = self.current_policy().await;
        if remaining >= policy.refresh_margin {
            return Ok(false);
        }

        debug!(
            remaining_secs = remaining.as_secs(),
            margin_secs = policy.refresh_margin.as_secs(),
            "token inside refresh margin"
        );
        self.refresh_shared().await.map(|_| true)
    }

    /// One-shot check after the client regains focus.
    pub async fn verify(&self) -> Result<Option<Session>> {
        let store = &self.inner.store;
        let Some(current) = store.current().await else {
            return Ok(None);
        };

        let policy = self.current_policy().await;
        let checked = tokio::time::timeout(
            policy.attempt_timeout,
            self.inner.provider.get_session(Some(&current)),
        )
        .await
        .map_err(|_| SessionError::NetworkTimeout(policy.attempt_timeout))?;

        match checked {
            Ok(Some(session)) => {
                store.update(session.clone()).await;
                if session.expires_within(policy.refresh_margin, Utc::now()) {
                    if let Ok(refreshed) = self.refresh_shared().await {
                        return Ok(Some(refreshed));
                    }
                }
                self.emit(SessionEvent::Verified {
                    expires_at: session.expires_at,
                });
                Ok(Some(session))
            }
            Ok(None) => match self.refresh_shared().await {
                Ok(refreshed) => {
                    self.emit(SessionEvent::Verified {
                        expires_at: refreshed.expires_at,
                    });
                    Ok(Some(refreshed))
                }
                Err(e @ (SessionError::AuthExpired | SessionError::NoSession)) => {
                    warn!(error = %e, "token rejected and could not be refreshed");
                    if store.clear().await.is_some() {
                        self.emit(SessionEvent::Expired);
                    }
                    Err(SessionError::AuthExpired)
                }
                // The refresh token may still be good; keep it for the next try.
                Err(e) => {
                    warn!(error = %e, "token rejected, refresh failed transiently");
                    Err(e)
                }
            },
            Err(e) => {
                warn!(error = %e, "session verification failed");
                Err(e)
            }
        }
    }

    /// Run `op` with a valid session, reporting progress through toasts.
    ///
    /// Session failures are always toasted since the user has to act on them.
    /// Errors from `op` are returned untouched.
    pub async fn execute_with_valid_session<T, E, F, Fut>(
        &self,
        toasts: &ToastOptions,
        op: F,
    ) -> std::result::Result<T, E>
    where
        F: FnOnce(Session) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<SessionError> + Display,
    {
        if let Some(message) = &toasts.loading {
            self.toast(ToastLevel::Loading, message.clone());
        }

        if self.inner.connection.read().await.degraded {
            warn!("running operation on a degraded connection");
            self.toast(ToastLevel::Warning, DEGRADED_WARNING.to_string());
        }

        let session = match self.ensure_valid_session().await {
            Ok(session) => session,
            Err(e) => {
                self.toast(ToastLevel::Error, e.to_string());
                return Err(e.into());
            }
        };

        if self.inner.store.is_halted().await {
            self.toast(ToastLevel::Warning, HALTED_WARNING.to_string());
        }

        match op(session).await {
            Ok(value) => {
                if let Some(message) = &toasts.success {
                    self.toast(ToastLevel::Success, message.clone());
                }
                Ok(value)
            }
            Err(e) => {
                if let Some(message) = &toasts.error {
                    self.toast(ToastLevel::Error, format!("{message}: {e}"));
                }
                Err(e)
            }
        }
    }

    fn toast(&self, level: ToastLevel, message: String) {
        self.inner.notifier.notify(Toast { level, message });
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }

    /// Join the refresh in flight, or start one. At most one provider
    /// refresh runs at a time.
    async fn refresh_shared(&self) -> Result<Session> {
        let refresh = {
            let mut slot = self.inner.in_flight.lock().await;
            match slot.as_ref() {
                Some(existing) => existing.clone(),
                None => {
                    let this = self.clone();
                    let refresh = async move {
                        let result = this.refresh_with_retries().await;
                        this.inner.in_flight.lock().await.take();
                        result
                    }
                    .boxed()
                    .shared();
                    *slot = Some(refresh.clone());
                    refresh
                }
            }
        };

        refresh.await
    }

    async fn refresh_with_retries(&self) -> Result<Session> {
        let store = &self.inner.store;
        if store.is_halted().await {
            return Err(SessionError::Halted(store.consecutive_failures().await));
        }

        let current = store.current().await.ok_or(SessionError::NoSession)?;
        let policy = self.current_policy().await;
        let retry = RetryPolicy::fixed(
            self.inner.config.refresh_attempts,
            self.inner.config.refresh_retry_delay,
            policy.attempt_timeout,
        );

        let provider = &self.inner.provider;
        let refresh_token = current.refresh_token.as_str();
        let result = retry_with_timeout(&retry, "refresh_session", move || {
            provider.refresh_session(refresh_token)
        })
        .await;

        match result {
            Ok(session) => {
                store.set(session.clone()).await;
                store.record_success().await;
                info!(expires_at = %session.expires_at, "session refreshed");
                self.emit(SessionEvent::Refreshed {
                    expires_at: session.expires_at,
                });
                Ok(session)
            }
            Err(e) => {
                let failures = store.record_failure().await;
                error!(error = %e, failures, "session refresh failed");

                if e == SessionError::AuthExpired {
                    store.clear().await;
                    self.emit(SessionEvent::Expired);
                }

                if failures >= self.inner.config.max_consecutive_failures {
                    store.halt().await;
                    warn!(failures, "automatic session refresh halted");
                    self.emit(SessionEvent::Halted {
                        consecutive_failures: failures,
                    });
                }

                Err(e)
            }
        }
    }
}
