//! Mock auth provider for testing.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::domain::session::traits::{AuthProvider, Result, SessionError};
use crate::domain::session::types::{Session, SessionUser};

/// Mock provider with configurable latency and failures.
///
/// Clones share their counters and configuration, so a test can keep a
/// handle while the service owns another.
///
/// # Examples
///
/// ```ignore
/// let provider = MockAuthProvider::new().with_latency(Duration::from_millis(200));
/// provider.fail_next_refreshes(2, SessionError::NetworkTimeout(Duration::ZERO));
/// ```
#[derive(Clone)]
pub struct MockAuthProvider {
    latency: Duration,
    token_lifetime: chrono::Duration,
    queued_refresh_errors: Arc<Mutex<VecDeque<SessionError>>>,
    refresh_error: Arc<Mutex<Option<SessionError>>>,
    reachable: Arc<AtomicBool>,
    accepts_tokens: Arc<AtomicBool>,
    refresh_calls: Arc<AtomicUsize>,
    get_session_calls: Arc<AtomicUsize>,
    issued: Arc<AtomicUsize>,
}

impl Default for MockAuthProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAuthProvider {
    /// A reachable provider answering instantly with one-hour tokens.
    pub fn new() -> Self {
        Self {
            latency: Duration::ZERO,
            token_lifetime: chrono::Duration::hours(1),
            queued_refresh_errors: Arc::new(Mutex::new(VecDeque::new())),
            refresh_error: Arc::new(Mutex::new(None)),
            reachable: Arc::new(AtomicBool::new(true)),
            accepts_tokens: Arc::new(AtomicBool::new(true)),
            refresh_calls: Arc::new(AtomicUsize::new(0)),
            get_session_calls: Arc::new(AtomicUsize::new(0)),
            issued: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// The next `count` refreshes fail with `error`.
    pub fn fail_next_refreshes(&self, count: usize, error: SessionError) {
        let mut queue = self.queued_refresh_errors.lock().unwrap();
        queue.extend(std::iter::repeat(error).take(count));
    }

    /// Every refresh fails with `error` until cleared with `None`.
    pub fn set_refresh_error(&self, error: Option<SessionError>) {
        *self.refresh_error.lock().unwrap() = error;
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Make `get_session` report access tokens as no longer accepted.
    pub fn set_accepts_tokens(&self, accepts: bool) {
        self.accepts_tokens.store(accepts, Ordering::SeqCst);
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn get_session_calls(&self) -> usize {
        self.get_session_calls.load(Ordering::SeqCst)
    }

    /// A session as this provider would issue it.
    pub fn issue_session(&self) -> Session {
        let n = self.issued.fetch_add(1, Ordering::SeqCst);
        Session {
            access_token: format!("access-{n}"),
            refresh_token: format!("refresh-{n}"),
            expires_at: Utc::now() + self.token_lifetime,
            user: SessionUser {
                id: "mock-user".to_string(),
                email: Some("mock@example.com".to_string()),
            },
        }
    }

    async fn wait(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl AuthProvider for MockAuthProvider {
    async fn get_session(&self, current: Option<&Session>) -> Result<Option<Session>> {
        self.get_session_calls.fetch_add(1, Ordering::SeqCst);
        self.wait().await;

        if !self.reachable.load(Ordering::SeqCst) {
            return Err(SessionError::Provider("unreachable".to_string()));
        }

        match current {
            Some(s) if self.accepts_tokens.load(Ordering::SeqCst) => Ok(Some(s.clone())),
            _ => Ok(None),
        }
    }

    async fn refresh_session(&self, _refresh_token: &str) -> Result<Session> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.wait().await;

        if let Some(e) = self.queued_refresh_errors.lock().unwrap().pop_front() {
            return Err(e);
        }
        if let Some(e) = self.refresh_error.lock().unwrap().clone() {
            return Err(e);
        }

        Ok(self.issue_session())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn queued_failures_are_consumed_in_order() {
        let provider = MockAuthProvider::new();
        provider.fail_next_refreshes(1, SessionError::AuthExpired);

        assert_eq!(
            provider.refresh_session("r").await,
            Err(SessionError::AuthExpired)
        );
        assert!(provider.refresh_session("r").await.is_ok());
        assert_eq!(provider.refresh_calls(), 2);
    }

    #[tokio::test]
    async fn unreachable_provider_fails_probes() {
        let provider = MockAuthProvider::new();
        provider.set_reachable(false);

        assert!(provider.get_session(None).await.is_err());
        assert_eq!(provider.get_session_calls(), 1);
    }

    #[tokio::test]
    async fn rejected_tokens_yield_no_session() {
        let provider = MockAuthProvider::new();
        let session = provider.issue_session();

        assert_eq!(
            provider.get_session(Some(&session)).await,
            Ok(Some(session.clone()))
        );

        provider.set_accepts_tokens(false);
        assert_eq!(provider.get_session(Some(&session)).await, Ok(None));
    }
}
