use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::types::{Session, SessionStatus};

#[derive(Debug, Default)]
struct StoreState {
    session: Option<Session>,
    consecutive_failures: u32,
    halted: bool,
    last_refreshed: Option<DateTime<Utc>>,
}

/// Holds the current session and the refresh bookkeeping around it.
///
/// Cheap to clone; clones share state.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    state: Arc<RwLock<StoreState>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: Session) -> Self {
        Self {
            state: Arc::new(RwLock::new(StoreState {
                session: Some(session),
                ..StoreState::default()
            })),
        }
    }

    pub async fn current(&self) -> Option<Session> {
        self.state.read().await.session.clone()
    }

    pub async fn is_valid(&self) -> bool {
        let now = Utc::now();
        self.state
            .read()
            .await
            .session
            .as_ref()
            .is_some_and(|s| s.is_valid_at(now))
    }

    pub async fn time_to_expiry(&self) -> Option<Duration> {
        let now = Utc::now();
        self.state
            .read()
            .await
            .session
            .as_ref()
            .map(|s| s.time_to_expiry(now))
    }

    /// Replace the session after a sign-in or a successful refresh.
    pub async fn set(&self, session: Session) {
        let mut state = self.state.write().await;
        state.session = Some(session);
        state.last_refreshed = Some(Utc::now());
    }

    /// Update the held session without counting it as a refresh.
    pub(crate) async fn update(&self, session: Session) {
        self.state.write().await.session = Some(session);
    }

    /// Drop the session. Failure bookkeeping is kept.
    pub async fn clear(&self) -> Option<Session> {
        self.state.write().await.session.take()
    }

    /// Count a failed refresh and return the number of failures in a row.
    pub async fn record_failure(&self) -> u32 {
        let mut state = self.state.write().await;
        state.consecutive_failures += 1;
        state.consecutive_failures
    }

    pub async fn record_success(&self) {
        self.state.write().await.consecutive_failures = 0;
    }

    pub async fn consecutive_failures(&self) -> u32 {
        self.state.read().await.consecutive_failures
    }

    pub async fn halt(&self) {
        self.state.write().await.halted = true;
    }

    pub async fn is_halted(&self) -> bool {
        self.state.read().await.halted
    }

    /// Leave the error state and forget past failures.
    pub async fn resume(&self) {
        let mut state = self.state.write().await;
        state.halted = false;
        state.consecutive_failures = 0;
    }

    pub async fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        self.state.read().await.last_refreshed
    }

    pub async fn status(&self) -> SessionStatus {
        let state = self.state.read().await;
        if state.halted {
            return SessionStatus::Halted;
        }
        match &state.session {
            None => SessionStatus::SignedOut,
            Some(s) if s.is_valid_at(Utc::now()) => SessionStatus::Active,
            Some(_) => SessionStatus::Expired,
        }
    }
}
