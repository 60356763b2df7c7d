//! Trait definitions for the session domain.

use std::time::Duration;

use async_trait::async_trait;

use super::types::Session;
use crate::domain::retry::Retryable;

/// Error type for session operations.
///
/// Cloneable so that every caller awaiting a shared refresh receives the
/// same outcome.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error("network timeout after {0:?}")]
    NetworkTimeout(Duration),

    #[error("session expired, please sign in again")]
    AuthExpired,

    #[error("no active session")]
    NoSession,

    #[error("session refresh halted after {0} consecutive failures")]
    Halted(u32),

    #[error("auth provider error: {0}")]
    Provider(String),
}

impl Retryable for SessionError {
    fn timed_out(after: Duration) -> Self {
        SessionError::NetworkTimeout(after)
    }

    fn is_retryable(&self) -> bool {
        matches!(
            self,
            SessionError::NetworkTimeout(_) | SessionError::AuthExpired | SessionError::Provider(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// The hosted auth provider, treated as an opaque collaborator.
#[async_trait]
pub trait AuthProvider: Send + Sync + 'static {
    /// Ask the provider about the given session.
    ///
    /// With `None` this only checks that the provider is reachable and always
    /// yields `Ok(None)`. With a session it returns the session as the provider
    /// sees it, or `None` when the access token is no longer accepted.
    async fn get_session(&self, current: Option<&Session>) -> Result<Option<Session>>;

    /// Exchange a refresh token for a new session.
    async fn refresh_session(&self, refresh_token: &str) -> Result<Session>;

    /// Invalidate the session on the provider side.
    async fn sign_out(&self, _session: &Session) -> Result<()> {
        Ok(())
    }
}
