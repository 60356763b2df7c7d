use async_trait::async_trait;
use chrono::Utc;
use supabase_auth::{AuthSession, SupabaseClient, SupabaseFetchError};

use crate::domain::session::{
    traits::{AuthProvider, Result, SessionError},
    types::Session,
};

/// Adapter that wraps the Supabase client to implement the [`AuthProvider`] port.
#[derive(Clone)]
pub struct SupabaseAuthProvider {
    client: SupabaseClient,
}

impl SupabaseAuthProvider {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }

    /// Password sign-in. Not part of the port because only the CLI login
    /// flow needs it.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let session = self
            .client
            .sign_in_with_password(email, password)
            .await
            .map_err(map_supabase_error)?;
        to_domain_session(session)
    }
}

#[async_trait]
impl AuthProvider for SupabaseAuthProvider {
    async fn get_session(&self, current: Option<&Session>) -> Result<Option<Session>> {
        let Some(current) = current else {
            self.client.health().await.map_err(map_supabase_error)?;
            return Ok(None);
        };

        match self.client.get_user(&current.access_token).await {
            Ok(user) => Ok(Some(Session {
                user: user.into(),
                ..current.clone()
            })),
            Err(SupabaseFetchError::Unauthorized) => Ok(None),
            Err(e) => Err(map_supabase_error(e)),
        }
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session> {
        let session = self
            .client
            .refresh_session(refresh_token)
            .await
            .map_err(map_supabase_error)?;
        to_domain_session(session)
    }

    async fn sign_out(&self, session: &Session) -> Result<()> {
        self.client
            .sign_out(&session.access_token)
            .await
            .map_err(map_supabase_error)
    }
}

fn to_domain_session(session: AuthSession) -> Result<Session> {
    let expires_at = session
        .expiry(Utc::now())
        .map_err(|e| SessionError::Provider(format!("unreadable token expiry: {e}")))?;

    Ok(Session {
        access_token: session.access_token,
        refresh_token: session.refresh_token,
        expires_at,
        user: session.user.into(),
    })
}

fn map_supabase_error(e: SupabaseFetchError) -> SessionError {
    match e {
        SupabaseFetchError::Unauthorized => SessionError::AuthExpired,
        SupabaseFetchError::Timeout => SessionError::NetworkTimeout(std::time::Duration::ZERO),
        other => SessionError::Provider(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use supabase_auth::AuthUser;

    use super::*;

    #[test]
    fn converts_gotrue_session() {
        let session = AuthSession {
            access_token: "a.b.c".to_string(),
            refresh_token: "r".to_string(),
            token_type: "bearer".to_string(),
            expires_in: Some(3600),
            expires_at: Some(1_900_000_000),
            user: AuthUser {
                id: "u1".to_string(),
                email: Some("shop@example.com".to_string()),
                role: Some("authenticated".to_string()),
            },
        };

        let domain = to_domain_session(session).unwrap();
        assert_eq!(domain.expires_at.timestamp(), 1_900_000_000);
        assert_eq!(domain.user.id, "u1");
        assert_eq!(domain.refresh_token, "r");
    }

    #[test]
    fn unauthorized_maps_to_auth_expired() {
        assert_eq!(
            map_supabase_error(SupabaseFetchError::Unauthorized),
            SessionError::AuthExpired
        );
        assert!(matches!(
            map_supabase_error(SupabaseFetchError::ParsingError("x".into())),
            SessionError::Provider(_)
        ));
    }
}
