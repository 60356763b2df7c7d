use std::env;

use reqwest::{RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

use crate::SupabaseURL;

use super::{AuthSession, AuthUser};

const API_KEY_HEADER: &str = "apikey";

/// Client for the GoTrue auth endpoints of a Supabase project.
#[derive(Debug, Clone)]
pub struct SupabaseClient {
    http: reqwest::Client,
    base_url: SupabaseURL,
    anon_key: String,
}

#[derive(Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshGrant<'a> {
    refresh_token: &'a str,
}

/// Error body returned by GoTrue. Older versions use `error`/`error_description`,
/// newer ones `code`/`msg`.
#[derive(Debug, Default, Deserialize)]
struct GoTrueErrorBody {
    error: Option<String>,
    error_description: Option<String>,
    msg: Option<String>,
    message: Option<String>,
}

impl GoTrueErrorBody {
    fn describe(self) -> Option<String> {
        self.error_description
            .or(self.msg)
            .or(self.message)
            .or(self.error)
    }
}

impl SupabaseClient {
    pub fn new(base_url: &str, anon_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: SupabaseURL::new(base_url),
            anon_key: anon_key.into(),
        }
    }

    /// Builds a client from `SUPABASE_URL` and `SUPABASE_ANON_KEY`.
    pub fn from_env() -> Result<Self, SupabaseFetchError> {
        let base_url = SupabaseURL::from_env()
            .ok_or_else(|| SupabaseFetchError::Other("SUPABASE_URL must be set".to_string()))?;
        let anon_key = env::var("SUPABASE_ANON_KEY")
            .map_err(|_| SupabaseFetchError::Other("SUPABASE_ANON_KEY must be set".to_string()))?;

        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            anon_key,
        })
    }

    fn auth_url(&self, path: &str) -> SupabaseURL {
        self.base_url.append_path("/auth/v1").append_path(path)
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, SupabaseFetchError> {
        let resp = request
            .header(API_KEY_HEADER, &self.anon_key)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp
            .json::<GoTrueErrorBody>()
            .await
            .unwrap_or_default()
            .describe();

        tracing::debug!(%status, ?body, "GoTrue request failed");

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(SupabaseFetchError::Unauthorized),
            // GoTrue answers an invalid or reused refresh token with 400 invalid_grant.
            StatusCode::BAD_REQUEST if body.as_deref().is_some_and(is_invalid_grant) => {
                Err(SupabaseFetchError::Unauthorized)
            }
            _ => Err(SupabaseFetchError::ResponseError(format!(
                "{}: {}",
                status,
                body.unwrap_or_else(|| "no details".to_string())
            ))),
        }
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, SupabaseFetchError> {
        let resp = self.send(request).await?;

        resp.json::<T>().await.map_err(|e| {
            SupabaseFetchError::ParsingError(format!("Failed to parse response as JSON: {}", e))
        })
    }

    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, SupabaseFetchError> {
        let url = self.auth_url("token").with_grant_type("password");

        self.fetch(
            self.http
                .post(url.as_ref())
                .json(&PasswordGrant { email, password }),
        )
        .await
    }

    pub async fn refresh_session(
        &self,
        refresh_token: &str,
    ) -> Result<AuthSession, SupabaseFetchError> {
        let url = self.auth_url("token").with_grant_type("refresh_token");

        self.fetch(
            self.http
                .post(url.as_ref())
                .json(&RefreshGrant { refresh_token }),
        )
        .await
    }

    /// Fetches the user behind an access token. Cheap enough to double as a
    /// connectivity probe.
    pub async fn get_user(&self, access_token: &str) -> Result<AuthUser, SupabaseFetchError> {
        let url = self.auth_url("user");

        self.fetch(self.http.get(url.as_ref()).bearer_auth(access_token))
            .await
    }

    /// Checks that the auth service answers at all, without requiring a token.
    pub async fn health(&self) -> Result<(), SupabaseFetchError> {
        let url = self.auth_url("health");
        self.send(self.http.get(url.as_ref())).await?;
        Ok(())
    }

    pub async fn sign_out(&self, access_token: &str) -> Result<(), SupabaseFetchError> {
        let url = self.auth_url("logout");
        self.send(self.http.post(url.as_ref()).bearer_auth(access_token))
            .await?;
        Ok(())
    }
}

fn is_invalid_grant(description: &str) -> bool {
    let lowered = description.to_ascii_lowercase();
    lowered.contains("invalid_grant")
        || lowered.contains("invalid refresh token")
        || lowered.contains("refresh token not found")
        || lowered.contains("already used")
}

fn map_reqwest_error(e: reqwest::Error) -> SupabaseFetchError {
    if e.is_timeout() {
        SupabaseFetchError::Timeout
    } else {
        SupabaseFetchError::ResponseError(e.to_string())
    }
}

#[derive(Error, Debug)]
pub enum SupabaseFetchError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Timeout")]
    Timeout,
    #[error("ResponseError: {0}")]
    ResponseError(String),
    #[error("ParsingError: {0}")]
    ParsingError(String),
    #[error("Other: {0}")]
    Other(String),
}
