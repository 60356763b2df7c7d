use std::env;

#[derive(Debug, Clone)]
pub struct SupabaseURL(String);

impl AsRef<str> for SupabaseURL {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl SupabaseURL {
    pub fn new(base: impl Into<String>) -> Self {
        Self(base.into())
    }

    /// Creates a new SupabaseURL from the environment variable `SUPABASE_URL`.
    pub fn from_env() -> Option<Self> {
        env::var("SUPABASE_URL").ok().map(Self)
    }

    /// Append the given path to the URL.
    pub fn append_path(&self, path: &str) -> Self {
        let trimmed_url = self.0.trim_end_matches('/');
        let trimmed_path = path.trim_start_matches('/');
        Self(format!("{}/{}", trimmed_url, trimmed_path))
    }

    pub fn with_grant_type(&self, grant_type: &str) -> Self {
        if self.0.contains('?') {
            Self(format!("{}&grant_type={}", self.0, grant_type))
        } else {
            Self(format!("{}?grant_type={}", self.0, grant_type))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_path_joins_with_single_slash() {
        let url = SupabaseURL::new("https://abc.supabase.co/").append_path("/auth/v1/user");
        assert_eq!(url.as_ref(), "https://abc.supabase.co/auth/v1/user");
    }

    #[test]
    fn grant_type_is_added_as_query() {
        let url = SupabaseURL::new("https://abc.supabase.co")
            .append_path("auth/v1/token")
            .with_grant_type("refresh_token");
        assert_eq!(
            url.as_ref(),
            "https://abc.supabase.co/auth/v1/token?grant_type=refresh_token"
        );
    }

    #[test]
    fn grant_type_extends_existing_query() {
        let url = SupabaseURL::new("https://abc.supabase.co/auth/v1/token?redirect=x")
            .with_grant_type("password");
        assert_eq!(
            url.as_ref(),
            "https://abc.supabase.co/auth/v1/token?redirect=x&grant_type=password"
        );
    }
}
