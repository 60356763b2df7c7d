use std::{
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use config::ConfigError;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_with::{serde_as, DurationMilliSeconds, DurationSeconds};
use strum::{Display, EnumString};

use crate::domain::{retry::RetryPolicy, session::SessionConfig};

#[derive(Deserialize, Clone, Debug)]
pub struct Settings {
    pub auth: AuthSettings,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub invoice: InvoiceSettings,
}

#[derive(Deserialize, Clone, Debug)]
pub struct AuthSettings {
    /// Project URL, e.g. `https://xyzcompany.supabase.co`.
    pub url: String,
    pub anon_key: String,
}

#[serde_as]
#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct InvoiceSettings {
    /// Largest difference between two amounts still considered equal.
    #[serde_as(as = "serde_with::DisplayFromStr")]
    pub tolerance: Decimal,
    pub data_dir: PathBuf,
    pub load_attempts: u32,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub load_timeout: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub load_retry_delay: Duration,
}

impl Default for InvoiceSettings {
    fn default() -> Self {
        Self {
            tolerance: Decimal::new(1, 2),
            data_dir: PathBuf::from("data"),
            load_attempts: 3,
            load_timeout: Duration::from_secs(15),
            load_retry_delay: Duration::from_millis(1_000),
        }
    }
}

impl InvoiceSettings {
    pub fn load_retry(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.load_attempts, self.load_retry_delay, self.load_timeout)
    }
}

/// Read `config/base.yaml`, then `config/{APP_ENVIRONMENT}.yaml`, then
/// `BODYSHOP_*` environment variables, from the current directory.
pub fn read_config() -> Result<Settings, ConfigError> {
    let base_path = std::env::current_dir()
        .map_err(|e| ConfigError::Message(format!("failed to determine the current directory: {e}")))?;

    let environment = Environment::from_str(
        std::env::var("APP_ENVIRONMENT")
            .unwrap_or_else(|_| "local".into())
            .as_str(),
    )
    .map_err(|e| ConfigError::Message(format!("failed to parse APP_ENVIRONMENT: {e}")))?;

    read_config_from(&base_path.join("config"), environment)
}

pub fn read_config_from(config_directory: &Path, environment: Environment) -> Result<Settings, ConfigError> {
    let environment_filename = format!("{}.yaml", environment);

    let settings = config::Config::builder()
        .add_source(config::File::from(config_directory.join("base.yaml")))
        .add_source(config::File::from(config_directory.join(environment_filename)).required(false))
        .add_source(
            config::Environment::with_prefix("BODYSHOP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    let settings = settings.try_deserialize::<Settings>()?;
    settings
        .session
        .policies
        .validate()
        .map_err(|e| ConfigError::Message(e.to_string()))?;

    Ok(settings)
}

#[derive(Display, Debug, Clone, Copy, PartialEq, Eq, EnumString)]
pub enum Environment {
    #[strum(ascii_case_insensitive, serialize = "local")]
    Local,
    #[strum(ascii_case_insensitive, serialize = "production")]
    Production,
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::domain::session::ConnectionQuality;

    fn config_dir() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("config")
    }

    #[test]
    fn local_config_reads_every_section() {
        let settings = read_config_from(&config_dir(), Environment::Local).unwrap();

        assert_eq!(settings.invoice.tolerance, dec!(0.01));
        assert_eq!(
            settings.session.probe_timeouts,
            vec![
                Duration::from_secs(5),
                Duration::from_secs(15),
                Duration::from_secs(30),
            ]
        );
        assert_eq!(
            settings
                .session
                .policies
                .for_quality(ConnectionQuality::Poor)
                .refresh_margin,
            Duration::from_secs(1_200)
        );
    }

    #[test]
    fn production_overrides_base() {
        let local = read_config_from(&config_dir(), Environment::Local).unwrap();
        let production = read_config_from(&config_dir(), Environment::Production).unwrap();

        assert!(production.session.max_consecutive_failures > local.session.max_consecutive_failures);
    }

    #[test]
    fn environment_parses_case_insensitively() {
        assert_eq!(Environment::from_str("PRODUCTION").unwrap(), Environment::Production);
        assert_eq!(Environment::Local.to_string(), "local");
        assert!(Environment::from_str("staging").is_err());
    }

    #[test]
    fn invoice_defaults_build_a_retry_policy() {
        let settings = InvoiceSettings::default();
        assert_eq!(settings.load_retry().attempts(), 3);
        assert_eq!(settings.tolerance, dec!(0.01));
    }
}
