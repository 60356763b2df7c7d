use anyhow::{Context, Result};
use bodyshop_core::{
    config::{read_config_from, AuthSettings, Environment, InvoiceSettings},
    domain::session::SessionConfig,
    Settings,
};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, str::FromStr};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BodyshopConfig {
    /// Supabase project URL, e.g. "https://xyzcompany.supabase.co"
    #[serde(default)]
    pub supabase_url: Option<String>,
    #[serde(default)]
    pub anon_key: Option<String>,
    /// Directory with base.yaml and per-environment overrides. Session and
    /// invoice tuning are read from there when set.
    #[serde(default)]
    pub core_config_dir: Option<PathBuf>,
    /// Where invoices and reports are stored. Overrides the core config.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

impl BodyshopConfig {
    pub fn root_path() -> Result<PathBuf> {
        Ok(dirs::config_dir()
            .context("Cannot determine config directory")?
            .join("bodyshop"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::root_path()?.join("config.toml"))
    }

    /// Load config from disk. Returns default config if file doesn't exist.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config at {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("Failed to parse config at {}", path.display()))
    }

    fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = toml::to_string_pretty(self)?;
        std::fs::write(&path, raw)?;
        Ok(())
    }

    /// Core settings with this file and `SUPABASE_URL` / `SUPABASE_ANON_KEY`
    /// layered on top.
    pub fn settings(&self) -> Result<Settings> {
        let mut settings = match &self.core_config_dir {
            Some(dir) => {
                let environment = Environment::from_str(
                    std::env::var("APP_ENVIRONMENT")
                        .unwrap_or_else(|_| "local".into())
                        .as_str(),
                )
                .context("Failed to parse APP_ENVIRONMENT")?;
                read_config_from(dir, environment)
                    .with_context(|| format!("Failed to read core config in {}", dir.display()))?
            }
            None => Settings {
                auth: AuthSettings {
                    url: String::new(),
                    anon_key: String::new(),
                },
                session: SessionConfig::default(),
                invoice: InvoiceSettings::default(),
            },
        };

        if let Some(url) = std::env::var("SUPABASE_URL").ok().or_else(|| self.supabase_url.clone()) {
            settings.auth.url = url;
        }
        if let Some(key) = std::env::var("SUPABASE_ANON_KEY").ok().or_else(|| self.anon_key.clone()) {
            settings.auth.anon_key = key;
        }
        if let Some(dir) = &self.data_dir {
            settings.invoice.data_dir = dir.clone();
        }

        Ok(settings)
    }
}
