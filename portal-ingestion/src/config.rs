use serde::Deserialize;
use std::{fs, path::PathBuf, time::Duration};

use meter_client::domain::TariffRates;
use time::UtcOffset;

use crate::backfill::BackfillSettings;

fn default_base_url() -> String {
    "https://www.amr.pea.co.th/AMRWEB/".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_utc_offset_hours() -> i8 {
    7
}

fn default_max_days() -> u32 {
    3650
}

fn default_request_delay_ms() -> u64 {
    2000
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortalConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Offset of the portal's local time, used to decide what "today" is.
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i8,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            utc_offset_hours: default_utc_offset_hours(),
        }
    }
}

impl PortalConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn utc_offset(&self) -> anyhow::Result<UtcOffset> {
        UtcOffset::from_hms(self.utc_offset_hours, 0, 0)
            .map_err(|e| anyhow::anyhow!("invalid portal.utc_offset_hours: {e}"))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackfillConfig {
    /// Safety limit on how far back a run may walk.
    #[serde(default = "default_max_days")]
    pub max_days: u32,
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            max_days: default_max_days(),
            request_delay_ms: default_request_delay_ms(),
        }
    }
}

impl BackfillConfig {
    pub fn settings(&self) -> BackfillSettings {
        BackfillSettings {
            max_days: self.max_days,
            request_delay: Duration::from_millis(self.request_delay_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub portal: PortalConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub backfill: BackfillConfig,
    #[serde(default)]
    pub tariff: TariffRates,
    pub metrics: Option<MetricsConfig>,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("PORTAL_CONFIG").unwrap_or_else(|_| "portal-config.toml".to_string());
        let contents = fs::read_to_string(&path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        Ok(cfg)
    }
}

/// Portal login, taken from the environment rather than the config file.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn from_env() -> anyhow::Result<Self> {
        use std::env;

        let username = env::var("PORTAL_USERNAME").map_err(|_| anyhow::anyhow!("PORTAL_USERNAME is not set"))?;
        let password = env::var("PORTAL_PASSWORD").map_err(|_| anyhow::anyhow!("PORTAL_PASSWORD is not set"))?;
        Ok(Self { username, password })
    }
}
