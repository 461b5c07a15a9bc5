use anyhow::Result;
use serde::Deserialize;
use std::str::FromStr;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub general: General,
    pub provider: Provider,
    pub datasets: Datasets,
    pub refresh: Refresh,
    pub rankings: Rankings,
    pub analytics: Analytics,
    pub observability: Observability,
}

#[derive(Debug, Deserialize)]
pub struct General {
    pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Provider {
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
}

/// Saved-query identifiers served by the provider. The engine treats these as
/// opaque; which warehouse query sits behind each id is external configuration.
#[derive(Debug, Deserialize)]
pub struct Datasets {
    pub balances: String,
    pub prices: String,
}

#[derive(Debug, Deserialize)]
pub struct Refresh {
    pub interval_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct Rankings {
    pub top_k: usize,
}

#[derive(Debug, Deserialize)]
pub struct Analytics {
    pub focus_denom: String,
}

#[derive(Debug, Deserialize)]
pub struct Observability {
    pub prometheus_port: u16,
}

impl Config {
    pub fn load() -> Result<Self> {
        let content = std::fs::read_to_string("config/default.toml")?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }
}

impl FromStr for Config {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_toml_str(s)
    }
}
