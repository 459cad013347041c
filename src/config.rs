use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{ClockError, Result};

pub const DEFAULT_CHANNEL: &str = "dooms_deal_clock";
pub const MAX_FETCH_LIMIT: usize = 100;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub username: String,
    pub base_url: Option<String>,
    pub token: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            username: DEFAULT_CHANNEL.to_string(),
            base_url: None,
            token: None,
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub channel: ChannelConfig,
    pub fetch_limit: usize,
    pub update_interval_seconds: u64,
    pub auto_fetch: bool,
    pub retry_delay_seconds: u64,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            database_path: "./data/clock_data.db".to_string(),
            channel: ChannelConfig::default(),
            fetch_limit: 5,
            update_interval_seconds: 300,
            auto_fetch: false,
            retry_delay_seconds: 60,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content =
            fs::read_to_string(path.as_ref()).map_err(|e| ClockError::Config(e.to_string()))?;
        let config: Config =
            serde_json::from_str(&content).map_err(|e| ClockError::Serialization(e.to_string()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(ClockError::Config("port must be non-zero".to_string()));
        }
        if self.channel.username.trim().is_empty() {
            return Err(ClockError::Config("channel username is empty".to_string()));
        }
        if self.fetch_limit == 0 || self.fetch_limit > MAX_FETCH_LIMIT {
            return Err(ClockError::Config(format!(
                "fetch_limit must be between 1 and {MAX_FETCH_LIMIT}"
            )));
        }
        Ok(())
    }

    pub fn polling_enabled(&self) -> bool {
        self.auto_fetch && self.update_interval_seconds > 0
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_seconds.max(1))
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_seconds.max(1))
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
