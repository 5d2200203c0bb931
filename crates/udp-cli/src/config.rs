//! TOML configuration file schema and parsing.
//!
//! Example config file:
//!
//! ```toml
//! [server]
//! listen = "0.0.0.0:8080"
//! log_format = "json"
//!
//! [check]
//! timeout_ms = 10000
//! retry_attempts = 2
//! retry_delay_ms = 2000
//! require_data = true
//! interval_ms = 60000
//!
//! [telegram]
//! bot_token = "123456:ABC-DEF"
//! chat_id = "-1001234567890"
//!
//! [[webhook]]
//! url = "https://hooks.example.com/udp-alerts"
//! secret = "shared-key"
//!
//! [[stream]]
//! name = "news-hd"
//! url = "udp://@239.1.1.1:1234"
//!
//! [[stream]]
//! url = "udp://239.1.1.2:1234"
//! ```
//!
//! Stream URLs are deliberately not validated here: an unparseable URL is
//! reported as a DOWN stream by the checker instead of aborting startup.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use udp_core::{AlertTargets, CheckConfig, StreamConfig, TelegramConfig, WebhookConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub check: CheckSection,

    #[serde(default)]
    pub telegram: Option<TelegramConfig>,

    #[serde(default)]
    pub webhook: Vec<WebhookConfig>,

    #[serde(default)]
    pub stream: Vec<StreamDef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Status API address; the API is disabled when unset.
    #[serde(default)]
    pub listen: Option<SocketAddr>,

    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: None,
            log_format: default_log_format(),
        }
    }
}

fn default_log_format() -> String {
    "pretty".into()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckSection {
    pub timeout_ms: Option<u64>,
    pub retry_attempts: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub require_data: Option<bool>,
    pub interval_ms: Option<u64>,
    pub max_concurrent: Option<usize>,
}

impl CheckSection {
    pub fn to_check_config(&self) -> CheckConfig {
        let mut c = CheckConfig::default();
        if let Some(v) = self.timeout_ms {
            c = c.with_timeout(v);
        }
        if let Some(v) = self.retry_attempts {
            c = c.with_retry_attempts(v);
        }
        if let Some(v) = self.retry_delay_ms {
            c = c.with_retry_delay(v);
        }
        if let Some(v) = self.require_data {
            c = c.with_require_data(v);
        }
        if let Some(v) = self.interval_ms {
            c = c.with_check_interval(v);
        }
        if let Some(v) = self.max_concurrent {
            c = c.with_max_concurrent_checks(v);
        }
        c
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamDef {
    pub name: Option<String>,
    pub url: String,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: AppConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        config.validate()?;
        Ok(config)
    }

    pub fn to_stream_configs(&self) -> Vec<StreamConfig> {
        self.stream
            .iter()
            .enumerate()
            .map(|(i, s)| StreamConfig {
                name: s.name.clone().unwrap_or_else(|| format!("stream_{}", i + 1)),
                url: s.url.clone(),
            })
            .collect()
    }

    pub fn alert_targets(&self) -> AlertTargets {
        AlertTargets {
            telegram: self.telegram.clone(),
            webhooks: self.webhook.clone(),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.stream.is_empty() {
            return invalid("no streams configured".into());
        }

        let mut names = HashSet::new();
        for (i, s) in self.to_stream_configs().iter().enumerate() {
            if s.url.trim().is_empty() {
                return invalid(format!("stream '{}' at index {} has an empty url", s.name, i));
            }
            if !names.insert(s.name.clone()) {
                return invalid(format!("duplicate stream name: {}", s.name));
            }
        }

        for (i, wh) in self.webhook.iter().enumerate() {
            if let Err(e) = url::Url::parse(&wh.url) {
                return invalid(format!("invalid webhook URL at index {}: {} ({})", i, wh.url, e));
            }
        }

        if let Some(tg) = &self.telegram {
            if tg.bot_token.trim().is_empty() || tg.chat_id.trim().is_empty() {
                return invalid("telegram bot_token and chat_id must not be empty".into());
            }
        }

        match self.server.log_format.as_str() {
            "pretty" | "json" => {}
            other => {
                return invalid(format!(
                    "log_format '{}' must be 'pretty' or 'json'",
                    other
                ));
            }
        }

        Ok(())
    }
}
