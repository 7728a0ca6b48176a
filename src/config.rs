use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_allowed_hosts")]
    pub allowed_hosts: Vec<String>,

    #[serde(default = "default_allowed_ips")]
    pub allowed_ips: Vec<String>,

    pub openrouter_api_key: Option<String>,

    #[serde(default = "default_summary_model")]
    pub summary_model: String,

    #[serde(default = "default_summary_api_url")]
    pub summary_api_url: String,

    #[serde(default = "default_rate_limit_interval")]
    pub rate_limit_interval_secs: u64,

    #[serde(default = "default_extraction_timeout")]
    pub extraction_timeout_secs: u64,

    #[serde(default = "default_summarization_timeout")]
    pub summarization_timeout_secs: u64,

    #[serde(default = "default_latest_limit")]
    pub latest_limit: usize,

    #[serde(default = "default_coalesce")]
    pub coalesce_requests: bool,
}

fn default_db_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("article-digest");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("cache.db").to_string_lossy().to_string()
}

fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_allowed_hosts() -> Vec<String> {
    vec!["localhost".to_string(), "127.0.0.1".to_string()]
}

fn default_allowed_ips() -> Vec<String> {
    vec!["127.0.0.1/32".to_string()]
}

fn default_summary_model() -> String {
    "amazon/nova-micro-v1".to_string()
}

fn default_summary_api_url() -> String {
    "https://openrouter.ai/api/v1/chat/completions".to_string()
}

fn default_rate_limit_interval() -> u64 {
    2
}

fn default_extraction_timeout() -> u64 {
    10
}

fn default_summarization_timeout() -> u64 {
    60
}

fn default_latest_limit() -> usize {
    5
}

fn default_coalesce() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            bind_addr: default_bind_addr(),
            allowed_hosts: default_allowed_hosts(),
            allowed_ips: default_allowed_ips(),
            openrouter_api_key: None,
            summary_model: default_summary_model(),
            summary_api_url: default_summary_api_url(),
            rate_limit_interval_secs: default_rate_limit_interval(),
            extraction_timeout_secs: default_extraction_timeout(),
            summarization_timeout_secs: default_summarization_timeout(),
            latest_limit: default_latest_limit(),
            coalesce_requests: default_coalesce(),
        }
    }
}

impl Config {
    /// Load the config file (creating it with defaults if missing), then apply
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str::<Config>(&content)?
        } else {
            let config = Config::default();
            config.save()?;
            config
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the services cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.rate_limit_interval_secs == 0 {
            return Err(AppError::Config(
                "rate_limit_interval_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("article-digest")
            .join("config.toml")
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("ARTICLE_DIGEST_DB") {
            self.db_path = path;
        }
        if let Some(addr) = lookup("ARTICLE_DIGEST_BIND") {
            self.bind_addr = addr;
        }
        if let Some(hosts) = lookup("ALLOWED_HOSTS") {
            self.allowed_hosts = split_list(&hosts);
        }
        if let Some(ips) = lookup("ALLOWED_IPS") {
            self.allowed_ips = split_list(&ips);
        }
        if let Some(key) = lookup("OPENROUTER_API_KEY").filter(|k| !k.is_empty()) {
            self.openrouter_api_key = Some(key);
        }
        if let Some(model) = lookup("SUMMARY_MODEL") {
            self.summary_model = model;
        }
    }

    pub fn rate_limit_interval(&self) -> Duration {
        Duration::from_secs(self.rate_limit_interval_secs)
    }

    pub fn extraction_timeout(&self) -> Duration {
        Duration::from_secs(self.extraction_timeout_secs)
    }

    pub fn summarization_timeout(&self) -> Duration {
        Duration::from_secs(self.summarization_timeout_secs)
    }
}

/// Split a comma-separated setting, trimming entries and dropping empty ones.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
