use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::RetryPolicy;

pub const CONFIG_ENV: &str = "CASEGEN_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub salesforce: SalesforceConfig,
    pub openai: OpenAiConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub records: RecordsConfig,
    #[serde(default)]
    pub pool: PoolConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SalesforceConfig {
    pub username: String,
    pub password: String,
    pub security_token: String,
    #[serde(default = "default_login_url")]
    pub login_url: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_body_timeout_ms")]
    pub body_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RecordsConfig {
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PoolConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_case_attempts")]
    pub case_attempts: u32,
    #[serde(default = "default_backoff_base")]
    pub backoff_base: u32,
    #[serde(default = "default_backoff_unit_ms")]
    pub backoff_unit_ms: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            timeout_ms: default_timeout_ms(),
            body_timeout_ms: default_body_timeout_ms(),
        }
    }
}

impl Default for RecordsConfig {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            case_attempts: default_case_attempts(),
            backoff_base: default_backoff_base(),
            backoff_unit_ms: default_backoff_unit_ms(),
        }
    }
}

impl GenerationConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retries, Duration::from_millis(self.retry_delay_ms))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn body_timeout(&self) -> Duration {
        Duration::from_millis(self.body_timeout_ms)
    }
}

impl RecordsConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retries, Duration::from_millis(self.retry_delay_ms))
    }
}

impl PoolConfig {
    pub fn backoff_unit(&self) -> Duration {
        Duration::from_millis(self.backoff_unit_ms)
    }
}

impl Config {
    /// Explicit path, then `CASEGEN_CONFIG`, then `./config.toml`.
    pub fn resolve_path(explicit: Option<PathBuf>) -> PathBuf {
        explicit
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let cfg: Config = toml::from_str(content).context("failed to parse config toml")?;

        let secrets = [
            ("salesforce.username", &cfg.salesforce.username),
            ("salesforce.password", &cfg.salesforce.password),
            ("salesforce.security_token", &cfg.salesforce.security_token),
            ("openai.api_key", &cfg.openai.api_key),
        ];
        for (name, value) in secrets {
            if value.trim().is_empty() {
                bail!("{name} is required");
            }
        }
        if cfg.pool.workers == 0 {
            bail!("pool.workers must be at least 1");
        }
        if cfg.generation.retries == 0 || cfg.records.retries == 0 || cfg.pool.case_attempts == 0
        {
            bail!("retry counts must be at least 1");
        }
        Ok(cfg)
    }
}

fn default_login_url() -> String {
    "https://login.salesforce.com".to_string()
}

fn default_api_version() -> String {
    "59.0".to_string()
}

fn default_api_url() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_request_timeout_secs() -> u64 {
    700
}

fn default_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    5_000
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_body_timeout_ms() -> u64 {
    10_000
}

fn default_workers() -> usize {
    8
}

fn default_case_attempts() -> u32 {
    3
}

fn default_backoff_base() -> u32 {
    2
}

fn default_backoff_unit_ms() -> u64 {
    1_000
}
