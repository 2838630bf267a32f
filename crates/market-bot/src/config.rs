//! Configuration management for market-bot

#[path = "config_tests.rs"]
mod config_tests;

use anyhow::{Context, Result};
use market_nats::QueueConfig;
use serde::{Deserialize, Serialize};
use std::fs;

/// Environment access seam so config loading is testable.
pub trait ReadEnv {
    fn var(&self, key: &str) -> Option<String>;
}

/// Reads the real process environment.
pub struct SystemEnv;

impl ReadEnv for SystemEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Complete bot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub discord: DiscordConfig,
    pub queue: QueueConfig,
    #[serde(default)]
    pub backend: BackendConfig,
}

/// Discord bot specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    /// Bot token from the Discord developer portal
    #[serde(default)]
    pub bot_token: String,
}

/// Marketplace backend REST endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_backend_url")]
    pub base_url: String,
}

fn default_backend_url() -> String {
    "http://web:8081".to_string()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_backend_url(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path))?;

        Ok(config)
    }

    /// Load configuration from environment variables. Missing values fall
    /// back to defaults; required fields are reported by [`Config::validate`]
    /// rather than failing here.
    pub fn from_env() -> Self {
        Self::from_env_source(&SystemEnv)
    }

    pub fn from_env_source(env: &impl ReadEnv) -> Self {
        let bot_token = env.var("DISCORD_BOT_TOKEN").unwrap_or_default();
        let nats_url = env
            .var("NATS_URL")
            .unwrap_or_else(|| "localhost:4222".to_string());
        let prefix = env.var("MARKET_PREFIX").unwrap_or_else(|| "prod".to_string());
        let base_url = env.var("BACKEND_URL").unwrap_or_else(default_backend_url);

        let mut queue = QueueConfig::from_url(nats_url, prefix);
        if let Some(max) = env.var("MARKET_MAX_MESSAGES").and_then(|v| v.parse().ok()) {
            queue.consumer.max_messages = max;
        }
        if let Some(wait) = env.var("MARKET_WAIT_TIME").and_then(|v| v.parse().ok()) {
            queue.consumer.wait_time_secs = wait;
        }
        if let Some(delay) = env.var("MARKET_RETRY_DELAY").and_then(|v| v.parse().ok()) {
            queue.consumer.retry_delay_secs = delay;
        }

        Config {
            discord: DiscordConfig { bot_token },
            queue,
            backend: BackendConfig { base_url },
        }
    }

    /// Validate the configuration, returning every issue at once so startup
    /// can report a complete list before aborting.
    pub fn validate(&self) -> Vec<(String, String)> {
        let mut issues = Vec::new();

        if self.discord.bot_token.is_empty() {
            issues.push((
                "DISCORD_BOT_TOKEN".to_string(),
                "Discord bot token is required".to_string(),
            ));
        }
        if self.queue.servers.is_empty() || self.queue.servers.iter().all(|s| s.is_empty()) {
            issues.push((
                "NATS_URL".to_string(),
                "At least one NATS server is required".to_string(),
            ));
        }
        if self.queue.prefix.is_empty() {
            issues.push((
                "MARKET_PREFIX".to_string(),
                "Queue prefix must not be empty".to_string(),
            ));
        }
        if self.backend.base_url.is_empty() {
            issues.push((
                "BACKEND_URL".to_string(),
                "Backend base URL is required".to_string(),
            ));
        }

        issues
    }
}
