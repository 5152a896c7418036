//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API keys) are referenced by env-var name in the config and
//! resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs;

use crate::retry::RetryPolicy;
use crate::types::CycleScope;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub llm: LlmConfig,
    pub debate: DebateConfig,
    pub retry: RetryPolicy,
    pub data: DataConfig,
    pub memory: MemoryConfig,
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub name: String,
    /// The single instrument this run deliberates on.
    pub symbol: String,
    pub initial_capital: Decimal,
    /// Reflection window: weekly or monthly.
    pub cycle: CycleScope,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Pause between simulated days so a live dashboard can follow along.
    /// Zero runs the days back to back.
    pub day_pacing_secs: u64,
    /// Run-snapshot file; defaults to `agora_run.json` when absent.
    #[serde(default)]
    pub snapshot_path: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    pub api_key_env: String,
    /// Any OpenAI-compatible chat-completions endpoint.
    pub base_url: String,
    pub max_tokens: u32,
    #[serde(default)]
    pub temperature: Option<f32>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DebateConfig {
    pub investment_rounds: u32,
    pub risk_rounds: u32,
    /// Experience records retrieved per judge invocation.
    pub retrieve_k: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    /// Replay fixture with prices and analyst summaries.
    pub fixture_path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MemoryConfig {
    /// SQLite file for the experience store.
    pub db_path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}
