//! Instance configuration: model selection, worker count and parameter
//! defaults.

use crate::models::{model_id, ResolvedParameters};
use crate::{Error, Result};
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// AWS region for the Bedrock runtime; `None` uses the SDK default chain.
    pub region: Option<String>,
    pub model: String,
    pub embedding_model: String,
    /// Embedding worker count.
    pub num_workers: usize,
    pub defaults: ResolvedParameters,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            region: std::env::var("AWS_REGION").ok().filter(|r| !r.is_empty()),
            model: model_id::CLAUDE_INSTANT.to_string(),
            embedding_model: model_id::TITAN_EMBEDDING_G1_TEXT.to_string(),
            num_workers: 10,
            defaults: ResolvedParameters::default(),
        }
    }
}

impl LlmConfig {
    /// Load configuration from the environment (and a `.env` file if present).
    ///
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = Self::default();
        if let Some(model) = env_var("BEDROCK_MODEL") {
            config.model = model;
        }
        if let Some(model) = env_var("BEDROCK_EMBEDDING_MODEL") {
            config.embedding_model = model;
        }
        if let Some(workers) = parse_env("BEDROCK_NUM_WORKERS")? {
            config.num_workers = workers;
        }
        if let Some(max_tokens) = parse_env("BEDROCK_MAX_TOKENS")? {
            config.defaults.max_tokens = max_tokens;
        }
        if let Some(temperature) = parse_env("BEDROCK_TEMPERATURE")? {
            config.defaults.temperature = temperature;
        }
        if let Some(top_p) = parse_env("BEDROCK_TOP_P")? {
            config.defaults.top_p = top_p;
        }
        if let Some(top_k) = parse_env("BEDROCK_TOP_K")? {
            config.defaults.top_k = top_k;
        }
        if let Some(stops) = env_var("BEDROCK_STOP_SEQUENCES") {
            config.defaults.stop_sequences = parse_list(&stops);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_workers == 0 {
            return Err(Error::Config(
                "num_workers must be at least 1".to_string(),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(Error::Config("model must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    pub fn with_num_workers(mut self, workers: usize) -> Self {
        self.num_workers = workers;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.defaults.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.defaults.temperature = temperature;
        self
    }

    pub fn with_top_p(mut self, top_p: f64) -> Self {
        self.defaults.top_p = top_p;
        self
    }

    pub fn with_top_k(mut self, top_k: u32) -> Self {
        self.defaults.top_k = top_k;
        self
    }

    pub fn with_stop_sequences(mut self, stop_sequences: Vec<String>) -> Self {
        self.defaults.stop_sequences = stop_sequences;
        self
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env<T: FromStr>(key: &str) -> Result<Option<T>> {
    env_var(key)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|_| Error::Config(format!("{} has an invalid value: {}", key, raw)))
        })
        .transpose()
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
