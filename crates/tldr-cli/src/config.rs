//! CLI configuration: TOML file, environment overrides and flags.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. Command-line flags ([`Overrides`])
//! 2. Environment variables (`TLDR_BASE_URL`, `TLDR_MODEL`, `TLDR_API_KEY`)
//! 3. Values in the config file
//! 4. Built-in defaults
//!
//! ```toml
//! estimator = "chars"
//!
//! [provider]
//! kind = "openai"
//! base_url = "http://localhost:8080/v1"
//! model = "gpt-4o-mini"
//!
//! [pipeline]
//! max_chunk_units = 2000
//! branching_factor = 5
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tldr_core::{EstimatorKind, PipelineOptions};

/// Default OpenAI-compatible base URL (local llama.cpp / vLLM server).
const DEFAULT_BASE_URL: &str = "http://localhost:8080/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_TEMPERATURE: f64 = 0.2;
const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 512;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

pub const ENV_BASE_URL: &str = "TLDR_BASE_URL";
pub const ENV_MODEL: &str = "TLDR_MODEL";
pub const ENV_API_KEY: &str = "TLDR_API_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Which summarizer backs the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI-compatible chat completions endpoint.
    #[default]
    #[value(name = "openai")]
    OpenAi,
    /// Offline deterministic summarizer.
    Mock,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpenAi => write!(f, "openai"),
            Self::Mock => write!(f, "mock"),
        }
    }
}

/// `[provider]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    /// Base URL for the OpenAI-compatible API (e.g. `http://localhost:8080/v1`).
    pub base_url: String,
    /// Sent as a bearer token when present. Local servers usually need none.
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f64,
    /// Upper bound on tokens generated per summary.
    pub max_output_tokens: u32,
    pub request_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TldrConfig {
    pub estimator: EstimatorKind,
    pub provider: ProviderConfig,
    pub pipeline: PipelineOptions,
}

/// Values given on the command line. `None` keeps the lower layer's value.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub provider: Option<ProviderKind>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub max_chunk_units: Option<usize>,
    pub branching_factor: Option<usize>,
    pub max_reduce_depth: Option<usize>,
    pub retry_attempts: Option<u32>,
    pub concurrency: Option<usize>,
    pub style: Option<String>,
    pub timeout_secs: Option<u64>,
    pub estimator: Option<EstimatorKind>,
}

impl TldrConfig {
    /// Load from `path`, or built-in defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `TLDR_*` variables from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|name| std::env::var(name).ok());
    }

    /// Apply `TLDR_*` variables looked up through `lookup`. Empty values are ignored.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        if let Some(url) = get(ENV_BASE_URL) {
            self.provider.base_url = url;
        }
        if let Some(model) = get(ENV_MODEL) {
            self.provider.model = model;
        }
        if let Some(key) = get(ENV_API_KEY) {
            self.provider.api_key = Some(key);
        }
    }

    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(kind) = overrides.provider {
            self.provider.kind = kind;
        }
        if let Some(model) = &overrides.model {
            self.provider.model = model.clone();
        }
        if let Some(url) = &overrides.base_url {
            self.provider.base_url = url.clone();
        }
        if let Some(estimator) = overrides.estimator {
            self.estimator = estimator;
        }

        let pipeline = &mut self.pipeline;
        if let Some(n) = overrides.max_chunk_units {
            pipeline.max_chunk_units = n;
        }
        if let Some(n) = overrides.branching_factor {
            pipeline.branching_factor = n;
        }
        if let Some(n) = overrides.max_reduce_depth {
            pipeline.max_reduce_depth = n;
        }
        if let Some(n) = overrides.retry_attempts {
            pipeline.retry_attempts = n;
        }
        if let Some(n) = overrides.concurrency {
            pipeline.concurrency = n;
        }
        if let Some(style) = &overrides.style {
            pipeline.style_hint = style.clone();
        }
        if let Some(secs) = overrides.timeout_secs {
            pipeline.timeout_secs = Some(secs);
        }
    }

    /// File, then environment, then flags.
    pub fn resolve(path: Option<&Path>, overrides: &Overrides) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env();
        config.apply_overrides(overrides);
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pipeline
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        let provider = &self.provider;
        if !(0.0..=2.0).contains(&provider.temperature) {
            return Err(ConfigError::Invalid(format!(
                "provider.temperature must be in [0, 2], got {}",
                provider.temperature
            )));
        }
        if provider.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "provider.request_timeout_secs must be > 0".to_string(),
            ));
        }
        if provider.kind == ProviderKind::OpenAi {
            if provider.base_url.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "provider.base_url must be set for the openai provider".to_string(),
                ));
            }
            if provider.model.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "provider.model must be set for the openai provider".to_string(),
                ));
            }
        }
        Ok(())
    }
}
