//! Engine configuration

use crate::error::{Error, Result};
use sheetshift_formula::{AddressMode, DEFAULT_MAX_PASSES};
use std::time::Duration;

/// Environment variable for [`TranslationOptions::concurrency`]
pub const ENV_CONCURRENCY: &str = "SHEETSHIFT_CONCURRENCY";
/// Environment variable for [`TranslationOptions::llm_timeout`], in seconds
pub const ENV_LLM_TIMEOUT_SECS: &str = "SHEETSHIFT_LLM_TIMEOUT_SECS";
/// Environment variable for [`TranslationOptions::max_rewrite_passes`]
pub const ENV_MAX_REWRITE_PASSES: &str = "SHEETSHIFT_MAX_REWRITE_PASSES";
/// Environment variable for [`TranslationOptions::llm_enabled`]
pub const ENV_LLM_ENABLED: &str = "SHEETSHIFT_LLM_ENABLED";

/// Options for a [`TranslationEngine`](crate::TranslationEngine)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationOptions {
    /// Worker threads for batch translation (default: available cores, at most 8)
    pub concurrency: usize,
    /// Upper bound on one LLM call (default: 30 seconds)
    pub llm_timeout: Duration,
    /// Overrides the rewrite pass bound of the rule data
    pub max_rewrite_passes: Option<usize>,
    /// Use the LLM translator when one is configured (default: true)
    pub llm_enabled: bool,
    /// How resolved structured references are addressed, unless a job says otherwise
    pub address_mode: AddressMode,
}

impl Default for TranslationOptions {
    fn default() -> Self {
        let available = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            concurrency: available.clamp(1, 8),
            llm_timeout: Duration::from_secs(30),
            max_rewrite_passes: None,
            llm_enabled: true,
            address_mode: AddressMode::default(),
        }
    }
}

impl TranslationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `SHEETSHIFT_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut options = Self::default();
        if let Some(value) = lookup(ENV_CONCURRENCY) {
            options.concurrency = parse_number(ENV_CONCURRENCY, &value)?;
        }
        if let Some(value) = lookup(ENV_LLM_TIMEOUT_SECS) {
            options.llm_timeout = Duration::from_secs(parse_number(ENV_LLM_TIMEOUT_SECS, &value)?);
        }
        if let Some(value) = lookup(ENV_MAX_REWRITE_PASSES) {
            options.max_rewrite_passes = Some(parse_number(ENV_MAX_REWRITE_PASSES, &value)?);
        }
        if let Some(value) = lookup(ENV_LLM_ENABLED) {
            options.llm_enabled = parse_flag(ENV_LLM_ENABLED, &value)?;
        }
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(Error::Config("concurrency must be at least 1".into()));
        }
        if self.llm_timeout.is_zero() {
            return Err(Error::Config("LLM timeout must be positive".into()));
        }
        if self.max_rewrite_passes == Some(0) {
            return Err(Error::Config("max rewrite passes must be at least 1".into()));
        }
        Ok(())
    }

    /// Pass bound the engine will use
    pub fn effective_max_passes(&self) -> usize {
        self.max_rewrite_passes.unwrap_or(DEFAULT_MAX_PASSES)
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_llm_timeout(mut self, timeout: Duration) -> Self {
        self.llm_timeout = timeout;
        self
    }

    pub fn with_max_rewrite_passes(mut self, passes: usize) -> Self {
        self.max_rewrite_passes = Some(passes);
        self
    }

    pub fn with_llm_enabled(mut self, enabled: bool) -> Self {
        self.llm_enabled = enabled;
        self
    }

    pub fn with_address_mode(mut self, mode: AddressMode) -> Self {
        self.address_mode = mode;
        self
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{key}={value:?} is not a valid number")))
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::Config(format!("{key}={value:?} is not a boolean"))),
    }
}
