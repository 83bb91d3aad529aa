//! Environment-driven configuration

use crate::enrichment::{EnrichmentPolicy, UnknownPolicy};
use crate::llm::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::rate_limiter::RateLimits;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_KNOWLEDGE_PATH: &str = "emergency_instructions.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} must be a non-negative integer, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },
    #[error("{var} must be greater than zero")]
    Zero { var: &'static str },
    #[error(transparent)]
    Policy(#[from] UnknownPolicy),
}

/// Retry schedule for transient model-call failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each further failure
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Backoff slept after the given failed attempt (1-based): 5s, 10s, 20s...
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(5),
        }
    }
}

/// Runtime settings for the receptionist
#[derive(Debug, Clone)]
pub struct ReceptionistConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub rate_limits: RateLimits,
    pub retry: RetryPolicy,
    pub enrichment: EnrichmentPolicy,
    pub knowledge_path: PathBuf,
}

impl Default for ReceptionistConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            rate_limits: RateLimits::default(),
            retry: RetryPolicy::default(),
            enrichment: EnrichmentPolicy::default(),
            knowledge_path: PathBuf::from(DEFAULT_KNOWLEDGE_PATH),
        }
    }
}

impl ReceptionistConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable source (the process environment in
    /// production, a map in tests)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let tokens_per_minute = parse_positive(
            &lookup,
            "RECEPTIONIST_TOKENS_PER_MINUTE",
            defaults.rate_limits.tokens_per_minute,
        )?;
        let tokens_per_day = parse_positive(
            &lookup,
            "RECEPTIONIST_TOKENS_PER_DAY",
            defaults.rate_limits.tokens_per_day,
        )?;

        let enrichment = match lookup("RECEPTIONIST_ENRICHMENT") {
            Some(mode) => mode.parse::<EnrichmentPolicy>()?,
            None => defaults.enrichment,
        };
        let enrichment = match enrichment {
            EnrichmentPolicy::Deferred { .. } => {
                let secs = parse_u64(&lookup, "RECEPTIONIST_ENRICHMENT_DELAY_SECS", 0)?;
                EnrichmentPolicy::Deferred {
                    delay: Duration::from_secs(secs),
                }
            }
            EnrichmentPolicy::Inline => EnrichmentPolicy::Inline,
        };

        Ok(Self {
            api_key: lookup("GROQ_API_KEY").filter(|key| !key.is_empty()),
            base_url: lookup("RECEPTIONIST_BASE_URL").unwrap_or(defaults.base_url),
            model: lookup("RECEPTIONIST_MODEL").unwrap_or(defaults.model),
            rate_limits: RateLimits {
                tokens_per_minute,
                tokens_per_day,
            },
            retry: defaults.retry,
            enrichment,
            knowledge_path: lookup("RECEPTIONIST_KNOWLEDGE_PATH")
                .map_or(defaults.knowledge_path, PathBuf::from),
        })
    }
}

fn parse_u64<F>(lookup: &F, var: &'static str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(var) else {
        return Ok(default);
    };
    let parsed = value.trim().parse::<u64>();
    parsed.map_err(|_| ConfigError::InvalidNumber { var, value })
}

fn parse_positive<F>(lookup: &F, var: &'static str, default: u32) -> Result<u32, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let parsed = match lookup(var) {
        Some(value) => {
            let parsed = value.trim().parse::<u32>();
            parsed.map_err(|_| ConfigError::InvalidNumber { var, value })?
        }
        None => default,
    };
    if parsed == 0 {
        return Err(ConfigError::Zero { var });
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<ReceptionistConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ReceptionistConfig::from_lookup(|var| map.get(var).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.api_key, None);
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.enrichment, EnrichmentPolicy::Inline);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.knowledge_path, PathBuf::from(DEFAULT_KNOWLEDGE_PATH));
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("GROQ_API_KEY", "secret"),
            ("RECEPTIONIST_MODEL", "llama-3.1-8b-instant"),
            ("RECEPTIONIST_TOKENS_PER_MINUTE", "1200"),
            ("RECEPTIONIST_ENRICHMENT", "deferred"),
            ("RECEPTIONIST_ENRICHMENT_DELAY_SECS", "15"),
        ])
        .unwrap();

        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert_eq!(config.model, "llama-3.1-8b-instant");
        assert_eq!(config.rate_limits.tokens_per_minute, 1200);
        assert_eq!(
            config.enrichment,
            EnrichmentPolicy::Deferred {
                delay: Duration::from_secs(15)
            }
        );
    }

    #[test]
    fn test_empty_api_key_is_absent() {
        let config = config_from(&[("GROQ_API_KEY", "")]).unwrap();
        assert_eq!(config.api_key, None);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            config_from(&[("RECEPTIONIST_TOKENS_PER_DAY", "lots")]),
            Err(ConfigError::InvalidNumber { .. })
        ));
        assert!(matches!(
            config_from(&[("RECEPTIONIST_TOKENS_PER_MINUTE", "0")]),
            Err(ConfigError::Zero { .. })
        ));
        assert!(matches!(
            config_from(&[("RECEPTIONIST_ENRICHMENT", "eventually")]),
            Err(ConfigError::Policy(_))
        ));
    }

    #[test]
    fn test_retry_backoff_doubles() {
        let retry = RetryPolicy::default();
        assert_eq!(retry.delay_after(1), Duration::from_secs(5));
        assert_eq!(retry.delay_after(2), Duration::from_secs(10));
        assert_eq!(retry.delay_after(3), Duration::from_secs(20));
    }
}
