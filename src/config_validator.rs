use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

use crate::error::LimiterError;
use crate::rate_limit_config::{RateLimiterConfig, Tier};

static NAMESPACE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("namespace pattern is valid"));

/// Validates configuration objects for consistency and correctness
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validates a Redis URL
    pub fn validate_redis_url(url: &str) -> Result<(), LimiterError> {
        if url.is_empty() {
            return Err(LimiterError::Validation(
                "Redis URL cannot be empty".to_string(),
            ));
        }

        if !url.starts_with("redis://") && !url.starts_with("rediss://") {
            return Err(LimiterError::Validation(
                "Redis URL must start with 'redis://' or 'rediss://'".to_string(),
            ));
        }

        Ok(())
    }

    /// Namespaces become the first segment of every store key, so they may
    /// not contain the `:` separator or glob characters used by reset.
    pub fn validate_namespace(namespace: &str) -> Result<(), LimiterError> {
        if !NAMESPACE_PATTERN.is_match(namespace) {
            return Err(LimiterError::Validation(format!(
                "Invalid namespace '{}'. Use 1-64 alphanumeric characters, hyphens or underscores",
                namespace
            )));
        }
        Ok(())
    }

    /// Validates a complete limiter configuration.
    ///
    /// The sustained gate must come first so that burst statistics are not
    /// counted while the sustained quota is already exhausted.
    pub fn validate_limiter_config(config: &RateLimiterConfig) -> Result<(), LimiterError> {
        Self::validate_namespace(&config.namespace)?;

        let first = config.gates.first().ok_or_else(|| {
            LimiterError::Validation("At least one gate must be configured".to_string())
        })?;
        if first.tier != Tier::Sustained {
            return Err(LimiterError::Validation(
                "The sustained gate must be evaluated first".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for gate in &config.gates {
            gate.validate().map_err(LimiterError::Validation)?;
            if !seen.insert(gate.tier) {
                return Err(LimiterError::Validation(format!(
                    "Duplicate {:?} gate",
                    gate.tier
                )));
            }
        }

        if let (Some(sustained), Some(burst)) =
            (config.gate(Tier::Sustained), config.gate(Tier::Burst))
        {
            if burst.window >= sustained.window {
                return Err(LimiterError::Validation(
                    "Burst window must be shorter than the sustained window".to_string(),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit_config::Gate;
    use std::time::Duration;

    #[test]
    fn test_valid_redis_url() {
        assert!(ConfigValidator::validate_redis_url("redis://localhost:6379").is_ok());
        assert!(ConfigValidator::validate_redis_url("rediss://localhost:6379").is_ok());
    }

    #[test]
    fn test_invalid_redis_url() {
        assert!(ConfigValidator::validate_redis_url("").is_err());
        assert!(ConfigValidator::validate_redis_url("http://localhost:6379").is_err());
    }

    #[test]
    fn test_namespace() {
        assert!(ConfigValidator::validate_namespace("riot").is_ok());
        assert!(ConfigValidator::validate_namespace("riot-euw_1").is_ok());
        assert!(ConfigValidator::validate_namespace("").is_err());
        assert!(ConfigValidator::validate_namespace("riot:prod").is_err());
        assert!(ConfigValidator::validate_namespace("riot*").is_err());
    }

    #[test]
    fn test_default_limiter_config_is_valid() {
        assert!(ConfigValidator::validate_limiter_config(&RateLimiterConfig::default()).is_ok());
    }

    #[test]
    fn test_sustained_only_is_valid() {
        let config = RateLimiterConfig {
            namespace: "riot".to_string(),
            gates: vec![Gate::sustained(100, Duration::from_secs(120))],
        };
        assert!(ConfigValidator::validate_limiter_config(&config).is_ok());
    }

    #[test]
    fn test_invalid_limiter_configs() {
        let empty = RateLimiterConfig {
            namespace: "riot".to_string(),
            gates: vec![],
        };
        assert!(ConfigValidator::validate_limiter_config(&empty).is_err());

        let zero_limit = RateLimiterConfig::new(0, Duration::from_secs(120), 5, Duration::from_secs(10));
        assert!(ConfigValidator::validate_limiter_config(&zero_limit).is_err());

        let burst_first = RateLimiterConfig {
            namespace: "riot".to_string(),
            gates: vec![
                Gate::burst(5, Duration::from_secs(10)),
                Gate::sustained(100, Duration::from_secs(120)),
            ],
        };
        assert!(ConfigValidator::validate_limiter_config(&burst_first).is_err());

        let duplicate = RateLimiterConfig {
            namespace: "riot".to_string(),
            gates: vec![
                Gate::sustained(100, Duration::from_secs(120)),
                Gate::sustained(50, Duration::from_secs(60)),
            ],
        };
        assert!(ConfigValidator::validate_limiter_config(&duplicate).is_err());

        let wide_burst = RateLimiterConfig::new(100, Duration::from_secs(10), 5, Duration::from_secs(10));
        assert!(ConfigValidator::validate_limiter_config(&wide_burst).is_err());
    }
}
