use envconfig::Envconfig;
use std::time::Duration;
use validator::Validate;

use crate::config_validator::ConfigValidator;
use crate::error::Result;
use crate::rate_limit_config::RateLimiterConfig;

#[derive(Debug, Envconfig, Validate, Clone)]
pub struct Config {
    /// Redis connection URL
    #[envconfig(from = "REDIS_URL", default = "redis://127.0.0.1:6379")]
    #[validate(length(min = 1))]
    pub redis_url: String,

    /// Prefix of every counter key; limiters sharing a quota must agree on it
    #[envconfig(from = "LIMITER_NAMESPACE", default = "riot")]
    pub namespace: String,

    /// Requests allowed per sustained window
    #[envconfig(from = "SUSTAINED_LIMIT", default = "100")]
    #[validate(range(min = 1))]
    pub sustained_limit: u64,

    #[envconfig(from = "SUSTAINED_WINDOW_SECS", default = "120")]
    #[validate(range(min = 1))]
    pub sustained_window_secs: u64,

    /// Requests allowed per burst window
    #[envconfig(from = "BURST_LIMIT", default = "20")]
    #[validate(range(min = 1))]
    pub burst_limit: u64,

    #[envconfig(from = "BURST_WINDOW_SECS", default = "10")]
    #[validate(range(min = 1))]
    pub burst_window_secs: u64,

    #[envconfig(from = "LOG_LEVEL", default = "info")]
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let config = Config::init_from_env()?;
        config.check()?;
        Ok(config)
    }

    /// Load configuration when the gates come from a gate file, so the
    /// limit variables are ignored.
    pub fn from_env_without_gates() -> Result<Self> {
        let config = Config::init_from_env()?;
        config.check_connection()?;
        Ok(config)
    }

    /// Field ranges plus the cross-field rules of [`ConfigValidator`].
    pub fn check(&self) -> Result<()> {
        self.validate()?;
        self.check_connection()?;
        ConfigValidator::validate_limiter_config(&self.limiter_config())
    }

    pub fn check_connection(&self) -> Result<()> {
        ConfigValidator::validate_redis_url(&self.redis_url)
    }

    /// The gates described by this configuration.
    pub fn limiter_config(&self) -> RateLimiterConfig {
        RateLimiterConfig::new(
            self.sustained_limit,
            Duration::from_secs(self.sustained_window_secs),
            self.burst_limit,
            Duration::from_secs(self.burst_window_secs),
        )
        .with_namespace(self.namespace.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit_config::Tier;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<Config> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let config = Config::init_from_hashmap(&env)?;
        config.check()?;
        Ok(config)
    }

    #[test]
    fn test_defaults() {
        let config = from_pairs(&[]).unwrap();
        assert_eq!(config.redis_url, "redis://127.0.0.1:6379");
        assert_eq!(config.namespace, "riot");

        let limiter = config.limiter_config();
        let sustained = limiter.gate(Tier::Sustained).unwrap();
        assert_eq!(sustained.limit, 100);
        assert_eq!(sustained.window, Duration::from_secs(120));
        let burst = limiter.gate(Tier::Burst).unwrap();
        assert_eq!(burst.limit, 20);
        assert_eq!(burst.window, Duration::from_secs(10));
    }

    #[test]
    fn test_overrides() {
        let config = from_pairs(&[
            ("LIMITER_NAMESPACE", "riot-kr"),
            ("SUSTAINED_LIMIT", "5"),
            ("BURST_LIMIT", "3"),
        ])
        .unwrap();
        let limiter = config.limiter_config();
        assert_eq!(limiter.namespace, "riot-kr");
        assert_eq!(limiter.gates[0].limit, 5);
        assert_eq!(limiter.gates[1].limit, 3);
    }

    #[test]
    fn test_rejects_zero_limit() {
        assert!(from_pairs(&[("SUSTAINED_LIMIT", "0")]).is_err());
    }

    #[test]
    fn test_rejects_bad_redis_url() {
        assert!(from_pairs(&[("REDIS_URL", "localhost:6379")]).is_err());
    }

    #[test]
    fn test_gate_file_skips_limit_checks() {
        let env: HashMap<String, String> = [("BURST_WINDOW_SECS", "600")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let config = Config::init_from_hashmap(&env).unwrap();
        assert!(config.check().is_err());
        assert!(config.check_connection().is_ok());

        let env: HashMap<String, String> = [("REDIS_URL", "localhost:6379")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let config = Config::init_from_hashmap(&env).unwrap();
        assert!(config.check_connection().is_err());
    }

    #[test]
    fn test_rejects_unparseable_number() {
        assert!(from_pairs(&[("BURST_LIMIT", "many")]).is_err());
    }
}
