//! Configuration validation.

use super::types::ServerConfig;
use crate::cache::keys::SEPARATOR;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid port: {0}")]
    InvalidPort(u16),

    #[error("Invalid log level: {0}")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}")]
    InvalidLogFormat(String),

    #[error("Invalid cache key prefix `{0}`: must be non-empty without `:` or glob characters")]
    InvalidKeyPrefix(String),

    #[error("Cache sweep interval must be greater than zero")]
    InvalidSweepInterval,

    #[error("Redis connect timeout must be greater than zero")]
    InvalidConnectTimeout,
}

/// Validate server configuration.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    // Validate port
    if config.server.port == 0 {
        errors.push(ConfigError::InvalidPort(0));
    }

    // Validate log level
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.logging.level.to_lowercase().as_str()) {
        errors.push(ConfigError::InvalidLogLevel(config.logging.level.clone()));
    }

    let valid_formats = ["pretty", "compact", "json"];
    if !valid_formats.contains(&config.logging.format.to_lowercase().as_str()) {
        errors.push(ConfigError::InvalidLogFormat(config.logging.format.clone()));
    }

    // The prefix ends up in every invalidation pattern.
    let prefix = &config.cache.key_prefix;
    if prefix.is_empty()
        || prefix.contains(SEPARATOR)
        || prefix.contains(|c: char| matches!(c, '*' | '?' | '[' | ']'))
    {
        errors.push(ConfigError::InvalidKeyPrefix(prefix.clone()));
    }

    if config.cache.sweep_interval_secs == 0 {
        errors.push(ConfigError::InvalidSweepInterval);
    }

    if config.cache.connect_timeout_secs == 0 {
        errors.push(ConfigError::InvalidConnectTimeout);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config() {
        let config = ServerConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_invalid_port() {
        let mut config = ServerConfig::default();
        config.server.port = 0;

        let result = validate_config(&config);
        assert!(result.unwrap_err().iter().any(|e| matches!(e, ConfigError::InvalidPort(0))));
    }

    #[test]
    fn test_invalid_log_settings() {
        let mut config = ServerConfig::default();
        config.logging.level = "loud".to_string();
        config.logging.format = "xml".to_string();

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| matches!(e, ConfigError::InvalidLogLevel(_))));
        assert!(errors.iter().any(|e| matches!(e, ConfigError::InvalidLogFormat(_))));
    }

    #[test]
    fn test_invalid_key_prefix() {
        for prefix in ["", "art:hub", "art*", "a?b"] {
            let mut config = ServerConfig::default();
            config.cache.key_prefix = prefix.to_string();

            let errors = validate_config(&config).unwrap_err();
            assert!(
                errors.iter().any(|e| matches!(e, ConfigError::InvalidKeyPrefix(_))),
                "prefix {prefix:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_zero_intervals() {
        let mut config = ServerConfig::default();
        config.cache.sweep_interval_secs = 0;
        config.cache.connect_timeout_secs = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
    }
}
