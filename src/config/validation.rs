use crate::config::types::{Config, CrawlerConfig, OutputConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_seeds(&config.seeds)?;
    validate_crawler_config(&config.crawler)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates seed relay URLs
pub fn validate_seeds(seeds: &[String]) -> Result<(), ConfigError> {
    for seed in seeds {
        validate_seed(seed)?;
    }
    Ok(())
}

/// Validates one seed relay URL
///
/// Seeds must be WebSocket URLs; anything else could never be fetched.
pub fn validate_seed(seed: &str) -> Result<(), ConfigError> {
    if seed.trim() != seed {
        return Err(ConfigError::InvalidUrl(format!(
            "Seed URL '{}' has surrounding whitespace",
            seed
        )));
    }

    let url = Url::parse(seed)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e)))?;

    if url.scheme() != "ws" && url.scheme() != "wss" {
        return Err(ConfigError::InvalidUrl(format!(
            "Seed URL '{}' must use the ws or wss scheme",
            seed
        )));
    }

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_concurrent_fetches < 1 || config.max_concurrent_fetches > 1024 {
        return Err(ConfigError::Validation(format!(
            "max-concurrent-fetches must be between 1 and 1024, got {}",
            config.max_concurrent_fetches
        )));
    }

    if config.max_retries < 1 {
        return Err(ConfigError::Validation(format!(
            "max-retries must be >= 1, got {}",
            config.max_retries
        )));
    }

    if config.attempt_timeout_ms == 0 || config.connect_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "attempt-timeout-ms and connect-timeout-ms must be > 0".to_string(),
        ));
    }

    if config.repoll_interval_ms == 0 {
        return Err(ConfigError::Validation(
            "repoll-interval-ms must be > 0".to_string(),
        ));
    }

    if config.result_limit == 0 {
        return Err(ConfigError::Validation(
            "result-limit must be > 0".to_string(),
        ));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    if config.export_dir.is_empty() {
        return Err(ConfigError::Validation(
            "export-dir cannot be empty".to_string(),
        ));
    }

    if config.checkpoint_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "checkpoint-interval-secs must be > 0".to_string(),
        ));
    }

    Ok(())
}
