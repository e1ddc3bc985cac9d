use super::{types::Config, ConfigError};

/// Validate configuration before startup.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }
    if config.queue.worker_pool_size == 0 {
        return Err(ConfigError::ValidationError(
            "queue.worker_pool_size cannot be 0".to_string(),
        ));
    }
    if config.queue.capacity == 0 {
        return Err(ConfigError::ValidationError(
            "queue.capacity cannot be 0".to_string(),
        ));
    }
    if config.transcode.cbr_bitrate.is_empty() {
        return Err(ConfigError::ValidationError(
            "transcode.cbr_bitrate cannot be empty".to_string(),
        ));
    }
    if config.transcode.max_timeout_secs < config.transcode.min_timeout_secs {
        return Err(ConfigError::ValidationError(
            "transcode.max_timeout_secs cannot be below min_timeout_secs".to_string(),
        ));
    }
    if config.validation.allowed_domains.is_empty() {
        return Err(ConfigError::ValidationError(
            "validation.allowed_domains cannot be empty".to_string(),
        ));
    }
    Ok(())
}
