//! Configuration validation.

use super::Config;
use crate::error::{ExtractError, Result};

/// Widest accepted query window, in days.
pub const MAX_WINDOW_DAYS: u32 = 36_500;

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Connection/credential validation
    let required = [
        ("domain", &config.domain),
        ("client_id", &config.client_id),
        ("client_secret", &config.client_secret),
        ("redirect_uri", &config.redirect_uri),
        ("refresh_token", &config.refresh_token),
        ("api_version", &config.api_version),
    ];
    for (name, value) in required {
        if value.trim().is_empty() {
            return Err(ExtractError::Config(format!("{} is required", name)));
        }
    }

    // Sync behavior validation
    if config.sync.window_days == 0 {
        return Err(ExtractError::Config(
            "sync.window_days must be at least 1".into(),
        ));
    }
    if config.sync.window_days > MAX_WINDOW_DAYS {
        return Err(ExtractError::Config(format!(
            "sync.window_days must be at most {}",
            MAX_WINDOW_DAYS
        )));
    }
    if config.sync.checkpoint_interval == 0 {
        return Err(ExtractError::Config(
            "sync.checkpoint_interval must be at least 1".into(),
        ));
    }
    if config.sync.page_size == 0 {
        return Err(ExtractError::Config(
            "sync.page_size must be at least 1".into(),
        ));
    }
    if config.sync.oversized_error_code.trim().is_empty() {
        return Err(ExtractError::Config(
            "sync.oversized_error_code is required".into(),
        ));
    }

    config.sync.stream_filter()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use chrono::{TimeZone, Utc};

    fn valid_config() -> Config {
        Config {
            domain: "contoso".to_string(),
            client_id: "app-id".to_string(),
            client_secret: "secret".to_string(),
            redirect_uri: "https://localhost/callback".to_string(),
            refresh_token: "refresh".to_string(),
            start_date: Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap(),
            api_version: "9.2".to_string(),
            base_url: None,
            token_url: None,
            sync: SyncConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_missing_domain() {
        let mut config = valid_config();
        config.domain = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_missing_refresh_token() {
        let mut config = valid_config();
        config.refresh_token = "  ".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_window_days() {
        let mut config = valid_config();
        config.sync.window_days = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_window_days_upper_bound() {
        let mut config = valid_config();
        config.sync.window_days = MAX_WINDOW_DAYS;
        assert!(validate(&config).is_ok());

        config.sync.window_days = u32::MAX;
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("window_days"));
    }

    #[test]
    fn test_zero_checkpoint_interval() {
        let mut config = valid_config();
        config.sync.checkpoint_interval = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_bad_stream_pattern() {
        let mut config = valid_config();
        config.sync.exclude_streams = vec!["[unclosed".to_string()];
        assert!(validate(&config).is_err());
    }
}
