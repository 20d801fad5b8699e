//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::{ExtractError, Result};
use chrono::Duration;
use glob::Pattern;
use std::path::Path;

/// Token endpoint used when `token_url` is not configured.
pub const DEFAULT_TOKEN_URL: &str = "https://login.microsoftonline.com/common/oauth2/token";

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// OAuth resource the access token is requested for.
    pub fn resource(&self) -> String {
        format!("https://{}.dynamics.com", self.domain)
    }

    /// Web API root, always ending in `/`.
    pub fn service_url(&self) -> String {
        let url = match &self.base_url {
            Some(url) => url.clone(),
            None => format!(
                "https://{}.dynamics.com/api/data/v{}/",
                self.domain, self.api_version
            ),
        };
        if url.ends_with('/') {
            url
        } else {
            format!("{}/", url)
        }
    }

    /// OAuth token endpoint.
    pub fn token_url(&self) -> String {
        self.token_url
            .clone()
            .unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string())
    }
}

impl SyncConfig {
    /// Width of one incremental query window.
    pub fn window_span(&self) -> Duration {
        Duration::days(i64::from(self.window_days))
    }

    /// Build the collection selection predicate from the include/exclude patterns.
    pub fn stream_filter(&self) -> Result<StreamFilter> {
        StreamFilter::new(&self.include_streams, &self.exclude_streams)
    }
}

/// Glob-based collection selection.
#[derive(Debug, Clone, Default)]
pub struct StreamFilter {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

impl StreamFilter {
    /// Compile include and exclude patterns.
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        let compile = |patterns: &[String]| -> Result<Vec<Pattern>> {
            patterns
                .iter()
                .map(|p| {
                    Pattern::new(p).map_err(|e| {
                        ExtractError::Config(format!("invalid stream pattern '{}': {}", p, e))
                    })
                })
                .collect()
        };
        Ok(Self {
            include: compile(include)?,
            exclude: compile(exclude)?,
        })
    }

    /// A collection is selected when it matches an include pattern (or none
    /// are configured) and matches no exclude pattern.
    pub fn is_selected(&self, name: &str) -> bool {
        let included = self.include.is_empty() || self.include.iter().any(|p| p.matches(name));
        included && !self.exclude.iter().any(|p| p.matches(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
domain: contoso
client_id: app-id
client_secret: shh
redirect_uri: https://localhost/callback
refresh_token: refresh
start_date: "2023-01-01T00:00:00Z"
"#;

    #[test]
    fn test_from_yaml_applies_defaults() {
        let config = Config::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.api_version, "9.2");
        assert_eq!(config.sync.window_days, 30);
        assert_eq!(config.sync.checkpoint_interval, 5000);
        assert_eq!(config.sync.page_size, 5000);
        assert!(config.sync.pick_lists);
        assert_eq!(
            config.service_url(),
            "https://contoso.dynamics.com/api/data/v9.2/"
        );
        assert_eq!(config.resource(), "https://contoso.dynamics.com");
        assert_eq!(config.token_url(), DEFAULT_TOKEN_URL);
    }

    #[test]
    fn test_base_url_override_gets_trailing_slash() {
        let yaml = format!("{}base_url: http://127.0.0.1:1234/api\n", MINIMAL);
        let config = Config::from_yaml(&yaml).unwrap();
        assert_eq!(config.service_url(), "http://127.0.0.1:1234/api/");
    }

    #[test]
    fn test_invalid_yaml_is_rejected() {
        let err = Config::from_yaml("domain: [").unwrap_err();
        assert!(matches!(err, ExtractError::Yaml(_)));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut config = Config::from_yaml(MINIMAL).unwrap();
        config.client_secret = "super_secret_value_123".into();
        config.refresh_token = "refresh_token_value_456".into();
        let debug_output = format!("{:?}", config);
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_value_123"));
        assert!(!debug_output.contains("refresh_token_value_456"));
    }

    #[test]
    fn test_stream_filter() {
        let filter = StreamFilter::new(
            &["account*".to_string(), "contacts".to_string()],
            &["accountleads".to_string()],
        )
        .unwrap();
        assert!(filter.is_selected("accounts"));
        assert!(filter.is_selected("contacts"));
        assert!(!filter.is_selected("accountleads"));
        assert!(!filter.is_selected("leads"));

        let all = StreamFilter::default();
        assert!(all.is_selected("anything"));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        assert!(StreamFilter::new(&["[".to_string()], &[]).is_err());
    }
}
