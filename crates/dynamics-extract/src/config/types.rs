//! Configuration type definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Dynamics organization name (the `{domain}` in `{domain}.dynamics.com`).
    pub domain: String,

    /// OAuth application (client) id.
    pub client_id: String,

    /// OAuth client secret.
    pub client_secret: String,

    /// Redirect URI registered for the application.
    pub redirect_uri: String,

    /// Long-lived refresh token used to mint access tokens.
    pub refresh_token: String,

    /// Earliest modification time to extract for streams without a bookmark.
    pub start_date: DateTime<Utc>,

    /// Web API version (default: "9.2").
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Override for the Web API root (default derived from `domain`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Override for the OAuth token endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_url: Option<String>,

    /// Extraction behavior.
    #[serde(default)]
    pub sync: SyncConfig,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("domain", &self.domain)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("redirect_uri", &self.redirect_uri)
            .field("refresh_token", &"[REDACTED]")
            .field("start_date", &self.start_date)
            .field("api_version", &self.api_version)
            .field("base_url", &self.base_url)
            .field("token_url", &self.token_url)
            .field("sync", &self.sync)
            .finish()
    }
}

/// Extraction behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Collections to include (glob patterns). Empty means all.
    #[serde(default)]
    pub include_streams: Vec<String>,

    /// Collections to exclude (glob patterns).
    #[serde(default)]
    pub exclude_streams: Vec<String>,

    /// Width of each incremental query window in days (default: 30).
    #[serde(default = "default_window_days")]
    pub window_days: u32,

    /// Emitted records between bookmark checkpoints (default: 5000).
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: usize,

    /// Provider error code reported when a response exceeds the size ceiling.
    #[serde(default = "default_oversized_error_code")]
    pub oversized_error_code: String,

    /// Preferred page size sent with every query (default: 5000).
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Per-request timeout in seconds (default: 300).
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Emit the `pick_lists` stream after the entity streams (default: true).
    #[serde(default = "default_pick_lists")]
    pub pick_lists: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            include_streams: Vec::new(),
            exclude_streams: Vec::new(),
            window_days: default_window_days(),
            checkpoint_interval: default_checkpoint_interval(),
            oversized_error_code: default_oversized_error_code(),
            page_size: default_page_size(),
            request_timeout_secs: default_request_timeout_secs(),
            pick_lists: default_pick_lists(),
        }
    }
}

// Default value functions for serde
fn default_api_version() -> String {
    "9.2".to_string()
}

fn default_window_days() -> u32 {
    30
}

fn default_checkpoint_interval() -> usize {
    5000
}

fn default_oversized_error_code() -> String {
    "0x80060891".to_string()
}

fn default_page_size() -> u32 {
    5000
}

fn default_request_timeout_secs() -> u64 {
    300
}

fn default_pick_lists() -> bool {
    true
}
