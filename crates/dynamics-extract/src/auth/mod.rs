//! OAuth bearer token acquisition.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{ExtractError, Result};

/// Tokens are treated as expired this long before their actual expiry.
pub const EXPIRY_MARGIN_SECS: i64 = 10;

/// Supplies a bearer credential for each outbound request.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Return a currently valid access token, refreshing it if needed.
    async fn bearer_token(&self) -> Result<String>;
}

/// Fixed token, for tests and pre-authenticated callers.
pub struct StaticTokenAuthenticator {
    token: String,
}

impl StaticTokenAuthenticator {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl Authenticator for StaticTokenAuthenticator {
    async fn bearer_token(&self) -> Result<String> {
        Ok(self.token.clone())
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: serde_json::Value,
}

#[derive(Deserialize)]
struct TokenErrorResponse {
    error: Option<String>,
}

/// Refresh-token grant against the Microsoft identity platform.
pub struct OAuthAuthenticator {
    http: Client,
    token_url: String,
    resource: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    refresh_token: String,
    cached: Mutex<Option<CachedToken>>,
}

impl OAuthAuthenticator {
    /// Create an authenticator from configuration.
    pub fn new(http: Client, config: &Config) -> Self {
        Self {
            http,
            token_url: config.token_url(),
            resource: config.resource(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
            refresh_token: config.refresh_token.clone(),
            cached: Mutex::new(None),
        }
    }

    async fn refresh(&self) -> Result<CachedToken> {
        debug!("Refreshing access token for {}", self.resource);

        let form = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("refresh_token", self.refresh_token.as_str()),
            ("grant_type", "refresh_token"),
            ("resource", self.resource.as_str()),
        ];

        let response = self.http.post(&self.token_url).form(&form).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status == StatusCode::BAD_REQUEST {
            if let Ok(error) = serde_json::from_str::<TokenErrorResponse>(&body) {
                if error.error.as_deref() == Some("invalid_grant") {
                    return Err(ExtractError::InvalidCredentials(body));
                }
            }
        }
        if status != StatusCode::OK {
            return Err(ExtractError::Auth(format!("HTTP {}: {}", status, body)));
        }

        let token: TokenResponse = serde_json::from_str(&body)?;
        let expires_in = parse_expires_in(&token.expires_in).ok_or_else(|| {
            ExtractError::Auth(format!("invalid expires_in: {}", token.expires_in))
        })?;
        let expires_at = Utc::now() + Duration::seconds(expires_in - EXPIRY_MARGIN_SECS);

        info!("Obtained access token (expires at {})", expires_at);
        Ok(CachedToken {
            access_token: token.access_token,
            expires_at,
        })
    }
}

#[async_trait]
impl Authenticator for OAuthAuthenticator {
    async fn bearer_token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        match cached.as_ref() {
            Some(token) if token.expires_at > Utc::now() => Ok(token.access_token.clone()),
            _ => {
                let token = self.refresh().await?;
                let access_token = token.access_token.clone();
                *cached = Some(token);
                Ok(access_token)
            }
        }
    }
}

/// The v1 token endpoint reports `expires_in` as a numeric string.
fn parse_expires_in(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
