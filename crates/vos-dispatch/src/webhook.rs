//! # Webhook Target
//!
//! POSTs the authorized action as JSON to a configured URL. Status mapping:
//!
//! | Response | Error |
//! |----------|-------|
//! | 2xx | success |
//! | 429 | [`TargetError::RateLimited`] |
//! | 5xx, connection failure | [`TargetError::Unavailable`] |
//! | request timeout | [`TargetError::Timeout`] |
//! | other 4xx | [`TargetError::Rejected`] |
//!
//! Retries are not built in; the dispatcher's retry policy applies.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::target::{ActionTarget, AuthorizedAction, TargetError};

fn default_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookConfig {
    pub url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Environment variable holding a bearer token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum WebhookConfigError {
    #[error("invalid webhook URL \"{url}\": {source}")]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },

    #[error("webhook URL \"{0}\" must use http or https")]
    UnsupportedScheme(String),

    #[error("environment variable {0} for webhook token is not set")]
    MissingToken(String),

    #[error("webhook token contains invalid header characters")]
    InvalidToken,

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

pub struct WebhookTarget {
    name: String,
    url: Url,
    client: reqwest::Client,
    timeout: Duration,
}

impl std::fmt::Debug for WebhookTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookTarget")
            .field("name", &self.name)
            .field("url", &self.url.as_str())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl WebhookTarget {
    /// Build from configuration, reading the token from the environment.
    pub fn from_config(
        name: impl Into<String>,
        config: &WebhookConfig,
    ) -> Result<Self, WebhookConfigError> {
        let token = match &config.token_env {
            Some(var) => Some(
                std::env::var(var).map_err(|_| WebhookConfigError::MissingToken(var.clone()))?,
            ),
            None => None,
        };
        Self::new(
            name,
            &config.url,
            Duration::from_millis(config.timeout_ms),
            token.as_deref(),
        )
    }

    pub fn new(
        name: impl Into<String>,
        url: &str,
        timeout: Duration,
        token: Option<&str>,
    ) -> Result<Self, WebhookConfigError> {
        let parsed = Url::parse(url).map_err(|source| WebhookConfigError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(WebhookConfigError::UnsupportedScheme(url.to_string()));
        }

        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(token) = token {
            let mut value = reqwest::header::HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| WebhookConfigError::InvalidToken)?;
            value.set_sensitive(true);
            headers.insert(reqwest::header::AUTHORIZATION, value);
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            name: name.into(),
            url: parsed,
            client,
            timeout,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl ActionTarget for WebhookTarget {
    fn name(&self) -> &str {
        &self.name
    }

    async fn perform(&self, action: &AuthorizedAction) -> Result<(), TargetError> {
        let body = serde_json::json!({
            "action": action.action(),
            "approved_by": action.approved_by(),
        });
        let response = self
            .client
            .post(self.url.clone())
            .header("Idempotency-Key", action.action_id.to_string())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TargetError::Timeout(format!("no response within {:?}", self.timeout))
                } else {
                    TargetError::Unavailable(format!("{}: {e}", self.name))
                }
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        let detail = format!("HTTP {status}: {}", truncate(&body, 200));
        Err(if status.as_u16() == 429 {
            TargetError::RateLimited(detail)
        } else if status.is_server_error() {
            TargetError::Unavailable(detail)
        } else {
            TargetError::Rejected(detail)
        })
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}
