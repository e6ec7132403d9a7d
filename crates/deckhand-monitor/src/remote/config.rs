//! Remote backend configuration and endpoint URL assembly.

use std::time::Duration;

use crate::errors::MonitorError;
use crate::subject::Subject;

const PANEL_URL_ENV: &str = "DECKHAND_PANEL_URL";
const API_TOKEN_ENV: &str = "DECKHAND_API_TOKEN";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for the panel API.
#[derive(Clone, Debug)]
pub struct RemoteConfig {
    base_url: String,
    api_token: Option<String>,
    request_timeout: Duration,
}

impl RemoteConfig {
    /// Creates a configuration for a panel reachable at `base_url`, e.g.
    /// `https://panel.example.com`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_token: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Reads the configuration from `DECKHAND_PANEL_URL` and, when present,
    /// `DECKHAND_API_TOKEN`.
    pub fn from_env() -> Result<Self, MonitorError> {
        let base_url = std::env::var(PANEL_URL_ENV)
            .map_err(|_| MonitorError::Config(format!("{PANEL_URL_ENV} is not set")))?;
        let mut config = Self::new(base_url);
        if let Ok(token) = std::env::var(API_TOKEN_ENV)
            && !token.is_empty()
        {
            config.api_token = Some(token);
        }
        Ok(config)
    }

    /// Sets the API token sent with every request.
    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    /// Sets the timeout applied to history requests.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub(crate) fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn token(&self) -> Option<&str> {
        self.api_token.as_deref()
    }

    pub(crate) fn timeout(&self) -> Duration {
        self.request_timeout
    }

    /// REST endpoint serving the stored outcome for a subject.
    pub(crate) fn history_url(&self, subject: &Subject) -> String {
        format!(
            "{}/api/{}/history",
            self.base_url.trim_end_matches('/'),
            subject.channel_path()
        )
    }

    /// WebSocket endpoint serving live frames for a subject.
    ///
    /// Swaps the scheme to its WebSocket counterpart and appends the API
    /// token as a query parameter, since browsers and several proxies strip
    /// headers from upgrade requests.
    pub(crate) fn stream_url(&self, subject: &Subject) -> String {
        let trimmed = self.base_url.trim_end_matches('/');
        let ws_base = if let Some(rest) = trimmed.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = trimmed.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            trimmed.to_string()
        };
        let mut url = format!("{ws_base}/api/{}/stream", subject.channel_path());
        if let Some(token) = &self.api_token {
            url.push_str("?token=");
            url.push_str(token);
        }
        url
    }
}
