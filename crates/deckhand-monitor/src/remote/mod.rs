//! Production backend speaking to the panel over REST and WebSocket.

mod config;
mod rest;
mod ws;

pub use config::RemoteConfig;

use async_trait::async_trait;

use crate::errors::{MonitorError, TransportError};
use crate::subject::Subject;
use crate::transport::{HistoricalOutcome, LiveFeed, MonitorBackend};

/// Backend implementation backed by the panel API.
pub struct RemoteBackend {
    client: reqwest::Client,
    config: RemoteConfig,
}

impl RemoteBackend {
    /// Creates a backend from an explicit configuration.
    pub fn new(config: RemoteConfig) -> Result<Self, MonitorError> {
        if config.base_url().trim().is_empty() {
            return Err(MonitorError::Config(
                "panel base URL must not be empty".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|err| MonitorError::Config(format!("failed to build http client: {err}")))?;
        Ok(Self { client, config })
    }

    /// Creates a backend from `DECKHAND_PANEL_URL` and `DECKHAND_API_TOKEN`.
    pub fn from_env() -> Result<Self, MonitorError> {
        Self::new(RemoteConfig::from_env()?)
    }
}

#[async_trait]
impl MonitorBackend for RemoteBackend {
    async fn fetch_finished(
        &self,
        subject: &Subject,
    ) -> Result<HistoricalOutcome, TransportError> {
        rest::fetch_finished(&self.client, &self.config, subject).await
    }

    async fn connect(&self, subject: &Subject) -> Result<LiveFeed, TransportError> {
        ws::connect(&self.config, subject).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_base_url_is_rejected() {
        let err = match RemoteBackend::new(RemoteConfig::new("  ")) {
            Ok(_) => panic!("an empty base URL should fail"),
            Err(err) => err,
        };
        assert!(matches!(err, MonitorError::Config(_)));
    }
}
