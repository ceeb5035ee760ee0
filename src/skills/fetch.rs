//! Skill bundle download from remote storage.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::error::SkillsError;

/// Longest slice of an error body kept in logs and errors.
const ERROR_BODY_PREVIEW: usize = 200;

/// Source of skill code bundles.
#[async_trait]
pub trait BundleFetcher: Send + Sync {
    /// Download the bundle at `url`.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, SkillsError>;
}

/// Download location of a skill's bundle under the storage base URL.
pub fn bundle_url(base_url: &str, skill_id: i64) -> String {
    format!("{}/skills/{}/binary", base_url.trim_end_matches('/'), skill_id)
}

/// Fetches bundles over HTTP with an optional bearer token.
pub struct HttpBundleFetcher {
    client: reqwest::Client,
    token: Option<SecretString>,
    timeout: Duration,
}

impl HttpBundleFetcher {
    pub fn new(token: Option<SecretString>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
            timeout,
        }
    }
}

#[async_trait]
impl BundleFetcher for HttpBundleFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, SkillsError> {
        let mut request = self
            .client
            .get(url)
            .timeout(self.timeout)
            .header(
                "User-Agent",
                format!("skillhost/{}", env!("CARGO_PKG_VERSION")),
            );
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await.map_err(|e| SkillsError::FetchFailed {
            url: url.to_string(),
            status: None,
            reason: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let preview: String = body.chars().take(ERROR_BODY_PREVIEW).collect();
            tracing::warn!(url, status = status.as_u16(), body = %preview, "Bundle download failed");
            return Err(SkillsError::FetchFailed {
                url: url.to_string(),
                status: Some(status.as_u16()),
                reason: format!("HTTP {}: {}", status.as_u16(), preview),
            });
        }

        let bytes = response.bytes().await.map_err(|e| SkillsError::FetchFailed {
            url: url.to_string(),
            status: Some(status.as_u16()),
            reason: format!("Failed to read body: {}", e),
        })?;

        tracing::debug!(url, size = bytes.len(), "Downloaded skill bundle");
        Ok(bytes.to_vec())
    }
}

impl std::fmt::Debug for HttpBundleFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBundleFetcher")
            .field("has_token", &self.token.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}
