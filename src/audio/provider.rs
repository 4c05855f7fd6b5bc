use async_trait::async_trait;
use tracing::info;

use crate::audio::loader::AudioLoader;
use crate::audio::types::AudioBuffer;
use crate::error::{AudioError, Result};

/// Source of the background track for a compilation.
///
/// Called once per compilation request; failures are not retried.
#[async_trait]
pub trait AudioProvider: Send + Sync {
    /// Where the track comes from, for logs and error messages
    fn locator(&self) -> &str;

    async fn load(&self) -> Result<AudioBuffer>;
}

/// Loads the track from a URL (`http://`, `https://`) or a file path
pub struct LocatorAudioProvider {
    locator: String,
    client: reqwest::Client,
}

impl LocatorAudioProvider {
    pub fn new<S: Into<String>>(locator: S) -> Self {
        Self {
            locator: locator.into(),
            client: reqwest::Client::new(),
        }
    }

    fn is_remote(&self) -> bool {
        self.locator.starts_with("http://") || self.locator.starts_with("https://")
    }

    fn fetch_failure<S: Into<String>>(&self, reason: S) -> AudioError {
        AudioError::FetchFailure {
            locator: self.locator.clone(),
            reason: reason.into(),
        }
    }

    async fn fetch(&self) -> Result<Vec<u8>> {
        if self.is_remote() {
            let response = self
                .client
                .get(&self.locator)
                .send()
                .await
                .map_err(|e| self.fetch_failure(e.to_string()))?
                .error_for_status()
                .map_err(|e| self.fetch_failure(e.to_string()))?;

            let bytes = response
                .bytes()
                .await
                .map_err(|e| self.fetch_failure(e.to_string()))?;
            Ok(bytes.to_vec())
        } else {
            let path = self.locator.strip_prefix("file://").unwrap_or(&self.locator);
            tokio::fs::read(path)
                .await
                .map_err(|e| self.fetch_failure(e.to_string()).into())
        }
    }
}

#[async_trait]
impl AudioProvider for LocatorAudioProvider {
    fn locator(&self) -> &str {
        &self.locator
    }

    async fn load(&self) -> Result<AudioBuffer> {
        info!("Fetching background audio from {}", self.locator);
        let bytes = self.fetch().await?;
        AudioLoader::decode(bytes, &self.locator)
    }
}
