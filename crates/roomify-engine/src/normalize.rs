use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::Client as HttpClient;
use roomify_contracts::errors::FetchError;
use roomify_contracts::image::{normalize_media_type, CanonicalImage, ImageRef};

const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Turns any image reference into a [`CanonicalImage`].
///
/// Inline images are returned untouched; URLs are read once and encoded
/// with the media type the server declared.
#[derive(Debug, Clone)]
pub struct ImageNormalizer {
    http: HttpClient,
    timeout: Duration,
}

impl Default for ImageNormalizer {
    fn default() -> Self {
        Self::new(HttpClient::new(), DEFAULT_FETCH_TIMEOUT)
    }
}

impl ImageNormalizer {
    pub fn new(http: HttpClient, timeout: Duration) -> Self {
        Self { http, timeout }
    }

    pub async fn normalize(&self, reference: &ImageRef) -> Result<CanonicalImage, FetchError> {
        match reference {
            ImageRef::Inline(image) => Ok(image.clone()),
            ImageRef::Url(url) => self.fetch_as_canonical(url).await,
        }
    }

    pub async fn normalize_str(&self, raw: &str) -> Result<CanonicalImage, FetchError> {
        let reference = ImageRef::parse(raw)?;
        self.normalize(&reference).await
    }

    async fn fetch_as_canonical(&self, url: &str) -> Result<CanonicalImage, FetchError> {
        let transport = |err: reqwest::Error| FetchError::Transport {
            url: url.to_string(),
            reason: err.to_string(),
        };
        let response = self
            .http
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("").to_string(),
            });
        }

        let media_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(normalize_media_type)
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let bytes = response.bytes().await.map_err(transport)?;
        tracing::debug!(url, media_type = %media_type, size = bytes.len(), "fetched remote image");
        Ok(CanonicalImage::from_bytes(&media_type, &bytes))
    }
}
