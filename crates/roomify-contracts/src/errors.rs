use thiserror::Error;

use crate::image::ImageFormatError;

/// Remote image could not be turned into a canonical image.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("failed to fetch image {url}: {reason}")]
    Transport { url: String, reason: String },
    #[error("failed to fetch image {url}: {status} {reason}")]
    Status {
        url: String,
        status: u16,
        reason: String,
    },
    #[error("invalid image reference: {0}")]
    Format(#[from] ImageFormatError),
}

/// Provider-side render failure.
///
/// `Clone` so a single in-flight render can be awaited by several views.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("{provider} is not configured: {reason}")]
    NotConfigured { provider: String, reason: String },
    #[error("invalid source image: {0}")]
    InvalidInput(String),
    #[error("{provider} transport error: {message}")]
    Transport { provider: String, message: String },
    #[error("{provider} request failed ({status}): {body}")]
    Http {
        provider: String,
        status: u16,
        body: String,
    },
    #[error("{provider} quota exhausted")]
    Quota { provider: String },
    #[error("{provider} returned an unreadable payload: {message}")]
    Payload { provider: String, message: String },
    #[error("rendered image could not be fetched: {0}")]
    Output(#[from] FetchError),
}

impl GenerationError {
    /// Whether an identical request has a reasonable chance of succeeding later.
    pub fn should_retry(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::Quota { .. } | Self::Output(_) => true,
            Self::Http { status, .. } => (500..=599).contains(status),
            _ => false,
        }
    }
}

impl From<ImageFormatError> for GenerationError {
    fn from(value: ImageFormatError) -> Self {
        Self::InvalidInput(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistenceError {
    #[error("project store io error at {path}: {message}")]
    Io { path: String, message: String },
    #[error("project store at {path} is corrupt: {message}")]
    Corrupt { path: String, message: String },
    #[error("project {id} rejected: {reason}")]
    Rejected { id: String, reason: String },
}
