use std::fmt;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const DATA_SCHEME: &str = "data:";
const BASE64_MARKER: &str = "base64";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageFormatError {
    #[error("image payload is not a data URL")]
    MissingScheme,
    #[error("image payload has no ',' separator")]
    MissingSeparator,
    #[error("image payload has no media type")]
    MissingMediaType,
    #[error("image payload is not base64 encoded")]
    NotBase64,
    #[error("image payload base64 decode failed: {0}")]
    Decode(String),
}

/// Self-describing inline image: `data:<media-type>;base64,<payload>`.
///
/// Construction only checks the envelope; the payload is decoded lazily by
/// [`CanonicalImage::split`], so an image can be stored and compared as
/// plain text without paying for a decode.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CanonicalImage {
    raw: String,
    media_end: usize,
    payload_start: usize,
}

impl CanonicalImage {
    pub fn parse(raw: impl Into<String>) -> Result<Self, ImageFormatError> {
        let raw = raw.into();
        let Some(rest) = raw.strip_prefix(DATA_SCHEME) else {
            return Err(ImageFormatError::MissingScheme);
        };
        let Some(comma) = rest.find(',') else {
            return Err(ImageFormatError::MissingSeparator);
        };
        let header = &rest[..comma];
        let mut params = header.split(';');
        let media_type = params.next().unwrap_or_default();
        if media_type.trim().is_empty() {
            return Err(ImageFormatError::MissingMediaType);
        }
        if !params.any(|param| param.trim().eq_ignore_ascii_case(BASE64_MARKER)) {
            return Err(ImageFormatError::NotBase64);
        }
        let media_end = DATA_SCHEME.len() + media_type.len();
        let payload_start = DATA_SCHEME.len() + comma + 1;
        Ok(Self {
            raw,
            media_end,
            payload_start,
        })
    }

    pub fn from_bytes(media_type: &str, bytes: &[u8]) -> Self {
        let media_type = normalize_media_type(media_type);
        let raw = format!("{DATA_SCHEME}{media_type};{BASE64_MARKER},{}", BASE64.encode(bytes));
        let media_end = DATA_SCHEME.len() + media_type.len();
        let payload_start = media_end + 1 + BASE64_MARKER.len() + 1;
        Self {
            raw,
            media_end,
            payload_start,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn media_type(&self) -> &str {
        self.raw[DATA_SCHEME.len()..self.media_end].trim()
    }

    /// Base64 text after the comma, as providers want it.
    pub fn payload(&self) -> &str {
        &self.raw[self.payload_start..]
    }

    pub fn split(&self) -> Result<(String, Vec<u8>), ImageFormatError> {
        let bytes = BASE64
            .decode(self.payload().trim().as_bytes())
            .map_err(|err| ImageFormatError::Decode(err.to_string()))?;
        Ok((self.media_type().to_string(), bytes))
    }

    pub fn file_extension(&self) -> &'static str {
        extension_for_media_type(self.media_type())
    }
}

impl fmt::Display for CanonicalImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl TryFrom<String> for CanonicalImage {
    type Error = ImageFormatError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<CanonicalImage> for String {
    fn from(value: CanonicalImage) -> Self {
        value.raw
    }
}

/// Anything a caller may hand over as an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageRef {
    Inline(CanonicalImage),
    Url(String),
}

impl ImageRef {
    pub fn parse(raw: &str) -> Result<Self, ImageFormatError> {
        let trimmed = raw.trim();
        if trimmed.starts_with(DATA_SCHEME) {
            return CanonicalImage::parse(trimmed).map(Self::Inline);
        }
        Ok(Self::Url(trimmed.to_string()))
    }
}

impl From<CanonicalImage> for ImageRef {
    fn from(value: CanonicalImage) -> Self {
        Self::Inline(value)
    }
}

pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

pub fn extension_for_media_type(media_type: &str) -> &'static str {
    let lowered = media_type.to_ascii_lowercase();
    if lowered.contains("jpeg") || lowered.contains("jpg") {
        return "jpg";
    }
    if lowered.contains("webp") {
        return "webp";
    }
    if lowered.contains("gif") {
        return "gif";
    }
    if lowered.contains("png") {
        return "png";
    }
    "bin"
}

/// Strips parameters (`; charset=...`) and whitespace from a declared type.
pub fn normalize_media_type(raw: &str) -> String {
    let base = raw.split(';').next().unwrap_or_default().trim();
    if base.is_empty() {
        return "application/octet-stream".to_string();
    }
    base.to_ascii_lowercase()
}
