use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client as HttpClient, StatusCode};
use roomify_contracts::errors::GenerationError;
use roomify_contracts::image::{CanonicalImage, ImageRef};
use roomify_contracts::project::GenerationResult;
use roomify_contracts::styles::StyleCatalog;
use serde_json::{json, Value};

use super::{GenerationClient, GenerationRequest};
use crate::config::GeminiSettings;
use crate::normalize::ImageNormalizer;

const PROVIDER: &str = "gemini";
const ERROR_BODY_MAX_CHARS: usize = 512;

pub struct GeminiGenerator {
    api_base: String,
    api_key: Option<String>,
    model: String,
    http: HttpClient,
    timeout: Duration,
    normalizer: ImageNormalizer,
    styles: StyleCatalog,
}

impl GeminiGenerator {
    pub fn new(settings: &GeminiSettings, timeout: Duration) -> Self {
        let http = HttpClient::new();
        Self {
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            normalizer: ImageNormalizer::new(http.clone(), timeout),
            http,
            timeout,
            styles: StyleCatalog::default(),
        }
    }

    fn endpoint(&self) -> String {
        let trimmed = self.model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn build_payload(&self, request: &GenerationRequest) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [
                    {
                        "inlineData": {
                            "mimeType": request.source_image.media_type(),
                            "data": request.source_image.payload(),
                        }
                    },
                    { "text": render_prompt(&self.styles, &request.style) },
                ],
            }],
            "generationConfig": {
                "candidateCount": 1,
                "responseModalities": ["IMAGE"],
                "imageConfig": { "aspectRatio": "1:1" },
            },
        })
    }

    async fn post(&self, api_key: &str, payload: &Value) -> Result<Value, GenerationError> {
        let response = self
            .http
            .post(self.endpoint())
            .query(&[("key", api_key)])
            .timeout(self.timeout)
            .json(payload)
            .send()
            .await
            .map_err(|err| GenerationError::Transport {
                provider: PROVIDER.to_string(),
                message: err.to_string(),
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| GenerationError::Transport {
                provider: PROVIDER.to_string(),
                message: format!("response body read failed: {err}"),
            })?;
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(GenerationError::Quota {
                provider: PROVIDER.to_string(),
            });
        }
        if !status.is_success() {
            return Err(GenerationError::Http {
                provider: PROVIDER.to_string(),
                status: status.as_u16(),
                body: truncate_text(&body, ERROR_BODY_MAX_CHARS),
            });
        }
        serde_json::from_str(&body).map_err(|err| GenerationError::Payload {
            provider: PROVIDER.to_string(),
            message: format!("invalid JSON payload: {err}"),
        })
    }
}

#[async_trait]
impl GenerationClient for GeminiGenerator {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResult, GenerationError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(GenerationError::NotConfigured {
                provider: PROVIDER.to_string(),
                reason: "GEMINI_API_KEY or GOOGLE_API_KEY not set".to_string(),
            });
        };
        let payload = self.build_payload(request);
        tracing::debug!(model = %self.model, style = %request.style, "requesting gemini render");
        let response = self.post(api_key, &payload).await?;

        let Some(reference) = extract_image_refs(&response)?.into_iter().next() else {
            tracing::debug!(
                finish_reason = ?first_finish_reason(&response),
                "gemini answered without an image"
            );
            return Ok(GenerationResult::empty());
        };
        let rendered = self.normalizer.normalize(&reference).await?;
        Ok(GenerationResult::rendered(rendered))
    }
}

/// Builds the instruction sent next to the plan.
pub fn render_prompt(styles: &StyleCatalog, style: &str) -> String {
    let look = match styles.get(style) {
        Some(spec) => format!("{} ({})", spec.label, spec.description.to_lowercase()),
        None => style.trim().to_string(),
    };
    format!(
        "Turn this 2D architectural floor plan into a photorealistic top-down 3D render \
         of the furnished space in a {look} interior style. Keep every wall, door, \
         window and room boundary exactly where the plan draws it. Remove all text, \
         dimensions and annotations. Use soft natural lighting and realistic materials."
    )
}

fn extract_image_refs(response: &Value) -> Result<Vec<ImageRef>, GenerationError> {
    let candidates = response
        .get("candidates")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let mut out = Vec::new();

    for candidate in candidates {
        let parts = candidate
            .get("content")
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for part in parts {
            if let Some(inline) = part
                .get("inlineData")
                .or_else(|| part.get("inline_data"))
                .and_then(Value::as_object)
            {
                let data = inline
                    .get("data")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                if data.is_empty() {
                    continue;
                }
                let mime_type = inline
                    .get("mimeType")
                    .or_else(|| inline.get("mime_type"))
                    .and_then(Value::as_str)
                    .unwrap_or("image/png");
                let image = CanonicalImage::parse(format!("data:{mime_type};base64,{data}"))
                    .map_err(|err| GenerationError::Payload {
                        provider: PROVIDER.to_string(),
                        message: err.to_string(),
                    })?;
                out.push(ImageRef::Inline(image));
                continue;
            }
            if let Some(uri) = part
                .get("fileData")
                .or_else(|| part.get("file_data"))
                .and_then(|file| file.get("fileUri").or_else(|| file.get("file_uri")))
                .and_then(Value::as_str)
                .filter(|uri| !uri.trim().is_empty())
            {
                out.push(ImageRef::Url(uri.trim().to_string()));
            }
        }
    }

    Ok(out)
}

fn first_finish_reason(response: &Value) -> Option<String> {
    response
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|rows| rows.first())
        .and_then(|candidate| candidate.get("finishReason"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
