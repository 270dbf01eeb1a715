use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use roomify_contracts::errors::GenerationError;
use roomify_contracts::image::CanonicalImage;
use roomify_contracts::project::GenerationResult;
use sha2::{Digest, Sha256};

mod gemini;

pub use gemini::GeminiGenerator;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub source_image: CanonicalImage,
    pub style: String,
}

/// Boundary to a render backend.
///
/// `Ok` with no `rendered_image` means the backend answered but produced
/// nothing; callers treat that like a failure for retry purposes.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    fn name(&self) -> &str;
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResult, GenerationError>;
}

#[derive(Default)]
pub struct GeneratorRegistry {
    providers: BTreeMap<String, Arc<dyn GenerationClient>>,
}

impl GeneratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P: GenerationClient + 'static>(&mut self, provider: P) {
        self.providers
            .insert(provider.name().to_string(), Arc::new(provider));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn GenerationClient>> {
        self.providers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }
}

/// Offline renderer: re-tints the plan with a color derived from the style.
pub struct DryrunGenerator;

#[async_trait]
impl GenerationClient for DryrunGenerator {
    fn name(&self) -> &str {
        "dryrun"
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResult, GenerationError> {
        let (_, bytes) = request.source_image.split()?;
        let tint = color_from_style(&request.style);
        let rendered = tokio::task::spawn_blocking(move || render_tinted_plan(&bytes, tint))
            .await
            .map_err(|err| GenerationError::Payload {
                provider: "dryrun".to_string(),
                message: err.to_string(),
            })??;
        Ok(GenerationResult::rendered(CanonicalImage::from_bytes(
            "image/png",
            &rendered,
        )))
    }
}

fn render_tinted_plan(bytes: &[u8], tint: (u8, u8, u8)) -> Result<Vec<u8>, GenerationError> {
    let source = image::load_from_memory(bytes)
        .map_err(|err| GenerationError::InvalidInput(err.to_string()))?;
    let luma = source.to_luma8();
    let (width, height) = luma.dimensions();
    let mut out = RgbImage::new(width, height);
    for (x, y, pixel) in luma.enumerate_pixels() {
        let level = u16::from(pixel[0]);
        let channel = |base: u8| ((level * u16::from(base)) / 255) as u8;
        out.put_pixel(x, y, Rgb([channel(tint.0), channel(tint.1), channel(tint.2)]));
    }

    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(out)
        .write_to(&mut buffer, ImageFormat::Png)
        .map_err(|err| GenerationError::Payload {
            provider: "dryrun".to_string(),
            message: err.to_string(),
        })?;
    Ok(buffer.into_inner())
}

fn color_from_style(style: &str) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(style.trim().to_ascii_lowercase().as_bytes());
    let digest = hasher.finalize();
    // Keep every channel bright enough that plan lines stay visible.
    let lift = |value: u8| 96 + value / 2;
    (lift(digest[0]), lift(digest[1]), lift(digest[2]))
}

/// Short content fingerprint for logs that must not carry the image itself.
pub fn image_digest(image: &CanonicalImage) -> String {
    let mut hasher = Sha256::new();
    hasher.update(image.as_str().as_bytes());
    hex::encode(&hasher.finalize()[..6])
}

pub fn default_registry(gemini: GeminiGenerator) -> GeneratorRegistry {
    let mut providers = GeneratorRegistry::new();
    providers.register(DryrunGenerator);
    providers.register(gemini);
    providers
}

#[cfg(test)]
pub(crate) fn sample_plan_png(width: u32, height: u32) -> Vec<u8> {
    let mut plan = RgbImage::new(width, height);
    for (x, y, pixel) in plan.enumerate_pixels_mut() {
        let wall = x == 0 || y == 0 || x + 1 == width || y + 1 == height;
        *pixel = if wall { Rgb([0, 0, 0]) } else { Rgb([255, 255, 255]) };
    }
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(plan)
        .write_to(&mut buffer, ImageFormat::Png)
        .unwrap_or_default();
    buffer.into_inner()
}
