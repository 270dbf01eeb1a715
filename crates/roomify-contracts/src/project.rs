use std::fmt;

use serde::{Deserialize, Serialize};

use crate::image::CanonicalImage;
use crate::styles::DEFAULT_STYLE;

/// A floor plan and (once generated) its render.
///
/// Field names serialize in camelCase so records written by the web client
/// load unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_image: Option<CanonicalImage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rendered_image: Option<CanonicalImage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rendered_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,
}

impl Project {
    pub fn new(id: impl Into<String>, source_image: CanonicalImage, timestamp: i64) -> Self {
        let id = id.into();
        Self {
            name: Some(default_name(&id)),
            id,
            source_image: Some(source_image),
            rendered_image: None,
            rendered_path: None,
            style: None,
            timestamp,
            owner_id: None,
            is_public: None,
        }
    }

    /// Snapshot synthesized from navigation state. Only the fields the seed
    /// carries are filled; ownership, visibility and storage locators stay
    /// unknown until a stored record replaces this snapshot.
    pub fn from_seed(id: &str, seed: &NavigationSeed) -> Self {
        let source_image = seed.initial_image.clone();
        let rendered_image = source_image
            .as_ref()
            .and_then(|_| seed.initial_rendered.clone());
        Self {
            id: id.to_string(),
            name: seed.name.clone(),
            source_image,
            rendered_image,
            rendered_path: None,
            style: seed.style.clone(),
            timestamp: 0,
            owner_id: None,
            is_public: None,
        }
    }

    pub fn display_name(&self) -> String {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| default_name(&self.id))
    }

    pub fn style_label(&self) -> &str {
        self.style
            .as_deref()
            .map(str::trim)
            .filter(|style| !style.is_empty())
            .unwrap_or(DEFAULT_STYLE)
    }

    pub fn is_public(&self) -> bool {
        self.is_public.unwrap_or(false)
    }

    pub fn has_render(&self) -> bool {
        self.source_image.is_some() && self.rendered_image.is_some()
    }

    /// Gallery thumbnail: the render when there is one, the plan otherwise.
    pub fn preview_image(&self) -> Option<&CanonicalImage> {
        self.rendered_image.as_ref().or(self.source_image.as_ref())
    }

    /// Folds a successful render into a copy of this project.
    ///
    /// Returns `None` when the result carries no image or when the project
    /// has no source image to attach it to.
    pub fn with_render(
        &self,
        result: &GenerationResult,
        ambient_owner: Option<&str>,
        timestamp: i64,
    ) -> Option<Self> {
        self.source_image.as_ref()?;
        let rendered_image = result.rendered_image.clone()?;
        let mut updated = self.clone();
        updated.rendered_image = Some(rendered_image);
        updated.rendered_path = result.rendered_path.clone();
        updated.timestamp = timestamp;
        updated.owner_id = self
            .owner_id
            .clone()
            .or_else(|| ambient_owner.map(str::to_string));
        updated.is_public = Some(self.is_public());
        Some(updated)
    }
}

pub fn default_name(id: &str) -> String {
    format!("Residence {id}")
}

/// True when `id` can be used verbatim as a file stem: no separators, no
/// leading dot, no control characters.
pub fn is_file_safe_id(id: &str) -> bool {
    !id.trim().is_empty()
        && !id.starts_with('.')
        && !id
            .chars()
            .any(|ch| matches!(ch, '/' | '\\' | ':') || ch.is_control())
}

/// Out-of-band state handed to a freshly mounted project view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationSeed {
    #[serde(default)]
    pub initial_image: Option<CanonicalImage>,
    #[serde(default)]
    pub initial_rendered: Option<CanonicalImage>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub style: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    pub rendered_image: Option<CanonicalImage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rendered_path: Option<String>,
}

impl GenerationResult {
    pub fn rendered(image: CanonicalImage) -> Self {
        Self {
            rendered_image: Some(image),
            rendered_path: None,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Private,
    Public,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Public => "public",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
