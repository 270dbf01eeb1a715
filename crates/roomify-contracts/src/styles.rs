use indexmap::IndexMap;

pub const DEFAULT_STYLE: &str = "Modern Minimalist";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleSpec {
    pub label: String,
    pub description: String,
    pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleSelection {
    pub label: String,
    pub spec: Option<StyleSpec>,
    pub fallback_reason: Option<String>,
}

/// Ordered catalog of the render aesthetics offered on upload.
#[derive(Debug, Clone)]
pub struct StyleCatalog {
    styles: IndexMap<String, StyleSpec>,
}

impl Default for StyleCatalog {
    fn default() -> Self {
        Self::new(None)
    }
}

impl StyleCatalog {
    pub fn new(styles: Option<IndexMap<String, StyleSpec>>) -> Self {
        Self {
            styles: styles.unwrap_or_else(default_styles),
        }
    }

    pub fn get(&self, label: &str) -> Option<&StyleSpec> {
        self.styles.get(label).or_else(|| {
            self.styles
                .values()
                .find(|spec| spec.label.eq_ignore_ascii_case(label.trim()))
        })
    }

    pub fn list(&self) -> impl Iterator<Item = &StyleSpec> {
        self.styles.values()
    }

    /// Resolves the label a render should use.
    ///
    /// Labels outside the catalog are kept verbatim: deciding what an
    /// unknown aesthetic means is the generation backend's call.
    pub fn select(&self, requested: Option<&str>) -> StyleSelection {
        let requested = requested.map(str::trim).filter(|value| !value.is_empty());
        let Some(requested) = requested else {
            return StyleSelection {
                label: DEFAULT_STYLE.to_string(),
                spec: self.get(DEFAULT_STYLE).cloned(),
                fallback_reason: Some("No style specified; using default.".to_string()),
            };
        };
        match self.get(requested) {
            Some(spec) => StyleSelection {
                label: spec.label.clone(),
                spec: Some(spec.clone()),
                fallback_reason: None,
            },
            None => StyleSelection {
                label: requested.to_string(),
                spec: None,
                fallback_reason: Some(format!(
                    "Style '{requested}' is not in the catalog; passing it through."
                )),
            },
        }
    }
}

fn default_styles() -> IndexMap<String, StyleSpec> {
    let mut map = IndexMap::new();
    let mut insert = |label: &str, icon: &str, description: &str| {
        map.insert(
            label.to_string(),
            StyleSpec {
                label: label.to_string(),
                description: description.to_string(),
                icon: icon.to_string(),
            },
        );
    };

    insert(DEFAULT_STYLE, "✨", "Clean lines, neutral tones");
    insert("Industrial Loft", "🧱", "Exposed brick, raw metals");
    insert("Japanese Zen", "🎋", "Natural wood, warm lighting");
    insert("Mid-Century", "🛋️", "Retro furniture, bold colors");
    map
}
