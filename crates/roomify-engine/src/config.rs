use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use roomify_contracts::events::EventWriter;

use crate::flight::FlightTable;
use crate::generation::{default_registry, GeminiGenerator, GenerationClient, GeneratorRegistry};
use crate::orchestrator::Orchestrator;
use crate::store::{JsonFileStore, ProjectStore};

pub const DEFAULT_DATA_DIR: &str = ".roomify";
pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash-image-preview";
const DEFAULT_REQUEST_TIMEOUT_S: f64 = 90.0;
const MIN_REQUEST_TIMEOUT_S: f64 = 15.0;
const MAX_REQUEST_TIMEOUT_S: f64 = 300.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Dryrun,
    Gemini,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dryrun => "dryrun",
            Self::Gemini => "gemini",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "dryrun" | "dry-run" | "offline" => Ok(Self::Dryrun),
            "gemini" | "google" => Ok(Self::Gemini),
            other => bail!("unknown provider '{other}' (expected dryrun or gemini)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeminiSettings {
    pub api_base: String,
    pub api_key: Option<String>,
    pub model: String,
}

impl Default for GeminiSettings {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_GEMINI_API_BASE.to_string(),
            api_key: None,
            model: DEFAULT_GEMINI_MODEL.to_string(),
        }
    }
}

/// Runtime settings, resolved from the process environment layered over an
/// optional `<data_dir>/.env` file.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub data_dir: PathBuf,
    pub provider: ProviderKind,
    pub gemini: GeminiSettings,
    pub request_timeout: Duration,
    pub dedupe_across_views: bool,
    pub owner_id: Option<String>,
}

impl EngineConfig {
    /// `data_dir` overrides `ROOMIFY_DATA_DIR` and decides which `.env` is read.
    pub fn from_env(data_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = data_dir
            .or_else(|| non_empty_env("ROOMIFY_DATA_DIR").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
        let dotenv = parse_dotenv(&data_dir.join(".env"));
        Self::from_lookup(data_dir, |key| {
            non_empty_env(key).or_else(|| {
                dotenv
                    .get(key)
                    .map(|value| value.trim().to_string())
                    .filter(|value| !value.is_empty())
            })
        })
    }

    pub fn from_lookup<F>(data_dir: PathBuf, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("GEMINI_API_KEY").or_else(|| lookup("GOOGLE_API_KEY"));
        let provider = match lookup("ROOMIFY_PROVIDER") {
            Some(raw) => raw
                .parse::<ProviderKind>()
                .context("invalid ROOMIFY_PROVIDER")?,
            None if api_key.is_some() => ProviderKind::Gemini,
            None => ProviderKind::Dryrun,
        };
        let gemini = GeminiSettings {
            api_base: lookup("GEMINI_API_BASE")
                .unwrap_or_else(|| DEFAULT_GEMINI_API_BASE.to_string()),
            api_key,
            model: lookup("ROOMIFY_GEMINI_MODEL")
                .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
        };
        let timeout_s = value_as_f64(
            lookup("ROOMIFY_REQUEST_TIMEOUT_S").as_deref(),
            DEFAULT_REQUEST_TIMEOUT_S,
            MIN_REQUEST_TIMEOUT_S,
            MAX_REQUEST_TIMEOUT_S,
        );
        let dedupe_across_views = lookup("ROOMIFY_DEDUPE_ACROSS_VIEWS")
            .and_then(|raw| value_as_bool(&raw))
            .unwrap_or(true);

        Ok(Self {
            data_dir,
            provider,
            gemini,
            request_timeout: Duration::from_secs_f64(timeout_s),
            dedupe_across_views,
            owner_id: lookup("ROOMIFY_OWNER_ID"),
        })
    }

    pub fn events_path(&self) -> PathBuf {
        self.data_dir.join("events.jsonl")
    }

    pub fn build_registry(&self) -> GeneratorRegistry {
        default_registry(GeminiGenerator::new(&self.gemini, self.request_timeout))
    }

    pub fn build_generator(&self) -> Result<Arc<dyn GenerationClient>> {
        let registry = self.build_registry();
        registry.get(self.provider.as_str()).with_context(|| {
            format!(
                "provider '{}' is not registered (available: {})",
                self.provider,
                registry.names().join(", ")
            )
        })
    }

    pub fn build_store(&self) -> Arc<dyn ProjectStore> {
        Arc::new(JsonFileStore::new(&self.data_dir))
    }

    pub fn build_orchestrator(
        &self,
        store: Arc<dyn ProjectStore>,
        events: Option<EventWriter>,
    ) -> Result<Orchestrator> {
        let mut orchestrator = Orchestrator::new(self.build_generator()?, store)
            .with_ambient_owner(self.owner_id.clone());
        if self.dedupe_across_views {
            orchestrator = orchestrator.with_flight_table(Arc::new(FlightTable::new()));
        }
        if let Some(events) = events {
            orchestrator = orchestrator.with_events(events);
        }
        Ok(orchestrator)
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// `KEY=value` lines; `#` comments, `export ` prefixes and matching quotes
/// are stripped. A missing file reads as empty.
pub fn parse_dotenv(path: &Path) -> HashMap<String, String> {
    let content = std::fs::read_to_string(path).unwrap_or_default();
    let mut vars = HashMap::new();
    for raw_line in content.lines() {
        let mut line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(stripped) = line.strip_prefix("export ") {
            line = stripped.trim();
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value.trim();
        let unquoted = [('"', '"'), ('\'', '\'')]
            .iter()
            .find_map(|(open, close)| {
                value
                    .strip_prefix(*open)
                    .and_then(|rest| rest.strip_suffix(*close))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), unquoted.to_string());
    }
    vars
}

fn value_as_f64(raw: Option<&str>, default: f64, min: f64, max: f64) -> f64 {
    raw.and_then(|text| text.trim().parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .unwrap_or(default)
        .clamp(min, max)
}

fn value_as_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
