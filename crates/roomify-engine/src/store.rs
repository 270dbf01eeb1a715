use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use roomify_contracts::errors::PersistenceError;
use roomify_contracts::project::{is_file_safe_id, Project, Visibility};
use serde_json::{Map, Value};

/// Durable record of projects.
///
/// `create` upserts by id and answers with the record as stored, which may
/// carry fields the caller did not set (storage locator, visibility).
/// `Ok(None)` means the store declined the write without failing.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn create(
        &self,
        project: &Project,
        visibility: Visibility,
    ) -> Result<Option<Project>, PersistenceError>;

    async fn get_by_id(&self, id: &str) -> Result<Option<Project>, PersistenceError>;

    /// Every stored project, newest first.
    async fn list(&self) -> Result<Vec<Project>, PersistenceError>;
}

fn validate(project: &Project) -> Result<(), PersistenceError> {
    if project.id.trim().is_empty() {
        return Err(PersistenceError::Rejected {
            id: project.id.clone(),
            reason: "empty project id".to_string(),
        });
    }
    if !is_file_safe_id(&project.id) {
        return Err(PersistenceError::Rejected {
            id: project.id.clone(),
            reason: "project id is not a safe file name".to_string(),
        });
    }
    if project.source_image.is_none() {
        return Err(PersistenceError::Rejected {
            id: project.id.clone(),
            reason: "project has no source image".to_string(),
        });
    }
    Ok(())
}

fn newest_first(mut projects: Vec<Project>) -> Vec<Project> {
    projects.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
    projects
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    projects: Mutex<BTreeMap<String, Project>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_projects(projects: impl IntoIterator<Item = Project>) -> Self {
        let store = Self::new();
        {
            let mut map = store
                .projects
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            for project in projects {
                map.insert(project.id.clone(), project);
            }
        }
        store
    }
}

#[async_trait]
impl ProjectStore for MemoryStore {
    async fn create(
        &self,
        project: &Project,
        visibility: Visibility,
    ) -> Result<Option<Project>, PersistenceError> {
        validate(project)?;
        let mut stored = project.clone();
        stored.is_public = Some(visibility == Visibility::Public);
        if let Some(rendered) = &stored.rendered_image {
            stored.rendered_path = Some(format!(
                "memory://{}/rendered.{}",
                stored.id,
                rendered.file_extension()
            ));
        }
        self.projects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(stored.id.clone(), stored.clone());
        Ok(Some(stored))
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Project>, PersistenceError> {
        Ok(self
            .projects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<Project>, PersistenceError> {
        let projects = self
            .projects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        Ok(newest_first(projects))
    }
}

/// Projects kept in `<root>/projects.json` as an id-keyed object.
///
/// Each write re-reads the file and merges the single changed key, so two
/// processes sharing a data directory do not drop each other's projects.
/// Renders are also written out as files under `<root>/renders/`.
#[derive(Debug)]
pub struct JsonFileStore {
    root: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn projects_path(&self) -> PathBuf {
        self.root.join("projects.json")
    }

    async fn read_all(&self) -> Result<Map<String, Value>, PersistenceError> {
        let path = self.projects_path();
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(err) => return Err(io_error(&path, err)),
        };
        if raw.trim().is_empty() {
            return Ok(Map::new());
        }
        let parsed: Value = serde_json::from_str(&raw).map_err(|err| corrupt(&path, err))?;
        match parsed {
            Value::Object(map) => Ok(map),
            _ => Err(PersistenceError::Corrupt {
                path: path.display().to_string(),
                message: "expected a JSON object keyed by project id".to_string(),
            }),
        }
    }

    async fn write_all(&self, payload: &Map<String, Value>) -> Result<(), PersistenceError> {
        let path = self.projects_path();
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|err| io_error(&self.root, err))?;
        let text = serde_json::to_string_pretty(&Value::Object(payload.clone()))
            .map_err(|err| corrupt(&path, err))?;
        let staging = self.root.join("projects.json.tmp");
        tokio::fs::write(&staging, text)
            .await
            .map_err(|err| io_error(&staging, err))?;
        tokio::fs::rename(&staging, &path)
            .await
            .map_err(|err| io_error(&path, err))
    }

    async fn write_render(&self, project: &Project) -> Result<Option<String>, PersistenceError> {
        let Some(rendered) = &project.rendered_image else {
            return Ok(None);
        };
        let relative = format!("renders/{}.{}", project.id, rendered.file_extension());
        let target = self.root.join(&relative);
        let (_, bytes) = rendered
            .split()
            .map_err(|err| PersistenceError::Rejected {
                id: project.id.clone(),
                reason: err.to_string(),
            })?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| io_error(parent, err))?;
        }
        tokio::fs::write(&target, bytes)
            .await
            .map_err(|err| io_error(&target, err))?;
        Ok(Some(relative))
    }
}

#[async_trait]
impl ProjectStore for JsonFileStore {
    async fn create(
        &self,
        project: &Project,
        visibility: Visibility,
    ) -> Result<Option<Project>, PersistenceError> {
        validate(project)?;
        let _guard = self.write_lock.lock().await;

        let mut stored = project.clone();
        stored.is_public = Some(visibility == Visibility::Public);
        if let Some(relative) = self.write_render(&stored).await? {
            stored.rendered_path = Some(relative);
        }

        let path = self.projects_path();
        let mut on_disk = self.read_all().await?;
        let value = serde_json::to_value(&stored).map_err(|err| corrupt(&path, err))?;
        on_disk.insert(stored.id.clone(), value);
        self.write_all(&on_disk).await?;
        tracing::debug!(project_id = %stored.id, visibility = %visibility, "project stored");
        Ok(Some(stored))
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Project>, PersistenceError> {
        let path = self.projects_path();
        let on_disk = self.read_all().await?;
        on_disk
            .get(id)
            .cloned()
            .map(|value| serde_json::from_value(value).map_err(|err| corrupt(&path, err)))
            .transpose()
    }

    async fn list(&self) -> Result<Vec<Project>, PersistenceError> {
        let path = self.projects_path();
        let on_disk = self.read_all().await?;
        let mut projects = Vec::with_capacity(on_disk.len());
        for (id, value) in on_disk {
            match serde_json::from_value::<Project>(value) {
                Ok(project) => projects.push(project),
                Err(err) => {
                    tracing::warn!(path = %path.display(), project_id = %id, error = %err, "skipping unreadable project");
                }
            }
        }
        Ok(newest_first(projects))
    }
}

fn io_error(path: &Path, err: std::io::Error) -> PersistenceError {
    PersistenceError::Io {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}

fn corrupt(path: &Path, err: serde_json::Error) -> PersistenceError {
    PersistenceError::Corrupt {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}
