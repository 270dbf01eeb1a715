use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use roomify_contracts::events::EventWriter;
use roomify_contracts::image::CanonicalImage;
use roomify_contracts::project::{NavigationSeed, Project, Visibility};
use roomify_contracts::styles::StyleCatalog;
use serde_json::{json, Value};

use crate::orchestrator::write_event;
use crate::store::ProjectStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Stored; `seed` is what the detail view should mount with.
    Created {
        project: Project,
        seed: NavigationSeed,
    },
    /// Another upload is still being created.
    Busy,
    Failed {
        reason: String,
    },
}

/// Creates new projects from uploaded plans, one at a time.
pub struct UploadFlow {
    store: Arc<dyn ProjectStore>,
    events: Option<EventWriter>,
    styles: StyleCatalog,
    creating: AtomicBool,
    last_id: AtomicI64,
}

struct CreatingGuard<'a>(&'a AtomicBool);

impl Drop for CreatingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl UploadFlow {
    pub fn new(store: Arc<dyn ProjectStore>) -> Self {
        Self {
            store,
            events: None,
            styles: StyleCatalog::default(),
            creating: AtomicBool::new(false),
            last_id: AtomicI64::new(0),
        }
    }

    pub fn with_events(mut self, events: Option<EventWriter>) -> Self {
        self.events = events;
        self
    }

    pub fn is_creating(&self) -> bool {
        self.creating.load(Ordering::SeqCst)
    }

    /// Millisecond timestamp, bumped when two uploads land in the same ms.
    fn next_id(&self) -> String {
        let now = Utc::now().timestamp_millis();
        let mut previous = self.last_id.load(Ordering::SeqCst);
        loop {
            let candidate = now.max(previous + 1);
            match self.last_id.compare_exchange(
                previous,
                candidate,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return candidate.to_string(),
                Err(actual) => previous = actual,
            }
        }
    }

    pub async fn complete(&self, source: CanonicalImage, style: Option<&str>) -> UploadOutcome {
        if self
            .creating
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("upload ignored; another project is being created");
            return UploadOutcome::Busy;
        }
        let _creating = CreatingGuard(&self.creating);

        let selection = self.styles.select(style);
        if let Some(reason) = &selection.fallback_reason {
            tracing::info!(style = %selection.label, reason = %reason, "style fallback");
        }
        let id = self.next_id();
        let mut project = Project::new(&id, source, Utc::now().timestamp_millis());
        project.style = Some(selection.label.clone());

        let stored = match self.store.create(&project, Visibility::Private).await {
            Ok(Some(stored)) => stored,
            Ok(None) => {
                tracing::warn!(project_id = %id, "store declined new project");
                return UploadOutcome::Failed {
                    reason: "store declined the project".to_string(),
                };
            }
            Err(err) => {
                tracing::warn!(project_id = %id, error = %err, "failed to create project");
                return UploadOutcome::Failed {
                    reason: err.to_string(),
                };
            }
        };

        tracing::info!(project_id = %stored.id, style = %selection.label, "project created");
        if let Some(events) = &self.events {
            let payload = json!({
                "project_id": stored.id,
                "name": stored.display_name(),
                "style": selection.label,
                "media_type": stored.source_image.as_ref().map(|image| image.media_type()),
            });
            if let Value::Object(payload) = payload {
                write_event(events, "project_created", payload).await;
            }
        }

        let seed = NavigationSeed {
            initial_image: stored.source_image.clone(),
            initial_rendered: None,
            name: Some(stored.display_name()),
            style: Some(selection.label),
        };
        UploadOutcome::Created {
            project: stored,
            seed,
        }
    }
}
