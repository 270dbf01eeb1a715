use roomify_contracts::project::{NavigationSeed, Project};

/// Decides which project snapshot a view works from.
///
/// The navigation seed gives an immediate snapshot. A stored record is
/// fetched only when the seed lacks a source image, at most once per view,
/// and the fetched record replaces the seed snapshot outright.
#[derive(Debug, Clone)]
pub struct HydrationResolver {
    id: Option<String>,
    snapshot: Option<Project>,
    loading: bool,
    fetch_attempted: bool,
}

impl HydrationResolver {
    pub fn new(id: Option<&str>, seed: &NavigationSeed) -> Self {
        let id = id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string);
        let snapshot = id.as_deref().map(|id| Project::from_seed(id, seed));
        Self {
            id,
            snapshot,
            loading: false,
            fetch_attempted: false,
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn snapshot(&self) -> Option<&Project> {
        self.snapshot.as_ref()
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn fetch_attempted(&self) -> bool {
        self.fetch_attempted
    }

    fn needs_fetch(&self) -> bool {
        let source_known = self
            .snapshot
            .as_ref()
            .map(|project| project.source_image.is_some())
            .unwrap_or(false);
        self.id.is_some() && !source_known && !self.loading && !self.fetch_attempted
    }

    /// Marks a fetch as started and returns the id to fetch, or `None`
    /// when the snapshot is already sufficient or a fetch already ran.
    pub fn begin_fetch(&mut self) -> Option<String> {
        if !self.needs_fetch() {
            return None;
        }
        self.loading = true;
        self.fetch_attempted = true;
        self.id.clone()
    }

    /// Settles an in-flight fetch. `None` means the store had no record.
    pub fn finish_fetch(&mut self, fetched: Option<Project>) {
        self.loading = false;
        if let Some(project) = fetched {
            self.snapshot = Some(project);
        }
    }

    /// Swaps in a newer snapshot (e.g. after a render was folded in).
    pub fn replace(&mut self, project: Project) {
        self.snapshot = Some(project);
    }

    /// True when no usable snapshot exists and nothing more will arrive.
    pub fn is_missing(&self) -> bool {
        !self.loading
            && self
                .snapshot
                .as_ref()
                .map(|project| project.source_image.is_none())
                .unwrap_or(true)
    }
}
