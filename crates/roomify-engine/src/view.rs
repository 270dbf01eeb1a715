use std::fmt;

use chrono::Utc;
use roomify_contracts::errors::{GenerationError, PersistenceError};
use roomify_contracts::image::CanonicalImage;
use roomify_contracts::project::{GenerationResult, NavigationSeed, Project, Visibility};

use crate::generation::GenerationRequest;
use crate::guard::{GenerationGuard, GuardState};
use crate::hydration::HydrationResolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    /// No snapshot resolved yet.
    Idle,
    Hydrating,
    Hydrated,
    Generating,
    Ready,
    GenerationFailed,
    /// No id, or the store has no usable record for it.
    NotFound,
}

impl LifecyclePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Hydrating => "hydrating",
            Self::Hydrated => "hydrated",
            Self::Generating => "generating",
            Self::Ready => "ready",
            Self::GenerationFailed => "generation_failed",
            Self::NotFound => "not_found",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::GenerationFailed | Self::NotFound)
    }
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mount epoch a command was issued under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    epoch: u64,
}

/// Side effect the view wants performed. The view never performs I/O itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewCommand {
    Fetch {
        ticket: Ticket,
        id: String,
    },
    Generate {
        ticket: Ticket,
        project_id: String,
        request: GenerationRequest,
    },
    Persist {
        ticket: Ticket,
        project: Project,
        visibility: Visibility,
    },
}

impl ViewCommand {
    pub fn ticket(&self) -> Ticket {
        match self {
            Self::Fetch { ticket, .. }
            | Self::Generate { ticket, .. }
            | Self::Persist { ticket, .. } => *ticket,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewOutcome {
    Fetched(Result<Option<Project>, PersistenceError>),
    Generated(Result<GenerationResult, GenerationError>),
    Persisted(Result<Option<Project>, PersistenceError>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderFailure {
    Provider(GenerationError),
    /// The backend answered without an image.
    NoImage,
}

impl fmt::Display for RenderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Provider(err) => write!(f, "{err}"),
            Self::NoImage => f.write_str("generation produced no image"),
        }
    }
}

/// State machine for one mounted project detail view.
///
/// `sync` and `apply` are synchronous and return the commands to run next;
/// an async driver executes them and feeds each result back through
/// `apply` with the ticket it was issued under.
#[derive(Debug)]
pub struct ProjectView {
    resolver: HydrationResolver,
    guard: GenerationGuard,
    phase: LifecyclePhase,
    current_image: Option<CanonicalImage>,
    pending_render: Option<Project>,
    saved: Option<bool>,
    last_failure: Option<RenderFailure>,
    ambient_owner: Option<String>,
    epoch: u64,
    mounted: bool,
    generation_attempts: u32,
}

impl ProjectView {
    pub fn new(id: Option<&str>, seed: &NavigationSeed, ambient_owner: Option<String>) -> Self {
        let resolver = HydrationResolver::new(id, seed);
        let current_image = resolver
            .snapshot()
            .and_then(|project| project.rendered_image.clone());
        Self {
            resolver,
            guard: GenerationGuard::new(),
            phase: LifecyclePhase::Idle,
            current_image,
            pending_render: None,
            saved: None,
            last_failure: None,
            ambient_owner,
            epoch: 0,
            mounted: true,
            generation_attempts: 0,
        }
    }

    pub fn project_id(&self) -> Option<&str> {
        self.resolver.id()
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.phase
    }

    pub fn snapshot(&self) -> Option<&Project> {
        self.resolver.snapshot()
    }

    pub fn loading(&self) -> bool {
        self.resolver.loading()
    }

    pub fn current_image(&self) -> Option<&CanonicalImage> {
        self.current_image.as_ref()
    }

    /// `Some(false)` when a render is shown but the store did not confirm it.
    pub fn saved(&self) -> Option<bool> {
        self.saved
    }

    pub fn last_failure(&self) -> Option<&RenderFailure> {
        self.last_failure.as_ref()
    }

    pub fn guard_state(&self) -> GuardState {
        self.guard.state()
    }

    pub fn generation_attempts(&self) -> u32 {
        self.generation_attempts
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.mounted && ticket.epoch == self.epoch
    }

    pub fn title(&self) -> Option<String> {
        self.snapshot().map(Project::display_name)
    }

    /// Plan and render side by side, once both exist.
    pub fn compare_pair(&self) -> Option<(&CanonicalImage, &CanonicalImage)> {
        let source = self.snapshot()?.source_image.as_ref()?;
        let current = self.current_image.as_ref()?;
        Some((source, current))
    }

    pub fn exportable_image(&self) -> Option<&CanonicalImage> {
        match self.phase {
            LifecyclePhase::Ready => self.current_image.as_ref(),
            _ => None,
        }
    }

    fn ticket(&self) -> Ticket {
        Ticket { epoch: self.epoch }
    }

    /// Re-evaluates the view and returns any work that should start now.
    ///
    /// Safe to call any number of times: a fetch starts at most once and a
    /// render at most once per guard arm.
    pub fn sync(&mut self) -> Vec<ViewCommand> {
        if !self.mounted {
            return Vec::new();
        }
        if let Some(id) = self.resolver.begin_fetch() {
            self.phase = LifecyclePhase::Hydrating;
            return vec![ViewCommand::Fetch {
                ticket: self.ticket(),
                id,
            }];
        }
        if self.resolver.loading() {
            return Vec::new();
        }
        if matches!(self.phase, LifecyclePhase::Idle | LifecyclePhase::Hydrating) {
            self.phase = if self.resolver.is_missing() {
                LifecyclePhase::NotFound
            } else {
                LifecyclePhase::Hydrated
            };
        }
        if self.phase == LifecyclePhase::Hydrated {
            return self.trigger();
        }
        Vec::new()
    }

    fn trigger(&mut self) -> Vec<ViewCommand> {
        let Some(snapshot) = self.resolver.snapshot() else {
            return Vec::new();
        };
        if snapshot.has_render() {
            self.current_image = snapshot.rendered_image.clone();
            self.phase = LifecyclePhase::Ready;
            return Vec::new();
        }
        let Some(source_image) = snapshot.source_image.clone() else {
            return Vec::new();
        };
        let project_id = snapshot.id.clone();
        let style = snapshot.style_label().to_string();
        if !self.guard.try_acquire() {
            return Vec::new();
        }
        self.phase = LifecyclePhase::Generating;
        self.last_failure = None;
        self.generation_attempts += 1;
        vec![ViewCommand::Generate {
            ticket: self.ticket(),
            project_id,
            request: GenerationRequest {
                source_image,
                style,
            },
        }]
    }

    /// Feeds back the result of a command. Results from a retired mount are
    /// dropped without touching any state.
    pub fn apply(&mut self, ticket: Ticket, outcome: ViewOutcome) -> Vec<ViewCommand> {
        if !self.is_current(ticket) {
            return Vec::new();
        }
        match outcome {
            ViewOutcome::Fetched(result) => {
                if !self.resolver.loading() {
                    return Vec::new();
                }
                // Read failures count as "not found".
                self.resolver.finish_fetch(result.ok().flatten());
                self.sync()
            }
            ViewOutcome::Generated(result) => self.on_generated(result),
            ViewOutcome::Persisted(result) => {
                self.on_persisted(result);
                Vec::new()
            }
        }
    }

    fn on_generated(
        &mut self,
        result: Result<GenerationResult, GenerationError>,
    ) -> Vec<ViewCommand> {
        if self.phase != LifecyclePhase::Generating || self.pending_render.is_some() {
            return Vec::new();
        }
        let result = match result {
            Ok(result) => result,
            Err(err) => {
                self.fail(RenderFailure::Provider(err));
                return Vec::new();
            }
        };
        let folded = self.resolver.snapshot().and_then(|snapshot| {
            snapshot.with_render(
                &result,
                self.ambient_owner.as_deref(),
                Utc::now().timestamp_millis(),
            )
        });
        let Some(folded) = folded else {
            self.fail(RenderFailure::NoImage);
            return Vec::new();
        };
        self.current_image = folded.rendered_image.clone();
        self.pending_render = Some(folded.clone());
        vec![ViewCommand::Persist {
            ticket: self.ticket(),
            project: folded,
            visibility: Visibility::Private,
        }]
    }

    fn on_persisted(&mut self, result: Result<Option<Project>, PersistenceError>) {
        let Some(folded) = self.pending_render.take() else {
            return;
        };
        match result {
            Ok(Some(stored)) => {
                if stored.rendered_image.is_some() {
                    self.current_image = stored.rendered_image.clone();
                }
                self.saved = Some(true);
                self.resolver.replace(stored);
            }
            Ok(None) | Err(_) => {
                self.saved = Some(false);
                self.resolver.replace(folded);
            }
        }
        self.phase = LifecyclePhase::Ready;
    }

    fn fail(&mut self, failure: RenderFailure) {
        self.guard.reset();
        self.last_failure = Some(failure);
        self.phase = LifecyclePhase::GenerationFailed;
    }

    /// Explicit retry after a failed render. Returns the new generate
    /// command, or nothing when the view is not in a retryable state.
    pub fn retry(&mut self) -> Vec<ViewCommand> {
        if !self.mounted || self.phase != LifecyclePhase::GenerationFailed {
            return Vec::new();
        }
        self.phase = LifecyclePhase::Hydrated;
        self.sync()
    }

    /// Retires this mount. Outstanding commands keep running but their
    /// results will be ignored.
    pub fn unmount(&mut self) {
        self.mounted = false;
        self.epoch += 1;
    }
}

#[cfg(test)]
mod tests {
    use roomify_contracts::errors::{GenerationError, PersistenceError};
    use roomify_contracts::image::CanonicalImage;
    use roomify_contracts::project::{GenerationResult, NavigationSeed, Project, Visibility};

    use super::{LifecyclePhase, ProjectView, RenderFailure, ViewCommand, ViewOutcome};
    use crate::guard::GuardState;

    fn image(payload: &str) -> CanonicalImage {
        CanonicalImage::parse(format!("data:image/png;base64,{payload}")).unwrap()
    }

    fn seeded(style: &str) -> NavigationSeed {
        NavigationSeed {
            initial_image: Some(image("AAA")),
            style: Some(style.to_string()),
            ..NavigationSeed::default()
        }
    }

    fn only(mut commands: Vec<ViewCommand>) -> ViewCommand {
        assert_eq!(commands.len(), 1, "expected one command: {commands:?}");
        commands.remove(0)
    }

    #[test]
    fn seeded_view_generates_once_no_matter_how_often_it_syncs() {
        let mut view = ProjectView::new(Some("p1"), &seeded("Japanese Zen"), None);
        let command = only(view.sync());
        match command {
            ViewCommand::Generate {
                project_id,
                request,
                ..
            } => {
                assert_eq!(project_id, "p1");
                assert_eq!(request.source_image.as_str(), "data:image/png;base64,AAA");
                assert_eq!(request.style, "Japanese Zen");
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert_eq!(view.phase(), LifecyclePhase::Generating);
        for _ in 0..5 {
            assert!(view.sync().is_empty());
        }
        assert_eq!(view.generation_attempts(), 1);
    }

    #[test]
    fn missing_style_falls_back_to_default() {
        let seed = NavigationSeed {
            initial_image: Some(image("AAA")),
            ..NavigationSeed::default()
        };
        let mut view = ProjectView::new(Some("p1"), &seed, None);
        match only(view.sync()) {
            ViewCommand::Generate { request, .. } => {
                assert_eq!(request.style, "Modern Minimalist")
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn stored_render_goes_straight_to_ready() {
        let mut view = ProjectView::new(Some("p2"), &NavigationSeed::default(), None);
        let ticket = match only(view.sync()) {
            ViewCommand::Fetch { ticket, id } => {
                assert_eq!(id, "p2");
                ticket
            }
            other => panic!("unexpected command: {other:?}"),
        };
        assert_eq!(view.phase(), LifecyclePhase::Hydrating);
        assert!(view.sync().is_empty());

        let mut stored = Project::new("p2", image("AAAA"), 1);
        stored.rendered_image = Some(image("XXXX"));
        let next = view.apply(ticket, ViewOutcome::Fetched(Ok(Some(stored))));
        assert!(next.is_empty());
        assert_eq!(view.phase(), LifecyclePhase::Ready);
        assert_eq!(view.current_image(), Some(&image("XXXX")));
        assert_eq!(view.generation_attempts(), 0);
    }

    #[test]
    fn fetch_failure_and_absent_record_end_in_not_found() {
        for outcome in [
            ViewOutcome::Fetched(Ok(None)),
            ViewOutcome::Fetched(Err(PersistenceError::Io {
                path: "projects.json".to_string(),
                message: "denied".to_string(),
            })),
        ] {
            let mut view = ProjectView::new(Some("p3"), &NavigationSeed::default(), None);
            let ticket = only(view.sync()).ticket();
            assert!(view.apply(ticket, outcome).is_empty());
            assert_eq!(view.phase(), LifecyclePhase::NotFound);
            assert!(view.sync().is_empty());
        }
    }

    #[test]
    fn absent_id_is_not_found_without_io() {
        let mut view = ProjectView::new(None, &seeded("Mid-Century"), None);
        assert!(view.sync().is_empty());
        assert_eq!(view.phase(), LifecyclePhase::NotFound);
        assert_eq!(view.title(), None);
    }

    #[test]
    fn success_folds_render_and_persists_privately() {
        let mut view = ProjectView::new(Some("p1"), &seeded("Japanese Zen"), Some("me".into()));
        let ticket = only(view.sync()).ticket();
        let persist = only(view.apply(
            ticket,
            ViewOutcome::Generated(Ok(GenerationResult::rendered(image("RRRR")))),
        ));
        let folded = match persist {
            ViewCommand::Persist {
                project,
                visibility,
                ..
            } => {
                assert_eq!(visibility, Visibility::Private);
                project
            }
            other => panic!("unexpected command: {other:?}"),
        };
        assert_eq!(folded.owner_id.as_deref(), Some("me"));
        assert_eq!(folded.is_public, Some(false));
        assert!(folded.timestamp > 0);
        assert_eq!(view.current_image(), Some(&image("RRRR")));
        assert_eq!(view.exportable_image(), None);

        let mut stored = folded.clone();
        stored.rendered_path = Some("renders/p1.png".to_string());
        view.apply(ticket, ViewOutcome::Persisted(Ok(Some(stored.clone()))));
        assert_eq!(view.phase(), LifecyclePhase::Ready);
        assert_eq!(view.saved(), Some(true));
        assert_eq!(view.snapshot(), Some(&stored));
        assert_eq!(view.exportable_image(), Some(&image("RRRR")));
        assert_eq!(
            view.compare_pair(),
            Some((&image("AAA"), &image("RRRR")))
        );
    }

    #[test]
    fn persistence_failure_degrades_to_unsaved_ready() {
        let mut view = ProjectView::new(Some("p1"), &seeded("Industrial Loft"), None);
        let ticket = only(view.sync()).ticket();
        view.apply(
            ticket,
            ViewOutcome::Generated(Ok(GenerationResult::rendered(image("RRRR")))),
        );
        view.apply(
            ticket,
            ViewOutcome::Persisted(Err(PersistenceError::Rejected {
                id: "p1".to_string(),
                reason: "offline".to_string(),
            })),
        );
        assert_eq!(view.phase(), LifecyclePhase::Ready);
        assert_eq!(view.saved(), Some(false));
        assert_eq!(
            view.snapshot().and_then(|p| p.rendered_image.clone()),
            Some(image("RRRR"))
        );
    }

    #[test]
    fn failure_resets_latch_and_retry_issues_one_call() {
        let mut view = ProjectView::new(Some("p1"), &seeded("Japanese Zen"), None);
        let ticket = only(view.sync()).ticket();
        assert_eq!(view.guard_state(), GuardState::Attempted);

        view.apply(
            ticket,
            ViewOutcome::Generated(Err(GenerationError::Quota {
                provider: "test".to_string(),
            })),
        );
        assert_eq!(view.phase(), LifecyclePhase::GenerationFailed);
        assert_eq!(view.guard_state(), GuardState::NotYetAttempted);
        assert!(matches!(
            view.last_failure(),
            Some(RenderFailure::Provider(GenerationError::Quota { .. }))
        ));
        assert!(view.sync().is_empty(), "no automatic retry");

        assert!(matches!(only(view.retry()), ViewCommand::Generate { .. }));
        assert!(view.retry().is_empty());
        assert!(view.sync().is_empty());
        assert_eq!(view.generation_attempts(), 2);
    }

    #[test]
    fn empty_result_is_a_failure() {
        let mut view = ProjectView::new(Some("p1"), &seeded("Japanese Zen"), None);
        let ticket = only(view.sync()).ticket();
        view.apply(ticket, ViewOutcome::Generated(Ok(GenerationResult::empty())));
        assert_eq!(view.phase(), LifecyclePhase::GenerationFailed);
        assert_eq!(view.last_failure(), Some(&RenderFailure::NoImage));
        assert_eq!(view.guard_state(), GuardState::NotYetAttempted);
    }

    #[test]
    fn results_after_unmount_are_discarded() {
        let mut view = ProjectView::new(Some("p1"), &seeded("Japanese Zen"), None);
        let ticket = only(view.sync()).ticket();
        view.unmount();
        let next = view.apply(
            ticket,
            ViewOutcome::Generated(Ok(GenerationResult::rendered(image("RRRR")))),
        );
        assert!(next.is_empty());
        assert_eq!(view.phase(), LifecyclePhase::Generating);
        assert_eq!(view.current_image(), None);
        assert!(view.sync().is_empty());
        assert!(view.retry().is_empty());
    }

    #[test]
    fn seeded_render_is_shown_without_generation() {
        let seed = NavigationSeed {
            initial_image: Some(image("AAA")),
            initial_rendered: Some(image("BBBB")),
            ..NavigationSeed::default()
        };
        let mut view = ProjectView::new(Some("p1"), &seed, None);
        assert!(view.sync().is_empty());
        assert_eq!(view.phase(), LifecyclePhase::Ready);
        assert_eq!(view.current_image(), Some(&image("BBBB")));
    }
}
