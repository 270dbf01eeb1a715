use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;

use futures::future::{self, FutureExt};
use roomify_contracts::errors::{GenerationError, PersistenceError};
use roomify_contracts::events::{EventPayload, EventWriter};
use roomify_contracts::project::{GenerationResult, NavigationSeed, Project, Visibility};
use serde_json::{json, Value};

use crate::flight::FlightTable;
use crate::generation::{image_digest, GenerationClient, GenerationRequest};
use crate::store::ProjectStore;
use crate::view::{LifecyclePhase, ProjectView, ViewCommand, ViewOutcome};

/// Async driver for [`ProjectView`] state machines.
///
/// The orchestrator owns the adapters and performs the I/O each view asks
/// for. Commands run on spawned tasks so a view can be retired while a call
/// is still in flight; the call finishes and its result is dropped.
#[derive(Clone)]
pub struct Orchestrator {
    generator: Arc<dyn GenerationClient>,
    store: Arc<dyn ProjectStore>,
    flights: Option<Arc<FlightTable>>,
    events: Option<EventWriter>,
    ambient_owner: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum CommandKind {
    Fetch,
    Generate,
    Persist,
}

impl CommandKind {
    fn of(command: &ViewCommand) -> Self {
        match command {
            ViewCommand::Fetch { .. } => Self::Fetch,
            ViewCommand::Generate { .. } => Self::Generate,
            ViewCommand::Persist { .. } => Self::Persist,
        }
    }

    fn aborted(self, provider: &str, reason: String) -> ViewOutcome {
        match self {
            Self::Fetch => ViewOutcome::Fetched(Err(PersistenceError::Io {
                path: "<task>".to_string(),
                message: reason,
            })),
            Self::Generate => ViewOutcome::Generated(Err(GenerationError::Transport {
                provider: provider.to_string(),
                message: reason,
            })),
            Self::Persist => ViewOutcome::Persisted(Err(PersistenceError::Io {
                path: "<task>".to_string(),
                message: reason,
            })),
        }
    }
}

impl Orchestrator {
    pub fn new(generator: Arc<dyn GenerationClient>, store: Arc<dyn ProjectStore>) -> Self {
        Self {
            generator,
            store,
            flights: None,
            events: None,
            ambient_owner: None,
        }
    }

    /// Shares in-flight renders with every other view driven through the
    /// same table.
    pub fn with_flight_table(mut self, flights: Arc<FlightTable>) -> Self {
        self.flights = Some(flights);
        self
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_ambient_owner(mut self, owner: Option<String>) -> Self {
        self.ambient_owner = owner;
        self
    }

    pub fn store(&self) -> Arc<dyn ProjectStore> {
        Arc::clone(&self.store)
    }

    pub fn events(&self) -> Option<&EventWriter> {
        self.events.as_ref()
    }

    pub fn provider_name(&self) -> &str {
        self.generator.name()
    }

    pub fn mount(&self, id: Option<&str>, seed: &NavigationSeed) -> ProjectView {
        ProjectView::new(id, seed, self.ambient_owner.clone())
    }

    /// Runs the view until nothing is left to do.
    pub async fn drive(&self, view: &mut ProjectView) -> LifecyclePhase {
        self.drive_until(view, future::pending()).await
    }

    /// Like [`drive`](Self::drive), but unmounts the view as soon as
    /// `unmounted` resolves.
    pub async fn drive_until<U>(&self, view: &mut ProjectView, unmounted: U) -> LifecyclePhase
    where
        U: Future<Output = ()>,
    {
        let commands = view.sync();
        self.run(view, commands, unmounted).await
    }

    /// Explicit retry after `GenerationFailed`.
    pub async fn retry(&self, view: &mut ProjectView) -> LifecyclePhase {
        let commands = view.retry();
        if commands.is_empty() {
            tracing::debug!(phase = %view.phase(), "retry ignored");
        }
        self.run(view, commands, future::pending()).await
    }

    async fn run<U>(
        &self,
        view: &mut ProjectView,
        commands: Vec<ViewCommand>,
        unmounted: U,
    ) -> LifecyclePhase
    where
        U: Future<Output = ()>,
    {
        tokio::pin!(unmounted);
        if unmounted.as_mut().now_or_never().is_some() {
            view.unmount();
            tracing::info!(
                project_id = view.project_id().unwrap_or_default(),
                phase = %view.phase(),
                "view unmounted before any work ran"
            );
            return view.phase();
        }
        let mut queue: VecDeque<ViewCommand> = commands.into();

        while let Some(command) = queue.pop_front() {
            let ticket = command.ticket();
            let kind = CommandKind::of(&command);
            let this = self.clone();
            let mut task = tokio::spawn(async move { this.execute(command).await });

            let outcome = tokio::select! {
                joined = &mut task => match joined {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        tracing::error!(error = %err, "view command task failed");
                        kind.aborted(self.generator.name(), err.to_string())
                    }
                },
                _ = &mut unmounted => {
                    view.unmount();
                    tracing::info!(
                        project_id = view.project_id().unwrap_or_default(),
                        phase = %view.phase(),
                        "view unmounted with work in flight"
                    );
                    return view.phase();
                }
            };
            queue.extend(view.apply(ticket, outcome));
        }

        if unmounted.as_mut().now_or_never().is_some() {
            view.unmount();
        }
        tracing::debug!(
            project_id = view.project_id().unwrap_or_default(),
            phase = %view.phase(),
            "view settled"
        );
        view.phase()
    }

    async fn execute(&self, command: ViewCommand) -> ViewOutcome {
        match command {
            ViewCommand::Fetch { id, .. } => ViewOutcome::Fetched(self.fetch(&id).await),
            ViewCommand::Generate {
                project_id,
                request,
                ..
            } => ViewOutcome::Generated(self.generate(&project_id, request).await),
            ViewCommand::Persist {
                project,
                visibility,
                ..
            } => ViewOutcome::Persisted(self.persist(&project, visibility).await),
        }
    }

    async fn fetch(&self, id: &str) -> Result<Option<Project>, PersistenceError> {
        self.emit("hydration_started", json!({ "project_id": id })).await;
        let result = self.store.get_by_id(id).await;
        match &result {
            Ok(Some(project)) => {
                tracing::info!(project_id = id, has_render = project.has_render(), "project hydrated");
                self.emit(
                    "hydration_finished",
                    json!({ "project_id": id, "found": true, "has_render": project.has_render() }),
                )
                .await;
            }
            Ok(None) => {
                tracing::warn!(project_id = id, "project not found");
                self.emit(
                    "hydration_finished",
                    json!({ "project_id": id, "found": false }),
                )
                .await;
            }
            Err(err) => {
                tracing::warn!(project_id = id, error = %err, "project read failed; treating as not found");
                self.emit(
                    "hydration_finished",
                    json!({ "project_id": id, "found": false, "error": err.to_string() }),
                )
                .await;
            }
        }
        result
    }

    async fn generate(
        &self,
        project_id: &str,
        request: GenerationRequest,
    ) -> Result<GenerationResult, GenerationError> {
        let provider = self.generator.name().to_string();
        tracing::info!(project_id, style = %request.style, provider = %provider, "generation started");
        self.emit(
            "generation_started",
            json!({
                "project_id": project_id,
                "style": request.style,
                "provider": provider,
                "source_digest": image_digest(&request.source_image),
            }),
        )
        .await;

        let result = self.render(project_id, request).await;
        match &result {
            Ok(result) if result.rendered_image.is_some() => {
                tracing::debug!(project_id, "generation returned an image");
            }
            Ok(_) => {
                tracing::warn!(project_id, provider = %provider, "generation produced no image");
                self.emit(
                    "generation_failed",
                    json!({ "project_id": project_id, "provider": provider, "reason": "no_image" }),
                )
                .await;
            }
            Err(err) => {
                tracing::warn!(project_id, provider = %provider, error = %err, "generation failed");
                self.emit(
                    "generation_failed",
                    json!({
                        "project_id": project_id,
                        "provider": provider,
                        "reason": "error",
                        "error": err.to_string(),
                        "retryable": err.should_retry(),
                    }),
                )
                .await;
            }
        }
        result
    }

    async fn render(
        &self,
        project_id: &str,
        request: GenerationRequest,
    ) -> Result<GenerationResult, GenerationError> {
        let Some(flights) = &self.flights else {
            return self.generator.generate(&request).await;
        };
        let key = FlightTable::key_for(project_id, &request);
        let generator = Arc::clone(&self.generator);
        flights
            .run(&key, move || {
                async move { generator.generate(&request).await }.boxed()
            })
            .await
    }

    async fn persist(
        &self,
        project: &Project,
        visibility: Visibility,
    ) -> Result<Option<Project>, PersistenceError> {
        let result = self.store.create(project, visibility).await;
        match &result {
            Ok(Some(stored)) => {
                tracing::info!(project_id = %stored.id, "render saved");
                self.emit(
                    "render_ready",
                    json!({
                        "project_id": stored.id,
                        "saved": true,
                        "rendered_path": stored.rendered_path,
                        "visibility": visibility.as_str(),
                    }),
                )
                .await;
            }
            Ok(None) => {
                tracing::warn!(project_id = %project.id, "store declined render; showing unsaved");
                self.emit(
                    "render_unsaved",
                    json!({ "project_id": project.id, "reason": "declined" }),
                )
                .await;
            }
            Err(err) => {
                tracing::warn!(project_id = %project.id, error = %err, "render save failed; showing unsaved");
                self.emit(
                    "render_unsaved",
                    json!({ "project_id": project.id, "reason": "error", "error": err.to_string() }),
                )
                .await;
            }
        }
        result
    }

    async fn emit(&self, event_type: &'static str, payload: Value) {
        let Some(events) = &self.events else {
            return;
        };
        let payload = match payload {
            Value::Object(map) => map,
            _ => EventPayload::new(),
        };
        write_event(events, event_type, payload).await;
    }
}

/// Appends to the event log on the blocking pool; the writer does plain
/// file I/O. Failures are logged and never surface to the caller.
pub(crate) async fn write_event(
    events: &EventWriter,
    event_type: &'static str,
    payload: EventPayload,
) {
    let events = events.clone();
    let written = tokio::task::spawn_blocking(move || events.emit(event_type, payload)).await;
    match written {
        Ok(Ok(_)) => {}
        Ok(Err(err)) => {
            tracing::warn!(event_type, error = %err, "failed to write lifecycle event");
        }
        Err(err) => {
            tracing::warn!(event_type, error = %err, "event writer task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use roomify_contracts::errors::{GenerationError, PersistenceError};
    use roomify_contracts::events::EventWriter;
    use roomify_contracts::image::CanonicalImage;
    use roomify_contracts::project::{GenerationResult, NavigationSeed, Project, Visibility};
    use serde_json::Value;
    use tokio::sync::Notify;

    use super::Orchestrator;
    use crate::flight::FlightTable;
    use crate::generation::{GenerationClient, GenerationRequest};
    use crate::guard::GuardState;
    use crate::store::{MemoryStore, ProjectStore};
    use crate::view::LifecyclePhase;

    fn image(payload: &str) -> CanonicalImage {
        CanonicalImage::parse(format!("data:image/png;base64,{payload}")).unwrap()
    }

    type Scripted = Result<GenerationResult, GenerationError>;

    #[derive(Default)]
    struct ScriptedGenerator {
        calls: AtomicUsize,
        requests: Mutex<Vec<GenerationRequest>>,
        script: Mutex<VecDeque<Scripted>>,
        started: Notify,
        release: Option<Notify>,
    }

    impl ScriptedGenerator {
        fn with_script(script: Vec<Scripted>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                ..Self::default()
            }
        }

        fn gated() -> Self {
            Self {
                release: Some(Notify::new()),
                ..Self::default()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl GenerationClient for ScriptedGenerator {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, request: &GenerationRequest) -> Scripted {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request.clone());
            self.started.notify_one();
            if let Some(release) = &self.release {
                release.notified().await;
            }
            let next = self.script.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Ok(GenerationResult::rendered(image("RRRR"))))
        }
    }

    #[derive(Default)]
    struct CountingStore {
        inner: MemoryStore,
        gets: AtomicUsize,
        creates: AtomicUsize,
        fail_create: bool,
    }

    impl CountingStore {
        fn with_projects(projects: Vec<Project>) -> Self {
            Self {
                inner: MemoryStore::with_projects(projects),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl ProjectStore for CountingStore {
        async fn create(
            &self,
            project: &Project,
            visibility: Visibility,
        ) -> Result<Option<Project>, PersistenceError> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            if self.fail_create {
                return Err(PersistenceError::Io {
                    path: "memory".to_string(),
                    message: "disk full".to_string(),
                });
            }
            self.inner.create(project, visibility).await
        }

        async fn get_by_id(&self, id: &str) -> Result<Option<Project>, PersistenceError> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            self.inner.get_by_id(id).await
        }

        async fn list(&self) -> Result<Vec<Project>, PersistenceError> {
            self.inner.list().await
        }
    }

    fn zen_seed() -> NavigationSeed {
        NavigationSeed {
            initial_image: Some(image("AAA")),
            style: Some("Japanese Zen".to_string()),
            ..NavigationSeed::default()
        }
    }

    #[tokio::test]
    async fn seeded_project_generates_without_fetching() -> anyhow::Result<()> {
        let generator = Arc::new(ScriptedGenerator::default());
        let store = Arc::new(CountingStore::default());
        let orchestrator = Orchestrator::new(generator.clone(), store.clone());

        let mut view = orchestrator.mount(Some("p1"), &zen_seed());
        let phase = orchestrator.drive(&mut view).await;

        assert_eq!(phase, LifecyclePhase::Ready);
        assert_eq!(store.gets.load(Ordering::SeqCst), 0);
        assert_eq!(generator.calls(), 1);
        let requests = generator.requests.lock().unwrap().clone();
        assert_eq!(requests[0].source_image.as_str(), "data:image/png;base64,AAA");
        assert_eq!(requests[0].style, "Japanese Zen");

        assert_eq!(view.saved(), Some(true));
        let stored = store.inner.get_by_id("p1").await?.expect("render persisted");
        assert_eq!(stored.rendered_image, Some(image("RRRR")));
        assert_eq!(stored.is_public, Some(false));
        assert_eq!(view.snapshot(), Some(&stored));
        Ok(())
    }

    #[tokio::test]
    async fn stored_render_is_never_regenerated() -> anyhow::Result<()> {
        let mut existing = Project::new("p2", image("AAAA"), 1);
        existing.rendered_image = Some(image("XXXX"));
        let generator = Arc::new(ScriptedGenerator::default());
        let store = Arc::new(CountingStore::with_projects(vec![existing]));
        let orchestrator = Orchestrator::new(generator.clone(), store.clone());

        let mut view = orchestrator.mount(Some("p2"), &NavigationSeed::default());
        assert_eq!(orchestrator.drive(&mut view).await, LifecyclePhase::Ready);
        assert_eq!(view.current_image(), Some(&image("XXXX")));
        assert_eq!(generator.calls(), 0);
        assert_eq!(store.gets.load(Ordering::SeqCst), 1);

        // Driving again must not fetch or render.
        orchestrator.drive(&mut view).await;
        assert_eq!(generator.calls(), 0);
        assert_eq!(store.gets.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn failed_generation_is_retryable_exactly_once() {
        let generator = Arc::new(ScriptedGenerator::with_script(vec![Err(
            GenerationError::Transport {
                provider: "scripted".to_string(),
                message: "connection reset".to_string(),
            },
        )]));
        let store = Arc::new(CountingStore::default());
        let orchestrator = Orchestrator::new(generator.clone(), store.clone());

        let mut view = orchestrator.mount(Some("p1"), &zen_seed());
        assert_eq!(
            orchestrator.drive(&mut view).await,
            LifecyclePhase::GenerationFailed
        );
        assert_eq!(view.guard_state(), GuardState::NotYetAttempted);
        assert_eq!(store.creates.load(Ordering::SeqCst), 0);

        orchestrator.drive(&mut view).await;
        assert_eq!(generator.calls(), 1, "no automatic retry");

        assert_eq!(orchestrator.retry(&mut view).await, LifecyclePhase::Ready);
        assert_eq!(generator.calls(), 2);
        assert_eq!(orchestrator.retry(&mut view).await, LifecyclePhase::Ready);
        assert_eq!(generator.calls(), 2);
    }

    #[tokio::test]
    async fn save_failure_still_shows_render() {
        let generator = Arc::new(ScriptedGenerator::default());
        let store = Arc::new(CountingStore {
            fail_create: true,
            ..CountingStore::default()
        });
        let orchestrator = Orchestrator::new(generator, store);

        let mut view = orchestrator.mount(Some("p1"), &zen_seed());
        assert_eq!(orchestrator.drive(&mut view).await, LifecyclePhase::Ready);
        assert_eq!(view.saved(), Some(false));
        assert_eq!(view.current_image(), Some(&image("RRRR")));
        assert_eq!(view.exportable_image(), Some(&image("RRRR")));
    }

    #[tokio::test]
    async fn missing_project_settles_as_not_found() {
        let generator = Arc::new(ScriptedGenerator::default());
        let store = Arc::new(CountingStore::default());
        let orchestrator = Orchestrator::new(generator.clone(), store.clone());

        let mut view = orchestrator.mount(Some("nope"), &NavigationSeed::default());
        assert_eq!(orchestrator.drive(&mut view).await, LifecyclePhase::NotFound);
        let mut blank = orchestrator.mount(None, &zen_seed());
        assert_eq!(orchestrator.drive(&mut blank).await, LifecyclePhase::NotFound);
        assert_eq!(generator.calls(), 0);
        assert_eq!(store.gets.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unmount_discards_in_flight_render() -> anyhow::Result<()> {
        let generator = Arc::new(ScriptedGenerator::gated());
        let store = Arc::new(CountingStore::default());
        let orchestrator = Orchestrator::new(generator.clone(), store.clone());

        let mut view = orchestrator.mount(Some("p1"), &zen_seed());
        let started = generator.clone();
        let phase = orchestrator
            .drive_until(&mut view, async move { started.started.notified().await })
            .await;
        assert_eq!(phase, LifecyclePhase::Generating);
        assert!(!view.is_mounted());

        if let Some(release) = &generator.release {
            release.notify_one();
        }
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(generator.calls(), 1);
        assert_eq!(view.phase(), LifecyclePhase::Generating);
        assert_eq!(view.current_image(), None);
        assert_eq!(store.creates.load(Ordering::SeqCst), 0);
        assert!(store.list().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn views_of_same_project_share_one_render() {
        let generator = Arc::new(ScriptedGenerator::gated());
        let store = Arc::new(CountingStore::default());
        let flights = Arc::new(FlightTable::new());
        let orchestrator = Orchestrator::new(generator.clone(), store.clone())
            .with_flight_table(flights.clone());

        let mut first = orchestrator.mount(Some("p1"), &zen_seed());
        let mut second = orchestrator.mount(Some("p1"), &zen_seed());
        let key = FlightTable::key_for(
            "p1",
            &GenerationRequest {
                source_image: image("AAA"),
                style: "Japanese Zen".to_string(),
            },
        );
        let release = async {
            while !flights.in_flight(&key) {
                tokio::task::yield_now().await;
            }
            for _ in 0..5 {
                tokio::task::yield_now().await;
            }
            if let Some(release) = &generator.release {
                release.notify_one();
            }
        };
        let (a, b, ()) = tokio::join!(
            orchestrator.drive(&mut first),
            orchestrator.drive(&mut second),
            release
        );

        assert_eq!((a, b), (LifecyclePhase::Ready, LifecyclePhase::Ready));
        assert_eq!(generator.calls(), 1);
        assert_eq!(first.current_image(), second.current_image());
        assert_eq!(store.creates.load(Ordering::SeqCst), 2);
    }

    /// Renders `<source payload>|<style>` so a result can be traced back to
    /// the request that produced it. Two calls must be in flight at once for
    /// either to finish.
    struct EchoGenerator {
        calls: AtomicUsize,
        both_started: tokio::sync::Barrier,
    }

    #[async_trait]
    impl GenerationClient for EchoGenerator {
        fn name(&self) -> &str {
            "echo"
        }

        async fn generate(&self, request: &GenerationRequest) -> Scripted {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.both_started.wait().await;
            let echoed = format!("{}|{}", request.source_image.payload(), request.style);
            Ok(GenerationResult::rendered(CanonicalImage::from_bytes(
                "image/png",
                echoed.as_bytes(),
            )))
        }
    }

    #[tokio::test]
    async fn views_with_different_sources_never_share_a_render() -> anyhow::Result<()> {
        let generator = Arc::new(EchoGenerator {
            calls: AtomicUsize::new(0),
            both_started: tokio::sync::Barrier::new(2),
        });
        let orchestrator = Orchestrator::new(generator.clone(), Arc::new(CountingStore::default()))
            .with_flight_table(Arc::new(FlightTable::new()));

        let zen = NavigationSeed {
            initial_image: Some(image("AAAA")),
            style: Some("Japanese Zen".to_string()),
            ..NavigationSeed::default()
        };
        let loft = NavigationSeed {
            initial_image: Some(image("BBBB")),
            style: Some("Industrial Loft".to_string()),
            ..NavigationSeed::default()
        };
        let mut first = orchestrator.mount(Some("p1"), &zen);
        let mut second = orchestrator.mount(Some("p1"), &loft);
        let (a, b) = tokio::time::timeout(std::time::Duration::from_secs(5), async {
            tokio::join!(orchestrator.drive(&mut first), orchestrator.drive(&mut second))
        })
        .await?;

        assert_eq!((a, b), (LifecyclePhase::Ready, LifecyclePhase::Ready));
        assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            first.current_image(),
            Some(&CanonicalImage::from_bytes("image/png", b"AAAA|Japanese Zen"))
        );
        assert_eq!(
            second.current_image(),
            Some(&CanonicalImage::from_bytes("image/png", b"BBBB|Industrial Loft"))
        );
        Ok(())
    }

    #[tokio::test]
    async fn already_resolved_unmount_retires_view() {
        let generator = Arc::new(ScriptedGenerator::default());
        let store = Arc::new(CountingStore::default());
        let orchestrator = Orchestrator::new(generator.clone(), store.clone());

        let mut fresh = orchestrator.mount(Some("p1"), &zen_seed());
        orchestrator.drive_until(&mut fresh, async {}).await;
        assert!(!fresh.is_mounted());
        assert_eq!(generator.calls(), 0);
        assert_eq!(store.creates.load(Ordering::SeqCst), 0);

        let mut settled = orchestrator.mount(Some("p2"), &zen_seed());
        assert_eq!(orchestrator.drive(&mut settled).await, LifecyclePhase::Ready);
        assert!(settled.is_mounted());
        let phase = orchestrator.drive_until(&mut settled, async {}).await;
        assert_eq!(phase, LifecyclePhase::Ready);
        assert!(!settled.is_mounted());
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn without_flight_table_each_view_renders() {
        let generator = Arc::new(ScriptedGenerator::default());
        let store = Arc::new(CountingStore::default());
        let orchestrator = Orchestrator::new(generator.clone(), store);

        let mut first = orchestrator.mount(Some("p1"), &zen_seed());
        let mut second = orchestrator.mount(Some("p1"), &zen_seed());
        orchestrator.drive(&mut first).await;
        orchestrator.drive(&mut second).await;
        assert_eq!(generator.calls(), 2);
    }

    #[tokio::test]
    async fn lifecycle_events_are_logged_without_images() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let generator = Arc::new(ScriptedGenerator::with_script(vec![
            Ok(GenerationResult::empty()),
        ]));
        let orchestrator = Orchestrator::new(generator, Arc::new(CountingStore::default()))
            .with_events(EventWriter::new(&path, "session-1"));

        let mut view = orchestrator.mount(Some("p1"), &zen_seed());
        orchestrator.drive(&mut view).await;
        orchestrator.retry(&mut view).await;

        let content = std::fs::read_to_string(&path)?;
        assert!(!content.contains("data:image"));
        let types: Vec<String> = content
            .lines()
            .map(|line| serde_json::from_str::<Value>(line))
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .filter_map(|event| event["type"].as_str().map(str::to_string))
            .collect();
        assert_eq!(
            types,
            vec![
                "generation_started",
                "generation_failed",
                "generation_started",
                "render_ready"
            ]
        );
        Ok(())
    }
}
