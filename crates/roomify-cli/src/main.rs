use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::DateTime;
use clap::{Parser, Subcommand};
use roomify_contracts::events::{EventPayload, EventWriter};
use roomify_contracts::image::{mime_for_path, CanonicalImage};
use roomify_contracts::project::{NavigationSeed, Project};
use roomify_contracts::styles::StyleCatalog;
use roomify_engine::{
    export_image, EngineConfig, ImageNormalizer, LifecyclePhase, Orchestrator, ProjectStore,
    ProjectView, ProviderKind, UploadFlow, UploadOutcome,
};
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "roomify", version, about = "Floor plan to 3D render project runner")]
struct Cli {
    /// Where projects, renders and events.jsonl live.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// Render backend (dryrun or gemini).
    #[arg(long, global = true)]
    provider: Option<String>,
    /// Lifecycle event log; defaults to <data-dir>/events.jsonl.
    #[arg(long, global = true)]
    events: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Upload(UploadArgs),
    Open(OpenArgs),
    Retry(RetryArgs),
    List,
    Styles,
    Export(ExportArgs),
}

#[derive(Debug, Parser)]
struct UploadArgs {
    /// Local file, URL, or data URL of the floor plan.
    #[arg(long)]
    image: String,
    #[arg(long)]
    style: Option<String>,
    /// Also export the render here once it is ready.
    #[arg(long)]
    export: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct OpenArgs {
    #[arg(long)]
    id: String,
    /// Navigation seed as JSON, e.g. '{"initialImage": "data:...", "style": "Japanese Zen"}'.
    #[arg(long)]
    seed: Option<String>,
    #[arg(long)]
    export: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct RetryArgs {
    #[arg(long)]
    id: String,
}

#[derive(Debug, Parser)]
struct ExportArgs {
    #[arg(long)]
    id: String,
    #[arg(long, default_value = ".")]
    out: PathBuf,
}

struct App {
    store: Arc<dyn ProjectStore>,
    events: EventWriter,
    orchestrator: Orchestrator,
}

impl App {
    fn new(cli: &Cli) -> Result<Self> {
        let mut config = EngineConfig::from_env(cli.data_dir.clone())?;
        if let Some(provider) = &cli.provider {
            config.provider = provider.parse::<ProviderKind>()?;
        }
        let events_path = cli.events.clone().unwrap_or_else(|| config.events_path());
        let events = EventWriter::with_random_session(events_path);
        let store = config.build_store();
        let orchestrator = config.build_orchestrator(Arc::clone(&store), Some(events.clone()))?;
        tracing::debug!(
            data_dir = %config.data_dir.display(),
            provider = %config.provider,
            dedupe = config.dedupe_across_views,
            "configuration resolved"
        );
        Ok(Self {
            store,
            events,
            orchestrator,
        })
    }
}

#[tokio::main]
async fn main() {
    init_tracing();
    match run().await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("roomify error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();
    match &cli.command {
        Command::Styles => {
            run_styles();
            Ok(0)
        }
        Command::Upload(args) => run_upload(&App::new(&cli)?, args).await,
        Command::Open(args) => run_open(&App::new(&cli)?, args).await,
        Command::Retry(args) => run_retry(&App::new(&cli)?, args).await,
        Command::List => run_list(&App::new(&cli)?).await,
        Command::Export(args) => run_export(&App::new(&cli)?, args).await,
    }
}

fn run_styles() {
    let catalog = StyleCatalog::default();
    for spec in catalog.list() {
        println!("{} {} - {}", spec.icon, spec.label, spec.description);
    }
}

async fn run_upload(app: &App, args: &UploadArgs) -> Result<i32> {
    let source = load_plan(&args.image).await?;
    let flow = UploadFlow::new(Arc::clone(&app.store)).with_events(Some(app.events.clone()));
    let (project, seed) = match flow.complete(source, args.style.as_deref()).await {
        UploadOutcome::Created { project, seed } => (project, seed),
        UploadOutcome::Busy => bail!("another upload is in progress"),
        UploadOutcome::Failed { reason } => bail!("could not create project: {reason}"),
    };
    println!("created {} ({})", project.id, project.display_name());

    let mut view = app.orchestrator.mount(Some(&project.id), &seed);
    app.orchestrator.drive(&mut view).await;
    finish(app, &view, args.export.as_deref())
}

async fn run_open(app: &App, args: &OpenArgs) -> Result<i32> {
    let seed = match &args.seed {
        Some(raw) => parse_seed(raw)?,
        None => NavigationSeed::default(),
    };
    let mut view = app.orchestrator.mount(Some(&args.id), &seed);
    app.orchestrator.drive(&mut view).await;
    finish(app, &view, args.export.as_deref())
}

async fn run_retry(app: &App, args: &RetryArgs) -> Result<i32> {
    let mut view = app
        .orchestrator
        .mount(Some(&args.id), &NavigationSeed::default());
    if app.orchestrator.drive(&mut view).await == LifecyclePhase::GenerationFailed {
        report(&view);
        println!("retrying once");
        app.orchestrator.retry(&mut view).await;
    }
    finish(app, &view, None)
}

async fn run_list(app: &App) -> Result<i32> {
    let projects = app.store.list().await?;
    if projects.is_empty() {
        println!("no projects yet");
        return Ok(0);
    }
    for project in projects {
        println!("{}", gallery_line(&project));
    }
    Ok(0)
}

async fn run_export(app: &App, args: &ExportArgs) -> Result<i32> {
    let project = app
        .store
        .get_by_id(&args.id)
        .await?
        .with_context(|| format!("project {} not found", args.id))?;
    let Some(rendered) = &project.rendered_image else {
        bail!("project {} has no render to export", project.id);
    };
    let path = write_export(app, &project.id, rendered, &args.out)?;
    println!("exported {}", path.display());
    Ok(0)
}

fn finish(app: &App, view: &ProjectView, export_dir: Option<&Path>) -> Result<i32> {
    report(view);
    if let (Some(out_dir), Some(rendered)) = (export_dir, view.exportable_image()) {
        let id = view.project_id().unwrap_or_default();
        let path = write_export(app, id, rendered, out_dir)?;
        println!("exported {}", path.display());
    }
    Ok(exit_code(view.phase()))
}

fn write_export(app: &App, id: &str, image: &CanonicalImage, out_dir: &Path) -> Result<PathBuf> {
    let path = export_image(id, image, out_dir)?;
    let mut payload = EventPayload::new();
    payload.insert("project_id".to_string(), json!(id));
    payload.insert("path".to_string(), json!(path.display().to_string()));
    payload.insert("media_type".to_string(), json!(image.media_type()));
    app.events.emit("export_written", payload)?;
    Ok(path)
}

fn report(view: &ProjectView) {
    let title = view.title().unwrap_or_else(|| "<no project>".to_string());
    println!("{title}: {}", view.phase());
    if let Some(failure) = view.last_failure() {
        println!("  failed: {failure}");
    }
    if let Some(saved) = view.saved() {
        println!("  saved: {}", if saved { "yes" } else { "no (render kept locally)" });
    }
    if let Some((source, current)) = view.compare_pair() {
        println!("  before: {}", describe_image(source));
        println!("  after:  {}", describe_image(current));
    }
}

fn describe_image(image: &CanonicalImage) -> String {
    match image.split() {
        Ok((media_type, bytes)) => format!("{media_type}, {} bytes", bytes.len()),
        Err(err) => format!("{} (unreadable: {err})", image.media_type()),
    }
}

fn gallery_line(project: &Project) -> String {
    let date = DateTime::from_timestamp_millis(project.timestamp)
        .map(|ts| ts.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string());
    let status = if project.has_render() { "rendered" } else { "plan only" };
    format!(
        "{}  {}  {}  {}  [{}]",
        project.id,
        project.display_name(),
        date,
        project.style_label(),
        status
    )
}

fn exit_code(phase: LifecyclePhase) -> i32 {
    match phase {
        LifecyclePhase::Ready => 0,
        LifecyclePhase::GenerationFailed => 2,
        LifecyclePhase::NotFound => 3,
        _ => 1,
    }
}

fn parse_seed(raw: &str) -> Result<NavigationSeed> {
    serde_json::from_str(raw).context("invalid --seed JSON")
}

/// Reads a plan from disk when the path exists, otherwise treats the input
/// as a URL or data URL.
async fn load_plan(input: &str) -> Result<CanonicalImage> {
    let path = Path::new(input);
    if path.is_file() {
        let media_type = mime_for_path(path)
            .with_context(|| format!("unsupported image type: {}", path.display()))?;
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        return Ok(CanonicalImage::from_bytes(media_type, &bytes));
    }
    Ok(ImageNormalizer::default().normalize_str(input).await?)
}
