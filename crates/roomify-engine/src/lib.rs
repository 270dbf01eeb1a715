pub mod config;
pub mod export;
pub mod flight;
pub mod generation;
pub mod guard;
pub mod hydration;
pub mod normalize;
pub mod orchestrator;
pub mod store;
pub mod upload;
pub mod view;

pub use config::{EngineConfig, GeminiSettings, ProviderKind};
pub use export::export_image;
pub use flight::FlightTable;
pub use generation::{
    default_registry, image_digest, DryrunGenerator, GeminiGenerator, GenerationClient,
    GenerationRequest, GeneratorRegistry,
};
pub use guard::{GenerationGuard, GuardState};
pub use hydration::HydrationResolver;
pub use normalize::ImageNormalizer;
pub use orchestrator::Orchestrator;
pub use store::{JsonFileStore, MemoryStore, ProjectStore};
pub use upload::{UploadFlow, UploadOutcome};
pub use view::{LifecyclePhase, ProjectView, RenderFailure, Ticket, ViewCommand, ViewOutcome};
