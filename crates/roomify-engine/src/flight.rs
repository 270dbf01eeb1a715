use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use roomify_contracts::errors::GenerationError;
use roomify_contracts::project::GenerationResult;

use crate::generation::{image_digest, GenerationRequest};

type RenderOutcome = Result<GenerationResult, GenerationError>;
type SharedRender = Shared<BoxFuture<'static, RenderOutcome>>;

/// Process-wide table of renders in flight.
///
/// Entries are keyed by [`FlightTable::key_for`]: project id, source digest
/// and style. A view joins a running render only when it would have asked
/// for exactly that render itself. Entries are
/// removed as soon as the render resolves, so a later retry starts fresh.
#[derive(Default)]
pub struct FlightTable {
    inflight: Mutex<HashMap<String, SharedRender>>,
}

impl FlightTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// A render is shared only between identical requests for one project.
    pub fn key_for(project_id: &str, request: &GenerationRequest) -> String {
        format!(
            "{project_id}:{}:{}",
            image_digest(&request.source_image),
            request.style
        )
    }

    pub fn in_flight(&self, key: &str) -> bool {
        self.inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    pub async fn run<F>(&self, key: &str, start: F) -> RenderOutcome
    where
        F: FnOnce() -> BoxFuture<'static, RenderOutcome>,
    {
        let flight = {
            let mut inflight = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
            match inflight.get(key) {
                Some(existing) => {
                    tracing::debug!(flight = key, "joining in-flight render");
                    existing.clone()
                }
                None => {
                    let flight = start().shared();
                    inflight.insert(key.to_string(), flight.clone());
                    flight
                }
            }
        };

        let outcome = flight.clone().await;

        let mut inflight = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
        if inflight
            .get(key)
            .map(|current| current.ptr_eq(&flight))
            .unwrap_or(false)
        {
            inflight.remove(key);
        }
        outcome
    }
}
