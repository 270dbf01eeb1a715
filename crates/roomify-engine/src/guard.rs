#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GuardState {
    #[default]
    NotYetAttempted,
    Attempted,
}

/// Per-view latch that lets at most one render start per attempt.
///
/// `try_acquire` is a plain check-and-set on `&mut self`; callers must not
/// await between deciding to render and acquiring.
#[derive(Debug, Clone, Default)]
pub struct GenerationGuard {
    state: GuardState,
}

impl GenerationGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&mut self) -> bool {
        match self.state {
            GuardState::NotYetAttempted => {
                self.state = GuardState::Attempted;
                true
            }
            GuardState::Attempted => false,
        }
    }

    /// Re-arms the latch after a failed attempt.
    pub fn reset(&mut self) {
        self.state = GuardState::NotYetAttempted;
    }

    pub fn state(&self) -> GuardState {
        self.state
    }

    pub fn is_attempted(&self) -> bool {
        self.state == GuardState::Attempted
    }
}
