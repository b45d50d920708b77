use std::time::Duration;

/// Timing of one half-cycle: the target record window and how much of it the
/// drain already consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleTiming {
    pub target: Duration,
    pub drain: Duration,
}

impl CycleTiming {
    pub fn new(target: Duration, drain: Duration) -> Self {
        Self { target, drain }
    }

    /// `max(0, target - drain)`. A drain longer than the window shortens that
    /// window; there is no catch-up.
    pub fn residual_wait(&self) -> Duration {
        self.target.saturating_sub(self.drain)
    }
}
