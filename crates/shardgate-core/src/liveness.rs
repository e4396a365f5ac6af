//! # Liveness Tracking
//!
//! Process-wide flag saying whether this node has settled after a rebalance.
//! The runtime is the single writer (through [`StateListener`]); request
//! handlers are the readers.

use crate::runtime::StateListener;
use crate::RuntimeState;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cloneable handle on the liveness flag. All clones share one flag.
#[derive(Debug, Clone, Default)]
pub struct LivenessTracker {
    live: Arc<AtomicBool>,
}

impl LivenessTracker {
    /// New tracker, not live.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }
}

impl StateListener for LivenessTracker {
    /// Live only right after `REBALANCING -> RUNNING`; anything else clears it.
    fn on_state_change(&self, previous: RuntimeState, current: RuntimeState) {
        let live = previous == RuntimeState::Rebalancing && current == RuntimeState::Running;
        self.live.store(live, Ordering::Release);
        tracing::debug!(live, "Liveness updated on {} -> {}", previous, current);
    }
}
