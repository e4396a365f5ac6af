//! # Stream Runtime
//!
//! The router never owns partitions itself; it asks the stream runtime. This
//! module defines that contract (`StreamsRuntime`, `StateListener`) and
//! `EmbeddedRuntime`, the in-process implementation the binary runs with.
//!
//! ## Lifecycle
//!
//! ```text
//! CREATED -> REBALANCING -> RUNNING <-> REBALANCING
//!     \            \           \
//!      +------------+-----------+--> PENDING_SHUTDOWN -> NOT_RUNNING
//! ```
//!
//! Ownership metadata and local store handles are only served while
//! `RUNNING`. Everywhere else they fail with `AssignmentUnavailable` so
//! callers never route on a half-applied assignment.

use crate::assignment::Assignment;
use crate::shard::LocalStore;
use crate::storage::ShardStorage;
use crate::{NodeAddress, RecordKey, RuntimeState, ShardgateError};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, RwLock};

// =============================================================================
// CONTRACT
// =============================================================================

/// Observer of runtime state transitions.
///
/// Called synchronously on the thread performing the transition.
pub trait StateListener: Send + Sync {
    fn on_state_change(&self, previous: RuntimeState, current: RuntimeState);
}

/// What the router consumes from the stream runtime.
///
/// Implementations are safe for concurrent calls; the router adds no
/// locking of its own.
pub trait StreamsRuntime: Send + Sync {
    /// Current lifecycle state.
    fn state(&self) -> RuntimeState;

    /// Read-only handle on the locally owned partitions of `store`.
    fn local_store(&self, store: &str) -> Result<LocalStore, ShardgateError>;

    /// Node currently owning the partition `key` hashes to.
    fn query_metadata_for_key(
        &self,
        store: &str,
        key: &RecordKey,
    ) -> Result<NodeAddress, ShardgateError>;

    /// Every node owning at least one partition of `store`.
    fn all_metadata_for_store(&self, store: &str) -> Result<Vec<NodeAddress>, ShardgateError>;

    /// Install the state listener, replacing any previous one.
    fn register_state_listener(&self, listener: Arc<dyn StateListener>);
}

// =============================================================================
// EMBEDDED RUNTIME
// =============================================================================

#[derive(Debug)]
struct RuntimeInner {
    state: RuntimeState,
    assignment: Option<Assignment>,
}

/// In-process runtime backed by a shard storage engine.
pub struct EmbeddedRuntime {
    self_address: NodeAddress,
    stores: BTreeSet<String>,
    storage: Arc<dyn ShardStorage>,
    inner: RwLock<RuntimeInner>,
    listener: Mutex<Option<Arc<dyn StateListener>>>,
    /// Serializes transitions so the listener sees them in order.
    transitions: Mutex<()>,
}

impl std::fmt::Debug for EmbeddedRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddedRuntime")
            .field("self_address", &self.self_address)
            .field("stores", &self.stores)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn poisoned() -> ShardgateError {
    ShardgateError::Storage("runtime lock poisoned".to_string())
}

impl EmbeddedRuntime {
    /// Create a runtime in `CREATED` state.
    pub fn new<S: Into<String>>(
        self_address: NodeAddress,
        stores: impl IntoIterator<Item = S>,
        storage: Arc<dyn ShardStorage>,
    ) -> Self {
        Self {
            self_address,
            stores: stores.into_iter().map(Into::into).collect(),
            storage,
            inner: RwLock::new(RuntimeInner {
                state: RuntimeState::Created,
                assignment: None,
            }),
            listener: Mutex::new(None),
            transitions: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn self_address(&self) -> &NodeAddress {
        &self.self_address
    }

    /// Storage engine backing the local shard.
    #[must_use]
    pub fn storage(&self) -> Arc<dyn ShardStorage> {
        Arc::clone(&self.storage)
    }

    /// Assignment currently in force, if one was ever applied.
    #[must_use]
    pub fn assignment(&self) -> Option<Assignment> {
        self.inner
            .read()
            .ok()
            .and_then(|inner| inner.assignment.clone())
    }

    /// Join the cluster: `CREATED -> REBALANCING -> RUNNING`.
    ///
    /// The assignment is computed while rebalancing. If it cannot be built
    /// the runtime moves to `ERROR`.
    pub fn start(&self, members: &[NodeAddress], partitions: u32) -> Result<(), ShardgateError> {
        self.transition(RuntimeState::Rebalancing, None)?;
        match Assignment::round_robin(partitions, members) {
            Ok(assignment) => {
                self.log_assignment(&assignment);
                self.transition(RuntimeState::Running, Some(assignment))
            }
            Err(e) => {
                tracing::error!("Assignment failed: {}", e);
                self.transition(RuntimeState::Error, None)?;
                Err(e)
            }
        }
    }

    /// Enter a rebalance. Ownership queries fail until it completes.
    pub fn begin_rebalance(&self) -> Result<(), ShardgateError> {
        self.transition(RuntimeState::Rebalancing, None)
    }

    /// Finish a rebalance with the new assignment.
    ///
    /// A rebalance moves owners only. Records are filed by partition number,
    /// so an assignment over a different partition count is rejected and the
    /// runtime stays in `REBALANCING`.
    pub fn complete_rebalance(&self, assignment: Assignment) -> Result<(), ShardgateError> {
        let current = self.assignment().map(|a| a.partitions());
        if let Some(current) = current.filter(|&n| n != assignment.partitions()) {
            return Err(ShardgateError::Config(format!(
                "rebalance cannot change partition count from {} to {}",
                current,
                assignment.partitions()
            )));
        }
        self.log_assignment(&assignment);
        self.transition(RuntimeState::Running, Some(assignment))
    }

    /// Leave the cluster: `-> PENDING_SHUTDOWN -> NOT_RUNNING`.
    pub fn shutdown(&self) -> Result<(), ShardgateError> {
        self.transition(RuntimeState::PendingShutdown, None)?;
        self.transition(RuntimeState::NotRunning, None)
    }

    fn log_assignment(&self, assignment: &Assignment) {
        tracing::info!(
            partitions = assignment.partitions(),
            owned = assignment.owned_by(&self.self_address).len(),
            members = assignment.members().len(),
            "Applying partition assignment"
        );
    }

    fn transition(
        &self,
        next: RuntimeState,
        assignment: Option<Assignment>,
    ) -> Result<(), ShardgateError> {
        let _serial = self.transitions.lock().map_err(|_| poisoned())?;

        let previous = {
            let mut inner = self.inner.write().map_err(|_| poisoned())?;
            let previous = inner.state;
            if !previous.can_transition_to(next) {
                return Err(ShardgateError::InvalidStateTransition {
                    from: previous,
                    to: next,
                });
            }
            inner.state = next;
            if assignment.is_some() {
                inner.assignment = assignment;
            }
            previous
        };

        tracing::info!("Runtime state {} -> {}", previous, next);

        let listener = self.listener.lock().map_err(|_| poisoned())?.clone();
        if let Some(listener) = listener {
            listener.on_state_change(previous, next);
        }
        Ok(())
    }

    fn check_store(&self, store: &str) -> Result<(), ShardgateError> {
        if self.stores.contains(store) {
            Ok(())
        } else {
            Err(ShardgateError::UnknownStore(store.to_string()))
        }
    }

    /// Run `f` against the assignment if the runtime is queryable.
    fn with_assignment<T>(
        &self,
        store: &str,
        f: impl FnOnce(&Assignment) -> Result<T, ShardgateError>,
    ) -> Result<T, ShardgateError> {
        self.check_store(store)?;
        let inner = self.inner.read().map_err(|_| poisoned())?;
        match (&inner.assignment, inner.state.is_queryable()) {
            (Some(assignment), true) => f(assignment),
            _ => Err(ShardgateError::AssignmentUnavailable(store.to_string())),
        }
    }
}

impl StreamsRuntime for EmbeddedRuntime {
    fn state(&self) -> RuntimeState {
        self.inner
            .read()
            .map(|inner| inner.state)
            .unwrap_or(RuntimeState::Error)
    }

    fn local_store(&self, store: &str) -> Result<LocalStore, ShardgateError> {
        self.with_assignment(store, |assignment| {
            Ok(LocalStore::new(
                store,
                assignment.partitions(),
                assignment.owned_by(&self.self_address),
                Arc::clone(&self.storage),
            ))
        })
    }

    fn query_metadata_for_key(
        &self,
        store: &str,
        key: &RecordKey,
    ) -> Result<NodeAddress, ShardgateError> {
        self.with_assignment(store, |assignment| {
            assignment
                .locate(key)
                .map(|(_, owner)| owner.clone())
                .ok_or_else(|| ShardgateError::AssignmentUnavailable(store.to_string()))
        })
    }

    fn all_metadata_for_store(&self, store: &str) -> Result<Vec<NodeAddress>, ShardgateError> {
        self.with_assignment(store, |assignment| Ok(assignment.members()))
    }

    fn register_state_listener(&self, listener: Arc<dyn StateListener>) {
        match self.listener.lock() {
            Ok(mut slot) => {
                if slot.replace(listener).is_some() {
                    tracing::warn!("Replacing previously registered state listener");
                }
            }
            Err(_) => tracing::error!("State listener slot poisoned; listener not registered"),
        }
    }
}
