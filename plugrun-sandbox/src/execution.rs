//! Execution identity and sandbox lifecycle bookkeeping

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Unique execution identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionId(pub uuid::Uuid);

impl ExecutionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sandbox lifecycle.
///
/// `Created -> Running -> {Completed | TimedOut | Faulted} -> Disposed`.
/// Any state may go straight to `Disposed`; nothing leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SandboxState {
    Created,
    Running,
    Completed,
    TimedOut,
    Faulted,
    Disposed,
}

impl SandboxState {
    pub fn is_finished(self) -> bool {
        matches!(
            self,
            SandboxState::Completed | SandboxState::TimedOut | SandboxState::Faulted
        )
    }

    pub fn can_transition_to(self, next: SandboxState) -> bool {
        use SandboxState::*;
        match (self, next) {
            (Disposed, _) => false,
            (_, Disposed) => true,
            (Created, Running) | (Created, TimedOut) | (Created, Faulted) => true,
            (Running, Completed) | (Running, TimedOut) | (Running, Faulted) => true,
            _ => false,
        }
    }
}

/// Live-sandbox counter owned by one executor
#[derive(Debug, Clone, Default)]
pub struct SandboxTracker {
    live: Arc<AtomicUsize>,
    created: Arc<AtomicU64>,
}

impl SandboxTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sandboxes created and not yet disposed
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Sandboxes created over the tracker's lifetime
    pub fn total_created(&self) -> u64 {
        self.created.load(Ordering::SeqCst)
    }

    /// Account for a new sandbox
    pub fn register(&self, id: ExecutionId) -> SandboxLease {
        self.live.fetch_add(1, Ordering::SeqCst);
        self.created.fetch_add(1, Ordering::SeqCst);
        SandboxLease {
            tracker: self.clone(),
            id,
            state: SandboxState::Created,
        }
    }
}

/// One sandbox's slot in a [`SandboxTracker`].
///
/// Dropping the lease disposes it; disposing twice is a no-op.
#[derive(Debug)]
pub struct SandboxLease {
    tracker: SandboxTracker,
    id: ExecutionId,
    state: SandboxState,
}

impl SandboxLease {
    pub fn id(&self) -> ExecutionId {
        self.id
    }

    pub fn state(&self) -> SandboxState {
        self.state
    }

    /// Move to `next`, ignoring transitions the lifecycle does not allow
    pub fn transition(&mut self, next: SandboxState) {
        if self.state.can_transition_to(next) {
            tracing::trace!(
                execution_id = %self.id,
                from = ?self.state,
                to = ?next,
                "Sandbox state change"
            );
            self.state = next;
        }
    }

    pub fn dispose(&mut self) {
        if self.state == SandboxState::Disposed {
            return;
        }
        self.state = SandboxState::Disposed;
        self.tracker.live.fetch_sub(1, Ordering::SeqCst);
        tracing::debug!(execution_id = %self.id, "Sandbox disposed");
    }
}

impl Drop for SandboxLease {
    fn drop(&mut self) {
        self.dispose();
    }
}
