//! Sandbox backend trait and implementations

pub mod v8;

use crate::error::Result;
use crate::execution::{ExecutionId, SandboxTracker};
use crate::harness::{EntryPoint, SyntaxCheck};
use crate::limits::ResourceLimits;
use crate::selector::BackendKind;
use crate::types::ExecutionStats;
use async_trait::async_trait;
use serde::Serialize;

pub use v8::{ContextBackend, IsolateBackend};

/// What a backend guarantees
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BackendCapabilities {
    /// Heap growth past the memory limit ends the run with `MemoryLimit`
    pub hard_heap_limit: bool,

    /// A timed-out call returns only after the sandbox is gone
    pub awaits_disposal_on_timeout: bool,

    /// Host-reaching globals are removed before plugin code runs
    pub restricted_globals: bool,
}

/// One sandboxed run
#[derive(Debug, Clone)]
pub struct SandboxRequest {
    pub execution_id: ExecutionId,

    /// Complete harness script (plugin code included)
    pub harness: String,

    /// Entry point the harness resolves, for error messages
    pub entry_point: EntryPoint,

    pub limits: ResourceLimits,

    /// Tracker the sandbox registers with for its lifetime
    pub tracker: SandboxTracker,
}

/// Values read back from a finished sandbox
#[derive(Debug, Clone, PartialEq)]
pub struct SandboxOutcome {
    pub output_text: String,
    pub logs: Vec<String>,
    pub errors: Vec<String>,
    pub stats: ExecutionStats,
}

/// A place plugin code can run
#[async_trait]
pub trait SandboxBackend: Send + Sync {
    /// Create a sandbox, evaluate the harness and dispose of the sandbox
    async fn execute(&self, request: SandboxRequest) -> Result<SandboxOutcome>;

    /// Compile `code` as a plugin body inside a throwaway sandbox
    async fn check_syntax(
        &self,
        code: &str,
        limits: &ResourceLimits,
        tracker: &SandboxTracker,
    ) -> Result<SyntaxCheck>;

    fn kind(&self) -> BackendKind;

    fn capabilities(&self) -> BackendCapabilities;

    /// Get backend name
    fn name(&self) -> &str {
        self.kind().name()
    }
}
