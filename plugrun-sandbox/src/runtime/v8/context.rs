//! Fallback backend: restricted context without a hard heap ceiling

use super::{check_syntax_with_profile, execute_with_profile, SandboxProfile};
use crate::error::Result;
use crate::execution::SandboxTracker;
use crate::harness::SyntaxCheck;
use crate::limits::ResourceLimits;
use crate::runtime::{BackendCapabilities, SandboxBackend, SandboxOutcome, SandboxRequest};
use crate::selector::BackendKind;
use async_trait::async_trait;

pub(super) const PROFILE: SandboxProfile = SandboxProfile {
    hard_heap_limit: false,
    removed_globals: &["Deno", "WebAssembly", "SharedArrayBuffer", "Atomics"],
    await_disposal: false,
};

/// Context with a trimmed global surface.
///
/// The heap is only protected against exhaustion: running out terminates
/// the script with an `Execution` error, never `MemoryLimit`, and usage
/// above the configured limit is logged rather than enforced. Timeouts
/// return immediately while termination is requested in the background.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextBackend;

impl ContextBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SandboxBackend for ContextBackend {
    async fn execute(&self, request: SandboxRequest) -> Result<SandboxOutcome> {
        execute_with_profile(PROFILE, request).await
    }

    async fn check_syntax(
        &self,
        code: &str,
        limits: &ResourceLimits,
        tracker: &SandboxTracker,
    ) -> Result<SyntaxCheck> {
        check_syntax_with_profile(PROFILE, code, limits, tracker).await
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Context
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            hard_heap_limit: false,
            awaits_disposal_on_timeout: false,
            restricted_globals: true,
        }
    }
}
