//! Primary backend: one heap-capped isolate per execution

use super::{check_syntax_with_profile, execute_with_profile, SandboxProfile};
use crate::error::Result;
use crate::execution::SandboxTracker;
use crate::harness::SyntaxCheck;
use crate::limits::ResourceLimits;
use crate::runtime::{BackendCapabilities, SandboxBackend, SandboxOutcome, SandboxRequest};
use crate::selector::BackendKind;
use async_trait::async_trait;
use deno_core::{JsRuntime, RuntimeOptions};
use std::sync::OnceLock;

pub(super) const PROFILE: SandboxProfile = SandboxProfile {
    hard_heap_limit: true,
    removed_globals: &["Deno"],
    await_disposal: true,
};

/// Dedicated V8 isolate with a hard heap ceiling.
///
/// Heap growth past the memory limit ends the run with `MemoryLimit`, and a
/// timed-out call returns only once the isolate has been torn down (or the
/// disposal grace period has passed).
#[derive(Debug, Clone, Copy, Default)]
pub struct IsolateBackend;

impl IsolateBackend {
    pub fn new() -> Self {
        Self
    }

    /// Whether isolates can be created on this host. Checked once per process.
    pub fn is_available() -> bool {
        static AVAILABLE: OnceLock<bool> = OnceLock::new();
        *AVAILABLE.get_or_init(boots)
    }
}

fn boots() -> bool {
    let outcome = std::thread::Builder::new()
        .name("plugrun-isolate-check".to_string())
        .spawn(|| {
            let mut runtime = JsRuntime::new(RuntimeOptions::default());
            runtime
                .execute_script("<boot-check>", "1 + 1".to_string())
                .is_ok()
        })
        .map(|thread| thread.join());

    let available = matches!(outcome, Ok(Ok(true)));
    if !available {
        tracing::warn!("V8 isolate failed to boot; primary backend unavailable");
    }
    available
}

#[async_trait]
impl SandboxBackend for IsolateBackend {
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
        BackendKind::Isolate
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            hard_heap_limit: true,
            awaits_disposal_on_timeout: true,
            restricted_globals: false,
        }
    }
}
