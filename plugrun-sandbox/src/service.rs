//! Plugin executor - main entry point

use crate::config::ExecutorConfig;
use crate::error::{Result, SandboxError};
use crate::execution::{ExecutionId, SandboxTracker};
use crate::harness::{self, EntryPoint};
use crate::runtime::{SandboxBackend, SandboxRequest};
use crate::selector::{BackendKind, BackendSelector};
use crate::translate;
use crate::types::{CompilationResult, ExecutionContext, ExecutionResult};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;

/// How long `cleanup` waits for sandboxes that are still terminating
const CLEANUP_GRACE: Duration = Duration::from_secs(1);

/// Runs plugin entry points in fresh sandboxes.
///
/// The configuration is bound at construction; every `execute` call gets
/// its own sandbox, which is gone again when the call returns.
pub struct PluginExecutor {
    config: ExecutorConfig,
    backend: Arc<dyn SandboxBackend>,
    tracker: SandboxTracker,
}

impl PluginExecutor {
    /// Create an executor, probing the host for the preferred backend
    pub fn new(config: ExecutorConfig) -> Result<Self> {
        Self::with_selector(config, &BackendSelector::new())
    }

    /// Create an executor using a caller-supplied backend selector
    pub fn with_selector(config: ExecutorConfig, selector: &BackendSelector) -> Result<Self> {
        config.validate()?;
        let backend = selector.select(config.backend)?;
        Ok(Self::assemble(config, backend))
    }

    /// Create an executor around a specific backend
    pub fn with_backend(config: ExecutorConfig, backend: Arc<dyn SandboxBackend>) -> Result<Self> {
        config.validate()?;
        Ok(Self::assemble(config, backend))
    }

    fn assemble(config: ExecutorConfig, backend: Arc<dyn SandboxBackend>) -> Self {
        tracing::info!(
            backend = backend.name(),
            memory_limit_mb = config.memory_limit_mb(),
            timeout_ms = config.timeout_ms(),
            "Plugin executor ready"
        );
        Self {
            config,
            backend,
            tracker: SandboxTracker::new(),
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Get the backend name
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Sandboxes currently alive for this executor
    pub fn live_sandboxes(&self) -> usize {
        self.tracker.live()
    }

    /// Translate `code` the way `execute` would, without running it
    pub fn compile(
        &self,
        code: &str,
        extra_bindings: &BTreeMap<String, Value>,
    ) -> Result<CompilationResult> {
        let bindings = self.merged_bindings(extra_bindings);
        translate::translate(code, &self.config, &bindings)
    }

    /// Run one entry point of a plugin against a payload
    pub async fn execute(&self, context: ExecutionContext) -> Result<ExecutionResult> {
        let id = ExecutionId::new();
        let span = tracing::info_span!(
            "plugin_execution",
            execution_id = %id,
            backend = self.backend.name(),
            entry_point = %context.entry_point,
        );
        self.execute_with_id(id, context).instrument(span).await
    }

    async fn execute_with_id(
        &self,
        id: ExecutionId,
        context: ExecutionContext,
    ) -> Result<ExecutionResult> {
        let started = Instant::now();
        tracing::info!(code_len = context.code.len(), "Executing plugin");

        let entry = EntryPoint::parse(&context.entry_point)?;
        let bindings = self.merged_bindings(&context.library_bindings);
        let compiled = translate::translate(&context.code, &self.config, &bindings)?;
        self.log_compiled(&compiled);

        let harness =
            harness::build_harness(&compiled.executable_code, &entry, &context.payload, &bindings)?;
        if self.config.debug {
            tracing::info!(harness_len = harness.len(), "Harness built");
        }

        let request = SandboxRequest {
            execution_id: id,
            harness,
            entry_point: entry,
            limits: self.config.limits,
            tracker: self.tracker.clone(),
        };

        match self.backend.execute(request).await {
            Ok(outcome) => {
                tracing::info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    sandbox_ms = outcome.stats.execution_time_ms,
                    used_heap_mb = outcome.stats.memory.used_mb(),
                    output_len = outcome.output_text.len(),
                    "Plugin execution completed"
                );
                Ok(ExecutionResult {
                    output_text: outcome.output_text,
                    stats: outcome.stats,
                    logs: outcome.logs,
                    errors: outcome.errors,
                    compilation_info: Some(compiled.summary()),
                    execution_id: id.to_string(),
                    backend: self.backend.name().to_string(),
                })
            }
            Err(err) => {
                tracing::warn!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    code = err.code(),
                    error = %err,
                    "Plugin execution failed"
                );
                Err(err)
            }
        }
    }

    /// Check that `code` translates and compiles as a plugin.
    ///
    /// Translation and bundling failures surface as `PluginValidation`;
    /// a syntax error reported by the sandbox returns `Ok(false)`.
    pub async fn validate_code(&self, code: &str) -> Result<bool> {
        let compiled = self.compile(code, &BTreeMap::new()).map_err(|e| match e {
            SandboxError::Translation(message) | SandboxError::Bundling(message) => {
                SandboxError::PluginValidation(message)
            }
            other => other,
        })?;

        let check = self
            .backend
            .check_syntax(&compiled.executable_code, &self.config.limits, &self.tracker)
            .await
            .map_err(|e| SandboxError::PluginValidation(e.to_string()))?;

        if check.valid {
            return Ok(true);
        }

        let message = check.message.unwrap_or_default();
        if self.backend.kind() == BackendKind::Context && compiled.references_library {
            tracing::warn!(
                backend = self.backend.name(),
                message = %message,
                "Syntax check failed for a library-bound plugin; accepting it"
            );
            return Ok(true);
        }

        tracing::info!(message = %message, "Plugin failed syntax check");
        Ok(false)
    }

    /// Wait briefly for sandboxes that are still terminating. Never fails.
    pub async fn cleanup(&self) {
        let deadline = Instant::now() + CLEANUP_GRACE;
        while self.tracker.live() > 0 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let remaining = self.tracker.live();
        if remaining > 0 {
            tracing::warn!(remaining, "Sandboxes still terminating after cleanup");
        } else {
            tracing::debug!(
                created = self.tracker.total_created(),
                "Plugin executor cleaned up"
            );
        }
    }

    fn merged_bindings(&self, overrides: &BTreeMap<String, Value>) -> BTreeMap<String, Value> {
        let mut bindings = self.config.library_bindings.clone();
        bindings.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        bindings
    }

    fn log_compiled(&self, compiled: &CompilationResult) {
        if self.config.debug {
            tracing::info!(
                code_len = compiled.executable_code.len(),
                typed = compiled.typed_dialect,
                bundled = compiled.bundled,
                diagnostics = ?compiled.diagnostics,
                "Plugin compiled"
            );
        } else {
            tracing::debug!(
                code_len = compiled.executable_code.len(),
                typed = compiled.typed_dialect,
                bundled = compiled.bundled,
                "Plugin compiled"
            );
        }
    }
}
