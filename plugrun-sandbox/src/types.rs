//! Core types for plugin execution

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Request to run one entry point of a plugin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// Plugin source (JavaScript or TypeScript)
    pub code: String,

    /// JSON payload handed to the entry point
    #[serde(default)]
    pub payload: Value,

    /// Dot-separated path of the callable to invoke
    pub entry_point: String,

    /// Values exposed through the host library, merged over the config's bindings
    #[serde(default)]
    pub library_bindings: BTreeMap<String, Value>,
}

impl ExecutionContext {
    /// Create a context with a `null` payload
    pub fn new(code: impl Into<String>, entry_point: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            payload: Value::Null,
            entry_point: entry_point.into(),
            library_bindings: BTreeMap::new(),
        }
    }

    /// Set the payload
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Add a library binding
    pub fn with_binding(mut self, name: impl Into<String>, value: Value) -> Self {
        self.library_bindings.insert(name.into(), value);
        self
    }
}

/// Output of the translation stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompilationResult {
    /// Script text ready for the harness
    pub executable_code: String,

    /// Non-fatal notes collected while translating, in emission order
    pub diagnostics: Vec<String>,

    /// Host-library names the plugin imports that the stub provides
    pub resolved_binding_names: BTreeSet<String>,

    /// Whether static-type syntax was detected
    pub typed_dialect: bool,

    /// Whether the bundler produced the code
    pub bundled: bool,

    /// Whether the source referenced the host-library namespace
    pub references_library: bool,
}

impl CompilationResult {
    pub fn summary(&self) -> CompilationSummary {
        CompilationSummary {
            typed_dialect: self.typed_dialect,
            bundled: self.bundled,
            diagnostics: self.diagnostics.clone(),
            resolved_binding_names: self.resolved_binding_names.clone(),
        }
    }
}

/// Compilation details reported alongside an execution result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompilationSummary {
    pub typed_dialect: bool,
    pub bundled: bool,
    pub diagnostics: Vec<String>,
    pub resolved_binding_names: BTreeSet<String>,
}

/// Heap snapshot in bytes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub used: u64,
    pub total: u64,
    pub external: u64,
}

impl MemoryStats {
    /// Used heap rounded up to whole megabytes
    pub fn used_mb(&self) -> u64 {
        self.used.div_ceil(1024 * 1024)
    }
}

/// Timing and memory figures for one execution
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub execution_time_ms: u64,
    pub memory: MemoryStats,
}

/// Result of a completed execution.
///
/// A plain value: nothing in it refers back to the sandbox that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Stringified return value of the entry point
    pub output_text: String,

    pub stats: ExecutionStats,

    /// Captured `console.log`/`info`/`debug`/`warn` lines
    #[serde(default)]
    pub logs: Vec<String>,

    /// Captured `console.error` lines and invocation failures
    #[serde(default)]
    pub errors: Vec<String>,

    #[serde(default)]
    pub compilation_info: Option<CompilationSummary>,

    /// Correlates the result with the execution's log lines
    pub execution_id: String,

    /// Backend that ran the plugin
    pub backend: String,
}

impl ExecutionResult {
    /// Whether the entry point threw and the failure was folded into the output
    pub fn is_error_output(&self) -> bool {
        self.output_text.starts_with("Error: ")
    }
}
