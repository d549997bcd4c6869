//! plugrun sandbox - run untrusted plugins in bounded V8 sandboxes
//!
//! A plugin is JavaScript or TypeScript source exposing one or more entry
//! points. [`PluginExecutor`] lowers type syntax, bundles imports of the
//! `@plugin/sdk` host library, wraps the result in an invocation harness and
//! evaluates it in a fresh sandbox with a memory ceiling and a wall-clock
//! budget.

mod bundler;
mod config;
mod error;
mod execution;
mod harness;
mod limits;
mod runtime;
mod selector;
mod service;
mod syntax;
mod translate;
mod types;

pub use bundler::{bundle, references_library, LIBRARY_NAMESPACE, SDK_VERSION};
pub use config::ExecutorConfig;
pub use error::{Result, SandboxError};
pub use execution::{ExecutionId, SandboxLease, SandboxState, SandboxTracker};
pub use harness::{
    build_harness, strategies_for, EntryPoint, HarnessOutput, Strategy, SyntaxCheck,
    CHILDREN_ENTRY_POINT,
};
pub use limits::{ResourceLimits, MIN_MEMORY_LIMIT_MB};
pub use runtime::{
    BackendCapabilities, ContextBackend, IsolateBackend, SandboxBackend, SandboxOutcome,
    SandboxRequest,
};
pub use selector::{BackendDecision, BackendKind, BackendPreference, BackendSelector};
pub use service::PluginExecutor;
pub use translate::dialect::{is_typed, typed_markers};
pub use translate::{strip_types, translate};
pub use types::{
    CompilationResult, CompilationSummary, ExecutionContext, ExecutionResult, ExecutionStats,
    MemoryStats,
};
