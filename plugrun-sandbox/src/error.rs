//! Error types for plugin translation and sandboxed execution

use crate::types::MemoryStats;

/// Result type for sandbox operations
pub type Result<T> = std::result::Result<T, SandboxError>;

/// Every failure an `execute` or `validate_code` call can end with.
///
/// Each variant is terminal for the call that produced it. Nothing in this
/// crate retries; that decision belongs to whoever orchestrates executions.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SandboxError {
    /// Bad limits or missing configuration, raised when the executor is built
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Type lowering failed; no sandbox was created
    #[error("Translation failed: {0}")]
    Translation(String),

    /// Bundling failed; no sandbox was created
    #[error("Bundling failed: {0}")]
    Bundling(String),

    /// Raised only from the validation path
    #[error("Plugin validation failed: {0}")]
    PluginValidation(String),

    /// The sandbox exceeded its wall-clock budget
    #[error("Execution timed out after {timeout_ms}ms")]
    Timeout {
        /// Configured budget
        timeout_ms: u64,
    },

    /// The sandbox exceeded its heap ceiling (primary backend only)
    #[error("Memory limit exceeded: used {used_mb}MB of {limit_mb}MB")]
    MemoryLimit {
        /// Configured ceiling
        limit_mb: u64,
        /// Heap in use when the violation was detected
        used_mb: u64,
    },

    /// Any other fault during the sandboxed run
    #[error("Execution failed after {execution_time_ms}ms: {message}")]
    Execution {
        /// Fault description
        message: String,
        /// Time spent before the fault
        execution_time_ms: u64,
        /// Heap snapshot at the time of the fault, when one could be taken
        memory: Option<MemoryStats>,
    },
}

impl SandboxError {
    /// Stable machine-readable code for this error
    pub fn code(&self) -> &'static str {
        match self {
            SandboxError::Configuration(_) => "CONFIGURATION_ERROR",
            SandboxError::Translation(_) => "TRANSLATION_ERROR",
            SandboxError::Bundling(_) => "BUNDLING_ERROR",
            SandboxError::PluginValidation(_) => "PLUGIN_VALIDATION_ERROR",
            SandboxError::Timeout { .. } => "TIMEOUT_ERROR",
            SandboxError::MemoryLimit { .. } => "MEMORY_LIMIT_ERROR",
            SandboxError::Execution { .. } => "EXECUTION_ERROR",
        }
    }

    /// Executions are never retried internally
    pub fn is_retryable(&self) -> bool {
        false
    }

    pub(crate) fn execution(message: impl Into<String>, execution_time_ms: u64) -> Self {
        SandboxError::Execution {
            message: message.into(),
            execution_time_ms,
            memory: None,
        }
    }

    /// Attach a heap snapshot to an execution fault
    pub(crate) fn with_memory(self, snapshot: MemoryStats) -> Self {
        match self {
            SandboxError::Execution {
                message,
                execution_time_ms,
                ..
            } => SandboxError::Execution {
                message,
                execution_time_ms,
                memory: Some(snapshot),
            },
            other => other,
        }
    }
}

impl From<toml::de::Error> for SandboxError {
    fn from(err: toml::de::Error) -> Self {
        SandboxError::Configuration(format!("Failed to parse config: {}", err))
    }
}
