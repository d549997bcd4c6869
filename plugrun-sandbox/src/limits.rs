//! Resource limits for sandboxed execution

use crate::error::{Result, SandboxError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Smallest heap ceiling a sandbox can boot and run a plugin under
pub const MIN_MEMORY_LIMIT_MB: u64 = 16;

/// Time and memory ceilings applied to every execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// V8 heap ceiling in megabytes
    #[serde(default = "ResourceLimits::default_memory_limit_mb")]
    pub memory_limit_mb: u64,

    /// Wall-clock budget in milliseconds
    #[serde(default = "ResourceLimits::default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            memory_limit_mb: Self::default_memory_limit_mb(),
            timeout_ms: Self::default_timeout_ms(),
        }
    }
}

impl ResourceLimits {
    fn default_memory_limit_mb() -> u64 {
        128
    }

    fn default_timeout_ms() -> u64 {
        5_000
    }

    /// Create strict limits for untrusted code
    pub fn strict() -> Self {
        Self {
            memory_limit_mb: 32,
            timeout_ms: 1_000,
        }
    }

    /// Create permissive limits for trusted code
    pub fn permissive() -> Self {
        Self {
            memory_limit_mb: 512,
            timeout_ms: 60_000,
        }
    }

    /// The heap ceiling must reach [`MIN_MEMORY_LIMIT_MB`] and the timeout
    /// must be non-zero
    pub fn validate(&self) -> Result<()> {
        if self.memory_limit_mb < MIN_MEMORY_LIMIT_MB {
            return Err(SandboxError::Configuration(format!(
                "memory_limit_mb must be at least {} (got {})",
                MIN_MEMORY_LIMIT_MB, self.memory_limit_mb
            )));
        }
        if self.timeout_ms == 0 {
            return Err(SandboxError::Configuration(
                "timeout_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn memory_limit_bytes(&self) -> usize {
        (self.memory_limit_mb as usize).saturating_mul(1024 * 1024)
    }
}
