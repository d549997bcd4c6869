//! Executor configuration

use crate::error::{Result, SandboxError};
use crate::limits::ResourceLimits;
use crate::selector::BackendPreference;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Configuration bound to a [`PluginExecutor`](crate::PluginExecutor) at construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Memory and time ceilings
    #[serde(flatten)]
    pub limits: ResourceLimits,

    /// Log compiled code and harness details at info level
    #[serde(default)]
    pub debug: bool,

    /// Lower TypeScript syntax before execution
    #[serde(default = "default_true")]
    pub enable_type_translation: bool,

    /// Bundle plugins that import the host library
    #[serde(default = "default_true")]
    pub enable_library_binding: bool,

    /// Values exposed through the host library to every plugin
    #[serde(default)]
    pub library_bindings: BTreeMap<String, Value>,

    /// Which sandbox backend to run plugins in
    #[serde(default)]
    pub backend: BackendPreference,
}

fn default_true() -> bool {
    true
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            limits: ResourceLimits::default(),
            debug: false,
            enable_type_translation: true,
            enable_library_binding: true,
            library_bindings: BTreeMap::new(),
            backend: BackendPreference::default(),
        }
    }
}

impl ExecutorConfig {
    /// Defaults with strict limits
    pub fn strict() -> Self {
        Self {
            limits: ResourceLimits::strict(),
            ..Default::default()
        }
    }

    /// Defaults with permissive limits
    pub fn permissive() -> Self {
        Self {
            limits: ResourceLimits::permissive(),
            ..Default::default()
        }
    }

    pub fn with_limits(mut self, memory_limit_mb: u64, timeout_ms: u64) -> Self {
        self.limits = ResourceLimits {
            memory_limit_mb,
            timeout_ms,
        };
        self
    }

    pub fn with_backend(mut self, backend: BackendPreference) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_binding(mut self, name: impl Into<String>, value: Value) -> Self {
        self.library_bindings.insert(name.into(), value);
        self
    }

    pub fn memory_limit_mb(&self) -> u64 {
        self.limits.memory_limit_mb
    }

    pub fn timeout_ms(&self) -> u64 {
        self.limits.timeout_ms
    }

    /// Fail fast on limits the sandbox cannot honor
    pub fn validate(&self) -> Result<()> {
        self.limits.validate()
    }

    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ExecutorConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SandboxError::Configuration(format!(
                "Failed to read config {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }
}
