//! Backend selection

use crate::error::{Result, SandboxError};
use crate::runtime::{ContextBackend, IsolateBackend, SandboxBackend};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Requested backend, as written in configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendPreference {
    /// Primary when it is usable, fallback otherwise
    #[default]
    Auto,
    /// Primary or nothing
    Primary,
    /// Always the fallback
    Fallback,
}

/// Concrete sandbox backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Dedicated heap-capped V8 isolate per execution
    Isolate,
    /// Restricted context without a hard heap ceiling
    Context,
}

impl BackendKind {
    /// Isolation ranking (lower is stronger)
    pub fn isolation_rank(self) -> u8 {
        match self {
            BackendKind::Isolate => 0,
            BackendKind::Context => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BackendKind::Isolate => "isolate",
            BackendKind::Context => "context",
        }
    }
}

/// Outcome of backend selection
#[derive(Debug, Clone)]
pub struct BackendDecision {
    pub kind: BackendKind,

    /// Whether the preference could not be honored as written
    pub is_override: bool,

    /// Reason for selection/override
    pub reason: String,
}

/// Picks a backend for a preference, given which backends are usable
pub struct BackendSelector {
    primary_available: bool,
}

impl BackendSelector {
    /// Probe the host for the primary backend
    pub fn new() -> Self {
        Self {
            primary_available: IsolateBackend::is_available(),
        }
    }

    /// Selector with a fixed availability answer
    pub fn with_primary_available(primary_available: bool) -> Self {
        Self { primary_available }
    }

    pub fn decide(&self, preference: BackendPreference) -> Result<BackendDecision> {
        match preference {
            BackendPreference::Fallback => Ok(BackendDecision {
                kind: BackendKind::Context,
                is_override: false,
                reason: "Fallback backend requested".to_string(),
            }),
            BackendPreference::Primary if self.primary_available => Ok(BackendDecision {
                kind: BackendKind::Isolate,
                is_override: false,
                reason: "Primary backend requested and available".to_string(),
            }),
            BackendPreference::Primary => Err(SandboxError::Configuration(
                "Primary isolate backend requested but it is unavailable on this host".to_string(),
            )),
            BackendPreference::Auto if self.primary_available => Ok(BackendDecision {
                kind: BackendKind::Isolate,
                is_override: false,
                reason: "Auto-selected strongest isolation".to_string(),
            }),
            BackendPreference::Auto => Ok(BackendDecision {
                kind: BackendKind::Context,
                is_override: true,
                reason: "Primary backend unavailable, falling back to restricted context"
                    .to_string(),
            }),
        }
    }

    /// Build the backend for a preference
    pub fn select(&self, preference: BackendPreference) -> Result<Arc<dyn SandboxBackend>> {
        let decision = self.decide(preference)?;
        if decision.is_override {
            tracing::warn!(
                backend = decision.kind.name(),
                reason = %decision.reason,
                "Backend preference overridden"
            );
        } else {
            tracing::debug!(
                backend = decision.kind.name(),
                reason = %decision.reason,
                "Backend selected"
            );
        }

        let backend: Arc<dyn SandboxBackend> = match decision.kind {
            BackendKind::Isolate => Arc::new(IsolateBackend::new()),
            BackendKind::Context => Arc::new(ContextBackend::new()),
        };
        Ok(backend)
    }
}

impl Default for BackendSelector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_prefers_primary() {
        let selector = BackendSelector::with_primary_available(true);
        let decision = selector.decide(BackendPreference::Auto).unwrap();
        assert_eq!(decision.kind, BackendKind::Isolate);
        assert!(!decision.is_override);
    }

    #[test]
    fn test_auto_falls_back_when_primary_missing() {
        let selector = BackendSelector::with_primary_available(false);
        let decision = selector.decide(BackendPreference::Auto).unwrap();
        assert_eq!(decision.kind, BackendKind::Context);
        assert!(decision.is_override);
    }

    #[test]
    fn test_primary_required_fails_when_missing() {
        let selector = BackendSelector::with_primary_available(false);
        let err = selector.decide(BackendPreference::Primary).unwrap_err();
        assert_eq!(err.code(), "CONFIGURATION_ERROR");
    }

    #[test]
    fn test_fallback_always_honored() {
        let selector = BackendSelector::with_primary_available(true);
        let decision = selector.decide(BackendPreference::Fallback).unwrap();
        assert_eq!(decision.kind, BackendKind::Context);
    }

    #[test]
    fn test_isolation_rank() {
        assert!(BackendKind::Isolate.isolation_rank() < BackendKind::Context.isolation_rank());
    }
}
