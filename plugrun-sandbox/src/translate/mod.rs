//! Source translation
//!
//! Turns submitted plugin source into a script the harness can embed:
//! typed syntax is lowered, the host library is bound (bundled or inlined)
//! and ES module syntax is rewritten to the `module`/`exports` convention.

pub mod dialect;
mod typescript;

use crate::bundler::{self, stub, LibraryLink};
use crate::config::ExecutorConfig;
use crate::error::{Result, SandboxError};
use crate::types::CompilationResult;
use serde_json::Value;
use std::collections::BTreeMap;

pub use typescript::strip_types;

/// Translate `code` into executable script code.
///
/// `bindings` are the library bindings already merged from the config and
/// the execution context. Translation has no side effects.
pub fn translate(
    code: &str,
    config: &ExecutorConfig,
    bindings: &BTreeMap<String, Value>,
) -> Result<CompilationResult> {
    let mut diagnostics = Vec::new();
    let typed_dialect = dialect::is_typed(code);
    if typed_dialect {
        tracing::debug!(markers = ?dialect::typed_markers(code), "Typed dialect detected");
    }

    let lowered_types;
    let source: &str = if typed_dialect && config.enable_type_translation {
        lowered_types = typescript::strip_types(code)?;
        diagnostics.push("Type annotations removed".to_string());
        &lowered_types
    } else {
        if typed_dialect {
            diagnostics.push(
                "Typed syntax detected but type translation is disabled; source passed through"
                    .to_string(),
            );
        }
        code
    };

    let references_library = bundler::references_library(source);

    if references_library && config.enable_library_binding {
        let mut compiled = bundler::bundle(source, bindings)?;
        diagnostics.append(&mut compiled.diagnostics);
        compiled.diagnostics = diagnostics;
        compiled.typed_dialect = typed_dialect;
        return Ok(compiled);
    }

    let inline_stub = stub::stub_expression(&BTreeMap::new());
    let lowered = bundler::lower(source, LibraryLink::Inline(&inline_stub), bindings)
        .map_err(|errors| SandboxError::Translation(errors.join("\n")))?;

    if lowered.references_library {
        diagnostics.push(format!(
            "{} references replaced with an inline stub",
            stub::LIBRARY_NAMESPACE
        ));
    }
    if lowered.has_module_syntax {
        diagnostics.push("ES module syntax lowered to CommonJS".to_string());
    }
    diagnostics.extend(lowered.warnings);

    Ok(CompilationResult {
        executable_code: lowered.code,
        diagnostics,
        resolved_binding_names: lowered.library_names,
        typed_dialect,
        bundled: false,
        references_library: lowered.references_library,
    })
}
