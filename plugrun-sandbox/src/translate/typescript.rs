//! TypeScript lowering
//!
//! Strips types with `deno_ast` (swc underneath). No type checking: only
//! syntax errors fail the translation.

use crate::error::{Result, SandboxError};

#[cfg(feature = "typescript")]
pub fn strip_types(code: &str) -> Result<String> {
    use deno_ast::{
        EmitOptions, MediaType, ModuleSpecifier, ParseParams, SourceMapOption,
        TranspileModuleOptions, TranspileOptions,
    };

    let specifier = ModuleSpecifier::parse("file:///plugin.ts")
        .map_err(|e| SandboxError::Translation(format!("Invalid module specifier: {}", e)))?;

    let parsed = deno_ast::parse_module(ParseParams {
        specifier,
        text: crate::syntax::without_bom(code).into(),
        media_type: MediaType::TypeScript,
        capture_tokens: false,
        scope_analysis: false,
        maybe_syntax: None,
    })
    .map_err(|e| SandboxError::Translation(e.to_string()))?;

    // Recoverable syntax errors the parser worked around still count
    let diagnostics = parsed.diagnostics();
    if !diagnostics.is_empty() {
        let messages: Vec<String> = diagnostics.iter().map(|d| d.to_string()).collect();
        return Err(SandboxError::Translation(messages.join("\n")));
    }

    let emitted = parsed
        .transpile(
            &TranspileOptions::default(),
            &TranspileModuleOptions::default(),
            &EmitOptions {
                source_map: SourceMapOption::None,
                ..Default::default()
            },
        )
        .map_err(|e| SandboxError::Translation(e.to_string()))?
        .into_source();

    Ok(emitted.text)
}

#[cfg(not(feature = "typescript"))]
pub fn strip_types(_code: &str) -> Result<String> {
    Err(SandboxError::Translation(
        "Typed source detected but TypeScript support is not compiled in (enable the `typescript` feature)"
            .to_string(),
    ))
}
