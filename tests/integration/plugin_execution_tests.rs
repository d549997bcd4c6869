//! Integration tests for translation, bundling and execution through the
//! public executor surface

use assert_matches::assert_matches;
use plugrun_sandbox::{ExecutionContext, ExecutorConfig, SandboxError};
use plugrun_tests::common::{
    both_executors, context_executor, isolate_executor, setup_test_logging,
};
use serde_json::json;

const TYPED_GREETER: &str = r#"
import { PluginBase } from "@plugin/sdk";

interface Params {
  name: string;
}

export class Greeter extends PluginBase {
  greet(p: Params): string {
    return "hi " + p.name + " (sdk " + this.metadata.sdkVersion + ")";
  }
}
"#;

#[tokio::test]
async fn test_typed_plugin_with_sdk_import() {
    setup_test_logging();
    let executor = isolate_executor(ExecutorConfig::default());

    let result = executor
        .execute(
            ExecutionContext::new(TYPED_GREETER, "Greeter.greet").with_payload(json!({"name": "Ada"})),
        )
        .await
        .unwrap();

    assert_eq!(result.output_text, "hi Ada (sdk 1.0.0)");
    let info = result.compilation_info.unwrap();
    assert!(info.typed_dialect);
    assert!(info.bundled);
    assert!(info.resolved_binding_names.contains("PluginBase"));
    assert_eq!(executor.live_sandboxes(), 0);
}

#[tokio::test]
async fn test_esm_default_export_with_children() {
    setup_test_logging();
    let executor = isolate_executor(ExecutorConfig::default());
    let code = "export default function render(props, children) {\n  return props.title + ':' + children;\n}\n";

    let result = executor
        .execute(
            ExecutionContext::new(code, "default")
                .with_payload(json!({"title": "T", "children": "kids"})),
        )
        .await
        .unwrap();
    assert_eq!(result.output_text, "T:kids");
}

#[tokio::test]
async fn test_bindings_reach_the_sdk() {
    setup_test_logging();
    let config = ExecutorConfig::default().with_binding("apiBase", json!("https://example.test"));
    let executor = isolate_executor(config);
    let code = "import { apiBase } from '@plugin/sdk';\nexport const base = () => apiBase + '/v1';\n";

    let result = executor
        .execute(ExecutionContext::new(code, "base"))
        .await
        .unwrap();
    assert_eq!(result.output_text, "https://example.test/v1");
}

#[tokio::test]
async fn test_foreign_import_is_a_bundling_error() {
    setup_test_logging();
    let executor = isolate_executor(ExecutorConfig::default());
    let code = "import { PluginBase } from '@plugin/sdk';\nimport fs from 'fs';\nexport const x = () => 1;\n";

    let err = executor
        .execute(ExecutionContext::new(code, "x"))
        .await
        .unwrap_err();
    assert_matches!(err, SandboxError::Bundling(ref message) if message.contains("\"fs\""));
    assert_eq!(executor.live_sandboxes(), 0);
}

#[tokio::test]
async fn test_unmatched_entry_point_lists_exports() {
    setup_test_logging();
    let executor = isolate_executor(ExecutorConfig::default());
    let code = "export function alpha() { return 1 }\nexport const beta = () => 2;\n";

    let err = executor
        .execute(ExecutionContext::new(code, "gamma"))
        .await
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("alpha"), "{message}");
    assert!(message.contains("beta"), "{message}");
}

#[tokio::test]
async fn test_callable_default_does_not_shadow_missing_names() {
    setup_test_logging();
    let code = "module.exports = { default: () => 'd', add: (p) => p.a + p.b };";

    for executor in both_executors(ExecutorConfig::default()) {
        let err = executor
            .execute(ExecutionContext::new(code, "mul"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "EXECUTION_ERROR");
        let message = err.to_string();
        assert!(message.contains("Available exports: default, add"), "{message}");

        let result = executor
            .execute(ExecutionContext::new(code, "add").with_payload(json!({"a": 2, "b": 2})))
            .await
            .unwrap();
        assert_eq!(result.output_text, "4");
    }
}

#[tokio::test]
async fn test_non_ascii_plugins_on_both_backends() {
    setup_test_logging();
    let code = "import { VERSION } from '@plugin/sdk';\n// ünïcödé comment\nexport function greet(p) {\n  return 'grüße, ' + p.name + ' ✓ ' + VERSION;\n}\n";

    for executor in both_executors(ExecutorConfig::default()) {
        assert!(executor.validate_code(code).await.unwrap());
        let result = executor
            .execute(ExecutionContext::new(code, "greet").with_payload(json!({"name": "Zoë"})))
            .await
            .unwrap();
        assert_eq!(result.output_text, "grüße, Zoë ✓ 1.0.0");
    }

    let primary = isolate_executor(ExecutorConfig::default());
    assert_matches!(primary.validate_code("const s = 'é").await, Ok(false));
    assert_matches!(primary.validate_code("export const s = \"日本").await, Ok(false));
}

#[tokio::test]
async fn test_invalid_entry_point_rejected() {
    let executor = isolate_executor(ExecutorConfig::default());
    let err = executor
        .execute(ExecutionContext::new("module.exports = {};", "a..b"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "EXECUTION_ERROR");
}

#[tokio::test]
async fn test_timeout_is_reported_within_budget() {
    setup_test_logging();
    let executor = isolate_executor(ExecutorConfig::default().with_limits(64, 250));
    let started = std::time::Instant::now();

    let err = executor
        .execute(ExecutionContext::new(
            "export function spin() { for (;;) {} }",
            "spin",
        ))
        .await
        .unwrap_err();

    assert_matches!(err, SandboxError::Timeout { timeout_ms: 250 });
    assert!(started.elapsed() < std::time::Duration::from_secs(3));
    assert_eq!(executor.live_sandboxes(), 0);
}

#[tokio::test]
async fn test_validate_code() {
    setup_test_logging();
    let executor = isolate_executor(ExecutorConfig::default());

    assert!(executor
        .validate_code("export const ok = (p) => p;")
        .await
        .unwrap());
    assert!(executor.validate_code(TYPED_GREETER).await.unwrap());

    let unterminated = executor.validate_code("const s = 'oops;\n").await;
    assert_matches!(unterminated, Ok(false) | Err(SandboxError::PluginValidation(_)));
}

#[tokio::test]
async fn test_validate_reports_bundling_failures() {
    let executor = isolate_executor(ExecutorConfig::default());
    let err = executor
        .validate_code("import { PluginBase } from '@plugin/sdk';\nimport x from 'left-pad';\n")
        .await
        .unwrap_err();
    assert_eq!(err.code(), "PLUGIN_VALIDATION_ERROR");
}

#[tokio::test]
async fn test_fallback_accepts_library_bound_code_failing_syntax_check() {
    setup_test_logging();
    let executor = context_executor(ExecutorConfig::default());
    let code = "const { PluginBase } = require('@plugin/sdk');\nconst broken = ;\n";
    assert!(executor.validate_code(code).await.unwrap());

    let primary = isolate_executor(ExecutorConfig::default());
    assert!(!primary.validate_code(code).await.unwrap());
}

#[tokio::test]
async fn test_config_from_toml() {
    let config = ExecutorConfig::from_toml_str(
        r#"
        timeout_ms = 2000
        memory_limit_mb = 64
        backend = "fallback"

        [library_bindings]
        greeting = "hello"
        "#,
    )
    .unwrap();
    let executor = context_executor(config);
    let result = executor
        .execute(ExecutionContext::new(
            "const { greeting } = require('@plugin/sdk');\nmodule.exports = () => greeting;",
            "run",
        ))
        .await
        .unwrap();
    assert_eq!(result.output_text, "hello");
    assert_eq!(result.backend, "context");
}

#[test]
fn test_config_rejects_heap_below_floor() {
    let err = ExecutorConfig::from_toml_str("memory_limit_mb = 4\ntimeout_ms = 1000\n").unwrap_err();
    assert_eq!(err.code(), "CONFIGURATION_ERROR");
}
