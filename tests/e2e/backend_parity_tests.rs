//! End-to-end checks that both sandbox backends agree on plugin semantics
//! and differ only in how they treat memory and timeouts

use assert_matches::assert_matches;
use plugrun_sandbox::{BackendKind, ExecutionContext, ExecutorConfig, SandboxError};
use plugrun_tests::common::{both_executors, context_executor, isolate_executor, setup_test_logging};
use serde_json::json;

const RUNAWAY: &str = r#"
export function grow() {
  const keep = [];
  for (let i = 0; i < 96; i++) keep.push(new Array(131072).fill(i));
  return keep.length;
}
"#;

#[tokio::test]
async fn test_backends_agree_on_resolution() {
    setup_test_logging();
    let cases = [
        ("module.exports = { add: (p) => p.a + p.b };", "add", json!({"a": 2, "b": 3}), "5"),
        (
            "class Greeter { greet(p) { return 'hi ' + p.name } }\nmodule.exports = { Greeter };",
            "Greeter.greet",
            json!({"name": "Ada"}),
            "hi Ada",
        ),
        ("const ns = { sub: {} };\nns.sub.fn = (p) => p.x * 2;", "ns.sub.fn", json!({"x": 21}), "42"),
        ("export default { run: () => 'from default' };", "run", json!(null), "from default"),
        ("module.exports = { later: async (p) => p.v * 10 };", "later", json!({"v": 4}), "40"),
    ];

    for executor in both_executors(ExecutorConfig::default()) {
        for (code, entry, payload, expected) in &cases {
            let result = executor
                .execute(ExecutionContext::new(*code, *entry).with_payload(payload.clone()))
                .await
                .unwrap();
            assert_eq!(result.output_text, *expected, "{} {}", executor.backend_name(), entry);
        }
        assert_eq!(executor.live_sandboxes(), 0);
    }
}

#[tokio::test]
async fn test_thrown_errors_fold_into_output() {
    setup_test_logging();
    for executor in both_executors(ExecutorConfig::default()) {
        let result = executor
            .execute(ExecutionContext::new(
                "export function fail() { console.log('about to fail'); throw new Error('nope'); }",
                "fail",
            ))
            .await
            .unwrap();
        assert!(result.output_text.starts_with("Error: nope\n"));
        assert!(result.is_error_output());
        assert_eq!(result.logs, vec!["about to fail".to_string()]);
        assert_eq!(result.errors.len(), 1);
    }
}

#[tokio::test]
async fn test_runaway_allocation_per_backend() {
    setup_test_logging();
    let config = ExecutorConfig::default().with_limits(32, 10_000);

    let primary = isolate_executor(config.clone());
    let err = primary
        .execute(ExecutionContext::new(RUNAWAY, "grow"))
        .await
        .unwrap_err();
    assert_matches!(err, SandboxError::MemoryLimit { limit_mb: 32, .. });

    let fallback = context_executor(config);
    assert_eq!(fallback.backend_kind(), BackendKind::Context);
    match fallback.execute(ExecutionContext::new(RUNAWAY, "grow")).await {
        Ok(result) => assert_eq!(result.output_text, "96"),
        Err(err) => assert!(!matches!(err, SandboxError::MemoryLimit { .. }), "{err}"),
    }
}

#[tokio::test]
async fn test_timeouts_on_both_backends() {
    setup_test_logging();
    for executor in both_executors(ExecutorConfig::default().with_limits(64, 150)) {
        let err = executor
            .execute(ExecutionContext::new("module.exports = () => { while (true) {} };", "spin"))
            .await
            .unwrap_err();
        assert_matches!(err, SandboxError::Timeout { timeout_ms: 150 });
        executor.cleanup().await;
        assert_eq!(executor.live_sandboxes(), 0);
    }
}

#[tokio::test]
async fn test_repeated_runs_are_deterministic() {
    let executor = isolate_executor(ExecutorConfig::default());
    let code = "export const pick = (p) => JSON.stringify(Object.keys(p).sort().map((k) => p[k]));";
    let mut outputs = Vec::new();
    for _ in 0..3 {
        let result = executor
            .execute(ExecutionContext::new(code, "pick").with_payload(json!({"b": 2, "a": 1})))
            .await
            .unwrap();
        outputs.push(result.output_text);
    }
    assert!(outputs.iter().all(|o| o == "[1,2]"));
}
