//! Common test utilities shared across integration and E2E tests

use anyhow::Context;
use plugrun_sandbox::{
    ContextBackend, ExecutionContext, ExecutionResult, ExecutorConfig, IsolateBackend,
    PluginExecutor,
};
use plugrun_store::{MemoryStore, PluginLoader, PluginLocator};
use serde_json::Value;
use std::sync::Arc;

/// Bucket the fixtures are stored in
pub const BUCKET: &str = "plugins";

/// Setup logging for tests
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("plugrun_sandbox=debug,plugrun_store=debug")
        .with_test_writer()
        .try_init();
}

/// Executor on the primary isolate backend
pub fn isolate_executor(config: ExecutorConfig) -> PluginExecutor {
    PluginExecutor::with_backend(config, Arc::new(IsolateBackend::new()))
        .expect("valid test config")
}

/// Executor on the fallback context backend
pub fn context_executor(config: ExecutorConfig) -> PluginExecutor {
    PluginExecutor::with_backend(config, Arc::new(ContextBackend::new()))
        .expect("valid test config")
}

/// Both executors, primary first
pub fn both_executors(config: ExecutorConfig) -> [PluginExecutor; 2] {
    [isolate_executor(config.clone()), context_executor(config)]
}

/// Store a plugin bundle and manifest under `slug`
pub async fn seed_plugin(store: &MemoryStore, slug: &str, code: &str, manifest: Value) {
    let locator = PluginLocator::new(BUCKET);
    store
        .put(BUCKET, &locator.bundle_key(slug), code.to_string())
        .await;
    store
        .put(BUCKET, &locator.manifest_key(slug), manifest.to_string())
        .await;
}

/// Loader over `store` with the default layout
pub fn loader(store: Arc<MemoryStore>) -> PluginLoader {
    PluginLoader::new(store, PluginLocator::new(BUCKET))
}

/// Load `slug` and run one of its entry points
pub async fn run_stored(
    loader: &PluginLoader,
    executor: &PluginExecutor,
    slug: &str,
    entry_point: &str,
    payload: Value,
) -> anyhow::Result<ExecutionResult> {
    let plugin = loader
        .load(slug)
        .await
        .with_context(|| format!("loading plugin {slug}"))?;
    let result = executor
        .execute(ExecutionContext::new(plugin.code, entry_point).with_payload(payload))
        .await
        .with_context(|| format!("running {slug}:{entry_point}"))?;
    Ok(result)
}
