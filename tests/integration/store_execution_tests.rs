//! Integration tests for loading plugins from a content store and running them

use plugrun_sandbox::ExecutorConfig;
use plugrun_store::{ContentStore, FsStore, MemoryStore, PluginLoader, PluginLocator, StoreError};
use plugrun_tests::common::{isolate_executor, loader, run_stored, seed_plugin, setup_test_logging, BUCKET};
use serde_json::json;
use std::sync::Arc;

const CALCULATOR: &str = r#"
export function add(p) { return p.a + p.b; }
export const ops = { mul: (p) => p.a * p.b };
"#;

#[tokio::test]
async fn test_load_and_run_from_memory_store() -> anyhow::Result<()> {
    setup_test_logging();
    let store = Arc::new(MemoryStore::new());
    seed_plugin(
        &store,
        "calculator",
        CALCULATOR,
        json!({"name": "calculator", "version": "1.0.0", "entryPoints": {"add": {}, "ops.mul": {}}}),
    )
    .await;
    let loader = loader(store);
    let executor = isolate_executor(ExecutorConfig::default());

    let plugin = loader.load("calculator").await?;
    for entry in plugin.manifest.entry_point_names() {
        let result = run_stored(&loader, &executor, "calculator", entry, json!({"a": 6, "b": 7})).await?;
        let expected = if entry == "add" { "13" } else { "42" };
        assert_eq!(result.output_text, expected, "{entry}");
    }
    assert_eq!(executor.live_sandboxes(), 0);
    Ok(())
}

#[tokio::test]
async fn test_missing_manifest_means_not_found() {
    setup_test_logging();
    let store = Arc::new(MemoryStore::new());
    store
        .put(BUCKET, "orphan/bundle.js", "module.exports = {};")
        .await;
    let loader = loader(store);
    let executor = isolate_executor(ExecutorConfig::default());

    let err = run_stored(&loader, &executor, "orphan", "run", json!(null))
        .await
        .unwrap_err();
    let store_err = err.downcast_ref::<StoreError>().unwrap();
    assert_eq!(store_err.code(), "PLUGIN_NOT_FOUND");
    assert!(loader.list_plugins().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_load_and_run_from_filesystem() -> anyhow::Result<()> {
    setup_test_logging();
    let dir = tempfile::tempdir()?;
    let plugin_dir = dir.path().join(BUCKET).join("published").join("greeter");
    std::fs::create_dir_all(&plugin_dir)?;
    std::fs::write(
        plugin_dir.join("bundle.js"),
        "import { PluginBase } from '@plugin/sdk';\nexport class Greeter extends PluginBase {\n  greet(p) { return 'hi ' + p.name; }\n}\n",
    )?;
    std::fs::write(
        plugin_dir.join("manifest.json"),
        r#"{"name":"greeter","version":"0.1.0","entryPoints":{"Greeter.greet":{}}}"#,
    )?;

    let store = FsStore::new(dir.path());
    assert!(store.file_exists(BUCKET, "published/greeter/bundle.js").await?);

    let loader = PluginLoader::new(
        Arc::new(store),
        PluginLocator::new(BUCKET).with_base_path("published"),
    );
    assert_eq!(loader.list_plugins().await?, vec!["greeter"]);

    let executor = isolate_executor(ExecutorConfig::default());
    let result = run_stored(&loader, &executor, "greeter", "Greeter.greet", json!({"name": "Ada"})).await?;
    assert_eq!(result.output_text, "hi Ada");
    Ok(())
}

#[tokio::test]
async fn test_malformed_manifest_surfaces_parse_error() {
    let store = Arc::new(MemoryStore::new());
    store.put(BUCKET, "bad/bundle.js", "module.exports = {};").await;
    store.put(BUCKET, "bad/manifest.json", "{ nope").await;
    let err = loader(store).load("bad").await.unwrap_err();
    assert_eq!(err.code(), "INVALID_MANIFEST");
}
