//! Plugin loading

use crate::error::{Result, StoreError};
use crate::locator::PluginLocator;
use crate::manifest::PluginManifest;
use crate::store::ContentStore;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Bundle source and manifest of one plugin
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedPlugin {
    pub slug: String,
    pub code: String,
    pub manifest: PluginManifest,
    pub etag: Option<String>,
}

/// Reads plugins out of a [`ContentStore`]
pub struct PluginLoader {
    store: Arc<dyn ContentStore>,
    locator: PluginLocator,
}

impl PluginLoader {
    pub fn new(store: Arc<dyn ContentStore>, locator: PluginLocator) -> Self {
        Self { store, locator }
    }

    pub fn locator(&self) -> &PluginLocator {
        &self.locator
    }

    /// A plugin exists only when both its bundle and manifest exist
    pub async fn exists(&self, slug: &str) -> Result<bool> {
        check_slug(slug)?;
        let bucket = self.locator.bucket();
        Ok(self
            .store
            .file_exists(bucket, &self.locator.bundle_key(slug))
            .await?
            && self
                .store
                .file_exists(bucket, &self.locator.manifest_key(slug))
                .await?)
    }

    pub async fn load(&self, slug: &str) -> Result<LoadedPlugin> {
        if !self.exists(slug).await? {
            tracing::info!(slug, store = self.store.name(), "Plugin not found");
            return Err(StoreError::PluginNotFound {
                slug: slug.to_string(),
            });
        }

        let bucket = self.locator.bucket();
        let bundle = self
            .store
            .get_file(bucket, &self.locator.bundle_key(slug))
            .await?;
        let manifest_file = self
            .store
            .get_file(bucket, &self.locator.manifest_key(slug))
            .await?;
        let manifest = PluginManifest::parse(slug, manifest_file.text()?)?;

        tracing::debug!(
            slug,
            store = self.store.name(),
            bundle_size = bundle.size,
            entry_points = manifest.entry_points.len(),
            "Plugin loaded"
        );

        Ok(LoadedPlugin {
            slug: slug.to_string(),
            code: bundle.text()?.to_string(),
            manifest,
            etag: bundle.etag,
        })
    }

    /// Slugs that have both a bundle and a manifest, sorted
    pub async fn list_plugins(&self) -> Result<Vec<String>> {
        let keys = self
            .store
            .list_files(self.locator.bucket(), &self.locator.prefix(), None)
            .await?;

        let manifests: BTreeSet<&str> = keys
            .iter()
            .filter_map(|key| self.locator.slug_of_manifest(key))
            .collect();
        let slugs: BTreeSet<&str> = keys
            .iter()
            .filter_map(|key| self.locator.slug_of_bundle(key))
            .filter(|slug| manifests.contains(slug))
            .collect();

        Ok(slugs.into_iter().map(str::to_string).collect())
    }
}

fn check_slug(slug: &str) -> Result<()> {
    if slug.is_empty() || slug.contains('/') || slug == "." || slug == ".." {
        return Err(StoreError::Storage(format!("Invalid plugin slug `{}`", slug)));
    }
    Ok(())
}
