//! Key layout for plugin files

/// Executable bundle file name
pub const BUNDLE_FILE: &str = "bundle.js";

/// Manifest file name
pub const MANIFEST_FILE: &str = "manifest.json";

/// Maps plugin slugs to store keys: `{base_path/}{slug}/bundle.js` and
/// `{base_path/}{slug}/manifest.json`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginLocator {
    bucket: String,
    base_path: Option<String>,
}

impl PluginLocator {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            base_path: None,
        }
    }

    /// Nest plugins under `base_path`. Surrounding slashes are ignored.
    pub fn with_base_path(mut self, base_path: &str) -> Self {
        let trimmed = base_path.trim_matches('/');
        self.base_path = (!trimmed.is_empty()).then(|| trimmed.to_string());
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Key prefix every plugin key starts with (empty or ending in `/`)
    pub fn prefix(&self) -> String {
        match &self.base_path {
            Some(base) => format!("{}/", base),
            None => String::new(),
        }
    }

    pub fn bundle_key(&self, slug: &str) -> String {
        format!("{}{}/{}", self.prefix(), slug, BUNDLE_FILE)
    }

    pub fn manifest_key(&self, slug: &str) -> String {
        format!("{}{}/{}", self.prefix(), slug, MANIFEST_FILE)
    }

    /// Slug of a bundle key, if `key` is one
    pub fn slug_of_bundle<'k>(&self, key: &'k str) -> Option<&'k str> {
        self.slug_of(key, BUNDLE_FILE)
    }

    /// Slug of a manifest key, if `key` is one
    pub fn slug_of_manifest<'k>(&self, key: &'k str) -> Option<&'k str> {
        self.slug_of(key, MANIFEST_FILE)
    }

    fn slug_of<'k>(&self, key: &'k str, file: &str) -> Option<&'k str> {
        let rest = key.strip_prefix(self.prefix().as_str())?;
        let slug = rest.strip_suffix(file)?.strip_suffix('/')?;
        (!slug.is_empty() && !slug.contains('/')).then_some(slug)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_without_base_path() {
        let locator = PluginLocator::new("plugins");
        assert_eq!(locator.bundle_key("hello"), "hello/bundle.js");
        assert_eq!(locator.manifest_key("hello"), "hello/manifest.json");
        assert_eq!(locator.prefix(), "");
    }

    #[test]
    fn test_keys_with_base_path() {
        let locator = PluginLocator::new("plugins").with_base_path("/v1/published/");
        assert_eq!(locator.bundle_key("hello"), "v1/published/hello/bundle.js");
        assert_eq!(locator.manifest_key("hello"), "v1/published/hello/manifest.json");

        let empty = PluginLocator::new("plugins").with_base_path("/");
        assert_eq!(empty.prefix(), "");
    }

    #[test]
    fn test_slug_extraction() {
        let locator = PluginLocator::new("plugins").with_base_path("v1");
        assert_eq!(locator.slug_of_bundle("v1/hello/bundle.js"), Some("hello"));
        assert_eq!(locator.slug_of_manifest("v1/hello/manifest.json"), Some("hello"));
        assert_eq!(locator.slug_of_bundle("v1/a/b/bundle.js"), None);
        assert_eq!(locator.slug_of_bundle("v2/hello/bundle.js"), None);
        assert_eq!(locator.slug_of_bundle("v1/hello/manifest.json"), None);
        assert_eq!(locator.slug_of_bundle("v1/bundle.js"), None);
    }
}
