//! Plugin manifest

use crate::error::{Result, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Describes a plugin and the entry points it offers.
///
/// Only well-formed JSON is required; every field defaults when absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginManifest {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub entry_points: BTreeMap<String, EntryPointSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryPointSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Free-form parameter schema
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

impl PluginManifest {
    /// Parse the manifest of plugin `slug`
    pub fn parse(slug: &str, text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|source| StoreError::InvalidManifest {
            slug: slug.to_string(),
            source,
        })
    }

    pub fn entry_point_names(&self) -> impl Iterator<Item = &str> {
        self.entry_points.keys().map(String::as_str)
    }

    pub fn declares(&self, entry_point: &str) -> bool {
        self.entry_points.contains_key(entry_point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_parse_full_manifest() {
        let manifest = PluginManifest::parse(
            "greeter",
            r#"{
                "name": "greeter",
                "version": "1.2.0",
                "description": "Says hello",
                "entryPoints": {
                    "Greeter.greet": {
                        "description": "Greet someone",
                        "parameters": { "name": { "type": "string" } }
                    },
                    "default": {}
                }
            }"#,
        )
        .unwrap();

        assert_eq!(manifest.name, "greeter");
        assert_eq!(manifest.version, "1.2.0");
        assert!(manifest.declares("Greeter.greet"));
        assert_eq!(
            manifest.entry_point_names().collect::<Vec<_>>(),
            vec!["Greeter.greet", "default"]
        );
        let greet = &manifest.entry_points["Greeter.greet"];
        assert_eq!(greet.parameters.as_ref().unwrap()["name"]["type"], "string");
    }

    #[test]
    fn test_missing_fields_default() {
        let manifest = PluginManifest::parse("bare", "{}").unwrap();
        assert_eq!(manifest, PluginManifest::default());
    }

    #[test]
    fn test_malformed_json_is_wrapped() {
        let err = PluginManifest::parse("broken", "{ name: ").unwrap_err();
        assert_matches!(err, StoreError::InvalidManifest { ref slug, .. } if slug == "broken");
        assert!(err.to_string().starts_with("Invalid manifest for plugin broken:"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
