//! plugrun store - where plugin bundles and manifests come from
//!
//! [`ContentStore`] is the boundary to whatever holds plugin files.
//! [`PluginLoader`] turns a slug into bundle source plus manifest using the
//! key layout of [`PluginLocator`].

mod error;
mod fs;
mod loader;
mod locator;
mod manifest;
mod memory;
mod store;

pub use error::{Result, StoreError};
pub use fs::FsStore;
pub use loader::{LoadedPlugin, PluginLoader};
pub use locator::{PluginLocator, BUNDLE_FILE, MANIFEST_FILE};
pub use manifest::{EntryPointSpec, PluginManifest};
pub use memory::MemoryStore;
pub use store::{content_type_for, ContentStore, FileMetadata, StoredFile};
