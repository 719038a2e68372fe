//! Extension system for Upgrade Assistant.
//!
//! This crate discovers extensions on disk, in archives, and from in-memory
//! overrides, isolates the modules each one ships, and merges the option
//! sections they contribute.

pub mod config;
pub mod error;
pub mod file_provider;
pub mod instance;
pub mod isolation;
pub mod loader;
pub mod logging;
pub mod manifest;
pub mod options;
pub mod registry;
pub mod services;
pub mod version;

/// The canonical filename for extension manifest files.
///
/// Extensions place a file with this name at their root so loaders can
/// recognize them.
pub const MANIFEST_FILENAME: &str = "ExtensionManifest.json";

/// Name used when neither the manifest nor the location yields one.
pub const DEFAULT_EXTENSION_NAME: &str = "Default";

pub use config::{ExtensionOptions, ExtensionSource, ExtensionSourceStore};
pub use error::{Error, Result};
pub use file_provider::{DirectoryFileProvider, FileProvider, InMemoryFileProvider, ZipFileProvider};
pub use instance::{ExtensionBuilder, ExtensionInstance};
pub use isolation::{IsolationContext, LoadedModule, ModuleHost, ModuleId, SharedModuleRegistry};
pub use loader::{ExtensionLoader, InMemoryLoader, LoaderChain};
pub use manifest::ExtensionManifest;
pub use options::{FileScoped, OptionsAggregator};
pub use registry::{ExtensionDiscovery, ExtensionRegistry};
pub use services::{
    ExtensionServiceCollection, OptionBinding, ProviderTable, ServiceProvider,
};
