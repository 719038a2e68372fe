//! Extension loaders.
//!
//! A loader looks at a candidate path and either produces an
//! [`ExtensionBuilder`], declines with `Ok(None)`, or fails. The
//! [`LoaderChain`] tries loaders in order; the first one that produces an
//! extension wins and later loaders never see the path. Failures are logged
//! and the next loader is tried.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::MANIFEST_FILENAME;
use crate::error::{Error, Result};
use crate::file_provider::{DirectoryFileProvider, InMemoryFileProvider, ZipFileProvider};
use crate::instance::ExtensionBuilder;
use crate::manifest::ExtensionManifest;

/// Name given to the pseudo-extension built from `key=value` overrides.
pub const OVERRIDES_EXTENSION_NAME: &str = "AdditionalOptions";

/// Turns a path into an extension, if the path has the right shape.
pub trait ExtensionLoader: Send + Sync + fmt::Debug {
    /// Attempt to load. `Ok(None)` means "not applicable".
    fn load(&self, path: &Path) -> Result<Option<ExtensionBuilder>>;
}

/// Loads from a path that points directly at a manifest file. The extension
/// root is the manifest's directory.
#[derive(Debug, Default)]
pub struct ManifestFileLoader;

impl ExtensionLoader for ManifestFileLoader {
    fn load(&self, path: &Path) -> Result<Option<ExtensionBuilder>> {
        let is_manifest = path
            .file_name()
            .is_some_and(|name| name.to_string_lossy().eq_ignore_ascii_case(MANIFEST_FILENAME));
        if !is_manifest || !path.is_file() {
            return Ok(None);
        }
        let Some(root) = path.parent() else {
            return Ok(None);
        };
        let files = Arc::new(DirectoryFileProvider::new(root));
        ExtensionBuilder::from_files(root.display().to_string(), files).map(Some)
    }
}

/// Loads from a directory with a manifest at its root.
#[derive(Debug, Default)]
pub struct DirectoryLoader;

impl ExtensionLoader for DirectoryLoader {
    fn load(&self, path: &Path) -> Result<Option<ExtensionBuilder>> {
        if !path.is_dir() {
            return Ok(None);
        }
        let files = Arc::new(DirectoryFileProvider::new(path));
        ExtensionBuilder::from_files(path.display().to_string(), files).map(Some)
    }
}

/// Loads from a `.zip` archive with a manifest at its root.
#[derive(Debug, Default)]
pub struct ZipLoader;

impl ExtensionLoader for ZipLoader {
    fn load(&self, path: &Path) -> Result<Option<ExtensionBuilder>> {
        let is_zip = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"));
        if !is_zip || !path.is_file() {
            return Ok(None);
        }
        let files = Arc::new(ZipFileProvider::open(path)?);
        ExtensionBuilder::from_files(path.display().to_string(), files).map(Some)
    }
}

/// Builds extensions from JSON manifests held in memory, keyed by path.
///
/// Paths with no registered manifest are declined.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLoader {
    manifests: BTreeMap<PathBuf, Value>,
}

impl InMemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `manifest` under `path`, replacing any earlier entry.
    pub fn with_extension(mut self, path: impl Into<PathBuf>, manifest: Value) -> Self {
        self.manifests.insert(path.into(), manifest);
        self
    }

    /// Build an extension with no files from a JSON manifest.
    pub fn from_value(location: impl Into<String>, manifest: Value) -> Result<ExtensionBuilder> {
        let location = location.into();
        let manifest = ExtensionManifest::from_value(&location, manifest)?;
        Ok(ExtensionBuilder::new(
            location,
            manifest,
            Arc::new(InMemoryFileProvider::new()),
        ))
    }
}

impl ExtensionLoader for InMemoryLoader {
    fn load(&self, path: &Path) -> Result<Option<ExtensionBuilder>> {
        self.manifests
            .get(path)
            .map(|manifest| Self::from_value(path.display().to_string(), manifest.clone()))
            .transpose()
    }
}

/// Ordered list of loaders.
#[derive(Debug)]
pub struct LoaderChain {
    loaders: Vec<Box<dyn ExtensionLoader>>,
}

impl Default for LoaderChain {
    /// Manifest file, then directory, then zip archive, then in-memory.
    fn default() -> Self {
        Self::new(vec![
            Box::new(ManifestFileLoader),
            Box::new(DirectoryLoader),
            Box::new(ZipLoader),
            Box::new(InMemoryLoader::new()),
        ])
    }
}

impl LoaderChain {
    pub fn new(loaders: Vec<Box<dyn ExtensionLoader>>) -> Self {
        Self { loaders }
    }

    /// Run loaders in order until one produces an extension.
    pub fn load(&self, path: &Path) -> Option<ExtensionBuilder> {
        for loader in &self.loaders {
            match loader.load(path) {
                Ok(Some(builder)) => {
                    tracing::debug!(?path, ?loader, "Loaded extension");
                    return Some(builder);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(?path, ?loader, error = %e, "Extension loader failed");
                }
            }
        }
        tracing::debug!(?path, "No loader accepted path");
        None
    }
}

/// Build the in-memory pseudo-extension that carries `key=value` overrides.
///
/// Keys use `:` to address nested sections (`PackageUpdater:Retries=3`).
/// Values that parse as JSON scalars keep their type; everything else is a
/// string.
pub fn overrides_extension(entries: &[String]) -> Result<ExtensionBuilder> {
    let mut root = Map::new();
    for entry in entries {
        let (key, value) = entry
            .split_once('=')
            .ok_or_else(|| Error::InvalidOptionOverride(entry.clone()))?;
        let segments: Vec<&str> = key.split(':').map(str::trim).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(Error::InvalidOptionOverride(entry.clone()));
        }
        insert_path(&mut root, &segments, parse_scalar(value.trim()));
    }

    Ok(InMemoryLoader::from_value(String::new(), Value::Object(root))?.name(OVERRIDES_EXTENSION_NAME))
}

fn parse_scalar(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ (Value::Bool(_) | Value::Number(_) | Value::Null)) => value,
        _ => Value::String(raw.to_string()),
    }
}

fn insert_path(map: &mut Map<String, Value>, segments: &[&str], value: Value) {
    let Some((last, parents)) = segments.split_last() else {
        return;
    };
    let mut current = map;
    for segment in parents {
        let slot = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        let Value::Object(next) = slot else {
            return;
        };
        current = next;
    }
    current.insert(last.to_string(), value);
}
