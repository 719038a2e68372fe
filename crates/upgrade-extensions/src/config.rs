//! Host-side extension configuration.
//!
//! [`ExtensionOptions`] controls discovery. [`ExtensionSourceStore`] persists
//! the extensions a user registered, as indented JSON:
//!
//! ```json
//! {
//!   "extensions": [
//!     { "name": "web", "source": "https://example.com/feed", "version": ">=1.0" }
//!   ]
//! }
//! ```
//!
//! A malformed store file is logged and treated as empty; it never stops the
//! host from starting.

use std::fs;
use std::path::{Path, PathBuf};

use semver::Version;
use serde::{Deserialize, Serialize};
use upgrade_fs::write_atomic;

use crate::error::{Error, Result};

/// File name of the persisted source list inside the config directory.
pub const SOURCES_FILENAME: &str = "extensions.json";

/// Directory name used under the platform config directory.
pub const CONFIG_DIR_NAME: &str = "upgrade-assistant";

/// Settings that drive extension discovery.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ExtensionOptions {
    /// Load anything beyond the required extensions.
    pub enabled: bool,
    /// Drop extensions whose minimum host version is above `current_version`.
    pub check_min_version: bool,
    /// Version of the running host.
    pub current_version: Version,
    /// Extensions that are always loaded.
    pub required_paths: Vec<PathBuf>,
    /// Extensions shipped with the host.
    pub default_paths: Vec<PathBuf>,
    /// Extensions named explicitly by the user.
    pub extension_paths: Vec<PathBuf>,
    /// `key=value` overrides, materialized as an in-memory extension.
    pub additional_options: Vec<String>,
    /// Root under which registered extensions are installed as
    /// `{name}/{version}`.
    pub install_root: Option<PathBuf>,
    /// Location of the persisted source list. `None` uses
    /// [`default_sources_file`].
    pub sources_file: Option<PathBuf>,
}

impl Default for ExtensionOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            check_min_version: true,
            current_version: Version::new(0, 0, 0),
            required_paths: Vec::new(),
            default_paths: Vec::new(),
            extension_paths: Vec::new(),
            additional_options: Vec::new(),
            install_root: None,
            sources_file: None,
        }
    }
}

impl ExtensionOptions {
    /// Options for a host at `current_version`, everything else defaulted.
    pub fn for_host(current_version: Version) -> Self {
        Self {
            current_version,
            ..Self::default()
        }
    }

    /// The source list path in effect.
    pub fn sources_path(&self) -> Option<PathBuf> {
        self.sources_file.clone().or_else(default_sources_file)
    }
}

/// Platform config location of the source list:
///
/// - Linux: `~/.config/upgrade-assistant/extensions.json`
/// - macOS: `~/Library/Application Support/upgrade-assistant/extensions.json`
/// - Windows: `%APPDATA%\upgrade-assistant\extensions.json`
pub fn default_sources_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join(SOURCES_FILENAME))
}

/// A registered extension.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ExtensionSource {
    /// Extension name; unique within the store.
    pub name: String,
    /// Local path or feed URI the extension was registered from.
    pub source: String,
    /// Version constraint on installed versions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct SourcesFile {
    #[serde(default)]
    extensions: Vec<ExtensionSource>,
}

/// Persisted list of registered extensions.
#[derive(Debug, Clone)]
pub struct ExtensionSourceStore {
    path: PathBuf,
    sources: Vec<ExtensionSource>,
}

impl ExtensionSourceStore {
    /// Load the store at `path`. Missing or malformed files give an empty store.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let sources = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<SourcesFile>(&content) {
                Ok(file) => file.extensions,
                Err(e) => {
                    tracing::warn!(?path, error = %e, "Ignoring malformed extension source list");
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                tracing::warn!(?path, error = %e, "Could not read extension source list");
                Vec::new()
            }
        };
        Self { path, sources }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Registered sources, in registration order.
    pub fn list(&self) -> &[ExtensionSource] {
        &self.sources
    }

    pub fn get(&self, name: &str) -> Option<&ExtensionSource> {
        self.sources.iter().find(|s| s.name.eq_ignore_ascii_case(name))
    }

    /// Register a source, replacing an existing entry with the same name.
    pub fn add(&mut self, source: ExtensionSource) {
        match self
            .sources
            .iter_mut()
            .find(|s| s.name.eq_ignore_ascii_case(&source.name))
        {
            Some(existing) => *existing = source,
            None => self.sources.push(source),
        }
    }

    /// Remove a source by name.
    pub fn remove(&mut self, name: &str) -> Result<ExtensionSource> {
        let index = self
            .sources
            .iter()
            .position(|s| s.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::UnknownExtension(name.to_string()))?;
        Ok(self.sources.remove(index))
    }

    /// Write the store back to disk, indented.
    pub fn save(&self) -> Result<()> {
        let file = SourcesFile {
            extensions: self.sources.clone(),
        };
        let content = serde_json::to_string_pretty(&file).map_err(Error::SourcesSerialize)?;
        write_atomic(&self.path, content.as_bytes())?;
        Ok(())
    }
}
