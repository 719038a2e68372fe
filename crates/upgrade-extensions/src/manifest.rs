//! Extension manifest parsing for `ExtensionManifest.json` files.
//!
//! A manifest is a JSON object. A handful of well-known keys describe the
//! extension itself; every other top-level key is a named configuration
//! section that consumers bind with [`ExtensionManifest::get_options`].
//!
//! # Example
//!
//! ```json
//! {
//!   "ExtensionName": "Web",
//!   "Version": "1.2.0",
//!   "MinUpgradeAssistantVersion": "0.3",
//!   "ExtensionServiceProviders": ["Web.Services"],
//!   "PackageUpdater": { "PackageMapPath": "PackageMaps" }
//! }
//! ```
//!
//! Section lookup is case-insensitive, matching how the host binds
//! configuration.

use semver::Version;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::MANIFEST_FILENAME;
use crate::error::{Error, Result};
use crate::file_provider::FileProvider;
use crate::version::parse_version;

/// Key holding the explicit extension name.
pub const EXTENSION_NAME_KEY: &str = "ExtensionName";
/// Key holding the extension's own version.
pub const VERSION_KEY: &str = "Version";
/// Key holding the minimum host version the extension requires.
pub const MIN_HOST_VERSION_KEY: &str = "MinUpgradeAssistantVersion";
/// Key listing modules that export service-provider entrypoints.
pub const SERVICE_PROVIDERS_KEY: &str = "ExtensionServiceProviders";

/// Parsed contents of an extension manifest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtensionManifest {
    values: Map<String, Value>,
}

impl ExtensionManifest {
    /// A manifest with no keys.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a manifest from raw bytes. `location` is only used for errors.
    pub fn parse(location: &str, bytes: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(bytes).map_err(|source| Error::ManifestParse {
            location: location.to_string(),
            source,
        })?;
        Self::from_value(location, value)
    }

    /// Build a manifest from an already-parsed JSON value.
    pub fn from_value(location: &str, value: Value) -> Result<Self> {
        match value {
            Value::Object(values) => Ok(Self { values }),
            _ => Err(Error::ManifestNotObject {
                location: location.to_string(),
            }),
        }
    }

    /// Read [`MANIFEST_FILENAME`] from the root of a file provider.
    pub fn from_provider(files: &dyn FileProvider, location: &str) -> Result<Self> {
        let bytes = files
            .read(MANIFEST_FILENAME)?
            .ok_or_else(|| Error::ManifestNotFound(location.to_string()))?;
        Self::parse(location, &bytes)
    }

    /// Explicit extension name, if declared and non-empty.
    pub fn name(&self) -> Option<&str> {
        self.section(EXTENSION_NAME_KEY)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    /// Declared extension version.
    pub fn version(&self) -> Result<Option<Version>> {
        self.version_at(VERSION_KEY)
    }

    /// Minimum host version this extension requires.
    pub fn min_host_version(&self) -> Result<Option<Version>> {
        self.version_at(MIN_HOST_VERSION_KEY)
    }

    fn version_at(&self, key: &str) -> Result<Option<Version>> {
        match self.section(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(Value::String(s)) => parse_version(s).map(Some),
            Some(other) => Err(Error::InvalidVersion {
                version: other.to_string(),
                reason: format!("'{key}' must be a string"),
            }),
        }
    }

    /// Module names declared under `ExtensionServiceProviders`.
    pub fn service_providers(&self) -> Vec<String> {
        match self.section(SERVICE_PROVIDERS_KEY) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            Some(Value::String(single)) if !single.trim().is_empty() => {
                vec![single.trim().to_string()]
            }
            _ => Vec::new(),
        }
    }

    /// Raw value of a top-level section.
    pub fn section(&self, name: &str) -> Option<&Value> {
        self.values.get(name).or_else(|| {
            self.values
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value)
        })
    }

    /// Bind a section to `T`. Returns `Ok(None)` when the section is absent.
    pub fn get_options<T: DeserializeOwned>(
        &self,
        section: &str,
    ) -> std::result::Result<Option<T>, serde_json::Error> {
        match self.section(section) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => T::deserialize(value).map(Some),
        }
    }

    /// The manifest as a JSON object.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }
}
