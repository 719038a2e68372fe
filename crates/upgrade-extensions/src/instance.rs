//! A loaded extension.

use std::fmt;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use semver::Version;
use serde::de::DeserializeOwned;

use crate::DEFAULT_EXTENSION_NAME;
use crate::error::{Error, Result};
use crate::file_provider::FileProvider;
use crate::isolation::{IsolationContext, ModuleHost};
use crate::manifest::ExtensionManifest;

/// Collects everything needed for an [`ExtensionInstance`] before it is
/// finalized. Loaders hand builders to discovery, which may still override
/// the version (e.g. default extensions report the host version).
#[derive(Debug)]
pub struct ExtensionBuilder {
    name: Option<String>,
    version: Option<Version>,
    version_overridden: bool,
    location: String,
    manifest: ExtensionManifest,
    files: Arc<dyn FileProvider>,
}

impl ExtensionBuilder {
    pub fn new(
        location: impl Into<String>,
        manifest: ExtensionManifest,
        files: Arc<dyn FileProvider>,
    ) -> Self {
        Self {
            name: None,
            version: None,
            version_overridden: false,
            location: location.into(),
            manifest,
            files,
        }
    }

    /// Read the manifest out of `files` and start a builder for it.
    pub fn from_files(location: impl Into<String>, files: Arc<dyn FileProvider>) -> Result<Self> {
        let location = location.into();
        let manifest = ExtensionManifest::from_provider(files.as_ref(), &location)?;
        Ok(Self::new(location, manifest, files))
    }

    /// Override the name derived from the manifest or location.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Override the version declared in the manifest.
    pub fn version(mut self, version: Option<Version>) -> Self {
        self.version = version;
        self.version_overridden = true;
        self
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn manifest(&self) -> &ExtensionManifest {
        &self.manifest
    }

    /// Name the extension will get: explicit override, manifest
    /// `ExtensionName`, location stem, then [`DEFAULT_EXTENSION_NAME`].
    pub fn resolved_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        if let Some(name) = self.manifest.name() {
            return name.to_string();
        }
        Path::new(self.location.trim_end_matches(['/', '\\']))
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .filter(|stem| !stem.is_empty())
            .unwrap_or_else(|| DEFAULT_EXTENSION_NAME.to_string())
    }

    /// Validate the manifest's version fields and finalize.
    pub fn build(self) -> Result<ExtensionInstance> {
        let name = self.resolved_name();
        let version = if self.version_overridden {
            self.version
        } else {
            self.manifest.version()?
        };
        let min_host_version = self.manifest.min_host_version()?;
        let service_providers = self.manifest.service_providers();

        Ok(ExtensionInstance {
            name,
            version,
            location: self.location,
            min_host_version,
            service_providers,
            manifest: self.manifest,
            files: self.files,
            isolation: OnceLock::new(),
        })
    }
}

/// An extension discovered at startup. Immutable once built.
pub struct ExtensionInstance {
    name: String,
    version: Option<Version>,
    location: String,
    min_host_version: Option<Version>,
    service_providers: Vec<String>,
    manifest: ExtensionManifest,
    files: Arc<dyn FileProvider>,
    isolation: OnceLock<Option<IsolationContext>>,
}

impl ExtensionInstance {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `None` means unversioned, which is always compatible.
    pub fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn min_host_version(&self) -> Option<&Version> {
        self.min_host_version.as_ref()
    }

    pub fn service_providers(&self) -> &[String] {
        &self.service_providers
    }

    pub fn manifest(&self) -> &ExtensionManifest {
        &self.manifest
    }

    pub fn files(&self) -> &Arc<dyn FileProvider> {
        &self.files
    }

    /// Bind a manifest section. `Ok(None)` if the section is absent.
    pub fn get_options<T: DeserializeOwned>(&self, section: &str) -> Result<Option<T>> {
        self.manifest
            .get_options(section)
            .map_err(|source| Error::OptionsBind {
                extension: self.name.clone(),
                section: section.to_string(),
                source,
            })
    }

    /// The extension's isolation context, created on first access.
    ///
    /// Extensions that declare no service-provider modules never get one.
    pub fn isolation_context(&self, host: &ModuleHost) -> Option<&IsolationContext> {
        self.isolation
            .get_or_init(|| {
                if self.service_providers.is_empty() {
                    return None;
                }
                tracing::debug!(extension = %self.name, "Creating isolation context");
                Some(IsolationContext::activate(
                    &self.name,
                    &self.service_providers,
                    host,
                    Arc::clone(&self.files),
                ))
            })
            .as_ref()
    }

    /// The isolation context if it has already been created.
    pub fn existing_isolation_context(&self) -> Option<&IsolationContext> {
        self.isolation.get().and_then(Option::as_ref)
    }
}

impl fmt::Debug for ExtensionInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionInstance")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("location", &self.location)
            .field("min_host_version", &self.min_host_version)
            .finish_non_exhaustive()
    }
}

impl Drop for ExtensionInstance {
    fn drop(&mut self) {
        tracing::trace!(extension = %self.name, "Releasing extension");
    }
}
