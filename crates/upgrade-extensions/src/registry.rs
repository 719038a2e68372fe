//! Extension discovery and the resulting registry.
//!
//! [`ExtensionDiscovery`] runs once at startup and produces an immutable
//! [`ExtensionRegistry`]. Extensions are gathered in this order:
//!
//! 1. required paths (loaded even when extensions are disabled)
//! 2. default paths
//! 3. user-specified paths
//! 4. registered sources, resolved to install paths
//! 5. `key=value` overrides, as one in-memory extension
//! 6. pre-constructed instances
//!
//! Required and default extensions report the host's version. A failure to
//! load one extension is logged and discovery moves on.

use std::any::{Any, TypeId};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use semver::Version;

use crate::config::{ExtensionOptions, ExtensionSource, ExtensionSourceStore};
use crate::instance::{ExtensionBuilder, ExtensionInstance};
use crate::isolation::{ModuleHost, ModuleId};
use crate::loader::{LoaderChain, overrides_extension};
use crate::options::OptionsAggregator;
use crate::services::OptionRegistration;
use crate::version::{VersionConstraint, meets_minimum, parse_version};

/// Builds an [`ExtensionRegistry`].
#[derive(Debug)]
pub struct ExtensionDiscovery {
    options: ExtensionOptions,
    loaders: LoaderChain,
    host: ModuleHost,
    instances: Vec<ExtensionInstance>,
}

impl ExtensionDiscovery {
    pub fn new(options: ExtensionOptions) -> Self {
        Self {
            options,
            loaders: LoaderChain::default(),
            host: ModuleHost::default(),
            instances: Vec::new(),
        }
    }

    /// Replace the default loader chain.
    pub fn loaders(mut self, loaders: LoaderChain) -> Self {
        self.loaders = loaders;
        self
    }

    /// Shared modules and service-provider entrypoints of the host.
    pub fn host(mut self, host: ModuleHost) -> Self {
        self.host = host;
        self
    }

    /// Add an extension constructed in code.
    pub fn with_extension(mut self, instance: ExtensionInstance) -> Self {
        self.instances.push(instance);
        self
    }

    /// Load everything and activate each extension's isolation context.
    pub fn discover(self) -> ExtensionRegistry {
        let Self {
            options,
            loaders,
            host,
            instances,
        } = self;
        let current = options.current_version.clone();

        let mut required = Vec::new();
        for path in &options.required_paths {
            required.extend(load_path(&loaders, path, Some(&current)));
        }

        let mut optional = Vec::new();
        if options.enabled {
            for path in &options.default_paths {
                optional.extend(load_path(&loaders, path, Some(&current)));
            }
            for path in &options.extension_paths {
                optional.extend(load_path(&loaders, path, None));
            }
            for path in registered_paths(&options) {
                optional.extend(load_path(&loaders, &path, None));
            }
            if !options.additional_options.is_empty() {
                match overrides_extension(&options.additional_options).and_then(ExtensionBuilder::build) {
                    Ok(instance) => optional.push(instance),
                    Err(e) => tracing::warn!(error = %e, "Ignoring additional options"),
                }
            }
        } else {
            tracing::debug!("Extensions disabled, loading required extensions only");
        }
        optional.extend(instances);

        let mut extensions: Vec<Arc<ExtensionInstance>> = required.into_iter().map(Arc::new).collect();
        for instance in optional {
            if options.check_min_version && !is_supported(&instance, &current) {
                continue;
            }
            extensions.push(Arc::new(instance));
        }

        for extension in &extensions {
            extension.isolation_context(&host);
        }

        tracing::info!(count = extensions.len(), "Extensions loaded");
        ExtensionRegistry { extensions, host }
    }
}

fn load_path(loaders: &LoaderChain, path: &Path, forced_version: Option<&Version>) -> Option<ExtensionInstance> {
    let mut builder = loaders.load(path)?;
    if let Some(version) = forced_version {
        builder = builder.version(Some(version.clone()));
    }
    match builder.build() {
        Ok(instance) => Some(instance),
        Err(e) => {
            tracing::warn!(?path, error = %e, "Failed to load extension");
            None
        }
    }
}

fn is_supported(instance: &ExtensionInstance, current: &Version) -> bool {
    match instance.min_host_version() {
        Some(minimum) if !meets_minimum(minimum, current) => {
            tracing::warn!(
                extension = instance.name(),
                %minimum,
                %current,
                "Extension requires a newer host and will not be loaded"
            );
            false
        }
        _ => true,
    }
}

fn registered_paths(options: &ExtensionOptions) -> Vec<PathBuf> {
    let Some(sources_path) = options.sources_path() else {
        return Vec::new();
    };
    let store = ExtensionSourceStore::load(sources_path);
    store
        .list()
        .iter()
        .filter_map(|source| {
            let resolved = resolve_install_path(source, options.install_root.as_deref());
            if resolved.is_none() {
                tracing::warn!(extension = %source.name, source = %source.source, "Registered extension is not installed");
            }
            resolved
        })
        .collect()
}

/// Where a registered extension lives on disk.
///
/// A source that is an existing local path is used as-is. Otherwise the
/// highest version under `{install_root}/{name}` that satisfies the
/// registration's constraint is picked.
pub fn resolve_install_path(source: &ExtensionSource, install_root: Option<&Path>) -> Option<PathBuf> {
    let local = Path::new(&source.source);
    if local.exists() {
        return Some(local.to_path_buf());
    }

    let constraint = match source.version.as_deref().map(VersionConstraint::parse).transpose() {
        Ok(constraint) => constraint,
        Err(e) => {
            tracing::warn!(extension = %source.name, error = %e, "Invalid version constraint");
            return None;
        }
    };

    let root = install_root?.join(&source.name);
    let entries = std::fs::read_dir(&root).ok()?;
    entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| {
            let version = parse_version(&entry.file_name().to_string_lossy()).ok()?;
            Some((version, entry.path()))
        })
        .filter(|(version, _)| constraint.as_ref().is_none_or(|c| c.satisfies_version(version)))
        .max_by(|(a, _), (b, _)| a.cmp_precedence(b))
        .map(|(_, path)| path)
}

/// Every extension known to the host. Immutable after discovery.
#[derive(Debug)]
pub struct ExtensionRegistry {
    extensions: Vec<Arc<ExtensionInstance>>,
    host: ModuleHost,
}

impl ExtensionRegistry {
    /// Extensions in load order.
    pub fn extensions(&self) -> &[Arc<ExtensionInstance>] {
        &self.extensions
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ExtensionInstance>> {
        self.extensions.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ExtensionInstance>> {
        self.extensions.iter().find(|e| e.name().eq_ignore_ascii_case(name))
    }

    pub fn host(&self) -> &ModuleHost {
        &self.host
    }

    /// Option binding over all extensions, in load order.
    pub fn options(&self) -> OptionsAggregator<'_> {
        OptionsAggregator::new(&self.extensions)
    }

    /// The extension whose modules registered a service of `value`'s type.
    pub fn owner_of(&self, value: &dyn Any) -> Option<&Arc<ExtensionInstance>> {
        self.owner_of_type(value.type_id())
    }

    pub fn owner_of_type(&self, type_id: TypeId) -> Option<&Arc<ExtensionInstance>> {
        self.extensions.iter().find(|e| {
            e.existing_isolation_context()
                .is_some_and(|context| context.defines_type(type_id))
        })
    }

    /// The extension a module was loaded into.
    pub fn owner_of_module(&self, id: ModuleId) -> Option<&Arc<ExtensionInstance>> {
        self.extensions.iter().find(|e| {
            e.existing_isolation_context()
                .is_some_and(|context| context.contains_module(id))
        })
    }

    /// Every registered service of type `T`, in extension load order.
    pub fn services<T: Any + Send + Sync>(&self) -> Vec<Arc<T>> {
        self.extensions
            .iter()
            .filter_map(|e| e.existing_isolation_context())
            .flat_map(|context| context.services().get_all::<T>())
            .collect()
    }

    /// Option sections extensions asked to have bound, with their owner.
    pub fn option_registrations(&self) -> Vec<(&str, &OptionRegistration)> {
        self.extensions
            .iter()
            .filter_map(|e| e.existing_isolation_context().map(|c| (e.name(), c)))
            .flat_map(|(name, context)| {
                context
                    .services()
                    .option_registrations()
                    .iter()
                    .map(move |registration| (name, registration))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }
}
