//! Service registration entrypoints exported by extension modules.
//!
//! Instead of scanning loaded code for implementations, the host keeps a
//! [`ProviderTable`] that maps a module name to the registration entrypoints
//! that module exports. When an extension's isolation context loads one of its
//! own modules, each entrypoint is called with an
//! [`ExtensionServiceCollection`] scoped to that extension.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::isolation::ModuleId;

/// A registration entrypoint exported by an extension module.
pub trait ServiceProvider: Send + Sync {
    fn register(&self, services: &mut ExtensionServiceCollection);
}

impl<F> ServiceProvider for F
where
    F: Fn(&mut ExtensionServiceCollection) + Send + Sync,
{
    fn register(&self, services: &mut ExtensionServiceCollection) {
        self(services)
    }
}

/// Registration entrypoints keyed by module simple name (case-insensitive).
#[derive(Default, Clone)]
pub struct ProviderTable {
    providers: HashMap<String, Vec<Arc<dyn ServiceProvider>>>,
}

impl ProviderTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Export `provider` from the module called `module`.
    pub fn register(&mut self, module: &str, provider: impl ServiceProvider + 'static) {
        self.providers
            .entry(module.to_ascii_lowercase())
            .or_default()
            .push(Arc::new(provider));
    }

    /// Entrypoints exported by a module, in registration order.
    pub fn providers_for(&self, module: &str) -> &[Arc<dyn ServiceProvider>] {
        self.providers
            .get(&module.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

impl fmt::Debug for ProviderTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut modules: Vec<_> = self.providers.keys().collect();
        modules.sort();
        f.debug_struct("ProviderTable")
            .field("modules", &modules)
            .finish()
    }
}

/// How an extension-rooted option section is bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionBinding {
    /// Merged into one value across extensions.
    Merged,
    /// One element per contributing extension.
    Collection,
    /// One element per contributing extension, paired with its files.
    FileScoped,
}

/// An option section an extension asked the host to bind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionRegistration {
    pub section: String,
    pub binding: OptionBinding,
}

/// A service instance registered by an extension.
#[derive(Clone)]
pub struct ServiceDescriptor {
    /// Runtime type of the instance.
    pub type_id: TypeId,
    /// Type name, for diagnostics only.
    pub type_name: &'static str,
    /// Module whose entrypoint registered the service.
    pub module: ModuleId,
    /// Extension that owns the module.
    pub extension: String,
    pub instance: Arc<dyn Any + Send + Sync>,
}

impl fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("type_name", &self.type_name)
            .field("module", &self.module)
            .field("extension", &self.extension)
            .finish_non_exhaustive()
    }
}

/// Service collection view handed to a [`ServiceProvider`].
///
/// Everything registered through it is attributed to one extension and module.
#[derive(Debug)]
pub struct ExtensionServiceCollection {
    extension: String,
    module: ModuleId,
    services: Vec<ServiceDescriptor>,
    options: Vec<OptionRegistration>,
}

impl ExtensionServiceCollection {
    pub fn new(extension: impl Into<String>, module: ModuleId) -> Self {
        Self {
            extension: extension.into(),
            module,
            services: Vec::new(),
            options: Vec::new(),
        }
    }

    /// Name of the extension being registered.
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Register a singleton service instance.
    pub fn add_singleton<T: Any + Send + Sync>(&mut self, instance: T) -> &mut Self {
        self.services.push(ServiceDescriptor {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            module: self.module,
            extension: self.extension.clone(),
            instance: Arc::new(instance),
        });
        self
    }

    /// Ask the host to bind a section of this extension's manifest.
    pub fn add_extension_option(&mut self, section: &str, binding: OptionBinding) -> &mut Self {
        self.options.push(OptionRegistration {
            section: section.to_string(),
            binding,
        });
        self
    }

    /// Move everything registered into `services`.
    pub(crate) fn drain_into(self, services: &mut ExtensionServices) {
        services.services.extend(self.services);
        services.options.extend(self.options);
    }
}

/// Everything an extension's entrypoints registered.
#[derive(Debug, Default)]
pub struct ExtensionServices {
    services: Vec<ServiceDescriptor>,
    options: Vec<OptionRegistration>,
}

impl ExtensionServices {
    pub fn descriptors(&self) -> &[ServiceDescriptor] {
        &self.services
    }

    pub fn option_registrations(&self) -> &[OptionRegistration] {
        &self.options
    }

    /// All registered instances of `T`, in registration order.
    pub fn get_all<T: Any + Send + Sync>(&self) -> Vec<Arc<T>> {
        self.services
            .iter()
            .filter_map(|d| Arc::clone(&d.instance).downcast::<T>().ok())
            .collect()
    }

    /// Whether a service of the given runtime type was registered here.
    pub fn contains_type(&self, type_id: TypeId) -> bool {
        self.services.iter().any(|d| d.type_id == type_id)
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty() && self.options.is_empty()
    }
}
