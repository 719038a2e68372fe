//! Per-extension module isolation.
//!
//! An [`IsolationContext`] resolves module names for one extension through a
//! priority list of [`ModuleResolver`]s:
//!
//! 1. the host's [`SharedModuleRegistry`], so a module the host already loaded
//!    is never duplicated inside an extension;
//! 2. the extension's own bundle, probing `{name}.dll` in its file provider.
//!
//! Anything neither resolver knows stays unresolved.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::error::Result;
use crate::file_provider::FileProvider;
use crate::services::{ExtensionServiceCollection, ExtensionServices, ProviderTable};

/// File extension of module images inside an extension bundle.
pub const MODULE_FILE_EXTENSION: &str = "dll";

/// Process-unique identity of a loaded module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleId(u64);

impl ModuleId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Where a loaded module came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleOrigin {
    /// Already loaded by the host.
    Shared,
    /// Loaded from an extension's bundle.
    Private { extension: String },
}

/// A resolved module handle.
#[derive(Debug)]
pub struct LoadedModule {
    id: ModuleId,
    name: String,
    origin: ModuleOrigin,
    image: Vec<u8>,
}

impl LoadedModule {
    fn new(name: &str, origin: ModuleOrigin, image: Vec<u8>) -> Self {
        Self {
            id: ModuleId::next(),
            name: name.to_string(),
            origin,
            image,
        }
    }

    pub fn id(&self) -> ModuleId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn origin(&self) -> &ModuleOrigin {
        &self.origin
    }

    /// Raw module image. Empty for shared modules.
    pub fn image(&self) -> &[u8] {
        &self.image
    }

    pub fn is_shared(&self) -> bool {
        self.origin == ModuleOrigin::Shared
    }
}

/// One step of module resolution.
pub trait ModuleResolver: Send + Sync + fmt::Debug {
    /// Resolve a module by simple name. `Ok(None)` defers to the next resolver.
    fn resolve(&self, name: &str) -> Result<Option<Arc<LoadedModule>>>;
}

/// Modules loaded by the host itself, keyed by simple name (case-insensitive).
#[derive(Debug, Default)]
pub struct SharedModuleRegistry {
    modules: RwLock<HashMap<String, Arc<LoadedModule>>>,
}

impl SharedModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that the host has `name` loaded. Idempotent.
    pub fn register(&self, name: &str) -> Arc<LoadedModule> {
        let mut modules = self.modules.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            modules
                .entry(name.to_ascii_lowercase())
                .or_insert_with(|| Arc::new(LoadedModule::new(name, ModuleOrigin::Shared, Vec::new()))),
        )
    }

    pub fn get(&self, name: &str) -> Option<Arc<LoadedModule>> {
        let modules = self.modules.read().unwrap_or_else(PoisonError::into_inner);
        modules.get(&name.to_ascii_lowercase()).cloned()
    }
}

impl ModuleResolver for Arc<SharedModuleRegistry> {
    fn resolve(&self, name: &str) -> Result<Option<Arc<LoadedModule>>> {
        Ok(self.get(name))
    }
}

/// Resolves modules from an extension's own files.
#[derive(Debug)]
pub struct BundleResolver {
    extension: String,
    files: Arc<dyn FileProvider>,
}

impl BundleResolver {
    pub fn new(extension: impl Into<String>, files: Arc<dyn FileProvider>) -> Self {
        Self {
            extension: extension.into(),
            files,
        }
    }
}

impl ModuleResolver for BundleResolver {
    fn resolve(&self, name: &str) -> Result<Option<Arc<LoadedModule>>> {
        let file_name = format!("{name}.{MODULE_FILE_EXTENSION}");
        Ok(self.files.read(&file_name)?.map(|image| {
            Arc::new(LoadedModule::new(
                name,
                ModuleOrigin::Private {
                    extension: self.extension.clone(),
                },
                image,
            ))
        }))
    }
}

/// Everything the host contributes to module resolution.
#[derive(Debug, Clone, Default)]
pub struct ModuleHost {
    shared: Arc<SharedModuleRegistry>,
    providers: Arc<ProviderTable>,
}

impl ModuleHost {
    pub fn new(shared: Arc<SharedModuleRegistry>, providers: ProviderTable) -> Self {
        Self {
            shared,
            providers: Arc::new(providers),
        }
    }

    pub fn shared(&self) -> &Arc<SharedModuleRegistry> {
        &self.shared
    }

    pub fn providers(&self) -> &ProviderTable {
        &self.providers
    }
}

/// The load boundary of a single extension.
pub struct IsolationContext {
    extension: String,
    resolvers: Vec<Box<dyn ModuleResolver>>,
    loaded: Mutex<Vec<Arc<LoadedModule>>>,
    services: ExtensionServices,
}

impl IsolationContext {
    /// Create the context and run the entrypoints of every declared
    /// service-provider module that resolves privately.
    pub fn activate(
        extension: &str,
        declared_modules: &[String],
        host: &ModuleHost,
        files: Arc<dyn FileProvider>,
    ) -> Self {
        let mut context = Self {
            extension: extension.to_string(),
            resolvers: vec![
                Box::new(Arc::clone(host.shared())),
                Box::new(BundleResolver::new(extension, files)),
            ],
            loaded: Mutex::new(Vec::new()),
            services: ExtensionServices::default(),
        };

        let mut services = ExtensionServices::default();
        for name in declared_modules {
            let Some(module) = context.load(name) else {
                tracing::warn!(
                    extension,
                    module = %name,
                    "Service provider module could not be resolved"
                );
                continue;
            };
            if module.is_shared() {
                tracing::debug!(extension, module = %name, "Module is shared with host, skipping its providers");
                continue;
            }
            for provider in host.providers().providers_for(name) {
                let mut collection = ExtensionServiceCollection::new(extension, module.id());
                provider.register(&mut collection);
                collection.drain_into(&mut services);
            }
        }
        context.services = services;
        context
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Resolve a module: host-shared first, then the extension bundle.
    ///
    /// Privately loaded modules are cached, so a second request returns the
    /// same handle.
    pub fn load(&self, name: &str) -> Option<Arc<LoadedModule>> {
        {
            let loaded = self.loaded.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(existing) = loaded.iter().find(|m| m.name().eq_ignore_ascii_case(name)) {
                return Some(Arc::clone(existing));
            }
        }

        for resolver in &self.resolvers {
            match resolver.resolve(name) {
                Ok(Some(module)) => {
                    if !module.is_shared() {
                        self.loaded
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .push(Arc::clone(&module));
                    }
                    return Some(module);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(extension = %self.extension, module = name, error = %e, "Resolver failed");
                }
            }
        }
        None
    }

    /// Modules loaded privately into this context.
    pub fn modules(&self) -> Vec<Arc<LoadedModule>> {
        self.loaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether a module was loaded into this context.
    pub fn contains_module(&self, id: ModuleId) -> bool {
        self.loaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|m| m.id() == id)
    }

    /// Whether a type was registered by one of this context's modules.
    pub fn defines_type(&self, type_id: TypeId) -> bool {
        self.services.contains_type(type_id)
    }

    pub fn services(&self) -> &ExtensionServices {
        &self.services
    }
}

impl fmt::Debug for IsolationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IsolationContext")
            .field("extension", &self.extension)
            .field("resolvers", &self.resolvers)
            .field("services", &self.services)
            .finish_non_exhaustive()
    }
}
