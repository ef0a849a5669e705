//! Plug-in Registry
//!
//! Indexes plug-in modules by GUID and short name and instantiates plug-ins
//! on demand. Modules arrive two ways:
//!
//! - **Static registration** - in-process modules (the standard plug-in set,
//!   application-provided plug-ins) registered with
//!   [`PluginRegistry::register_module`].
//! - **Dynamic collection** - shared libraries in a directory, each
//!   exporting a `vigil_plugin_module` entry point, loaded with
//!   [`PluginRegistry::collect_modules`] (behind the `dynamic-modules`
//!   feature).
//!
//! Dynamic modules are Rust dylibs built with the same toolchain as the
//! host; the entry point returns a [`PluginModule`] by value and the library
//! stays loaded for the registry's lifetime.

use std::collections::HashMap;
use std::sync::Arc;

use enumflags2::BitFlags;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::descriptor::{PluginDescriptor, Version};
use crate::error::{PluginError, Result};
use crate::traits::{PluginInstance, PluginType};

/// Name of the entry point a dynamic plug-in module must export
#[cfg(feature = "dynamic-modules")]
pub const MODULE_ENTRY_POINT: &[u8] = b"vigil_plugin_module";

/// Signature of the dynamic module entry point
#[cfg(feature = "dynamic-modules")]
pub type ModuleEntryFn = fn() -> PluginModule;

/// A named collection of plug-in descriptors
#[derive(Clone)]
pub struct PluginModule {
    /// Stable 128-bit identifier of the module
    pub id: Uuid,
    /// Short name; qualifies plug-in names as `module.plugin`
    pub short_name: String,
    /// Human-readable name
    pub display_name: String,
    /// Longer description for UIs
    pub description: String,
    /// Module version
    pub version: Version,
    /// The plug-ins this module provides
    pub plugins: Vec<Arc<PluginDescriptor>>,
}

impl std::fmt::Debug for PluginModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginModule")
            .field("id", &self.id)
            .field("short_name", &self.short_name)
            .field("version", &self.version)
            .field("plugins", &self.plugins.len())
            .finish()
    }
}

/// Registry of all known plug-in modules and their plug-ins
#[derive(Default)]
pub struct PluginRegistry {
    modules: Vec<Arc<PluginModule>>,
    by_id: HashMap<Uuid, Arc<PluginDescriptor>>,
    by_name: HashMap<String, Arc<PluginDescriptor>>,

    // Loaded libraries must outlive every descriptor they provided.
    #[cfg(feature = "dynamic-modules")]
    libraries: Vec<libloading::Library>,
}

impl PluginRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an in-process module
    ///
    /// Plug-ins whose GUID or short name is already taken are skipped with a
    /// warning; the rest of the module still registers.
    pub fn register_module(&mut self, module: PluginModule) {
        let module = Arc::new(module);

        for descriptor in &module.plugins {
            if self.by_id.contains_key(&descriptor.id) {
                warn!(plugin = %descriptor.short_name, id = %descriptor.id,
                      "duplicate plug-in GUID, skipping");
                continue;
            }
            if self.by_name.contains_key(&descriptor.short_name) {
                warn!(plugin = %descriptor.short_name, "duplicate plug-in short name, skipping");
                continue;
            }

            self.by_id.insert(descriptor.id, Arc::clone(descriptor));
            self.by_name
                .insert(descriptor.short_name.clone(), Arc::clone(descriptor));
        }

        debug!(module = %module.short_name, plugins = module.plugins.len(), "module registered");
        self.modules.push(module);
    }

    /// Scan a directory for dynamic plug-in modules and load them
    ///
    /// Files with the platform's shared-library extension are opened and
    /// their [`MODULE_ENTRY_POINT`] resolved; failures are logged and the
    /// scan continues. Returns the number of modules loaded.
    ///
    /// # Errors
    ///
    /// `IoFailure` if the directory cannot be read at all.
    #[cfg(feature = "dynamic-modules")]
    pub fn collect_modules(&mut self, directory: &std::path::Path) -> Result<usize> {
        let mut loaded = 0;

        for entry in std::fs::read_dir(directory)? {
            let path = entry?.path();
            let is_module = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| matches!(e, "so" | "dll" | "dylib"));
            if !is_module {
                continue;
            }

            // SAFETY: loading a module runs its initializers; modules are
            // trusted code deployed alongside the host and built with the
            // same toolchain, which the Rust-ABI entry point requires.
            let library = match unsafe { libloading::Library::new(&path) } {
                Ok(lib) => lib,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed loading module library");
                    continue;
                }
            };

            // SAFETY: the entry point's signature is part of the module
            // contract; a library without the symbol is skipped.
            let entry = match unsafe { library.get::<ModuleEntryFn>(MODULE_ENTRY_POINT) } {
                Ok(symbol) => *symbol,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "library has no module entry point");
                    continue;
                }
            };

            let module = entry();
            info!(path = %path.display(), module = %module.short_name, "collected plug-in module");
            self.register_module(module);
            self.libraries.push(library);
            loaded += 1;
        }

        Ok(loaded)
    }

    /// All registered modules
    #[must_use]
    pub fn modules(&self) -> &[Arc<PluginModule>] {
        &self.modules
    }

    /// Distinct family GUIDs across all registered plug-ins
    #[must_use]
    pub fn families(&self) -> Vec<Uuid> {
        let mut families: Vec<Uuid> = self.by_id.values().map(|d| d.family).collect();
        families.sort_unstable();
        families.dedup();
        families
    }

    /// All plug-ins whose type is included in `mask`, sorted by short name
    #[must_use]
    pub fn plugins_of_type(&self, mask: BitFlags<PluginType>) -> Vec<Arc<PluginDescriptor>> {
        let mut plugins: Vec<Arc<PluginDescriptor>> = self
            .by_id
            .values()
            .filter(|d| mask.contains(d.plugin_type))
            .cloned()
            .collect();
        plugins.sort_by(|a, b| a.short_name.cmp(&b.short_name));
        plugins
    }

    /// Look up a plug-in by GUID
    #[must_use]
    pub fn plugin(&self, id: Uuid) -> Option<Arc<PluginDescriptor>> {
        self.by_id.get(&id).cloned()
    }

    /// Look up a plug-in by short name
    ///
    /// Accepts the bare short name or the `module.plugin` qualified form
    /// used by scripts.
    #[must_use]
    pub fn plugin_by_name(&self, name: &str) -> Option<Arc<PluginDescriptor>> {
        if let Some((module_name, plugin_name)) = name.split_once('.') {
            let module = self.modules.iter().find(|m| m.short_name == module_name)?;
            return module
                .plugins
                .iter()
                .find(|p| p.short_name == plugin_name)
                .cloned();
        }

        self.by_name.get(name).cloned()
    }

    /// Instantiate a plug-in by GUID
    ///
    /// Returns the live instance together with an owned descriptor copy on
    /// which the module's dynamic-update hook has already run, so device
    /// lists and similar derived domains are current.
    ///
    /// # Errors
    ///
    /// `PluginNotFound` for unknown GUIDs, `FailedPluginInstantiation` if
    /// the creator fails.
    pub fn create_instance(&self, id: Uuid) -> Result<(PluginDescriptor, PluginInstance)> {
        let descriptor = self
            .plugin(id)
            .ok_or_else(|| PluginError::PluginNotFound(id.to_string()))?;

        let instance = descriptor.create_instance()?;

        let mut owned = (*descriptor).clone();
        owned.run_dynamic_update();

        Ok((owned, instance))
    }

    /// Instantiate a plug-in by (possibly qualified) short name
    ///
    /// # Errors
    ///
    /// `PluginNotFound` for unknown names, `FailedPluginInstantiation` if
    /// the creator fails.
    pub fn create_instance_by_name(
        &self,
        name: &str,
    ) -> Result<(PluginDescriptor, PluginInstance)> {
        let descriptor = self
            .plugin_by_name(name)
            .ok_or_else(|| PluginError::PluginNotFound(name.to_string()))?;
        self.create_instance(descriptor.id)
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("modules", &self.modules.len())
            .field("plugins", &self.by_id.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::traits::{ImageProcessingPlugin, Plugin};
    use crate::variant::Variant;
    use vigil_image::{PixelBuffer, PixelFormat};

    struct NoopAnalyzer;

    impl Plugin for NoopAnalyzer {
        fn get_property(&self, index: usize) -> Result<Variant> {
            Err(PluginError::InvalidProperty(index.to_string()))
        }
        fn set_property(&self, index: usize, _value: Variant) -> Result<()> {
            Err(PluginError::InvalidProperty(index.to_string()))
        }
    }

    impl ImageProcessingPlugin for NoopAnalyzer {
        fn supported_formats(&self) -> &[PixelFormat] {
            &[PixelFormat::Gray8]
        }
        fn process(&self, _image: &PixelBuffer) -> Result<()> {
            Ok(())
        }
    }

    fn analyzer_descriptor(id: u128, name: &str) -> Arc<PluginDescriptor> {
        Arc::new(PluginDescriptor::new(
            Uuid::from_u128(id),
            Uuid::from_u128(0xFA),
            PluginType::ImageProcessing,
            name,
            name,
            Version::new(1, 0, 0),
            || Ok(PluginInstance::ImageAnalysis(Arc::new(NoopAnalyzer))),
        ))
    }

    fn test_module() -> PluginModule {
        PluginModule {
            id: Uuid::from_u128(0x10),
            short_name: "testmod".to_string(),
            display_name: "Test Module".to_string(),
            description: String::new(),
            version: Version::new(1, 0, 0),
            plugins: vec![
                analyzer_descriptor(0x11, "alpha"),
                analyzer_descriptor(0x12, "beta"),
            ],
        }
    }

    #[test]
    fn test_lookup_by_id_and_name() {
        let mut registry = PluginRegistry::new();
        registry.register_module(test_module());

        assert!(registry.plugin(Uuid::from_u128(0x11)).is_some());
        assert!(registry.plugin(Uuid::from_u128(0x99)).is_none());
        assert_eq!(registry.plugin_by_name("beta").unwrap().short_name, "beta");
        assert_eq!(
            registry.plugin_by_name("testmod.alpha").unwrap().short_name,
            "alpha"
        );
        assert!(registry.plugin_by_name("testmod.gamma").is_none());
        assert!(registry.plugin_by_name("othermod.alpha").is_none());
    }

    #[test]
    fn test_type_mask_query() {
        let mut registry = PluginRegistry::new();
        registry.register_module(test_module());

        let found = registry.plugins_of_type(PluginType::ImageProcessing.into());
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].short_name, "alpha");

        let none = registry.plugins_of_type(PluginType::VideoSource.into());
        assert!(none.is_empty());
    }

    #[test]
    fn test_duplicate_guid_skipped() {
        let mut registry = PluginRegistry::new();
        registry.register_module(test_module());

        let mut dup = test_module();
        dup.short_name = "other".to_string();
        registry.register_module(dup);

        // Second registration of the same GUIDs did not overwrite
        assert_eq!(registry.plugins_of_type(BitFlags::all()).len(), 2);
    }

    #[test]
    fn test_create_instance() {
        let mut registry = PluginRegistry::new();
        registry.register_module(test_module());

        let (descriptor, instance) = registry.create_instance(Uuid::from_u128(0x11)).unwrap();
        assert_eq!(descriptor.short_name, "alpha");
        assert_eq!(instance.plugin_type(), PluginType::ImageProcessing);

        assert!(matches!(
            registry.create_instance(Uuid::from_u128(0x99)),
            Err(PluginError::PluginNotFound(_))
        ));
    }

    #[test]
    fn test_families() {
        let mut registry = PluginRegistry::new();
        registry.register_module(test_module());
        assert_eq!(registry.families(), vec![Uuid::from_u128(0xFA)]);
    }
}
