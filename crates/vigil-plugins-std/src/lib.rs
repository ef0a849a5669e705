//! # vigil-plugins-std
//!
//! The standard plug-in set for the
//! [vigil](https://crates.io/crates/vigil-automation) analytics runtime:
//!
//! - **Filters** - ColorToGrayscale, Threshold, SwapRedBlue, ApplyMask
//! - **Analyzers** - ImageStatistics (histograms, ranges, means)
//! - **Codecs** - PNG/JPEG importer and exporter (`codecs` feature)
//! - **Sources** - TestPattern synthetic video source
//! - **Scripting** - Rhai scripting engine (`scripting` feature)
//!
//! Everything registers through [`standard_module`]:
//!
//! ```rust
//! use vigil_plugin::PluginRegistry;
//!
//! let mut registry = PluginRegistry::new();
//! registry.register_module(vigil_plugins_std::standard_module());
//! assert!(registry.plugin_by_name("stdvision.Threshold").is_some());
//! ```
//!
//! # Cargo Features
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `scripting` | Yes | Rhai scripting engine plug-in |
//! | `codecs` | Yes | PNG/JPEG importer and exporter plug-ins |

use vigil_plugin::{PluginModule, Uuid, Version};

mod grayscale;
mod mask;
mod statistics;
mod swap_red_blue;
mod test_pattern;
mod threshold;

#[cfg(feature = "codecs")]
mod codecs;

#[cfg(feature = "scripting")]
mod scripting;

#[cfg(feature = "codecs")]
pub use codecs::{FileExporterPlugin, FileImporterPlugin};

// GUID block reserved for the standard module; individual plug-ins occupy
// the low byte.
pub(crate) const STD_MODULE_GUID_BASE: u128 = 0xD0A3_71C2_5E18_4B06_9F44_0000_0000_0000;

/// GUID of the standard plug-in module
pub const STD_MODULE_GUID: Uuid = Uuid::from_u128(STD_MODULE_GUID_BASE);

/// Family of basic color manipulation filters
pub(crate) const FAMILY_COLOR_FILTERS: Uuid =
    Uuid::from_u128(0xD0A3_71C2_5E18_4B06_9F44_0001_0000_0001);
/// Family of thresholding and binarization filters
pub(crate) const FAMILY_THRESHOLDING: Uuid =
    Uuid::from_u128(0xD0A3_71C2_5E18_4B06_9F44_0001_0000_0002);
/// Family of image analysis plug-ins
pub(crate) const FAMILY_IMAGE_ANALYSIS: Uuid =
    Uuid::from_u128(0xD0A3_71C2_5E18_4B06_9F44_0001_0000_0003);
/// Family of file format plug-ins
#[cfg(feature = "codecs")]
pub(crate) const FAMILY_FILE_FORMATS: Uuid =
    Uuid::from_u128(0xD0A3_71C2_5E18_4B06_9F44_0001_0000_0004);
/// Family of video source plug-ins
pub(crate) const FAMILY_VIDEO_SOURCES: Uuid =
    Uuid::from_u128(0xD0A3_71C2_5E18_4B06_9F44_0001_0000_0005);
/// Family of scripting engines
#[cfg(feature = "scripting")]
pub(crate) const FAMILY_SCRIPTING: Uuid =
    Uuid::from_u128(0xD0A3_71C2_5E18_4B06_9F44_0001_0000_0006);

/// Build the standard plug-in module
///
/// Register the result with a
/// [`PluginRegistry`](vigil_plugin::PluginRegistry) to make the standard
/// plug-ins available. The module's short name is `stdvision`, so qualified
/// lookups use e.g. `stdvision.ColorToGrayscale`.
#[must_use]
pub fn standard_module() -> PluginModule {
    let mut plugins = vec![
        grayscale::descriptor(),
        threshold::descriptor(),
        swap_red_blue::descriptor(),
        mask::descriptor(),
        statistics::descriptor(),
        test_pattern::descriptor(),
    ];

    #[cfg(feature = "codecs")]
    {
        plugins.push(codecs::importer_descriptor());
        plugins.push(codecs::exporter_descriptor());
    }

    #[cfg(feature = "scripting")]
    plugins.push(scripting::descriptor());

    PluginModule {
        id: STD_MODULE_GUID,
        short_name: "stdvision".to_string(),
        display_name: "Standard Vision Plug-ins".to_string(),
        description: "Image filters, analyzers, codecs, sources and scripting for vigil."
            .to_string(),
        version: Version::new(1, 0, 0),
        plugins,
    }
}

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_plugin::{BitFlags, PluginRegistry};

    #[test]
    fn test_module_registers_everything() {
        let mut registry = PluginRegistry::new();
        registry.register_module(standard_module());

        for name in [
            "ColorToGrayscale",
            "Threshold",
            "SwapRedBlue",
            "ApplyMask",
            "ImageStatistics",
            "TestPattern",
        ] {
            assert!(registry.plugin_by_name(name).is_some(), "missing {name}");
        }

        #[cfg(feature = "scripting")]
        assert!(registry.plugin_by_name("RhaiScripting").is_some());

        #[cfg(feature = "codecs")]
        {
            assert!(registry.plugin_by_name("ImageFileImporter").is_some());
            assert!(registry.plugin_by_name("ImageFileExporter").is_some());
        }
    }

    #[test]
    fn test_every_descriptor_instantiates() {
        let mut registry = PluginRegistry::new();
        registry.register_module(standard_module());

        for descriptor in registry.plugins_of_type(BitFlags::all()) {
            let (owned, instance) = registry.create_instance(descriptor.id).unwrap();
            assert_eq!(instance.plugin_type(), owned.plugin_type);
        }
    }

    #[test]
    fn test_qualified_lookup() {
        let mut registry = PluginRegistry::new();
        registry.register_module(standard_module());
        assert!(registry.plugin_by_name("stdvision.Threshold").is_some());
        assert!(registry.plugin_by_name("wrongmod.Threshold").is_none());
    }

    #[test]
    fn test_property_round_trip_across_module() {
        let mut registry = PluginRegistry::new();
        registry.register_module(standard_module());

        // get(set(get(p))) == get(p) for every writable property
        for descriptor in registry.plugins_of_type(BitFlags::all()) {
            let (owned, instance) = registry.create_instance(descriptor.id).unwrap();
            for prop in &owned.properties {
                if prop.flags.read_only || prop.flags.hidden {
                    continue;
                }
                let plugin = instance.as_plugin();
                let before = owned.get_plugin_property(plugin, &prop.key).unwrap();
                owned.set_plugin_property(plugin, &prop.key, &before).unwrap();
                let after = owned.get_plugin_property(plugin, &prop.key).unwrap();
                assert_eq!(before, after, "{}.{}", descriptor.short_name, prop.key);
            }
        }
    }
}
