//! # vigil-plugin
//!
//! Typed values, plug-in descriptors and the plug-in registry for the
//! [vigil](https://crates.io/crates/vigil-automation) analytics runtime.
//!
//! Everything pluggable in vigil - image filters, analyzers, video
//! processors, sources, codecs and scripting engines - is described by a
//! [`PluginDescriptor`] and driven through the trait for its type tag. The
//! runtime never sees concrete plug-in types.
//!
//! # Features
//!
//! - **[`Variant`]** - the uniform dynamic value for property I/O, script
//!   variables and host/script exchange, with a total conversion matrix
//! - **Typed property system** - descriptors with defaults, bounds, choice
//!   lists, behavioral flags and dependent-property updaters
//! - **[`PluginRegistry`]** - GUID and short-name indexes over statically
//!   registered and dynamically collected modules
//! - **[`ScriptingHost`]** - the callback surface scripts use to reach the
//!   host
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use vigil_plugin::{PluginRegistry, PluginType};
//!
//! let mut registry = PluginRegistry::new();
//! registry.register_module(vigil_plugins_std::standard_module());
//! registry.collect_modules("plugins/".as_ref())?;
//!
//! let filters = registry.plugins_of_type(PluginType::ImageProcessingFilter.into());
//! let (descriptor, instance) = registry.create_instance(filters[0].id)?;
//! ```
//!
//! # Cargo Features
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `dynamic-modules` | Yes | Loading plug-in modules from shared libraries |

pub mod descriptor;
pub mod error;
pub mod host;
pub mod property;
pub mod registry;
pub mod traits;
pub mod variant;

pub use descriptor::{DescriptorUpdater, PluginCreator, PluginDescriptor, Version};
pub use error::{PluginError, Result};
pub use host::ScriptingHost;
pub use property::{
    ChoiceList, ChoiceSelection, PreferredEditor, PropertyDescriptor, PropertyFlags,
    PropertyUpdater,
};
pub use registry::{PluginModule, PluginRegistry};
pub use traits::{
    second_image_size_ok, DetectionPlugin, ImageExporterPlugin, ImageImporterPlugin,
    ImageProcessingFilter2Plugin, ImageProcessingFilterPlugin, ImageProcessingPlugin, Plugin,
    PluginInstance, PluginType, ScriptingEnginePlugin, SecondImageSize, VideoProcessingPlugin,
    VideoSourceEvents, VideoSourcePlugin,
};
pub use variant::{FloatPoint, FloatRange, IntPoint, IntRange, SizeValue, Variant, VariantType};

// Re-exported so plug-in crates can depend on one crate for the common types.
pub use enumflags2::BitFlags;
pub use uuid::Uuid;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
