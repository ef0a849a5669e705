//! # vigil-automation
//!
//! Extensible real-time video analytics runtime for Rust.
//!
//! Many independent video sources are acquired concurrently; each frame is
//! pushed through a per-source pipeline of pluggable transformations (image
//! filters, analyzers, embedded scripts). Independent scripting threads run
//! alongside on timers. All components exchange typed values and images
//! through a shared host variable store.
//!
//! This crate provides a unified interface to the vigil libraries:
//!
//! - **[`image`]** - Pixel buffers, formats and scalar kernels
//! - **[`plugin`]** - Typed values, descriptors and the plug-in registry
//! - **[`plugins_std`]** - The standard plug-in set
//! - **[`server`]** - The automation server and its runtimes
//!
//! # Features
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `stdlib` | Yes | Standard plug-in set (filters, statistics, codecs, scripting, sources) |
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use vigil_automation::prelude::*;
//!
//! # fn main() -> Result<(), vigil_automation::plugin::PluginError> {
//! // 1. Register the standard plug-ins
//! let mut registry = PluginRegistry::new();
//! registry.register_module(vigil_automation::plugins_std::standard_module());
//! let registry = Arc::new(registry);
//!
//! // 2. Bring up the server
//! let server = AutomationServer::new(ServerConfig::default())?
//!     .with_registry(Arc::clone(&registry));
//! server.start()?;
//!
//! // 3. Add a source with a processing graph
//! let (descriptor, instance) = registry.create_instance_by_name("TestPattern")?;
//! let source = instance.as_video_source().unwrap().clone();
//! let id = server.add_video_source(Arc::new(descriptor), source);
//!
//! let grayscale = registry.plugin_by_name("ColorToGrayscale").unwrap();
//! let mut graph = ProcessingGraph::new();
//! graph.add_step(ProcessingStep::new("Grayscale", grayscale.id));
//! server.set_processing_graph(id, graph)?;
//!
//! server.start_video_source(id)?;
//! // ... frames now flow to any registered listeners
//!
//! server.signal_to_stop();
//! server.wait_for_stop();
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       vigil-automation                          │
//! ├───────────────┬────────────────┬────────────────┬───────────────┤
//! │  vigil-image  │  vigil-plugin  │ vigil-plugins- │ vigil-server  │
//! │               │                │     std        │               │
//! │  PixelBuffer  │  Variant       │  filters       │ Automation-   │
//! │  PixelFormat  │  PluginRegistry│  statistics    │   Server      │
//! │  kernels      │  descriptors   │  codecs        │ pipelines     │
//! │               │  ScriptingHost │  Rhai engine   │ runtimes      │
//! └───────────────┴────────────────┴────────────────┴───────────────┘
//! ```

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// RE-EXPORTS
// =============================================================================

/// Pixel buffers, pixel formats and scalar image kernels.
///
/// See [`vigil_image`] documentation for details.
pub use vigil_image as image;

/// Typed values, plug-in descriptors and the plug-in registry.
///
/// See [`vigil_plugin`] documentation for details.
pub use vigil_plugin as plugin;

/// The standard plug-in set: filters, analyzers, codecs, sources, scripting.
///
/// See [`vigil_plugins_std`] documentation for details.
#[cfg(feature = "stdlib")]
pub use vigil_plugins_std as plugins_std;

/// The automation server: per-source pipelines, scripting threads, shared
/// variable store.
///
/// See [`vigil_server`] documentation for details.
pub use vigil_server as server;

// =============================================================================
// PRELUDE - Common types for convenience
// =============================================================================

/// Prelude module with commonly used types.
///
/// ```rust
/// use vigil_automation::prelude::*;
/// ```
pub mod prelude {
    pub use vigil_image::{PixelBuffer, PixelFormat, Rgba};

    pub use vigil_plugin::{
        PluginDescriptor, PluginError, PluginInstance, PluginRegistry, PluginType, Variant,
        VariantType,
    };

    pub use vigil_server::{
        AutomationServer, FrameInfo, ProcessingGraph, ProcessingStep, ServerConfig,
        VideoSourceListener,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_image_reexport() {
        let buffer = image::PixelBuffer::allocate(4, 4, image::PixelFormat::Gray8);
        assert!(buffer.is_ok());
    }

    #[test]
    #[cfg(feature = "stdlib")]
    fn test_stdlib_reexport() {
        let module = plugins_std::standard_module();
        assert!(!module.plugins.is_empty());
    }
}
