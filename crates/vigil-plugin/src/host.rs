//! Scripting Host Interface
//!
//! The callback surface the automation server hands to every scripting
//! engine instance. Scripts talk to the rest of the system exclusively
//! through this interface: named variables in the shared store, the frame
//! currently flowing through the owning pipeline, and on-demand plug-in
//! instances.
//!
//! Two host contexts exist:
//!
//! - **Pipeline step** - the engine runs inside a video-processing graph;
//!   [`ScriptingHost::get_image`]/[`ScriptingHost::set_image`] access the
//!   frame being processed and [`ScriptingHost::video_source`] the owning
//!   source.
//! - **Scripting thread** - the engine runs on an independent timer thread;
//!   there is no current frame and no owning source, so those three
//!   callbacks answer `NotImplemented`. Named image variables still work.
//!
//! All methods are callable from the pipeline's consumer thread or a
//! scripting thread; implementations are `Send + Sync`.

use std::sync::Arc;

use vigil_image::PixelBuffer;

use crate::descriptor::{PluginDescriptor, Version};
use crate::error::Result;
use crate::traits::PluginInstance;
use crate::variant::Variant;

/// Host callbacks available to scripting engines
pub trait ScriptingHost: Send + Sync {
    /// Name of the hosting application
    fn host_name(&self) -> String;

    /// Version of the hosting application
    fn host_version(&self) -> Version;

    /// Print a message on the host's behalf (log, console, UI)
    fn print(&self, message: &str);

    /// Create a plug-in instance by (possibly `module.`-qualified) short name
    ///
    /// The descriptor is borrowed from the registry. Instances created this
    /// way belong to the calling script and live only as long as the script
    /// keeps them.
    fn create_plugin_instance(&self, name: &str)
        -> Result<(Arc<PluginDescriptor>, PluginInstance)>;

    /// Read a named variable from the shared store (`Empty` if absent)
    fn get_variable(&self, name: &str) -> Result<Variant>;

    /// Write a named variable into the shared store
    ///
    /// Storing `Empty` removes the name. Storing an image routes to the
    /// image map and removes any plain variable under the same name.
    fn set_variable(&self, name: &str, value: Variant) -> Result<()>;

    /// Read a named image variable (`None` if absent)
    fn get_image_variable(&self, name: &str) -> Result<Option<PixelBuffer>>;

    /// Write a named image variable; `None` removes the name
    fn set_image_variable(&self, name: &str, image: Option<PixelBuffer>) -> Result<()>;

    /// The frame currently flowing through the owning pipeline
    ///
    /// Pipeline-step context only; thread hosts answer `NotImplemented`.
    fn get_image(&self) -> Result<PixelBuffer>;

    /// Replace the frame currently flowing through the owning pipeline
    ///
    /// A replacement of identical shape reuses the slot's storage. Pipeline
    /// -step context only; thread hosts answer `NotImplemented`.
    fn set_image(&self, image: PixelBuffer) -> Result<()>;

    /// Descriptor and instance of the owning video source
    ///
    /// Pipeline-step context only; thread hosts answer `NotImplemented`.
    fn video_source(&self) -> Result<(Arc<PluginDescriptor>, PluginInstance)>;
}
