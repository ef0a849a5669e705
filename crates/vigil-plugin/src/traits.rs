//! Plug-in Interfaces
//!
//! One trait per plug-in type tag. The runtime only ever drives plug-ins
//! through these interfaces plus the descriptor's property operations; the
//! concrete types stay private to their modules.
//!
//! All traits are `Send + Sync` with interior mutability: instances are
//! shared between the control thread, the per-source consumer thread and -
//! through the scripting host - script code, so implementations guard their
//! mutable state themselves (typically with a `parking_lot::Mutex`).

use std::path::Path;
use std::sync::Arc;

use enumflags2::bitflags;
use vigil_image::{PixelBuffer, PixelFormat};

use crate::descriptor::PluginDescriptor;
use crate::error::{PluginError, Result};
use crate::host::ScriptingHost;
use crate::variant::Variant;

/// Plug-in type tag
///
/// Usable as a bit mask in registry queries:
/// `registry.plugins_of_type(PluginType::ImageProcessingFilter | PluginType::VideoProcessing)`.
#[bitflags]
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginType {
    /// Non-destructive image filter, possibly in-place capable
    ImageProcessingFilter = 0x0001,
    /// Image filter taking a secondary input image
    ImageProcessingFilter2 = 0x0002,
    /// Read-only image analyzer publishing results through properties
    ImageProcessing = 0x0004,
    /// In-place video frame processor with per-stream state
    VideoProcessing = 0x0008,
    /// Image file importer
    ImageImporter = 0x0010,
    /// Image file exporter
    ImageExporter = 0x0020,
    /// Video frame producer
    VideoSource = 0x0040,
    /// Script host engine
    ScriptingEngine = 0x0080,
    /// Detection processor (motion, objects) with per-stream state
    Detection = 0x0100,
}

/// Base interface of every plug-in instance: property access by index
///
/// Indexes refer to positions in the owning descriptor's property vector.
/// Implementations report `InvalidProperty` for unknown indexes; the default
/// element accessors build on the whole-array accessors.
pub trait Plugin: Send + Sync {
    /// Read the property at `index`
    fn get_property(&self, index: usize) -> Result<Variant>;

    /// Write the property at `index`
    ///
    /// The value has already been converted to the declared type and checked
    /// against the descriptor's flags by the caller.
    fn set_property(&self, index: usize, value: Variant) -> Result<()>;

    /// Read one element of an array-typed property without materializing the
    /// whole array
    fn get_property_element(&self, index: usize, element: usize) -> Result<Variant> {
        match self.get_property(index)? {
            Variant::Array(items) => {
                items.get(element).cloned().ok_or(PluginError::IndexOutOfBounds)
            }
            Variant::Array2 { data, .. } => {
                data.get(element).cloned().ok_or(PluginError::IndexOutOfBounds)
            }
            _ => Err(PluginError::NotIndexedProperty),
        }
    }

    /// Write one element of an array-typed property
    fn set_property_element(&self, index: usize, element: usize, value: Variant) -> Result<()> {
        match self.get_property(index)? {
            Variant::Array(mut items) => {
                let slot = items.get_mut(element).ok_or(PluginError::IndexOutOfBounds)?;
                *slot = value;
                self.set_property(index, Variant::Array(items))
            }
            Variant::Array2 { cols, mut data } => {
                let slot = data.get_mut(element).ok_or(PluginError::IndexOutOfBounds)?;
                *slot = value;
                self.set_property(index, Variant::Array2 { cols, data })
            }
            _ => Err(PluginError::NotIndexedProperty),
        }
    }

    /// Let a live instance rewrite its own descriptor
    ///
    /// Used by device-backed plug-ins to report the real domain of their
    /// properties once the device is open (actual exposure range, available
    /// resolutions). The default does nothing.
    fn update_dynamic_description(&self, descriptor: &mut PluginDescriptor) -> Result<()> {
        let _ = descriptor;
        Ok(())
    }
}

/// Size relation a two-input filter requires of its secondary image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SecondImageSize {
    /// Any size is accepted
    #[default]
    Any,
    /// Must match the primary image exactly
    Equal,
    /// Must be at least as large as the primary image in both dimensions
    EqualOrBigger,
    /// Must be no larger than the primary image in both dimensions
    EqualOrSmaller,
}

/// Non-destructive image filter
pub trait ImageProcessingFilterPlugin: Plugin {
    /// Pixel formats accepted as input
    fn supported_formats(&self) -> &[PixelFormat];

    /// Output format produced for a supported input format
    fn output_format(&self, input: PixelFormat) -> PixelFormat;

    /// Whether [`ImageProcessingFilterPlugin::process_in_place`] is available
    fn can_process_in_place(&self) -> bool {
        false
    }

    /// Produce a new image from `src`
    ///
    /// `reuse` is a previous output buffer offered back for storage reuse;
    /// implementations pass it through
    /// [`PixelBuffer::reuse_or_allocate`](vigil_image::PixelBuffer::reuse_or_allocate).
    fn process(&self, src: &PixelBuffer, reuse: Option<PixelBuffer>) -> Result<PixelBuffer>;

    /// Transform `image` in place; only called when
    /// [`ImageProcessingFilterPlugin::can_process_in_place`] is true
    fn process_in_place(&self, image: &mut PixelBuffer) -> Result<()> {
        let _ = image;
        Err(PluginError::NotImplemented)
    }

    /// Whether `format` is an accepted input format
    fn is_format_supported(&self, format: PixelFormat) -> bool {
        self.supported_formats().contains(&format)
    }
}

/// Image filter with a secondary input image
pub trait ImageProcessingFilter2Plugin: Plugin {
    /// Pixel formats accepted for the primary image
    fn supported_formats(&self) -> &[PixelFormat];

    /// Output format produced for a supported primary format
    fn output_format(&self, input: PixelFormat) -> PixelFormat;

    /// Size relation required of the secondary image
    fn second_image_size(&self) -> SecondImageSize;

    /// Secondary format required for a given primary format
    fn second_image_format(&self, primary: PixelFormat) -> PixelFormat;

    /// The currently configured secondary image, if any
    fn second_image(&self) -> Option<PixelBuffer>;

    /// Whether in-place processing is available
    fn can_process_in_place(&self) -> bool {
        false
    }

    /// Produce a new image from the primary and secondary inputs
    fn process(
        &self,
        src: &PixelBuffer,
        second: &PixelBuffer,
        reuse: Option<PixelBuffer>,
    ) -> Result<PixelBuffer>;

    /// Transform the primary image in place using the secondary input
    fn process_in_place(&self, image: &mut PixelBuffer, second: &PixelBuffer) -> Result<()> {
        let _ = (image, second);
        Err(PluginError::NotImplemented)
    }

    /// Whether `format` is an accepted primary format
    fn is_format_supported(&self, format: PixelFormat) -> bool {
        self.supported_formats().contains(&format)
    }
}

/// Read-only image analyzer
///
/// Results (histograms, means, found ranges) are exposed through the
/// plug-in's read-only properties after each `process` call.
pub trait ImageProcessingPlugin: Plugin {
    /// Pixel formats accepted as input
    fn supported_formats(&self) -> &[PixelFormat];

    /// Analyze the image; must not modify it
    fn process(&self, image: &PixelBuffer) -> Result<()>;

    /// Whether `format` is an accepted input format
    fn is_format_supported(&self, format: PixelFormat) -> bool {
        self.supported_formats().contains(&format)
    }
}

/// In-place video frame processor
///
/// Unlike an image filter, a video processor may carry state from frame to
/// frame (background models, accumulators). It must not change the frame's
/// pixel format; format changes go through an image filter.
pub trait VideoProcessingPlugin: Plugin {
    /// Pixel formats accepted as input
    fn supported_formats(&self) -> &[PixelFormat];

    /// Whether the processor only inspects frames without modifying them
    fn is_read_only(&self) -> bool {
        false
    }

    /// Process the next frame in place
    fn process(&self, image: &mut PixelBuffer) -> Result<()>;

    /// Drop accumulated per-stream state
    fn reset(&self);

    /// Whether `format` is an accepted input format
    fn is_format_supported(&self, format: PixelFormat) -> bool {
        self.supported_formats().contains(&format)
    }
}

/// Detection processor (motion, objects)
///
/// Behaves like a video processor - in-place, stateful, format-preserving -
/// and publishes detection results through read-only properties.
pub trait DetectionPlugin: Plugin {
    /// Pixel formats accepted as input
    fn supported_formats(&self) -> &[PixelFormat];

    /// Examine the next frame; may annotate it in place
    fn process(&self, image: &mut PixelBuffer) -> Result<()>;

    /// Drop accumulated per-stream state
    fn reset(&self);

    /// Whether `format` is an accepted input format
    fn is_format_supported(&self, format: PixelFormat) -> bool {
        self.supported_formats().contains(&format)
    }
}

/// Script host engine
///
/// Lifecycle: `set_host` → `init` → `set_script_file` → `load_script` →
/// `init_script` (runs top-level code once) → repeated `run_script` (runs
/// the script's `Main`).
pub trait ScriptingEnginePlugin: Plugin {
    /// Default file extension of scripts for this engine (without the dot)
    fn default_extension(&self) -> &str;

    /// Wire the host callback interface; must precede `init`
    fn set_host(&self, host: Arc<dyn ScriptingHost>);

    /// Initialize the engine itself
    fn init(&self) -> Result<()>;

    /// Select the script file to load
    fn set_script_file(&self, path: &Path);

    /// Load (and compile) the selected script
    fn load_script(&self) -> Result<()>;

    /// Run the script's top-level code once
    fn init_script(&self) -> Result<()>;

    /// Run the script's `Main` entry point
    fn run_script(&self) -> Result<()>;

    /// Detailed diagnostic of the most recent failure, if any
    fn last_error_message(&self) -> String;
}

/// Callbacks a video source invokes from its internal producer thread
pub trait VideoSourceEvents: Send + Sync {
    /// A new frame is available; the buffer is only valid for the call
    fn on_new_image(&self, image: &PixelBuffer);

    /// The source hit an error it could not recover silently from
    fn on_error(&self, message: &str);
}

/// Video frame producer
///
/// The plug-in owns an internal producer thread over which the runtime has
/// no control; frames and errors arrive through the listener at
/// unpredictable times.
pub trait VideoSourcePlugin: Plugin {
    /// Install or clear the event listener; must precede `start`
    fn set_listener(&self, listener: Option<Arc<dyn VideoSourceEvents>>);

    /// Start producing frames
    fn start(&self) -> Result<()>;

    /// Ask the producer thread to stop; idempotent, non-blocking
    fn signal_to_stop(&self);

    /// Block until the producer thread has exited
    fn wait_for_stop(&self);

    /// Whether the producer thread is still alive
    fn is_running(&self) -> bool;

    /// Abandon the producer thread without waiting. Last resort only.
    fn terminate(&self);

    /// Number of frames produced since `start`
    fn frames_received(&self) -> u32;
}

/// Image file importer
pub trait ImageImporterPlugin: Plugin {
    /// File extensions this importer understands (without dots)
    fn supported_extensions(&self) -> &[&str];

    /// Load an image from a file
    fn import(&self, path: &Path) -> Result<PixelBuffer>;

    /// Decode an in-memory encoded image
    ///
    /// Used for pass-through payloads arriving from video sources. The
    /// default reports `NotImplemented`.
    fn decode(&self, bytes: &[u8]) -> Result<PixelBuffer> {
        let _ = bytes;
        Err(PluginError::NotImplemented)
    }
}

/// Image file exporter
pub trait ImageExporterPlugin: Plugin {
    /// File extensions this exporter can write (without dots)
    fn supported_extensions(&self) -> &[&str];

    /// Pixel formats accepted for export
    fn supported_formats(&self) -> &[PixelFormat];

    /// Write an image to a file
    fn export(&self, path: &Path, image: &PixelBuffer) -> Result<()>;
}

/// A live plug-in instance, dispatched by type tag
#[derive(Clone)]
pub enum PluginInstance {
    /// Non-destructive image filter
    ImageFilter(Arc<dyn ImageProcessingFilterPlugin>),
    /// Two-input image filter
    ImageFilter2(Arc<dyn ImageProcessingFilter2Plugin>),
    /// Read-only analyzer
    ImageAnalysis(Arc<dyn ImageProcessingPlugin>),
    /// In-place video processor
    VideoProcessing(Arc<dyn VideoProcessingPlugin>),
    /// Detection processor
    Detection(Arc<dyn DetectionPlugin>),
    /// Script engine
    ScriptingEngine(Arc<dyn ScriptingEnginePlugin>),
    /// Video frame producer
    VideoSource(Arc<dyn VideoSourcePlugin>),
    /// Image importer
    ImageImporter(Arc<dyn ImageImporterPlugin>),
    /// Image exporter
    ImageExporter(Arc<dyn ImageExporterPlugin>),
}

impl PluginInstance {
    /// Type tag of the instance
    #[must_use]
    pub fn plugin_type(&self) -> PluginType {
        match self {
            Self::ImageFilter(_) => PluginType::ImageProcessingFilter,
            Self::ImageFilter2(_) => PluginType::ImageProcessingFilter2,
            Self::ImageAnalysis(_) => PluginType::ImageProcessing,
            Self::VideoProcessing(_) => PluginType::VideoProcessing,
            Self::Detection(_) => PluginType::Detection,
            Self::ScriptingEngine(_) => PluginType::ScriptingEngine,
            Self::VideoSource(_) => PluginType::VideoSource,
            Self::ImageImporter(_) => PluginType::ImageImporter,
            Self::ImageExporter(_) => PluginType::ImageExporter,
        }
    }

    /// The instance as the base property-access interface
    #[must_use]
    pub fn as_plugin(&self) -> &dyn Plugin {
        match self {
            Self::ImageFilter(p) => p.as_ref(),
            Self::ImageFilter2(p) => p.as_ref(),
            Self::ImageAnalysis(p) => p.as_ref(),
            Self::VideoProcessing(p) => p.as_ref(),
            Self::Detection(p) => p.as_ref(),
            Self::ScriptingEngine(p) => p.as_ref(),
            Self::VideoSource(p) => p.as_ref(),
            Self::ImageImporter(p) => p.as_ref(),
            Self::ImageExporter(p) => p.as_ref(),
        }
    }

    /// The scripting engine interface, if this is a scripting engine
    #[must_use]
    pub fn as_scripting_engine(&self) -> Option<&Arc<dyn ScriptingEnginePlugin>> {
        match self {
            Self::ScriptingEngine(p) => Some(p),
            _ => None,
        }
    }

    /// The video source interface, if this is a video source
    #[must_use]
    pub fn as_video_source(&self) -> Option<&Arc<dyn VideoSourcePlugin>> {
        match self {
            Self::VideoSource(p) => Some(p),
            _ => None,
        }
    }
}

impl std::fmt::Debug for PluginInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PluginInstance::{:?}", self.plugin_type())
    }
}

/// Check a secondary image against a primary under a size constraint
#[must_use]
pub fn second_image_size_ok(
    constraint: SecondImageSize,
    primary: (u32, u32),
    second: (u32, u32),
) -> bool {
    match constraint {
        SecondImageSize::Any => true,
        SecondImageSize::Equal => primary == second,
        SecondImageSize::EqualOrBigger => second.0 >= primary.0 && second.1 >= primary.1,
        SecondImageSize::EqualOrSmaller => second.0 <= primary.0 && second.1 <= primary.1,
    }
}
