//! Shared helpers for the integration tests: a hand-driven video source, a
//! recording listener and a module of purpose-built test plug-ins.

// Each test binary uses a different subset of these helpers.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use vigil_automation::image::{PixelBuffer, PixelFormat, Rgba};
use vigil_automation::plugin::{
    ImageProcessingFilterPlugin, Plugin, PluginDescriptor, PluginError, PluginInstance,
    PluginModule, PluginRegistry, PluginType, PropertyDescriptor, Result, Uuid, Variant,
    VariantType, Version, VideoSourceEvents, VideoSourcePlugin,
};
use vigil_automation::server::VideoSourceListener;

pub const MANUAL_SOURCE_GUID: Uuid = Uuid::from_u128(0x7E57_0000_0000_0000_0000_0000_0000_0001);
pub const SLOW_FILTER_GUID: Uuid = Uuid::from_u128(0x7E57_0000_0000_0000_0000_0000_0000_0002);
const TEST_FAMILY: Uuid = Uuid::from_u128(0x7E57_0000_0000_0000_0000_0000_0000_00FF);

/// Video source driven directly from the test thread
#[derive(Default)]
pub struct ManualSource {
    listener: Mutex<Option<Arc<dyn VideoSourceEvents>>>,
    running: AtomicBool,
    frames: AtomicU32,
}

impl ManualSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a frame as if the source's producer thread had captured it
    pub fn push_frame(&self, frame: &PixelBuffer) {
        let listener = self.listener.lock().clone();
        if let Some(listener) = listener {
            self.frames.fetch_add(1, Ordering::SeqCst);
            listener.on_new_image(frame);
        }
    }

    /// Deliver a source error
    pub fn push_error(&self, message: &str) {
        let listener = self.listener.lock().clone();
        if let Some(listener) = listener {
            listener.on_error(message);
        }
    }
}

impl Plugin for ManualSource {
    fn get_property(&self, index: usize) -> Result<Variant> {
        Err(PluginError::InvalidProperty(index.to_string()))
    }
    fn set_property(&self, index: usize, _value: Variant) -> Result<()> {
        Err(PluginError::InvalidProperty(index.to_string()))
    }
}

impl VideoSourcePlugin for ManualSource {
    fn set_listener(&self, listener: Option<Arc<dyn VideoSourceEvents>>) {
        *self.listener.lock() = listener;
    }
    fn start(&self) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }
    fn signal_to_stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
    fn wait_for_stop(&self) {}
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
    fn terminate(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
    fn frames_received(&self) -> u32 {
        self.frames.load(Ordering::SeqCst)
    }
}

pub fn manual_source_descriptor() -> Arc<PluginDescriptor> {
    Arc::new(PluginDescriptor::new(
        MANUAL_SOURCE_GUID,
        TEST_FAMILY,
        PluginType::VideoSource,
        "ManualSource",
        "Manual Source",
        Version::new(1, 0, 0),
        || Ok(PluginInstance::VideoSource(Arc::new(ManualSource::new()))),
    ))
}

/// In-place filter that sleeps for a configurable time per frame
pub struct SlowFilter {
    delay_ms: Mutex<u32>,
}

const SLOW_FORMATS: &[PixelFormat] = &[PixelFormat::Gray8, PixelFormat::Rgb24];

impl Plugin for SlowFilter {
    fn get_property(&self, index: usize) -> Result<Variant> {
        match index {
            0 => Ok(Variant::U32(*self.delay_ms.lock())),
            _ => Err(PluginError::InvalidProperty(index.to_string())),
        }
    }
    fn set_property(&self, index: usize, value: Variant) -> Result<()> {
        match index {
            0 => {
                *self.delay_ms.lock() =
                    value.change_type(VariantType::U32)?.as_u32().unwrap_or(30);
                Ok(())
            }
            _ => Err(PluginError::InvalidProperty(index.to_string())),
        }
    }
}

impl ImageProcessingFilterPlugin for SlowFilter {
    fn supported_formats(&self) -> &[PixelFormat] {
        SLOW_FORMATS
    }
    fn output_format(&self, input: PixelFormat) -> PixelFormat {
        input
    }
    fn can_process_in_place(&self) -> bool {
        true
    }
    fn process(&self, src: &PixelBuffer, reuse: Option<PixelBuffer>) -> Result<PixelBuffer> {
        let mut out = reuse;
        src.copy_data_or_clone(&mut out)?;
        let mut out = out.ok_or(PluginError::OutOfMemory)?;
        self.process_in_place(&mut out)?;
        Ok(out)
    }
    fn process_in_place(&self, _image: &mut PixelBuffer) -> Result<()> {
        std::thread::sleep(Duration::from_millis(u64::from(*self.delay_ms.lock())));
        Ok(())
    }
}

pub fn test_module() -> PluginModule {
    PluginModule {
        id: Uuid::from_u128(0x7E57_0000_0000_0000_0000_0000_0000_0100),
        short_name: "testmod".to_string(),
        display_name: "Test Plug-ins".to_string(),
        description: String::new(),
        version: Version::new(1, 0, 0),
        plugins: vec![
            manual_source_descriptor(),
            Arc::new(
                PluginDescriptor::new(
                    SLOW_FILTER_GUID,
                    TEST_FAMILY,
                    PluginType::ImageProcessingFilter,
                    "SlowFilter",
                    "Slow Filter",
                    Version::new(1, 0, 0),
                    || {
                        Ok(PluginInstance::ImageFilter(Arc::new(SlowFilter {
                            delay_ms: Mutex::new(30),
                        })))
                    },
                )
                .with_properties(vec![PropertyDescriptor::new(
                    "delayMs",
                    "Delay",
                    VariantType::U32,
                )
                .with_default(Variant::U32(30))
                .runtime_configurable()]),
            ),
        ],
    }
}

/// Registry with the standard and test modules
pub fn build_registry() -> Arc<PluginRegistry> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let mut registry = PluginRegistry::new();
    registry.register_module(vigil_automation::plugins_std::standard_module());
    registry.register_module(test_module());
    Arc::new(registry)
}

/// Listener recording every frame and error it receives
#[derive(Default)]
pub struct CollectingListener {
    pub frames: Mutex<Vec<PixelBuffer>>,
    pub errors: Mutex<Vec<String>>,
}

impl CollectingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn frame_count(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn error_count(&self) -> usize {
        self.errors.lock().len()
    }

    pub fn last_frame(&self) -> Option<PixelBuffer> {
        self.frames.lock().last().cloned()
    }

    /// Wait until at least `count` frames arrived
    pub fn wait_for_frames(&self, count: usize, timeout: Duration) -> bool {
        wait_until(timeout, || self.frame_count() >= count)
    }

    /// Wait until at least `count` errors arrived
    pub fn wait_for_errors(&self, count: usize, timeout: Duration) -> bool {
        wait_until(timeout, || self.error_count() >= count)
    }
}

impl VideoSourceListener for CollectingListener {
    fn on_new_frame(&self, _source_id: u32, frame: &PixelBuffer) {
        self.frames.lock().push(frame.clone());
    }
    fn on_error(&self, _source_id: u32, message: &str) {
        self.errors.lock().push(message.to_string());
    }
}

/// Poll `condition` until it holds or `timeout` elapses
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}

/// A 320x240 RGB24 frame with a black left half and a white right half
pub fn half_and_half_frame() -> PixelBuffer {
    let mut frame = PixelBuffer::allocate(320, 240, PixelFormat::Rgb24).expect("frame");
    for y in 0..240 {
        for x in 160..320 {
            frame.set_pixel(x, y, Rgba::opaque(255, 255, 255)).expect("pixel");
        }
    }
    frame
}
