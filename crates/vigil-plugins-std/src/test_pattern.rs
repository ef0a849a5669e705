//! Synthetic test-pattern video source
//!
//! Produces a moving RGB gradient at a configurable size and rate. Useful
//! for pipeline development and soak testing without any capture hardware.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};
use vigil_image::{PixelBuffer, PixelFormat};
use vigil_plugin::{
    Plugin, PluginDescriptor, PluginError, PluginInstance, PluginType, PropertyDescriptor,
    Result, Uuid, Variant, VariantType, VideoSourceEvents, VideoSourcePlugin, Version,
};

use crate::{FAMILY_VIDEO_SOURCES, STD_MODULE_GUID_BASE};

#[derive(Debug, Clone, Copy)]
struct PatternConfig {
    width: u32,
    height: u32,
    frame_rate: f32,
    frame_count: u32,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self { width: 320, height: 240, frame_rate: 30.0, frame_count: 0 }
    }
}

// State shared with the producer thread.
struct PatternShared {
    listener: Mutex<Option<Arc<dyn VideoSourceEvents>>>,
    frames: AtomicU32,
}

/// Generates a moving RGB gradient
struct TestPatternSource {
    config: Mutex<PatternConfig>,
    shared: Arc<PatternShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    stop_tx: Mutex<Option<SyncSender<()>>>,
}

impl TestPatternSource {
    fn new() -> Self {
        Self {
            config: Mutex::new(PatternConfig::default()),
            shared: Arc::new(PatternShared {
                listener: Mutex::new(None),
                frames: AtomicU32::new(0),
            }),
            worker: Mutex::new(None),
            stop_tx: Mutex::new(None),
        }
    }
}

fn render_pattern(frame: &mut PixelBuffer, counter: u32) {
    let width = frame.width() as usize;
    for y in 0..frame.height() {
        let row = frame.row_mut(y);
        for x in 0..width {
            row[x * 3] = ((x as u32 + counter) & 0xFF) as u8;
            row[x * 3 + 1] = (y & 0xFF) as u8;
            row[x * 3 + 2] = (counter & 0xFF) as u8;
        }
    }
}

fn producer_loop(
    config: PatternConfig,
    shared: Arc<PatternShared>,
    stop_rx: mpsc::Receiver<()>,
) {
    let interval = Duration::from_secs_f64(1.0 / f64::from(config.frame_rate));

    let mut frame = match PixelBuffer::allocate(config.width, config.height, PixelFormat::Rgb24) {
        Ok(frame) => frame,
        Err(e) => {
            if let Some(listener) = shared.listener.lock().clone() {
                listener.on_error(&format!("Failed allocating test pattern frame: {e}"));
            }
            return;
        }
    };

    let mut counter = 0u32;
    loop {
        match stop_rx.recv_timeout(interval) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        render_pattern(&mut frame, counter);
        shared.frames.fetch_add(1, Ordering::Relaxed);

        if let Some(listener) = shared.listener.lock().clone() {
            listener.on_new_image(&frame);
        }

        counter = counter.wrapping_add(1);
        if config.frame_count != 0 && counter >= config.frame_count {
            debug!(frames = counter, "test pattern finished its configured frame count");
            break;
        }
    }
}

impl Plugin for TestPatternSource {
    fn get_property(&self, index: usize) -> Result<Variant> {
        let config = self.config.lock();
        match index {
            0 => Ok(Variant::U32(config.width)),
            1 => Ok(Variant::U32(config.height)),
            2 => Ok(Variant::F32(config.frame_rate)),
            3 => Ok(Variant::U32(config.frame_count)),
            _ => Err(PluginError::InvalidProperty(index.to_string())),
        }
    }

    fn set_property(&self, index: usize, value: Variant) -> Result<()> {
        if self.is_running() {
            return Err(PluginError::CannotSetPropertyWhileRunning);
        }

        let mut config = self.config.lock();
        match index {
            0 => config.width = value.change_type(VariantType::U32)?.as_u32().unwrap_or(320),
            1 => config.height = value.change_type(VariantType::U32)?.as_u32().unwrap_or(240),
            2 => {
                config.frame_rate =
                    value.change_type(VariantType::F32)?.as_f32().unwrap_or(30.0).max(0.1);
            }
            3 => config.frame_count = value.change_type(VariantType::U32)?.as_u32().unwrap_or(0),
            i => return Err(PluginError::InvalidProperty(i.to_string())),
        }
        Ok(())
    }
}

impl VideoSourcePlugin for TestPatternSource {
    fn set_listener(&self, listener: Option<Arc<dyn VideoSourceEvents>>) {
        *self.shared.listener.lock() = listener;
    }

    fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock();
        if worker.as_ref().is_some_and(|h| !h.is_finished()) {
            return Ok(());
        }

        let config = *self.config.lock();
        let shared = Arc::clone(&self.shared);
        let (stop_tx, stop_rx) = mpsc::sync_channel(1);

        let handle = std::thread::Builder::new()
            .name("test-pattern".to_string())
            .spawn(move || producer_loop(config, shared, stop_rx))
            .map_err(|e| PluginError::Failed(format!("cannot spawn producer thread: {e}")))?;

        *worker = Some(handle);
        *self.stop_tx.lock() = Some(stop_tx);
        Ok(())
    }

    fn signal_to_stop(&self) {
        if let Some(tx) = self.stop_tx.lock().take() {
            let _ = tx.try_send(());
        }
    }

    fn wait_for_stop(&self) {
        self.signal_to_stop();
        if let Some(handle) = self.worker.lock().take() {
            if handle.join().is_err() {
                warn!("test pattern producer thread panicked");
            }
        }
    }

    fn is_running(&self) -> bool {
        self.worker.lock().as_ref().is_some_and(|h| !h.is_finished())
    }

    fn terminate(&self) {
        self.signal_to_stop();
        drop(self.worker.lock().take());
    }

    fn frames_received(&self) -> u32 {
        self.shared.frames.load(Ordering::Relaxed)
    }
}

pub(crate) fn descriptor() -> Arc<PluginDescriptor> {
    Arc::new(
        PluginDescriptor::new(
            Uuid::from_u128(STD_MODULE_GUID_BASE | 0x08),
            FAMILY_VIDEO_SOURCES,
            PluginType::VideoSource,
            "TestPattern",
            "Test Pattern",
            Version::new(1, 0, 0),
            || Ok(PluginInstance::VideoSource(Arc::new(TestPatternSource::new()))),
        )
        .with_description("Generates a moving RGB gradient at a configurable size and frame rate.")
        .with_properties(vec![
            PropertyDescriptor::new("width", "Width", VariantType::U32)
                .with_description("Frame width in pixels.")
                .with_default(Variant::U32(320))
                .with_range(Variant::U32(16), Variant::U32(4096)),
            PropertyDescriptor::new("height", "Height", VariantType::U32)
                .with_description("Frame height in pixels.")
                .with_default(Variant::U32(240))
                .with_range(Variant::U32(16), Variant::U32(4096)),
            PropertyDescriptor::new("frameRate", "Frame Rate", VariantType::F32)
                .with_description("Frames produced per second.")
                .with_default(Variant::F32(30.0))
                .with_range(Variant::F32(0.1), Variant::F32(240.0)),
            PropertyDescriptor::new("frameCount", "Frame Count", VariantType::U32)
                .with_description("Number of frames to produce before stopping; 0 runs forever.")
                .with_default(Variant::U32(0)),
        ]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingListener {
        frames: AtomicUsize,
        last_size: Mutex<(u32, u32)>,
    }

    impl VideoSourceEvents for CountingListener {
        fn on_new_image(&self, image: &PixelBuffer) {
            self.frames.fetch_add(1, Ordering::SeqCst);
            *self.last_size.lock() = (image.width(), image.height());
        }
        fn on_error(&self, _message: &str) {}
    }

    #[test]
    fn test_produces_configured_frames_and_stops() {
        let source = TestPatternSource::new();
        source.set_property(0, Variant::U32(32)).unwrap();
        source.set_property(1, Variant::U32(24)).unwrap();
        source.set_property(2, Variant::F32(200.0)).unwrap();
        source.set_property(3, Variant::U32(5)).unwrap();

        let listener = Arc::new(CountingListener {
            frames: AtomicUsize::new(0),
            last_size: Mutex::new((0, 0)),
        });
        source.set_listener(Some(listener.clone()));

        source.start().unwrap();
        source.wait_for_stop();

        assert!(!source.is_running());
        assert_eq!(listener.frames.load(Ordering::SeqCst), 5);
        assert_eq!(*listener.last_size.lock(), (32, 24));
        assert_eq!(source.frames_received(), 5);
    }

    #[test]
    fn test_signal_to_stop_is_idempotent() {
        let source = TestPatternSource::new();
        source.set_property(2, Variant::F32(240.0)).unwrap();
        source.start().unwrap();

        source.signal_to_stop();
        source.signal_to_stop();
        source.wait_for_stop();
        assert!(!source.is_running());
    }

    #[test]
    fn test_properties_locked_while_running() {
        let source = TestPatternSource::new();
        source.start().unwrap();
        assert!(matches!(
            source.set_property(0, Variant::U32(64)),
            Err(PluginError::CannotSetPropertyWhileRunning)
        ));
        source.wait_for_stop();
    }
}
