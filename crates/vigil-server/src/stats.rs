//! Frame Statistics and the Performance Monitor
//!
//! [`FrameInfo`] is the per-source counter snapshot readable at any time
//! under a short lock. The performance monitor keeps sliding windows of the
//! most recent step and whole-graph durations and exposes their arithmetic
//! means; enabling or disabling it takes effect at the next frame boundary.

use vigil_image::PixelFormat;

/// Number of samples each timing series keeps
pub const PERFORMANCE_HISTORY_LENGTH: usize = 40;

/// Snapshot of one video source's frame counters and geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameInfo {
    /// Frames accepted from the source
    pub frames_received: u32,
    /// Frames discarded because the processing thread was busy
    pub frames_dropped: u32,
    /// Frames whose delivery stalled the source's producer thread
    pub frames_blocked: u32,
    /// Width of the most recent incoming frame
    pub original_width: u32,
    /// Height of the most recent incoming frame
    pub original_height: u32,
    /// Pixel format of the most recent incoming frame
    pub original_format: Option<PixelFormat>,
    /// Width after the processing graph ran
    pub processed_width: u32,
    /// Height after the processing graph ran
    pub processed_height: u32,
    /// Pixel format after the processing graph ran
    pub processed_format: Option<PixelFormat>,
    /// Graph steps completed for the most recent frame
    pub steps_completed: u32,
}

// Fixed-size ring of the most recent samples.
#[derive(Debug, Clone, Default)]
struct SlidingWindow {
    samples: Vec<f32>,
    next: usize,
}

impl SlidingWindow {
    fn push(&mut self, value: f32) {
        if self.samples.len() < PERFORMANCE_HISTORY_LENGTH {
            self.samples.push(value);
        } else {
            self.samples[self.next] = value;
            self.next = (self.next + 1) % PERFORMANCE_HISTORY_LENGTH;
        }
    }

    fn mean(&self) -> f32 {
        if self.samples.is_empty() {
            0.0
        } else {
            self.samples.iter().sum::<f32>() / self.samples.len() as f32
        }
    }
}

/// Sliding-window timing of a processing graph
///
/// Owned by the source's processing thread; only the computed averages leave
/// it, through the frame-info lock.
#[derive(Debug, Default)]
pub(crate) struct PerformanceMonitor {
    running: bool,
    step_windows: Vec<SlidingWindow>,
    graph_window: SlidingWindow,
}

impl PerformanceMonitor {
    /// Whether samples are being collected for the current frame
    pub(crate) fn is_running(&self) -> bool {
        self.running
    }

    /// Apply the externally requested enable state at a frame boundary
    ///
    /// Turning the monitor on resets all series for a graph of `steps`
    /// steps; turning it off keeps the last averages readable.
    pub(crate) fn sync_request(&mut self, requested: bool, steps: usize) {
        if requested && !self.running {
            self.step_windows = vec![SlidingWindow::default(); steps];
            self.graph_window = SlidingWindow::default();
        }
        self.running = requested;
    }

    /// Record the duration of one step of the current frame, in milliseconds
    pub(crate) fn record_step(&mut self, step: usize, millis: f32) {
        if let Some(window) = self.step_windows.get_mut(step) {
            window.push(millis);
        }
    }

    /// Record the whole-graph duration of the current frame, in milliseconds
    pub(crate) fn record_graph(&mut self, millis: f32) {
        self.graph_window.push(millis);
    }

    /// Arithmetic means of every step series and of the whole-graph series
    pub(crate) fn averages(&self) -> (Vec<f32>, f32) {
        (
            self.step_windows.iter().map(SlidingWindow::mean).collect(),
            self.graph_window.mean(),
        )
    }
}
