//! Video-Source Runtime
//!
//! The per-source state machine bridging an asynchronous frame producer (a
//! thread inside the video-source plug-in, outside our control) to the
//! single-threaded consumer that runs the processing pipeline.
//!
//! Two manual-reset events sit between the threads:
//!
//! - `new_frame` - set by the producer after storing a frame in slot 0 of
//!   the reuse ring, consumed edge-wise by the consumer;
//! - `consumer_idle` - set while the consumer waits, cleared while it
//!   processes.
//!
//! When a frame arrives while the consumer is busy, the runtime either
//! drops it (drop-when-busy policy) or stalls the producer until the
//! consumer is idle again, so at most one frame is ever in flight.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use tracing::{debug, info, warn};
use vigil_image::{PixelBuffer, PixelFormat};
use vigil_plugin::{
    ImageImporterPlugin, PluginDescriptor, PluginError, Result, ScriptingHost, Variant,
    VideoSourceEvents, VideoSourcePlugin,
};

use crate::graph::ProcessingGraph;
use crate::hosts::{PipelineHost, RuntimeContext};
use crate::pipeline::{FrameOutcome, PreparedPipeline};
use crate::stats::{FrameInfo, PerformanceMonitor};
use crate::sync::ManualResetEvent;

/// Observer of one video source's processed frames and errors
///
/// Delivery is synchronous on the source's processing thread, in the order
/// frames entered it.
pub trait VideoSourceListener: Send + Sync {
    /// A processed frame is available; the buffer is only valid for the call
    fn on_new_frame(&self, source_id: u32, frame: &PixelBuffer);

    /// An error occurred; processing continues with the next frame
    fn on_error(&self, source_id: u32, message: &str);
}

struct ListenerState {
    listeners: Vec<Arc<dyn VideoSourceListener>>,
    last_error: String,
}

struct ProcessingState {
    graph: ProcessingGraph,
    prepared: Option<PreparedPipeline>,
    // Buffer reuse ring: slot 0 holds the incoming frame, later slots the
    // outputs of producing steps. Grows, never shrinks.
    ring: Vec<Option<PixelBuffer>>,
    current: usize,
    monitor: PerformanceMonitor,
}

struct FrameState {
    info: FrameInfo,
    monitor_request: bool,
    step_averages: Vec<f32>,
    graph_average: f32,
    drop_when_busy: bool,
    pending_config: BTreeMap<usize, BTreeMap<String, Variant>>,
}

pub(crate) struct SourceShared {
    id: u32,
    descriptor: Arc<PluginDescriptor>,
    source: Arc<dyn VideoSourcePlugin>,
    jpeg_decoder: Option<Arc<dyn ImageImporterPlugin>>,
    graph_len: AtomicUsize,

    listeners: Mutex<ListenerState>,
    processing: Mutex<ProcessingState>,
    frame_state: Mutex<FrameState>,
    // Hand-off slot for script steps; never locked together with `processing`
    // from the consumer's side except around a script call.
    frame_cell: Arc<Mutex<Option<PixelBuffer>>>,

    new_frame: ManualResetEvent,
    consumer_idle: ManualResetEvent,
    need_to_exit: AtomicBool,
}

impl SourceShared {
    /// Store the error and fan it out to listeners
    ///
    /// The listener list is snapshotted under the listener lock and the
    /// callbacks run outside it, so a listener may add or remove listeners
    /// from its handler without deadlocking.
    fn report_error(&self, message: &str) {
        let snapshot = {
            let mut listeners = self.listeners.lock();
            listeners.last_error = message.to_string();
            listeners.listeners.clone()
        };
        for listener in snapshot {
            listener.on_error(self.id, message);
        }
    }

    fn notify_new_frame(&self, frame: &PixelBuffer) {
        let snapshot = self.listeners.lock().listeners.clone();
        for listener in snapshot {
            listener.on_new_frame(self.id, frame);
        }
    }

    /// Process the frame currently in the ring and publish the result
    fn process_frame(&self) {
        let mut processing = self.processing.lock();
        let state = &mut *processing;

        let Some(original) = state.ring.first().and_then(Option::as_ref) else {
            return;
        };
        let (original_width, original_height, original_format) =
            (original.width(), original.height(), original.format());

        let timing = state.monitor.is_running();
        let outcome = match state.prepared.as_mut() {
            Some(prepared) if prepared.len() > 0 => {
                prepared.run_frame(&mut state.ring, &mut state.current, &self.frame_cell, timing)
            }
            _ => FrameOutcome::default(),
        };

        for (index, millis) in &outcome.step_times {
            state.monitor.record_step(*index, *millis);
        }
        if timing {
            state.monitor.record_graph(outcome.graph_time);
        }

        let processed = state.ring.get(state.current).and_then(Option::as_ref);
        let (processed_width, processed_height, processed_format) = processed
            .map(|b| (b.width(), b.height(), Some(b.format())))
            .unwrap_or_default();

        // Short frame-info section: counters, monitor boundary, pending
        // configuration pickup.
        let pending = {
            let mut frame_state = self.frame_state.lock();
            let info = &mut frame_state.info;
            info.original_width = original_width;
            info.original_height = original_height;
            info.original_format = Some(original_format);
            info.processed_width = processed_width;
            info.processed_height = processed_height;
            info.processed_format = processed_format;
            info.steps_completed = outcome.steps_completed;

            let steps = state.prepared.as_ref().map_or(0, PreparedPipeline::len);
            state.monitor.sync_request(frame_state.monitor_request, steps);
            if state.monitor.is_running() {
                let (step_averages, graph_average) = state.monitor.averages();
                frame_state.step_averages = step_averages;
                frame_state.graph_average = graph_average;
            }

            std::mem::take(&mut frame_state.pending_config)
        };

        if let Some(prepared) = state.prepared.as_mut() {
            for (index, configuration) in &pending {
                if let Some(step) = prepared.step_mut(*index) {
                    debug!(source = self.id, step = index, "applying live configuration update");
                    step.apply_configuration(configuration);
                }
            }
        }

        // The frame is published even when the graph stopped early.
        if let Some(frame) = state.ring.get(state.current).and_then(Option::as_ref) {
            self.notify_new_frame(frame);
        }

        if let Some(error) = &outcome.error {
            self.report_error(error);
        }
    }
}

// The producer-side listener handed to the video-source plug-in.
struct ProducerBridge {
    shared: Arc<SourceShared>,
}

impl VideoSourceEvents for ProducerBridge {
    fn on_new_image(&self, image: &PixelBuffer) {
        let shared = &self.shared;
        if shared.need_to_exit.load(Ordering::Acquire) {
            return;
        }

        // Backpressure: drop the frame or stall until the consumer is idle.
        if !shared.consumer_idle.is_signaled() {
            if shared.frame_state.lock().drop_when_busy {
                shared.frame_state.lock().info.frames_dropped += 1;
                return;
            }
            shared.frame_state.lock().info.frames_blocked += 1;
            shared.consumer_idle.wait();
        }
        shared.frame_state.lock().info.frames_received += 1;

        // Opaque JPEG payloads are decoded before entering the ring.
        let decoded;
        let frame: &PixelBuffer = if image.format() == PixelFormat::Jpeg {
            match shared.jpeg_decoder.as_deref() {
                Some(decoder) => match decoder.decode(image.data()) {
                    Ok(buffer) => {
                        decoded = buffer;
                        &decoded
                    }
                    Err(e) => {
                        shared.report_error(&format!("Failed decoding video frame: {e}"));
                        return;
                    }
                },
                None => {
                    shared.report_error("Received a JPEG frame but no decoder is configured");
                    return;
                }
            }
        } else {
            image
        };

        {
            let mut processing = shared.processing.lock();
            let state = &mut *processing;
            if state.ring.is_empty() {
                state.ring.push(None);
            }
            if frame.copy_data_or_clone(&mut state.ring[0]).is_err() {
                drop(processing);
                shared.report_error("Not enough memory to get video frame");
                return;
            }
            state.current = 0;
        }

        shared.listeners.lock().last_error.clear();
        shared.new_frame.signal();
    }

    fn on_error(&self, message: &str) {
        self.shared.report_error(message);
    }
}

fn consumer_loop(shared: Arc<SourceShared>, context: RuntimeContext) {
    // Wire the producer bridge before the source starts; no frame can be
    // missed because frames only flow after `start`.
    let bridge = Arc::new(ProducerBridge { shared: Arc::clone(&shared) });
    shared.source.set_listener(Some(bridge));

    // The pipeline is instantiated lazily, on this thread.
    {
        let host: Arc<dyn ScriptingHost> = Arc::new(PipelineHost::new(
            context.clone(),
            Arc::clone(&shared.frame_cell),
            Arc::clone(&shared.descriptor),
            Arc::clone(&shared.source),
        ));

        let mut processing = shared.processing.lock();
        let (prepared, first_error) =
            PreparedPipeline::prepare(&processing.graph, context.registry.as_ref(), &host);
        processing.prepared = Some(prepared);
        drop(processing);

        if let Some(message) = first_error {
            shared.report_error(&message);
        }
    }

    if let Err(code) = shared.source.start() {
        shared.report_error(&format!("Failed starting video source: {code}"));
        return;
    }
    info!(source = shared.id, "video source started");

    shared.consumer_idle.signal();
    while !shared.need_to_exit.load(Ordering::Acquire) {
        shared.new_frame.wait();
        shared.new_frame.reset();
        if shared.need_to_exit.load(Ordering::Acquire) {
            break;
        }

        shared.consumer_idle.reset();
        shared.process_frame();
        shared.consumer_idle.signal();
    }

    debug!(source = shared.id, "processing thread exiting");
}

/// The per-source runtime: shared state plus the consumer thread handle
pub(crate) struct SourceRuntime {
    shared: Arc<SourceShared>,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl SourceRuntime {
    pub(crate) fn new(
        id: u32,
        descriptor: Arc<PluginDescriptor>,
        source: Arc<dyn VideoSourcePlugin>,
        jpeg_decoder: Option<Arc<dyn ImageImporterPlugin>>,
    ) -> Self {
        Self {
            shared: Arc::new(SourceShared {
                id,
                descriptor,
                source,
                jpeg_decoder,
                graph_len: AtomicUsize::new(0),
                listeners: Mutex::new(ListenerState {
                    listeners: Vec::new(),
                    last_error: String::new(),
                }),
                processing: Mutex::new(ProcessingState {
                    graph: ProcessingGraph::new(),
                    prepared: None,
                    ring: Vec::new(),
                    current: 0,
                    monitor: PerformanceMonitor::default(),
                }),
                frame_state: Mutex::new(FrameState {
                    info: FrameInfo::default(),
                    monitor_request: false,
                    step_averages: Vec::new(),
                    graph_average: 0.0,
                    drop_when_busy: false,
                    pending_config: BTreeMap::new(),
                }),
                frame_cell: Arc::new(Mutex::new(None)),
                new_frame: ManualResetEvent::new(),
                consumer_idle: ManualResetEvent::new(),
                need_to_exit: AtomicBool::new(false),
            }),
            consumer: Mutex::new(None),
        }
    }

    pub(crate) fn id(&self) -> u32 {
        self.shared.id
    }

    pub(crate) fn source(&self) -> Arc<dyn VideoSourcePlugin> {
        Arc::clone(&self.shared.source)
    }

    /// Replace the processing graph; only meaningful before `start`
    pub(crate) fn set_graph(&self, graph: ProcessingGraph) {
        self.shared.graph_len.store(graph.len(), Ordering::Release);
        self.shared.processing.lock().graph = graph;
    }

    pub(crate) fn graph_len(&self) -> usize {
        self.shared.graph_len.load(Ordering::Acquire)
    }

    /// Spawn the consumer thread, which wires the producer bridge, prepares
    /// the pipeline and starts the source plug-in
    ///
    /// # Errors
    ///
    /// `Failed` if the consumer thread cannot be spawned. A failure of the
    /// source plug-in's own `start` is reported to listeners from the
    /// consumer thread.
    pub(crate) fn start(&self, context: RuntimeContext) -> Result<()> {
        let shared = Arc::clone(&self.shared);
        let handle = std::thread::Builder::new()
            .name(format!("vigil-source-{}", self.shared.id))
            .spawn(move || consumer_loop(shared, context))
            .map_err(|e| PluginError::Failed(format!("cannot spawn processing thread: {e}")))?;

        *self.consumer.lock() = Some(handle);
        Ok(())
    }

    pub(crate) fn add_listener(
        &self,
        listener: Arc<dyn VideoSourceListener>,
        notify_with_recent: bool,
        running: bool,
    ) {
        self.shared.listeners.lock().listeners.push(Arc::clone(&listener));

        if running && notify_with_recent {
            // Recent frame under a try-lock so a long-running frame never
            // blocks registration.
            if let Some(processing) = self.shared.processing.try_lock() {
                if let Some(frame) = processing.ring.get(processing.current).and_then(Option::as_ref)
                {
                    listener.on_new_frame(self.shared.id, frame);
                }
            }

            let last_error = self.shared.listeners.lock().last_error.clone();
            if !last_error.is_empty() {
                listener.on_error(self.shared.id, &last_error);
            }
        }
    }

    pub(crate) fn remove_listener(&self, listener: &Arc<dyn VideoSourceListener>) {
        self.shared
            .listeners
            .lock()
            .listeners
            .retain(|existing| !Arc::ptr_eq(existing, listener));
    }

    /// Detach listeners, signal both threads to stop; non-blocking
    pub(crate) fn finalize(&self) {
        info!(source = self.shared.id, "finalizing video source");

        self.shared.need_to_exit.store(true, Ordering::Release);
        self.shared.new_frame.signal();

        self.shared.listeners.lock().listeners.clear();
        self.shared.source.set_listener(None);
        self.shared.source.signal_to_stop();
    }

    /// Whether both the source plug-in's thread and the consumer have exited
    pub(crate) fn is_fully_stopped(&self) -> bool {
        !self.shared.source.is_running()
            && self
                .consumer
                .lock()
                .as_ref()
                .map_or(true, |handle| handle.is_finished())
    }

    /// Block until both threads have exited
    pub(crate) fn join(&self) {
        self.shared.source.wait_for_stop();
        if let Some(handle) = self.consumer.lock().take() {
            if handle.join().is_err() {
                warn!(source = self.shared.id, "processing thread panicked");
            }
        }
    }

    /// Abandon both threads without waiting. Last resort only.
    pub(crate) fn terminate(&self) {
        self.shared.need_to_exit.store(true, Ordering::Release);
        self.shared.new_frame.signal();
        self.shared.source.terminate();
        drop(self.consumer.lock().take());
    }

    pub(crate) fn frame_info(&self) -> FrameInfo {
        self.shared.frame_state.lock().info
    }

    pub(crate) fn graph_timing(&self) -> (Vec<f32>, f32) {
        let frame_state = self.shared.frame_state.lock();
        (frame_state.step_averages.clone(), frame_state.graph_average)
    }

    pub(crate) fn set_performance_monitor(&self, enable: bool) {
        self.shared.frame_state.lock().monitor_request = enable;
    }

    pub(crate) fn set_frame_dropping(&self, enable: bool) {
        self.shared.frame_state.lock().drop_when_busy = enable;
    }

    /// Stash a configuration update; the consumer applies it at frame end
    pub(crate) fn stash_step_configuration(
        &self,
        step_index: usize,
        configuration: BTreeMap<String, Variant>,
    ) -> Result<()> {
        if step_index >= self.graph_len() {
            return Err(PluginError::IndexOutOfBounds);
        }
        self.shared
            .frame_state
            .lock()
            .pending_config
            .insert(step_index, configuration);
        Ok(())
    }

    /// Snapshot the live configuration of one instantiated step
    pub(crate) fn step_configuration(
        &self,
        step_index: usize,
    ) -> Result<BTreeMap<String, Variant>> {
        let processing = self.shared.processing.lock();
        let prepared = processing
            .prepared
            .as_ref()
            .ok_or_else(|| PluginError::InvalidConfiguration("pipeline not running".to_string()))?;
        prepared
            .step(step_index)
            .ok_or(PluginError::IndexOutOfBounds)?
            .configuration()
            .ok_or_else(|| PluginError::InvalidConfiguration("step failed to instantiate".to_string()))
    }
}

impl Drop for SourceRuntime {
    fn drop(&mut self) {
        self.shared.need_to_exit.store(true, Ordering::Release);
        self.shared.new_frame.signal();
        if let Some(handle) = self.consumer.lock().take() {
            let _ = handle.join();
        }
    }
}
