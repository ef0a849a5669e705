//! Automation Server
//!
//! The lifecycle owner of every video-source runtime and scripting-thread
//! runtime, the shared host variable store, and the scripting-host
//! callbacks. A single janitor thread reclaims finalized workers.
//!
//! # Worker lifecycle
//!
//! Workers move through three collections keyed by id: *added* (constructed,
//! not started), *running* and *finalizing*. `finalize_*` detaches a worker
//! and signals its threads without blocking; the janitor removes it once
//! both its threads have exited. Server shutdown finalizes everything and
//! waits for the drain.
//!
//! # Examples
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vigil_server::{AutomationServer, ProcessingGraph, ProcessingStep, ServerConfig};
//!
//! let registry = Arc::new(build_registry());
//! let server = AutomationServer::new(ServerConfig::default())?
//!     .with_registry(registry.clone());
//! server.start()?;
//!
//! let (descriptor, instance) = registry.create_instance_by_name("TestPattern")?;
//! let source = instance.as_video_source().unwrap().clone();
//! let id = server.add_video_source(Arc::new(descriptor), source);
//!
//! let mut graph = ProcessingGraph::new();
//! graph.add_step(ProcessingStep::new("Grayscale", grayscale_guid));
//! server.set_processing_graph(id, graph)?;
//! server.start_video_source(id)?;
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};
use vigil_image::PixelBuffer;
use vigil_plugin::{
    ImageImporterPlugin, PluginDescriptor, PluginError, PluginRegistry, Result,
    ScriptingEnginePlugin, Variant, VideoSourcePlugin,
};

use crate::config::ServerConfig;
use crate::graph::ProcessingGraph;
use crate::hosts::RuntimeContext;
use crate::script_thread::ScriptThreadRuntime;
use crate::source::{SourceRuntime, VideoSourceListener};
use crate::stats::FrameInfo;
use crate::sync::ManualResetEvent;
use crate::variables::{VariableStore, VariablesListener};

#[derive(Default)]
struct ServerState {
    counter: u32,
    added_sources: BTreeMap<u32, Arc<SourceRuntime>>,
    running_sources: BTreeMap<u32, Arc<SourceRuntime>>,
    finalizing_sources: BTreeMap<u32, Arc<SourceRuntime>>,
    added_threads: BTreeMap<u32, Arc<ScriptThreadRuntime>>,
    running_threads: BTreeMap<u32, Arc<ScriptThreadRuntime>>,
    finalizing_threads: BTreeMap<u32, Arc<ScriptThreadRuntime>>,
}

/// Lifecycle owner of all video-source and scripting-thread runtimes
pub struct AutomationServer {
    config: ServerConfig,
    registry: Option<Arc<PluginRegistry>>,
    jpeg_decoder: Option<Arc<dyn ImageImporterPlugin>>,
    store: Arc<VariableStore>,
    state: Arc<Mutex<ServerState>>,
    exit: Arc<ManualResetEvent>,
    janitor: Mutex<Option<JoinHandle<()>>>,
}

fn janitor_loop(state: Arc<Mutex<ServerState>>, exit: Arc<ManualResetEvent>, poll_ms: u64) {
    while !exit.wait_timeout(Duration::from_millis(poll_ms)) {
        let mut s = state.lock();
        s.finalizing_sources.retain(|id, runtime| {
            let done = runtime.is_fully_stopped();
            if done {
                debug!(source = id, "reaped finalized video source");
            }
            !done
        });
        s.finalizing_threads.retain(|id, runtime| {
            let done = runtime.is_fully_stopped();
            if done {
                debug!(thread = id, "reaped finalized scripting thread");
            }
            !done
        });
    }

    // Shutdown: everything still running is finalized, then joined outside
    // the state lock.
    let (sources, threads) = {
        let mut s = state.lock();
        s.added_sources.clear();
        s.added_threads.clear();

        let running_sources: Vec<_> = std::mem::take(&mut s.running_sources).into_values().collect();
        for runtime in &running_sources {
            runtime.finalize();
        }
        let running_threads: Vec<_> = std::mem::take(&mut s.running_threads).into_values().collect();
        for runtime in &running_threads {
            runtime.finalize();
        }

        let mut sources: Vec<_> = std::mem::take(&mut s.finalizing_sources).into_values().collect();
        sources.extend(running_sources);
        let mut threads: Vec<_> = std::mem::take(&mut s.finalizing_threads).into_values().collect();
        threads.extend(running_threads);
        (sources, threads)
    };

    for runtime in &sources {
        runtime.join();
    }
    for runtime in &threads {
        runtime.join();
    }

    info!("automation server drained");
}

impl AutomationServer {
    /// Create a server with the given configuration
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` if the configuration does not validate.
    pub fn new(config: ServerConfig) -> Result<Self> {
        if let Err(issues) = config.validate() {
            return Err(PluginError::InvalidConfiguration(issues.join(", ")));
        }

        info!(host = %config.host_name, "creating automation server");

        Ok(Self {
            config,
            registry: None,
            jpeg_decoder: None,
            store: Arc::new(VariableStore::new()),
            state: Arc::new(Mutex::new(ServerState::default())),
            exit: Arc::new(ManualResetEvent::new()),
            janitor: Mutex::new(None),
        })
    }

    /// Attach the plug-in registry used to instantiate pipeline steps and
    /// answer scripts' `create_plugin` calls
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<PluginRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Attach the decoder used for opaque JPEG frames from video sources
    #[must_use]
    pub fn with_jpeg_decoder(mut self, decoder: Arc<dyn ImageImporterPlugin>) -> Self {
        self.jpeg_decoder = Some(decoder);
        self
    }

    fn context(&self) -> RuntimeContext {
        RuntimeContext {
            host_name: self.config.host_name.clone(),
            host_version: self.config.host_version,
            store: Arc::clone(&self.store),
            registry: self.registry.clone(),
        }
    }

    /// Start the server's janitor thread; idempotent
    ///
    /// # Errors
    ///
    /// `Failed` if the thread cannot be spawned.
    pub fn start(&self) -> Result<()> {
        let mut janitor = self.janitor.lock();
        if janitor.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Ok(());
        }

        self.exit.reset();
        let state = Arc::clone(&self.state);
        let exit = Arc::clone(&self.exit);
        let poll_ms = self.config.janitor_poll_ms;

        let handle = std::thread::Builder::new()
            .name("vigil-janitor".to_string())
            .spawn(move || janitor_loop(state, exit, poll_ms))
            .map_err(|e| PluginError::Failed(format!("cannot spawn janitor thread: {e}")))?;

        *janitor = Some(handle);
        info!("automation server started");
        Ok(())
    }

    /// Ask the server to stop; idempotent, non-blocking
    pub fn signal_to_stop(&self) {
        if self.is_running() {
            self.exit.signal();
        }
    }

    /// Block until every worker has drained and the server has stopped
    pub fn wait_for_stop(&self) {
        self.signal_to_stop();
        if let Some(handle) = self.janitor.lock().take() {
            if handle.join().is_err() {
                warn!("janitor thread panicked");
            }
        }
    }

    /// Whether the server is running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.janitor
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Abandon all workers without waiting for them. Last resort only -
    /// worker threads keep running detached until they notice their stop
    /// flags.
    pub fn terminate(&self) {
        warn!("automation server terminate requested");
        self.exit.signal();
        drop(self.janitor.lock().take());

        if let Some(mut s) = self.state.try_lock() {
            for runtime in s.running_sources.values().chain(s.finalizing_sources.values()) {
                runtime.terminate();
            }
            *s = ServerState::default();
        }
    }

    // ------------------------------------------------------------------
    // Video sources
    // ------------------------------------------------------------------

    /// Add a video source (not yet started); returns its id
    pub fn add_video_source(
        &self,
        descriptor: Arc<PluginDescriptor>,
        source: Arc<dyn VideoSourcePlugin>,
    ) -> u32 {
        let mut s = self.state.lock();
        s.counter += 1;
        let id = s.counter;

        let runtime = Arc::new(SourceRuntime::new(
            id,
            descriptor,
            source,
            self.jpeg_decoder.clone(),
        ));
        s.added_sources.insert(id, runtime);

        debug!(source = id, "video source added");
        id
    }

    /// Set the processing graph of a not-yet-started video source
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the source is unknown or already running.
    pub fn set_processing_graph(&self, source_id: u32, graph: ProcessingGraph) -> Result<()> {
        let s = self.state.lock();
        let runtime = s.added_sources.get(&source_id).ok_or_else(|| {
            PluginError::InvalidArgument(format!("video source {source_id} is not editable"))
        })?;
        runtime.set_graph(graph);
        Ok(())
    }

    /// Start a previously added video source
    ///
    /// On failure the source is removed from the server either way - a
    /// worker that could not get its processing thread cannot be recovered.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for unknown ids, `Failed` if the processing thread
    /// cannot be spawned.
    pub fn start_video_source(&self, source_id: u32) -> Result<()> {
        let mut s = self.state.lock();
        let runtime = s.added_sources.remove(&source_id).ok_or_else(|| {
            PluginError::InvalidArgument(format!("video source {source_id} is not in added state"))
        })?;

        runtime.start(self.context())?;
        s.running_sources.insert(source_id, runtime);
        Ok(())
    }

    /// Start every added video source, logging individual failures
    pub fn start_all_video_sources(&self) {
        let ids: Vec<u32> = self.state.lock().added_sources.keys().copied().collect();
        for id in ids {
            if let Err(e) = self.start_video_source(id) {
                warn!(source = id, error = %e, "failed starting video source");
            }
        }
    }

    /// Move a video source into finalization
    ///
    /// A running source is detached and signalled to stop; the janitor reaps
    /// it once its threads exit. A source that never ran is simply removed.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for unknown ids.
    pub fn finalize_video_source(&self, source_id: u32) -> Result<()> {
        let runtime = {
            let mut s = self.state.lock();
            if let Some(runtime) = s.running_sources.remove(&source_id) {
                s.finalizing_sources.insert(source_id, Arc::clone(&runtime));
                Some(runtime)
            } else if s.added_sources.remove(&source_id).is_some() {
                None
            } else {
                return Err(PluginError::InvalidArgument(format!(
                    "unknown video source {source_id}"
                )));
            }
        };

        if let Some(runtime) = runtime {
            runtime.finalize();
        }
        Ok(())
    }

    fn running_source(&self, source_id: u32) -> Result<Arc<SourceRuntime>> {
        self.state
            .lock()
            .running_sources
            .get(&source_id)
            .cloned()
            .ok_or_else(|| {
                PluginError::InvalidArgument(format!("video source {source_id} is not running"))
            })
    }

    /// The live video-source plug-in of a running source
    #[must_use]
    pub fn running_video_source(&self, source_id: u32) -> Option<Arc<dyn VideoSourcePlugin>> {
        self.state
            .lock()
            .running_sources
            .get(&source_id)
            .map(|runtime| runtime.source())
    }

    /// Snapshot a running source's frame counters and geometry
    pub fn video_source_frame_info(&self, source_id: u32) -> Result<FrameInfo> {
        Ok(self.running_source(source_id)?.frame_info())
    }

    /// Enable or disable the processing performance monitor of a source
    ///
    /// Takes effect at the next frame boundary.
    pub fn enable_performance_monitor(&self, source_id: u32, enable: bool) -> Result<()> {
        self.running_source(source_id)?.set_performance_monitor(enable);
        Ok(())
    }

    /// Enable or disable frame dropping when the processing thread is busy
    pub fn enable_frame_dropping(&self, source_id: u32, enable: bool) -> Result<()> {
        self.running_source(source_id)?.set_frame_dropping(enable);
        Ok(())
    }

    /// Average per-step processing times (ms) and the whole-graph average
    ///
    /// Meaningful only while the performance monitor is enabled.
    pub fn video_processing_graph_timing(&self, source_id: u32) -> Result<(Vec<f32>, f32)> {
        Ok(self.running_source(source_id)?.graph_timing())
    }

    /// Snapshot the live configuration of one running pipeline step
    pub fn step_configuration(
        &self,
        source_id: u32,
        step_index: usize,
    ) -> Result<BTreeMap<String, Variant>> {
        self.running_source(source_id)?.step_configuration(step_index)
    }

    /// Queue a configuration update for one running pipeline step
    ///
    /// The source's processing thread applies it at the end of the current
    /// frame.
    pub fn set_step_configuration(
        &self,
        source_id: u32,
        step_index: usize,
        configuration: BTreeMap<String, Variant>,
    ) -> Result<()> {
        self.running_source(source_id)?
            .stash_step_configuration(step_index, configuration)
    }

    /// Subscribe a listener to a source's processed frames and errors
    ///
    /// On a running source, `notify_with_recent` immediately delivers the
    /// most recent frame and/or error, when available without blocking.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for unknown ids.
    pub fn add_video_source_listener(
        &self,
        source_id: u32,
        listener: Arc<dyn VideoSourceListener>,
        notify_with_recent: bool,
    ) -> Result<()> {
        let (runtime, running) = {
            let s = self.state.lock();
            if let Some(runtime) = s.added_sources.get(&source_id) {
                (Arc::clone(runtime), false)
            } else if let Some(runtime) = s.running_sources.get(&source_id) {
                (Arc::clone(runtime), true)
            } else {
                return Err(PluginError::InvalidArgument(format!(
                    "unknown video source {source_id}"
                )));
            }
        };

        runtime.add_listener(listener, notify_with_recent, running);
        Ok(())
    }

    /// Unsubscribe a listener from a source
    pub fn remove_video_source_listener(
        &self,
        source_id: u32,
        listener: &Arc<dyn VideoSourceListener>,
    ) {
        let runtime = {
            let s = self.state.lock();
            s.added_sources
                .get(&source_id)
                .or_else(|| s.running_sources.get(&source_id))
                .cloned()
        };
        if let Some(runtime) = runtime {
            runtime.remove_listener(listener);
        }
    }

    /// Number of video sources in (added, running, finalizing) state
    #[must_use]
    pub fn video_source_count(&self) -> (u32, u32, u32) {
        let s = self.state.lock();
        (
            s.added_sources.len() as u32,
            s.running_sources.len() as u32,
            s.finalizing_sources.len() as u32,
        )
    }

    // ------------------------------------------------------------------
    // Scripting threads
    // ------------------------------------------------------------------

    /// Add a scripting thread running the engine's `Main` every
    /// `interval_ms` milliseconds; returns its id
    pub fn add_thread(&self, engine: Arc<dyn ScriptingEnginePlugin>, interval_ms: u32) -> u32 {
        let mut s = self.state.lock();
        s.counter += 1;
        let id = s.counter;

        s.added_threads
            .insert(id, Arc::new(ScriptThreadRuntime::new(id, engine, interval_ms)));
        debug!(thread = id, interval_ms, "scripting thread added");
        id
    }

    /// Start a previously added scripting thread
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for unknown ids, `Failed` if the worker thread
    /// cannot be spawned.
    pub fn start_thread(&self, thread_id: u32) -> Result<()> {
        let mut s = self.state.lock();
        let runtime = s.added_threads.remove(&thread_id).ok_or_else(|| {
            PluginError::InvalidArgument(format!("thread {thread_id} is not in added state"))
        })?;

        runtime.start(self.context())?;
        s.running_threads.insert(thread_id, runtime);
        Ok(())
    }

    /// Start every added scripting thread, logging individual failures
    pub fn start_all_threads(&self) {
        let ids: Vec<u32> = self.state.lock().added_threads.keys().copied().collect();
        for id in ids {
            if let Err(e) = self.start_thread(id) {
                warn!(thread = id, error = %e, "failed starting scripting thread");
            }
        }
    }

    /// Move a scripting thread into finalization
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for unknown ids.
    pub fn finalize_thread(&self, thread_id: u32) -> Result<()> {
        let mut s = self.state.lock();
        if let Some(runtime) = s.running_threads.remove(&thread_id) {
            runtime.finalize();
            s.finalizing_threads.insert(thread_id, runtime);
            Ok(())
        } else if s.added_threads.remove(&thread_id).is_some() {
            Ok(())
        } else {
            Err(PluginError::InvalidArgument(format!("unknown thread {thread_id}")))
        }
    }

    // ------------------------------------------------------------------
    // Shared variable store
    // ------------------------------------------------------------------

    /// Read a shared variable; absent names read as [`Variant::Empty`]
    #[must_use]
    pub fn variable(&self, name: &str) -> Variant {
        self.store.variable(name)
    }

    /// Write a shared variable (see [`VariableStore::set_variable`])
    pub fn set_variable(&self, name: &str, value: Variant) {
        self.store.set_variable(name, value);
    }

    /// Read a shared image variable
    #[must_use]
    pub fn image_variable(&self, name: &str) -> Option<PixelBuffer> {
        self.store.image_variable(name)
    }

    /// Write a shared image variable; `None` removes the name
    pub fn set_image_variable(&self, name: &str, image: Option<PixelBuffer>) {
        self.store.set_image_variable(name, image);
    }

    /// Remove every shared variable
    pub fn clear_all_variables(&self) {
        self.store.clear_all();
    }

    /// Install a listener observing shared-variable changes
    pub fn set_variables_listener(
        &self,
        listener: Arc<dyn VariablesListener>,
        notify_existing: bool,
    ) {
        self.store.set_listener(Some(listener), notify_existing);
    }

    /// Stop observing shared-variable changes
    pub fn clear_variables_listener(&self) {
        self.store.set_listener(None, false);
    }
}

impl Drop for AutomationServer {
    fn drop(&mut self) {
        if self.is_running() {
            self.wait_for_stop();
        }
    }
}

impl std::fmt::Debug for AutomationServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = self.state.lock();
        f.debug_struct("AutomationServer")
            .field("host_name", &self.config.host_name)
            .field("running", &(s.running_sources.len() + s.running_threads.len()))
            .field("finalizing", &(s.finalizing_sources.len() + s.finalizing_threads.len()))
            .finish_non_exhaustive()
    }
}
