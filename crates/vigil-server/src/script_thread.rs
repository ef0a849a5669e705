//! Scripting-Thread Runtime
//!
//! An independent worker that runs a scripting engine's `Main` entry point
//! at a fixed interval, next to (not inside) any video pipeline. The script
//! talks to the rest of the system through the thread variant of the
//! scripting host: named variables work, the per-frame callbacks do not.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};
use vigil_plugin::{PluginError, Result, ScriptingEnginePlugin, ScriptingHost};

use crate::hosts::{RuntimeContext, ThreadHost};
use crate::sync::ManualResetEvent;

pub(crate) struct ScriptThreadRuntime {
    id: u32,
    interval: Duration,
    engine: Arc<dyn ScriptingEnginePlugin>,
    stop: Arc<ManualResetEvent>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

fn thread_loop(
    id: u32,
    interval: Duration,
    engine: Arc<dyn ScriptingEnginePlugin>,
    stop: Arc<ManualResetEvent>,
    context: RuntimeContext,
) {
    let host: Arc<dyn ScriptingHost> = Arc::new(ThreadHost::new(context));
    engine.set_host(host);

    let prepared = engine
        .init()
        .and_then(|()| engine.load_script())
        .and_then(|()| engine.init_script());

    if let Err(code) = prepared {
        let detail = engine.last_error_message();
        warn!(
            thread = id,
            error = %code,
            detail = %detail,
            "scripting thread failed to initialize"
        );
        return;
    }
    info!(thread = id, interval_ms = interval.as_millis() as u64, "scripting thread started");

    loop {
        if stop.wait_timeout(interval) {
            break;
        }

        if let Err(code) = engine.run_script() {
            let detail = engine.last_error_message();
            warn!(thread = id, error = %code, detail = %detail, "script run failed");
        }
    }

    debug!(thread = id, "scripting thread exiting");
}

impl ScriptThreadRuntime {
    pub(crate) fn new(id: u32, engine: Arc<dyn ScriptingEnginePlugin>, interval_ms: u32) -> Self {
        Self {
            id,
            interval: Duration::from_millis(u64::from(interval_ms)),
            engine,
            stop: Arc::new(ManualResetEvent::new()),
            worker: Mutex::new(None),
        }
    }

    pub(crate) fn id(&self) -> u32 {
        self.id
    }

    /// Spawn the worker thread
    ///
    /// # Errors
    ///
    /// `Failed` if the thread cannot be spawned.
    pub(crate) fn start(&self, context: RuntimeContext) -> Result<()> {
        let engine = Arc::clone(&self.engine);
        let stop = Arc::clone(&self.stop);
        let (id, interval) = (self.id, self.interval);

        let handle = std::thread::Builder::new()
            .name(format!("vigil-script-{id}"))
            .spawn(move || thread_loop(id, interval, engine, stop, context))
            .map_err(|e| PluginError::Failed(format!("cannot spawn scripting thread: {e}")))?;

        *self.worker.lock() = Some(handle);
        Ok(())
    }

    /// Ask the worker to stop; non-blocking, idempotent
    pub(crate) fn finalize(&self) {
        self.stop.signal();
    }

    pub(crate) fn is_fully_stopped(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .map_or(true, |handle| handle.is_finished())
    }

    /// Block until the worker has exited
    pub(crate) fn join(&self) {
        if let Some(handle) = self.worker.lock().take() {
            if handle.join().is_err() {
                warn!(thread = self.id, "scripting thread panicked");
            }
        }
    }
}

impl Drop for ScriptThreadRuntime {
    fn drop(&mut self) {
        self.stop.signal();
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
    }
}
