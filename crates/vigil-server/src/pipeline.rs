//! Pipeline Instantiation and Per-Frame Execution
//!
//! A [`ProcessingGraph`](crate::ProcessingGraph) is plain data until the
//! owning source's processing thread instantiates it: each step's plug-in is
//! created through the registry, its persisted configuration applied, and -
//! for scripting steps - the host wired and the script loaded. A step that
//! fails instantiation is recorded and reports the same error on every
//! frame without executing.
//!
//! Per-frame execution walks the steps in order over the buffer reuse ring:
//! in-place steps transform the current slot, producing steps advance to the
//! next slot (reusing its allocation when geometry matches), script steps
//! exchange the frame through the host's frame cell. The ring only ever
//! grows, so steady-state frames allocate nothing.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, trace};
use vigil_image::PixelBuffer;
use vigil_plugin::{
    second_image_size_ok, PluginError, PluginInstance, PluginRegistry, ScriptingHost,
};

use crate::graph::ProcessingGraph;

// Outcome of instantiating one step.
enum StepState {
    Ready {
        descriptor: vigil_plugin::PluginDescriptor,
        instance: PluginInstance,
    },
    Failed {
        message: String,
    },
}

/// One instantiated step of a prepared pipeline
pub(crate) struct PreparedStep {
    name: String,
    state: StepState,
}

impl PreparedStep {
    /// Apply a configuration map to the live instance
    pub(crate) fn apply_configuration(
        &mut self,
        configuration: &std::collections::BTreeMap<String, vigil_plugin::Variant>,
    ) {
        if let StepState::Ready { descriptor, instance } = &mut self.state {
            descriptor.apply_configuration(instance.as_plugin(), configuration);
        }
    }

    /// Snapshot the live instance's configuration
    pub(crate) fn configuration(
        &self,
    ) -> Option<std::collections::BTreeMap<String, vigil_plugin::Variant>> {
        match &self.state {
            StepState::Ready { descriptor, instance } => {
                Some(descriptor.get_plugin_configuration(instance.as_plugin()))
            }
            StepState::Failed { .. } => None,
        }
    }
}

/// Result of processing one frame
#[derive(Debug, Default)]
pub(crate) struct FrameOutcome {
    /// Steps that completed successfully
    pub steps_completed: u32,
    /// First error hit, already formatted for listeners
    pub error: Option<String>,
    /// Per-step durations in milliseconds (when timing was on)
    pub step_times: Vec<(usize, f32)>,
    /// Whole-graph duration in milliseconds (when timing was on)
    pub graph_time: f32,
}

/// A processing graph instantiated on its owning processing thread
pub(crate) struct PreparedPipeline {
    steps: Vec<PreparedStep>,
}

impl PreparedPipeline {
    /// Instantiate every step of `graph`
    ///
    /// Failures do not abort preparation: the failing step records its error
    /// and later steps still instantiate, mirroring how a half-broken graph
    /// should keep reporting a precise error without hiding the rest.
    /// Returns the pipeline together with the first error message, if any.
    pub(crate) fn prepare(
        graph: &ProcessingGraph,
        registry: Option<&Arc<PluginRegistry>>,
        host: &Arc<dyn ScriptingHost>,
    ) -> (Self, Option<String>) {
        let mut steps = Vec::with_capacity(graph.len());
        let mut first_error = None;

        for step in graph {
            let state = match instantiate_step(step, registry, host) {
                Ok((descriptor, instance)) => StepState::Ready { descriptor, instance },
                Err(message) => {
                    debug!(step = step.name(), %message, "step failed to instantiate");
                    if first_error.is_none() {
                        first_error = Some(message.clone());
                    }
                    StepState::Failed { message }
                }
            };

            steps.push(PreparedStep { name: step.name().to_string(), state });
        }

        (Self { steps }, first_error)
    }

    /// Number of steps (including failed ones)
    pub(crate) fn len(&self) -> usize {
        self.steps.len()
    }

    /// Mutable access to a step, for live reconfiguration
    pub(crate) fn step_mut(&mut self, index: usize) -> Option<&mut PreparedStep> {
        self.steps.get_mut(index)
    }

    /// Immutable access to a step
    pub(crate) fn step(&self, index: usize) -> Option<&PreparedStep> {
        self.steps.get(index)
    }

    /// Run every step over the frame in `ring[*current]`
    ///
    /// `ring` is the buffer reuse ring with the incoming frame in slot 0;
    /// `current` tracks which slot holds the frame as producing steps
    /// advance it. `frame_cell` is the hand-off slot scripts reach through
    /// their host. With `timing`, per-step and whole-graph durations are
    /// collected into the outcome.
    pub(crate) fn run_frame(
        &mut self,
        ring: &mut Vec<Option<PixelBuffer>>,
        current: &mut usize,
        frame_cell: &Arc<Mutex<Option<PixelBuffer>>>,
        timing: bool,
    ) -> FrameOutcome {
        let mut outcome = FrameOutcome::default();
        let mut next_slot = *current;
        let graph_started = Instant::now();

        for (index, step) in self.steps.iter().enumerate() {
            let instance = match &step.state {
                StepState::Failed { message } => {
                    outcome.error = Some(message.clone());
                    break;
                }
                StepState::Ready { instance, .. } => instance,
            };

            let step_started = Instant::now();
            let result = dispatch_step(instance, ring, current, &mut next_slot, frame_cell);
            if timing {
                outcome
                    .step_times
                    .push((index, step_started.elapsed().as_secs_f32() * 1000.0));
            }

            match result {
                Ok(()) => {
                    trace!(step = %step.name, "step completed");
                    outcome.steps_completed += 1;
                }
                Err(PluginError::UnsupportedPixelFormat) => {
                    outcome.error =
                        Some(format!("Step \"{}\" cannot accept image format.", step.name));
                    break;
                }
                Err(code @ PluginError::FailedRunningScript) => {
                    // Prefer the engine's own diagnostic over the generic text.
                    let detail = instance
                        .as_scripting_engine()
                        .map(|engine| engine.last_error_message())
                        .filter(|message| !message.is_empty())
                        .unwrap_or_else(|| code.to_string());
                    outcome.error = Some(format!("Error in \"{}\": {detail}", step.name));
                    break;
                }
                Err(code) => {
                    outcome.error = Some(format!("Error in \"{}\": {code}", step.name));
                    break;
                }
            }
        }

        if timing {
            outcome.graph_time = graph_started.elapsed().as_secs_f32() * 1000.0;
        }

        outcome
    }
}

fn instantiate_step(
    step: &crate::graph::ProcessingStep,
    registry: Option<&Arc<PluginRegistry>>,
    host: &Arc<dyn ScriptingHost>,
) -> Result<(vigil_plugin::PluginDescriptor, PluginInstance), String> {
    let Some(registry) = registry else {
        return Err(format!(
            "Failed creating instance of \"{}\": no plug-in registry",
            step.name()
        ));
    };

    let (mut descriptor, instance) = registry
        .create_instance(step.plugin_id())
        .map_err(|_| format!("Failed creating instance of \"{}\"", step.name()))?;

    descriptor.apply_configuration(instance.as_plugin(), step.configuration());

    match &instance {
        PluginInstance::ScriptingEngine(engine) => {
            // The host is wired before any engine call so even top-level
            // script code can reach it.
            engine.set_host(Arc::clone(host));

            let initialized = engine
                .init()
                .and_then(|()| engine.load_script())
                .and_then(|()| engine.init_script());

            if let Err(code) = initialized {
                let detail = match code {
                    PluginError::FailedLoadingScript | PluginError::FailedRunningScript => {
                        let message = engine.last_error_message();
                        if message.is_empty() { code.to_string() } else { message }
                    }
                    other => other.to_string(),
                };
                return Err(format!("Error in \"{}\": {detail}", step.name()));
            }
        }
        PluginInstance::VideoProcessing(processor) => processor.reset(),
        PluginInstance::Detection(detector) => detector.reset(),
        _ => {}
    }

    Ok((descriptor, instance))
}

fn dispatch_step(
    instance: &PluginInstance,
    ring: &mut Vec<Option<PixelBuffer>>,
    current: &mut usize,
    next_slot: &mut usize,
    frame_cell: &Arc<Mutex<Option<PixelBuffer>>>,
) -> Result<(), PluginError> {
    let current_format = ring
        .get(*current)
        .and_then(Option::as_ref)
        .map(PixelBuffer::format)
        .ok_or_else(|| PluginError::Failed("no frame in the processing ring".to_string()))?;

    match instance {
        PluginInstance::ImageFilter(filter) => {
            if !filter.is_format_supported(current_format) {
                return Err(PluginError::UnsupportedPixelFormat);
            }

            if filter.can_process_in_place() {
                let buffer = slot_mut(ring, *current)?;
                filter.process_in_place(buffer)
            } else {
                *next_slot += 1;
                let reuse = ring.get_mut(*next_slot).and_then(Option::take);
                let src = slot_ref(ring, *current)?;
                let produced = filter.process(src, reuse)?;
                store_slot(ring, *next_slot, produced);
                *current = *next_slot;
                Ok(())
            }
        }

        PluginInstance::ImageFilter2(filter) => {
            if !filter.is_format_supported(current_format) {
                return Err(PluginError::UnsupportedPixelFormat);
            }

            let second = filter
                .second_image()
                .ok_or(PluginError::ImageParametersMismatch)?;
            let (width, height) = {
                let src = slot_ref(ring, *current)?;
                (src.width(), src.height())
            };

            if !second_image_size_ok(
                filter.second_image_size(),
                (width, height),
                (second.width(), second.height()),
            ) || second.format() != filter.second_image_format(current_format)
            {
                return Err(PluginError::ImageParametersMismatch);
            }

            if filter.can_process_in_place() {
                let buffer = slot_mut(ring, *current)?;
                filter.process_in_place(buffer, &second)
            } else {
                *next_slot += 1;
                let reuse = ring.get_mut(*next_slot).and_then(Option::take);
                let src = slot_ref(ring, *current)?;
                let produced = filter.process(src, &second, reuse)?;
                store_slot(ring, *next_slot, produced);
                *current = *next_slot;
                Ok(())
            }
        }

        PluginInstance::VideoProcessing(processor) => {
            if !processor.is_format_supported(current_format) {
                return Err(PluginError::UnsupportedPixelFormat);
            }
            processor.process(slot_mut(ring, *current)?)
        }

        PluginInstance::Detection(detector) => {
            if !detector.is_format_supported(current_format) {
                return Err(PluginError::UnsupportedPixelFormat);
            }
            detector.process(slot_mut(ring, *current)?)
        }

        PluginInstance::ImageAnalysis(analyzer) => {
            if !analyzer.is_format_supported(current_format) {
                return Err(PluginError::UnsupportedPixelFormat);
            }
            analyzer.process(slot_ref(ring, *current)?)
        }

        PluginInstance::ScriptingEngine(engine) => {
            // Hand the frame to the host's cell for the duration of the
            // script; whatever the script leaves there becomes the slot.
            let buffer = ring
                .get_mut(*current)
                .and_then(Option::take)
                .ok_or_else(|| PluginError::Failed("no frame in the processing ring".to_string()))?;
            *frame_cell.lock() = Some(buffer);

            let result = engine.run_script();

            let returned = frame_cell.lock().take();
            if let Some(slot) = ring.get_mut(*current) {
                *slot = returned;
            }
            result
        }

        PluginInstance::VideoSource(_)
        | PluginInstance::ImageImporter(_)
        | PluginInstance::ImageExporter(_) => Err(PluginError::InvalidConfiguration(
            "plug-in type cannot run as a processing step".to_string(),
        )),
    }
}

fn slot_ref(ring: &[Option<PixelBuffer>], index: usize) -> Result<&PixelBuffer, PluginError> {
    ring.get(index)
        .and_then(Option::as_ref)
        .ok_or_else(|| PluginError::Failed("no frame in the processing ring".to_string()))
}

fn slot_mut(
    ring: &mut [Option<PixelBuffer>],
    index: usize,
) -> Result<&mut PixelBuffer, PluginError> {
    ring.get_mut(index)
        .and_then(Option::as_mut)
        .ok_or_else(|| PluginError::Failed("no frame in the processing ring".to_string()))
}

fn store_slot(ring: &mut Vec<Option<PixelBuffer>>, index: usize, buffer: PixelBuffer) {
    if ring.len() <= index {
        ring.push(Some(buffer));
    } else {
        ring[index] = Some(buffer);
    }
}
