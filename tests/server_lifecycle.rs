//! Server lifecycle scenarios: backpressure accounting, shutdown draining,
//! listener registration semantics, scripting threads and the shared store.

mod common;

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use common::{
    build_registry, half_and_half_frame, manual_source_descriptor, wait_until,
    CollectingListener, ManualSource,
};
use parking_lot::Mutex;
use vigil_automation::image::PixelBuffer;
use vigil_automation::plugin::VideoSourcePlugin;
use vigil_automation::prelude::*;
use vigil_automation::server::VariablesListener;

const WAIT: Duration = Duration::from_secs(5);

fn started_server(registry: &Arc<PluginRegistry>) -> AutomationServer {
    let server = AutomationServer::new(ServerConfig::default())
        .expect("server")
        .with_registry(Arc::clone(registry));
    server.start().expect("start");
    server
}

fn slow_graph(registry: &PluginRegistry, delay_ms: u32) -> ProcessingGraph {
    let slow = registry.plugin_by_name("SlowFilter").unwrap();
    let mut graph = ProcessingGraph::new();
    graph.add_step(
        ProcessingStep::new("Slow", slow.id).with_setting("delayMs", Variant::U32(delay_ms)),
    );
    graph
}

#[test]
fn drop_when_busy_discards_instead_of_blocking() {
    let registry = build_registry();
    let server = started_server(&registry);

    let source = Arc::new(ManualSource::new());
    let id = server.add_video_source(manual_source_descriptor(), source.clone());
    server.set_processing_graph(id, slow_graph(&registry, 50)).unwrap();
    server.start_video_source(id).unwrap();
    assert!(wait_until(WAIT, || source.is_running()));
    server.enable_frame_dropping(id, true).unwrap();

    let frame = half_and_half_frame();
    let pushes = 100u32;
    for _ in 0..pushes {
        source.push_frame(&frame);
        std::thread::sleep(Duration::from_millis(1));
    }

    // Let the consumer drain the last accepted frame
    std::thread::sleep(Duration::from_millis(120));

    let info = server.video_source_frame_info(id).unwrap();
    assert_eq!(
        info.frames_received + info.frames_dropped,
        pushes,
        "every producer callback is either accepted or dropped"
    );
    assert_eq!(info.frames_blocked, 0, "dropping must never stall the producer");
    assert!(
        info.frames_dropped > info.frames_received,
        "a 50ms step fed every 1ms must drop most frames: received={} dropped={}",
        info.frames_received,
        info.frames_dropped
    );

    server.wait_for_stop();
}

#[test]
fn blocking_mode_accepts_every_frame() {
    let registry = build_registry();
    let server = started_server(&registry);

    let source = Arc::new(ManualSource::new());
    let id = server.add_video_source(manual_source_descriptor(), source.clone());
    server.set_processing_graph(id, slow_graph(&registry, 20)).unwrap();

    let listener = CollectingListener::new();
    server.add_video_source_listener(id, listener.clone(), false).unwrap();
    server.start_video_source(id).unwrap();
    assert!(wait_until(WAIT, || source.is_running()));

    let frame = half_and_half_frame();
    for _ in 0..5 {
        source.push_frame(&frame); // blocks while the consumer is busy
    }

    // The hand-off slot holds one frame, so back-to-back deliveries may
    // coalesce - but nothing is ever dropped in blocking mode, and the last
    // accepted frame always gets processed.
    assert!(listener.wait_for_frames(1, WAIT));
    let info = server.video_source_frame_info(id).unwrap();
    assert_eq!(info.frames_received, 5);
    assert_eq!(info.frames_dropped, 0);

    server.wait_for_stop();
}

#[test]
fn shutdown_drains_every_worker() {
    let registry = build_registry();
    let server = started_server(&registry);

    let source = Arc::new(ManualSource::new());
    let id = server.add_video_source(manual_source_descriptor(), source.clone());
    server
        .set_processing_graph(id, ProcessingGraph::new())
        .unwrap();

    let listener = CollectingListener::new();
    server.add_video_source_listener(id, listener.clone(), false).unwrap();
    server.start_video_source(id).unwrap();
    assert!(wait_until(WAIT, || source.is_running()));

    source.push_frame(&half_and_half_frame());
    assert!(listener.wait_for_frames(1, WAIT));

    server.signal_to_stop();
    server.wait_for_stop();

    assert_eq!(server.video_source_count(), (0, 0, 0));
    assert!(!source.is_running(), "source must be stopped after drain");

    // No further callbacks after the drain: the listener was detached
    let frames_before = listener.frame_count();
    let errors_before = listener.error_count();
    source.push_frame(&half_and_half_frame());
    source.push_error("late error");
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(listener.frame_count(), frames_before);
    assert_eq!(listener.error_count(), errors_before);
}

#[test]
fn finalize_reaps_through_the_janitor() {
    let registry = build_registry();
    let server = AutomationServer::new(ServerConfig::builder().janitor_poll_ms(20).build())
        .expect("server")
        .with_registry(Arc::clone(&registry));
    server.start().unwrap();

    let source = Arc::new(ManualSource::new());
    let id = server.add_video_source(manual_source_descriptor(), source.clone());
    server.set_processing_graph(id, ProcessingGraph::new()).unwrap();
    server.start_video_source(id).unwrap();
    assert!(wait_until(WAIT, || source.is_running()));
    assert_eq!(server.video_source_count(), (0, 1, 0));

    server.finalize_video_source(id).unwrap();
    assert!(
        wait_until(WAIT, || server.video_source_count() == (0, 0, 0)),
        "janitor must reap the finalized source"
    );

    server.wait_for_stop();
}

#[test]
fn finalize_of_never_started_source() {
    let registry = build_registry();
    let server = started_server(&registry);

    let source = Arc::new(ManualSource::new());
    let id = server.add_video_source(manual_source_descriptor(), source);
    assert_eq!(server.video_source_count(), (1, 0, 0));

    server.finalize_video_source(id).unwrap();
    assert_eq!(server.video_source_count(), (0, 0, 0));

    assert!(server.finalize_video_source(id).is_err());
    server.wait_for_stop();
}

#[test]
fn listener_registration_with_recent_frame() {
    let registry = build_registry();
    let server = started_server(&registry);

    let source = Arc::new(ManualSource::new());
    let id = server.add_video_source(manual_source_descriptor(), source.clone());
    server.set_processing_graph(id, ProcessingGraph::new()).unwrap();

    let early = CollectingListener::new();
    server.add_video_source_listener(id, early.clone(), false).unwrap();
    server.start_video_source(id).unwrap();
    assert!(wait_until(WAIT, || source.is_running()));

    source.push_frame(&half_and_half_frame());
    assert!(early.wait_for_frames(1, WAIT));

    // A late subscriber asking for recent state gets the last frame at once
    let late = CollectingListener::new();
    server.add_video_source_listener(id, late.clone(), true).unwrap();
    assert_eq!(late.frame_count(), 1);
    assert_eq!(late.last_frame().unwrap().width(), 320);

    // Removal stops delivery
    let late_dyn: Arc<dyn VideoSourceListener> = late.clone();
    server.remove_video_source_listener(id, &late_dyn);
    source.push_frame(&half_and_half_frame());
    assert!(early.wait_for_frames(2, WAIT));
    assert_eq!(late.frame_count(), 1);

    server.wait_for_stop();
}

#[test]
fn source_errors_are_forwarded_and_cleared() {
    let registry = build_registry();
    let server = started_server(&registry);

    let source = Arc::new(ManualSource::new());
    let id = server.add_video_source(manual_source_descriptor(), source.clone());
    server.set_processing_graph(id, ProcessingGraph::new()).unwrap();

    let listener = CollectingListener::new();
    server.add_video_source_listener(id, listener.clone(), false).unwrap();
    server.start_video_source(id).unwrap();
    assert!(wait_until(WAIT, || source.is_running()));

    source.push_error("connection lost");
    assert!(listener.wait_for_errors(1, WAIT));
    assert_eq!(listener.errors.lock()[0], "connection lost");

    // A successful frame clears the error; a late subscriber with recent
    // notification must not see it anymore
    source.push_frame(&half_and_half_frame());
    assert!(listener.wait_for_frames(1, WAIT));

    let late = CollectingListener::new();
    server.add_video_source_listener(id, late.clone(), true).unwrap();
    assert_eq!(late.error_count(), 0);
    assert_eq!(late.frame_count(), 1);

    server.wait_for_stop();
}

#[test]
fn scripting_thread_runs_periodically() {
    let registry = build_registry();
    let server = started_server(&registry);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tick.rhai");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(
        br#"
        fn Main() {
            let n = get_variable("ticks");
            set_variable("ticks", if n == () { 1 } else { n + 1 });
        }
        "#,
    )
    .unwrap();
    drop(file);

    let (_descriptor, instance) = registry.create_instance_by_name("RhaiScripting").unwrap();
    let engine = instance.as_scripting_engine().unwrap().clone();
    engine.set_script_file(&path);

    let thread_id = server.add_thread(engine, 10);
    server.start_thread(thread_id).unwrap();

    assert!(wait_until(WAIT, || {
        matches!(server.variable("ticks"), Variant::I64(n) if n >= 3)
    }));

    server.finalize_thread(thread_id).unwrap();
    server.wait_for_stop();
}

#[test]
fn variables_listener_observes_store() {
    let registry = build_registry();
    let server = started_server(&registry);

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }
    impl VariablesListener for Recorder {
        fn on_variable_set(&self, name: &str, value: &Variant) {
            self.events.lock().push(format!("{name}={value}"));
        }
        fn on_clear_all(&self) {
            self.events.lock().push("clear".to_string());
        }
    }

    server.set_variable("before", Variant::I64(1));

    let recorder = Arc::new(Recorder::default());
    server.set_variables_listener(recorder.clone(), true);
    assert_eq!(recorder.events.lock().as_slice(), ["before=1"]);

    server.set_variable("after", Variant::I64(2));
    server.clear_all_variables();
    assert_eq!(
        recorder.events.lock().as_slice(),
        ["before=1", "after=2", "clear"]
    );

    server.clear_variables_listener();
    server.set_variable("silent", Variant::I64(3));
    assert_eq!(recorder.events.lock().len(), 3);

    server.wait_for_stop();
}

#[test]
fn store_exclusivity_between_kinds() {
    let registry = build_registry();
    let server = started_server(&registry);

    let image =
        PixelBuffer::allocate(8, 8, vigil_automation::image::PixelFormat::Gray8).unwrap();

    server.set_variable("x", Variant::I64(7));
    server.set_image_variable("x", Some(image));
    assert_eq!(server.variable("x"), Variant::Empty);
    assert!(server.image_variable("x").is_some());

    server.set_variable("x", Variant::I64(9));
    assert!(server.image_variable("x").is_none());
    assert_eq!(server.variable("x"), Variant::I64(9));

    server.wait_for_stop();
}
