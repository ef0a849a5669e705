//! Rhai scripting engine plug-in
//!
//! Hosts [Rhai](https://rhai.rs) scripts as pipeline steps or timer threads.
//! The script's top-level code runs once at initialization; each invocation
//! afterwards calls the script's `Main` function.
//!
//! # Script API
//!
//! Scripts reach the host through plain functions:
//!
//! ```rhai
//! fn Main() {
//!     let img = get_image();              // frame flowing through the pipeline
//!     set_variable("width", img.width()); // shared host store
//!     let old = get_variable("counter");
//!     set_variable("counter", if old == () { 1 } else { old + 1 });
//! }
//! ```
//!
//! Available functions: `host_name()`, `host_version()`, `print`,
//! `get_variable`/`set_variable`, `get_image_variable`/`set_image_variable`,
//! `get_image`/`set_image`, `new_image(w, h)`, `create_plugin(name)`.
//! Images expose `width()`, `height()`, `get_pixel(x, y)` and
//! `set_pixel(x, y, argb)`; plug-in handles expose `get(key)`, `set(key,
//! value)` and `process_image(img)`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rhai::{Dynamic, Engine, EvalAltResult, Position, Scope, AST};
use tracing::debug;
use vigil_image::{PixelBuffer, PixelFormat, Rgba};
use vigil_plugin::{
    Plugin, PluginDescriptor, PluginError, PluginInstance, PluginType, PropertyDescriptor,
    Result, ScriptingEnginePlugin, ScriptingHost, Uuid, Variant, VariantType, Version,
};

use crate::{FAMILY_SCRIPTING, STD_MODULE_GUID_BASE};

/// Pixel image handle inside scripts; clones share the same buffer
#[derive(Clone)]
struct ScriptImage(Arc<Mutex<PixelBuffer>>);

impl ScriptImage {
    fn new(buffer: PixelBuffer) -> Self {
        Self(Arc::new(Mutex::new(buffer)))
    }

    fn snapshot(&self) -> PixelBuffer {
        self.0.lock().clone()
    }
}

/// Plug-in handle inside scripts
#[derive(Clone)]
struct ScriptPlugin {
    descriptor: Arc<PluginDescriptor>,
    instance: PluginInstance,
}

fn script_err(message: impl Into<String>) -> Box<EvalAltResult> {
    Box::new(EvalAltResult::ErrorRuntime(
        Dynamic::from(message.into()),
        Position::NONE,
    ))
}

// Two-element script array for range/point/size values.
fn pair(a: impl Into<Dynamic>, b: impl Into<Dynamic>) -> Dynamic {
    let array: rhai::Array = vec![a.into(), b.into()];
    array.into()
}

fn variant_to_dynamic(value: Variant) -> Dynamic {
    match value {
        Variant::Empty => Dynamic::UNIT,
        Variant::Bool(v) => Dynamic::from(v),
        Variant::I8(v) => Dynamic::from(i64::from(v)),
        Variant::I16(v) => Dynamic::from(i64::from(v)),
        Variant::I32(v) => Dynamic::from(i64::from(v)),
        Variant::I64(v) => Dynamic::from(v),
        Variant::U8(v) => Dynamic::from(i64::from(v)),
        Variant::U16(v) => Dynamic::from(i64::from(v)),
        Variant::U32(v) => Dynamic::from(i64::from(v)),
        Variant::U64(v) => Dynamic::from(v as i64),
        Variant::F32(v) => Dynamic::from(f64::from(v)),
        Variant::F64(v) => Dynamic::from(v),
        Variant::String(s) => Dynamic::from(s),
        Variant::IntRange(r) => pair(i64::from(r.min), i64::from(r.max)),
        Variant::FloatRange(r) => pair(f64::from(r.min), f64::from(r.max)),
        Variant::IntPoint(p) => pair(i64::from(p.x), i64::from(p.y)),
        Variant::FloatPoint(p) => pair(f64::from(p.x), f64::from(p.y)),
        Variant::Size(s) => pair(i64::from(s.width), i64::from(s.height)),
        Variant::Color(c) => Dynamic::from(i64::from(
            (u32::from(c.a) << 24) | (u32::from(c.r) << 16) | (u32::from(c.g) << 8) | u32::from(c.b),
        )),
        Variant::Argb(v) => Dynamic::from(i64::from(v)),
        Variant::Image(img) => Dynamic::from(ScriptImage::new(img)),
        Variant::Array(items) => items
            .into_iter()
            .map(variant_to_dynamic)
            .collect::<rhai::Array>()
            .into(),
        Variant::Array2 { cols, data } => {
            let rows: rhai::Array = data
                .chunks(cols.max(1))
                .map(|row| -> Dynamic {
                    row.iter().cloned().map(variant_to_dynamic).collect::<rhai::Array>().into()
                })
                .collect();
            rows.into()
        }
    }
}

fn dynamic_to_variant(value: Dynamic) -> Variant {
    if value.is_unit() {
        return Variant::Empty;
    }
    if let Some(v) = value.clone().try_cast::<bool>() {
        return Variant::Bool(v);
    }
    if let Some(v) = value.clone().try_cast::<i64>() {
        return Variant::I64(v);
    }
    if let Some(v) = value.clone().try_cast::<f64>() {
        return Variant::F64(v);
    }
    if let Some(v) = value.clone().try_cast::<String>() {
        return Variant::String(v);
    }
    if let Some(img) = value.clone().try_cast::<ScriptImage>() {
        return Variant::Image(img.snapshot());
    }
    if let Some(items) = value.clone().try_cast::<rhai::Array>() {
        return Variant::Array(items.into_iter().map(dynamic_to_variant).collect());
    }

    Variant::String(value.to_string())
}

fn register_host_api(engine: &mut Engine, host: Arc<dyn ScriptingHost>) {
    engine.register_type_with_name::<ScriptImage>("Image");
    engine.register_type_with_name::<ScriptPlugin>("Plugin");

    {
        let host = Arc::clone(&host);
        engine.on_print(move |message| host.print(message));
    }

    {
        let host = Arc::clone(&host);
        engine.register_fn("host_name", move || host.host_name());
    }
    {
        let host = Arc::clone(&host);
        engine.register_fn("host_version", move || host.host_version().to_string());
    }

    {
        let host = Arc::clone(&host);
        engine.register_fn(
            "get_variable",
            move |name: &str| -> std::result::Result<Dynamic, Box<EvalAltResult>> {
                let value = host.get_variable(name).map_err(|e| script_err(e.to_string()))?;
                Ok(variant_to_dynamic(value))
            },
        );
    }
    {
        let host = Arc::clone(&host);
        engine.register_fn(
            "set_variable",
            move |name: &str, value: Dynamic| -> std::result::Result<(), Box<EvalAltResult>> {
                host.set_variable(name, dynamic_to_variant(value))
                    .map_err(|e| script_err(e.to_string()))
            },
        );
    }

    {
        let host = Arc::clone(&host);
        engine.register_fn(
            "get_image_variable",
            move |name: &str| -> std::result::Result<Dynamic, Box<EvalAltResult>> {
                let image = host
                    .get_image_variable(name)
                    .map_err(|e| script_err(e.to_string()))?;
                Ok(image.map_or(Dynamic::UNIT, |img| Dynamic::from(ScriptImage::new(img))))
            },
        );
    }
    {
        let host = Arc::clone(&host);
        engine.register_fn(
            "set_image_variable",
            move |name: &str, image: ScriptImage| -> std::result::Result<(), Box<EvalAltResult>> {
                host.set_image_variable(name, Some(image.snapshot()))
                    .map_err(|e| script_err(e.to_string()))
            },
        );
    }
    {
        let host = Arc::clone(&host);
        engine.register_fn(
            "clear_image_variable",
            move |name: &str| -> std::result::Result<(), Box<EvalAltResult>> {
                host.set_image_variable(name, None)
                    .map_err(|e| script_err(e.to_string()))
            },
        );
    }

    {
        let host = Arc::clone(&host);
        engine.register_fn(
            "get_image",
            move || -> std::result::Result<ScriptImage, Box<EvalAltResult>> {
                let image = host.get_image().map_err(|e| script_err(e.to_string()))?;
                Ok(ScriptImage::new(image))
            },
        );
    }
    {
        let host = Arc::clone(&host);
        engine.register_fn(
            "set_image",
            move |image: ScriptImage| -> std::result::Result<(), Box<EvalAltResult>> {
                host.set_image(image.snapshot()).map_err(|e| script_err(e.to_string()))
            },
        );
    }

    {
        let host = Arc::clone(&host);
        engine.register_fn(
            "create_plugin",
            move |name: &str| -> std::result::Result<ScriptPlugin, Box<EvalAltResult>> {
                let (descriptor, instance) = host
                    .create_plugin_instance(name)
                    .map_err(|e| script_err(e.to_string()))?;
                Ok(ScriptPlugin { descriptor, instance })
            },
        );
    }

    engine.register_fn(
        "new_image",
        |width: i64, height: i64| -> std::result::Result<ScriptImage, Box<EvalAltResult>> {
            let buffer = PixelBuffer::allocate(width as u32, height as u32, PixelFormat::Rgb24)
                .map_err(|e| script_err(e.to_string()))?;
            Ok(ScriptImage::new(buffer))
        },
    );

    engine.register_fn("width", |image: &mut ScriptImage| i64::from(image.0.lock().width()));
    engine.register_fn("height", |image: &mut ScriptImage| i64::from(image.0.lock().height()));
    engine.register_fn(
        "get_pixel",
        |image: &mut ScriptImage, x: i64, y: i64| -> std::result::Result<i64, Box<EvalAltResult>> {
            let px = image
                .0
                .lock()
                .pixel(x as u32, y as u32)
                .map_err(|e| script_err(e.to_string()))?;
            Ok(i64::from(
                (u32::from(px.a) << 24)
                    | (u32::from(px.r) << 16)
                    | (u32::from(px.g) << 8)
                    | u32::from(px.b),
            ))
        },
    );
    engine.register_fn(
        "set_pixel",
        |image: &mut ScriptImage,
         x: i64,
         y: i64,
         argb: i64|
         -> std::result::Result<(), Box<EvalAltResult>> {
            let argb = argb as u32;
            let color = Rgba::new(
                ((argb >> 16) & 0xFF) as u8,
                ((argb >> 8) & 0xFF) as u8,
                (argb & 0xFF) as u8,
                ((argb >> 24) & 0xFF) as u8,
            );
            image
                .0
                .lock()
                .set_pixel(x as u32, y as u32, color)
                .map_err(|e| script_err(e.to_string()))
        },
    );

    engine.register_fn(
        "get",
        |plugin: &mut ScriptPlugin, key: &str| -> std::result::Result<Dynamic, Box<EvalAltResult>> {
            let value = plugin
                .descriptor
                .get_plugin_property(plugin.instance.as_plugin(), key)
                .map_err(|e| script_err(e.to_string()))?;
            Ok(variant_to_dynamic(value))
        },
    );
    engine.register_fn(
        "set",
        |plugin: &mut ScriptPlugin,
         key: &str,
         value: Dynamic|
         -> std::result::Result<(), Box<EvalAltResult>> {
            plugin
                .descriptor
                .set_plugin_property(
                    plugin.instance.as_plugin(),
                    key,
                    &dynamic_to_variant(value),
                )
                .map(|_| ())
                .map_err(|e| script_err(e.to_string()))
        },
    );
    engine.register_fn(
        "process_image",
        |plugin: &mut ScriptPlugin,
         image: ScriptImage|
         -> std::result::Result<ScriptImage, Box<EvalAltResult>> {
            match &plugin.instance {
                PluginInstance::ImageFilter(filter) => {
                    let src = image.snapshot();
                    if !filter.is_format_supported(src.format()) {
                        return Err(script_err("plugin cannot accept image format"));
                    }
                    let out = filter.process(&src, None).map_err(|e| script_err(e.to_string()))?;
                    Ok(ScriptImage::new(out))
                }
                PluginInstance::VideoProcessing(processor) => {
                    let mut buffer = image.0.lock();
                    if !processor.is_format_supported(buffer.format()) {
                        return Err(script_err("plugin cannot accept image format"));
                    }
                    processor.process(&mut buffer).map_err(|e| script_err(e.to_string()))?;
                    drop(buffer);
                    Ok(image)
                }
                PluginInstance::ImageAnalysis(analyzer) => {
                    let src = image.snapshot();
                    if !analyzer.is_format_supported(src.format()) {
                        return Err(script_err("plugin cannot accept image format"));
                    }
                    analyzer.process(&src).map_err(|e| script_err(e.to_string()))?;
                    Ok(image)
                }
                _ => Err(script_err("plugin type cannot process images")),
            }
        },
    );
}

#[derive(Default)]
struct EngineState {
    engine: Option<Engine>,
    ast: Option<AST>,
    scope: Scope<'static>,
    script_file: Option<PathBuf>,
    last_error: String,
}

/// Rhai-backed scripting engine
struct RhaiScriptingEngine {
    host: Mutex<Option<Arc<dyn ScriptingHost>>>,
    state: Mutex<EngineState>,
}

impl RhaiScriptingEngine {
    fn new() -> Self {
        Self {
            host: Mutex::new(None),
            state: Mutex::new(EngineState::default()),
        }
    }
}

fn basename(path: Option<&PathBuf>) -> String {
    path.and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "script".to_string())
}

impl Plugin for RhaiScriptingEngine {
    fn get_property(&self, index: usize) -> Result<Variant> {
        match index {
            0 => Ok(self
                .state
                .lock()
                .script_file
                .as_ref()
                .map_or(Variant::Empty, |p| {
                    Variant::String(p.to_string_lossy().into_owned())
                })),
            _ => Err(PluginError::InvalidProperty(index.to_string())),
        }
    }

    fn set_property(&self, index: usize, value: Variant) -> Result<()> {
        match index {
            0 => {
                self.state.lock().script_file = if value.is_empty() {
                    None
                } else {
                    value
                        .change_type(VariantType::String)?
                        .as_str()
                        .map(PathBuf::from)
                };
                Ok(())
            }
            _ => Err(PluginError::InvalidProperty(index.to_string())),
        }
    }
}

impl ScriptingEnginePlugin for RhaiScriptingEngine {
    fn default_extension(&self) -> &str {
        "rhai"
    }

    fn set_host(&self, host: Arc<dyn ScriptingHost>) {
        *self.host.lock() = Some(host);
    }

    fn init(&self) -> Result<()> {
        let host = self
            .host
            .lock()
            .clone()
            .ok_or_else(|| PluginError::InvalidConfiguration("scripting host not set".into()))?;

        let mut engine = Engine::new();
        register_host_api(&mut engine, host);

        let mut state = self.state.lock();
        state.engine = Some(engine);
        state.last_error.clear();
        Ok(())
    }

    fn set_script_file(&self, path: &Path) {
        self.state.lock().script_file = Some(path.to_path_buf());
    }

    fn load_script(&self) -> Result<()> {
        let mut state = self.state.lock();
        let name = basename(state.script_file.as_ref());

        let Some(path) = state.script_file.clone() else {
            state.last_error = "no script file selected".to_string();
            return Err(PluginError::FailedLoadingScript);
        };

        let source = match std::fs::read_to_string(&path) {
            Ok(source) => source,
            Err(e) => {
                state.last_error = format!("{name}: {e}");
                return Err(PluginError::FailedLoadingScript);
            }
        };

        let Some(engine) = state.engine.as_ref() else {
            state.last_error = "engine not initialized".to_string();
            return Err(PluginError::FailedLoadingScript);
        };

        match engine.compile(&source) {
            Ok(ast) => {
                debug!(script = %name, "script compiled");
                state.ast = Some(ast);
                state.scope = Scope::new();
                state.last_error.clear();
                Ok(())
            }
            Err(e) => {
                state.last_error = format!("{name}: {e}");
                Err(PluginError::FailedLoadingScript)
            }
        }
    }

    fn init_script(&self) -> Result<()> {
        let mut state = self.state.lock();
        let name = basename(state.script_file.as_ref());

        let EngineState { engine, ast, scope, last_error, .. } = &mut *state;
        match (engine.as_ref(), ast.as_ref()) {
            (Some(engine), Some(ast)) => match engine.run_ast_with_scope(scope, ast) {
                Ok(()) => {
                    last_error.clear();
                    Ok(())
                }
                Err(e) => {
                    *last_error = format!("{name}: {e}");
                    Err(PluginError::FailedRunningScript)
                }
            },
            _ => {
                *last_error = "script not loaded".to_string();
                Err(PluginError::FailedRunningScript)
            }
        }
    }

    fn run_script(&self) -> Result<()> {
        let mut state = self.state.lock();
        let name = basename(state.script_file.as_ref());

        let EngineState { engine, ast, scope, last_error, .. } = &mut *state;
        match (engine.as_ref(), ast.as_ref()) {
            (Some(engine), Some(ast)) => {
                match engine.call_fn::<Dynamic>(scope, ast, "Main", ()) {
                    Ok(_) => {
                        last_error.clear();
                        Ok(())
                    }
                    Err(e) => {
                        *last_error = format!("{name}: {e}");
                        Err(PluginError::FailedRunningScript)
                    }
                }
            }
            _ => {
                *last_error = "script not loaded".to_string();
                Err(PluginError::FailedRunningScript)
            }
        }
    }

    fn last_error_message(&self) -> String {
        self.state.lock().last_error.clone()
    }
}

pub(crate) fn descriptor() -> Arc<PluginDescriptor> {
    Arc::new(
        PluginDescriptor::new(
            Uuid::from_u128(STD_MODULE_GUID_BASE | 0x09),
            FAMILY_SCRIPTING,
            PluginType::ScriptingEngine,
            "RhaiScripting",
            "Rhai Scripting",
            Version::new(1, 0, 0),
            || {
                Ok(PluginInstance::ScriptingEngine(Arc::new(
                    RhaiScriptingEngine::new(),
                )))
            },
        )
        .with_description("Runs Rhai scripts as pipeline steps or timer threads. Top-level code \
                           runs once; the Main function runs on every invocation.")
        .with_properties(vec![
            PropertyDescriptor::new("scriptFile", "Script File", VariantType::String)
                .with_description("Path of the script to run.")
                .with_editor(vigil_plugin::PreferredEditor::ScriptFile),
        ]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[derive(Default)]
    struct RecordingHost {
        variables: Mutex<HashMap<String, Variant>>,
        printed: Mutex<Vec<String>>,
    }

    impl ScriptingHost for RecordingHost {
        fn host_name(&self) -> String {
            "test-host".to_string()
        }
        fn host_version(&self) -> Version {
            Version::new(1, 2, 3)
        }
        fn print(&self, message: &str) {
            self.printed.lock().push(message.to_string());
        }
        fn create_plugin_instance(
            &self,
            name: &str,
        ) -> Result<(Arc<PluginDescriptor>, PluginInstance)> {
            Err(PluginError::PluginNotFound(name.to_string()))
        }
        fn get_variable(&self, name: &str) -> Result<Variant> {
            Ok(self.variables.lock().get(name).cloned().unwrap_or_default())
        }
        fn set_variable(&self, name: &str, value: Variant) -> Result<()> {
            self.variables.lock().insert(name.to_string(), value);
            Ok(())
        }
        fn get_image_variable(&self, _name: &str) -> Result<Option<PixelBuffer>> {
            Ok(None)
        }
        fn set_image_variable(&self, _name: &str, _image: Option<PixelBuffer>) -> Result<()> {
            Ok(())
        }
        fn get_image(&self) -> Result<PixelBuffer> {
            Err(PluginError::NotImplemented)
        }
        fn set_image(&self, _image: PixelBuffer) -> Result<()> {
            Err(PluginError::NotImplemented)
        }
        fn video_source(&self) -> Result<(Arc<PluginDescriptor>, PluginInstance)> {
            Err(PluginError::NotImplemented)
        }
    }

    fn engine_with_script(
        source: &str,
    ) -> (RhaiScriptingEngine, Arc<RecordingHost>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("probe.rhai");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(source.as_bytes()).unwrap();
        drop(file);

        let engine = RhaiScriptingEngine::new();
        let host = Arc::new(RecordingHost::default());
        engine.set_host(host.clone());
        engine.init().unwrap();
        engine.set_script_file(&path);
        engine.load_script().unwrap();

        (engine, host, dir)
    }

    #[test]
    fn test_main_runs_and_reaches_host_store() {
        let (engine, host, _dir) = engine_with_script(
            r#"
            let runs = 0;
            fn Main() {
                set_variable("answer", 42);
            }
            "#,
        );

        engine.init_script().unwrap();
        engine.run_script().unwrap();

        assert_eq!(
            host.variables.lock().get("answer"),
            Some(&Variant::I64(42))
        );
    }

    #[test]
    fn test_state_persists_between_runs() {
        let (engine, host, _dir) = engine_with_script(
            r#"
            let counter = 0;
            fn Main() {
                counter += 1;
                set_variable("counter", counter);
            }
            "#,
        );

        engine.init_script().unwrap();
        engine.run_script().unwrap();
        engine.run_script().unwrap();
        engine.run_script().unwrap();

        assert_eq!(
            host.variables.lock().get("counter"),
            Some(&Variant::I64(3))
        );
    }

    #[test]
    fn test_load_failure_reports_basename() {
        let engine = RhaiScriptingEngine::new();
        engine.set_host(Arc::new(RecordingHost::default()));
        engine.init().unwrap();
        engine.set_script_file(Path::new("/definitely/missing/script.rhai"));

        assert!(matches!(
            engine.load_script(),
            Err(PluginError::FailedLoadingScript)
        ));
        let message = engine.last_error_message();
        assert!(message.starts_with("script.rhai:"), "got: {message}");
        assert!(!message.contains("/definitely/"));
    }

    #[test]
    fn test_compile_error_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.rhai");
        std::fs::write(&path, "fn Main( {").unwrap();

        let engine = RhaiScriptingEngine::new();
        engine.set_host(Arc::new(RecordingHost::default()));
        engine.init().unwrap();
        engine.set_script_file(&path);

        assert!(engine.load_script().is_err());
        assert!(engine.last_error_message().starts_with("broken.rhai:"));
    }

    #[test]
    fn test_missing_main_fails_run() {
        let (engine, _host, _dir) = engine_with_script("let x = 1;");
        engine.init_script().unwrap();
        assert!(matches!(
            engine.run_script(),
            Err(PluginError::FailedRunningScript)
        ));
        assert!(!engine.last_error_message().is_empty());
    }

    #[test]
    fn test_print_reaches_host() {
        let (engine, host, _dir) = engine_with_script(
            r#"
            fn Main() {
                print("hello from script");
            }
            "#,
        );
        engine.init_script().unwrap();
        engine.run_script().unwrap();
        assert_eq!(host.printed.lock().as_slice(), ["hello from script"]);
    }

    #[test]
    fn test_new_image_and_pixels() {
        let (engine, host, _dir) = engine_with_script(
            r#"
            fn Main() {
                let img = new_image(8, 4);
                img.set_pixel(2, 1, 0xFFFF0000);
                set_variable("w", img.width());
                set_variable("px", img.get_pixel(2, 1));
            }
            "#,
        );
        engine.init_script().unwrap();
        engine.run_script().unwrap();

        let vars = host.variables.lock();
        assert_eq!(vars.get("w"), Some(&Variant::I64(8)));
        assert_eq!(vars.get("px"), Some(&Variant::I64(0xFFFF_0000)));
    }
}
