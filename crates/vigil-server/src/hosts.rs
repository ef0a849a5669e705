//! Scripting Host Implementations
//!
//! The server supplies every scripting engine a [`ScriptingHost`]: pipeline
//! steps get [`PipelineHost`] with access to the frame flowing through the
//! graph and to the owning video source; timer threads get [`ThreadHost`],
//! which answers `NotImplemented` for those three callbacks - named
//! variables, plug-in creation and printing work the same in both contexts.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;
use vigil_image::PixelBuffer;
use vigil_plugin::{
    PluginDescriptor, PluginError, PluginInstance, PluginRegistry, Result, ScriptingHost,
    Variant, Version, VideoSourcePlugin,
};

use crate::variables::VariableStore;

/// Everything a runtime needs to build scripting hosts
#[derive(Clone)]
pub(crate) struct RuntimeContext {
    pub host_name: String,
    pub host_version: Version,
    pub store: Arc<VariableStore>,
    pub registry: Option<Arc<PluginRegistry>>,
}

impl RuntimeContext {
    fn create_plugin(&self, name: &str) -> Result<(Arc<PluginDescriptor>, PluginInstance)> {
        let registry = self.registry.as_ref().ok_or_else(|| {
            PluginError::InvalidConfiguration("server has no plug-in registry".to_string())
        })?;
        let descriptor = registry
            .plugin_by_name(name)
            .ok_or_else(|| PluginError::PluginNotFound(name.to_string()))?;
        let instance = descriptor.create_instance()?;
        Ok((descriptor, instance))
    }
}

/// Host for scripting engines running as pipeline steps
pub(crate) struct PipelineHost {
    context: RuntimeContext,
    /// Frame being processed; populated only while the script step runs
    frame_cell: Arc<Mutex<Option<PixelBuffer>>>,
    source_descriptor: Arc<PluginDescriptor>,
    source: Arc<dyn VideoSourcePlugin>,
}

impl PipelineHost {
    pub(crate) fn new(
        context: RuntimeContext,
        frame_cell: Arc<Mutex<Option<PixelBuffer>>>,
        source_descriptor: Arc<PluginDescriptor>,
        source: Arc<dyn VideoSourcePlugin>,
    ) -> Self {
        Self { context, frame_cell, source_descriptor, source }
    }
}

impl ScriptingHost for PipelineHost {
    fn host_name(&self) -> String {
        self.context.host_name.clone()
    }

    fn host_version(&self) -> Version {
        self.context.host_version
    }

    fn print(&self, message: &str) {
        info!(target: "vigil::script", "{message}");
    }

    fn create_plugin_instance(
        &self,
        name: &str,
    ) -> Result<(Arc<PluginDescriptor>, PluginInstance)> {
        self.context.create_plugin(name)
    }

    fn get_variable(&self, name: &str) -> Result<Variant> {
        Ok(self.context.store.variable(name))
    }

    fn set_variable(&self, name: &str, value: Variant) -> Result<()> {
        self.context.store.set_variable(name, value);
        Ok(())
    }

    fn get_image_variable(&self, name: &str) -> Result<Option<PixelBuffer>> {
        Ok(self.context.store.image_variable(name))
    }

    fn set_image_variable(&self, name: &str, image: Option<PixelBuffer>) -> Result<()> {
        self.context.store.set_image_variable(name, image);
        Ok(())
    }

    fn get_image(&self) -> Result<PixelBuffer> {
        self.frame_cell
            .lock()
            .clone()
            .ok_or_else(|| PluginError::Failed("no frame is being processed".to_string()))
    }

    fn set_image(&self, image: PixelBuffer) -> Result<()> {
        let mut cell = self.frame_cell.lock();

        // Identical shape reuses the slot's storage; anything else replaces
        // the slot outright.
        let same_shape = cell.as_ref().is_some_and(|c| c.same_geometry(&image));
        if same_shape {
            image.copy_data_or_clone(&mut cell)?;
        } else {
            *cell = Some(image);
        }
        Ok(())
    }

    fn video_source(&self) -> Result<(Arc<PluginDescriptor>, PluginInstance)> {
        Ok((
            Arc::clone(&self.source_descriptor),
            PluginInstance::VideoSource(Arc::clone(&self.source)),
        ))
    }
}

/// Host for scripting engines running on independent timer threads
pub(crate) struct ThreadHost {
    context: RuntimeContext,
}

impl ThreadHost {
    pub(crate) fn new(context: RuntimeContext) -> Self {
        Self { context }
    }
}

impl ScriptingHost for ThreadHost {
    fn host_name(&self) -> String {
        self.context.host_name.clone()
    }

    fn host_version(&self) -> Version {
        self.context.host_version
    }

    fn print(&self, message: &str) {
        info!(target: "vigil::script", "{message}");
    }

    fn create_plugin_instance(
        &self,
        name: &str,
    ) -> Result<(Arc<PluginDescriptor>, PluginInstance)> {
        self.context.create_plugin(name)
    }

    fn get_variable(&self, name: &str) -> Result<Variant> {
        Ok(self.context.store.variable(name))
    }

    fn set_variable(&self, name: &str, value: Variant) -> Result<()> {
        self.context.store.set_variable(name, value);
        Ok(())
    }

    fn get_image_variable(&self, name: &str) -> Result<Option<PixelBuffer>> {
        Ok(self.context.store.image_variable(name))
    }

    fn set_image_variable(&self, name: &str, image: Option<PixelBuffer>) -> Result<()> {
        self.context.store.set_image_variable(name, image);
        Ok(())
    }

    // There is no frame flowing through a timer thread.

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

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_image::PixelFormat;

    fn context() -> RuntimeContext {
        RuntimeContext {
            host_name: "test".to_string(),
            host_version: Version::new(1, 0, 0),
            store: Arc::new(VariableStore::new()),
            registry: None,
        }
    }

    #[test]
    fn test_thread_host_asymmetry() {
        let host = ThreadHost::new(context());

        // Named image variables work from thread scripts...
        let image = PixelBuffer::allocate(4, 4, PixelFormat::Gray8).unwrap();
        host.set_image_variable("x", Some(image)).unwrap();
        assert!(host.get_image_variable("x").unwrap().is_some());

        // ...but the current-frame and source callbacks do not exist there.
        assert!(matches!(host.get_image(), Err(PluginError::NotImplemented)));
        assert!(matches!(
            host.set_image(PixelBuffer::allocate(2, 2, PixelFormat::Gray8).unwrap()),
            Err(PluginError::NotImplemented)
        ));
        assert!(matches!(host.video_source(), Err(PluginError::NotImplemented)));
    }

    #[test]
    fn test_set_image_reuses_matching_storage() {
        let cell = Arc::new(Mutex::new(None));
        let descriptor = Arc::new(PluginDescriptor::new(
            vigil_plugin::Uuid::from_u128(1),
            vigil_plugin::Uuid::from_u128(1),
            vigil_plugin::PluginType::VideoSource,
            "s",
            "s",
            Version::new(1, 0, 0),
            || Err(PluginError::NotImplemented),
        ));

        struct NoSource;
        impl vigil_plugin::Plugin for NoSource {
            fn get_property(&self, i: usize) -> Result<Variant> {
                Err(PluginError::InvalidProperty(i.to_string()))
            }
            fn set_property(&self, i: usize, _v: Variant) -> Result<()> {
                Err(PluginError::InvalidProperty(i.to_string()))
            }
        }
        impl VideoSourcePlugin for NoSource {
            fn set_listener(&self, _l: Option<Arc<dyn vigil_plugin::VideoSourceEvents>>) {}
            fn start(&self) -> Result<()> {
                Ok(())
            }
            fn signal_to_stop(&self) {}
            fn wait_for_stop(&self) {}
            fn is_running(&self) -> bool {
                false
            }
            fn terminate(&self) {}
            fn frames_received(&self) -> u32 {
                0
            }
        }

        let host = PipelineHost::new(context(), Arc::clone(&cell), descriptor, Arc::new(NoSource));

        *cell.lock() = Some(PixelBuffer::allocate(8, 8, PixelFormat::Gray8).unwrap());
        let original_ptr = cell.lock().as_ref().unwrap().data().as_ptr();

        // Same shape: storage reused
        host.set_image(PixelBuffer::allocate(8, 8, PixelFormat::Gray8).unwrap())
            .unwrap();
        assert_eq!(cell.lock().as_ref().unwrap().data().as_ptr(), original_ptr);

        // Different shape: slot replaced
        host.set_image(PixelBuffer::allocate(4, 4, PixelFormat::Gray8).unwrap())
            .unwrap();
        assert_eq!(cell.lock().as_ref().unwrap().width(), 4);
    }
}
