//! Plug-in Descriptors
//!
//! A [`PluginDescriptor`] is the metadata record that lets the runtime
//! introspect and drive a plug-in without knowing its concrete type: stable
//! GUID, family, names, version, type tag, the ordered property descriptor
//! vector and the creator thunk.
//!
//! Descriptor-level property operations are the only property path the rest
//! of the runtime uses: they convert incoming values to the declared type,
//! enforce the read-only/hidden flags, and re-run dependent-property
//! updaters.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::error::{PluginError, Result};
use crate::property::PropertyDescriptor;
use crate::traits::{Plugin, PluginInstance, PluginType};
use crate::variant::Variant;

/// Plug-in or module version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Version {
    /// Major version
    pub major: u8,
    /// Minor version
    pub minor: u8,
    /// Revision
    pub revision: u16,
}

impl Version {
    /// Create a version triple
    #[must_use]
    pub const fn new(major: u8, minor: u8, revision: u16) -> Self {
        Self { major, minor, revision }
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.revision)
    }
}

/// Creator thunk producing a fresh plug-in instance
pub type PluginCreator = Arc<dyn Fn() -> Result<PluginInstance> + Send + Sync>;

/// Hook that rewrites a descriptor after instantiation (e.g. populates a
/// device list)
pub type DescriptorUpdater = Arc<dyn Fn(&mut PluginDescriptor) + Send + Sync>;

/// Metadata and factory for one plug-in class
#[derive(Clone)]
pub struct PluginDescriptor {
    /// Stable 128-bit identifier
    pub id: Uuid,
    /// Family the plug-in belongs to (grouping for UIs)
    pub family: Uuid,
    /// Unique short name; the identifier exposed to scripts
    pub short_name: String,
    /// Human-readable name
    pub display_name: String,
    /// Longer description for UIs
    pub description: String,
    /// Plug-in version
    pub version: Version,
    /// Type tag deciding which interface the instance implements
    pub plugin_type: PluginType,
    /// Ordered property descriptors
    pub properties: Vec<PropertyDescriptor>,
    creator: PluginCreator,
    dynamic_update: Option<DescriptorUpdater>,
}

impl PluginDescriptor {
    /// Create a descriptor
    #[must_use]
    pub fn new(
        id: Uuid,
        family: Uuid,
        plugin_type: PluginType,
        short_name: impl Into<String>,
        display_name: impl Into<String>,
        version: Version,
        creator: impl Fn() -> Result<PluginInstance> + Send + Sync + 'static,
    ) -> Self {
        Self {
            id,
            family,
            short_name: short_name.into(),
            display_name: display_name.into(),
            description: String::new(),
            version,
            plugin_type,
            properties: Vec::new(),
            creator: Arc::new(creator),
            dynamic_update: None,
        }
    }

    /// Set the description text
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the ordered property descriptors
    #[must_use]
    pub fn with_properties(mut self, properties: Vec<PropertyDescriptor>) -> Self {
        self.properties = properties;
        self
    }

    /// Install the post-instantiation descriptor rewrite hook
    #[must_use]
    pub fn with_dynamic_update(
        mut self,
        hook: impl Fn(&mut PluginDescriptor) + Send + Sync + 'static,
    ) -> Self {
        self.dynamic_update = Some(Arc::new(hook));
        self
    }

    /// Instantiate the plug-in
    ///
    /// # Errors
    ///
    /// `FailedPluginInstantiation` if the creator fails or produces an
    /// instance of the wrong type.
    pub fn create_instance(&self) -> Result<PluginInstance> {
        let instance = (self.creator)()
            .map_err(|e| PluginError::FailedPluginInstantiation(format!("{}: {e}", self.short_name)))?;

        if instance.plugin_type() != self.plugin_type {
            return Err(PluginError::FailedPluginInstantiation(format!(
                "{}: creator produced a {:?} instance for a {:?} descriptor",
                self.short_name,
                instance.plugin_type(),
                self.plugin_type
            )));
        }

        Ok(instance)
    }

    /// Run the post-instantiation rewrite hook, if any, on this descriptor
    pub fn run_dynamic_update(&mut self) {
        if let Some(hook) = self.dynamic_update.clone() {
            hook(self);
        }
    }

    /// Index of the property with the given key
    ///
    /// # Errors
    ///
    /// `InvalidProperty` if no such property exists.
    pub fn find_property(&self, key: &str) -> Result<usize> {
        self.properties
            .iter()
            .position(|p| p.key == key)
            .ok_or_else(|| PluginError::InvalidProperty(key.to_string()))
    }

    /// Read a property of an instance by key
    pub fn get_plugin_property(&self, plugin: &dyn Plugin, key: &str) -> Result<Variant> {
        let index = self.find_property(key)?;
        plugin.get_property(index)
    }

    /// Write a property of an instance by key, returning the property index
    ///
    /// The value is converted to the declared type and clamped to the
    /// declared bounds before reaching the instance. If the changed property
    /// has dependent children, the caller owning a mutable descriptor should
    /// follow up with [`PluginDescriptor::refresh_dependent_properties`].
    ///
    /// # Errors
    ///
    /// `ReadOnlyProperty` for read-only or hidden properties,
    /// `IncompatibleTypes`/`InvalidFormat` when the value does not convert.
    pub fn set_plugin_property(
        &self,
        plugin: &dyn Plugin,
        key: &str,
        value: &Variant,
    ) -> Result<usize> {
        let index = self.find_property(key)?;
        let prop = &self.properties[index];

        if prop.flags.read_only || prop.flags.hidden {
            return Err(PluginError::ReadOnlyProperty(key.to_string()));
        }

        // Empty passes through untouched: it means "unset", whatever the
        // declared type.
        let converted = if value.is_empty() {
            Variant::Empty
        } else {
            prop.clamp(value.change_type(prop.value_type)?)
        };
        plugin.set_property(index, converted)?;
        Ok(index)
    }

    /// Re-run the updaters of every property depending on `parent_index`
    ///
    /// The parent's current value is read back from the instance so updaters
    /// always see the value the plug-in actually accepted.
    pub fn refresh_dependent_properties(&mut self, plugin: &dyn Plugin, parent_index: usize) {
        let Ok(parent_value) = plugin.get_property(parent_index) else {
            return;
        };

        for child in &mut self.properties {
            if child.parent_property == Some(parent_index) {
                if let Some(updater) = child.updater.clone() {
                    updater(&parent_value, child);
                }
            }
        }
    }

    /// Read one element of an array-typed property by key
    pub fn get_plugin_property_element(
        &self,
        plugin: &dyn Plugin,
        key: &str,
        element: usize,
    ) -> Result<Variant> {
        let index = self.find_property(key)?;
        plugin.get_property_element(index, element)
    }

    /// Write one element of an array-typed property by key
    pub fn set_plugin_property_element(
        &self,
        plugin: &dyn Plugin,
        key: &str,
        element: usize,
        value: Variant,
    ) -> Result<()> {
        let index = self.find_property(key)?;
        let prop = &self.properties[index];

        if prop.flags.read_only || prop.flags.hidden {
            return Err(PluginError::ReadOnlyProperty(key.to_string()));
        }

        plugin.set_property_element(index, element, value)
    }

    /// Snapshot the instance's writable properties as a configuration map
    #[must_use]
    pub fn get_plugin_configuration(&self, plugin: &dyn Plugin) -> BTreeMap<String, Variant> {
        let mut configuration = BTreeMap::new();

        for (index, prop) in self.properties.iter().enumerate() {
            if prop.flags.read_only {
                continue;
            }
            if let Ok(value) = plugin.get_property(index) {
                configuration.insert(prop.key.clone(), value);
            }
        }

        configuration
    }

    /// Apply a configuration map to an instance
    ///
    /// Individual failures are logged and skipped - a half-applicable
    /// configuration applies as far as it can, matching how persisted
    /// configurations from older plug-in versions are handled. Dependent
    /// properties are refreshed after each successful write.
    pub fn apply_configuration(
        &mut self,
        plugin: &dyn Plugin,
        configuration: &BTreeMap<String, Variant>,
    ) {
        for (key, value) in configuration {
            match self.set_plugin_property(plugin, key, value) {
                Ok(index) => self.refresh_dependent_properties(plugin, index),
                Err(e) => {
                    debug!(plugin = %self.short_name, property = %key, error = %e,
                           "skipping configuration entry");
                }
            }
        }
    }

    /// Let the live instance rewrite this descriptor (device-backed domains)
    pub fn update_dynamic_description(&mut self, plugin: &dyn Plugin) -> Result<()> {
        let mut updated = self.clone();
        plugin.update_dynamic_description(&mut updated)?;
        *self = updated;
        Ok(())
    }
}

impl std::fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("id", &self.id)
            .field("short_name", &self.short_name)
            .field("display_name", &self.display_name)
            .field("version", &self.version)
            .field("plugin_type", &self.plugin_type)
            .field("properties", &self.properties.len())
            .finish_non_exhaustive()
    }
}
