//! Property Descriptors
//!
//! Immutable metadata attached to a plug-in class describing each of its
//! configurable properties: stable key, display name, value type, default,
//! optional bounds, optional choice list and behavioral flags.
//!
//! A *dependent* property declares an updater closure: whenever its parent
//! property changes, the updater recomputes the child's choices, bounds and
//! default from the parent's new value. Updaters are pure functions of the
//! parent value.

use std::sync::Arc;

use crate::variant::{Variant, VariantType};

/// Hint for the kind of editor a UI should prefer for a property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PreferredEditor {
    /// Whatever the value type suggests
    #[default]
    Default,
    /// Slider / scroll bar between min and max
    Slider,
    /// Color picker
    ColorPicker,
    /// File selection dialog
    FilePath,
    /// Folder selection dialog
    FolderPath,
    /// Script file selection dialog
    ScriptFile,
}

/// Behavioral flags of a property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PropertyFlags {
    /// The property can only be read
    pub read_only: bool,
    /// The property exists but should not be surfaced by UIs
    pub hidden: bool,
    /// The property is temporarily not editable
    pub disabled: bool,
    /// The property may be changed while the owning object is running
    pub runtime_configuration: bool,
    /// The property may be changed *only* while the owning object is running
    pub device_runtime_configuration: bool,
    /// The property's domain depends on another property
    pub dependent: bool,
    /// Editor hint for UIs
    pub preferred_editor: PreferredEditor,
}

/// How a choice list maps a stored value to a selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChoiceSelection {
    /// The stored value equals the chosen entry's value
    ByValue,
    /// The stored value is the chosen entry's index
    ByIndex,
}

/// Enumerated choice list of a property
#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceList {
    /// The selectable values, in display order
    pub entries: Vec<Variant>,
    /// Selection semantics
    pub selection: ChoiceSelection,
}

/// Updater of a dependent property: recomputes the descriptor from the
/// parent property's current value
pub type PropertyUpdater = Arc<dyn Fn(&Variant, &mut PropertyDescriptor) + Send + Sync>;

/// Metadata of one plug-in property
#[derive(Clone)]
pub struct PropertyDescriptor {
    /// Stable key used by configuration maps and scripts
    pub key: String,
    /// Human-readable name
    pub display_name: String,
    /// Longer description for UIs
    pub description: String,
    /// Declared value type; writes convert to this type first
    pub value_type: VariantType,
    /// Default value
    pub default: Variant,
    /// Optional lower bound
    pub min: Option<Variant>,
    /// Optional upper bound
    pub max: Option<Variant>,
    /// Optional enumerated choices
    pub choices: Option<ChoiceList>,
    /// Behavioral flags
    pub flags: PropertyFlags,
    /// Index of the parent property this one depends on
    pub parent_property: Option<usize>,
    /// Recomputes this descriptor when the parent property changes
    pub updater: Option<PropertyUpdater>,
}

impl PropertyDescriptor {
    /// Create a descriptor with the given key, display name and type
    ///
    /// The default value starts as `Empty`; bounds, choices and flags are
    /// added through the `with_*` methods.
    #[must_use]
    pub fn new(
        key: impl Into<String>,
        display_name: impl Into<String>,
        value_type: VariantType,
    ) -> Self {
        Self {
            key: key.into(),
            display_name: display_name.into(),
            description: String::new(),
            value_type,
            default: Variant::Empty,
            min: None,
            max: None,
            choices: None,
            flags: PropertyFlags::default(),
            parent_property: None,
            updater: None,
        }
    }

    /// Set the description text
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the default value
    #[must_use]
    pub fn with_default(mut self, default: Variant) -> Self {
        self.default = default;
        self
    }

    /// Set inclusive bounds
    #[must_use]
    pub fn with_range(mut self, min: Variant, max: Variant) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    /// Set an enumerated choice list
    #[must_use]
    pub fn with_choices(mut self, entries: Vec<Variant>, selection: ChoiceSelection) -> Self {
        self.choices = Some(ChoiceList { entries, selection });
        self
    }

    /// Mark the property read-only
    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.flags.read_only = true;
        self
    }

    /// Hide the property from UIs
    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.flags.hidden = true;
        self
    }

    /// Allow changing the property while the owner runs
    #[must_use]
    pub fn runtime_configurable(mut self) -> Self {
        self.flags.runtime_configuration = true;
        self
    }

    /// Allow changing the property *only* while the owner runs
    #[must_use]
    pub fn device_runtime_only(mut self) -> Self {
        self.flags.device_runtime_configuration = true;
        self
    }

    /// Set the preferred editor hint
    #[must_use]
    pub fn with_editor(mut self, editor: PreferredEditor) -> Self {
        self.flags.preferred_editor = editor;
        self
    }

    /// Declare this property dependent on `parent`, with an updater that
    /// recomputes the descriptor from the parent's value
    #[must_use]
    pub fn dependent_on(
        mut self,
        parent: usize,
        updater: impl Fn(&Variant, &mut PropertyDescriptor) + Send + Sync + 'static,
    ) -> Self {
        self.flags.dependent = true;
        self.parent_property = Some(parent);
        self.updater = Some(Arc::new(updater));
        self
    }

    /// Clamp a value to the descriptor's bounds, when both are numeric
    #[must_use]
    pub fn clamp(&self, value: Variant) -> Variant {
        let Some(v) = value.as_f64() else { return value };

        let below = self.min.as_ref().and_then(Variant::as_f64).map(|m| v < m);
        if below == Some(true) {
            return self.min.clone().unwrap_or(value);
        }
        let above = self.max.as_ref().and_then(Variant::as_f64).map(|m| v > m);
        if above == Some(true) {
            return self.max.clone().unwrap_or(value);
        }
        value
    }
}

impl std::fmt::Debug for PropertyDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyDescriptor")
            .field("key", &self.key)
            .field("display_name", &self.display_name)
            .field("value_type", &self.value_type)
            .field("default", &self.default)
            .field("min", &self.min)
            .field("max", &self.max)
            .field("flags", &self.flags)
            .field("parent_property", &self.parent_property)
            .field("has_updater", &self.updater.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_chain() {
        let prop = PropertyDescriptor::new("threshold", "Threshold", VariantType::U16)
            .with_description("Threshold value")
            .with_default(Variant::U16(128))
            .with_range(Variant::U16(0), Variant::U16(255))
            .runtime_configurable();

        assert_eq!(prop.key, "threshold");
        assert_eq!(prop.default, Variant::U16(128));
        assert!(prop.flags.runtime_configuration);
        assert!(!prop.flags.read_only);
    }

    #[test]
    fn test_clamp() {
        let prop = PropertyDescriptor::new("v", "V", VariantType::I32)
            .with_range(Variant::I32(0), Variant::I32(10));

        assert_eq!(prop.clamp(Variant::I32(5)), Variant::I32(5));
        assert_eq!(prop.clamp(Variant::I32(-3)), Variant::I32(0));
        assert_eq!(prop.clamp(Variant::I32(42)), Variant::I32(10));
    }

    #[test]
    fn test_dependent_updater_recomputes() {
        let mut child = PropertyDescriptor::new("mode", "Mode", VariantType::U8).dependent_on(
            0,
            |parent, desc| {
                let n = parent.as_u32().unwrap_or(0);
                desc.max = Some(Variant::U8(n as u8));
            },
        );

        assert!(child.flags.dependent);
        let updater = child.updater.clone().unwrap();
        updater(&Variant::U32(7), &mut child);
        assert_eq!(child.max, Some(Variant::U8(7)));
    }
}
