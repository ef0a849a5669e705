//! Processing Graphs
//!
//! A processing graph is the ordered list of plug-in invocations applied to
//! every frame of one video source: each step names a plug-in by GUID and
//! carries the persisted configuration to apply when the step is
//! instantiated.
//!
//! Graphs are plain editable data - instantiation happens later, on the
//! owning source's processing thread.

use std::collections::BTreeMap;

use vigil_plugin::{PluginError, Result, Uuid, Variant};

/// One step of a processing graph: a plug-in reference plus configuration
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProcessingStep {
    name: String,
    plugin_id: Uuid,
    configuration: BTreeMap<String, Variant>,
}

impl ProcessingStep {
    /// Create a step for the given plug-in
    #[must_use]
    pub fn new(name: impl Into<String>, plugin_id: Uuid) -> Self {
        Self {
            name: name.into(),
            plugin_id,
            configuration: BTreeMap::new(),
        }
    }

    /// Whether the step references a plug-in at all
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.plugin_id.is_nil()
    }

    /// Display name of the step
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename the step
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// GUID of the plug-in this step runs
    #[must_use]
    pub fn plugin_id(&self) -> Uuid {
        self.plugin_id
    }

    /// Persisted configuration applied at instantiation
    #[must_use]
    pub fn configuration(&self) -> &BTreeMap<String, Variant> {
        &self.configuration
    }

    /// Replace the persisted configuration
    pub fn set_configuration(&mut self, configuration: BTreeMap<String, Variant>) {
        self.configuration = configuration;
    }

    /// Set one configuration entry (builder-style)
    #[must_use]
    pub fn with_setting(mut self, key: impl Into<String>, value: Variant) -> Self {
        self.configuration.insert(key.into(), value);
        self
    }
}

/// Ordered list of processing steps applied to each frame of one source
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProcessingGraph {
    steps: Vec<ProcessingStep>,
}

impl ProcessingGraph {
    /// Create an empty graph
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of steps
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the graph has no steps
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Append a step, returning its index
    pub fn add_step(&mut self, step: ProcessingStep) -> usize {
        self.steps.push(step);
        self.steps.len() - 1
    }

    /// Insert a step at `index`, shifting later steps
    ///
    /// # Errors
    ///
    /// `IndexOutOfBounds` if `index > len`.
    pub fn insert_step(&mut self, index: usize, step: ProcessingStep) -> Result<()> {
        if index > self.steps.len() {
            return Err(PluginError::IndexOutOfBounds);
        }
        self.steps.insert(index, step);
        Ok(())
    }

    /// Remove the step at `index`
    ///
    /// # Errors
    ///
    /// `IndexOutOfBounds` if no such step exists.
    pub fn remove_step(&mut self, index: usize) -> Result<()> {
        if index >= self.steps.len() {
            return Err(PluginError::IndexOutOfBounds);
        }
        self.steps.remove(index);
        Ok(())
    }

    /// Step at `index`, if present
    #[must_use]
    pub fn step(&self, index: usize) -> Option<&ProcessingStep> {
        self.steps.get(index)
    }

    /// Replace the step at `index`
    ///
    /// # Errors
    ///
    /// `IndexOutOfBounds` if no such step exists.
    pub fn set_step(&mut self, index: usize, step: ProcessingStep) -> Result<()> {
        let slot = self
            .steps
            .get_mut(index)
            .ok_or(PluginError::IndexOutOfBounds)?;
        *slot = step;
        Ok(())
    }

    /// Iterate over the steps in order
    pub fn iter(&self) -> std::slice::Iter<'_, ProcessingStep> {
        self.steps.iter()
    }
}

impl<'a> IntoIterator for &'a ProcessingGraph {
    type Item = &'a ProcessingStep;
    type IntoIter = std::slice::Iter<'a, ProcessingStep>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(name: &str) -> ProcessingStep {
        ProcessingStep::new(name, Uuid::from_u128(0xBEEF))
    }

    #[test]
    fn test_step_validity() {
        assert!(!ProcessingStep::default().is_valid());
        assert!(step("s").is_valid());
    }

    #[test]
    fn test_graph_editing() {
        let mut graph = ProcessingGraph::new();
        assert!(graph.is_empty());

        assert_eq!(graph.add_step(step("a")), 0);
        assert_eq!(graph.add_step(step("c")), 1);
        graph.insert_step(1, step("b")).unwrap();

        let names: Vec<&str> = graph.iter().map(ProcessingStep::name).collect();
        assert_eq!(names, ["a", "b", "c"]);

        graph.remove_step(0).unwrap();
        assert_eq!(graph.step(0).unwrap().name(), "b");

        assert!(graph.insert_step(9, step("x")).is_err());
        assert!(graph.remove_step(9).is_err());
    }

    #[test]
    fn test_graph_equality_includes_configuration() {
        let mut a = ProcessingGraph::new();
        a.add_step(step("s").with_setting("threshold", Variant::U16(10)));

        let mut b = ProcessingGraph::new();
        b.add_step(step("s").with_setting("threshold", Variant::U16(10)));
        assert_eq!(a, b);

        let mut c = ProcessingGraph::new();
        c.add_step(step("s").with_setting("threshold", Variant::U16(11)));
        assert_ne!(a, c);
    }
}
