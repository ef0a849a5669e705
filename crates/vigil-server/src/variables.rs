//! Shared Host Variable Store
//!
//! The server-wide map of named values every script can reach. Two maps live
//! behind one mutex - plain variables and image variables - with names
//! unique *across* both: storing an image under a name removes any plain
//! variable under that name and vice versa.
//!
//! A single optional listener observes plain-variable writes and clear-all;
//! it is invoked while the store lock is held, so listeners must not call
//! back into the store.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;
use vigil_image::PixelBuffer;
use vigil_plugin::Variant;

/// Observer of shared-store changes
pub trait VariablesListener: Send + Sync {
    /// A plain variable was written (or removed, when `value` is empty)
    fn on_variable_set(&self, name: &str, value: &Variant);

    /// Every variable was removed at once
    fn on_clear_all(&self);
}

#[derive(Default)]
struct StoreInner {
    variables: HashMap<String, Variant>,
    images: HashMap<String, PixelBuffer>,
    listener: Option<Arc<dyn VariablesListener>>,
}

/// Thread-safe store of named variables shared between all scripts
#[derive(Default)]
pub struct VariableStore {
    inner: Mutex<StoreInner>,
}

impl VariableStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a plain variable; absent names read as [`Variant::Empty`]
    #[must_use]
    pub fn variable(&self, name: &str) -> Variant {
        self.inner.lock().variables.get(name).cloned().unwrap_or_default()
    }

    /// Write a plain variable
    ///
    /// Writing [`Variant::Empty`] removes the name. Writing an image routes
    /// to the image map. In every case any entry of the *other* kind under
    /// the same name is removed.
    pub fn set_variable(&self, name: &str, value: Variant) {
        if let Variant::Image(image) = value {
            self.set_image_variable(name, Some(image));
            return;
        }

        let mut inner = self.inner.lock();
        trace!(name, %value, "variable set");

        if value.is_empty() {
            inner.variables.remove(name);
        } else {
            inner.variables.insert(name.to_string(), value.clone());
        }
        inner.images.remove(name);

        if let Some(listener) = &inner.listener {
            listener.on_variable_set(name, &value);
        }
    }

    /// Read an image variable as a deep copy, or `None` if absent
    #[must_use]
    pub fn image_variable(&self, name: &str) -> Option<PixelBuffer> {
        self.inner.lock().images.get(name).cloned()
    }

    /// Write an image variable; `None` removes the name
    ///
    /// Any plain variable under the same name is removed.
    pub fn set_image_variable(&self, name: &str, image: Option<PixelBuffer>) {
        let mut inner = self.inner.lock();

        match image {
            Some(image) => {
                trace!(name, width = image.width(), height = image.height(), "image variable set");
                inner.images.insert(name.to_string(), image);
            }
            None => {
                inner.images.remove(name);
            }
        }
        inner.variables.remove(name);
    }

    /// Remove every variable of both kinds
    pub fn clear_all(&self) {
        let mut inner = self.inner.lock();
        inner.variables.clear();
        inner.images.clear();

        if let Some(listener) = &inner.listener {
            listener.on_clear_all();
        }
    }

    /// Install or clear the change listener
    ///
    /// With `notify_existing`, the new listener immediately receives one
    /// `on_variable_set` per currently stored plain variable.
    pub fn set_listener(&self, listener: Option<Arc<dyn VariablesListener>>, notify_existing: bool) {
        let mut inner = self.inner.lock();
        inner.listener = listener;

        if notify_existing {
            if let Some(listener) = &inner.listener {
                for (name, value) in &inner.variables {
                    listener.on_variable_set(name, value);
                }
            }
        }
    }
}

impl std::fmt::Debug for VariableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("VariableStore")
            .field("variables", &inner.variables.len())
            .field("images", &inner.images.len())
            .field("has_listener", &inner.listener.is_some())
            .finish()
    }
}
