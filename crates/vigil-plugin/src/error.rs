//! Error types shared by the plug-in layer and the automation runtime
//!
//! Every fallible operation in the plug-in system - property access, value
//! conversion, registry lookups, plug-in execution, scripting - reports one
//! of these kinds. The display text of a variant is the human-readable
//! description surfaced to video-source listeners.

use thiserror::Error;
use vigil_image::ImageError;

/// Error kinds of the plug-in system and automation runtime
#[derive(Error, Debug)]
pub enum PluginError {
    /// A required parameter was absent
    #[error("Null parameter")]
    NullParameter,

    /// An argument is out of range or malformed
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The named property does not exist on the plug-in
    #[error("Invalid property: {0}")]
    InvalidProperty(String),

    /// The property cannot be written
    #[error("Property is read-only: {0}")]
    ReadOnlyProperty(String),

    /// Element access on a property that is not array-typed
    #[error("Property is not indexed")]
    NotIndexedProperty,

    /// Array element index outside the property's bounds
    #[error("Index is out of bounds")]
    IndexOutOfBounds,

    /// A value's textual or binary form could not be parsed
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// No conversion exists between the requested value types
    #[error("Incompatible types")]
    IncompatibleTypes,

    /// The plug-in does not accept the image's pixel format
    #[error("Unsupported pixel format")]
    UnsupportedPixelFormat,

    /// Two images disagree on size or format
    #[error("Image parameters mismatch")]
    ImageParametersMismatch,

    /// Allocation of pixel or value storage failed
    #[error("Out of memory")]
    OutOfMemory,

    /// An I/O operation failed
    #[error("I/O failure: {0}")]
    IoFailure(#[from] std::io::Error),

    /// Compressed image bytes could not be decoded
    #[error("Failed decoding image: {0}")]
    FailedImageDecoding(String),

    /// An image could not be encoded
    #[error("Failed encoding image: {0}")]
    FailedImageEncoding(String),

    /// The operation is not available in this context
    #[error("Not implemented")]
    NotImplemented,

    /// No plug-in with the given GUID or name is registered
    #[error("Plug-in not found: {0}")]
    PluginNotFound(String),

    /// The plug-in's creator thunk failed
    #[error("Failed creating plug-in instance: {0}")]
    FailedPluginInstantiation(String),

    /// The scripting engine could not load the script
    ///
    /// The engine's own diagnostic is available through its
    /// `last_error_message`; this kind carries only the generic description.
    #[error("Failed loading script")]
    FailedLoadingScript,

    /// The scripting engine failed while running the script
    #[error("Failed running script")]
    FailedRunningScript,

    /// The object's configuration is incomplete or inconsistent
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The underlying device is not ready to answer
    #[error("Device is not ready")]
    DeviceNotReady,

    /// The property may only be changed while the owner is stopped
    #[error("Cannot set property while running")]
    CannotSetPropertyWhileRunning,

    /// Unspecified failure
    #[error("Failed: {0}")]
    Failed(String),
}

impl From<ImageError> for PluginError {
    fn from(err: ImageError) -> Self {
        match err {
            ImageError::NullParameter => Self::NullParameter,
            ImageError::OutOfMemory(_) => Self::OutOfMemory,
            ImageError::UnsupportedFormat(_) => Self::UnsupportedPixelFormat,
            ImageError::InvalidArgument(msg) => Self::InvalidArgument(msg.to_string()),
            ImageError::ParametersMismatch => Self::ImageParametersMismatch,
        }
    }
}

/// Result type for plug-in operations
pub type Result<T> = std::result::Result<T, PluginError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_error_mapping() {
        let err: PluginError = ImageError::ParametersMismatch.into();
        assert!(matches!(err, PluginError::ImageParametersMismatch));

        let err: PluginError = ImageError::UnsupportedFormat("JPEG").into();
        assert!(matches!(err, PluginError::UnsupportedPixelFormat));
    }

    #[test]
    fn test_display_text() {
        assert_eq!(
            PluginError::UnsupportedPixelFormat.to_string(),
            "Unsupported pixel format"
        );
        assert_eq!(PluginError::NotImplemented.to_string(), "Not implemented");
    }
}
