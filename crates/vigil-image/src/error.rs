//! Error types for pixel buffer operations
//!
//! Provides typed errors that callers can match and handle specifically.

use thiserror::Error;

/// Errors that can occur while creating or manipulating pixel buffers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImageError {
    /// A required buffer reference was absent
    #[error("Null parameter")]
    NullParameter,

    /// Allocation of pixel storage failed
    #[error("Out of memory allocating {0} bytes")]
    OutOfMemory(usize),

    /// The operation does not support the buffer's pixel format
    #[error("Unsupported pixel format: {0}")]
    UnsupportedFormat(&'static str),

    /// A coordinate, rectangle or stride argument is out of range
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Two buffers involved in the operation disagree on size or format
    #[error("Image parameters mismatch")]
    ParametersMismatch,
}

/// Result type for pixel buffer operations
pub type Result<T> = std::result::Result<T, ImageError>;
