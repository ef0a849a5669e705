//! # vigil-image
//!
//! Pixel buffers, pixel formats and scalar image kernels for the
//! [vigil](https://crates.io/crates/vigil-automation) analytics runtime.
//!
//! This crate is the bottom of the vigil stack: every frame that flows
//! between a video source, the processing pipeline and the host variable
//! store is a [`PixelBuffer`].
//!
//! # Features
//!
//! - **Owned pixel containers** with explicit stride and format tags
//! - **Eleven addressable formats** from 1-bit packed to 64-bit RGBA,
//!   plus an opaque JPEG pass-through payload
//! - **Allocation-free steady state** via [`PixelBuffer::copy_data_or_clone`]
//!   and [`PixelBuffer::reuse_or_allocate`]
//! - **Uniform RGBA pixel access** across all formats, palettes included
//! - **Scalar kernels** (grayscale, threshold, channel swap, histograms)
//!   used by the standard plug-in set
//!
//! # Quick Start
//!
//! ```rust
//! use vigil_image::{ops, PixelBuffer, PixelFormat, Rgba};
//!
//! let mut frame = PixelBuffer::allocate(320, 240, PixelFormat::Rgb24)?;
//! frame.set_pixel(0, 0, Rgba::opaque(255, 255, 255))?;
//!
//! let mut gray = ops::color_to_grayscale(&frame, None)?;
//! ops::threshold(&mut gray, 128)?;
//! assert_eq!(gray.pixel(0, 0)?.r, 255);
//! # Ok::<(), vigil_image::ImageError>(())
//! ```

pub mod buffer;
pub mod error;
pub mod format;
pub mod ops;

pub use buffer::{PixelBuffer, PixelView};
pub use error::{ImageError, Result};
pub use format::{luma709, Palette, PixelFormat, Rgba};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
