//! Scalar Pixel Kernels
//!
//! Reference implementations of the pixel transforms used by the standard
//! plug-ins: BT.709 grayscale conversion, thresholding, red/blue channel
//! swapping and histogram accumulation.
//!
//! These prioritize correctness and portability over speed; they operate on
//! whole rows and never allocate except through
//! [`PixelBuffer::reuse_or_allocate`].

use crate::buffer::PixelBuffer;
use crate::error::{ImageError, Result};
use crate::format::PixelFormat;

// BT.709 luma weights scaled by 0x10000.
const GRAY_COEF_RED: u32 = 13_933; // 0.2125
const GRAY_COEF_GREEN: u32 = 46_884; // 0.7154
const GRAY_COEF_BLUE: u32 = 4_719; // 0.0721

/// Convert a color image to grayscale
///
/// `Rgb24`/`Rgba32` become `Gray8`; `Rgb48`/`Rgba64` become `Gray16`.
/// `reuse` is consumed as the output buffer when its geometry matches.
///
/// # Errors
///
/// `UnsupportedFormat` for any other source format.
pub fn color_to_grayscale(src: &PixelBuffer, reuse: Option<PixelBuffer>) -> Result<PixelBuffer> {
    match src.format() {
        PixelFormat::Rgb24 | PixelFormat::Rgba32 => {
            let pixel_size = if src.format() == PixelFormat::Rgb24 { 3 } else { 4 };
            let mut dst = PixelBuffer::reuse_or_allocate(
                reuse,
                src.width(),
                src.height(),
                PixelFormat::Gray8,
            )?;

            for y in 0..src.height() {
                let src_row = src.row(y);
                let dst_row = dst.row_mut(y);

                for x in 0..src.width() as usize {
                    let p = x * pixel_size;
                    let luma = u32::from(src_row[p]) * GRAY_COEF_RED
                        + u32::from(src_row[p + 1]) * GRAY_COEF_GREEN
                        + u32::from(src_row[p + 2]) * GRAY_COEF_BLUE;
                    dst_row[x] = (luma >> 16) as u8;
                }
            }

            Ok(dst)
        }
        PixelFormat::Rgb48 | PixelFormat::Rgba64 => {
            let pixel_size = if src.format() == PixelFormat::Rgb48 { 6 } else { 8 };
            let mut dst = PixelBuffer::reuse_or_allocate(
                reuse,
                src.width(),
                src.height(),
                PixelFormat::Gray16,
            )?;

            for y in 0..src.height() {
                let src_row = src.row(y);
                let dst_row = dst.row_mut(y);

                for x in 0..src.width() as usize {
                    let p = x * pixel_size;
                    let r = u64::from(u16::from_le_bytes([src_row[p], src_row[p + 1]]));
                    let g = u64::from(u16::from_le_bytes([src_row[p + 2], src_row[p + 3]]));
                    let b = u64::from(u16::from_le_bytes([src_row[p + 4], src_row[p + 5]]));
                    let luma = (r * u64::from(GRAY_COEF_RED)
                        + g * u64::from(GRAY_COEF_GREEN)
                        + b * u64::from(GRAY_COEF_BLUE))
                        >> 16;
                    dst_row[x * 2..x * 2 + 2].copy_from_slice(&(luma as u16).to_le_bytes());
                }
            }

            Ok(dst)
        }
        other => Err(ImageError::UnsupportedFormat(other.name())),
    }
}

/// Output format of [`color_to_grayscale`] for a given input format, if supported
#[must_use]
pub fn grayscale_output_format(input: PixelFormat) -> Option<PixelFormat> {
    match input {
        PixelFormat::Rgb24 | PixelFormat::Rgba32 => Some(PixelFormat::Gray8),
        PixelFormat::Rgb48 | PixelFormat::Rgba64 => Some(PixelFormat::Gray16),
        _ => None,
    }
}

/// Expand a `Gray8` image to `Rgb24` with equal channels
///
/// # Errors
///
/// `UnsupportedFormat` for non-`Gray8` input.
pub fn grayscale_to_rgb(src: &PixelBuffer, reuse: Option<PixelBuffer>) -> Result<PixelBuffer> {
    if src.format() != PixelFormat::Gray8 {
        return Err(ImageError::UnsupportedFormat(src.format().name()));
    }

    let mut dst =
        PixelBuffer::reuse_or_allocate(reuse, src.width(), src.height(), PixelFormat::Rgb24)?;

    for y in 0..src.height() {
        let src_row = src.row(y);
        let dst_row = dst.row_mut(y);
        for x in 0..src.width() as usize {
            let v = src_row[x];
            dst_row[x * 3] = v;
            dst_row[x * 3 + 1] = v;
            dst_row[x * 3 + 2] = v;
        }
    }

    Ok(dst)
}

/// Threshold a grayscale image in place
///
/// Pixels at or above `threshold` become full intensity, all others zero.
/// `Gray8` compares against the low 8 bits of `threshold`; `Gray16` uses the
/// full 16-bit value.
///
/// # Errors
///
/// `UnsupportedFormat` for non-grayscale buffers.
pub fn threshold(image: &mut PixelBuffer, threshold: u16) -> Result<()> {
    match image.format() {
        PixelFormat::Gray8 => {
            let limit = threshold.min(255) as u8;
            let width = image.width() as usize;
            for y in 0..image.height() {
                for v in &mut image.row_mut(y)[..width] {
                    *v = if *v >= limit { 255 } else { 0 };
                }
            }
            Ok(())
        }
        PixelFormat::Gray16 => {
            let width = image.width() as usize;
            for y in 0..image.height() {
                let row = image.row_mut(y);
                for x in 0..width {
                    let v = u16::from_le_bytes([row[x * 2], row[x * 2 + 1]]);
                    let out: u16 = if v >= threshold { u16::MAX } else { 0 };
                    row[x * 2..x * 2 + 2].copy_from_slice(&out.to_le_bytes());
                }
            }
            Ok(())
        }
        other => Err(ImageError::UnsupportedFormat(other.name())),
    }
}

/// Swap the red and blue channels of an `Rgb24`/`Rgba32` image in place
///
/// # Errors
///
/// `UnsupportedFormat` for other formats.
pub fn swap_red_blue(image: &mut PixelBuffer) -> Result<()> {
    let pixel_size = match image.format() {
        PixelFormat::Rgb24 => 3,
        PixelFormat::Rgba32 => 4,
        other => return Err(ImageError::UnsupportedFormat(other.name())),
    };

    let width = image.width() as usize;
    for y in 0..image.height() {
        let row = image.row_mut(y);
        for x in 0..width {
            row.swap(x * pixel_size, x * pixel_size + 2);
        }
    }

    Ok(())
}

/// Per-channel histograms of an image
#[derive(Debug, Clone)]
pub struct Histograms {
    /// Red channel buckets, or intensity buckets for grayscale input
    pub red: Box<[u32; 256]>,
    /// Green channel buckets (grayscale input mirrors intensity)
    pub green: Box<[u32; 256]>,
    /// Blue channel buckets (grayscale input mirrors intensity)
    pub blue: Box<[u32; 256]>,
    /// Whether the source was grayscale (all three histograms identical)
    pub grayscale: bool,
}

/// Accumulate 256-bucket histograms for `Gray8`, `Rgb24` or `Rgba32` input
///
/// # Errors
///
/// `UnsupportedFormat` for other formats.
pub fn histogram(image: &PixelBuffer) -> Result<Histograms> {
    let mut red = Box::new([0u32; 256]);
    let mut green = Box::new([0u32; 256]);
    let mut blue = Box::new([0u32; 256]);
    let width = image.width() as usize;

    match image.format() {
        PixelFormat::Gray8 => {
            for y in 0..image.height() {
                for &v in &image.row(y)[..width] {
                    red[v as usize] += 1;
                }
            }
            *green = *red;
            *blue = *red;
            Ok(Histograms { red, green, blue, grayscale: true })
        }
        PixelFormat::Rgb24 | PixelFormat::Rgba32 => {
            let pixel_size = if image.format() == PixelFormat::Rgb24 { 3 } else { 4 };
            for y in 0..image.height() {
                let row = image.row(y);
                for x in 0..width {
                    let p = x * pixel_size;
                    red[row[p] as usize] += 1;
                    green[row[p + 1] as usize] += 1;
                    blue[row[p + 2] as usize] += 1;
                }
            }
            Ok(Histograms { red, green, blue, grayscale: false })
        }
        other => Err(ImageError::UnsupportedFormat(other.name())),
    }
}

/// Summary statistics derived from one histogram
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChannelStats {
    /// Lowest occupied bucket
    pub min: u8,
    /// Highest occupied bucket
    pub max: u8,
    /// Lowest occupied bucket ignoring zero
    pub min_ex0: u8,
    /// Highest occupied bucket ignoring zero
    pub max_ex0: u8,
    /// Arithmetic mean
    pub mean: f32,
    /// Standard deviation
    pub std_dev: f32,
    /// Mean ignoring zero-valued pixels
    pub mean_ex0: f32,
    /// Standard deviation ignoring zero-valued pixels
    pub std_dev_ex0: f32,
    /// Number of non-zero pixels
    pub total_ex0: u32,
}

impl ChannelStats {
    /// Compute statistics from a 256-bucket histogram
    #[must_use]
    pub fn from_histogram(hist: &[u32; 256]) -> Self {
        let mut stats = Self::default();

        let total: u64 = hist.iter().map(|&c| u64::from(c)).sum();
        if total == 0 {
            return stats;
        }

        stats.min = hist.iter().position(|&c| c > 0).unwrap_or(0) as u8;
        stats.max = hist.iter().rposition(|&c| c > 0).unwrap_or(0) as u8;
        stats.min_ex0 = hist[1..].iter().position(|&c| c > 0).map_or(0, |p| p as u8 + 1);
        stats.max_ex0 = if stats.max > 0 { stats.max } else { 0 };

        let (mean, std_dev) = mean_std(hist, false);
        stats.mean = mean;
        stats.std_dev = std_dev;

        let (mean_ex0, std_dev_ex0) = mean_std(hist, true);
        stats.mean_ex0 = mean_ex0;
        stats.std_dev_ex0 = std_dev_ex0;
        stats.total_ex0 = hist[1..].iter().sum();

        stats
    }

    /// Smallest bucket range around the histogram median containing
    /// `percent` of all samples, together with the sample count it covers
    ///
    /// This mirrors the "range to find" statistic: the returned range can be
    /// stretched to full scale by a levels filter downstream.
    #[must_use]
    pub fn find_range(hist: &[u32; 256], percent: f32) -> (u8, u8, u32) {
        let total: u64 = hist.iter().map(|&c| u64::from(c)).sum();
        if total == 0 {
            return (0, 0, 0);
        }

        let wanted = (total as f64 * f64::from(percent.clamp(0.0, 100.0)) / 100.0) as u64;

        // Walk outward from the median until enough samples are covered.
        let mut acc = 0u64;
        let mut median = 0usize;
        for (i, &c) in hist.iter().enumerate() {
            acc += u64::from(c);
            if acc * 2 >= total {
                median = i;
                break;
            }
        }

        let (mut lo, mut hi) = (median, median);
        let mut covered = u64::from(hist[median]);

        while covered < wanted {
            let extend_lo = lo > 0;
            let extend_hi = hi < 255;
            match (extend_lo, extend_hi) {
                (true, true) => {
                    if hist[lo - 1] >= hist[hi + 1] {
                        lo -= 1;
                        covered += u64::from(hist[lo]);
                    } else {
                        hi += 1;
                        covered += u64::from(hist[hi]);
                    }
                }
                (true, false) => {
                    lo -= 1;
                    covered += u64::from(hist[lo]);
                }
                (false, true) => {
                    hi += 1;
                    covered += u64::from(hist[hi]);
                }
                (false, false) => break,
            }
        }

        (lo as u8, hi as u8, covered as u32)
    }
}

fn mean_std(hist: &[u32; 256], exclude_zero: bool) -> (f32, f32) {
    let start = usize::from(exclude_zero);
    let total: u64 = hist[start..].iter().map(|&c| u64::from(c)).sum();
    if total == 0 {
        return (0.0, 0.0);
    }

    let sum: u64 = hist[start..]
        .iter()
        .enumerate()
        .map(|(i, &c)| (i + start) as u64 * u64::from(c))
        .sum();
    let mean = sum as f64 / total as f64;

    let var: f64 = hist[start..]
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            let d = (i + start) as f64 - mean;
            d * d * f64::from(c)
        })
        .sum::<f64>()
        / total as f64;

    (mean as f32, var.sqrt() as f32)
}
