//! Threshold filter for grayscale images

use std::sync::Arc;

use parking_lot::Mutex;
use vigil_image::{ops, PixelBuffer, PixelFormat};
use vigil_plugin::{
    ImageProcessingFilterPlugin, Plugin, PluginDescriptor, PluginError, PluginInstance,
    PluginType, PropertyDescriptor, Result, Uuid, Variant, VariantType, Version,
};

use crate::{FAMILY_THRESHOLDING, STD_MODULE_GUID_BASE};

const SUPPORTED: &[PixelFormat] = &[PixelFormat::Gray8, PixelFormat::Gray16];

const DEFAULT_THRESHOLD: u16 = 128;

/// Binarizes a grayscale image against a configurable threshold
struct ThresholdPlugin {
    threshold: Mutex<u16>,
}

impl ThresholdPlugin {
    fn new() -> Self {
        Self { threshold: Mutex::new(DEFAULT_THRESHOLD) }
    }
}

impl Plugin for ThresholdPlugin {
    fn get_property(&self, index: usize) -> Result<Variant> {
        match index {
            0 => Ok(Variant::U16(*self.threshold.lock())),
            _ => Err(PluginError::InvalidProperty(index.to_string())),
        }
    }

    fn set_property(&self, index: usize, value: Variant) -> Result<()> {
        match index {
            0 => {
                let v = value
                    .change_type(VariantType::U16)?
                    .as_u32()
                    .unwrap_or(u32::from(DEFAULT_THRESHOLD)) as u16;
                *self.threshold.lock() = v;
                Ok(())
            }
            _ => Err(PluginError::InvalidProperty(index.to_string())),
        }
    }
}

impl ImageProcessingFilterPlugin for ThresholdPlugin {
    fn supported_formats(&self) -> &[PixelFormat] {
        SUPPORTED
    }

    fn output_format(&self, input: PixelFormat) -> PixelFormat {
        input
    }

    fn can_process_in_place(&self) -> bool {
        true
    }

    fn process(&self, src: &PixelBuffer, reuse: Option<PixelBuffer>) -> Result<PixelBuffer> {
        let mut out = reuse;
        src.copy_data_or_clone(&mut out)?;
        let mut out = out.ok_or(PluginError::OutOfMemory)?;
        self.process_in_place(&mut out)?;
        Ok(out)
    }

    fn process_in_place(&self, image: &mut PixelBuffer) -> Result<()> {
        Ok(ops::threshold(image, *self.threshold.lock())?)
    }
}

pub(crate) fn descriptor() -> Arc<PluginDescriptor> {
    Arc::new(
        PluginDescriptor::new(
            Uuid::from_u128(STD_MODULE_GUID_BASE | 0x02),
            FAMILY_THRESHOLDING,
            PluginType::ImageProcessingFilter,
            "Threshold",
            "Threshold",
            Version::new(1, 0, 0),
            || Ok(PluginInstance::ImageFilter(Arc::new(ThresholdPlugin::new()))),
        )
        .with_description("Binarizes a grayscale image: pixels at or above the threshold become \
                           full intensity, all others zero.")
        .with_properties(vec![
            PropertyDescriptor::new("threshold", "Threshold", VariantType::U16)
                .with_description("Threshold value to compare pixels against.")
                .with_default(Variant::U16(DEFAULT_THRESHOLD))
                .with_range(Variant::U16(0), Variant::U16(u16::MAX))
                .runtime_configurable(),
        ]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_in_place() {
        let plugin = ThresholdPlugin::new();
        assert!(plugin.can_process_in_place());

        let mut img = PixelBuffer::allocate(4, 1, PixelFormat::Gray8).unwrap();
        img.row_mut(0)[..4].copy_from_slice(&[10, 127, 128, 200]);
        plugin.process_in_place(&mut img).unwrap();
        assert_eq!(&img.row(0)[..4], &[0, 0, 255, 255]);
    }

    #[test]
    fn test_threshold_property() {
        let plugin = ThresholdPlugin::new();
        plugin.set_property(0, Variant::U16(200)).unwrap();
        assert_eq!(plugin.get_property(0).unwrap(), Variant::U16(200));

        let mut img = PixelBuffer::allocate(2, 1, PixelFormat::Gray8).unwrap();
        img.row_mut(0)[..2].copy_from_slice(&[150, 250]);
        plugin.process_in_place(&mut img).unwrap();
        assert_eq!(&img.row(0)[..2], &[0, 255]);
    }

    #[test]
    fn test_rejects_color_input() {
        let plugin = ThresholdPlugin::new();
        assert!(!plugin.is_format_supported(PixelFormat::Rgb24));

        let mut img = PixelBuffer::allocate(2, 2, PixelFormat::Rgb24).unwrap();
        assert!(plugin.process_in_place(&mut img).is_err());
    }
}
