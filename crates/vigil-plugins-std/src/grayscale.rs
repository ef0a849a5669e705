//! Color-to-grayscale conversion filter

use std::sync::Arc;

use vigil_image::{ops, PixelBuffer, PixelFormat};
use vigil_plugin::{
    ImageProcessingFilterPlugin, Plugin, PluginDescriptor, PluginError, PluginInstance,
    PluginType, Result, Uuid, Variant, Version,
};

use crate::{FAMILY_COLOR_FILTERS, STD_MODULE_GUID_BASE};

const SUPPORTED: &[PixelFormat] = &[
    PixelFormat::Rgb24,
    PixelFormat::Rgba32,
    PixelFormat::Rgb48,
    PixelFormat::Rgba64,
];

/// Converts color images to grayscale using BT.709 weights
struct ColorToGrayscalePlugin;

impl Plugin for ColorToGrayscalePlugin {
    fn get_property(&self, index: usize) -> Result<Variant> {
        Err(PluginError::InvalidProperty(index.to_string()))
    }

    fn set_property(&self, index: usize, _value: Variant) -> Result<()> {
        Err(PluginError::InvalidProperty(index.to_string()))
    }
}

impl ImageProcessingFilterPlugin for ColorToGrayscalePlugin {
    fn supported_formats(&self) -> &[PixelFormat] {
        SUPPORTED
    }

    fn output_format(&self, input: PixelFormat) -> PixelFormat {
        ops::grayscale_output_format(input).unwrap_or(input)
    }

    fn process(&self, src: &PixelBuffer, reuse: Option<PixelBuffer>) -> Result<PixelBuffer> {
        Ok(ops::color_to_grayscale(src, reuse)?)
    }
}

pub(crate) fn descriptor() -> Arc<PluginDescriptor> {
    Arc::new(
        PluginDescriptor::new(
            Uuid::from_u128(STD_MODULE_GUID_BASE | 0x01),
            FAMILY_COLOR_FILTERS,
            PluginType::ImageProcessingFilter,
            "ColorToGrayscale",
            "Color To Grayscale",
            Version::new(1, 0, 0),
            || Ok(PluginInstance::ImageFilter(Arc::new(ColorToGrayscalePlugin))),
        )
        .with_description("Converts color images to grayscale using BT.709 luma weights."),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_image::Rgba;

    #[test]
    fn test_rgb_becomes_gray8() {
        let plugin = ColorToGrayscalePlugin;
        let mut src = PixelBuffer::allocate(4, 4, PixelFormat::Rgb24).unwrap();
        src.set_pixel(0, 0, Rgba::opaque(255, 255, 255)).unwrap();

        assert!(plugin.is_format_supported(PixelFormat::Rgb24));
        assert_eq!(plugin.output_format(PixelFormat::Rgb24), PixelFormat::Gray8);

        let out = plugin.process(&src, None).unwrap();
        assert_eq!(out.format(), PixelFormat::Gray8);
        assert!(out.pixel(0, 0).unwrap().r >= 254);
    }

    #[test]
    fn test_descriptor_creates_matching_instance() {
        let desc = descriptor();
        let instance = desc.create_instance().unwrap();
        assert_eq!(instance.plugin_type(), PluginType::ImageProcessingFilter);
    }
}
