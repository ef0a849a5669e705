//! Red/blue channel swap filter

use std::sync::Arc;

use vigil_image::{ops, PixelBuffer, PixelFormat};
use vigil_plugin::{
    ImageProcessingFilterPlugin, Plugin, PluginDescriptor, PluginError, PluginInstance,
    PluginType, Result, Uuid, Variant, Version,
};

use crate::{FAMILY_COLOR_FILTERS, STD_MODULE_GUID_BASE};

const SUPPORTED: &[PixelFormat] = &[PixelFormat::Rgb24, PixelFormat::Rgba32];

/// Swaps the red and blue channels, converting between RGB and BGR ordering
struct SwapRedBluePlugin;

impl Plugin for SwapRedBluePlugin {
    fn get_property(&self, index: usize) -> Result<Variant> {
        Err(PluginError::InvalidProperty(index.to_string()))
    }

    fn set_property(&self, index: usize, _value: Variant) -> Result<()> {
        Err(PluginError::InvalidProperty(index.to_string()))
    }
}

impl ImageProcessingFilterPlugin for SwapRedBluePlugin {
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
        Ok(ops::swap_red_blue(image)?)
    }
}

pub(crate) fn descriptor() -> Arc<PluginDescriptor> {
    Arc::new(
        PluginDescriptor::new(
            Uuid::from_u128(STD_MODULE_GUID_BASE | 0x03),
            FAMILY_COLOR_FILTERS,
            PluginType::ImageProcessingFilter,
            "SwapRedBlue",
            "Swap Red and Blue",
            Version::new(1, 0, 0),
            || Ok(PluginInstance::ImageFilter(Arc::new(SwapRedBluePlugin))),
        )
        .with_description("Swaps the red and blue channels of a color image."),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_image::Rgba;

    #[test]
    fn test_swap_is_involution() {
        let plugin = SwapRedBluePlugin;
        let mut img = PixelBuffer::allocate(2, 2, PixelFormat::Rgba32).unwrap();
        img.set_pixel(1, 1, Rgba::new(10, 20, 30, 40)).unwrap();

        plugin.process_in_place(&mut img).unwrap();
        assert_eq!(img.pixel(1, 1).unwrap(), Rgba::new(30, 20, 10, 40));

        plugin.process_in_place(&mut img).unwrap();
        assert_eq!(img.pixel(1, 1).unwrap(), Rgba::new(10, 20, 30, 40));
    }
}
