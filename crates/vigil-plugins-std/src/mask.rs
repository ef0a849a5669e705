//! Mask application filter (two-input)

use std::sync::Arc;

use parking_lot::Mutex;
use vigil_image::{PixelBuffer, PixelFormat};
use vigil_plugin::{
    ImageProcessingFilter2Plugin, Plugin, PluginDescriptor, PluginError, PluginInstance,
    PluginType, PropertyDescriptor, Result, SecondImageSize, Uuid, Variant, VariantType, Version,
};

use crate::{FAMILY_COLOR_FILTERS, STD_MODULE_GUID_BASE};

const SUPPORTED: &[PixelFormat] = &[
    PixelFormat::Gray8,
    PixelFormat::Rgb24,
    PixelFormat::Rgba32,
];

/// Zeroes every pixel of the primary image where the mask is zero
///
/// The mask is a `Gray8` image of exactly the primary image's size,
/// configured through the `maskImage` property.
struct ApplyMaskPlugin {
    mask: Mutex<Option<PixelBuffer>>,
}

impl ApplyMaskPlugin {
    fn new() -> Self {
        Self { mask: Mutex::new(None) }
    }
}

impl Plugin for ApplyMaskPlugin {
    fn get_property(&self, index: usize) -> Result<Variant> {
        match index {
            0 => Ok(self
                .mask
                .lock()
                .clone()
                .map_or(Variant::Empty, Variant::Image)),
            _ => Err(PluginError::InvalidProperty(index.to_string())),
        }
    }

    fn set_property(&self, index: usize, value: Variant) -> Result<()> {
        match index {
            0 => {
                *self.mask.lock() = match value {
                    Variant::Empty => None,
                    Variant::Image(img) => Some(img),
                    _ => return Err(PluginError::IncompatibleTypes),
                };
                Ok(())
            }
            _ => Err(PluginError::InvalidProperty(index.to_string())),
        }
    }
}

impl ImageProcessingFilter2Plugin for ApplyMaskPlugin {
    fn supported_formats(&self) -> &[PixelFormat] {
        SUPPORTED
    }

    fn output_format(&self, input: PixelFormat) -> PixelFormat {
        input
    }

    fn second_image_size(&self) -> SecondImageSize {
        SecondImageSize::Equal
    }

    fn second_image_format(&self, _primary: PixelFormat) -> PixelFormat {
        PixelFormat::Gray8
    }

    fn second_image(&self) -> Option<PixelBuffer> {
        self.mask.lock().clone()
    }

    fn can_process_in_place(&self) -> bool {
        true
    }

    fn process(
        &self,
        src: &PixelBuffer,
        second: &PixelBuffer,
        reuse: Option<PixelBuffer>,
    ) -> Result<PixelBuffer> {
        let mut out = reuse;
        src.copy_data_or_clone(&mut out)?;
        let mut out = out.ok_or(PluginError::OutOfMemory)?;
        self.process_in_place(&mut out, second)?;
        Ok(out)
    }

    fn process_in_place(&self, image: &mut PixelBuffer, second: &PixelBuffer) -> Result<()> {
        if second.format() != PixelFormat::Gray8
            || second.width() != image.width()
            || second.height() != image.height()
        {
            return Err(PluginError::ImageParametersMismatch);
        }

        let pixel_size = match image.format() {
            PixelFormat::Gray8 => 1,
            PixelFormat::Rgb24 => 3,
            PixelFormat::Rgba32 => 4,
            _ => return Err(PluginError::UnsupportedPixelFormat),
        };

        let width = image.width() as usize;
        for y in 0..image.height() {
            // Rows borrowed separately: the mask row must be copied out
            // before the image row is borrowed mutably.
            let mask_row: Vec<u8> = second.row(y)[..width].to_vec();
            let row = image.row_mut(y);

            for (x, &m) in mask_row.iter().enumerate() {
                if m == 0 {
                    row[x * pixel_size..(x + 1) * pixel_size].fill(0);
                }
            }
        }

        Ok(())
    }
}

pub(crate) fn descriptor() -> Arc<PluginDescriptor> {
    Arc::new(
        PluginDescriptor::new(
            Uuid::from_u128(STD_MODULE_GUID_BASE | 0x04),
            FAMILY_COLOR_FILTERS,
            PluginType::ImageProcessingFilter2,
            "ApplyMask",
            "Apply Mask",
            Version::new(1, 0, 0),
            || Ok(PluginInstance::ImageFilter2(Arc::new(ApplyMaskPlugin::new()))),
        )
        .with_description("Zeroes every pixel of the image where the mask image is zero. The mask \
                           is a grayscale image of the same size.")
        .with_properties(vec![
            PropertyDescriptor::new("maskImage", "Mask Image", VariantType::Image)
                .with_description("Grayscale mask; zero pixels erase the corresponding image pixels.")
                .runtime_configurable(),
        ]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_image::Rgba;

    fn checker_mask(width: u32, height: u32) -> PixelBuffer {
        let mut mask = PixelBuffer::allocate(width, height, PixelFormat::Gray8).unwrap();
        for y in 0..height {
            for x in 0..width {
                if (x + y) % 2 == 0 {
                    mask.set_pixel(x, y, Rgba::opaque(255, 255, 255)).unwrap();
                }
            }
        }
        mask
    }

    #[test]
    fn test_mask_zeroes_pixels() {
        let plugin = ApplyMaskPlugin::new();
        let mut img = PixelBuffer::allocate(4, 4, PixelFormat::Rgb24).unwrap();
        for y in 0..4 {
            for x in 0..4 {
                img.set_pixel(x, y, Rgba::opaque(200, 200, 200)).unwrap();
            }
        }

        let mask = checker_mask(4, 4);
        plugin.process_in_place(&mut img, &mask).unwrap();

        assert_eq!(img.pixel(0, 0).unwrap().r, 200);
        assert_eq!(img.pixel(1, 0).unwrap().r, 0);
    }

    #[test]
    fn test_mask_size_mismatch() {
        let plugin = ApplyMaskPlugin::new();
        let mut img = PixelBuffer::allocate(4, 4, PixelFormat::Rgb24).unwrap();
        let mask = checker_mask(2, 2);

        assert!(matches!(
            plugin.process_in_place(&mut img, &mask),
            Err(PluginError::ImageParametersMismatch)
        ));
    }

    #[test]
    fn test_mask_property_round_trip() {
        let plugin = ApplyMaskPlugin::new();
        assert!(plugin.second_image().is_none());

        plugin
            .set_property(0, Variant::Image(checker_mask(4, 4)))
            .unwrap();
        assert_eq!(plugin.second_image().unwrap().width(), 4);

        plugin.set_property(0, Variant::Empty).unwrap();
        assert!(plugin.second_image().is_none());
    }
}
