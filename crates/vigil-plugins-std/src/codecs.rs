//! PNG/JPEG importer and exporter plug-ins
//!
//! Backed by the `image` crate. The importer doubles as the runtime's
//! decoder for opaque JPEG payloads arriving from video sources.

use std::path::Path;
use std::sync::Arc;

use vigil_image::{PixelBuffer, PixelFormat};
use vigil_plugin::{
    ImageExporterPlugin, ImageImporterPlugin, Plugin, PluginDescriptor, PluginError,
    PluginInstance, PluginType, Result, Uuid, Variant, Version,
};

use crate::{FAMILY_FILE_FORMATS, STD_MODULE_GUID_BASE};

const EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

const EXPORT_FORMATS: &[PixelFormat] = &[
    PixelFormat::Gray8,
    PixelFormat::Rgb24,
    PixelFormat::Rgba32,
];

/// Imports PNG and JPEG files
pub struct FileImporterPlugin;

impl Plugin for FileImporterPlugin {
    fn get_property(&self, index: usize) -> Result<Variant> {
        Err(PluginError::InvalidProperty(index.to_string()))
    }

    fn set_property(&self, index: usize, _value: Variant) -> Result<()> {
        Err(PluginError::InvalidProperty(index.to_string()))
    }
}

impl ImageImporterPlugin for FileImporterPlugin {
    fn supported_extensions(&self) -> &[&str] {
        EXTENSIONS
    }

    fn import(&self, path: &Path) -> Result<PixelBuffer> {
        let decoded = image::open(path)
            .map_err(|e| PluginError::FailedImageDecoding(e.to_string()))?;
        dynamic_to_buffer(decoded)
    }

    fn decode(&self, bytes: &[u8]) -> Result<PixelBuffer> {
        let decoded = image::load_from_memory(bytes)
            .map_err(|e| PluginError::FailedImageDecoding(e.to_string()))?;
        dynamic_to_buffer(decoded)
    }
}

fn dynamic_to_buffer(decoded: image::DynamicImage) -> Result<PixelBuffer> {
    let (width, height) = (decoded.width(), decoded.height());

    let buffer = match decoded {
        image::DynamicImage::ImageLuma8(img) => PixelBuffer::from_data(
            img.into_raw(),
            width,
            height,
            width as usize,
            PixelFormat::Gray8,
        )?,
        image::DynamicImage::ImageRgb8(img) => PixelBuffer::from_data(
            img.into_raw(),
            width,
            height,
            width as usize * 3,
            PixelFormat::Rgb24,
        )?,
        other => PixelBuffer::from_data(
            other.into_rgba8().into_raw(),
            width,
            height,
            width as usize * 4,
            PixelFormat::Rgba32,
        )?,
    };

    Ok(buffer)
}

/// Exports images as PNG or JPEG files
pub struct FileExporterPlugin;

impl Plugin for FileExporterPlugin {
    fn get_property(&self, index: usize) -> Result<Variant> {
        Err(PluginError::InvalidProperty(index.to_string()))
    }

    fn set_property(&self, index: usize, _value: Variant) -> Result<()> {
        Err(PluginError::InvalidProperty(index.to_string()))
    }
}

impl ImageExporterPlugin for FileExporterPlugin {
    fn supported_extensions(&self) -> &[&str] {
        EXTENSIONS
    }

    fn supported_formats(&self) -> &[PixelFormat] {
        EXPORT_FORMATS
    }

    fn export(&self, path: &Path, img: &PixelBuffer) -> Result<()> {
        let color = match img.format() {
            PixelFormat::Gray8 => image::ExtendedColorType::L8,
            PixelFormat::Rgb24 => image::ExtendedColorType::Rgb8,
            PixelFormat::Rgba32 => image::ExtendedColorType::Rgba8,
            _ => return Err(PluginError::UnsupportedPixelFormat),
        };

        // The encoder expects tightly packed rows, so drop any stride padding.
        let row_bytes = img.format().min_stride(img.width());
        let mut packed = Vec::with_capacity(row_bytes * img.height() as usize);
        for y in 0..img.height() {
            packed.extend_from_slice(&img.row(y)[..row_bytes]);
        }

        image::save_buffer(path, &packed, img.width(), img.height(), color)
            .map_err(|e| PluginError::FailedImageEncoding(e.to_string()))
    }
}

pub(crate) fn importer_descriptor() -> Arc<PluginDescriptor> {
    Arc::new(
        PluginDescriptor::new(
            Uuid::from_u128(STD_MODULE_GUID_BASE | 0x06),
            FAMILY_FILE_FORMATS,
            PluginType::ImageImporter,
            "ImageFileImporter",
            "Image File Importer",
            Version::new(1, 0, 0),
            || Ok(PluginInstance::ImageImporter(Arc::new(FileImporterPlugin))),
        )
        .with_description("Loads PNG and JPEG image files."),
    )
}

pub(crate) fn exporter_descriptor() -> Arc<PluginDescriptor> {
    Arc::new(
        PluginDescriptor::new(
            Uuid::from_u128(STD_MODULE_GUID_BASE | 0x07),
            FAMILY_FILE_FORMATS,
            PluginType::ImageExporter,
            "ImageFileExporter",
            "Image File Exporter",
            Version::new(1, 0, 0),
            || Ok(PluginInstance::ImageExporter(Arc::new(FileExporterPlugin))),
        )
        .with_description("Saves images as PNG or JPEG files."),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_image::Rgba;

    #[test]
    fn test_png_round_trip_via_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("probe.png");

        let mut img = PixelBuffer::allocate(8, 8, PixelFormat::Rgb24).unwrap();
        img.set_pixel(3, 4, Rgba::opaque(10, 200, 30)).unwrap();

        FileExporterPlugin.export(&path, &img).unwrap();
        let loaded = FileImporterPlugin.import(&path).unwrap();

        assert_eq!(loaded.width(), 8);
        assert_eq!(loaded.format(), PixelFormat::Rgb24);
        assert_eq!(loaded.pixel(3, 4).unwrap(), Rgba::opaque(10, 200, 30));
    }

    #[test]
    fn test_decode_from_memory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("probe.png");

        let img = PixelBuffer::allocate(4, 4, PixelFormat::Gray8).unwrap();
        FileExporterPlugin.export(&path, &img).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let decoded = FileImporterPlugin.decode(&bytes).unwrap();
        assert_eq!(decoded.width(), 4);
        assert_eq!(decoded.format(), PixelFormat::Gray8);
    }

    #[test]
    fn test_export_rejects_unsupported_format() {
        let dir = tempfile::tempdir().unwrap();
        let img = PixelBuffer::allocate(4, 4, PixelFormat::Gray16).unwrap();
        assert!(matches!(
            FileExporterPlugin.export(&dir.path().join("x.png"), &img),
            Err(PluginError::UnsupportedPixelFormat)
        ));
    }

    #[test]
    fn test_import_missing_file() {
        assert!(matches!(
            FileImporterPlugin.import(Path::new("/nonexistent/file.png")),
            Err(PluginError::FailedImageDecoding(_))
        ));
    }
}
