//! Image statistics analyzer

use std::sync::Arc;

use parking_lot::Mutex;
use vigil_image::ops::{self, ChannelStats};
use vigil_image::{PixelBuffer, PixelFormat};
use vigil_plugin::{
    ImageProcessingPlugin, IntRange, Plugin, PluginDescriptor, PluginError, PluginInstance,
    PluginType, PropertyDescriptor, Result, Uuid, Variant, VariantType, Version,
};

use crate::{FAMILY_IMAGE_ANALYSIS, STD_MODULE_GUID_BASE};

const SUPPORTED: &[PixelFormat] = &[
    PixelFormat::Gray8,
    PixelFormat::Rgb24,
    PixelFormat::Rgba32,
];

const DEFAULT_RANGE_TO_FIND: f32 = 95.0;

// Property layout: rangeToFind, four histograms, then nine statistics per
// channel in red/green/blue/gray order.
const HISTOGRAM_BASE: usize = 1;
const CHANNEL_BASE: usize = 5;
const PER_CHANNEL: usize = 9;
const CHANNELS: [&str; 4] = ["red", "green", "blue", "gray"];

#[derive(Debug, Clone, Default)]
struct ChannelResult {
    histogram: Vec<u32>,
    stats: ChannelStats,
    found_min: u8,
    found_max: u8,
    found_total: u32,
}

#[derive(Debug, Default)]
struct StatsState {
    range_to_find: f32,
    channels: [ChannelResult; 4],
}

/// Calculates histograms and statistics of each image channel
///
/// Color input populates the red/green/blue channels; grayscale input
/// populates the gray channel. All results are exposed through read-only
/// properties, refreshed on every processed frame.
struct ImageStatisticsPlugin {
    state: Mutex<StatsState>,
}

impl ImageStatisticsPlugin {
    fn new() -> Self {
        Self {
            state: Mutex::new(StatsState {
                range_to_find: DEFAULT_RANGE_TO_FIND,
                channels: Default::default(),
            }),
        }
    }
}

impl Plugin for ImageStatisticsPlugin {
    fn get_property(&self, index: usize) -> Result<Variant> {
        let state = self.state.lock();

        if index == 0 {
            return Ok(Variant::F32(state.range_to_find));
        }

        if (HISTOGRAM_BASE..CHANNEL_BASE).contains(&index) {
            let channel = &state.channels[index - HISTOGRAM_BASE];
            return Ok(Variant::Array(
                channel.histogram.iter().map(|&c| Variant::U32(c)).collect(),
            ));
        }

        let offset = index
            .checked_sub(CHANNEL_BASE)
            .ok_or_else(|| PluginError::InvalidProperty(index.to_string()))?;
        let (channel_index, stat) = (offset / PER_CHANNEL, offset % PER_CHANNEL);
        let channel = state
            .channels
            .get(channel_index)
            .ok_or_else(|| PluginError::InvalidProperty(index.to_string()))?;
        let s = &channel.stats;

        let value = match stat {
            0 => Variant::IntRange(IntRange { min: i32::from(s.min), max: i32::from(s.max) }),
            1 => Variant::IntRange(IntRange {
                min: i32::from(s.min_ex0),
                max: i32::from(s.max_ex0),
            }),
            2 => Variant::IntRange(IntRange {
                min: i32::from(channel.found_min),
                max: i32::from(channel.found_max),
            }),
            3 => Variant::F32(s.mean),
            4 => Variant::F32(s.std_dev),
            5 => Variant::F32(s.mean_ex0),
            6 => Variant::F32(s.std_dev_ex0),
            7 => Variant::U32(s.total_ex0),
            _ => Variant::U32(channel.found_total),
        };

        Ok(value)
    }

    fn set_property(&self, index: usize, value: Variant) -> Result<()> {
        match index {
            0 => {
                let v = value.change_type(VariantType::F32)?.as_f32().unwrap_or(0.0);
                self.state.lock().range_to_find = v.clamp(5.0, 100.0);
                Ok(())
            }
            i if i < CHANNEL_BASE + 4 * PER_CHANNEL => {
                Err(PluginError::ReadOnlyProperty(i.to_string()))
            }
            i => Err(PluginError::InvalidProperty(i.to_string())),
        }
    }
}

impl ImageProcessingPlugin for ImageStatisticsPlugin {
    fn supported_formats(&self) -> &[PixelFormat] {
        SUPPORTED
    }

    fn process(&self, image: &PixelBuffer) -> Result<()> {
        let hists = ops::histogram(image)?;
        let mut state = self.state.lock();
        let percent = state.range_to_find;

        let mut results: [ChannelResult; 4] = Default::default();

        if hists.grayscale {
            results[3] = analyze(&hists.red, percent);
        } else {
            results[0] = analyze(&hists.red, percent);
            results[1] = analyze(&hists.green, percent);
            results[2] = analyze(&hists.blue, percent);
        }

        state.channels = results;
        Ok(())
    }
}

fn analyze(hist: &[u32; 256], percent: f32) -> ChannelResult {
    let stats = ChannelStats::from_histogram(hist);
    let (found_min, found_max, found_total) = ChannelStats::find_range(hist, percent);

    ChannelResult {
        histogram: hist.to_vec(),
        stats,
        found_min,
        found_max,
        found_total,
    }
}

fn channel_properties(channel: &str) -> Vec<PropertyDescriptor> {
    let cap = {
        let mut c = channel.to_string();
        c[..1].make_ascii_uppercase();
        c
    };

    vec![
        PropertyDescriptor::new(format!("{channel}Range"), format!("{cap} Range"), VariantType::IntRange)
            .with_description(format!("Range of values in the {channel} channel."))
            .read_only(),
        PropertyDescriptor::new(
            format!("{channel}RangeEx0"),
            format!("{cap} Range Excluding 0"),
            VariantType::IntRange,
        )
        .with_description(format!("Range of values in the {channel} channel excluding zero."))
        .read_only(),
        PropertyDescriptor::new(
            format!("{channel}RangeFound"),
            format!("{cap} Range Found"),
            VariantType::IntRange,
        )
        .with_description(format!(
            "Range of {channel} values containing the requested share of the histogram."
        ))
        .read_only(),
        PropertyDescriptor::new(format!("{channel}Mean"), format!("{cap} Mean"), VariantType::F32)
            .with_description(format!("Mean value of the {channel} channel."))
            .read_only(),
        PropertyDescriptor::new(format!("{channel}StdDev"), format!("{cap} StdDev"), VariantType::F32)
            .with_description(format!("Standard deviation of the {channel} channel."))
            .read_only(),
        PropertyDescriptor::new(
            format!("{channel}MeanEx0"),
            format!("{cap} Mean Excluding 0"),
            VariantType::F32,
        )
        .with_description(format!("Mean of the {channel} channel excluding zero values."))
        .read_only(),
        PropertyDescriptor::new(
            format!("{channel}StdDevEx0"),
            format!("{cap} StdDev Excluding 0"),
            VariantType::F32,
        )
        .with_description(format!(
            "Standard deviation of the {channel} channel excluding zero values."
        ))
        .read_only(),
        PropertyDescriptor::new(
            format!("{channel}TotalEx0"),
            format!("{cap} Total Excluding 0"),
            VariantType::U32,
        )
        .with_description(format!("Number of non-zero values in the {channel} channel."))
        .read_only(),
        PropertyDescriptor::new(
            format!("{channel}TotalFound"),
            format!("{cap} Total Found"),
            VariantType::U32,
        )
        .with_description(format!(
            "Number of {channel} values inside the found range."
        ))
        .read_only(),
    ]
}

pub(crate) fn descriptor() -> Arc<PluginDescriptor> {
    let mut properties = vec![
        PropertyDescriptor::new("rangeToFind", "Range To Find", VariantType::F32)
            .with_description(
                "Percentage of the histogram, centered on its median, covered by the found range.",
            )
            .with_default(Variant::F32(DEFAULT_RANGE_TO_FIND))
            .with_range(Variant::F32(5.0), Variant::F32(100.0))
            .runtime_configurable(),
    ];

    for channel in CHANNELS {
        let cap = {
            let mut c = channel.to_string();
            c[..1].make_ascii_uppercase();
            c
        };
        properties.push(
            PropertyDescriptor::new(
                format!("{channel}Histogram"),
                format!("{cap} Histogram"),
                VariantType::Array,
            )
            .with_description(format!("Histogram of the {channel} channel."))
            .read_only(),
        );
    }

    for channel in CHANNELS {
        properties.extend(channel_properties(channel));
    }

    Arc::new(
        PluginDescriptor::new(
            Uuid::from_u128(STD_MODULE_GUID_BASE | 0x05),
            FAMILY_IMAGE_ANALYSIS,
            PluginType::ImageProcessing,
            "ImageStatistics",
            "Image Statistics",
            Version::new(1, 0, 0),
            || {
                Ok(PluginInstance::ImageAnalysis(Arc::new(
                    ImageStatisticsPlugin::new(),
                )))
            },
        )
        .with_description("Calculates image histograms and statistics values: per-channel ranges, \
                           means and standard deviations, plain and excluding zero values.")
        .with_properties(properties),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_image::Rgba;

    fn gradient_gray(width: u32) -> PixelBuffer {
        let mut img = PixelBuffer::allocate(width, 1, PixelFormat::Gray8).unwrap();
        for x in 0..width {
            let v = (x * 255 / (width - 1)) as u8;
            img.set_pixel(x, 0, Rgba::opaque(v, v, v)).unwrap();
        }
        img
    }

    #[test]
    fn test_gray_input_populates_gray_channel() {
        let plugin = ImageStatisticsPlugin::new();
        plugin.process(&gradient_gray(256)).unwrap();

        // Gray histogram (index 4) is populated, red (index 1) is empty
        let gray_hist = plugin.get_property(4).unwrap();
        let red_hist = plugin.get_property(1).unwrap();
        assert_eq!(gray_hist, Variant::Array(vec![Variant::U32(1); 256]));
        assert_eq!(red_hist, Variant::Array(vec![]));

        // Gray range covers the full gradient
        let gray_range = plugin.get_property(CHANNEL_BASE + 3 * PER_CHANNEL).unwrap();
        assert_eq!(gray_range, Variant::IntRange(IntRange { min: 0, max: 255 }));
    }

    #[test]
    fn test_color_input_populates_rgb() {
        let plugin = ImageStatisticsPlugin::new();
        let mut img = PixelBuffer::allocate(4, 4, PixelFormat::Rgb24).unwrap();
        for y in 0..4 {
            for x in 0..4 {
                img.set_pixel(x, y, Rgba::opaque(100, 150, 200)).unwrap();
            }
        }
        plugin.process(&img).unwrap();

        let red_mean = plugin.get_property(CHANNEL_BASE + 3).unwrap();
        assert_eq!(red_mean, Variant::F32(100.0));
        let green_mean = plugin.get_property(CHANNEL_BASE + PER_CHANNEL + 3).unwrap();
        assert_eq!(green_mean, Variant::F32(150.0));
    }

    #[test]
    fn test_statistics_properties_are_read_only() {
        let plugin = ImageStatisticsPlugin::new();
        assert!(matches!(
            plugin.set_property(1, Variant::Array(vec![])),
            Err(PluginError::ReadOnlyProperty(_))
        ));

        // rangeToFind stays writable
        plugin.set_property(0, Variant::F32(50.0)).unwrap();
        assert_eq!(plugin.get_property(0).unwrap(), Variant::F32(50.0));
    }

    #[test]
    fn test_descriptor_property_count_matches_layout() {
        let desc = descriptor();
        assert_eq!(desc.properties.len(), CHANNEL_BASE + 4 * PER_CHANNEL);
        assert_eq!(desc.properties[0].key, "rangeToFind");
        assert_eq!(desc.properties[4].key, "grayHistogram");
        assert_eq!(desc.properties[CHANNEL_BASE].key, "redRange");
    }
}
