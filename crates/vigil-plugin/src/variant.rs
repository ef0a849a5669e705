//! Typed Dynamic Values
//!
//! [`Variant`] is the uniform value exchanged between the host, plug-in
//! properties and scripts: a tagged union over scalars, small geometric
//! types, strings, images and (recursively) arrays.
//!
//! Conversions follow a total widening/narrowing matrix implemented by
//! [`Variant::change_type`]: every numeric type converts to every other
//! numeric type (possibly lossily), numerics convert to and from strings,
//! and a scalar converts to and from a single-element array. Only truly
//! disjoint pairs - an image to a string, a range to a point - refuse with
//! `IncompatibleTypes`.

use crate::error::{PluginError, Result};
use vigil_image::{PixelBuffer, Rgba};

/// Inclusive integer range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IntRange {
    /// Lower bound
    pub min: i32,
    /// Upper bound
    pub max: i32,
}

/// Inclusive floating-point range
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FloatRange {
    /// Lower bound
    pub min: f32,
    /// Upper bound
    pub max: f32,
}

/// Integer point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IntPoint {
    /// Horizontal coordinate
    pub x: i32,
    /// Vertical coordinate
    pub y: i32,
}

/// Floating-point point
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FloatPoint {
    /// Horizontal coordinate
    pub x: f32,
    /// Vertical coordinate
    pub y: f32,
}

/// Two-dimensional size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SizeValue {
    /// Width
    pub width: i32,
    /// Height
    pub height: i32,
}

/// Type tag of a [`Variant`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariantType {
    /// No value
    Empty,
    /// Boolean
    Bool,
    /// Signed 8-bit integer
    I8,
    /// Signed 16-bit integer
    I16,
    /// Signed 32-bit integer
    I32,
    /// Signed 64-bit integer
    I64,
    /// Unsigned 8-bit integer
    U8,
    /// Unsigned 16-bit integer
    U16,
    /// Unsigned 32-bit integer
    U32,
    /// Unsigned 64-bit integer
    U64,
    /// 32-bit float
    F32,
    /// 64-bit float
    F64,
    /// Immutable string
    String,
    /// Integer range (min, max)
    IntRange,
    /// Floating range (min, max)
    FloatRange,
    /// RGBA color
    Color,
    /// Integer point (x, y)
    IntPoint,
    /// Floating point (x, y)
    FloatPoint,
    /// Size (width, height)
    Size,
    /// Packed 32-bit ARGB value
    Argb,
    /// Owned pixel buffer
    Image,
    /// One-dimensional array
    Array,
    /// Rectangular two-dimensional array
    Array2,
}

impl VariantType {
    /// Whether the type participates in the numeric conversion group
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        matches!(
            self,
            Self::Bool
                | Self::I8
                | Self::I16
                | Self::I32
                | Self::I64
                | Self::U8
                | Self::U16
                | Self::U32
                | Self::U64
                | Self::F32
                | Self::F64
                | Self::Argb
        )
    }
}

/// Uniform dynamic value used for property I/O and host/script exchange
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Variant {
    /// No value
    #[default]
    Empty,
    /// Boolean
    Bool(bool),
    /// Signed 8-bit integer
    I8(i8),
    /// Signed 16-bit integer
    I16(i16),
    /// Signed 32-bit integer
    I32(i32),
    /// Signed 64-bit integer
    I64(i64),
    /// Unsigned 8-bit integer
    U8(u8),
    /// Unsigned 16-bit integer
    U16(u16),
    /// Unsigned 32-bit integer
    U32(u32),
    /// Unsigned 64-bit integer
    U64(u64),
    /// 32-bit float
    F32(f32),
    /// 64-bit float
    F64(f64),
    /// Immutable string
    String(String),
    /// Integer range
    IntRange(IntRange),
    /// Floating range
    FloatRange(FloatRange),
    /// RGBA color
    Color(Rgba),
    /// Integer point
    IntPoint(IntPoint),
    /// Floating point
    FloatPoint(FloatPoint),
    /// Size
    Size(SizeValue),
    /// Packed 32-bit ARGB value
    Argb(u32),
    /// Owned pixel buffer
    Image(PixelBuffer),
    /// One-dimensional array of values
    Array(Vec<Variant>),
    /// Rectangular two-dimensional array, stored row-major
    Array2 {
        /// Number of columns (every row has this length)
        cols: usize,
        /// Row-major elements; `data.len()` is a multiple of `cols`
        data: Vec<Variant>,
    },
}

impl Variant {
    /// Type tag of the stored value
    #[must_use]
    pub fn variant_type(&self) -> VariantType {
        match self {
            Self::Empty => VariantType::Empty,
            Self::Bool(_) => VariantType::Bool,
            Self::I8(_) => VariantType::I8,
            Self::I16(_) => VariantType::I16,
            Self::I32(_) => VariantType::I32,
            Self::I64(_) => VariantType::I64,
            Self::U8(_) => VariantType::U8,
            Self::U16(_) => VariantType::U16,
            Self::U32(_) => VariantType::U32,
            Self::U64(_) => VariantType::U64,
            Self::F32(_) => VariantType::F32,
            Self::F64(_) => VariantType::F64,
            Self::String(_) => VariantType::String,
            Self::IntRange(_) => VariantType::IntRange,
            Self::FloatRange(_) => VariantType::FloatRange,
            Self::Color(_) => VariantType::Color,
            Self::IntPoint(_) => VariantType::IntPoint,
            Self::FloatPoint(_) => VariantType::FloatPoint,
            Self::Size(_) => VariantType::Size,
            Self::Argb(_) => VariantType::Argb,
            Self::Image(_) => VariantType::Image,
            Self::Array(_) => VariantType::Array,
            Self::Array2 { .. } => VariantType::Array2,
        }
    }

    /// Whether the value is [`Variant::Empty`]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Boolean value, if this is a `Bool`
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// String slice, if this is a `String`
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Image reference, if this is an `Image`
    #[must_use]
    pub fn as_image(&self) -> Option<&PixelBuffer> {
        match self {
            Self::Image(img) => Some(img),
            _ => None,
        }
    }

    /// Take the image out of the value, if this is an `Image`
    #[must_use]
    pub fn into_image(self) -> Option<PixelBuffer> {
        match self {
            Self::Image(img) => Some(img),
            _ => None,
        }
    }

    /// Lossy f64 view of a numeric value
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Bool(v) => Some(f64::from(u8::from(*v))),
            Self::I8(v) => Some(f64::from(*v)),
            Self::I16(v) => Some(f64::from(*v)),
            Self::I32(v) => Some(f64::from(*v)),
            Self::I64(v) => Some(*v as f64),
            Self::U8(v) => Some(f64::from(*v)),
            Self::U16(v) => Some(f64::from(*v)),
            Self::U32(v) => Some(f64::from(*v)),
            Self::U64(v) => Some(*v as f64),
            Self::F32(v) => Some(f64::from(*v)),
            Self::F64(v) => Some(*v),
            Self::Argb(v) => Some(f64::from(*v)),
            _ => None,
        }
    }

    /// Narrowing i64 view of a numeric value (floats truncate)
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Bool(v) => Some(i64::from(*v)),
            Self::I8(v) => Some(i64::from(*v)),
            Self::I16(v) => Some(i64::from(*v)),
            Self::I32(v) => Some(i64::from(*v)),
            Self::I64(v) => Some(*v),
            Self::U8(v) => Some(i64::from(*v)),
            Self::U16(v) => Some(i64::from(*v)),
            Self::U32(v) => Some(i64::from(*v)),
            Self::U64(v) => Some(*v as i64),
            Self::F32(v) => Some(*v as i64),
            Self::F64(v) => Some(*v as i64),
            Self::Argb(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    /// u32 view of a numeric value (convenience for counters and sizes)
    #[must_use]
    pub fn as_u32(&self) -> Option<u32> {
        self.as_i64().map(|v| v as u32)
    }

    /// f32 view of a numeric value
    #[must_use]
    pub fn as_f32(&self) -> Option<f32> {
        self.as_f64().map(|v| v as f32)
    }

    /// Convert the value to the requested type
    ///
    /// Identity conversions clone; numeric conversions narrow with `as`
    /// semantics; numeric↔string go through formatting/parsing; a scalar
    /// converts to a one-element array and back. `Image` converts only to
    /// itself.
    ///
    /// # Errors
    ///
    /// `IncompatibleTypes` for disjoint pairs, `InvalidFormat` when a string
    /// cannot be parsed as the target type.
    pub fn change_type(&self, target: VariantType) -> Result<Variant> {
        if self.variant_type() == target {
            return Ok(self.clone());
        }

        match target {
            VariantType::Empty => Err(PluginError::IncompatibleTypes),
            VariantType::Array => Ok(Variant::Array(vec![self.scalar_for_array()?])),
            VariantType::Array2 => Ok(Variant::Array2 {
                cols: 1,
                data: vec![self.scalar_for_array()?],
            }),
            _ => match self {
                Variant::Array(items) if items.len() == 1 => items[0].change_type(target),
                Variant::Array(_) => Err(PluginError::IncompatibleTypes),
                Variant::Array2 { data, .. } if data.len() == 1 => data[0].change_type(target),
                Variant::Array2 { .. } => Err(PluginError::IncompatibleTypes),
                _ => self.change_scalar_type(target),
            },
        }
    }

    // A scalar headed into a one-element array; arrays themselves do not nest
    // through conversion.
    fn scalar_for_array(&self) -> Result<Variant> {
        match self {
            Variant::Empty | Variant::Array(_) | Variant::Array2 { .. } => {
                Err(PluginError::IncompatibleTypes)
            }
            other => Ok(other.clone()),
        }
    }

    fn change_scalar_type(&self, target: VariantType) -> Result<Variant> {
        // Numeric group: everything representable as f64/i64 interconverts.
        if self.variant_type().is_numeric() && target.is_numeric() {
            return Ok(numeric_to(self, target));
        }

        // Numeric/structured -> string.
        if target == VariantType::String {
            return match self {
                Variant::Image(_) | Variant::Empty => Err(PluginError::IncompatibleTypes),
                other => Ok(Variant::String(other.to_string())),
            };
        }

        // String -> anything parseable.
        if let Variant::String(s) = self {
            return parse_as(s, target);
        }

        // Color <-> packed ARGB.
        match (self, target) {
            (Variant::Color(c), VariantType::Argb) => {
                let argb = (u32::from(c.a) << 24)
                    | (u32::from(c.r) << 16)
                    | (u32::from(c.g) << 8)
                    | u32::from(c.b);
                return Ok(Variant::Argb(argb));
            }
            (Variant::Argb(v), VariantType::Color) => {
                return Ok(Variant::Color(Rgba::new(
                    ((v >> 16) & 0xFF) as u8,
                    ((v >> 8) & 0xFF) as u8,
                    (v & 0xFF) as u8,
                    ((v >> 24) & 0xFF) as u8,
                )));
            }
            // Numeric -> color goes through the packed form.
            (other, VariantType::Color) if other.variant_type().is_numeric() => {
                let packed = other.as_i64().unwrap_or(0) as u32;
                return Variant::Argb(packed).change_scalar_type(VariantType::Color);
            }
            (Variant::Color(_), t) if t.is_numeric() => {
                let packed = self.change_scalar_type(VariantType::Argb)?;
                return Ok(numeric_to(&packed, t));
            }
            // Range/point pairs widen and narrow between int and float forms.
            (Variant::IntRange(r), VariantType::FloatRange) => {
                return Ok(Variant::FloatRange(FloatRange {
                    min: r.min as f32,
                    max: r.max as f32,
                }));
            }
            (Variant::FloatRange(r), VariantType::IntRange) => {
                return Ok(Variant::IntRange(IntRange {
                    min: r.min as i32,
                    max: r.max as i32,
                }));
            }
            (Variant::IntPoint(p), VariantType::FloatPoint) => {
                return Ok(Variant::FloatPoint(FloatPoint {
                    x: p.x as f32,
                    y: p.y as f32,
                }));
            }
            (Variant::FloatPoint(p), VariantType::IntPoint) => {
                return Ok(Variant::IntPoint(IntPoint {
                    x: p.x as i32,
                    y: p.y as i32,
                }));
            }
            _ => {}
        }

        Err(PluginError::IncompatibleTypes)
    }
}

fn numeric_to(value: &Variant, target: VariantType) -> Variant {
    let f = value.as_f64().unwrap_or(0.0);
    let i = value.as_i64().unwrap_or(0);

    match target {
        VariantType::Bool => Variant::Bool(i != 0 || f != 0.0),
        VariantType::I8 => Variant::I8(i as i8),
        VariantType::I16 => Variant::I16(i as i16),
        VariantType::I32 => Variant::I32(i as i32),
        VariantType::I64 => Variant::I64(i),
        VariantType::U8 => Variant::U8(i as u8),
        VariantType::U16 => Variant::U16(i as u16),
        VariantType::U32 => Variant::U32(i as u32),
        VariantType::U64 => Variant::U64(i as u64),
        VariantType::F32 => Variant::F32(f as f32),
        VariantType::F64 => Variant::F64(f),
        VariantType::Argb => Variant::Argb(i as u32),
        _ => unreachable!("numeric_to called with non-numeric target"),
    }
}

fn parse_as(s: &str, target: VariantType) -> Result<Variant> {
    let bad = || PluginError::InvalidFormat(format!("cannot parse {s:?}"));
    let t = s.trim();

    match target {
        VariantType::Bool => match t.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(Variant::Bool(true)),
            "false" | "0" | "no" | "off" => Ok(Variant::Bool(false)),
            _ => Err(bad()),
        },
        VariantType::I8 => t.parse().map(Variant::I8).map_err(|_| bad()),
        VariantType::I16 => t.parse().map(Variant::I16).map_err(|_| bad()),
        VariantType::I32 => t.parse().map(Variant::I32).map_err(|_| bad()),
        VariantType::I64 => t.parse().map(Variant::I64).map_err(|_| bad()),
        VariantType::U8 => t.parse().map(Variant::U8).map_err(|_| bad()),
        VariantType::U16 => t.parse().map(Variant::U16).map_err(|_| bad()),
        VariantType::U32 => t.parse().map(Variant::U32).map_err(|_| bad()),
        VariantType::U64 => t.parse().map(Variant::U64).map_err(|_| bad()),
        VariantType::F32 => t.parse().map(Variant::F32).map_err(|_| bad()),
        VariantType::F64 => t.parse().map(Variant::F64).map_err(|_| bad()),
        VariantType::Argb => u32::from_str_radix(t.trim_start_matches("0x"), 16)
            .map(Variant::Argb)
            .map_err(|_| bad()),
        VariantType::IntRange => {
            let (min, max) = parse_pair(t).ok_or_else(bad)?;
            Ok(Variant::IntRange(IntRange { min, max }))
        }
        VariantType::FloatRange => {
            let (min, max) = parse_pair(t).ok_or_else(bad)?;
            Ok(Variant::FloatRange(FloatRange { min, max }))
        }
        VariantType::IntPoint => {
            let (x, y) = parse_pair(t).ok_or_else(bad)?;
            Ok(Variant::IntPoint(IntPoint { x, y }))
        }
        VariantType::FloatPoint => {
            let (x, y) = parse_pair(t).ok_or_else(bad)?;
            Ok(Variant::FloatPoint(FloatPoint { x, y }))
        }
        VariantType::Size => {
            let (width, height) = parse_pair(t).ok_or_else(bad)?;
            Ok(Variant::Size(SizeValue { width, height }))
        }
        VariantType::Color => {
            let packed = u32::from_str_radix(t.trim_start_matches('#'), 16).map_err(|_| bad())?;
            Variant::Argb(packed).change_type(VariantType::Color)
        }
        _ => Err(PluginError::IncompatibleTypes),
    }
}

fn parse_pair<T: std::str::FromStr>(s: &str) -> Option<(T, T)> {
    let mut parts = s.split(',').map(str::trim);
    let a = parts.next()?.parse().ok()?;
    let b = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((a, b))
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, ""),
            Self::Bool(v) => write!(f, "{v}"),
            Self::I8(v) => write!(f, "{v}"),
            Self::I16(v) => write!(f, "{v}"),
            Self::I32(v) => write!(f, "{v}"),
            Self::I64(v) => write!(f, "{v}"),
            Self::U8(v) => write!(f, "{v}"),
            Self::U16(v) => write!(f, "{v}"),
            Self::U32(v) => write!(f, "{v}"),
            Self::U64(v) => write!(f, "{v}"),
            Self::F32(v) => write!(f, "{v}"),
            Self::F64(v) => write!(f, "{v}"),
            Self::String(s) => f.write_str(s),
            Self::IntRange(r) => write!(f, "{}, {}", r.min, r.max),
            Self::FloatRange(r) => write!(f, "{}, {}", r.min, r.max),
            Self::Color(c) => write!(
                f,
                "{:08X}",
                (u32::from(c.a) << 24) | (u32::from(c.r) << 16) | (u32::from(c.g) << 8) | u32::from(c.b)
            ),
            Self::IntPoint(p) => write!(f, "{}, {}", p.x, p.y),
            Self::FloatPoint(p) => write!(f, "{}, {}", p.x, p.y),
            Self::Size(s) => write!(f, "{}, {}", s.width, s.height),
            Self::Argb(v) => write!(f, "{v:08X}"),
            Self::Image(img) => {
                write!(f, "[image {}x{} {}]", img.width(), img.height(), img.format())
            }
            Self::Array(items) => write!(f, "[array of {}]", items.len()),
            Self::Array2 { cols, data } => {
                let rows = if *cols == 0 { 0 } else { data.len() / cols };
                write!(f, "[array of {rows}x{cols}]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_image::PixelFormat;

    #[test]
    fn test_identity_conversion() {
        let values = [
            Variant::Bool(true),
            Variant::U8(42),
            Variant::F64(1.5),
            Variant::String("hi".into()),
            Variant::IntRange(IntRange { min: 1, max: 9 }),
            Variant::Array(vec![Variant::U8(1), Variant::U8(2)]),
        ];
        for v in values {
            assert_eq!(v.change_type(v.variant_type()).unwrap(), v);
        }
    }

    #[test]
    fn test_numeric_widening_and_narrowing() {
        assert_eq!(
            Variant::U8(200).change_type(VariantType::I64).unwrap(),
            Variant::I64(200)
        );
        assert_eq!(
            Variant::I32(-1).change_type(VariantType::U8).unwrap(),
            Variant::U8(255)
        );
        assert_eq!(
            Variant::F64(3.7).change_type(VariantType::I32).unwrap(),
            Variant::I32(3)
        );
        assert_eq!(
            Variant::Bool(true).change_type(VariantType::F32).unwrap(),
            Variant::F32(1.0)
        );
    }

    #[test]
    fn test_numeric_string_round_trip() {
        let v = Variant::I32(-17).change_type(VariantType::String).unwrap();
        assert_eq!(v, Variant::String("-17".into()));
        assert_eq!(v.change_type(VariantType::I32).unwrap(), Variant::I32(-17));

        assert!(matches!(
            Variant::String("not a number".into()).change_type(VariantType::U16),
            Err(PluginError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_scalar_array_round_trip() {
        let arr = Variant::U16(9).change_type(VariantType::Array).unwrap();
        assert_eq!(arr, Variant::Array(vec![Variant::U16(9)]));
        assert_eq!(arr.change_type(VariantType::U16).unwrap(), Variant::U16(9));

        let long = Variant::Array(vec![Variant::U8(1), Variant::U8(2)]);
        assert!(matches!(
            long.change_type(VariantType::U8),
            Err(PluginError::IncompatibleTypes)
        ));
    }

    #[test]
    fn test_color_argb_round_trip() {
        let color = Variant::Color(Rgba::new(0x11, 0x22, 0x33, 0xFF));
        let argb = color.change_type(VariantType::Argb).unwrap();
        assert_eq!(argb, Variant::Argb(0xFF11_2233));
        assert_eq!(argb.change_type(VariantType::Color).unwrap(), color);
    }

    #[test]
    fn test_range_point_widening() {
        let r = Variant::IntRange(IntRange { min: 2, max: 8 });
        let fr = r.change_type(VariantType::FloatRange).unwrap();
        assert_eq!(
            fr,
            Variant::FloatRange(FloatRange { min: 2.0, max: 8.0 })
        );
        assert_eq!(fr.change_type(VariantType::IntRange).unwrap(), r);
    }

    #[test]
    fn test_string_pair_parsing() {
        assert_eq!(
            Variant::String("3, 7".into())
                .change_type(VariantType::IntRange)
                .unwrap(),
            Variant::IntRange(IntRange { min: 3, max: 7 })
        );
        assert_eq!(
            Variant::String("640, 480".into())
                .change_type(VariantType::Size)
                .unwrap(),
            Variant::Size(SizeValue { width: 640, height: 480 })
        );
    }

    #[test]
    fn test_image_is_disjoint() {
        let img = Variant::Image(PixelBuffer::allocate(2, 2, PixelFormat::Gray8).unwrap());
        assert!(matches!(
            img.change_type(VariantType::String),
            Err(PluginError::IncompatibleTypes)
        ));
        assert!(matches!(
            Variant::U32(5).change_type(VariantType::Image),
            Err(PluginError::IncompatibleTypes)
        ));
        assert!(img.change_type(VariantType::Image).is_ok());
    }

    #[test]
    fn test_empty_conversions() {
        assert!(Variant::Empty.change_type(VariantType::Empty).is_ok());
        assert!(matches!(
            Variant::Empty.change_type(VariantType::I32),
            Err(PluginError::IncompatibleTypes)
        ));
    }
}
