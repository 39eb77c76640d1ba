//! Option values and the enumerations they are built from

use crate::{Error, Result};
use std::fmt::{self, Display};

/// Declared type of an option value (`enum lis_value_type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Bool = 0,
    Integer = 1,
    Double = 2,
    String = 3,
    ImageFormat = 4,
}

impl ValueType {
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::Bool),
            1 => Some(Self::Integer),
            2 => Some(Self::Double),
            3 => Some(Self::String),
            4 => Some(Self::ImageFormat),
            _ => None,
        }
    }
}

impl Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Bool => "Bool",
            Self::Integer => "Integer",
            Self::Double => "Double",
            Self::String => "String",
            Self::ImageFormat => "ImageFormat",
        })
    }
}

/// Unit of an integer or double option (`enum lis_unit`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Unit {
    #[default]
    None = 0,
    Pixel = 1,
    Bit = 2,
    Mm = 3,
    Dpi = 4,
    Percent = 5,
    Microsecond = 6,
}

impl Unit {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            1 => Self::Pixel,
            2 => Self::Bit,
            3 => Self::Mm,
            4 => Self::Dpi,
            5 => Self::Percent,
            6 => Self::Microsecond,
            _ => Self::None,
        }
    }
}

impl Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "None",
            Self::Pixel => "Pixel",
            Self::Bit => "Bit",
            Self::Mm => "MM",
            Self::Dpi => "DPI",
            Self::Percent => "Percent",
            Self::Microsecond => "Microsecond",
        })
    }
}

/// Format of the data returned by a scan session (`enum lis_img_format`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    /// 24 bits per pixel, 8 bits per channel, no header.
    RawRgb24 = 0,
    Grayscale8 = 1,
    Bw1 = 2,
    Bmp = 3,
    Ciff = 4,
    Exif = 5,
    FlashPix = 6,
    Gif = 7,
    Jpeg = 8,
    Png = 9,
    Ico = 10,
    Jpeg2k = 11,
    Jpeg2kx = 12,
    /// Windows BMP without its file header.
    MemoryBmp = 13,
    PhotoCd = 14,
    Pict = 15,
    Tiff = 16,
}

impl ImageFormat {
    pub const ALL: [Self; 17] = [
        Self::RawRgb24,
        Self::Grayscale8,
        Self::Bw1,
        Self::Bmp,
        Self::Ciff,
        Self::Exif,
        Self::FlashPix,
        Self::Gif,
        Self::Jpeg,
        Self::Png,
        Self::Ico,
        Self::Jpeg2k,
        Self::Jpeg2kx,
        Self::MemoryBmp,
        Self::PhotoCd,
        Self::Pict,
        Self::Tiff,
    ];

    pub fn from_raw(raw: i32) -> Option<Self> {
        usize::try_from(raw)
            .ok()
            .and_then(|i| Self::ALL.get(i))
            .copied()
    }

    pub fn as_raw(self) -> i32 {
        self as i32
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::RawRgb24 => "Raw RGB24",
            Self::Grayscale8 => "Grayscale 8",
            Self::Bw1 => "BW1",
            Self::Bmp => "BMP",
            Self::Ciff => "CIFF",
            Self::Exif => "EXIF",
            Self::FlashPix => "FlashPix",
            Self::Gif => "GIF",
            Self::Jpeg => "JPEG",
            Self::Png => "PNG",
            Self::Ico => "ICO",
            Self::Jpeg2k => "JPEG2K",
            Self::Jpeg2kx => "JPEG2KX",
            Self::MemoryBmp => "Memory BMP",
            Self::PhotoCd => "PhotoCD",
            Self::Pict => "Pict",
            Self::Tiff => "TIFF",
        }
    }
}

impl Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Value of a scan option (`union lis_value`, tagged with its type).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Integer(i32),
    Double(f64),
    String(String),
    ImageFormat(ImageFormat),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Bool(_) => ValueType::Bool,
            Value::Integer(_) => ValueType::Integer,
            Value::Double(_) => ValueType::Double,
            Value::String(_) => ValueType::String,
            Value::ImageFormat(_) => ValueType::ImageFormat,
        }
    }

    /// Coerce a textual value into `value_type`.
    ///
    /// This is the conversion libinsane's `lis_set_option()` applies to
    /// the strings it is given.
    pub fn parse(value_type: ValueType, text: &str) -> Result<Self> {
        let invalid = || Error::InvalidValue {
            value: text.to_string(),
            value_type: value_type.to_string(),
        };
        let trimmed = text.trim();
        match value_type {
            ValueType::Bool => match trimmed.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(Value::Bool(true)),
                "0" | "false" | "no" | "off" => Ok(Value::Bool(false)),
                _ => Err(invalid()),
            },
            ValueType::Integer => trimmed
                .parse::<i32>()
                .map(Value::Integer)
                .map_err(|_| invalid()),
            ValueType::Double => match trimmed.parse::<f64>() {
                Ok(v) if v.is_finite() => Ok(Value::Double(v)),
                _ => Err(invalid()),
            },
            ValueType::String => Ok(Value::String(text.to_string())),
            ValueType::ImageFormat => {
                let by_name = ImageFormat::ALL
                    .iter()
                    .find(|f| f.name().eq_ignore_ascii_case(trimmed));
                match by_name {
                    Some(format) => Ok(Value::ImageFormat(*format)),
                    None => trimmed
                        .parse::<i32>()
                        .ok()
                        .and_then(ImageFormat::from_raw)
                        .map(Value::ImageFormat)
                        .ok_or_else(invalid),
                }
            }
        }
    }

    /// Numeric view used by range constraints.
    pub(crate) fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(v) => Some(f64::from(*v)),
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{v}"),
            Value::Integer(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::String(v) => f.write_str(v),
            Value::ImageFormat(v) => write!(f, "{v}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_bool_spellings() {
        for text in ["1", "true", "YES", " on "] {
            assert_eq!(Value::parse(ValueType::Bool, text).unwrap(), Value::Bool(true));
        }
        for text in ["0", "False", "no", "off"] {
            assert_eq!(Value::parse(ValueType::Bool, text).unwrap(), Value::Bool(false));
        }
        assert!(Value::parse(ValueType::Bool, "maybe").is_err());
    }

    #[test]
    fn test_parse_numbers() {
        assert_eq!(
            Value::parse(ValueType::Integer, "300").unwrap(),
            Value::Integer(300)
        );
        assert_eq!(
            Value::parse(ValueType::Double, "12.5").unwrap(),
            Value::Double(12.5)
        );
        assert!(Value::parse(ValueType::Integer, "12.5").is_err());
        assert!(Value::parse(ValueType::Double, "NaN").is_err());
    }

    #[test]
    fn test_parse_string_keeps_text_verbatim() {
        assert_eq!(
            Value::parse(ValueType::String, " Color ").unwrap(),
            Value::String(" Color ".to_string())
        );
        assert_eq!(
            Value::parse(ValueType::String, "").unwrap(),
            Value::String(String::new())
        );
    }

    #[test]
    fn test_parse_image_format_by_name_or_id() {
        assert_eq!(
            Value::parse(ValueType::ImageFormat, "grayscale 8").unwrap(),
            Value::ImageFormat(ImageFormat::Grayscale8)
        );
        assert_eq!(
            Value::parse(ValueType::ImageFormat, "3").unwrap(),
            Value::ImageFormat(ImageFormat::Bmp)
        );
        assert!(Value::parse(ValueType::ImageFormat, "17").is_err());
    }

    #[test]
    fn test_invalid_value_error_names_type() {
        let err = Value::parse(ValueType::Integer, "abc").unwrap_err();
        assert_eq!(err.to_string(), "invalid Integer value 'abc'");
    }

    #[test]
    fn test_image_format_raw_ids() {
        for (i, format) in ImageFormat::ALL.iter().enumerate() {
            assert_eq!(format.as_raw(), i as i32);
            assert_eq!(ImageFormat::from_raw(i as i32), Some(*format));
        }
        assert_eq!(ImageFormat::from_raw(-1), None);
        assert_eq!(ImageFormat::MemoryBmp.to_string(), "Memory BMP");
    }

    proptest! {
        #[test]
        fn prop_integer_display_parses_back(v in any::<i32>()) {
            let text = Value::Integer(v).to_string();
            prop_assert_eq!(Value::parse(ValueType::Integer, &text).unwrap(), Value::Integer(v));
        }

        #[test]
        fn prop_double_display_parses_back(v in -1.0e9f64..1.0e9) {
            let text = Value::Double(v).to_string();
            prop_assert_eq!(Value::parse(ValueType::Double, &text).unwrap(), Value::Double(v));
        }
    }
}
