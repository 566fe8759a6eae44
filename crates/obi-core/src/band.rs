//! Band settings and replacement model
//!
//! `BandSettings` is the wire shape sent by the editor (camelCase JSON).
//! `BandSpec` is the validated form the compositor consumes: a checked
//! geometry plus exactly one replacement variant.

use serde::{Deserialize, Serialize};

use crate::color::Rgb;
use crate::error::CompositeError;

/// Smallest allowed band height in millimeters
pub const MIN_BAND_HEIGHT_MM: f64 = 10.0;

/// Largest allowed band height in millimeters
pub const MAX_BAND_HEIGHT_MM: f64 = 200.0;

/// Band height and distance from the top edge of the page, in millimeters
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BandGeometry {
    height_mm: f64,
    y_offset_mm: f64,
}

impl BandGeometry {
    /// Validate and build a geometry
    pub fn new(height_mm: f64, y_offset_mm: f64) -> Result<Self, CompositeError> {
        if !height_mm.is_finite() || !y_offset_mm.is_finite() {
            return Err(CompositeError::InvalidGeometry(
                "height and offset must be finite numbers".into(),
            ));
        }
        if !(MIN_BAND_HEIGHT_MM..=MAX_BAND_HEIGHT_MM).contains(&height_mm) {
            return Err(CompositeError::InvalidGeometry(format!(
                "height {}mm outside {}-{}mm",
                height_mm, MIN_BAND_HEIGHT_MM, MAX_BAND_HEIGHT_MM
            )));
        }
        if y_offset_mm < 0.0 {
            return Err(CompositeError::InvalidGeometry(format!(
                "offset {}mm must not be negative",
                y_offset_mm
            )));
        }
        Ok(Self {
            height_mm,
            y_offset_mm,
        })
    }

    /// Build a geometry, pulling out-of-range values back into range.
    /// Non-finite values fall back to the smallest band at the top.
    pub fn clamped(height_mm: f64, y_offset_mm: f64) -> Self {
        let height_mm = if height_mm.is_finite() {
            height_mm.clamp(MIN_BAND_HEIGHT_MM, MAX_BAND_HEIGHT_MM)
        } else {
            MIN_BAND_HEIGHT_MM
        };
        let y_offset_mm = if y_offset_mm.is_finite() {
            y_offset_mm.max(0.0)
        } else {
            0.0
        };
        Self {
            height_mm,
            y_offset_mm,
        }
    }

    pub fn height_mm(&self) -> f64 {
        self.height_mm
    }

    pub fn y_offset_mm(&self) -> f64 {
        self.y_offset_mm
    }

    /// Distance from the top edge of the page to the bottom of the band
    pub fn bottom_mm(&self) -> f64 {
        self.y_offset_mm + self.height_mm
    }
}

/// Image formats accepted as band replacements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
}

impl ImageFormat {
    /// Detect the format from the leading bytes
    pub fn sniff(bytes: &[u8]) -> Result<Self, CompositeError> {
        match image::guess_format(bytes) {
            Ok(image::ImageFormat::Png) => Ok(ImageFormat::Png),
            Ok(image::ImageFormat::Jpeg) => Ok(ImageFormat::Jpeg),
            Ok(image::ImageFormat::Gif) => Ok(ImageFormat::Gif),
            Ok(other) => Err(CompositeError::UnsupportedMediaType(format!(
                "{:?} images are not supported (use PNG, JPEG or GIF)",
                other
            ))),
            Err(_) => Err(CompositeError::UnsupportedMediaType(
                "unrecognized image data".into(),
            )),
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Gif => "image/gif",
        }
    }

    pub(crate) fn as_image_format(&self) -> image::ImageFormat {
        match self {
            ImageFormat::Png => image::ImageFormat::Png,
            ImageFormat::Jpeg => image::ImageFormat::Jpeg,
            ImageFormat::Gif => image::ImageFormat::Gif,
        }
    }
}

/// Replace the band with an uploaded picture
#[derive(Debug, Clone, PartialEq)]
pub struct ImageReplacement {
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
}

impl ImageReplacement {
    /// Build from raw bytes, detecting the format
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, CompositeError> {
        let format = ImageFormat::sniff(&bytes)?;
        Ok(Self { bytes, format })
    }
}

/// Replace the band with a solid color and optional centered text
#[derive(Debug, Clone, PartialEq)]
pub struct ColorTextReplacement {
    pub background: Rgb,
    pub text: Option<String>,
    pub text_color: Rgb,
}

impl ColorTextReplacement {
    /// Text to draw, or `None` when absent or blank
    pub fn visible_text(&self) -> Option<&str> {
        self.text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }
}

/// What gets drawn into the band
#[derive(Debug, Clone, PartialEq)]
pub enum Replacement {
    Image(ImageReplacement),
    ColorText(ColorTextReplacement),
}

/// Validated per-request band configuration
#[derive(Debug, Clone, PartialEq)]
pub struct BandSpec {
    pub geometry: BandGeometry,
    pub replacement: Replacement,
}

impl BandSpec {
    pub fn new(geometry: BandGeometry, replacement: Replacement) -> Self {
        Self {
            geometry,
            replacement,
        }
    }
}

/// Band settings as sent by the editor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BandSettings {
    /// Band height in millimeters
    pub height: f64,
    /// Offset from the top edge in millimeters
    #[serde(default)]
    pub y_offset: f64,
    #[serde(default)]
    pub background_color: Option<String>,
    #[serde(default)]
    pub text_content: Option<String>,
    #[serde(default)]
    pub text_color: Option<String>,
}

impl BandSettings {
    /// Validate the settings and pick the replacement variant.
    ///
    /// An image always wins. Without one, a color banner is built from the
    /// background color and text; when neither is given there is nothing to
    /// draw and the request is rejected.
    pub fn into_spec(self, image: Option<ImageReplacement>) -> Result<BandSpec, CompositeError> {
        let geometry = BandGeometry::new(self.height, self.y_offset)?;

        if let Some(image) = image {
            return Ok(BandSpec::new(geometry, Replacement::Image(image)));
        }

        let background = non_blank(self.background_color.as_deref());
        let text = self
            .text_content
            .filter(|text| !text.trim().is_empty());

        if background.is_none() && text.is_none() {
            return Err(CompositeError::MissingReplacement);
        }

        let background = background.map(Rgb::from_hex).transpose()?.unwrap_or(Rgb::WHITE);
        let text_color = non_blank(self.text_color.as_deref())
            .map(Rgb::from_hex)
            .transpose()?
            .unwrap_or(Rgb::BLACK);

        Ok(BandSpec::new(
            geometry,
            Replacement::ColorText(ColorTextReplacement {
                background,
                text,
                text_color,
            }),
        ))
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
