//! Replacement image decoding and embedding
//!
//! The image is decoded once per document and embedded as a single image
//! XObject shared by every page. Baseline JPEGs with gray or RGB data are
//! embedded as-is with `DCTDecode`. Everything else is decoded to 8-bit RGB
//! and stored with `FlateDecode`; a non-opaque alpha channel becomes a soft
//! mask.

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use tracing::debug;

use crate::band::{ImageFormat, ImageReplacement};
use crate::error::CompositeError;

/// Decoded image ready to be written into a document
#[derive(Debug, Clone)]
pub struct ImageXObject {
    pub width: u32,
    pub height: u32,
    color_space: &'static str,
    filter: &'static str,
    data: Vec<u8>,
    alpha: Option<Vec<u8>>,
}

impl ImageXObject {
    /// Decode and encode the replacement image for embedding
    pub fn prepare(replacement: &ImageReplacement) -> Result<Self, CompositeError> {
        let decoded = image::load_from_memory_with_format(
            &replacement.bytes,
            replacement.format.as_image_format(),
        )
        .map_err(|e| {
            CompositeError::UnsupportedMediaType(format!(
                "cannot decode {} image: {}",
                replacement.format.mime_type(),
                e
            ))
        })?;

        let (width, height) = (decoded.width(), decoded.height());
        if width == 0 || height == 0 {
            return Err(CompositeError::UnsupportedMediaType(
                "image has no pixels".into(),
            ));
        }

        if replacement.format == ImageFormat::Jpeg {
            if let Some(color_space) = jpeg_passthrough_color_space(&replacement.bytes) {
                debug!("Embedding {}x{} JPEG without re-encoding", width, height);
                return Ok(Self {
                    width,
                    height,
                    color_space,
                    filter: "DCTDecode",
                    data: replacement.bytes.clone(),
                    alpha: None,
                });
            }
        }

        let rgba = decoded.to_rgba8();
        let mut rgb = Vec::with_capacity((width * height * 3) as usize);
        let mut alpha = Vec::with_capacity((width * height) as usize);
        let mut has_alpha = false;
        for pixel in rgba.pixels() {
            let [r, g, b, a] = pixel.0;
            has_alpha |= a != 255;
            rgb.extend_from_slice(&[r, g, b]);
            alpha.push(a);
        }

        debug!(
            "Embedding {}x{} {} image (alpha: {})",
            width,
            height,
            replacement.format.mime_type(),
            has_alpha
        );

        Ok(Self {
            width,
            height,
            color_space: "DeviceRGB",
            filter: "FlateDecode",
            data: flate_compress(&rgb)?,
            alpha: if has_alpha {
                Some(flate_compress(&alpha)?)
            } else {
                None
            },
        })
    }

    #[cfg(test)]
    fn has_soft_mask(&self) -> bool {
        self.alpha.is_some()
    }

    /// Write the image (and its soft mask) into the document
    pub fn add_to(self, doc: &mut Document) -> ObjectId {
        let smask_id = self.alpha.map(|alpha| {
            let mask = Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => self.width as i64,
                    "Height" => self.height as i64,
                    "ColorSpace" => "DeviceGray",
                    "BitsPerComponent" => 8,
                    "Filter" => "FlateDecode",
                },
                alpha,
            );
            doc.add_object(mask)
        });

        let mut dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => self.width as i64,
            "Height" => self.height as i64,
            "ColorSpace" => self.color_space,
            "BitsPerComponent" => 8,
            "Filter" => self.filter,
        };
        if let Some(id) = smask_id {
            dict.set("SMask", Object::Reference(id));
        }

        let mut stream = Stream::new(dict, self.data);
        // Already compressed
        stream.allows_compression = false;
        doc.add_object(stream)
    }
}

fn flate_compress(data: &[u8]) -> Result<Vec<u8>, CompositeError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .and_then(|_| encoder.finish())
        .map_err(|e| CompositeError::OperationError(format!("image compression failed: {}", e)))
}

/// Color space for a JPEG that viewers can decode directly, `None` when it
/// must be re-encoded (CMYK/YCCK or an unreadable frame header)
fn jpeg_passthrough_color_space(bytes: &[u8]) -> Option<&'static str> {
    match jpeg_component_count(bytes)? {
        1 => Some("DeviceGray"),
        3 => Some("DeviceRGB"),
        _ => None,
    }
}

/// Read the component count from the first SOF marker
fn jpeg_component_count(bytes: &[u8]) -> Option<u8> {
    if bytes.len() < 4 || bytes[0] != 0xFF || bytes[1] != 0xD8 {
        return None;
    }

    let mut pos = 2;
    while pos + 4 <= bytes.len() {
        if bytes[pos] != 0xFF {
            return None;
        }
        let marker = bytes[pos + 1];
        // Fill bytes
        if marker == 0xFF {
            pos += 1;
            continue;
        }
        let length = u16::from_be_bytes([bytes[pos + 2], bytes[pos + 3]]) as usize;
        let is_sof = matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_sof {
            // FF Cx len(2) precision(1) height(2) width(2) components(1)
            return bytes.get(pos + 9).copied();
        }
        if marker == 0xDA || length < 2 {
            return None;
        }
        pos += 2 + length;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage, Rgba, RgbaImage};
    use std::io::Cursor;

    fn encode(image: DynamicImage, format: image::ImageFormat) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, format).unwrap();
        buffer.into_inner()
    }

    fn replacement(bytes: Vec<u8>) -> ImageReplacement {
        ImageReplacement::from_bytes(bytes).unwrap()
    }

    #[test]
    fn test_opaque_png_has_no_mask() {
        let png = encode(
            DynamicImage::ImageRgb8(RgbImage::from_pixel(100, 50, Rgb([10, 20, 30]))),
            image::ImageFormat::Png,
        );
        let xobject = ImageXObject::prepare(&replacement(png)).unwrap();
        assert_eq!((xobject.width, xobject.height), (100, 50));
        assert_eq!(xobject.filter, "FlateDecode");
        assert!(!xobject.has_soft_mask());
    }

    #[test]
    fn test_transparent_png_gets_soft_mask() {
        let png = encode(
            DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([255, 0, 0, 128]))),
            image::ImageFormat::Png,
        );
        let xobject = ImageXObject::prepare(&replacement(png)).unwrap();
        assert!(xobject.has_soft_mask());

        let mut doc = Document::with_version("1.7");
        let id = xobject.add_to(&mut doc);
        let stream = doc.get_object(id).unwrap().as_stream().unwrap();
        assert!(stream.dict.get(b"SMask").is_ok());
    }

    #[test]
    fn test_rgb_jpeg_passes_through() {
        let jpeg = encode(
            DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 8, Rgb([200, 100, 50]))),
            image::ImageFormat::Jpeg,
        );
        let xobject = ImageXObject::prepare(&replacement(jpeg.clone())).unwrap();
        assert_eq!(xobject.filter, "DCTDecode");
        assert_eq!(xobject.color_space, "DeviceRGB");
        assert_eq!(xobject.data, jpeg);
    }

    #[test]
    fn test_gif_is_reencoded() {
        let gif = encode(
            DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([0, 0, 255, 255]))),
            image::ImageFormat::Gif,
        );
        let xobject = ImageXObject::prepare(&replacement(gif)).unwrap();
        assert_eq!(xobject.filter, "FlateDecode");
        assert_eq!((xobject.width, xobject.height), (8, 8));
    }

    #[test]
    fn test_truncated_png_rejected() {
        let mut png = encode(
            DynamicImage::ImageRgb8(RgbImage::new(10, 10)),
            image::ImageFormat::Png,
        );
        png.truncate(20);
        let result = ImageXObject::prepare(&replacement(png));
        assert!(matches!(result, Err(CompositeError::UnsupportedMediaType(_))));
    }

    #[test]
    fn test_jpeg_component_count_rejects_non_jpeg() {
        assert_eq!(jpeg_component_count(b"not a jpeg"), None);
        assert_eq!(jpeg_component_count(&[0xFF, 0xD8]), None);
    }

    #[test]
    fn test_jpeg_component_count_reads_sof() {
        // SOI, SOF0 with 3 components
        let bytes = [
            0xFF, 0xD8, 0xFF, 0xC0, 0x00, 0x11, 0x08, 0x00, 0x10, 0x00, 0x10, 0x03,
        ];
        assert_eq!(jpeg_component_count(&bytes), Some(3));
    }
}
