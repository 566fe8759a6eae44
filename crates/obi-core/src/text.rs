//! Banner text layout
//!
//! Text is set in a single line with one of two non-embedded fonts:
//!
//! - printable ASCII only: standard Helvetica, WinAnsi encoding
//! - anything else: the standard Japanese gothic CID font `HeiseiKakuGo-W5`
//!   through the `UniJIS-UCS2-HW-H` CMap, which maps ASCII and half-width
//!   kana to half-width glyphs (500 units) and everything else to full width
//!   (1000 units)
//!
//! Widths are known without reading font programs, so layout is exact and
//! deterministic.

use lopdf::{dictionary, Document, Object, ObjectId, StringFormat};

/// Rendered text height may use at most this share of the band height
pub const TEXT_HEIGHT_RATIO: f64 = 0.7;

/// Font size floor before fitting to the band width
pub const MIN_FONT_SIZE: f64 = 8.0;

/// Helvetica advance widths for 0x20..=0x7E (AFM, 1/1000 em)
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // space - /
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // 0 - 9
    278, 278, 584, 584, 584, 556, 1015, // : - @
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, // A - M
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // N - Z
    278, 278, 278, 469, 556, 333, // [ - `
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, // a - m
    556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, // n - z
    334, 260, 334, 584, // { - ~
];

/// Font used for a piece of banner text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BannerFont {
    Helvetica,
    JapaneseGothic,
}

impl BannerFont {
    /// Pick the font able to show every character of `text`
    pub fn for_text(text: &str) -> Self {
        if text.chars().all(|c| (' '..='~').contains(&c)) {
            BannerFont::Helvetica
        } else {
            BannerFont::JapaneseGothic
        }
    }

    /// Ascent above the baseline, 1/1000 em
    pub fn ascent(&self) -> f64 {
        match self {
            BannerFont::Helvetica => 718.0,
            BannerFont::JapaneseGothic => 880.0,
        }
    }

    /// Descent below the baseline (negative), 1/1000 em
    pub fn descent(&self) -> f64 {
        match self {
            BannerFont::Helvetica => -207.0,
            BannerFont::JapaneseGothic => -120.0,
        }
    }

    /// Rendered line height per point of font size
    pub fn height_per_point(&self) -> f64 {
        (self.ascent() - self.descent()) / 1000.0
    }

    fn char_width(&self, c: char) -> f64 {
        match self {
            BannerFont::Helvetica => {
                let index = (c as usize).saturating_sub(0x20);
                HELVETICA_WIDTHS.get(index).copied().unwrap_or(556) as f64
            }
            BannerFont::JapaneseGothic => {
                if is_half_width(c) {
                    500.0
                } else {
                    1000.0
                }
            }
        }
    }

    /// Advance width of `text` in 1/1000 em
    pub fn text_units(&self, text: &str) -> f64 {
        text.chars().map(|c| self.char_width(c)).sum()
    }

    /// Encode `text` as a `Tj` operand for this font
    pub fn encode(&self, text: &str) -> Object {
        match self {
            BannerFont::Helvetica => {
                Object::String(text.as_bytes().to_vec(), StringFormat::Literal)
            }
            BannerFont::JapaneseGothic => {
                let mut bytes = Vec::with_capacity(text.len() * 2);
                for unit in text.encode_utf16() {
                    bytes.extend_from_slice(&unit.to_be_bytes());
                }
                Object::String(bytes, StringFormat::Hexadecimal)
            }
        }
    }

    /// Write the font into the document and return its id
    pub fn add_to(&self, doc: &mut Document) -> ObjectId {
        match self {
            BannerFont::Helvetica => doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => "Helvetica",
                "Encoding" => "WinAnsiEncoding",
            }),
            BannerFont::JapaneseGothic => {
                let descriptor_id = doc.add_object(dictionary! {
                    "Type" => "FontDescriptor",
                    "FontName" => "HeiseiKakuGo-W5",
                    "Flags" => 4,
                    "FontBBox" => vec![(-92).into(), (-250).into(), 1010.into(), 922.into()],
                    "ItalicAngle" => 0,
                    "Ascent" => 880,
                    "Descent" => -120,
                    "CapHeight" => 737,
                    "StemV" => 114,
                });
                let cid_font_id = doc.add_object(dictionary! {
                    "Type" => "Font",
                    "Subtype" => "CIDFontType0",
                    "BaseFont" => "HeiseiKakuGo-W5",
                    "CIDSystemInfo" => dictionary! {
                        "Registry" => Object::string_literal("Adobe"),
                        "Ordering" => Object::string_literal("Japan1"),
                        "Supplement" => 2,
                    },
                    "FontDescriptor" => Object::Reference(descriptor_id),
                    "DW" => 1000,
                    // Half-width roman and kana
                    "W" => vec![231.into(), 389.into(), 500.into()],
                });
                doc.add_object(dictionary! {
                    "Type" => "Font",
                    "Subtype" => "Type0",
                    "BaseFont" => "HeiseiKakuGo-W5-UniJIS-UCS2-HW-H",
                    "Encoding" => "UniJIS-UCS2-HW-H",
                    "DescendantFonts" => vec![Object::Reference(cid_font_id)],
                })
            }
        }
    }
}

/// Characters drawn with half-width glyphs by `UniJIS-UCS2-HW-H`
fn is_half_width(c: char) -> bool {
    (' '..='~').contains(&c) || ('\u{FF61}'..='\u{FF9F}').contains(&c)
}

/// Make `text` printable on one line: control characters become spaces and
/// characters outside the Basic Multilingual Plane (not reachable through a
/// UCS-2 CMap) become `?`.
pub fn sanitize(text: &str) -> String {
    text.trim()
        .chars()
        .map(|c| {
            if c.is_control() {
                ' '
            } else if (c as u32) > 0xFFFF {
                '?'
            } else {
                c
            }
        })
        .collect()
}

/// Single line of text placed inside a band
#[derive(Debug, Clone, PartialEq)]
pub struct TextLayout {
    pub font: BannerFont,
    pub text: String,
    pub font_size: f64,
    /// Baseline start, displayed page space
    pub x: f64,
    pub y: f64,
    /// Advance width at `font_size`
    pub width: f64,
}

impl TextLayout {
    /// Lay out `text` centered in a band of `band_width x band_height` whose
    /// bottom-left corner is at `(origin_x, origin_y)`.
    ///
    /// The font size is the largest whose line height stays within
    /// `TEXT_HEIGHT_RATIO` of the band height, but at least `MIN_FONT_SIZE`.
    /// If the line is then wider than the band less `side_margin` on each
    /// side, the size shrinks until it fits. Width wins over the floor: the
    /// text never wraps and never spills over the band edge.
    pub fn centered(
        text: &str,
        origin_x: f64,
        origin_y: f64,
        band_width: f64,
        band_height: f64,
        side_margin: f64,
    ) -> Option<Self> {
        let text = sanitize(text);
        if text.is_empty() {
            return None;
        }

        let font = BannerFont::for_text(&text);
        let units = font.text_units(&text);

        let mut font_size = (band_height * TEXT_HEIGHT_RATIO / font.height_per_point())
            .max(MIN_FONT_SIZE);

        let available_width = (band_width - 2.0 * side_margin).max(0.0);
        if units > 0.0 && units * font_size / 1000.0 > available_width {
            font_size = available_width * 1000.0 / units;
        }
        if font_size <= 0.0 {
            return None;
        }

        let width = units * font_size / 1000.0;
        let center_x = origin_x + band_width / 2.0;
        let center_y = origin_y + band_height / 2.0;
        // Glyph box spans baseline + descent .. baseline + ascent
        let box_middle = (font.ascent() + font.descent()) / 2.0 / 1000.0 * font_size;

        Some(Self {
            font,
            text,
            font_size,
            x: center_x - width / 2.0,
            y: center_y - box_middle,
            width,
        })
    }

    /// Bounding box of the rendered line as (x0, y0, x1, y1)
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        (
            self.x,
            self.y + self.font.descent() / 1000.0 * self.font_size,
            self.x + self.width,
            self.y + self.font.ascent() / 1000.0 * self.font_size,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_font_choice() {
        assert_eq!(BannerFont::for_text("OPEN HOUSE 10:00"), BannerFont::Helvetica);
        assert_eq!(BannerFont::for_text("テスト"), BannerFont::JapaneseGothic);
        assert_eq!(BannerFont::for_text("Café"), BannerFont::JapaneseGothic);
    }

    #[test]
    fn test_helvetica_widths() {
        let font = BannerFont::Helvetica;
        assert_eq!(font.text_units(" "), 278.0);
        assert_eq!(font.text_units("A"), 667.0);
        assert_eq!(font.text_units("i"), 222.0);
        assert_eq!(font.text_units("~"), 584.0);
        assert_eq!(font.text_units("Hi"), 722.0 + 222.0);
    }

    #[test]
    fn test_cjk_widths() {
        let font = BannerFont::JapaneseGothic;
        assert_eq!(font.text_units("テスト"), 3000.0);
        assert_eq!(font.text_units("3LDK"), 2000.0);
        assert_eq!(font.text_units("ｱｲ"), 1000.0);
    }

    #[test]
    fn test_encode_cjk_is_utf16be_hex() {
        match BannerFont::JapaneseGothic.encode("テ") {
            Object::String(bytes, StringFormat::Hexadecimal) => assert_eq!(bytes, vec![0x30, 0xC6]),
            other => panic!("unexpected operand {:?}", other),
        }
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("  line1\nline2 "), "line1 line2");
        assert_eq!(sanitize("🏠 sale"), "? sale");
    }

    #[test]
    fn test_font_size_from_band_height() {
        // 100pt band, short text: height-limited
        let layout = TextLayout::centered("テスト", 0.0, 0.0, 600.0, 100.0, 0.0).unwrap();
        assert!((layout.font_size - 70.0).abs() < 1e-9);
        let (_, y0, _, y1) = layout.bounds();
        assert!(y1 - y0 <= 70.0 + 1e-9);
    }

    #[test]
    fn test_font_size_floor() {
        let layout = TextLayout::centered("A", 0.0, 0.0, 600.0, 5.0, 0.0).unwrap();
        assert_eq!(layout.font_size, MIN_FONT_SIZE);
    }

    #[test]
    fn test_long_text_shrinks_to_width() {
        let text = "物件概要物件概要物件概要物件概要物件概要";
        let layout = TextLayout::centered(text, 0.0, 0.0, 200.0, 100.0, 4.0).unwrap();
        assert!(layout.width <= 192.0 + 1e-9);
        assert!(layout.font_size < 70.0);
        let (x0, _, x1, _) = layout.bounds();
        assert!(x0 >= 4.0 - 1e-9);
        assert!(x1 <= 196.0 + 1e-9);
    }

    #[test]
    fn test_centering() {
        let layout = TextLayout::centered("テスト", 10.0, 600.0, 595.0, 170.0, 0.0).unwrap();
        let (x0, y0, x1, y1) = layout.bounds();
        assert!(((x0 + x1) / 2.0 - (10.0 + 297.5)).abs() < 1e-6);
        assert!(((y0 + y1) / 2.0 - 685.0).abs() < 1e-6);
    }

    #[test]
    fn test_blank_text_has_no_layout() {
        assert_eq!(TextLayout::centered("   ", 0.0, 0.0, 100.0, 50.0, 0.0), None);
    }
}
