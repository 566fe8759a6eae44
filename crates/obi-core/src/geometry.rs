//! Geometry resolver: millimeter band settings to page points
//!
//! Band offsets are measured from the top edge of the page as the viewer
//! shows it. The resolver is a pure function of the band and the displayed
//! page size. It does not clamp: a band that runs past the bottom edge is
//! passed through unchanged and the renderer clips it at the page box.
//! `OverflowPolicy` decides what the compositor does about that.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::band::BandGeometry;
use crate::units::mm_to_pt;

/// Band placement on one page, in PDF points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    /// Displayed page width
    pub width_pt: f64,
    /// Displayed page height
    pub height_pt: f64,
    /// Distance from the top edge to the top of the band
    pub band_top_pt: f64,
    pub band_height_pt: f64,
}

impl PageGeometry {
    /// Distance from the top edge to the bottom of the band
    pub fn band_bottom_pt(&self) -> f64 {
        self.band_top_pt + self.band_height_pt
    }

    /// How far the band runs past the bottom edge (0 when it fits)
    pub fn overflow_pt(&self) -> f64 {
        (self.band_bottom_pt() - self.height_pt).max(0.0)
    }

    /// Band rectangle in displayed page space (origin bottom-left, y up)
    pub fn band_rect(&self) -> Rect {
        Rect {
            x: 0.0,
            y: self.height_pt - self.band_bottom_pt(),
            width: self.width_pt,
            height: self.band_height_pt,
        }
    }

    /// Band rectangle intersected with the page, `None` if nothing is left
    pub fn clipped_band_rect(&self) -> Option<Rect> {
        self.band_rect().intersect(&Rect {
            x: 0.0,
            y: 0.0,
            width: self.width_pt,
            height: self.height_pt,
        })
    }
}

/// Resolve a band against a displayed page size
pub fn resolve(band: &BandGeometry, page_width_pt: f64, page_height_pt: f64) -> PageGeometry {
    PageGeometry {
        width_pt: page_width_pt,
        height_pt: page_height_pt,
        band_top_pt: mm_to_pt(band.y_offset_mm()),
        band_height_pt: mm_to_pt(band.height_mm()),
    }
}

/// Axis-aligned rectangle, origin bottom-left
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = (self.x + self.width).min(other.x + other.width);
        let y1 = (self.y + self.height).min(other.y + other.height);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(Rect {
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
        })
    }
}

/// What to do when the band extends past the page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Draw as resolved and let the viewer clip at the page box
    #[default]
    Allow,
    /// Same output as `Allow`, with a warning in the log
    Warn,
    /// Shrink the band to the part that lies on the page
    Clip,
}

impl FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "allow" => Ok(OverflowPolicy::Allow),
            "warn" => Ok(OverflowPolicy::Warn),
            "clip" => Ok(OverflowPolicy::Clip),
            other => Err(format!(
                "Invalid overflow policy '{}'. Must be 'allow', 'warn' or 'clip'",
                other
            )),
        }
    }
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverflowPolicy::Allow => write!(f, "allow"),
            OverflowPolicy::Warn => write!(f, "warn"),
            OverflowPolicy::Clip => write!(f, "clip"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A4: (f64, f64) = (595.276, 841.89);

    fn band(height: f64, offset: f64) -> BandGeometry {
        BandGeometry::new(height, offset).unwrap()
    }

    #[test]
    fn test_resolve_converts_mm() {
        let geom = resolve(&band(60.0, 0.0), A4.0, A4.1);
        assert!((geom.band_height_pt - 170.0787).abs() < 1e-3);
        assert_eq!(geom.band_top_pt, 0.0);
        assert_eq!(geom.width_pt, A4.0);
    }

    #[test]
    fn test_band_rect_at_top() {
        let geom = resolve(&band(25.4, 0.0), 612.0, 792.0);
        let rect = geom.band_rect();
        assert!((rect.y - 720.0).abs() < 1e-9);
        assert!((rect.height - 72.0).abs() < 1e-9);
        assert_eq!(rect.width, 612.0);
    }

    #[test]
    fn test_band_rect_with_offset() {
        let geom = resolve(&band(25.4, 25.4), 612.0, 792.0);
        let rect = geom.band_rect();
        assert!((rect.y - 648.0).abs() < 1e-9);
    }

    #[test]
    fn test_overflow_is_not_clamped() {
        // 200mm band at 150mm offset on a 100mm-tall page
        let geom = resolve(&band(200.0, 150.0), 283.46, 283.46);
        assert!(geom.band_bottom_pt() > geom.height_pt);
        assert!(geom.overflow_pt() > 0.0);
        assert!(geom.band_rect().y < 0.0);
    }

    #[test]
    fn test_clipped_rect_stays_on_page() {
        let geom = resolve(&band(100.0, 50.0), 283.46, 283.46);
        let rect = geom.clipped_band_rect().unwrap();
        assert_eq!(rect.y, 0.0);
        assert!((rect.y + rect.height - (283.46 - mm_to_pt(50.0))).abs() < 1e-9);
    }

    #[test]
    fn test_band_entirely_off_page_clips_to_nothing() {
        let geom = resolve(&band(20.0, 500.0), 612.0, 792.0);
        assert!(geom.clipped_band_rect().is_none());
    }

    #[test]
    fn test_fitting_band_has_no_overflow() {
        let geom = resolve(&band(60.0, 10.0), A4.0, A4.1);
        assert_eq!(geom.overflow_pt(), 0.0);
        let clipped = geom.clipped_band_rect().unwrap();
        let full = geom.band_rect();
        assert!((clipped.y - full.y).abs() < 1e-9);
        assert!((clipped.height - full.height).abs() < 1e-9);
    }

    #[test]
    fn test_overflow_policy_parse() {
        assert_eq!("clip".parse::<OverflowPolicy>().unwrap(), OverflowPolicy::Clip);
        assert_eq!("WARN".parse::<OverflowPolicy>().unwrap(), OverflowPolicy::Warn);
        assert!("strict".parse::<OverflowPolicy>().is_err());
    }
}
