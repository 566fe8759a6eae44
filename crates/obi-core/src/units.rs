//! Unit conversion between millimeters, PDF points and preview pixels
//!
//! PDF user space is 72 points per inch. The preview renderer draws pages at
//! `PREVIEW_DPI` pixels per inch, so a scale of 1.0 in the preview is exactly
//! one pixel per point. Band placement on screen and in the output only agree
//! if both sides use these same constants.

/// Millimeters per inch
pub const MM_PER_INCH: f64 = 25.4;

/// PDF points per inch
pub const POINTS_PER_INCH: f64 = 72.0;

/// Pixels per inch assumed by the page preview renderer
pub const PREVIEW_DPI: f64 = 72.0;

/// Convert millimeters to PDF points
pub fn mm_to_pt(mm: f64) -> f64 {
    mm * POINTS_PER_INCH / MM_PER_INCH
}

/// Convert PDF points to millimeters
pub fn pt_to_mm(pt: f64) -> f64 {
    pt * MM_PER_INCH / POINTS_PER_INCH
}

/// Convert millimeters to preview pixels at the given resolution
pub fn mm_to_px(mm: f64, dpi: f64) -> f64 {
    mm * dpi / MM_PER_INCH
}

/// Convert preview pixels at the given resolution to millimeters
pub fn px_to_mm(px: f64, dpi: f64) -> f64 {
    px * MM_PER_INCH / dpi
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Property: px -> mm undoes mm -> px
        #[test]
        fn px_mm_round_trip(mm in 0.0f64..10_000.0, dpi in 1.0f64..1200.0) {
            let back = px_to_mm(mm_to_px(mm, dpi), dpi);
            prop_assert!((back - mm).abs() <= 1e-9 * mm.max(1.0));
        }

        /// Property: pt -> mm undoes mm -> pt
        #[test]
        fn pt_mm_round_trip(mm in 0.0f64..10_000.0) {
            let back = pt_to_mm(mm_to_pt(mm));
            prop_assert!((back - mm).abs() <= 1e-9 * mm.max(1.0));
        }

        /// Property: conversion is monotonic
        #[test]
        fn mm_to_pt_monotonic(a in 0.0f64..1000.0, b in 0.0f64..1000.0) {
            prop_assume!(a < b);
            prop_assert!(mm_to_pt(a) < mm_to_pt(b));
        }
    }
}
