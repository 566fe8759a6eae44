//! Band replacement for real-estate flyer PDFs
//!
//! Covers a horizontal band of every page (typically the agent's contact
//! strip at the top of a flyer) with an uploaded image or a solid color
//! banner with centered text. Everything outside the band is left exactly as
//! it was.
//!
//! - `BandSettings::into_spec` validates the editor's settings
//! - `Compositor::composite` rewrites the document
//! - `BandEditor` and `JobHistory` model the editing session around it

pub mod band;
pub mod color;
pub mod compositor;
pub mod editor;
pub mod error;
pub mod geometry;
pub mod history;
pub mod page_frame;
pub mod raster;
pub mod text;
pub mod units;

pub use band::{
    BandGeometry, BandSettings, BandSpec, ColorTextReplacement, ImageFormat, ImageReplacement,
    Replacement,
};
pub use color::Rgb;
pub use compositor::{composite, validate_pdf, CompositeOptions, Composited, Compositor};
pub use editor::{BandEditor, DragHandle, EditorEvent, EditorState};
pub use error::CompositeError;
pub use geometry::{OverflowPolicy, PageGeometry, Rect};
pub use history::{JobHistory, JobRecord};
pub use page_frame::PageFrame;

/// Output file name for a processed upload: `flyer.pdf` becomes
/// `flyer_modified.pdf`. Names without a `.pdf` suffix, or no name at all,
/// give `modified.pdf`.
pub fn output_file_name(original: Option<&str>) -> String {
    let name = original
        .map(|name| name.trim().trim_matches('"'))
        .map(|name| name.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(name))
        .unwrap_or("");

    match name.len().checked_sub(4).filter(|&i| name.is_char_boundary(i)) {
        Some(i) if name[i..].eq_ignore_ascii_case(".pdf") && i > 0 => {
            format!("{}_modified.pdf", &name[..i])
        }
        _ => "modified.pdf".to_string(),
    }
}
