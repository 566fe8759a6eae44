//! Visible page box and orientation
//!
//! Works out what a viewer shows for a page (CropBox within MediaBox, then
//! /Rotate) and the matrix that maps "displayed page space" into PDF user
//! space. Displayed page space has its origin at the bottom-left of the page
//! as shown and spans `displayed_width() x displayed_height()`.

use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::error::CompositeError;

/// US Letter, used when no MediaBox can be found
const DEFAULT_MEDIA_BOX: [f64; 4] = [0.0, 0.0, 612.0, 792.0];

/// Guard against cyclic /Parent chains
const MAX_TREE_DEPTH: usize = 32;

/// Page box and rotation of a single page
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageFrame {
    /// Page number (1-indexed)
    pub page_number: u32,
    /// Visible box `[x0, y0, x1, y1]` in user space, normalized so x0 < x1, y0 < y1
    pub page_box: [f64; 4],
    /// Rotation in degrees (0, 90, 180, 270), clockwise as displayed
    pub rotation: i32,
}

impl PageFrame {
    /// Read the frame of a page from the document
    pub fn from_page(
        doc: &Document,
        page_number: u32,
        page_id: ObjectId,
    ) -> Result<Self, CompositeError> {
        let page_dict = doc.get_dictionary(page_id).map_err(|e| {
            CompositeError::InvalidDocument(format!("page {}: {}", page_number, e))
        })?;

        let media_box = inherited(doc, page_dict, b"MediaBox")
            .and_then(|obj| parse_box(doc, obj))
            .unwrap_or(DEFAULT_MEDIA_BOX);

        let page_box = inherited(doc, page_dict, b"CropBox")
            .and_then(|obj| parse_box(doc, obj))
            .and_then(|crop| intersect_boxes(&crop, &media_box))
            .unwrap_or(media_box);

        if page_box[2] - page_box[0] <= 0.0 || page_box[3] - page_box[1] <= 0.0 {
            return Err(CompositeError::InvalidDocument(format!(
                "page {} has an empty page box",
                page_number
            )));
        }

        let rotation = inherited(doc, page_dict, b"Rotate")
            .and_then(|obj| resolve(doc, obj).as_i64().ok())
            .map(|angle| normalize_rotation(angle as i32))
            .unwrap_or(0);

        Ok(Self {
            page_number,
            page_box,
            rotation,
        })
    }

    fn box_width(&self) -> f64 {
        self.page_box[2] - self.page_box[0]
    }

    fn box_height(&self) -> f64 {
        self.page_box[3] - self.page_box[1]
    }

    fn is_sideways(&self) -> bool {
        self.rotation == 90 || self.rotation == 270
    }

    /// Width of the page as the viewer shows it
    pub fn displayed_width(&self) -> f64 {
        if self.is_sideways() {
            self.box_height()
        } else {
            self.box_width()
        }
    }

    /// Height of the page as the viewer shows it
    pub fn displayed_height(&self) -> f64 {
        if self.is_sideways() {
            self.box_width()
        } else {
            self.box_height()
        }
    }

    /// `cm` operands mapping displayed page space into user space
    pub fn display_matrix(&self) -> [f64; 6] {
        let [x0, y0, x1, y1] = self.page_box;
        match self.rotation {
            90 => [0.0, 1.0, -1.0, 0.0, x1, y0],
            180 => [-1.0, 0.0, 0.0, -1.0, x1, y1],
            270 => [0.0, -1.0, 1.0, 0.0, x0, y1],
            _ => [1.0, 0.0, 0.0, 1.0, x0, y0],
        }
    }

    /// Map a point from displayed page space into user space
    #[cfg(test)]
    fn to_user_space(&self, x: f64, y: f64) -> (f64, f64) {
        let [a, b, c, d, e, f] = self.display_matrix();
        (a * x + c * y + e, b * x + d * y + f)
    }
}

/// Look up a page attribute, walking up the /Parent chain for inheritable keys
pub(crate) fn inherited<'a>(
    doc: &'a Document,
    page_dict: &'a Dictionary,
    key: &[u8],
) -> Option<&'a Object> {
    let mut dict = page_dict;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = dict.get(key) {
            return Some(value);
        }
        let parent_id = dict.get(b"Parent").ok()?.as_reference().ok()?;
        dict = doc.get_dictionary(parent_id).ok()?;
    }
    None
}

pub(crate) fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        _ => obj,
    }
}

fn as_number(doc: &Document, obj: &Object) -> Option<f64> {
    match resolve(doc, obj) {
        Object::Integer(n) => Some(*n as f64),
        Object::Real(n) => Some(*n as f64),
        _ => None,
    }
}

/// Parse a box array [x1, y1, x2, y2] into normalized corners
fn parse_box(doc: &Document, obj: &Object) -> Option<[f64; 4]> {
    let array = resolve(doc, obj).as_array().ok()?;
    if array.len() != 4 {
        return None;
    }

    let mut values = [0.0; 4];
    for (slot, item) in values.iter_mut().zip(array) {
        *slot = as_number(doc, item)?;
    }

    Some([
        values[0].min(values[2]),
        values[1].min(values[3]),
        values[0].max(values[2]),
        values[1].max(values[3]),
    ])
}

fn intersect_boxes(a: &[f64; 4], b: &[f64; 4]) -> Option<[f64; 4]> {
    let result = [a[0].max(b[0]), a[1].max(b[1]), a[2].min(b[2]), a[3].min(b[3])];
    if result[2] > result[0] && result[3] > result[1] {
        Some(result)
    } else {
        None
    }
}

/// Normalize rotation to 0, 90, 180, or 270
fn normalize_rotation(angle: i32) -> i32 {
    let snapped = (angle / 90) * 90;
    snapped.rem_euclid(360)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;
    use pretty_assertions::assert_eq;

    fn doc_with_page(page: Dictionary, pages_extra: Dictionary) -> (Document, ObjectId) {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let mut page = page;
        page.set("Type", "Page");
        page.set("Parent", Object::Reference(pages_id));
        let page_id = doc.add_object(page);
        let mut pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => 1,
        };
        for (key, value) in pages_extra.iter() {
            pages.set(key.clone(), value.clone());
        }
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        (doc, page_id)
    }

    #[test]
    fn test_normalize_rotation() {
        assert_eq!(normalize_rotation(0), 0);
        assert_eq!(normalize_rotation(90), 90);
        assert_eq!(normalize_rotation(180), 180);
        assert_eq!(normalize_rotation(270), 270);
        assert_eq!(normalize_rotation(360), 0);
        assert_eq!(normalize_rotation(450), 90);
        assert_eq!(normalize_rotation(-90), 270);
    }

    #[test]
    fn test_media_box_on_page() {
        let (doc, page_id) = doc_with_page(
            dictionary! { "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()] },
            Dictionary::new(),
        );
        let frame = PageFrame::from_page(&doc, 1, page_id).unwrap();
        assert_eq!(frame.page_box, [0.0, 0.0, 595.0, 842.0]);
        assert_eq!(frame.displayed_width(), 595.0);
        assert_eq!(frame.displayed_height(), 842.0);
    }

    #[test]
    fn test_media_box_inherited_from_parent() {
        let (doc, page_id) = doc_with_page(
            Dictionary::new(),
            dictionary! {
                "MediaBox" => vec![0.into(), 0.into(), 400.into(), 300.into()],
                "Rotate" => 90,
            },
        );
        let frame = PageFrame::from_page(&doc, 1, page_id).unwrap();
        assert_eq!(frame.page_box, [0.0, 0.0, 400.0, 300.0]);
        assert_eq!(frame.rotation, 90);
        assert_eq!(frame.displayed_width(), 300.0);
        assert_eq!(frame.displayed_height(), 400.0);
    }

    #[test]
    fn test_missing_media_box_defaults_to_letter() {
        let (doc, page_id) = doc_with_page(Dictionary::new(), Dictionary::new());
        let frame = PageFrame::from_page(&doc, 1, page_id).unwrap();
        assert_eq!(frame.page_box, DEFAULT_MEDIA_BOX);
    }

    #[test]
    fn test_crop_box_wins_over_media_box() {
        let (doc, page_id) = doc_with_page(
            dictionary! {
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "CropBox" => vec![36.into(), 36.into(), 576.into(), 756.into()],
            },
            Dictionary::new(),
        );
        let frame = PageFrame::from_page(&doc, 1, page_id).unwrap();
        assert_eq!(frame.page_box, [36.0, 36.0, 576.0, 756.0]);
    }

    #[test]
    fn test_reversed_box_is_normalized() {
        let (doc, page_id) = doc_with_page(
            dictionary! { "MediaBox" => vec![612.into(), 792.into(), 0.into(), 0.into()] },
            Dictionary::new(),
        );
        let frame = PageFrame::from_page(&doc, 1, page_id).unwrap();
        assert_eq!(frame.page_box, [0.0, 0.0, 612.0, 792.0]);
    }

    #[test]
    fn test_empty_box_rejected() {
        let (doc, page_id) = doc_with_page(
            dictionary! { "MediaBox" => vec![0.into(), 0.into(), 0.into(), 792.into()] },
            Dictionary::new(),
        );
        assert!(matches!(
            PageFrame::from_page(&doc, 1, page_id),
            Err(CompositeError::InvalidDocument(_))
        ));
    }

    fn frame(rotation: i32) -> PageFrame {
        PageFrame {
            page_number: 1,
            page_box: [10.0, 20.0, 210.0, 320.0],
            rotation,
        }
    }

    #[test]
    fn test_displayed_top_left_maps_to_visual_corner() {
        // Displayed top-left is (0, displayed_height)
        let unrotated = frame(0);
        assert_eq!(unrotated.to_user_space(0.0, unrotated.displayed_height()), (10.0, 320.0));

        // Rotated 90 clockwise: user bottom-left ends up at the displayed top-left
        let quarter = frame(90);
        assert_eq!(quarter.to_user_space(0.0, quarter.displayed_height()), (10.0, 20.0));

        let half = frame(180);
        assert_eq!(half.to_user_space(0.0, half.displayed_height()), (210.0, 20.0));

        let three_quarter = frame(270);
        assert_eq!(
            three_quarter.to_user_space(0.0, three_quarter.displayed_height()),
            (210.0, 320.0)
        );
    }

    #[test]
    fn test_display_matrix_covers_page_box() {
        for rotation in [0, 90, 180, 270] {
            let f = frame(rotation);
            let corners = [
                f.to_user_space(0.0, 0.0),
                f.to_user_space(f.displayed_width(), 0.0),
                f.to_user_space(0.0, f.displayed_height()),
                f.to_user_space(f.displayed_width(), f.displayed_height()),
            ];
            let min_x = corners.iter().map(|c| c.0).fold(f64::INFINITY, f64::min);
            let max_x = corners.iter().map(|c| c.0).fold(f64::NEG_INFINITY, f64::max);
            let min_y = corners.iter().map(|c| c.1).fold(f64::INFINITY, f64::min);
            let max_y = corners.iter().map(|c| c.1).fold(f64::NEG_INFINITY, f64::max);
            assert_eq!([min_x, min_y, max_x, max_y], f.page_box, "rotation {}", rotation);
        }
    }
}
