//! Band compositor
//!
//! For every page:
//! 1. the original content is wrapped in `q … Q` so none of its graphics
//!    state leaks into the overlay (extra `Q`s close any `q` it left open,
//!    extra leading `q`s absorb any stray `Q` it starts with)
//! 2. an overlay stream erases the band with opaque white and draws the
//!    replacement in displayed page space
//! 3. the page keeps its id, size and original streams; only `/Contents`
//!    and `/Resources` are rewritten
//!
//! Shared objects (image XObject, font, the opening `q` stream) are written
//! once. Page plans are built in parallel from a read-only document and then
//! applied in page order.

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::band::{BandGeometry, BandSpec, Replacement};
use crate::color::Rgb;
use crate::error::CompositeError;
use crate::geometry::{resolve, OverflowPolicy, PageGeometry, Rect};
use crate::page_frame::{self, PageFrame};
use crate::raster::ImageXObject;
use crate::text::{sanitize, BannerFont, TextLayout};

/// Page limit of the original service
pub const DEFAULT_MAX_PAGES: u32 = 50;

/// Side margin for banner text, as a share of the band width
pub const DEFAULT_SIDE_MARGIN_RATIO: f64 = 0.02;

const IMAGE_RESOURCE_PREFIX: &str = "ObiBandIm";
const FONT_RESOURCE_PREFIX: &str = "ObiBandF";

/// Compositor settings
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeOptions {
    /// Reject documents with more pages than this
    pub max_pages: u32,
    /// Handling of bands that run past the page edge
    pub overflow: OverflowPolicy,
    /// Side margin for banner text, as a share of the band width
    pub side_margin_ratio: f64,
}

impl Default for CompositeOptions {
    fn default() -> Self {
        Self {
            max_pages: DEFAULT_MAX_PAGES,
            overflow: OverflowPolicy::default(),
            side_margin_ratio: DEFAULT_SIDE_MARGIN_RATIO,
        }
    }
}

/// Result of a successful composite
#[derive(Debug, Clone)]
pub struct Composited {
    /// Serialized output PDF
    pub bytes: Vec<u8>,
    pub page_count: u32,
    /// Pages (1-indexed) whose band runs past the bottom edge
    pub overflow_pages: Vec<u32>,
}

/// Replaces the band region on every page of a document
#[derive(Debug, Clone, Default)]
pub struct Compositor {
    options: CompositeOptions,
}

impl Compositor {
    pub fn new(options: CompositeOptions) -> Self {
        Self { options }
    }

    /// Replace the band on every page of `pdf_bytes`.
    ///
    /// Fails without output on any error: there is no partial result.
    pub fn composite(
        &self,
        pdf_bytes: &[u8],
        band: &BandSpec,
    ) -> Result<Composited, CompositeError> {
        let mut doc = load_document(pdf_bytes)?;
        let pages: Vec<(u32, ObjectId)> = doc.get_pages().into_iter().collect();
        let page_count = check_page_count(pages.len(), self.options.max_pages)?;

        info!(
            "Compositing band ({}mm at {}mm) on {} page(s)",
            band.geometry.height_mm(),
            band.geometry.y_offset_mm(),
            page_count
        );

        let shared = SharedObjects::install(&mut doc, &band.replacement)?;

        let plans = pages
            .par_iter()
            .map(|&(page_number, page_id)| {
                plan_page(&doc, page_number, page_id, &band.geometry, &shared, &self.options)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let overflow_pages: Vec<u32> = plans
            .iter()
            .filter(|plan| plan.geometry.overflow_pt() > 0.0)
            .map(|plan| plan.page_number)
            .collect();

        for plan in plans {
            apply_plan(&mut doc, plan, shared.save_state_id)?;
        }

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes)
            .map_err(|e| CompositeError::OperationError(e.to_string()))?;

        info!("Composited {} page(s), {} bytes", page_count, bytes.len());

        Ok(Composited {
            bytes,
            page_count,
            overflow_pages,
        })
    }
}

/// Replace the band on every page with the given options
pub fn composite(
    pdf_bytes: &[u8],
    band: &BandSpec,
    options: &CompositeOptions,
) -> Result<Composited, CompositeError> {
    Compositor::new(options.clone()).composite(pdf_bytes, band)
}

/// Check that `pdf_bytes` is a usable document and return its page count
pub fn validate_pdf(pdf_bytes: &[u8], max_pages: u32) -> Result<u32, CompositeError> {
    let doc = load_document(pdf_bytes)?;
    check_page_count(doc.get_pages().len(), max_pages)
}

fn load_document(pdf_bytes: &[u8]) -> Result<Document, CompositeError> {
    let doc = Document::load_mem(pdf_bytes)
        .map_err(|e| CompositeError::InvalidDocument(e.to_string()))?;
    if doc.trailer.get(b"Encrypt").is_ok() {
        return Err(CompositeError::InvalidDocument(
            "encrypted PDFs are not supported".into(),
        ));
    }
    Ok(doc)
}

fn check_page_count(count: usize, max_pages: u32) -> Result<u32, CompositeError> {
    if count == 0 {
        return Err(CompositeError::EmptyDocument);
    }
    let count = u32::try_from(count).unwrap_or(u32::MAX);
    if count > max_pages {
        return Err(CompositeError::TooManyPages {
            count,
            max: max_pages,
        });
    }
    Ok(count)
}

/// How the replacement is drawn, with ids of the shared objects it needs
#[derive(Debug, Clone)]
enum BandPaint {
    Image {
        xobject_id: ObjectId,
    },
    ColorText {
        background: Rgb,
        text_color: Rgb,
        text: Option<(String, ObjectId)>,
    },
}

/// Objects written once per document and referenced from every page
#[derive(Debug, Clone)]
struct SharedObjects {
    paint: BandPaint,
    /// Stream holding a single `q`, placed before the original content
    save_state_id: ObjectId,
}

impl SharedObjects {
    fn install(doc: &mut Document, replacement: &Replacement) -> Result<Self, CompositeError> {
        let paint = match replacement {
            Replacement::Image(image) => {
                let xobject = ImageXObject::prepare(image)?;
                debug!("Replacement image {}x{}", xobject.width, xobject.height);
                BandPaint::Image {
                    xobject_id: xobject.add_to(doc),
                }
            }
            Replacement::ColorText(color_text) => {
                let text = color_text.visible_text().map(|raw| {
                    let text = sanitize(raw);
                    let font = BannerFont::for_text(&text);
                    let font_id = font.add_to(doc);
                    (text, font_id)
                });
                BandPaint::ColorText {
                    background: color_text.background,
                    text_color: color_text.text_color,
                    text,
                }
            }
        };

        let save_state_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));

        Ok(Self {
            paint,
            save_state_id,
        })
    }
}

/// Everything needed to rewrite one page, computed without mutating the document
#[derive(Debug)]
struct PagePlan {
    page_number: u32,
    page_id: ObjectId,
    geometry: PageGeometry,
    resources: Dictionary,
    /// `q` operators placed before the original content
    leading_saves: usize,
    contents: Vec<Object>,
    overlay: Vec<u8>,
}

fn plan_page(
    doc: &Document,
    page_number: u32,
    page_id: ObjectId,
    band: &BandGeometry,
    shared: &SharedObjects,
    options: &CompositeOptions,
) -> Result<PagePlan, CompositeError> {
    let frame = PageFrame::from_page(doc, page_number, page_id)?;
    let geometry = resolve(band, frame.displayed_width(), frame.displayed_height());

    let rect = match options.overflow {
        OverflowPolicy::Allow => Some(geometry.band_rect()),
        OverflowPolicy::Warn => {
            if geometry.overflow_pt() > 0.0 {
                warn!(
                    "Band on page {} runs {:.1}pt past the bottom edge",
                    page_number,
                    geometry.overflow_pt()
                );
            }
            Some(geometry.band_rect())
        }
        OverflowPolicy::Clip => geometry.clipped_band_rect(),
    };

    let page_dict = doc
        .get_dictionary(page_id)
        .map_err(|e| CompositeError::InvalidDocument(format!("page {}: {}", page_number, e)))?;

    let mut resources = effective_resources(doc, page_dict);
    let paint_names = register_resources(doc, &mut resources, &shared.paint);

    let contents = existing_contents(doc, page_dict);
    let balance = save_state_balance(doc, &contents);
    let overlay = overlay_operations(
        &frame,
        rect,
        &shared.paint,
        &paint_names,
        balance.unclosed,
        options,
    )
    .encode()
    .map_err(|e| CompositeError::OperationError(e.to_string()))?;

    debug!(
        "Page {}: {}x{}pt, rotation {}, band {:?}",
        page_number,
        frame.displayed_width(),
        frame.displayed_height(),
        frame.rotation,
        rect
    );

    Ok(PagePlan {
        page_number,
        page_id,
        geometry,
        resources,
        leading_saves: 1 + balance.underflow,
        contents,
        overlay,
    })
}

fn apply_plan(
    doc: &mut Document,
    plan: PagePlan,
    shared_save_id: ObjectId,
) -> Result<(), CompositeError> {
    let save_id = if plan.leading_saves == 1 {
        shared_save_id
    } else {
        debug!(
            "Page {}: content restores {} state(s) it never saved",
            plan.page_number,
            plan.leading_saves - 1
        );
        doc.add_object(Stream::new(
            Dictionary::new(),
            "q\n".repeat(plan.leading_saves).into_bytes(),
        ))
    };
    let overlay_id = doc.add_object(Stream::new(Dictionary::new(), plan.overlay));

    let mut contents = Vec::with_capacity(plan.contents.len() + 2);
    contents.push(Object::Reference(save_id));
    contents.extend(plan.contents);
    contents.push(Object::Reference(overlay_id));

    let page = doc
        .get_object_mut(plan.page_id)
        .and_then(Object::as_dict_mut)
        .map_err(|e| CompositeError::OperationError(e.to_string()))?;
    page.set("Resources", Object::Dictionary(plan.resources));
    page.set("Contents", Object::Array(contents));
    Ok(())
}

/// Page resources with inherited and indirect parts copied inline
fn effective_resources(doc: &Document, page_dict: &Dictionary) -> Dictionary {
    let mut resources = page_frame::inherited(doc, page_dict, b"Resources")
        .and_then(|obj| page_frame::resolve(doc, obj).as_dict().ok())
        .cloned()
        .unwrap_or_else(Dictionary::new);

    for key in [b"XObject".as_slice(), b"Font".as_slice()] {
        if let Some(inline) = resources
            .get(key)
            .ok()
            .and_then(|obj| page_frame::resolve(doc, obj).as_dict().ok())
            .cloned()
        {
            resources.set(key.to_vec(), Object::Dictionary(inline));
        }
    }
    resources
}

/// Resource names chosen for the band on one page
#[derive(Debug, Default)]
struct PaintNames {
    image: Option<Vec<u8>>,
    font: Option<Vec<u8>>,
}

fn register_resources(
    doc: &Document,
    resources: &mut Dictionary,
    paint: &BandPaint,
) -> PaintNames {
    let mut names = PaintNames::default();
    match paint {
        BandPaint::Image { xobject_id } => {
            let name = add_named_resource(
                doc,
                resources,
                b"XObject",
                IMAGE_RESOURCE_PREFIX,
                *xobject_id,
            );
            names.image = Some(name);
        }
        BandPaint::ColorText {
            text: Some((_, font_id)),
            ..
        } => {
            let name =
                add_named_resource(doc, resources, b"Font", FONT_RESOURCE_PREFIX, *font_id);
            names.font = Some(name);
        }
        BandPaint::ColorText { text: None, .. } => {}
    }
    names
}

/// Insert `id` into the `category` sub-dictionary under a name not yet used
fn add_named_resource(
    doc: &Document,
    resources: &mut Dictionary,
    category: &[u8],
    prefix: &str,
    id: ObjectId,
) -> Vec<u8> {
    let mut entries = resources
        .get(category)
        .ok()
        .and_then(|obj| page_frame::resolve(doc, obj).as_dict().ok())
        .cloned()
        .unwrap_or_else(Dictionary::new);

    let name = (0u32..)
        .map(|n| format!("{}{}", prefix, n).into_bytes())
        .find(|candidate| !entries.has(candidate))
        .unwrap_or_else(|| prefix.as_bytes().to_vec());

    entries.set(name.clone(), Object::Reference(id));
    resources.set(category.to_vec(), Object::Dictionary(entries));
    name
}

/// Content streams of the page as a flat list of references
fn existing_contents(doc: &Document, page_dict: &Dictionary) -> Vec<Object> {
    match page_dict.get(b"Contents") {
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(items)) => items.clone(),
            _ => vec![Object::Reference(*id)],
        },
        Ok(Object::Array(items)) => items.clone(),
        _ => Vec::new(),
    }
}

/// `q`/`Q` nesting of the original content
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct SaveStateBalance {
    /// Deepest the content pops below its starting state
    underflow: usize,
    /// States left open at the end, counted from that lowest point
    unclosed: usize,
}

fn save_state_balance(doc: &Document, contents: &[Object]) -> SaveStateBalance {
    let mut depth = 0i64;
    let mut lowest = 0i64;
    // Streams are decoded one by one: their bytes do not always end on a separator
    for item in contents {
        let Ok(stream) = page_frame::resolve(doc, item).as_stream() else {
            continue;
        };
        let bytes = stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone());
        let Ok(content) = Content::decode(&bytes) else {
            continue;
        };
        for op in &content.operations {
            match op.operator.as_str() {
                "q" => depth += 1,
                "Q" => {
                    depth -= 1;
                    lowest = lowest.min(depth);
                }
                _ => {}
            }
        }
    }
    SaveStateBalance {
        underflow: usize::try_from(-lowest).unwrap_or(0),
        unclosed: usize::try_from(depth - lowest).unwrap_or(0),
    }
}

fn real(value: f64) -> Object {
    Object::Real(value as f32)
}

fn rect_operands(rect: &Rect) -> Vec<Object> {
    vec![real(rect.x), real(rect.y), real(rect.width), real(rect.height)]
}

fn fill_color(color: Rgb) -> Operation {
    let [r, g, b] = color.to_pdf();
    Operation::new("rg", vec![Object::Real(r), Object::Real(g), Object::Real(b)])
}

fn overlay_operations(
    frame: &PageFrame,
    rect: Option<Rect>,
    paint: &BandPaint,
    names: &PaintNames,
    open_states: usize,
    options: &CompositeOptions,
) -> Content {
    let mut ops = Vec::new();

    // Close the original content's state
    for _ in 0..=open_states {
        ops.push(Operation::new("Q", vec![]));
    }

    ops.push(Operation::new("q", vec![]));
    ops.push(Operation::new(
        "cm",
        frame.display_matrix().iter().map(|v| real(*v)).collect(),
    ));

    if let Some(rect) = rect {
        // Erase
        ops.push(fill_color(Rgb::WHITE));
        ops.push(Operation::new("re", rect_operands(&rect)));
        ops.push(Operation::new("f", vec![]));

        match paint {
            BandPaint::Image { .. } => {
                if let Some(name) = &names.image {
                    ops.push(Operation::new("q", vec![]));
                    ops.push(Operation::new(
                        "cm",
                        vec![
                            real(rect.width),
                            0.into(),
                            0.into(),
                            real(rect.height),
                            real(rect.x),
                            real(rect.y),
                        ],
                    ));
                    ops.push(Operation::new("Do", vec![Object::Name(name.clone())]));
                    ops.push(Operation::new("Q", vec![]));
                }
            }
            BandPaint::ColorText {
                background,
                text_color,
                text,
            } => {
                ops.push(fill_color(*background));
                ops.push(Operation::new("re", rect_operands(&rect)));
                ops.push(Operation::new("f", vec![]));

                let layout = text.as_ref().and_then(|(text, _)| {
                    TextLayout::centered(
                        text,
                        rect.x,
                        rect.y,
                        rect.width,
                        rect.height,
                        rect.width * options.side_margin_ratio,
                    )
                });
                if let (Some(layout), Some(font_name)) = (layout, &names.font) {
                    ops.push(Operation::new("BT", vec![]));
                    ops.push(Operation::new(
                        "Tf",
                        vec![Object::Name(font_name.clone()), real(layout.font_size)],
                    ));
                    ops.push(fill_color(*text_color));
                    ops.push(Operation::new("Td", vec![real(layout.x), real(layout.y)]));
                    ops.push(Operation::new("Tj", vec![layout.font.encode(&layout.text)]));
                    ops.push(Operation::new("ET", vec![]));
                }
            }
        }
    }

    ops.push(Operation::new("Q", vec![]));
    Content { operations: ops }
}
