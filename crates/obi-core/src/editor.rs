//! Band editor state machine
//!
//! Models the drag interactions of the preview: moving the band, and
//! resizing it from its top or bottom edge. Pointer positions are in
//! millimeters from the top of the page. The editor always holds a valid
//! `BandGeometry`; it does not know the page size, so a band dragged past
//! the bottom edge is kept as is and left to the overflow policy.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::band::BandGeometry;

/// Part of the band the pointer grabbed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DragHandle {
    Body,
    TopEdge,
    BottomEdge,
}

/// Pointer input fed to the editor
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EditorEvent {
    PointerDown { handle: DragHandle, y_mm: f64 },
    PointerMove { y_mm: f64 },
    PointerUp,
    Cancel,
}

/// Current interaction
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EditorState {
    Idle,
    DraggingPosition { anchor_mm: f64, start: BandGeometry },
    DraggingTopEdge { anchor_mm: f64, start: BandGeometry },
    DraggingBottomEdge { anchor_mm: f64, start: BandGeometry },
}

#[derive(Debug, Clone)]
pub struct BandEditor {
    band: BandGeometry,
    state: EditorState,
}

impl BandEditor {
    pub fn new(band: BandGeometry) -> Self {
        Self {
            band,
            state: EditorState::Idle,
        }
    }

    pub fn band(&self) -> BandGeometry {
        self.band
    }

    pub fn state(&self) -> EditorState {
        self.state
    }

    pub fn is_dragging(&self) -> bool {
        self.state != EditorState::Idle
    }

    /// Apply one event. Returns true when the band changed.
    pub fn handle(&mut self, event: EditorEvent) -> bool {
        let before = self.band;

        match (self.state, event) {
            (EditorState::Idle, EditorEvent::PointerDown { handle, y_mm }) => {
                if !y_mm.is_finite() {
                    return false;
                }
                let start = self.band;
                self.state = match handle {
                    DragHandle::Body => EditorState::DraggingPosition {
                        anchor_mm: y_mm,
                        start,
                    },
                    DragHandle::TopEdge => EditorState::DraggingTopEdge {
                        anchor_mm: y_mm,
                        start,
                    },
                    DragHandle::BottomEdge => EditorState::DraggingBottomEdge {
                        anchor_mm: y_mm,
                        start,
                    },
                };
            }
            (state, EditorEvent::PointerMove { y_mm }) if y_mm.is_finite() => {
                if let Some(band) = drag_to(state, y_mm) {
                    self.band = band;
                }
            }
            (_, EditorEvent::PointerUp) => {
                self.state = EditorState::Idle;
            }
            (state, EditorEvent::Cancel) => {
                if let Some(start) = drag_start(state) {
                    self.band = start;
                }
                self.state = EditorState::Idle;
            }
            // A second pointer-down keeps the current drag
            _ => {}
        }

        let changed = self.band != before;
        if changed {
            trace!(
                "Band now {:.1}mm at {:.1}mm",
                self.band.height_mm(),
                self.band.y_offset_mm()
            );
        }
        changed
    }
}

fn drag_start(state: EditorState) -> Option<BandGeometry> {
    match state {
        EditorState::Idle => None,
        EditorState::DraggingPosition { start, .. }
        | EditorState::DraggingTopEdge { start, .. }
        | EditorState::DraggingBottomEdge { start, .. } => Some(start),
    }
}

/// Band after moving the pointer to `y_mm`, measured against the drag start
fn drag_to(state: EditorState, y_mm: f64) -> Option<BandGeometry> {
    match state {
        EditorState::Idle => None,
        EditorState::DraggingPosition { anchor_mm, start } => {
            let delta = y_mm - anchor_mm;
            Some(BandGeometry::clamped(
                start.height_mm(),
                start.y_offset_mm() + delta,
            ))
        }
        EditorState::DraggingTopEdge { anchor_mm, start } => {
            // Bottom edge stays put
            let bottom = start.bottom_mm();
            let top = (start.y_offset_mm() + y_mm - anchor_mm).max(0.0);
            let height = BandGeometry::clamped(bottom - top, 0.0).height_mm();
            Some(BandGeometry::clamped(height, bottom - height))
        }
        EditorState::DraggingBottomEdge { anchor_mm, start } => {
            let delta = y_mm - anchor_mm;
            Some(BandGeometry::clamped(
                start.height_mm() + delta,
                start.y_offset_mm(),
            ))
        }
    }
}
