use alloc::vec::Vec;

use crate::FullSpanItem;

/// Anchor a layout restores after the host recreates it.
///
/// With `feature = "serde"`, this type implements `Serialize`/`Deserialize`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SavedAnchor {
    /// Adapter position of the reference item, `None` when nothing was laid out.
    pub position: Option<usize>,
    /// Distance of the reference item from the padding edge it is measured against.
    pub offset: i32,
    /// `offset` is measured from the end padding edge.
    pub layout_from_end: bool,
}

impl SavedAnchor {
    pub fn new(position: usize, offset: i32, layout_from_end: bool) -> Self {
        Self {
            position: Some(position),
            offset,
            layout_from_end,
        }
    }

    pub fn has_valid_anchor(&self) -> bool {
        self.position.is_some()
    }

    pub fn invalidate(&mut self) {
        self.position = None;
    }
}

/// Snapshot of a staggered layout: the anchor, each span's offset from it and the span
/// assignments needed to rebuild the same lanes.
///
/// With `feature = "serde"`, this type implements `Serialize`/`Deserialize`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StaggeredSavedState {
    pub anchor: SavedAnchor,
    pub visible_anchor_position: Option<usize>,
    /// Per-span reference line relative to the padding edge (`None` for an empty span);
    /// empty when lanes were not captured.
    pub span_offsets: Vec<Option<i32>>,
    pub span_lookup: Vec<Option<usize>>,
    pub full_span_items: Vec<FullSpanItem>,
    pub reverse_layout: bool,
    pub last_layout_rtl: bool,
}

impl StaggeredSavedState {
    pub fn invalidate_span_info(&mut self) {
        self.span_offsets.clear();
        self.span_lookup.clear();
        self.full_span_items.clear();
    }

    pub fn invalidate_anchor_position_info(&mut self) {
        self.span_offsets.clear();
        self.anchor.position = None;
        self.visible_anchor_position = None;
    }
}
