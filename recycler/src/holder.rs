use crate::{NodeBounds, ViewportId};

/// Binds one data position to one rendered node.
///
/// Holders live in the recycling pool's arena and are addressed by [`crate::HolderId`].
/// Layout engines only borrow them for the duration of a pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ItemHolder {
    /// Adapter position after all applied structural changes.
    pub position: Option<usize>,
    /// Position before the pending structural changes were applied.
    pub old_position: Option<usize>,
    /// Position to use while running the pre-layout pass.
    pub pre_layout_position: Option<usize>,
    pub stable_id: Option<u64>,
    pub item_type: u32,

    pub bound: bool,
    pub invalid: bool,
    pub removed: bool,
    pub changed: bool,
    pub focusable: bool,

    /// Decorated bounds assigned by the last layout.
    pub bounds: NodeBounds,

    /// Staggered lane currently holding this node.
    pub span: Option<usize>,
    /// Occupies every lane (staggered) or the whole row (grid).
    pub full_span: bool,
    /// Grid cell assignment.
    pub grid_span_index: usize,
    pub grid_span_size: usize,

    /// Nested virtualized viewport hosted by this node's content.
    pub nested: Option<ViewportId>,
}

impl ItemHolder {
    pub fn new(item_type: u32) -> Self {
        Self {
            item_type,
            grid_span_size: 1,
            ..Self::default()
        }
    }

    /// Position used for layout: the pre-layout position while it is set.
    pub fn layout_position(&self) -> Option<usize> {
        self.pre_layout_position.or(self.position)
    }

    /// Removed or changed holders do not consume fill budget during pre-layout.
    pub fn is_removed_or_changed(&self) -> bool {
        self.removed || self.changed
    }

    /// Holders that can be reused for their position without a rebind.
    pub fn is_reusable_for(&self, position: usize) -> bool {
        self.bound && !self.invalid && self.layout_position() == Some(position)
    }

    pub fn save_old_position(&mut self) {
        if self.old_position.is_none() {
            self.old_position = self.position;
        }
    }

    pub fn clear_old_position(&mut self) {
        self.old_position = None;
        self.pre_layout_position = None;
    }

    /// Shifts the adapter position; `apply_to_pre_layout` also moves the pre-layout position.
    pub fn offset_position(&mut self, delta: isize, apply_to_pre_layout: bool) {
        let Some(pos) = self.position else {
            return;
        };
        if self.old_position.is_none() {
            self.old_position = Some(pos);
        }
        if self.pre_layout_position.is_none() {
            self.pre_layout_position = Some(pos);
        }
        let next = pos.saturating_add_signed(delta);
        if apply_to_pre_layout {
            self.pre_layout_position = self
                .pre_layout_position
                .map(|p| p.saturating_add_signed(delta));
        }
        self.position = Some(next);
    }

    /// Clears per-binding state before the holder goes back to a pool.
    pub fn reset_for_pool(&mut self) {
        self.position = None;
        self.old_position = None;
        self.pre_layout_position = None;
        self.stable_id = None;
        self.bound = false;
        self.invalid = false;
        self.removed = false;
        self.changed = false;
        self.focusable = false;
        self.span = None;
        self.full_span = false;
        self.grid_span_index = 0;
        self.grid_span_size = 1;
        self.nested = None;
    }
}
