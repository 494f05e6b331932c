use alloc::vec::Vec;

use crate::{
    AxisHelper, Deadline, HolderId, ItemHolder, MeasureSpec, NodeBounds, ReconciliationStore,
    RecyclePool, Size, ViewportGeometry, VisibleIndexMap,
};

/// Per-pass facts supplied by the host.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LayoutPass {
    /// Item count of the data set this pass lays out (the old count during pre-layout).
    pub item_count: usize,
    pub pre_layout: bool,
    pub run_predictive_animations: bool,
    /// Target of an in-flight smooth scroll; engines lay out one extra screen towards it.
    pub target_scroll_position: Option<usize>,
    /// Attached node that currently holds focus.
    pub focused: Option<HolderId>,
}

impl LayoutPass {
    pub fn new(item_count: usize) -> Self {
        Self {
            item_count,
            ..Self::default()
        }
    }

    pub fn pre_layout(mut self, pre_layout: bool) -> Self {
        self.pre_layout = pre_layout;
        self
    }

    pub fn predictive(mut self, run_predictive_animations: bool) -> Self {
        self.run_predictive_animations = run_predictive_animations;
        self
    }

    pub fn with_target_scroll_position(mut self, position: Option<usize>) -> Self {
        self.target_scroll_position = position;
        self
    }

    pub fn with_focused(mut self, focused: Option<HolderId>) -> Self {
        self.focused = focused;
        self
    }
}

/// Everything a layout engine touches during one pass.
///
/// Holds borrows of the host's attached children, its recycling pool and its scrap list.
/// The scrap list outlives a single pass: nodes detached during the pre-layout pass stay
/// there for the post-layout pass, and the host recycles what is left afterwards.
pub struct LayoutContext<'a> {
    pub children: &'a mut VisibleIndexMap,
    pub pool: &'a mut dyn RecyclePool,
    pub scrap: &'a mut Vec<HolderId>,
    pub store: Option<&'a mut ReconciliationStore>,
    pub geometry: ViewportGeometry,
    pub pass: LayoutPass,
}

impl<'a> LayoutContext<'a> {
    pub fn new(
        children: &'a mut VisibleIndexMap,
        pool: &'a mut dyn RecyclePool,
        scrap: &'a mut Vec<HolderId>,
        geometry: ViewportGeometry,
        pass: LayoutPass,
    ) -> Self {
        Self {
            children,
            pool,
            scrap,
            store: None,
            geometry,
            pass,
        }
    }

    pub fn with_store(mut self, store: &'a mut ReconciliationStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn item_count(&self) -> usize {
        self.pass.item_count
    }

    pub fn is_pre_layout(&self) -> bool {
        self.pass.pre_layout
    }

    /// Number of visible (non-hidden) children.
    pub fn child_count(&self) -> usize {
        self.children.count_logical()
    }

    pub fn child_at(&self, index: usize) -> Option<HolderId> {
        self.children.child_at(index)
    }

    pub fn holder(&self, id: HolderId) -> Option<&ItemHolder> {
        self.pool.holder(id)
    }

    pub fn holder_mut(&mut self, id: HolderId) -> Option<&mut ItemHolder> {
        self.pool.holder_mut(id)
    }

    pub fn bounds(&self, id: HolderId) -> NodeBounds {
        self.pool.holder(id).map(|h| h.bounds).unwrap_or_default()
    }

    pub fn set_bounds(&mut self, id: HolderId, bounds: NodeBounds) {
        if let Some(h) = self.pool.holder_mut(id) {
            h.bounds = bounds;
        }
    }

    pub fn layout_position(&self, id: HolderId) -> Option<usize> {
        self.pool.holder(id).and_then(ItemHolder::layout_position)
    }

    pub fn child_position(&self, index: usize) -> Option<usize> {
        self.child_at(index).and_then(|id| self.layout_position(id))
    }

    pub fn is_removed(&self, id: HolderId) -> bool {
        self.pool.holder(id).is_some_and(|h| h.removed)
    }

    /// The focused node, if it is still attached and visible.
    pub fn focused_child(&self) -> Option<HolderId> {
        self.pass
            .focused
            .filter(|&id| self.children.index_of(id).is_some())
    }

    /// Finds an attached, visible node laid out at `position`.
    pub fn find_view_by_position(&self, position: usize) -> Option<HolderId> {
        let pre = self.is_pre_layout();
        (0..self.child_count())
            .filter_map(|i| self.child_at(i))
            .find(|&id| {
                self.pool.holder(id).is_some_and(|h| {
                    h.layout_position() == Some(position) && (pre || !h.removed)
                })
            })
    }

    /// Returns a node for `position`: from scrap first, then hidden children, then the pool.
    pub fn obtain(&mut self, position: usize) -> Option<HolderId> {
        let pre = self.is_pre_layout();
        let from_scrap = self.scrap.iter().position(|&id| {
            self.pool.holder(id).is_some_and(|h| {
                h.layout_position() == Some(position) && !h.invalid && (pre || !h.removed)
            })
        });
        if let Some(i) = from_scrap {
            return Some(self.scrap.remove(i));
        }

        if let Some(id) = self.children.find_hidden_non_removed(position, &*self.pool) {
            self.children.unhide(id);
            self.children.remove(id);
            rtrace!(position, node = id.0, "obtain: bounced from hidden list");
            return Some(id);
        }

        self.pool.node_for_position(position, Deadline::Unbounded)
    }

    pub fn measure(&mut self, id: HolderId, spec: MeasureSpec) -> Size {
        self.pool.measure(id, spec)
    }

    /// Attaches `id` before logical index `index` (`None` appends).
    pub fn add_view(&mut self, id: HolderId, index: Option<usize>) {
        self.add_view_int(id, index, false);
    }

    /// Attaches a node that is only laid out so it can animate away.
    pub fn add_disappearing_view(&mut self, id: HolderId, index: Option<usize>) {
        self.add_view_int(id, index, true);
    }

    fn add_view_int(&mut self, id: HolderId, index: Option<usize>, disappearing: bool) {
        if let Some(store) = self.store.as_deref_mut() {
            if disappearing {
                store.add_to_disappeared_in_layout(id);
            } else {
                store.remove_from_disappeared_in_layout(id);
            }
        }
        if let Some(i) = self.scrap.iter().position(|&s| s == id) {
            self.scrap.remove(i);
        }
        if self.children.physical_index_of(id).is_some() {
            self.children.remove(id);
        }
        self.children.add(id, index, false);
    }

    /// Detaches and recycles the child at logical index `index`.
    pub fn remove_and_recycle_child_at(&mut self, index: usize) {
        if let Some(id) = self.children.remove_at(index) {
            self.recycle(id);
        }
    }

    /// Hands a detached node back to the pool and forgets its reconciliation record.
    pub fn recycle(&mut self, id: HolderId) {
        if let Some(store) = self.store.as_deref_mut() {
            store.remove_holder(id);
        }
        self.pool.recycle(id);
    }

    /// Detaches every visible child: reusable ones go to scrap, invalid ones are recycled.
    pub fn detach_and_scrap_attached_views(&mut self) {
        for i in (0..self.child_count()).rev() {
            let Some(id) = self.children.remove_at(i) else {
                continue;
            };
            let recycle = self
                .pool
                .holder(id)
                .is_some_and(|h| h.invalid && !h.removed && h.stable_id.is_none());
            if recycle {
                self.recycle(id);
            } else {
                self.scrap.push(id);
            }
        }
    }

    /// Removes and recycles every visible child and the scrap.
    pub fn remove_and_recycle_all_views(&mut self) {
        for i in (0..self.child_count()).rev() {
            self.remove_and_recycle_child_at(i);
        }
        self.recycle_scrap();
    }

    /// Recycles whatever is left in the scrap list.
    pub fn recycle_scrap(&mut self) {
        while let Some(id) = self.scrap.pop() {
            self.recycle(id);
        }
    }

    /// Shifts every attached node, hidden ones included, along `axis`.
    pub fn offset_children(&mut self, axis: &AxisHelper, delta: i32) {
        if delta == 0 {
            return;
        }
        for p in 0..self.children.count_physical() {
            let Some(id) = self.children.physical_at(p) else {
                continue;
            };
            if let Some(h) = self.pool.holder_mut(id) {
                axis.offset(&mut h.bounds, delta);
            }
        }
    }
}
