use alloc::vec::Vec;

use recycler::{
    Classification, Deadline, HolderId, ItemHolder, ItemInfo, LayoutContext, LayoutEngine,
    LayoutPass, PrefetchRegistry, PrefetchTarget, RecyclePool, ReconciliationStore, SavedAnchor,
    ScrollState, ViewportGeometry, ViewportId, VisibleIndexMap,
};

use crate::{Adapter, HolderPool, UpdateOp, count_before};

/// A framework-neutral controller that owns one viewport's layout engine, pool and attached
/// children, and drives whole layout cycles.
///
/// Adapters drive it by calling:
/// - `notify_*` when the data source changes
/// - `dispatch_layout` when `needs_layout` reports a pending pass
/// - `scroll_by` for user scrolling and `end_animation` once an exit animation finished
///
/// With pending structural changes and a layout that supports predictive animations, a
/// cycle runs a pre-layout pass over the old positions, then the real pass, and classifies
/// every tracked holder. Disappearing holders stay attached but hidden until their
/// animation ends.
#[derive(Debug)]
pub struct Controller<A, L> {
    id: ViewportId,
    layout: L,
    pool: HolderPool<A>,
    children: VisibleIndexMap,
    scrap: Vec<HolderId>,
    store: ReconciliationStore,
    geometry: ViewportGeometry,
    pending: Vec<UpdateOp>,
    data_set_changed: bool,
    layout_requested: bool,
    visible: bool,
    focused: Option<HolderId>,
    animating: Vec<HolderId>,
    changes: Vec<(HolderId, Classification)>,
}

impl<A: Adapter, L: LayoutEngine> Controller<A, L> {
    pub fn new(id: ViewportId, layout: L, pool: HolderPool<A>, geometry: ViewportGeometry) -> Self {
        Self {
            id,
            layout,
            pool,
            children: VisibleIndexMap::new(),
            scrap: Vec::new(),
            store: ReconciliationStore::new(),
            geometry,
            pending: Vec::new(),
            data_set_changed: false,
            layout_requested: true,
            visible: true,
            focused: None,
            animating: Vec::new(),
            changes: Vec::new(),
        }
    }

    pub fn id(&self) -> ViewportId {
        self.id
    }

    pub fn layout(&self) -> &L {
        &self.layout
    }

    pub fn layout_mut(&mut self) -> &mut L {
        &mut self.layout
    }

    pub fn pool(&self) -> &HolderPool<A> {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut HolderPool<A> {
        &mut self.pool
    }

    pub fn adapter(&self) -> &A {
        self.pool.adapter()
    }

    pub fn children(&self) -> &VisibleIndexMap {
        &self.children
    }

    pub fn holder(&self, id: HolderId) -> Option<&ItemHolder> {
        self.pool.holder(id)
    }

    pub fn geometry(&self) -> ViewportGeometry {
        self.geometry
    }

    pub fn set_geometry(&mut self, geometry: ViewportGeometry) {
        if self.geometry != geometry {
            self.geometry = geometry;
            self.layout_requested = true;
        }
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    /// The node layout should keep in place when it is still valid.
    pub fn set_focused(&mut self, focused: Option<HolderId>) {
        self.focused = focused;
    }

    /// Structural changes reported since the last layout pass.
    pub fn pending_updates(&self) -> &[UpdateOp] {
        &self.pending
    }

    /// Holders attached only to animate away.
    pub fn animating(&self) -> &[HolderId] {
        &self.animating
    }

    /// Classification of every holder tracked by the last predictive cycle.
    pub fn changes(&self) -> &[(HolderId, Classification)] {
        &self.changes
    }

    /// Adapter positions of the visible children, in child order.
    pub fn visible_positions(&self) -> Vec<usize> {
        (0..self.children.count_logical())
            .filter_map(|i| self.children.child_at(i))
            .filter_map(|id| self.pool.holder(id).and_then(ItemHolder::layout_position))
            .collect()
    }

    pub fn needs_layout(&mut self) -> bool {
        if self.layout.take_layout_request() {
            self.layout_requested = true;
        }
        self.layout_requested || self.data_set_changed || !self.pending.is_empty()
    }

    pub fn notify_item_range_inserted(&mut self, start: usize, count: usize) {
        if count == 0 {
            return;
        }
        self.push_update(UpdateOp::Add { start, count });
        let (layout, ctx) = self.parts(self.pass());
        layout.on_items_added(&ctx, start, count);
    }

    pub fn notify_item_range_removed(&mut self, start: usize, count: usize) {
        if count == 0 {
            return;
        }
        self.push_update(UpdateOp::Remove { start, count });
        let (layout, ctx) = self.parts(self.pass());
        layout.on_items_removed(&ctx, start, count);
    }

    pub fn notify_item_range_changed(&mut self, start: usize, count: usize) {
        if count == 0 {
            return;
        }
        self.push_update(UpdateOp::Update { start, count });
        let (layout, ctx) = self.parts(self.pass());
        layout.on_items_updated(&ctx, start, count);
    }

    pub fn notify_item_moved(&mut self, from: usize, to: usize) {
        if from == to {
            return;
        }
        self.push_update(UpdateOp::Move { from, to });
        let (layout, ctx) = self.parts(self.pass());
        layout.on_items_moved(&ctx, from, to);
    }

    /// Every item may have changed; nothing is animated and every holder is rebound.
    pub fn notify_data_set_changed(&mut self) {
        self.pending.clear();
        self.data_set_changed = true;
        for &id in self.children.physical() {
            if let Some(h) = self.pool.holder_mut(id) {
                h.invalid = true;
            }
        }
        self.pool.invalidate_warm_cache();
        self.layout.on_items_changed();
    }

    fn push_update(&mut self, op: UpdateOp) {
        for &id in self.children.physical() {
            if let Some(h) = self.pool.holder_mut(id) {
                apply_to_holder(h, &op);
            }
        }
        self.pool.apply_update(&op);
        self.pending.push(op);
    }

    /// Runs a full layout cycle and returns the classified changes of a predictive one.
    pub fn dispatch_layout(&mut self) -> &[(HolderId, Classification)] {
        self.changes.clear();
        self.animating.retain(|&id| self.children.is_hidden(id));
        let item_count = self.pool.adapter().item_count();
        let predictive = !self.data_set_changed
            && !self.pending.is_empty()
            && self.layout.supports_predictive_item_animations();
        adebug!(
            item_count,
            predictive,
            pending = self.pending.len(),
            "Controller::dispatch_layout"
        );

        if predictive {
            self.pre_layout(item_count);
        } else {
            self.clear_old_positions();
        }
        self.rebind_changed();

        let pass = LayoutPass::new(item_count)
            .predictive(predictive)
            .with_focused(self.focused);
        {
            let (layout, mut ctx) = self.parts(pass);
            layout.on_layout_children(&mut ctx);
        }
        self.layout.on_layout_completed();

        if predictive {
            for i in 0..self.children.count_logical() {
                let Some(id) = self.children.child_at(i) else {
                    continue;
                };
                if let Some(h) = self.pool.holder(id) {
                    self.store.add_to_post_layout(id, ItemInfo::from_holder(h));
                }
            }
            self.reconcile();
        }
        self.store.clear();
        self.recycle_scrap();

        for &id in self.children.physical() {
            if let Some(h) = self.pool.holder_mut(id) {
                h.changed = false;
            }
        }
        self.pending.clear();
        self.data_set_changed = false;
        self.layout_requested = false;
        &self.changes
    }

    fn pre_layout(&mut self, item_count: usize) {
        for i in 0..self.children.count_logical() {
            let Some(id) = self.children.child_at(i) else {
                continue;
            };
            if let Some(h) = self.pool.holder(id) {
                self.store.add_to_pre_layout(id, ItemInfo::from_holder(h));
            }
        }

        self.pool.set_pre_layout_ops(&self.pending);
        let pass = LayoutPass::new(count_before(&self.pending, item_count))
            .pre_layout(true)
            .predictive(true)
            .with_focused(self.focused);
        {
            let (layout, mut ctx) = self.parts(pass);
            layout.on_layout_children(&mut ctx);
        }
        self.pool.clear_pre_layout_ops();

        for i in 0..self.children.count_logical() {
            let Some(id) = self.children.child_at(i) else {
                continue;
            };
            if self.store.is_in_pre_layout(id) {
                continue;
            }
            if let Some(h) = self.pool.holder(id) {
                self.store
                    .add_to_appeared_in_pre_layout(id, ItemInfo::from_holder(h));
            }
        }

        self.clear_old_positions();
    }

    fn clear_old_positions(&mut self) {
        for &id in self.children.physical().iter().chain(self.scrap.iter()) {
            if let Some(h) = self.pool.holder_mut(id) {
                h.clear_old_position();
            }
        }
    }

    fn rebind_changed(&mut self) {
        let changed: Vec<HolderId> = self
            .children
            .physical()
            .iter()
            .chain(self.scrap.iter())
            .copied()
            .filter(|&id| self.pool.holder(id).is_some_and(|h| h.changed && !h.removed))
            .collect();
        for id in changed {
            self.pool.rebind(id);
            if let Some(h) = self.pool.holder_mut(id) {
                h.changed = true;
            }
        }
    }

    fn reconcile(&mut self) {
        let mut changes = core::mem::take(&mut self.changes);
        self.store.classify(|id, class| changes.push((id, class)));
        for &(id, class) in &changes {
            match class {
                Classification::Disappearing { .. } => {
                    if self.children.index_of(id).is_some() {
                        self.children.hide(id);
                        self.animating.push(id);
                    }
                }
                Classification::Disappeared { .. } => {
                    if let Some(i) = self.scrap.iter().position(|&s| s == id) {
                        self.scrap.remove(i);
                        self.children.insert(id, None, true);
                        self.animating.push(id);
                    }
                }
                Classification::Unused => {
                    if self.children.remove(id) {
                        self.pool.recycle(id);
                    }
                }
                _ => {}
            }
        }
        atrace!(
            changes = changes.len(),
            animating = self.animating.len(),
            "Controller: reconciled"
        );
        self.changes = changes;
    }

    fn recycle_scrap(&mut self) {
        while let Some(id) = self.scrap.pop() {
            self.pool.recycle(id);
        }
    }

    /// Detaches a holder whose exit animation finished. Returns whether it was recycled.
    pub fn end_animation(&mut self, id: HolderId) -> bool {
        let Some(i) = self.animating.iter().position(|&a| a == id) else {
            return false;
        };
        self.animating.remove(i);
        if !self.children.remove_if_hidden(id) {
            return false;
        }
        self.pool.recycle(id);
        true
    }

    pub fn end_animations(&mut self) {
        while let Some(&id) = self.animating.last() {
            self.end_animation(id);
        }
    }

    /// Scrolls by `delta` along the main axis and returns the distance scrolled.
    ///
    /// Pending structural changes are laid out first.
    pub fn scroll_by(&mut self, delta: i32) -> i32 {
        if self.data_set_changed || !self.pending.is_empty() {
            self.dispatch_layout();
        }
        let (layout, mut ctx) = self.parts(self.pass());
        let scrolled = layout.scroll_by(&mut ctx, delta);
        ctx.recycle_scrap();
        scrolled
    }

    pub fn scroll_to_position(&mut self, position: usize) {
        self.layout.scroll_to_position(position);
        self.layout_requested = true;
    }

    pub fn scroll_to_position_with_offset(&mut self, position: usize, offset: i32) {
        self.layout.scroll_to_position_with_offset(position, offset);
        self.layout_requested = true;
    }

    pub fn on_scroll_state_changed(&mut self, state: ScrollState) {
        let (layout, ctx) = self.parts(self.pass());
        layout.on_scroll_state_changed(&ctx, state);
        if self.layout.take_layout_request() {
            self.layout_requested = true;
        }
    }

    pub fn find_first_visible_position(&mut self) -> Option<usize> {
        let (layout, ctx) = self.parts(self.pass());
        layout.find_first_visible_position(&ctx)
    }

    pub fn find_last_visible_position(&mut self) -> Option<usize> {
        let (layout, ctx) = self.parts(self.pass());
        layout.find_last_visible_position(&ctx)
    }

    pub fn save_anchor(&mut self) -> Option<SavedAnchor> {
        let (layout, ctx) = self.parts(self.pass());
        layout.save_anchor(&ctx)
    }

    pub fn restore_anchor(&mut self, anchor: SavedAnchor) {
        self.layout.restore_anchor(anchor);
        self.layout_requested = true;
    }

    fn pass(&self) -> LayoutPass {
        LayoutPass::new(self.pool.adapter().item_count()).with_focused(self.focused)
    }

    fn parts(&mut self, pass: LayoutPass) -> (&mut L, LayoutContext<'_>) {
        let ctx = LayoutContext::new(
            &mut self.children,
            &mut self.pool,
            &mut self.scrap,
            self.geometry,
            pass,
        )
        .with_store(&mut self.store);
        (&mut self.layout, ctx)
    }
}

fn apply_to_holder(h: &mut ItemHolder, op: &UpdateOp) {
    if h.removed {
        return;
    }
    let Some(position) = h.position else {
        return;
    };
    match op.apply(position) {
        None => {
            h.save_old_position();
            if h.pre_layout_position.is_none() {
                h.pre_layout_position = Some(position);
            }
            h.removed = true;
        }
        Some(next) if next != position => {
            h.offset_position(next as isize - position as isize, false);
        }
        Some(next) => {
            if op.updates(next) {
                h.changed = true;
            }
        }
    }
}

impl<A: Adapter, L: LayoutEngine> PrefetchTarget for Controller<A, L> {
    fn is_visible(&self) -> bool {
        self.visible
    }

    fn has_pending_updates(&self) -> bool {
        self.data_set_changed || !self.pending.is_empty()
    }

    fn item_count(&self) -> usize {
        self.pool.adapter().item_count()
    }

    fn collect_adjacent_prefetch_positions(
        &mut self,
        dx: i32,
        dy: i32,
        registry: &mut PrefetchRegistry,
    ) {
        let (layout, ctx) = self.parts(self.pass());
        layout.collect_adjacent_prefetch_positions(&ctx, dx, dy, registry);
    }

    fn collect_initial_prefetch_positions(
        &mut self,
        item_count: usize,
        registry: &mut PrefetchRegistry,
    ) {
        self.layout
            .collect_initial_prefetch_positions(item_count, registry);
    }

    fn is_position_attached(&self, position: usize) -> bool {
        self.children.physical().iter().any(|&id| {
            self.pool
                .holder(id)
                .is_some_and(|h| h.position == Some(position) && !h.invalid)
        })
    }

    fn prefetch_position(
        &mut self,
        position: usize,
        deadline: Deadline,
    ) -> Option<Option<ViewportId>> {
        let id = self.pool.node_for_position(position, deadline)?;
        let nested = self
            .pool
            .holder(id)
            .filter(|h| h.bound && !h.invalid)
            .and_then(|h| h.nested);
        self.pool.add_to_pool(id, true);
        atrace!(position, holder = id.0, "Controller: prefetched");
        Some(nested)
    }

    fn on_prefetch_count_observed(&mut self, count: usize, _nested: bool) {
        self.pool.on_prefetch_count_observed(count);
    }
}
