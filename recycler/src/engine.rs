use crate::{
    ChunkLayout, LayoutContext, LinearLayout, Orientation, PrefetchRegistry, SavedAnchor,
    ScrollState, StaggeredLayout,
};

/// The surface a host drives, whatever layout flavour sits behind it.
///
/// Structural hooks are told about changes as soon as the data set reports them, before the
/// next layout pass; layouts without per-position caches ignore them.
pub trait LayoutEngine {
    fn orientation(&self) -> Orientation;

    fn on_layout_children(&mut self, ctx: &mut LayoutContext<'_>);

    /// Called once after the post-layout pass; clears pending scroll and restore requests.
    fn on_layout_completed(&mut self);

    /// Scrolls by `delta` pixels along the main axis and returns the distance scrolled.
    fn scroll_by(&mut self, ctx: &mut LayoutContext<'_>, delta: i32) -> i32;

    fn scroll_to_position(&mut self, position: usize);

    fn scroll_to_position_with_offset(&mut self, position: usize, offset: i32);

    fn collect_adjacent_prefetch_positions(
        &mut self,
        ctx: &LayoutContext<'_>,
        dx: i32,
        dy: i32,
        registry: &mut PrefetchRegistry,
    );

    fn collect_initial_prefetch_positions(
        &self,
        item_count: usize,
        registry: &mut PrefetchRegistry,
    );

    fn find_first_visible_position(&self, ctx: &LayoutContext<'_>) -> Option<usize>;

    fn find_last_visible_position(&self, ctx: &LayoutContext<'_>) -> Option<usize>;

    fn save_anchor(&mut self, ctx: &LayoutContext<'_>) -> Option<SavedAnchor>;

    fn restore_anchor(&mut self, anchor: SavedAnchor);

    fn on_items_added(&mut self, _ctx: &LayoutContext<'_>, _start: usize, _count: usize) {}

    fn on_items_removed(&mut self, _ctx: &LayoutContext<'_>, _start: usize, _count: usize) {}

    fn on_items_moved(&mut self, _ctx: &LayoutContext<'_>, _from: usize, _to: usize) {}

    fn on_items_updated(&mut self, _ctx: &LayoutContext<'_>, _start: usize, _count: usize) {}

    /// The whole data set was replaced.
    fn on_items_changed(&mut self) {}

    fn on_scroll_state_changed(&mut self, _ctx: &LayoutContext<'_>, _state: ScrollState) {}

    fn supports_predictive_item_animations(&self) -> bool;

    /// Returns and clears the layout's own request for another pass.
    fn take_layout_request(&mut self) -> bool;
}

impl<C: ChunkLayout> LayoutEngine for LinearLayout<C> {
    fn orientation(&self) -> Orientation {
        LinearLayout::orientation(self)
    }

    fn on_layout_children(&mut self, ctx: &mut LayoutContext<'_>) {
        LinearLayout::on_layout_children(self, ctx);
    }

    fn on_layout_completed(&mut self) {
        LinearLayout::on_layout_completed(self);
    }

    fn scroll_by(&mut self, ctx: &mut LayoutContext<'_>, delta: i32) -> i32 {
        LinearLayout::scroll_by(self, ctx, delta)
    }

    fn scroll_to_position(&mut self, position: usize) {
        LinearLayout::scroll_to_position(self, position);
    }

    fn scroll_to_position_with_offset(&mut self, position: usize, offset: i32) {
        LinearLayout::scroll_to_position_with_offset(self, position, offset);
    }

    fn collect_adjacent_prefetch_positions(
        &mut self,
        ctx: &LayoutContext<'_>,
        dx: i32,
        dy: i32,
        registry: &mut PrefetchRegistry,
    ) {
        LinearLayout::collect_adjacent_prefetch_positions(self, ctx, dx, dy, registry);
    }

    fn collect_initial_prefetch_positions(
        &self,
        item_count: usize,
        registry: &mut PrefetchRegistry,
    ) {
        LinearLayout::collect_initial_prefetch_positions(self, item_count, registry);
    }

    fn find_first_visible_position(&self, ctx: &LayoutContext<'_>) -> Option<usize> {
        LinearLayout::find_first_visible_position(self, ctx)
    }

    fn find_last_visible_position(&self, ctx: &LayoutContext<'_>) -> Option<usize> {
        LinearLayout::find_last_visible_position(self, ctx)
    }

    fn save_anchor(&mut self, ctx: &LayoutContext<'_>) -> Option<SavedAnchor> {
        self.save_state(ctx)
    }

    fn restore_anchor(&mut self, anchor: SavedAnchor) {
        self.restore_state(anchor);
    }

    fn on_items_added(&mut self, _ctx: &LayoutContext<'_>, _start: usize, _count: usize) {
        LinearLayout::on_items_changed(self);
    }

    fn on_items_removed(&mut self, _ctx: &LayoutContext<'_>, _start: usize, _count: usize) {
        LinearLayout::on_items_changed(self);
    }

    fn on_items_moved(&mut self, _ctx: &LayoutContext<'_>, _from: usize, _to: usize) {
        LinearLayout::on_items_changed(self);
    }

    fn on_items_changed(&mut self) {
        LinearLayout::on_items_changed(self);
    }

    fn supports_predictive_item_animations(&self) -> bool {
        LinearLayout::supports_predictive_item_animations(self)
    }

    fn take_layout_request(&mut self) -> bool {
        LinearLayout::take_layout_request(self)
    }
}

impl LayoutEngine for StaggeredLayout {
    fn orientation(&self) -> Orientation {
        StaggeredLayout::orientation(self)
    }

    fn on_layout_children(&mut self, ctx: &mut LayoutContext<'_>) {
        StaggeredLayout::on_layout_children(self, ctx);
    }

    fn on_layout_completed(&mut self) {
        StaggeredLayout::on_layout_completed(self);
    }

    fn scroll_by(&mut self, ctx: &mut LayoutContext<'_>, delta: i32) -> i32 {
        StaggeredLayout::scroll_by(self, ctx, delta)
    }

    fn scroll_to_position(&mut self, position: usize) {
        StaggeredLayout::scroll_to_position(self, position);
    }

    fn scroll_to_position_with_offset(&mut self, position: usize, offset: i32) {
        StaggeredLayout::scroll_to_position_with_offset(self, position, offset);
    }

    fn collect_adjacent_prefetch_positions(
        &mut self,
        ctx: &LayoutContext<'_>,
        dx: i32,
        dy: i32,
        registry: &mut PrefetchRegistry,
    ) {
        StaggeredLayout::collect_adjacent_prefetch_positions(self, ctx, dx, dy, registry);
    }

    fn collect_initial_prefetch_positions(
        &self,
        item_count: usize,
        registry: &mut PrefetchRegistry,
    ) {
        StaggeredLayout::collect_initial_prefetch_positions(self, item_count, registry);
    }

    fn find_first_visible_position(&self, ctx: &LayoutContext<'_>) -> Option<usize> {
        StaggeredLayout::find_first_visible_position(self, ctx)
    }

    fn find_last_visible_position(&self, ctx: &LayoutContext<'_>) -> Option<usize> {
        StaggeredLayout::find_last_visible_position(self, ctx)
    }

    fn save_anchor(&mut self, ctx: &LayoutContext<'_>) -> Option<SavedAnchor> {
        StaggeredLayout::save_anchor(self, ctx)
    }

    fn restore_anchor(&mut self, anchor: SavedAnchor) {
        StaggeredLayout::restore_anchor(self, anchor);
    }

    fn on_items_added(&mut self, ctx: &LayoutContext<'_>, start: usize, count: usize) {
        StaggeredLayout::on_items_added(self, ctx, start, count);
    }

    fn on_items_removed(&mut self, ctx: &LayoutContext<'_>, start: usize, count: usize) {
        StaggeredLayout::on_items_removed(self, ctx, start, count);
    }

    fn on_items_moved(&mut self, ctx: &LayoutContext<'_>, from: usize, to: usize) {
        StaggeredLayout::on_items_moved(self, ctx, from, to);
    }

    fn on_items_updated(&mut self, ctx: &LayoutContext<'_>, start: usize, count: usize) {
        StaggeredLayout::on_items_updated(self, ctx, start, count);
    }

    fn on_items_changed(&mut self) {
        StaggeredLayout::on_items_changed(self);
    }

    fn on_scroll_state_changed(&mut self, ctx: &LayoutContext<'_>, state: ScrollState) {
        StaggeredLayout::on_scroll_state_changed(self, ctx, state);
    }

    fn supports_predictive_item_animations(&self) -> bool {
        StaggeredLayout::supports_predictive_item_animations(self)
    }

    fn take_layout_request(&mut self) -> bool {
        StaggeredLayout::take_layout_request(self)
    }
}
