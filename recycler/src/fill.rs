use alloc::vec::Vec;

use crate::linear::AnchorInfo;
use crate::{
    AxisHelper, EffectiveDirection, HolderId, ItemDirection, LayoutContext, LayoutDirection,
    MeasureMode, MeasureSpec, Orientation, PrefetchRegistry, Size, ViewportGeometry,
};

/// Axis helpers and resolved direction flags for one layout pass.
#[derive(Clone, Copy, Debug)]
pub struct FillEnv {
    pub axis: AxisHelper,
    pub cross: AxisHelper,
    pub direction: EffectiveDirection,
}

impl FillEnv {
    pub fn new(
        orientation: Orientation,
        geometry: ViewportGeometry,
        reverse_layout: bool,
    ) -> Self {
        let mut axis = AxisHelper::new(orientation);
        axis.set_geometry(geometry);
        Self::with_axis(axis, reverse_layout)
    }

    /// Builds an environment around an axis helper that keeps state between passes.
    pub fn with_axis(axis: AxisHelper, reverse_layout: bool) -> Self {
        let geometry = *axis.geometry();
        let mut cross = AxisHelper::new(axis.orientation().other());
        cross.set_geometry(geometry);
        Self {
            axis,
            cross,
            direction: EffectiveDirection::resolve(
                axis.orientation(),
                geometry.is_rtl,
                reverse_layout,
            ),
        }
    }

    pub fn orientation(&self) -> Orientation {
        self.axis.orientation()
    }

    pub fn should_reverse_layout(&self) -> bool {
        self.direction.should_reverse_layout
    }

    pub fn is_rtl(&self) -> bool {
        self.direction.is_rtl
    }

    /// Cross-axis interval for a node `extent` wide, honouring RTL in vertical layouts.
    pub fn cross_interval(&self, extent: i32) -> (i32, i32) {
        if self.orientation() == Orientation::Vertical && self.is_rtl() {
            let end = self.cross.end_after_padding();
            (end - extent, end)
        } else {
            let start = self.cross.start_after_padding();
            (start, start + extent)
        }
    }

    /// Measure spec for a child that gets `cross_size` on the cross axis and is free on the
    /// main axis.
    pub fn child_spec(&self, cross_size: i32) -> MeasureSpec {
        let cross_mode = match self.axis.mode_in_other() {
            MeasureMode::Unbounded => MeasureMode::Unbounded,
            _ => MeasureMode::Exact,
        };
        match self.orientation() {
            Orientation::Vertical => MeasureSpec {
                width: cross_size,
                width_mode: cross_mode,
                height: 0,
                height_mode: MeasureMode::Unbounded,
            },
            Orientation::Horizontal => MeasureSpec {
                width: 0,
                width_mode: MeasureMode::Unbounded,
                height: cross_size,
                height_mode: cross_mode,
            },
        }
    }

    pub fn main_size(&self, size: Size) -> i32 {
        self.axis.main_size(size)
    }

    pub fn cross_size(&self, size: Size) -> i32 {
        self.axis.cross_size(size)
    }
}

/// Cursor for one directional fill pass.
#[derive(Clone, Debug)]
pub struct FillState {
    /// Recycle nodes that leave the budgeted viewport while filling.
    pub recycle: bool,
    /// Pixel line the next chunk is attached at.
    pub offset: i32,
    /// Pixel budget left for this pass.
    pub available: i32,
    /// Data cursor; may step to `-1` or `item_count` when the data runs out.
    pub current_position: isize,
    pub item_direction: ItemDirection,
    pub layout_direction: LayoutDirection,
    /// Pixels that can be scrolled without creating a node, `None` outside scrolling.
    pub scrolling_offset: Option<i32>,
    /// Space laid out beyond `available` without counting against it.
    pub extra_fill_space: i32,
    /// Space recycling must leave alone, in addition to `scrolling_offset`.
    pub no_recycle_space: i32,
    /// Lay out until the data runs out.
    pub infinite: bool,
    pub is_pre_layout: bool,
    pub last_scroll_delta: i32,
    /// When set, nodes come only from this list (predictive layout of disappearing nodes).
    pub scrap_list: Option<Vec<HolderId>>,
}

impl Default for FillState {
    fn default() -> Self {
        Self {
            recycle: true,
            offset: 0,
            available: 0,
            current_position: 0,
            item_direction: ItemDirection::Tail,
            layout_direction: LayoutDirection::End,
            scrolling_offset: None,
            extra_fill_space: 0,
            no_recycle_space: 0,
            infinite: false,
            is_pre_layout: false,
            last_scroll_delta: 0,
            scrap_list: None,
        }
    }
}

impl FillState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> Option<usize> {
        usize::try_from(self.current_position).ok()
    }

    pub fn has_more(&self, item_count: usize) -> bool {
        self.position().is_some_and(|p| p < item_count)
    }

    pub fn advance(&mut self) {
        self.current_position += self.item_direction.step();
    }

    /// Next node for the cursor, advancing it.
    pub fn next(&mut self, ctx: &mut LayoutContext<'_>) -> Option<HolderId> {
        if self.scrap_list.is_some() {
            return self.next_from_scrap_list(ctx);
        }
        let position = self.position()?;
        let node = ctx.obtain(position)?;
        self.advance();
        Some(node)
    }

    fn next_from_scrap_list(&mut self, ctx: &LayoutContext<'_>) -> Option<HolderId> {
        let current = self.position()?;
        let list = self.scrap_list.as_mut()?;
        let found = list.iter().position(|&id| {
            ctx.holder(id)
                .is_some_and(|h| !h.removed && h.layout_position() == Some(current))
        })?;
        let node = list.remove(found);
        self.assign_position_from_scrap_list(ctx);
        Some(node)
    }

    /// Moves the cursor to the closest non-removed scrap node in item direction.
    pub fn assign_position_from_scrap_list(&mut self, ctx: &LayoutContext<'_>) {
        let closest = self.next_in_limited_list(ctx);
        self.current_position = closest
            .and_then(|id| ctx.layout_position(id))
            .map_or(-1, |p| p as isize);
    }

    fn next_in_limited_list(&self, ctx: &LayoutContext<'_>) -> Option<HolderId> {
        let list = self.scrap_list.as_ref()?;
        let step = self.item_direction.step();
        let mut closest = None;
        let mut best = isize::MAX;
        for &id in list {
            let Some(h) = ctx.holder(id) else {
                continue;
            };
            if h.removed {
                continue;
            }
            let Some(pos) = h.layout_position() else {
                continue;
            };
            let distance = (pos as isize - self.current_position) * step;
            if distance < 0 || distance >= best {
                continue;
            }
            closest = Some(id);
            best = distance;
            if distance == 0 {
                break;
            }
        }
        closest
    }
}

/// Outcome of laying out one chunk (an item, or a grid row).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChunkResult {
    pub consumed: i32,
    /// The data ran out; nothing was attached.
    pub finished: bool,
    /// The chunk holds only removed or changed items and must not eat into the budget.
    pub ignore_consumed: bool,
    pub focusable: bool,
}

/// What the shared fill loop delegates to the layout flavour: how one chunk is measured
/// and placed, and how prefetch positions are reported.
pub trait ChunkLayout {
    fn layout_chunk(
        &mut self,
        ctx: &mut LayoutContext<'_>,
        env: &FillEnv,
        state: &mut FillState,
        result: &mut ChunkResult,
    );

    /// Called before a layout pass, after the geometry is known.
    fn prepare(&mut self, _ctx: &LayoutContext<'_>, _env: &FillEnv) {}

    /// Adjusts a freshly resolved anchor before filling.
    fn on_anchor_ready(
        &mut self,
        _ctx: &LayoutContext<'_>,
        _anchor: &mut AnchorInfo,
        _first_item_direction: ItemDirection,
    ) {
    }

    /// Whether an attached node at `position` may serve as the layout reference.
    fn accepts_reference(&self, _ctx: &LayoutContext<'_>, _position: usize) -> bool {
        true
    }

    /// Reports positions the next chunk in `state`'s direction would need.
    fn collect_prefetch_positions(
        &self,
        item_count: usize,
        state: &FillState,
        registry: &mut PrefetchRegistry,
    ) {
        if let Some(position) = state.position().filter(|&p| p < item_count) {
            registry.add_position(position, state.scrolling_offset.unwrap_or(0).max(0));
        }
    }

    /// Items in one chunk, used to size the initial prefetch.
    fn span_count(&self) -> usize {
        1
    }

    fn on_layout_completed(&mut self) {}

    /// Positions shifted or contents changed; drop anything derived from them.
    fn on_items_changed(&mut self) {}
}

/// One item per chunk, stretched across the cross axis.
#[derive(Clone, Copy, Debug, Default)]
pub struct ItemChunk;

impl ChunkLayout for ItemChunk {
    fn layout_chunk(
        &mut self,
        ctx: &mut LayoutContext<'_>,
        env: &FillEnv,
        state: &mut FillState,
        result: &mut ChunkResult,
    ) {
        let Some(node) = state.next(ctx) else {
            result.finished = true;
            return;
        };
        attach_in_layout_order(ctx, env, state, node);

        let size = ctx.measure(node, env.child_spec(env.cross.total_space()));
        result.consumed = env.main_size(size);
        let (cross_start, cross_end) = env.cross_interval(env.cross_size(size));
        let (main_start, main_end) = chunk_main_interval(state, result.consumed);
        ctx.set_bounds(
            node,
            env.axis.place(main_start, main_end, cross_start, cross_end),
        );

        if let Some(h) = ctx.holder(node) {
            result.ignore_consumed = h.is_removed_or_changed();
            result.focusable = h.focusable;
        }
    }
}

/// Attaches `node` at the edge the fill is growing towards.
pub(crate) fn attach_in_layout_order(
    ctx: &mut LayoutContext<'_>,
    env: &FillEnv,
    state: &FillState,
    node: HolderId,
) {
    let at_end = env.should_reverse_layout() == (state.layout_direction == LayoutDirection::Start);
    let index = if at_end { None } else { Some(0) };
    if state.scrap_list.is_none() {
        ctx.add_view(node, index);
    } else {
        ctx.add_disappearing_view(node, index);
    }
}

/// Main-axis interval of a chunk `consumed` pixels long placed at the fill offset.
pub(crate) fn chunk_main_interval(state: &FillState, consumed: i32) -> (i32, i32) {
    match state.layout_direction {
        LayoutDirection::Start => (state.offset - consumed, state.offset),
        LayoutDirection::End => (state.offset, state.offset + consumed),
    }
}

/// Fills in `state`'s direction until the budget or the data runs out.
///
/// No chunk starts once `available + extra_fill_space` is spent. Chunks are placed whole, so
/// the last one may overshoot the budget by up to its own extent.
///
/// Returns the pixels consumed from `state.available`.
pub fn fill<C: ChunkLayout + ?Sized>(
    chunk: &mut C,
    ctx: &mut LayoutContext<'_>,
    env: &FillEnv,
    state: &mut FillState,
    stop_on_focusable: bool,
) -> i32 {
    let start = state.available;
    if let Some(scrolling) = state.scrolling_offset.as_mut() {
        if state.available < 0 {
            *scrolling += state.available;
        }
        recycle_by_fill_state(ctx, env, state);
    }
    let item_count = ctx.item_count();
    let mut remaining = state.available + state.extra_fill_space;
    while (state.infinite || remaining > 0) && state.has_more(item_count) {
        let mut result = ChunkResult::default();
        chunk.layout_chunk(ctx, env, state, &mut result);
        if result.finished {
            rtrace!(cursor = state.current_position, "fill: out of items");
            break;
        }
        state.offset += result.consumed * state.layout_direction.sign();
        // Removed or changed items are free during pre-layout so that the items replacing
        // them get laid out too.
        if !result.ignore_consumed || state.scrap_list.is_some() || !ctx.is_pre_layout() {
            state.available -= result.consumed;
            remaining -= result.consumed;
        }
        if let Some(scrolling) = state.scrolling_offset.as_mut() {
            *scrolling += result.consumed;
            if state.available < 0 {
                *scrolling += state.available;
            }
            recycle_by_fill_state(ctx, env, state);
        }
        if stop_on_focusable && result.focusable {
            break;
        }
    }
    rtrace!(
        consumed = start - state.available,
        cursor = state.current_position,
        "fill"
    );
    start - state.available
}

fn recycle_by_fill_state(ctx: &mut LayoutContext<'_>, env: &FillEnv, state: &FillState) {
    if !state.recycle || state.infinite {
        return;
    }
    let Some(scrolling) = state.scrolling_offset else {
        return;
    };
    match state.layout_direction {
        LayoutDirection::Start => recycle_from_end(ctx, env, scrolling, state.no_recycle_space),
        LayoutDirection::End => recycle_from_start(ctx, env, scrolling, state.no_recycle_space),
    }
}

/// Recycles children that scrolled past the start edge by more than `scrolling_offset`.
pub(crate) fn recycle_from_start(
    ctx: &mut LayoutContext<'_>,
    env: &FillEnv,
    scrolling_offset: i32,
    no_recycle_space: i32,
) {
    if scrolling_offset < 0 {
        return;
    }
    let limit = scrolling_offset - no_recycle_space;
    let count = ctx.child_count();
    let past = |ctx: &LayoutContext<'_>, i: usize| {
        ctx.child_at(i)
            .is_some_and(|id| env.axis.decorated_end(&ctx.bounds(id)) > limit)
    };
    if env.should_reverse_layout() {
        for i in (0..count).rev() {
            if past(ctx, i) {
                recycle_children(ctx, i + 1, count);
                return;
            }
        }
    } else {
        for i in 0..count {
            if past(ctx, i) {
                recycle_children(ctx, 0, i);
                return;
            }
        }
    }
}

/// Recycles children that scrolled past the end edge by more than `scrolling_offset`.
pub(crate) fn recycle_from_end(
    ctx: &mut LayoutContext<'_>,
    env: &FillEnv,
    scrolling_offset: i32,
    no_recycle_space: i32,
) {
    if scrolling_offset < 0 {
        return;
    }
    let limit = env.axis.end() - scrolling_offset + no_recycle_space;
    let count = ctx.child_count();
    let past = |ctx: &LayoutContext<'_>, i: usize| {
        ctx.child_at(i)
            .is_some_and(|id| env.axis.decorated_start(&ctx.bounds(id)) < limit)
    };
    if env.should_reverse_layout() {
        for i in 0..count {
            if past(ctx, i) {
                recycle_children(ctx, 0, i);
                return;
            }
        }
    } else {
        for i in (0..count).rev() {
            if past(ctx, i) {
                recycle_children(ctx, i + 1, count);
                return;
            }
        }
    }
}

/// Removes and recycles children in the logical range `start..end`.
fn recycle_children(ctx: &mut LayoutContext<'_>, start: usize, end: usize) {
    if start >= end {
        return;
    }
    rtrace!(start, end, "recycle_children");
    for i in (start..end).rev() {
        ctx.remove_and_recycle_child_at(i);
    }
}
