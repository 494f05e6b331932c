use alloc::vec::Vec;

use crate::fill::{ChunkLayout, FillEnv, FillState, ItemChunk, fill};
use crate::{
    AxisHelper, HolderId, ItemDirection, LayoutContext, LayoutDirection, Orientation,
    PrefetchRegistry, SavedAnchor, ViewportGeometry,
};

/// Configuration for [`LinearLayout`] and the grid built on it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LinearOptions {
    pub orientation: Orientation,
    /// Lay items out from the end edge towards the start edge.
    pub reverse_layout: bool,
    /// Anchor content to the end edge when it does not fill the viewport.
    pub stack_from_end: bool,
    /// Positions prefetched when a nested viewport is about to become visible.
    pub initial_prefetch_item_count: usize,
    /// Lay out disappearing nodes for predictive animations.
    pub predictive_animations: bool,
}

impl Default for LinearOptions {
    fn default() -> Self {
        Self {
            orientation: Orientation::Vertical,
            reverse_layout: false,
            stack_from_end: false,
            initial_prefetch_item_count: 2,
            predictive_animations: true,
        }
    }
}

impl LinearOptions {
    pub fn new(orientation: Orientation) -> Self {
        Self {
            orientation,
            ..Self::default()
        }
    }

    pub fn with_reverse_layout(mut self, reverse_layout: bool) -> Self {
        self.reverse_layout = reverse_layout;
        self
    }

    pub fn with_stack_from_end(mut self, stack_from_end: bool) -> Self {
        self.stack_from_end = stack_from_end;
        self
    }

    pub fn with_initial_prefetch_item_count(mut self, count: usize) -> Self {
        self.initial_prefetch_item_count = count;
        self
    }

    pub fn with_predictive_animations(mut self, enabled: bool) -> Self {
        self.predictive_animations = enabled;
        self
    }
}

/// The (data position, pixel coordinate) pair a layout pass fills outward from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AnchorInfo {
    pub position: usize,
    pub coordinate: i32,
    /// `coordinate` is the anchor's end line rather than its start line.
    pub layout_from_end: bool,
    pub valid: bool,
}

impl AnchorInfo {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn assign_coordinate_from_padding(&mut self, axis: &AxisHelper) {
        self.coordinate = if self.layout_from_end {
            axis.end_after_padding()
        } else {
            axis.start_after_padding()
        };
    }

    pub fn assign_from_view(&mut self, ctx: &LayoutContext<'_>, axis: &AxisHelper, id: HolderId) {
        let bounds = ctx.bounds(id);
        self.coordinate = if self.layout_from_end {
            axis.decorated_end(&bounds) + axis.total_space_change()
        } else {
            axis.decorated_start(&bounds)
        };
        self.position = ctx.layout_position(id).unwrap_or(0);
    }

    /// Like [`Self::assign_from_view`], but when the viewport shrank it keeps as much of the
    /// node visible as fits.
    pub fn assign_from_view_and_keep_visible_rect(
        &mut self,
        ctx: &LayoutContext<'_>,
        axis: &AxisHelper,
        id: HolderId,
    ) {
        let space_change = axis.total_space_change();
        if space_change >= 0 {
            self.assign_from_view(ctx, axis, id);
            return;
        }
        let bounds = ctx.bounds(id);
        self.position = ctx.layout_position(id).unwrap_or(0);
        if self.layout_from_end {
            let prev_layout_end = axis.end_after_padding() - space_change;
            let previous_end_margin = prev_layout_end - axis.decorated_end(&bounds);
            self.coordinate = axis.end_after_padding() - previous_end_margin;
            if previous_end_margin > 0 {
                let estimated_start = self.coordinate - axis.decorated_measurement(&bounds);
                let layout_start = axis.start_after_padding();
                let previous_start_margin = axis.decorated_start(&bounds) - layout_start;
                let start_reference = layout_start + previous_start_margin.min(0);
                let start_margin = estimated_start - start_reference;
                if start_margin < 0 {
                    self.coordinate += previous_end_margin.min(-start_margin);
                }
            }
        } else {
            let child_start = axis.decorated_start(&bounds);
            let start_margin = child_start - axis.start_after_padding();
            self.coordinate = child_start;
            if start_margin > 0 {
                let estimated_end = child_start + axis.decorated_measurement(&bounds);
                let previous_layout_end = axis.end_after_padding() - space_change;
                let previous_end_margin = previous_layout_end - axis.decorated_end(&bounds);
                let end_reference = axis.end_after_padding() - previous_end_margin.min(0);
                let end_margin = end_reference - estimated_end;
                if end_margin < 0 {
                    self.coordinate -= start_margin.min(-end_margin);
                }
            }
        }
    }
}

fn is_valid_anchor(ctx: &LayoutContext<'_>, id: HolderId) -> bool {
    ctx.holder(id).is_some_and(|h| {
        !h.removed && h.layout_position().is_some_and(|p| p < ctx.item_count())
    })
}

/// Single-lane layout: resolves an anchor, fills outward from it in both directions and
/// recycles what scrolls out.
///
/// The chunk type decides what one fill step lays out; [`ItemChunk`] places one item per
/// step, [`crate::GridRows`] a row of cells.
#[derive(Clone, Debug)]
pub struct LinearLayout<C: ChunkLayout = ItemChunk> {
    options: LinearOptions,
    pub(crate) chunk: C,
    axis: AxisHelper,
    state: FillState,
    anchor: AnchorInfo,
    pending_scroll_position: Option<usize>,
    pending_scroll_offset: Option<i32>,
    pending_saved: Option<SavedAnchor>,
    last_stack_from_end: bool,
    should_reverse_layout: bool,
    layout_requested: bool,
}

impl LinearLayout<ItemChunk> {
    pub fn new(options: LinearOptions) -> Self {
        Self::with_chunk(options, ItemChunk)
    }
}

impl Default for LinearLayout<ItemChunk> {
    fn default() -> Self {
        Self::new(LinearOptions::default())
    }
}

impl<C: ChunkLayout> LinearLayout<C> {
    pub fn with_chunk(options: LinearOptions, chunk: C) -> Self {
        Self {
            axis: AxisHelper::new(options.orientation),
            options,
            chunk,
            state: FillState::new(),
            anchor: AnchorInfo::default(),
            pending_scroll_position: None,
            pending_scroll_offset: None,
            pending_saved: None,
            last_stack_from_end: options.stack_from_end,
            should_reverse_layout: options.reverse_layout,
            layout_requested: false,
        }
    }

    pub fn options(&self) -> &LinearOptions {
        &self.options
    }

    pub fn orientation(&self) -> Orientation {
        self.options.orientation
    }

    /// The fill cursor as left by the last pass or scroll.
    pub fn fill_state(&self) -> &FillState {
        &self.state
    }

    pub fn set_orientation(&mut self, orientation: Orientation) {
        if orientation == self.options.orientation {
            return;
        }
        self.options.orientation = orientation;
        self.axis = AxisHelper::new(orientation);
        self.anchor.reset();
        self.layout_requested = true;
    }

    pub fn set_reverse_layout(&mut self, reverse_layout: bool) {
        if reverse_layout == self.options.reverse_layout {
            return;
        }
        self.options.reverse_layout = reverse_layout;
        self.layout_requested = true;
    }

    pub fn set_stack_from_end(&mut self, stack_from_end: bool) {
        if stack_from_end == self.options.stack_from_end {
            return;
        }
        self.options.stack_from_end = stack_from_end;
        self.layout_requested = true;
    }

    pub fn set_initial_prefetch_item_count(&mut self, count: usize) {
        self.options.initial_prefetch_item_count = count;
    }

    pub fn supports_predictive_item_animations(&self) -> bool {
        self.options.predictive_animations && self.pending_saved.is_none()
    }

    /// Returns and clears the "layout needed" flag raised by setters and scroll requests.
    pub fn take_layout_request(&mut self) -> bool {
        core::mem::take(&mut self.layout_requested)
    }

    /// Structural change in the data; chunk-level caches keyed by position are dropped.
    pub fn on_items_changed(&mut self) {
        self.chunk.on_items_changed();
    }

    pub(crate) fn request_layout(&mut self) {
        self.layout_requested = true;
    }

    fn env(&mut self, geometry: ViewportGeometry) -> FillEnv {
        self.axis.set_geometry(geometry);
        let env = FillEnv::with_axis(self.axis, self.options.reverse_layout);
        self.should_reverse_layout = env.should_reverse_layout();
        env
    }

    /// Scrolls so that `position` is visible on the next layout pass.
    pub fn scroll_to_position(&mut self, position: usize) {
        self.pending_scroll_position = Some(position);
        self.pending_scroll_offset = None;
        if let Some(saved) = self.pending_saved.as_mut() {
            saved.invalidate();
        }
        self.layout_requested = true;
    }

    /// Scrolls so that `position` starts `offset` pixels from the start padding edge (end
    /// edge in reverse layouts) on the next layout pass.
    pub fn scroll_to_position_with_offset(&mut self, position: usize, offset: i32) {
        self.pending_scroll_position = Some(position);
        self.pending_scroll_offset = Some(offset);
        if let Some(saved) = self.pending_saved.as_mut() {
            saved.invalidate();
        }
        self.layout_requested = true;
    }

    /// Lays out the children for the current data set and geometry.
    pub fn on_layout_children(&mut self, ctx: &mut LayoutContext<'_>) {
        let item_count = ctx.item_count();
        if (self.pending_saved.is_some() || self.pending_scroll_position.is_some())
            && item_count == 0
        {
            ctx.remove_and_recycle_all_views();
            return;
        }
        if let Some(position) = self.pending_saved.and_then(|saved| saved.position) {
            self.pending_scroll_position = Some(position);
        }

        let env = self.env(ctx.geometry);
        self.chunk.prepare(ctx, &env);
        self.state.recycle = false;

        if item_count == 0 || (env.axis.end() <= 0 && !env.axis.is_infinite()) {
            rdebug!(item_count, "LinearLayout: nothing to lay out");
            ctx.detach_and_scrap_attached_views();
            self.anchor.reset();
            return;
        }

        let focused = ctx.focused_child();
        if !self.anchor.valid
            || self.pending_scroll_position.is_some()
            || self.pending_saved.is_some()
        {
            self.anchor.reset();
            self.anchor.layout_from_end = self.should_reverse_layout ^ self.options.stack_from_end;
            self.update_anchor_info_for_layout(ctx, &env);
            self.anchor.valid = true;
        } else if let Some(focused) = focused {
            let bounds = ctx.bounds(focused);
            if env.axis.decorated_start(&bounds) >= env.axis.end_after_padding()
                || env.axis.decorated_end(&bounds) <= env.axis.start_after_padding()
            {
                self.anchor
                    .assign_from_view_and_keep_visible_rect(ctx, &env.axis, focused);
            }
        }
        rdebug!(
            position = self.anchor.position,
            coordinate = self.anchor.coordinate,
            from_end = self.anchor.layout_from_end,
            pre_layout = ctx.is_pre_layout(),
            "LinearLayout: anchor resolved"
        );

        self.state.layout_direction = if self.state.last_scroll_delta >= 0 {
            LayoutDirection::End
        } else {
            LayoutDirection::Start
        };
        let (extra_start, extra_end) = self.extra_layout_space(ctx, &env);
        let mut extra_for_start = extra_start.max(0) + env.axis.start_after_padding();
        let mut extra_for_end = extra_end.max(0) + env.axis.end_padding();

        if ctx.is_pre_layout() {
            if let (Some(position), Some(offset)) =
                (self.pending_scroll_position, self.pending_scroll_offset)
            {
                if let Some(existing) = ctx.find_view_by_position(position) {
                    let bounds = ctx.bounds(existing);
                    let upcoming = if self.should_reverse_layout {
                        let current =
                            env.axis.end_after_padding() - env.axis.decorated_end(&bounds);
                        current - offset
                    } else {
                        let current =
                            env.axis.decorated_start(&bounds) - env.axis.start_after_padding();
                        offset - current
                    };
                    if upcoming > 0 {
                        extra_for_start += upcoming;
                    } else {
                        extra_for_end -= upcoming;
                    }
                }
            }
        }

        let first_item_direction = match (self.anchor.layout_from_end, self.should_reverse_layout) {
            (true, true) | (false, false) => ItemDirection::Tail,
            _ => ItemDirection::Head,
        };
        self.chunk
            .on_anchor_ready(ctx, &mut self.anchor, first_item_direction);
        ctx.detach_and_scrap_attached_views();
        self.state.infinite = env.axis.is_infinite();
        self.state.is_pre_layout = ctx.is_pre_layout();
        self.state.no_recycle_space = 0;

        let anchor = self.anchor;
        let mut start_offset;
        let mut end_offset;
        if anchor.layout_from_end {
            self.update_state_to_fill_start(&env, anchor.position, anchor.coordinate);
            self.state.extra_fill_space = extra_for_start;
            fill(&mut self.chunk, ctx, &env, &mut self.state, false);
            start_offset = self.state.offset;
            let first_element = self.state.current_position;
            if self.state.available > 0 {
                extra_for_end += self.state.available;
            }
            self.update_state_to_fill_end(&env, anchor.position, anchor.coordinate);
            self.state.extra_fill_space = extra_for_end;
            self.state.advance();
            fill(&mut self.chunk, ctx, &env, &mut self.state, false);
            end_offset = self.state.offset;
            if self.state.available > 0 {
                let leftover = self.state.available;
                self.update_state_to_fill_start_at(&env, first_element, start_offset);
                self.state.extra_fill_space = leftover;
                fill(&mut self.chunk, ctx, &env, &mut self.state, false);
                start_offset = self.state.offset;
            }
        } else {
            self.update_state_to_fill_end(&env, anchor.position, anchor.coordinate);
            self.state.extra_fill_space = extra_for_end;
            fill(&mut self.chunk, ctx, &env, &mut self.state, false);
            end_offset = self.state.offset;
            let last_element = self.state.current_position;
            if self.state.available > 0 {
                extra_for_start += self.state.available;
            }
            self.update_state_to_fill_start(&env, anchor.position, anchor.coordinate);
            self.state.extra_fill_space = extra_for_start;
            self.state.advance();
            fill(&mut self.chunk, ctx, &env, &mut self.state, false);
            start_offset = self.state.offset;
            if self.state.available > 0 {
                let leftover = self.state.available;
                self.update_state_to_fill_end_at(&env, last_element, end_offset);
                self.state.extra_fill_space = leftover;
                fill(&mut self.chunk, ctx, &env, &mut self.state, false);
                end_offset = self.state.offset;
            }
        }

        if ctx.child_count() > 0 {
            let fixes = if self.should_reverse_layout ^ self.options.stack_from_end {
                [true, false]
            } else {
                [false, true]
            };
            for (step, fix_end) in fixes.into_iter().enumerate() {
                let can_offset_children = step == 0;
                let fix = if fix_end {
                    self.fix_layout_end_gap(ctx, &env, end_offset, can_offset_children)
                } else {
                    self.fix_layout_start_gap(ctx, &env, start_offset, can_offset_children)
                };
                start_offset += fix;
                end_offset += fix;
            }
        }

        self.layout_for_predictive_animations(ctx, &env, start_offset, end_offset);
        if ctx.is_pre_layout() {
            self.anchor.reset();
        } else {
            self.axis.on_layout_complete();
        }
        self.last_stack_from_end = self.options.stack_from_end;
        rdebug!(
            children = ctx.child_count(),
            start_offset,
            end_offset,
            "LinearLayout: layout complete"
        );
    }

    /// Clears one-shot requests once the host finished a full layout cycle.
    pub fn on_layout_completed(&mut self) {
        self.pending_saved = None;
        self.pending_scroll_position = None;
        self.pending_scroll_offset = None;
        self.anchor.reset();
        self.chunk.on_layout_completed();
    }

    fn update_anchor_info_for_layout(&mut self, ctx: &LayoutContext<'_>, env: &FillEnv) {
        if self.update_anchor_from_pending_data(ctx, env) {
            return;
        }
        if self.update_anchor_from_children(ctx, env) {
            return;
        }
        self.anchor.assign_coordinate_from_padding(&env.axis);
        self.anchor.position = if self.options.stack_from_end {
            ctx.item_count().saturating_sub(1)
        } else {
            0
        };
    }

    fn update_anchor_from_pending_data(&mut self, ctx: &LayoutContext<'_>, env: &FillEnv) -> bool {
        if ctx.is_pre_layout() {
            return false;
        }
        let Some(position) = self.pending_scroll_position else {
            return false;
        };
        if position >= ctx.item_count() {
            rwarn!(position, count = ctx.item_count(), "LinearLayout: scroll target out of range");
            self.pending_scroll_position = None;
            self.pending_scroll_offset = None;
            return false;
        }
        let axis = &env.axis;
        self.anchor.position = position;
        if let Some(saved) = self.pending_saved.filter(SavedAnchor::has_valid_anchor) {
            self.anchor.layout_from_end = saved.layout_from_end;
            self.anchor.coordinate = if saved.layout_from_end {
                axis.end_after_padding() - saved.offset
            } else {
                axis.start_after_padding() + saved.offset
            };
            return true;
        }

        if let Some(offset) = self.pending_scroll_offset {
            self.anchor.layout_from_end = self.should_reverse_layout;
            self.anchor.coordinate = if self.should_reverse_layout {
                axis.end_after_padding() - offset
            } else {
                axis.start_after_padding() + offset
            };
            return true;
        }

        match ctx.find_view_by_position(position) {
            Some(child) => {
                let bounds = ctx.bounds(child);
                if axis.decorated_measurement(&bounds) > axis.total_space() {
                    self.anchor.assign_coordinate_from_padding(axis);
                    return true;
                }
                if axis.decorated_start(&bounds) - axis.start_after_padding() < 0 {
                    self.anchor.coordinate = axis.start_after_padding();
                    self.anchor.layout_from_end = false;
                    return true;
                }
                if axis.end_after_padding() - axis.decorated_end(&bounds) < 0 {
                    self.anchor.coordinate = axis.end_after_padding();
                    self.anchor.layout_from_end = true;
                    return true;
                }
                self.anchor.coordinate = if self.anchor.layout_from_end {
                    axis.decorated_end(&bounds) + axis.total_space_change()
                } else {
                    axis.decorated_start(&bounds)
                };
            }
            None => {
                if let Some(first) = ctx.child_position(0) {
                    let before = position < first;
                    self.anchor.layout_from_end = before == self.should_reverse_layout;
                }
                self.anchor.assign_coordinate_from_padding(axis);
            }
        }
        true
    }

    fn update_anchor_from_children(&mut self, ctx: &LayoutContext<'_>, env: &FillEnv) -> bool {
        if ctx.child_count() == 0 {
            return false;
        }
        if let Some(focused) = ctx.focused_child().filter(|&id| is_valid_anchor(ctx, id)) {
            self.anchor
                .assign_from_view_and_keep_visible_rect(ctx, &env.axis, focused);
            return true;
        }
        if self.last_stack_from_end != self.options.stack_from_end {
            return false;
        }
        let Some(reference) = self.find_reference_child(
            ctx,
            env,
            self.anchor.layout_from_end,
            self.options.stack_from_end,
        ) else {
            return false;
        };
        self.anchor.assign_from_view(ctx, &env.axis, reference);
        if !ctx.is_pre_layout() && self.supports_predictive_item_animations() {
            let bounds = ctx.bounds(reference);
            let (start, end) = (env.axis.decorated_start(&bounds), env.axis.decorated_end(&bounds));
            let bounds_start = env.axis.start_after_padding();
            let bounds_end = env.axis.end_after_padding();
            let out_before = end <= bounds_start && start < bounds_start;
            let out_after = start >= bounds_end && end > bounds_end;
            if out_before || out_after {
                self.anchor.coordinate = if self.anchor.layout_from_end {
                    bounds_end
                } else {
                    bounds_start
                };
            }
        }
        true
    }

    /// Picks the attached node closest to the layout's leading edge.
    ///
    /// Nodes inside the viewport win immediately; otherwise the first out-of-bounds node on
    /// the trailing side, then one on the leading side, then a removed one.
    fn find_reference_child(
        &self,
        ctx: &LayoutContext<'_>,
        env: &FillEnv,
        layout_from_end: bool,
        traverse_in_reverse: bool,
    ) -> Option<HolderId> {
        let count = ctx.child_count();
        let item_count = ctx.item_count();
        let bounds_start = env.axis.start_after_padding();
        let bounds_end = env.axis.end_after_padding();
        let mut invalid_match = None;
        let mut best_first = None;
        let mut best_second = None;
        let order: Vec<usize> = if traverse_in_reverse {
            (0..count).rev().collect()
        } else {
            (0..count).collect()
        };
        for i in order {
            let Some(id) = ctx.child_at(i) else {
                continue;
            };
            let Some(holder) = ctx.holder(id) else {
                continue;
            };
            let Some(position) = holder.layout_position().filter(|&p| p < item_count) else {
                continue;
            };
            if !self.chunk.accepts_reference(ctx, position) {
                continue;
            }
            if holder.removed {
                invalid_match.get_or_insert(id);
                continue;
            }
            let start = env.axis.decorated_start(&holder.bounds);
            let end = env.axis.decorated_end(&holder.bounds);
            let out_before = end <= bounds_start && start < bounds_start;
            let out_after = start >= bounds_end && end > bounds_end;
            if !(out_before || out_after) {
                return Some(id);
            }
            let leading = if layout_from_end { out_before } else { out_after };
            if leading {
                best_first = Some(id);
            } else {
                best_second.get_or_insert(id);
            }
        }
        best_second.or(best_first).or(invalid_match)
    }

    /// Extra space to lay out towards `(start, end)`: one screen towards a smooth-scroll
    /// target, nothing otherwise.
    fn extra_layout_space(&self, ctx: &LayoutContext<'_>, env: &FillEnv) -> (i32, i32) {
        if ctx.pass.target_scroll_position.is_none() {
            return (0, 0);
        }
        let extra = env.axis.total_space();
        match self.state.layout_direction {
            LayoutDirection::Start => (extra, 0),
            LayoutDirection::End => (0, extra),
        }
    }

    fn update_state_to_fill_end(&mut self, env: &FillEnv, position: usize, offset: i32) {
        self.update_state_to_fill_end_at(env, position as isize, offset);
    }

    fn update_state_to_fill_end_at(&mut self, env: &FillEnv, position: isize, offset: i32) {
        let state = &mut self.state;
        state.available = env.axis.end_after_padding() - offset;
        state.layout_direction = LayoutDirection::End;
        state.item_direction = env.direction.item_direction(LayoutDirection::End);
        state.current_position = position;
        state.offset = offset;
        state.scrolling_offset = None;
    }

    fn update_state_to_fill_start(&mut self, env: &FillEnv, position: usize, offset: i32) {
        self.update_state_to_fill_start_at(env, position as isize, offset);
    }

    fn update_state_to_fill_start_at(&mut self, env: &FillEnv, position: isize, offset: i32) {
        let state = &mut self.state;
        state.available = offset - env.axis.start_after_padding();
        state.layout_direction = LayoutDirection::Start;
        state.item_direction = env.direction.item_direction(LayoutDirection::Start);
        state.current_position = position;
        state.offset = offset;
        state.scrolling_offset = None;
    }

    fn fix_layout_end_gap(
        &mut self,
        ctx: &mut LayoutContext<'_>,
        env: &FillEnv,
        end_offset: i32,
        can_offset_children: bool,
    ) -> i32 {
        let gap = env.axis.end_after_padding() - end_offset;
        if gap <= 0 {
            return 0;
        }
        let fix = -self.scroll_by_internal(ctx, env, -gap);
        if can_offset_children {
            let gap = env.axis.end_after_padding() - (end_offset + fix);
            if gap > 0 {
                ctx.offset_children(&env.axis, gap);
                return gap + fix;
            }
        }
        fix
    }

    fn fix_layout_start_gap(
        &mut self,
        ctx: &mut LayoutContext<'_>,
        env: &FillEnv,
        start_offset: i32,
        can_offset_children: bool,
    ) -> i32 {
        let gap = start_offset - env.axis.start_after_padding();
        if gap <= 0 {
            return 0;
        }
        let fix = -self.scroll_by_internal(ctx, env, gap);
        if can_offset_children {
            let gap = start_offset + fix - env.axis.start_after_padding();
            if gap > 0 {
                ctx.offset_children(&env.axis, -gap);
                return fix - gap;
            }
        }
        fix
    }

    /// Lays scrap nodes that are still in the data set out beyond the edges, so they can
    /// animate to their new positions.
    fn layout_for_predictive_animations(
        &mut self,
        ctx: &mut LayoutContext<'_>,
        env: &FillEnv,
        start_offset: i32,
        end_offset: i32,
    ) {
        if !ctx.pass.run_predictive_animations
            || ctx.child_count() == 0
            || ctx.is_pre_layout()
            || !self.supports_predictive_item_animations()
        {
            return;
        }
        let Some(first_child_position) = ctx.child_position(0) else {
            return;
        };
        let mut extra_start = 0;
        let mut extra_end = 0;
        for &id in ctx.scrap.iter() {
            let Some(holder) = ctx.holder(id) else {
                continue;
            };
            if holder.removed {
                continue;
            }
            let Some(position) = holder.layout_position() else {
                continue;
            };
            let towards_start = (position < first_child_position) != self.should_reverse_layout;
            let size = env.axis.decorated_measurement(&holder.bounds);
            if towards_start {
                extra_start += size;
            } else {
                extra_end += size;
            }
        }
        if extra_start <= 0 && extra_end <= 0 {
            return;
        }
        rtrace!(extra_start, extra_end, "LinearLayout: predictive layout");

        if extra_start > 0 {
            if let Some(position) = self
                .child_closest_to_start(ctx)
                .and_then(|id| ctx.layout_position(id))
            {
                self.update_state_to_fill_start(env, position, start_offset);
                self.state.scrap_list = Some(ctx.scrap.clone());
                self.state.extra_fill_space = extra_start;
                self.state.available = 0;
                self.state.assign_position_from_scrap_list(ctx);
                fill(&mut self.chunk, ctx, env, &mut self.state, false);
            }
        }
        if extra_end > 0 {
            if let Some(position) = self
                .child_closest_to_end(ctx)
                .and_then(|id| ctx.layout_position(id))
            {
                self.update_state_to_fill_end(env, position, end_offset);
                self.state.scrap_list = Some(ctx.scrap.clone());
                self.state.extra_fill_space = extra_end;
                self.state.available = 0;
                self.state.assign_position_from_scrap_list(ctx);
                fill(&mut self.chunk, ctx, env, &mut self.state, false);
            }
        }
        self.state.scrap_list = None;
    }

    fn child_closest_to_start(&self, ctx: &LayoutContext<'_>) -> Option<HolderId> {
        if self.should_reverse_layout {
            ctx.child_at(ctx.child_count().checked_sub(1)?)
        } else {
            ctx.child_at(0)
        }
    }

    fn child_closest_to_end(&self, ctx: &LayoutContext<'_>) -> Option<HolderId> {
        if self.should_reverse_layout {
            ctx.child_at(0)
        } else {
            ctx.child_at(ctx.child_count().checked_sub(1)?)
        }
    }

    /// Prepares the fill state to grow `required_space` pixels towards `layout_direction`
    /// from the outermost child.
    fn update_layout_state(
        &mut self,
        ctx: &LayoutContext<'_>,
        env: &FillEnv,
        layout_direction: LayoutDirection,
        required_space: i32,
        can_use_existing_space: bool,
    ) -> bool {
        self.state.infinite = env.axis.is_infinite();
        self.state.layout_direction = layout_direction;
        let (extra_start, extra_end) = self.extra_layout_space(ctx, env);
        let (extra_start, extra_end) = (extra_start.max(0), extra_end.max(0));
        let to_end = layout_direction == LayoutDirection::End;
        self.state.extra_fill_space = if to_end { extra_end } else { extra_start };
        self.state.no_recycle_space = if to_end { extra_start } else { extra_end };

        let child = if to_end {
            self.child_closest_to_end(ctx)
        } else {
            self.child_closest_to_start(ctx)
        };
        let Some((child, position)) = child.and_then(|id| Some((id, ctx.layout_position(id)?)))
        else {
            return false;
        };
        let bounds = ctx.bounds(child);
        self.state.item_direction = env.direction.item_direction(layout_direction);
        self.state.current_position = position as isize + self.state.item_direction.step();
        let scrolling_offset = if to_end {
            self.state.extra_fill_space += env.axis.end_padding();
            self.state.offset = env.axis.decorated_end(&bounds);
            env.axis.decorated_end(&bounds) - env.axis.end_after_padding()
        } else {
            self.state.extra_fill_space += env.axis.start_after_padding();
            self.state.offset = env.axis.decorated_start(&bounds);
            env.axis.start_after_padding() - env.axis.decorated_start(&bounds)
        };
        self.state.available = required_space;
        if can_use_existing_space {
            self.state.available -= scrolling_offset;
        }
        self.state.scrolling_offset = Some(scrolling_offset);
        true
    }

    /// Scrolls the content by `delta` pixels and returns the distance actually scrolled.
    ///
    /// Positive deltas move content towards the start edge (reveal items at the end).
    pub fn scroll_by(&mut self, ctx: &mut LayoutContext<'_>, delta: i32) -> i32 {
        let env = self.env(ctx.geometry);
        self.scroll_by_internal(ctx, &env, delta)
    }

    fn scroll_by_internal(
        &mut self,
        ctx: &mut LayoutContext<'_>,
        env: &FillEnv,
        delta: i32,
    ) -> i32 {
        if ctx.child_count() == 0 || delta == 0 {
            return 0;
        }
        self.state.recycle = true;
        let layout_direction = LayoutDirection::for_delta(delta);
        let abs_delta = delta.saturating_abs();
        if !self.update_layout_state(ctx, env, layout_direction, abs_delta, true) {
            return 0;
        }
        let scrolling_offset = self.state.scrolling_offset.unwrap_or(0);
        let consumed = scrolling_offset + fill(&mut self.chunk, ctx, env, &mut self.state, false);
        if consumed < 0 {
            return 0;
        }
        let scrolled = if abs_delta > consumed {
            layout_direction.sign() * consumed
        } else {
            delta
        };
        ctx.offset_children(&env.axis, -scrolled);
        self.state.last_scroll_delta = scrolled;
        rtrace!(delta, scrolled, "LinearLayout::scroll_by");
        scrolled
    }

    /// Reports the chunk a scroll of `(dx, dy)` would lay out next.
    pub fn collect_adjacent_prefetch_positions(
        &mut self,
        ctx: &LayoutContext<'_>,
        dx: i32,
        dy: i32,
        registry: &mut PrefetchRegistry,
    ) {
        let delta = match self.options.orientation {
            Orientation::Horizontal => dx,
            Orientation::Vertical => dy,
        };
        if ctx.child_count() == 0 || delta == 0 {
            return;
        }
        let env = self.env(ctx.geometry);
        let layout_direction = LayoutDirection::for_delta(delta);
        if self.update_layout_state(ctx, &env, layout_direction, delta.saturating_abs(), true) {
            self.chunk
                .collect_prefetch_positions(ctx.item_count(), &self.state, registry);
        }
    }

    /// Reports the first items a not-yet-laid-out viewport will show.
    pub fn collect_initial_prefetch_positions(
        &self,
        item_count: usize,
        registry: &mut PrefetchRegistry,
    ) {
        let (from_end, anchor) = match self.pending_saved.filter(SavedAnchor::has_valid_anchor) {
            Some(saved) => (saved.layout_from_end, saved.position),
            None => {
                let from_end = self.should_reverse_layout;
                let anchor = self.pending_scroll_position.or_else(|| {
                    if from_end {
                        item_count.checked_sub(1)
                    } else {
                        Some(0)
                    }
                });
                (from_end, anchor)
            }
        };
        let Some(mut target) = anchor.map(|p| p as isize) else {
            return;
        };
        let step = if from_end { -1 } else { 1 };
        let count = self.options.initial_prefetch_item_count * self.chunk.span_count();
        for _ in 0..count {
            if target < 0 || target as usize >= item_count {
                break;
            }
            registry.add_position(target as usize, 0);
            target += step;
        }
    }

    fn find_one_visible_child(
        &self,
        ctx: &LayoutContext<'_>,
        reverse: bool,
        completely_visible: bool,
        accept_partially_visible: bool,
    ) -> Option<HolderId> {
        let mut axis = self.axis;
        axis.set_geometry(ctx.geometry);
        let start = axis.start_after_padding();
        let end = axis.end_after_padding();
        let count = ctx.child_count();
        let mut partially_visible = None;
        for n in 0..count {
            let i = if reverse { count - 1 - n } else { n };
            let Some(id) = ctx.child_at(i) else {
                continue;
            };
            let bounds = ctx.bounds(id);
            let child_start = axis.decorated_start(&bounds);
            let child_end = axis.decorated_end(&bounds);
            if child_start >= end || child_end <= start {
                continue;
            }
            if !completely_visible {
                return Some(id);
            }
            if child_start >= start && child_end <= end {
                return Some(id);
            }
            if accept_partially_visible && partially_visible.is_none() {
                partially_visible = Some(id);
            }
        }
        partially_visible
    }

    pub fn find_first_visible_position(&self, ctx: &LayoutContext<'_>) -> Option<usize> {
        self.find_one_visible_child(ctx, false, false, true)
            .and_then(|id| ctx.layout_position(id))
    }

    pub fn find_last_visible_position(&self, ctx: &LayoutContext<'_>) -> Option<usize> {
        self.find_one_visible_child(ctx, true, false, true)
            .and_then(|id| ctx.layout_position(id))
    }

    pub fn find_first_completely_visible_position(&self, ctx: &LayoutContext<'_>) -> Option<usize> {
        self.find_one_visible_child(ctx, false, true, false)
            .and_then(|id| ctx.layout_position(id))
    }

    pub fn find_last_completely_visible_position(&self, ctx: &LayoutContext<'_>) -> Option<usize> {
        self.find_one_visible_child(ctx, true, true, false)
            .and_then(|id| ctx.layout_position(id))
    }

    /// Captures the anchor the next layout should restore; `None` without children.
    pub fn save_state(&self, ctx: &LayoutContext<'_>) -> Option<SavedAnchor> {
        if let Some(saved) = self.pending_saved {
            return Some(saved);
        }
        if ctx.child_count() == 0 {
            return None;
        }
        let mut axis = self.axis;
        axis.set_geometry(ctx.geometry);
        let layout_from_end = self.last_stack_from_end ^ self.should_reverse_layout;
        if layout_from_end {
            let id = self.child_closest_to_end(ctx)?;
            Some(SavedAnchor {
                position: Some(ctx.layout_position(id)?),
                offset: axis.end_after_padding() - axis.decorated_end(&ctx.bounds(id)),
                layout_from_end,
            })
        } else {
            let id = self.child_closest_to_start(ctx)?;
            Some(SavedAnchor {
                position: Some(ctx.layout_position(id)?),
                offset: axis.decorated_start(&ctx.bounds(id)) - axis.start_after_padding(),
                layout_from_end,
            })
        }
    }

    /// Restores an anchor captured by [`Self::save_state`] on the next layout pass.
    pub fn restore_state(&mut self, mut saved: SavedAnchor) {
        if self.pending_scroll_position.is_some() {
            saved.invalidate();
        }
        self.pending_saved = Some(saved);
        self.layout_requested = true;
    }
}
