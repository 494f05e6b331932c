//! Multi-lane layout where every item goes to the lane that is currently shortest.

mod lookup;
mod span;

use alloc::vec;
use alloc::vec::Vec;

pub use lookup::{FullSpanItem, LazySpanLookup};
use span::LineSource;
pub use span::Span;

use crate::error::LayoutError;
use crate::fill::FillEnv;
use crate::{
    AxisHelper, FillState, HolderId, ItemDirection, LayoutContext, LayoutDirection, Orientation,
    PrefetchRegistry, SavedAnchor, ScrollState, StaggeredSavedState, ViewportGeometry,
};

/// Inline gap repairs `repair_gaps` runs before giving up.
const MAX_GAP_REPAIR_PASSES: usize = 8;

/// What the layout does about lanes that end up misaligned near the top of the data.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GapStrategy {
    /// Leave gaps alone.
    None,
    /// Reassign items between lanes once scrolling settles.
    #[default]
    MoveItemsBetweenSpans,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StaggeredOptions {
    pub span_count: usize,
    pub orientation: Orientation,
    pub reverse_layout: bool,
    pub gap_strategy: GapStrategy,
}

impl Default for StaggeredOptions {
    fn default() -> Self {
        Self {
            span_count: 2,
            orientation: Orientation::Vertical,
            reverse_layout: false,
            gap_strategy: GapStrategy::default(),
        }
    }
}

impl StaggeredOptions {
    pub fn new(span_count: usize, orientation: Orientation) -> Self {
        Self {
            span_count,
            orientation,
            ..Self::default()
        }
    }

    pub fn with_reverse_layout(mut self, reverse_layout: bool) -> Self {
        self.reverse_layout = reverse_layout;
        self
    }

    pub fn with_gap_strategy(mut self, gap_strategy: GapStrategy) -> Self {
        self.gap_strategy = gap_strategy;
        self
    }
}

/// Anchor of a staggered pass.
///
/// `offset` is either the anchor coordinate (with `invalidate_offsets`) or a delta applied to
/// every lane's remembered reference line.
#[derive(Clone, Debug, Default)]
struct StaggeredAnchor {
    position: usize,
    offset: Option<i32>,
    layout_from_end: bool,
    invalidate_offsets: bool,
    valid: bool,
    span_reference_lines: Option<Vec<Option<i32>>>,
}

impl StaggeredAnchor {
    fn reset(&mut self) {
        *self = Self::default();
    }

    fn assign_coordinate_from_padding(&mut self, axis: &AxisHelper) {
        self.offset = Some(if self.layout_from_end {
            axis.end_after_padding()
        } else {
            axis.start_after_padding()
        });
    }

    fn assign_coordinate_from_padding_with(&mut self, axis: &AxisHelper, distance: i32) {
        self.offset = Some(if self.layout_from_end {
            axis.end_after_padding() - distance
        } else {
            axis.start_after_padding() + distance
        });
    }
}

enum Update {
    Add,
    Remove,
    Update,
    Move,
}

fn max_end(spans: &mut [Span], src: &LineSource<'_>, default: i32) -> i32 {
    spans
        .iter_mut()
        .map(|s| s.end_line_or(src, default))
        .max()
        .unwrap_or(default)
}

fn min_end(spans: &mut [Span], src: &LineSource<'_>, default: i32) -> i32 {
    spans
        .iter_mut()
        .map(|s| s.end_line_or(src, default))
        .min()
        .unwrap_or(default)
}

fn max_start(spans: &mut [Span], src: &LineSource<'_>, default: i32) -> i32 {
    spans
        .iter_mut()
        .map(|s| s.start_line_or(src, default))
        .max()
        .unwrap_or(default)
}

fn min_start(spans: &mut [Span], src: &LineSource<'_>, default: i32) -> i32 {
    spans
        .iter_mut()
        .map(|s| s.start_line_or(src, default))
        .min()
        .unwrap_or(default)
}

fn new_spans(count: usize) -> Vec<Span> {
    (0..count).map(Span::new).collect()
}

/// Staggered grid: `span_count` lanes filled independently along the main axis.
///
/// Span assignments are remembered in a [`LazySpanLookup`] so that an item keeps its lane
/// while scrolling back and forth. Items flagged [`crate::ItemHolder::full_span`] cross every
/// lane.
#[derive(Clone, Debug)]
pub struct StaggeredLayout {
    options: StaggeredOptions,
    spans: Vec<Span>,
    lookup: LazySpanLookup,
    axis: AxisHelper,
    state: FillState,
    start_line: i32,
    end_line: i32,
    remaining_spans: Vec<bool>,
    size_per_span: i32,
    anchor: StaggeredAnchor,
    pending_scroll_position: Option<usize>,
    pending_scroll_offset: Option<i32>,
    pending_saved: Option<StaggeredSavedState>,
    should_reverse_layout: bool,
    last_layout_from_end: bool,
    last_layout_rtl: bool,
    laid_out_invalid_full_span: bool,
    prefetch_distances: Vec<i32>,
    layout_requested: bool,
}

impl StaggeredLayout {
    pub fn new(options: StaggeredOptions) -> Result<Self, LayoutError> {
        if options.span_count < 1 {
            return Err(LayoutError::InvalidArgument("span count must be at least 1"));
        }
        Ok(Self {
            spans: new_spans(options.span_count),
            lookup: LazySpanLookup::new(),
            axis: AxisHelper::new(options.orientation),
            state: FillState::new(),
            start_line: 0,
            end_line: 0,
            remaining_spans: vec![false; options.span_count],
            size_per_span: 0,
            anchor: StaggeredAnchor::default(),
            pending_scroll_position: None,
            pending_scroll_offset: None,
            pending_saved: None,
            should_reverse_layout: options.reverse_layout,
            last_layout_from_end: false,
            last_layout_rtl: false,
            laid_out_invalid_full_span: false,
            prefetch_distances: Vec::with_capacity(options.span_count),
            layout_requested: false,
            options,
        })
    }

    pub fn options(&self) -> &StaggeredOptions {
        &self.options
    }

    pub fn orientation(&self) -> Orientation {
        self.options.orientation
    }

    pub fn span_count(&self) -> usize {
        self.spans.len()
    }

    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    pub fn span_lookup(&self) -> &LazySpanLookup {
        &self.lookup
    }

    pub fn gap_strategy(&self) -> GapStrategy {
        self.options.gap_strategy
    }

    /// Cross-axis size of one lane as of the last layout pass.
    pub fn size_per_span(&self) -> i32 {
        self.size_per_span
    }

    pub fn supports_predictive_item_animations(&self) -> bool {
        self.pending_saved.is_none()
    }

    /// Returns and clears the "layout needed" flag raised by setters, scroll requests and
    /// gap checks.
    pub fn take_layout_request(&mut self) -> bool {
        core::mem::take(&mut self.layout_requested)
    }

    /// Changes the number of lanes. Every assignment is dropped and the next pass starts
    /// from a fresh anchor.
    pub fn set_span_count(&mut self, span_count: usize) -> Result<(), LayoutError> {
        if span_count < 1 {
            return Err(LayoutError::InvalidArgument("span count must be at least 1"));
        }
        if span_count == self.spans.len() {
            return Ok(());
        }
        rdebug!(from = self.spans.len(), to = span_count, "StaggeredLayout: span count changed");
        self.invalidate_span_assignments();
        self.options.span_count = span_count;
        self.spans = new_spans(span_count);
        self.remaining_spans = vec![false; span_count];
        self.anchor.reset();
        Ok(())
    }

    pub fn set_gap_strategy(&mut self, gap_strategy: GapStrategy) {
        if gap_strategy == self.options.gap_strategy {
            return;
        }
        self.options.gap_strategy = gap_strategy;
        self.layout_requested = true;
    }

    pub fn set_reverse_layout(&mut self, reverse_layout: bool) {
        if let Some(saved) = self.pending_saved.as_mut() {
            saved.reverse_layout = reverse_layout;
        }
        self.options.reverse_layout = reverse_layout;
        self.layout_requested = true;
    }

    pub fn set_orientation(&mut self, orientation: Orientation) {
        if orientation == self.options.orientation {
            return;
        }
        self.options.orientation = orientation;
        self.axis = AxisHelper::new(orientation);
        for span in &mut self.spans {
            span.invalidate_cache();
        }
        self.anchor.reset();
        self.layout_requested = true;
    }

    /// Forgets every lane assignment; the next pass re-derives them.
    pub fn invalidate_span_assignments(&mut self) {
        self.lookup.clear();
        self.layout_requested = true;
    }

    fn env(&mut self, geometry: ViewportGeometry) -> FillEnv {
        self.axis.set_geometry(geometry);
        let env = FillEnv::with_axis(self.axis, self.options.reverse_layout);
        self.should_reverse_layout = env.should_reverse_layout();
        env
    }

    pub fn scroll_to_position(&mut self, position: usize) {
        if let Some(saved) = self.pending_saved.as_mut() {
            if saved.anchor.position != Some(position) {
                saved.invalidate_anchor_position_info();
            }
        }
        self.pending_scroll_position = Some(position);
        self.pending_scroll_offset = None;
        self.layout_requested = true;
    }

    /// Scrolls so that `position` sits `offset` pixels from the start padding edge (end
    /// edge in reverse layouts) on the next pass.
    pub fn scroll_to_position_with_offset(&mut self, position: usize, offset: i32) {
        if let Some(saved) = self.pending_saved.as_mut() {
            saved.invalidate_anchor_position_info();
        }
        self.pending_scroll_position = Some(position);
        self.pending_scroll_offset = Some(offset);
        self.layout_requested = true;
    }

    pub fn on_layout_children(&mut self, ctx: &mut LayoutContext<'_>) {
        self.layout_children(ctx, true);
    }

    pub fn on_layout_completed(&mut self) {
        self.pending_scroll_position = None;
        self.pending_scroll_offset = None;
        self.pending_saved = None;
        self.anchor.reset();
    }

    fn clear_spans(&mut self) {
        for span in &mut self.spans {
            span.clear();
        }
    }

    fn layout_children(&mut self, ctx: &mut LayoutContext<'_>, check_gaps: bool) {
        let item_count = ctx.item_count();
        if (self.pending_saved.is_some() || self.pending_scroll_position.is_some())
            && item_count == 0
        {
            ctx.remove_and_recycle_all_views();
            self.clear_spans();
            self.anchor.reset();
            return;
        }

        let mut env = self.env(ctx.geometry);
        if item_count == 0 || (env.axis.end() <= 0 && !env.axis.is_infinite()) {
            rdebug!(item_count, "StaggeredLayout: nothing to lay out");
            ctx.detach_and_scrap_attached_views();
            self.clear_spans();
            self.anchor.reset();
            return;
        }

        let recalculate = !self.anchor.valid
            || self.pending_scroll_position.is_some()
            || self.pending_saved.is_some();
        if recalculate {
            self.anchor.reset();
            if self.pending_saved.is_some() {
                env = self.apply_pending_saved_state(ctx);
            } else {
                self.anchor.layout_from_end = self.should_reverse_layout;
            }
            self.update_anchor_info_for_layout(ctx, &env);
            self.anchor.valid = true;
        }
        if self.pending_saved.is_none()
            && self.pending_scroll_position.is_none()
            && (self.anchor.layout_from_end != self.last_layout_from_end
                || env.is_rtl() != self.last_layout_rtl)
        {
            self.lookup.clear();
            self.anchor.invalidate_offsets = true;
        }

        let saved_offsets = self
            .pending_saved
            .as_ref()
            .is_some_and(|s| !s.span_offsets.is_empty());
        if !saved_offsets {
            if self.anchor.invalidate_offsets {
                for span in &mut self.spans {
                    span.clear();
                    if self.anchor.offset.is_some() {
                        span.set_line(self.anchor.offset);
                    }
                }
            } else if ctx.child_count() == 0 {
                // Nodes left from an abandoned pass are no longer attached.
                for span in self.spans.iter_mut().filter(|s| !s.is_empty()) {
                    span.clear();
                }
            } else if recalculate || self.anchor.span_reference_lines.is_none() {
                let src = LineSource::new(&*ctx.pool, &env.axis, &self.lookup);
                for span in &mut self.spans {
                    span.cache_reference_line_and_clear(
                        &src,
                        self.should_reverse_layout,
                        self.anchor.offset,
                    );
                }
                self.anchor.span_reference_lines =
                    Some(self.spans.iter().map(Span::cached_line).collect());
            } else if let Some(lines) = self.anchor.span_reference_lines.as_ref() {
                for (span, &line) in self.spans.iter_mut().zip(lines) {
                    span.clear();
                    span.set_line(line);
                }
            }
        }
        rdebug!(
            position = self.anchor.position,
            offset = ?self.anchor.offset,
            from_end = self.anchor.layout_from_end,
            pre_layout = ctx.is_pre_layout(),
            "StaggeredLayout: anchor resolved"
        );

        ctx.detach_and_scrap_attached_views();
        self.state.recycle = false;
        self.state.is_pre_layout = ctx.is_pre_layout();
        self.laid_out_invalid_full_span = false;
        self.size_per_span = env.cross.total_space() / self.spans.len() as i32;
        let anchor_position = self.anchor.position;
        self.update_layout_state(ctx, &env, anchor_position);
        let directions = if self.anchor.layout_from_end {
            [LayoutDirection::Start, LayoutDirection::End]
        } else {
            [LayoutDirection::End, LayoutDirection::Start]
        };
        for (step, direction) in directions.into_iter().enumerate() {
            self.set_layout_direction(&env, direction);
            if step == 1 {
                self.state.current_position =
                    anchor_position as isize + self.state.item_direction.step();
            }
            self.fill(ctx, &env);
        }

        if ctx.child_count() > 0 {
            if self.should_reverse_layout {
                self.fix_end_gap(ctx, &env, true);
                self.fix_start_gap(ctx, &env, false);
            } else {
                self.fix_start_gap(ctx, &env, true);
                self.fix_end_gap(ctx, &env, false);
            }
        }

        let mut has_gaps = false;
        if check_gaps
            && !ctx.is_pre_layout()
            && self.options.gap_strategy != GapStrategy::None
            && ctx.child_count() > 0
            && (self.laid_out_invalid_full_span || self.has_gaps_to_fix(ctx, &env).is_some())
        {
            has_gaps = self.check_for_gaps(ctx, &env);
        }
        if ctx.is_pre_layout() {
            self.anchor.reset();
        }
        self.last_layout_from_end = self.anchor.layout_from_end;
        self.last_layout_rtl = env.is_rtl();
        rdebug!(
            children = ctx.child_count(),
            has_gaps,
            "StaggeredLayout: layout complete"
        );
        if has_gaps {
            self.anchor.reset();
            self.layout_children(ctx, false);
        }
    }

    /// Applies pending saved lanes and direction flags; returns the re-resolved environment.
    fn apply_pending_saved_state(&mut self, ctx: &LayoutContext<'_>) -> FillEnv {
        let Some(mut saved) = self.pending_saved.take() else {
            return self.env(ctx.geometry);
        };
        let mut axis = self.axis;
        axis.set_geometry(ctx.geometry);
        if !saved.span_offsets.is_empty() {
            if saved.span_offsets.len() == self.spans.len() {
                let base = if saved.anchor.layout_from_end {
                    axis.end_after_padding()
                } else {
                    axis.start_after_padding()
                };
                for (span, offset) in self.spans.iter_mut().zip(&saved.span_offsets) {
                    span.clear();
                    span.set_line(offset.map(|o| o + base));
                }
            } else {
                saved.invalidate_span_info();
                saved.anchor.position = saved.visible_anchor_position;
            }
        }
        self.last_layout_rtl = saved.last_layout_rtl;
        self.options.reverse_layout = saved.reverse_layout;
        let env = self.env(ctx.geometry);
        match saved.anchor.position {
            Some(position) => {
                self.pending_scroll_position = Some(position);
                self.anchor.layout_from_end = saved.anchor.layout_from_end;
            }
            None => self.anchor.layout_from_end = self.should_reverse_layout,
        }
        if saved.span_lookup.len() > 1 {
            self.lookup
                .restore(saved.span_lookup.clone(), saved.full_span_items.clone());
        }
        self.pending_saved = Some(saved);
        env
    }

    fn update_anchor_info_for_layout(&mut self, ctx: &LayoutContext<'_>, env: &FillEnv) {
        if self.update_anchor_from_pending_data(ctx, env) {
            return;
        }
        if ctx.child_count() > 0 {
            let item_count = ctx.item_count();
            self.anchor.position = if self.last_layout_from_end {
                last_reference_child_position(ctx, item_count)
            } else {
                first_reference_child_position(ctx, item_count)
            };
            self.anchor.offset = None;
            return;
        }
        self.anchor.assign_coordinate_from_padding(&env.axis);
        self.anchor.position = 0;
    }

    fn update_anchor_from_pending_data(&mut self, ctx: &LayoutContext<'_>, env: &FillEnv) -> bool {
        if ctx.is_pre_layout() {
            return false;
        }
        let Some(position) = self.pending_scroll_position else {
            return false;
        };
        if position >= ctx.item_count() {
            rwarn!(
                position,
                count = ctx.item_count(),
                "StaggeredLayout: scroll target out of range"
            );
            self.pending_scroll_position = None;
            self.pending_scroll_offset = None;
            return false;
        }

        let restores_lanes = self
            .pending_saved
            .as_ref()
            .is_some_and(|s| s.anchor.position.is_some() && !s.span_offsets.is_empty());
        if restores_lanes {
            self.anchor.offset = None;
            self.anchor.position = position;
            return true;
        }

        let axis = &env.axis;
        match ctx.find_view_by_position(position) {
            Some(child) => {
                let bounds = ctx.bounds(child);
                self.anchor.position = if self.should_reverse_layout {
                    last_child_position(ctx)
                } else {
                    first_child_position(ctx)
                };
                if let Some(offset) = self.pending_scroll_offset {
                    self.anchor.offset = Some(if self.anchor.layout_from_end {
                        axis.end_after_padding() - offset - axis.decorated_end(&bounds)
                    } else {
                        axis.start_after_padding() + offset - axis.decorated_start(&bounds)
                    });
                    return true;
                }
                if axis.decorated_measurement(&bounds) > axis.total_space() {
                    self.anchor.offset = Some(if self.anchor.layout_from_end {
                        axis.end_after_padding()
                    } else {
                        axis.start_after_padding()
                    });
                    return true;
                }
                let start_gap = axis.decorated_start(&bounds) - axis.start_after_padding();
                if start_gap < 0 {
                    self.anchor.offset = Some(-start_gap);
                    return true;
                }
                let end_gap = axis.end_after_padding() - axis.decorated_end(&bounds);
                if end_gap < 0 {
                    self.anchor.offset = Some(end_gap);
                    return true;
                }
                self.anchor.offset = None;
            }
            None => {
                self.anchor.position = position;
                match self.pending_scroll_offset {
                    None => {
                        self.anchor.layout_from_end =
                            self.scroll_direction_for_position(ctx, position)
                                == LayoutDirection::End;
                        self.anchor.assign_coordinate_from_padding(axis);
                    }
                    Some(offset) => self.anchor.assign_coordinate_from_padding_with(axis, offset),
                }
                self.anchor.invalidate_offsets = true;
            }
        }
        true
    }

    fn scroll_direction_for_position(
        &self,
        ctx: &LayoutContext<'_>,
        position: usize,
    ) -> LayoutDirection {
        if ctx.child_count() == 0 {
            return if self.should_reverse_layout {
                LayoutDirection::End
            } else {
                LayoutDirection::Start
            };
        }
        if (position < first_child_position(ctx)) != self.should_reverse_layout {
            LayoutDirection::Start
        } else {
            LayoutDirection::End
        }
    }

    /// Resets the fill cursor at `anchor_position` with lines at the padding edges, pushed
    /// out by one screen towards a smooth-scroll target.
    fn update_layout_state(
        &mut self,
        ctx: &LayoutContext<'_>,
        env: &FillEnv,
        anchor_position: usize,
    ) {
        self.state.available = 0;
        self.state.current_position = anchor_position as isize;
        let mut start_extra = 0;
        let mut end_extra = 0;
        if let Some(target) = ctx.pass.target_scroll_position {
            if self.should_reverse_layout == (target < anchor_position) {
                end_extra = env.axis.total_space();
            } else {
                start_extra = env.axis.total_space();
            }
        }
        self.start_line = env.axis.start_after_padding() - start_extra;
        self.end_line = env.axis.end_after_padding() + end_extra;
        self.state.recycle = true;
        self.state.infinite = env.axis.is_infinite();
    }

    fn set_layout_direction(&mut self, env: &FillEnv, direction: LayoutDirection) {
        self.state.layout_direction = direction;
        self.state.item_direction = env.direction.item_direction(direction);
    }

    /// Lays items out until every lane reaches the target line or the data runs out.
    ///
    /// Returns how far the content now reaches past the padding edge in the fill direction,
    /// capped by the available budget.
    fn fill(&mut self, ctx: &mut LayoutContext<'_>, env: &FillEnv) -> i32 {
        let direction = self.state.layout_direction;
        self.remaining_spans.fill(true);
        let target_line = match (self.state.infinite, direction) {
            (true, LayoutDirection::End) => i32::MAX,
            (true, LayoutDirection::Start) => i32::MIN,
            (false, LayoutDirection::End) => self.end_line.saturating_add(self.state.available),
            (false, LayoutDirection::Start) => self.start_line.saturating_sub(self.state.available),
        };
        self.update_all_remaining_spans(ctx, env, target_line);
        let default_line = if self.should_reverse_layout {
            env.axis.end_after_padding()
        } else {
            env.axis.start_after_padding()
        };
        let item_count = ctx.item_count();
        let span_count = self.spans.len();

        let mut added = false;
        while self.state.has_more(item_count)
            && (self.state.infinite || self.remaining_spans.iter().any(|&r| r))
        {
            let Some(node) = self.state.next(ctx) else {
                break;
            };
            let Some(position) = ctx.layout_position(node) else {
                inconsistent!(false, "StaggeredLayout: node without a position");
                ctx.recycle(node);
                break;
            };
            let full_span = ctx.holder(node).is_some_and(|h| h.full_span);
            let assigned = self.lookup.span(position).filter(|&s| s < span_count);
            let span_index = match assigned {
                Some(index) => index,
                None => {
                    let index = if full_span {
                        0
                    } else {
                        self.next_span(ctx, env, direction)
                    };
                    self.lookup.set_span(position, index);
                    index
                }
            };
            let assign = assigned.is_none();
            if let Some(h) = ctx.holder_mut(node) {
                h.span = Some(span_index);
            }
            match direction {
                LayoutDirection::End => ctx.add_view(node, None),
                LayoutDirection::Start => ctx.add_view(node, Some(0)),
            }
            let cross_space = if full_span {
                env.cross.total_space()
            } else {
                self.size_per_span
            };
            let measured = ctx.measure(node, env.child_spec(cross_space));
            let main = env.main_size(measured);

            let (start, end) = {
                let src = LineSource::new(&*ctx.pool, &env.axis, &self.lookup);
                match direction {
                    LayoutDirection::End => {
                        let start = if full_span {
                            max_end(&mut self.spans, &src, default_line)
                        } else {
                            self.spans[span_index].end_line_or(&src, default_line)
                        };
                        (start, start + main)
                    }
                    LayoutDirection::Start => {
                        let end = if full_span {
                            min_start(&mut self.spans, &src, default_line)
                        } else {
                            self.spans[span_index].start_line_or(&src, default_line)
                        };
                        (end - main, end)
                    }
                }
            };
            if assign && full_span {
                self.record_full_span_item(ctx, env, position, direction, start, end);
            }
            if full_span && self.state.item_direction == ItemDirection::Head {
                self.check_full_span_alignment(ctx, env, position, direction, assign);
            }

            let cross = env.cross_size(measured);
            let (cross_start, cross_end) =
                if env.orientation() == Orientation::Vertical && env.is_rtl() {
                    let end = if full_span {
                        env.cross.end_after_padding()
                    } else {
                        env.cross.end_after_padding()
                            - (span_count - 1 - span_index) as i32 * self.size_per_span
                    };
                    (end - cross, end)
                } else {
                    let start = if full_span {
                        env.cross.start_after_padding()
                    } else {
                        span_index as i32 * self.size_per_span + env.cross.start_after_padding()
                    };
                    (start, start + cross)
                };
            ctx.set_bounds(node, env.axis.place(start, end, cross_start, cross_end));

            self.attach_to_spans(ctx, env, node, span_index, full_span, direction);
            if full_span {
                self.update_all_remaining_spans(ctx, env, target_line);
            } else {
                self.update_remaining_spans(ctx, env, span_index, target_line);
            }
            self.recycle(ctx, env);
            added = true;
        }
        if !added {
            self.recycle(ctx, env);
        }

        let src = LineSource::new(&*ctx.pool, &env.axis, &self.lookup);
        let diff = match direction {
            LayoutDirection::Start => {
                let start = env.axis.start_after_padding();
                start - min_start(&mut self.spans, &src, start)
            }
            LayoutDirection::End => {
                let end = env.axis.end_after_padding();
                max_end(&mut self.spans, &src, end) - end
            }
        };
        rtrace!(
            direction = direction.sign(),
            cursor = self.state.current_position,
            reach = diff,
            "StaggeredLayout::fill"
        );
        if diff > 0 {
            diff.min(self.state.available)
        } else {
            0
        }
    }

    /// Lane with the least extent towards `direction`; ties go to the preferred end.
    fn next_span(
        &mut self,
        ctx: &LayoutContext<'_>,
        env: &FillEnv,
        direction: LayoutDirection,
    ) -> usize {
        let count = self.spans.len();
        let prefer_last = env.direction.prefer_last_span(direction);
        let src = LineSource::new(&*ctx.pool, &env.axis, &self.lookup);
        let order = (0..count).map(|i| if prefer_last { count - 1 - i } else { i });
        let mut best = None;
        match direction {
            LayoutDirection::End => {
                let default = env.axis.start_after_padding();
                for i in order {
                    let line = self.spans[i].end_line_or(&src, default);
                    if best.is_none_or(|(_, min)| line < min) {
                        best = Some((i, line));
                    }
                }
            }
            LayoutDirection::Start => {
                let default = env.axis.end_after_padding();
                for i in order {
                    let line = self.spans[i].start_line_or(&src, default);
                    if best.is_none_or(|(_, max)| line > max) {
                        best = Some((i, line));
                    }
                }
            }
        }
        best.map_or(0, |(i, _)| i)
    }

    fn record_full_span_item(
        &mut self,
        ctx: &LayoutContext<'_>,
        env: &FillEnv,
        position: usize,
        direction: LayoutDirection,
        start: i32,
        end: i32,
    ) {
        let src = LineSource::new(&*ctx.pool, &env.axis, &self.lookup);
        let (gap_dir, gap_per_span) = match direction {
            LayoutDirection::End => (
                LayoutDirection::Start,
                self.spans
                    .iter_mut()
                    .map(|s| start - s.end_line_or(&src, start))
                    .collect(),
            ),
            LayoutDirection::Start => (
                LayoutDirection::End,
                self.spans
                    .iter_mut()
                    .map(|s| s.start_line_or(&src, end) - end)
                    .collect(),
            ),
        };
        self.lookup.add_full_span_item(FullSpanItem {
            position,
            gap_dir: Some(gap_dir),
            gap_per_span,
            has_unwanted_gap_after: false,
        });
    }

    /// A full-span item laid out against the data direction leaves a gap behind it when the
    /// lanes it lands on are not aligned.
    fn check_full_span_alignment(
        &mut self,
        ctx: &LayoutContext<'_>,
        env: &FillEnv,
        position: usize,
        direction: LayoutDirection,
        newly_assigned: bool,
    ) {
        if newly_assigned {
            self.laid_out_invalid_full_span = true;
            return;
        }
        let aligned = {
            let src = LineSource::new(&*ctx.pool, &env.axis, &self.lookup);
            let mut lines = self.spans.iter_mut().map(|s| match direction {
                LayoutDirection::End => s.end_line(&src),
                LayoutDirection::Start => s.start_line(&src),
            });
            let first = lines.next().flatten();
            lines.all(|line| line == first)
        };
        if !aligned {
            if let Some(item) = self.lookup.full_span_item_mut(position) {
                item.has_unwanted_gap_after = true;
            }
            self.laid_out_invalid_full_span = true;
        }
    }

    fn attach_to_spans(
        &mut self,
        ctx: &mut LayoutContext<'_>,
        env: &FillEnv,
        node: HolderId,
        span_index: usize,
        full_span: bool,
        direction: LayoutDirection,
    ) {
        {
            let src = LineSource::new(&*ctx.pool, &env.axis, &self.lookup);
            let lanes: &mut [Span] = if full_span {
                &mut self.spans
            } else {
                &mut self.spans[span_index..=span_index]
            };
            // Full-span nodes end up owned by lane 0.
            for span in lanes.iter_mut().rev() {
                match direction {
                    LayoutDirection::End => span.append(node, &src),
                    LayoutDirection::Start => span.prepend(node, &src),
                }
            }
        }
        if let Some(h) = ctx.holder_mut(node) {
            h.span = Some(if full_span { 0 } else { span_index });
        }
    }

    fn update_all_remaining_spans(
        &mut self,
        ctx: &LayoutContext<'_>,
        env: &FillEnv,
        target_line: i32,
    ) {
        for i in 0..self.spans.len() {
            if !self.spans[i].is_empty() {
                self.update_remaining_spans(ctx, env, i, target_line);
            }
        }
    }

    fn update_remaining_spans(
        &mut self,
        ctx: &LayoutContext<'_>,
        env: &FillEnv,
        index: usize,
        target_line: i32,
    ) {
        let src = LineSource::new(&*ctx.pool, &env.axis, &self.lookup);
        let span = &mut self.spans[index];
        let deleted = span.deleted_size();
        let done = match self.state.layout_direction {
            LayoutDirection::Start => span
                .start_line(&src)
                .is_some_and(|line| line + deleted <= target_line),
            LayoutDirection::End => span
                .end_line(&src)
                .is_some_and(|line| line - deleted >= target_line),
        };
        if done {
            self.remaining_spans[index] = false;
        }
    }

    fn recycle(&mut self, ctx: &mut LayoutContext<'_>, env: &FillEnv) {
        if !self.state.recycle || self.state.infinite {
            return;
        }
        let direction = self.state.layout_direction;
        if self.state.available == 0 {
            match direction {
                LayoutDirection::Start => self.recycle_from_end(ctx, env, self.end_line),
                LayoutDirection::End => self.recycle_from_start(ctx, env, self.start_line),
            }
            return;
        }
        let line = {
            let src = LineSource::new(&*ctx.pool, &env.axis, &self.lookup);
            match direction {
                LayoutDirection::Start => {
                    let scrolled =
                        self.start_line - max_start(&mut self.spans, &src, self.start_line);
                    if scrolled < 0 {
                        self.end_line
                    } else {
                        self.end_line - scrolled.min(self.state.available)
                    }
                }
                LayoutDirection::End => {
                    let scrolled = min_end(&mut self.spans, &src, self.end_line) - self.end_line;
                    if scrolled < 0 {
                        self.start_line
                    } else {
                        self.start_line + scrolled.min(self.state.available)
                    }
                }
            }
        };
        match direction {
            LayoutDirection::Start => self.recycle_from_end(ctx, env, line),
            LayoutDirection::End => self.recycle_from_start(ctx, env, line),
        }
    }

    /// Recycles leading children that end at or before `line`, keeping one node per lane.
    fn recycle_from_start(&mut self, ctx: &mut LayoutContext<'_>, env: &FillEnv, line: i32) {
        while let Some(child) = ctx.child_at(0) {
            if env.axis.decorated_end(&ctx.bounds(child)) > line {
                return;
            }
            if !self.pop_from_spans(ctx, env, child, LayoutDirection::Start) {
                return;
            }
            ctx.remove_and_recycle_child_at(0);
        }
    }

    /// Recycles trailing children that start at or after `line`, keeping one node per lane.
    fn recycle_from_end(&mut self, ctx: &mut LayoutContext<'_>, env: &FillEnv, line: i32) {
        while let Some(index) = ctx.child_count().checked_sub(1) {
            let Some(child) = ctx.child_at(index) else {
                return;
            };
            if env.axis.decorated_start(&ctx.bounds(child)) < line {
                return;
            }
            if !self.pop_from_spans(ctx, env, child, LayoutDirection::End) {
                return;
            }
            ctx.remove_and_recycle_child_at(index);
        }
    }

    /// Takes `child` off the `side` edge of its lanes; refuses when that would empty a lane.
    fn pop_from_spans(
        &mut self,
        ctx: &LayoutContext<'_>,
        env: &FillEnv,
        child: HolderId,
        side: LayoutDirection,
    ) -> bool {
        let Some(h) = ctx.holder(child) else {
            return false;
        };
        let src = LineSource::new(&*ctx.pool, &env.axis, &self.lookup);
        let lanes: &mut [Span] = if h.full_span {
            &mut self.spans
        } else {
            match h.span.filter(|&s| s < self.spans.len()) {
                Some(index) => &mut self.spans[index..=index],
                None => return false,
            }
        };
        if lanes.iter().any(|s| s.len() == 1) {
            return false;
        }
        for span in lanes.iter_mut() {
            let popped = match side {
                LayoutDirection::Start => span.pop_start(&src),
                LayoutDirection::End => span.pop_end(&src),
            };
            inconsistent!(
                popped == Some(child),
                "StaggeredLayout: lane edge does not match the recycled child"
            );
        }
        true
    }

    fn offset_children(&mut self, ctx: &mut LayoutContext<'_>, env: &FillEnv, delta: i32) {
        ctx.offset_children(&env.axis, delta);
        for span in &mut self.spans {
            span.on_offset(delta);
        }
    }

    fn fix_end_gap(
        &mut self,
        ctx: &mut LayoutContext<'_>,
        env: &FillEnv,
        can_offset_children: bool,
    ) {
        let max_end_line = {
            let src = LineSource::new(&*ctx.pool, &env.axis, &self.lookup);
            max_end(&mut self.spans, &src, i32::MIN)
        };
        if max_end_line == i32::MIN {
            return;
        }
        let mut gap = env.axis.end_after_padding() - max_end_line;
        if gap <= 0 {
            return;
        }
        gap += self.scroll_by_internal(ctx, env, -gap);
        if can_offset_children && gap > 0 {
            self.offset_children(ctx, env, gap);
        }
    }

    fn fix_start_gap(
        &mut self,
        ctx: &mut LayoutContext<'_>,
        env: &FillEnv,
        can_offset_children: bool,
    ) {
        let min_start_line = {
            let src = LineSource::new(&*ctx.pool, &env.axis, &self.lookup);
            min_start(&mut self.spans, &src, i32::MAX)
        };
        if min_start_line == i32::MAX {
            return;
        }
        let mut gap = min_start_line - env.axis.start_after_padding();
        if gap <= 0 {
            return;
        }
        gap -= self.scroll_by_internal(ctx, env, gap);
        if can_offset_children && gap > 0 {
            self.offset_children(ctx, env, -gap);
        }
    }

    /// Scrolls the content by `delta` pixels and returns the distance actually scrolled.
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
        self.prepare_layout_state_for_delta(ctx, env, delta);
        let consumed = self.fill(ctx, env);
        let scrolled = if self.state.available < consumed {
            delta
        } else if delta < 0 {
            -consumed
        } else {
            consumed
        };
        self.offset_children(ctx, env, -scrolled);
        self.last_layout_from_end = self.should_reverse_layout;
        self.state.available = 0;
        self.recycle(ctx, env);
        rtrace!(delta, scrolled, "StaggeredLayout::scroll_by");
        scrolled
    }

    fn prepare_layout_state_for_delta(
        &mut self,
        ctx: &LayoutContext<'_>,
        env: &FillEnv,
        delta: i32,
    ) {
        let (direction, reference) = if delta > 0 {
            (LayoutDirection::End, last_child_position(ctx))
        } else {
            (LayoutDirection::Start, first_child_position(ctx))
        };
        self.update_layout_state(ctx, env, reference);
        self.set_layout_direction(env, direction);
        self.state.current_position = reference as isize + self.state.item_direction.step();
        self.state.available = delta.saturating_abs();
    }

    /// First attached node whose placement contradicts data order, or whose lane leaves an
    /// empty gap at the leading edge.
    fn has_gaps_to_fix(&mut self, ctx: &LayoutContext<'_>, env: &FillEnv) -> Option<HolderId> {
        let count = ctx.child_count();
        if count == 0 {
            return None;
        }
        let mut spans_to_check = vec![true; self.spans.len()];
        let vertical_rtl = env.orientation() == Orientation::Vertical && env.is_rtl();
        let preferred_span_dir: isize = if vertical_rtl { 1 } else { -1 };
        let order: Vec<usize> = if self.should_reverse_layout {
            (0..count).rev().collect()
        } else {
            (0..count).collect()
        };
        for (n, &i) in order.iter().enumerate() {
            let child = ctx.child_at(i)?;
            let Some(h) = ctx.holder(child) else {
                continue;
            };
            let Some(span) = h.span.filter(|&s| s < self.spans.len()) else {
                continue;
            };
            if spans_to_check[span] {
                if self.check_span_for_gap(ctx, env, span) {
                    return Some(child);
                }
                spans_to_check[span] = false;
            }
            if h.full_span {
                continue;
            }
            let Some(next) = order.get(n + 1).and_then(|&j| ctx.child_at(j)) else {
                continue;
            };
            let next_bounds = ctx.bounds(next);
            let compare_spans = if self.should_reverse_layout {
                let mine = env.axis.decorated_end(&h.bounds);
                let theirs = env.axis.decorated_end(&next_bounds);
                if mine < theirs {
                    return Some(child);
                }
                mine == theirs
            } else {
                let (mine, theirs) =
                    (env.axis.decorated_start(&h.bounds), env.axis.decorated_start(&next_bounds));
                if mine > theirs {
                    return Some(child);
                }
                mine == theirs
            };
            if compare_spans {
                let next_span = ctx.holder(next).and_then(|n| n.span).unwrap_or(0);
                if ((span as isize - next_span as isize) < 0) != (preferred_span_dir < 0) {
                    return Some(child);
                }
            }
        }
        None
    }

    fn check_span_for_gap(&mut self, ctx: &LayoutContext<'_>, env: &FillEnv, index: usize) -> bool {
        let src = LineSource::new(&*ctx.pool, &env.axis, &self.lookup);
        let span = &mut self.spans[index];
        let edge = if self.should_reverse_layout {
            if !span
                .end_line(&src)
                .is_some_and(|line| line < env.axis.end_after_padding())
            {
                return false;
            }
            span.nodes().back()
        } else {
            if !span
                .start_line(&src)
                .is_some_and(|line| line > env.axis.start_after_padding())
            {
                return false;
            }
            span.nodes().front()
        };
        edge.and_then(|&id| ctx.holder(id))
            .is_some_and(|h| !h.full_span)
    }

    /// Invalidates lane assignments that produced a gap. Returns whether a new layout pass
    /// is needed.
    fn check_for_gaps(&mut self, ctx: &LayoutContext<'_>, env: &FillEnv) -> bool {
        let count = ctx.child_count();
        if count == 0 || self.options.gap_strategy == GapStrategy::None {
            return false;
        }
        let (min_pos, max_pos) = if self.should_reverse_layout {
            (last_child_position(ctx), first_child_position(ctx))
        } else {
            (first_child_position(ctx), last_child_position(ctx))
        };
        if min_pos == 0 {
            if let Some(gap) = self.has_gaps_to_fix(ctx, env) {
                let position = ctx.layout_position(gap).unwrap_or(0);
                rdebug!(position, "StaggeredLayout: gap found, reassigning lanes");
                self.lookup.force_invalidate_after(position);
                return true;
            }
        }
        if !self.laid_out_invalid_full_span {
            return false;
        }
        let invalid_gap_dir = if self.should_reverse_layout {
            LayoutDirection::Start
        } else {
            LayoutDirection::End
        };
        let Some(invalid) = self
            .lookup
            .first_full_span_item_in_range(min_pos, max_pos + 1, Some(invalid_gap_dir), true)
            .map(|f| f.position)
        else {
            self.laid_out_invalid_full_span = false;
            self.lookup.force_invalidate_after(max_pos + 1);
            return false;
        };
        let valid = self
            .lookup
            .first_full_span_item_in_range(min_pos, invalid, Some(invalid_gap_dir.flip()), true)
            .map(|f| f.position);
        let from = valid.map_or(invalid, |v| v + 1);
        rdebug!(invalid, from, "StaggeredLayout: misaligned full-span item");
        self.lookup.force_invalidate_after(from);
        true
    }

    /// Repairs gaps now, re-laying out until none are left.
    ///
    /// Returns the number of extra passes, `0` when the layout was already gap free.
    pub fn repair_gaps(&mut self, ctx: &mut LayoutContext<'_>) -> Result<usize, LayoutError> {
        let mut passes = 0;
        loop {
            let env = self.env(ctx.geometry);
            if !self.check_for_gaps(ctx, &env) {
                return Ok(passes);
            }
            if passes == MAX_GAP_REPAIR_PASSES {
                rwarn!(passes, "StaggeredLayout: gap repair did not converge");
                return Err(LayoutError::LayoutNonConvergence { passes });
            }
            passes += 1;
            self.anchor.reset();
            self.layout_children(ctx, false);
        }
    }

    /// Runs the gap check once scrolling settles.
    pub fn on_scroll_state_changed(&mut self, ctx: &LayoutContext<'_>, state: ScrollState) {
        if state != ScrollState::Idle {
            return;
        }
        let env = self.env(ctx.geometry);
        if self.check_for_gaps(ctx, &env) {
            self.layout_requested = true;
        }
    }

    pub fn on_items_added(&mut self, ctx: &LayoutContext<'_>, start: usize, count: usize) {
        self.handle_update(ctx, start, count, Update::Add);
    }

    pub fn on_items_removed(&mut self, ctx: &LayoutContext<'_>, start: usize, count: usize) {
        self.handle_update(ctx, start, count, Update::Remove);
    }

    pub fn on_items_updated(&mut self, ctx: &LayoutContext<'_>, start: usize, count: usize) {
        self.handle_update(ctx, start, count, Update::Update);
    }

    pub fn on_items_moved(&mut self, ctx: &LayoutContext<'_>, from: usize, to: usize) {
        self.handle_update(ctx, from, to, Update::Move);
    }

    /// The whole data set changed; nothing about the old lanes can be trusted.
    pub fn on_items_changed(&mut self) {
        self.lookup.clear();
        self.layout_requested = true;
    }

    fn handle_update(
        &mut self,
        ctx: &LayoutContext<'_>,
        start: usize,
        count_or_to: usize,
        update: Update,
    ) {
        let (affected_start, affected_end) = match update {
            Update::Move if start < count_or_to => (start, count_or_to + 1),
            Update::Move => (count_or_to, start + 1),
            _ => (start, start + count_or_to),
        };
        self.lookup.invalidate_after(affected_start);
        match update {
            Update::Add => self.lookup.offset_for_addition(start, count_or_to),
            Update::Remove => self.lookup.offset_for_removal(start, count_or_to),
            Update::Move => {
                self.lookup.offset_for_removal(start, 1);
                self.lookup.offset_for_addition(count_or_to, 1);
            }
            Update::Update => {}
        }
        if ctx.child_count() == 0 {
            return;
        }
        let (min_position, max_position) = if self.should_reverse_layout {
            (last_child_position(ctx), first_child_position(ctx))
        } else {
            (first_child_position(ctx), last_child_position(ctx))
        };
        if affected_end <= min_position {
            return;
        }
        if affected_start <= max_position {
            self.layout_requested = true;
        }
    }

    /// Reports one position per lane a scroll of `(dx, dy)` would need, nearest first.
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
        self.prepare_layout_state_for_delta(ctx, &env, delta);
        self.prefetch_distances.clear();
        {
            let src = LineSource::new(&*ctx.pool, &env.axis, &self.lookup);
            for span in &mut self.spans {
                let distance = match self.state.layout_direction {
                    LayoutDirection::Start => {
                        self.start_line - span.start_line_or(&src, self.start_line)
                    }
                    LayoutDirection::End => span.end_line_or(&src, self.end_line) - self.end_line,
                };
                if distance >= 0 {
                    self.prefetch_distances.push(distance);
                }
            }
        }
        self.prefetch_distances.sort_unstable();
        let item_count = ctx.item_count();
        for &distance in &self.prefetch_distances {
            let Some(position) = self.state.position().filter(|&p| p < item_count) else {
                break;
            };
            registry.add_position(position, distance);
            self.state.advance();
        }
    }

    /// Reports one row of items a not-yet-laid-out viewport will show first.
    pub fn collect_initial_prefetch_positions(
        &self,
        item_count: usize,
        registry: &mut PrefetchRegistry,
    ) {
        let anchor = self
            .pending_saved
            .as_ref()
            .and_then(|s| s.anchor.position)
            .or(self.pending_scroll_position)
            .unwrap_or(0);
        for position in (anchor..item_count).take(self.spans.len()) {
            registry.add_position(position, 0);
        }
    }

    fn find_one_visible_child(
        &self,
        ctx: &LayoutContext<'_>,
        closest_to_end: bool,
        fully_visible: bool,
    ) -> Option<HolderId> {
        let mut axis = self.axis;
        axis.set_geometry(ctx.geometry);
        let bounds_start = axis.start_after_padding();
        let bounds_end = axis.end_after_padding();
        let count = ctx.child_count();
        let mut partially_visible = None;
        for n in 0..count {
            let i = if closest_to_end { count - 1 - n } else { n };
            let Some(child) = ctx.child_at(i) else {
                continue;
            };
            let b = ctx.bounds(child);
            let (start, end) = (axis.decorated_start(&b), axis.decorated_end(&b));
            if end <= bounds_start || start >= bounds_end {
                continue;
            }
            let edge_inside = if closest_to_end {
                end <= bounds_end
            } else {
                start >= bounds_start
            };
            if edge_inside || !fully_visible {
                return Some(child);
            }
            partially_visible.get_or_insert(child);
        }
        partially_visible
    }

    pub fn find_first_visible_position(&self, ctx: &LayoutContext<'_>) -> Option<usize> {
        self.find_one_visible_child(ctx, self.should_reverse_layout, false)
            .and_then(|id| ctx.layout_position(id))
    }

    pub fn find_last_visible_position(&self, ctx: &LayoutContext<'_>) -> Option<usize> {
        self.find_one_visible_child(ctx, !self.should_reverse_layout, false)
            .and_then(|id| ctx.layout_position(id))
    }

    /// First child that is fully visible, else the first partially visible one.
    fn first_mostly_visible_position(&self, ctx: &LayoutContext<'_>) -> Option<usize> {
        self.find_one_visible_child(ctx, self.should_reverse_layout, true)
            .and_then(|id| ctx.layout_position(id))
    }

    fn visible_item_positions(
        &self,
        ctx: &LayoutContext<'_>,
        from_end: bool,
        completely_visible: bool,
    ) -> Vec<Option<usize>> {
        let mut axis = self.axis;
        axis.set_geometry(ctx.geometry);
        let src = LineSource::new(&*ctx.pool, &axis, &self.lookup);
        self.spans
            .iter()
            .map(|span| span.find_one_visible_position(&src, from_end, completely_visible))
            .collect()
    }

    /// First visible position of every lane, `None` for lanes with nothing on screen.
    pub fn find_first_visible_item_positions(&self, ctx: &LayoutContext<'_>) -> Vec<Option<usize>> {
        self.visible_item_positions(ctx, self.options.reverse_layout, false)
    }

    pub fn find_last_visible_item_positions(&self, ctx: &LayoutContext<'_>) -> Vec<Option<usize>> {
        self.visible_item_positions(ctx, !self.options.reverse_layout, false)
    }

    pub fn find_first_completely_visible_item_positions(
        &self,
        ctx: &LayoutContext<'_>,
    ) -> Vec<Option<usize>> {
        self.visible_item_positions(ctx, self.options.reverse_layout, true)
    }

    pub fn find_last_completely_visible_item_positions(
        &self,
        ctx: &LayoutContext<'_>,
    ) -> Vec<Option<usize>> {
        self.visible_item_positions(ctx, !self.options.reverse_layout, true)
    }

    /// Captures the anchor, every lane's reference line and the lane assignments.
    pub fn save_state(&mut self, ctx: &LayoutContext<'_>) -> StaggeredSavedState {
        if let Some(saved) = self.pending_saved.as_ref() {
            return saved.clone();
        }
        let mut state = StaggeredSavedState {
            reverse_layout: self.options.reverse_layout,
            last_layout_rtl: self.last_layout_rtl,
            span_lookup: self.lookup.data().to_vec(),
            full_span_items: self.lookup.full_span_items().to_vec(),
            ..StaggeredSavedState::default()
        };
        state.anchor.layout_from_end = self.last_layout_from_end;
        if ctx.child_count() == 0 {
            return state;
        }
        state.anchor.position = Some(if self.last_layout_from_end {
            last_child_position(ctx)
        } else {
            first_child_position(ctx)
        });
        state.visible_anchor_position = self.first_mostly_visible_position(ctx);
        let mut axis = self.axis;
        axis.set_geometry(ctx.geometry);
        let src = LineSource::new(&*ctx.pool, &axis, &self.lookup);
        let from_end = self.last_layout_from_end;
        state.span_offsets = self
            .spans
            .iter_mut()
            .map(|span| {
                if from_end {
                    span.end_line(&src).map(|l| l - axis.end_after_padding())
                } else {
                    span.start_line(&src).map(|l| l - axis.start_after_padding())
                }
            })
            .collect();
        state
    }

    /// Restores lanes and anchor captured by [`Self::save_state`] on the next pass.
    pub fn restore_state(&mut self, mut saved: StaggeredSavedState) {
        if self.pending_scroll_position.is_some() {
            saved.invalidate_anchor_position_info();
            saved.invalidate_span_info();
        }
        self.pending_saved = Some(saved);
        self.layout_requested = true;
    }

    /// Anchor-only snapshot for hosts that persist a single [`SavedAnchor`].
    pub fn save_anchor(&mut self, ctx: &LayoutContext<'_>) -> Option<SavedAnchor> {
        let state = self.save_state(ctx);
        state.anchor.position.map(|_| state.anchor)
    }

    pub fn restore_anchor(&mut self, anchor: SavedAnchor) {
        self.restore_state(StaggeredSavedState {
            anchor,
            reverse_layout: self.options.reverse_layout,
            last_layout_rtl: self.last_layout_rtl,
            ..StaggeredSavedState::default()
        });
    }
}

fn first_child_position(ctx: &LayoutContext<'_>) -> usize {
    ctx.child_position(0).unwrap_or(0)
}

fn last_child_position(ctx: &LayoutContext<'_>) -> usize {
    ctx.child_count()
        .checked_sub(1)
        .and_then(|i| ctx.child_position(i))
        .unwrap_or(0)
}

fn first_reference_child_position(ctx: &LayoutContext<'_>, item_count: usize) -> usize {
    (0..ctx.child_count())
        .filter_map(|i| ctx.child_position(i))
        .find(|&p| p < item_count)
        .unwrap_or(0)
}

fn last_reference_child_position(ctx: &LayoutContext<'_>, item_count: usize) -> usize {
    (0..ctx.child_count())
        .rev()
        .filter_map(|i| ctx.child_position(i))
        .find(|&p| p < item_count)
        .unwrap_or(0)
}
