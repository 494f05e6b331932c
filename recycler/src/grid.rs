use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::vec;
use alloc::vec::Vec;

use crate::error::LayoutError;
use crate::fill::{
    ChunkLayout, ChunkResult, FillEnv, FillState, attach_in_layout_order, chunk_main_interval,
};
use crate::linear::{AnchorInfo, LinearLayout, LinearOptions};
use crate::{HolderId, ItemDirection, LayoutContext, Orientation, PrefetchRegistry};

/// Number of spans each position occupies in a grid row.
pub trait SpanSizeLookup {
    fn span_size(&self, position: usize) -> usize;
}

/// Every item takes one span.
#[derive(Clone, Copy, Debug, Default)]
pub struct UniformSpanSize;

impl SpanSizeLookup for UniformSpanSize {
    fn span_size(&self, _position: usize) -> usize {
        1
    }
}

impl<F: Fn(usize) -> usize> SpanSizeLookup for F {
    fn span_size(&self, position: usize) -> usize {
        self(position)
    }
}

/// Grid row chunk: fills one row of `span_count` cells per fill step.
pub struct GridRows {
    span_count: usize,
    lookup: Box<dyn SpanSizeLookup>,
    cache_span_indices: bool,
    span_index_cache: BTreeMap<usize, usize>,
    /// Cell assignments of children attached before a pre-layout pass, by layout position.
    pre_layout_spans: BTreeMap<usize, (usize, usize)>,
    pre_layout: bool,
    borders: Vec<i32>,
    row: Vec<HolderId>,
}

impl core::fmt::Debug for GridRows {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("GridRows")
            .field("span_count", &self.span_count)
            .field("cache_span_indices", &self.cache_span_indices)
            .field("borders", &self.borders)
            .finish_non_exhaustive()
    }
}

impl GridRows {
    pub fn new(span_count: usize) -> Result<Self, LayoutError> {
        if span_count < 1 {
            return Err(LayoutError::InvalidArgument("span count must be at least 1"));
        }
        Ok(Self {
            span_count,
            lookup: Box::new(UniformSpanSize),
            cache_span_indices: false,
            span_index_cache: BTreeMap::new(),
            pre_layout_spans: BTreeMap::new(),
            pre_layout: false,
            borders: vec![0; span_count + 1],
            row: Vec::with_capacity(span_count),
        })
    }

    pub fn span_count(&self) -> usize {
        self.span_count
    }

    pub fn set_span_size_lookup(&mut self, lookup: impl SpanSizeLookup + 'static) {
        self.lookup = Box::new(lookup);
        self.span_index_cache.clear();
    }

    /// Remembers computed span indices; only valid while span sizes never change.
    pub fn set_cache_span_indices(&mut self, cache: bool) {
        self.cache_span_indices = cache;
        self.span_index_cache.clear();
    }

    pub fn invalidate_span_indices(&mut self) {
        self.span_index_cache.clear();
    }

    fn span_size(&self, position: usize) -> usize {
        if self.pre_layout {
            if let Some(&(_, size)) = self.pre_layout_spans.get(&position) {
                return size;
            }
        }
        self.lookup.span_size(position).clamp(1, self.span_count)
    }

    /// Span index of `position`, derived by packing every earlier position row by row.
    fn span_index(&mut self, position: usize) -> usize {
        if self.pre_layout {
            if let Some(&(index, _)) = self.pre_layout_spans.get(&position) {
                return index;
            }
        }
        if self.cache_span_indices {
            if let Some(&index) = self.span_index_cache.get(&position) {
                return index;
            }
        }
        let index = self.compute_span_index(position);
        if self.cache_span_indices {
            self.span_index_cache.insert(position, index);
        }
        index
    }

    fn compute_span_index(&self, position: usize) -> usize {
        let size = self.span_size(position);
        if size == self.span_count {
            return 0;
        }
        let mut span = 0;
        let mut start = 0;
        if self.cache_span_indices {
            if let Some((&prev, &prev_index)) =
                self.span_index_cache.range(..position).next_back()
            {
                span = prev_index + self.span_size(prev);
                start = prev + 1;
            }
        }
        for i in start..position {
            let s = self.span_size(i);
            span += s;
            if span == self.span_count {
                span = 0;
            } else if span > self.span_count {
                span = s;
            }
        }
        if span + size <= self.span_count { span } else { 0 }
    }

    fn calculate_borders(&mut self, total_space: i32) {
        let count = self.span_count as i32;
        self.borders.clear();
        self.borders.push(0);
        let per_span = total_space / count;
        let remainder = total_space % count;
        let mut consumed = 0;
        let mut additional = 0;
        for _ in 1..=count {
            let mut size = per_span;
            additional += remainder;
            if additional > 0 && count - additional < remainder {
                size += 1;
                additional -= count;
            }
            consumed += size;
            self.borders.push(consumed);
        }
    }

    fn cell_space(&self, span_index: usize, span_size: usize) -> i32 {
        let end = (span_index + span_size).min(self.span_count);
        self.borders[end] - self.borders[span_index.min(self.span_count)]
    }
}

impl ChunkLayout for GridRows {
    fn prepare(&mut self, ctx: &LayoutContext<'_>, env: &FillEnv) {
        self.pre_layout = ctx.is_pre_layout();
        self.pre_layout_spans.clear();
        if self.pre_layout {
            for i in 0..ctx.child_count() {
                let Some(h) = ctx.child_at(i).and_then(|id| ctx.holder(id)) else {
                    continue;
                };
                if let Some(position) = h.layout_position() {
                    self.pre_layout_spans
                        .insert(position, (h.grid_span_index, h.grid_span_size));
                }
            }
        }
        self.calculate_borders(env.cross.total_space());
    }

    fn layout_chunk(
        &mut self,
        ctx: &mut LayoutContext<'_>,
        env: &FillEnv,
        state: &mut FillState,
        result: &mut ChunkResult,
    ) {
        let primary = state.item_direction == ItemDirection::Tail;
        let mut remaining = self.span_count;
        if !primary {
            if let Some(position) = state.position() {
                remaining = self.span_index(position) + self.span_size(position);
            }
        }

        self.row.clear();
        while self.row.len() < self.span_count
            && state.has_more(ctx.item_count())
            && remaining > 0
        {
            let Some(position) = state.position() else {
                break;
            };
            let size = self.span_size(position);
            if size > remaining {
                break;
            }
            remaining -= size;
            let Some(node) = state.next(ctx) else {
                break;
            };
            self.row.push(node);
        }
        if self.row.is_empty() {
            result.finished = true;
            return;
        }

        // Cells are numbered in data order regardless of the fill direction.
        let mut span = 0;
        let order: Vec<usize> = if primary {
            (0..self.row.len()).collect()
        } else {
            (0..self.row.len()).rev().collect()
        };
        for i in order {
            let node = self.row[i];
            let size = ctx
                .layout_position(node)
                .map_or(1, |position| self.span_size(position));
            if let Some(h) = ctx.holder_mut(node) {
                h.grid_span_index = span;
                h.grid_span_size = size;
            }
            span += size;
        }

        let mut max_size = 0;
        let mut cross_sizes = Vec::with_capacity(self.row.len());
        for i in 0..self.row.len() {
            let node = self.row[i];
            attach_in_layout_order(ctx, env, state, node);
            let (index, size) = ctx
                .holder(node)
                .map_or((0, 1), |h| (h.grid_span_index, h.grid_span_size));
            let measured = ctx.measure(node, env.child_spec(self.cell_space(index, size)));
            max_size = max_size.max(env.main_size(measured));
            cross_sizes.push(env.cross_size(measured));
        }
        result.consumed = max_size;

        let (main_start, main_end) = chunk_main_interval(state, max_size);
        let cross_start = env.cross.start_after_padding();
        let rtl_rows = env.orientation() == Orientation::Vertical && env.is_rtl();
        for (i, &node) in self.row.iter().enumerate() {
            let Some(index) = ctx.holder(node).map(|h| h.grid_span_index) else {
                continue;
            };
            let (start, end) = if rtl_rows {
                let end = cross_start + self.borders[self.span_count - index];
                (end - cross_sizes[i], end)
            } else {
                let start = cross_start + self.borders[index];
                (start, start + cross_sizes[i])
            };
            ctx.set_bounds(node, env.axis.place(main_start, main_end, start, end));
            if let Some(h) = ctx.holder(node) {
                if h.is_removed_or_changed() {
                    result.ignore_consumed = true;
                }
                result.focusable |= h.focusable;
            }
        }
        self.row.clear();
    }

    fn on_anchor_ready(
        &mut self,
        ctx: &LayoutContext<'_>,
        anchor: &mut AnchorInfo,
        first_item_direction: ItemDirection,
    ) {
        if ctx.item_count() == 0 || ctx.is_pre_layout() {
            return;
        }
        let mut span = self.span_index(anchor.position);
        if first_item_direction == ItemDirection::Tail {
            while span > 0 && anchor.position > 0 {
                anchor.position -= 1;
                span = self.span_index(anchor.position);
            }
        } else {
            let limit = ctx.item_count() - 1;
            let mut position = anchor.position;
            let mut best = span;
            while position < limit {
                let next = self.span_index(position + 1);
                if next <= best {
                    break;
                }
                position += 1;
                best = next;
            }
            anchor.position = position;
        }
    }

    fn accepts_reference(&self, _ctx: &LayoutContext<'_>, position: usize) -> bool {
        self.compute_span_index(position) == 0
    }

    fn collect_prefetch_positions(
        &self,
        item_count: usize,
        state: &FillState,
        registry: &mut PrefetchRegistry,
    ) {
        let distance = state.scrolling_offset.unwrap_or(0).max(0);
        let mut cursor = state.current_position;
        let mut remaining = self.span_count as isize;
        let mut count = 0;
        while count < self.span_count && remaining > 0 {
            let Some(position) = usize::try_from(cursor).ok().filter(|&p| p < item_count) else {
                break;
            };
            registry.add_position(position, distance);
            remaining -= self.span_size(position) as isize;
            cursor += state.item_direction.step();
            count += 1;
        }
    }

    fn span_count(&self) -> usize {
        self.span_count
    }

    fn on_layout_completed(&mut self) {
        self.pre_layout_spans.clear();
        self.pre_layout = false;
    }

    fn on_items_changed(&mut self) {
        self.span_index_cache.clear();
    }
}

/// Linear layout whose fill steps are rows of equally wide cells.
pub type GridLayout = LinearLayout<GridRows>;

impl LinearLayout<GridRows> {
    pub fn grid(options: LinearOptions, span_count: usize) -> Result<Self, LayoutError> {
        let rows = GridRows::new(span_count)?;
        Ok(Self::with_chunk(options.with_stack_from_end(false), rows))
    }

    pub fn span_count(&self) -> usize {
        self.chunk.span_count
    }

    /// Changes the number of cells per row; assignments are recomputed on the next layout.
    pub fn set_span_count(&mut self, span_count: usize) -> Result<(), LayoutError> {
        if span_count < 1 {
            return Err(LayoutError::InvalidArgument("span count must be at least 1"));
        }
        if span_count != self.chunk.span_count {
            self.chunk.span_count = span_count;
            self.chunk.span_index_cache.clear();
            self.chunk.borders = vec![0; span_count + 1];
            self.request_layout();
        }
        Ok(())
    }

    pub fn set_span_size_lookup(&mut self, lookup: impl SpanSizeLookup + 'static) {
        self.chunk.set_span_size_lookup(lookup);
        self.request_layout();
    }

    pub fn rows(&self) -> &GridRows {
        &self.chunk
    }

    pub fn rows_mut(&mut self) -> &mut GridRows {
        &mut self.chunk
    }
}
