use alloc::collections::VecDeque;

use super::lookup::LazySpanLookup;
use crate::{AxisHelper, HolderId, LayoutDirection, NodeBounds, RecyclePool};

/// What a span needs to read its nodes' geometry.
pub(crate) struct LineSource<'a> {
    pub pool: &'a dyn RecyclePool,
    pub axis: &'a AxisHelper,
    pub lookup: &'a LazySpanLookup,
}

impl<'a> LineSource<'a> {
    pub fn new(
        pool: &'a dyn RecyclePool,
        axis: &'a AxisHelper,
        lookup: &'a LazySpanLookup,
    ) -> Self {
        Self { pool, axis, lookup }
    }

    fn bounds(&self, id: HolderId) -> NodeBounds {
        self.pool.holder(id).map(|h| h.bounds).unwrap_or_default()
    }

    /// Measurement of `id` when it counts towards the deleted size, else `0`.
    fn deleted_measurement(&self, id: HolderId) -> i32 {
        match self.pool.holder(id) {
            Some(h) if h.is_removed_or_changed() => self.axis.decorated_measurement(&h.bounds),
            _ => 0,
        }
    }

    fn full_span_gap(&self, id: HolderId, span: usize, side: LayoutDirection) -> i32 {
        let Some(h) = self.pool.holder(id).filter(|h| h.full_span) else {
            return 0;
        };
        h.layout_position()
            .and_then(|p| self.lookup.full_span_item(p))
            .filter(|f| f.gap_dir == Some(side))
            .map_or(0, |f| f.gap_for_span(span))
    }
}

/// One lane of a staggered layout.
///
/// Nodes are kept in visual order from the start edge. Start and end lines are cached and
/// recomputed from the edge nodes after any change.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Span {
    index: usize,
    nodes: VecDeque<HolderId>,
    cached_start: Option<i32>,
    cached_end: Option<i32>,
    deleted_size: i32,
}

impl Span {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            ..Self::default()
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn nodes(&self) -> &VecDeque<HolderId> {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Total extent of removed or changed nodes still in the span.
    pub fn deleted_size(&self) -> i32 {
        self.deleted_size
    }

    pub(crate) fn start_line_or(&mut self, src: &LineSource<'_>, default: i32) -> i32 {
        self.start_line(src).unwrap_or(default)
    }

    pub(crate) fn start_line(&mut self, src: &LineSource<'_>) -> Option<i32> {
        if self.cached_start.is_none() {
            let &first = self.nodes.front()?;
            let start = src.axis.decorated_start(&src.bounds(first));
            self.cached_start =
                Some(start - src.full_span_gap(first, self.index, LayoutDirection::Start));
        }
        self.cached_start
    }

    pub(crate) fn end_line_or(&mut self, src: &LineSource<'_>, default: i32) -> i32 {
        self.end_line(src).unwrap_or(default)
    }

    pub(crate) fn end_line(&mut self, src: &LineSource<'_>) -> Option<i32> {
        if self.cached_end.is_none() {
            let &last = self.nodes.back()?;
            let end = src.axis.decorated_end(&src.bounds(last));
            self.cached_end = Some(end + src.full_span_gap(last, self.index, LayoutDirection::End));
        }
        self.cached_end
    }

    pub(crate) fn prepend(&mut self, id: HolderId, src: &LineSource<'_>) {
        self.nodes.push_front(id);
        self.cached_start = None;
        if self.nodes.len() == 1 {
            self.cached_end = None;
        }
        self.deleted_size += src.deleted_measurement(id);
    }

    pub(crate) fn append(&mut self, id: HolderId, src: &LineSource<'_>) {
        self.nodes.push_back(id);
        self.cached_end = None;
        if self.nodes.len() == 1 {
            self.cached_start = None;
        }
        self.deleted_size += src.deleted_measurement(id);
    }

    pub(crate) fn pop_start(&mut self, src: &LineSource<'_>) -> Option<HolderId> {
        let id = self.nodes.pop_front()?;
        if self.nodes.is_empty() {
            self.cached_end = None;
        }
        self.deleted_size -= src.deleted_measurement(id);
        self.cached_start = None;
        Some(id)
    }

    pub(crate) fn pop_end(&mut self, src: &LineSource<'_>) -> Option<HolderId> {
        let id = self.nodes.pop_back()?;
        if self.nodes.is_empty() {
            self.cached_start = None;
        }
        self.deleted_size -= src.deleted_measurement(id);
        self.cached_end = None;
        Some(id)
    }

    /// Remembers the span's leading line (shifted by `offset`) and drops its nodes.
    ///
    /// The line is only kept when it does not leave a gap at the leading padding edge.
    pub(crate) fn cache_reference_line_and_clear(
        &mut self,
        src: &LineSource<'_>,
        reverse_layout: bool,
        offset: Option<i32>,
    ) {
        let reference = if reverse_layout {
            self.end_line(src)
        } else {
            self.start_line(src)
        };
        self.clear();
        let Some(mut reference) = reference else {
            return;
        };
        if (reverse_layout && reference < src.axis.end_after_padding())
            || (!reverse_layout && reference > src.axis.start_after_padding())
        {
            return;
        }
        if let Some(offset) = offset {
            reference += offset;
        }
        self.set_line(Some(reference));
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.invalidate_cache();
        self.deleted_size = 0;
    }

    pub fn invalidate_cache(&mut self) {
        self.cached_start = None;
        self.cached_end = None;
    }

    /// Cached start line without recomputation; `None` when dirty.
    pub fn cached_line(&self) -> Option<i32> {
        self.cached_start
    }

    pub fn set_line(&mut self, line: Option<i32>) {
        self.cached_start = line;
        self.cached_end = line;
    }

    pub fn on_offset(&mut self, delta: i32) {
        if let Some(start) = self.cached_start.as_mut() {
            *start += delta;
        }
        if let Some(end) = self.cached_end.as_mut() {
            *end += delta;
        }
    }

    /// First node (walking from the end when `from_end`) overlapping the padded viewport.
    pub(crate) fn find_one_visible_position(
        &self,
        src: &LineSource<'_>,
        from_end: bool,
        completely_visible: bool,
    ) -> Option<usize> {
        let start = src.axis.start_after_padding();
        let end = src.axis.end_after_padding();
        let visit = |id: &HolderId| {
            let b = src.bounds(*id);
            let child_start = src.axis.decorated_start(&b);
            let child_end = src.axis.decorated_end(&b);
            let overlaps = child_start < end && child_end > start;
            let fits = child_start >= start && child_end <= end;
            (overlaps && (!completely_visible || fits))
                .then(|| src.pool.holder(*id).and_then(|h| h.layout_position()))
                .flatten()
        };
        if from_end {
            self.nodes.iter().rev().find_map(visit)
        } else {
            self.nodes.iter().find_map(visit)
        }
    }
}
