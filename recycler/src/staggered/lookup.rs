use alloc::vec::Vec;

use crate::LayoutDirection;

const MIN_SIZE: usize = 10;

/// Bookkeeping for an item that spans every lane.
///
/// `gap_per_span[i]` is the distance between span `i`'s line and the item's edge at the
/// time it was laid out; it lets later passes restore the same alignment.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FullSpanItem {
    pub position: usize,
    /// Side of the item the gaps were measured on; `None` when unknown.
    pub gap_dir: Option<LayoutDirection>,
    pub gap_per_span: Vec<i32>,
    /// Laid out against the data direction while spans were misaligned.
    pub has_unwanted_gap_after: bool,
}

impl FullSpanItem {
    pub fn gap_for_span(&self, span: usize) -> i32 {
        self.gap_per_span.get(span).copied().unwrap_or(0)
    }
}

/// Lazily grown position → span table plus the sorted full-span records.
///
/// An assignment, once made, holds until a structural change at or before its position
/// (or an explicit invalidation) clears it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LazySpanLookup {
    data: Vec<Option<usize>>,
    full_span_items: Vec<FullSpanItem>,
}

impl LazySpanLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn span(&self, position: usize) -> Option<usize> {
        self.data.get(position).copied().flatten()
    }

    pub fn set_span(&mut self, position: usize, span: usize) {
        self.ensure_size(position);
        self.data[position] = Some(span);
    }

    /// Capacity of the table; every position at or past it is unassigned.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.iter().all(Option::is_none)
    }

    pub fn clear(&mut self) {
        self.data.fill(None);
        self.full_span_items.clear();
    }

    pub fn data(&self) -> &[Option<usize>] {
        &self.data
    }

    pub fn full_span_items(&self) -> &[FullSpanItem] {
        &self.full_span_items
    }

    /// Replaces the whole table, e.g. from saved state.
    pub fn restore(&mut self, data: Vec<Option<usize>>, full_span_items: Vec<FullSpanItem>) {
        self.data = data;
        self.full_span_items = full_span_items;
        self.full_span_items.sort_by_key(|f| f.position);
    }

    fn ensure_size(&mut self, position: usize) {
        if self.data.is_empty() {
            self.data.resize(position.max(MIN_SIZE) + 1, None);
        } else if position >= self.data.len() {
            let mut len = self.data.len();
            while len <= position {
                len *= 2;
            }
            self.data.resize(len, None);
        }
    }

    /// Drops full-span records at or after `position`, then invalidates from `position`.
    pub fn force_invalidate_after(&mut self, position: usize) -> Option<usize> {
        self.full_span_items.retain(|f| f.position < position);
        self.invalidate_after(position)
    }

    /// Clears assignments from `position` up to the next full-span item (inclusive), or to
    /// the end of the table when there is none. Returns the first index left untouched.
    pub fn invalidate_after(&mut self, position: usize) -> Option<usize> {
        if position >= self.data.len() {
            return None;
        }
        let end = match self.invalidate_full_spans_after(position) {
            Some(next) => (next + 1).min(self.data.len()),
            None => self.data.len(),
        };
        self.data[position..end].fill(None);
        Some(end)
    }

    fn invalidate_full_spans_after(&mut self, position: usize) -> Option<usize> {
        self.full_span_items.retain(|f| f.position != position);
        let next = self
            .full_span_items
            .iter()
            .position(|f| f.position >= position)?;
        Some(self.full_span_items.remove(next).position)
    }

    /// Shifts assignments after a removal of `count` items at `start`.
    ///
    /// Entries inside the removed range are dropped; later ones move down.
    pub fn offset_for_removal(&mut self, start: usize, count: usize) {
        if start >= self.data.len() || count == 0 {
            return;
        }
        self.ensure_size(start + count);
        let len = self.data.len();
        self.data.copy_within(start + count..len, start);
        self.data[len - count..].fill(None);

        let end = start + count;
        self.full_span_items.retain_mut(|f| {
            if f.position < start {
                return true;
            }
            if f.position < end {
                return false;
            }
            f.position -= count;
            true
        });
    }

    /// Shifts assignments after an insertion of `count` items at `start`.
    pub fn offset_for_addition(&mut self, start: usize, count: usize) {
        if start >= self.data.len() || count == 0 {
            return;
        }
        self.ensure_size(start + count);
        let len = self.data.len();
        self.data.copy_within(start..len - count, start + count);
        self.data[start..start + count].fill(None);

        for f in &mut self.full_span_items {
            if f.position >= start {
                f.position += count;
            }
        }
    }

    /// Inserts `item`, replacing any record at the same position.
    pub fn add_full_span_item(&mut self, item: FullSpanItem) {
        self.full_span_items.retain(|f| f.position != item.position);
        let at = self
            .full_span_items
            .partition_point(|f| f.position < item.position);
        self.full_span_items.insert(at, item);
    }

    pub fn full_span_item(&self, position: usize) -> Option<&FullSpanItem> {
        self.full_span_items.iter().find(|f| f.position == position)
    }

    pub fn full_span_item_mut(&mut self, position: usize) -> Option<&mut FullSpanItem> {
        self.full_span_items
            .iter_mut()
            .find(|f| f.position == position)
    }

    /// First record in `min..max` whose gap lies towards `gap_dir` (any direction when
    /// `None`), or that carries an unwanted gap when `has_unwanted_gap_after` is set.
    pub fn first_full_span_item_in_range(
        &self,
        min: usize,
        max: usize,
        gap_dir: Option<LayoutDirection>,
        has_unwanted_gap_after: bool,
    ) -> Option<&FullSpanItem> {
        self.full_span_items
            .iter()
            .take_while(|f| f.position < max)
            .find(|f| {
                f.position >= min
                    && (gap_dir.is_none()
                        || f.gap_dir == gap_dir
                        || (has_unwanted_gap_after && f.has_unwanted_gap_after))
            })
    }
}
