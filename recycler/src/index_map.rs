use alloc::vec::Vec;

use crate::error::LayoutError;
use crate::{HolderId, RecyclePool};

const WORD_BITS: usize = 64;
const LAST_BIT: u64 = 1 << (WORD_BITS - 1);

/// Growable bit sequence stored as a chain of 64-bit words.
///
/// Inserting or removing a bit shifts every higher bit by one, carrying across word
/// boundaries.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct HiddenBits {
    words: Vec<u64>,
}

impl HiddenBits {
    fn ensure_word(&mut self, word: usize) {
        if self.words.len() <= word {
            self.words.resize(word + 1, 0);
        }
    }

    pub(crate) fn get(&self, index: usize) -> bool {
        self.words
            .get(index / WORD_BITS)
            .is_some_and(|w| w & (1 << (index % WORD_BITS)) != 0)
    }

    pub(crate) fn set(&mut self, index: usize) {
        self.ensure_word(index / WORD_BITS);
        self.words[index / WORD_BITS] |= 1 << (index % WORD_BITS);
    }

    pub(crate) fn clear(&mut self, index: usize) {
        if let Some(w) = self.words.get_mut(index / WORD_BITS) {
            *w &= !(1 << (index % WORD_BITS));
        }
    }

    pub(crate) fn reset(&mut self) {
        self.words.clear();
    }

    /// Inserts `value` at `index`, shifting higher bits up by one.
    pub(crate) fn insert(&mut self, index: usize, value: bool) {
        let first = index / WORD_BITS;
        self.ensure_word(first);
        let bit = index % WORD_BITS;

        let word = self.words[first];
        let mut carry = word & LAST_BIT != 0;
        let mask = (1u64 << bit) - 1;
        let before = word & mask;
        let after = word & !mask;
        let mut next = before | (after << 1);
        if value {
            next |= 1 << bit;
        }
        self.words[first] = next;

        let mut w = first + 1;
        while carry || w < self.words.len() {
            self.ensure_word(w);
            let cur = self.words[w];
            let out = cur & LAST_BIT != 0;
            self.words[w] = (cur << 1) | u64::from(carry);
            carry = out;
            w += 1;
        }
        self.trim();
    }

    /// Removes the bit at `index`, shifting higher bits down by one. Returns its value.
    pub(crate) fn remove(&mut self, index: usize) -> bool {
        let first = index / WORD_BITS;
        if first >= self.words.len() {
            return false;
        }
        let bit = index % WORD_BITS;
        let word = self.words[first];
        let value = word & (1 << bit) != 0;

        let mask = (1u64 << bit) - 1;
        let before = word & mask;
        let after = (word & !mask & !(1 << bit)) >> 1;
        let mut next = before | after;

        for w in first + 1..self.words.len() {
            if self.words[w] & 1 != 0 {
                next |= LAST_BIT;
            }
            let prev = w - 1;
            self.words[prev] = next;
            next = self.words[w] >> 1;
        }
        let last = self.words.len() - 1;
        self.words[last] = next;
        self.trim();
        value
    }

    /// Number of set bits strictly before `index`.
    pub(crate) fn count_ones_before(&self, index: usize) -> usize {
        let full = index / WORD_BITS;
        let mut count = 0usize;
        for (i, w) in self.words.iter().enumerate() {
            if i < full {
                count += w.count_ones() as usize;
            } else {
                if i == full {
                    let mask = (1u64 << (index % WORD_BITS)) - 1;
                    count += (w & mask).count_ones() as usize;
                }
                break;
            }
        }
        count
    }

    pub(crate) fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    fn trim(&mut self) {
        while self.words.last() == Some(&0) {
            self.words.pop();
        }
    }
}

/// Translates between logical (visible-only) and physical (all attached) child slots.
///
/// Hidden nodes stay attached (typically while they animate out) but are skipped by every
/// logical accessor, so layout engines never see them.
#[derive(Clone, Debug, Default)]
pub struct VisibleIndexMap {
    slots: Vec<HolderId>,
    bits: HiddenBits,
    hidden: Vec<HolderId>,
}

impl VisibleIndexMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count_physical(&self) -> usize {
        self.slots.len()
    }

    pub fn count_logical(&self) -> usize {
        self.slots.len() - self.hidden.len()
    }

    pub fn hidden_count(&self) -> usize {
        self.hidden.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Maps a logical index to its physical slot, skipping hidden slots.
    pub fn logical_to_physical(&self, logical: usize) -> Option<usize> {
        let limit = self.slots.len();
        let mut offset = logical;
        while offset < limit {
            // Never exceeds `logical`: the walk only moves by the residual difference.
            let visible_before = offset - self.bits.count_ones_before(offset);
            if visible_before == logical {
                while self.bits.get(offset) {
                    offset += 1;
                }
                return (offset < limit).then_some(offset);
            }
            offset += logical - visible_before;
        }
        None
    }

    /// Maps a physical slot to its logical index; `None` for hidden or out-of-range slots.
    pub fn physical_to_logical(&self, physical: usize) -> Option<usize> {
        if physical >= self.slots.len() || self.bits.get(physical) {
            return None;
        }
        Some(physical - self.bits.count_ones_before(physical))
    }

    /// Inserts `node` at a physical slot (`None` appends).
    pub fn insert(&mut self, node: HolderId, physical: Option<usize>, hidden: bool) {
        let offset = physical
            .unwrap_or(self.slots.len())
            .min(self.slots.len());
        self.bits.insert(offset, hidden);
        self.slots.insert(offset, node);
        if hidden {
            self.hide_internal(node);
        }
        rtrace!(node = node.0, offset, hidden, "VisibleIndexMap::insert");
    }

    /// Inserts `node` before the node currently at logical index `logical` (`None` appends).
    pub fn add(&mut self, node: HolderId, logical: Option<usize>, hidden: bool) {
        let physical = match logical {
            Some(i) if i < self.count_logical() => self.logical_to_physical(i),
            _ => None,
        };
        self.insert(node, physical, hidden);
    }

    /// Removes the node at logical index `logical`.
    pub fn remove_at(&mut self, logical: usize) -> Option<HolderId> {
        let physical = self.logical_to_physical(logical)?;
        self.remove_physical(physical).map(|(node, _)| node)
    }

    /// Removes the node at a physical slot, returning it and whether it was hidden.
    pub fn remove_physical(&mut self, physical: usize) -> Option<(HolderId, bool)> {
        if physical >= self.slots.len() {
            return None;
        }
        let node = self.slots.remove(physical);
        let was_hidden = self.bits.remove(physical);
        if was_hidden {
            self.unhide_internal(node);
        }
        Some((node, was_hidden))
    }

    /// Removes `node` wherever it is attached.
    pub fn remove(&mut self, node: HolderId) -> bool {
        match self.physical_index_of(node) {
            Some(physical) => self.remove_physical(physical).is_some(),
            None => false,
        }
    }

    /// Removes `node` only if it is hidden. Returns whether it was removed.
    pub fn remove_if_hidden(&mut self, node: HolderId) -> bool {
        let Some(physical) = self.physical_index_of(node) else {
            return self.unhide_internal(node);
        };
        if !self.bits.get(physical) {
            return false;
        }
        self.remove_physical(physical);
        true
    }

    pub fn child_at(&self, logical: usize) -> Option<HolderId> {
        self.logical_to_physical(logical).map(|p| self.slots[p])
    }

    pub fn physical_at(&self, physical: usize) -> Option<HolderId> {
        self.slots.get(physical).copied()
    }

    pub fn physical_index_of(&self, node: HolderId) -> Option<usize> {
        self.slots.iter().position(|&n| n == node)
    }

    /// Logical index of `node`, or `None` if it is hidden or not attached.
    pub fn index_of(&self, node: HolderId) -> Option<usize> {
        self.physical_index_of(node)
            .and_then(|p| self.physical_to_logical(p))
    }

    pub fn is_hidden(&self, node: HolderId) -> bool {
        self.hidden.contains(&node)
    }

    /// Hides an attached node from logical enumeration.
    pub fn hide(&mut self, node: HolderId) {
        let Some(physical) = self.physical_index_of(node) else {
            inconsistent!(false, "VisibleIndexMap::hide: node is not attached");
            return;
        };
        if self.bits.get(physical) {
            inconsistent!(false, "VisibleIndexMap::hide: node hidden twice");
            return;
        }
        self.bits.set(physical);
        self.hide_internal(node);
    }

    /// Makes a hidden node visible again at its physical slot.
    pub fn unhide(&mut self, node: HolderId) {
        let Some(physical) = self.physical_index_of(node) else {
            inconsistent!(false, "VisibleIndexMap::unhide: node is not attached");
            return;
        };
        if !self.bits.get(physical) {
            inconsistent!(false, "VisibleIndexMap::unhide: node was not hidden");
            return;
        }
        self.bits.clear(physical);
        self.unhide_internal(node);
    }

    /// Iterates hidden nodes in the order they were hidden.
    pub fn hidden(&self) -> &[HolderId] {
        &self.hidden
    }

    /// Iterates every attached node in physical order.
    pub fn physical(&self) -> &[HolderId] {
        &self.slots
    }

    /// First hidden node laid out at `position` that is still valid and not removed.
    pub fn find_hidden_non_removed(
        &self,
        position: usize,
        pool: &dyn RecyclePool,
    ) -> Option<HolderId> {
        self.hidden.iter().copied().find(|&id| {
            pool.holder(id).is_some_and(|h| {
                h.layout_position() == Some(position) && !h.invalid && !h.removed
            })
        })
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.bits.reset();
        self.hidden.clear();
    }

    /// Checks `hidden.len() == popcount(bits)`.
    pub fn verify(&self) -> Result<(), LayoutError> {
        let ones = self.bits.count_ones();
        if ones != self.hidden.len() {
            return Err(LayoutError::InconsistentState(
                "hidden list size differs from hidden bit count",
            ));
        }
        for &node in &self.hidden {
            match self.physical_index_of(node) {
                Some(p) if self.bits.get(p) => {}
                _ => {
                    return Err(LayoutError::InconsistentState(
                        "hidden node is not marked hidden",
                    ));
                }
            }
        }
        Ok(())
    }

    fn hide_internal(&mut self, node: HolderId) {
        self.hidden.push(node);
    }

    fn unhide_internal(&mut self, node: HolderId) -> bool {
        match self.hidden.iter().position(|&n| n == node) {
            Some(i) => {
                self.hidden.remove(i);
                true
            }
            None => false,
        }
    }
}
