use alloc::vec::Vec;

/// Collects the positions one viewport wants prefetched during a scheduling round.
///
/// It enforces the registration contract:
/// - Positions at or past the item count are ignored (and debug-asserted).
/// - Negative distances are ignored (and debug-asserted).
/// - Repeated positions are ignored.
#[derive(Clone, Debug, Default)]
pub struct PrefetchRegistry {
    dx: i32,
    dy: i32,
    item_count: usize,
    positions: Vec<(usize, i32)>,
}

impl PrefetchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest scroll delta posted for the owning viewport.
    pub fn prefetch_vector(&self) -> (i32, i32) {
        (self.dx, self.dy)
    }

    pub fn set_prefetch_vector(&mut self, dx: i32, dy: i32) {
        self.dx = dx;
        self.dy = dy;
    }

    /// Clears the previous round and bounds accepted positions by `item_count`.
    pub fn begin(&mut self, item_count: usize) {
        self.item_count = item_count;
        self.positions.clear();
    }

    pub fn item_count(&self) -> usize {
        self.item_count
    }

    pub fn add_position(&mut self, position: usize, distance: i32) {
        if position >= self.item_count {
            rwarn!(
                position,
                count = self.item_count,
                "PrefetchRegistry: out-of-bounds position"
            );
            debug_assert!(
                position < self.item_count,
                "PrefetchRegistry: out-of-bounds position (p={position}, count={})",
                self.item_count
            );
            return;
        }
        if distance < 0 {
            rwarn!(position, distance, "PrefetchRegistry: negative distance");
            debug_assert!(
                distance >= 0,
                "PrefetchRegistry: negative distance (p={position}, d={distance})"
            );
            return;
        }
        if self.contains(position) {
            return;
        }
        self.positions.push((position, distance));
    }

    pub fn contains(&self, position: usize) -> bool {
        self.positions.iter().any(|&(p, _)| p == position)
    }

    /// Registered `(position, distance)` pairs in registration order.
    pub fn positions(&self) -> &[(usize, i32)] {
        &self.positions
    }

    pub fn count(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn clear(&mut self) {
        self.positions.clear();
    }
}
