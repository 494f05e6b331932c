use crate::{Deadline, HolderId, ItemHolder, MeasureSpec, Size};

/// The narrow contract layout engines and the prefetch scheduler use to obtain and release
/// nodes.
///
/// The pool owns every [`ItemHolder`]; callers only keep a [`HolderId`] while the node is
/// attached and must not touch it after handing it back via [`Self::recycle`] or
/// [`Self::add_to_pool`].
pub trait RecyclePool {
    /// Returns a bound node for `position`, or `None` when the data is exhausted or the node
    /// cannot be created and bound before `deadline`.
    fn node_for_position(&mut self, position: usize, deadline: Deadline) -> Option<HolderId>;

    /// Releases a node that left the layout. The pool decides between its warm cache and
    /// the cold pool.
    fn recycle(&mut self, holder: HolderId);

    /// Releases a node directly. With `allow_warm_cache` a bound node may stay warm for its
    /// position; otherwise it goes to the cold pool.
    fn add_to_pool(&mut self, holder: HolderId, allow_warm_cache: bool);

    fn holder(&self, holder: HolderId) -> Option<&ItemHolder>;

    fn holder_mut(&mut self, holder: HolderId) -> Option<&mut ItemHolder>;

    /// Measures the node's decorated size under `spec`.
    fn measure(&mut self, holder: HolderId, spec: MeasureSpec) -> Size;

    /// Largest number of prefetch positions one viewport reported in a round.
    fn on_prefetch_count_observed(&mut self, _count: usize) {}
}
