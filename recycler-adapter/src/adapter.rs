use recycler::{HolderId, ItemHolder, MeasureSpec, Size, ViewportId};

/// The data source behind one viewport.
///
/// The pool calls it to create, bind and measure nodes; it never sees the layout.
pub trait Adapter {
    fn item_count(&self) -> usize;

    /// Holders are only reused for items of the same type.
    fn item_type(&self, _position: usize) -> u32 {
        0
    }

    fn stable_id(&self, _position: usize) -> Option<u64> {
        None
    }

    /// Items that cross every lane of a staggered layout.
    fn is_full_span(&self, _position: usize) -> bool {
        false
    }

    /// The viewport hosted by the item at `position`, if its content virtualizes itself.
    fn nested_viewport(&self, _position: usize) -> Option<ViewportId> {
        None
    }

    /// A new holder of `item_type` joined the pool; hosts create their node for it here.
    fn create(&mut self, _holder: HolderId, _item_type: u32) {}

    /// The holder was dropped because its type's cold pool was full.
    fn destroy(&mut self, _holder: HolderId) {}

    /// Writes the item at `position` into the node behind `holder`.
    fn bind(&mut self, holder: &mut ItemHolder, position: usize);

    /// Decorated size of the bound node under `spec`.
    fn measure(&mut self, holder: &ItemHolder, spec: MeasureSpec) -> Size;
}
