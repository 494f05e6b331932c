use alloc::sync::Arc;
use alloc::vec::Vec;

use recycler::{Deadline, HolderId, ItemHolder, MeasureSpec, RecyclePool, Size};

use crate::key::TypeMap;
use crate::{Adapter, UpdateOp, translate_position};

/// Monotonic host clock in nanoseconds, used to estimate create and bind costs.
pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PoolOptions {
    /// Bound holders kept for their position, on top of the observed prefetch count.
    pub warm_cache_size: usize,
    /// Unbound holders kept per item type unless overridden with
    /// [`HolderPool::set_max_recycled`].
    pub max_recycled_per_type: usize,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            warm_cache_size: 2,
            max_recycled_per_type: 5,
        }
    }
}

impl PoolOptions {
    pub fn with_warm_cache_size(mut self, warm_cache_size: usize) -> Self {
        self.warm_cache_size = warm_cache_size;
        self
    }

    pub fn with_max_recycled_per_type(mut self, max: usize) -> Self {
        self.max_recycled_per_type = max;
        self
    }
}

#[derive(Clone, Debug, Default)]
struct TypePool {
    scrap: Vec<HolderId>,
    max: Option<usize>,
    create_ns: u64,
    bind_ns: u64,
}

/// A reference [`RecyclePool`] backed by an [`Adapter`].
///
/// Released holders go to a warm cache first, where they stay bound to their position and
/// are reused without a rebind. Evicted or invalid holders fall through to a cold pool per
/// item type and are rebound on reuse. Running averages of create and bind times let the pool
/// refuse work that would overrun a prefetch deadline.
pub struct HolderPool<A> {
    adapter: A,
    options: PoolOptions,
    slots: Vec<Option<ItemHolder>>,
    vacant: Vec<HolderId>,
    /// Oldest first.
    warm: Vec<HolderId>,
    cold: TypeMap<TypePool>,
    prefetch_max_observed: usize,
    pre_layout_ops: Option<Vec<UpdateOp>>,
    clock: Clock,
    created: usize,
}

impl<A: core::fmt::Debug> core::fmt::Debug for HolderPool<A> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HolderPool")
            .field("adapter", &self.adapter)
            .field("options", &self.options)
            .field("live", &self.live_count())
            .field("warm", &self.warm)
            .field("prefetch_max_observed", &self.prefetch_max_observed)
            .field("created", &self.created)
            .finish_non_exhaustive()
    }
}

impl<A> HolderPool<A> {
    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

impl<A: Adapter> HolderPool<A> {
    pub fn new(adapter: A, options: PoolOptions) -> Self {
        Self {
            adapter,
            options,
            slots: Vec::new(),
            vacant: Vec::new(),
            warm: Vec::new(),
            cold: TypeMap::default(),
            prefetch_max_observed: 0,
            pre_layout_ops: None,
            clock: Arc::new(|| 0),
            created: 0,
        }
    }

    /// Uses `clock` for cost estimates. Without one every cost reads as zero and deadlines
    /// never refuse work.
    pub fn with_clock(mut self, clock: impl Fn() -> u64 + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn adapter_mut(&mut self) -> &mut A {
        &mut self.adapter
    }

    pub fn options(&self) -> &PoolOptions {
        &self.options
    }

    pub fn set_options(&mut self, options: PoolOptions) {
        self.options = options;
        self.trim_warm_cache();
    }

    /// Overrides how many unbound holders of `item_type` are kept.
    pub fn set_max_recycled(&mut self, item_type: u32, max: usize) {
        let pool = self.cold.entry(item_type).or_default();
        pool.max = Some(max);
        let excess = pool.scrap.len().saturating_sub(max);
        let dropped: Vec<HolderId> = pool.scrap.drain(..excess).collect();
        for id in dropped {
            self.release(id);
        }
    }

    pub fn warm_cache_capacity(&self) -> usize {
        self.options.warm_cache_size + self.prefetch_max_observed
    }

    pub fn warm_cache(&self) -> &[HolderId] {
        &self.warm
    }

    pub fn recycled_count(&self, item_type: u32) -> usize {
        self.cold.get(&item_type).map_or(0, |p| p.scrap.len())
    }

    /// Holders created over the pool's lifetime.
    pub fn created_count(&self) -> usize {
        self.created
    }

    /// Holders currently alive, whether attached, warm or cold.
    /// Average create and bind cost observed for `item_type`.
    pub fn cost_estimates(&self, item_type: u32) -> (u64, u64) {
        self.cold
            .get(&item_type)
            .map_or((0, 0), |p| (p.create_ns, p.bind_ns))
    }

    /// While set, requested positions are pre-change positions and are translated through
    /// `ops` before binding.
    pub fn set_pre_layout_ops(&mut self, ops: &[UpdateOp]) {
        self.pre_layout_ops = Some(ops.to_vec());
    }

    pub fn clear_pre_layout_ops(&mut self) {
        self.pre_layout_ops = None;
    }

    /// Keeps warm holders in step with a structural change.
    pub fn apply_update(&mut self, op: &UpdateOp) {
        let mut evicted = Vec::new();
        for &id in &self.warm {
            let Some(h) = self.slots.get_mut(id.index()).and_then(Option::as_mut) else {
                continue;
            };
            let Some(position) = h.position else {
                evicted.push(id);
                continue;
            };
            match op.apply(position) {
                Some(next) if !op.updates(next) => h.position = Some(next),
                _ => evicted.push(id),
            }
        }
        self.warm.retain(|id| !evicted.contains(id));
        for id in evicted {
            self.put_cold(id);
        }
    }

    /// Sends every warm holder to the cold pool, e.g. after the whole data set changed.
    pub fn invalidate_warm_cache(&mut self) {
        for id in core::mem::take(&mut self.warm) {
            self.put_cold(id);
        }
    }

    /// Rebinds an attached holder in place to the item at its current position.
    pub fn rebind(&mut self, id: HolderId) {
        let Some(position) = self.holder(id).and_then(|h| h.position) else {
            return;
        };
        self.bind(id, position);
    }

    fn alloc(&mut self, item_type: u32) -> HolderId {
        let holder = ItemHolder::new(item_type);
        let id = match self.vacant.pop() {
            Some(id) => {
                self.slots[id.index()] = Some(holder);
                id
            }
            None => {
                self.slots.push(Some(holder));
                HolderId((self.slots.len() - 1) as u32)
            }
        };
        self.created += 1;
        self.adapter.create(id, item_type);
        id
    }

    fn release(&mut self, id: HolderId) {
        if let Some(slot) = self.slots.get_mut(id.index()) {
            if slot.take().is_some() {
                self.adapter.destroy(id);
                self.vacant.push(id);
            }
        }
    }

    fn bind(&mut self, id: HolderId, position: usize) {
        let Some(holder) = self.slots.get_mut(id.index()).and_then(Option::as_mut) else {
            return;
        };
        holder.position = Some(position);
        holder.old_position = None;
        holder.pre_layout_position = None;
        holder.stable_id = self.adapter.stable_id(position);
        holder.full_span = self.adapter.is_full_span(position);
        holder.nested = self.adapter.nested_viewport(position);
        holder.invalid = false;
        holder.removed = false;
        holder.changed = false;
        holder.bound = true;
        self.adapter.bind(holder, position);
    }

    fn put_warm(&mut self, id: HolderId) {
        let capacity = self.warm_cache_capacity();
        if capacity == 0 {
            self.put_cold(id);
            return;
        }
        if self.warm.len() >= capacity {
            let evicted = self.warm.remove(0);
            self.put_cold(evicted);
        }
        self.warm.push(id);
    }

    fn put_cold(&mut self, id: HolderId) {
        let Some(holder) = self.slots.get_mut(id.index()).and_then(Option::as_mut) else {
            return;
        };
        holder.reset_for_pool();
        let item_type = holder.item_type;
        let max_default = self.options.max_recycled_per_type;
        let pool = self.cold.entry(item_type).or_default();
        if pool.scrap.len() >= pool.max.unwrap_or(max_default) {
            atrace!(holder = id.0, item_type, "HolderPool: cold pool full, dropping holder");
            self.release(id);
            return;
        }
        pool.scrap.push(id);
    }

    fn trim_warm_cache(&mut self) {
        let excess = self.warm.len().saturating_sub(self.warm_cache_capacity());
        let evicted: Vec<HolderId> = self.warm.drain(..excess).collect();
        for id in evicted {
            self.put_cold(id);
        }
    }

    fn now(&self) -> u64 {
        (self.clock)()
    }
}

fn running_average(old: u64, new: u64) -> u64 {
    if old == 0 {
        new
    } else {
        old / 4 * 3 + new / 4
    }
}

impl<A: Adapter> RecyclePool for HolderPool<A> {
    fn node_for_position(&mut self, position: usize, deadline: Deadline) -> Option<HolderId> {
        let adapter_position = match &self.pre_layout_ops {
            Some(ops) => translate_position(ops, position)?,
            None => position,
        };
        if adapter_position >= self.adapter.item_count() {
            return None;
        }
        let moved = adapter_position != position;

        let warm = self.warm.iter().position(|&id| {
            self.slots
                .get(id.index())
                .and_then(Option::as_ref)
                .is_some_and(|h| h.is_reusable_for(adapter_position))
        });
        if let Some(i) = warm {
            let id = self.warm.remove(i);
            if moved {
                if let Some(h) = self.holder_mut(id) {
                    h.pre_layout_position = Some(position);
                }
            }
            atrace!(position, holder = id.0, "HolderPool: warm hit");
            return Some(id);
        }

        let item_type = self.adapter.item_type(adapter_position);
        let (create_ns, bind_ns) = self.cost_estimates(item_type);
        let reused = self.cold.get_mut(&item_type).and_then(|p| p.scrap.pop());
        let id = match reused {
            Some(id) => id,
            None => {
                let start = self.now();
                if !deadline.fits(start, create_ns) {
                    atrace!(position, create_ns, "HolderPool: no time to create");
                    return None;
                }
                let id = self.alloc(item_type);
                let elapsed = self.now().saturating_sub(start);
                let pool = self.cold.entry(item_type).or_default();
                pool.create_ns = running_average(pool.create_ns, elapsed);
                id
            }
        };

        let start = self.now();
        if !deadline.fits(start, bind_ns) {
            atrace!(position, bind_ns, "HolderPool: no time to bind");
            self.put_cold(id);
            return None;
        }
        self.bind(id, adapter_position);
        let elapsed = self.now().saturating_sub(start);
        let pool = self.cold.entry(item_type).or_default();
        pool.bind_ns = running_average(pool.bind_ns, elapsed);
        if moved {
            if let Some(h) = self.holder_mut(id) {
                h.pre_layout_position = Some(position);
            }
        }
        Some(id)
    }

    fn recycle(&mut self, holder: HolderId) {
        let Some(h) = self.holder(holder) else {
            return;
        };
        if h.bound && !h.invalid && !h.removed && !h.changed {
            self.put_warm(holder);
        } else {
            self.put_cold(holder);
        }
    }

    fn add_to_pool(&mut self, holder: HolderId, allow_warm_cache: bool) {
        let warm = allow_warm_cache
            && self
                .holder(holder)
                .is_some_and(|h| h.bound && !h.invalid && !h.removed);
        if warm {
            self.put_warm(holder);
        } else {
            self.put_cold(holder);
        }
    }

    fn holder(&self, holder: HolderId) -> Option<&ItemHolder> {
        self.slots.get(holder.index()).and_then(Option::as_ref)
    }

    fn holder_mut(&mut self, holder: HolderId) -> Option<&mut ItemHolder> {
        self.slots.get_mut(holder.index()).and_then(Option::as_mut)
    }

    fn measure(&mut self, holder: HolderId, spec: MeasureSpec) -> Size {
        match self.slots.get(holder.index()).and_then(Option::as_ref) {
            Some(h) => self.adapter.measure(h, spec),
            None => Size::default(),
        }
    }

    fn on_prefetch_count_observed(&mut self, count: usize) {
        if count > self.prefetch_max_observed {
            adebug!(count, "HolderPool: prefetch count grew");
            self.prefetch_max_observed = count;
        }
    }
}
