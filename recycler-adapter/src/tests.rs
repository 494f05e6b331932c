use crate::*;

use alloc::vec;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};

use recycler::{
    Classification, Deadline, HolderId, ItemHolder, LinearLayout, LinearOptions, MeasureSpec,
    PrefetchOptions, PrefetchScheduler, PrefetchTarget, RecyclePool, Size, ViewportGeometry,
    ViewportId, ViewportRegistry,
};

/// Vertical list whose items measure to a fixed height per position.
#[derive(Debug, Default)]
struct ListAdapter {
    heights: Vec<i32>,
    bound: Vec<usize>,
    destroyed: usize,
    nested_at: Option<(usize, ViewportId)>,
}

impl ListAdapter {
    fn uniform(count: usize, height: i32) -> Self {
        Self {
            heights: vec![height; count],
            ..Self::default()
        }
    }
}

impl Adapter for ListAdapter {
    fn item_count(&self) -> usize {
        self.heights.len()
    }

    fn nested_viewport(&self, position: usize) -> Option<ViewportId> {
        self.nested_at
            .filter(|&(p, _)| p == position)
            .map(|(_, id)| id)
    }

    fn destroy(&mut self, _holder: HolderId) {
        self.destroyed += 1;
    }

    fn bind(&mut self, _holder: &mut ItemHolder, position: usize) {
        self.bound.push(position);
    }

    fn measure(&mut self, holder: &ItemHolder, spec: MeasureSpec) -> Size {
        let height = holder
            .position
            .and_then(|p| self.heights.get(p).copied())
            .unwrap_or(0);
        Size::new(spec.width, height)
    }
}

type ListController = Controller<ListAdapter, LinearLayout>;

fn list(id: u32, adapter: ListAdapter) -> ListController {
    Controller::new(
        ViewportId(id),
        LinearLayout::new(LinearOptions::default()),
        HolderPool::new(adapter, PoolOptions::default()),
        ViewportGeometry::new(300, 500),
    )
}

fn range(start: usize, end_inclusive: usize) -> Vec<usize> {
    (start..=end_inclusive).collect()
}

fn top_of(c: &ListController, position: usize) -> i32 {
    let id = (0..c.children().count_logical())
        .filter_map(|i| c.children().child_at(i))
        .find(|&id| c.holder(id).and_then(ItemHolder::layout_position) == Some(position))
        .expect("position is attached");
    c.holder(id).expect("live holder").bounds.top
}

#[derive(Default)]
struct Counts {
    persistent: usize,
    appeared_new: usize,
    appeared_after_pre_layout: usize,
    disappearing: usize,
    disappeared: usize,
    unused: usize,
}

fn count(changes: &[(HolderId, Classification)]) -> Counts {
    let mut counts = Counts::default();
    for (_, class) in changes {
        match class {
            Classification::Persistent { .. } => counts.persistent += 1,
            Classification::Appeared { pre: None, .. } => counts.appeared_new += 1,
            Classification::Appeared { pre: Some(_), .. } => counts.appeared_after_pre_layout += 1,
            Classification::Disappearing { .. } => counts.disappearing += 1,
            Classification::Disappeared { .. } => counts.disappeared += 1,
            Classification::Unused => counts.unused += 1,
            Classification::AppearedPrePost { .. } => {}
        }
    }
    counts
}

#[test]
fn update_ops_translate_positions() {
    let moved = UpdateOp::Move { from: 1, to: 4 };
    assert_eq!(moved.apply(1), Some(4));
    assert_eq!(moved.apply(3), Some(2));
    assert_eq!(moved.apply(0), Some(0));
    assert_eq!(moved.apply(5), Some(5));

    let ops = [
        UpdateOp::Add { start: 0, count: 2 },
        UpdateOp::Remove { start: 3, count: 1 },
    ];
    assert_eq!(translate_position(&ops, 0), Some(2));
    assert_eq!(translate_position(&ops, 1), None);
    assert_eq!(translate_position(&ops, 4), Some(5));
    assert_eq!(count_before(&ops, 21), 20);

    let update = UpdateOp::Update { start: 2, count: 2 };
    assert!(update.updates(3));
    assert!(!update.updates(4));
    assert_eq!(update.count_delta(), 0);
}

#[test]
fn warm_cache_reuses_bound_holders_and_evicts_oldest() {
    let mut pool = HolderPool::new(ListAdapter::uniform(20, 100), PoolOptions::default());
    let ids: Vec<HolderId> = (0..3)
        .map(|p| {
            pool.node_for_position(p, Deadline::Unbounded)
                .expect("item exists")
        })
        .collect();
    assert_eq!(pool.created_count(), 3);
    for &id in &ids {
        pool.recycle(id);
    }
    assert_eq!(pool.warm_cache(), &[ids[1], ids[2]]);
    assert_eq!(pool.recycled_count(0), 1);

    assert_eq!(pool.node_for_position(2, Deadline::Unbounded), Some(ids[2]));
    assert_eq!(pool.adapter().bound.len(), 3);

    let reused = pool
        .node_for_position(7, Deadline::Unbounded)
        .expect("item exists");
    assert_eq!(reused, ids[0]);
    assert_eq!(pool.holder(reused).and_then(|h| h.position), Some(7));
    assert_eq!(pool.adapter().bound, vec![0, 1, 2, 7]);
    assert_eq!(pool.created_count(), 3);
    assert_eq!(pool.node_for_position(20, Deadline::Unbounded), None);
}

#[test]
fn cold_pool_drops_holders_past_its_limit() {
    let options = PoolOptions::default()
        .with_warm_cache_size(0)
        .with_max_recycled_per_type(1);
    let mut pool = HolderPool::new(ListAdapter::uniform(10, 100), options);
    let a = pool.node_for_position(0, Deadline::Unbounded).expect("item exists");
    let b = pool.node_for_position(1, Deadline::Unbounded).expect("item exists");
    pool.recycle(a);
    pool.recycle(b);

    assert!(pool.warm_cache().is_empty());
    assert_eq!(pool.recycled_count(0), 1);
    assert_eq!(pool.live_count(), 1);
    assert_eq!(pool.adapter().destroyed, 1);
    assert!(!pool.holder(a).expect("kept").bound);

    pool.set_max_recycled(0, 0);
    assert_eq!(pool.recycled_count(0), 0);
    assert_eq!(pool.live_count(), 0);
}

#[test]
fn warm_holders_follow_structural_changes() {
    let mut pool = HolderPool::new(ListAdapter::uniform(10, 100), PoolOptions::default());
    let five = pool.node_for_position(5, Deadline::Unbounded).expect("item exists");
    let six = pool.node_for_position(6, Deadline::Unbounded).expect("item exists");
    pool.recycle(five);
    pool.recycle(six);

    pool.apply_update(&UpdateOp::Add { start: 0, count: 2 });
    assert_eq!(pool.holder(five).and_then(|h| h.position), Some(7));
    assert_eq!(pool.holder(six).and_then(|h| h.position), Some(8));

    pool.apply_update(&UpdateOp::Update { start: 8, count: 1 });
    assert_eq!(pool.warm_cache(), &[five]);
    assert_eq!(pool.recycled_count(0), 1);

    pool.apply_update(&UpdateOp::Remove { start: 7, count: 1 });
    assert!(pool.warm_cache().is_empty());
    assert_eq!(pool.recycled_count(0), 2);
}

#[test]
fn pre_layout_positions_are_translated_before_binding() {
    let mut pool = HolderPool::new(ListAdapter::uniform(9, 100), PoolOptions::default());
    pool.set_pre_layout_ops(&[UpdateOp::Remove { start: 2, count: 1 }]);

    let id = pool.node_for_position(5, Deadline::Unbounded).expect("item exists");
    let h = pool.holder(id).expect("live holder");
    assert_eq!(h.position, Some(4));
    assert_eq!(h.layout_position(), Some(5));
    assert_eq!(pool.node_for_position(2, Deadline::Unbounded), None);

    pool.clear_pre_layout_ops();
    assert!(pool.node_for_position(2, Deadline::Unbounded).is_some());
}

#[test]
fn deadlines_refuse_work_that_does_not_fit() {
    let ticks = AtomicU64::new(0);
    let options = PoolOptions::default().with_warm_cache_size(0);
    let mut pool = HolderPool::new(ListAdapter::uniform(10, 100), options)
        .with_clock(move || ticks.fetch_add(10, Ordering::Relaxed));

    let first = pool.node_for_position(0, Deadline::Unbounded).expect("item exists");
    assert_eq!(pool.cost_estimates(0), (10, 10));

    assert_eq!(pool.node_for_position(1, Deadline::At(0)), None);
    assert_eq!(pool.created_count(), 1);

    pool.recycle(first);
    assert_eq!(pool.recycled_count(0), 1);
    assert_eq!(pool.node_for_position(1, Deadline::At(0)), None);
    assert_eq!(pool.recycled_count(0), 1);
    assert_eq!(pool.adapter().bound, vec![0]);

    assert!(pool.node_for_position(1, Deadline::At(u64::MAX)).is_some());
    assert_eq!(pool.adapter().bound, vec![0, 1]);
}

#[test]
fn controller_lays_out_and_scrolls_through_the_warm_cache() {
    let mut c = list(1, ListAdapter::uniform(20, 100));
    assert!(c.needs_layout());
    assert!(c.dispatch_layout().is_empty());
    assert!(!c.needs_layout());
    assert_eq!(c.visible_positions(), range(0, 4));
    assert_eq!(c.pool().created_count(), 5);

    assert_eq!(c.scroll_by(150), 150);
    assert_eq!(c.visible_positions(), range(1, 6));
    assert_eq!(c.pool().created_count(), 7);
    assert_eq!(c.pool().warm_cache().len(), 1);

    assert_eq!(c.scroll_by(-150), -150);
    assert_eq!(c.visible_positions(), range(0, 4));
    assert_eq!(c.adapter().bound.len(), 7);
    assert_eq!(c.pool().warm_cache().len(), 2);
    assert_eq!(top_of(&c, 0), 0);
    assert_eq!(c.find_first_visible_position(), Some(0));
    assert_eq!(c.find_last_visible_position(), Some(4));
}

#[test]
fn removal_keeps_the_removed_holder_for_its_exit_animation() {
    let mut c = list(1, ListAdapter::uniform(20, 100));
    c.dispatch_layout();
    let removed = c.children().child_at(2).expect("attached");

    c.pool_mut().adapter_mut().heights.remove(2);
    c.notify_item_range_removed(2, 1);
    assert_eq!(c.pending_updates(), &[UpdateOp::Remove { start: 2, count: 1 }]);
    assert!(c.needs_layout());

    let counts = count(c.dispatch_layout());
    assert_eq!(counts.persistent, 4);
    assert_eq!(counts.disappeared, 1);
    assert_eq!(counts.appeared_after_pre_layout, 1);
    assert_eq!(c.changes().len(), 6);

    assert_eq!(c.visible_positions(), range(0, 4));
    assert_eq!(top_of(&c, 2), 200);
    assert_eq!(top_of(&c, 4), 400);
    assert_eq!(c.animating(), &[removed]);
    assert!(c.children().is_hidden(removed));
    assert!(c.pending_updates().is_empty());

    assert!(c.end_animation(removed));
    assert!(!c.end_animation(removed));
    assert_eq!(c.children().count_physical(), 5);
    assert_eq!(c.pool().recycled_count(0), 1);
}

#[test]
fn insertion_animates_the_item_pushed_out_of_view() {
    let mut c = list(1, ListAdapter::uniform(20, 100));
    c.dispatch_layout();
    let pushed = c.children().child_at(4).expect("attached");

    c.pool_mut().adapter_mut().heights.insert(2, 100);
    c.notify_item_range_inserted(2, 1);
    assert_eq!(c.holder(pushed).and_then(|h| h.position), Some(5));
    assert_eq!(c.holder(pushed).and_then(ItemHolder::layout_position), Some(4));

    let counts = count(c.dispatch_layout());
    assert_eq!(counts.persistent, 4);
    assert_eq!(counts.appeared_new, 1);
    assert_eq!(counts.disappearing, 1);

    assert_eq!(c.visible_positions(), range(0, 4));
    assert_eq!(c.adapter().bound.len(), 6);
    assert_eq!(c.animating(), &[pushed]);
    assert_eq!(c.holder(pushed).expect("live holder").bounds.top, 500);

    c.end_animations();
    assert!(c.animating().is_empty());
    assert_eq!(c.pool().warm_cache(), &[pushed]);
}

#[test]
fn changed_items_are_rebound_in_place() {
    let mut c = list(1, ListAdapter::uniform(20, 100));
    c.dispatch_layout();
    let changed = c.children().child_at(1).expect("attached");

    c.notify_item_range_changed(1, 1);
    let counts = count(c.dispatch_layout());
    assert_eq!(counts.persistent, 5);
    assert_eq!(counts.unused, 1);

    assert_eq!(c.children().child_at(1), Some(changed));
    assert_eq!(c.visible_positions(), range(0, 4));
    assert_eq!(c.children().count_physical(), 5);
    assert!(c.animating().is_empty());
    assert!(!c.holder(changed).expect("live holder").changed);
    assert_eq!(c.adapter().bound.iter().filter(|&&p| p == 1).count(), 2);
}

#[test]
fn data_set_change_rebinds_without_animating() {
    let mut c = list(1, ListAdapter::uniform(20, 100));
    c.dispatch_layout();

    c.notify_data_set_changed();
    assert!(c.needs_layout());
    assert!(c.dispatch_layout().is_empty());

    assert_eq!(c.visible_positions(), range(0, 4));
    assert_eq!(c.pool().created_count(), 5);
    assert_eq!(c.adapter().bound.len(), 10);
}

#[test]
fn scrolling_lays_out_pending_changes_first() {
    let mut c = list(1, ListAdapter::uniform(20, 100));
    c.dispatch_layout();

    c.pool_mut().adapter_mut().heights.remove(0);
    c.notify_item_range_removed(0, 1);
    assert_eq!(c.scroll_by(50), 50);
    assert!(c.pending_updates().is_empty());
    c.end_animations();
    assert_eq!(c.visible_positions(), range(0, 5));
}

#[test]
fn saved_anchor_survives_a_new_controller() {
    let mut c = list(1, ListAdapter::uniform(20, 100));
    c.dispatch_layout();
    c.scroll_by(230);
    let anchor = c.save_anchor().expect("has children");

    let mut restored = list(2, ListAdapter::uniform(20, 100));
    restored.restore_anchor(anchor);
    restored.dispatch_layout();
    assert_eq!(restored.visible_positions(), c.visible_positions());
    assert_eq!(top_of(&restored, 2), top_of(&c, 2));
}

#[test]
fn scroll_to_position_requests_a_layout() {
    let mut c = list(1, ListAdapter::uniform(20, 100));
    c.dispatch_layout();
    c.scroll_to_position_with_offset(10, 0);
    assert!(c.needs_layout());
    c.dispatch_layout();
    assert_eq!(c.visible_positions(), range(10, 14));
}

struct Host {
    controllers: Vec<ListController>,
}

impl ViewportRegistry for Host {
    fn viewport_mut(&mut self, id: ViewportId) -> Option<&mut dyn PrefetchTarget> {
        self.controllers
            .iter_mut()
            .find(|c| c.id() == id)
            .map(|c| c as &mut dyn PrefetchTarget)
    }
}

#[test]
fn prefetched_item_is_reused_without_rebinding() {
    let mut adapter = ListAdapter::uniform(20, 100);
    adapter.nested_at = Some((6, ViewportId(2)));
    let mut outer = list(1, adapter);
    outer.dispatch_layout();
    outer.scroll_by(30);
    let inner = list(2, ListAdapter::uniform(10, 50));
    let mut host = Host {
        controllers: vec![outer, inner],
    };

    let mut scheduler = PrefetchScheduler::new(PrefetchOptions::default());
    scheduler.attach(ViewportId(1));
    scheduler.post_from_traversal(ViewportId(1), 0, 40, 0);
    let produced = scheduler.prefetch(&mut host, u64::MAX, &mut || 0u64);
    assert_eq!(produced, 3);

    let inner = &host.controllers[1];
    assert_eq!(inner.adapter().bound, vec![0, 1]);
    assert_eq!(inner.pool().warm_cache().len(), 2);
    assert_eq!(inner.pool().warm_cache_capacity(), 4);

    let outer = &mut host.controllers[0];
    assert_eq!(outer.adapter().bound.len(), 7);
    assert_eq!(outer.pool().warm_cache_capacity(), 3);
    assert!(!outer.is_position_attached(6));

    outer.scroll_by(100);
    assert_eq!(outer.visible_positions(), range(1, 6));
    assert_eq!(outer.adapter().bound.len(), 7);
    assert!(outer.is_position_attached(6));
}

#[test]
fn hidden_and_stale_controllers_are_not_prefetched() {
    let mut outer = list(1, ListAdapter::uniform(20, 100));
    outer.dispatch_layout();
    outer.set_visible(false);
    let mut stale = list(2, ListAdapter::uniform(20, 100));
    stale.dispatch_layout();
    stale.notify_item_range_changed(0, 1);
    let mut host = Host {
        controllers: vec![outer, stale],
    };

    let mut scheduler = PrefetchScheduler::new(PrefetchOptions::default());
    scheduler.attach(ViewportId(1));
    scheduler.attach(ViewportId(2));
    scheduler.post_from_traversal(ViewportId(1), 0, 40, 0);
    scheduler.post_from_traversal(ViewportId(2), 0, 40, 0);
    assert_eq!(scheduler.run(&mut host, 0, &mut || 0u64), 0);
    assert!(host.controllers.iter().all(|c| c.pool().warm_cache().is_empty()));
}
