use crate::*;

use alloc::vec;
use alloc::vec::Vec;

#[derive(Clone, Copy, Debug)]
struct Lcg(u64);

impl Lcg {
    fn new(seed: u64) -> Self {
        Self(seed)
    }

    fn next_u64(&mut self) -> u64 {
        // Deterministic, dependency-free PRNG for tests.
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0
    }

    fn gen_range_usize(&mut self, start: usize, end_exclusive: usize) -> usize {
        debug_assert!(start < end_exclusive);
        start + (self.next_u64() % (end_exclusive - start) as u64) as usize
    }

    fn gen_bool(&mut self) -> bool {
        (self.next_u64() & 1) == 1
    }
}

/// Arena pool whose nodes measure to a fixed main-axis size per position.
#[derive(Default)]
struct TestPool {
    holders: Vec<ItemHolder>,
    free: Vec<HolderId>,
    sizes: Vec<i32>,
    full_span: Vec<usize>,
    created: usize,
    recycled: usize,
}

impl TestPool {
    fn new(sizes: Vec<i32>) -> Self {
        Self {
            sizes,
            ..Self::default()
        }
    }
}

impl RecyclePool for TestPool {
    fn node_for_position(&mut self, position: usize, _deadline: Deadline) -> Option<HolderId> {
        if position >= self.sizes.len() {
            return None;
        }
        let id = match self.free.pop() {
            Some(id) => id,
            None => {
                self.holders.push(ItemHolder::new(0));
                self.created += 1;
                HolderId((self.holders.len() - 1) as u32)
            }
        };
        let full_span = self.full_span.contains(&position);
        let h = &mut self.holders[id.index()];
        h.position = Some(position);
        h.bound = true;
        h.full_span = full_span;
        Some(id)
    }

    fn recycle(&mut self, holder: HolderId) {
        if let Some(h) = self.holders.get_mut(holder.index()) {
            h.reset_for_pool();
            self.free.push(holder);
            self.recycled += 1;
        }
    }

    fn add_to_pool(&mut self, holder: HolderId, _allow_warm_cache: bool) {
        self.recycle(holder);
    }

    fn holder(&self, holder: HolderId) -> Option<&ItemHolder> {
        self.holders.get(holder.index())
    }

    fn holder_mut(&mut self, holder: HolderId) -> Option<&mut ItemHolder> {
        self.holders.get_mut(holder.index())
    }

    fn measure(&mut self, holder: HolderId, spec: MeasureSpec) -> Size {
        let main = self
            .holder(holder)
            .and_then(ItemHolder::layout_position)
            .and_then(|p| self.sizes.get(p).copied())
            .unwrap_or(0);
        Size::new(spec.width, main)
    }
}

/// Host side of a vertical viewport: attached children, pool and scrap.
struct Harness {
    children: VisibleIndexMap,
    pool: TestPool,
    scrap: Vec<HolderId>,
    geometry: ViewportGeometry,
}

impl Harness {
    fn new(width: i32, height: i32, sizes: Vec<i32>) -> Self {
        Self {
            children: VisibleIndexMap::new(),
            pool: TestPool::new(sizes),
            scrap: Vec::new(),
            geometry: ViewportGeometry::new(width, height),
        }
    }

    fn ctx(&mut self) -> LayoutContext<'_> {
        let pass = LayoutPass::new(self.pool.sizes.len());
        LayoutContext::new(
            &mut self.children,
            &mut self.pool,
            &mut self.scrap,
            self.geometry,
            pass,
        )
    }

    fn layout(&mut self, engine: &mut dyn LayoutEngine) {
        let mut ctx = self.ctx();
        engine.on_layout_children(&mut ctx);
        ctx.recycle_scrap();
        engine.on_layout_completed();
    }

    fn scroll(&mut self, engine: &mut dyn LayoutEngine, delta: i32) -> i32 {
        let mut ctx = self.ctx();
        engine.scroll_by(&mut ctx, delta)
    }

    fn positions(&self) -> Vec<usize> {
        (0..self.children.count_logical())
            .filter_map(|i| self.children.child_at(i))
            .filter_map(|id| self.pool.holder(id).and_then(ItemHolder::layout_position))
            .collect()
    }

    fn holder_at(&self, position: usize) -> &ItemHolder {
        (0..self.children.count_logical())
            .filter_map(|i| self.children.child_at(i))
            .filter_map(|id| self.pool.holder(id))
            .find(|h| h.layout_position() == Some(position))
            .expect("position is attached")
    }

    /// Bottom edge of each staggered lane, derived from attached children.
    fn lane_ends(&self, span_count: usize) -> Vec<i32> {
        let mut ends = vec![0; span_count];
        for i in 0..self.children.count_logical() {
            let Some(h) = self.children.child_at(i).and_then(|id| self.pool.holder(id)) else {
                continue;
            };
            if h.full_span {
                for end in ends.iter_mut() {
                    *end = (*end).max(h.bounds.bottom);
                }
            } else if let Some(span) = h.span {
                ends[span] = ends[span].max(h.bounds.bottom);
            }
        }
        ends
    }

    /// Top edge of each staggered lane, derived from attached children.
    fn lane_starts(&self, span_count: usize) -> Vec<i32> {
        let mut starts = vec![i32::MAX; span_count];
        for i in 0..self.children.count_logical() {
            let Some(h) = self.children.child_at(i).and_then(|id| self.pool.holder(id)) else {
                continue;
            };
            if let Some(span) = h.span.filter(|_| !h.full_span) {
                starts[span] = starts[span].min(h.bounds.top);
            }
        }
        starts
    }
}

/// Forwards to `ItemChunk`, recording the extent of every chunk laid out.
struct RecordingChunk {
    inner: ItemChunk,
    extents: Vec<i32>,
}

impl ChunkLayout for RecordingChunk {
    fn layout_chunk(
        &mut self,
        ctx: &mut LayoutContext<'_>,
        env: &FillEnv,
        state: &mut FillState,
        result: &mut ChunkResult,
    ) {
        assert!(
            state.available + state.extra_fill_space > 0,
            "chunk started with budget {} + {}",
            state.available,
            state.extra_fill_space
        );
        self.inner.layout_chunk(ctx, env, state, result);
        if !result.finished {
            self.extents.push(result.consumed);
        }
    }
}

fn range(start: usize, end_inclusive: usize) -> Vec<usize> {
    (start..=end_inclusive).collect()
}

#[test]
fn index_map_skips_hidden_slots() {
    let mut map = VisibleIndexMap::new();
    for i in 0..10 {
        map.insert(HolderId(i), None, false);
    }
    map.hide(HolderId(2));
    map.hide(HolderId(5));

    assert_eq!(map.count_physical(), 10);
    assert_eq!(map.count_logical(), 8);
    assert_eq!(map.hidden_count(), 2);
    let physical: Vec<usize> = (0..8).filter_map(|i| map.logical_to_physical(i)).collect();
    assert_eq!(physical, vec![0, 1, 3, 4, 6, 7, 8, 9]);
    assert_eq!(map.logical_to_physical(4), Some(6));
    assert_eq!(map.logical_to_physical(8), None);
    assert_eq!(map.physical_to_logical(2), None);
    assert_eq!(map.physical_to_logical(3), Some(2));
    assert_eq!(map.physical_to_logical(6), Some(4));
    assert_eq!(map.child_at(2), Some(HolderId(3)));
    assert_eq!(map.index_of(HolderId(5)), None);
    assert!(map.verify().is_ok());
}

#[test]
fn index_map_hide_unhide_round_trip() {
    let mut map = VisibleIndexMap::new();
    for i in 0..5 {
        map.add(HolderId(i), None, false);
    }
    map.hide(HolderId(1));
    map.hide(HolderId(3));
    map.unhide(HolderId(1));
    assert_eq!(map.hidden(), &[HolderId(3)]);
    map.unhide(HolderId(3));
    assert_eq!(map.hidden_count(), 0);
    let logical: Vec<HolderId> = (0..5).filter_map(|i| map.child_at(i)).collect();
    assert_eq!(logical, map.physical().to_vec());
    assert!(map.verify().is_ok());

    // Adding before a logical index lands before the visible node at that index.
    map.hide(HolderId(0));
    map.add(HolderId(9), Some(0), false);
    assert_eq!(map.physical_at(0), Some(HolderId(0)));
    assert_eq!(map.physical_at(1), Some(HolderId(9)));
    assert_eq!(map.child_at(0), Some(HolderId(9)));
    assert!(map.remove_if_hidden(HolderId(0)));
    assert!(!map.remove_if_hidden(HolderId(9)));
    assert!(map.verify().is_ok());
}

#[test]
fn index_map_random_ops_keep_translation_consistent() {
    let mut rng = Lcg::new(0xC0FFEE);
    let mut map = VisibleIndexMap::new();
    let mut next_id = 0u32;
    for _ in 0..400 {
        match rng.gen_range_usize(0, 4) {
            0 | 1 => {
                let physical = if map.count_physical() == 0 || rng.gen_bool() {
                    None
                } else {
                    Some(rng.gen_range_usize(0, map.count_physical()))
                };
                let hidden = rng.next_u64() % 5 == 0;
                map.insert(HolderId(next_id), physical, hidden);
                next_id += 1;
            }
            2 if map.count_physical() > 0 => {
                let p = rng.gen_range_usize(0, map.count_physical());
                map.remove_physical(p);
            }
            _ if map.count_physical() > 0 => {
                let p = rng.gen_range_usize(0, map.count_physical());
                let Some(node) = map.physical_at(p) else {
                    continue;
                };
                if map.is_hidden(node) {
                    map.unhide(node);
                } else {
                    map.hide(node);
                }
            }
            _ => {}
        }

        assert!(map.verify().is_ok());
        assert_eq!(map.count_logical() + map.hidden_count(), map.count_physical());
        let mut logical = 0;
        for p in 0..map.count_physical() {
            let node = map.physical_at(p).unwrap();
            if map.is_hidden(node) {
                assert_eq!(map.physical_to_logical(p), None);
            } else {
                assert_eq!(map.physical_to_logical(p), Some(logical));
                assert_eq!(map.logical_to_physical(logical), Some(p));
                logical += 1;
            }
        }
        assert_eq!(logical, map.count_logical());
    }
}

#[test]
fn linear_initial_layout_fills_viewport_exactly() {
    let mut h = Harness::new(300, 500, vec![100; 20]);
    let mut layout = LinearLayout::new(LinearOptions::default());
    h.layout(&mut layout);

    assert_eq!(h.positions(), range(0, 4));
    assert_eq!(h.holder_at(0).bounds, NodeBounds::new(0, 0, 300, 100));
    assert_eq!(h.holder_at(4).bounds, NodeBounds::new(0, 400, 300, 500));
    assert!(h.scrap.is_empty());
    // Outside scrolling nothing is tracked as recyclable.
    assert_eq!(layout.fill_state().scrolling_offset, None);
    // The last child ends on the viewport edge, so a single pixel needs a new node.
    assert_eq!(h.scroll(&mut layout, 1), 1);
    assert_eq!(h.positions(), range(0, 5));
}

#[test]
fn fill_stops_once_budget_is_spent() {
    let mut rng = Lcg::new(0xF111_B0D6);
    for _ in 0..200 {
        let count = rng.gen_range_usize(1, 40);
        let sizes: Vec<i32> = (0..count).map(|_| rng.gen_range_usize(1, 150) as i32).collect();
        let mut h = Harness::new(300, 500, sizes);
        let available = rng.gen_range_usize(0, 1200) as i32;
        let extra = rng.gen_range_usize(0, 300) as i32;
        let towards_end = rng.gen_bool();
        let env = FillEnv::new(Orientation::Vertical, h.geometry, false);
        let mut state = FillState {
            recycle: false,
            available,
            extra_fill_space: extra,
            current_position: rng.gen_range_usize(0, count) as isize,
            ..FillState::default()
        };
        if !towards_end {
            state.offset = 500;
            state.layout_direction = LayoutDirection::Start;
            state.item_direction = ItemDirection::Head;
        }
        let mut chunk = RecordingChunk {
            inner: ItemChunk,
            extents: Vec::new(),
        };
        let consumed = {
            let mut ctx = h.ctx();
            fill(&mut chunk, &mut ctx, &env, &mut state, false)
        };

        assert_eq!(consumed, chunk.extents.iter().sum::<i32>());
        assert_eq!(h.children.count_logical(), chunk.extents.len());
        let budget = available + extra;
        if let Some(&last) = chunk.extents.last() {
            assert!(consumed - last < budget);
            assert!(consumed <= budget + last);
        } else {
            assert_eq!(budget, 0);
        }
        if state.has_more(count) {
            assert!(consumed >= budget);
        }
    }
}

#[test]
fn linear_scroll_recycles_and_clamps() {
    let mut h = Harness::new(300, 500, vec![100; 20]);
    let mut layout = LinearLayout::new(LinearOptions::default());
    h.layout(&mut layout);

    assert_eq!(h.scroll(&mut layout, 0), 0);
    assert_eq!(h.positions(), range(0, 4));

    assert_eq!(h.scroll(&mut layout, 150), 150);
    assert_eq!(h.positions(), range(1, 6));
    assert_eq!(h.holder_at(1).bounds.top, -50);
    assert_eq!(h.holder_at(6).bounds.bottom, 550);

    // Content is 2000 px tall: only 1350 px are left.
    assert_eq!(h.scroll(&mut layout, 10_000), 1350);
    assert_eq!(h.positions(), range(15, 19));
    assert_eq!(h.holder_at(19).bounds.bottom, 500);

    assert_eq!(h.scroll(&mut layout, 100), 0);
    assert_eq!(h.scroll(&mut layout, -10_000), -1500);
    assert_eq!(h.positions(), range(0, 4));
    assert_eq!(h.holder_at(0).bounds.top, 0);
}

#[test]
fn linear_fill_never_attaches_offscreen_nodes() {
    let mut rng = Lcg::new(42);
    let sizes: Vec<i32> = (0..200).map(|_| rng.gen_range_usize(20, 160) as i32).collect();
    let mut h = Harness::new(300, 600, sizes);
    let mut layout = LinearLayout::new(LinearOptions::default());
    h.layout(&mut layout);

    for _ in 0..60 {
        let delta = rng.gen_range_usize(0, 700) as i32 - 350;
        h.scroll(&mut layout, delta);
        let positions = h.positions();
        assert!(!positions.is_empty());
        assert!(positions.windows(2).all(|w| w[1] == w[0] + 1));
        for &p in &positions {
            let b = h.holder_at(p).bounds;
            assert!(b.bottom > 0 && b.top < 600, "position {p} at {b:?} is off screen");
        }
    }
    assert_eq!(h.pool.created, h.pool.holders.len());
    assert!(h.pool.recycled > 0);
}

#[test]
fn linear_scroll_to_position_with_offset() {
    let mut h = Harness::new(300, 500, vec![100; 20]);
    let mut layout = LinearLayout::new(LinearOptions::default());
    h.layout(&mut layout);

    layout.scroll_to_position_with_offset(10, 0);
    assert!(layout.take_layout_request());
    h.layout(&mut layout);
    assert_eq!(h.positions(), range(10, 14));
    assert_eq!(h.holder_at(10).bounds.top, 0);

    // The last items cannot be aligned to the top; the end gap is closed instead.
    layout.scroll_to_position_with_offset(18, 0);
    h.layout(&mut layout);
    assert_eq!(h.positions(), range(15, 19));
    assert_eq!(h.holder_at(19).bounds.bottom, 500);
}

#[test]
fn linear_saved_anchor_restores_offset() {
    let mut h = Harness::new(300, 500, vec![100; 20]);
    let mut layout = LinearLayout::new(LinearOptions::default());
    h.layout(&mut layout);
    h.scroll(&mut layout, 330);

    let saved = {
        let ctx = h.ctx();
        layout.save_state(&ctx)
    };
    assert_eq!(saved, Some(SavedAnchor::new(3, -30, false)));

    let mut other = Harness::new(300, 500, vec![100; 20]);
    let mut restored = LinearLayout::new(LinearOptions::default());
    restored.restore_state(saved.unwrap());
    other.layout(&mut restored);
    assert_eq!(other.positions(), h.positions());
    assert_eq!(other.holder_at(3).bounds.top, -30);
}

#[test]
fn linear_prefetch_reports_next_item() {
    let mut h = Harness::new(300, 500, vec![100; 20]);
    let mut layout = LinearLayout::new(LinearOptions::default());
    h.layout(&mut layout);
    h.scroll(&mut layout, 30);

    let mut registry = PrefetchRegistry::new();
    registry.begin(20);
    {
        let ctx = h.ctx();
        layout.collect_adjacent_prefetch_positions(&ctx, 0, 40, &mut registry);
    }
    assert_eq!(registry.positions(), &[(6, 70)]);

    registry.begin(20);
    LinearLayout::new(LinearOptions::default().with_initial_prefetch_item_count(3))
        .collect_initial_prefetch_positions(20, &mut registry);
    assert_eq!(registry.positions(), &[(0, 0), (1, 0), (2, 0)]);
}

#[test]
fn zero_size_viewport_lays_out_nothing() {
    let mut h = Harness::new(300, 0, vec![100; 20]);
    let mut layout = LinearLayout::new(LinearOptions::default());
    h.layout(&mut layout);
    assert!(h.positions().is_empty());
    assert_eq!(h.scroll(&mut layout, 50), 0);
}

#[test]
fn grid_lays_out_rows_of_cells() {
    let mut h = Harness::new(300, 250, vec![100; 10]);
    let mut grid = GridLayout::grid(LinearOptions::default(), 3).unwrap();
    h.layout(&mut grid);

    assert_eq!(h.positions(), range(0, 8));
    assert_eq!(h.holder_at(4).bounds, NodeBounds::new(100, 100, 200, 200));
    assert_eq!(h.holder_at(6).bounds, NodeBounds::new(0, 200, 100, 300));
    assert_eq!(h.holder_at(8).grid_span_index, 2);
}

#[test]
fn span_count_must_be_positive() {
    assert_eq!(
        GridLayout::grid(LinearOptions::default(), 0).err(),
        Some(LayoutError::InvalidArgument("span count must be at least 1"))
    );
    let mut grid = GridLayout::grid(LinearOptions::default(), 2).unwrap();
    assert!(grid.set_span_count(0).is_err());
    assert_eq!(grid.span_count(), 2);

    assert!(matches!(
        StaggeredLayout::new(StaggeredOptions::new(0, Orientation::Vertical)),
        Err(LayoutError::InvalidArgument(_))
    ));
    let mut staggered = StaggeredLayout::new(StaggeredOptions::default()).unwrap();
    assert!(staggered.set_span_count(0).is_err());
    assert!(staggered.set_span_count(3).is_ok());
    assert_eq!(staggered.span_count(), 3);
    assert!(staggered.take_layout_request());
}

#[test]
fn staggered_assigns_items_to_shortest_lane() {
    let mut h = Harness::new(200, 1000, vec![100, 50, 100, 50]);
    let mut layout = StaggeredLayout::new(StaggeredOptions::new(2, Orientation::Vertical)).unwrap();
    h.layout(&mut layout);

    assert_eq!(h.positions(), range(0, 3));
    assert_eq!(h.lane_ends(2), vec![150, 150]);
    let lanes: Vec<Option<usize>> = (0..4).map(|p| layout.span_lookup().span(p)).collect();
    assert_eq!(lanes, vec![Some(0), Some(1), Some(1), Some(0)]);
    assert_eq!(h.holder_at(2).bounds, NodeBounds::new(100, 50, 200, 150));
    assert_eq!(layout.size_per_span(), 100);
}

#[test]
fn staggered_gap_repair_is_idempotent_on_aligned_layout() {
    let mut h = Harness::new(200, 1000, vec![100, 50, 100, 50]);
    let mut layout = StaggeredLayout::new(StaggeredOptions::new(2, Orientation::Vertical)).unwrap();
    h.layout(&mut layout);
    let lookup = layout.span_lookup().clone();

    let passes = {
        let mut ctx = h.ctx();
        layout.repair_gaps(&mut ctx)
    };
    assert_eq!(passes, Ok(0));
    assert_eq!(layout.span_lookup(), &lookup);
    {
        let ctx = h.ctx();
        layout.on_scroll_state_changed(&ctx, ScrollState::Idle);
    }
    assert!(!layout.take_layout_request());
    assert_eq!(h.lane_ends(2), vec![150, 150]);
}

#[test]
fn staggered_repairs_gap_after_scrolling_back_to_top() {
    let mut rng = Lcg::new(0x6A95);
    let sizes: Vec<i32> = (0..300).map(|_| rng.gen_range_usize(30, 200) as i32).collect();
    let mut h = Harness::new(300, 600, sizes);
    let mut layout = StaggeredLayout::new(StaggeredOptions::new(3, Orientation::Vertical)).unwrap();
    h.layout(&mut layout);
    assert_eq!(h.lane_starts(3), vec![0, 0, 0]);

    for _ in 0..20 {
        assert_eq!(h.scroll(&mut layout, 300), 300);
    }
    layout.invalidate_span_assignments();
    assert!(layout.take_layout_request());
    // Walking back up reassigns lanes with no memory of the original placement.
    for _ in 0..25 {
        h.scroll(&mut layout, -300);
    }
    assert!(h.positions().contains(&0));
    let tops = h.lane_starts(3);
    assert!(tops.iter().any(|&top| top != tops[0]), "lanes aligned: {tops:?}");

    {
        let ctx = h.ctx();
        layout.on_scroll_state_changed(&ctx, ScrollState::Idle);
    }
    assert!(layout.take_layout_request());
    h.layout(&mut layout);
    assert_eq!(h.lane_starts(3), vec![0, 0, 0]);
    let passes = {
        let mut ctx = h.ctx();
        layout.repair_gaps(&mut ctx)
    };
    assert_eq!(passes, Ok(0));
    assert!(!layout.take_layout_request());
}

#[test]
fn staggered_scroll_recycles_per_lane() {
    let mut h = Harness::new(200, 300, vec![100; 20]);
    let mut layout = StaggeredLayout::new(StaggeredOptions::new(2, Orientation::Vertical)).unwrap();
    h.layout(&mut layout);
    assert_eq!(h.positions(), range(0, 5));

    assert_eq!(h.scroll(&mut layout, 0), 0);
    assert_eq!(h.scroll(&mut layout, -100), 0);

    assert_eq!(h.scroll(&mut layout, 150), 150);
    assert_eq!(h.positions(), range(2, 9));
    assert_eq!(h.holder_at(2).bounds.top, -50);
    {
        let ctx = h.ctx();
        assert_eq!(layout.find_first_visible_position(&ctx), Some(2));
        assert_eq!(layout.find_first_visible_item_positions(&ctx), vec![Some(2), Some(3)]);
        assert_eq!(
            layout.find_first_completely_visible_item_positions(&ctx),
            vec![Some(4), Some(5)]
        );
    }

    let mut registry = PrefetchRegistry::new();
    registry.begin(20);
    {
        let ctx = h.ctx();
        layout.collect_adjacent_prefetch_positions(&ctx, 0, 50, &mut registry);
    }
    assert_eq!(registry.positions(), &[(10, 50), (11, 50)]);
}

#[test]
fn staggered_full_span_item_crosses_every_lane() {
    let mut h = Harness::new(200, 1000, vec![100, 50, 80, 60, 40]);
    h.pool.full_span.push(2);
    let mut layout = StaggeredLayout::new(StaggeredOptions::new(2, Orientation::Vertical)).unwrap();
    h.layout(&mut layout);

    let full = h.holder_at(2);
    assert_eq!(full.bounds, NodeBounds::new(0, 100, 200, 180));
    assert_eq!(full.span, Some(0));
    let item = layout.span_lookup().full_span_item(2).unwrap();
    assert_eq!(item.gap_dir, Some(LayoutDirection::Start));
    assert_eq!(item.gap_per_span, vec![0, 50]);
    assert_eq!(h.holder_at(3).bounds.top, 180);
    assert_eq!(h.holder_at(4).bounds.top, 180);
    assert_eq!(h.lane_ends(2), vec![240, 220]);
}

#[test]
fn span_lookup_shifts_with_structural_changes() {
    let mut lookup = LazySpanLookup::new();
    for (p, s) in [(0, 0), (1, 1), (2, 0), (3, 1)] {
        lookup.set_span(p, s);
    }

    lookup.offset_for_addition(2, 3);
    let spans: Vec<Option<usize>> = (0..7).map(|p| lookup.span(p)).collect();
    assert_eq!(spans, vec![Some(0), Some(1), None, None, None, Some(0), Some(1)]);

    lookup.offset_for_removal(0, 1);
    assert_eq!(lookup.span(0), Some(1));
    assert_eq!(lookup.span(4), Some(0));
    assert_eq!(lookup.span(5), Some(1));

    lookup.add_full_span_item(FullSpanItem {
        position: 4,
        gap_dir: Some(LayoutDirection::Start),
        gap_per_span: vec![0, 10],
        has_unwanted_gap_after: false,
    });
    lookup.offset_for_addition(1, 2);
    assert!(lookup.full_span_item(6).is_some());
    lookup.offset_for_removal(5, 2);
    assert!(lookup.full_span_items().is_empty());
}

#[test]
fn span_lookup_invalidates_up_to_next_full_span_item() {
    let mut lookup = LazySpanLookup::new();
    for p in 0..10 {
        lookup.set_span(p, p % 2);
    }
    lookup.add_full_span_item(FullSpanItem {
        position: 6,
        ..FullSpanItem::default()
    });

    assert_eq!(lookup.invalidate_after(3), Some(7));
    assert_eq!(lookup.span(2), Some(0));
    assert!((3..7).all(|p| lookup.span(p).is_none()));
    assert_eq!(lookup.span(7), Some(1));
    assert!(lookup.full_span_item(6).is_none());

    assert_eq!(lookup.force_invalidate_after(0), Some(lookup.len()));
    assert!(lookup.is_empty());
}

#[test]
fn staggered_structural_change_invalidates_lanes() {
    let mut h = Harness::new(200, 1000, vec![100, 50, 100, 50]);
    let mut layout = StaggeredLayout::new(StaggeredOptions::new(2, Orientation::Vertical)).unwrap();
    h.layout(&mut layout);

    {
        let ctx = h.ctx();
        layout.on_items_removed(&ctx, 1, 1);
    }
    assert!(layout.take_layout_request());
    assert_eq!(layout.span_lookup().span(0), Some(0));
    assert!((1..4).all(|p| layout.span_lookup().span(p).is_none()));
}

#[test]
fn staggered_saved_state_round_trip() {
    let mut h = Harness::new(200, 300, vec![100; 20]);
    let mut layout = StaggeredLayout::new(StaggeredOptions::new(2, Orientation::Vertical)).unwrap();
    h.layout(&mut layout);
    h.scroll(&mut layout, 150);

    let saved = {
        let ctx = h.ctx();
        layout.save_state(&ctx)
    };
    assert_eq!(saved.anchor.position, Some(2));
    assert_eq!(saved.span_offsets, vec![Some(-50), Some(-50)]);

    let mut other = Harness::new(200, 300, vec![100; 20]);
    let mut restored =
        StaggeredLayout::new(StaggeredOptions::new(2, Orientation::Vertical)).unwrap();
    restored.restore_state(saved);
    other.layout(&mut restored);
    assert_eq!(other.positions(), h.positions());
    assert_eq!(other.holder_at(2).bounds.top, -50);
}

fn info(position: usize) -> ItemInfo {
    ItemInfo {
        position: Some(position),
        ..ItemInfo::default()
    }
}

#[test]
fn reconciliation_classifies_every_record_once() {
    let mut store = ReconciliationStore::new();
    // persistent
    store.add_to_pre_layout(HolderId(0), info(0));
    store.add_to_post_layout(HolderId(0), info(0));
    // disappeared
    store.add_to_pre_layout(HolderId(1), info(1));
    // appeared
    store.add_to_post_layout(HolderId(2), info(2));
    // appeared with a pre-layout snapshot
    store.add_to_appeared_in_pre_layout(HolderId(3), info(3));
    store.add_to_post_layout(HolderId(3), info(4));
    // disappearing
    store.add_to_pre_layout(HolderId(4), info(5));
    store.add_to_disappeared_in_layout(HolderId(4));
    // unused
    store.add_to_appeared_in_pre_layout(HolderId(5), info(6));
    store.add_to_disappeared_in_layout(HolderId(5));
    // appeared only during layout: dropped
    store.add_to_appeared_in_pre_layout(HolderId(6), info(7));
    // appeared, pre and post
    store.add_to_appeared_in_pre_layout(HolderId(7), info(8));
    store.add_to_pre_layout(HolderId(7), info(8));
    store.add_to_post_layout(HolderId(7), info(9));
    assert_eq!(store.len(), 8);
    assert!(store.is_disappearing(HolderId(4)));

    let mut seen = Vec::new();
    store.classify(|holder, class| seen.push((holder, class)));
    seen.sort_by_key(|(h, _)| *h);
    assert!(store.is_empty());
    assert_eq!(
        seen,
        vec![
            (
                HolderId(0),
                Classification::Persistent {
                    pre: info(0),
                    post: info(0)
                }
            ),
            (HolderId(1), Classification::Disappeared { pre: info(1) }),
            (
                HolderId(2),
                Classification::Appeared {
                    pre: None,
                    post: info(2)
                }
            ),
            (
                HolderId(3),
                Classification::Appeared {
                    pre: Some(info(3)),
                    post: info(4)
                }
            ),
            (
                HolderId(4),
                Classification::Disappearing {
                    pre: info(5),
                    post: None
                }
            ),
            (HolderId(5), Classification::Unused),
            (
                HolderId(7),
                Classification::AppearedPrePost {
                    pre: info(8),
                    post: info(9)
                }
            ),
        ]
    );
}

#[test]
fn reconciliation_pop_keeps_remaining_step() {
    let mut store = ReconciliationStore::new();
    store.add_to_pre_layout(HolderId(1), info(1));
    store.add_to_post_layout(HolderId(1), info(2));
    assert!(store.is_in_pre_layout(HolderId(1)));
    assert_eq!(store.pop_from_pre_layout(HolderId(1)), Some(info(1)));
    assert!(!store.is_in_pre_layout(HolderId(1)));
    assert_eq!(store.len(), 1);
    assert_eq!(store.pop_from_post_layout(HolderId(1)), Some(info(2)));
    assert!(store.is_empty());

    store.add_to_old_change_holders(7, HolderId(3));
    assert_eq!(store.old_change_holder(7), Some(HolderId(3)));
    store.remove_holder(HolderId(3));
    assert_eq!(store.old_change_holder(7), None);
}

#[test]
fn prefetch_registry_rejects_duplicates() {
    let mut registry = PrefetchRegistry::new();
    registry.begin(10);
    registry.add_position(3, 10);
    registry.add_position(3, 20);
    registry.add_position(4, 0);
    assert_eq!(registry.positions(), &[(3, 10), (4, 0)]);
    registry.begin(10);
    assert!(registry.is_empty());
}

#[derive(Default)]
struct FakeViewport {
    visible: bool,
    item_count: usize,
    adjacent: Vec<(usize, i32)>,
    initial: usize,
    attached: Vec<usize>,
    nested_at: Option<(usize, ViewportId)>,
    pending_updates: bool,
    prefetched: Vec<(usize, Deadline)>,
    observed: Vec<(usize, bool)>,
}

impl PrefetchTarget for FakeViewport {
    fn is_visible(&self) -> bool {
        self.visible
    }

    fn has_pending_updates(&self) -> bool {
        self.pending_updates
    }

    fn item_count(&self) -> usize {
        self.item_count
    }

    fn collect_adjacent_prefetch_positions(
        &mut self,
        _dx: i32,
        _dy: i32,
        registry: &mut PrefetchRegistry,
    ) {
        for &(position, distance) in &self.adjacent {
            registry.add_position(position, distance);
        }
    }

    fn collect_initial_prefetch_positions(
        &mut self,
        item_count: usize,
        registry: &mut PrefetchRegistry,
    ) {
        for position in 0..self.initial.min(item_count) {
            registry.add_position(position, 0);
        }
    }

    fn is_position_attached(&self, position: usize) -> bool {
        self.attached.contains(&position)
    }

    fn prefetch_position(
        &mut self,
        position: usize,
        deadline: Deadline,
    ) -> Option<Option<ViewportId>> {
        self.prefetched.push((position, deadline));
        Some(
            self.nested_at
                .filter(|&(p, _)| p == position)
                .map(|(_, id)| id),
        )
    }

    fn on_prefetch_count_observed(&mut self, count: usize, nested: bool) {
        self.observed.push((count, nested));
    }
}

#[derive(Default)]
struct FakeHost {
    viewports: Vec<(ViewportId, FakeViewport)>,
}

impl ViewportRegistry for FakeHost {
    fn viewport_mut(&mut self, id: ViewportId) -> Option<&mut dyn PrefetchTarget> {
        self.viewports
            .iter_mut()
            .find(|(v, _)| *v == id)
            .map(|(_, vp)| vp as &mut dyn PrefetchTarget)
    }
}

fn outer_viewport() -> FakeViewport {
    FakeViewport {
        visible: true,
        item_count: 50,
        adjacent: vec![(7, 300), (6, 50), (5, 0)],
        ..FakeViewport::default()
    }
}

#[test]
fn prefetch_runs_immediate_tasks_past_an_exhausted_deadline() {
    let mut host = FakeHost::default();
    host.viewports.push((ViewportId(1), outer_viewport()));
    let mut scheduler = PrefetchScheduler::new(PrefetchOptions::default());
    scheduler.attach(ViewportId(1));
    scheduler.post_from_traversal(ViewportId(1), 0, 100, 5);
    assert!(scheduler.is_armed());

    let mut clock = || 1_000_000_000u64;
    let produced = scheduler.prefetch(&mut host, 1_000, &mut clock);

    assert_eq!(produced, 2);
    let vp = &host.viewports[0].1;
    assert_eq!(
        vp.prefetched,
        vec![(5, Deadline::Unbounded), (6, Deadline::Unbounded)]
    );
    assert_eq!(vp.observed, vec![(3, false)]);
    assert!(scheduler.tasks().is_empty());
}

#[test]
fn prefetch_round_runs_once_per_post() {
    let mut host = FakeHost::default();
    host.viewports.push((ViewportId(1), outer_viewport()));
    let mut scheduler = PrefetchScheduler::new(PrefetchOptions::default());
    scheduler.attach(ViewportId(1));

    let mut clock = || 0u64;
    assert_eq!(scheduler.run(&mut host, 0, &mut clock), 0);

    scheduler.post_from_traversal(ViewportId(1), 0, 100, 0);
    assert_eq!(scheduler.run(&mut host, 0, &mut clock), 3);
    assert!(!scheduler.is_armed());
    let deadline = Deadline::At(DEFAULT_FRAME_INTERVAL_NS);
    assert_eq!(host.viewports[0].1.prefetched[2], (7, deadline));

    assert_eq!(scheduler.run(&mut host, 0, &mut clock), 0);
    assert_eq!(host.viewports[0].1.prefetched.len(), 3);
}

#[test]
fn prefetch_skips_attached_hidden_and_stale_viewports() {
    let mut host = FakeHost::default();
    let mut outer = outer_viewport();
    outer.attached.push(6);
    host.viewports.push((ViewportId(1), outer));
    host.viewports.push((
        ViewportId(2),
        FakeViewport {
            visible: false,
            ..outer_viewport()
        },
    ));
    host.viewports.push((
        ViewportId(3),
        FakeViewport {
            pending_updates: true,
            ..outer_viewport()
        },
    ));
    let mut scheduler = PrefetchScheduler::new(PrefetchOptions::default());
    for id in [1, 2, 3] {
        scheduler.attach(ViewportId(id));
        scheduler.post_from_traversal(ViewportId(id), 0, 100, 0);
    }

    let mut clock = || 0u64;
    assert_eq!(scheduler.run(&mut host, 0, &mut clock), 2);
    let prefetched: Vec<usize> = host.viewports[0].1.prefetched.iter().map(|&(p, _)| p).collect();
    assert_eq!(prefetched, vec![5, 7]);
    assert!(host.viewports[1].1.prefetched.is_empty());
    assert!(host.viewports[2].1.prefetched.is_empty());
}

#[test]
fn prefetch_recurses_into_nested_viewport() {
    let mut host = FakeHost::default();
    let mut outer = outer_viewport();
    outer.adjacent = vec![(5, 0)];
    outer.nested_at = Some((5, ViewportId(9)));
    host.viewports.push((ViewportId(1), outer));
    host.viewports.push((
        ViewportId(9),
        FakeViewport {
            visible: true,
            item_count: 10,
            initial: 4,
            ..FakeViewport::default()
        },
    ));
    let mut scheduler = PrefetchScheduler::new(PrefetchOptions::default());
    scheduler.attach(ViewportId(1));
    scheduler.post_from_traversal(ViewportId(1), 0, 10, 0);

    let mut clock = || 0u64;
    assert_eq!(scheduler.run(&mut host, 0, &mut clock), 5);
    let inner = &host.viewports[1].1;
    let positions: Vec<usize> = inner.prefetched.iter().map(|&(p, _)| p).collect();
    assert_eq!(positions, vec![0, 1, 2, 3]);
    assert!(inner.prefetched.iter().all(|&(_, d)| d.is_unbounded()));
    assert_eq!(inner.observed, vec![(4, true)]);
}

#[test]
fn direction_truth_tables() {
    use ItemDirection::{Head, Tail};
    use LayoutDirection::{End, Start};
    use Orientation::{Horizontal, Vertical};

    // (orientation, rtl, reverse, direction) => (should reverse, prefer last span, items)
    let table = [
        ((Vertical, false, false, Start), (false, true, Head)),
        ((Vertical, false, false, End), (false, false, Tail)),
        ((Vertical, false, true, Start), (true, false, Tail)),
        ((Vertical, false, true, End), (true, true, Head)),
        ((Vertical, true, false, Start), (false, false, Head)),
        ((Vertical, true, false, End), (false, true, Tail)),
        ((Vertical, true, true, Start), (true, true, Tail)),
        ((Vertical, true, true, End), (true, false, Head)),
        ((Horizontal, false, false, Start), (false, true, Head)),
        ((Horizontal, false, false, End), (false, false, Tail)),
        ((Horizontal, false, true, Start), (true, false, Tail)),
        ((Horizontal, false, true, End), (true, true, Head)),
        ((Horizontal, true, false, Start), (true, false, Tail)),
        ((Horizontal, true, false, End), (true, true, Head)),
        ((Horizontal, true, true, Start), (false, true, Head)),
        ((Horizontal, true, true, End), (false, false, Tail)),
    ];
    for ((orientation, rtl, reverse, dir), (should_reverse, prefer_last, items)) in table {
        let case = (orientation, rtl, reverse, dir);
        let resolved = EffectiveDirection::resolve(orientation, rtl, reverse);
        assert_eq!(resolved.should_reverse_layout, should_reverse, "{case:?}");
        assert_eq!(resolved.prefer_last_span(dir), prefer_last, "{case:?}");
        assert_eq!(resolved.item_direction(dir), items, "{case:?}");

        let resolved_fill = resolve_effective_direction(orientation, rtl, reverse, dir);
        assert_eq!(resolved_fill.direction, resolved, "{case:?}");
        assert_eq!(resolved_fill.prefer_last_span, prefer_last, "{case:?}");
        assert_eq!(resolved_fill.item_direction, items, "{case:?}");
    }
}
