use alloc::vec::Vec;

use crate::{Deadline, PrefetchRegistry, ViewportId};

/// Frame interval assumed when the host does not configure one (60 Hz).
pub const DEFAULT_FRAME_INTERVAL_NS: u64 = 1_000_000_000 / 60;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PrefetchOptions {
    pub frame_interval_ns: u64,
    pub enabled: bool,
}

impl Default for PrefetchOptions {
    fn default() -> Self {
        Self {
            frame_interval_ns: DEFAULT_FRAME_INTERVAL_NS,
            enabled: true,
        }
    }
}

impl PrefetchOptions {
    pub fn with_frame_interval_ns(mut self, frame_interval_ns: u64) -> Self {
        self.frame_interval_ns = frame_interval_ns;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// One viewport as seen by the scheduler.
pub trait PrefetchTarget {
    /// Whether the viewport is on screen; hidden viewports are skipped.
    fn is_visible(&self) -> bool;

    /// Structural changes not yet applied make every position stale.
    fn has_pending_updates(&self) -> bool;

    fn item_count(&self) -> usize;

    fn collect_adjacent_prefetch_positions(
        &mut self,
        dx: i32,
        dy: i32,
        registry: &mut PrefetchRegistry,
    );

    fn collect_initial_prefetch_positions(
        &mut self,
        item_count: usize,
        registry: &mut PrefetchRegistry,
    );

    fn is_position_attached(&self, position: usize) -> bool;

    /// Creates and binds a node for `position` within `deadline`, then parks it in the pool.
    ///
    /// Returns `None` when nothing was produced, otherwise the node's nested viewport if it is
    /// bound, valid and hosts one.
    fn prefetch_position(&mut self, position: usize, deadline: Deadline)
    -> Option<Option<ViewportId>>;

    /// Reports how many positions a round asked for; `nested` rounds come from an outer
    /// viewport. Implementations keep the maximum to size their warm cache.
    fn on_prefetch_count_observed(&mut self, count: usize, nested: bool);
}

/// Gives the scheduler access to viewports by id.
pub trait ViewportRegistry {
    fn viewport_mut(&mut self, id: ViewportId) -> Option<&mut dyn PrefetchTarget>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PrefetchTask {
    pub viewport: ViewportId,
    pub position: usize,
    /// Within the distance the viewport scrolls in one frame; never dropped for time.
    pub immediate: bool,
    pub velocity: u32,
    pub distance: i32,
}

#[derive(Clone, Debug)]
struct Attached {
    id: ViewportId,
    registry: PrefetchRegistry,
}

/// Per-frame prefetch worker shared by every attached viewport.
///
/// Traversals arm it through [`Self::post_from_traversal`]; the host then calls
/// [`Self::run`] once per frame after drawing. A round gathers positions from every visible
/// viewport, orders them by urgency and binds them one by one until the frame deadline.
#[derive(Clone, Debug, Default)]
pub struct PrefetchScheduler {
    options: PrefetchOptions,
    viewports: Vec<Attached>,
    tasks: Vec<PrefetchTask>,
    nested: PrefetchRegistry,
    post_time_ns: Option<u64>,
}

impl PrefetchScheduler {
    pub fn new(options: PrefetchOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn options(&self) -> &PrefetchOptions {
        &self.options
    }

    pub fn set_options(&mut self, options: PrefetchOptions) {
        self.options = options;
    }

    pub fn attach(&mut self, id: ViewportId) {
        if self.viewports.iter().any(|v| v.id == id) {
            inconsistent!(false, "PrefetchScheduler: viewport attached twice");
            return;
        }
        self.viewports.push(Attached {
            id,
            registry: PrefetchRegistry::new(),
        });
    }

    pub fn detach(&mut self, id: ViewportId) {
        let before = self.viewports.len();
        self.viewports.retain(|v| v.id != id);
        inconsistent!(
            self.viewports.len() < before,
            "PrefetchScheduler: detaching a viewport that is not attached"
        );
    }

    pub fn is_attached(&self, id: ViewportId) -> bool {
        self.viewports.iter().any(|v| v.id == id)
    }

    /// `true` once a traversal asked for a round that has not run yet.
    pub fn is_armed(&self) -> bool {
        self.post_time_ns.is_some()
    }

    /// Records the latest scroll delta of `id` and arms a round for the next frame.
    pub fn post_from_traversal(&mut self, id: ViewportId, dx: i32, dy: i32, now_ns: u64) {
        let Some(entry) = self.viewports.iter_mut().find(|v| v.id == id) else {
            return;
        };
        if !self.options.enabled {
            return;
        }
        entry.registry.set_prefetch_vector(dx, dy);
        if self.post_time_ns.is_none() {
            self.post_time_ns = Some(now_ns);
        }
    }

    /// Runs the armed round with a deadline one frame after `frame_time_ns`.
    ///
    /// Returns the number of nodes produced.
    pub fn run(
        &mut self,
        host: &mut dyn ViewportRegistry,
        frame_time_ns: u64,
        clock: &mut dyn FnMut() -> u64,
    ) -> usize {
        if self.post_time_ns.take().is_none() || self.viewports.is_empty() {
            return 0;
        }
        let deadline = frame_time_ns.saturating_add(self.options.frame_interval_ns);
        self.prefetch(host, deadline, clock)
    }

    /// Runs one round bounded by `deadline_ns`; returns the number of nodes produced.
    pub fn prefetch(
        &mut self,
        host: &mut dyn ViewportRegistry,
        deadline_ns: u64,
        clock: &mut dyn FnMut() -> u64,
    ) -> usize {
        self.build_task_list(host);
        rdebug!(tasks = self.tasks.len(), deadline_ns, "PrefetchScheduler: round");
        let mut produced = 0;
        for i in 0..self.tasks.len() {
            let task = self.tasks[i];
            if !task.immediate && clock() >= deadline_ns {
                rtrace!(remaining = self.tasks.len() - i, "PrefetchScheduler: out of time");
                break;
            }
            let deadline = if task.immediate {
                Deadline::Unbounded
            } else {
                Deadline::At(deadline_ns)
            };
            produced += self.flush_task(host, &task, deadline);
        }
        self.tasks.clear();
        produced
    }

    /// Tasks of the last round, in execution order; empty outside a round.
    pub fn tasks(&self) -> &[PrefetchTask] {
        &self.tasks
    }

    fn build_task_list(&mut self, host: &mut dyn ViewportRegistry) {
        self.tasks.clear();
        for entry in &mut self.viewports {
            entry.registry.begin(0);
            let Some(target) = host.viewport_mut(entry.id) else {
                continue;
            };
            if !target.is_visible() {
                continue;
            }
            collect_from_viewport(target, &mut entry.registry, false);
            let (dx, dy) = entry.registry.prefetch_vector();
            let velocity = dx.unsigned_abs().saturating_add(dy.unsigned_abs());
            self.tasks
                .extend(entry.registry.positions().iter().map(|&(position, distance)| {
                    PrefetchTask {
                        viewport: entry.id,
                        position,
                        immediate: distance.unsigned_abs() <= velocity,
                        velocity,
                        distance,
                    }
                }));
        }
        self.tasks.sort_by(|a, b| {
            b.immediate
                .cmp(&a.immediate)
                .then(b.velocity.cmp(&a.velocity))
                .then(a.distance.cmp(&b.distance))
        });
    }

    fn flush_task(
        &mut self,
        host: &mut dyn ViewportRegistry,
        task: &PrefetchTask,
        deadline: Deadline,
    ) -> usize {
        let Some(target) = host.viewport_mut(task.viewport) else {
            return 0;
        };
        let Some(nested) = prefetch_position(target, task.position, deadline) else {
            return 0;
        };
        let Some(nested) = nested else {
            return 1;
        };
        let Some(inner) = host.viewport_mut(nested) else {
            return 1;
        };
        collect_from_viewport(inner, &mut self.nested, true);
        let mut produced = 1;
        for &(position, _) in self.nested.positions() {
            if prefetch_position(inner, position, deadline).is_some() {
                produced += 1;
            }
        }
        produced
    }
}

fn collect_from_viewport(
    target: &mut dyn PrefetchTarget,
    registry: &mut PrefetchRegistry,
    nested: bool,
) {
    let item_count = target.item_count();
    registry.begin(item_count);
    if target.has_pending_updates() {
        return;
    }
    if nested {
        target.collect_initial_prefetch_positions(item_count, registry);
    } else {
        let (dx, dy) = registry.prefetch_vector();
        target.collect_adjacent_prefetch_positions(dx, dy, registry);
    }
    if !registry.is_empty() {
        target.on_prefetch_count_observed(registry.count(), nested);
    }
}

fn prefetch_position(
    target: &mut dyn PrefetchTarget,
    position: usize,
    deadline: Deadline,
) -> Option<Option<ViewportId>> {
    if target.is_position_attached(position) {
        return None;
    }
    target.prefetch_position(position, deadline)
}
