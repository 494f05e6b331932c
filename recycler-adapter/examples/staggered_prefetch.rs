use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use recycler::{
    ItemHolder, MeasureSpec, Orientation, PrefetchOptions, PrefetchScheduler, PrefetchTarget,
    Size, StaggeredLayout, StaggeredOptions, ViewportGeometry, ViewportId, ViewportRegistry,
};
use recycler_adapter::{Adapter, Controller, HolderPool, PoolOptions};

struct Photos;

impl Adapter for Photos {
    fn item_count(&self) -> usize {
        500
    }

    fn is_full_span(&self, position: usize) -> bool {
        // Section headers.
        position % 25 == 0
    }

    fn bind(&mut self, _holder: &mut ItemHolder, _position: usize) {}

    fn measure(&mut self, holder: &ItemHolder, spec: MeasureSpec) -> Size {
        let height = match holder.position {
            Some(p) if p % 25 == 0 => 40,
            Some(p) => 80 + (p as i32 * 37) % 120,
            None => 0,
        };
        Size::new(spec.width, height)
    }
}

struct Host {
    gallery: Controller<Photos, StaggeredLayout>,
}

impl ViewportRegistry for Host {
    fn viewport_mut(&mut self, id: ViewportId) -> Option<&mut dyn PrefetchTarget> {
        (id == self.gallery.id()).then_some(&mut self.gallery as &mut dyn PrefetchTarget)
    }
}

fn main() -> Result<(), recycler::LayoutError> {
    // Example: a staggered gallery scrolled frame by frame, with prefetch between frames.
    //
    // An adapter would:
    // - scroll the controller and post the delta to the scheduler during traversal
    // - run the scheduler after drawing, with the frame's start time
    let now = Arc::new(AtomicU64::new(0));
    let layout = StaggeredLayout::new(StaggeredOptions::new(3, Orientation::Vertical))?;
    let pool = HolderPool::new(Photos, PoolOptions::default()).with_clock({
        let now = Arc::clone(&now);
        move || now.fetch_add(50_000, Ordering::Relaxed)
    });
    let mut host = Host {
        gallery: Controller::new(ViewportId(1), layout, pool, ViewportGeometry::new(360, 640)),
    };
    host.gallery.dispatch_layout();

    let mut scheduler = PrefetchScheduler::new(PrefetchOptions::default());
    scheduler.attach(ViewportId(1));

    for frame in 0..20u64 {
        let frame_start = frame * PrefetchOptions::default().frame_interval_ns;
        now.store(frame_start, Ordering::Relaxed);
        let scrolled = host.gallery.scroll_by(45);
        scheduler.post_from_traversal(ViewportId(1), 0, scrolled, frame_start);
        let produced = scheduler.run(&mut host, frame_start, &mut || now.load(Ordering::Relaxed));
        if frame % 5 == 0 {
            println!(
                "frame={frame} first={:?} last={:?} prefetched={produced} warm={}",
                host.gallery.find_first_visible_position(),
                host.gallery.find_last_visible_position(),
                host.gallery.pool().warm_cache().len()
            );
        }
    }
    let (create_ns, bind_ns) = host.gallery.pool().cost_estimates(0);
    println!("estimated create={create_ns}ns bind={bind_ns}ns");
    Ok(())
}
