use recycler::{
    Classification, ItemHolder, LinearLayout, LinearOptions, MeasureSpec, Size, ViewportGeometry,
    ViewportId,
};
use recycler_adapter::{Adapter, Controller, HolderPool, PoolOptions};

struct Messages {
    lines: Vec<String>,
}

impl Adapter for Messages {
    fn item_count(&self) -> usize {
        self.lines.len()
    }

    fn bind(&mut self, _holder: &mut ItemHolder, position: usize) {
        println!("  bind #{position}: {}", self.lines[position]);
    }

    fn measure(&mut self, holder: &ItemHolder, spec: MeasureSpec) -> Size {
        // One row per 40 characters.
        let len = holder.position.map_or(0, |p| self.lines[p].len()) as i32;
        Size::new(spec.width, 20 * (1 + len / 40))
    }
}

fn main() {
    // Example: remove an item and let the controller classify what to animate.
    //
    // An adapter would:
    // - mutate its data, then call the matching notify_* method
    // - call dispatch_layout and start animations from the returned classifications
    // - call end_animation for every disappearing holder once its animation finished
    let lines = (0..30).map(|i| format!("message {i}")).collect();
    let mut c = Controller::new(
        ViewportId(1),
        LinearLayout::new(LinearOptions::default()),
        HolderPool::new(Messages { lines }, PoolOptions::default()),
        ViewportGeometry::new(320, 100),
    );

    println!("initial layout");
    c.dispatch_layout();
    println!("visible={:?}", c.visible_positions());

    c.pool_mut().adapter_mut().lines.remove(1);
    c.notify_item_range_removed(1, 1);

    println!("layout after removing #1");
    for (id, class) in c.dispatch_layout() {
        let label = match class {
            Classification::Persistent { pre, post } => {
                format!("move {} -> {}", pre.bounds.top, post.bounds.top)
            }
            Classification::Disappeared { .. } | Classification::Disappearing { .. } => {
                "fade out".to_string()
            }
            Classification::Appeared { .. } | Classification::AppearedPrePost { .. } => {
                "fade in".to_string()
            }
            Classification::Unused => "recycle".to_string(),
        };
        println!("  holder {}: {label}", id.0);
    }
    println!(
        "visible={:?} animating={:?}",
        c.visible_positions(),
        c.animating()
    );

    c.end_animations();
    println!("hidden after animations: {}", c.children().hidden_count());
}
