use crate::{MeasureMode, NodeBounds, Orientation, Size, ViewportGeometry};

/// Reads node and viewport geometry along one axis.
///
/// `Vertical` reads tops/bottoms and heights, `Horizontal` reads lefts/rights and widths.
#[derive(Clone, Copy, Debug)]
pub struct AxisHelper {
    orientation: Orientation,
    geometry: ViewportGeometry,
    last_total_space: Option<i32>,
}

impl AxisHelper {
    pub fn new(orientation: Orientation) -> Self {
        Self {
            orientation,
            geometry: ViewportGeometry::default(),
            last_total_space: None,
        }
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn set_geometry(&mut self, geometry: ViewportGeometry) {
        self.geometry = geometry;
    }

    pub fn geometry(&self) -> &ViewportGeometry {
        &self.geometry
    }

    pub fn decorated_start(&self, b: &NodeBounds) -> i32 {
        match self.orientation {
            Orientation::Vertical => b.top,
            Orientation::Horizontal => b.left,
        }
    }

    pub fn decorated_end(&self, b: &NodeBounds) -> i32 {
        match self.orientation {
            Orientation::Vertical => b.bottom,
            Orientation::Horizontal => b.right,
        }
    }

    pub fn decorated_measurement(&self, b: &NodeBounds) -> i32 {
        self.decorated_end(b) - self.decorated_start(b)
    }

    pub fn decorated_measurement_in_other(&self, b: &NodeBounds) -> i32 {
        match self.orientation {
            Orientation::Vertical => b.width(),
            Orientation::Horizontal => b.height(),
        }
    }

    /// Extent of a measured size along this axis.
    pub fn main_size(&self, size: Size) -> i32 {
        match self.orientation {
            Orientation::Vertical => size.height,
            Orientation::Horizontal => size.width,
        }
    }

    pub fn cross_size(&self, size: Size) -> i32 {
        match self.orientation {
            Orientation::Vertical => size.width,
            Orientation::Horizontal => size.height,
        }
    }

    pub fn start_after_padding(&self) -> i32 {
        match self.orientation {
            Orientation::Vertical => self.geometry.padding.top,
            Orientation::Horizontal => self.geometry.padding.left,
        }
    }

    pub fn end_after_padding(&self) -> i32 {
        self.end() - self.end_padding()
    }

    pub fn end(&self) -> i32 {
        match self.orientation {
            Orientation::Vertical => self.geometry.height,
            Orientation::Horizontal => self.geometry.width,
        }
    }

    pub fn end_padding(&self) -> i32 {
        match self.orientation {
            Orientation::Vertical => self.geometry.padding.bottom,
            Orientation::Horizontal => self.geometry.padding.right,
        }
    }

    pub fn total_space(&self) -> i32 {
        (self.end_after_padding() - self.start_after_padding()).max(0)
    }

    pub fn mode(&self) -> MeasureMode {
        match self.orientation {
            Orientation::Vertical => self.geometry.height_mode,
            Orientation::Horizontal => self.geometry.width_mode,
        }
    }

    pub fn mode_in_other(&self) -> MeasureMode {
        match self.orientation {
            Orientation::Vertical => self.geometry.width_mode,
            Orientation::Horizontal => self.geometry.height_mode,
        }
    }

    /// Change in total space since the last completed layout, `0` before the first one.
    pub fn total_space_change(&self) -> i32 {
        self.last_total_space
            .map_or(0, |last| self.total_space() - last)
    }

    pub fn on_layout_complete(&mut self) {
        self.last_total_space = Some(self.total_space());
    }

    /// An unbounded axis with no extent can take any number of items.
    pub fn is_infinite(&self) -> bool {
        self.mode() == MeasureMode::Unbounded && self.end() == 0
    }

    /// Shifts bounds along this axis.
    pub fn offset(&self, b: &mut NodeBounds, delta: i32) {
        match self.orientation {
            Orientation::Vertical => {
                b.top += delta;
                b.bottom += delta;
            }
            Orientation::Horizontal => {
                b.left += delta;
                b.right += delta;
            }
        }
    }

    /// Builds bounds from a main-axis and a cross-axis interval.
    pub fn place(
        &self,
        main_start: i32,
        main_end: i32,
        cross_start: i32,
        cross_end: i32,
    ) -> NodeBounds {
        match self.orientation {
            Orientation::Vertical => NodeBounds::new(cross_start, main_start, cross_end, main_end),
            Orientation::Horizontal => {
                NodeBounds::new(main_start, cross_start, main_end, cross_end)
            }
        }
    }
}
