/// Primary scroll axis of a layout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Orientation {
    Horizontal,
    #[default]
    Vertical,
}

impl Orientation {
    pub fn other(self) -> Self {
        match self {
            Self::Horizontal => Self::Vertical,
            Self::Vertical => Self::Horizontal,
        }
    }
}

/// Which edge a fill pass grows towards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LayoutDirection {
    Start,
    End,
}

impl LayoutDirection {
    /// `-1` towards the start edge, `+1` towards the end edge.
    pub fn sign(self) -> i32 {
        match self {
            Self::Start => -1,
            Self::End => 1,
        }
    }

    pub fn for_delta(delta: i32) -> Self {
        if delta > 0 { Self::End } else { Self::Start }
    }

    pub fn flip(self) -> Self {
        match self {
            Self::Start => Self::End,
            Self::End => Self::Start,
        }
    }
}

/// Which way the data cursor walks while filling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ItemDirection {
    /// Towards lower adapter positions.
    Head,
    /// Towards higher adapter positions.
    Tail,
}

impl ItemDirection {
    pub fn step(self) -> isize {
        match self {
            Self::Head => -1,
            Self::Tail => 1,
        }
    }
}

/// Direction flags resolved once per layout pass from orientation, RTL and reverse layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EffectiveDirection {
    pub orientation: Orientation,
    pub is_rtl: bool,
    pub should_reverse_layout: bool,
}

impl EffectiveDirection {
    pub fn resolve(orientation: Orientation, is_rtl: bool, reverse_layout: bool) -> Self {
        let should_reverse_layout = if orientation == Orientation::Vertical || !is_rtl {
            reverse_layout
        } else {
            !reverse_layout
        };
        Self {
            orientation,
            is_rtl,
            should_reverse_layout,
        }
    }

    /// Item direction used when filling towards `layout_direction`.
    pub fn item_direction(&self, layout_direction: LayoutDirection) -> ItemDirection {
        if self.should_reverse_layout == (layout_direction == LayoutDirection::Start) {
            ItemDirection::Tail
        } else {
            ItemDirection::Head
        }
    }

    /// Tie-break for staggered span selection.
    ///
    /// Kept exactly as the established truth table: horizontal layouts only look at the
    /// reverse flag, vertical layouts additionally flip under RTL.
    pub fn prefer_last_span(&self, layout_direction: LayoutDirection) -> bool {
        let towards_start = layout_direction == LayoutDirection::Start;
        if self.orientation == Orientation::Horizontal {
            return towards_start != self.should_reverse_layout;
        }
        (towards_start == self.should_reverse_layout) == self.is_rtl
    }
}

/// Direction answers for one requested fill direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedFill {
    pub direction: EffectiveDirection,
    pub layout_direction: LayoutDirection,
    pub item_direction: ItemDirection,
    pub prefer_last_span: bool,
}

/// Resolves orientation, RTL and reverse layout into the flags a fill pass towards
/// `requested` needs. Computed once per pass and threaded through.
pub fn resolve_effective_direction(
    orientation: Orientation,
    is_rtl: bool,
    reverse_layout: bool,
    requested: LayoutDirection,
) -> ResolvedFill {
    let direction = EffectiveDirection::resolve(orientation, is_rtl, reverse_layout);
    ResolvedFill {
        direction,
        layout_direction: requested,
        item_direction: direction.item_direction(requested),
        prefer_last_span: direction.prefer_last_span(requested),
    }
}

/// Arena index of an [`crate::ItemHolder`] owned by a recycling pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HolderId(pub u32);

impl HolderId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identity of a viewport registered with a [`crate::PrefetchScheduler`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ViewportId(pub u32);

/// Decorated bounds of a node (margins and decorations included), in viewport pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeBounds {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl NodeBounds {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Insets {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

/// How a viewport dimension constrains its content.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MeasureMode {
    #[default]
    Exact,
    AtMost,
    Unbounded,
}

/// Size constraint handed to the pool when a node is measured.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MeasureSpec {
    pub width: i32,
    pub width_mode: MeasureMode,
    pub height: i32,
    pub height_mode: MeasureMode,
}

/// Geometry of the hosting viewport.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ViewportGeometry {
    pub width: i32,
    pub height: i32,
    pub padding: Insets,
    pub width_mode: MeasureMode,
    pub height_mode: MeasureMode,
    pub is_rtl: bool,
}

impl ViewportGeometry {
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    pub fn with_padding(mut self, padding: Insets) -> Self {
        self.padding = padding;
        self
    }

    pub fn with_rtl(mut self, is_rtl: bool) -> Self {
        self.is_rtl = is_rtl;
        self
    }

    pub fn with_modes(mut self, width_mode: MeasureMode, height_mode: MeasureMode) -> Self {
        self.width_mode = width_mode;
        self.height_mode = height_mode;
        self
    }
}

/// Time budget for acquiring and binding a node, in nanoseconds on the host clock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Deadline {
    Unbounded,
    At(u64),
}

impl Deadline {
    pub fn is_unbounded(self) -> bool {
        matches!(self, Self::Unbounded)
    }

    /// Whether work estimated at `cost_ns`, started at `now_ns`, still fits.
    pub fn fits(self, now_ns: u64, cost_ns: u64) -> bool {
        match self {
            Self::Unbounded => true,
            Self::At(deadline) => cost_ns == 0 || now_ns.saturating_add(cost_ns) < deadline,
        }
    }

    pub fn has_passed(self, now_ns: u64) -> bool {
        match self {
            Self::Unbounded => false,
            Self::At(deadline) => now_ns >= deadline,
        }
    }
}

/// Scroll phase reported by the host's input handling.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ScrollState {
    #[default]
    Idle,
    Dragging,
    Settling,
}
