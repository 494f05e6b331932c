/// A structural change reported by the data source and not yet laid out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum UpdateOp {
    Add { start: usize, count: usize },
    Remove { start: usize, count: usize },
    Update { start: usize, count: usize },
    Move { from: usize, to: usize },
}

impl UpdateOp {
    /// Where an item at `position` before this change sits after it; `None` if it was removed.
    pub fn apply(&self, position: usize) -> Option<usize> {
        match *self {
            Self::Add { start, count } => {
                if position >= start {
                    Some(position + count)
                } else {
                    Some(position)
                }
            }
            Self::Remove { start, count } => {
                if position < start {
                    Some(position)
                } else if position < start + count {
                    None
                } else {
                    Some(position - count)
                }
            }
            Self::Update { .. } => Some(position),
            Self::Move { from, to } => {
                if position == from {
                    Some(to)
                } else if from < to && position > from && position <= to {
                    Some(position - 1)
                } else if from > to && position >= to && position < from {
                    Some(position + 1)
                } else {
                    Some(position)
                }
            }
        }
    }

    /// Whether the item at `position` after this change had its content updated.
    pub fn updates(&self, position: usize) -> bool {
        matches!(
            *self,
            Self::Update { start, count } if position >= start && position < start + count
        )
    }

    /// Change in item count.
    pub fn count_delta(&self) -> isize {
        match *self {
            Self::Add { count, .. } => count as isize,
            Self::Remove { count, .. } => -(count as isize),
            Self::Update { .. } | Self::Move { .. } => 0,
        }
    }
}

/// Maps a position from before `ops` to after them.
pub fn translate_position(ops: &[UpdateOp], position: usize) -> Option<usize> {
    ops.iter().try_fold(position, |p, op| op.apply(p))
}

/// Item count before `ops` were applied to a data set that now holds `item_count` items.
pub fn count_before(ops: &[UpdateOp], item_count: usize) -> usize {
    let delta: isize = ops.iter().map(UpdateOp::count_delta).sum();
    item_count.saturating_add_signed(-delta)
}
