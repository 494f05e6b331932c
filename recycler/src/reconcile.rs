use crate::key::{HolderMap, KeyMap};
use crate::{HolderId, ItemHolder, NodeBounds};

const FLAG_DISAPPEARED: u8 = 1;
const FLAG_APPEAR: u8 = 1 << 1;
const FLAG_PRE: u8 = 1 << 2;
const FLAG_POST: u8 = 1 << 3;
const FLAG_APPEAR_AND_DISAPPEAR: u8 = FLAG_APPEAR | FLAG_DISAPPEARED;
const FLAG_PRE_AND_POST: u8 = FLAG_PRE | FLAG_POST;
const FLAG_APPEAR_PRE_AND_POST: u8 = FLAG_APPEAR | FLAG_PRE | FLAG_POST;

/// Geometry snapshot of a holder taken during one of the layout passes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ItemInfo {
    pub bounds: NodeBounds,
    pub position: Option<usize>,
    pub changed: bool,
    pub removed: bool,
}

impl ItemInfo {
    pub fn from_holder(holder: &ItemHolder) -> Self {
        Self {
            bounds: holder.bounds,
            position: holder.layout_position(),
            changed: holder.changed,
            removed: holder.removed,
        }
    }
}

/// Animation category a tracked holder ends up in after both passes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Classification {
    /// Appeared and disappeared within the same cycle; nothing to animate.
    Unused,
    /// Laid out only to animate away.
    Disappearing {
        pre: ItemInfo,
        post: Option<ItemInfo>,
    },
    /// Created during layout and present in both passes.
    AppearedPrePost { pre: ItemInfo, post: ItemInfo },
    /// Present in both passes.
    Persistent { pre: ItemInfo, post: ItemInfo },
    /// Present only before the change.
    Disappeared { pre: ItemInfo },
    /// Present only after the change.
    Appeared {
        pre: Option<ItemInfo>,
        post: ItemInfo,
    },
}

#[derive(Clone, Copy, Debug, Default)]
struct InfoRecord {
    flags: u8,
    pre: Option<ItemInfo>,
    post: Option<ItemInfo>,
}

/// Tracks holder presence across the pre- and post-layout passes of one layout cycle.
///
/// Records are created on first observation and destroyed by [`Self::classify`]; nothing
/// survives into the next cycle.
#[derive(Clone, Debug, Default)]
pub struct ReconciliationStore {
    layout_holders: HolderMap<InfoRecord>,
    old_change_holders: KeyMap<u64, HolderId>,
}

impl ReconciliationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.layout_holders.clear();
        self.old_change_holders.clear();
    }

    pub fn len(&self) -> usize {
        self.layout_holders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layout_holders.is_empty()
    }

    /// Records `holder` as laid out before the change.
    pub fn add_to_pre_layout(&mut self, holder: HolderId, info: ItemInfo) {
        let record = self.layout_holders.entry(holder).or_default();
        record.pre = Some(info);
        record.flags |= FLAG_PRE;
    }

    /// Records `holder` as laid out after the change.
    pub fn add_to_post_layout(&mut self, holder: HolderId, info: ItemInfo) {
        let record = self.layout_holders.entry(holder).or_default();
        record.post = Some(info);
        record.flags |= FLAG_POST;
    }

    /// Records a holder the pre-layout pass created only to measure predictive animations.
    pub fn add_to_appeared_in_pre_layout(&mut self, holder: HolderId, info: ItemInfo) {
        let record = self.layout_holders.entry(holder).or_default();
        record.flags |= FLAG_APPEAR;
        record.pre = Some(info);
    }

    pub fn add_to_disappeared_in_layout(&mut self, holder: HolderId) {
        let record = self.layout_holders.entry(holder).or_default();
        record.flags |= FLAG_DISAPPEARED;
    }

    pub fn remove_from_disappeared_in_layout(&mut self, holder: HolderId) {
        if let Some(record) = self.layout_holders.get_mut(&holder) {
            record.flags &= !FLAG_DISAPPEARED;
        }
    }

    pub fn is_disappearing(&self, holder: HolderId) -> bool {
        self.layout_holders
            .get(&holder)
            .is_some_and(|r| r.flags & FLAG_DISAPPEARED != 0)
    }

    pub fn is_in_pre_layout(&self, holder: HolderId) -> bool {
        self.layout_holders
            .get(&holder)
            .is_some_and(|r| r.flags & FLAG_PRE != 0)
    }

    /// Takes the pre-layout snapshot of `holder`, leaving the rest of its record intact.
    pub fn pop_from_pre_layout(&mut self, holder: HolderId) -> Option<ItemInfo> {
        self.pop_from_layout_step(holder, FLAG_PRE)
    }

    pub fn pop_from_post_layout(&mut self, holder: HolderId) -> Option<ItemInfo> {
        self.pop_from_layout_step(holder, FLAG_POST)
    }

    fn pop_from_layout_step(&mut self, holder: HolderId, flag: u8) -> Option<ItemInfo> {
        let record = self.layout_holders.get_mut(&holder)?;
        if record.flags & flag == 0 {
            return None;
        }
        record.flags &= !flag;
        let info = if flag == FLAG_PRE {
            record.pre.take()
        } else {
            record.post.take()
        };
        if record.flags & (FLAG_PRE | FLAG_POST) == 0 {
            self.layout_holders.remove(&holder);
        }
        info
    }

    /// Remembers the holder that displayed a changed item before the change.
    pub fn add_to_old_change_holders(&mut self, key: u64, holder: HolderId) {
        self.old_change_holders.insert(key, holder);
    }

    pub fn old_change_holder(&self, key: u64) -> Option<HolderId> {
        self.old_change_holders.get(&key).copied()
    }

    /// Forgets `holder` entirely, typically because it was recycled.
    pub fn remove_holder(&mut self, holder: HolderId) {
        self.old_change_holders.retain(|_, h| *h != holder);
        self.layout_holders.remove(&holder);
    }

    /// Classifies and removes every record, calling `f` once per dispatched holder.
    ///
    /// Holders only marked as appeared during layout are dropped without dispatch; the pool
    /// reclaims them with the scrap.
    pub fn classify(&mut self, mut f: impl FnMut(HolderId, Classification)) {
        let records = core::mem::take(&mut self.layout_holders);
        rdebug!(total = records.len(), "ReconciliationStore::classify");
        for (holder, record) in records {
            if let Some(class) = classify_record(&record) {
                f(holder, class);
            }
        }
        self.old_change_holders.clear();
    }
}

fn classify_record(record: &InfoRecord) -> Option<Classification> {
    let flags = record.flags;
    if flags & FLAG_APPEAR_AND_DISAPPEAR == FLAG_APPEAR_AND_DISAPPEAR {
        return Some(Classification::Unused);
    }
    if flags & FLAG_DISAPPEARED != 0 {
        return Some(match record.pre {
            Some(pre) => Classification::Disappearing {
                pre,
                post: record.post,
            },
            None => Classification::Unused,
        });
    }
    if flags & FLAG_APPEAR_PRE_AND_POST == FLAG_APPEAR_PRE_AND_POST {
        if let (Some(pre), Some(post)) = (record.pre, record.post) {
            return Some(Classification::AppearedPrePost { pre, post });
        }
    }
    if flags & FLAG_PRE_AND_POST == FLAG_PRE_AND_POST {
        if let (Some(pre), Some(post)) = (record.pre, record.post) {
            return Some(Classification::Persistent { pre, post });
        }
    }
    if flags & FLAG_PRE != 0 {
        if let Some(pre) = record.pre {
            return Some(Classification::Disappeared { pre });
        }
    }
    if flags & FLAG_POST != 0 {
        if let Some(post) = record.post {
            return Some(Classification::Appeared {
                pre: record.pre,
                post,
            });
        }
    }
    inconsistent!(
        flags & FLAG_APPEAR != 0,
        "ReconciliationStore: record without any reasonable flag combination"
    );
    None
}
