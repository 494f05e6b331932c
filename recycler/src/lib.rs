//! A headless incremental viewport engine for recycling lists and grids.
//!
//! For a reference recycling pool and a controller that drives whole layout cycles, see the
//! `recycler-adapter` crate.
//!
//! This crate decides which data items are materialized as nodes, where those nodes go and
//! when they are recycled:
//! - [`VisibleIndexMap`]: logical (visible) vs. physical (attached) child addressing
//! - [`LinearLayout`] / [`GridLayout`]: anchor resolution and the directional fill loop
//! - [`StaggeredLayout`]: lanes of unequal extent with gap detection and repair
//! - [`ReconciliationStore`]: pre/post layout snapshots classified into animation categories
//! - [`PrefetchScheduler`]: deadline-bounded speculative binds between frames
//!
//! It is UI-agnostic. A host is expected to provide:
//! - viewport geometry (size, padding, measure modes, RTL)
//! - a [`RecyclePool`] that creates, binds and measures nodes
//! - the attached-children map and scrap list for each pass ([`LayoutContext`])
#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]

extern crate alloc;

#[cfg(test)]
extern crate std;

#[macro_use]
mod macros;

mod context;
mod engine;
mod error;
mod fill;
mod grid;
mod holder;
mod index_map;
mod key;
mod linear;
mod orientation;
mod pool;
mod prefetch;
mod reconcile;
mod registry;
mod staggered;
mod state;
mod types;

#[cfg(test)]
mod tests;

pub use context::{LayoutContext, LayoutPass};
pub use engine::LayoutEngine;
pub use error::LayoutError;
pub use fill::{ChunkLayout, ChunkResult, FillEnv, FillState, ItemChunk, fill};
pub use grid::{GridLayout, GridRows, SpanSizeLookup, UniformSpanSize};
pub use holder::ItemHolder;
pub use index_map::VisibleIndexMap;
pub use linear::{AnchorInfo, LinearLayout, LinearOptions};
pub use orientation::AxisHelper;
pub use pool::RecyclePool;
pub use prefetch::{
    DEFAULT_FRAME_INTERVAL_NS, PrefetchOptions, PrefetchScheduler, PrefetchTarget, PrefetchTask,
    ViewportRegistry,
};
pub use reconcile::{Classification, ItemInfo, ReconciliationStore};
pub use registry::PrefetchRegistry;
pub use staggered::{
    FullSpanItem, GapStrategy, LazySpanLookup, Span, StaggeredLayout, StaggeredOptions,
};
pub use state::{SavedAnchor, StaggeredSavedState};
pub use types::{
    Deadline, EffectiveDirection, HolderId, Insets, ItemDirection, LayoutDirection, MeasureMode,
    MeasureSpec, NodeBounds, Orientation, ResolvedFill, ScrollState, Size, ViewportGeometry,
    ViewportId, resolve_effective_direction,
};
