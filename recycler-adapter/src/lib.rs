//! Adapter utilities for the `recycler` crate.
//!
//! The `recycler` crate is UI-agnostic and only decides which nodes exist and where they go.
//! This crate provides the framework-neutral pieces an adapter needs around it:
//!
//! - [`HolderPool`]: a recycling pool with a warm cache, a cold pool per item type and
//!   deadline-aware create/bind cost estimates
//! - [`Controller`]: runs pre/post layout cycles, reconciles changes into animation
//!   categories and serves as a prefetch target
//! - [`UpdateOp`]: structural changes queued between layout passes
//!
//! This crate is intentionally framework-agnostic (no toolkit bindings).
#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]

extern crate alloc;

#[cfg(test)]
extern crate std;

#[macro_use]
mod macros;

mod adapter;
mod controller;
mod key;
mod pool;
mod update;

#[cfg(test)]
mod tests;

pub use adapter::Adapter;
pub use controller::Controller;
pub use pool::{Clock, HolderPool, PoolOptions};
pub use update::{UpdateOp, count_before, translate_position};
