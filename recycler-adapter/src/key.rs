#[cfg(not(feature = "std"))]
use alloc::collections::BTreeMap;
#[cfg(feature = "std")]
use std::collections::HashMap;

/// Per item type storage used by the cold pool.
#[cfg(feature = "std")]
pub(crate) type TypeMap<V> = HashMap<u32, V>;
#[cfg(not(feature = "std"))]
pub(crate) type TypeMap<V> = BTreeMap<u32, V>;
