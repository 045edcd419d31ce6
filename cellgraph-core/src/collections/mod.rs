//! Reactive Containers
//!
//! Wrapper types that make a list, map or set behave like a collection of
//! signals. Each key read registers a dependency on a per-key node; reads
//! that depend on the whole shape (length, iteration, key listing) register a
//! dependency on a synthetic node instead. Writes notify exactly the nodes
//! whose answer changed.
//!
//! | Read                         | Node                    |
//! |------------------------------|-------------------------|
//! | `vec.get(i)`                 | key `i`                 |
//! | `vec.len()`                  | length                  |
//! | `vec.to_vec()`, `contains`   | iterate + length        |
//! | `map.get(k)`, `contains_key` | key `k`                 |
//! | `map.len()`, `map.keys()`    | key-iterate             |
//! | `map.values()`, `entries()`  | iterate                 |
//! | `set.contains(v)`            | key `v`                 |
//! | `set.len()`, `set.to_vec()`  | iterate                 |
//!
//! Handles are cheap clones sharing one store. [`readonly`](ReactiveVec::readonly)
//! and [`shallow`](ReactiveVec::shallow) return views over the same store with
//! different access rules; see [`WrapOptions`].

mod deps;
mod map;
mod set;
mod traverse;
mod value;
mod vec;

pub use map::ReactiveMap;
pub use set::ReactiveSet;
pub use traverse::Traverse;
pub use value::Value;
pub use vec::ReactiveVec;

use tracing::warn;

use crate::reactive::Runtime;

/// Access rules of a container handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WrapOptions {
    /// Do not wrap nested containers on read.
    pub shallow: bool,
    /// Ignore writes (logged with `tracing::warn!`).
    pub readonly: bool,
}

/// Hooks for element types that can hold nested containers.
pub(crate) struct Nested<T> {
    /// Replace a plain nested value with its reactive form, in place.
    pub(crate) wrap: fn(&mut T),
    /// Produce a read-only view of a nested value.
    pub(crate) readonly: fn(&T) -> T,
}

impl<T> Clone for Nested<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Nested<T> {}

pub(crate) fn reject_write(container: &'static str, op: &'static str) {
    if Runtime::config().warn_readonly_writes {
        warn!(container, op, "write through a read-only view ignored");
    }
}
