//! Cellgraph Core
//!
//! This crate provides a fine-grained reactive runtime: state cells, derived
//! values and side effects connected by an automatically maintained
//! dependency graph. It implements:
//!
//! - Reactive primitives (signals, memos, effects, watchers, scopes)
//! - A link-based dependency graph with per-run pruning
//! - A batched flush queue with pre and post phases
//! - Reactive containers (lists, maps, sets, JSON-shaped records)
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Reactive primitives and dependency tracking
//! - `graph`: Dependency graph storage and the flush scheduler
//! - `collections`: Container wrappers tracked per key
//! - `tick`: Flushing from a tokio `LocalSet`
//!
//! The runtime is single-threaded. Every thread owns its own graph, and a
//! value created on one thread must stay there.
//!
//! # Example
//!
//! ```rust,ignore
//! use cellgraph_core::prelude::*;
//!
//! // Create a signal
//! let count = Signal::new(1);
//!
//! // Create a derived value
//! let c = count.clone();
//! let doubled = Memo::new(move || c.get() * 2);
//!
//! // Create an effect; it runs once right away
//! let d = doubled.clone();
//! Effect::new(move || println!("Doubled: {}", d.get()));
//!
//! // Update the signal and flush
//! count.set(5);
//! flush()?;
//! // Prints: "Doubled: 10"
//! ```

pub mod collections;
pub mod config;
pub mod error;
pub mod graph;
pub mod reactive;
pub mod tick;

pub use config::{FlushMode, RuntimeConfig};
pub use error::ReactiveError;

/// The types and functions most programs need.
pub mod prelude {
    pub use crate::collections::{ReactiveMap, ReactiveSet, ReactiveVec, Value, WrapOptions};
    pub use crate::config::{FlushMode, RuntimeConfig};
    pub use crate::error::ReactiveError;
    pub use crate::graph::scheduler::flush;
    pub use crate::reactive::{
        batch, effect, memo, on_cleanup, signal, untracked, watch, watch_effect, Effect, EffectOptions,
        EffectScope, Memo, Runtime, Signal, WatchOptions,
    };
    pub use crate::tick::next_tick;
}
