//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, memos, effects
//! and watchers. Everything else in the crate is built on these.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking context (a memo or an effect), the signal registers that
//! context as a dependent. When the value changes, all dependents are
//! notified.
//!
//! ## Memos
//!
//! A Memo is a derived value that caches its result. It is computed lazily on
//! first read and re-evaluated only when a dependency actually changed. A
//! memo whose new result equals the old one does not notify downstream.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that re-runs whenever its
//! dependencies change. Re-runs are queued and happen on the next
//! [`flush`](crate::graph::scheduler::flush), so a burst of writes costs one
//! run.
//!
//! ## Watchers
//!
//! [`watch`] splits an effect into a tracked source and an untracked
//! callback, handing the callback the new and previous values.
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local tracking context to detect
//! dependencies automatically. When a signal is read, we check whether a
//! subscriber is tracking and, if so, link it to the signal. Links are pruned
//! after every run, so a branch that is no longer read stops notifying.

mod context;
mod effect;
mod memo;
mod runtime;
mod scope;
mod signal;
mod subscriber;
mod watch;

pub use context::{pause_tracking, resume_tracking, untracked, ReactiveContext};
pub use effect::{effect, on_cleanup, Effect, EffectOptions};
pub use memo::{memo, Memo, MemoState};
pub use runtime::{batch, Runtime};
pub use scope::{current_scope, on_scope_dispose, EffectScope};
pub use signal::{signal, Signal};
pub use subscriber::SubscriberId;
pub use watch::{source_fn, watch, watch_effect, OnCleanup, SourceFn, WatchHandle, WatchOptions, WatchSource};
