//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies (unless it is lazy).
//!
//! 2. When a dependency changes, the effect is marked dirty and queued on the
//!    flush queue. A custom scheduler replaces the queueing step; a sync
//!    effect re-runs as soon as the triggering write (or batch) completes.
//!
//! 3. Before re-running, the effect checks that a dependency actually moved,
//!    runs its cleanups, then tracks the reads of the new run. Links that were
//!    not read again are dropped.
//!
//! # Differences from Memo
//!
//! - Memos return a value; effects do not.
//! - Memos are lazy (compute on access); effects are eager (run when deps change).
//! - Memos cache results; effects just run their side effect.
//!
//! # Lifetime
//!
//! Dropping an [`Effect`] handle does not stop the effect. It lives until
//! [`Effect::stop`] is called, directly or through an
//! [`EffectScope`](super::EffectScope).

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::warn;

use super::runtime::Runtime;
use super::scope;
use super::subscriber::SubscriberId;
use crate::graph::{SubKey, SubscriberFlags};

/// Options for [`Effect::with_options`].
#[derive(Default)]
pub struct EffectOptions {
    /// Called instead of queueing the effect when a dependency changes.
    pub scheduler: Option<Rc<dyn Fn()>>,
    /// Re-run inline when the triggering write completes.
    pub sync: bool,
    /// Allow the effect to be re-triggered by its own writes.
    pub allow_recurse: bool,
    /// Do not run on creation.
    pub lazy: bool,
    /// Called once when the effect is stopped.
    pub on_stop: Option<Box<dyn FnOnce()>>,
}

impl fmt::Debug for EffectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectOptions")
            .field("scheduler", &self.scheduler.is_some())
            .field("sync", &self.sync)
            .field("allow_recurse", &self.allow_recurse)
            .field("lazy", &self.lazy)
            .field("on_stop", &self.on_stop.is_some())
            .finish()
    }
}

/// Handle to a side-effecting computation.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(0);
///
/// let c = count.clone();
/// let effect = Effect::new(move || {
///     println!("Count is: {}", c.get());
/// });
///
/// count.set(5);
/// flush()?; // Prints: "Count is: 5"
/// ```
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Effect {
    key: SubKey,
    id: SubscriberId,
}

impl Effect {
    /// Create a new effect with the given function.
    ///
    /// The function runs immediately to establish initial dependencies.
    pub fn new<F>(run: F) -> Self
    where
        F: FnMut() + 'static,
    {
        Self::with_options(run, EffectOptions::default())
    }

    /// Create a new effect without running it immediately.
    ///
    /// The effect has no dependencies until [`run`](Self::run) is called.
    pub fn new_lazy<F>(run: F) -> Self
    where
        F: FnMut() + 'static,
    {
        Self::with_options(
            run,
            EffectOptions {
                lazy: true,
                ..EffectOptions::default()
            },
        )
    }

    /// Create an effect with explicit scheduling options.
    pub fn with_options<F>(run: F, options: EffectOptions) -> Self
    where
        F: FnMut() + 'static,
    {
        let mut flags = SubscriberFlags::empty();
        flags.set(SubscriberFlags::SYNC, options.sync);
        flags.set(SubscriberFlags::ALLOW_RECURSE, options.allow_recurse);

        let body: Rc<RefCell<dyn FnMut()>> = Rc::new(RefCell::new(run));
        let (key, id) = Runtime::create_effect(body, options.scheduler, flags, options.on_stop);
        let effect = Self { key, id };
        scope::register(effect);

        if !options.lazy {
            effect.run();
        }
        effect
    }

    /// Get the subscriber ID for this effect.
    pub fn subscriber_id(&self) -> SubscriberId {
        self.id
    }

    /// Run the effect now, whether or not it is dirty.
    pub fn run(&self) {
        Runtime::run_effect(self.key);
    }

    /// Stop the effect: drop every dependency, run its cleanups, and never
    /// run it again. Stopping twice is a no-op.
    pub fn stop(&self) {
        Runtime::stop(self.key);
    }

    /// Suspend notification delivery.
    pub fn pause(&self) {
        Runtime::pause(self.key);
    }

    /// Resume notification delivery, replaying a trigger that arrived while
    /// paused.
    pub fn resume(&self) {
        Runtime::resume(self.key);
    }

    /// Check if the effect has not been stopped.
    pub fn is_active(&self) -> bool {
        self.flags().contains(SubscriberFlags::ACTIVE)
    }

    /// Check if a dependency notified since the last run.
    pub fn is_dirty(&self) -> bool {
        self.flags().contains(SubscriberFlags::DIRTY)
    }

    pub fn is_paused(&self) -> bool {
        self.flags().contains(SubscriberFlags::PAUSED)
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        Runtime::run_count(self.key)
    }

    /// Get the number of dependencies.
    pub fn dependency_count(&self) -> usize {
        Runtime::dependency_count(self.key)
    }

    fn flags(&self) -> SubscriberFlags {
        Runtime::flags(self.key).unwrap_or_default()
    }

    pub(crate) fn key(&self) -> SubKey {
        self.key
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id)
            .field("flags", &self.flags())
            .field("run_count", &self.run_count())
            .finish()
    }
}

/// Shorthand for [`Effect::new`].
pub fn effect<F>(run: F) -> Effect
where
    F: FnMut() + 'static,
{
    Effect::new(run)
}

/// Register a cleanup on the running effect. It runs before the effect's next
/// run and when the effect is stopped.
///
/// Returns `false` (and drops the cleanup) when no effect is running.
pub fn on_cleanup<F>(cleanup: F) -> bool
where
    F: FnOnce() + 'static,
{
    match Runtime::register_cleanup(Box::new(cleanup)) {
        Ok(()) => true,
        Err(cleanup) => {
            warn!("on_cleanup called outside of a running effect");
            drop(cleanup);
            false
        }
    }
}

// ---- Tests ----
