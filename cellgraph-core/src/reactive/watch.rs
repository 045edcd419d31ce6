//! Watchers
//!
//! A watcher pairs a tracked source with an untracked callback. The source is
//! read inside a lazy effect; when a notification arrives, the effect's
//! scheduler hands a job to the flush queue (`Pre`/`Post`) or runs it on the
//! spot (`Sync`). The job re-reads the source and calls the callback with the
//! new and the previous value if they differ.
//!
//! # Batching
//!
//! A `Sync` watcher sees every write. A `Pre` or `Post` watcher is queued
//! once per flush, so a burst of writes collapses into one callback that
//! receives the final value and the value from before the burst.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::mem;
use std::rc::Rc;

use super::context::ReactiveContext;
use super::effect::{Effect, EffectOptions};
use super::memo::Memo;
use super::runtime::Runtime;
use super::signal::Signal;
use crate::collections::{ReactiveMap, ReactiveSet, ReactiveVec, Traverse, Value};
use crate::config::FlushMode;
use crate::graph::scheduler::{queue_post_flush, queue_pre_flush, Job};
use crate::graph::Cleanup;

/// Something a watcher can observe.
pub trait WatchSource: 'static {
    type Output: PartialEq + Traverse + 'static;

    /// Read the current value, tracking what it depends on.
    fn read(&self) -> Self::Output;

    /// Traversal depth used when the watcher does not set `deep`. Sources
    /// that return `Some` always fire their callback, since an in-place
    /// mutation cannot be seen by comparing values.
    fn default_depth(&self) -> Option<usize> {
        None
    }
}

impl<T> WatchSource for Signal<T>
where
    T: Clone + PartialEq + Traverse + 'static,
{
    type Output = T;

    fn read(&self) -> T {
        self.get()
    }
}

impl<T> WatchSource for Memo<T>
where
    T: Clone + PartialEq + Traverse + 'static,
{
    type Output = T;

    fn read(&self) -> T {
        self.get()
    }
}

impl<T> WatchSource for ReactiveVec<T>
where
    T: Clone + Traverse + 'static,
{
    type Output = ReactiveVec<T>;

    fn read(&self) -> Self::Output {
        self.clone()
    }

    fn default_depth(&self) -> Option<usize> {
        Some(usize::MAX)
    }
}

impl<K, V> WatchSource for ReactiveMap<K, V>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + Traverse + 'static,
{
    type Output = ReactiveMap<K, V>;

    fn read(&self) -> Self::Output {
        self.clone()
    }

    fn default_depth(&self) -> Option<usize> {
        Some(usize::MAX)
    }
}

impl<T> WatchSource for ReactiveSet<T>
where
    T: Eq + Hash + Clone + Traverse + 'static,
{
    type Output = ReactiveSet<T>;

    fn read(&self) -> Self::Output {
        self.clone()
    }

    fn default_depth(&self) -> Option<usize> {
        Some(usize::MAX)
    }
}

impl WatchSource for Value {
    type Output = Value;

    fn read(&self) -> Value {
        self.clone()
    }

    fn default_depth(&self) -> Option<usize> {
        self.is_reactive().then_some(usize::MAX)
    }
}

/// A getter closure used as a watch source. See [`source_fn`].
pub struct SourceFn<F>(F);

/// Watch whatever `getter` reads.
pub fn source_fn<F, R>(getter: F) -> SourceFn<F>
where
    F: Fn() -> R + 'static,
    R: PartialEq + Traverse + 'static,
{
    SourceFn(getter)
}

impl<F, R> WatchSource for SourceFn<F>
where
    F: Fn() -> R + 'static,
    R: PartialEq + Traverse + 'static,
{
    type Output = R;

    fn read(&self) -> R {
        (self.0)()
    }
}

impl<S: WatchSource> WatchSource for Vec<S> {
    type Output = Vec<S::Output>;

    fn read(&self) -> Self::Output {
        self.iter().map(WatchSource::read).collect()
    }

    fn default_depth(&self) -> Option<usize> {
        self.iter().filter_map(WatchSource::default_depth).max()
    }
}

macro_rules! tuple_source {
    ($($name:ident : $index:tt),+) => {
        impl<$($name: WatchSource),+> WatchSource for ($($name,)+) {
            type Output = ($($name::Output,)+);

            fn read(&self) -> Self::Output {
                ($(self.$index.read(),)+)
            }

            fn default_depth(&self) -> Option<usize> {
                [$(self.$index.default_depth()),+].into_iter().flatten().max()
            }
        }
    };
}

tuple_source!(A: 0, B: 1);
tuple_source!(A: 0, B: 1, C: 2);
tuple_source!(A: 0, B: 1, C: 2, D: 3);

/// Options for [`watch`] and [`watch_effect`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchOptions {
    /// Call the callback once right away, with no previous value.
    pub immediate: bool,
    /// Levels of nested containers to track. `Some(usize::MAX)` tracks
    /// everything reachable; `None` uses the source's default.
    pub deep: Option<usize>,
    /// Stop after the first callback.
    pub once: bool,
    /// When the callback runs. `None` uses the runtime's default.
    pub flush: Option<FlushMode>,
}

/// Registers callbacks run before the next callback and when the watcher
/// stops.
#[derive(Clone, Default)]
pub struct OnCleanup {
    callbacks: Rc<RefCell<Vec<Cleanup>>>,
}

impl OnCleanup {
    pub fn register<F>(&self, cleanup: F)
    where
        F: FnOnce() + 'static,
    {
        self.callbacks.borrow_mut().push(Box::new(cleanup));
    }

    fn run(&self) {
        let callbacks = mem::take(&mut *self.callbacks.borrow_mut());
        for callback in callbacks {
            callback();
        }
    }
}

impl fmt::Debug for OnCleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnCleanup")
            .field("pending", &self.callbacks.borrow().len())
            .finish()
    }
}

/// Handle returned by [`watch`] and [`watch_effect`].
#[derive(Clone)]
pub struct WatchHandle {
    effect: Effect,
    job: Option<Rc<Job>>,
}

impl WatchHandle {
    /// Stop watching. Pending cleanups run; a queued callback is dropped.
    pub fn stop(&self) {
        self.effect.stop();
        if let Some(job) = &self.job {
            job.dispose();
        }
    }

    /// Hold notifications until [`resume`](Self::resume).
    pub fn pause(&self) {
        self.effect.pause();
    }

    /// Deliver a notification held while paused.
    pub fn resume(&self) {
        self.effect.resume();
    }

    pub fn is_active(&self) -> bool {
        self.effect.is_active()
    }

    /// The effect tracking the source.
    pub fn effect(&self) -> Effect {
        self.effect
    }
}

impl fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHandle")
            .field("effect", &self.effect)
            .field("job", &self.job)
            .finish()
    }
}

fn scheduler_for(flush: FlushMode, job: &Rc<Job>) -> Rc<dyn Fn()> {
    let job = Rc::clone(job);
    match flush {
        FlushMode::Sync => Rc::new(move || {
            job.invoke();
        }),
        FlushMode::Pre => Rc::new(move || queue_pre_flush(job.clone())),
        FlushMode::Post => Rc::new(move || queue_post_flush(job.clone())),
    }
}

/// Call `callback` whenever `source` changes.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(0);
/// let handle = watch(
///     count.clone(),
///     |new, old, _| println!("{old:?} -> {new}"),
///     WatchOptions { flush: Some(FlushMode::Post), ..Default::default() },
/// );
///
/// count.set(1);
/// count.set(2);
/// flush()?; // Prints once: "Some(0) -> 2"
/// ```
pub fn watch<S, F>(source: S, mut callback: F, options: WatchOptions) -> WatchHandle
where
    S: WatchSource,
    F: FnMut(&S::Output, Option<&S::Output>, &OnCleanup) + 'static,
{
    let flush = options.flush.unwrap_or_else(|| Runtime::config().default_flush);
    let depth = options.deep.or_else(|| source.default_depth());
    let force = depth.is_some();
    let once = options.once;

    let latest: Rc<RefCell<Option<S::Output>>> = Rc::new(RefCell::new(None));
    let cleanups = OnCleanup::default();

    let getter = {
        let latest = latest.clone();
        move || {
            let value = source.read();
            if let Some(depth) = depth {
                value.traverse(depth, &mut HashSet::new());
            }
            *latest.borrow_mut() = Some(value);
        }
    };
    let on_stop = {
        let cleanups = cleanups.clone();
        move || cleanups.run()
    };
    let effect = Effect::with_options(
        getter,
        EffectOptions {
            lazy: true,
            on_stop: Some(Box::new(on_stop)),
            ..EffectOptions::default()
        },
    );

    let mut previous = None;
    if !options.immediate {
        effect.run();
        previous = latest.borrow_mut().take();
    }

    let mut first = options.immediate;
    let job = Job::new(effect.subscriber_id().raw(), move || {
        if !effect.is_active() || Runtime::defer_if_paused(effect.key()) {
            return;
        }
        if !first && !Runtime::confirm_dirty(effect.key()) {
            return;
        }
        first = false;
        effect.run();
        let Some(current) = latest.borrow_mut().take() else {
            return;
        };
        if !force && previous.as_ref() == Some(&current) {
            return;
        }
        cleanups.run();
        {
            let _ctx = ReactiveContext::detached();
            callback(&current, previous.as_ref(), &cleanups);
        }
        previous = Some(current);
        if once {
            effect.stop();
        }
    });

    Runtime::set_scheduler(effect.key(), scheduler_for(flush, &job));
    if options.immediate {
        job.invoke();
    }
    WatchHandle {
        effect,
        job: Some(job),
    }
}

/// Run `f` now and again whenever what it read changes, on the watcher
/// flush schedule. Cleanups registered on the [`OnCleanup`] run before each
/// re-run and on stop.
pub fn watch_effect<F>(mut f: F, options: WatchOptions) -> WatchHandle
where
    F: FnMut(&OnCleanup) + 'static,
{
    let flush = options.flush.unwrap_or_else(|| Runtime::config().default_flush);
    let cleanups = OnCleanup::default();

    let body = {
        let cleanups = cleanups.clone();
        move || {
            cleanups.run();
            f(&cleanups);
        }
    };
    let on_stop = {
        let cleanups = cleanups.clone();
        move || cleanups.run()
    };
    let effect = Effect::with_options(
        body,
        EffectOptions {
            lazy: true,
            sync: flush == FlushMode::Sync,
            on_stop: Some(Box::new(on_stop)),
            ..EffectOptions::default()
        },
    );

    let job = match flush {
        FlushMode::Sync => None,
        mode => {
            let job = Job::new(effect.subscriber_id().raw(), move || Runtime::run_if_dirty(effect.key()));
            Runtime::set_scheduler(effect.key(), scheduler_for(mode, &job));
            Some(job)
        }
    };
    effect.run();
    WatchHandle { effect, job }
}

// ---- Tests ----

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::graph::scheduler::flush;
    use crate::reactive::batch;

    type Log<T> = Rc<RefCell<Vec<T>>>;

    fn recorder<T: Clone + 'static>() -> (Log<(T, Option<T>)>, impl FnMut(&T, Option<&T>, &OnCleanup)) {
        let log: Log<(T, Option<T>)> = Rc::new(RefCell::new(Vec::new()));
        let log_clone = log.clone();
        (log, move |new: &T, old: Option<&T>, _: &OnCleanup| {
            log_clone.borrow_mut().push((new.clone(), old.cloned()))
        })
    }

    fn with_flush(flush: FlushMode) -> WatchOptions {
        WatchOptions {
            flush: Some(flush),
            ..WatchOptions::default()
        }
    }

    #[test]
    fn sync_watcher_sees_every_write() {
        let count = Signal::new(0);
        let (log, cb) = recorder();
        watch(count.clone(), cb, with_flush(FlushMode::Sync));

        count.set(1);
        count.set(2);
        count.set(3);
        assert_eq!(*log.borrow(), vec![(1, Some(0)), (2, Some(1)), (3, Some(2))]);
    }

    #[test]
    fn deferred_watchers_see_one_callback_per_burst() {
        for mode in [FlushMode::Pre, FlushMode::Post] {
            let count = Signal::new(0);
            let (log, cb) = recorder();
            watch(count.clone(), cb, with_flush(mode));

            count.set(1);
            count.set(2);
            count.set(3);
            assert!(log.borrow().is_empty());

            flush().unwrap();
            assert_eq!(*log.borrow(), vec![(3, Some(0))]);
        }
    }

    #[test]
    fn burst_ending_on_original_value_is_silent() {
        let count = Signal::new(0);
        let (log, cb) = recorder();
        watch(count.clone(), cb, WatchOptions::default());

        count.set(1);
        count.set(0);
        flush().unwrap();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn immediate_fires_without_previous() {
        let count = Signal::new(5);
        let (log, cb) = recorder();
        watch(
            count.clone(),
            cb,
            WatchOptions {
                immediate: true,
                ..WatchOptions::default()
            },
        );
        assert_eq!(*log.borrow(), vec![(5, None)]);

        count.set(6);
        flush().unwrap();
        assert_eq!(*log.borrow(), vec![(5, None), (6, Some(5))]);
    }

    #[test]
    fn once_stops_after_first_callback() {
        let count = Signal::new(0);
        let (log, cb) = recorder();
        let handle = watch(
            count.clone(),
            cb,
            WatchOptions {
                once: true,
                flush: Some(FlushMode::Sync),
                ..WatchOptions::default()
            },
        );

        count.set(1);
        count.set(2);
        assert_eq!(log.borrow().len(), 1);
        assert!(!handle.is_active());
        assert_eq!(count.subscriber_count(), 0);
    }

    #[test]
    fn container_sources_are_deep() {
        let list = ReactiveVec::new(vec![ReactiveVec::new(vec![1])]);
        let calls = Rc::new(Cell::new(0));
        let calls_clone = calls.clone();
        watch(
            list.clone(),
            move |_, _, _| calls_clone.set(calls_clone.get() + 1),
            WatchOptions::default(),
        );

        // Mutating a nested list fires even though the outer handle is the same.
        list.get(0).unwrap().push(2);
        flush().unwrap();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn explicit_depth_limits_tracking() {
        let list = ReactiveVec::new(vec![ReactiveVec::new(vec![1])]);
        let calls = Rc::new(Cell::new(0));
        let calls_clone = calls.clone();
        watch(
            list.clone(),
            move |_, _, _| calls_clone.set(calls_clone.get() + 1),
            WatchOptions {
                deep: Some(1),
                ..WatchOptions::default()
            },
        );

        list.get(0).unwrap().push(2);
        flush().unwrap();
        assert_eq!(calls.get(), 0);

        list.push(ReactiveVec::new(vec![]));
        flush().unwrap();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn multiple_sources_report_together() {
        let a = Signal::new(1);
        let b = Signal::new("x".to_string());
        let (log, cb) = recorder::<(i32, String)>();
        watch((a.clone(), b.clone()), cb, WatchOptions::default());

        batch(|| {
            a.set(2);
            b.set("y".to_string());
        });
        flush().unwrap();
        assert_eq!(
            *log.borrow(),
            vec![((2, "y".to_string()), Some((1, "x".to_string())))]
        );
    }

    #[test]
    fn getter_source_compares_results() {
        let count = Signal::new(1);
        let c = count.clone();
        let (log, cb) = recorder();
        watch(source_fn(move || c.get() > 5), cb, WatchOptions::default());

        count.set(2);
        flush().unwrap();
        assert!(log.borrow().is_empty());

        count.set(10);
        flush().unwrap();
        assert_eq!(*log.borrow(), vec![(true, Some(false))]);
    }

    #[test]
    fn cleanup_runs_before_next_callback_and_on_stop() {
        let count = Signal::new(0);
        let events = Rc::new(RefCell::new(Vec::new()));
        let events_clone = events.clone();
        let handle = watch(
            count.clone(),
            move |new: &i32, _, on_cleanup: &OnCleanup| {
                events_clone.borrow_mut().push(format!("run {new}"));
                let events = events_clone.clone();
                let new = *new;
                on_cleanup.register(move || events.borrow_mut().push(format!("cleanup {new}")));
            },
            with_flush(FlushMode::Sync),
        );

        count.set(1);
        count.set(2);
        handle.stop();
        assert_eq!(
            *events.borrow(),
            vec!["run 1", "cleanup 1", "run 2", "cleanup 2"]
        );
    }

    #[test]
    fn paused_watcher_replays_once() {
        let count = Signal::new(0);
        let (log, cb) = recorder();
        let handle = watch(count.clone(), cb, WatchOptions::default());

        handle.pause();
        count.set(1);
        flush().unwrap();
        count.set(2);
        flush().unwrap();
        assert!(log.borrow().is_empty());

        handle.resume();
        flush().unwrap();
        assert_eq!(*log.borrow(), vec![(2, Some(0))]);
    }

    #[test]
    fn watcher_paused_after_queueing_waits_for_resume() {
        for mode in [FlushMode::Pre, FlushMode::Post] {
            let count = Signal::new(0);
            let (log, cb) = recorder();
            let handle = watch(count.clone(), cb, with_flush(mode));

            count.set(1);
            handle.pause();
            flush().unwrap();
            assert!(log.borrow().is_empty());

            handle.resume();
            flush().unwrap();
            assert_eq!(*log.borrow(), vec![(1, Some(0))]);
            handle.stop();
        }
    }

    #[test]
    fn stopped_watcher_drops_queued_callback() {
        let count = Signal::new(0);
        let (log, cb) = recorder();
        let handle = watch(count.clone(), cb, WatchOptions::default());

        count.set(1);
        handle.stop();
        flush().unwrap();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn phases_order_pre_main_post() {
        let count = Signal::new(0);
        let order = Rc::new(RefCell::new(Vec::new()));

        let o = order.clone();
        watch(count.clone(), move |_, _, _| o.borrow_mut().push("post"), with_flush(FlushMode::Post));
        let o = order.clone();
        let c = count.clone();
        Effect::new(move || {
            if c.get() != 0 {
                o.borrow_mut().push("effect");
            }
        });
        let o = order.clone();
        watch(count.clone(), move |_, _, _| o.borrow_mut().push("pre"), with_flush(FlushMode::Pre));

        count.set(1);
        flush().unwrap();
        assert_eq!(*order.borrow(), vec!["pre", "effect", "post"]);
    }

    #[test]
    fn watch_effect_follows_flush_mode() {
        let count = Signal::new(0);
        let seen = Rc::new(RefCell::new(Vec::new()));

        let c = count.clone();
        let s = seen.clone();
        let handle = watch_effect(move |_| s.borrow_mut().push(c.get()), with_flush(FlushMode::Post));
        assert_eq!(*seen.borrow(), vec![0]);

        count.set(1);
        count.set(2);
        assert_eq!(*seen.borrow(), vec![0]);
        flush().unwrap();
        assert_eq!(*seen.borrow(), vec![0, 2]);

        handle.stop();
        count.set(3);
        flush().unwrap();
        assert_eq!(*seen.borrow(), vec![0, 2]);
    }

    #[test]
    fn callback_reads_are_not_tracked() {
        let source = Signal::new(0);
        let other = Signal::new(0);
        let calls = Rc::new(Cell::new(0));

        let o = other.clone();
        let calls_clone = calls.clone();
        watch(
            source.clone(),
            move |_, _, _| {
                o.get();
                calls_clone.set(calls_clone.get() + 1);
            },
            WatchOptions::default(),
        );

        source.set(1);
        flush().unwrap();
        other.set(1);
        flush().unwrap();
        assert_eq!(calls.get(), 1);
        assert_eq!(other.subscriber_count(), 0);
    }

    #[test]
    fn callback_panic_is_isolated() {
        let count = Signal::new(0);
        let (log, cb) = recorder();
        watch(count.clone(), |_: &i32, _, _| panic!("watcher failed"), WatchOptions::default());
        watch(count.clone(), cb, WatchOptions::default());

        count.set(1);
        assert!(flush().is_err());
        assert_eq!(*log.borrow(), vec![(1, Some(0))]);

        count.set(2);
        assert!(flush().is_err());
        assert_eq!(log.borrow().len(), 2);
    }
}
