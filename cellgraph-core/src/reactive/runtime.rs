//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, memos, and
//! effects. It owns the dependency graph and decides what runs when a
//! producer changes.
//!
//! # How It Works
//!
//! 1. Reading a producer while a subscriber runs creates (or refreshes) the
//!    link between them.
//!
//! 2. Writing a producer bumps its version and the world version, then walks
//!    its subscriber list inside a batch:
//!    a. Memos are marked dirty and pass the notification on to their own
//!       subscribers; they recompute lazily on the next read.
//!    b. Effects are collected once per batch.
//!
//! 3. When the outermost batch ends, each collected effect is triggered: a
//!    custom scheduler is called, a sync effect re-runs inline, and every
//!    other effect is queued on the flush queue.
//!
//! 4. Before an effect actually re-runs, its dependency versions are
//!    compared (refreshing memos along the way). A memo that recomputed to an
//!    equal value keeps its version, so nothing downstream of it runs.
//!
//! # Thread Model
//!
//! The graph is a documented per-thread global. Everything created on a
//! thread belongs to that thread's runtime and must be used there; the types
//! are `!Send`. [`Runtime::reset`] is the explicit teardown.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use smallvec::SmallVec;
use tracing::{debug, error};

use super::context::ReactiveContext;
use super::subscriber::SubscriberId;
use crate::config::RuntimeConfig;
use crate::error::ReactiveError;
use crate::graph::scheduler::{self, Job};
use crate::graph::{
    Cleanup, EffectSlot, Graph, GraphStats, LinkKey, MemoCompute, MemoSlot, NodeKey, SubKey, SubKind,
    SubNode, SubscriberFlags,
};

type ErrorHandler = Rc<dyn Fn(&ReactiveError)>;

struct RuntimeState {
    graph: RefCell<Graph>,
    /// Bumped on every producer write.
    global_version: Cell<u64>,
    batch_depth: Cell<u32>,
    batched_effects: RefCell<Vec<SubKey>>,
    batched_memos: RefCell<Vec<SubKey>>,
    error_handler: RefCell<Option<ErrorHandler>>,
    config: RefCell<RuntimeConfig>,
}

impl RuntimeState {
    fn new() -> Self {
        Self {
            graph: RefCell::new(Graph::new()),
            global_version: Cell::new(0),
            batch_depth: Cell::new(0),
            batched_effects: RefCell::new(Vec::new()),
            batched_memos: RefCell::new(Vec::new()),
            error_handler: RefCell::new(None),
            config: RefCell::new(RuntimeConfig::default()),
        }
    }
}

thread_local! {
    static RUNTIME: RuntimeState = RuntimeState::new();
}

fn with_graph<R>(f: impl FnOnce(&mut Graph) -> R) -> R {
    RUNTIME.with(|rt| f(&mut rt.graph.borrow_mut()))
}

/// Graph access for drop paths: gives up quietly during thread teardown.
fn try_with_graph<R>(f: impl FnOnce(&mut Graph) -> R) -> Option<R> {
    RUNTIME
        .try_with(|rt| rt.graph.try_borrow_mut().ok().map(|mut graph| f(&mut graph)))
        .ok()
        .flatten()
}

/// What to do with an effect whose batch just ended.
enum Trigger {
    Schedule(Rc<dyn Fn()>),
    RunNow,
    Queue(Rc<Job>),
}

/// The per-thread reactive runtime.
pub struct Runtime;

impl Runtime {
    // ------------------------------------------------------------------
    // Configuration, errors, diagnostics
    // ------------------------------------------------------------------

    /// Install a configuration for this thread.
    pub fn configure(config: RuntimeConfig) {
        RUNTIME.with(|rt| *rt.config.borrow_mut() = config);
    }

    /// Get this thread's configuration.
    pub fn config() -> RuntimeConfig {
        RUNTIME.with(|rt| rt.config.borrow().clone())
    }

    /// Route every subscriber error to `handler` instead of returning or
    /// re-raising it.
    pub fn set_error_handler<F>(handler: F)
    where
        F: Fn(&ReactiveError) + 'static,
    {
        let previous = RUNTIME.with(|rt| rt.error_handler.borrow_mut().replace(Rc::new(handler)));
        drop(previous);
    }

    /// Remove the error handler.
    pub fn clear_error_handler() {
        let previous = RUNTIME.with(|rt| rt.error_handler.borrow_mut().take());
        drop(previous);
    }

    fn error_handler() -> Option<ErrorHandler> {
        RUNTIME.with(|rt| rt.error_handler.borrow().clone())
    }

    /// Hand an error to the handler, or keep it if it is the first one.
    pub(crate) fn report(err: ReactiveError, first: &mut Option<ReactiveError>) {
        if let Some(handler) = Self::error_handler() {
            handler(&err);
        } else if first.is_none() {
            *first = Some(err);
        } else {
            error!(error = %err, "additional subscriber error");
        }
    }

    /// The world version: bumped on every producer write.
    pub fn global_version() -> u64 {
        RUNTIME.with(|rt| rt.global_version.get())
    }

    /// Counts of live nodes, subscribers and links.
    pub fn stats() -> GraphStats {
        with_graph(|g| g.stats())
    }

    /// Check that every link sits on both of its lists.
    pub fn verify_graph() -> Result<GraphStats, ReactiveError> {
        with_graph(|g| g.verify())
    }

    /// Check if a subscriber is registering dependencies right now.
    pub fn is_tracking() -> bool {
        ReactiveContext::is_active()
    }

    /// Tear down this thread's graph and queues.
    ///
    /// Handles created before the reset become inert: their keys no longer
    /// resolve, so reads return their last value without tracking and writes
    /// notify nobody.
    pub fn reset() {
        let drained = with_graph(|g| {
            let subs: Vec<_> = g.subs.drain().collect();
            let nodes: Vec<_> = g.nodes.drain().collect();
            let links: Vec<_> = g.links.drain().collect();
            (subs, nodes, links)
        });
        drop(drained);
        RUNTIME.with(|rt| {
            rt.global_version.set(0);
            rt.batch_depth.set(0);
            rt.batched_effects.borrow_mut().clear();
            rt.batched_memos.borrow_mut().clear();
        });
        scheduler::reset();
        super::scope::reset();
    }

    // ------------------------------------------------------------------
    // Producers
    // ------------------------------------------------------------------

    pub(crate) fn create_node() -> NodeKey {
        with_graph(|g| g.insert_node(None))
    }

    /// A node freed automatically once nothing subscribes to it.
    pub(crate) fn create_key_node() -> NodeKey {
        with_graph(|g| g.insert_transient_node())
    }

    pub(crate) fn node_exists(node: NodeKey) -> bool {
        with_graph(|g| g.nodes.contains_key(node))
    }

    pub(crate) fn release_node(node: NodeKey) {
        try_with_graph(|g| g.release_node(node));
    }

    pub(crate) fn subscriber_count(node: NodeKey) -> usize {
        with_graph(|g| g.nodes.get(node).map_or(0, |dep| dep.sub_count))
    }

    /// Link `node` to the running subscriber, if any.
    pub(crate) fn track(node: NodeKey) -> Option<LinkKey> {
        let sub = ReactiveContext::tracking_subscriber()?;
        with_graph(|g| {
            let dep = g.nodes.get(node)?;
            if dep.memo == Some(sub) {
                return None;
            }
            let active = g.subs.get(sub)?.flags.contains(SubscriberFlags::ACTIVE);
            if !active {
                return None;
            }
            let existing = dep
                .active_link
                .filter(|key| g.links.get(*key).is_some_and(|link| link.sub == sub));
            match existing {
                Some(key) => {
                    if g.links[key].version.is_none() {
                        g.links[key].version = Some(g.nodes[node].version);
                        g.move_dep_to_tail(key);
                    }
                    Some(key)
                }
                None => Some(g.link(node, sub)),
            }
        })
    }

    /// Record the producer's current version on a link.
    pub(crate) fn sync_link(link: LinkKey) {
        with_graph(|g| {
            let version = g
                .links
                .get(link)
                .and_then(|l| g.nodes.get(l.node))
                .map(|dep| dep.version);
            if let Some(version) = version {
                g.links[link].version = Some(version);
            }
        });
    }

    /// A producer changed: bump versions and notify its subscribers.
    pub(crate) fn trigger(node: NodeKey) {
        let bumped = with_graph(|g| match g.nodes.get_mut(node) {
            Some(dep) => {
                dep.version += 1;
                true
            }
            None => false,
        });
        if !bumped {
            return;
        }
        RUNTIME.with(|rt| rt.global_version.set(rt.global_version.get() + 1));
        Self::start_batch();
        Self::propagate(node);
        Self::end_batch();
    }

    fn propagate(node: NodeKey) {
        let subs = with_graph(|g| g.subscribers_of(node));
        for sub in subs {
            if let Some(memo_node) = Self::notify(sub) {
                Self::propagate(memo_node);
            }
        }
    }

    /// Deliver a notification. Returns the output node of a memo that was
    /// newly invalidated so the caller can pass the notification on.
    fn notify(sub: SubKey) -> Option<NodeKey> {
        let current = ReactiveContext::current_subscriber();
        RUNTIME.with(|rt| {
            let mut graph = rt.graph.borrow_mut();
            let node = graph.subs.get_mut(sub)?;
            let flags = &mut node.flags;

            if let SubKind::Memo(memo) = &node.kind {
                flags.insert(SubscriberFlags::DIRTY);
                if !flags.contains(SubscriberFlags::NOTIFIED) && current != Some(sub) {
                    flags.insert(SubscriberFlags::NOTIFIED);
                    rt.batched_memos.borrow_mut().push(sub);
                    return Some(memo.node);
                }
                return None;
            }

            if !flags.contains(SubscriberFlags::ACTIVE) {
                return None;
            }
            if current == Some(sub) {
                // A self-trigger is accepted once until the next outside trigger.
                if !flags.contains(SubscriberFlags::ALLOW_RECURSE) || flags.contains(SubscriberFlags::RECURSED) {
                    return None;
                }
                flags.insert(SubscriberFlags::RECURSED);
            } else {
                if flags.contains(SubscriberFlags::RUNNING) && !flags.contains(SubscriberFlags::ALLOW_RECURSE) {
                    return None;
                }
                flags.remove(SubscriberFlags::RECURSED);
            }
            if !flags.contains(SubscriberFlags::NOTIFIED) {
                flags.insert(SubscriberFlags::NOTIFIED | SubscriberFlags::DIRTY);
                rt.batched_effects.borrow_mut().push(sub);
            }
            None
        })
    }

    // ------------------------------------------------------------------
    // Batching
    // ------------------------------------------------------------------

    pub(crate) fn start_batch() {
        RUNTIME.with(|rt| rt.batch_depth.set(rt.batch_depth.get() + 1));
    }

    /// Close a batch. The outermost close triggers every collected effect,
    /// each in isolation; the first panic is resumed afterwards unless an
    /// error handler took it.
    pub(crate) fn end_batch() {
        if let Some(payload) = Self::finish_batch() {
            panic::resume_unwind(payload);
        }
    }

    fn finish_batch() -> Option<Box<dyn Any + Send>> {
        let depth = RUNTIME.with(|rt| {
            let depth = rt.batch_depth.get().saturating_sub(1);
            rt.batch_depth.set(depth);
            depth
        });
        if depth > 0 {
            return None;
        }

        let memos = RUNTIME.with(|rt| mem::take(&mut *rt.batched_memos.borrow_mut()));
        with_graph(|g| {
            for memo in memos {
                if let Some(node) = g.subs.get_mut(memo) {
                    node.flags.remove(SubscriberFlags::NOTIFIED);
                }
            }
        });

        let mut first_panic = None;
        loop {
            let effects = RUNTIME.with(|rt| mem::take(&mut *rt.batched_effects.borrow_mut()));
            if effects.is_empty() {
                break;
            }
            for effect in effects {
                let active = with_graph(|g| match g.subs.get_mut(effect) {
                    Some(node) => {
                        node.flags.remove(SubscriberFlags::NOTIFIED);
                        node.flags.contains(SubscriberFlags::ACTIVE)
                    }
                    None => false,
                });
                if !active {
                    continue;
                }
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| Self::trigger_effect(effect)));
                if let Err(payload) = outcome {
                    let id = Self::subscriber_id(effect).map_or(0, |id| id.raw());
                    let err = ReactiveError::from_panic(id, payload.as_ref());
                    if let Some(handler) = Self::error_handler() {
                        handler(&err);
                    } else if first_panic.is_none() {
                        first_panic = Some(payload);
                    } else {
                        error!(error = %err, "additional error during synchronous trigger");
                    }
                }
            }
        }
        first_panic
    }

    fn trigger_effect(key: SubKey) {
        let action = with_graph(|g| {
            let node = g.subs.get_mut(key)?;
            if node.flags.contains(SubscriberFlags::PAUSED) {
                node.flags.insert(SubscriberFlags::PENDING);
                return None;
            }
            let sync = node.flags.contains(SubscriberFlags::SYNC);
            let slot = node.effect()?;
            Some(match &slot.scheduler {
                Some(scheduler) => Trigger::Schedule(scheduler.clone()),
                None if sync => Trigger::RunNow,
                None => Trigger::Queue(slot.job.clone()),
            })
        });
        match action {
            Some(Trigger::Schedule(scheduler)) => scheduler(),
            Some(Trigger::RunNow) => Self::run_if_dirty(key),
            Some(Trigger::Queue(job)) => scheduler::queue_job(job),
            None => {}
        }
    }

    // ------------------------------------------------------------------
    // Subscribers
    // ------------------------------------------------------------------

    pub(crate) fn create_effect(
        body: Rc<RefCell<dyn FnMut()>>,
        scheduler: Option<Rc<dyn Fn()>>,
        flags: SubscriberFlags,
        on_stop: Option<Cleanup>,
    ) -> (SubKey, SubscriberId) {
        let id = SubscriberId::new();
        let key = with_graph(|g| {
            g.subs.insert_with_key(|key| {
                let job = Job::new(id.raw(), move || Runtime::run_if_dirty(key));
                job.set_allow_recurse(flags.contains(SubscriberFlags::ALLOW_RECURSE));
                SubNode::new(
                    id,
                    flags | SubscriberFlags::ACTIVE,
                    SubKind::Effect(EffectSlot {
                        body,
                        scheduler,
                        job,
                        cleanups: SmallVec::new(),
                        on_stop,
                        runs: 0,
                    }),
                )
            })
        });
        (key, id)
    }

    pub(crate) fn create_memo(compute: Weak<dyn MemoCompute>) -> (SubKey, NodeKey, SubscriberId) {
        let id = SubscriberId::new();
        let (key, node) = with_graph(|g| {
            let key = g.insert_sub(SubNode::new(
                id,
                SubscriberFlags::ACTIVE | SubscriberFlags::DIRTY,
                SubKind::Memo(MemoSlot {
                    node: NodeKey::default(),
                    compute,
                    global_version: None,
                }),
            ));
            let node = g.insert_node(Some(key));
            if let Some(memo) = g.subs[key].memo_mut() {
                memo.node = node;
            }
            (key, node)
        });
        (key, node, id)
    }

    pub(crate) fn set_scheduler(key: SubKey, scheduler: Rc<dyn Fn()>) {
        let previous = with_graph(|g| {
            g.subs
                .get_mut(key)
                .and_then(|node| node.effect_mut())
                .and_then(|slot| slot.scheduler.replace(scheduler))
        });
        drop(previous);
    }

    pub(crate) fn subscriber_id(key: SubKey) -> Option<SubscriberId> {
        with_graph(|g| g.subs.get(key).map(|node| node.id))
    }

    pub(crate) fn flags(key: SubKey) -> Option<SubscriberFlags> {
        with_graph(|g| g.subs.get(key).map(|node| node.flags))
    }

    pub(crate) fn dependency_count(key: SubKey) -> usize {
        with_graph(|g| g.dependency_count(key))
    }

    pub(crate) fn run_count(key: SubKey) -> usize {
        with_graph(|g| g.subs.get(key).and_then(|node| node.effect()).map_or(0, |slot| slot.runs))
    }

    /// Whether any dependency changed since the subscriber last read it.
    /// Memo dependencies are refreshed on the way, in read order.
    pub(crate) fn is_dirty(key: SubKey) -> bool {
        let mut cursor = with_graph(|g| g.subs.get(key).and_then(|node| node.deps_head));
        while let Some(link) = cursor {
            let Some((node, stale, memo)) = with_graph(|g| {
                let l = g.links.get(link)?;
                let dep = g.nodes.get(l.node)?;
                Some((l.node, l.version != Some(dep.version), dep.memo))
            }) else {
                return true;
            };
            if stale {
                return true;
            }
            if let Some(memo) = memo {
                Self::refresh_memo(memo);
                let changed = with_graph(|g| {
                    let version = g.nodes.get(node).map(|dep| dep.version);
                    g.links.get(link).map_or(true, |l| l.version != version)
                });
                if changed {
                    return true;
                }
            }
            cursor = with_graph(|g| g.links.get(link).and_then(|l| l.next_dep));
        }
        false
    }

    /// Confirm a notification with a version walk. A false alarm clears the
    /// dirty flag.
    pub(crate) fn confirm_dirty(key: SubKey) -> bool {
        if Self::is_dirty(key) {
            return true;
        }
        with_graph(|g| {
            if let Some(node) = g.subs.get_mut(key) {
                node.flags.remove(SubscriberFlags::DIRTY);
            }
        });
        false
    }

    /// Hold a queued run of a paused subscriber until it resumes.
    pub(crate) fn defer_if_paused(key: SubKey) -> bool {
        with_graph(|g| match g.subs.get_mut(key) {
            Some(node) if node.flags.contains(SubscriberFlags::PAUSED) => {
                node.flags.insert(SubscriberFlags::PENDING);
                true
            }
            _ => false,
        })
    }

    /// Re-run an effect if a dependency actually changed.
    pub(crate) fn run_if_dirty(key: SubKey) {
        if Self::defer_if_paused(key) {
            return;
        }
        if Self::confirm_dirty(key) {
            Self::run_effect(key);
        }
    }

    /// Run an effect body under tracking: cleanups first, then the body, then
    /// prune the links it did not re-read.
    pub(crate) fn run_effect(key: SubKey) {
        let prepared = with_graph(|g| {
            let node = g.subs.get_mut(key)?;
            if !node.flags.contains(SubscriberFlags::ACTIVE) {
                return None;
            }
            if node.flags.contains(SubscriberFlags::RUNNING) {
                debug!(subscriber = %node.id, "skipping re-entrant run");
                return None;
            }
            node.flags.remove(SubscriberFlags::DIRTY);
            let slot = node.effect_mut()?;
            slot.runs += 1;
            Some((slot.body.clone(), mem::take(&mut slot.cleanups)))
        });
        let Some((body, cleanups)) = prepared else {
            return;
        };

        let _guard = RunGuard::enter(key);
        if !cleanups.is_empty() {
            let _ctx = ReactiveContext::detached();
            for cleanup in cleanups {
                cleanup();
            }
        }
        match body.try_borrow_mut() {
            Ok(mut body) => (&mut *body)(),
            Err(_) => debug!("effect body already borrowed, skipping"),
        };
    }

    /// Bring a memo's cached value up to date.
    ///
    /// Fast paths, in order: the memo was not notified since its last
    /// computation; nothing at all was written since then (world version);
    /// none of its dependencies' versions moved. Only then is the compute
    /// function run. Its output version moves only if the value changed.
    pub(crate) fn refresh_memo(key: SubKey) {
        let global = Self::global_version();
        let plan = with_graph(|g| {
            let node = g.subs.get_mut(key)?;
            let evaluated = node.flags.contains(SubscriberFlags::EVALUATED);
            if evaluated && !node.flags.contains(SubscriberFlags::DIRTY) {
                return None;
            }
            if node.flags.contains(SubscriberFlags::RUNNING) {
                return None;
            }
            node.flags.remove(SubscriberFlags::DIRTY);
            let memo = node.memo_mut()?;
            if evaluated && memo.global_version == Some(global) {
                return None;
            }
            memo.global_version = Some(global);
            Some((evaluated, memo.compute.clone(), memo.node))
        });
        let Some((evaluated, compute, output)) = plan else {
            return;
        };
        if evaluated && !Self::is_dirty(key) {
            return;
        }
        let Some(compute) = compute.upgrade() else {
            return;
        };

        let changed = {
            let _guard = RunGuard::enter(key);
            compute.recompute()
        };
        with_graph(|g| {
            if changed || !evaluated {
                if let Some(dep) = g.nodes.get_mut(output) {
                    dep.version += 1;
                }
            }
            if let Some(node) = g.subs.get_mut(key) {
                node.flags.insert(SubscriberFlags::EVALUATED);
            }
        });
    }

    pub(crate) fn pause(key: SubKey) {
        with_graph(|g| {
            if let Some(node) = g.subs.get_mut(key) {
                node.flags.insert(SubscriberFlags::PAUSED);
            }
        });
    }

    /// Resume delivery and replay a trigger that arrived while paused.
    pub(crate) fn resume(key: SubKey) {
        let replay = with_graph(|g| match g.subs.get_mut(key) {
            Some(node) if node.flags.contains(SubscriberFlags::PAUSED) => {
                node.flags.remove(SubscriberFlags::PAUSED);
                let pending = node.flags.contains(SubscriberFlags::PENDING);
                node.flags.remove(SubscriberFlags::PENDING);
                pending && node.flags.contains(SubscriberFlags::ACTIVE)
            }
            _ => false,
        });
        if replay {
            Self::trigger_effect(key);
        }
    }

    /// Attach a cleanup to the running effect. Hands the cleanup back if no
    /// effect is running.
    pub(crate) fn register_cleanup(cleanup: Cleanup) -> Result<(), Cleanup> {
        let Some(sub) = ReactiveContext::current_subscriber() else {
            return Err(cleanup);
        };
        with_graph(|g| match g.subs.get_mut(sub).and_then(|node| node.effect_mut()) {
            Some(slot) => {
                slot.cleanups.push(cleanup);
                Ok(())
            }
            None => Err(cleanup),
        })
    }

    /// Stop a subscriber: unlink every dependency, run its cleanups and
    /// `on_stop` hook, free its slot. Stopping twice is a no-op.
    pub(crate) fn stop(key: SubKey) {
        let stopped = with_graph(|g| {
            let node = g.subs.get_mut(key)?;
            if !node.flags.contains(SubscriberFlags::ACTIVE) {
                return None;
            }
            node.flags.remove(SubscriberFlags::ACTIVE);
            let running = node.flags.contains(SubscriberFlags::RUNNING);
            let id = node.id;
            let (cleanups, on_stop, job) = match node.effect_mut() {
                Some(slot) => (
                    mem::take(&mut slot.cleanups),
                    slot.on_stop.take(),
                    Some(slot.job.clone()),
                ),
                None => (SmallVec::new(), None, None),
            };
            g.unlink_deps(key);
            // A subscriber stopping itself is freed when its run unwinds.
            let removed = if running { None } else { g.subs.remove(key) };
            Some((id, cleanups, on_stop, job, removed))
        });
        let Some((id, cleanups, on_stop, job, removed)) = stopped else {
            return;
        };
        if let Some(job) = job {
            job.dispose();
        }
        debug!(subscriber = %id, "subscriber stopped");
        {
            let _ctx = ReactiveContext::detached();
            for cleanup in cleanups {
                cleanup();
            }
            if let Some(on_stop) = on_stop {
                on_stop();
            }
        }
        drop(removed);
    }

    /// Free a memo's subscriber slot and output node. Safe on drop paths.
    pub(crate) fn dispose_memo(key: SubKey, node: NodeKey) {
        let removed = try_with_graph(|g| {
            g.unlink_deps(key);
            g.release_node(node);
            g.subs.remove(key)
        });
        drop(removed);
    }
}

/// Marks a subscriber running and tracking for the guard's lifetime, then
/// prunes the links it did not re-read. Runs on unwind too.
pub(crate) struct RunGuard {
    key: SubKey,
    _context: ReactiveContext,
}

impl RunGuard {
    pub(crate) fn enter(key: SubKey) -> Self {
        with_graph(|g| {
            if let Some(node) = g.subs.get_mut(key) {
                node.flags.insert(SubscriberFlags::RUNNING | SubscriberFlags::TRACKING);
            }
            g.prepare_deps(key);
        });
        Self {
            key,
            _context: ReactiveContext::enter(key),
        }
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let key = self.key;
        let removed = try_with_graph(|g| {
            g.cleanup_deps(key);
            let node = g.subs.get_mut(key)?;
            node.flags.remove(SubscriberFlags::RUNNING | SubscriberFlags::TRACKING);
            if !node.flags.contains(SubscriberFlags::ACTIVE) && !node.is_memo() {
                return g.subs.remove(key);
            }
            None
        })
        .flatten();
        drop(removed);
    }
}

/// Group writes so that sync subscribers run once, when the outermost batch
/// closes.
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    Runtime::start_batch();
    let outcome = panic::catch_unwind(AssertUnwindSafe(f));
    Runtime::end_batch();
    match outcome {
        Ok(value) => value,
        Err(payload) => panic::resume_unwind(payload),
    }
}
