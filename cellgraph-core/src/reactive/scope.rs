//! Effect Scopes
//!
//! A scope collects every effect (and watcher) created while it runs, so a
//! host can tear down a whole group of subscribers with one call. Scopes nest:
//! a scope created inside another is stopped together with its parent.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::mem;
use std::rc::Rc;

use tracing::{debug, warn};

use super::effect::Effect;
use crate::graph::Cleanup;

/// List length below which stopped entries are left in place.
const PRUNE_FLOOR: usize = 16;

thread_local! {
    static SCOPE_STACK: RefCell<Vec<EffectScope>> = const { RefCell::new(Vec::new()) };
}

struct ScopeInner {
    active: Cell<bool>,
    effects: RefCell<Vec<Effect>>,
    effects_prune_at: Cell<usize>,
    children: RefCell<Vec<EffectScope>>,
    children_prune_at: Cell<usize>,
    cleanups: RefCell<Vec<Cleanup>>,
}

/// Append to a scope list, first dropping stopped entries if the list has
/// doubled since the last pass.
fn push_pruned<T>(list: &RefCell<Vec<T>>, prune_at: &Cell<usize>, item: T, live: impl Fn(&T) -> bool) {
    let mut list = list.borrow_mut();
    if list.len() >= prune_at.get() {
        list.retain(|entry| live(entry));
        prune_at.set((list.len() * 2).max(PRUNE_FLOOR));
    }
    list.push(item);
}

/// A group of subscribers stopped together.
///
/// # Example
///
/// ```rust,ignore
/// let scope = EffectScope::new();
/// scope.run(|| {
///     Effect::new(move || println!("{}", count.get()));
///     watch(other.clone(), |v, _, _| println!("{v}"), WatchOptions::default());
/// });
///
/// scope.stop(); // both subscribers are gone
/// ```
#[derive(Clone)]
pub struct EffectScope {
    inner: Rc<ScopeInner>,
}

impl EffectScope {
    /// Create a scope. If another scope is running, the new one becomes its
    /// child.
    pub fn new() -> Self {
        let scope = Self::detached();
        if let Some(parent) = current_scope() {
            push_pruned(
                &parent.inner.children,
                &parent.inner.children_prune_at,
                scope.clone(),
                EffectScope::is_active,
            );
        }
        scope
    }

    /// Create a scope that is not attached to the running one.
    pub fn detached() -> Self {
        Self {
            inner: Rc::new(ScopeInner {
                active: Cell::new(true),
                effects: RefCell::new(Vec::new()),
                effects_prune_at: Cell::new(PRUNE_FLOOR),
                children: RefCell::new(Vec::new()),
                children_prune_at: Cell::new(PRUNE_FLOOR),
                cleanups: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Run `f` with this scope collecting the subscribers it creates.
    ///
    /// Returns `None` without running `f` if the scope was stopped.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        if !self.is_active() {
            warn!("cannot run an inactive effect scope");
            return None;
        }
        SCOPE_STACK.with(|stack| stack.borrow_mut().push(self.clone()));
        let _guard = ScopeGuard;
        Some(f())
    }

    /// Stop every collected effect and child scope, then run the dispose
    /// callbacks. Stopping twice is a no-op.
    pub fn stop(&self) {
        if !self.inner.active.replace(false) {
            return;
        }
        let effects = mem::take(&mut *self.inner.effects.borrow_mut());
        let children = mem::take(&mut *self.inner.children.borrow_mut());
        let cleanups = mem::take(&mut *self.inner.cleanups.borrow_mut());
        debug!(
            effects = effects.len(),
            children = children.len(),
            "stopping effect scope"
        );

        for effect in &effects {
            effect.stop();
        }
        for child in &children {
            child.stop();
        }
        for cleanup in cleanups {
            cleanup();
        }
    }

    /// Check if the scope has not been stopped.
    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    /// Number of collected effects that are still active.
    pub fn effect_count(&self) -> usize {
        self.inner.effects.borrow().iter().filter(|effect| effect.is_active()).count()
    }
}

impl Default for EffectScope {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EffectScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectScope")
            .field("active", &self.is_active())
            .field("effects", &self.effect_count())
            .field("children", &self.inner.children.borrow().len())
            .finish()
    }
}

struct ScopeGuard;

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        let _ = SCOPE_STACK.try_with(|stack| stack.borrow_mut().pop());
    }
}

/// The innermost running scope.
pub fn current_scope() -> Option<EffectScope> {
    SCOPE_STACK.with(|stack| stack.borrow().last().cloned())
}

/// Register a callback run when the current scope stops.
///
/// Returns `false` (and drops the callback) when no scope is running.
pub fn on_scope_dispose<F>(f: F) -> bool
where
    F: FnOnce() + 'static,
{
    match current_scope() {
        Some(scope) if scope.is_active() => {
            scope.inner.cleanups.borrow_mut().push(Box::new(f));
            true
        }
        _ => {
            warn!("on_scope_dispose called outside of an active effect scope");
            false
        }
    }
}

pub(crate) fn register(effect: Effect) {
    if let Some(scope) = current_scope() {
        if scope.is_active() {
            push_pruned(
                &scope.inner.effects,
                &scope.inner.effects_prune_at,
                effect,
                Effect::is_active,
            );
        }
    }
}

pub(crate) fn reset() {
    let dropped = SCOPE_STACK.with(|stack| mem::take(&mut *stack.borrow_mut()));
    drop(dropped);
}
