//! Memo Implementation
//!
//! A Memo is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Memos Work
//!
//! 1. Creating a memo runs nothing. On first access, the memo runs its
//!    computation under tracking and caches the result.
//!
//! 2. When a dependency changes, the memo is marked dirty and passes the
//!    notification on to its own subscribers. It does not recompute yet.
//!
//! 3. On next access, the memo first checks the world version: if nothing
//!    was written anywhere since its last computation, the cache is returned.
//!
//! 4. Otherwise it compares the versions of its dependencies with the
//!    versions it last read. Only if one of them moved does it recompute.
//!
//! 5. If the recomputed value equals the cached one, the memo's own version
//!    stays put, so subscribers that depend on it see nothing to do.
//!
//! # Why This Matters
//!
//! This "lazy" approach avoids unnecessary recomputation:
//!
//! - A signal changes
//! - 10 memos depend on it
//! - Only the memos actually accessed will recompute
//! - Memos that are never read stay dirty (no wasted work)

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use super::runtime::Runtime;
use super::subscriber::SubscriberId;
use crate::error::ReactiveError;
use crate::graph::{MemoCompute, NodeKey, SubKey, SubscriberFlags};

/// Dirty state for a memo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoState {
    /// The cached value is up-to-date.
    Clean,

    /// A dependency was written. Need to check versions.
    MaybeDirty,

    /// The memo has no value yet and must compute.
    Dirty,
}

struct MemoInner<T> {
    key: SubKey,
    node: NodeKey,
    id: SubscriberId,
    compute: Box<dyn Fn() -> T>,
    value: RefCell<Option<T>>,
    equals: fn(&T, &T) -> bool,
    setter: Option<Box<dyn Fn(T)>>,
}

impl<T: 'static> MemoCompute for MemoInner<T> {
    fn recompute(&self) -> bool {
        let next = (self.compute)();
        let mut slot = self.value.borrow_mut();
        let changed = match slot.as_ref() {
            Some(previous) => !(self.equals)(previous, &next),
            None => true,
        };
        if changed {
            *slot = Some(next);
        }
        changed
    }
}

impl<T> Drop for MemoInner<T> {
    fn drop(&mut self) {
        Runtime::dispose_memo(self.key, self.node);
    }
}

/// A cached derived value that recomputes only when dependencies change.
///
/// The `PartialEq` bound (or the equality given to
/// [`with_equality`](Self::with_equality)) is what lets a memo swallow a
/// change: a recomputation that yields an equal value does not notify
/// downstream subscribers.
pub struct Memo<T: 'static> {
    inner: Rc<MemoInner<T>>,
}

impl<T> Memo<T>
where
    T: PartialEq + 'static,
{
    /// Create a new memo with the given computation function.
    ///
    /// The computation is not run immediately. It runs on first access.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Self::build(Box::new(compute), |a, b| a == b, None)
    }

    /// Create a writable memo. Writes are handed to `setter`, which is
    /// expected to update the memo's sources.
    pub fn with_setter<F, S>(compute: F, setter: S) -> Self
    where
        F: Fn() -> T + 'static,
        S: Fn(T) + 'static,
    {
        Self::build(Box::new(compute), |a, b| a == b, Some(Box::new(setter)))
    }
}

impl<T: 'static> Memo<T> {
    /// Create a memo with a custom equality deciding whether a
    /// recomputation changed the value.
    pub fn with_equality<F>(compute: F, equals: fn(&T, &T) -> bool) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Self::build(Box::new(compute), equals, None)
    }

    fn build(compute: Box<dyn Fn() -> T>, equals: fn(&T, &T) -> bool, setter: Option<Box<dyn Fn(T)>>) -> Self {
        let inner = Rc::new_cyclic(|weak: &Weak<MemoInner<T>>| {
            let hook: Weak<dyn MemoCompute> = weak.clone();
            let (key, node, id) = Runtime::create_memo(hook);
            MemoInner {
                key,
                node,
                id,
                compute,
                value: RefCell::new(None),
                equals,
                setter,
            }
        });
        Self { inner }
    }

    /// Get the subscriber ID for this memo.
    pub fn subscriber_id(&self) -> SubscriberId {
        self.inner.id
    }

    /// Bring the cache up to date, tracking the memo if a subscriber runs.
    fn refresh(&self) {
        let link = Runtime::track(self.inner.node);
        Runtime::refresh_memo(self.inner.key);
        if let Some(link) = link {
            Runtime::sync_link(link);
        }
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// Fails with [`ReactiveError::CyclicRead`] if the memo is read while it
    /// computes its very first value.
    pub fn try_get(&self) -> Result<T, ReactiveError>
    where
        T: Clone,
    {
        self.refresh();
        self.inner
            .value
            .borrow()
            .clone()
            .ok_or(ReactiveError::CyclicRead(self.inner.id.raw()))
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// # Panics
    ///
    /// Panics on a cyclic first read, see [`try_get`](Self::try_get).
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        match self.try_get() {
            Ok(value) => value,
            Err(err) => panic!("{err}"),
        }
    }

    /// Borrow the current value, recomputing if necessary.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.refresh();
        let value = self.inner.value.borrow();
        f(value.as_ref().expect("memo read while computing its first value"))
    }

    /// Get the current value without registering a dependency.
    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        Runtime::refresh_memo(self.inner.key);
        self.inner
            .value
            .borrow()
            .clone()
            .expect("memo read while computing its first value")
    }

    /// Write through the memo's setter.
    pub fn set(&self, value: T) -> Result<(), ReactiveError> {
        match &self.inner.setter {
            Some(setter) => {
                setter(value);
                Ok(())
            }
            None => Err(ReactiveError::Readonly("memo")),
        }
    }

    /// Check if the memo accepts writes.
    pub fn is_writable(&self) -> bool {
        self.inner.setter.is_some()
    }

    /// Get the current dirty state.
    pub fn state(&self) -> MemoState {
        match Runtime::flags(self.inner.key) {
            Some(flags) if !flags.contains(SubscriberFlags::EVALUATED) => MemoState::Dirty,
            Some(flags) if flags.contains(SubscriberFlags::DIRTY) => MemoState::MaybeDirty,
            Some(_) => MemoState::Clean,
            None => MemoState::Dirty,
        }
    }

    /// Check if the memo has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.value.borrow().is_some()
    }

    /// Get the number of dependencies.
    pub fn dependency_count(&self) -> usize {
        Runtime::dependency_count(self.inner.key)
    }

    /// Get the number of subscribers reading this memo.
    pub fn subscriber_count(&self) -> usize {
        Runtime::subscriber_count(self.inner.node)
    }
}

impl<T: 'static> Clone for Memo<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for Memo<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memo")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("value", &*self.inner.value.borrow())
            .finish()
    }
}

/// Shorthand for [`Memo::new`].
pub fn memo<T, F>(compute: F) -> Memo<T>
where
    T: PartialEq + 'static,
    F: Fn() -> T + 'static,
{
    Memo::new(compute)
}

// ---- Tests ----
