//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and a
//! producer node in the dependency graph.
//!
//! # How Signals Work
//!
//! 1. When a signal is read while a subscriber runs, the runtime links the
//!    signal's node to that subscriber (or refreshes the existing link).
//!
//! 2. When a signal is written with a value that differs from the current
//!    one, its node version is bumped and every linked subscriber is notified.
//!
//! 3. Writing an equal value does nothing at all: no version bump, no
//!    notification, no flush.
//!
//! # Memory Layout
//!
//! Each signal is one `Rc` holding:
//! - The graph node key (8 bytes)
//! - The value, behind a `RefCell`
//! - The equality function used to detect no-op writes
//!
//! The node is released when the last clone of the signal is dropped.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::runtime::Runtime;
use crate::graph::NodeKey;

struct SignalInner<T> {
    node: NodeKey,
    value: RefCell<T>,
    equals: fn(&T, &T) -> bool,
}

impl<T> Drop for SignalInner<T> {
    fn drop(&mut self) {
        Runtime::release_node(self.node);
    }
}

/// A reactive cell holding a value of type `T`.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(0);
///
/// // Read the value
/// let value = count.get();
///
/// // Update the value (notifies subscribers)
/// count.set(5);
/// ```
pub struct Signal<T: 'static> {
    inner: Rc<SignalInner<T>>,
}

impl<T> Signal<T>
where
    T: PartialEq + 'static,
{
    /// Create a new signal. Writes are compared with `PartialEq`.
    pub fn new(value: T) -> Self {
        Self::with_equality(value, |a, b| a == b)
    }
}

impl<T: 'static> Signal<T> {
    /// Create a signal with a custom equality. Writes for which `equals`
    /// returns `true` are dropped.
    pub fn with_equality(value: T, equals: fn(&T, &T) -> bool) -> Self {
        Self {
            inner: Rc::new(SignalInner {
                node: Runtime::create_node(),
                value: RefCell::new(value),
                equals,
            }),
        }
    }

    /// Get the current value.
    ///
    /// If called while a subscriber runs, this also registers the signal as a
    /// dependency of it.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        Runtime::track(self.inner.node);
        self.inner.value.borrow().clone()
    }

    /// Borrow the current value, registering a dependency like [`get`](Self::get).
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        Runtime::track(self.inner.node);
        f(&self.inner.value.borrow())
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        self.inner.value.borrow().clone()
    }

    /// Borrow the current value without tracking dependencies.
    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    /// Set a new value and notify subscribers.
    ///
    /// Returns `false` (and notifies nobody) if the value is equal to the
    /// current one.
    pub fn set(&self, value: T) -> bool {
        let changed = {
            let mut slot = self.inner.value.borrow_mut();
            if (self.inner.equals)(&slot, &value) {
                false
            } else {
                *slot = value;
                true
            }
        };
        if changed {
            Runtime::trigger(self.inner.node);
        }
        changed
    }

    /// Update the value using a function of the current one.
    pub fn update<F>(&self, f: F) -> bool
    where
        F: FnOnce(&T) -> T,
    {
        let next = f(&self.inner.value.borrow());
        self.set(next)
    }

    /// Mutate the value in place. Always notifies, since the mutation cannot
    /// be compared against the old value.
    pub fn modify<F>(&self, f: F)
    where
        F: FnOnce(&mut T),
    {
        f(&mut self.inner.value.borrow_mut());
        self.trigger();
    }

    /// Notify subscribers without changing the value.
    pub fn trigger(&self) {
        Runtime::trigger(self.inner.node);
    }

    /// Number of subscribers currently linked to this signal.
    pub fn subscriber_count(&self) -> usize {
        Runtime::subscriber_count(self.inner.node)
    }
}

impl<T: 'static> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("node", &self.inner.node)
            .field("value", &*self.inner.value.borrow())
            .finish()
    }
}

/// Shorthand for [`Signal::new`].
pub fn signal<T: PartialEq + 'static>(value: T) -> Signal<T> {
    Signal::new(value)
}

// ---- Tests ----
