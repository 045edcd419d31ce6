//! Reactive set.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

use indexmap::IndexSet;

use super::deps::{KeyDeps, TrackKey};
use super::traverse::Traverse;
use super::{reject_write, WrapOptions};

struct SetInner<T: Eq + Hash> {
    items: RefCell<IndexSet<T>>,
    deps: KeyDeps<T>,
}

/// An insertion-ordered set whose membership tests are tracked per value.
pub struct ReactiveSet<T: Eq + Hash + 'static> {
    inner: Rc<SetInner<T>>,
    readonly: bool,
}

impl<T> ReactiveSet<T>
where
    T: Eq + Hash + Clone + 'static,
{
    pub fn new() -> Self {
        Self::wrap(IndexSet::new(), WrapOptions::default())
    }

    /// Wrap an existing set. Set members are never wrapped, so only
    /// `readonly` applies.
    pub fn wrap(items: IndexSet<T>, options: WrapOptions) -> Self {
        Self {
            inner: Rc::new(SetInner {
                items: RefCell::new(items),
                deps: KeyDeps::new(),
            }),
            readonly: options.readonly,
        }
    }

    /// A read-only view of the same set.
    pub fn readonly(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
            readonly: true,
        }
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    /// Whether two handles share the same store.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn contains(&self, value: &T) -> bool {
        self.inner.deps.track(TrackKey::Key(value.clone()));
        self.inner.items.borrow().contains(value)
    }

    pub fn len(&self) -> usize {
        self.inner.deps.track(TrackKey::Iterate);
        self.inner.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Members in insertion order.
    pub fn to_vec(&self) -> Vec<T> {
        self.inner.deps.track(TrackKey::Iterate);
        self.inner.items.borrow().iter().cloned().collect()
    }

    /// Add a member. Returns `false` if it was already present.
    pub fn insert(&self, value: T) -> bool {
        if self.readonly {
            reject_write("set", "insert");
            return false;
        }
        if !self.inner.items.borrow_mut().insert(value.clone()) {
            return false;
        }
        self.inner.deps.trigger(&[TrackKey::Key(value), TrackKey::Iterate]);
        true
    }

    /// Remove a member. Returns `false` if it was absent.
    pub fn remove(&self, value: &T) -> bool {
        if self.readonly {
            reject_write("set", "remove");
            return false;
        }
        if !self.inner.items.borrow_mut().shift_remove(value) {
            return false;
        }
        self.inner
            .deps
            .trigger(&[TrackKey::Key(value.clone()), TrackKey::Iterate]);
        true
    }

    pub fn clear(&self) {
        if self.readonly {
            reject_write("set", "clear");
            return;
        }
        let cleared = std::mem::take(&mut *self.inner.items.borrow_mut());
        if cleared.is_empty() {
            return;
        }
        drop(cleared);
        self.inner.deps.trigger_where(|_| true);
    }
}

impl<T> Default for ReactiveSet<T>
where
    T: Eq + Hash + Clone + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Eq + Hash + 'static> Clone for ReactiveSet<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
            readonly: self.readonly,
        }
    }
}

/// Handles compare by identity.
impl<T: Eq + Hash + 'static> PartialEq for ReactiveSet<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> FromIterator<T> for ReactiveSet<T>
where
    T: Eq + Hash + Clone + 'static,
{
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::wrap(iter.into_iter().collect(), WrapOptions::default())
    }
}

impl<T> Traverse for ReactiveSet<T>
where
    T: Eq + Hash + Clone + Traverse + 'static,
{
    fn traverse(&self, depth: usize, seen: &mut HashSet<usize>) {
        if depth == 0 || !seen.insert(Rc::as_ptr(&self.inner) as *const () as usize) {
            return;
        }
        self.inner.deps.track(TrackKey::Iterate);
        for item in self.inner.items.borrow().iter() {
            item.traverse(depth - 1, seen);
        }
    }
}

impl<T: fmt::Debug + Eq + Hash + 'static> fmt::Debug for ReactiveSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveSet")
            .field("items", &*self.inner.items.borrow())
            .field("readonly", &self.readonly)
            .finish()
    }
}
