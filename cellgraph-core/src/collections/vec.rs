//! Reactive list.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use super::deps::{KeyDeps, TrackKey};
use super::traverse::Traverse;
use super::{reject_write, Nested, WrapOptions};

struct VecInner<T> {
    /// `None` marks a hole left by a write past the end.
    items: RefCell<Vec<Option<T>>>,
    deps: KeyDeps<usize>,
    nested: Option<Nested<T>>,
}

/// A list whose reads and writes are tracked per index.
///
/// Writing an index past the end grows the list, leaving holes in between.
/// Holes read as `None` and are skipped by [`to_vec`](Self::to_vec).
///
/// # Example
///
/// ```rust,ignore
/// let list = ReactiveVec::new(vec![1, 2]);
///
/// let l = list.clone();
/// Effect::new(move || println!("{} items", l.len()));
///
/// list.push(3); // length changed: the effect re-runs
/// list.set(0, 10); // only readers of index 0 or of the whole list re-run
/// ```
pub struct ReactiveVec<T: 'static> {
    inner: Rc<VecInner<T>>,
    options: WrapOptions,
}

impl<T: Clone + 'static> ReactiveVec<T> {
    /// Wrap a list.
    pub fn new(items: Vec<T>) -> Self {
        Self::wrap(items, WrapOptions::default())
    }

    /// Wrap a list with explicit access rules.
    pub fn wrap(items: Vec<T>, options: WrapOptions) -> Self {
        Self::build(items, options, None)
    }

    pub(crate) fn build(items: Vec<T>, options: WrapOptions, nested: Option<Nested<T>>) -> Self {
        Self {
            inner: Rc::new(VecInner {
                items: RefCell::new(items.into_iter().map(Some).collect()),
                deps: KeyDeps::new(),
                nested,
            }),
            options,
        }
    }

    /// A read-only view of the same list.
    pub fn readonly(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
            options: WrapOptions {
                readonly: true,
                ..self.options
            },
        }
    }

    /// A view of the same list that does not wrap nested values on read.
    pub fn shallow(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
            options: WrapOptions {
                shallow: true,
                ..self.options
            },
        }
    }

    pub fn options(&self) -> WrapOptions {
        self.options
    }

    /// Whether two handles share the same store.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn deep_hooks(&self) -> Option<Nested<T>> {
        self.inner.nested.filter(|_| !self.options.shallow)
    }

    fn view(&self, item: T) -> T {
        match self.deep_hooks() {
            Some(nested) if self.options.readonly => (nested.readonly)(&item),
            _ => item,
        }
    }

    /// Get the element at `index`. Holes and out-of-range indices are `None`.
    pub fn get(&self, index: usize) -> Option<T> {
        self.inner.deps.track(TrackKey::Key(index));
        if let Some(nested) = self.deep_hooks() {
            if let Some(Some(item)) = self.inner.items.borrow_mut().get_mut(index) {
                (nested.wrap)(item);
            }
        }
        let item = self.inner.items.borrow().get(index).cloned().flatten();
        item.map(|item| self.view(item))
    }

    /// Number of slots, holes included.
    pub fn len(&self) -> usize {
        self.inner.deps.track(TrackKey::Length);
        self.inner.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every element, holes skipped.
    pub fn to_vec(&self) -> Vec<T> {
        self.track_all();
        self.wrap_all();
        let items: Vec<T> = self.inner.items.borrow().iter().flatten().cloned().collect();
        items.into_iter().map(|item| self.view(item)).collect()
    }

    /// Get an untracked snapshot, holes skipped.
    pub fn to_vec_untracked(&self) -> Vec<T> {
        self.inner.items.borrow().iter().flatten().cloned().collect()
    }

    pub fn contains(&self, value: &T) -> bool
    where
        T: PartialEq,
    {
        self.position(value).is_some()
    }

    /// Index of the first element equal to `value`.
    pub fn position(&self, value: &T) -> Option<usize>
    where
        T: PartialEq,
    {
        self.track_all();
        self.inner
            .items
            .borrow()
            .iter()
            .position(|item| item.as_ref() == Some(value))
    }

    /// Write `value` at `index`. Returns whether anything changed.
    ///
    /// An index past the end grows the list: that is an addition, which
    /// notifies length readers, not just readers of `index`.
    pub fn set(&self, index: usize, value: T) -> bool
    where
        T: PartialEq,
    {
        if self.options.readonly {
            reject_write("vec", "set");
            return false;
        }
        let added = {
            let mut items = self.inner.items.borrow_mut();
            if index < items.len() {
                if items[index].as_ref() == Some(&value) {
                    return false;
                }
                items[index] = Some(value);
                false
            } else {
                items.resize_with(index, || None);
                items.push(Some(value));
                true
            }
        };
        if added {
            self.inner
                .deps
                .trigger(&[TrackKey::Key(index), TrackKey::Length, TrackKey::Iterate]);
        } else {
            self.inner.deps.trigger(&[TrackKey::Key(index), TrackKey::Iterate]);
        }
        true
    }

    /// Append an element.
    pub fn push(&self, value: T) {
        if self.options.readonly {
            reject_write("vec", "push");
            return;
        }
        let index = {
            let mut items = self.inner.items.borrow_mut();
            items.push(Some(value));
            items.len() - 1
        };
        self.inner
            .deps
            .trigger(&[TrackKey::Key(index), TrackKey::Length, TrackKey::Iterate]);
    }

    /// Append every element of `values` with a single notification pass.
    pub fn extend(&self, values: impl IntoIterator<Item = T>) {
        if self.options.readonly {
            reject_write("vec", "extend");
            return;
        }
        let start = {
            let mut items = self.inner.items.borrow_mut();
            let start = items.len();
            items.extend(values.into_iter().map(Some));
            if items.len() == start {
                return;
            }
            start
        };
        self.shifted_from(start);
    }

    /// Remove the last slot. A trailing hole pops as `None`.
    pub fn pop(&self) -> Option<T> {
        if self.options.readonly {
            reject_write("vec", "pop");
            return None;
        }
        let (popped, index) = {
            let mut items = self.inner.items.borrow_mut();
            let popped = items.pop()?;
            (popped, items.len())
        };
        self.shifted_from(index);
        popped
    }

    /// Insert an element, shifting later ones right.
    pub fn insert(&self, index: usize, value: T) {
        if self.options.readonly {
            reject_write("vec", "insert");
            return;
        }
        {
            let mut items = self.inner.items.borrow_mut();
            if index > items.len() {
                items.resize_with(index, || None);
            }
            items.insert(index, Some(value));
        }
        self.shifted_from(index);
    }

    /// Remove the element at `index`, shifting later ones left.
    pub fn remove(&self, index: usize) -> Option<T> {
        if self.options.readonly {
            reject_write("vec", "remove");
            return None;
        }
        let removed = {
            let mut items = self.inner.items.borrow_mut();
            if index >= items.len() {
                return None;
            }
            items.remove(index)
        };
        self.shifted_from(index);
        removed
    }

    /// Shorten the list to `len` slots.
    pub fn truncate(&self, len: usize) {
        if self.options.readonly {
            reject_write("vec", "truncate");
            return;
        }
        let truncated = {
            let mut items = self.inner.items.borrow_mut();
            if len >= items.len() {
                return;
            }
            items.split_off(len)
        };
        drop(truncated);
        self.shifted_from(len);
    }

    /// Remove every element.
    pub fn clear(&self) {
        self.truncate(0);
    }

    /// Notify length, iteration and every index at or after `from`.
    fn shifted_from(&self, from: usize) {
        self.inner.deps.trigger_where(|key| match key {
            TrackKey::Key(index) => *index >= from,
            _ => true,
        });
    }

    fn track_all(&self) {
        self.inner.deps.track(TrackKey::Iterate);
        self.inner.deps.track(TrackKey::Length);
    }

    fn wrap_all(&self) {
        if let Some(nested) = self.deep_hooks() {
            for item in self.inner.items.borrow_mut().iter_mut().flatten() {
                (nested.wrap)(item);
            }
        }
    }
}

impl<T: Clone + 'static> Clone for ReactiveVec<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
            options: self.options,
        }
    }
}

/// Handles compare by identity.
impl<T: 'static> PartialEq for ReactiveVec<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: Clone + 'static> FromIterator<T> for ReactiveVec<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<T: Clone + Traverse + 'static> Traverse for ReactiveVec<T> {
    fn traverse(&self, depth: usize, seen: &mut HashSet<usize>) {
        if depth == 0 || !seen.insert(Rc::as_ptr(&self.inner) as *const () as usize) {
            return;
        }
        self.track_all();
        self.wrap_all();
        for item in self.inner.items.borrow().iter().flatten() {
            item.traverse(depth - 1, seen);
        }
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for ReactiveVec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveVec")
            .field("items", &*self.inner.items.borrow())
            .field("options", &self.options)
            .finish()
    }
}
