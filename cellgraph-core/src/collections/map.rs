//! Reactive map.

use std::borrow::Borrow;
use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

use indexmap::IndexMap;

use super::deps::{KeyDeps, TrackKey};
use super::traverse::Traverse;
use super::{reject_write, Nested, WrapOptions};

struct MapInner<K: Eq + Hash, V> {
    entries: RefCell<IndexMap<K, V>>,
    deps: KeyDeps<K>,
    nested: Option<Nested<V>>,
}

/// An insertion-ordered map whose reads and writes are tracked per key.
///
/// Overwriting an existing key notifies readers of that key and readers of
/// the values, but not readers that only asked for the size or the keys.
pub struct ReactiveMap<K: Eq + Hash + 'static, V: 'static> {
    inner: Rc<MapInner<K, V>>,
    options: WrapOptions,
}

impl<K, V> ReactiveMap<K, V>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
{
    pub fn new() -> Self {
        Self::wrap(IndexMap::new(), WrapOptions::default())
    }

    /// Wrap an existing map with explicit access rules.
    pub fn wrap(entries: IndexMap<K, V>, options: WrapOptions) -> Self {
        Self::build(entries, options, None)
    }

    pub(crate) fn build(entries: IndexMap<K, V>, options: WrapOptions, nested: Option<Nested<V>>) -> Self {
        Self {
            inner: Rc::new(MapInner {
                entries: RefCell::new(entries),
                deps: KeyDeps::new(),
                nested,
            }),
            options,
        }
    }

    /// A read-only view of the same map.
    pub fn readonly(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
            options: WrapOptions {
                readonly: true,
                ..self.options
            },
        }
    }

    /// A view of the same map that does not wrap nested values on read.
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

    fn deep_hooks(&self) -> Option<Nested<V>> {
        self.inner.nested.filter(|_| !self.options.shallow)
    }

    fn view(&self, value: V) -> V {
        match self.deep_hooks() {
            Some(nested) if self.options.readonly => (nested.readonly)(&value),
            _ => value,
        }
    }

    /// Get the value stored under `key`.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq + ToOwned<Owned = K>,
    {
        self.inner.deps.track(TrackKey::Key(key.to_owned()));
        if let Some(nested) = self.deep_hooks() {
            if let Some(value) = self.inner.entries.borrow_mut().get_mut(key) {
                (nested.wrap)(value);
            }
        }
        let value = self.inner.entries.borrow().get(key).cloned();
        value.map(|value| self.view(value))
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq + ToOwned<Owned = K>,
    {
        self.inner.deps.track(TrackKey::Key(key.to_owned()));
        self.inner.entries.borrow().contains_key(key)
    }

    /// Number of entries. Tracks the key set only.
    pub fn len(&self) -> usize {
        self.inner.deps.track(TrackKey::KeyIterate);
        self.inner.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys in insertion order. Tracks the key set only.
    pub fn keys(&self) -> Vec<K> {
        self.inner.deps.track(TrackKey::KeyIterate);
        self.inner.entries.borrow().keys().cloned().collect()
    }

    /// Values in insertion order.
    pub fn values(&self) -> Vec<V> {
        self.entries().into_iter().map(|(_, value)| value).collect()
    }

    /// Entries in insertion order.
    pub fn entries(&self) -> Vec<(K, V)> {
        self.inner.deps.track(TrackKey::Iterate);
        self.wrap_all();
        let entries: Vec<(K, V)> = self
            .inner
            .entries
            .borrow()
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        entries
            .into_iter()
            .map(|(key, value)| (key, self.view(value)))
            .collect()
    }

    /// Get an untracked snapshot of the entries.
    pub fn to_index_map(&self) -> IndexMap<K, V> {
        self.inner.entries.borrow().clone()
    }

    /// Insert or overwrite an entry. Returns the previous value.
    ///
    /// Overwriting with an equal value changes nothing and notifies nobody.
    pub fn insert(&self, key: K, value: V) -> Option<V>
    where
        V: PartialEq,
    {
        if self.options.readonly {
            reject_write("map", "insert");
            return None;
        }
        let previous = {
            let mut entries = self.inner.entries.borrow_mut();
            match entries.get_mut(&key) {
                Some(slot) if *slot == value => return Some(value),
                Some(slot) => Some(std::mem::replace(slot, value)),
                None => {
                    entries.insert(key.clone(), value);
                    None
                }
            }
        };
        if previous.is_some() {
            self.inner.deps.trigger(&[TrackKey::Key(key), TrackKey::Iterate]);
        } else {
            self.inner
                .deps
                .trigger(&[TrackKey::Key(key), TrackKey::Iterate, TrackKey::KeyIterate]);
        }
        previous
    }

    /// Remove an entry, keeping the order of the others.
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq + ToOwned<Owned = K>,
    {
        if self.options.readonly {
            reject_write("map", "remove");
            return None;
        }
        let removed = self.inner.entries.borrow_mut().shift_remove(key)?;
        self.inner.deps.trigger(&[
            TrackKey::Key(key.to_owned()),
            TrackKey::Iterate,
            TrackKey::KeyIterate,
        ]);
        Some(removed)
    }

    /// Remove every entry.
    pub fn clear(&self) {
        if self.options.readonly {
            reject_write("map", "clear");
            return;
        }
        let cleared = std::mem::take(&mut *self.inner.entries.borrow_mut());
        if cleared.is_empty() {
            return;
        }
        drop(cleared);
        self.inner.deps.trigger_where(|_| true);
    }

    fn wrap_all(&self) {
        if let Some(nested) = self.deep_hooks() {
            for value in self.inner.entries.borrow_mut().values_mut() {
                (nested.wrap)(value);
            }
        }
    }
}

impl<K, V> Default for ReactiveMap<K, V>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + 'static, V: 'static> Clone for ReactiveMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
            options: self.options,
        }
    }
}

/// Handles compare by identity.
impl<K: Eq + Hash + 'static, V: 'static> PartialEq for ReactiveMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<K, V> FromIterator<(K, V)> for ReactiveMap<K, V>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::wrap(iter.into_iter().collect(), WrapOptions::default())
    }
}

impl<K, V> Traverse for ReactiveMap<K, V>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + Traverse + 'static,
{
    fn traverse(&self, depth: usize, seen: &mut HashSet<usize>) {
        if depth == 0 || !seen.insert(Rc::as_ptr(&self.inner) as *const () as usize) {
            return;
        }
        self.inner.deps.track(TrackKey::Iterate);
        self.inner.deps.track(TrackKey::KeyIterate);
        self.wrap_all();
        for value in self.inner.entries.borrow().values() {
            value.traverse(depth - 1, seen);
        }
    }
}

impl<K: fmt::Debug + Eq + Hash + 'static, V: fmt::Debug + 'static> fmt::Debug for ReactiveMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveMap")
            .field("entries", &*self.inner.entries.borrow())
            .field("options", &self.options)
            .finish()
    }
}
