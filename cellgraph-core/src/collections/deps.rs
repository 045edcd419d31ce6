//! Per-key producer nodes of a container.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::hash::Hash;

use smallvec::SmallVec;

use crate::graph::NodeKey;
use crate::reactive::{batch, ReactiveContext, Runtime};

/// What a container read depended on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum TrackKey<K> {
    /// One key or index.
    Key(K),
    /// Every value (iteration).
    Iterate,
    /// The set of keys (map size, key listing).
    KeyIterate,
    /// Sequence length.
    Length,
}

/// Map size below which dead entries are left in place.
const SWEEP_FLOOR: usize = 32;

/// Lazily allocated graph nodes, one per tracked key.
///
/// Nodes exist only for keys some subscriber read; writes to untracked keys
/// cost one hash lookup. A node is freed by the graph when its last reader
/// drops it, and the map entry pointing at it is swept once the map has
/// doubled since the last sweep.
pub(crate) struct KeyDeps<K: Eq + Hash> {
    nodes: RefCell<HashMap<TrackKey<K>, NodeKey>>,
    sweep_at: Cell<usize>,
}

impl<K: Eq + Hash> KeyDeps<K> {
    pub(crate) fn new() -> Self {
        Self {
            nodes: RefCell::new(HashMap::new()),
            sweep_at: Cell::new(SWEEP_FLOOR),
        }
    }

    pub(crate) fn track(&self, key: TrackKey<K>) {
        if !ReactiveContext::is_active() {
            return;
        }
        let (node, fresh) = {
            let mut nodes = self.nodes.borrow_mut();
            let live = nodes.get(&key).copied().filter(|node| Runtime::node_exists(*node));
            match live {
                Some(node) => (node, false),
                None => {
                    if nodes.len() >= self.sweep_at.get() {
                        nodes.retain(|_, node| Runtime::node_exists(*node));
                        self.sweep_at.set((nodes.len() * 2).max(SWEEP_FLOOR));
                    }
                    let node = Runtime::create_key_node();
                    nodes.insert(key, node);
                    (node, true)
                }
            }
        };
        if Runtime::track(node).is_none() && fresh {
            Runtime::release_node(node);
        }
    }

    /// Notify the nodes of `keys`, as one batch.
    pub(crate) fn trigger(&self, keys: &[TrackKey<K>]) {
        let nodes: SmallVec<[NodeKey; 4]> = {
            let map = self.nodes.borrow();
            keys.iter().filter_map(|key| map.get(key).copied()).collect()
        };
        Self::fire(nodes);
    }

    /// Notify every node whose key matches `filter`, as one batch.
    pub(crate) fn trigger_where(&self, filter: impl Fn(&TrackKey<K>) -> bool) {
        let nodes: SmallVec<[NodeKey; 4]> = self
            .nodes
            .borrow()
            .iter()
            .filter(|(key, _)| filter(key))
            .map(|(_, node)| *node)
            .collect();
        Self::fire(nodes);
    }

    fn fire(nodes: SmallVec<[NodeKey; 4]>) {
        match nodes.len() {
            0 => {}
            1 => Runtime::trigger(nodes[0]),
            _ => batch(|| nodes.iter().for_each(|node| Runtime::trigger(*node))),
        }
    }

    #[cfg(test)]
    pub(crate) fn node_count(&self) -> usize {
        self.nodes.borrow().len()
    }
}

impl<K: Eq + Hash> Drop for KeyDeps<K> {
    fn drop(&mut self) {
        for node in self.nodes.get_mut().values() {
            Runtime::release_node(*node);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Effect;

    #[test]
    fn untracked_reads_allocate_nothing() {
        let deps: KeyDeps<u32> = KeyDeps::new();
        deps.track(TrackKey::Key(1));
        deps.track(TrackKey::Iterate);
        assert_eq!(deps.node_count(), 0);
    }

    #[test]
    fn key_nodes_are_freed_with_their_last_reader() {
        let deps = std::rc::Rc::new(KeyDeps::new());
        let baseline = Runtime::stats().nodes;
        for i in 0..500u32 {
            let d = deps.clone();
            let effect = Effect::new(move || d.track(TrackKey::Key(i)));
            assert_eq!(Runtime::stats().nodes, baseline + 1);
            effect.stop();
        }
        assert_eq!(Runtime::stats().nodes, baseline);
        assert!(deps.node_count() <= SWEEP_FLOOR);
    }

    #[test]
    fn tracked_keys_get_one_node_each() {
        let deps = std::rc::Rc::new(KeyDeps::new());
        let d = deps.clone();
        let effect = Effect::new(move || {
            d.track(TrackKey::Key("a"));
            d.track(TrackKey::Key("a"));
            d.track(TrackKey::Length);
        });
        assert_eq!(deps.node_count(), 2);
        assert_eq!(effect.dependency_count(), 2);
        effect.stop();
    }
}
