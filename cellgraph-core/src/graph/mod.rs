//! Dependency Graph
//!
//! This module implements the arena that stores the dependency graph between
//! producers (signals, container keys, memo outputs) and subscribers
//! (effects, memos).
//!
//! # Overview
//!
//! - Producers and subscribers live in generational arenas and are addressed
//!   by [`NodeKey`] / [`SubKey`]. Keys are reclaimed when the owning handle
//!   is stopped or dropped. Container key nodes are transient and go away
//!   with their last subscriber link.
//! - Edges are [`Link`](link::Link) records threaded onto two intrusive lists,
//!   one per endpoint, so a subscriber can drop a dependency in O(1).
//! - Dependencies are pruned mark-then-sweep: before a run every link of the
//!   subscriber is marked stale, reads during the run refresh the links they
//!   touch, and the links still stale afterwards are removed. The cost is
//!   proportional to that subscriber's dependencies, not to the graph.

mod link;
mod node;
pub mod scheduler;

use std::collections::HashSet;

use serde::Serialize;
use slotmap::SlotMap;
use smallvec::SmallVec;

pub use link::LinkKey;
pub use node::{NodeKey, SubKey, SubscriberFlags};
pub(crate) use node::{Cleanup, DepNode, EffectSlot, MemoCompute, MemoSlot, SubKind, SubNode};

use crate::error::ReactiveError;

/// Counts of live graph records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct GraphStats {
    /// Producer nodes.
    pub nodes: usize,
    /// Effects and memos.
    pub subscribers: usize,
    /// Producer/subscriber edges.
    pub links: usize,
}

/// Arena storage for every node, subscriber and link on one thread.
#[derive(Default)]
pub(crate) struct Graph {
    pub(crate) nodes: SlotMap<NodeKey, DepNode>,
    pub(crate) subs: SlotMap<SubKey, SubNode>,
    pub(crate) links: SlotMap<LinkKey, link::Link>,
}

impl Graph {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert_node(&mut self, memo: Option<SubKey>) -> NodeKey {
        self.nodes.insert(DepNode::new(memo))
    }

    /// A node that lives only while something subscribes to it.
    pub(crate) fn insert_transient_node(&mut self) -> NodeKey {
        self.nodes.insert(DepNode {
            transient: true,
            ..DepNode::default()
        })
    }

    pub(crate) fn insert_sub(&mut self, sub: SubNode) -> SubKey {
        self.subs.insert(sub)
    }

    pub(crate) fn stats(&self) -> GraphStats {
        GraphStats {
            nodes: self.nodes.len(),
            subscribers: self.subs.len(),
            links: self.links.len(),
        }
    }

    /// Snapshot of the subscribers linked to a node, head first.
    pub(crate) fn subscribers_of(&self, node: NodeKey) -> SmallVec<[SubKey; 8]> {
        let mut out = SmallVec::new();
        let mut cursor = self.nodes.get(node).and_then(|n| n.subs_head);
        while let Some(key) = cursor {
            let link = &self.links[key];
            out.push(link.sub);
            cursor = link.next_sub;
        }
        out
    }

    pub(crate) fn dependency_count(&self, sub: SubKey) -> usize {
        let mut count = 0;
        let mut cursor = self.subs.get(sub).and_then(|s| s.deps_head);
        while let Some(key) = cursor {
            count += 1;
            cursor = self.links[key].next_dep;
        }
        count
    }

    /// Mark every dependency of `sub` stale and make each of its links the
    /// active link of its producer for the coming run.
    pub(crate) fn prepare_deps(&mut self, sub: SubKey) {
        let mut cursor = self.subs.get(sub).and_then(|s| s.deps_head);
        while let Some(key) = cursor {
            let link = &mut self.links[key];
            link.version = None;
            let node = link.node;
            cursor = link.next_dep;
            let previous = self.nodes[node].active_link.replace(key);
            self.links[key].prev_active = previous;
        }
    }

    /// Remove links not re-read during the run and restore producers'
    /// active links.
    pub(crate) fn cleanup_deps(&mut self, sub: SubKey) {
        let mut cursor = self.subs.get(sub).and_then(|s| s.deps_head);
        while let Some(key) = cursor {
            let (node, version, next, prev_active) = {
                let link = &self.links[key];
                (link.node, link.version, link.next_dep, link.prev_active)
            };
            cursor = next;
            if version.is_none() {
                self.unlink(key);
                continue;
            }
            if let Some(dep) = self.nodes.get_mut(node) {
                if dep.active_link == Some(key) {
                    dep.active_link = prev_active;
                }
            }
            self.links[key].prev_active = None;
        }
    }

    /// Drop every dependency link owned by `sub`.
    pub(crate) fn unlink_deps(&mut self, sub: SubKey) {
        let mut cursor = self.subs.get(sub).and_then(|s| s.deps_head);
        while let Some(key) = cursor {
            cursor = self.links[key].next_dep;
            self.unlink(key);
        }
    }

    /// Drop every subscriber link of `node` and free the node.
    pub(crate) fn release_node(&mut self, node: NodeKey) {
        let mut cursor = self.nodes.get(node).and_then(|n| n.subs_head);
        while let Some(key) = cursor {
            cursor = self.links[key].next_sub;
            self.unlink(key);
        }
        self.nodes.remove(node);
    }

    /// Walk every producer and subscriber list and check that each link is on
    /// exactly both of the lists it claims to be on.
    pub(crate) fn verify(&self) -> Result<GraphStats, ReactiveError> {
        let mut via_nodes = HashSet::with_capacity(self.links.len());
        for (node_key, node) in &self.nodes {
            let mut prev = None;
            let mut count = 0;
            let mut cursor = node.subs_head;
            while let Some(key) = cursor {
                let link = self.links.get(key).ok_or_else(|| {
                    ReactiveError::Corrupted(format!("node {node_key:?} lists freed link {key:?}"))
                })?;
                if link.node != node_key || link.prev_sub != prev {
                    return Err(ReactiveError::Corrupted(format!(
                        "link {key:?} is misthreaded on node {node_key:?}"
                    )));
                }
                if !via_nodes.insert(key) {
                    return Err(ReactiveError::Corrupted(format!("link {key:?} listed twice")));
                }
                count += 1;
                prev = Some(key);
                cursor = link.next_sub;
            }
            if node.subs_tail != prev || node.sub_count != count {
                return Err(ReactiveError::Corrupted(format!(
                    "node {node_key:?} tail or count out of sync"
                )));
            }
        }

        let mut via_subs = HashSet::with_capacity(self.links.len());
        for (sub_key, sub) in &self.subs {
            let mut prev = None;
            let mut cursor = sub.deps_head;
            while let Some(key) = cursor {
                let link = self.links.get(key).ok_or_else(|| {
                    ReactiveError::Corrupted(format!("subscriber {sub_key:?} lists freed link {key:?}"))
                })?;
                if link.sub != sub_key || link.prev_dep != prev {
                    return Err(ReactiveError::Corrupted(format!(
                        "link {key:?} is misthreaded on subscriber {sub_key:?}"
                    )));
                }
                if !via_subs.insert(key) {
                    return Err(ReactiveError::Corrupted(format!("link {key:?} listed twice")));
                }
                prev = Some(key);
                cursor = link.next_dep;
            }
            if sub.deps_tail != prev {
                return Err(ReactiveError::Corrupted(format!(
                    "subscriber {sub_key:?} tail out of sync"
                )));
            }
        }

        if via_nodes.len() != self.links.len() || via_nodes != via_subs {
            return Err(ReactiveError::Corrupted(format!(
                "{} links allocated, {} on producer lists, {} on subscriber lists",
                self.links.len(),
                via_nodes.len(),
                via_subs.len()
            )));
        }
        Ok(self.stats())
    }
}
