//! Links
//!
//! A link is the edge between one producer and one subscriber. Every link is
//! threaded onto two intrusive doubly linked lists at once: the producer's
//! subscriber list and the subscriber's dependency list. Insertion and removal
//! are O(1) on both sides, and a link is always on both lists or on neither.

use slotmap::new_key_type;

use super::node::{NodeKey, SubKey};
use super::Graph;

new_key_type! {
    /// Arena key of a link.
    pub struct LinkKey;
}

#[derive(Debug, Clone)]
pub(crate) struct Link {
    pub(crate) node: NodeKey,
    pub(crate) sub: SubKey,
    /// Producer version at the last read. `None` marks the link as not yet
    /// re-read during the subscriber's current run.
    pub(crate) version: Option<u64>,
    pub(crate) prev_sub: Option<LinkKey>,
    pub(crate) next_sub: Option<LinkKey>,
    pub(crate) prev_dep: Option<LinkKey>,
    pub(crate) next_dep: Option<LinkKey>,
    /// The producer's `active_link` before this link took its place.
    pub(crate) prev_active: Option<LinkKey>,
}

impl Graph {
    /// Create a link from `node` to `sub`, appended to the tail of both lists.
    pub(crate) fn link(&mut self, node: NodeKey, sub: SubKey) -> LinkKey {
        let (version, prev_active) = {
            let dep = &self.nodes[node];
            (dep.version, dep.active_link)
        };
        let key = self.links.insert(Link {
            node,
            sub,
            version: Some(version),
            prev_sub: None,
            next_sub: None,
            prev_dep: None,
            next_dep: None,
            prev_active,
        });
        self.nodes[node].active_link = Some(key);
        self.append_dep(sub, key);
        self.append_sub(node, key);
        key
    }

    /// Remove a link from both lists and free it.
    pub(crate) fn unlink(&mut self, key: LinkKey) {
        if !self.links.contains_key(key) {
            return;
        }
        self.detach_dep(key);
        self.detach_sub(key);
        if let Some(link) = self.links.remove(key) {
            let mut unused = false;
            if let Some(node) = self.nodes.get_mut(link.node) {
                if node.active_link == Some(key) {
                    node.active_link = link.prev_active;
                }
                unused = node.transient && node.sub_count == 0;
            }
            if unused {
                self.nodes.remove(link.node);
            }
        }
    }

    /// Move a link to the tail of its subscriber's dependency list so the
    /// list reflects the order of the most recent run.
    pub(crate) fn move_dep_to_tail(&mut self, key: LinkKey) {
        let sub = self.links[key].sub;
        if self.subs[sub].deps_tail == Some(key) {
            return;
        }
        self.detach_dep(key);
        self.append_dep(sub, key);
    }

    fn append_dep(&mut self, sub: SubKey, key: LinkKey) {
        let tail = self.subs[sub].deps_tail;
        {
            let link = &mut self.links[key];
            link.prev_dep = tail;
            link.next_dep = None;
        }
        match tail {
            Some(tail) => self.links[tail].next_dep = Some(key),
            None => self.subs[sub].deps_head = Some(key),
        }
        self.subs[sub].deps_tail = Some(key);
    }

    fn detach_dep(&mut self, key: LinkKey) {
        let (sub, prev, next) = {
            let link = &self.links[key];
            (link.sub, link.prev_dep, link.next_dep)
        };
        match prev {
            Some(prev) => self.links[prev].next_dep = next,
            None => {
                if let Some(owner) = self.subs.get_mut(sub) {
                    owner.deps_head = next;
                }
            }
        }
        match next {
            Some(next) => self.links[next].prev_dep = prev,
            None => {
                if let Some(owner) = self.subs.get_mut(sub) {
                    owner.deps_tail = prev;
                }
            }
        }
        let link = &mut self.links[key];
        link.prev_dep = None;
        link.next_dep = None;
    }

    fn append_sub(&mut self, node: NodeKey, key: LinkKey) {
        let tail = self.nodes[node].subs_tail;
        {
            let link = &mut self.links[key];
            link.prev_sub = tail;
            link.next_sub = None;
        }
        match tail {
            Some(tail) => self.links[tail].next_sub = Some(key),
            None => self.nodes[node].subs_head = Some(key),
        }
        let dep = &mut self.nodes[node];
        dep.subs_tail = Some(key);
        dep.sub_count += 1;
    }

    fn detach_sub(&mut self, key: LinkKey) {
        let (node, prev, next) = {
            let link = &self.links[key];
            (link.node, link.prev_sub, link.next_sub)
        };
        match prev {
            Some(prev) => self.links[prev].next_sub = next,
            None => {
                if let Some(dep) = self.nodes.get_mut(node) {
                    dep.subs_head = next;
                }
            }
        }
        match next {
            Some(next) => self.links[next].prev_sub = prev,
            None => {
                if let Some(dep) = self.nodes.get_mut(node) {
                    dep.subs_tail = prev;
                }
            }
        }
        if let Some(dep) = self.nodes.get_mut(node) {
            dep.sub_count = dep.sub_count.saturating_sub(1);
        }
        let link = &mut self.links[key];
        link.prev_sub = None;
        link.next_sub = None;
    }
}
