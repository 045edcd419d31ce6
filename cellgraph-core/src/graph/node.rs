//! Graph Nodes
//!
//! This module defines the records that live in the dependency graph arena:
//! producer nodes (one per signal, container key, or memo output) and
//! subscriber nodes (effects and memos).

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use bitflags::bitflags;
use slotmap::new_key_type;
use smallvec::SmallVec;

use super::link::LinkKey;
use super::scheduler::Job;
use crate::reactive::SubscriberId;

new_key_type! {
    /// Arena key of a producer node.
    pub struct NodeKey;

    /// Arena key of a subscriber node.
    pub struct SubKey;
}

bitflags! {
    /// State bits of a subscriber.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SubscriberFlags: u16 {
        /// The subscriber has not been stopped.
        const ACTIVE = 1 << 0;
        /// The body is currently executing.
        const RUNNING = 1 << 1;
        /// Reads inside the body register links.
        const TRACKING = 1 << 2;
        /// A producer notified since the last run; confirmed by a version walk.
        const DIRTY = 1 << 3;
        /// Notification delivery is suspended.
        const PAUSED = 1 << 4;
        /// Already collected by the current batch.
        const NOTIFIED = 1 << 5;
        /// The body may re-trigger itself once per external trigger.
        const ALLOW_RECURSE = 1 << 6;
        /// A memo holds a computed value.
        const EVALUATED = 1 << 7;
        /// A trigger arrived while paused.
        const PENDING = 1 << 8;
        /// Re-run inline at the end of the triggering batch instead of queueing.
        const SYNC = 1 << 9;
        /// Re-triggered itself during the current external trigger.
        const RECURSED = 1 << 10;
    }
}

/// Cleanup callback owned by a subscriber.
pub(crate) type Cleanup = Box<dyn FnOnce()>;

/// Recompute hook implemented by typed memos.
///
/// Returns `true` when the freshly computed value differs from the cached one.
pub(crate) trait MemoCompute {
    fn recompute(&self) -> bool;
}

/// A producer: anything a subscriber can depend on.
#[derive(Debug, Default)]
pub(crate) struct DepNode {
    /// Bumped on every logical write; never decreases.
    pub(crate) version: u64,
    pub(crate) subs_head: Option<LinkKey>,
    pub(crate) subs_tail: Option<LinkKey>,
    pub(crate) sub_count: usize,
    /// Link of the innermost running subscriber that read this node.
    pub(crate) active_link: Option<LinkKey>,
    /// Back-pointer to the memo producing this node, if any.
    pub(crate) memo: Option<SubKey>,
    /// Freed as soon as its last subscriber link goes away.
    pub(crate) transient: bool,
}

impl DepNode {
    pub(crate) fn new(memo: Option<SubKey>) -> Self {
        Self {
            memo,
            ..Self::default()
        }
    }
}

pub(crate) struct EffectSlot {
    pub(crate) body: Rc<RefCell<dyn FnMut()>>,
    pub(crate) scheduler: Option<Rc<dyn Fn()>>,
    pub(crate) job: Rc<Job>,
    pub(crate) cleanups: SmallVec<[Cleanup; 2]>,
    pub(crate) on_stop: Option<Cleanup>,
    pub(crate) runs: usize,
}

pub(crate) struct MemoSlot {
    pub(crate) node: NodeKey,
    pub(crate) compute: Weak<dyn MemoCompute>,
    /// World version observed at the last refresh.
    pub(crate) global_version: Option<u64>,
}

pub(crate) enum SubKind {
    Effect(EffectSlot),
    Memo(MemoSlot),
}

/// A subscriber: a tracked computation owning a list of dependency links.
pub(crate) struct SubNode {
    pub(crate) id: SubscriberId,
    pub(crate) flags: SubscriberFlags,
    pub(crate) deps_head: Option<LinkKey>,
    pub(crate) deps_tail: Option<LinkKey>,
    pub(crate) kind: SubKind,
}

impl SubNode {
    pub(crate) fn new(id: SubscriberId, flags: SubscriberFlags, kind: SubKind) -> Self {
        Self {
            id,
            flags,
            deps_head: None,
            deps_tail: None,
            kind,
        }
    }

    pub(crate) fn effect(&self) -> Option<&EffectSlot> {
        match &self.kind {
            SubKind::Effect(slot) => Some(slot),
            SubKind::Memo(_) => None,
        }
    }

    pub(crate) fn effect_mut(&mut self) -> Option<&mut EffectSlot> {
        match &mut self.kind {
            SubKind::Effect(slot) => Some(slot),
            SubKind::Memo(_) => None,
        }
    }

    pub(crate) fn memo_mut(&mut self) -> Option<&mut MemoSlot> {
        match &mut self.kind {
            SubKind::Memo(slot) => Some(slot),
            SubKind::Effect(_) => None,
        }
    }

    pub(crate) fn is_memo(&self) -> bool {
        matches!(self.kind, SubKind::Memo(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_node_has_no_subscribers() {
        let node = DepNode::new(None);
        assert_eq!(node.version, 0);
        assert!(node.subs_head.is_none());
        assert!(node.subs_tail.is_none());
        assert_eq!(node.sub_count, 0);
    }

    #[test]
    fn flags_combine() {
        let mut flags = SubscriberFlags::ACTIVE | SubscriberFlags::TRACKING;
        assert!(flags.contains(SubscriberFlags::ACTIVE));

        flags.insert(SubscriberFlags::DIRTY);
        flags.remove(SubscriberFlags::TRACKING);
        assert_eq!(flags, SubscriberFlags::ACTIVE | SubscriberFlags::DIRTY);
    }
}
