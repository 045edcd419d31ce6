//! Reactive Context
//!
//! The reactive context tracks which computation is currently running and
//! whether reads should register dependencies. This is the single piece of
//! ambient state the runtime relies on.
//!
//! # Implementation
//!
//! We use a thread-local stack. Running a subscriber pushes an entry for it;
//! [`untracked`] and [`pause_tracking`] push entries with tracking disabled.
//! Reads consult the top entry only, so nested runs (a memo read inside an
//! effect) track into the innermost subscriber.
//!
//! Entries pushed by [`ReactiveContext`] guards are popped when the guard is
//! dropped, which keeps the stack balanced even if a body panics.

use std::cell::RefCell;

use crate::graph::SubKey;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = const { RefCell::new(Vec::new()) };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    Run,
    Untracked,
    Paused,
}

/// An entry in the reactive context stack.
#[derive(Debug, Clone, Copy)]
struct ContextEntry {
    kind: EntryKind,
    /// The subscriber reads are attributed to.
    subscriber: Option<SubKey>,
    tracking: bool,
}

/// Guard that pops its context entry when dropped.
pub struct ReactiveContext {
    kind: EntryKind,
    subscriber: Option<SubKey>,
}

impl ReactiveContext {
    fn push(kind: EntryKind, subscriber: Option<SubKey>, tracking: bool) -> Self {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(ContextEntry {
                kind,
                subscriber,
                tracking,
            });
        });
        Self { kind, subscriber }
    }

    /// Enter a tracking context for the given subscriber.
    pub(crate) fn enter(subscriber: SubKey) -> Self {
        Self::push(EntryKind::Run, Some(subscriber), true)
    }

    /// Enter a context with no subscriber at all. Cleanup callbacks run here.
    pub(crate) fn detached() -> Self {
        Self::push(EntryKind::Untracked, None, false)
    }

    /// Enter a context that keeps the current subscriber but stops tracking.
    pub fn untracked() -> Self {
        Self::push(EntryKind::Untracked, Self::current_subscriber(), false)
    }

    /// Check whether reads currently register dependencies.
    pub fn is_active() -> bool {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .is_some_and(|entry| entry.tracking && entry.subscriber.is_some())
        })
    }

    /// The subscriber that reads are attributed to, if tracking.
    pub(crate) fn tracking_subscriber() -> Option<SubKey> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .filter(|entry| entry.tracking)
                .and_then(|entry| entry.subscriber)
        })
    }

    /// The innermost running subscriber, tracking or not.
    pub(crate) fn current_subscriber() -> Option<SubKey> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().and_then(|entry| entry.subscriber))
    }

    fn pop(kind: EntryKind, subscriber: Option<SubKey>) {
        let _ = CONTEXT_STACK.try_with(|stack| {
            let popped = stack.borrow_mut().pop();

            // Verify we're popping the right context.
            if let Some(entry) = popped {
                debug_assert_eq!(
                    (entry.kind, entry.subscriber),
                    (kind, subscriber),
                    "ReactiveContext mismatch"
                );
            }
        });
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        Self::pop(self.kind, self.subscriber);
    }
}

/// Stop registering dependencies until the matching [`resume_tracking`].
pub fn pause_tracking() {
    let subscriber = ReactiveContext::current_subscriber();
    CONTEXT_STACK.with(|stack| {
        stack.borrow_mut().push(ContextEntry {
            kind: EntryKind::Paused,
            subscriber,
            tracking: false,
        });
    });
}

/// Undo the most recent [`pause_tracking`].
pub fn resume_tracking() {
    CONTEXT_STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        match stack.last() {
            Some(entry) if entry.kind == EntryKind::Paused => {
                stack.pop();
            }
            _ => debug_assert!(false, "resume_tracking without pause_tracking"),
        }
    });
}

/// Run `f` without registering any dependency.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _ctx = ReactiveContext::untracked();
    f()
}
