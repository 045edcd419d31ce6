//! Subscriber identifiers.
//!
//! Every subscriber (effect, memo, or watcher) gets an ascending id when it is
//! created. The flush queue orders jobs by this id, so a subscriber created
//! while another one runs always sorts after its creator.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique, ascending identifier for a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate the next subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
