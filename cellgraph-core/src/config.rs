//! Runtime configuration.
//!
//! Configuration is per thread, like the graph itself. Hosts install it once
//! at startup with [`Runtime::configure`](crate::reactive::Runtime::configure),
//! typically from a JSON document:
//!
//! ```rust,ignore
//! let config = RuntimeConfig::from_json(r#"{ "recursion_limit": 50, "default_flush": "post" }"#)?;
//! Runtime::configure(config);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ReactiveError;

/// When a watcher's callback runs relative to the flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlushMode {
    /// Before the main pass of the next flush.
    #[default]
    Pre,
    /// After the main pass of the next flush.
    Post,
    /// Immediately, at the end of the write that triggered it.
    Sync,
}

/// Tunables of the reactive runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Maximum runs of a single job within one flush.
    pub recursion_limit: usize,
    /// Flush mode used by watchers that do not pick one.
    pub default_flush: FlushMode,
    /// Log writes attempted through read-only container views.
    pub warn_readonly_writes: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            recursion_limit: 100,
            default_flush: FlushMode::Pre,
            warn_readonly_writes: true,
        }
    }
}

impl RuntimeConfig {
    /// Parse a configuration from JSON. Missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, ReactiveError> {
        Ok(serde_json::from_str(json)?)
    }
}
