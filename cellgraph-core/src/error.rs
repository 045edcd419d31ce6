//! Error types for the reactive runtime.

use std::any::Any;

use thiserror::Error;

/// Errors surfaced by the runtime.
#[derive(Debug, Error)]
pub enum ReactiveError {
    /// A subscriber body, scheduler or watch callback panicked.
    #[error("subscriber {subscriber} panicked: {message}")]
    Panicked { subscriber: u64, message: String },

    /// A job ran more often than allowed within a single flush.
    #[error("job {job} exceeded the recursion limit of {limit} runs in one flush")]
    RecursionLimit { job: u64, limit: usize },

    /// A memo was read while computing its own first value.
    #[error("memo {0} was read while computing its own value")]
    CyclicRead(u64),

    /// A write was attempted through a read-only handle.
    #[error("cannot write to a read-only {0}")]
    Readonly(&'static str),

    /// The runtime configuration could not be parsed.
    #[error("invalid runtime configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// The dependency graph failed its consistency check.
    #[error("dependency graph corrupted: {0}")]
    Corrupted(String),
}

impl ReactiveError {
    /// Build a [`ReactiveError::Panicked`] from a caught panic payload.
    pub fn from_panic(subscriber: u64, payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(message) = payload.downcast_ref::<&str>() {
            (*message).to_string()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::Panicked {
            subscriber,
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_become_messages() {
        let err = ReactiveError::from_panic(4, &"static message");
        assert_eq!(err.to_string(), "subscriber 4 panicked: static message");

        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let err = ReactiveError::from_panic(5, owned.as_ref());
        assert!(matches!(err, ReactiveError::Panicked { subscriber: 5, ref message } if message == "owned"));
    }

    #[test]
    fn config_errors_convert() {
        let parse = serde_json::from_str::<u32>("not json").unwrap_err();
        let err: ReactiveError = parse.into();
        assert!(err.to_string().starts_with("invalid runtime configuration"));
    }
}
