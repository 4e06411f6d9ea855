//! Error type and the diagnostic sink.
//!
//! Nothing in this crate panics on a failed evaluation or a bad mutation.
//! Failures either come back as [`Error`] from the call that caused them, or
//! they are routed to [`report`] / [`warn`], which forward to the handlers
//! installed through [`crate::config`] and fall back to `tracing`.

use thiserror::Error;

use crate::config;
use crate::owner::OwnerId;

/// Error type returned by user evaluators and callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Crate result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the reactive runtime.
#[derive(Debug, Error)]
pub enum Error {
    /// A watcher's evaluator failed.
    #[error("error in {info}: {source}")]
    Evaluation {
        /// Where the failure happened, e.g. `getter for watcher "total"`.
        info: String,
        /// The evaluator's own error.
        source: BoxError,
    },

    /// A change callback, a hook, or a tick callback failed.
    #[error("error in {info}: {source}")]
    Callback {
        /// Where the failure happened, e.g. `callback for watcher "total"`.
        info: String,
        /// The callback's own error.
        source: BoxError,
    },

    /// `set` / `del` / a write hit a target that cannot take it.
    #[error("{message}")]
    InvalidMutation {
        /// Human readable description of the rejected mutation.
        message: String,
    },

    /// A watcher kept re-queueing itself during one flush.
    #[error("you may have an infinite update loop {location}")]
    InfiniteLoop {
        /// Ordering id of the offending watcher.
        uid: u64,
        /// `in watcher with expression "..."` or `in a render watcher`.
        location: String,
    },

    /// The watcher was torn down and must not be used again.
    #[error("watcher {uid} has been torn down")]
    TornDown {
        /// Ordering id of the torn-down watcher.
        uid: u64,
    },
}

impl Error {
    pub(crate) fn evaluation(info: impl Into<String>, source: BoxError) -> Self {
        Self::Evaluation {
            info: info.into(),
            source,
        }
    }

    pub(crate) fn callback(info: impl Into<String>, source: BoxError) -> Self {
        Self::Callback {
            info: info.into(),
            source,
        }
    }

    pub(crate) fn invalid_mutation(message: impl Into<String>) -> Self {
        Self::InvalidMutation {
            message: message.into(),
        }
    }
}

/// Route an error to the configured error handler.
///
/// `owner` identifies the owner whose watcher or hook failed (if any) and
/// `info` says which part of it. Without a handler the error is logged at
/// `error` level.
pub fn report(error: &Error, owner: Option<OwnerId>, info: &str) {
    match config::error_handler() {
        Some(handler) => handler(error, owner, info),
        None => tracing::error!(%error, ?owner, info, "unhandled reactive error"),
    }
}

/// Emit a warning through the configured warn handler (or `tracing::warn!`).
pub fn warn(message: &str) {
    match config::warn_handler() {
        Some(handler) => handler(message),
        None => tracing::warn!("{message}"),
    }
}
