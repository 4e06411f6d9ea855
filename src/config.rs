//! Per-thread runtime configuration.
//!
//! The runtime is single-threaded: the pending queue, the tick FIFO and the
//! evaluation context all live in thread-locals, and so does the
//! configuration that steers them.
//!
//! ```ignore
//! // Deterministic test harness: flush on every change instead of per tick
//! depflow::config::install(Config::new().async_flush(false));
//!
//! // Route diagnostics somewhere visible
//! depflow::config::configure(|cfg| {
//!     cfg.set_warn_handler(|msg| eprintln!("[depflow] {msg}"));
//! });
//! ```

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::Error;
use crate::owner::OwnerId;

/// Re-entries of one watcher within a single flush before the flush is
/// curtailed as an infinite update loop.
pub const MAX_UPDATE_COUNT: usize = 100;

/// Error sink: `(error, owner, info)`.
pub type ErrorHandler = Rc<dyn Fn(&Error, Option<OwnerId>, &str)>;

/// Warning sink.
pub type WarnHandler = Rc<dyn Fn(&str)>;

thread_local! {
    static CONFIG: RefCell<Config> = RefCell::new(Config::new());
}

/// Runtime settings for the current thread.
#[derive(Clone)]
pub struct Config {
    /// Batch watcher runs into one flush per tick (`true`, default) or flush
    /// synchronously on every enqueue (`false`).
    pub async_flush: bool,
    /// See [`MAX_UPDATE_COUNT`].
    pub max_update_count: usize,
    error_handler: Option<ErrorHandler>,
    warn_handler: Option<WarnHandler>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("async_flush", &self.async_flush)
            .field("max_update_count", &self.max_update_count)
            .field("error_handler", &self.error_handler.is_some())
            .field("warn_handler", &self.warn_handler.is_some())
            .finish()
    }
}

impl Config {
    /// Defaults: batched flushing, [`MAX_UPDATE_COUNT`], `tracing` sinks.
    pub fn new() -> Self {
        Self {
            async_flush: true,
            max_update_count: MAX_UPDATE_COUNT,
            error_handler: None,
            warn_handler: None,
        }
    }

    /// Set batched (`true`) or synchronous (`false`) flushing.
    pub fn async_flush(mut self, enabled: bool) -> Self {
        self.async_flush = enabled;
        self
    }

    /// Set the infinite-loop threshold.
    pub fn max_update_count(mut self, count: usize) -> Self {
        self.max_update_count = count;
        self
    }

    /// Install an error handler.
    pub fn error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Error, Option<OwnerId>, &str) + 'static,
    {
        self.set_error_handler(handler);
        self
    }

    /// Install a warning handler.
    pub fn warn_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str) + 'static,
    {
        self.set_warn_handler(handler);
        self
    }

    /// In-place variant of [`Config::error_handler`].
    pub fn set_error_handler<F>(&mut self, handler: F)
    where
        F: Fn(&Error, Option<OwnerId>, &str) + 'static,
    {
        self.error_handler = Some(Rc::new(handler));
    }

    /// In-place variant of [`Config::warn_handler`].
    pub fn set_warn_handler<F>(&mut self, handler: F)
    where
        F: Fn(&str) + 'static,
    {
        self.warn_handler = Some(Rc::new(handler));
    }
}

/// Replace the current thread's configuration.
pub fn install(config: Config) {
    CONFIG.with(|c| *c.borrow_mut() = config);
}

/// Mutate the current thread's configuration in place.
pub fn configure<F>(f: F)
where
    F: FnOnce(&mut Config),
{
    CONFIG.with(|c| f(&mut c.borrow_mut()));
}

/// Restore the defaults.
pub fn reset() {
    install(Config::new());
}

/// Read the configuration. The closure must not call back into `configure`.
pub fn with_config<F, R>(f: F) -> R
where
    F: FnOnce(&Config) -> R,
{
    CONFIG.with(|c| f(&c.borrow()))
}

/// Whether watcher runs are batched per tick.
pub fn is_async() -> bool {
    with_config(|c| c.async_flush)
}

pub(crate) fn max_update_count() -> usize {
    with_config(|c| c.max_update_count)
}

// Handlers are cloned out so they run without the config borrowed; a handler
// may reconfigure the thread.
pub(crate) fn error_handler() -> Option<ErrorHandler> {
    with_config(|c| c.error_handler.clone())
}

pub(crate) fn warn_handler() -> Option<WarnHandler> {
    with_config(|c| c.warn_handler.clone())
}
