#![deny(missing_docs)]

//! Dependency-tracking reactive properties, watchers and a batched update
//! scheduler.
//!
//! Plain maps and lists become reactive when observed: every key gets a
//! [`Dep`], and reading it inside a running [`Watcher`] subscribes that
//! watcher. Writing the key notifies its subscribers, which are queued once,
//! flushed on the next tick in creation order, and re-evaluated with their
//! dependency sets rebuilt from scratch.
//!
//! # Quick Start
//!
//! ```ignore
//! use depflow::{ReactiveMap, Value, Watcher, WatcherOptions, observe, run_until_idle};
//!
//! let state: ReactiveMap = [("first", "Ada"), ("last", "Lovelace")].into_iter().collect();
//! observe(&Value::from(state.clone()));
//!
//! let reader = state.clone();
//! let full_name = Watcher::new(
//!     move || {
//!         let first = reader.get("first").unwrap_or_default();
//!         let last = reader.get("last").unwrap_or_default();
//!         Ok(Value::from(format!("{first} {last}")))
//!     },
//!     |new, old| {
//!         println!("{old} -> {new}");
//!         Ok(())
//!     },
//!     WatcherOptions::new().user(true).expression("fullName"),
//! )?;
//!
//! // Both writes land in one flush; the callback runs once
//! state.put("first", "Augusta");
//! state.put("last", "King");
//! run_until_idle();
//! ```
//!
//! # Core Types
//!
//! - [`ReactiveMap`] / [`ReactiveList`] - containers that become reactive
//!   once [`observe`]d. Add or remove keys with [`set`] / [`del`].
//! - [`Watcher`] - evaluator plus change callback. Lazy watchers are
//!   computed values read through [`Watcher::read`].
//! - [`Dep`] - attachment point between a piece of state and its watchers,
//!   usable on its own for custom state.
//! - [`Owner`] - groups watchers, carries the render watcher and the
//!   `updated` / `activated` hooks.
//!
//! # Watchers
//!
//! ```ignore
//! // Computed: evaluated on first read, cached until a dependency changes
//! let total = Watcher::lazy(move || sum(&items), WatcherOptions::default());
//! let value = total.read()?;
//!
//! // Deep user watcher on a path, fired right away
//! let settings = Watcher::watch_path(
//!     &root,
//!     "user.settings",
//!     |new, _old| save(new),
//!     WatcherOptions::new().deep(true).immediate(true),
//! )?;
//! ```
//!
//! # Processing Updates
//!
//! ```ignore
//! next_tick(|| { ... });          // Run after the next flush
//! next_tick_future().await;       // Same, as a future
//! run_until_idle();               // Drain the tick FIFO (flushes watchers)
//! untracked(|| { ... });          // Read without tracking dependencies
//!
//! // Deterministic tests: flush synchronously on every change
//! depflow::config::install(Config::new().async_flush(false));
//! ```
//!
//! # Threading
//!
//! Values and arenas are `Send + Sync`, but the scheduler queue, the tick
//! FIFO, the evaluation context and [`config`] are per thread: a watcher is
//! flushed on the thread whose tick FIFO it was queued on.

// Internal modules
pub(crate) mod arena;
pub mod config;
mod dep;
mod error;
mod hash;
mod list;
mod map;
mod observer;
mod owner;
mod path;
mod scheduler;
mod tick;
mod traverse;
mod value;
mod watcher;

// Core types
pub use arena::{DepId, WatcherId};
pub use config::{Config, MAX_UPDATE_COUNT};
pub use dep::Dep;
pub use error::{BoxError, Error, Result, report, warn};
pub use list::ReactiveList;
pub use map::ReactiveMap;
pub use observer::{Key, Observer};
pub use owner::{Owner, OwnerId};
pub use path::Path;
pub use value::Value;
pub use watcher::{Watcher, WatcherOptions};

// Key functions
pub use observer::{
    define_reactive, del, is_observing, observe, observe_root, pause_observing, set,
};
pub use watcher::untracked;

// Scheduling
pub use scheduler::{
    current_flush_timestamp, flush_scheduler_queue, is_flush_scheduled, is_flushing,
    pending_count, queue_activated, queue_watcher,
};
pub use tick::{
    NextTick, clear_tick_driver, flush_ticks, has_pending_ticks, next_tick, next_tick_future,
    run_until_idle, set_tick_driver,
};

#[cfg(test)]
mod tests;
