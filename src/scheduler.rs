//! Pending queue and flush.
//!
//! Notified watchers are queued at most once per flush and run in ascending
//! uid order, so a watcher created earlier (typically a parent, or a user
//! watcher created before its owner's render watcher) runs first. A watcher
//! queued while the flush is running is spliced in at its uid position among
//! the entries that have not run yet; if that position was already passed, it
//! runs next.
//!
//! After the queue drains, owners queued for activation get their
//! `activated` hook, then every owner whose render watcher ran gets its
//! `updated` hook, children before parents.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::time::Instant;

use crate::arena::WatcherId;
use crate::config;
use crate::error::{Error, report, warn};
use crate::hash::FastHashBuilder;
use crate::owner::{OwnerHook, OwnerId};
use crate::tick;

#[derive(Clone, Copy, Debug)]
struct QueueEntry {
    id: WatcherId,
    uid: u64,
}

impl QueueEntry {
    /// The slot still holds the watcher this entry was queued for.
    fn is_live(self) -> bool {
        self.id.uid() == Some(self.uid)
    }
}

#[derive(Default)]
struct SchedulerState {
    queue: Vec<QueueEntry>,
    activated: Vec<OwnerId>,
    has: HashSet<u64, FastHashBuilder>,
    circular: HashMap<u64, usize, FastHashBuilder>,
    /// A flush has been requested and has not finished.
    waiting: bool,
    flushing: bool,
    /// Position of the entry being run.
    index: usize,
}

impl SchedulerState {
    fn reset(&mut self) {
        self.queue.clear();
        self.activated.clear();
        self.has.clear();
        self.circular.clear();
        self.waiting = false;
        self.flushing = false;
        self.index = 0;
    }
}

thread_local! {
    static SCHEDULER: RefCell<SchedulerState> = RefCell::new(SchedulerState::default());
    static FLUSH_TIMESTAMP: Cell<Option<Instant>> = const { Cell::new(None) };
}

/// Queue a watcher for the next flush.
///
/// A watcher already waiting is not queued twice. Outside a flush it is
/// appended; during a flush it is inserted after the last pending entry with
/// a smaller or equal uid, but never before the entry currently running.
/// The first enqueue of a cycle requests a flush: through the tick FIFO, or
/// right away when `async_flush` is off.
pub fn queue_watcher(watcher: WatcherId) {
    let Some(uid) = watcher.uid() else {
        return;
    };
    let entry = QueueEntry { id: watcher, uid };

    let request_flush = SCHEDULER.with(|state| {
        let mut state = state.borrow_mut();
        if !state.has.insert(uid) {
            return false;
        }
        if state.flushing {
            let mut position = state.queue.len();
            while position > state.index + 1 && state.queue[position - 1].uid > uid {
                position -= 1;
            }
            cov_mark::hit!(queued_during_flush);
            state.queue.insert(position, entry);
        } else {
            state.queue.push(entry);
        }
        if state.waiting {
            false
        } else {
            state.waiting = true;
            true
        }
    });

    if request_flush {
        if config::is_async() {
            tick::next_tick(|| {
                flush_scheduler_queue();
                Ok(())
            });
        } else {
            flush_scheduler_queue();
        }
    }
}

/// Queue an owner for the `activated` pass of the current or next flush.
pub fn queue_activated(owner: OwnerId) {
    owner.set_inactive(false);
    SCHEDULER.with(|state| state.borrow_mut().activated.push(owner));
}

/// Run every queued watcher, then the post-flush hooks.
///
/// Called from the tick FIFO; also safe to call directly (a call made while
/// a flush is running returns at once). A watcher that
/// fails is reported and the flush moves on. A watcher that re-enters the
/// queue more than [`Config::max_update_count`](crate::Config) times is
/// reported as an infinite update loop and the rest of the flush is
/// abandoned.
pub fn flush_scheduler_queue() {
    let max_update_count = config::max_update_count();

    let Some(queued) = SCHEDULER.with(|state| {
        let mut state = state.borrow_mut();
        if state.flushing {
            return None;
        }
        state.flushing = true;
        state.waiting = true;
        state.index = 0;
        state.queue.sort_by_key(|entry| entry.uid);
        Some(state.queue.len())
    }) else {
        // Re-entrant call from inside a watcher; the running flush picks up
        // anything queued meanwhile.
        return;
    };
    let mut unwind_guard = ResetOnUnwind { armed: true };
    FLUSH_TIMESTAMP.set(Some(Instant::now()));
    let _span = tracing::trace_span!("flush", queued).entered();

    loop {
        let Some(entry) = SCHEDULER.with(|state| {
            let state = state.borrow();
            state.queue.get(state.index).copied()
        }) else {
            break;
        };

        if entry.is_live() {
            entry.id.run_before_hook();
        }
        SCHEDULER.with(|state| state.borrow_mut().has.remove(&entry.uid));
        if entry.is_live() {
            if let Err(error) = entry.id.run() {
                report(&error, entry.id.owner(), "scheduler flush");
            }
        }

        let runaway = SCHEDULER.with(|state| {
            let mut state = state.borrow_mut();
            if !state.has.contains(&entry.uid) {
                return false;
            }
            let count = state.circular.entry(entry.uid).or_insert(0);
            *count += 1;
            *count > max_update_count
        });
        if runaway {
            cov_mark::hit!(infinite_update_loop_aborts_flush);
            let location = if entry.id.is_user() {
                format!("in watcher with expression \"{}\"", entry.id.expression())
            } else {
                "in a render watcher".to_owned()
            };
            let error = Error::InfiniteLoop {
                uid: entry.uid,
                location,
            };
            warn(&error.to_string());
            break;
        }

        SCHEDULER.with(|state| state.borrow_mut().index += 1);
    }

    // Snapshot, then reset before any hook runs, so hooks may queue a fresh
    // cycle.
    let (ran, activated) = SCHEDULER.with(|state| {
        let mut state = state.borrow_mut();
        let ran = std::mem::take(&mut state.queue);
        let activated = std::mem::take(&mut state.activated);
        state.reset();
        (ran, activated)
    });
    unwind_guard.armed = false;
    tracing::trace!(ran = ran.len(), "flush done");

    for owner in activated {
        owner.call_hook(OwnerHook::Activated);
    }
    for entry in ran.iter().rev() {
        let Some(owner) = entry.id.owner().filter(|_| entry.is_live()) else {
            continue;
        };
        if owner.render_watcher() == Some(entry.uid) && owner.is_mounted() && !owner.is_destroyed()
        {
            owner.call_hook(OwnerHook::Updated);
        }
    }
}

/// Clears the scheduler when a watcher unwinds out of the flush, so the
/// thread can request flushes again.
struct ResetOnUnwind {
    armed: bool,
}

impl Drop for ResetOnUnwind {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        SCHEDULER.with(|state| {
            if let Ok(mut state) = state.try_borrow_mut() {
                state.reset();
            }
        });
    }
}

/// Number of queued watchers that have not run yet.
pub fn pending_count() -> usize {
    SCHEDULER.with(|state| {
        let state = state.borrow();
        if state.flushing {
            state.queue.len().saturating_sub(state.index + 1)
        } else {
            state.queue.len()
        }
    })
}

/// Whether a flush has been requested and has not completed.
pub fn is_flush_scheduled() -> bool {
    SCHEDULER.with(|state| state.borrow().waiting)
}

/// Whether the queue is being flushed right now.
pub fn is_flushing() -> bool {
    SCHEDULER.with(|state| state.borrow().flushing)
}

/// When the current (or last) flush started.
pub fn current_flush_timestamp() -> Option<Instant> {
    FLUSH_TIMESTAMP.get()
}
