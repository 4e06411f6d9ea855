// Watcher arena - storage for watcher metadata
//
// A watcher's evaluator, change callback, before-hook, cached value and
// dependency sets all live here, so the public `Watcher` type is a thin
// owning wrapper around a `WatcherId` and deps can refer to watchers by id.
//
// Two ids exist per watcher:
// - WatcherId: the slab key, reused after the watcher is dropped
// - uid: a monotonically increasing ordering id, never reused. The scheduler
//   sorts by uid, so a watcher created earlier (a parent, or an owner's state
//   watcher created before its render watcher) always runs first.
//
// Locking discipline: closures passed to `WatcherId::with` only touch the
// metadata's own fields. Anything that may drop a `Value` or a user closure,
// or call back into the arenas, happens after the arena guard is released.

use crate::arena::DepId;
use crate::error::BoxError;
use crate::hash::FastIndexSet;
use crate::owner::OwnerId;
use crate::value::Value;
use parking_lot::{Mutex, RwLock};
use slab::Slab;
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Boxed evaluator stored in the arena.
pub type Evaluator = Box<dyn FnMut() -> Result<Value, BoxError> + Send>;

/// Boxed change callback stored in the arena: `(new, old)`.
pub type ChangeCallback = Box<dyn FnMut(&Value, &Value) -> Result<(), BoxError> + Send>;

/// Boxed hook run by the scheduler right before the watcher runs.
pub type BeforeHook = Box<dyn FnMut() + Send>;

/// Global watcher arena - stores all watcher metadata
static WATCHER_ARENA: RwLock<Slab<WatcherMetadata>> = RwLock::new(Slab::new());

/// Source of ordering ids. Starts at 1 so 0 never names a watcher.
static NEXT_UID: AtomicU64 = AtomicU64::new(1);

// The watcher currently being evaluated on this thread.
// Nested evaluations stack through EvaluationGuard, which remembers the
// previous value and restores it on drop (including during unwinding).
thread_local! {
    static CURRENT_WATCHER: Cell<Option<WatcherId>> = const { Cell::new(None) };
}

/// The watcher currently collecting dependencies, if any.
pub fn current_watcher() -> Option<WatcherId> {
    CURRENT_WATCHER.with(Cell::get)
}

fn set_current_watcher(watcher: Option<WatcherId>) -> Option<WatcherId> {
    CURRENT_WATCHER.with(|c| c.replace(watcher))
}

/// RAII guard that makes a watcher the evaluation target for its lifetime.
///
/// `EvaluationGuard::new(None)` suspends tracking (see [`crate::untracked`]).
pub struct EvaluationGuard {
    previous: Option<WatcherId>,
}

impl EvaluationGuard {
    /// Push `target`; the previous target comes back when the guard drops.
    pub fn new(target: Option<WatcherId>) -> Self {
        let previous = set_current_watcher(target);
        Self { previous }
    }
}

impl Drop for EvaluationGuard {
    fn drop(&mut self) {
        set_current_watcher(self.previous);
    }
}

/// Slab key of a watcher.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct WatcherId(u32);

impl WatcherId {
    pub(crate) fn new(index: u32) -> Self {
        Self(index)
    }

    /// Slab index of this watcher.
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Access the watcher metadata (read-only). `None` once the watcher is dropped.
    pub(crate) fn with<F, R>(self, f: F) -> Option<R>
    where
        F: FnOnce(&WatcherMetadata) -> R,
    {
        let arena = WATCHER_ARENA.read_recursive();
        arena.get(self.index()).map(f)
    }

    /// Ordering id.
    pub fn uid(self) -> Option<u64> {
        self.with(|metadata| metadata.uid)
    }

    /// Whether the watcher exists and has not been torn down.
    pub fn is_active(self) -> bool {
        self.with(|metadata| metadata.active.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    pub(crate) fn flags(self) -> u8 {
        self.with(|metadata| metadata.flags).unwrap_or(0)
    }

    pub(crate) fn owner(self) -> Option<OwnerId> {
        self.with(|metadata| metadata.owner).flatten()
    }

    pub(crate) fn expression(self) -> String {
        self.with(|metadata| metadata.expression.clone())
            .unwrap_or_default()
    }

    /// Snapshot of the deps collected by the last evaluation.
    pub fn deps(self) -> Vec<DepId> {
        self.with(|metadata| metadata.deps.lock().deps.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Drop every trace of `dep` from this watcher's tracking sets.
    ///
    /// Called when a dep is freed, so the next cleanup pass does not try to
    /// unsubscribe from a slot that may already belong to a new dep.
    pub(crate) fn forget_dep(self, dep: DepId) {
        self.with(|metadata| {
            let mut tracking = metadata.deps.lock();
            tracking.deps.shift_remove(&dep);
            tracking.new_deps.shift_remove(&dep);
        });
    }

    /// Take a closure out of its slot, run it with the arena unlocked, and put
    /// it back afterwards (also when `f` panics).
    ///
    /// Returns `None` when the watcher is gone or the slot is empty, which is
    /// also the case for a re-entrant call on the same slot.
    pub(crate) fn with_taken<T, F, R>(
        self,
        slot: fn(&WatcherMetadata) -> &Mutex<Option<T>>,
        f: F,
    ) -> Option<R>
    where
        F: FnOnce(&mut T) -> R,
    {
        struct Restore<T> {
            id: WatcherId,
            slot: fn(&WatcherMetadata) -> &Mutex<Option<T>>,
            value: Option<T>,
        }

        impl<T> Drop for Restore<T> {
            fn drop(&mut self) {
                let slot = self.slot;
                let value = &mut self.value;
                self.id.with(|metadata| {
                    let mut guard = slot(metadata).lock();
                    if guard.is_none() {
                        *guard = value.take();
                    }
                });
                // Anything not restored (watcher dropped meanwhile) is
                // released here, outside the arena lock.
            }
        }

        let taken = self.with(|metadata| slot(metadata).lock().take()).flatten()?;
        let mut restore = Restore {
            id: self,
            slot,
            value: Some(taken),
        };
        let value = restore.value.as_mut()?;
        Some(f(value))
    }
}

/// Dependency sets of one watcher.
///
/// `deps` holds what the previous evaluation touched, `new_deps` collects
/// what the running evaluation touches. Cleanup diffs and swaps them.
#[derive(Debug, Default)]
pub struct DepTracking {
    pub(crate) deps: FastIndexSet<DepId>,
    pub(crate) new_deps: FastIndexSet<DepId>,
}

/// Flag bits
pub(crate) const FLAG_DEEP: u8 = 1 << 0;
pub(crate) const FLAG_USER: u8 = 1 << 1;
pub(crate) const FLAG_LAZY: u8 = 1 << 2;
pub(crate) const FLAG_SYNC: u8 = 1 << 3;
pub(crate) const FLAG_RENDER: u8 = 1 << 4;

/// Metadata for one watcher.
pub struct WatcherMetadata {
    /// Monotonic ordering id.
    pub(crate) uid: u64,
    /// Mode bits (deep/user/lazy/sync/render).
    pub(crate) flags: u8,
    /// Owner this watcher belongs to, if any.
    pub(crate) owner: Option<OwnerId>,
    /// Label used in diagnostics.
    pub(crate) expression: String,
    /// Cleared by teardown; inactive watchers never re-evaluate.
    pub(crate) active: AtomicBool,
    /// Lazy watchers only: the cached value is stale.
    pub(crate) dirty: AtomicBool,
    pub(crate) evaluator: Mutex<Option<Evaluator>>,
    pub(crate) callback: Mutex<Option<ChangeCallback>>,
    pub(crate) before: Mutex<Option<BeforeHook>>,
    /// Value produced by the last successful evaluation.
    pub(crate) value: RwLock<Value>,
    pub(crate) deps: Mutex<DepTracking>,
}

impl WatcherMetadata {
    /// Build metadata with a fresh uid. Lazy watchers start dirty.
    pub(crate) fn new(
        evaluator: Evaluator,
        callback: Option<ChangeCallback>,
        before: Option<BeforeHook>,
        flags: u8,
        owner: Option<OwnerId>,
        expression: String,
    ) -> Self {
        Self {
            uid: NEXT_UID.fetch_add(1, Ordering::Relaxed),
            flags,
            owner,
            expression,
            active: AtomicBool::new(true),
            dirty: AtomicBool::new(flags & FLAG_LAZY != 0),
            evaluator: Mutex::new(Some(evaluator)),
            callback: Mutex::new(callback),
            before: Mutex::new(before),
            value: RwLock::new(Value::Null),
            deps: Mutex::new(DepTracking::default()),
        }
    }
}

pub(crate) fn evaluator_slot(metadata: &WatcherMetadata) -> &Mutex<Option<Evaluator>> {
    &metadata.evaluator
}

pub(crate) fn callback_slot(metadata: &WatcherMetadata) -> &Mutex<Option<ChangeCallback>> {
    &metadata.callback
}

pub(crate) fn before_slot(metadata: &WatcherMetadata) -> &Mutex<Option<BeforeHook>> {
    &metadata.before
}

/// Insert watcher metadata into the arena and return its id.
pub fn watcher_arena_insert(metadata: WatcherMetadata) -> WatcherId {
    let mut arena = WATCHER_ARENA.write();
    let entry = arena.vacant_entry();
    let key = entry.key();
    entry.insert(metadata);
    WatcherId::new(key as u32)
}

/// Remove a watcher from the arena. The caller drops the returned metadata,
/// which releases the closures and the cached value outside the lock.
pub fn watcher_arena_remove(id: WatcherId) -> Option<WatcherMetadata> {
    let mut arena = WATCHER_ARENA.write();
    arena.try_remove(id.index())
}
