// Dep arena - storage for dependency metadata
//
// A Dep is the attachment point between a piece of reactive state and the
// watchers that read it. The arena only knows about subscribers; which field
// or container a dep belongs to is the business of the reactive property
// layer (see observer.rs / map.rs / list.rs).
//
// Subscribers are an insertion-ordered set so notification order is the
// subscription order unless the runtime is in synchronous mode, where
// notify() sorts by watcher uid instead.

use crate::config;
use crate::hash::FastIndexSet;
use parking_lot::RwLock;
use slab::Slab;

use super::watcher_arena::{WatcherId, current_watcher};

/// Global dep arena - stores all dep metadata
static DEP_ARENA: RwLock<Slab<DepMetadata>> = RwLock::new(Slab::new());

/// Identifier of a dep in the arena.
///
/// Owning [`crate::Dep`] handles free their slot on drop and unlink every
/// subscriber first, so a live watcher never holds a stale `DepId`.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, PartialOrd, Ord)]
pub struct DepId(u32);

impl DepId {
    pub(crate) fn new(index: u32) -> Self {
        Self(index)
    }

    /// Slab index of this dep.
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Access the dep metadata (read-only). `None` once the dep is freed.
    pub(crate) fn with<F, R>(self, f: F) -> Option<R>
    where
        F: FnOnce(&DepMetadata) -> R,
    {
        let arena = DEP_ARENA.read_recursive();
        arena.get(self.index()).map(f)
    }

    /// Append a subscriber. Deduplication is the watcher's job (see
    /// `WatcherId::add_dep`); the set only guards against corruption.
    pub(crate) fn add_sub(self, watcher: WatcherId) {
        self.with(|metadata| {
            metadata.subscribers.write().insert(watcher);
        });
    }

    /// Remove a subscriber, keeping the order of the others.
    pub(crate) fn remove_sub(self, watcher: WatcherId) {
        self.with(|metadata| {
            metadata.subscribers.write().shift_remove(&watcher);
        });
    }

    /// Register this dep with the watcher currently being evaluated, if any.
    ///
    /// The watcher decides whether the subscription is new.
    pub fn depend(self) {
        if let Some(watcher) = current_watcher() {
            watcher.add_dep(self);
        }
    }

    /// Snapshot of the current subscribers in subscription order.
    pub fn subscribers(self) -> Vec<WatcherId> {
        self.with(|metadata| metadata.subscribers.read().iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of subscribers (0 for a freed dep).
    pub fn subscriber_count(self) -> usize {
        self.with(|metadata| metadata.subscribers.read().len())
            .unwrap_or(0)
    }

    /// Whether `watcher` is subscribed to this dep.
    pub fn has_subscriber(self, watcher: WatcherId) -> bool {
        self.with(|metadata| metadata.subscribers.read().contains(&watcher))
            .unwrap_or(false)
    }

    /// Notify every subscriber that the state behind this dep changed.
    ///
    /// Works on a snapshot, so subscriptions added or removed by the updates
    /// themselves do not affect this pass. Without batching there is no queue
    /// to order the runs, so the snapshot is sorted by watcher uid here.
    pub fn notify(self) {
        let mut subscribers = self.subscribers();
        if subscribers.is_empty() {
            return;
        }
        if !config::is_async() {
            cov_mark::hit!(sync_notify_sorts_subscribers);
            subscribers.sort_by_key(|watcher| watcher.uid().unwrap_or(u64::MAX));
        }
        tracing::trace!(dep = self.0, subscribers = subscribers.len(), "dep.notify");
        for watcher in subscribers {
            watcher.update();
        }
    }
}

/// Metadata for a dep stored in the arena.
#[derive(Debug, Default)]
pub struct DepMetadata {
    /// Watchers subscribed to this dep, in subscription order.
    pub(crate) subscribers: RwLock<FastIndexSet<WatcherId>>,
}

impl DepMetadata {
    /// Create dep metadata with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }
}

/// Insert a dep into the arena and return its id.
pub fn dep_arena_insert(metadata: DepMetadata) -> DepId {
    let mut arena = DEP_ARENA.write();
    let entry = arena.vacant_entry();
    let key = entry.key();
    entry.insert(metadata);
    DepId::new(key as u32)
}

/// Remove a dep from the arena.
pub fn dep_arena_remove(id: DepId) -> Option<DepMetadata> {
    let mut arena = DEP_ARENA.write();
    arena.try_remove(id.index())
}
