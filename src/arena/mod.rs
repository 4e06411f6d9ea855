// Arena-based storage for the dependency graph
//
// Two arenas:
// - Dep arena: DepMetadata (ordered subscriber set)
// - Watcher arena: WatcherMetadata (closures, cached value, dep sets, flags)
//
// Deps and watchers refer to each other only by id, so neither owns the
// other. Both arenas are global slabs behind RwLock; the evaluation context
// that links a running watcher to the deps it reads is thread-local.

pub mod dep_arena;
pub mod watcher_arena;

pub use dep_arena::{DepId, DepMetadata, dep_arena_insert, dep_arena_remove};

pub use watcher_arena::{
    EvaluationGuard, WatcherId, WatcherMetadata, current_watcher, watcher_arena_insert,
    watcher_arena_remove,
};
