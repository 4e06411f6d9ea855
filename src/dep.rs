use crate::arena::{DepId, DepMetadata, dep_arena_insert, dep_arena_remove};

/// Owning handle for a dependency attachment point.
///
/// Reactive maps allocate one `Dep` per reactive key plus one for the
/// container itself; reactive lists allocate one for the list. A `Dep` holds
/// no value: whoever owns the state calls [`Dep::depend`] when it is read and
/// [`Dep::notify`] when it changes.
///
/// ```ignore
/// struct Counter {
///     count: i64,
///     dep: Dep,
/// }
///
/// impl Counter {
///     fn get(&self) -> i64 {
///         self.dep.depend(); // subscribe the running watcher, if any
///         self.count
///     }
///
///     fn set(&mut self, count: i64) {
///         self.count = count;
///         self.dep.notify();
///     }
/// }
/// ```
#[derive(Debug)]
pub struct Dep {
    id: DepId,
}

impl Dep {
    /// Allocate a dep in the arena.
    pub fn new() -> Self {
        Self {
            id: dep_arena_insert(DepMetadata::new()),
        }
    }

    /// Arena id of this dep.
    pub fn id(&self) -> DepId {
        self.id
    }

    /// Register the running watcher (if any) as a subscriber.
    pub fn depend(&self) {
        self.id.depend();
    }

    /// Notify all subscribers.
    pub fn notify(&self) {
        self.id.notify();
    }

    /// Number of subscribed watchers.
    pub fn subscriber_count(&self) -> usize {
        self.id.subscriber_count()
    }
}

impl Default for Dep {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Dep {
    fn drop(&mut self) {
        // Unlink from every subscriber so none of them keeps this id around
        // after the slot is reused.
        for watcher in self.id.subscribers() {
            watcher.forget_dep(self.id);
        }
        dep_arena_remove(self.id);
    }
}

// No Clone: the handle frees its arena slot on drop. Share the DepId (or the
// container owning the Dep) instead.

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Value, Watcher, WatcherOptions};

    #[test]
    fn dropped_dep_unlinks_its_subscribers() {
        let dep = Dep::new();
        let dep_id = dep.id();

        let watcher = Watcher::new(
            move || {
                dep_id.depend();
                dep_id.depend();
                Ok(Value::Null)
            },
            |_, _| Ok(()),
            WatcherOptions::default(),
        )
        .expect("evaluation succeeds");

        // Duplicate reads collapse to one subscription
        assert_eq!(dep.subscriber_count(), 1);
        assert_eq!(watcher.id().deps(), vec![dep_id]);

        drop(dep);
        assert!(watcher.id().deps().is_empty());
    }
}
