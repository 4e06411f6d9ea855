// Owner registry
//
// An owner groups the watchers of one component-like unit: the state and
// user watchers it created, its render watcher, and the lifecycle flags the
// scheduler consults after a flush (mounted / destroyed / inactive) plus the
// `updated` and `activated` hooks it invokes.
//
// The registry is a lock-free papaya map keyed by OwnerId, so watchers and
// the scheduler can look an owner up from any thread holding only the id.

use std::fmt;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use papaya::HashMap as PapayaHashMap;
use parking_lot::Mutex;

use crate::arena::WatcherId;
use crate::error::{BoxError, Error, report};
use crate::watcher::untracked;

type Hook = Box<dyn FnMut() -> Result<(), BoxError> + Send>;

/// Global owner registry.
static OWNERS: LazyLock<PapayaHashMap<OwnerId, OwnerMetadata>> =
    LazyLock::new(PapayaHashMap::new);

static NEXT_OWNER: AtomicU64 = AtomicU64::new(1);

/// Identifier of an owner in the registry.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, PartialOrd, Ord)]
pub struct OwnerId(u64);

/// Post-flush hooks an owner can register.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub(crate) enum OwnerHook {
    /// The owner's render watcher ran during the flush.
    Updated,
    /// The owner was queued with [`crate::queue_activated`].
    Activated,
}

impl OwnerHook {
    fn name(self) -> &'static str {
        match self {
            OwnerHook::Updated => "updated hook",
            OwnerHook::Activated => "activated hook",
        }
    }
}

#[derive(Default)]
struct OwnerMetadata {
    mounted: AtomicBool,
    destroyed: AtomicBool,
    being_destroyed: AtomicBool,
    inactive: AtomicBool,
    /// Uid of the render watcher.
    render_watcher: Mutex<Option<u64>>,
    watchers: Mutex<Vec<WatcherId>>,
    updated: Mutex<Option<Hook>>,
    activated: Mutex<Option<Hook>>,
}

impl OwnerMetadata {
    fn hook(&self, kind: OwnerHook) -> &Mutex<Option<Hook>> {
        match kind {
            OwnerHook::Updated => &self.updated,
            OwnerHook::Activated => &self.activated,
        }
    }
}

impl OwnerId {
    fn with<F, R>(self, f: F) -> Option<R>
    where
        F: FnOnce(&OwnerMetadata) -> R,
    {
        let guard = OWNERS.pin();
        guard.get(&self).map(f)
    }

    /// Set by [`Owner::mark_mounted`], cleared on destroy.
    pub fn is_mounted(self) -> bool {
        self.with(|owner| owner.mounted.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    /// Destroyed owners, and owners no longer in the registry.
    pub fn is_destroyed(self) -> bool {
        self.with(|owner| owner.destroyed.load(Ordering::Acquire))
            .unwrap_or(true)
    }

    /// Deactivated and not yet queued for activation.
    pub fn is_inactive(self) -> bool {
        self.with(|owner| owner.inactive.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    pub(crate) fn set_inactive(self, inactive: bool) {
        self.with(|owner| owner.inactive.store(inactive, Ordering::Release));
    }

    /// Uid of the render watcher, if one was registered.
    pub fn render_watcher(self) -> Option<u64> {
        self.with(|owner| *owner.render_watcher.lock()).flatten()
    }

    /// Watchers currently registered with this owner.
    pub fn watchers(self) -> Vec<WatcherId> {
        self.with(|owner| owner.watchers.lock().clone())
            .unwrap_or_default()
    }

    pub(crate) fn register_watcher(self, watcher: WatcherId, render: bool) {
        let uid = watcher.uid();
        self.with(|owner| {
            owner.watchers.lock().push(watcher);
            if render {
                *owner.render_watcher.lock() = uid;
            }
        });
    }

    pub(crate) fn forget_watcher(self, watcher: WatcherId) {
        self.with(|owner| {
            if !owner.being_destroyed.load(Ordering::Acquire) {
                owner.watchers.lock().retain(|w| *w != watcher);
            }
        });
    }

    /// Invoke a hook, untracked. Failures are reported against this owner.
    pub(crate) fn call_hook(self, kind: OwnerHook) {
        let Some(mut hook) = self.with(|owner| owner.hook(kind).lock().take()).flatten() else {
            return;
        };
        let result = untracked(|| hook());
        self.with(|owner| {
            let mut slot = owner.hook(kind).lock();
            if slot.is_none() {
                *slot = Some(hook);
            }
        });
        if let Err(source) = result {
            report(&Error::callback(kind.name(), source), Some(self), kind.name());
        }
    }
}

/// Owning handle for an owner.
///
/// Dropping the handle destroys the owner and removes it from the registry.
///
/// ```ignore
/// let owner = Owner::new();
/// let render = Watcher::new(
///     render_fn,
///     |_, _| Ok(()),
///     WatcherOptions::new().owner(owner.id()).render(true),
/// )?;
/// owner.on_updated(|| { println!("re-rendered"); Ok(()) });
/// owner.mark_mounted();
/// ```
pub struct Owner {
    id: OwnerId,
}

impl Owner {
    /// Register a fresh owner.
    pub fn new() -> Self {
        let id = OwnerId(NEXT_OWNER.fetch_add(1, Ordering::Relaxed));
        OWNERS.pin().insert(id, OwnerMetadata::default());
        Self { id }
    }

    /// Registry id, passed to [`crate::WatcherOptions::owner`].
    pub fn id(&self) -> OwnerId {
        self.id
    }

    /// Called after a flush in which this owner's render watcher ran, while
    /// the owner is mounted and not destroyed.
    pub fn on_updated<F>(&self, hook: F)
    where
        F: FnMut() -> Result<(), BoxError> + Send + 'static,
    {
        self.set_hook(OwnerHook::Updated, Box::new(hook));
    }

    /// Called after a flush for which the owner was queued as activated.
    pub fn on_activated<F>(&self, hook: F)
    where
        F: FnMut() -> Result<(), BoxError> + Send + 'static,
    {
        self.set_hook(OwnerHook::Activated, Box::new(hook));
    }

    fn set_hook(&self, kind: OwnerHook, hook: Hook) {
        let replaced = self.id.with(|owner| owner.hook(kind).lock().replace(hook));
        drop(replaced);
    }

    /// Allow `updated` hooks to fire.
    pub fn mark_mounted(&self) {
        self.id.with(|owner| owner.mounted.store(true, Ordering::Release));
    }

    /// Mark the owner inactive (kept alive but detached). Queue it with
    /// [`crate::queue_activated`] to bring it back.
    pub fn deactivate(&self) {
        self.id.set_inactive(true);
    }

    /// Tear down every watcher of this owner and mark it destroyed.
    /// Idempotent.
    pub fn destroy(&self) {
        let watchers = self.id.with(|owner| {
            if owner.being_destroyed.swap(true, Ordering::AcqRel) {
                None
            } else {
                Some(std::mem::take(&mut *owner.watchers.lock()))
            }
        });
        let Some(watchers) = watchers.flatten() else {
            return;
        };
        for watcher in watchers {
            watcher.teardown();
        }
        self.id.with(|owner| {
            owner.destroyed.store(true, Ordering::Release);
            owner.mounted.store(false, Ordering::Release);
        });
        tracing::trace!(owner = self.id.0, "owner destroyed");
    }
}

impl Default for Owner {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Owner")
            .field("id", &self.id)
            .field("mounted", &self.id.is_mounted())
            .field("destroyed", &self.id.is_destroyed())
            .finish()
    }
}

impl Drop for Owner {
    fn drop(&mut self) {
        self.destroy();
        OWNERS.pin().remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use crate::{Watcher, WatcherOptions};

    #[test]
    fn destroy_tears_down_every_watcher() {
        let owner = Owner::new();
        let watchers: Vec<Watcher> = (0..3)
            .map(|_| {
                Watcher::new(
                    || Ok(Value::Null),
                    |_, _| Ok(()),
                    WatcherOptions::new().owner(owner.id()),
                )
                .expect("evaluation succeeds")
            })
            .collect();
        assert_eq!(owner.id().watchers().len(), 3);

        owner.destroy();
        owner.destroy();
        assert!(owner.id().is_destroyed());
        assert!(watchers.iter().all(|w| !w.is_active()));
    }

    #[test]
    fn dropped_watcher_leaves_the_owner() {
        let owner = Owner::new();
        let watcher = Watcher::new(
            || Ok(Value::Null),
            |_, _| Ok(()),
            WatcherOptions::new().owner(owner.id()).render(true),
        )
        .expect("evaluation succeeds");
        assert_eq!(owner.id().render_watcher(), Some(watcher.uid()));

        drop(watcher);
        assert!(owner.id().watchers().is_empty());
    }

    #[test]
    fn dropped_owner_reads_as_destroyed() {
        let id = Owner::new().id();
        assert!(id.is_destroyed());
        assert!(!id.is_mounted());
    }
}
