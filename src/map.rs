use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use crate::arena::DepId;
use crate::dep::Dep;
use crate::error::warn;
use crate::hash::FastIndexMap;
use crate::observer::{Observer, depend_value, observe};
use crate::value::Value;

/// One key of a map. `dep` is present once the key has been made reactive.
pub(crate) struct Slot {
    pub(crate) value: Value,
    pub(crate) dep: Option<Dep>,
}

struct MapInner {
    slots: RwLock<FastIndexMap<String, Slot>>,
    observer: OnceLock<Observer>,
    frozen: AtomicBool,
}

/// Key/value container whose keys become reactive properties once the map is
/// observed.
///
/// Cloning the handle shares the map. Reads through [`ReactiveMap::get`]
/// register the running watcher; writes through [`ReactiveMap::put`] notify
/// it. Adding or removing keys on an observed map goes through
/// [`crate::set`] / [`crate::del`] so watchers of the map itself hear about
/// the change.
///
/// A map that has not been observed behaves like a plain ordered map.
#[derive(Clone)]
pub struct ReactiveMap {
    inner: Arc<MapInner>,
}

impl ReactiveMap {
    /// Empty, unobserved map.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MapInner {
                slots: RwLock::new(FastIndexMap::default()),
                observer: OnceLock::new(),
                frozen: AtomicBool::new(false),
            }),
        }
    }

    /// Same underlying map.
    pub fn ptr_eq(&self, other: &ReactiveMap) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Address of the shared allocation; stable for the container's lifetime.
    pub(crate) fn address(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }

    /// The attached observer, if the map has been observed.
    pub fn observer(&self) -> Option<&Observer> {
        self.inner.observer.get()
    }

    /// Attach an observer if there is none yet. The flag is `true` when this
    /// call created it and the caller still has to walk the keys.
    pub(crate) fn ensure_observer(&self) -> (&Observer, bool) {
        let mut created = false;
        let observer = self.inner.observer.get_or_init(|| {
            created = true;
            Observer::new()
        });
        (observer, created)
    }

    /// Reactive read.
    ///
    /// Subscribes the running watcher to the key, to the value's own
    /// container dep (so key additions inside a nested map reach readers of
    /// this key) and, for lists, to every nested list. Reading a missing key
    /// of an observed map subscribes to the map itself, so a later
    /// [`crate::set`] of that key re-runs the reader.
    pub fn get(&self, key: &str) -> Option<Value> {
        let found = {
            let slots = self.inner.slots.read();
            slots
                .get(key)
                .map(|slot| (slot.value.clone(), slot.dep.as_ref().map(Dep::id)))
        };
        match found {
            Some((value, Some(dep))) => {
                depend_value(dep, &value);
                Some(value)
            }
            Some((value, None)) => Some(value),
            None => {
                self.depend_structure();
                None
            }
        }
    }

    /// Read without registering any dependency.
    pub fn peek(&self, key: &str) -> Option<Value> {
        self.inner.slots.read().get(key).map(|slot| slot.value.clone())
    }

    /// Reactive write to a key.
    ///
    /// Writing a value identical to the current one is a no-op. Otherwise
    /// the value is stored, wrapped if it is a container, and the key's
    /// subscribers are notified. A key the map did not have is inserted as a
    /// plain key with no notification; use [`crate::set`] to add a reactive
    /// one.
    pub fn put(&self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        if self.is_frozen() {
            warn(&format!("Cannot assign to \"{key}\" on a frozen map"));
            return;
        }

        let (dep, old) = {
            let mut slots = self.inner.slots.write();
            match slots.get_mut(&key) {
                Some(slot) if slot.value.same_value(&value) => return,
                Some(slot) => {
                    let old = std::mem::replace(&mut slot.value, value.clone());
                    (slot.dep.as_ref().map(Dep::id), Some(old))
                }
                None => {
                    slots.insert(
                        key,
                        Slot {
                            value: value.clone(),
                            dep: None,
                        },
                    );
                    (None, None)
                }
            }
        };
        drop(old);

        if let Some(dep) = dep {
            observe(&value);
            dep.notify();
        }
    }

    /// Whether the map has `key`. Tracks the map itself when observed.
    pub fn contains_key(&self, key: &str) -> bool {
        self.depend_structure();
        self.contains_key_untracked(key)
    }

    pub(crate) fn contains_key_untracked(&self, key: &str) -> bool {
        self.inner.slots.read().contains_key(key)
    }

    /// Keys in insertion order. Tracks the map itself when observed.
    pub fn keys(&self) -> Vec<String> {
        self.depend_structure();
        self.keys_untracked()
    }

    pub(crate) fn keys_untracked(&self) -> Vec<String> {
        self.inner.slots.read().keys().cloned().collect()
    }

    /// Number of keys. Tracks the key set when observed.
    pub fn len(&self) -> usize {
        self.depend_structure();
        self.inner.slots.read().len()
    }

    /// See [`ReactiveMap::len`].
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make the map non-extensible: it will never be observed, and writes,
    /// additions and deletions are rejected with a warning.
    pub fn freeze(&self) {
        self.inner.frozen.store(true, Ordering::Release);
    }

    /// Whether [`ReactiveMap::freeze`] was called.
    pub fn is_frozen(&self) -> bool {
        self.inner.frozen.load(Ordering::Acquire)
    }

    /// Install `key` as a reactive property with a fresh dep, replacing any
    /// existing slot.
    pub(crate) fn define_slot(&self, key: String, value: Value) {
        let slot = Slot {
            value,
            dep: Some(Dep::new()),
        };
        let replaced = self.inner.slots.write().insert(key, slot);
        drop(replaced);
    }

    /// Give every key without a dep one. Returns the values so the caller can
    /// observe them.
    pub(crate) fn make_keys_reactive(&self) -> Vec<Value> {
        let mut slots = self.inner.slots.write();
        slots
            .values_mut()
            .map(|slot| {
                if slot.dep.is_none() {
                    slot.dep = Some(Dep::new());
                }
                slot.value.clone()
            })
            .collect()
    }

    pub(crate) fn remove_slot(&self, key: &str) -> Option<Slot> {
        self.inner.slots.write().shift_remove(key)
    }

    /// Dep of a reactive key.
    pub fn key_dep(&self, key: &str) -> Option<DepId> {
        self.inner
            .slots
            .read()
            .get(key)
            .and_then(|slot| slot.dep.as_ref().map(Dep::id))
    }

    fn depend_structure(&self) {
        if let Some(observer) = self.observer() {
            observer.dep().depend();
        }
    }
}

impl Default for ReactiveMap {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> FromIterator<(K, V)> for ReactiveMap
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let map = ReactiveMap::new();
        {
            let mut slots = map.inner.slots.write();
            for (key, value) in iter {
                slots.insert(
                    key.into(),
                    Slot {
                        value: value.into(),
                        dep: None,
                    },
                );
            }
        }
        map
    }
}

// Shallow on purpose: maps may contain themselves.
impl fmt::Debug for ReactiveMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveMap")
            .field("keys", &self.keys_untracked())
            .field("observed", &self.observer().is_some())
            .field("frozen", &self.is_frozen())
            .finish()
    }
}
