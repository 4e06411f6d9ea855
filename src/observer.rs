//! Making plain containers reactive.
//!
//! [`observe`] attaches an [`Observer`] to a map or list and walks it: every
//! map key gets its own [`Dep`], nested containers are observed recursively.
//! The observer is attached before the walk, so observing is idempotent and
//! terminates on cyclic structures.
//!
//! [`set`] and [`del`] are the only way to add or remove keys so that
//! watchers of the container itself are told. Everything they reject is
//! reported as a warning and leaves the target untouched.

use std::cell::Cell;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::arena::{DepId, current_watcher};
use crate::dep::Dep;
use crate::error::{Error, warn};
use crate::hash::FastHashBuilder;
use crate::list::ReactiveList;
use crate::map::ReactiveMap;
use crate::value::Value;

thread_local! {
    static SHOULD_OBSERVE: Cell<bool> = const { Cell::new(true) };
}

/// Per-container record of reactivity.
///
/// Its dep is notified when keys are added to or removed from a map, or when
/// a list is mutated.
#[derive(Debug)]
pub struct Observer {
    dep: Dep,
    root_count: AtomicUsize,
}

impl Observer {
    pub(crate) fn new() -> Self {
        Self {
            dep: Dep::new(),
            root_count: AtomicUsize::new(0),
        }
    }

    /// The container's own dep.
    pub fn dep(&self) -> &Dep {
        &self.dep
    }

    /// How many times the container was registered as root data.
    pub fn root_count(&self) -> usize {
        self.root_count.load(Ordering::Acquire)
    }

    fn is_root(&self) -> bool {
        self.root_count() > 0
    }
}

/// Key for [`set`] / [`del`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Key {
    /// Map key.
    Field(String),
    /// List index.
    Index(usize),
}

impl Key {
    fn into_field(self) -> String {
        match self {
            Key::Field(field) => field,
            Key::Index(index) => index.to_string(),
        }
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::Field(value.to_owned())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::Field(value)
    }
}

impl From<usize> for Key {
    fn from(value: usize) -> Self {
        Key::Index(value)
    }
}

/// Run `f` with observation suspended: containers stored while it runs are
/// not wrapped.
pub fn pause_observing<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    struct Resume(bool);
    impl Drop for Resume {
        fn drop(&mut self) {
            SHOULD_OBSERVE.with(|c| c.set(self.0));
        }
    }

    let _resume = Resume(SHOULD_OBSERVE.with(|c| c.replace(false)));
    f()
}

/// Whether [`observe`] currently wraps new containers.
pub fn is_observing() -> bool {
    SHOULD_OBSERVE.with(Cell::get)
}

/// Attach an observer to a container, walking it on first observation.
///
/// Returns the existing observer if there is one. Primitives, frozen maps,
/// and containers met while observation is paused yield `None`.
pub fn observe(value: &Value) -> Option<&Observer> {
    match value {
        Value::Map(map) => observe_map(map),
        Value::List(list) => observe_list(list),
        _ => None,
    }
}

/// Observe `value` as root data of an owner.
///
/// Root containers refuse [`set`] / [`del`] of new keys, which have to be
/// declared up front.
pub fn observe_root(value: &Value) -> Option<&Observer> {
    let observer = observe(value)?;
    observer.root_count.fetch_add(1, Ordering::AcqRel);
    Some(observer)
}

fn observe_map(map: &ReactiveMap) -> Option<&Observer> {
    if let Some(observer) = map.observer() {
        return Some(observer);
    }
    if !is_observing() || map.is_frozen() {
        return None;
    }
    let (observer, created) = map.ensure_observer();
    if created {
        for value in map.make_keys_reactive() {
            observe(&value);
        }
    }
    Some(observer)
}

fn observe_list(list: &ReactiveList) -> Option<&Observer> {
    if let Some(observer) = list.observer() {
        return Some(observer);
    }
    if !is_observing() {
        return None;
    }
    let (observer, created) = list.ensure_observer();
    if created {
        for value in list.snapshot() {
            observe(&value);
        }
    }
    Some(observer)
}

/// Install `key` on `map` as a reactive property holding `value`.
///
/// The key gets a fresh dep and `value` is observed. Nobody is notified:
/// adding a key is announced by [`set`].
pub fn define_reactive(map: &ReactiveMap, key: impl Into<String>, value: impl Into<Value>) {
    let value = value.into();
    map.define_slot(key.into(), value.clone());
    observe(&value);
}

/// Reactive getter bookkeeping for a key read: subscribe to the key's dep,
/// to the value's container dep, and for lists to every nested list.
pub(crate) fn depend_value(dep: DepId, value: &Value) {
    if current_watcher().is_none() {
        return;
    }
    dep.depend();
    if let Some(observer) = value.observer() {
        observer.dep().depend();
        if let Value::List(list) = value {
            depend_list(list);
        }
    }
}

/// Subscribe to the observers of every element of `list`, recursing into
/// nested lists. Element reads are not intercepted, so this is how a
/// watcher of the outer list hears about mutations of inner ones.
pub(crate) fn depend_list(list: &ReactiveList) {
    let mut seen = HashSet::with_hasher(FastHashBuilder);
    if let Some(observer) = list.observer() {
        seen.insert(observer.dep().id());
    }
    depend_items(list, &mut seen);
}

fn depend_items(list: &ReactiveList, seen: &mut HashSet<DepId, FastHashBuilder>) {
    for item in list.snapshot() {
        let Some(observer) = item.observer() else {
            continue;
        };
        let dep = observer.dep().id();
        if !seen.insert(dep) {
            continue;
        }
        dep.depend();
        if let Value::List(inner) = &item {
            depend_items(inner, seen);
        }
    }
}

/// Set `key` on `target`, making it reactive if it is new.
///
/// - list + index: goes through a splice, padding with nulls; one
///   notification.
/// - map, existing key: plain reactive write.
/// - observed map, new key: defines a reactive property and notifies the
///   map's own dep.
/// - unobserved map, new key: plain insert.
///
/// Returns `false` (after a warning) when the target cannot take the key:
/// primitives, frozen maps, root data, or a field key on a list.
pub fn set(target: &Value, key: impl Into<Key>, value: impl Into<Value>) -> bool {
    let key = key.into();
    let value = value.into();
    match target {
        Value::List(list) => match key {
            Key::Index(index) => {
                list.set_index(index, value);
                true
            }
            Key::Field(field) => reject(format!(
                "Cannot set non-index key \"{field}\" on a reactive list"
            )),
        },
        Value::Map(map) => {
            let key = key.into_field();
            if map.is_frozen() {
                return reject(format!("Cannot add property \"{key}\" to a frozen map"));
            }
            if map.contains_key_untracked(&key) {
                map.put(key, value);
                return true;
            }
            match map.observer() {
                Some(observer) if observer.is_root() => reject(
                    "Avoid adding reactive properties to root data at runtime - declare it upfront",
                ),
                Some(observer) => {
                    define_reactive(map, key, value);
                    observer.dep().notify();
                    true
                }
                None => {
                    map.put(key, value);
                    true
                }
            }
        }
        other => reject(format!(
            "Cannot set reactive property on null or primitive value: {other}"
        )),
    }
}

/// Remove `key` from `target`, notifying the container's own dep.
///
/// Deleting a list index splices it out (notifying even when the index is
/// past the end). Deleting a missing map key is a silent no-op. Returns
/// `false` when nothing was removed or the target refused.
pub fn del(target: &Value, key: impl Into<Key>) -> bool {
    let key = key.into();
    match target {
        Value::List(list) => match key {
            Key::Index(index) => !list.splice(index, 1, []).is_empty(),
            Key::Field(field) => reject(format!(
                "Cannot delete non-index key \"{field}\" on a reactive list"
            )),
        },
        Value::Map(map) => {
            let key = key.into_field();
            if map.is_frozen() {
                return reject(format!("Cannot delete property \"{key}\" of a frozen map"));
            }
            if map.observer().is_some_and(Observer::is_root) {
                return reject("Avoid deleting properties on root data - just set it to null");
            }
            let Some(slot) = map.remove_slot(&key) else {
                return false;
            };
            drop(slot);
            if let Some(observer) = map.observer() {
                observer.dep().notify();
            }
            true
        }
        other => reject(format!(
            "Cannot delete reactive property on null or primitive value: {other}"
        )),
    }
}

fn reject(message: impl Into<String>) -> bool {
    warn(&Error::invalid_mutation(message).to_string());
    false
}
