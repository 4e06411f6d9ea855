use std::cmp::Ordering;
use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use crate::observer::{Observer, observe};
use crate::value::Value;

struct ListInner {
    items: RwLock<Vec<Value>>,
    observer: OnceLock<Observer>,
}

/// Sequence whose mutators notify watchers of the list.
///
/// Index assignment is not intercepted; use [`crate::set`] with an index so
/// the change goes through a mutator. Every mutator below observes inserted
/// elements and notifies exactly once per call, whether or not anything
/// actually moved.
#[derive(Clone)]
pub struct ReactiveList {
    inner: Arc<ListInner>,
}

impl ReactiveList {
    /// Empty, unobserved list.
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    /// Wrap `items` without observing them.
    pub fn from_vec(items: Vec<Value>) -> Self {
        Self {
            inner: Arc::new(ListInner {
                items: RwLock::new(items),
                observer: OnceLock::new(),
            }),
        }
    }

    /// Same underlying list.
    pub fn ptr_eq(&self, other: &ReactiveList) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Address of the shared allocation; stable for the container's lifetime.
    pub(crate) fn address(&self) -> usize {
        Arc::as_ptr(&self.inner) as usize
    }

    /// The attached observer, if the list has been observed.
    pub fn observer(&self) -> Option<&Observer> {
        self.inner.observer.get()
    }

    pub(crate) fn ensure_observer(&self) -> (&Observer, bool) {
        let mut created = false;
        let observer = self.inner.observer.get_or_init(|| {
            created = true;
            Observer::new()
        });
        (observer, created)
    }

    /// Number of elements. Tracks the list when observed.
    pub fn len(&self) -> usize {
        self.depend();
        self.inner.items.read().len()
    }

    /// See [`ReactiveList::len`].
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element at `index`. Tracks the list when observed.
    pub fn get(&self, index: usize) -> Option<Value> {
        self.depend();
        self.inner.items.read().get(index).cloned()
    }

    /// Copy of the elements. Tracks the list when observed.
    pub fn to_vec(&self) -> Vec<Value> {
        self.depend();
        self.snapshot()
    }

    pub(crate) fn snapshot(&self) -> Vec<Value> {
        self.inner.items.read().clone()
    }

    /// Append one element.
    pub fn push(&self, value: impl Into<Value>) {
        self.push_all([value.into()]);
    }

    /// Append `values` with a single notification.
    pub fn push_all<I>(&self, values: I)
    where
        I: IntoIterator<Item = Value>,
    {
        let values: Vec<Value> = values.into_iter().collect();
        self.mutate(|items| {
            items.extend(values.iter().cloned());
            ((), values)
        });
    }

    /// Remove and return the last element.
    pub fn pop(&self) -> Option<Value> {
        self.mutate(|items| (items.pop(), Vec::new()))
    }

    /// Remove and return the first element.
    pub fn shift(&self) -> Option<Value> {
        self.mutate(|items| {
            let first = (!items.is_empty()).then(|| items.remove(0));
            (first, Vec::new())
        })
    }

    /// Prepend one element.
    pub fn unshift(&self, value: impl Into<Value>) {
        self.unshift_all([value.into()]);
    }

    /// Prepend `values`, keeping their order.
    pub fn unshift_all<I>(&self, values: I)
    where
        I: IntoIterator<Item = Value>,
    {
        let values: Vec<Value> = values.into_iter().collect();
        self.mutate(|items| {
            items.splice(0..0, values.iter().cloned());
            ((), values)
        });
    }

    /// Remove `delete_count` elements at `start` and insert `values` there.
    ///
    /// `start` and `delete_count` are clamped to the list. Returns the
    /// removed elements.
    pub fn splice<I>(&self, start: usize, delete_count: usize, values: I) -> Vec<Value>
    where
        I: IntoIterator<Item = Value>,
    {
        let values: Vec<Value> = values.into_iter().collect();
        self.mutate(|items| {
            let start = start.min(items.len());
            let end = start.saturating_add(delete_count).min(items.len());
            let removed = items.splice(start..end, values.iter().cloned()).collect();
            (removed, values)
        })
    }

    /// Stable sort.
    ///
    /// A copy is sorted with no lock held and swapped in afterwards, so the
    /// comparator may read this list (it sees the unsorted order) and a
    /// panicking comparator leaves the list untouched.
    pub fn sort_by<F>(&self, compare: F)
    where
        F: FnMut(&Value, &Value) -> Ordering,
    {
        let mut sorted = self.snapshot();
        sorted.sort_by(compare);
        let displaced = self.mutate(move |items| (std::mem::replace(items, sorted), Vec::new()));
        drop(displaced);
    }

    /// Reverse in place.
    pub fn reverse(&self) {
        self.mutate(|items| {
            items.reverse();
            ((), Vec::new())
        });
    }

    /// Index assignment through a mutator: pads with nulls up to `index`,
    /// then replaces the element there (or appends at the end).
    pub(crate) fn set_index(&self, index: usize, value: Value) {
        self.mutate(|items| {
            if index > items.len() {
                items.resize(index, Value::Null);
            }
            let end = (index + 1).min(items.len());
            let removed: Vec<Value> = items.splice(index..end, [value.clone()]).collect();
            (removed, vec![value])
        });
    }

    /// Apply a structural change. `op` returns its result and the inserted
    /// elements; the latter are observed once the lock is released, then the
    /// list's dep fires once.
    fn mutate<R>(&self, op: impl FnOnce(&mut Vec<Value>) -> (R, Vec<Value>)) -> R {
        let (result, inserted) = {
            let mut items = self.inner.items.write();
            op(&mut items)
        };
        if let Some(observer) = self.observer() {
            for value in &inserted {
                observe(value);
            }
            observer.dep().notify();
        }
        result
    }

    fn depend(&self) {
        if let Some(observer) = self.observer() {
            observer.dep().depend();
        }
    }
}

impl Default for ReactiveList {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Into<Value>> FromIterator<V> for ReactiveList {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Debug for ReactiveList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveList")
            .field("len", &self.inner.items.read().len())
            .field("observed", &self.observer().is_some())
            .finish()
    }
}
