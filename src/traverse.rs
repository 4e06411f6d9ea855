// Deep touch for deep watchers
//
// Reads every nested key and element through the reactive accessors so the
// running watcher subscribes to all of them. Observed containers are visited
// once per traversal (keyed by their own dep); unobserved ones by address.

use std::collections::HashSet;

use crate::arena::DepId;
use crate::hash::FastHashBuilder;
use crate::value::Value;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
enum Visited {
    Dep(DepId),
    Address(usize),
}

pub(crate) fn traverse(value: &Value) {
    let mut seen = HashSet::with_hasher(FastHashBuilder);
    visit(value, &mut seen);
}

fn visit(value: &Value, seen: &mut HashSet<Visited, FastHashBuilder>) {
    match value {
        Value::Map(map) => {
            if map.is_frozen() || !seen.insert(visited(value)) {
                return;
            }
            for key in map.keys_untracked() {
                if let Some(child) = map.get(&key) {
                    visit(&child, seen);
                }
            }
        }
        Value::List(list) => {
            if !seen.insert(visited(value)) {
                return;
            }
            for index in 0..list.len() {
                if let Some(child) = list.get(index) {
                    visit(&child, seen);
                }
            }
        }
        _ => {}
    }
}

fn visited(value: &Value) -> Visited {
    match (value.observer(), value) {
        (Some(observer), _) => Visited::Dep(observer.dep().id()),
        (None, Value::Map(map)) => Visited::Address(map.address()),
        (None, Value::List(list)) => Visited::Address(list.address()),
        (None, _) => Visited::Address(0),
    }
}
