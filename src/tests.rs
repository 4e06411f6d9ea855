//! End-to-end scenarios: observed state, watchers, the queue and the hooks
use crate::config::{self, Config};
use crate::{
    Dep, Owner, ReactiveList, ReactiveMap, Value, Watcher, WatcherOptions, current_flush_timestamp,
    del, next_tick, observe, pause_observing, queue_activated, run_until_idle, set, untracked,
};
use parking_lot::Mutex;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

type Log = Arc<Mutex<Vec<String>>>;

fn observed<I, K, V>(entries: I) -> ReactiveMap
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    let map: ReactiveMap = entries.into_iter().collect();
    observe(&Value::from(map.clone()));
    map
}

fn number(map: &ReactiveMap, key: &str) -> f64 {
    map.get(key).and_then(|v| v.as_number()).unwrap_or(f64::NAN)
}

fn capture_warnings() -> Rc<RefCell<Vec<String>>> {
    let warnings = Rc::new(RefCell::new(Vec::new()));
    let sink = warnings.clone();
    config::configure(|cfg| cfg.set_warn_handler(move |msg| sink.borrow_mut().push(msg.to_owned())));
    warnings
}

fn capture_errors() -> Rc<RefCell<Vec<String>>> {
    let errors = Rc::new(RefCell::new(Vec::new()));
    let sink = errors.clone();
    config::configure(|cfg| {
        cfg.set_error_handler(move |err, _owner, info| {
            sink.borrow_mut().push(format!("{info}: {err}"));
        })
    });
    errors
}

/// Watcher over `map[key]` that logs `name` on every callback.
fn logging_watcher(map: &ReactiveMap, key: &'static str, log: &Log, name: &'static str) -> Watcher {
    let reader = map.clone();
    let log = log.clone();
    Watcher::new(
        move || Ok(reader.get(key).unwrap_or_default()),
        move |_, _| {
            log.lock().push(name.to_owned());
            Ok(())
        },
        WatcherOptions::default(),
    )
    .expect("evaluation succeeds")
}

#[test]
fn doubled_value_updates_after_flush() {
    let state = observed([("a", 1)]);
    let calls: Log = Arc::default();

    let reader = state.clone();
    let sink = calls.clone();
    let doubled = Watcher::new(
        move || Ok(Value::from(number(&reader, "a") * 2.0)),
        move |new, old| {
            sink.lock().push(format!("{new},{old}"));
            Ok(())
        },
        WatcherOptions::default(),
    )
    .expect("evaluation succeeds");
    assert_eq!(doubled.value(), Value::from(2.0));

    assert!(set(&Value::from(state.clone()), "a", 2));
    // Nothing runs before the tick is drained
    assert!(calls.lock().is_empty());

    run_until_idle();
    assert_eq!(doubled.value(), Value::from(4.0));
    assert_eq!(calls.lock().as_slice(), ["4,2"]);
    assert!(current_flush_timestamp().is_some());
}

#[test]
fn repeated_writes_run_watcher_once() {
    let state = observed([("a", 1)]);
    let runs = Arc::new(AtomicUsize::new(0));
    let reader = state.clone();
    let counter = runs.clone();
    let _watcher = Watcher::new(
        move || Ok(reader.get("a").unwrap_or_default()),
        move |_, _| {
            counter.fetch_add(1, Ordering::Relaxed);
            Ok(())
        },
        WatcherOptions::default(),
    )
    .expect("evaluation succeeds");

    for i in 2..22 {
        state.put("a", i);
    }
    run_until_idle();
    assert_eq!(runs.load(Ordering::Relaxed), 1);

    // Same value again: no notification at all
    state.put("a", 21);
    run_until_idle();
    assert_eq!(runs.load(Ordering::Relaxed), 1);
}

#[test]
fn before_hook_runs_ahead_of_each_queued_run() {
    let state = observed([("x", 0)]);
    let log: Log = Arc::default();
    let reader = state.clone();
    let (before_log, run_log) = (log.clone(), log.clone());
    let _watcher = Watcher::new(
        move || Ok(reader.get("x").unwrap_or_default()),
        move |_, _| {
            run_log.lock().push("run".into());
            Ok(())
        },
        WatcherOptions::new().before(move || before_log.lock().push("before".into())),
    )
    .expect("evaluation succeeds");

    state.put("x", 1);
    run_until_idle();
    state.put("x", 2);
    run_until_idle();
    assert_eq!(log.lock().as_slice(), ["before", "run", "before", "run"]);
}

#[test]
fn nan_write_over_nan_does_not_notify() {
    let state = observed([("n", f64::NAN)]);
    let runs = Arc::new(AtomicUsize::new(0));
    let reader = state.clone();
    let counter = runs.clone();
    let _watcher = Watcher::new(
        move || {
            counter.fetch_add(1, Ordering::Relaxed);
            Ok(reader.get("n").unwrap_or_default())
        },
        |_, _| Ok(()),
        WatcherOptions::default(),
    )
    .expect("evaluation succeeds");

    state.put("n", f64::NAN);
    run_until_idle();
    assert_eq!(runs.load(Ordering::Relaxed), 1);
}

#[test]
fn watchers_run_in_creation_order() {
    let state = observed([("x", 0)]);
    let log: Log = Arc::default();
    let first = logging_watcher(&state, "x", &log, "first");
    let second = logging_watcher(&state, "x", &log, "second");
    assert!(first.uid() < second.uid());

    state.put("x", 1);
    run_until_idle();
    assert_eq!(log.lock().as_slice(), ["first", "second"]);
}

#[test]
fn watcher_queued_mid_flush_runs_in_uid_position() {
    cov_mark::check!(queued_during_flush);
    let state = observed([("x", 0), ("y", 0)]);
    let log: Log = Arc::default();

    // a (oldest) writes y, which only c reads; d was queued with a
    let writer = state.clone();
    let a_log = log.clone();
    let reader = state.clone();
    let _a = Watcher::new(
        move || Ok(reader.get("x").unwrap_or_default()),
        move |new, _| {
            a_log.lock().push("a".into());
            writer.put("y", new.clone());
            Ok(())
        },
        WatcherOptions::default(),
    )
    .expect("evaluation succeeds");
    let _c = logging_watcher(&state, "y", &log, "c");
    let _d = logging_watcher(&state, "x", &log, "d");

    state.put("x", 1);
    run_until_idle();
    assert_eq!(log.lock().as_slice(), ["a", "c", "d"]);
}

#[test]
fn self_triggering_watcher_is_stopped() {
    cov_mark::check!(infinite_update_loop_aborts_flush);
    let warnings = capture_warnings();
    let state = observed([("n", 0)]);
    let runs = Arc::new(AtomicUsize::new(0));

    let reader = state.clone();
    let writer = state.clone();
    let counter = runs.clone();
    let _watcher = Watcher::new(
        move || Ok(reader.get("n").unwrap_or_default()),
        move |new, _| {
            counter.fetch_add(1, Ordering::Relaxed);
            writer.put("n", new.as_number().unwrap_or(0.0) + 1.0);
            Ok(())
        },
        WatcherOptions::new().user(true).expression("n"),
    )
    .expect("evaluation succeeds");

    state.put("n", 1);
    run_until_idle();

    let runs = runs.load(Ordering::Relaxed);
    assert!(runs > 1 && runs <= config::MAX_UPDATE_COUNT + 1, "ran {runs} times");
    let warnings = warnings.borrow();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("infinite update loop"));
    assert!(warnings[0].contains("\"n\""));
    config::reset();
}

#[test]
fn deep_watcher_sees_nested_changes() {
    let c = ReactiveMap::from_iter([("c", 1)]);
    let b = ReactiveMap::from_iter([("b", Value::from(c.clone()))]);
    let state = observed([("a", Value::from(b))]);

    let deep_runs = Arc::new(AtomicUsize::new(0));
    let shallow_runs = Arc::new(AtomicUsize::new(0));
    let watch = |deep: bool, runs: &Arc<AtomicUsize>| {
        let reader = state.clone();
        let counter = runs.clone();
        Watcher::new(
            move || Ok(reader.get("a").unwrap_or_default()),
            move |_, _| {
                counter.fetch_add(1, Ordering::Relaxed);
                Ok(())
            },
            WatcherOptions::new().deep(deep),
        )
        .expect("evaluation succeeds")
    };
    let _deep = watch(true, &deep_runs);
    let _shallow = watch(false, &shallow_runs);

    c.put("c", 2);
    run_until_idle();
    assert_eq!(deep_runs.load(Ordering::Relaxed), 1);
    assert_eq!(shallow_runs.load(Ordering::Relaxed), 0);
}

#[test]
fn push_wraps_and_notifies_once() {
    let state = observed([("items", Value::from(ReactiveList::new()))]);
    let runs = Arc::new(AtomicUsize::new(0));
    let reader = state.clone();
    let counter = runs.clone();
    let _watcher = Watcher::new(
        move || Ok(reader.get("items").unwrap_or_default()),
        move |_, _| {
            counter.fetch_add(1, Ordering::Relaxed);
            Ok(())
        },
        WatcherOptions::new().sync(true),
    )
    .expect("evaluation succeeds");

    let items = state.peek("items").and_then(|v| v.as_list().cloned()).expect("list");
    let child = ReactiveMap::from_iter([("k", 1)]);
    items.push_all([Value::from(child.clone()), Value::from(2)]);

    assert_eq!(items.snapshot().len(), 2);
    assert!(child.observer().is_some());
    assert_eq!(runs.load(Ordering::Relaxed), 1);
}

#[test]
fn nested_list_mutation_reaches_outer_reader() {
    let inner = ReactiveList::from_iter([1]);
    let outer = ReactiveList::from_iter([Value::from(inner.clone())]);
    let state = observed([("rows", Value::from(outer))]);

    let runs = Arc::new(AtomicUsize::new(0));
    let reader = state.clone();
    let counter = runs.clone();
    let _watcher = Watcher::new(
        move || Ok(reader.get("rows").unwrap_or_default()),
        move |_, _| {
            counter.fetch_add(1, Ordering::Relaxed);
            Ok(())
        },
        WatcherOptions::default(),
    )
    .expect("evaluation succeeds");

    inner.push(2);
    run_until_idle();
    assert_eq!(runs.load(Ordering::Relaxed), 1);
}

#[test]
fn lazy_watcher_scenario() {
    let state = observed([("a", 1)]);
    let evaluations = Arc::new(AtomicUsize::new(0));
    let reader = state.clone();
    let counter = evaluations.clone();
    let computed = Watcher::lazy(
        move || {
            counter.fetch_add(1, Ordering::Relaxed);
            Ok(Value::from(number(&reader, "a") + 1.0))
        },
        WatcherOptions::default(),
    );

    assert!(computed.is_dirty());
    assert_eq!(computed.value(), Value::Null);

    assert_eq!(computed.read().expect("evaluates"), Value::from(2.0));
    assert!(!computed.is_dirty());

    state.put("a", 5);
    assert!(computed.is_dirty());
    assert_eq!(evaluations.load(Ordering::Relaxed), 1);
}

#[test]
fn computed_read_inside_watcher_propagates_deps() {
    let state = observed([("a", 1)]);
    let reader = state.clone();
    let computed = Arc::new(Watcher::lazy(
        move || Ok(Value::from(number(&reader, "a") * 10.0)),
        WatcherOptions::default(),
    ));

    let seen: Log = Arc::default();
    let source = computed.clone();
    let sink = seen.clone();
    let _render = Watcher::new(
        move || Ok(source.read()?),
        move |new, _| {
            sink.lock().push(new.to_string());
            Ok(())
        },
        WatcherOptions::default(),
    )
    .expect("evaluation succeeds");

    state.put("a", 2);
    run_until_idle();
    assert_eq!(seen.lock().as_slice(), ["20"]);
}

#[test]
fn set_and_del_notify_structure_readers() {
    let state = observed([("a", 1)]);
    let key_counts: Log = Arc::default();
    let reader = state.clone();
    let sink = key_counts.clone();
    let _watcher = Watcher::new(
        move || Ok(Value::from(reader.keys().len())),
        move |new, _| {
            sink.lock().push(new.to_string());
            Ok(())
        },
        WatcherOptions::default(),
    )
    .expect("evaluation succeeds");

    let target = Value::from(state.clone());
    assert!(set(&target, "b", 2));
    run_until_idle();
    assert!(state.key_dep("b").is_some());

    assert!(del(&target, "a"));
    run_until_idle();
    assert_eq!(key_counts.lock().as_slice(), ["2", "1"]);
}

#[test]
fn reading_missing_key_then_set_reruns_reader() {
    let state = observed(Vec::<(String, Value)>::new());
    let reader = state.clone();
    let watcher = Watcher::new(
        move || Ok(reader.get("late").unwrap_or_default()),
        |_, _| Ok(()),
        WatcherOptions::default(),
    )
    .expect("evaluation succeeds");

    set(&Value::from(state.clone()), "late", "here");
    run_until_idle();
    assert_eq!(watcher.value(), Value::from("here"));
}

#[test]
fn invalid_mutations_warn_and_leave_target_untouched() {
    let warnings = capture_warnings();
    assert!(!set(&Value::Null, "a", 1));
    assert!(!del(&Value::from("text"), "a"));

    let frozen = ReactiveMap::from_iter([("a", 1)]);
    frozen.freeze();
    assert!(!set(&Value::from(frozen.clone()), "b", 1));
    assert!(frozen.peek("b").is_none());

    assert_eq!(warnings.borrow().len(), 3);
    config::reset();
}

#[test]
fn user_watcher_keeps_stale_value_on_error() {
    cov_mark::check!(user_evaluation_error_keeps_stale_value);
    let errors = capture_errors();
    let state = observed([("ok", true)]);

    let reader = state.clone();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let watcher = Watcher::new(
        move || match reader.get("ok").and_then(|v| v.as_bool()) {
            Some(true) => Ok(Value::from("fine")),
            _ => Err("state is broken".into()),
        },
        move |_, _| {
            counter.fetch_add(1, Ordering::Relaxed);
            Ok(())
        },
        WatcherOptions::new().user(true).expression("status"),
    )
    .expect("evaluation succeeds");

    state.put("ok", false);
    run_until_idle();
    assert_eq!(watcher.value(), Value::from("fine"));
    assert_eq!(calls.load(Ordering::Relaxed), 0);
    assert_eq!(errors.borrow().len(), 1);
    assert!(errors.borrow()[0].contains("getter for watcher \"status\""));
    config::reset();
}

#[test]
fn failing_watcher_does_not_stop_the_flush() {
    let errors = capture_errors();
    let state = observed([("x", 0)]);

    let reader = state.clone();
    let _broken = Watcher::new(
        move || Ok(reader.get("x").unwrap_or_default()),
        |_, _| Err("callback failed".into()),
        WatcherOptions::default(),
    )
    .expect("evaluation succeeds");
    let log: Log = Arc::default();
    let _healthy = logging_watcher(&state, "x", &log, "healthy");

    state.put("x", 1);
    run_until_idle();
    assert_eq!(log.lock().as_slice(), ["healthy"]);
    assert_eq!(errors.borrow().len(), 1);
    config::reset();
}

#[test]
fn immediate_watcher_fires_on_construction() {
    let state = observed([("a", 7)]);
    let calls: Log = Arc::default();
    let reader = state.clone();
    let sink = calls.clone();
    let _watcher = Watcher::new(
        move || Ok(reader.get("a").unwrap_or_default()),
        move |new, old| {
            sink.lock().push(format!("{new},{old}"));
            Ok(())
        },
        WatcherOptions::new().user(true).immediate(true),
    )
    .expect("evaluation succeeds");
    assert_eq!(calls.lock().as_slice(), ["7,null"]);
}

#[test]
fn path_watcher_follows_nested_key() {
    let address = ReactiveMap::from_iter([("city", "Paris")]);
    let state = observed([("address", Value::from(address.clone()))]);
    let calls: Log = Arc::default();
    let sink = calls.clone();
    let _watcher = Watcher::watch_path(
        &Value::from(state.clone()),
        "address.city",
        move |new, old| {
            sink.lock().push(format!("{old}->{new}"));
            Ok(())
        },
        WatcherOptions::default(),
    )
    .expect("evaluation succeeds");

    address.put("city", "Lyon");
    run_until_idle();
    assert_eq!(calls.lock().as_slice(), ["Paris->Lyon"]);
}

#[test]
fn invalid_path_warns_and_evaluates_to_null() {
    let warnings = capture_warnings();
    let state = observed([("a", 1)]);
    let watcher = Watcher::watch_path(
        &Value::from(state),
        "a[0]",
        |_, _| Ok(()),
        WatcherOptions::default(),
    )
    .expect("evaluation succeeds");
    assert_eq!(watcher.value(), Value::Null);
    assert!(warnings.borrow()[0].contains("Failed watching path"));
    config::reset();
}

#[test]
fn sync_mode_runs_on_write() {
    cov_mark::check!(sync_notify_sorts_subscribers);
    config::install(Config::new().async_flush(false));
    let state = observed([("x", 0)]);
    let log: Log = Arc::default();
    let _first = logging_watcher(&state, "x", &log, "first");
    let _second = logging_watcher(&state, "x", &log, "second");

    state.put("x", 1);
    assert_eq!(log.lock().as_slice(), ["first", "second"]);
    config::reset();
}

#[test]
fn next_tick_callback_sees_flushed_state() {
    let state = observed([("a", 1)]);
    let reader = state.clone();
    let watcher = Arc::new(
        Watcher::new(
            move || Ok(reader.get("a").unwrap_or_default()),
            |_, _| Ok(()),
            WatcherOptions::default(),
        )
        .expect("evaluation succeeds"),
    );

    state.put("a", 2);
    let seen = Rc::new(RefCell::new(Value::Null));
    let (probe, sink) = (watcher.clone(), seen.clone());
    next_tick(move || {
        *sink.borrow_mut() = probe.value();
        Ok(())
    });
    run_until_idle();
    assert_eq!(*seen.borrow(), Value::from(2));
}

#[test]
fn teardown_during_flush_skips_the_watcher() {
    let state = observed([("x", 0)]);
    let victim: Arc<Mutex<Option<Arc<Watcher>>>> = Arc::default();
    let log: Log = Arc::default();

    let reader = state.clone();
    let target = victim.clone();
    let _killer = Watcher::new(
        move || Ok(reader.get("x").unwrap_or_default()),
        move |_, _| {
            if let Some(watcher) = target.lock().as_ref() {
                watcher.teardown();
            }
            Ok(())
        },
        WatcherOptions::default(),
    )
    .expect("evaluation succeeds");
    let late = Arc::new(logging_watcher(&state, "x", &log, "late"));
    *victim.lock() = Some(late.clone());

    state.put("x", 1);
    run_until_idle();
    assert!(log.lock().is_empty());
    assert!(!late.is_active());
}

#[test]
fn untracked_reads_do_not_subscribe() {
    let state = observed([("a", 1), ("b", 1)]);
    let runs = Arc::new(AtomicUsize::new(0));
    let reader = state.clone();
    let counter = runs.clone();
    let _watcher = Watcher::new(
        move || {
            let a = number(&reader, "a");
            let b = untracked(|| number(&reader, "b"));
            Ok(Value::from(a + b))
        },
        move |_, _| {
            counter.fetch_add(1, Ordering::Relaxed);
            Ok(())
        },
        WatcherOptions::default(),
    )
    .expect("evaluation succeeds");

    state.put("b", 5);
    run_until_idle();
    assert_eq!(runs.load(Ordering::Relaxed), 0);
    assert_eq!(state.key_dep("b").map(|dep| dep.subscriber_count()), Some(0));
}

#[test]
fn paused_observation_stores_plain_containers() {
    let state = observed([("a", 1)]);
    let plain = ReactiveMap::from_iter([("x", 1)]);
    pause_observing(|| state.put("a", plain.clone()));
    assert!(plain.observer().is_none());

    let wrapped = ReactiveMap::from_iter([("x", 1)]);
    state.put("a", wrapped.clone());
    assert!(wrapped.observer().is_some());
}

#[test]
fn updated_hooks_fire_child_first() {
    let state = observed([("x", 0)]);
    let log: Log = Arc::default();

    let render = |owner: &Owner| {
        let reader = state.clone();
        Watcher::new(
            move || Ok(reader.get("x").unwrap_or_default()),
            |_, _| Ok(()),
            WatcherOptions::new().owner(owner.id()).render(true),
        )
        .expect("evaluation succeeds")
    };
    let parent = Owner::new();
    let _parent_render = render(&parent);
    let child = Owner::new();
    let _child_render = render(&child);
    let unmounted = Owner::new();
    let _unmounted_render = render(&unmounted);

    for (owner, name) in [(&parent, "parent"), (&child, "child"), (&unmounted, "unmounted")] {
        let sink = log.clone();
        owner.on_updated(move || {
            sink.lock().push(name.to_owned());
            Ok(())
        });
    }
    parent.mark_mounted();
    child.mark_mounted();

    state.put("x", 1);
    run_until_idle();
    assert_eq!(log.lock().as_slice(), ["child", "parent"]);
}

#[test]
fn activated_hook_runs_after_flush() {
    let state = observed([("x", 0)]);
    let log: Log = Arc::default();
    let owner = Owner::new();
    owner.deactivate();
    let sink = log.clone();
    owner.on_activated(move || {
        sink.lock().push("activated".into());
        Ok(())
    });
    let _watcher = logging_watcher(&state, "x", &log, "watcher");

    queue_activated(owner.id());
    state.put("x", 1);
    run_until_idle();
    assert_eq!(log.lock().as_slice(), ["watcher", "activated"]);
    assert!(!owner.id().is_inactive());
}

#[test]
fn destroyed_owner_stops_reacting() {
    let state = observed([("x", 0)]);
    let log: Log = Arc::default();
    let owner = Owner::new();
    let reader = state.clone();
    let sink = log.clone();
    let _watcher = Watcher::new(
        move || Ok(reader.get("x").unwrap_or_default()),
        move |_, _| {
            sink.lock().push("ran".into());
            Ok(())
        },
        WatcherOptions::new().owner(owner.id()),
    )
    .expect("evaluation succeeds");

    owner.destroy();
    state.put("x", 1);
    run_until_idle();
    assert!(log.lock().is_empty());
}

#[test]
fn owner_destroyed_mid_evaluation_leaves_no_subscriptions() {
    let (first, second) = (Dep::new(), Dep::new());
    let (first_id, second_id) = (first.id(), second.id());
    let owner = Arc::new(Owner::new());

    let destroyer = owner.clone();
    let watcher = Watcher::new(
        move || {
            first_id.depend();
            destroyer.destroy();
            second_id.depend();
            Ok(Value::Null)
        },
        |_, _| Ok(()),
        WatcherOptions::new().owner(owner.id()),
    )
    .expect("evaluation succeeds");

    assert!(!watcher.is_active());
    assert_eq!(first.subscriber_count(), 0);
    assert_eq!(second.subscriber_count(), 0);
    assert!(watcher.id().deps().is_empty());
    drop(watcher);

    // A fresh watcher may take over the freed slot; it never read either dep
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    let _bystander = Watcher::new(
        || Ok(Value::Null),
        move |_, _| {
            counter.fetch_add(1, Ordering::Relaxed);
            Ok(())
        },
        WatcherOptions::default(),
    )
    .expect("evaluation succeeds");
    first.notify();
    second.notify();
    run_until_idle();
    assert_eq!(runs.load(Ordering::Relaxed), 0);
}

/// Observed list under `items` plus a sync watcher counting its runs.
fn counted_list(initial: &[i32]) -> (ReactiveList, Watcher, Arc<AtomicUsize>) {
    let list: ReactiveList = initial.iter().copied().collect();
    let state = observed([("items", Value::from(list.clone()))]);
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    let watcher = Watcher::new(
        move || Ok(state.get("items").unwrap_or_default()),
        move |_, _| {
            counter.fetch_add(1, Ordering::Relaxed);
            Ok(())
        },
        WatcherOptions::new().sync(true),
    )
    .expect("evaluation succeeds");
    (list, watcher, runs)
}

#[test]
fn every_list_mutator_notifies_once_per_call() {
    let (list, _watcher, runs) = counted_list(&[5, 3, 8, 1]);
    let mut expected = 0;
    let mut check = |step: &str| {
        expected += 1;
        assert_eq!(runs.load(Ordering::Relaxed), expected, "after {step}");
    };

    list.push(9);
    check("push");
    list.push_all([Value::from(1), Value::from(2), Value::from(3)]);
    check("push_all");
    list.pop();
    check("pop");
    list.shift();
    check("shift");
    list.unshift(0);
    check("unshift");
    list.unshift_all([Value::from(-1), Value::from(-2)]);
    check("unshift_all");
    let removed = list.splice(1, 3, [Value::from(10), Value::from(11), Value::from(12), Value::from(13)]);
    assert_eq!(removed.len(), 3);
    check("splice");
    list.sort_by(|a, b| {
        a.as_number()
            .partial_cmp(&b.as_number())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    check("sort_by");
    list.reverse();
    check("reverse");

    // No-op calls still notify
    list.splice(100, 0, []);
    check("empty splice");
}

#[test]
fn set_past_the_end_wakes_list_readers() {
    let (list, _watcher, runs) = counted_list(&[1]);

    assert!(set(&Value::from(list.clone()), 3usize, 9));
    assert_eq!(runs.load(Ordering::Relaxed), 1);
    assert_eq!(
        list.snapshot(),
        vec![Value::from(1), Value::Null, Value::Null, Value::from(9)]
    );

    let child = ReactiveMap::from_iter([("k", 1)]);
    assert!(set(&Value::from(list.clone()), 0usize, child.clone()));
    assert_eq!(runs.load(Ordering::Relaxed), 2);
    assert!(child.observer().is_some());
}
