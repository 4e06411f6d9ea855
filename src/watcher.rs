use std::fmt;
use std::sync::atomic::Ordering;

use crate::arena::watcher_arena::{
    BeforeHook, ChangeCallback, Evaluator, FLAG_DEEP, FLAG_LAZY, FLAG_RENDER, FLAG_SYNC,
    FLAG_USER, before_slot, callback_slot, evaluator_slot,
};
use crate::arena::{
    DepId, EvaluationGuard, WatcherId, WatcherMetadata, current_watcher, watcher_arena_insert,
    watcher_arena_remove,
};
use crate::error::{BoxError, Error, Result, report, warn};
use crate::owner::OwnerId;
use crate::path::Path;
use crate::scheduler;
use crate::traverse::traverse;
use crate::value::Value;

/// Run a closure without tracking dependencies
///
/// Reads inside `f` do not subscribe the running watcher, if any.
///
/// # Example
/// ```ignore
/// let watcher = Watcher::new(
///     move || {
///         let tracked = state.get("a");                     // re-runs on change
///         let peeked = untracked(|| state.get("b"));        // does not
///         Ok(Value::from(tracked.is_some() && peeked.is_some()))
///     },
///     |_, _| Ok(()),
///     WatcherOptions::default(),
/// )?;
/// ```
pub fn untracked<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = EvaluationGuard::new(None);
    f()
}

/// Construction options for a [`Watcher`].
///
/// ```ignore
/// let options = WatcherOptions::new()
///     .user(true)
///     .deep(true)
///     .expression("settings");
/// ```
#[derive(Default)]
pub struct WatcherOptions {
    deep: bool,
    user: bool,
    lazy: bool,
    sync: bool,
    render: bool,
    immediate: bool,
    before: Option<BeforeHook>,
    owner: Option<OwnerId>,
    expression: Option<String>,
}

impl WatcherOptions {
    /// All modes off.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to everything reachable from the produced value, and fire
    /// the callback on every run.
    pub fn deep(mut self, deep: bool) -> Self {
        self.deep = deep;
        self
    }

    /// User watcher: evaluation and callback errors are reported instead of
    /// returned, and a failed evaluation keeps the previous value.
    pub fn user(mut self, user: bool) -> Self {
        self.user = user;
        self
    }

    /// Computed value: never evaluated eagerly, only marked dirty on change.
    pub fn lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    /// Run on notification instead of going through the queue.
    pub fn sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    /// This is the owner's render watcher; its runs trigger the owner's
    /// `updated` hook after the flush.
    pub fn render(mut self, render: bool) -> Self {
        self.render = render;
        self
    }

    /// Invoke the callback once right after construction with
    /// `(value, Null)`.
    pub fn immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }

    /// Hook run by the scheduler right before each queued run.
    pub fn before<F>(mut self, hook: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        self.before = Some(Box::new(hook));
        self
    }

    /// Register the watcher with `owner`, which tears it down on destroy.
    pub fn owner(mut self, owner: OwnerId) -> Self {
        self.owner = Some(owner);
        self
    }

    /// Label used in diagnostics.
    pub fn expression(mut self, expression: impl Into<String>) -> Self {
        self.expression = Some(expression.into());
        self
    }

    fn flags(&self) -> u8 {
        let mut flags = 0;
        for (set, flag) in [
            (self.deep, FLAG_DEEP),
            (self.user, FLAG_USER),
            (self.lazy, FLAG_LAZY),
            (self.sync, FLAG_SYNC),
            (self.render, FLAG_RENDER),
        ] {
            if set {
                flags |= flag;
            }
        }
        flags
    }
}

impl fmt::Debug for WatcherOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatcherOptions")
            .field("deep", &self.deep)
            .field("user", &self.user)
            .field("lazy", &self.lazy)
            .field("sync", &self.sync)
            .field("render", &self.render)
            .field("immediate", &self.immediate)
            .field("before", &self.before.is_some())
            .field("owner", &self.owner)
            .field("expression", &self.expression)
            .finish()
    }
}

/// Subscriber that re-evaluates when the state it read changes
///
/// A watcher pairs an evaluator with a change callback. Every evaluation
/// records the deps the evaluator read, and a change to any of them
/// schedules the watcher. When it runs, it re-evaluates and calls the
/// callback with `(new, old)` if the value changed.
///
/// # How it works
/// 1. The constructor evaluates once (unless lazy) to collect dependencies
/// 2. A change notifies the watcher, which enters the pending queue once
/// 3. The queue is flushed on the next tick, in creation order
/// 4. Each evaluation diffs the new dependency set against the old one and
///    unsubscribes from whatever was not read this time
///
/// # Example
/// ```ignore
/// let state: ReactiveMap = [("count", 1)].into_iter().collect();
/// observe(&Value::from(state.clone()));
///
/// let reader = state.clone();
/// let watcher = Watcher::new(
///     move || Ok(reader.get("count").unwrap_or_default()),
///     |new, old| {
///         println!("count: {old} -> {new}");
///         Ok(())
///     },
///     WatcherOptions::new().user(true),
/// )?;
///
/// state.put("count", 2);
/// state.put("count", 3);
/// run_until_idle(); // prints "count: 1 -> 3" once
/// ```
///
/// Dropping the handle tears the watcher down and frees its slot.
pub struct Watcher {
    id: WatcherId,
}

impl Watcher {
    /// Create a watcher. Non-lazy watchers evaluate immediately.
    ///
    /// Fails when the first evaluation of a non-user watcher fails.
    pub fn new<E, C>(evaluator: E, callback: C, options: WatcherOptions) -> Result<Self>
    where
        E: FnMut() -> std::result::Result<Value, BoxError> + Send + 'static,
        C: FnMut(&Value, &Value) -> std::result::Result<(), BoxError> + Send + 'static,
    {
        Self::build(Box::new(evaluator), Some(Box::new(callback)), options)
    }

    /// Create a computed value: a lazy watcher with no callback, read through
    /// [`Watcher::read`].
    pub fn lazy<E>(evaluator: E, options: WatcherOptions) -> Self
    where
        E: FnMut() -> std::result::Result<Value, BoxError> + Send + 'static,
    {
        Self::register(Box::new(evaluator), None, options.lazy(true).immediate(false))
    }

    /// Watch a dot-path (`"a.b.c"`) below `root`.
    ///
    /// Path watchers are user watchers. An invalid path is reported as a
    /// warning and the watcher evaluates to null.
    pub fn watch_path<C>(
        root: &Value,
        path: &str,
        callback: C,
        options: WatcherOptions,
    ) -> Result<Self>
    where
        C: FnMut(&Value, &Value) -> std::result::Result<(), BoxError> + Send + 'static,
    {
        let mut options = options.user(true);
        if options.expression.is_none() {
            options.expression = Some(path.to_owned());
        }
        let evaluator: Evaluator = match Path::parse(path) {
            Some(parsed) => {
                let root = root.clone();
                Box::new(move || Ok(parsed.evaluate(&root)))
            }
            None => {
                warn(&format!(
                    "Failed watching path: \"{path}\". Watchers only accept simple dot-delimited paths; use an evaluator closure for anything else."
                ));
                Box::new(|| Ok(Value::Null))
            }
        };
        Self::build(evaluator, Some(Box::new(callback)), options)
    }

    fn register(
        evaluator: Evaluator,
        callback: Option<ChangeCallback>,
        options: WatcherOptions,
    ) -> Self {
        let flags = options.flags();
        let metadata = WatcherMetadata::new(
            evaluator,
            callback,
            options.before,
            flags,
            options.owner,
            options.expression.unwrap_or_default(),
        );
        let id = watcher_arena_insert(metadata);
        if let Some(owner) = options.owner {
            owner.register_watcher(id, flags & FLAG_RENDER != 0);
        }
        Self { id }
    }

    fn build(
        evaluator: Evaluator,
        callback: Option<ChangeCallback>,
        options: WatcherOptions,
    ) -> Result<Self> {
        let lazy = options.lazy;
        let immediate = options.immediate;
        let watcher = Self::register(evaluator, callback, options);
        let id = watcher.id;

        if !lazy {
            let value = id.get()?;
            drop(id.store_value(value));
        }
        tracing::trace!(uid = watcher.uid(), "watcher created");

        if immediate {
            let value = id.value();
            let result = id.with_taken(callback_slot, |callback| callback(&value, &Value::Null));
            if let Some(Err(source)) = result {
                let error = Error::callback(format!("callback for immediate {}", id.label()), source);
                report(&error, id.owner(), "immediate watcher callback");
            }
        }
        Ok(watcher)
    }

    /// Arena id.
    pub fn id(&self) -> WatcherId {
        self.id
    }

    /// Ordering id; watchers created later have larger uids.
    pub fn uid(&self) -> u64 {
        self.id.uid().unwrap_or_default()
    }

    /// Value produced by the last evaluation, without evaluating.
    pub fn value(&self) -> Value {
        self.id.value()
    }

    /// Lazy watchers: whether the cached value is stale.
    pub fn is_dirty(&self) -> bool {
        self.id.is_dirty()
    }

    /// False once torn down.
    pub fn is_active(&self) -> bool {
        self.id.is_active()
    }

    /// Evaluate with dependency collection and return the value, without
    /// storing it or calling the callback.
    pub fn get(&self) -> Result<Value> {
        self.ensure_active()?;
        self.id.get()
    }

    /// Re-evaluate and call the callback if the value changed.
    pub fn run(&self) -> Result<()> {
        self.ensure_active()?;
        self.id.run()
    }

    /// React to a change: mark dirty (lazy), run now (sync), or enqueue.
    pub fn update(&self) -> Result<()> {
        self.ensure_active()?;
        self.id.update();
        Ok(())
    }

    /// Lazy watchers: evaluate, store the value and clear the dirty flag.
    pub fn evaluate(&self) -> Result<()> {
        self.ensure_active()?;
        self.id.evaluate()
    }

    /// Make the running watcher depend on everything this watcher depends on.
    pub fn depend(&self) {
        self.id.depend();
    }

    /// Computed getter: evaluate if dirty, then propagate dependencies to the
    /// running watcher, if any.
    pub fn read(&self) -> Result<Value> {
        if self.id.is_dirty() && self.id.is_active() {
            self.id.evaluate()?;
        }
        if current_watcher().is_some() {
            self.id.depend();
        }
        Ok(self.id.value())
    }

    /// Unsubscribe from everything and stop reacting. Idempotent.
    pub fn teardown(&self) {
        self.id.teardown();
    }

    fn ensure_active(&self) -> Result<()> {
        if self.id.is_active() {
            Ok(())
        } else {
            Err(Error::TornDown { uid: self.uid() })
        }
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("uid", &self.uid())
            .field("expression", &self.id.expression())
            .field("active", &self.is_active())
            .finish()
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.id.teardown();
        // Teardown is a no-op when it already ran, possibly mid-evaluation.
        self.id.unsubscribe_all();
        // A queued entry for this slot is skipped by the scheduler, which
        // checks the uid before running.
        drop(watcher_arena_remove(self.id));
    }
}

// Dependency bookkeeping and the run protocol, shared by the owning handle
// and by deps / the scheduler, which only hold ids.
impl WatcherId {
    /// Record `dep` as read by the running evaluation; subscribe if it is
    /// new to both dependency sets. Torn-down watchers record nothing.
    pub(crate) fn add_dep(self, dep: DepId) {
        let subscribe = self
            .with(|metadata| {
                if !metadata.active.load(Ordering::Acquire) {
                    return false;
                }
                let mut tracking = metadata.deps.lock();
                tracking.new_deps.insert(dep) && !tracking.deps.contains(&dep)
            })
            .unwrap_or(false);
        if subscribe {
            dep.add_sub(self);
        }
    }

    /// Unsubscribe from deps the last evaluation did not read, then make the
    /// new set current.
    pub(crate) fn cleanup_deps(self) {
        let stale: Vec<DepId> = self
            .with(|metadata| {
                let mut tracking = metadata.deps.lock();
                let tracking = &mut *tracking;
                let stale = tracking
                    .deps
                    .iter()
                    .filter(|dep| !tracking.new_deps.contains(*dep))
                    .copied()
                    .collect();
                std::mem::swap(&mut tracking.deps, &mut tracking.new_deps);
                tracking.new_deps.clear();
                stale
            })
            .unwrap_or_default();
        for dep in stale {
            dep.remove_sub(self);
        }
    }

    pub(crate) fn update(self) {
        let Some((flags, active)) = self.with(|metadata| {
            (metadata.flags, metadata.active.load(Ordering::Acquire))
        }) else {
            return;
        };
        if !active {
            return;
        }
        if flags & FLAG_LAZY != 0 {
            self.with(|metadata| metadata.dirty.store(true, Ordering::Release));
        } else if flags & FLAG_SYNC != 0 {
            if let Err(error) = self.run() {
                report(&error, self.owner(), "sync watcher");
            }
        } else {
            scheduler::queue_watcher(self);
        }
    }

    /// Evaluate, falling back to the cached value when a user watcher's
    /// evaluation failed (the failure has been reported).
    pub(crate) fn get(self) -> Result<Value> {
        Ok(self.get_fresh()?.unwrap_or_else(|| self.value()))
    }

    /// `Ok(None)` when there is nothing new: the watcher is gone, its
    /// evaluator is already running further up the stack, or a user
    /// watcher's evaluation failed and was reported.
    fn get_fresh(self) -> Result<Option<Value>> {
        let Some(flags) = self.with(|metadata| metadata.flags) else {
            return Ok(None);
        };

        let outcome = {
            let _guard = EvaluationGuard::new(Some(self));
            let Some(outcome) = self.with_taken(evaluator_slot, |evaluate| evaluate()) else {
                return Ok(None);
            };
            if flags & FLAG_DEEP != 0 {
                if let Ok(value) = &outcome {
                    traverse(value);
                }
            }
            outcome
        };
        self.cleanup_deps();

        match outcome {
            Ok(value) => Ok(Some(value)),
            Err(source) => {
                let error = Error::evaluation(format!("getter for {}", self.label()), source);
                if flags & FLAG_USER != 0 {
                    cov_mark::hit!(user_evaluation_error_keeps_stale_value);
                    report(&error, self.owner(), "watcher getter");
                    Ok(None)
                } else {
                    Err(error)
                }
            }
        }
    }

    /// Re-evaluate; store the value and invoke the callback if it changed,
    /// is a container, or the watcher is deep. Torn-down watchers do
    /// nothing.
    pub(crate) fn run(self) -> Result<()> {
        if !self.is_active() {
            return Ok(());
        }
        let Some(value) = self.get_fresh()? else {
            return Ok(());
        };
        let flags = self.flags();
        let old = self.value();
        if value.same_value(&old) && !value.is_container() && flags & FLAG_DEEP == 0 {
            return Ok(());
        }
        drop(self.store_value(value.clone()));

        let Some(Err(source)) = self.with_taken(callback_slot, |callback| callback(&value, &old))
        else {
            return Ok(());
        };
        let error = Error::callback(format!("callback for {}", self.label()), source);
        if flags & FLAG_USER != 0 {
            report(&error, self.owner(), "watcher callback");
            Ok(())
        } else {
            Err(error)
        }
    }

    pub(crate) fn evaluate(self) -> Result<()> {
        let value = self.get()?;
        drop(self.store_value(value));
        self.with(|metadata| metadata.dirty.store(false, Ordering::Release));
        Ok(())
    }

    pub(crate) fn depend(self) {
        for dep in self.deps() {
            dep.depend();
        }
    }

    pub(crate) fn teardown(self) {
        let was_active = self
            .with(|metadata| metadata.active.swap(false, Ordering::AcqRel))
            .unwrap_or(false);
        if !was_active {
            return;
        }
        if let Some(owner) = self.owner() {
            owner.forget_watcher(self);
        }
        self.unsubscribe_all();
        tracing::trace!(watcher = self.index(), "watcher torn down");
    }

    /// Leave every dep in both sets, including deps subscribed by an
    /// evaluation that is still running.
    pub(crate) fn unsubscribe_all(self) {
        let deps: Vec<DepId> = self
            .with(|metadata| {
                let mut tracking = metadata.deps.lock();
                let mut deps: Vec<DepId> = tracking.deps.drain(..).collect();
                deps.extend(tracking.new_deps.drain(..));
                deps
            })
            .unwrap_or_default();
        for dep in deps {
            dep.remove_sub(self);
        }
    }

    /// Run the before-hook, untracked.
    pub(crate) fn run_before_hook(self) {
        self.with_taken(before_slot, |hook| untracked(|| hook()));
    }

    pub(crate) fn is_dirty(self) -> bool {
        self.with(|metadata| metadata.dirty.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    pub(crate) fn is_user(self) -> bool {
        self.flags() & FLAG_USER != 0
    }

    pub(crate) fn value(self) -> Value {
        self.with(|metadata| metadata.value.read().clone())
            .unwrap_or_default()
    }

    /// Replace the cached value; the caller drops the old one.
    fn store_value(self, value: Value) -> Option<Value> {
        self.with(|metadata| std::mem::replace(&mut *metadata.value.write(), value))
    }

    /// `watcher "expr"`, or `watcher #uid` without an expression.
    pub(crate) fn label(self) -> String {
        let (uid, expression) = self
            .with(|metadata| (metadata.uid, metadata.expression.clone()))
            .unwrap_or_default();
        if expression.is_empty() {
            format!("watcher #{uid}")
        } else {
            format!("watcher \"{expression}\"")
        }
    }
}
