//! Tick FIFO: deferred callbacks drained in one batch.
//!
//! The scheduler defers its flush through [`next_tick`], and callers defer
//! their own work (e.g. "after the update is applied") the same way. The
//! first enqueue of a batch asks the host to drain by calling the tick driver
//! installed with [`set_tick_driver`]; the host later calls [`flush_ticks`]
//! (or [`run_until_idle`]) outside of any evaluation. Without a driver the
//! host drains whenever it sees fit.
//!
//! ```ignore
//! // Event loop integration: wake the loop, drain on its next iteration
//! let waker = loop_handle.clone();
//! set_tick_driver(move || waker.wake());
//!
//! loop {
//!     handle_events();
//!     run_until_idle();
//! }
//! ```

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use parking_lot::Mutex;

use crate::error::{BoxError, Error, report};

type TickCallback = Box<dyn FnOnce()>;

#[derive(Default)]
struct TickState {
    callbacks: Vec<TickCallback>,
    /// A drain has been requested for the callbacks above.
    pending: bool,
}

thread_local! {
    static TICK: RefCell<TickState> = RefCell::new(TickState::default());
    static DRIVER: RefCell<Option<Rc<dyn Fn()>>> = const { RefCell::new(None) };
}

/// Defer `callback` to the next drain.
///
/// Callbacks run in enqueue order. A failing callback is reported with info
/// `"nextTick"` and does not stop the others.
pub fn next_tick<F>(callback: F)
where
    F: FnOnce() -> Result<(), BoxError> + 'static,
{
    enqueue(Box::new(move || {
        if let Err(source) = callback() {
            report(&Error::callback("nextTick", source), None, "nextTick");
        }
    }));
}

/// Future resolved by the next drain.
pub fn next_tick_future() -> NextTick {
    let signal = Arc::new(Mutex::new(TickSignal::default()));
    let fired = signal.clone();
    enqueue(Box::new(move || {
        let waker = {
            let mut signal = fired.lock();
            signal.fired = true;
            signal.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    }));
    NextTick { signal }
}

fn enqueue(callback: TickCallback) {
    let request = TICK.with(|state| {
        let mut state = state.borrow_mut();
        state.callbacks.push(callback);
        !std::mem::replace(&mut state.pending, true)
    });
    if request {
        if let Some(driver) = DRIVER.with(|driver| driver.borrow().clone()) {
            driver();
        }
    }
}

/// Drain the callbacks queued so far. Callbacks enqueued while draining wait
/// for the next drain. Returns how many ran.
pub fn flush_ticks() -> usize {
    let callbacks = TICK.with(|state| {
        let mut state = state.borrow_mut();
        state.pending = false;
        std::mem::take(&mut state.callbacks)
    });
    let ran = callbacks.len();
    if ran > 0 {
        tracing::trace!(callbacks = ran, "draining tick");
    }
    for callback in callbacks {
        callback();
    }
    ran
}

/// Drain until no callback is left. Returns the total number run.
pub fn run_until_idle() -> usize {
    let mut total = 0;
    loop {
        let ran = flush_ticks();
        if ran == 0 {
            return total;
        }
        total += ran;
    }
}

/// Whether callbacks are waiting for a drain.
pub fn has_pending_ticks() -> bool {
    TICK.with(|state| !state.borrow().callbacks.is_empty())
}

/// Install the hook called once per requested drain.
///
/// The driver must only schedule the drain: it runs in the middle of
/// whatever enqueued the first callback, typically a notification.
pub fn set_tick_driver<F>(driver: F)
where
    F: Fn() + 'static,
{
    DRIVER.with(|slot| *slot.borrow_mut() = Some(Rc::new(driver)));
}

/// Remove the tick driver.
pub fn clear_tick_driver() {
    DRIVER.with(|slot| slot.borrow_mut().take());
}

#[derive(Default)]
struct TickSignal {
    fired: bool,
    waker: Option<Waker>,
}

/// Resolves once the tick it was created in has been drained.
///
/// ```ignore
/// state.put("count", 2);
/// next_tick_future().await; // watchers have run
/// ```
#[must_use = "futures do nothing unless polled"]
pub struct NextTick {
    signal: Arc<Mutex<TickSignal>>,
}

impl NextTick {
    /// Whether the drain has happened.
    pub fn is_ready(&self) -> bool {
        self.signal.lock().fired
    }
}

impl Future for NextTick {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let mut signal = self.signal.lock();
        if signal.fired {
            return Poll::Ready(());
        }
        signal.waker = Some(cx.waker().clone());
        Poll::Pending
    }
}
