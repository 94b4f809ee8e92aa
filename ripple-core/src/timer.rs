//! Timers
//!
//! Time-based combinators schedule their callbacks through a [`Timer`], so
//! the same code runs on the tokio clock in production and on a hand-advanced
//! clock in tests.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use crate::disposable::Disposable;

/// Schedules one-shot callbacks.
pub trait Timer {
    /// Run `callback` once after `delay`, unless the result is disposed or
    /// dropped first.
    fn set_timeout(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> Box<dyn Disposable>;
}

// ----------------------------------------------------------------------------
// Tokio
// ----------------------------------------------------------------------------

/// A timer backed by `tokio::time`.
///
/// Callbacks are spawned with `spawn_local`, so scheduling must happen inside
/// a `tokio::task::LocalSet`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTimer;

impl Timer for TokioTimer {
    fn set_timeout(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> Box<dyn Disposable> {
        let task = tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            callback();
        });
        Box::new(TimeoutTask(task))
    }
}

struct TimeoutTask(tokio::task::JoinHandle<()>);

impl Disposable for TimeoutTask {
    fn dispose(&self) {
        self.0.abort();
    }
}

impl Drop for TimeoutTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

// ----------------------------------------------------------------------------
// Manual
// ----------------------------------------------------------------------------

struct Scheduled {
    id: u64,
    due: Duration,
    callback: Box<dyn FnOnce()>,
}

#[derive(Default)]
struct ManualClock {
    now: Cell<Duration>,
    next_id: Cell<u64>,
    scheduled: RefCell<Vec<Scheduled>>,
}

/// A timer that only moves when told to.
#[derive(Clone, Default)]
pub struct ManualTimer {
    clock: Rc<ManualClock>,
}

impl ManualTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time elapsed since creation.
    pub fn now(&self) -> Duration {
        self.clock.now.get()
    }

    /// Move the clock forward, running every callback that falls due in
    /// order of due time. Callbacks may schedule further timeouts; those run
    /// too if they fall within the window.
    pub fn advance(&self, by: Duration) {
        let target = self.clock.now.get() + by;
        loop {
            let next = {
                let mut scheduled = self.clock.scheduled.borrow_mut();
                let earliest = scheduled
                    .iter()
                    .enumerate()
                    .filter(|(_, entry)| entry.due <= target)
                    .min_by_key(|(_, entry)| (entry.due, entry.id))
                    .map(|(index, _)| index);
                earliest.map(|index| scheduled.remove(index))
            };
            let Some(entry) = next else {
                break;
            };
            self.clock.now.set(entry.due);
            (entry.callback)();
        }
        self.clock.now.set(target);
    }

    pub fn pending_count(&self) -> usize {
        self.clock.scheduled.borrow().len()
    }
}

impl Timer for ManualTimer {
    fn set_timeout(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> Box<dyn Disposable> {
        let id = self.clock.next_id.get();
        self.clock.next_id.set(id + 1);
        self.clock.scheduled.borrow_mut().push(Scheduled {
            id,
            due: self.clock.now.get() + delay,
            callback,
        });
        Box::new(ManualTimeout {
            clock: Rc::clone(&self.clock),
            id,
        })
    }
}

impl fmt::Debug for ManualTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualTimer")
            .field("now", &self.now())
            .field("pending", &self.pending_count())
            .finish()
    }
}

struct ManualTimeout {
    clock: Rc<ManualClock>,
    id: u64,
}

impl Disposable for ManualTimeout {
    fn dispose(&self) {
        self.clock
            .scheduled
            .borrow_mut()
            .retain(|entry| entry.id != self.id);
    }
}

impl Drop for ManualTimeout {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter() -> (Rc<Cell<u32>>, impl Fn() -> Box<dyn FnOnce()>) {
        let count = Rc::new(Cell::new(0));
        let make = {
            let count = count.clone();
            move || -> Box<dyn FnOnce()> {
                let count = count.clone();
                Box::new(move || count.set(count.get() + 1))
            }
        };
        (count, make)
    }

    #[test]
    fn manual_timer_fires_when_due() {
        let timer = ManualTimer::new();
        let (count, make) = counter();
        let _timeout = timer.set_timeout(Duration::from_millis(100), make());

        timer.advance(Duration::from_millis(99));
        assert_eq!(count.get(), 0);

        timer.advance(Duration::from_millis(1));
        assert_eq!(count.get(), 1);
        assert_eq!(timer.pending_count(), 0);
    }

    #[test]
    fn disposed_timeout_never_fires() {
        let timer = ManualTimer::new();
        let (count, make) = counter();
        let timeout = timer.set_timeout(Duration::from_millis(10), make());

        timeout.dispose();
        timer.advance(Duration::from_secs(1));
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn callbacks_run_in_due_order() {
        let timer = ManualTimer::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        let mut timeouts = Vec::new();
        for (label, delay) in [("late", 30), ("early", 10), ("middle", 20)] {
            let order = order.clone();
            timeouts.push(timer.set_timeout(
                Duration::from_millis(delay),
                Box::new(move || order.borrow_mut().push(label)),
            ));
        }

        timer.advance(Duration::from_millis(50));
        assert_eq!(*order.borrow(), vec!["early", "middle", "late"]);
        assert_eq!(timer.now(), Duration::from_millis(50));
    }

    #[test]
    fn rescheduling_inside_a_callback() {
        let timer = ManualTimer::new();
        let fired = Rc::new(Cell::new(0));
        let held = Rc::new(RefCell::new(Vec::new()));

        let _first = timer.set_timeout(Duration::from_millis(10), {
            let timer = timer.clone();
            let fired = fired.clone();
            let held = held.clone();
            Box::new(move || {
                fired.set(fired.get() + 1);
                let fired = fired.clone();
                held.borrow_mut().push(timer.set_timeout(
                    Duration::from_millis(10),
                    Box::new(move || fired.set(fired.get() + 1)),
                ));
            })
        });

        timer.advance(Duration::from_millis(25));
        assert_eq!(fired.get(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_timer_fires_after_delay() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let (count, make) = counter();
                let _timeout = TokioTimer.set_timeout(Duration::from_millis(50), make());

                tokio::time::sleep(Duration::from_millis(40)).await;
                assert_eq!(count.get(), 0);

                tokio::time::sleep(Duration::from_millis(20)).await;
                assert_eq!(count.get(), 1);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn disposed_tokio_timeout_is_aborted() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let (count, make) = counter();
                let timeout = TokioTimer.set_timeout(Duration::from_millis(50), make());
                timeout.dispose();

                tokio::time::sleep(Duration::from_millis(100)).await;
                assert_eq!(count.get(), 0);
            })
            .await;
    }
}
