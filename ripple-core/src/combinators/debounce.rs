//! Debounced observables.
//!
//! The debounced observable is an event bridge whose "event source" is an
//! internal autorun on the upstream observable. The autorun only exists while
//! the debounced observable is observed.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use crate::disposable::{to_disposable, Disposable};
use crate::event::Listener;
use crate::reactive::{
    autorun_opts, observable_from_event_opts, AutorunOptions, FromEventObservable, Observable,
    ValueOptions,
};
use crate::timer::Timer;

struct DebounceState<T> {
    /// Last published value. `None` while unobserved.
    published: RefCell<Option<T>>,
    /// The scheduled publish of the latest source value, if any.
    pending: RefCell<Option<Box<dyn Disposable>>>,
}

impl<T> DebounceState<T> {
    fn cancel_pending(&self) {
        let pending = self.pending.borrow_mut().take();
        if let Some(pending) = pending {
            pending.dispose();
        }
    }
}

/// Follow `source` with a delay.
///
/// The first value seen after activation is published immediately. Later
/// changes restart a `delay` window and only the last value of the window is
/// published. Unobserved reads pass straight through to `source`.
pub fn debounced_observable<T, O>(
    source: O,
    delay: Duration,
    timer: Rc<dyn Timer>,
) -> FromEventObservable<T, ()>
where
    T: Clone + PartialEq + 'static,
    O: Observable<T> + Clone + 'static,
{
    let state = Rc::new(DebounceState {
        published: RefCell::new(None),
        pending: RefCell::new(None),
    });
    let name = format!("debounced({})", source.debug_name());

    let subscribe = {
        let state = state.clone();
        let source = source.clone();
        let name = name.clone();
        move |listener: Listener<()>| -> Box<dyn Disposable> {
            let follow = autorun_opts(AutorunOptions::default().debug_name(name.clone()), {
                let state = state.clone();
                let source = source.clone();
                let timer = timer.clone();
                move |r| {
                    let value = source.read(r);
                    if state.published.borrow().is_none() {
                        *state.published.borrow_mut() = Some(value);
                        return;
                    }

                    state.cancel_pending();
                    let callback = {
                        let state = state.clone();
                        let listener = listener.clone();
                        move || {
                            state.pending.borrow_mut().take();
                            *state.published.borrow_mut() = Some(value);
                            listener(&());
                        }
                    };
                    let pending = timer.set_timeout(delay, Box::new(callback));
                    *state.pending.borrow_mut() = Some(pending);
                }
            });

            let state = state.clone();
            Box::new(to_disposable(move || {
                follow.dispose();
                state.cancel_pending();
                state.published.borrow_mut().take();
            }))
        }
    };

    observable_from_event_opts(
        ValueOptions::default().debug_name(name),
        subscribe,
        move |_: Option<&()>| match state.published.borrow().as_ref() {
            Some(value) => value.clone(),
            None => source.get(),
        },
    )
}
