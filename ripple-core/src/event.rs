//! External Events
//!
//! An [`EventSource`] is anything that calls listeners back and can be
//! unsubscribed from. The event bridge (`observable_from_event`) subscribes to
//! one only while the bridge itself is observed.
//!
//! [`Emitter`] is the simple in-process source used by tests and by the
//! debounce combinator.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use crate::disposable::Disposable;

/// A listener callback.
pub type Listener<A> = Rc<dyn Fn(&A)>;

/// A subscribable source of events with payload `A`.
pub trait EventSource<A> {
    /// Register `listener`. Disposing the result unsubscribes it.
    fn subscribe(&self, listener: Listener<A>) -> Box<dyn Disposable>;
}

impl<A, F> EventSource<A> for F
where
    F: Fn(Listener<A>) -> Box<dyn Disposable>,
{
    fn subscribe(&self, listener: Listener<A>) -> Box<dyn Disposable> {
        self(listener)
    }
}

struct EmitterInner<A> {
    listeners: RefCell<IndexMap<u64, Listener<A>>>,
    next_id: Cell<u64>,
}

/// An in-process event source.
///
/// # Example
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use ripple_core::event::Emitter;
///
/// let emitter = Emitter::new();
/// let total = Rc::new(Cell::new(0));
///
/// let subscription = emitter.on({
///     let total = total.clone();
///     move |n: &i32| total.set(total.get() + n)
/// });
///
/// emitter.fire(&2);
/// drop(subscription);
/// emitter.fire(&3);
/// assert_eq!(total.get(), 2);
/// ```
pub struct Emitter<A> {
    inner: Rc<EmitterInner<A>>,
}

impl<A: 'static> Emitter<A> {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(EmitterInner {
                listeners: RefCell::new(IndexMap::new()),
                next_id: Cell::new(0),
            }),
        }
    }

    /// Call every listener registered when the fire started.
    pub fn fire(&self, event: &A) {
        let listeners: Vec<Listener<A>> = self.inner.listeners.borrow().values().cloned().collect();
        for listener in listeners {
            listener(event);
        }
    }

    /// Register a closure listener.
    pub fn on<F>(&self, listener: F) -> Subscription<A>
    where
        F: Fn(&A) + 'static,
    {
        self.listen(Rc::new(listener))
    }

    fn listen(&self, listener: Listener<A>) -> Subscription<A> {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        self.inner.listeners.borrow_mut().insert(id, listener);
        Subscription {
            emitter: Rc::downgrade(&self.inner),
            id: Cell::new(Some(id)),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }
}

impl<A: 'static> Default for Emitter<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> Clone for Emitter<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<A> fmt::Debug for Emitter<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("listeners", &self.inner.listeners.borrow().len())
            .finish()
    }
}

impl<A: 'static> EventSource<A> for Emitter<A> {
    fn subscribe(&self, listener: Listener<A>) -> Box<dyn Disposable> {
        Box::new(self.listen(listener))
    }
}

/// A listener registration. Dropping it unsubscribes.
#[must_use = "the listener is removed as soon as the subscription is dropped"]
pub struct Subscription<A> {
    emitter: Weak<EmitterInner<A>>,
    id: Cell<Option<u64>>,
}

impl<A> Disposable for Subscription<A> {
    fn dispose(&self) {
        let Some(id) = self.id.take() else {
            return;
        };
        if let Some(emitter) = self.emitter.upgrade() {
            emitter.listeners.borrow_mut().shift_remove(&id);
        }
    }
}

impl<A> Drop for Subscription<A> {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disposable::to_disposable;

    #[test]
    fn fire_reaches_every_listener() {
        let emitter: Emitter<u32> = Emitter::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let _a = emitter.on({
            let seen = seen.clone();
            move |n: &u32| seen.borrow_mut().push(("a", *n))
        });
        let _b = emitter.on({
            let seen = seen.clone();
            move |n: &u32| seen.borrow_mut().push(("b", *n))
        });

        emitter.fire(&7);
        assert_eq!(*seen.borrow(), vec![("a", 7), ("b", 7)]);
    }

    #[test]
    fn disposed_subscription_stops_delivery() {
        let emitter: Emitter<()> = Emitter::new();
        let count = Rc::new(Cell::new(0));

        let listener: Listener<()> = Rc::new({
            let count = count.clone();
            move |_: &()| count.set(count.get() + 1)
        });
        let subscription = emitter.subscribe(listener);
        emitter.fire(&());
        subscription.dispose();
        emitter.fire(&());

        assert_eq!(count.get(), 1);
        assert_eq!(emitter.listener_count(), 0);
    }

    #[test]
    fn listener_may_unsubscribe_while_firing() {
        let emitter: Emitter<()> = Emitter::new();
        let slot: Rc<RefCell<Option<Box<dyn Disposable>>>> = Rc::new(RefCell::new(None));
        let count = Rc::new(Cell::new(0));

        let listener: Listener<()> = Rc::new({
            let slot = slot.clone();
            let count = count.clone();
            move |_: &()| {
                count.set(count.get() + 1);
                if let Some(subscription) = slot.borrow_mut().take() {
                    subscription.dispose();
                }
            }
        });
        let subscription = emitter.subscribe(listener);
        *slot.borrow_mut() = Some(subscription);

        emitter.fire(&());
        emitter.fire(&());
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn closures_are_event_sources() {
        let subscribed = Rc::new(Cell::new(false));
        let source = {
            let subscribed = subscribed.clone();
            move |listener: Listener<i32>| -> Box<dyn Disposable> {
                subscribed.set(true);
                listener(&1);
                let subscribed = subscribed.clone();
                Box::new(to_disposable(move || subscribed.set(false)))
            }
        };

        let received = Rc::new(Cell::new(0));
        let listener: Listener<i32> = Rc::new({
            let received = received.clone();
            move |n: &i32| received.set(*n)
        });
        let subscription = source.subscribe(listener);
        assert!(subscribed.get());
        assert_eq!(received.get(), 1);

        subscription.dispose();
        assert!(!subscribed.get());
    }
}
