//! Event Bridge
//!
//! [`observable_from_event`] turns an external [`EventSource`] into an
//! observable. The source is only subscribed while the bridge has observers:
//!
//! - The first observer subscribes. The value is computed lazily on the first
//!   read after that and cached.
//! - Each event recomputes the value. If it changed, observers are notified in
//!   the current transaction or a new one.
//! - The last observer leaving unsubscribes and drops the cache.
//!
//! An unobserved bridge computes a fresh value on every read.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::disposable::Disposable;
use crate::event::{EventSource, Listener};
use crate::graph::{default_debug_name, NodeId, ObserverSet};

use super::{transaction, EqualityComparer, Observable, ObservableNode, Observer, ValueOptions};

type GetValue<T, A> = Box<dyn Fn(Option<&A>) -> T>;

struct FromEventInner<T, A> {
    id: NodeId,
    self_ref: Weak<FromEventInner<T, A>>,
    debug_name: String,
    source: Box<dyn EventSource<A>>,
    /// Maps an event (or `None` for the initial read) to the current value.
    get_value: GetValue<T, A>,
    /// Events producing an equal value are dropped.
    equality: EqualityComparer<T>,
    /// Last value seen; only kept while observed.
    value: RefCell<Option<T>>,
    /// The listener registration, held while observed.
    subscription: RefCell<Option<Box<dyn Disposable>>>,
    observers: ObserverSet,
}

impl<T: Clone + 'static, A: 'static> FromEventInner<T, A> {
    fn handle_event(&self, event: Option<&A>) {
        let new_value = (self.get_value)(event);

        let had_value = {
            let current = self.value.borrow();
            match current.as_ref() {
                Some(old) if self.equality.equals(old, &new_value) => return,
                Some(_) => true,
                None => false,
            }
        };
        *self.value.borrow_mut() = Some(new_value);

        // The first value is not a change; nobody has read anything yet.
        if !had_value {
            return;
        }
        tracing::trace!(observable = %self.debug_name, "event changed value");

        let Some(this) = self.self_ref.upgrade() else {
            return;
        };
        let node: Rc<dyn ObservableNode> = this;
        transaction(|tx| {
            for observer in self.observers.snapshot() {
                tx.update_observer(&observer, &node);
                observer.handle_change(&*node, None);
            }
        });
    }

    fn subscribe(&self) {
        tracing::debug!(observable = %self.debug_name, "subscribing to event source");

        let weak = self.self_ref.clone();
        let listener: Listener<A> = Rc::new(move |event: &A| {
            if let Some(this) = weak.upgrade() {
                this.handle_event(Some(event));
            }
        });
        let subscription = self.source.subscribe(listener);
        *self.subscription.borrow_mut() = Some(subscription);
    }

    fn unsubscribe(&self) {
        tracing::debug!(observable = %self.debug_name, "releasing event source");

        let subscription = self.subscription.borrow_mut().take();
        if let Some(subscription) = subscription {
            subscription.dispose();
        }
        self.value.borrow_mut().take();
    }

    fn get(&self) -> T {
        if self.observers.is_empty() {
            return (self.get_value)(None);
        }
        if self.value.borrow().is_none() {
            self.handle_event(None);
        }
        match self.value.borrow().as_ref() {
            Some(value) => value.clone(),
            None => (self.get_value)(None),
        }
    }
}

impl<T: Clone + 'static, A: 'static> ObservableNode for FromEventInner<T, A> {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn debug_name(&self) -> String {
        self.debug_name.clone()
    }

    fn add_observer(&self, observer: &Rc<dyn Observer>) {
        if self.observers.add(observer, || self.debug_name.clone()) {
            self.subscribe();
        }
    }

    fn remove_observer(&self, observer: NodeId) {
        if self.observers.remove(observer, || self.debug_name.clone()) {
            self.unsubscribe();
        }
    }

    fn report_changes(&self) {}

    fn observer_count(&self) -> usize {
        self.observers.len()
    }
}

/// An observable fed by an external event source.
pub struct FromEventObservable<T, A> {
    inner: Rc<FromEventInner<T, A>>,
}

/// Bridge `source` into the graph. `get_value` receives the event payload,
/// or `None` when the value is needed outside an event.
///
/// # Example
///
/// ```rust
/// use ripple_core::event::Emitter;
/// use ripple_core::reactive::{autorun, observable_from_event, Observable};
///
/// let resized = Emitter::new();
/// let width = observable_from_event(resized.clone(), |event: Option<&u32>| {
///     event.copied().unwrap_or(800)
/// });
///
/// let _log = autorun({
///     let width = width.clone();
///     move |r| println!("width is {}", width.read(r))
/// });
/// resized.fire(&1024);
/// assert_eq!(width.get(), 1024);
/// ```
pub fn observable_from_event<T, A, S, F>(source: S, get_value: F) -> FromEventObservable<T, A>
where
    T: Clone + PartialEq + 'static,
    A: 'static,
    S: EventSource<A> + 'static,
    F: Fn(Option<&A>) -> T + 'static,
{
    observable_from_event_opts(ValueOptions::default(), source, get_value)
}

pub fn observable_from_event_opts<T, A, S, F>(
    options: ValueOptions<T>,
    source: S,
    get_value: F,
) -> FromEventObservable<T, A>
where
    T: Clone + 'static,
    A: 'static,
    S: EventSource<A> + 'static,
    F: Fn(Option<&A>) -> T + 'static,
{
    let inner = Rc::new_cyclic(|self_ref| {
        let id = NodeId::new();
        FromEventInner {
            id,
            self_ref: self_ref.clone(),
            debug_name: options
                .debug_name
                .unwrap_or_else(|| default_debug_name("fromEvent", id)),
            source: Box::new(source),
            get_value: Box::new(get_value),
            equality: options.equality,
            value: RefCell::new(None),
            subscription: RefCell::new(None),
            observers: ObserverSet::new(),
        }
    });
    FromEventObservable { inner }
}

impl<T: Clone + 'static, A: 'static> FromEventObservable<T, A> {
    /// Whether the event source is currently subscribed.
    pub fn is_subscribed(&self) -> bool {
        self.inner.subscription.borrow().is_some()
    }

    pub fn observer_count(&self) -> usize {
        self.inner.observers.len()
    }
}

impl<T: Clone + 'static, A: 'static> Observable<T> for FromEventObservable<T, A> {
    fn get(&self) -> T {
        self.inner.get()
    }

    fn as_node(&self) -> Rc<dyn ObservableNode> {
        self.inner.clone()
    }
}

impl<T, A> Clone for FromEventObservable<T, A> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T, A> fmt::Debug for FromEventObservable<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FromEventObservable")
            .field("name", &self.inner.debug_name)
            .field("observers", &self.inner.observers.len())
            .field("subscribed", &self.inner.subscription.borrow().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Emitter;
    use crate::reactive::{autorun, batch_events_globally, keep_observed, Transaction};
    use std::cell::Cell;

    fn counted_bridge(
        emitter: &Emitter<i32>,
    ) -> (FromEventObservable<i32, i32>, Rc<Cell<u32>>) {
        let computes = Rc::new(Cell::new(0));
        let bridge = observable_from_event(emitter.clone(), {
            let computes = computes.clone();
            move |event: Option<&i32>| {
                computes.set(computes.get() + 1);
                event.copied().unwrap_or(0)
            }
        });
        (bridge, computes)
    }

    #[test]
    fn unobserved_bridge_does_not_subscribe() {
        let emitter = Emitter::new();
        let (bridge, computes) = counted_bridge(&emitter);

        assert_eq!(bridge.get(), 0);
        assert_eq!(bridge.get(), 0);
        assert_eq!(computes.get(), 2);
        assert!(!bridge.is_subscribed());
        assert_eq!(emitter.listener_count(), 0);
    }

    #[test]
    fn observed_bridge_caches_until_next_event() {
        let emitter = Emitter::new();
        let (bridge, computes) = counted_bridge(&emitter);
        let keep = keep_observed(&bridge);

        assert!(bridge.is_subscribed());
        assert_eq!(computes.get(), 0);

        assert_eq!(bridge.get(), 0);
        assert_eq!(bridge.get(), 0);
        assert_eq!(computes.get(), 1);

        emitter.fire(&4);
        assert_eq!(bridge.get(), 4);
        assert_eq!(computes.get(), 2);

        drop(keep);
        assert!(!bridge.is_subscribed());
        assert_eq!(emitter.listener_count(), 0);
    }

    #[test]
    fn events_rerun_autoruns_only_when_value_changes() {
        let emitter = Emitter::new();
        let parity = observable_from_event(emitter.clone(), |event: Option<&i32>| {
            event.copied().unwrap_or(0) % 2
        });
        let seen = Rc::new(RefCell::new(Vec::new()));

        let _autorun = autorun({
            let parity = parity.clone();
            let seen = seen.clone();
            move |r| seen.borrow_mut().push(parity.read(r))
        });

        emitter.fire(&2);
        emitter.fire(&3);
        emitter.fire(&5);
        emitter.fire(&6);
        assert_eq!(*seen.borrow(), vec![0, 1, 0]);
    }

    #[test]
    fn batched_events_notify_once() {
        let first = Emitter::new();
        let second = Emitter::new();
        let a = observable_from_event(first.clone(), |e: Option<&i32>| e.copied().unwrap_or(0));
        let b = observable_from_event(second.clone(), |e: Option<&i32>| e.copied().unwrap_or(0));
        let sums = Rc::new(RefCell::new(Vec::new()));

        let _autorun = autorun({
            let (a, b, sums) = (a.clone(), b.clone(), sums.clone());
            move |r| sums.borrow_mut().push(a.read(r) + b.read(r))
        });

        let tx = Transaction::new(None);
        batch_events_globally(&tx, || {
            first.fire(&1);
            second.fire(&10);
        });
        assert_eq!(*sums.borrow(), vec![0]);

        tx.finish();
        assert_eq!(*sums.borrow(), vec![0, 11]);
    }

    #[test]
    fn resubscribing_recomputes_fresh() {
        let emitter = Emitter::new();
        let (bridge, _computes) = counted_bridge(&emitter);

        let keep = keep_observed(&bridge);
        emitter.fire(&3);
        assert_eq!(bridge.get(), 3);
        drop(keep);

        let _keep = keep_observed(&bridge);
        assert_eq!(bridge.get(), 0);
    }
}
