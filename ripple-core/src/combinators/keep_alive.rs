//! Keep-alive subscriptions.
//!
//! Derived values and event bridges drop their caches when unobserved. A
//! keep-alive observer holds the observable's subscription open without being
//! a computation itself.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::disposable::Disposable;
use crate::error::{report_bug, ObservableError};
use crate::graph::NodeId;
use crate::reactive::{Observable, ObservableNode, Observer};

type OnSettled = RefCell<Box<dyn FnMut()>>;

struct KeepAliveObserver {
    id: NodeId,
    open_updates: Cell<usize>,
    /// Runs when an update wave reaching the observable has finished.
    on_settled: Option<OnSettled>,
}

impl Observer for KeepAliveObserver {
    fn observer_id(&self) -> NodeId {
        self.id
    }

    fn begin_update(&self, _source: &dyn ObservableNode) {
        self.open_updates.set(self.open_updates.get() + 1);
    }

    fn end_update(&self, source: &dyn ObservableNode) {
        let count = self.open_updates.get();
        if count == 0 {
            report_bug(ObservableError::UnbalancedUpdate {
                observer: format!("keepAlive{:?}", self.id),
                source_name: source.debug_name(),
            });
            return;
        }
        self.open_updates.set(count - 1);

        if count == 1 {
            if let Some(on_settled) = &self.on_settled {
                (&mut *on_settled.borrow_mut())();
            }
        }
    }

    fn handle_possible_change(&self, _source: &dyn ObservableNode) {}

    fn handle_change(&self, _source: &dyn ObservableNode, _change: Option<&dyn Any>) {}
}

/// Holds an observable's subscription open until disposed or dropped.
#[must_use = "the observable is released as soon as the handle is dropped"]
pub struct KeepAliveHandle {
    node: Rc<dyn ObservableNode>,
    observer: Rc<KeepAliveObserver>,
    disposed: Cell<bool>,
}

impl KeepAliveHandle {
    fn attach(node: Rc<dyn ObservableNode>, on_settled: Option<Box<dyn FnMut()>>) -> Self {
        let observer = Rc::new(KeepAliveObserver {
            id: NodeId::new(),
            open_updates: Cell::new(0),
            on_settled: on_settled.map(RefCell::new),
        });
        let as_observer: Rc<dyn Observer> = observer.clone();
        node.add_observer(&as_observer);
        Self {
            node,
            observer,
            disposed: Cell::new(false),
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }
}

impl Disposable for KeepAliveHandle {
    fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        self.node.remove_observer(self.observer.id);
    }
}

impl Drop for KeepAliveHandle {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for KeepAliveHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeepAliveHandle")
            .field("observable", &self.node.debug_name())
            .field("disposed", &self.disposed.get())
            .finish()
    }
}

/// Keep `observable` observed so its cache survives between reads.
///
/// Nothing is computed eagerly; a stale derived value still waits for the
/// next read.
pub fn keep_observed<T, O>(observable: &O) -> KeepAliveHandle
where
    O: Observable<T> + ?Sized,
{
    KeepAliveHandle::attach(observable.as_node(), None)
}

/// Keep `observable` observed and recompute it now and after every update
/// wave that reaches it, passing the value to `handle_value`.
///
/// `handle_value` may see the same value twice when a wave turns out not to
/// change it.
pub fn recompute_initially_and_on_change<T, O, F>(observable: &O, mut handle_value: F) -> KeepAliveHandle
where
    T: 'static,
    O: Observable<T> + Clone + 'static,
    F: FnMut(T) + 'static,
{
    let source = observable.clone();
    let handle = KeepAliveHandle::attach(
        observable.as_node(),
        Some(Box::new(move || handle_value(source.get()))),
    );

    // The first value goes through the same callback.
    if let Some(on_settled) = &handle.observer.on_settled {
        (&mut *on_settled.borrow_mut())();
    }
    handle
}
