//! Observables
//!
//! [`ObservableNode`] is the type-erased side of an observable: identity,
//! observer registration and change reporting. The graph stores dependencies
//! as `Rc<dyn ObservableNode>` so a derived value can depend on observables of
//! any value type.
//!
//! [`Observable<T>`] adds the typed read operations on top.

use std::fmt;
use std::rc::Rc;

use crate::graph::{default_debug_name, NodeId, ObserverSet};

use super::{Observer, Reader};

/// Type-erased view of an observable.
pub trait ObservableNode {
    fn node_id(&self) -> NodeId;

    fn debug_name(&self) -> String;

    /// Register `observer`. The first registration activates the observable.
    fn add_observer(&self, observer: &Rc<dyn Observer>);

    /// Unregister an observer. The last removal releases the observable.
    fn remove_observer(&self, observer: NodeId);

    /// Bring the value up to date, notifying observers if it changed.
    ///
    /// Leaves have nothing to do. Derived values recompute if stale.
    fn report_changes(&self);

    fn observer_count(&self) -> usize;
}

/// A value that can be read, with or without dependency tracking.
pub trait Observable<T> {
    /// Current value, without recording a dependency.
    fn get(&self) -> T;

    fn as_node(&self) -> Rc<dyn ObservableNode>;

    /// Current value, recording a dependency on `reader`'s owner.
    fn read(&self, reader: &Reader<'_>) -> T {
        reader.read_node(self.as_node(), || self.get())
    }

    fn node_id(&self) -> NodeId {
        self.as_node().node_id()
    }

    fn debug_name(&self) -> String {
        self.as_node().debug_name()
    }
}

/// Decides whether a new value counts as a change.
pub struct EqualityComparer<T> {
    equals: Rc<dyn Fn(&T, &T) -> bool>,
}

impl<T: 'static> EqualityComparer<T> {
    /// Compare with `PartialEq`.
    pub fn structural() -> Self
    where
        T: PartialEq,
    {
        Self::custom(|a: &T, b: &T| a == b)
    }

    /// Every new value is a change. Useful for manual invalidation.
    pub fn always_different() -> Self {
        Self::custom(|_: &T, _: &T| false)
    }

    pub fn custom<F>(equals: F) -> Self
    where
        F: Fn(&T, &T) -> bool + 'static,
    {
        Self {
            equals: Rc::new(equals),
        }
    }
}

impl<T> EqualityComparer<T> {
    pub fn equals(&self, a: &T, b: &T) -> bool {
        (self.equals)(a, b)
    }
}

impl<T: PartialEq + 'static> Default for EqualityComparer<T> {
    fn default() -> Self {
        Self::structural()
    }
}

impl<T> Clone for EqualityComparer<T> {
    fn clone(&self) -> Self {
        Self {
            equals: Rc::clone(&self.equals),
        }
    }
}

impl<T> fmt::Debug for EqualityComparer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EqualityComparer")
    }
}

// ----------------------------------------------------------------------------
// Constant observable
// ----------------------------------------------------------------------------

struct ConstInner<T> {
    id: NodeId,
    value: T,
    observers: ObserverSet,
}

impl<T> ObservableNode for ConstInner<T> {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn debug_name(&self) -> String {
        default_debug_name("const", self.id)
    }

    fn add_observer(&self, observer: &Rc<dyn Observer>) {
        self.observers.add(observer, || self.debug_name());
    }

    fn remove_observer(&self, observer: NodeId) {
        self.observers.remove(observer, || self.debug_name());
    }

    fn report_changes(&self) {}

    fn observer_count(&self) -> usize {
        self.observers.len()
    }
}

/// An observable that never changes.
pub struct ConstObservable<T> {
    inner: Rc<ConstInner<T>>,
}

/// Create an observable that always holds `value`.
pub fn const_observable<T: Clone + 'static>(value: T) -> ConstObservable<T> {
    ConstObservable {
        inner: Rc::new(ConstInner {
            id: NodeId::new(),
            value,
            observers: ObserverSet::new(),
        }),
    }
}

impl<T: Clone + 'static> Observable<T> for ConstObservable<T> {
    fn get(&self) -> T {
        self.inner.value.clone()
    }

    fn as_node(&self) -> Rc<dyn ObservableNode> {
        self.inner.clone()
    }
}

impl<T> Clone for ConstObservable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ConstObservable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstObservable")
            .field("value", &self.inner.value)
            .finish()
    }
}
