//! Observable Values
//!
//! An [`ObservableValue`] is the mutable leaf of the graph. It holds a value
//! and notifies its observers when a `set` actually changes it, as decided by
//! its [`EqualityComparer`].
//!
//! # Notification
//!
//! A changing `set` walks the observer set once. Each observer gets
//! `begin_update` through the transaction (which remembers to send
//! `end_update` later) followed by `handle_change`. Without an explicit
//! transaction the set joins the current one or opens its own.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::graph::{default_debug_name, NodeId, ObserverSet};

use super::{subtransaction, EqualityComparer, Observable, ObservableNode, Observer, Transaction};

/// Options for [`observable_value_opts`].
pub struct ValueOptions<T> {
    pub debug_name: Option<String>,
    pub equality: EqualityComparer<T>,
}

impl<T: PartialEq + 'static> Default for ValueOptions<T> {
    fn default() -> Self {
        Self {
            debug_name: None,
            equality: EqualityComparer::structural(),
        }
    }
}

impl<T: 'static> ValueOptions<T> {
    /// Options with a custom comparator and no `PartialEq` requirement.
    pub fn with_equality(equality: EqualityComparer<T>) -> Self {
        Self {
            debug_name: None,
            equality,
        }
    }

    pub fn debug_name(mut self, name: impl Into<String>) -> Self {
        self.debug_name = Some(name.into());
        self
    }

    pub fn equality(mut self, equality: EqualityComparer<T>) -> Self {
        self.equality = equality;
        self
    }
}

struct ValueInner<T> {
    id: NodeId,
    debug_name: String,
    /// The current value. Always present; values have no lazy state.
    value: RefCell<T>,
    /// A `set` with an equal value is dropped before notifying.
    equality: EqualityComparer<T>,
    observers: ObserverSet,
}

impl<T: 'static> ObservableNode for ValueInner<T> {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn debug_name(&self) -> String {
        self.debug_name.clone()
    }

    fn add_observer(&self, observer: &Rc<dyn Observer>) {
        self.observers.add(observer, || self.debug_name.clone());
    }

    fn remove_observer(&self, observer: NodeId) {
        self.observers.remove(observer, || self.debug_name.clone());
    }

    fn report_changes(&self) {}

    fn observer_count(&self) -> usize {
        self.observers.len()
    }
}

/// A mutable observable cell.
pub struct ObservableValue<T> {
    inner: Rc<ValueInner<T>>,
}

/// Create a value cell compared with `PartialEq`.
pub fn observable_value<T>(name: impl Into<String>, initial: T) -> ObservableValue<T>
where
    T: Clone + PartialEq + 'static,
{
    observable_value_opts(ValueOptions::default().debug_name(name), initial)
}

/// Create a value cell with explicit options.
pub fn observable_value_opts<T>(options: ValueOptions<T>, initial: T) -> ObservableValue<T>
where
    T: Clone + 'static,
{
    let id = NodeId::new();
    let inner = Rc::new(ValueInner {
        id,
        debug_name: options
            .debug_name
            .unwrap_or_else(|| default_debug_name("value", id)),
        value: RefCell::new(initial),
        equality: options.equality,
        observers: ObserverSet::new(),
    });
    ObservableValue { inner }
}

impl<T: Clone + 'static> ObservableValue<T> {
    /// Store `value` and notify observers if it differs from the current one.
    pub fn set(&self, value: T, tx: Option<&Transaction>) {
        let unchanged = self.inner.equality.equals(&self.inner.value.borrow(), &value);
        if unchanged {
            return;
        }
        self.replace(value, tx, None);
    }

    /// Store `value` and notify observers with a change payload.
    ///
    /// The payload counts as a change even if the value compares equal.
    pub fn set_with_change<C: Any>(&self, value: T, tx: Option<&Transaction>, change: C) {
        self.replace(value, tx, Some(&change));
    }

    /// Set the value computed from the current one.
    pub fn update<F>(&self, f: F, tx: Option<&Transaction>)
    where
        F: FnOnce(&T) -> T,
    {
        let value = f(&self.inner.value.borrow());
        self.set(value, tx);
    }

    fn replace(&self, value: T, tx: Option<&Transaction>, change: Option<&dyn Any>) {
        tracing::trace!(observable = %self.inner.debug_name, "setting value");
        *self.inner.value.borrow_mut() = value;

        let node: Rc<dyn ObservableNode> = self.inner.clone();
        subtransaction(tx, |tx| {
            for observer in self.inner.observers.snapshot() {
                tx.update_observer(&observer, &node);
                observer.handle_change(&*node, change);
            }
        });
    }

    pub fn observer_count(&self) -> usize {
        self.inner.observers.len()
    }
}

impl<T: Clone + 'static> Observable<T> for ObservableValue<T> {
    fn get(&self) -> T {
        self.inner.value.borrow().clone()
    }

    fn as_node(&self) -> Rc<dyn ObservableNode> {
        self.inner.clone()
    }
}

impl<T> Clone for ObservableValue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ObservableValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableValue")
            .field("name", &self.inner.debug_name)
            .field("value", &self.inner.value.borrow())
            .field("observers", &self.inner.observers.len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
