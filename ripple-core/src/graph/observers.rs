//! Observer sets.
//!
//! An observable keeps its observers as weak references keyed by [`NodeId`].
//! The empty/non-empty transitions are reported back to the caller so it can
//! activate or release whatever the observers were keeping alive.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::NodeId;
use crate::error::{report_bug, ObservableError};
use crate::reactive::Observer;

/// Snapshot of live observers, taken before notifying them.
pub(crate) type ObserverList = SmallVec<[Rc<dyn Observer>; 4]>;

#[derive(Default)]
pub(crate) struct ObserverSet {
    observers: RefCell<IndexMap<NodeId, Weak<dyn Observer>>>,
}

impl ObserverSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register `observer`. Returns `true` on the empty to non-empty transition.
    ///
    /// Registering the same observer twice is reported and ignored.
    pub(crate) fn add(&self, observer: &Rc<dyn Observer>, owner: impl FnOnce() -> String) -> bool {
        let id = observer.observer_id();
        let mut observers = self.observers.borrow_mut();
        if observers.contains_key(&id) {
            drop(observers);
            report_bug(ObservableError::DuplicateObserver {
                observable: owner(),
                observer: id,
            });
            return false;
        }
        let was_empty = observers.is_empty();
        observers.insert(id, Rc::downgrade(observer));
        was_empty
    }

    /// Unregister `observer`. Returns `true` on the non-empty to empty transition.
    ///
    /// Removing an observer that is not registered is reported and ignored.
    pub(crate) fn remove(&self, observer: NodeId, owner: impl FnOnce() -> String) -> bool {
        let mut observers = self.observers.borrow_mut();
        if observers.shift_remove(&observer).is_none() {
            drop(observers);
            report_bug(ObservableError::ObserverNotRegistered {
                observable: owner(),
                observer,
            });
            return false;
        }
        observers.is_empty()
    }

    pub(crate) fn contains(&self, observer: NodeId) -> bool {
        self.observers.borrow().contains_key(&observer)
    }

    pub(crate) fn get(&self, observer: NodeId) -> Option<Rc<dyn Observer>> {
        self.observers.borrow().get(&observer).and_then(Weak::upgrade)
    }

    pub(crate) fn len(&self) -> usize {
        self.observers.borrow().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.observers.borrow().is_empty()
    }

    /// Live observers, in registration order.
    ///
    /// Callers iterate the snapshot so observers may subscribe or unsubscribe
    /// while being notified.
    pub(crate) fn snapshot(&self) -> ObserverList {
        self.observers
            .borrow()
            .values()
            .filter_map(Weak::upgrade)
            .collect()
    }
}
