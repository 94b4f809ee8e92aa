//! Signal Implementation
//!
//! An [`ObservableSignal`] holds no value. Every `trigger` notifies its
//! observers unconditionally, with no equality check. Reading a signal inside
//! a derived value or autorun makes it a dependency, so triggering the signal
//! forces a recompute even when nothing else changed.
//!
//! A trigger can also carry a change payload, for observers that handle
//! structured diffs instead of recomputing from scratch.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::graph::{NodeId, ObserverSet};

use super::{subtransaction, Observable, ObservableNode, Observer, Transaction};

struct SignalInner {
    id: NodeId,
    debug_name: String,
    observers: ObserverSet,
}

impl ObservableNode for SignalInner {
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

/// A value-less observable used for invalidation.
#[derive(Clone)]
pub struct ObservableSignal {
    inner: Rc<SignalInner>,
}

/// Create a signal.
pub fn observable_signal(name: impl Into<String>) -> ObservableSignal {
    ObservableSignal {
        inner: Rc::new(SignalInner {
            id: NodeId::new(),
            debug_name: name.into(),
            observers: ObserverSet::new(),
        }),
    }
}

impl ObservableSignal {
    /// Notify every observer.
    pub fn trigger(&self, tx: Option<&Transaction>) {
        self.notify(tx, None);
    }

    /// Notify every observer, handing them `change`.
    pub fn trigger_with_change<C: Any>(&self, tx: Option<&Transaction>, change: C) {
        self.notify(tx, Some(&change));
    }

    fn notify(&self, tx: Option<&Transaction>, change: Option<&dyn Any>) {
        tracing::trace!(signal = %self.inner.debug_name, "triggering signal");

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

impl Observable<()> for ObservableSignal {
    fn get(&self) {}

    fn as_node(&self) -> Rc<dyn ObservableNode> {
        self.inner.clone()
    }
}

impl fmt::Debug for ObservableSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableSignal")
            .field("name", &self.inner.debug_name)
            .field("observers", &self.inner.observers.len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
