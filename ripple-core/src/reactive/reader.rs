//! Reader
//!
//! A [`Reader`] is handed to every derived computation and autorun body. Each
//! `observable.read(reader)` subscribes the reader's owner to the observable
//! and records the edge in the owner's dependency set. When the run ends the
//! owner diffs the recorded set against the previous run.
//!
//! A reader lives for exactly one run. Its lifetime parameter ties it to the
//! dependency set being filled, so it cannot escape the closure it was given
//! to.

use std::rc::Rc;

use crate::error::{catch, resume};
use crate::graph::DependencySet;

use super::{Observable, ObservableNode, Observer};

/// Dependency-recording context for one computation run.
pub struct Reader<'a> {
    owner: Option<Owner<'a>>,
}

struct Owner<'a> {
    observer: Rc<dyn Observer>,
    dependencies: &'a DependencySet,
}

impl<'a> Reader<'a> {
    pub(crate) fn tracking(observer: Rc<dyn Observer>, dependencies: &'a DependencySet) -> Self {
        Self {
            owner: Some(Owner {
                observer,
                dependencies,
            }),
        }
    }

    /// A reader that records nothing. Reads through it behave like `get()`.
    pub fn untracked() -> Reader<'static> {
        Reader { owner: None }
    }

    /// Read `observable`, recording the dependency.
    pub fn read<T, O>(&self, observable: &O) -> T
    where
        O: Observable<T> + ?Sized,
    {
        observable.read(self)
    }

    pub fn is_tracking(&self) -> bool {
        self.owner.is_some()
    }

    /// Subscribe, read, then record.
    ///
    /// Subscribing first means a derived dependency sees an observer while it
    /// computes, so it caches the result instead of computing throwaway. The
    /// edge is recorded even when the read panics, so the subscription made
    /// here is always released through the dependency set.
    pub(crate) fn read_node<T>(&self, node: Rc<dyn ObservableNode>, get: impl FnOnce() -> T) -> T {
        let Some(owner) = &self.owner else {
            return get();
        };

        if !owner.dependencies.is_subscribed(node.node_id()) {
            node.add_observer(&owner.observer);
        }
        let result = catch(get);
        owner.dependencies.record(node);
        match result {
            Ok(value) => value,
            Err(payload) => resume(payload),
        }
    }
}

impl std::fmt::Debug for Reader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reader")
            .field(
                "owner",
                &self.owner.as_ref().map(|owner| owner.observer.observer_id()),
            )
            .finish()
    }
}
