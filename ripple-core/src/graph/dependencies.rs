//! Dependency sets.
//!
//! A derived value or autorun records every observable it reads. Each run
//! starts by moving the current set aside; whatever is read again moves back,
//! and whatever is left over at the end of the run gets unsubscribed.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::NodeId;
use crate::reactive::ObservableNode;

type Edges = IndexMap<NodeId, Rc<dyn ObservableNode>>;

#[derive(Default)]
pub(crate) struct DependencySet {
    current: RefCell<Edges>,
    /// Dependencies of the previous run not yet read again by this one.
    previous: RefCell<Edges>,
}

impl DependencySet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Start recording a new run.
    pub(crate) fn begin_run(&self) {
        let current = std::mem::take(&mut *self.current.borrow_mut());
        *self.previous.borrow_mut() = current;
    }

    /// Whether `owner` is already subscribed to `id`, in this run or the last.
    pub(crate) fn is_subscribed(&self, id: NodeId) -> bool {
        self.current.borrow().contains_key(&id) || self.previous.borrow().contains_key(&id)
    }

    pub(crate) fn record(&self, node: Rc<dyn ObservableNode>) {
        let id = node.node_id();
        self.previous.borrow_mut().shift_remove(&id);
        self.current.borrow_mut().insert(id, node);
    }

    /// Whether a notification from `id` concerns the dependencies in effect.
    pub(crate) fn is_live(&self, id: NodeId) -> bool {
        self.current.borrow().contains_key(&id) && !self.previous.borrow().contains_key(&id)
    }

    /// Finish a run: unsubscribe `owner` from everything not read again.
    pub(crate) fn finish_run(&self, owner: NodeId) {
        let stale = std::mem::take(&mut *self.previous.borrow_mut());
        for node in stale.values() {
            node.remove_observer(owner);
        }
    }

    /// Unsubscribe `owner` from every dependency.
    pub(crate) fn release_all(&self, owner: NodeId) {
        let current = std::mem::take(&mut *self.current.borrow_mut());
        let previous = std::mem::take(&mut *self.previous.borrow_mut());
        for node in current.values().chain(previous.values()) {
            node.remove_observer(owner);
        }
    }

    pub(crate) fn snapshot(&self) -> SmallVec<[Rc<dyn ObservableNode>; 4]> {
        self.current.borrow().values().cloned().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.current.borrow().len()
    }
}
