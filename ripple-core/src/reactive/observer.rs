//! The observer protocol.
//!
//! An observable talks to its dependents only through [`Observer`]. Every
//! change wave looks the same from an observer's point of view:
//!
//! 1. `begin_update(source)` - something upstream is about to change.
//! 2. Any number of `handle_possible_change(source)` (an upstream derived
//!    *might* produce a new value) and `handle_change(source, change)` (the
//!    source definitely changed).
//! 3. `end_update(source)` - the wave from `source` is complete.
//!
//! Calls 1 and 3 are paired per source and nest like a stack. An observer
//! must not recompute before its open-update counter returns to zero: that is
//! what keeps a node with two paths to the same root from seeing one path
//! updated and the other not.

use std::any::Any;

use crate::graph::NodeId;

use super::ObservableNode;

/// Something that depends on observables.
///
/// Implemented by derived values, autoruns and keep-alive observers.
pub trait Observer {
    /// Identity used for registration in observer sets.
    fn observer_id(&self) -> NodeId;

    /// `source` starts an update wave.
    fn begin_update(&self, source: &dyn ObservableNode);

    /// `source` finished its update wave.
    fn end_update(&self, source: &dyn ObservableNode);

    /// `source` might have changed; pull it to find out.
    fn handle_possible_change(&self, source: &dyn ObservableNode);

    /// `source` changed. `change` carries an optional structured payload.
    fn handle_change(&self, source: &dyn ObservableNode, change: Option<&dyn Any>);
}
