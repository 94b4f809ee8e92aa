//! Dependency Graph Bookkeeping
//!
//! The graph has no central registry. Each node owns its half of every edge:
//!
//! - An observable owns an [`ObserverSet`]: weak references to the observers
//!   that must be notified when it changes.
//! - A derived value or autorun owns a [`DependencySet`]: strong references to
//!   the observables it read during its last run.
//!
//! Strong edges point from consumer to dependency, so dropping the last
//! consumer of a subgraph releases it. Weak edges point back, so an observer
//! that was dropped without unsubscribing is simply skipped.

mod dependencies;
mod node;
mod observers;

pub use node::NodeId;

pub(crate) use dependencies::DependencySet;
pub(crate) use node::default_debug_name;
pub(crate) use observers::ObserverSet;
