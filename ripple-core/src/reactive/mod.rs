//! Reactive Primitives
//!
//! This module implements the observable graph: values, derived values,
//! autoruns and the transactions that batch their updates.
//!
//! # Concepts
//!
//! ## Observable values
//!
//! An [`ObservableValue`] is a container for mutable state. Reading it through
//! a [`Reader`] inside a derived value or autorun subscribes the reader's
//! owner. A `set` that changes the value notifies every observer.
//!
//! ## Derived values
//!
//! A [`Derived`] value caches the result of a computation over other
//! observables. It is lazy: a change only marks it, and it recomputes on the
//! next read. If the new result equals the old one, dependents are not
//! notified.
//!
//! ## Autoruns
//!
//! An [`autorun`] is a side-effecting computation that re-runs when something
//! it read changes, once per transaction.
//!
//! # Implementation Notes
//!
//! Dependencies are tracked explicitly. Every computation receives a
//! [`Reader`] and reads through it, so there is no hidden "current observer"
//! global. The only thread-local state is the current transaction.
//!
//! Propagation is push-then-pull. A change pushes `begin_update` and
//! "possibly changed" marks down the graph; when the transaction ends,
//! autoruns pull their dependencies, which recompute only if one of their own
//! dependencies really changed. This keeps diamonds glitch-free: a node with
//! two paths to the same root recomputes once, after both paths settled.

mod autorun;
mod context;
mod derived;
mod from_event;
mod observable;
mod observer;
mod reader;
mod signal;
mod transaction;
mod value;

pub use autorun::{
    autorun, autorun_handle_changes, autorun_opts, autorun_with_store, AutorunHandle,
    AutorunOptions, ChangeContext,
};
pub use context::current_transaction;
pub use derived::{derived, derived_opts, Derived, DerivedOptions, DerivedState};
pub use from_event::{observable_from_event, observable_from_event_opts, FromEventObservable};
pub use observable::{const_observable, ConstObservable, EqualityComparer, Observable, ObservableNode};
pub use observer::Observer;
pub use reader::Reader;
pub use signal::{observable_signal, ObservableSignal};
pub use transaction::{
    async_transaction, batch_events_globally, subtransaction, transaction, transaction_with,
    Transaction,
};
pub use value::{observable_value, observable_value_opts, ObservableValue, ValueOptions};

pub use crate::combinators::{keep_observed, recompute_initially_and_on_change, KeepAliveHandle};
