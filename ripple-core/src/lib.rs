//! Ripple Core
//!
//! This crate provides an in-process observable graph. It implements:
//!
//! - Observable values, derived values and autoruns
//! - Transactions that batch updates into one propagation wave
//! - Glitch-free, lazy recomputation with equality cutoff
//! - Bridges from external events and timers into the graph
//! - Combinators: debounce, keep-alive, keyed array mapping, writable caches
//!
//! The graph is single-threaded. Handles are `Rc`-based and every update runs
//! synchronously on the stack of the `set` (or `trigger`, or read) that caused
//! it.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: the observable protocol and its primitives
//! - `graph`: node identity and per-node edge bookkeeping
//! - `combinators`: observables assembled from the primitives
//! - `event`: external event sources
//! - `timer`: timers for time-based combinators
//! - `disposable`: scoped resource release
//! - `error`: protocol violations and bug reporting
//!
//! # Example
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use ripple_core::reactive::{autorun, derived, observable_value, transaction, Observable};
//!
//! // Create a value
//! let count = observable_value("count", 1);
//!
//! // Create a derived value
//! let doubled = derived({
//!     let count = count.clone();
//!     move |r| count.read(r) * 2
//! });
//!
//! // Create an autorun
//! let log = Rc::new(RefCell::new(Vec::new()));
//! let _autorun = autorun({
//!     let (count, doubled, log) = (count.clone(), doubled.clone(), log.clone());
//!     move |r| log.borrow_mut().push((count.read(r), doubled.read(r)))
//! });
//!
//! // Batch two updates; the autorun runs once
//! transaction(|tx| {
//!     count.set(2, Some(tx));
//!     count.set(5, Some(tx));
//! });
//! assert_eq!(*log.borrow(), vec![(1, 2), (5, 10)]);
//! ```

pub mod combinators;
pub mod disposable;
pub mod error;
pub mod event;
pub mod graph;
pub mod reactive;
pub mod timer;
