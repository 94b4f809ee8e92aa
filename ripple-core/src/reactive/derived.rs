//! Derived Implementation
//!
//! A [`Derived`] is a cached value computed from other observables. It is an
//! observable to its consumers and an observer of its dependencies.
//!
//! # How Derived Values Work
//!
//! 1. Nothing is computed until the first read.
//!
//! 2. While unobserved, every read computes from scratch and caches nothing.
//!    Without observers nobody would tell the cache it went stale.
//!
//! 3. While observed, the value is cached. A dependency starting an update
//!    moves the node to `DependenciesMightHaveChanged` and forwards a single
//!    `begin_update` downstream; a dependency that definitely changed moves it
//!    to `Stale`.
//!
//! 4. On the next read (or when a downstream autorun pulls it at the end of a
//!    transaction) a possibly-changed node first asks its dependencies to
//!    report their changes. If none of them actually changed it goes back to
//!    `UpToDate` without recomputing.
//!
//! 5. A recompute runs the function with a fresh [`Reader`], unsubscribes from
//!    dependencies it no longer read, and notifies observers only if the
//!    result differs under the node's equality comparer.
//!
//! 6. When the last observer leaves, all dependencies are released and the
//!    cache is dropped. A later read starts over.
//!
//! # Why Diamonds Are Glitch-Free
//!
//! `begin_update` calls are counted. A node reached by two paths from the same
//! root sees two `begin_update`s and only forwards its own `end_update` once
//! both paths have ended. Downstream autoruns only pull at that point, so the
//! node is never computed against a half-updated view.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::error::{catch, report_bug, resume, ObservableError};
use crate::graph::{default_debug_name, DependencySet, NodeId, ObserverSet};

use super::{EqualityComparer, Observable, ObservableNode, Observer, Reader};

/// Cache state of a derived value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivedState {
    /// Never computed, or released after losing its observers.
    Initial,

    /// A dependency started an update. It may or may not have changed.
    DependenciesMightHaveChanged,

    /// A dependency definitely changed. Must recompute.
    Stale,

    /// The cached value is current.
    UpToDate,
}

/// Options for [`derived_opts`].
pub struct DerivedOptions<T> {
    pub debug_name: Option<String>,
    pub equality: EqualityComparer<T>,
    /// Runs whenever the derived value releases its cache.
    pub on_last_observer_removed: Option<Box<dyn Fn()>>,
}

impl<T: PartialEq + 'static> Default for DerivedOptions<T> {
    fn default() -> Self {
        Self::with_equality(EqualityComparer::structural())
    }
}

impl<T: 'static> DerivedOptions<T> {
    /// Options with a custom comparator and no `PartialEq` requirement.
    pub fn with_equality(equality: EqualityComparer<T>) -> Self {
        Self {
            debug_name: None,
            equality,
            on_last_observer_removed: None,
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

    pub fn on_last_observer_removed<F>(mut self, callback: F) -> Self
    where
        F: Fn() + 'static,
    {
        self.on_last_observer_removed = Some(Box::new(callback));
        self
    }
}

type ComputeFn<T> = Box<dyn Fn(&Reader<'_>) -> T>;

struct DerivedInner<T> {
    /// Identity as both an observable and an observer.
    id: NodeId,
    /// Handed to readers so dependencies can hold this node as an observer.
    self_ref: Weak<DerivedInner<T>>,
    debug_name: String,
    compute: ComputeFn<T>,
    /// Decides whether a recompute is a change worth reporting.
    equality: EqualityComparer<T>,
    on_last_observer_removed: Option<Box<dyn Fn()>>,

    state: Cell<DerivedState>,
    /// Cached result; only present while observed.
    value: RefCell<Option<T>>,
    /// Open `begin_update` calls not yet matched by `end_update`.
    update_count: Cell<usize>,
    /// Set while `compute` runs; a read in that window is a cycle.
    computing: Cell<bool>,

    /// Observables read by the last compute.
    dependencies: DependencySet,
    observers: ObserverSet,
}

impl<T: Clone + 'static> DerivedInner<T> {
    fn get(&self) -> T {
        if self.computing.get() {
            let error = ObservableError::Cycle {
                derived: self.debug_name.clone(),
            };
            report_bug(error.clone());
            panic!("{error}");
        }

        if self.observers.is_empty() {
            return self.compute_unobserved();
        }

        self.update_if_needed();
        self.value
            .borrow()
            .clone()
            .expect("up-to-date derived should have a value")
    }

    fn compute_unobserved(&self) -> T {
        self.computing.set(true);
        let result = catch(|| (self.compute)(&Reader::untracked()));
        self.computing.set(false);
        self.release();

        match result {
            Ok(value) => value,
            Err(payload) => resume(payload),
        }
    }

    fn update_if_needed(&self) {
        loop {
            if self.state.get() == DerivedState::DependenciesMightHaveChanged {
                for dependency in self.dependencies.snapshot() {
                    dependency.report_changes();
                    if self.state.get() == DerivedState::Stale {
                        break;
                    }
                }
            }

            if self.state.get() == DerivedState::DependenciesMightHaveChanged {
                self.state.set(DerivedState::UpToDate);
            }

            self.recompute_if_needed();

            if self.state.get() == DerivedState::UpToDate {
                break;
            }
        }
    }

    fn recompute_if_needed(&self) {
        let state = self.state.get();
        if state == DerivedState::UpToDate {
            return;
        }
        let had_value = state != DerivedState::Initial;

        self.dependencies.begin_run();
        self.state.set(DerivedState::UpToDate);
        self.computing.set(true);
        let result = match self.self_ref.upgrade() {
            Some(this) => {
                let reader = Reader::tracking(this, &self.dependencies);
                catch(|| (self.compute)(&reader))
            }
            None => catch(|| (self.compute)(&Reader::untracked())),
        };
        self.computing.set(false);
        self.dependencies.finish_run(self.id);

        let new_value = match result {
            Ok(value) => value,
            // Observers already saw the failure, so the next successful
            // compute counts as a change even without an old value.
            Err(payload) => {
                self.state.set(DerivedState::Stale);
                resume(payload);
            }
        };

        let changed = had_value
            && match self.value.borrow().as_ref() {
                Some(old) => !self.equality.equals(old, &new_value),
                None => true,
            };
        let previous = self.value.replace(Some(new_value));
        drop(previous);

        tracing::trace!(derived = %self.debug_name, changed, "recomputed derived value");

        if changed {
            for observer in self.observers.snapshot() {
                observer.handle_change(self, None);
            }
        }
    }

    /// Drop the cache and every dependency edge.
    fn release(&self) {
        self.state.set(DerivedState::Initial);
        let previous = self.value.borrow_mut().take();
        drop(previous);
        self.dependencies.release_all(self.id);

        if let Some(callback) = &self.on_last_observer_removed {
            callback();
        }
    }
}

impl<T: Clone + 'static> ObservableNode for DerivedInner<T> {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn debug_name(&self) -> String {
        self.debug_name.clone()
    }

    fn add_observer(&self, observer: &Rc<dyn Observer>) {
        let joins_update =
            !self.observers.contains(observer.observer_id()) && self.update_count.get() > 0;
        self.observers.add(observer, || self.debug_name.clone());

        // A late observer still gets a balanced begin/end pair.
        if joins_update {
            observer.begin_update(self);
        }
    }

    fn remove_observer(&self, observer: NodeId) {
        let leaving_update = if self.update_count.get() > 0 {
            self.observers.get(observer)
        } else {
            None
        };

        if self.observers.remove(observer, || self.debug_name.clone()) {
            tracing::trace!(derived = %self.debug_name, "last observer removed");
            self.release();
        }

        if let Some(observer) = leaving_update {
            observer.end_update(self);
        }
    }

    fn report_changes(&self) {
        if !self.observers.is_empty() {
            self.update_if_needed();
        }
    }

    fn observer_count(&self) -> usize {
        self.observers.len()
    }
}

impl<T: Clone + 'static> Observer for DerivedInner<T> {
    fn observer_id(&self) -> NodeId {
        self.id
    }

    fn begin_update(&self, _source: &dyn ObservableNode) {
        let count = self.update_count.get() + 1;
        self.update_count.set(count);
        let first = count == 1;

        if self.state.get() == DerivedState::UpToDate {
            self.state.set(DerivedState::DependenciesMightHaveChanged);
            // Observers already inside our update only need the hint.
            if !first {
                for observer in self.observers.snapshot() {
                    observer.handle_possible_change(self);
                }
            }
        }

        if first {
            for observer in self.observers.snapshot() {
                observer.begin_update(self);
            }
        }
    }

    fn end_update(&self, source: &dyn ObservableNode) {
        let count = self.update_count.get();
        if count == 0 {
            report_bug(ObservableError::UnbalancedUpdate {
                observer: self.debug_name.clone(),
                source_name: source.debug_name(),
            });
            return;
        }

        self.update_count.set(count - 1);
        if count != 1 {
            return;
        }

        // Every observer gets its end_update even if an earlier one panics.
        let mut first_panic = None;
        for observer in self.observers.snapshot() {
            if let Err(payload) = catch(|| observer.end_update(self)) {
                first_panic.get_or_insert(payload);
            }
        }
        if let Some(payload) = first_panic {
            resume(payload);
        }
    }

    fn handle_possible_change(&self, source: &dyn ObservableNode) {
        if self.state.get() == DerivedState::UpToDate
            && self.dependencies.is_live(source.node_id())
        {
            self.state.set(DerivedState::DependenciesMightHaveChanged);
            for observer in self.observers.snapshot() {
                observer.handle_possible_change(self);
            }
        }
    }

    fn handle_change(&self, source: &dyn ObservableNode, _change: Option<&dyn Any>) {
        if !self.dependencies.is_live(source.node_id()) {
            return;
        }

        let state = self.state.get();
        let was_up_to_date = state == DerivedState::UpToDate;
        if was_up_to_date || state == DerivedState::DependenciesMightHaveChanged {
            self.state.set(DerivedState::Stale);
            if was_up_to_date {
                for observer in self.observers.snapshot() {
                    observer.handle_possible_change(self);
                }
            }
        }
    }
}

/// A cached value computed from other observables.
///
/// # Example
///
/// ```rust
/// use ripple_core::reactive::{derived, observable_value, Observable};
///
/// let count = observable_value("count", 2);
/// let doubled = derived({
///     let count = count.clone();
///     move |r| count.read(r) * 2
/// });
///
/// assert_eq!(doubled.get(), 4);
/// count.set(5, None);
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct Derived<T> {
    inner: Rc<DerivedInner<T>>,
}

/// Create a derived value compared with `PartialEq`.
pub fn derived<T, F>(compute: F) -> Derived<T>
where
    T: Clone + PartialEq + 'static,
    F: Fn(&Reader<'_>) -> T + 'static,
{
    derived_opts(DerivedOptions::default(), compute)
}

/// Create a derived value with explicit options.
pub fn derived_opts<T, F>(options: DerivedOptions<T>, compute: F) -> Derived<T>
where
    T: Clone + 'static,
    F: Fn(&Reader<'_>) -> T + 'static,
{
    let inner = Rc::new_cyclic(|self_ref| {
        let id = NodeId::new();
        DerivedInner {
            id,
            self_ref: self_ref.clone(),
            debug_name: options
                .debug_name
                .unwrap_or_else(|| default_debug_name("derived", id)),
            compute: Box::new(compute),
            equality: options.equality,
            on_last_observer_removed: options.on_last_observer_removed,
            state: Cell::new(DerivedState::Initial),
            value: RefCell::new(None),
            update_count: Cell::new(0),
            computing: Cell::new(false),
            dependencies: DependencySet::new(),
            observers: ObserverSet::new(),
        }
    });
    Derived { inner }
}

impl<T: Clone + 'static> Derived<T> {
    pub fn state(&self) -> DerivedState {
        self.inner.state.get()
    }

    /// Whether a cached value is held.
    pub fn has_value(&self) -> bool {
        self.inner.value.borrow().is_some()
    }

    pub fn observer_count(&self) -> usize {
        self.inner.observers.len()
    }

    /// Number of observables read by the last run.
    pub fn dependency_count(&self) -> usize {
        self.inner.dependencies.len()
    }

    /// Drop the cache and dependency edges of an unobserved derived value.
    ///
    /// Disposing while observers still depend on the value is a protocol
    /// violation; it is reported and nothing happens.
    pub fn dispose(&self) -> Result<(), ObservableError> {
        let observers = self.inner.observers.len();
        if observers > 0 {
            let error = ObservableError::DisposeWhileObserved {
                derived: self.inner.debug_name.clone(),
                observers,
            };
            report_bug(error.clone());
            return Err(error);
        }
        self.inner.release();
        Ok(())
    }
}

impl<T: Clone + 'static> Observable<T> for Derived<T> {
    fn get(&self) -> T {
        self.inner.get()
    }

    fn as_node(&self) -> Rc<dyn ObservableNode> {
        self.inner.clone()
    }
}

impl<T> Clone for Derived<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Derived<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Derived")
            .field("name", &self.inner.debug_name)
            .field("state", &self.inner.state.get())
            .field("observers", &self.inner.observers.len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::on_bug;
    use crate::reactive::{autorun, keep_observed, observable_value, transaction};

    fn counted<T: Clone + PartialEq + 'static>(
        f: impl Fn(&Reader<'_>) -> T + 'static,
    ) -> (Derived<T>, Rc<Cell<u32>>) {
        let count = Rc::new(Cell::new(0));
        let derived = derived({
            let count = count.clone();
            move |r| {
                count.set(count.get() + 1);
                f(r)
            }
        });
        (derived, count)
    }

    #[test]
    fn derived_is_lazy() {
        let source = observable_value("source", 1);
        let (doubled, runs) = counted({
            let source = source.clone();
            move |r| source.read(r) * 2
        });

        source.set(2, None);
        source.set(3, None);
        assert_eq!(runs.get(), 0);

        assert_eq!(doubled.get(), 6);
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn unobserved_reads_do_not_cache() {
        let (answer, runs) = counted(|_| 42);

        assert_eq!(answer.get(), 42);
        assert_eq!(answer.get(), 42);
        assert_eq!(runs.get(), 2);
        assert!(!answer.has_value());
        assert_eq!(answer.state(), DerivedState::Initial);
    }

    #[test]
    fn observed_derived_caches() {
        let source = observable_value("source", 1);
        let (doubled, runs) = counted({
            let source = source.clone();
            move |r| source.read(r) * 2
        });
        let _keep = keep_observed(&doubled);

        assert_eq!(doubled.get(), 2);
        assert_eq!(doubled.get(), 2);
        assert_eq!(runs.get(), 1);
        assert_eq!(doubled.state(), DerivedState::UpToDate);

        source.set(4, None);
        assert_eq!(doubled.state(), DerivedState::Stale);
        assert_eq!(doubled.get(), 8);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn equal_results_cut_off_propagation() {
        let source = observable_value("source", 2);
        let parity = derived({
            let source = source.clone();
            move |r| source.read(r) % 2
        });

        let downstream_runs = Rc::new(Cell::new(0));
        let _autorun = autorun({
            let parity = parity.clone();
            let downstream_runs = downstream_runs.clone();
            move |r| {
                parity.read(r);
                downstream_runs.set(downstream_runs.get() + 1);
            }
        });

        source.set(4, None);
        source.set(6, None);
        assert_eq!(downstream_runs.get(), 1);

        source.set(7, None);
        assert_eq!(downstream_runs.get(), 2);
    }

    #[test]
    fn last_observer_removed_releases_everything() {
        let released = Rc::new(Cell::new(0));
        let source = observable_value("source", 1);
        let d = derived_opts(
            DerivedOptions::default().on_last_observer_removed({
                let released = released.clone();
                move || released.set(released.get() + 1)
            }),
            {
                let source = source.clone();
                move |r| source.read(r) + 1
            },
        );

        let keep = keep_observed(&d);
        assert_eq!(d.get(), 2);
        assert_eq!(source.observer_count(), 1);
        assert!(d.has_value());

        drop(keep);
        assert_eq!(source.observer_count(), 0);
        assert!(!d.has_value());
        assert_eq!(d.state(), DerivedState::Initial);
        assert_eq!(released.get(), 1);
    }

    #[test]
    fn dispose_while_observed_is_rejected() {
        let reports = Rc::new(Cell::new(0));
        let seen = reports.clone();
        let _guard = on_bug(move |_| seen.set(seen.get() + 1));

        let d = derived(|_| 1);
        let _keep = keep_observed(&d);
        d.get();

        let result = d.dispose();
        assert!(matches!(
            result,
            Err(ObservableError::DisposeWhileObserved { observers: 1, .. })
        ));
        assert_eq!(reports.get(), 1);
        assert!(d.has_value());
    }

    #[test]
    fn dispose_unobserved_is_fine() {
        let d = derived(|_| 1);
        assert_eq!(d.get(), 1);
        assert!(d.dispose().is_ok());
    }

    #[test]
    fn panicking_compute_keeps_dependencies_consistent() {
        let source = observable_value("source", 1);
        let d = derived({
            let source = source.clone();
            move |r| {
                let value = source.read(r);
                assert!(value < 10, "too large");
                value
            }
        });
        let _keep = keep_observed(&d);
        assert_eq!(d.get(), 1);

        transaction(|tx| source.set(20, Some(tx)));
        let result = catch(|| d.get());
        assert!(result.is_err());
        assert_eq!(source.observer_count(), 1);
        assert_eq!(d.state(), DerivedState::Stale);

        source.set(3, None);
        assert_eq!(d.get(), 3);
        assert_eq!(source.observer_count(), 1);
    }

    #[test]
    fn self_read_is_detected_as_cycle() {
        let reports = Rc::new(Cell::new(0));
        let seen = reports.clone();
        let _guard = on_bug(move |error| {
            assert!(matches!(error, ObservableError::Cycle { .. }));
            seen.set(seen.get() + 1);
        });

        let slot: Rc<RefCell<Option<Derived<i32>>>> = Rc::new(RefCell::new(None));
        let d = derived({
            let slot = slot.clone();
            move |_| {
                let inner = slot.borrow().clone();
                inner.map(|d| d.get()).unwrap_or(0) + 1
            }
        });
        *slot.borrow_mut() = Some(d.clone());

        assert!(catch(|| d.get()).is_err());
        assert_eq!(reports.get(), 1);
        slot.borrow_mut().take();
    }

    #[test]
    fn state_transitions() {
        let source = observable_value("source", 1);
        let d = derived({
            let source = source.clone();
            move |r| source.read(r)
        });
        assert_eq!(d.state(), DerivedState::Initial);

        let _keep = keep_observed(&d);
        d.get();
        assert_eq!(d.state(), DerivedState::UpToDate);

        transaction(|tx| {
            source.set(2, Some(tx));
            assert_eq!(d.state(), DerivedState::Stale);
        });

        d.get();
        assert_eq!(d.state(), DerivedState::UpToDate);
        assert_eq!(d.dependency_count(), 1);
    }
}
