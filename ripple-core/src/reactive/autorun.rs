//! Autorun Implementation
//!
//! An autorun is a side-effecting computation that re-runs whenever its
//! dependencies change.
//!
//! # How Autoruns Work
//!
//! 1. When created, the autorun runs its function immediately to establish
//!    initial dependencies.
//!
//! 2. Change notifications only mark it. Nothing runs while an update wave is
//!    still open.
//!
//! 3. When the last open `end_update` arrives, the autorun pulls every
//!    possibly-changed dependency. If at least one really changed it runs
//!    again, exactly once for the whole transaction.
//!
//! 4. Each run records a fresh dependency set; observables that were not read
//!    again are unsubscribed.
//!
//! # Differences from Derived
//!
//! - Derived values return a value; autoruns do not.
//! - Derived values are lazy (compute on access); autoruns are eager (run when
//!   deps change).
//! - Nothing can observe an autorun. It is always the end of a path.
//!
//! # Disposal
//!
//! The returned [`AutorunHandle`] owns the autorun. Disposing it, or dropping
//! it, unsubscribes from every dependency and turns all later notifications
//! into no-ops, including a re-run still pending in an open transaction.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::disposable::{Disposable, DisposableStore};
use crate::error::{catch, report_bug, resume, ObservableError};
use crate::graph::{default_debug_name, DependencySet, NodeId};

use super::{Observable, ObservableNode, Observer, Reader};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AutorunState {
    DependenciesMightHaveChanged,
    Stale,
    UpToDate,
}

/// Options for [`autorun_opts`].
#[derive(Debug, Clone, Default)]
pub struct AutorunOptions {
    pub debug_name: Option<String>,
}

impl AutorunOptions {
    pub fn debug_name(mut self, name: impl Into<String>) -> Self {
        self.debug_name = Some(name.into());
        self
    }
}

/// A change notification, as seen by an [`autorun_handle_changes`] handler.
pub struct ChangeContext<'a> {
    source: &'a dyn ObservableNode,
    change: Option<&'a dyn Any>,
}

impl ChangeContext<'_> {
    /// Whether the notification came from `observable`.
    pub fn did_change<T, O>(&self, observable: &O) -> bool
    where
        O: Observable<T> + ?Sized,
    {
        observable.node_id() == self.source.node_id()
    }

    /// The change payload, if it has type `C`.
    pub fn change<C: Any>(&self) -> Option<&C> {
        self.change.and_then(|change| change.downcast_ref::<C>())
    }

    pub fn source_name(&self) -> String {
        self.source.debug_name()
    }
}

type RunFn = Box<dyn FnMut(&Reader<'_>)>;
type HandleChangeFn = Box<dyn FnMut(&ChangeContext<'_>) -> bool>;

struct AutorunInner {
    id: NodeId,
    /// Handed to readers so dependencies can hold this autorun as an observer.
    self_ref: Weak<AutorunInner>,
    debug_name: String,
    /// The body.
    run: RefCell<RunFn>,
    /// Filters change notifications; `None` reacts to all of them.
    handle_change: Option<RefCell<HandleChangeFn>>,
    /// Runs once, on dispose.
    on_dispose: RefCell<Option<Box<dyn FnOnce()>>>,

    state: Cell<AutorunState>,
    /// Open `begin_update` calls not yet matched by `end_update`.
    update_count: Cell<usize>,
    disposed: Cell<bool>,
    /// Set while the body runs; `end_update` does not re-enter it.
    running: Cell<bool>,
    run_count: Cell<usize>,

    /// Observables read by the last run.
    dependencies: DependencySet,
}

impl AutorunInner {
    /// Pull possibly-changed dependencies and run until nothing is stale.
    fn settle(&self) {
        loop {
            if self.state.get() == AutorunState::DependenciesMightHaveChanged {
                self.state.set(AutorunState::UpToDate);
                for dependency in self.dependencies.snapshot() {
                    dependency.report_changes();
                    if self.state.get() == AutorunState::Stale {
                        break;
                    }
                }
            }

            self.run_if_needed();

            if self.state.get() == AutorunState::UpToDate {
                break;
            }
        }
    }

    fn run_if_needed(&self) {
        if self.state.get() == AutorunState::UpToDate {
            return;
        }
        self.state.set(AutorunState::UpToDate);
        if self.disposed.get() {
            return;
        }

        self.dependencies.begin_run();
        self.running.set(true);
        let result = match self.self_ref.upgrade() {
            Some(this) => {
                let reader = Reader::tracking(this, &self.dependencies);
                catch(|| (&mut *self.run.borrow_mut())(&reader))
            }
            None => catch(|| (&mut *self.run.borrow_mut())(&Reader::untracked())),
        };
        self.running.set(false);
        self.dependencies.finish_run(self.id);

        // The body may have disposed its own autorun.
        if self.disposed.get() {
            self.dependencies.release_all(self.id);
        }

        self.run_count.set(self.run_count.get() + 1);
        tracing::trace!(autorun = %self.debug_name, runs = self.run_count.get(), "autorun finished");

        if let Err(payload) = result {
            resume(payload);
        }
    }

    fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        tracing::trace!(autorun = %self.debug_name, "disposing autorun");
        self.dependencies.release_all(self.id);

        let on_dispose = self.on_dispose.borrow_mut().take();
        if let Some(on_dispose) = on_dispose {
            on_dispose();
        }
    }
}

impl Observer for AutorunInner {
    fn observer_id(&self) -> NodeId {
        self.id
    }

    fn begin_update(&self, _source: &dyn ObservableNode) {
        if self.state.get() == AutorunState::UpToDate {
            self.state.set(AutorunState::DependenciesMightHaveChanged);
        }
        self.update_count.set(self.update_count.get() + 1);
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

        // A run already in progress picks up the new state when it loops.
        let result = if count == 1 && !self.running.get() {
            catch(|| self.settle())
        } else {
            Ok(())
        };
        self.update_count.set(count - 1);

        if let Err(payload) = result {
            resume(payload);
        }
    }

    fn handle_possible_change(&self, source: &dyn ObservableNode) {
        if self.state.get() == AutorunState::UpToDate
            && self.dependencies.is_live(source.node_id())
        {
            self.state.set(AutorunState::DependenciesMightHaveChanged);
        }
    }

    fn handle_change(&self, source: &dyn ObservableNode, change: Option<&dyn Any>) {
        if !self.dependencies.is_live(source.node_id()) {
            return;
        }

        let should_react = match &self.handle_change {
            Some(handle_change) => {
                let context = ChangeContext { source, change };
                (&mut *handle_change.borrow_mut())(&context)
            }
            None => true,
        };
        if should_react {
            self.state.set(AutorunState::Stale);
        }
    }
}

/// Owns an autorun. Dropping the handle disposes the autorun.
#[must_use = "the autorun is disposed as soon as its handle is dropped"]
pub struct AutorunHandle {
    inner: Rc<AutorunInner>,
}

impl AutorunHandle {
    /// Stop the autorun permanently.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Number of times the body has run, including the initial run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.get()
    }

    pub fn dependency_count(&self) -> usize {
        self.inner.dependencies.len()
    }

    pub fn debug_name(&self) -> &str {
        &self.inner.debug_name
    }
}

impl Disposable for AutorunHandle {
    fn dispose(&self) {
        self.inner.dispose();
    }
}

impl Drop for AutorunHandle {
    fn drop(&mut self) {
        self.inner.dispose();
    }
}

impl fmt::Debug for AutorunHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutorunHandle")
            .field("name", &self.inner.debug_name)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

fn create_autorun(
    debug_name: Option<String>,
    run: RunFn,
    handle_change: Option<HandleChangeFn>,
    on_dispose: Option<Box<dyn FnOnce()>>,
) -> AutorunHandle {
    let inner = Rc::new_cyclic(|self_ref| {
        let id = NodeId::new();
        AutorunInner {
            id,
            self_ref: self_ref.clone(),
            debug_name: debug_name.unwrap_or_else(|| default_debug_name("autorun", id)),
            run: RefCell::new(run),
            handle_change: handle_change.map(RefCell::new),
            on_dispose: RefCell::new(on_dispose),
            state: Cell::new(AutorunState::Stale),
            update_count: Cell::new(0),
            disposed: Cell::new(false),
            running: Cell::new(false),
            run_count: Cell::new(0),
            dependencies: DependencySet::new(),
        }
    });

    // If the first run panics, dropping the handle unsubscribes what it read.
    let handle = AutorunHandle { inner };
    handle.inner.settle();
    handle
}

/// Run `f` now and again whenever something it read changes.
///
/// # Example
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use ripple_core::reactive::{autorun, observable_value, Observable};
///
/// let count = observable_value("count", 0);
/// let seen = Rc::new(Cell::new(-1));
///
/// let _handle = autorun({
///     let count = count.clone();
///     let seen = seen.clone();
///     move |r| seen.set(count.read(r))
/// });
///
/// count.set(5, None);
/// assert_eq!(seen.get(), 5);
/// ```
pub fn autorun<F>(f: F) -> AutorunHandle
where
    F: FnMut(&Reader<'_>) + 'static,
{
    autorun_opts(AutorunOptions::default(), f)
}

pub fn autorun_opts<F>(options: AutorunOptions, f: F) -> AutorunHandle
where
    F: FnMut(&Reader<'_>) + 'static,
{
    create_autorun(options.debug_name, Box::new(f), None, None)
}

/// Like [`autorun`], with a store that is cleared before every re-run and
/// disposed together with the autorun.
pub fn autorun_with_store<F>(mut f: F) -> AutorunHandle
where
    F: FnMut(&Reader<'_>, &DisposableStore) + 'static,
{
    let store = Rc::new(DisposableStore::new());
    let run = {
        let store = store.clone();
        move |r: &Reader<'_>| {
            store.clear();
            f(r, &store);
        }
    };
    create_autorun(
        None,
        Box::new(run),
        None,
        Some(Box::new(move || store.dispose())),
    )
}

/// An autorun that sees the individual change notifications.
///
/// `handle_change` folds each notification into a summary of type `S` and
/// decides whether it warrants a re-run. `run` receives the summary collected
/// since the previous run.
pub fn autorun_handle_changes<S, H, F>(mut handle_change: H, mut run: F) -> AutorunHandle
where
    S: Default + 'static,
    H: FnMut(&ChangeContext<'_>, &mut S) -> bool + 'static,
    F: FnMut(&Reader<'_>, S) + 'static,
{
    let summary = Rc::new(RefCell::new(S::default()));
    let collect = {
        let summary = summary.clone();
        move |context: &ChangeContext<'_>| handle_change(context, &mut summary.borrow_mut())
    };
    let execute = move |r: &Reader<'_>| {
        let collected = std::mem::take(&mut *summary.borrow_mut());
        run(r, collected);
    };
    create_autorun(None, Box::new(execute), Some(Box::new(collect)), None)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
