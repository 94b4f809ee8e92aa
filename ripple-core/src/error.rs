//! Error Reporting
//!
//! Two kinds of failure exist in the observable graph:
//!
//! - Computation failures: a panic inside a derived computation or an autorun
//!   body. These are never swallowed. The graph finishes its own bookkeeping and
//!   then resumes the panic on the caller's stack.
//!
//! - Protocol violations: unbalanced update notifications, duplicate observer
//!   registration and similar misuse. These are represented by
//!   [`ObservableError`] and reported through [`report_bug`]. The offending
//!   operation is then treated as a no-op.
//!
//! Reports always go to `tracing` at error level. A host (or a test) can also
//! install a scoped handler with [`on_bug`].

use std::any::Any;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use thiserror::Error;

use crate::graph::NodeId;

/// A misuse of the push/pull protocol.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObservableError {
    /// `end_update` arrived without a matching `begin_update`.
    #[error("unbalanced end_update on `{observer}` from `{source_name}`")]
    UnbalancedUpdate {
        observer: String,
        source_name: String,
    },

    /// An observer was registered twice on the same observable.
    #[error("observer {observer:?} is already registered on `{observable}`")]
    DuplicateObserver {
        observable: String,
        observer: NodeId,
    },

    /// An observer was removed from an observable it never observed.
    #[error("observer {observer:?} is not registered on `{observable}`")]
    ObserverNotRegistered {
        observable: String,
        observer: NodeId,
    },

    /// A finished transaction was used to deliver another update.
    #[error("transaction `{transaction}` is already finished")]
    TransactionFinished { transaction: String },

    /// A derived value was disposed while observers still depend on it.
    #[error("cannot dispose `{derived}` while it has {observers} observer(s)")]
    DisposeWhileObserved { derived: String, observers: usize },

    /// A derived value read itself while computing.
    #[error("cycle detected while computing `{derived}`")]
    Cycle { derived: String },
}

type BugHandler = Rc<dyn Fn(&ObservableError)>;

thread_local! {
    static BUG_HANDLER: RefCell<Option<BugHandler>> = const { RefCell::new(None) };
}

/// Report a protocol violation.
///
/// Always logs at error level, then forwards to the handler installed with
/// [`on_bug`], if any.
pub fn report_bug(error: ObservableError) {
    tracing::error!(%error, "observable protocol violation");

    let handler = BUG_HANDLER.with(|slot| slot.borrow().clone());
    if let Some(handler) = handler {
        handler(&error);
    }
}

/// Install a bug handler for the current thread.
///
/// The previous handler is restored when the returned guard is dropped.
pub fn on_bug<F>(handler: F) -> BugHandlerGuard
where
    F: Fn(&ObservableError) + 'static,
{
    let previous = BUG_HANDLER.with(|slot| slot.borrow_mut().replace(Rc::new(handler)));
    BugHandlerGuard { previous }
}

/// Restores the previous bug handler when dropped.
#[must_use = "the handler is uninstalled as soon as the guard is dropped"]
pub struct BugHandlerGuard {
    previous: Option<BugHandler>,
}

impl Drop for BugHandlerGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        BUG_HANDLER.with(|slot| *slot.borrow_mut() = previous);
    }
}

/// Payload of a caught panic.
pub(crate) type PanicPayload = Box<dyn Any + Send + 'static>;

/// Run `f`, catching a panic so the caller can finish its bookkeeping first.
///
/// Pair with [`resume`] once the bookkeeping is done.
pub(crate) fn catch<R>(f: impl FnOnce() -> R) -> Result<R, PanicPayload> {
    panic::catch_unwind(AssertUnwindSafe(f))
}

/// Resume a panic caught by [`catch`].
pub(crate) fn resume(payload: PanicPayload) -> ! {
    panic::resume_unwind(payload)
}
