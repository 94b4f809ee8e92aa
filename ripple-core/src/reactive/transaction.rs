//! Transactions
//!
//! A transaction batches mutations. Each observer notified during the batch
//! receives `begin_update` immediately and the matching `end_update` when the
//! batch finishes, so autoruns run once per batch and derived values only
//! recompute after every path to them has settled.
//!
//! # Joining
//!
//! [`transaction`] joins the transaction that is already open on this thread.
//! Only the outermost call opens and finishes a physical batch.
//!
//! [`async_transaction`] keeps a batch open across `.await` points. It is not
//! published as the current transaction, because other tasks interleave with
//! it on the same thread.

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{catch, report_bug, resume, ObservableError};

use super::context::{current_transaction, TransactionScope};
use super::{ObservableNode, Observer};

static TRANSACTION_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

type Describe = Box<dyn Fn() -> String>;

struct PendingUpdate {
    observer: Rc<dyn Observer>,
    source: Rc<dyn ObservableNode>,
}

struct TransactionInner {
    id: u64,
    describe: Option<Describe>,
    /// `None` once finished.
    updating: RefCell<Option<Vec<PendingUpdate>>>,
}

/// A batch of mutations. Cheap to clone; clones share the batch.
#[derive(Clone)]
pub struct Transaction {
    inner: Rc<TransactionInner>,
}

impl Transaction {
    pub(crate) fn new(describe: Option<Describe>) -> Self {
        Self {
            inner: Rc::new(TransactionInner {
                id: TRANSACTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
                describe,
                updating: RefCell::new(Some(Vec::new())),
            }),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn description(&self) -> String {
        match &self.inner.describe {
            Some(describe) => describe(),
            None => format!("transaction#{}", self.inner.id),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.inner.updating.borrow().is_none()
    }

    /// Send `begin_update` to `observer` now and `end_update` on finish.
    pub fn update_observer(&self, observer: &Rc<dyn Observer>, source: &Rc<dyn ObservableNode>) {
        let registered = match self.inner.updating.borrow_mut().as_mut() {
            Some(updating) => {
                updating.push(PendingUpdate {
                    observer: Rc::clone(observer),
                    source: Rc::clone(source),
                });
                true
            }
            None => false,
        };
        if !registered {
            report_bug(ObservableError::TransactionFinished {
                transaction: self.description(),
            });
            return;
        }
        observer.begin_update(&**source);
    }

    /// Deliver every pending `end_update`.
    ///
    /// Observers may register more updates while this runs; they are
    /// delivered too. A panicking observer does not stop delivery to the
    /// rest. The first panic is resumed once the batch is closed.
    pub(crate) fn finish(&self) {
        tracing::trace!(transaction = %self.description(), "finishing transaction");

        let mut first_panic = None;
        let mut index = 0;
        loop {
            let next = {
                let updating = self.inner.updating.borrow();
                updating
                    .as_ref()
                    .and_then(|list| list.get(index))
                    .map(|pending| (Rc::clone(&pending.observer), Rc::clone(&pending.source)))
            };
            let Some((observer, source)) = next else {
                break;
            };
            if let Err(payload) = catch(|| observer.end_update(&*source)) {
                first_panic.get_or_insert(payload);
            }
            index += 1;
        }
        self.inner.updating.borrow_mut().take();

        if let Some(payload) = first_panic {
            resume(payload);
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.inner.id)
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Run `f` inside a transaction, joining the current one if it exists.
pub fn transaction<R>(f: impl FnOnce(&Transaction) -> R) -> R {
    run_transaction(None, f)
}

/// Like [`transaction`], with a description for logs.
pub fn transaction_with<R, D>(describe: D, f: impl FnOnce(&Transaction) -> R) -> R
where
    D: Fn() -> String + 'static,
{
    run_transaction(Some(Box::new(describe)), f)
}

/// Run `f` in `tx` if given, otherwise in a (possibly joined) transaction.
pub fn subtransaction<R>(tx: Option<&Transaction>, f: impl FnOnce(&Transaction) -> R) -> R {
    match tx {
        Some(tx) => f(tx),
        None => transaction(f),
    }
}

fn run_transaction<R>(describe: Option<Describe>, f: impl FnOnce(&Transaction) -> R) -> R {
    if let Some(tx) = current_transaction() {
        return f(&tx);
    }

    let tx = Transaction::new(describe);
    let result = {
        let _scope = TransactionScope::enter(tx.clone());
        catch(|| f(&tx))
    };
    tx.finish();

    match result {
        Ok(value) => value,
        Err(payload) => resume(payload),
    }
}

/// Make `tx` the current transaction while `f` runs, unless one is open.
///
/// Event bridges that fire inside `f` join `tx`, so a burst of external
/// events reaches dependents as a single batch. If another transaction is
/// already current, `tx` is not used: events join the open transaction, which
/// finishes later than `tx` would.
pub fn batch_events_globally<R>(tx: &Transaction, f: impl FnOnce() -> R) -> R {
    let _scope = match current_transaction() {
        None => Some(TransactionScope::enter(tx.clone())),
        Some(open) => {
            if open.id() != tx.id() {
                tracing::debug!(
                    requested = %tx.description(),
                    current = %open.description(),
                    "events join the transaction already open"
                );
            }
            None
        }
    };
    f()
}

/// Keep one transaction open across the await points of `f`.
///
/// The batch finishes when `f` completes, or when the returned future is
/// dropped before completing.
pub async fn async_transaction<F, Fut, R>(f: F) -> R
where
    F: FnOnce(Transaction) -> Fut,
    Fut: Future<Output = R>,
{
    let tx = Transaction::new(None);
    let _finish = FinishOnDrop(tx.clone());
    f(tx).await
}

struct FinishOnDrop(Transaction);

impl Drop for FinishOnDrop {
    fn drop(&mut self) {
        if !self.0.is_finished() {
            self.0.finish();
        }
    }
}
