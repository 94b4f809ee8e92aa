//! Transaction Context
//!
//! The context tracks which transaction is currently open on this thread.
//! Nested `transaction` calls and event-bridge firings join the transaction
//! found here instead of opening a second batch.
//!
//! # Implementation
//!
//! We use a thread-local stack. Entering a scope pushes a transaction; the
//! guard pops it when dropped, which restores whatever was open before. An
//! unrelated code path therefore never observes a transaction that someone
//! else is still building, and a panic cannot leave a stale entry behind.

use std::cell::RefCell;

use super::Transaction;

thread_local! {
    static TRANSACTION_STACK: RefCell<Vec<Transaction>> = const { RefCell::new(Vec::new()) };
}

/// Guard that pops the transaction when dropped.
pub(crate) struct TransactionScope {
    transaction_id: u64,
}

impl TransactionScope {
    /// Make `tx` the current transaction until the guard is dropped.
    pub(crate) fn enter(tx: Transaction) -> Self {
        let transaction_id = tx.id();
        TRANSACTION_STACK.with(|stack| stack.borrow_mut().push(tx));
        Self { transaction_id }
    }
}

impl Drop for TransactionScope {
    fn drop(&mut self) {
        let popped = TRANSACTION_STACK.with(|stack| stack.borrow_mut().pop());

        if let Some(tx) = popped {
            debug_assert_eq!(
                tx.id(),
                self.transaction_id,
                "TransactionScope mismatch: expected {}, got {}",
                self.transaction_id,
                tx.id()
            );
        }
    }
}

/// The transaction currently open on this thread, if any.
pub fn current_transaction() -> Option<Transaction> {
    TRANSACTION_STACK.with(|stack| stack.borrow().last().cloned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_tracks_current_transaction() {
        assert!(current_transaction().is_none());

        let tx = Transaction::new(None);
        {
            let _scope = TransactionScope::enter(tx.clone());
            assert_eq!(current_transaction().map(|t| t.id()), Some(tx.id()));
        }

        assert!(current_transaction().is_none());
    }

    #[test]
    fn nested_scopes_restore_outer() {
        let outer = Transaction::new(None);
        let inner = Transaction::new(None);

        let _outer_scope = TransactionScope::enter(outer.clone());
        {
            let _inner_scope = TransactionScope::enter(inner.clone());
            assert_eq!(current_transaction().map(|t| t.id()), Some(inner.id()));
        }
        assert_eq!(current_transaction().map(|t| t.id()), Some(outer.id()));
    }
}
