//! Disposables
//!
//! Every handle that keeps part of the graph alive (an autorun, a keep-alive
//! subscription, an event listener) implements [`Disposable`]. Disposal is
//! idempotent and also happens when the handle is dropped.

use std::cell::{Cell, RefCell};
use std::fmt;

/// A scoped resource that can be released explicitly.
pub trait Disposable {
    /// Release the resource. Calling this more than once has no effect.
    fn dispose(&self);
}

impl<D: Disposable + ?Sized> Disposable for Box<D> {
    fn dispose(&self) {
        (**self).dispose();
    }
}

impl<D: Disposable + ?Sized> Disposable for std::rc::Rc<D> {
    fn dispose(&self) {
        (**self).dispose();
    }
}

/// A disposable backed by a one-shot closure.
pub struct DisposableFn {
    dispose: RefCell<Option<Box<dyn FnOnce()>>>,
}

impl Disposable for DisposableFn {
    fn dispose(&self) {
        let dispose = self.dispose.borrow_mut().take();
        if let Some(dispose) = dispose {
            dispose();
        }
    }
}

impl Drop for DisposableFn {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Wrap a closure as a [`Disposable`]. The closure runs at most once.
pub fn to_disposable<F>(dispose: F) -> DisposableFn
where
    F: FnOnce() + 'static,
{
    DisposableFn {
        dispose: RefCell::new(Some(Box::new(dispose))),
    }
}

/// A collection of disposables released together.
///
/// Adding to a store that is already disposed releases the new item
/// immediately.
#[derive(Default)]
pub struct DisposableStore {
    items: RefCell<Vec<Box<dyn Disposable>>>,
    disposed: Cell<bool>,
}

impl DisposableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of `item` until the store is cleared or disposed.
    pub fn add<D>(&self, item: D)
    where
        D: Disposable + 'static,
    {
        if self.disposed.get() {
            tracing::warn!("adding to a disposed store, disposing the item right away");
            item.dispose();
            return;
        }
        self.items.borrow_mut().push(Box::new(item));
    }

    /// Register a cleanup closure.
    pub fn add_fn<F>(&self, dispose: F)
    where
        F: FnOnce() + 'static,
    {
        self.add(to_disposable(dispose));
    }

    /// Dispose every item but keep the store usable.
    pub fn clear(&self) {
        let items = std::mem::take(&mut *self.items.borrow_mut());
        for item in items.iter().rev() {
            item.dispose();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }
}

impl Disposable for DisposableStore {
    fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        self.clear();
    }
}

impl Drop for DisposableStore {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for DisposableStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisposableStore")
            .field("items", &self.len())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
