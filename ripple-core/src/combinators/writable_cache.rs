//! Derived values with a writable cache.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::reactive::{
    derived_opts, observable_signal, Derived, DerivedOptions, Observable, ObservableNode,
    ObservableSignal, Transaction,
};

/// A derived value whose last result can be overwritten or forgotten from
/// outside.
///
/// The compute function receives the cached result as its second argument
/// and decides what to do with it. Writing the cache triggers an internal
/// signal, so dependents see the write like any other change.
pub struct DerivedWithWritableCache<T> {
    derived: Derived<T>,
    /// Handed to the compute function as its previous result.
    last: Rc<RefCell<Option<T>>>,
    /// Triggered by cache writes so the derived recomputes.
    invalidate: ObservableSignal,
}

/// Create a [`DerivedWithWritableCache`].
///
/// # Example
///
/// ```rust
/// use ripple_core::combinators::derived_with_writable_cache;
/// use ripple_core::reactive::{observable_value, Observable};
///
/// let default = observable_value("default", 1);
/// let choice = derived_with_writable_cache({
///     let default = default.clone();
///     move |r, last: Option<i32>| last.unwrap_or_else(|| default.read(r))
/// });
///
/// assert_eq!(choice.get(), 1);
/// choice.set_cache(Some(7), None);
/// assert_eq!(choice.get(), 7);
/// ```
pub fn derived_with_writable_cache<T, F>(compute: F) -> DerivedWithWritableCache<T>
where
    T: Clone + PartialEq + 'static,
    F: Fn(&crate::reactive::Reader<'_>, Option<T>) -> T + 'static,
{
    let last: Rc<RefCell<Option<T>>> = Rc::new(RefCell::new(None));
    let invalidate = observable_signal("writableCache");

    let derived = derived_opts(DerivedOptions::default().debug_name("writableCache"), {
        let last = last.clone();
        let invalidate = invalidate.clone();
        move |r| {
            invalidate.read(r);
            let previous = last.borrow().clone();
            let value = compute(r, previous);
            *last.borrow_mut() = Some(value.clone());
            value
        }
    });

    DerivedWithWritableCache {
        derived,
        last,
        invalidate,
    }
}

impl<T: Clone + 'static> DerivedWithWritableCache<T> {
    /// Replace the cached result and recompute dependents.
    pub fn set_cache(&self, value: Option<T>, tx: Option<&Transaction>) {
        *self.last.borrow_mut() = value;
        self.invalidate.trigger(tx);
    }

    /// Forget the cached result.
    pub fn clear_cache(&self, tx: Option<&Transaction>) {
        self.set_cache(None, tx);
    }

    pub fn observer_count(&self) -> usize {
        self.derived.observer_count()
    }
}

impl<T: Clone + 'static> Observable<T> for DerivedWithWritableCache<T> {
    fn get(&self) -> T {
        self.derived.get()
    }

    fn as_node(&self) -> Rc<dyn ObservableNode> {
        self.derived.as_node()
    }
}

impl<T> Clone for DerivedWithWritableCache<T> {
    fn clone(&self) -> Self {
        Self {
            derived: self.derived.clone(),
            last: Rc::clone(&self.last),
            invalidate: self.invalidate.clone(),
        }
    }
}

impl<T> fmt::Debug for DerivedWithWritableCache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedWithWritableCache")
            .field("derived", &self.derived)
            .field("cached", &self.last.borrow().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{autorun, observable_value, transaction, Reader};

    /// Keeps the first selection it ever computed until told otherwise.
    fn sticky(source: &crate::reactive::ObservableValue<i32>) -> DerivedWithWritableCache<i32> {
        let source = source.clone();
        derived_with_writable_cache(move |r: &Reader<'_>, last: Option<i32>| {
            let current = source.read(r);
            last.unwrap_or(current)
        })
    }

    #[test]
    fn compute_sees_the_cached_value() {
        let source = observable_value("source", 1);
        let selection = sticky(&source);
        let seen = Rc::new(RefCell::new(Vec::new()));

        let _log = autorun({
            let selection = selection.clone();
            let seen = seen.clone();
            move |r| seen.borrow_mut().push(selection.read(r))
        });

        source.set(2, None);
        assert_eq!(*seen.borrow(), vec![1]);

        selection.clear_cache(None);
        assert_eq!(*seen.borrow(), vec![1, 2]);
    }

    #[test]
    fn set_cache_overrides_the_result() {
        let source = observable_value("source", 1);
        let selection = sticky(&source);
        let seen = Rc::new(RefCell::new(Vec::new()));

        let _log = autorun({
            let selection = selection.clone();
            let seen = seen.clone();
            move |r| seen.borrow_mut().push(selection.read(r))
        });

        transaction(|tx| {
            selection.set_cache(Some(10), Some(tx));
            source.set(3, Some(tx));
        });
        assert_eq!(*seen.borrow(), vec![1, 10]);
        assert_eq!(selection.get(), 10);
    }
}
