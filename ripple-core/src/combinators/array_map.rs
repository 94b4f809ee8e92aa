//! Keyed array mapping with a per-item cache.
//!
//! Mapping an observable list item by item would rebuild every output on each
//! change. The cached map keeps one `(output, store)` entry per key: entries
//! whose key is still present are reused as they are, entries whose key
//! vanished have their store disposed, and new keys are mapped once.

use std::cell::RefCell;
use std::hash::Hash;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::disposable::{Disposable, DisposableStore};
use crate::reactive::{derived_opts, Derived, DerivedOptions, EqualityComparer, Observable};

struct CacheEntry<Out> {
    output: Out,
    /// Disposed when the entry's key leaves the list.
    store: DisposableStore,
}

struct ArrayMapCache<In, Out, K> {
    key: Box<dyn Fn(&In) -> K>,
    map: Box<dyn FnMut(&In, &DisposableStore) -> Out>,
    /// Entries of the last successful pass.
    entries: IndexMap<K, CacheEntry<Out>>,
}

impl<In, Out, K> ArrayMapCache<In, Out, K>
where
    Out: Clone,
    K: Hash + Eq,
{
    /// Map a new item list. The cache is only touched once every item has
    /// mapped; if `map` panics, entries created by this pass are dropped and
    /// the previous entries stay live.
    fn set_items(&mut self, items: &[In]) -> Vec<Out> {
        let mut kept: Vec<K> = Vec::new();
        let mut created: IndexMap<K, CacheEntry<Out>> = IndexMap::new();
        let mut outputs = Vec::with_capacity(items.len());

        for item in items {
            let key = (self.key)(item);
            // Repeated keys share the entry of their first occurrence.
            if let Some(entry) = self.entries.get(&key) {
                outputs.push(entry.output.clone());
                kept.push(key);
            } else if let Some(entry) = created.get(&key) {
                outputs.push(entry.output.clone());
            } else {
                let store = DisposableStore::new();
                let output = (self.map)(item, &store);
                outputs.push(output.clone());
                created.insert(key, CacheEntry { output, store });
            }
        }

        let mut next = IndexMap::with_capacity(kept.len() + created.len());
        for key in kept {
            if let Some(entry) = self.entries.swap_remove(&key) {
                next.insert(key, entry);
            }
        }
        next.extend(created);

        let removed = std::mem::replace(&mut self.entries, next);
        for (_, entry) in removed {
            entry.store.dispose();
        }
        outputs
    }

    fn dispose(&mut self) {
        for (_, entry) in self.entries.drain(..) {
            entry.store.dispose();
        }
    }
}

/// Map each item of `items` with `map`, reusing outputs across changes for
/// items whose `key` persists.
///
/// The store handed to `map` lives as long as the item does. The result
/// compares as always different, so every change of `items` notifies.
/// Losing the last observer disposes the whole cache.
///
/// # Example
///
/// ```rust
/// use ripple_core::combinators::map_observable_array_cached;
/// use ripple_core::reactive::{keep_observed, observable_value, Observable};
///
/// let names = observable_value("names", vec!["a".to_string(), "b".to_string()]);
/// let upper = map_observable_array_cached(
///     names.clone(),
///     |name: &String| name.clone(),
///     |name: &String, _store| name.to_uppercase(),
/// );
///
/// let _keep = keep_observed(&upper);
/// assert_eq!(upper.get(), vec!["A", "B"]);
/// ```
pub fn map_observable_array_cached<In, Out, K, O, KF, MF>(
    items: O,
    key: KF,
    map: MF,
) -> Derived<Vec<Out>>
where
    In: 'static,
    Out: Clone + 'static,
    K: Hash + Eq + 'static,
    O: Observable<Vec<In>> + 'static,
    KF: Fn(&In) -> K + 'static,
    MF: FnMut(&In, &DisposableStore) -> Out + 'static,
{
    let cache = Rc::new(RefCell::new(ArrayMapCache {
        key: Box::new(key),
        map: Box::new(map),
        entries: IndexMap::new(),
    }));
    let name = format!("mapCached({})", items.debug_name());

    let options = DerivedOptions::with_equality(EqualityComparer::always_different())
        .debug_name(name)
        .on_last_observer_removed({
            let cache = cache.clone();
            move || cache.borrow_mut().dispose()
        });

    derived_opts(options, move |r| {
        let current = items.read(r);
        cache.borrow_mut().set_items(&current)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{keep_observed, observable_value};
    use std::cell::Cell;

    #[derive(Debug)]
    struct Row {
        label: String,
    }

    type Disposed = Rc<RefCell<Vec<String>>>;

    fn rows(
        items: &crate::reactive::ObservableValue<Vec<&'static str>>,
        created: Rc<Cell<u32>>,
        disposed: Disposed,
    ) -> Derived<Vec<Rc<Row>>> {
        map_observable_array_cached(
            items.clone(),
            |label: &&'static str| *label,
            move |label: &&'static str, store: &DisposableStore| {
                created.set(created.get() + 1);
                let disposed = disposed.clone();
                let label = label.to_string();
                store.add_fn({
                    let label = label.clone();
                    move || disposed.borrow_mut().push(label)
                });
                Rc::new(Row { label })
            },
        )
    }

    fn labels(rows: &[Rc<Row>]) -> Vec<&str> {
        rows.iter().map(|row| row.label.as_str()).collect()
    }

    #[test]
    fn persisting_keys_reuse_their_outputs() {
        let items = observable_value("items", vec!["a", "b", "c"]);
        let created = Rc::new(Cell::new(0));
        let disposed: Disposed = Rc::default();
        let mapped = rows(&items, created.clone(), disposed.clone());
        let _keep = keep_observed(&mapped);

        let before = mapped.get();
        assert_eq!(labels(&before), vec!["a", "b", "c"]);
        assert_eq!(created.get(), 3);

        items.set(vec!["b", "c", "d"], None);
        let after = mapped.get();

        assert_eq!(labels(&after), vec!["b", "c", "d"]);
        assert!(Rc::ptr_eq(&before[1], &after[0]));
        assert!(Rc::ptr_eq(&before[2], &after[1]));
        assert_eq!(created.get(), 4);
        assert_eq!(*disposed.borrow(), vec!["a"]);
    }

    #[test]
    fn output_order_follows_the_input() {
        let items = observable_value("items", vec!["a", "b", "c"]);
        let mapped = rows(&items, Rc::default(), Rc::default());
        let _keep = keep_observed(&mapped);

        let before = mapped.get();
        items.set(vec!["c", "a", "b"], None);
        let after = mapped.get();

        assert_eq!(labels(&after), vec!["c", "a", "b"]);
        assert!(Rc::ptr_eq(&before[0], &after[1]));
    }

    #[test]
    fn repeated_keys_share_one_entry() {
        let items = observable_value("items", vec!["a", "a"]);
        let created = Rc::new(Cell::new(0));
        let mapped = rows(&items, created.clone(), Rc::default());
        let _keep = keep_observed(&mapped);

        let out = mapped.get();
        assert!(Rc::ptr_eq(&out[0], &out[1]));
        assert_eq!(created.get(), 1);
    }

    #[test]
    fn failed_mapping_pass_keeps_live_entries() {
        let items = observable_value("items", vec!["a", "b"]);
        let disposed: Disposed = Rc::default();
        let mapped = map_observable_array_cached(
            items.clone(),
            |label: &&'static str| *label,
            {
                let disposed = disposed.clone();
                move |label: &&'static str, store: &DisposableStore| {
                    assert!(*label != "bad", "cannot map {label}");
                    let disposed = disposed.clone();
                    let label = label.to_string();
                    store.add_fn({
                        let label = label.clone();
                        move || disposed.borrow_mut().push(label)
                    });
                    Rc::new(Row { label })
                }
            },
        );
        let _keep = keep_observed(&mapped);
        let before = mapped.get();

        items.set(vec!["a", "b", "bad"], None);
        assert!(crate::error::catch(|| mapped.get()).is_err());
        assert!(disposed.borrow().is_empty());

        items.set(vec!["a", "b"], None);
        let after = mapped.get();
        assert!(Rc::ptr_eq(&before[0], &after[0]));
        assert!(Rc::ptr_eq(&before[1], &after[1]));
        assert!(disposed.borrow().is_empty());
    }

    #[test]
    fn losing_the_last_observer_disposes_the_cache() {
        let items = observable_value("items", vec!["a", "b"]);
        let created = Rc::new(Cell::new(0));
        let disposed: Disposed = Rc::default();
        let mapped = rows(&items, created.clone(), disposed.clone());

        let keep = keep_observed(&mapped);
        mapped.get();
        drop(keep);

        let mut gone = disposed.borrow().clone();
        gone.sort();
        assert_eq!(gone, vec!["a", "b"]);

        let _keep = keep_observed(&mapped);
        mapped.get();
        assert_eq!(created.get(), 4);
    }
}
