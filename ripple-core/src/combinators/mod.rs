//! Combinators
//!
//! Higher-level observables assembled from the primitives in
//! [`crate::reactive`]. Each one owns a small piece of caching or disposal
//! logic:
//!
//! - [`debounced_observable`]: follows a source with a delay.
//! - [`keep_observed`]: holds a cache open between unrelated reads.
//! - [`map_observable_array_cached`]: maps a list while reusing per-key outputs.
//! - [`derived_with_writable_cache`]: a derived value whose result can be
//!   overwritten from outside.

mod array_map;
mod debounce;
mod keep_alive;
mod writable_cache;

pub use array_map::map_observable_array_cached;
pub use debounce::debounced_observable;
pub use keep_alive::{keep_observed, recompute_initially_and_on_change, KeepAliveHandle};
pub use writable_cache::{derived_with_writable_cache, DerivedWithWritableCache};
