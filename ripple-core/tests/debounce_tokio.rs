//! Debounce on the tokio clock.
//!
//! The clock is paused, so `sleep` advances virtual time deterministically.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use ripple_core::combinators::debounced_observable;
use ripple_core::reactive::{async_transaction, autorun, observable_value, Observable};
use ripple_core::timer::TokioTimer;
use tokio::task::LocalSet;

#[tokio::test(start_paused = true)]
async fn debounced_value_settles_after_quiet_period() {
    LocalSet::new()
        .run_until(async {
            let width = observable_value("width", 800u32);
            let settled = debounced_observable(
                width.clone(),
                Duration::from_millis(200),
                Rc::new(TokioTimer),
            );

            let layouts = Rc::new(RefCell::new(Vec::new()));
            let _layout = autorun({
                let settled = settled.clone();
                let layouts = layouts.clone();
                move |r| layouts.borrow_mut().push(settled.read(r))
            });

            for w in [810, 820, 830] {
                width.set(w, None);
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            assert_eq!(*layouts.borrow(), vec![800]);

            tokio::time::sleep(Duration::from_millis(300)).await;
            assert_eq!(*layouts.borrow(), vec![800, 830]);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn async_transaction_spans_await_points() {
    let a = observable_value("a", 0);
    let b = observable_value("b", 0);
    let sums = Rc::new(RefCell::new(Vec::new()));

    let _sum = autorun({
        let (a, b, sums) = (a.clone(), b.clone(), sums.clone());
        move |r| sums.borrow_mut().push(a.read(r) + b.read(r))
    });

    async_transaction(|tx| {
        let (a, b, sums) = (a.clone(), b.clone(), sums.clone());
        async move {
            a.set(1, Some(&tx));
            tokio::time::sleep(Duration::from_millis(10)).await;
            b.set(2, Some(&tx));
            assert_eq!(*sums.borrow(), vec![0]);
        }
    })
    .await;

    assert_eq!(*sums.borrow(), vec![0, 3]);
    assert_eq!(a.get() + b.get(), 3);
}
