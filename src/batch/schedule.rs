//! Bounded submission of work units to a rayon pool.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;

use rayon::ThreadPool;

use crate::hooks::CancelFlag;

/// Runs `work` over `units` on `pool` with at most `window` units in flight.
///
/// Results come back to the calling thread, which hands each one to
/// `on_done` together with the number of completed units. A new unit is
/// submitted only while `on_done` keeps returning true and `cancel` is not
/// set; units already in flight always finish and are delivered. A unit
/// that panics is delivered as `Err` with the panic message.
///
/// Returns the number of units that completed.
pub fn run_windowed<U, R, W, D>(
    pool: &ThreadPool,
    units: Vec<U>,
    window: usize,
    cancel: &CancelFlag,
    work: W,
    mut on_done: D,
) -> usize
where
    U: Send,
    R: Send,
    W: Fn(U) -> R + Sync,
    D: FnMut(Result<R, String>, usize) -> bool,
{
    let (tx, rx) = mpsc::channel::<Result<R, String>>();
    let work = &work;
    let mut pending = units.into_iter();
    let mut completed = 0;

    pool.in_place_scope(|scope| {
        let submit = |unit: U| {
            let tx = tx.clone();
            scope.spawn(move |_| {
                let result = panic::catch_unwind(AssertUnwindSafe(|| work(unit)))
                    .map_err(|payload| panic_message(payload.as_ref()));
                let _ = tx.send(result);
            });
        };

        let mut in_flight = 0;
        for unit in pending.by_ref().take(window.max(1)) {
            submit(unit);
            in_flight += 1;
        }

        let mut accepting = true;
        while in_flight > 0 {
            let Ok(result) = rx.recv() else {
                break;
            };
            in_flight -= 1;
            completed += 1;

            if !on_done(result, completed) {
                accepting = false;
            }
            if accepting && cancel.is_cancelled() {
                log::debug!("cancellation requested, draining {in_flight} unit(s)");
                accepting = false;
            }
            if accepting {
                if let Some(unit) = pending.next() {
                    submit(unit);
                    in_flight += 1;
                }
            }
        }
    });

    completed
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::ThreadPoolBuilder;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn pool(threads: usize) -> ThreadPool {
        ThreadPoolBuilder::new().num_threads(threads).build().unwrap()
    }

    #[test]
    fn test_all_units_complete() {
        let mut seen = Vec::new();
        let done = run_windowed(
            &pool(3),
            (0..20).collect(),
            3,
            &CancelFlag::new(),
            |n: u32| n * 2,
            |r, _| {
                seen.push(r.unwrap());
                true
            },
        );
        assert_eq!(done, 20);
        seen.sort_unstable();
        assert_eq!(seen, (0..20).map(|n| n * 2).collect::<Vec<_>>());
    }

    #[test]
    fn test_stop_after_first_result_drains_window() {
        let started = AtomicUsize::new(0);
        let done = run_windowed(
            &pool(2),
            (0..50).collect::<Vec<u32>>(),
            2,
            &CancelFlag::new(),
            |n| {
                started.fetch_add(1, Ordering::SeqCst);
                n
            },
            |_, _| false,
        );
        assert_eq!(done, 2);
        assert_eq!(started.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_cancel_flag_stops_submission() {
        let cancel = CancelFlag::new();
        let done = run_windowed(
            &pool(1),
            (0..10).collect::<Vec<u32>>(),
            1,
            &cancel,
            |n| n,
            |_, completed| {
                if completed == 3 {
                    cancel.cancel();
                }
                true
            },
        );
        assert_eq!(done, 3);
    }

    #[test]
    fn test_panic_is_delivered_as_error() {
        let mut errors = Vec::new();
        let done = run_windowed(
            &pool(2),
            vec![1u32, 2, 3],
            2,
            &CancelFlag::new(),
            |n| {
                if n == 2 {
                    panic!("unit two failed");
                }
                n
            },
            |r, _| {
                if let Err(message) = r {
                    errors.push(message);
                }
                true
            },
        );
        assert_eq!(done, 3);
        assert_eq!(errors, vec!["unit two failed".to_string()]);
    }
}
