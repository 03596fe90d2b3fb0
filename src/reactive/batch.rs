//! Batching of cell notifications.

use super::cell::Listener;
use std::cell::RefCell;

#[derive(Default)]
struct BatchState {
    depth: usize,
    /// Listeners to notify when the outermost batch ends, keyed by cell id.
    pending: Vec<(u64, Vec<Listener>)>,
}

thread_local! {
    static BATCH: RefCell<BatchState> = RefCell::new(BatchState::default());
}

/// Run `f` with change notifications deferred until it returns.
///
/// Nested batches flush only when the outermost one ends. Each cell
/// notifies its listeners at most once per flush.
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    BATCH.with(|state| state.borrow_mut().depth += 1);
    let _guard = BatchGuard;
    f()
}

/// Whether the current thread is inside a [`batch`].
pub fn is_batching() -> bool {
    BATCH.with(|state| state.borrow().depth > 0)
}

/// Queue or deliver a notification for one cell.
pub(crate) fn notify(cell_id: u64, listeners: Vec<Listener>) {
    if listeners.is_empty() {
        return;
    }

    let deliver_now = BATCH.with(|state| {
        let mut state = state.borrow_mut();
        if state.depth == 0 {
            return true;
        }
        if !state.pending.iter().any(|(id, _)| *id == cell_id) {
            state.pending.push((cell_id, listeners.clone()));
        }
        false
    });

    if deliver_now {
        for listener in listeners {
            listener();
        }
    }
}

struct BatchGuard;

impl Drop for BatchGuard {
    fn drop(&mut self) {
        let pending = BATCH.with(|state| {
            let mut state = state.borrow_mut();
            state.depth -= 1;
            if state.depth == 0 {
                std::mem::take(&mut state.pending)
            } else {
                Vec::new()
            }
        });

        // Unwinding: the batch never completed, so nobody is told about it.
        if std::thread::panicking() {
            return;
        }

        for (_, listeners) in pending {
            for listener in listeners {
                listener();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::ReactiveCell;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_batch_defers_and_dedups() {
        let a = ReactiveCell::new(0);
        let b = ReactiveCell::new(0);
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        a.subscribe(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = hits.clone();
        b.subscribe(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        batch(|| {
            a.set(1);
            a.set(2);
            b.set(3);
            assert!(is_batching());
            assert_eq!(hits.load(Ordering::SeqCst), 0);
        });

        assert!(!is_batching());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(a.get(), 2);
        assert_eq!(b.get(), 3);
    }

    #[test]
    fn test_nested_batch_flushes_once() {
        let cell = ReactiveCell::new(0);
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        cell.subscribe(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        batch(|| {
            cell.set(1);
            batch(|| cell.set(2));
            assert_eq!(hits.load(Ordering::SeqCst), 0);
        });

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listener_sees_final_values() {
        let a = ReactiveCell::new(0);
        let b = ReactiveCell::new(0);
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let (a2, b2, log) = (a.clone(), b.clone(), seen.clone());
        a.subscribe(move || log.lock().push((a2.get(), b2.get())));

        batch(|| {
            a.set(1);
            b.set(1);
        });

        assert_eq!(*seen.lock(), vec![(1, 1)]);
    }
}
