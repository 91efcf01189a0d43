//! In-flight request accounting.
//!
//! Every fire-and-forget upload increments the counter before dispatch and
//! must decrement it exactly once when it resolves, whatever the outcome.
//! The decrement is tied to an RAII guard owned by the upload task, so it
//! also fires if the task unwinds.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Shared count of submitted-but-unresolved asynchronous requests.
#[derive(Debug, Default)]
pub(crate) struct InflightCounter {
    count: AtomicUsize,
}

impl InflightCounter {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            count: AtomicUsize::new(0),
        })
    }

    /// Register one submission. The returned guard releases it on drop.
    pub(crate) fn begin(self: &Arc<Self>) -> InflightGuard {
        self.count.fetch_add(1, Ordering::SeqCst);
        InflightGuard {
            counter: Arc::clone(self),
        }
    }

    pub(crate) fn pending(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

/// Decrements the counter exactly once, on drop.
#[derive(Debug)]
pub(crate) struct InflightGuard {
    counter: Arc<InflightCounter>,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.counter.count.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_balances_counter() {
        let counter = InflightCounter::new();
        assert_eq!(counter.pending(), 0);

        let g1 = counter.begin();
        let g2 = counter.begin();
        assert_eq!(counter.pending(), 2);

        drop(g1);
        assert_eq!(counter.pending(), 1);
        drop(g2);
        assert_eq!(counter.pending(), 0);
    }

    #[test]
    fn guard_releases_on_panic() {
        let counter = InflightCounter::new();
        let guard = counter.begin();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = guard;
            panic!("upload task died");
        }));

        assert!(result.is_err());
        assert_eq!(counter.pending(), 0);
    }

    #[test]
    fn concurrent_begin_drop_balances() {
        use std::thread;

        let counter = InflightCounter::new();
        let mut handles = vec![];
        for _ in 0..8 {
            let counter = Arc::clone(&counter);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    let _guard = counter.begin();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(counter.pending(), 0);
    }
}
