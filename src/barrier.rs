//! Per-session completion counter.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

/// Counts the worker threads of one session that have not exited yet.
///
/// The count starts at the number of workers and is decremented once per worker, through the
/// [`Arrival`] guard that worker owns. Locks ignore poisoning: arrivals happen from `Drop` while a
/// worker may be unwinding, and must still be counted.
pub(crate) struct JoinBarrier {
    live: Mutex<usize>,
    condvar: Condvar,
}

impl JoinBarrier {
    pub(crate) fn new(workers: usize) -> Self {
        Self {
            live: Mutex::new(workers),
            condvar: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of workers that have not arrived yet.
    pub(crate) fn live(&self) -> usize {
        *self.lock()
    }

    fn arrive(&self) {
        let mut live = self.lock();
        // Every worker owns exactly one `Arrival`, so this can only underflow if that is broken.
        assert_ne!(*live, 0, "join barrier arrived at more often than it has workers");
        *live -= 1;
        if *live == 0 {
            self.condvar.notify_all();
        }
    }

    /// Blocks until every worker has arrived.
    pub(crate) fn wait(&self) {
        let live = self.lock();
        drop(
            self.condvar
                .wait_while(live, |live| *live != 0)
                .unwrap_or_else(PoisonError::into_inner),
        );
    }
}

/// Drop guard owned by a worker thread; arrives at its [`JoinBarrier`] when dropped.
///
/// Dropping is the only way to arrive, so a worker arrives exactly once on every exit path,
/// including an unwinding one.
pub(crate) struct Arrival {
    barrier: Arc<JoinBarrier>,
    name: String,
}

impl Arrival {
    pub(crate) fn new(barrier: Arc<JoinBarrier>, name: String) -> Self {
        Self { barrier, name }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for Arrival {
    fn drop(&mut self) {
        log::trace!("worker '{}' exiting", self.name);
        self.barrier.arrive();
    }
}
