//! Cooperative Scheduler
//!
//! The scheduler is the pass boundary of the single-threaded reactive
//! model. Work can be deferred to the next tick (delayed subscription
//! delivery), and each tick resets every registered evaluation guard,
//! the counter behind the runaway-recomputation diagnostic.
//!
//! The deferred queue is thread-local; guards are process-wide, held
//! weakly so dropping a store definition unregisters its guard.

use std::cell::RefCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::error::{Result, StoreError};

thread_local! {
    static QUEUE: RefCell<Vec<Box<dyn FnOnce()>>> = RefCell::new(Vec::new());
}

static GUARDS: Mutex<Vec<Weak<EvalGuard>>> = Mutex::new(Vec::new());

/// The cooperative scheduler driving deferred delivery and guard resets.
pub struct Scheduler;

impl Scheduler {
    /// Queue a callback for the next tick on this thread.
    pub fn defer(callback: impl FnOnce() + 'static) {
        QUEUE.with(|queue| queue.borrow_mut().push(Box::new(callback)));
    }

    /// Run one scheduler pass: drain the deferred queue, then reset every
    /// live evaluation guard. Hosts embedding the store layer should call
    /// this once per frame/render pass.
    pub fn tick() {
        // Drain before running so callbacks that defer again land in the
        // next tick, not this one.
        let jobs: Vec<Box<dyn FnOnce()>> =
            QUEUE.with(|queue| queue.borrow_mut().drain(..).collect());
        for job in jobs {
            job();
        }

        let mut guards = GUARDS.lock();
        guards.retain(|weak| match weak.upgrade() {
            Some(guard) => {
                guard.reset();
                true
            }
            None => false,
        });
    }

    /// Number of callbacks waiting for the next tick on this thread.
    pub fn pending() -> usize {
        QUEUE.with(|queue| queue.borrow().len())
    }

    pub(crate) fn register_guard(guard: &Arc<EvalGuard>) {
        GUARDS.lock().push(Arc::downgrade(guard));
    }
}

/// Counts value-accessor evaluations within one scheduler pass.
///
/// One guard per store definition (not a module-level global), so
/// unrelated stores never trip each other. Best-effort: the limit exists
/// to turn a silent hang into a diagnostic, not to enforce correctness.
pub struct EvalGuard {
    count: AtomicUsize,
    limit: usize,
}

impl EvalGuard {
    pub(crate) fn new(limit: usize) -> Arc<Self> {
        let guard = Arc::new(Self {
            count: AtomicUsize::new(0),
            limit,
        });
        Scheduler::register_guard(&guard);
        guard
    }

    /// Record one evaluation; errors once the per-pass limit is exceeded.
    pub(crate) fn bump(&self) -> Result<()> {
        let seen = self.count.fetch_add(1, Ordering::Relaxed) + 1;
        if seen > self.limit {
            return Err(StoreError::InfiniteLoop { limit: self.limit });
        }
        Ok(())
    }

    fn reset(&self) {
        self.count.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn deferred_callbacks_run_on_tick() {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();

        Scheduler::defer(move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(count.load(Ordering::SeqCst), 0);
        Scheduler::tick();
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // Nothing left queued.
        Scheduler::tick();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn re_deferred_work_lands_in_the_next_tick() {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();

        Scheduler::defer(move || {
            let count_inner = count_clone.clone();
            Scheduler::defer(move || {
                count_inner.fetch_add(1, Ordering::SeqCst);
            });
        });

        Scheduler::tick();
        assert_eq!(count.load(Ordering::SeqCst), 0);

        Scheduler::tick();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn guard_trips_past_its_limit() {
        let guard = EvalGuard::new(3);

        assert!(guard.bump().is_ok());
        assert!(guard.bump().is_ok());
        assert!(guard.bump().is_ok());

        let err = guard.bump().unwrap_err();
        assert_eq!(err, StoreError::InfiniteLoop { limit: 3 });
    }

    #[test]
    fn tick_resets_guards() {
        let guard = EvalGuard::new(2);

        assert!(guard.bump().is_ok());
        assert!(guard.bump().is_ok());
        assert!(guard.bump().is_err());

        Scheduler::tick();
        assert!(guard.bump().is_ok());
    }
}
