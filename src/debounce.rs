//! Trailing-edge debouncer for coalescing renegotiation bursts.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Collapses bursts of calls into a single invocation after a quiet period.
///
/// Only the trailing edge fires: each [`call`](Debouncer::call) restarts the
/// quiet period and replaces the previously queued closure.
pub struct Debouncer {
    period: Duration,
    generation: Arc<AtomicU64>,
}

impl Debouncer {
    #[must_use]
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Queue `f` to run after the quiet period, replacing any queued call.
    ///
    /// Must be called from within a tokio runtime; `f` runs on a spawned
    /// task.
    pub fn call<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let latest = Arc::clone(&self.generation);
        let period = self.period;
        tokio::spawn(async move {
            tokio::time::sleep(period).await;
            // a later call or a cancel supersedes this one
            if latest.load(Ordering::Acquire) == generation {
                f();
            }
        });
    }

    /// Drop any queued call without firing it.
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use tokio::time::sleep;

    fn counter() -> (Arc<AtomicU32>, impl Fn() -> u32) {
        let count = Arc::new(AtomicU32::new(0));
        let read = Arc::clone(&count);
        (count, move || read.load(Ordering::SeqCst))
    }

    #[tokio::test(start_paused = true)]
    async fn burst_collapses_to_single_trailing_call() {
        let debouncer = Debouncer::new(Duration::from_millis(150));
        let (count, fired) = counter();

        for _ in 0..10 {
            let count = Arc::clone(&count);
            debouncer.call(move || {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }

        sleep(Duration::from_millis(300)).await;
        assert_eq!(fired(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_suppresses_queued_call() {
        let debouncer = Debouncer::new(Duration::from_millis(150));
        let (count, fired) = counter();

        let counter = Arc::clone(&count);
        debouncer.call(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        debouncer.cancel();

        sleep(Duration::from_millis(300)).await;
        assert_eq!(fired(), 0);

        // the debouncer stays usable after a cancel
        let counter = Arc::clone(&count);
        debouncer.call(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        sleep(Duration::from_millis(300)).await;
        assert_eq!(fired(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn separate_quiet_periods_fire_separately() {
        let debouncer = Debouncer::new(Duration::from_millis(150));
        let (count, fired) = counter();

        for _ in 0..2 {
            let count = Arc::clone(&count);
            debouncer.call(move || {
                count.fetch_add(1, Ordering::SeqCst);
            });
            sleep(Duration::from_millis(300)).await;
        }

        assert_eq!(fired(), 2);
    }
}
