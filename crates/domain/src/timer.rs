use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU32, Ordering},
};
use std::time::Duration;

use tokio::task::JoinHandle;

/// Countdown started after completing a set.
///
/// A single slot shared by the whole session engine: starting a timer
/// pre-empts any timer already running, and at most one tick task is ever
/// live. The task decrements the remaining time once per second and
/// self-cancels at zero.
#[derive(Debug, Default)]
pub struct RestTimer {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

#[derive(Debug, Default)]
struct Shared {
    active: AtomicBool,
    remaining: AtomicU32,
}

impl RestTimer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a countdown of `seconds`, cancelling any running one.
    ///
    /// Must be called from within a tokio runtime. Starting with zero
    /// seconds only cancels.
    pub fn start(&mut self, seconds: u32) {
        self.stop();

        if seconds == 0 {
            return;
        }

        self.shared.active.store(true, Ordering::SeqCst);
        self.shared.remaining.store(seconds, Ordering::SeqCst);

        let shared = Arc::clone(&self.shared);
        self.handle = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(1)).await;
                let remaining = shared
                    .remaining
                    .load(Ordering::SeqCst)
                    .saturating_sub(1);
                shared.remaining.store(remaining, Ordering::SeqCst);
                if remaining == 0 {
                    shared.active.store(false, Ordering::SeqCst);
                    break;
                }
            }
        }));
    }

    /// Cancels the countdown. Safe to call when no timer is running.
    ///
    /// The shared state is detached rather than zeroed: an aborted tick
    /// task that is already past its sleep still writes into the old
    /// allocation and can never resurface a stale remaining time here.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        self.shared = Arc::new(Shared::default());
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.shared.remaining.load(Ordering::SeqCst)
    }
}

impl Drop for RestTimer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    async fn tick() {
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        tokio::time::advance(Duration::from_secs(1)).await;
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_reaches_zero_and_self_cancels() {
        let mut timer = RestTimer::new();
        timer.start(3);

        assert!(timer.is_active());
        assert_eq!(timer.remaining(), 3);

        tick().await;
        assert_eq!(timer.remaining(), 2);
        tick().await;
        assert_eq!(timer.remaining(), 1);
        tick().await;
        assert_eq!(timer.remaining(), 0);
        assert!(!timer.is_active());

        tick().await;
        assert_eq!(timer.remaining(), 0);
        assert!(!timer.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_preempts_running_timer() {
        let mut timer = RestTimer::new();
        timer.start(10);
        timer.start(5);

        assert!(timer.is_active());
        assert_eq!(timer.remaining(), 5);

        tick().await;
        assert_eq!(timer.remaining(), 4);

        for _ in 0..4 {
            tick().await;
        }
        assert_eq!(timer.remaining(), 0);
        assert!(!timer.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent() {
        let mut timer = RestTimer::new();

        timer.stop();
        assert!(!timer.is_active());
        assert_eq!(timer.remaining(), 0);

        timer.start(30);
        timer.stop();
        timer.stop();
        assert!(!timer.is_active());
        assert_eq!(timer.remaining(), 0);

        tick().await;
        assert_eq!(timer.remaining(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remaining_stays_zero_after_stop() {
        let mut timer = RestTimer::new();
        timer.start(10);
        let old = Arc::clone(&timer.shared);
        timer.stop();

        // A write through the old state must not show up in the timer.
        old.remaining.store(7, Ordering::SeqCst);
        assert_eq!(timer.remaining(), 0);
        assert!(!timer.is_active());

        timer.start(3);
        assert_eq!(timer.remaining(), 3);
        tick().await;
        assert_eq!(timer.remaining(), 2);
        assert!(timer.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_with_zero_seconds_stays_stopped() {
        let mut timer = RestTimer::new();
        timer.start(0);

        assert!(!timer.is_active());
        assert_eq!(timer.remaining(), 0);
    }
}
